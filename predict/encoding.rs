//! Fixed numeric encoding for categorical clinical answers.
//!
//! The table is closed: a string that is neither numeric nor listed here is a
//! malformed field and is rejected rather than defaulted.

use crate::error::PredictError;
use crate::record::FieldValue;

/// Every accepted categorical answer and its numeric code.
pub const CATEGORICAL_ENCODINGS: [(&str, f64); 10] = [
    ("yes", 1.0),
    ("no", 0.0),
    ("present", 1.0),
    ("notpresent", 0.0),
    ("normal", 1.0),
    ("abnormal", 0.0),
    ("good", 1.0),
    ("poor", 0.0),
    ("male", 1.0),
    ("female", 0.0),
];

/// Looks up a categorical answer, ignoring surrounding whitespace and case.
pub fn encode_categorical(answer: &str) -> Option<f64> {
    let normalized = answer.trim().to_ascii_lowercase();
    CATEGORICAL_ENCODINGS
        .iter()
        .find(|(label, _)| *label == normalized)
        .map(|&(_, code)| code)
}

/// Converts one raw field value into the number the model consumes.
pub fn coerce_field(field: &str, value: &FieldValue) -> Result<f64, PredictError> {
    let invalid = || PredictError::InvalidFieldValue {
        field: field.to_string(),
        value: value.to_string(),
    };

    match value {
        FieldValue::Bool(flag) => Ok(if *flag { 1.0 } else { 0.0 }),
        FieldValue::Number(number) if number.is_finite() => Ok(*number),
        FieldValue::Number(_) => Err(invalid()),
        FieldValue::Text(text) => match text.trim().parse::<f64>() {
            Ok(number) if number.is_finite() => Ok(number),
            Ok(_) => Err(invalid()),
            Err(_) => encode_categorical(text).ok_or_else(invalid),
        },
    }
}
