//! Feature schemas and record alignment.
//!
//! A schema is the ordered list of feature names a bundle was fitted on. The
//! order is part of the model: position `i` of the aligned vector is fed to the
//! scaler and classifier as feature `i`, so the schema always travels with (or
//! alongside) the artifact and is never inferred from input field order.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::encoding::coerce_field;
use crate::error::PredictError;
use crate::record::PatientRecord;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("A feature schema must name at least one feature.")]
    Empty,
    #[error("Feature '{0}' appears more than once in the schema.")]
    Duplicate(String),
    #[error("Feature names must not be blank (position {0}).")]
    BlankName(usize),
}

/// Ordered feature names defining the dimensionality and meaning of the model input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl TryFrom<Vec<String>> for FeatureSchema {
    type Error = SchemaError;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        FeatureSchema::new(names)
    }
}

impl From<FeatureSchema> for Vec<String> {
    fn from(schema: FeatureSchema) -> Self {
        schema.names
    }
}

impl FeatureSchema {
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Result<Self, SchemaError> {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(SchemaError::Empty);
        }
        let mut seen = HashSet::with_capacity(names.len());
        for (position, name) in names.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(SchemaError::BlankName(position));
            }
            if !seen.insert(name.as_str()) {
                return Err(SchemaError::Duplicate(name.clone()));
            }
        }
        Ok(FeatureSchema { names })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Always false for a constructed schema; provided for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// Maps a loosely keyed record onto the schema's ordered feature vector.
///
/// Missing fields become `0`; fields the schema does not name are ignored. A
/// field whose value is neither numeric nor a known categorical answer fails
/// the whole alignment.
pub fn align(record: &PatientRecord, schema: &FeatureSchema) -> Result<Array1<f64>, PredictError> {
    let mut aligned = Array1::zeros(schema.len());
    for (slot, name) in aligned.iter_mut().zip(schema.names()) {
        if let Some(value) = record.get(name) {
            *slot = coerce_field(name, value)?;
        }
    }

    if log::log_enabled!(log::Level::Debug) {
        let ignored: Vec<&str> = record
            .iter()
            .map(|(name, _)| name)
            .filter(|name| schema.position(name).is_none())
            .collect();
        if !ignored.is_empty() {
            log::debug!("Ignoring fields outside the schema: {}", ignored.join(", "));
        }
    }

    Ok(aligned)
}

const HEART_FEATURES: [&str; 13] = [
    "age", "sex", "cp", "trestbps", "chol", "fbs", "restecg", "thalach", "exang", "oldpeak",
    "slope", "ca", "thal",
];

const DIABETES_FEATURES: [&str; 8] = [
    "pregnancies",
    "glucose",
    "blood_pressure",
    "skin_thickness",
    "insulin",
    "bmi",
    "diabetes_pedigree_function",
    "age",
];

// Pinned to the full 24-column chronic kidney disease layout.
const KIDNEY_FEATURES: [&str; 24] = [
    "age", "bp", "sg", "al", "su", "rbc", "pc", "pcc", "ba", "bgr", "bu", "sc", "sod", "pot",
    "hemo", "pcv", "wc", "rc", "htn", "dm", "cad", "appet", "pe", "ane",
];

const LIVER_FEATURES: [&str; 10] = [
    "age",
    "gender",
    "total_bilirubin",
    "direct_bilirubin",
    "alkaline_phosphotase",
    "alamine_aminotransferase",
    "aspartate_aminotransferase",
    "total_proteins",
    "albumin",
    "albumin_globulin_ratio",
];

/// The tabular conditions the system ships schemas for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disease {
    Heart,
    Diabetes,
    Kidney,
    Liver,
}

impl Disease {
    pub const ALL: [Disease; 4] = [
        Disease::Heart,
        Disease::Diabetes,
        Disease::Kidney,
        Disease::Liver,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Disease::Heart => "heart",
            Disease::Diabetes => "diabetes",
            Disease::Kidney => "kidney",
            Disease::Liver => "liver",
        }
    }

    pub fn feature_names(self) -> &'static [&'static str] {
        match self {
            Disease::Heart => &HEART_FEATURES,
            Disease::Diabetes => &DIABETES_FEATURES,
            Disease::Kidney => &KIDNEY_FEATURES,
            Disease::Liver => &LIVER_FEATURES,
        }
    }

    /// The built-in schema, used when an artifact does not carry its own.
    pub fn default_schema(self) -> FeatureSchema {
        FeatureSchema {
            names: self.feature_names().iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn specialist(self) -> &'static str {
        match self {
            Disease::Heart => "Cardiologist",
            Disease::Diabetes => "Endocrinologist",
            Disease::Kidney => "Nephrologist",
            Disease::Liver => "Hepatologist",
        }
    }
}

impl fmt::Display for Disease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown disease '{0}'. Expected one of: heart, diabetes, kidney, liver.")]
pub struct UnknownDisease(pub String);

impl FromStr for Disease {
    type Err = UnknownDisease;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Disease::ALL
            .into_iter()
            .find(|disease| disease.name() == wanted)
            .ok_or_else(|| UnknownDisease(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::record::FieldValue;

    fn schema(names: &[&str]) -> FeatureSchema {
        FeatureSchema::new(names.iter().copied()).expect("valid schema")
    }

    #[test]
    fn aligned_length_always_matches_schema() {
        let target = schema(&["a", "b", "c"]);
        let records = [
            PatientRecord::new(),
            PatientRecord::new().with("a", 1.0),
            PatientRecord::new()
                .with("a", 1.0)
                .with("b", 2.0)
                .with("c", 3.0)
                .with("d", 4.0)
                .with("e", 5.0),
        ];
        for record in &records {
            assert_eq!(align(record, &target).unwrap().len(), 3);
        }
    }

    #[test]
    fn missing_fields_are_zero_filled() {
        let target = schema(&["x", "y", "z"]);
        let record = PatientRecord::new().with("y", 7.5).with("unrelated", 99.0);
        let aligned = align(&record, &target).unwrap();
        assert_eq!(aligned.to_vec(), vec![0.0, 7.5, 0.0]);
    }

    #[test]
    fn alignment_follows_schema_order_not_record_order() {
        let target = schema(&["zeta", "alpha"]);
        let record = PatientRecord::new().with("alpha", 1.0).with("zeta", 2.0);
        assert_eq!(align(&record, &target).unwrap().to_vec(), vec![2.0, 1.0]);
    }

    #[test]
    fn malformed_categorical_value_is_rejected() {
        let target = Disease::Kidney.default_schema();
        let record = PatientRecord::new().with("htn", "sometimes");
        let err = align(&record, &target).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFieldValue);
        match err {
            PredictError::InvalidFieldValue { field, value } => {
                assert_eq!(field, "htn");
                assert_eq!(value, "sometimes");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn malformed_value_outside_schema_is_ignored() {
        let target = schema(&["age"]);
        let record = PatientRecord::new()
            .with("age", 40.0)
            .with("comment", "not a number");
        assert_eq!(align(&record, &target).unwrap().to_vec(), vec![40.0]);
    }

    #[test]
    fn kidney_yes_no_answers_encode_in_place() {
        let target = Disease::Kidney.default_schema();
        let record = PatientRecord::new().with("htn", "yes").with("dm", "no");
        let aligned = align(&record, &target).unwrap();
        assert_eq!(aligned[target.position("htn").unwrap()], 1.0);
        assert_eq!(aligned[target.position("dm").unwrap()], 0.0);
    }

    #[test]
    fn builtin_schemas_have_expected_widths() {
        assert_eq!(Disease::Heart.default_schema().len(), 13);
        assert_eq!(Disease::Diabetes.default_schema().len(), 8);
        assert_eq!(Disease::Kidney.default_schema().len(), 24);
        assert_eq!(Disease::Liver.default_schema().len(), 10);
        for disease in Disease::ALL {
            let names = disease.feature_names();
            assert!(FeatureSchema::new(names.iter().copied()).is_ok());
        }
    }

    #[test]
    fn schema_rejects_empty_blank_and_duplicate_names() {
        assert_eq!(FeatureSchema::new(Vec::<String>::new()), Err(SchemaError::Empty));
        assert_eq!(
            FeatureSchema::new(["age", " "]),
            Err(SchemaError::BlankName(1))
        );
        assert_eq!(
            FeatureSchema::new(["age", "age"]),
            Err(SchemaError::Duplicate("age".into()))
        );
    }

    #[test]
    fn schema_deserializes_from_plain_list() {
        let parsed: FeatureSchema = serde_json::from_str(r#"["glucose", "bmi"]"#).unwrap();
        assert_eq!(parsed.names(), ["glucose", "bmi"]);
        assert!(serde_json::from_str::<FeatureSchema>(r#"["bmi", "bmi"]"#).is_err());
    }

    #[test]
    fn diseases_parse_case_insensitively() {
        assert_eq!("Heart".parse::<Disease>(), Ok(Disease::Heart));
        assert_eq!(" kidney ".parse::<Disease>(), Ok(Disease::Kidney));
        assert!("brain".parse::<Disease>().is_err());
        assert_eq!(Disease::Liver.to_string(), "liver");
    }

    #[test]
    fn numeric_strings_align_like_numbers() {
        let target = schema(&["glucose"]);
        let record = PatientRecord::new().with("glucose", FieldValue::Text("148".into()));
        assert_eq!(align(&record, &target).unwrap()[0], 148.0);
    }
}
