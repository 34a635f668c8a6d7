//! Assembly and rendering of per-patient prediction reports.

use std::fmt;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use ndarray::Array1;
use serde::Serialize;
use thiserror::Error;

use crate::bundle::ModelBundle;
use crate::pipeline::PredictionResult;
use crate::record::PatientRecord;
use crate::schema::{Disease, FeatureSchema};

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Aligned vector has {found} values but the schema names {expected} features.")]
    Misaligned { expected: usize, found: usize },
}

/// Who and what a report is about. The username is carried as an opaque label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportMetadata {
    pub username: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub disease: Disease,
    pub model_fingerprint: Option<String>,
}

impl ReportMetadata {
    /// Metadata stamped with the current time and the bundle's fingerprint.
    pub fn now(disease: Disease, bundle: &ModelBundle, username: Option<&str>) -> Self {
        ReportMetadata {
            username: username.map(str::to_string),
            timestamp: Utc::now(),
            disease,
            model_fingerprint: bundle.info().fingerprint.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignedFeature {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub recommended_specialist: &'static str,
    pub result: PredictionResult,
    pub inputs: PatientRecord,
    pub features: Vec<AlignedFeature>,
}

/// Pairs the aligned vector with its schema names and bundles everything a
/// report needs.
pub fn assemble(
    record: &PatientRecord,
    schema: &FeatureSchema,
    aligned: &Array1<f64>,
    result: &PredictionResult,
    metadata: ReportMetadata,
) -> Result<Report, ReportError> {
    if aligned.len() != schema.len() {
        return Err(ReportError::Misaligned {
            expected: schema.len(),
            found: aligned.len(),
        });
    }
    let features = schema
        .names()
        .iter()
        .zip(aligned.iter())
        .map(|(name, &value)| AlignedFeature {
            name: name.clone(),
            value,
        })
        .collect();

    Ok(Report {
        recommended_specialist: metadata.disease.specialist(),
        metadata,
        result: result.clone(),
        inputs: record.clone(),
        features,
    })
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let meta = &self.metadata;
        writeln!(f, "Clinical prediction report: {}", meta.disease)?;
        writeln!(f, "Generated: {}", meta.timestamp.format("%Y-%m-%d %H:%M:%S UTC"))?;
        if let Some(user) = &meta.username {
            writeln!(f, "Patient: {user}")?;
        }
        if let Some(fingerprint) = &meta.model_fingerprint {
            writeln!(f, "Model sha256: {fingerprint}")?;
        }
        writeln!(f)?;

        let verdict = if self.result.label { "Positive" } else { "Negative" };
        writeln!(f, "Result: {verdict}")?;
        if let (Some(p), Some(tier)) = (self.result.probability, self.result.risk_tier) {
            writeln!(f, "Probability: {:.1}%", p * 100.0)?;
            writeln!(f, "Risk level: {tier}")?;
        }
        writeln!(f, "Advice: {}", self.result.narrative)?;
        writeln!(f, "Recommended specialist: {}", self.recommended_specialist)?;
        writeln!(f)?;

        writeln!(f, "Inputs:")?;
        for (name, value) in self.inputs.iter() {
            writeln!(f, "  {name}: {value}")?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "Model features: {}",
            self.features
                .iter()
                .map(|feature| format!("{}={}", feature.name, feature.value))
                .join(", ")
        )
    }
}

impl Report {
    pub fn render_text(&self) -> String {
        self.to_string()
    }

    /// Writes JSON when `path` ends in `.json`, plain text otherwise.
    pub fn write(&self, path: &Path) -> Result<(), ReportError> {
        let mut file = BufWriter::new(fs::File::create(path)?);
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::to_writer_pretty(&mut file, self)?;
            writeln!(file)?;
        } else {
            write!(file, "{self}")?;
        }
        file.flush()?;
        log::info!("Report written to {}", path.display());
        Ok(())
    }
}
