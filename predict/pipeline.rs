//! Scaling, classification and the per-disease prediction entry point.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::{Array1, ArrayView1};
use rayon::prelude::*;
use serde::Serialize;

use crate::bundle::{self, BundleCache, ModelBundle};
use crate::config::AppConfig;
use crate::error::{ErrorReport, PredictError};
use crate::model::ModelError;
use crate::record::PatientRecord;
use crate::risk::{self, RiskTier};
use crate::schema::{self, Disease};

/// What one prediction produced.
///
/// `probability` and `risk_tier` are present together, and only when the
/// classifier estimates probabilities.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub label: bool,
    pub probability: Option<f64>,
    pub risk_tier: Option<RiskTier>,
    pub narrative: String,
}

/// A prediction together with the aligned vector it was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionOutcome {
    pub aligned: Array1<f64>,
    pub result: PredictionResult,
}

/// Runs an already aligned vector through the bundle's scaler and classifier.
///
/// The scaler only applies its stored parameters, and label and probability
/// come from one classifier call on the same normalized vector, so identical
/// inputs always give identical results.
pub fn predict(bundle: &ModelBundle, vector: ArrayView1<f64>) -> Result<PredictionResult, PredictError> {
    let expected = bundle.feature_schema().len();
    if vector.len() != expected {
        return Err(PredictError::DimensionMismatch {
            context: "The model bundle",
            expected,
            found: vector.len(),
        });
    }

    let normalized = bundle.scaler().transform(vector)?;
    if normalized.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::NonFiniteScore.into());
    }
    let decision = bundle.classifier().decide(normalized.view())?;

    let result = match decision.probability {
        Some(p) if !p.is_finite() => return Err(ModelError::NonFiniteScore.into()),
        Some(p) if !(0.0..=1.0).contains(&p) => {
            return Err(ModelError::ProbabilityOutOfRange(p).into());
        }
        Some(p) => {
            let (tier, narrative) = risk::categorize(p);
            PredictionResult {
                label: decision.label,
                probability: Some(p),
                risk_tier: Some(tier),
                narrative: narrative.to_string(),
            }
        }
        None => PredictionResult {
            label: decision.label,
            probability: None,
            risk_tier: None,
            narrative: risk::binary_narrative(decision.label).to_string(),
        },
    };
    Ok(result)
}

/// Aligns a raw record onto the bundle's schema and predicts.
pub fn predict_record(
    bundle: &ModelBundle,
    record: &PatientRecord,
) -> Result<PredictionOutcome, PredictError> {
    let aligned = schema::align(record, bundle.feature_schema())?;
    let result = predict(bundle, aligned.view())?;
    log::debug!(
        "Prediction: label={} probability={:?} tier={:?}",
        result.label,
        result.probability,
        result.risk_tier
    );
    Ok(PredictionOutcome { aligned, result })
}

/// Predicts many records against one shared bundle, preserving input order.
pub fn predict_batch(
    bundle: &ModelBundle,
    records: &[PatientRecord],
) -> Vec<Result<PredictionOutcome, PredictError>> {
    records
        .par_iter()
        .map(|record| predict_record(bundle, record))
        .collect()
}

/// The answer handed back to callers that want a value rather than a `Result`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_tier: Option<RiskTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

impl From<Result<PredictionOutcome, PredictError>> for PredictionResponse {
    fn from(outcome: Result<PredictionOutcome, PredictError>) -> Self {
        match outcome {
            Ok(PredictionOutcome { result, .. }) => PredictionResponse {
                label: Some(result.label),
                probability: result.probability,
                risk_tier: result.risk_tier,
                narrative: Some(result.narrative),
                error: None,
            },
            Err(e) => PredictionResponse {
                label: None,
                probability: None,
                risk_tier: None,
                narrative: None,
                error: Some(ErrorReport::from(&e)),
            },
        }
    }
}

/// Resolves a disease to its configured artifact and runs the pipeline.
///
/// Diseases without a configured artifact fail with
/// [`PredictError::ModelUnavailable`]; no placeholder result is ever produced.
#[derive(Debug, Default)]
pub struct Predictor {
    models: HashMap<Disease, PathBuf>,
    cache: Option<Arc<BundleCache>>,
}

impl Predictor {
    /// A predictor backed by the process-wide bundle cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// A predictor backed by its own cache instead of the process-wide one.
    pub fn with_cache(cache: Arc<BundleCache>) -> Self {
        Predictor {
            models: HashMap::new(),
            cache: Some(cache),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let mut predictor = Predictor::new();
        for disease in Disease::ALL {
            if let Some(path) = config.model_path(disease) {
                predictor.register(disease, path);
            }
        }
        predictor
    }

    pub fn register(&mut self, disease: Disease, path: impl Into<PathBuf>) -> &mut Self {
        self.models.insert(disease, path.into());
        self
    }

    pub fn model_path(&self, disease: Disease) -> Option<&Path> {
        self.models.get(&disease).map(PathBuf::as_path)
    }

    /// Loads (or fetches from cache) the bundle configured for `disease`.
    pub fn bundle(&self, disease: Disease) -> Result<Arc<ModelBundle>, PredictError> {
        let path = self
            .models
            .get(&disease)
            .ok_or(PredictError::ModelUnavailable(disease))?;
        let fallback = disease.default_schema();
        match &self.cache {
            Some(cache) => cache.load(path, Some(&fallback)),
            None => bundle::load_bundle(path, Some(&fallback)),
        }
    }

    pub fn predict(
        &self,
        disease: Disease,
        record: &PatientRecord,
    ) -> Result<PredictionOutcome, PredictError> {
        let bundle = self.bundle(disease)?;
        predict_record(&bundle, record)
    }

    /// Like [`Predictor::predict`], with any failure folded into the response.
    pub fn respond(&self, disease: Disease, record: &PatientRecord) -> PredictionResponse {
        let outcome = self.predict(disease, record);
        if let Err(e) = &outcome {
            log::warn!("Prediction for {disease} failed [{}]: {e}", e.code());
        }
        PredictionResponse::from(outcome)
    }

    pub fn predict_batch(
        &self,
        disease: Disease,
        records: &[PatientRecord],
    ) -> Result<Vec<Result<PredictionOutcome, PredictError>>, PredictError> {
        let bundle = self.bundle(disease)?;
        Ok(predict_batch(&bundle, records))
    }
}
