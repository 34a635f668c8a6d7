#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

pub mod bundle;
pub mod data;
pub mod encoding;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod risk;
pub mod schema;

#[path = "../shared/config.rs"]
pub mod config;

#[path = "../session/mod.rs"]
pub mod session;

#[path = "../imaging/mod.rs"]
pub mod imaging;

pub use bundle::{BundleCache, ModelBundle, load_bundle};
pub use error::{ErrorKind, PredictError};
pub use pipeline::{PredictionResponse, PredictionResult, Predictor, predict, predict_record};
pub use record::{FieldValue, PatientRecord};
pub use risk::{RiskTier, categorize};
pub use schema::{Disease, FeatureSchema, align};
