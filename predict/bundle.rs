//! Loading and caching of persisted model bundles.
//!
//! Two artifact layouts have been produced over time:
//!
//! - a bare two-element pair `[classifier, scaler]`, which does not record the
//!   feature schema (the caller supplies the disease default), and
//! - a named mapping with `classifier`, `scaler` and `feature_schema` keys
//!   (historical aliases `model`, `features`, `feature_names` and `columns`
//!   are accepted).
//!
//! The layout is resolved exactly once, here, into a [`ModelBundle`]. Nothing
//! downstream looks at the on-disk shape again.
//!
//! Documents ending in `.toml` are parsed as TOML, everything else as JSON. A
//! TOML document is always a table, so the pair layout only exists in JSON.

use std::collections::BTreeSet;
use std::fs;
use std::io::{BufWriter, ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::error::PredictError;
use crate::model::{Classifier, ClassifierSpec, Scaler, ScalerSpec};
use crate::schema::FeatureSchema;

const CLASSIFIER_KEYS: [&str; 2] = ["classifier", "model"];
const SCALER_KEYS: [&str; 1] = ["scaler"];
const SCHEMA_KEYS: [&str; 4] = ["feature_schema", "features", "feature_names", "columns"];

/// Which persisted layout a bundle was normalized from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactShape {
    Pair,
    Named,
    /// Assembled in memory rather than read from disk.
    Constructed,
}

/// Provenance recorded alongside a bundle, for diagnostics and reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BundleInfo {
    pub source: Option<PathBuf>,
    pub shape: ArtifactShape,
    /// Hex SHA-256 of the artifact bytes.
    pub fingerprint: Option<String>,
    pub schema_version: Option<String>,
    pub disease: Option<String>,
}

/// A fitted classifier, its scaler and the feature schema they share.
///
/// Immutable once built; share it behind an [`Arc`].
#[derive(Debug)]
pub struct ModelBundle {
    classifier: Box<dyn Classifier>,
    scaler: Box<dyn Scaler>,
    feature_schema: FeatureSchema,
    info: BundleInfo,
}

impl ModelBundle {
    /// Assembles a bundle, enforcing that schema, scaler and classifier agree
    /// on the number of features.
    pub fn new(
        classifier: Box<dyn Classifier>,
        scaler: Box<dyn Scaler>,
        feature_schema: FeatureSchema,
    ) -> Result<Self, PredictError> {
        let expected = feature_schema.len();
        if scaler.dimensionality() != expected {
            return Err(PredictError::DimensionMismatch {
                context: "The fitted scaler",
                expected: scaler.dimensionality(),
                found: expected,
            });
        }
        if classifier.dimensionality() != expected {
            return Err(PredictError::DimensionMismatch {
                context: "The fitted classifier",
                expected: classifier.dimensionality(),
                found: expected,
            });
        }
        Ok(ModelBundle {
            classifier,
            scaler,
            feature_schema,
            info: BundleInfo {
                source: None,
                shape: ArtifactShape::Constructed,
                fingerprint: None,
                schema_version: None,
                disease: None,
            },
        })
    }

    /// Reads and normalizes an artifact, bypassing any cache.
    ///
    /// `fallback_schema` is used only when the artifact does not carry its own
    /// feature schema.
    pub fn load(path: &Path, fallback_schema: Option<&FeatureSchema>) -> Result<Self, PredictError> {
        let bytes = fs::read(path).map_err(|e| match e.kind() {
            IoErrorKind::NotFound => PredictError::NotFound {
                path: path.to_path_buf(),
            },
            _ => PredictError::corrupt(path, e),
        })?;
        let fingerprint = hex::encode(Sha256::digest(&bytes));
        let text = std::str::from_utf8(&bytes).map_err(|e| PredictError::corrupt(path, e))?;

        let document = internal::decode_document(path, text)?;
        let artifact = internal::resolve_shape(path, document)?;
        let shape = artifact.shape();

        let (classifier, scaler, schema, schema_version, disease) = match artifact {
            RawArtifact::Pair { classifier, scaler } => (classifier, scaler, None, None, None),
            RawArtifact::Named(named) => (
                named.classifier,
                named.scaler,
                named.feature_schema,
                named.schema_version,
                named.disease,
            ),
        };

        let feature_schema = match (schema, fallback_schema) {
            (Some(schema), _) => schema,
            (None, Some(fallback)) => fallback.clone(),
            (None, None) => {
                return Err(PredictError::unsupported(
                    path,
                    "the artifact stores no feature schema and no default schema was supplied",
                ));
            }
        };

        let classifier = classifier
            .build()
            .map_err(|e| PredictError::corrupt(path, format!("classifier: {e}")))?;
        let scaler = scaler
            .build()
            .map_err(|e| PredictError::corrupt(path, format!("scaler: {e}")))?;

        let mut bundle = ModelBundle::new(classifier, scaler, feature_schema)?;
        bundle.info = BundleInfo {
            source: Some(path.to_path_buf()),
            shape,
            fingerprint: Some(fingerprint),
            schema_version,
            disease,
        };

        log::info!(
            "Loaded {:?} model bundle from {} ({} features, sha256 {})",
            shape,
            path.display(),
            bundle.feature_schema.len(),
            bundle.info.fingerprint.as_deref().unwrap_or("-")
        );
        Ok(bundle)
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    pub fn scaler(&self) -> &dyn Scaler {
        self.scaler.as_ref()
    }

    pub fn feature_schema(&self) -> &FeatureSchema {
        &self.feature_schema
    }

    pub fn info(&self) -> &BundleInfo {
        &self.info
    }
}

/// The named-mapping artifact layout, as written by [`NamedArtifact::save`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedArtifact {
    // Plain values precede the nested tables so the TOML rendering stays flat.
    #[serde(
        default,
        alias = "features",
        alias = "feature_names",
        alias = "columns",
        skip_serializing_if = "Option::is_none"
    )]
    pub feature_schema: Option<FeatureSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disease: Option<String>,
    #[serde(alias = "model")]
    pub classifier: ClassifierSpec,
    pub scaler: ScalerSpec,
}

#[derive(Error, Debug)]
pub enum ArtifactWriteError {
    #[error("Failed to write model artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize model artifact to TOML: {0}")]
    Toml(#[from] toml::ser::Error),
    #[error("Failed to serialize model artifact to JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl NamedArtifact {
    /// Writes the artifact as TOML when the path ends in `.toml`, JSON otherwise.
    pub fn save(&self, path: &Path) -> Result<(), ArtifactWriteError> {
        let text = if internal::is_toml(path) {
            toml::to_string_pretty(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(text.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

/// An artifact after shape detection, before its parts are built.
enum RawArtifact {
    Pair {
        classifier: ClassifierSpec,
        scaler: ScalerSpec,
    },
    Named(NamedArtifact),
}

impl RawArtifact {
    fn shape(&self) -> ArtifactShape {
        match self {
            RawArtifact::Pair { .. } => ArtifactShape::Pair,
            RawArtifact::Named(_) => ArtifactShape::Named,
        }
    }
}

mod internal {
    use super::*;

    pub(super) fn is_toml(path: &Path) -> bool {
        path.extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
    }

    /// Parses the document into one generic tree regardless of its syntax.
    pub(super) fn decode_document(path: &Path, text: &str) -> Result<Value, PredictError> {
        if is_toml(path) {
            let table: toml::Table =
                toml::from_str(text).map_err(|e| PredictError::corrupt(path, e))?;
            serde_json::to_value(table).map_err(|e| PredictError::corrupt(path, e))
        } else {
            serde_json::from_str(text).map_err(|e| PredictError::corrupt(path, e))
        }
    }

    pub(super) fn resolve_shape(path: &Path, document: Value) -> Result<RawArtifact, PredictError> {
        match document {
            Value::Array(mut items) if items.len() == 2 => {
                let scaler = items.pop().unwrap_or(Value::Null);
                let classifier = items.pop().unwrap_or(Value::Null);
                let classifier = serde_json::from_value(classifier)
                    .map_err(|e| PredictError::corrupt(path, format!("classifier: {e}")))?;
                let scaler = serde_json::from_value(scaler)
                    .map_err(|e| PredictError::corrupt(path, format!("scaler: {e}")))?;
                Ok(RawArtifact::Pair { classifier, scaler })
            }
            Value::Array(items) => Err(PredictError::unsupported(
                path,
                format!("expected a [classifier, scaler] pair, found {} elements", items.len()),
            )),
            Value::Object(map) => {
                let keys: BTreeSet<&str> = map.keys().map(String::as_str).collect();
                let has_any = |names: &[&str]| names.iter().any(|n| keys.contains(n));
                if !has_any(&CLASSIFIER_KEYS[..]) || !has_any(&SCALER_KEYS[..]) {
                    return Err(PredictError::unsupported(
                        path,
                        format!(
                            "a named artifact needs classifier and scaler entries, found keys [{}]",
                            keys.iter().copied().collect::<Vec<_>>().join(", ")
                        ),
                    ));
                }
                if SCHEMA_KEYS.iter().filter(|n| keys.contains(*n)).count() > 1 {
                    return Err(PredictError::unsupported(
                        path,
                        "more than one feature schema entry is present",
                    ));
                }
                let named = serde_json::from_value(Value::Object(map))
                    .map_err(|e| PredictError::corrupt(path, e))?;
                Ok(RawArtifact::Named(named))
            }
            other => Err(PredictError::unsupported(
                path,
                format!("top-level {} is neither a pair nor a mapping", json_type(&other)),
            )),
        }
    }

    fn json_type(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

type Slot = Arc<Mutex<Option<Arc<ModelBundle>>>>;

/// Per-path bundle cache.
///
/// Each path owns a slot guarded by its own lock, so concurrent first requests
/// for one artifact perform a single read while other paths load
/// independently. Failed loads are not cached: the empty slot is dropped and
/// the next request reads storage again.
#[derive(Debug, Default)]
pub struct BundleCache {
    slots: DashMap<PathBuf, Slot>,
}

impl BundleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached bundle for `path`, loading it on first use.
    ///
    /// The fallback schema only matters for the load that populates the slot.
    pub fn load(
        &self,
        path: &Path,
        fallback_schema: Option<&FeatureSchema>,
    ) -> Result<Arc<ModelBundle>, PredictError> {
        let key = cache_key(path);
        let slot = Arc::clone(self.slots.entry(key.clone()).or_default().value());

        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bundle) = guard.as_ref() {
            log::debug!("Model bundle cache hit for {}", path.display());
            return Ok(Arc::clone(bundle));
        }

        match ModelBundle::load(path, fallback_schema) {
            Ok(bundle) => {
                let bundle = Arc::new(bundle);
                *guard = Some(Arc::clone(&bundle));
                Ok(bundle)
            }
            Err(e) => {
                log::warn!("Failed to load model bundle {}: {e}", path.display());
                drop(guard);
                self.discard_empty_slot(&key, &slot);
                Err(e)
            }
        }
    }

    // A slot another caller is still loading into is left in place.
    fn discard_empty_slot(&self, key: &Path, slot: &Slot) {
        self.slots.remove_if(key, |_, current| {
            Arc::ptr_eq(current, slot) && current.try_lock().is_ok_and(|guard| guard.is_none())
        });
    }

    /// The cached bundle for `path`, if one has been loaded.
    pub fn get(&self, path: &Path) -> Option<Arc<ModelBundle>> {
        let slot = self.slots.get(&cache_key(path)).map(|s| Arc::clone(s.value()))?;
        let guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map(Arc::clone)
    }

    /// Drops the cached bundle for `path`; the next load re-reads storage.
    pub fn invalidate(&self, path: &Path) -> bool {
        let removed = self.slots.remove(&cache_key(path)).is_some();
        if !removed {
            log::warn!("No cached model bundle to invalidate for {}", path.display());
        }
        removed
    }

    pub fn clear(&self) {
        self.slots.clear();
    }

    /// Number of successfully loaded bundles.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .is_some()
            })
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Lexical only: the key must not change when the file disappears.
fn cache_key(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

static GLOBAL_CACHE: OnceLock<BundleCache> = OnceLock::new();

/// The process-wide cache behind [`load_bundle`].
pub fn global_cache() -> &'static BundleCache {
    GLOBAL_CACHE.get_or_init(BundleCache::new)
}

/// Loads `path` through the process-wide cache.
pub fn load_bundle(
    path: &Path,
    fallback_schema: Option<&FeatureSchema>,
) -> Result<Arc<ModelBundle>, PredictError> {
    global_cache().load(path, fallback_schema)
}
