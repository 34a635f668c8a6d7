use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use approx::assert_abs_diff_eq;
use serde_json::json;
use tempfile::{TempDir, tempdir};

use clinpredict::bundle::{BundleCache, NamedArtifact};
use clinpredict::config::AppConfig;
use clinpredict::model::{ClassifierSpec, ScalerSpec, TreeNode};
use clinpredict::pipeline::Predictor;
use clinpredict::record::PatientRecord;
use clinpredict::risk::RiskTier;
use clinpredict::schema::Disease;
use clinpredict::{ErrorKind, FieldValue};

fn write_json(dir: &TempDir, name: &str, value: &serde_json::Value) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, value.to_string()).expect("write artifact");
    path
}

fn predictor_for(disease: Disease, path: &Path) -> Predictor {
    let mut predictor = Predictor::with_cache(Arc::new(BundleCache::new()));
    predictor.register(disease, path);
    predictor
}

/// Standardization and logistic weights over the 13 heart features.
fn heart_artifact() -> serde_json::Value {
    let mut mean = vec![0.0; 13];
    let mut scale = vec![1.0; 13];
    let mut coefficients = vec![0.0; 13];
    // age, cp, trestbps, chol, thalach, oldpeak
    for (index, m, s, w) in [
        (0, 54.0, 9.0, 0.5),
        (2, 0.0, 1.0, 0.3),
        (3, 130.0, 15.0, 0.2),
        (4, 240.0, 50.0, 0.1),
        (7, 150.0, 20.0, 0.0),
        (9, 1.0, 1.0, 0.4),
    ] {
        mean[index] = m;
        scale[index] = s;
        coefficients[index] = w;
    }
    json!([
        { "kind": "logistic_regression", "coefficients": coefficients, "intercept": -0.5 },
        { "kind": "standard", "mean": mean, "scale": scale }
    ])
}

fn heart_record() -> PatientRecord {
    PatientRecord::new()
        .with("age", 63.0)
        .with("sex", 1.0)
        .with("cp", 3.0)
        .with("trestbps", 145.0)
        .with("chol", 233.0)
        .with("fbs", 1.0)
        .with("restecg", 0.0)
        .with("thalach", 150.0)
        .with("exang", 0.0)
        .with("oldpeak", 2.3)
        .with("slope", 0.0)
        .with("ca", 0.0)
        .with("thal", 1.0)
}

/// Standardizes the six weighted fields by hand and applies the linear rule.
fn hand_computed_probability(age: f64, cp: f64, trestbps: f64, chol: f64, oldpeak: f64) -> f64 {
    let standardized = [
        (age - 54.0) / 9.0,
        cp,
        (trestbps - 130.0) / 15.0,
        (chol - 240.0) / 50.0,
        oldpeak - 1.0,
    ];
    let weights = [0.5, 0.3, 0.2, 0.1, 0.4];
    let eta: f64 = standardized
        .iter()
        .zip(weights)
        .map(|(z, w)| z * w)
        .sum::<f64>()
        - 0.5;
    1.0 / (1.0 + (-eta).exp())
}

#[test]
fn heart_prediction_matches_hand_computed_standardization() {
    let dir = tempdir().unwrap();
    let path = write_json(&dir, "heart.json", &heart_artifact());
    let predictor = predictor_for(Disease::Heart, &path);

    let outcome = predictor.predict(Disease::Heart, &heart_record()).unwrap();
    let expected = hand_computed_probability(63.0, 3.0, 145.0, 233.0, 2.3);

    let result = outcome.result;
    assert!(result.label);
    assert_abs_diff_eq!(result.probability.unwrap(), expected, epsilon = 1e-9);
    assert_eq!(result.risk_tier, Some(RiskTier::High));
    assert!(result.narrative.contains("doctor"));
    assert_eq!(outcome.aligned.len(), 13);
}

#[test]
fn reference_heart_patient_follows_the_linear_decision_rule() {
    let dir = tempdir().unwrap();
    let path = write_json(&dir, "heart.json", &heart_artifact());
    let predictor = predictor_for(Disease::Heart, &path);

    let record = PatientRecord::new()
        .with("age", 52.0)
        .with("sex", 1.0)
        .with("cp", 0.0)
        .with("trestbps", 120.0)
        .with("chol", 240.0)
        .with("fbs", 0.0)
        .with("restecg", 1.0)
        .with("thalach", 150.0)
        .with("exang", 0.0)
        .with("oldpeak", 1.2)
        .with("slope", 1.0)
        .with("ca", 0.0)
        .with("thal", 2.0);
    let outcome = predictor.predict(Disease::Heart, &record).unwrap();

    // eta = -2/9 * 0.5 - 10/15 * 0.2 + 0.2 * 0.4 - 0.5, about -0.664
    let expected = hand_computed_probability(52.0, 0.0, 120.0, 240.0, 1.2);
    let result = outcome.result;
    assert_abs_diff_eq!(result.probability.unwrap(), expected, epsilon = 1e-9);
    assert_eq!(result.label, expected > 0.5);
    assert!(!result.label);
    assert_eq!(result.risk_tier, Some(RiskTier::Medium));
    assert_eq!(outcome.aligned[6], 1.0);
    assert_eq!(outcome.aligned[12], 2.0);
}

#[test]
fn missing_field_behaves_like_an_explicit_zero() {
    let dir = tempdir().unwrap();
    let path = write_json(&dir, "heart.json", &heart_artifact());
    let predictor = predictor_for(Disease::Heart, &path);

    let mut without_fbs = heart_record();
    without_fbs.remove("fbs");
    let explicit_zero = heart_record().with("fbs", 0.0);

    let a = predictor.predict(Disease::Heart, &without_fbs).unwrap();
    let b = predictor.predict(Disease::Heart, &explicit_zero).unwrap();
    assert_eq!(a.aligned[5], 0.0);
    assert_eq!(a, b);
}

#[test]
fn corrupt_artifact_is_reported_not_raised() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("liver.json");
    fs::write(&path, b"{\"classifier\": {\"kind\": \"logistic_regression\", ").unwrap();
    let predictor = predictor_for(Disease::Liver, &path);

    let err = predictor
        .predict(Disease::Liver, &PatientRecord::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CorruptArtifact);

    let response = predictor.respond(Disease::Liver, &PatientRecord::new());
    let report = response.error.expect("error attached");
    assert_eq!(report.code, "corrupt_artifact");
    assert_eq!(response.label, None);
}

#[test]
fn kidney_categorical_answers_reach_the_model_encoded() {
    let dir = tempdir().unwrap();
    let schema = Disease::Kidney.default_schema();
    let htn = schema.position("htn").unwrap();
    let dm = schema.position("dm").unwrap();

    let mut coefficients = vec![0.0; 24];
    coefficients[htn] = 2.0;
    coefficients[dm] = 5.0;
    let artifact = json!([
        { "kind": "logistic_regression", "coefficients": coefficients, "intercept": -1.0 },
        { "kind": "identity", "dimensionality": 24 }
    ]);
    let path = write_json(&dir, "kidney.json", &artifact);
    let predictor = predictor_for(Disease::Kidney, &path);

    let record = PatientRecord::new()
        .with("htn", "yes")
        .with("dm", "no")
        .with("age", 48.0);
    let outcome = predictor.predict(Disease::Kidney, &record).unwrap();
    assert_eq!(outcome.aligned[htn], 1.0);
    assert_eq!(outcome.aligned[dm], 0.0);
    assert_abs_diff_eq!(
        outcome.result.probability.unwrap(),
        1.0 / (1.0 + (-1.0f64).exp()),
        epsilon = 1e-12
    );
    assert_eq!(outcome.result.risk_tier, Some(RiskTier::High));

    let malformed = record.with("htn", "sometimes");
    let err = predictor.predict(Disease::Kidney, &malformed).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidFieldValue);
}

#[test]
fn repeated_loads_share_one_bundle() {
    let dir = tempdir().unwrap();
    let path = write_json(&dir, "heart.json", &heart_artifact());
    let predictor = predictor_for(Disease::Heart, &path);

    let first = predictor.bundle(Disease::Heart).unwrap();
    let second = predictor.bundle(Disease::Heart).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let record = heart_record();
    let baseline = predictor.predict(Disease::Heart, &record).unwrap();
    for _ in 0..5 {
        assert_eq!(predictor.predict(Disease::Heart, &record).unwrap(), baseline);
    }
}

#[test]
fn separate_caches_load_identical_parameters() {
    let dir = tempdir().unwrap();
    let path = write_json(&dir, "heart.json", &heart_artifact());
    let first = predictor_for(Disease::Heart, &path);
    let second = predictor_for(Disease::Heart, &path);

    let a = first.bundle(Disease::Heart).unwrap();
    let b = second.bundle(Disease::Heart).unwrap();
    assert!(!Arc::ptr_eq(&a, &b));

    let records = [
        heart_record(),
        heart_record().with("age", 41.0).with("oldpeak", 0.0),
        PatientRecord::new(),
    ];
    for record in &records {
        assert_eq!(
            first.predict(Disease::Heart, record).unwrap(),
            second.predict(Disease::Heart, record).unwrap()
        );
    }
}

#[test]
fn configured_toml_forest_predicts_through_the_facade() {
    let dir = tempdir().unwrap();
    // Two stumps on glucose; the second is stricter.
    let stump = |threshold: f64| {
        vec![
            TreeNode::split(1, threshold, 1, 2),
            TreeNode::leaf(0.1),
            TreeNode::leaf(0.9),
        ]
    };
    let artifact = NamedArtifact {
        feature_schema: Some(Disease::Diabetes.default_schema()),
        schema_version: Some("1".into()),
        disease: Some("diabetes".into()),
        classifier: ClassifierSpec::RandomForest {
            n_features: 8,
            trees: vec![stump(120.0), stump(160.0)],
        },
        scaler: ScalerSpec::Identity { dimensionality: 8 },
    };
    artifact.save(&dir.path().join("diabetes.toml")).unwrap();
    fs::write(
        dir.path().join("clinpredict.toml"),
        "[models]\ndiabetes = \"diabetes.toml\"\n",
    )
    .unwrap();

    let config = AppConfig::load(&dir.path().join("clinpredict.toml")).unwrap();
    let predictor = Predictor::from_config(&config);

    let mid = PatientRecord::new().with("glucose", FieldValue::Text("148".into()));
    let result = predictor.predict(Disease::Diabetes, &mid).unwrap().result;
    assert_abs_diff_eq!(result.probability.unwrap(), 0.5, epsilon = 1e-12);
    assert!(!result.label);
    assert_eq!(result.risk_tier, Some(RiskTier::Medium));

    let high = PatientRecord::new().with("glucose", 190.0);
    let result = predictor.predict(Disease::Diabetes, &high).unwrap().result;
    assert!(result.label);
    assert_eq!(result.risk_tier, Some(RiskTier::High));

    let err = predictor
        .predict(Disease::Heart, &PatientRecord::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn batch_prediction_keeps_failures_in_place() {
    let dir = tempdir().unwrap();
    let path = write_json(&dir, "heart.json", &heart_artifact());
    let predictor = predictor_for(Disease::Heart, &path);

    let records = vec![
        heart_record(),
        heart_record().with("sex", "unknown"),
        PatientRecord::new(),
    ];
    let outcomes = predictor.predict_batch(Disease::Heart, &records).unwrap();
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].is_ok());
    assert_eq!(
        outcomes[1].as_ref().unwrap_err().kind(),
        ErrorKind::InvalidFieldValue
    );
    assert!(outcomes[2].is_ok());
}
