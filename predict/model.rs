//! Fitted scalers and classifiers.
//!
//! Both halves of a bundle are trait objects so that any fitted transform or
//! predictor can be plugged in, but the persisted forms are plain serde
//! documents: a `kind` tag plus the parameters captured at fit time. Nothing in
//! this module ever fits; every transform is a pure function of stored
//! parameters.

use std::fmt;

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by a scaler or classifier while transforming or predicting.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model expects {expected} features, received {found}.")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("Non-finite value at feature position {index}.")]
    NonFiniteValue { index: usize },
    #[error("Model produced a non-finite score.")]
    NonFiniteScore,
    #[error("Model produced probability {0}, outside [0, 1].")]
    ProbabilityOutOfRange(f64),
    #[error("Invalid model parameters: {0}")]
    InvalidParameters(String),
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// A fitted, read-only normalization transform.
pub trait Scaler: fmt::Debug + Send + Sync {
    /// Number of features the transform was fitted on.
    fn dimensionality(&self) -> usize;

    fn transform(&self, x: ArrayView1<f64>) -> Result<Array1<f64>, ModelError>;
}

/// Label and optional probability derived from one normalized vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub label: bool,
    pub probability: Option<f64>,
}

/// A fitted binary classifier.
pub trait Classifier: fmt::Debug + Send + Sync {
    fn dimensionality(&self) -> usize;

    fn predict(&self, x: ArrayView1<f64>) -> Result<bool, ModelError>;

    /// Probability of the positive class, for models that estimate one.
    fn predict_probability(&self, x: ArrayView1<f64>) -> Option<Result<f64, ModelError>> {
        let _ = x;
        None
    }

    /// Label and probability from the same input, in one call.
    fn decide(&self, x: ArrayView1<f64>) -> Result<Decision, ModelError> {
        let label = self.predict(x)?;
        let probability = self.predict_probability(x).transpose()?;
        Ok(Decision { label, probability })
    }
}

fn check_input(x: ArrayView1<f64>, expected: usize) -> Result<(), ModelError> {
    if x.len() != expected {
        return Err(ModelError::DimensionMismatch {
            expected,
            found: x.len(),
        });
    }
    match x.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(ModelError::NonFiniteValue { index }),
        None => Ok(()),
    }
}

fn check_finite_params(what: &str, values: &[f64]) -> Result<(), ModelError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(ModelError::InvalidParameters(format!(
            "{what} contains non-finite values"
        )))
    }
}

fn sigmoid(z: f64) -> f64 {
    let z = z.clamp(-700.0, 700.0);
    1.0 / (1.0 + f64::exp(-z))
}

// --- Scalers ---

/// Standardization with stored per-feature mean and scale.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    /// A zero scale (constant training column) divides by one instead.
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self, ModelError> {
        if mean.is_empty() || mean.len() != scale.len() {
            return Err(ModelError::InvalidParameters(format!(
                "standard scaler has {} means and {} scales",
                mean.len(),
                scale.len()
            )));
        }
        check_finite_params("scaler mean", &mean)?;
        check_finite_params("scaler scale", &scale)?;
        let scale = scale
            .into_iter()
            .map(|s| if s == 0.0 { 1.0 } else { s })
            .collect();
        Ok(StandardScaler {
            mean: Array1::from_vec(mean),
            scale,
        })
    }
}

impl Scaler for StandardScaler {
    fn dimensionality(&self) -> usize {
        self.mean.len()
    }

    fn transform(&self, x: ArrayView1<f64>) -> Result<Array1<f64>, ModelError> {
        check_input(x, self.dimensionality())?;
        Ok((&x - &self.mean) / &self.scale)
    }
}

/// Min-max rescaling onto a target range.
#[derive(Debug, Clone)]
pub struct MinMaxScaler {
    data_min: Array1<f64>,
    range: Array1<f64>,
    target: (f64, f64),
}

impl MinMaxScaler {
    pub fn new(
        data_min: Vec<f64>,
        data_max: Vec<f64>,
        target: (f64, f64),
    ) -> Result<Self, ModelError> {
        if data_min.is_empty() || data_min.len() != data_max.len() {
            return Err(ModelError::InvalidParameters(format!(
                "min-max scaler has {} minima and {} maxima",
                data_min.len(),
                data_max.len()
            )));
        }
        check_finite_params("scaler minima", &data_min)?;
        check_finite_params("scaler maxima", &data_max)?;
        if !(target.0.is_finite() && target.1.is_finite() && target.0 < target.1) {
            return Err(ModelError::InvalidParameters(format!(
                "feature range ({}, {}) is not increasing",
                target.0, target.1
            )));
        }
        let range = data_min
            .iter()
            .zip(&data_max)
            .map(|(lo, hi)| if hi == lo { 1.0 } else { hi - lo })
            .collect();
        Ok(MinMaxScaler {
            data_min: Array1::from_vec(data_min),
            range,
            target,
        })
    }
}

impl Scaler for MinMaxScaler {
    fn dimensionality(&self) -> usize {
        self.data_min.len()
    }

    fn transform(&self, x: ArrayView1<f64>) -> Result<Array1<f64>, ModelError> {
        check_input(x, self.dimensionality())?;
        let (lo, hi) = self.target;
        Ok((&x - &self.data_min) / &self.range * (hi - lo) + lo)
    }
}

/// Pass-through for classifiers fitted on raw features.
#[derive(Debug, Clone)]
pub struct IdentityScaler {
    dimensionality: usize,
}

impl IdentityScaler {
    pub fn new(dimensionality: usize) -> Result<Self, ModelError> {
        if dimensionality == 0 {
            return Err(ModelError::InvalidParameters(
                "identity scaler needs at least one feature".into(),
            ));
        }
        Ok(IdentityScaler { dimensionality })
    }
}

impl Scaler for IdentityScaler {
    fn dimensionality(&self) -> usize {
        self.dimensionality
    }

    fn transform(&self, x: ArrayView1<f64>) -> Result<Array1<f64>, ModelError> {
        check_input(x, self.dimensionality)?;
        Ok(x.to_owned())
    }
}

// --- Classifiers ---

/// Linear decision function `w . x + b`.
#[derive(Debug, Clone)]
struct LinearDecision {
    coefficients: Array1<f64>,
    intercept: f64,
}

impl LinearDecision {
    fn new(coefficients: Vec<f64>, intercept: f64) -> Result<Self, ModelError> {
        if coefficients.is_empty() {
            return Err(ModelError::InvalidParameters(
                "linear model has no coefficients".into(),
            ));
        }
        check_finite_params("coefficients", &coefficients)?;
        check_finite_params("intercept", &[intercept])?;
        Ok(LinearDecision {
            coefficients: Array1::from_vec(coefficients),
            intercept,
        })
    }

    fn score(&self, x: ArrayView1<f64>) -> Result<f64, ModelError> {
        check_input(x, self.coefficients.len())?;
        let eta = self.coefficients.dot(&x) + self.intercept;
        if eta.is_finite() {
            Ok(eta)
        } else {
            Err(ModelError::NonFiniteScore)
        }
    }
}

/// Logistic regression: label from the sign of the decision function,
/// probability from its sigmoid.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    decision: LinearDecision,
}

impl LogisticRegression {
    pub fn new(coefficients: Vec<f64>, intercept: f64) -> Result<Self, ModelError> {
        Ok(LogisticRegression {
            decision: LinearDecision::new(coefficients, intercept)?,
        })
    }

    pub fn decision_function(&self, x: ArrayView1<f64>) -> Result<f64, ModelError> {
        self.decision.score(x)
    }
}

impl Classifier for LogisticRegression {
    fn dimensionality(&self) -> usize {
        self.decision.coefficients.len()
    }

    fn predict(&self, x: ArrayView1<f64>) -> Result<bool, ModelError> {
        Ok(self.decision.score(x)? > 0.0)
    }

    fn predict_probability(&self, x: ArrayView1<f64>) -> Option<Result<f64, ModelError>> {
        Some(self.decision.score(x).map(sigmoid))
    }

    fn decide(&self, x: ArrayView1<f64>) -> Result<Decision, ModelError> {
        let eta = self.decision.score(x)?;
        Ok(Decision {
            label: eta > 0.0,
            probability: Some(sigmoid(eta)),
        })
    }
}

/// Linear support vector classifier. Exposes a label only.
#[derive(Debug, Clone)]
pub struct LinearSvm {
    decision: LinearDecision,
}

impl LinearSvm {
    pub fn new(coefficients: Vec<f64>, intercept: f64) -> Result<Self, ModelError> {
        Ok(LinearSvm {
            decision: LinearDecision::new(coefficients, intercept)?,
        })
    }
}

impl Classifier for LinearSvm {
    fn dimensionality(&self) -> usize {
        self.decision.coefficients.len()
    }

    fn predict(&self, x: ArrayView1<f64>) -> Result<bool, ModelError> {
        Ok(self.decision.score(x)? > 0.0)
    }
}

/// One node of a flattened binary decision tree.
///
/// Split nodes carry `feature`, `threshold`, `left` and `right`; leaves carry
/// `value`, the fraction of positive training samples that reached them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<usize>,
    #[serde(default)]
    pub threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<usize>,
    #[serde(default)]
    pub value: f64,
}

impl TreeNode {
    pub fn split(feature: usize, threshold: f64, left: usize, right: usize) -> Self {
        TreeNode {
            feature: Some(feature),
            threshold,
            left: Some(left),
            right: Some(right),
            value: 0.0,
        }
    }

    pub fn leaf(value: f64) -> Self {
        TreeNode {
            feature: None,
            threshold: 0.0,
            left: None,
            right: None,
            value,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf(f64),
}

/// Decision tree over a flat node array rooted at index 0.
#[derive(Debug, Clone)]
pub struct DecisionTree {
    n_features: usize,
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Children must come after their parent in the array, which rules out
    /// cycles and bounds every descent by the node count.
    pub fn new(n_features: usize, nodes: Vec<TreeNode>) -> Result<Self, ModelError> {
        if n_features == 0 {
            return Err(ModelError::InvalidParameters(
                "decision tree needs at least one feature".into(),
            ));
        }
        if nodes.is_empty() {
            return Err(ModelError::InvalidParameters("decision tree has no nodes".into()));
        }
        let count = nodes.len();
        let invalid = |index: usize, reason: &str| {
            ModelError::InvalidParameters(format!("tree node {index}: {reason}"))
        };

        let mut compiled = Vec::with_capacity(count);
        for (index, node) in nodes.into_iter().enumerate() {
            let compiled_node = match (node.feature, node.left, node.right) {
                (Some(feature), Some(left), Some(right)) => {
                    if feature >= n_features {
                        return Err(invalid(index, "feature index out of range"));
                    }
                    if !node.threshold.is_finite() {
                        return Err(invalid(index, "threshold is not finite"));
                    }
                    if left <= index || right <= index || left >= count || right >= count {
                        return Err(invalid(index, "children must follow their parent"));
                    }
                    Node::Split {
                        feature,
                        threshold: node.threshold,
                        left,
                        right,
                    }
                }
                (None, None, None) => {
                    if !(0.0..=1.0).contains(&node.value) {
                        return Err(invalid(index, "leaf value must lie in [0, 1]"));
                    }
                    Node::Leaf(node.value)
                }
                _ => return Err(invalid(index, "split nodes need feature, left and right")),
            };
            compiled.push(compiled_node);
        }

        Ok(DecisionTree {
            n_features,
            nodes: compiled,
        })
    }

    fn leaf_value(&self, x: ArrayView1<f64>) -> f64 {
        let mut index = 0;
        loop {
            match self.nodes[index] {
                Node::Leaf(value) => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => index = if x[feature] <= threshold { left } else { right },
            }
        }
    }
}

impl Classifier for DecisionTree {
    fn dimensionality(&self) -> usize {
        self.n_features
    }

    fn predict(&self, x: ArrayView1<f64>) -> Result<bool, ModelError> {
        Ok(self.decide(x)?.label)
    }

    fn predict_probability(&self, x: ArrayView1<f64>) -> Option<Result<f64, ModelError>> {
        Some(self.decide(x).map(|d| d.probability.unwrap_or(0.0)))
    }

    fn decide(&self, x: ArrayView1<f64>) -> Result<Decision, ModelError> {
        check_input(x, self.n_features)?;
        let probability = self.leaf_value(x);
        Ok(Decision {
            label: probability > 0.5,
            probability: Some(probability),
        })
    }
}

/// Averages the positive-class probabilities of its trees.
#[derive(Debug, Clone)]
pub struct RandomForest {
    n_features: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn new(n_features: usize, trees: Vec<Vec<TreeNode>>) -> Result<Self, ModelError> {
        if trees.is_empty() {
            return Err(ModelError::InvalidParameters("random forest has no trees".into()));
        }
        let trees = trees
            .into_iter()
            .map(|nodes| DecisionTree::new(n_features, nodes))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RandomForest { n_features, trees })
    }
}

impl Classifier for RandomForest {
    fn dimensionality(&self) -> usize {
        self.n_features
    }

    fn predict(&self, x: ArrayView1<f64>) -> Result<bool, ModelError> {
        Ok(self.decide(x)?.label)
    }

    fn predict_probability(&self, x: ArrayView1<f64>) -> Option<Result<f64, ModelError>> {
        Some(self.decide(x).map(|d| d.probability.unwrap_or(0.0)))
    }

    fn decide(&self, x: ArrayView1<f64>) -> Result<Decision, ModelError> {
        check_input(x, self.n_features)?;
        let total: f64 = self.trees.iter().map(|tree| tree.leaf_value(x)).sum();
        let probability = total / self.trees.len() as f64;
        Ok(Decision {
            label: probability > 0.5,
            probability: Some(probability),
        })
    }
}

// --- Persisted forms ---

fn default_feature_range() -> (f64, f64) {
    (0.0, 1.0)
}

/// Serialized scaler parameters, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScalerSpec {
    Standard {
        mean: Vec<f64>,
        scale: Vec<f64>,
    },
    MinMax {
        data_min: Vec<f64>,
        data_max: Vec<f64>,
        #[serde(default = "default_feature_range")]
        feature_range: (f64, f64),
    },
    Identity {
        dimensionality: usize,
    },
}

impl ScalerSpec {
    pub fn build(self) -> Result<Box<dyn Scaler>, ModelError> {
        Ok(match self {
            ScalerSpec::Standard { mean, scale } => Box::new(StandardScaler::new(mean, scale)?),
            ScalerSpec::MinMax {
                data_min,
                data_max,
                feature_range,
            } => Box::new(MinMaxScaler::new(data_min, data_max, feature_range)?),
            ScalerSpec::Identity { dimensionality } => {
                Box::new(IdentityScaler::new(dimensionality)?)
            }
        })
    }
}

/// Serialized classifier parameters, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierSpec {
    LogisticRegression {
        coefficients: Vec<f64>,
        intercept: f64,
    },
    LinearSvm {
        coefficients: Vec<f64>,
        intercept: f64,
    },
    DecisionTree {
        n_features: usize,
        nodes: Vec<TreeNode>,
    },
    RandomForest {
        n_features: usize,
        trees: Vec<Vec<TreeNode>>,
    },
}

impl ClassifierSpec {
    pub fn build(self) -> Result<Box<dyn Classifier>, ModelError> {
        Ok(match self {
            ClassifierSpec::LogisticRegression {
                coefficients,
                intercept,
            } => Box::new(LogisticRegression::new(coefficients, intercept)?),
            ClassifierSpec::LinearSvm {
                coefficients,
                intercept,
            } => Box::new(LinearSvm::new(coefficients, intercept)?),
            ClassifierSpec::DecisionTree { n_features, nodes } => {
                Box::new(DecisionTree::new(n_features, nodes)?)
            }
            ClassifierSpec::RandomForest { n_features, trees } => {
                Box::new(RandomForest::new(n_features, trees)?)
            }
        })
    }
}
