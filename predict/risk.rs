use std::fmt;

use serde::{Deserialize, Serialize};

/// Probabilities below this are [`RiskTier::Low`].
pub const MEDIUM_RISK_THRESHOLD: f64 = 0.30;
/// Probabilities at or above this are [`RiskTier::High`].
pub const HIGH_RISK_THRESHOLD: f64 = 0.70;

const LOW_RISK_ADVICE: &str = "Low risk. Keep a balanced diet, stay physically active and \
     continue routine check-ups.";
const MEDIUM_RISK_ADVICE: &str = "Moderate risk. Improve your diet, exercise regularly and \
     monitor your health indicators closely.";
const HIGH_RISK_ADVICE: &str = "High risk. Consult a doctor immediately.";

const POSITIVE_ADVICE: &str = "The condition is likely present. Consult a doctor immediately.";
const NEGATIVE_ADVICE: &str =
    "The condition is unlikely to be present. Maintain a healthy lifestyle.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn from_probability(probability: f64) -> Self {
        if probability >= HIGH_RISK_THRESHOLD {
            RiskTier::High
        } else if probability >= MEDIUM_RISK_THRESHOLD {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }

    pub fn narrative(self) -> &'static str {
        match self {
            RiskTier::Low => LOW_RISK_ADVICE,
            RiskTier::Medium => MEDIUM_RISK_ADVICE,
            RiskTier::High => HIGH_RISK_ADVICE,
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RiskTier::Low => "Low",
            RiskTier::Medium => "Medium",
            RiskTier::High => "High",
        };
        f.write_str(name)
    }
}

/// Buckets a positive-class probability and returns the matching advice.
///
/// Lower bounds are inclusive: `0.30` is Medium and `0.70` is High.
pub fn categorize(probability: f64) -> (RiskTier, &'static str) {
    let tier = RiskTier::from_probability(probability);
    (tier, tier.narrative())
}

/// Advice for classifiers that only produce a label.
pub fn binary_narrative(label: bool) -> &'static str {
    if label { POSITIVE_ADVICE } else { NEGATIVE_ADVICE }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_boundaries_are_inclusive_on_the_lower_bound() {
        assert_eq!(categorize(0.0).0, RiskTier::Low);
        assert_eq!(categorize(0.29999).0, RiskTier::Low);
        assert_eq!(categorize(0.30000).0, RiskTier::Medium);
        assert_eq!(categorize(0.69999).0, RiskTier::Medium);
        assert_eq!(categorize(0.70000).0, RiskTier::High);
        assert_eq!(categorize(1.0).0, RiskTier::High);
    }

    #[test]
    fn high_risk_asks_for_a_doctor() {
        let (tier, advice) = categorize(0.91);
        assert_eq!(tier, RiskTier::High);
        assert!(advice.contains("doctor immediately"));
        assert!(!categorize(0.1).1.contains("immediately"));
    }

    #[test]
    fn narratives_do_not_depend_on_the_exact_probability() {
        assert_eq!(categorize(0.31).1, categorize(0.69).1);
        assert_ne!(binary_narrative(true), binary_narrative(false));
    }
}
