//! Confidence scoring across estimator capability classes

use crate::models::aggregator::max_score;
use crate::models::artifact::{Estimator, ModelArtifact, Voting};
use crate::models::estimators::{logistic, softmax, Margin};
use serde::Serialize;
use tracing::debug;

/// What a loaded model can report beyond its predicted label. Decided once
/// at load time from the final estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "tier")]
pub enum Capability {
    /// Class probabilities; `margin_fallback` when a decision function is
    /// available too.
    Probability { margin_fallback: bool },
    /// Decision function only.
    Margin,
    /// Neither.
    Opaque,
}

impl Capability {
    pub fn classify(artifact: &ModelArtifact) -> Self {
        let Ok((_, node)) = artifact.final_estimator() else {
            return Capability::Opaque;
        };
        match &node.estimator {
            Estimator::LogisticRegression { .. } => Capability::Probability {
                margin_fallback: true,
            },
            Estimator::DecisionTreeClassifier { .. }
            | Estimator::RandomForestClassifier { .. }
            | Estimator::VotingClassifier {
                voting: Voting::Soft,
                ..
            } => Capability::Probability {
                margin_fallback: false,
            },
            Estimator::LinearSvc { .. } => Capability::Margin,
            _ => Capability::Opaque,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Probability { .. } => "probability",
            Capability::Margin => "margin",
            Capability::Opaque => "opaque",
        }
    }
}

/// Derives a single confidence in `[0, 1]` for one row.
pub struct ConfidencePolicy;

impl ConfidencePolicy {
    /// Score a row. Never fails: every tier that is unavailable or errors
    /// falls through to the next, ending at `0.0`.
    pub fn score(artifact: &ModelArtifact, capability: Capability, row: &[f64]) -> f64 {
        let raw = match capability {
            Capability::Probability { margin_fallback } => Self::probability_tier(artifact, row)
                .or_else(|| {
                    if margin_fallback {
                        Self::margin_tier(artifact, row)
                    } else {
                        None
                    }
                }),
            Capability::Margin => Self::margin_tier(artifact, row),
            Capability::Opaque => None,
        };
        sanitize(raw.unwrap_or(0.0))
    }

    fn probability_tier(artifact: &ModelArtifact, row: &[f64]) -> Option<f64> {
        match artifact.predict_proba(row) {
            Ok(probs) => max_score(&probs),
            Err(e) => {
                debug!(error = %e, "Probability tier failed");
                None
            }
        }
    }

    fn margin_tier(artifact: &ModelArtifact, row: &[f64]) -> Option<f64> {
        match artifact.decision_function(row) {
            Ok(margin) => margin_confidence(&margin),
            Err(e) => {
                debug!(error = %e, "Margin tier failed");
                None
            }
        }
    }
}

/// Binary margins map through the logistic of their absolute value,
/// multiclass margins through a softmax.
pub fn margin_confidence(margin: &Margin) -> Option<f64> {
    match margin {
        Margin::Scalar(m) => Some(logistic(m.abs())),
        Margin::Vector(scores) if scores.is_empty() => None,
        Margin::Vector(scores) => max_score(&softmax(scores)),
    }
}

/// Non-finite values become `0.0`; everything is clamped into `[0, 1]`.
pub fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
