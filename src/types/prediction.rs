//! Prediction response and error body structures

use crate::error::AdapterError;
use serde::{Deserialize, Serialize};

/// Label and confidence produced for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    /// Canonical label, or the raw label when it could not be mapped
    pub label: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
}

/// Body returned by the predict endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub prediction: String,
    /// Rounded to three decimals
    pub confidence: f64,
}

impl From<PredictionResult> for PredictionResponse {
    fn from(result: PredictionResult) -> Self {
        Self {
            prediction: result.label,
            confidence: round3(result.confidence),
        }
    }
}

fn round3(value: f64) -> f64 {
    let rounded = (value * 1000.0).round() / 1000.0;
    if rounded.is_finite() {
        rounded.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Body returned for rejected or failed requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: &str, detail: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            detail: detail.into(),
            hint: None,
        }
    }
}

impl From<&AdapterError> for ErrorResponse {
    fn from(err: &AdapterError) -> Self {
        match err {
            AdapterError::InvalidSelector { .. } => Self::new("invalid_selector", err.to_string()),
            AdapterError::PredictionFailure { message, hint } => Self {
                error: "prediction_failure".to_string(),
                detail: message.clone(),
                hint: hint.clone(),
            },
        }
    }
}
