//! Per-request inference over the model registry

use crate::error::{AdapterError, EstimatorError};
use crate::feature_aligner::{FeatureRecord, SchemaAligner};
use crate::models::artifact::RUNTIME_LIBRARY_VERSION;
use crate::models::confidence::ConfidencePolicy;
use crate::models::registry::{LoadedModel, ModelRegistry};
use crate::types::prediction::PredictionResult;
use std::sync::Arc;
use tracing::{debug, error};

/// Ties registry lookup, schema alignment, prediction, label mapping and
/// confidence scoring together. Cheap to clone and safe to share across
/// request handlers.
#[derive(Debug, Clone)]
pub struct InferenceAdapter {
    registry: Arc<ModelRegistry>,
}

impl InferenceAdapter {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Classify one record with the model named by `selector`.
    pub fn predict(
        &self,
        selector: &str,
        record: &FeatureRecord,
    ) -> Result<PredictionResult, AdapterError> {
        let model = self.registry.get(selector)?;

        let row = SchemaAligner::align(record, &model.artifact);
        debug!(
            model = %selector,
            features = row.len(),
            missing = row.missing_count(),
            "Aligned feature row"
        );
        let dense = row.to_dense();

        let raw = model.artifact.predict(&dense).map_err(|e| {
            error!(model = %selector, error = %e, "Prediction failed");
            prediction_failure(model, e)
        })?;

        let label = model.mapper.map(&raw);
        let confidence = ConfidencePolicy::score(&model.artifact, model.capability, &dense);

        debug!(
            model = %selector,
            raw = %raw,
            label = %label,
            confidence = confidence,
            "Prediction complete"
        );

        Ok(PredictionResult { label, confidence })
    }
}

fn prediction_failure(model: &LoadedModel, err: EstimatorError) -> AdapterError {
    let message = err.to_string();
    let hint = match err {
        EstimatorError::MissingAttribute { .. } => Some(format!(
            "model '{}' was serialized by library version {} and the runtime implements {}; \
             check GET /diagnostics/versions and re-export the artifact",
            model.selector,
            model.library_version(),
            RUNTIME_LIBRARY_VERSION
        )),
        EstimatorError::MissingValue { .. } => Some(
            "the model has no imputation step; supply every feature it was trained on".to_string(),
        ),
        _ => None,
    };
    AdapterError::PredictionFailure { message, hint }
}
