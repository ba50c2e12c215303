//! Exoplanet Classifier Library
//!
//! Serves pre-trained Kepler Object of Interest classifiers over HTTP.
//! Artifacts serialized by an older training library are patched at load
//! time, caller records are aligned to each model's feature layout, and
//! raw class labels are mapped onto one canonical vocabulary.

pub mod api;
pub mod config;
pub mod dataset;
pub mod error;
pub mod feature_aligner;
pub mod metrics;
pub mod models;
pub mod types;

pub use config::AppConfig;
pub use error::{AdapterError, LoadError};
pub use feature_aligner::{FeatureRecord, SchemaAligner};
pub use models::{InferenceAdapter, ModelRegistry};
pub use types::{ExoplanetFeatures, PredictionResponse};
