//! Error types for model loading, estimator evaluation and request handling

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors raised while building the model registry at startup.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no model artifacts configured")]
    NoModels,

    #[error("invalid canonical label vocabulary: {0}")]
    InvalidVocabulary(String),

    #[error("failed to read model artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to deserialize model artifact {path}: {source}")]
    Deserialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed model artifact '{model}': {reason}")]
    Malformed { model: String, reason: String },

    #[error("model '{model}' is not a classifier: artifact exposes no class labels")]
    NotAClassifier { model: String },

    #[error(
        "model '{model}' exposes {found} distinct classes but {expected} canonical labels are configured"
    )]
    ClassCountMismatch {
        model: String,
        found: usize,
        expected: usize,
    },
}

/// Errors raised by the estimator runtime while evaluating a model graph.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EstimatorError {
    /// Attribute the runtime reads is absent from the deserialized node.
    #[error("'{estimator}' object has no attribute '{attribute}'")]
    MissingAttribute {
        estimator: &'static str,
        attribute: &'static str,
    },

    #[error("'{estimator}' has no {capability}")]
    Unsupported {
        estimator: &'static str,
        capability: &'static str,
    },

    #[error("{estimator} expects {expected} features, got {found}")]
    FeatureCount {
        estimator: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Input X contains NaN; {estimator} does not accept missing values encoded as NaN")]
    MissingValue { estimator: &'static str },

    #[error("{estimator} is malformed: {reason}")]
    Malformed {
        estimator: &'static str,
        reason: String,
    },

    #[error("node {0} does not exist in the model graph")]
    DanglingNode(usize),
}

/// Per-node failure while patching a model graph. Never fatal.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PatchError {
    #[error("relation '{relation}' of node {from} points to missing node {to}")]
    DanglingReference {
        relation: &'static str,
        from: usize,
        to: usize,
    },

    #[error("root node {0} does not exist")]
    MissingRoot(usize),
}

/// Per-request errors surfaced at the adapter boundary.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid model selector '{selector}', expected one of: {}", .known.join(", "))]
    InvalidSelector { selector: String, known: Vec<String> },

    #[error("prediction failed: {message}")]
    PredictionFailure {
        message: String,
        hint: Option<String>,
    },
}

/// Errors reading the listing dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to open dataset {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to read dataset row: {0}")]
    Read(#[from] csv::Error),

    #[error("dataset is missing required column '{0}'")]
    MissingColumn(&'static str),
}
