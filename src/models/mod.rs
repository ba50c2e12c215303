//! Model loading, compatibility patching and inference

pub mod aggregator;
pub mod artifact;
pub mod confidence;
pub mod estimators;
pub mod inference;
pub mod labels;
pub mod loader;
pub mod patcher;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregator::ScoreAggregator;
pub use artifact::{ClassLabel, ModelArtifact, RUNTIME_LIBRARY_VERSION};
pub use confidence::{Capability, ConfidencePolicy};
pub use inference::InferenceAdapter;
pub use labels::LabelMapper;
pub use loader::ModelLoader;
pub use patcher::{CompatibilityPatcher, PatchReport};
pub use registry::{LoadedModel, ModelRegistry};
