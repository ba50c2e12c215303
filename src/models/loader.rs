//! Model artifact loader

use crate::error::LoadError;
use crate::models::artifact::ModelArtifact;
use crate::models::confidence::Capability;
use crate::models::patcher::{CompatibilityPatcher, PatchReport};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Artifact that passed patching and validation, not yet bound to a label
/// vocabulary.
#[derive(Debug, Clone)]
pub struct PreparedArtifact {
    pub selector: String,
    pub path: Option<PathBuf>,
    pub artifact: ModelArtifact,
    pub capability: Capability,
    pub patch_report: PatchReport,
}

/// Loader for serialized estimator graphs
pub struct ModelLoader {
    patcher: CompatibilityPatcher,
}

impl ModelLoader {
    pub fn new() -> Self {
        Self {
            patcher: CompatibilityPatcher::new(),
        }
    }

    /// Read and deserialize one artifact file
    pub fn read_artifact<P: AsRef<Path>>(path: P) -> Result<ModelArtifact, LoadError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        ModelArtifact::from_json(&json).map_err(|source| LoadError::Deserialize {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load a single artifact from file
    pub fn load_model<P: AsRef<Path>>(
        &self,
        path: P,
        selector: &str,
    ) -> Result<PreparedArtifact, LoadError> {
        let path = path.as_ref();
        info!(model = %selector, path = %path.display(), "Loading model artifact");

        let artifact = Self::read_artifact(path)?;
        let mut prepared = self.prepare(selector, artifact)?;
        prepared.path = Some(path.to_path_buf());
        Ok(prepared)
    }

    /// Patch, validate and classify an already deserialized artifact
    pub fn prepare(
        &self,
        selector: &str,
        mut artifact: ModelArtifact,
    ) -> Result<PreparedArtifact, LoadError> {
        let patch_report = self.patcher.patch(&mut artifact);
        for failure in &patch_report.failures {
            debug!(model = %selector, error = %failure, "Patching skipped part of the graph");
        }
        if !patch_report.is_clean() {
            info!(
                model = %selector,
                visited = patch_report.visited,
                patched = patch_report.patched.len(),
                failures = patch_report.failures.len(),
                "Artifact patched for the current runtime"
            );
        }

        artifact.validate().map_err(|reason| LoadError::Malformed {
            model: selector.to_string(),
            reason,
        })?;

        if artifact.classes().is_none() {
            return Err(LoadError::NotAClassifier {
                model: selector.to_string(),
            });
        }

        let capability = Capability::classify(&artifact);
        if artifact.version_skew() {
            warn!(
                model = %selector,
                library_version = %artifact.library_version,
                "Artifact was serialized by a different library version"
            );
        }

        info!(
            model = %selector,
            nodes = artifact.nodes.len(),
            capability = capability.as_str(),
            patched = patch_report.patched.len(),
            "Model artifact ready"
        );

        Ok(PreparedArtifact {
            selector: selector.to_string(),
            path: None,
            artifact,
            capability,
            patch_report,
        })
    }

    /// Load every configured artifact. Any failure aborts the whole load.
    pub fn load_all_models<P: AsRef<Path>>(
        &self,
        models_dir: P,
        artifacts: &BTreeMap<String, String>,
    ) -> Result<Vec<PreparedArtifact>, LoadError> {
        let models_dir = models_dir.as_ref();
        if artifacts.is_empty() {
            return Err(LoadError::NoModels);
        }

        let models = artifacts
            .iter()
            .map(|(selector, filename)| self.load_model(models_dir.join(filename), selector))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            count = models.len(),
            "Loaded {} models from {}",
            models.len(),
            models_dir.display()
        );

        Ok(models)
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::artifact::{Estimator, Node};
    use crate::models::testing;
    use std::io::Write;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) {
        let mut file = fs::File::create(dir.path().join(name)).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn test_load_patches_stale_artifact() {
        let dir = TempDir::new().unwrap();
        let mut artifact = testing::forest(&["a", "b", "c"]);
        artifact.library_version = "1.2.2".to_string();
        for node in &mut artifact.nodes {
            node.attrs.clear();
        }
        write(&dir, "rf.json", &artifact.to_json_pretty().unwrap());

        let loaded = ModelLoader::new()
            .load_model(dir.path().join("rf.json"), "rf")
            .unwrap();

        assert_eq!(loaded.patch_report.patched.len(), 3);
        assert!(!loaded.patch_report.is_clean());
        assert!(loaded.artifact.version_skew());
        assert!(loaded.artifact.predict(&[1.0]).is_ok());
        assert_eq!(loaded.path, Some(dir.path().join("rf.json")));
    }

    #[test]
    fn test_current_artifact_needs_no_patching() {
        let loaded = ModelLoader::new()
            .prepare("rf", testing::forest(&["a", "b", "c"]))
            .unwrap();
        assert!(loaded.patch_report.is_clean());
        assert!(!loaded.artifact.version_skew());
        assert_eq!(loaded.path, None);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = ModelLoader::new()
            .load_model(dir.path().join("absent.json"), "lr")
            .unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn test_garbage_is_deserialize_error() {
        let dir = TempDir::new().unwrap();
        write(&dir, "lr.json", "{ not json");
        let err = ModelLoader::new()
            .load_model(dir.path().join("lr.json"), "lr")
            .unwrap_err();
        assert!(matches!(err, LoadError::Deserialize { .. }));
    }

    #[test]
    fn test_non_classifier_rejected() {
        let artifact = testing::single(Node::new(Estimator::StandardScaler {
            mean: None,
            scale: None,
            feature_names_in: None,
        }));
        let err = ModelLoader::new().prepare("scaler", artifact).unwrap_err();
        assert!(matches!(err, LoadError::NotAClassifier { .. }));
    }

    #[test]
    fn test_malformed_graph_rejected() {
        let mut artifact = testing::forest(&["a", "b", "c"]);
        if let Estimator::RandomForestClassifier { fitted, .. } = &mut artifact.nodes[0].estimator {
            fitted.push(crate::models::artifact::NodeId(9));
        }
        let err = ModelLoader::new().prepare("rf", artifact).unwrap_err();
        assert!(matches!(err, LoadError::Malformed { .. }));
    }

    #[test]
    fn test_load_all_is_all_or_nothing() {
        let dir = TempDir::new().unwrap();
        let artifact = testing::forest(&["a", "b", "c"]);
        write(&dir, "rf.json", &artifact.to_json_pretty().unwrap());

        let mut artifacts = BTreeMap::new();
        artifacts.insert("rf".to_string(), "rf.json".to_string());
        let loaded = ModelLoader::new()
            .load_all_models(dir.path(), &artifacts)
            .unwrap();
        assert_eq!(loaded.len(), 1);

        artifacts.insert("lr".to_string(), "missing.json".to_string());
        assert!(ModelLoader::new()
            .load_all_models(dir.path(), &artifacts)
            .is_err());

        assert!(matches!(
            ModelLoader::new().load_all_models(dir.path(), &BTreeMap::new()),
            Err(LoadError::NoModels)
        ));
    }
}
