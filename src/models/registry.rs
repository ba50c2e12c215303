//! Registry of loaded, validated models keyed by selector

use crate::config::ModelsConfig;
use crate::error::{AdapterError, LoadError};
use crate::models::artifact::{ModelArtifact, RUNTIME_LIBRARY_VERSION};
use crate::models::confidence::Capability;
use crate::models::labels::LabelMapper;
use crate::models::loader::{ModelLoader, PreparedArtifact};
use crate::models::patcher::{PatchReport, PatchedAttribute};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::info;

/// A model ready to serve requests. Immutable after load.
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub selector: String,
    /// File the artifact was read from; `None` for in-memory artifacts
    pub path: Option<PathBuf>,
    pub artifact: ModelArtifact,
    pub mapper: LabelMapper,
    pub capability: Capability,
    pub patch_report: PatchReport,
    pub loaded_at: DateTime<Utc>,
}

impl LoadedModel {
    fn bind(prepared: PreparedArtifact, canonical: &[String]) -> Result<Self, LoadError> {
        let raw = prepared
            .artifact
            .classes()
            .ok_or_else(|| LoadError::NotAClassifier {
                model: prepared.selector.clone(),
            })?;
        let mapper = LabelMapper::build(&prepared.selector, raw, canonical)?;

        for (raw, canonical) in mapper.pairs() {
            info!(model = %prepared.selector, raw = %raw, canonical = %canonical, "Label mapping");
        }

        Ok(Self {
            selector: prepared.selector,
            path: prepared.path,
            artifact: prepared.artifact,
            mapper,
            capability: prepared.capability,
            patch_report: prepared.patch_report,
            loaded_at: Utc::now(),
        })
    }

    pub fn library_version(&self) -> &str {
        &self.artifact.library_version
    }

    pub fn version_skew(&self) -> bool {
        self.artifact.version_skew()
    }
}

/// Per-model entry of the version report.
#[derive(Debug, Clone, Serialize)]
pub struct ModelVersionInfo {
    pub selector: String,
    pub library_version: String,
    pub version_skew: bool,
    pub capability: Capability,
    pub patched_attributes: Vec<PatchedAttribute>,
    pub patch_failures: Vec<String>,
    pub classes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub loaded_at: DateTime<Utc>,
}

/// Runtime version and what was done to each artifact at load.
#[derive(Debug, Clone, Serialize)]
pub struct VersionReport {
    pub runtime_version: &'static str,
    pub models: Vec<ModelVersionInfo>,
}

/// Selector-keyed table of models. Built once at startup, read-only after.
#[derive(Debug)]
pub struct ModelRegistry {
    models: BTreeMap<String, LoadedModel>,
    canonical_labels: Vec<String>,
}

impl ModelRegistry {
    /// Load every configured artifact. Any failure is fatal.
    pub fn load(config: &ModelsConfig) -> Result<Self, LoadError> {
        check_vocabulary(&config.canonical_labels)?;
        let prepared = ModelLoader::new().load_all_models(&config.models_dir, &config.artifacts)?;
        Self::from_prepared(config.canonical_labels.clone(), prepared)
    }

    /// Build from in-memory artifacts, running the same patching and
    /// validation as [`ModelRegistry::load`].
    pub fn from_artifacts(
        canonical_labels: Vec<String>,
        artifacts: Vec<(String, ModelArtifact)>,
    ) -> Result<Self, LoadError> {
        check_vocabulary(&canonical_labels)?;
        if artifacts.is_empty() {
            return Err(LoadError::NoModels);
        }
        let loader = ModelLoader::new();
        let prepared = artifacts
            .into_iter()
            .map(|(selector, artifact)| loader.prepare(&selector, artifact))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_prepared(canonical_labels, prepared)
    }

    fn from_prepared(
        canonical_labels: Vec<String>,
        prepared: Vec<PreparedArtifact>,
    ) -> Result<Self, LoadError> {
        let mut models = BTreeMap::new();
        for artifact in prepared {
            let model = LoadedModel::bind(artifact, &canonical_labels)?;
            models.insert(model.selector.clone(), model);
        }

        info!(
            models = ?models.keys().collect::<Vec<_>>(),
            labels = ?canonical_labels,
            "Model registry initialized"
        );

        Ok(Self {
            models,
            canonical_labels,
        })
    }

    /// Look up a model by selector
    pub fn get(&self, selector: &str) -> Result<&LoadedModel, AdapterError> {
        self.models
            .get(selector)
            .ok_or_else(|| AdapterError::InvalidSelector {
                selector: selector.to_string(),
                known: self.selectors(),
            })
    }

    pub fn selectors(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    pub fn canonical_labels(&self) -> &[String] {
        &self.canonical_labels
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn version_report(&self) -> VersionReport {
        let models = self
            .models
            .values()
            .map(|model| ModelVersionInfo {
                selector: model.selector.clone(),
                library_version: model.library_version().to_string(),
                version_skew: model.version_skew(),
                capability: model.capability,
                patched_attributes: model.patch_report.patched.clone(),
                patch_failures: model
                    .patch_report
                    .failures
                    .iter()
                    .map(|f| f.to_string())
                    .collect(),
                classes: model.mapper.pairs().iter().map(|(raw, _)| raw.clone()).collect(),
                path: model.path.clone(),
                loaded_at: model.loaded_at,
            })
            .collect();

        VersionReport {
            runtime_version: RUNTIME_LIBRARY_VERSION,
            models,
        }
    }
}

fn check_vocabulary(labels: &[String]) -> Result<(), LoadError> {
    if labels.is_empty() {
        return Err(LoadError::InvalidVocabulary("no canonical labels configured".to_string()));
    }
    let distinct: BTreeSet<&String> = labels.iter().collect();
    if distinct.len() != labels.len() {
        return Err(LoadError::InvalidVocabulary(format!(
            "duplicate canonical labels in {labels:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::testing;
    use tempfile::TempDir;

    fn canonical() -> Vec<String> {
        vec![
            "Candidate".to_string(),
            "Confirmed".to_string(),
            "False Positive".to_string(),
        ]
    }

    fn registry() -> ModelRegistry {
        ModelRegistry::from_artifacts(
            canonical(),
            vec![
                (
                    "lr".to_string(),
                    testing::logistic_pipeline(&["f0"], &["CANDIDATE", "CONFIRMED", "FALSE POSITIVE"]),
                ),
                (
                    "rf".to_string(),
                    testing::forest(&["FALSE POSITIVE", "CANDIDATE", "CONFIRMED"]),
                ),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_lookup_by_selector() {
        let registry = registry();
        assert_eq!(registry.selectors(), vec!["lr".to_string(), "rf".to_string()]);
        assert_eq!(registry.get("rf").unwrap().selector, "rf");
        assert_eq!(registry.canonical_labels(), canonical().as_slice());

        let err = registry.get("svm").unwrap_err();
        match err {
            AdapterError::InvalidSelector { selector, known } => {
                assert_eq!(selector, "svm");
                assert_eq!(known, vec!["lr".to_string(), "rf".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_class_count_mismatch_is_fatal() {
        let err = ModelRegistry::from_artifacts(
            canonical(),
            vec![("rf".to_string(), testing::single(testing::linear_svc(1, &["a", "b"])))],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LoadError::ClassCountMismatch {
                found: 2,
                expected: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_vocabulary() {
        let artifacts = || vec![("rf".to_string(), testing::forest(&["a", "b", "c"]))];
        assert!(matches!(
            ModelRegistry::from_artifacts(Vec::new(), artifacts()),
            Err(LoadError::InvalidVocabulary(_))
        ));
        let duplicated = vec!["A".to_string(), "A".to_string(), "B".to_string()];
        assert!(matches!(
            ModelRegistry::from_artifacts(duplicated, artifacts()),
            Err(LoadError::InvalidVocabulary(_))
        ));
        assert!(matches!(
            ModelRegistry::from_artifacts(canonical(), Vec::new()),
            Err(LoadError::NoModels)
        ));
    }

    #[test]
    fn test_version_report() {
        let mut stale = testing::forest(&["a", "b", "c"]);
        stale.library_version = "1.2.2".to_string();
        for node in &mut stale.nodes {
            node.attrs.clear();
        }
        let registry = ModelRegistry::from_artifacts(canonical(), vec![("rf".to_string(), stale)]).unwrap();

        let report = registry.version_report();
        assert_eq!(report.runtime_version, RUNTIME_LIBRARY_VERSION);
        assert_eq!(report.models.len(), 1);
        let rf = &report.models[0];
        assert!(rf.version_skew);
        assert_eq!(rf.library_version, "1.2.2");
        assert_eq!(rf.patched_attributes.len(), 3);
        assert_eq!(rf.classes, vec!["a", "b", "c"]);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["models"][0]["capability"]["tier"], "probability");
    }

    #[test]
    fn test_load_from_config() {
        let dir = TempDir::new().unwrap();
        let artifact = testing::forest(&["a", "b", "c"]);
        std::fs::write(dir.path().join("rf.json"), artifact.to_json_pretty().unwrap()).unwrap();

        let mut config = crate::config::AppConfig::default().models;
        config.models_dir = dir.path().to_string_lossy().into_owned();
        config.artifacts = BTreeMap::from([("rf".to_string(), "rf.json".to_string())]);

        let registry = ModelRegistry::load(&config).unwrap();
        assert_eq!(registry.len(), 1);
        let rf = registry.get("rf").unwrap();
        assert_eq!(rf.path, Some(dir.path().join("rf.json")));
        assert_eq!(rf.mapper.map(&"b".into()), "Confirmed");
    }
}
