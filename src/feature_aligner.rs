//! Alignment of partial feature records to a model's expected input layout.
//!
//! Callers send any subset of the known features. The aligner produces one
//! value per feature the model was fitted on, in the model's order, marking
//! absent inputs as missing rather than zero so the model's own imputer
//! decides how to fill them.

use crate::models::artifact::{Estimator, ModelArtifact};
use serde::Serialize;

/// Sparse caller input: feature name to optional value, in the order the
/// caller supplied them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRecord {
    fields: Vec<(String, Option<f64>)>,
}

impl FeatureRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, keeping its original position if already present.
    pub fn insert(&mut self, name: impl Into<String>, value: Option<f64>) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.insert(name, Some(value));
        self
    }

    /// `None` when the field was not supplied at all.
    pub fn get(&self, name: &str) -> Option<Option<f64>> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, Option<f64>)> for FeatureRecord {
    fn from_iter<I: IntoIterator<Item = (S, Option<f64>)>>(iter: I) -> Self {
        let mut record = FeatureRecord::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

/// One value per expected feature, in the model's order. `None` is the
/// missing-value marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignedFeatureRow {
    names: Vec<String>,
    values: Vec<Option<f64>>,
}

impl AlignedFeatureRow {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<Option<f64>> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }

    /// Dense row for the estimator runtime; missing values become `NaN`.
    pub fn to_dense(&self) -> Vec<f64> {
        self.values.iter().map(|v| v.unwrap_or(f64::NAN)).collect()
    }
}

impl From<&AlignedFeatureRow> for FeatureRecord {
    fn from(row: &AlignedFeatureRow) -> Self {
        row.names
            .iter()
            .cloned()
            .zip(row.values.iter().copied())
            .collect()
    }
}

/// Where the expected feature order came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureOrigin {
    /// Declared on the artifact's root estimator.
    Artifact,
    /// Declared on a named pipeline step.
    PipelineStep(String),
    /// Nothing declared; the caller's field order is used.
    Caller,
}

/// Reconciles caller records with a model's expected features.
pub struct SchemaAligner;

impl SchemaAligner {
    /// Expected feature order for `artifact`, falling back to the record's
    /// own order when the artifact declares none.
    pub fn expected_order(
        record: &FeatureRecord,
        artifact: &ModelArtifact,
    ) -> (Vec<String>, FeatureOrigin) {
        if let Some(declared) = Self::declared_order(artifact) {
            return declared;
        }
        (
            record.names().map(str::to_string).collect(),
            FeatureOrigin::Caller,
        )
    }

    /// Order declared by the artifact itself or by one of the root
    /// pipeline's steps (one level deep, first match in step order).
    pub fn declared_order(artifact: &ModelArtifact) -> Option<(Vec<String>, FeatureOrigin)> {
        let root = artifact.root_node().ok()?;
        if let Some(names) = root.estimator.feature_names_in() {
            return Some((names.to_vec(), FeatureOrigin::Artifact));
        }

        let Estimator::Pipeline { steps, .. } = &root.estimator else {
            return None;
        };
        steps.iter().find_map(|step| {
            let node = artifact.node(step.node).ok()?;
            node.estimator
                .feature_names_in()
                .map(|names| (names.to_vec(), FeatureOrigin::PipelineStep(step.name.clone())))
        })
    }

    /// Produce a row in the expected order. Missing features are marked,
    /// unexpected ones dropped.
    pub fn align(record: &FeatureRecord, artifact: &ModelArtifact) -> AlignedFeatureRow {
        let (names, _) = Self::expected_order(record, artifact);
        Self::align_to(record, names)
    }

    pub fn align_to(record: &FeatureRecord, names: Vec<String>) -> AlignedFeatureRow {
        let values = names
            .iter()
            .map(|name| record.get(name).flatten())
            .collect();
        AlignedFeatureRow { names, values }
    }
}
