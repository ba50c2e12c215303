//! Compatibility patching of deserialized model graphs
//!
//! Artifacts written by an older training library lack attributes that the
//! current runtime reads unconditionally, which would otherwise surface as an
//! attribute error deep inside prediction. The patcher walks the whole graph
//! once at load time and fills those attributes with the runtime's "not
//! configured" value.
//!
//! Patching is best effort. A node that cannot be inspected is recorded in the
//! [`PatchReport`] and skipped; the rest of the graph is still patched and the
//! load continues.

use crate::error::PatchError;
use crate::models::artifact::{
    Estimator, ModelArtifact, NodeId, RuntimeAttribute, RUNTIME_ATTRIBUTES,
};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info};

/// A container relation followed during traversal.
#[derive(Debug, Clone, Copy)]
pub struct Relation {
    pub name: &'static str,
    pub extract: fn(&Estimator) -> Vec<NodeId>,
}

fn pipeline_steps(estimator: &Estimator) -> Vec<NodeId> {
    match estimator {
        Estimator::Pipeline { steps, .. } => steps.iter().map(|s| s.node).collect(),
        _ => Vec::new(),
    }
}

fn fitted_members(estimator: &Estimator) -> Vec<NodeId> {
    match estimator {
        Estimator::RandomForestClassifier { fitted, .. }
        | Estimator::VotingClassifier { fitted, .. } => fitted.clone(),
        _ => Vec::new(),
    }
}

fn configured_members(estimator: &Estimator) -> Vec<NodeId> {
    match estimator {
        Estimator::VotingClassifier { estimators, .. } => {
            estimators.iter().map(|m| m.node).collect()
        }
        _ => Vec::new(),
    }
}

fn base_estimator(estimator: &Estimator) -> Vec<NodeId> {
    match estimator {
        Estimator::RandomForestClassifier {
            estimator: Some(base),
            ..
        } => vec![*base],
        _ => Vec::new(),
    }
}

/// Relations the patcher follows, in visiting order.
pub const RELATIONS: &[Relation] = &[
    Relation {
        name: "steps",
        extract: pipeline_steps,
    },
    Relation {
        name: "estimators_",
        extract: fitted_members,
    },
    Relation {
        name: "estimators",
        extract: configured_members,
    },
    Relation {
        name: "estimator",
        extract: base_estimator,
    },
];

/// One attribute injected into one node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchedAttribute {
    pub node: usize,
    pub estimator: &'static str,
    pub attribute: &'static str,
}

/// Outcome of patching one artifact.
#[derive(Debug, Clone, Default)]
pub struct PatchReport {
    /// Distinct nodes visited
    pub visited: usize,
    pub patched: Vec<PatchedAttribute>,
    /// Nodes or references that could not be inspected
    pub failures: Vec<PatchError>,
}

impl PatchReport {
    pub fn is_clean(&self) -> bool {
        self.patched.is_empty() && self.failures.is_empty()
    }
}

/// Injects missing runtime attributes into a model graph.
#[derive(Debug, Clone)]
pub struct CompatibilityPatcher {
    relations: &'static [Relation],
    attributes: &'static [RuntimeAttribute],
}

impl CompatibilityPatcher {
    pub fn new() -> Self {
        Self {
            relations: RELATIONS,
            attributes: RUNTIME_ATTRIBUTES,
        }
    }

    /// Patch with a custom attribute table.
    pub fn with_attributes(attributes: &'static [RuntimeAttribute]) -> Self {
        Self {
            relations: RELATIONS,
            attributes,
        }
    }

    /// Patch `artifact` in place. Never fails; problems land in the report.
    pub fn patch(&self, artifact: &mut ModelArtifact) -> PatchReport {
        let mut report = PatchReport::default();
        let node_count = artifact.nodes.len();

        if artifact.root.0 >= node_count {
            report.failures.push(PatchError::MissingRoot(artifact.root.0));
            return report;
        }

        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut worklist = vec![artifact.root];

        while let Some(id) = worklist.pop() {
            if !visited.insert(id) {
                continue;
            }
            let node = &mut artifact.nodes[id.0];
            report.visited += 1;

            let kind = node.estimator.kind_name();
            for attribute in self.attributes.iter().filter(|a| a.estimator == kind) {
                if !node.attrs.contains_key(attribute.name) {
                    node.attrs
                        .insert(attribute.name.to_string(), (attribute.default)());
                    debug!(node = id.0, estimator = kind, attribute = attribute.name, "Injected default attribute");
                    report.patched.push(PatchedAttribute {
                        node: id.0,
                        estimator: kind,
                        attribute: attribute.name,
                    });
                }
            }

            // Reverse so members are visited in declaration order.
            let mut children = Vec::new();
            for relation in self.relations {
                for child in (relation.extract)(&node.estimator) {
                    if child.0 >= node_count {
                        let failure = PatchError::DanglingReference {
                            relation: relation.name,
                            from: id.0,
                            to: child.0,
                        };
                        debug!(error = %failure, "Skipping unreachable node while patching");
                        report.failures.push(failure);
                        continue;
                    }
                    if !visited.contains(&child) {
                        children.push(child);
                    }
                }
            }
            worklist.extend(children.into_iter().rev());
        }

        info!(
            visited = report.visited,
            patched = report.patched.len(),
            failures = report.failures.len(),
            "Compatibility patching complete"
        );

        report
    }
}

impl Default for CompatibilityPatcher {
    fn default() -> Self {
        Self::new()
    }
}
