//! Serialized estimator graph
//!
//! An artifact is a flat arena of nodes addressed by [`NodeId`]. Container
//! estimators (pipelines, ensembles) reference their members by id, so the
//! same sub-estimator may be shared and a malformed file may even contain
//! cycles. Prediction only follows pipeline steps and fitted ensemble
//! members; [`ModelArtifact::validate`] checks that this part of the graph is
//! well formed before the artifact is served.

use crate::error::EstimatorError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Estimator attribute layout implemented by this runtime.
pub const RUNTIME_LIBRARY_VERSION: &str = "1.5.2";

/// Attribute a newer runtime reads unconditionally at prediction time,
/// together with the value it treats as "not configured".
#[derive(Debug, Clone, Copy)]
pub struct RuntimeAttribute {
    pub estimator: &'static str,
    pub name: &'static str,
    pub default: fn() -> Value,
}

fn unset() -> Value {
    Value::Null
}

fn deprecated() -> Value {
    Value::String("deprecated".to_string())
}

fn disabled() -> Value {
    Value::Bool(false)
}

pub const RUNTIME_ATTRIBUTES: &[RuntimeAttribute] = &[
    RuntimeAttribute {
        estimator: "DecisionTreeClassifier",
        name: "monotonic_cst",
        default: unset,
    },
    RuntimeAttribute {
        estimator: "RandomForestClassifier",
        name: "monotonic_cst",
        default: unset,
    },
    RuntimeAttribute {
        estimator: "LogisticRegression",
        name: "multi_class",
        default: deprecated,
    },
    RuntimeAttribute {
        estimator: "SimpleImputer",
        name: "keep_empty_features",
        default: disabled,
    },
];

/// Index of a node inside [`ModelArtifact::nodes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Raw class label as stored by the training library.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClassLabel {
    Int(i64),
    Text(String),
}

impl Ord for ClassLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (ClassLabel::Int(a), ClassLabel::Int(b)) => a.cmp(b),
            (ClassLabel::Text(a), ClassLabel::Text(b)) => a.cmp(b),
            (ClassLabel::Int(_), ClassLabel::Text(_)) => Ordering::Less,
            (ClassLabel::Text(_), ClassLabel::Int(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for ClassLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassLabel::Int(v) => write!(f, "{v}"),
            ClassLabel::Text(v) => f.write_str(v),
        }
    }
}

impl From<&str> for ClassLabel {
    fn from(value: &str) -> Self {
        ClassLabel::Text(value.to_string())
    }
}

impl From<i64> for ClassLabel {
    fn from(value: i64) -> Self {
        ClassLabel::Int(value)
    }
}

/// Named pipeline step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub node: NodeId,
}

/// Named member of a voting ensemble as configured before fitting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedMember {
    pub name: String,
    pub node: NodeId,
}

/// Array-encoded binary decision tree. A node is a leaf when its left child
/// is `-1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    /// Per-node class weights.
    pub value: Vec<Vec<f64>>,
    /// Missing-value routing learned by newer trainers (1 = left).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_go_to_left: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voting {
    Soft,
    Hard,
}

/// Fitted estimator parameters, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Estimator {
    Pipeline {
        steps: Vec<Step>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        feature_names_in: Option<Vec<String>>,
    },
    SimpleImputer {
        /// `null` marks a feature that was entirely missing during fit.
        statistics: Vec<Option<f64>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        feature_names_in: Option<Vec<String>>,
    },
    StandardScaler {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mean: Option<Vec<f64>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scale: Option<Vec<f64>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        feature_names_in: Option<Vec<String>>,
    },
    LogisticRegression {
        coef: Vec<Vec<f64>>,
        intercept: Vec<f64>,
        classes: Vec<ClassLabel>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        feature_names_in: Option<Vec<String>>,
    },
    LinearSvc {
        coef: Vec<Vec<f64>>,
        intercept: Vec<f64>,
        classes: Vec<ClassLabel>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        feature_names_in: Option<Vec<String>>,
    },
    DecisionTreeClassifier {
        tree: Tree,
        classes: Vec<ClassLabel>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        feature_names_in: Option<Vec<String>>,
    },
    RandomForestClassifier {
        #[serde(rename = "estimators_")]
        fitted: Vec<NodeId>,
        /// Unfitted template the members were cloned from.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        estimator: Option<NodeId>,
        classes: Vec<ClassLabel>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        feature_names_in: Option<Vec<String>>,
    },
    VotingClassifier {
        #[serde(default)]
        estimators: Vec<NamedMember>,
        #[serde(rename = "estimators_")]
        fitted: Vec<NodeId>,
        voting: Voting,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        weights: Option<Vec<f64>>,
        classes: Vec<ClassLabel>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        feature_names_in: Option<Vec<String>>,
    },
    #[serde(other)]
    Unknown,
}

impl Estimator {
    /// Class name used by the training library, also used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Estimator::Pipeline { .. } => "Pipeline",
            Estimator::SimpleImputer { .. } => "SimpleImputer",
            Estimator::StandardScaler { .. } => "StandardScaler",
            Estimator::LogisticRegression { .. } => "LogisticRegression",
            Estimator::LinearSvc { .. } => "LinearSVC",
            Estimator::DecisionTreeClassifier { .. } => "DecisionTreeClassifier",
            Estimator::RandomForestClassifier { .. } => "RandomForestClassifier",
            Estimator::VotingClassifier { .. } => "VotingClassifier",
            Estimator::Unknown => "UnknownEstimator",
        }
    }

    /// Input feature order declared at fit time, if recorded.
    pub fn feature_names_in(&self) -> Option<&[String]> {
        match self {
            Estimator::Pipeline { feature_names_in, .. }
            | Estimator::SimpleImputer { feature_names_in, .. }
            | Estimator::StandardScaler { feature_names_in, .. }
            | Estimator::LogisticRegression { feature_names_in, .. }
            | Estimator::LinearSvc { feature_names_in, .. }
            | Estimator::DecisionTreeClassifier { feature_names_in, .. }
            | Estimator::RandomForestClassifier { feature_names_in, .. }
            | Estimator::VotingClassifier { feature_names_in, .. } => feature_names_in.as_deref(),
            Estimator::Unknown => None,
        }
    }

    /// Class labels of a classifier. Pipelines delegate to their last step,
    /// which requires the artifact, see [`ModelArtifact::classes`].
    pub fn own_classes(&self) -> Option<&[ClassLabel]> {
        match self {
            Estimator::LogisticRegression { classes, .. }
            | Estimator::LinearSvc { classes, .. }
            | Estimator::DecisionTreeClassifier { classes, .. }
            | Estimator::RandomForestClassifier { classes, .. }
            | Estimator::VotingClassifier { classes, .. } => Some(classes),
            _ => None,
        }
    }

    /// Nodes followed when evaluating this estimator.
    pub fn prediction_members(&self) -> Vec<NodeId> {
        match self {
            Estimator::Pipeline { steps, .. } => steps.iter().map(|s| s.node).collect(),
            Estimator::RandomForestClassifier { fitted, .. }
            | Estimator::VotingClassifier { fitted, .. } => fitted.clone(),
            _ => Vec::new(),
        }
    }
}

/// One estimator in the graph plus its loose attribute bag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub estimator: Estimator,
    #[serde(default)]
    pub attrs: BTreeMap<String, Value>,
}

impl Node {
    pub fn new(estimator: Estimator) -> Self {
        Self {
            estimator,
            attrs: BTreeMap::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, value: Value) -> Self {
        self.attrs.insert(name.to_string(), value);
        self
    }

    /// Read an attribute, failing the way the training library does when an
    /// older pickle lacks it.
    pub fn attr(&self, name: &'static str) -> Result<&Value, EstimatorError> {
        self.attrs
            .get(name)
            .ok_or(EstimatorError::MissingAttribute {
                estimator: self.estimator.kind_name(),
                attribute: name,
            })
    }

    /// Check every attribute the runtime reads for this estimator kind.
    pub fn require_runtime_attributes(&self) -> Result<(), EstimatorError> {
        let kind = self.estimator.kind_name();
        for attribute in RUNTIME_ATTRIBUTES.iter().filter(|a| a.estimator == kind) {
            self.attr(attribute.name)?;
        }
        Ok(())
    }
}

/// A deserialized model artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Library version that serialized the artifact.
    pub library_version: String,
    pub root: NodeId,
    pub nodes: Vec<Node>,
}

impl ModelArtifact {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, EstimatorError> {
        self.nodes.get(id.0).ok_or(EstimatorError::DanglingNode(id.0))
    }

    pub fn root_node(&self) -> Result<&Node, EstimatorError> {
        self.node(self.root)
    }

    /// Follow pipeline last steps down to the estimator that classifies.
    pub fn final_estimator(&self) -> Result<(NodeId, &Node), EstimatorError> {
        let mut id = self.root;
        // Bounded by the node count so a cyclic pipeline cannot spin forever.
        for _ in 0..=self.nodes.len() {
            let node = self.node(id)?;
            match &node.estimator {
                Estimator::Pipeline { steps, .. } => match steps.last() {
                    Some(last) => id = last.node,
                    None => {
                        return Err(EstimatorError::Malformed {
                            estimator: "Pipeline",
                            reason: "pipeline has no steps".to_string(),
                        })
                    }
                },
                _ => return Ok((id, node)),
            }
        }
        Err(EstimatorError::Malformed {
            estimator: "Pipeline",
            reason: "pipeline steps form a cycle".to_string(),
        })
    }

    /// Raw class labels of the model, `None` if it is not a classifier.
    pub fn classes(&self) -> Option<&[ClassLabel]> {
        self.final_estimator()
            .ok()
            .and_then(|(_, node)| node.estimator.own_classes())
    }

    /// Check that the root and everything reachable through prediction
    /// relations exists and that this subgraph is acyclic.
    pub fn validate(&self) -> Result<(), String> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unseen,
            Open,
            Done,
        }

        if self.root.0 >= self.nodes.len() {
            return Err(format!("root {} does not exist", self.root));
        }

        let mut marks = vec![Mark::Unseen; self.nodes.len()];
        // (node, children already expanded)
        let mut stack = vec![(self.root, false)];

        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                marks[id.0] = Mark::Done;
                continue;
            }
            match marks[id.0] {
                Mark::Done => continue,
                Mark::Open => return Err(format!("cycle through node {id}")),
                Mark::Unseen => {}
            }
            marks[id.0] = Mark::Open;
            stack.push((id, true));

            let node = &self.nodes[id.0];
            for child in node.estimator.prediction_members() {
                match marks.get(child.0) {
                    None => {
                        return Err(format!(
                            "{} node {id} references missing node {child}",
                            node.estimator.kind_name()
                        ))
                    }
                    Some(Mark::Open) => return Err(format!("cycle through node {child}")),
                    Some(Mark::Done) => {}
                    Some(Mark::Unseen) => stack.push((child, false)),
                }
            }
        }

        Ok(())
    }

    /// `major.minor` of the serializing library differs from the runtime's.
    pub fn version_skew(&self) -> bool {
        fn major_minor(version: &str) -> Vec<&str> {
            version.trim().split('.').take(2).collect()
        }
        major_minor(&self.library_version) != major_minor(RUNTIME_LIBRARY_VERSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn imputer() -> Node {
        Node::new(Estimator::SimpleImputer {
            statistics: vec![Some(0.0)],
            feature_names_in: Some(vec!["a".to_string()]),
        })
    }

    #[test]
    fn test_deserialize_tagged_nodes() {
        let doc = json!({
            "library_version": "1.2.2",
            "root": 0,
            "nodes": [
                {"estimator": {"kind": "pipeline", "steps": [{"name": "clf", "node": 1}]}},
                {"estimator": {"kind": "linear_svc", "coef": [[1.0]], "intercept": [0.0],
                               "classes": [0, 1]},
                 "attrs": {"dual": "auto"}},
                {"estimator": {"kind": "gradient_boosting_classifier", "n_estimators": 100}}
            ]
        });
        let artifact: ModelArtifact = serde_json::from_value(doc).unwrap();

        assert_eq!(artifact.nodes.len(), 3);
        assert_eq!(artifact.nodes[1].estimator.kind_name(), "LinearSVC");
        assert!(matches!(artifact.nodes[2].estimator, Estimator::Unknown));
        assert_eq!(
            artifact.classes(),
            Some(&[ClassLabel::Int(0), ClassLabel::Int(1)][..])
        );
    }

    #[test]
    fn test_class_label_ordering() {
        let mut labels = vec![
            ClassLabel::from("FP"),
            ClassLabel::Int(2),
            ClassLabel::from("CAND"),
            ClassLabel::Int(10),
        ];
        labels.sort();
        assert_eq!(
            labels,
            vec![
                ClassLabel::Int(2),
                ClassLabel::Int(10),
                ClassLabel::from("CAND"),
                ClassLabel::from("FP"),
            ]
        );
    }

    #[test]
    fn test_missing_attribute_message() {
        let node = imputer();
        let err = node.require_runtime_attributes().unwrap_err();
        assert_eq!(
            err.to_string(),
            "'SimpleImputer' object has no attribute 'keep_empty_features'"
        );

        let node = imputer().with_attr("keep_empty_features", json!(false));
        assert!(node.require_runtime_attributes().is_ok());
    }

    #[test]
    fn test_validate_rejects_dangling_step() {
        let artifact = ModelArtifact {
            library_version: "1.5.2".to_string(),
            root: NodeId(0),
            nodes: vec![Node::new(Estimator::Pipeline {
                steps: vec![Step {
                    name: "clf".to_string(),
                    node: NodeId(7),
                }],
                feature_names_in: None,
            })],
        };
        let err = artifact.validate().unwrap_err();
        assert!(err.contains("missing node #7"));
    }

    #[test]
    fn test_validate_rejects_prediction_cycle() {
        let artifact = ModelArtifact {
            library_version: "1.5.2".to_string(),
            root: NodeId(0),
            nodes: vec![Node::new(Estimator::Pipeline {
                steps: vec![Step {
                    name: "self".to_string(),
                    node: NodeId(0),
                }],
                feature_names_in: None,
            })],
        };
        assert!(artifact.validate().unwrap_err().contains("cycle"));
        assert!(artifact.final_estimator().is_err());
    }

    #[test]
    fn test_validate_accepts_shared_members() {
        let tree = Node::new(Estimator::DecisionTreeClassifier {
            tree: Tree {
                children_left: vec![-1],
                children_right: vec![-1],
                feature: vec![-2],
                threshold: vec![-2.0],
                value: vec![vec![1.0, 1.0]],
                missing_go_to_left: None,
            },
            classes: vec![ClassLabel::Int(0), ClassLabel::Int(1)],
            feature_names_in: None,
        });
        let artifact = ModelArtifact {
            library_version: "1.5.2".to_string(),
            root: NodeId(0),
            nodes: vec![
                Node::new(Estimator::RandomForestClassifier {
                    fitted: vec![NodeId(1), NodeId(1)],
                    // Template relation is not followed by prediction.
                    estimator: Some(NodeId(0)),
                    classes: vec![ClassLabel::Int(0), ClassLabel::Int(1)],
                    feature_names_in: None,
                }),
                tree,
            ],
        };
        assert!(artifact.validate().is_ok());
    }

    #[test]
    fn test_version_skew() {
        let mut artifact = ModelArtifact {
            library_version: RUNTIME_LIBRARY_VERSION.to_string(),
            root: NodeId(0),
            nodes: vec![imputer()],
        };
        assert!(!artifact.version_skew());

        artifact.library_version = "1.5.0".to_string();
        assert!(!artifact.version_skew());

        artifact.library_version = "1.2.2".to_string();
        assert!(artifact.version_skew());
    }
}
