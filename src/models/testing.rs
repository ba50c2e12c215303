//! Hand-built artifacts shared by unit tests

use crate::models::artifact::{
    ClassLabel, Estimator, ModelArtifact, Node, NodeId, Step, Tree, Voting,
    RUNTIME_LIBRARY_VERSION,
};
use serde_json::{json, Value};

pub fn labels(classes: &[&str]) -> Vec<ClassLabel> {
    classes.iter().map(|c| ClassLabel::from(*c)).collect()
}

fn names(features: &[&str]) -> Vec<String> {
    features.iter().map(|f| f.to_string()).collect()
}

/// Artifact made of one node.
pub fn single(node: Node) -> ModelArtifact {
    ModelArtifact {
        library_version: RUNTIME_LIBRARY_VERSION.to_string(),
        root: NodeId(0),
        nodes: vec![node],
    }
}

/// `coef = [1; n]`, `intercept = 0`, binary.
pub fn linear_svc(n_features: usize, classes: &[&str]) -> Node {
    Node::new(Estimator::LinearSvc {
        coef: vec![vec![1.0; n_features]],
        intercept: vec![0.0],
        classes: labels(classes),
        feature_names_in: None,
    })
}

pub fn stump_with(
    feature: i64,
    threshold: f64,
    left: Vec<f64>,
    right: Vec<f64>,
    classes: &[&str],
) -> Node {
    Node::new(Estimator::DecisionTreeClassifier {
        tree: Tree {
            children_left: vec![1, -1, -1],
            children_right: vec![2, -1, -1],
            feature: vec![feature, -2, -2],
            threshold: vec![threshold, -2.0, -2.0],
            value: vec![vec![1.0; left.len()], left, right],
            missing_go_to_left: None,
        },
        classes: labels(classes),
        feature_names_in: None,
    })
    .with_attr("monotonic_cst", Value::Null)
}

/// Three-class stump: left leaf favours the first class, right the second.
pub fn stump(feature: i64, threshold: f64, classes: &[&str]) -> Node {
    stump_with(
        feature,
        threshold,
        vec![4.0, 1.0, 0.0],
        vec![0.0, 5.0, 1.0],
        classes,
    )
}

/// Imputer, scaler and a three-class multinomial logistic regression. Only
/// the imputer step declares the feature order.
pub fn logistic_pipeline(features: &[&str], classes: &[&str]) -> ModelArtifact {
    let n = features.len();
    let coef: Vec<Vec<f64>> = (0..classes.len())
        .map(|c| {
            (0..n)
                .map(|f| (c as f64 - 1.0) * (f as f64 + 1.0) * 0.5)
                .collect::<Vec<f64>>()
        })
        .collect();

    ModelArtifact {
        library_version: RUNTIME_LIBRARY_VERSION.to_string(),
        root: NodeId(0),
        nodes: vec![
            Node::new(Estimator::Pipeline {
                steps: vec![
                    Step {
                        name: "imputer".to_string(),
                        node: NodeId(1),
                    },
                    Step {
                        name: "scaler".to_string(),
                        node: NodeId(2),
                    },
                    Step {
                        name: "clf".to_string(),
                        node: NodeId(3),
                    },
                ],
                feature_names_in: None,
            }),
            Node::new(Estimator::SimpleImputer {
                statistics: vec![Some(0.5); n],
                feature_names_in: Some(names(features)),
            })
            .with_attr("keep_empty_features", json!(false)),
            Node::new(Estimator::StandardScaler {
                mean: Some(vec![0.0; n]),
                scale: Some(vec![2.0; n]),
                feature_names_in: Some(names(features)),
            }),
            Node::new(Estimator::LogisticRegression {
                coef,
                intercept: vec![0.1, 0.0, -0.1][..classes.len().min(3)].to_vec(),
                classes: labels(classes),
                feature_names_in: None,
            })
            .with_attr("multi_class", json!("deprecated")),
        ],
    }
}

/// Forest of two stumps on feature 0 (thresholds 0.5 and 1.5).
pub fn forest(classes: &[&str]) -> ModelArtifact {
    ModelArtifact {
        library_version: RUNTIME_LIBRARY_VERSION.to_string(),
        root: NodeId(0),
        nodes: vec![
            Node::new(Estimator::RandomForestClassifier {
                fitted: vec![NodeId(1), NodeId(2)],
                estimator: None,
                classes: labels(classes),
                feature_names_in: Some(names(&["f0"])),
            })
            .with_attr("monotonic_cst", Value::Null),
            stump_with(0, 0.5, vec![1.0, 0.0, 0.0], vec![0.2, 0.7, 0.1], classes),
            stump_with(0, 1.5, vec![0.6, 0.3, 0.1], vec![0.0, 0.0, 1.0], classes),
        ],
    }
}

/// Hard voting over three stumps on feature 0.
pub fn hard_voting(classes: &[&str]) -> ModelArtifact {
    ModelArtifact {
        library_version: RUNTIME_LIBRARY_VERSION.to_string(),
        root: NodeId(0),
        nodes: vec![
            Node::new(Estimator::VotingClassifier {
                estimators: Vec::new(),
                fitted: vec![NodeId(1), NodeId(2), NodeId(3)],
                voting: Voting::Hard,
                weights: None,
                classes: labels(classes),
                feature_names_in: None,
            }),
            stump(0, 0.5, classes),
            stump(0, 0.0, classes),
            stump(0, 1.0, classes),
        ],
    }
}
