//! Evaluation of deserialized estimator graphs
//!
//! Rows arrive dense, with `NaN` standing in for missing values the same way
//! the training library encodes them. Transformers run in pipeline order and
//! the final estimator classifies. Every estimator checks the runtime
//! attributes it reads before doing any work, so an unpatched artifact fails
//! here with the library's own "has no attribute" wording.

use crate::error::EstimatorError;
use crate::models::aggregator::{argmax, ScoreAggregator};
use crate::models::artifact::{ClassLabel, Estimator, ModelArtifact, Node, NodeId, Tree, Voting};

/// Raw decision function output for a single row.
#[derive(Debug, Clone, PartialEq)]
pub enum Margin {
    /// Binary classifiers report one signed distance.
    Scalar(f64),
    /// One score per class.
    Vector(Vec<f64>),
}

impl ModelArtifact {
    /// Predict the raw class label of a single row.
    pub fn predict(&self, row: &[f64]) -> Result<ClassLabel, EstimatorError> {
        let (id, x) = self.prepare(self.root, row)?;
        let index = self.class_index(id, &x)?;
        let classes = self.classes_of(id)?;
        classes
            .get(index)
            .cloned()
            .ok_or_else(|| EstimatorError::Malformed {
                estimator: self.kind_of(id),
                reason: format!("predicted class {} of {}", index, classes.len()),
            })
    }

    /// Class probabilities of a single row, in `classes` order.
    pub fn predict_proba(&self, row: &[f64]) -> Result<Vec<f64>, EstimatorError> {
        let (id, x) = self.prepare(self.root, row)?;
        self.proba(id, &x)
    }

    /// Decision function of a single row.
    pub fn decision_function(&self, row: &[f64]) -> Result<Margin, EstimatorError> {
        let (id, x) = self.prepare(self.root, row)?;
        self.margin(id, &x)
    }

    fn kind_of(&self, id: NodeId) -> &'static str {
        self.node(id)
            .map(|n| n.estimator.kind_name())
            .unwrap_or("UnknownEstimator")
    }

    fn classes_of(&self, id: NodeId) -> Result<&[ClassLabel], EstimatorError> {
        let node = self.node(id)?;
        node.estimator
            .own_classes()
            .ok_or(EstimatorError::Unsupported {
                estimator: node.estimator.kind_name(),
                capability: "classes_",
            })
    }

    /// Run pipeline transformers and return the final estimator with the
    /// row it should see.
    fn prepare(&self, id: NodeId, row: &[f64]) -> Result<(NodeId, Vec<f64>), EstimatorError> {
        let mut id = id;
        let mut x = row.to_vec();
        for _ in 0..=self.nodes.len() {
            let node = self.node(id)?;
            let Estimator::Pipeline { steps, .. } = &node.estimator else {
                return Ok((id, x));
            };
            let (last, transforms) = steps.split_last().ok_or_else(|| EstimatorError::Malformed {
                estimator: "Pipeline",
                reason: "pipeline has no steps".to_string(),
            })?;
            for step in transforms {
                x = self.transform(step.node, &x)?;
            }
            id = last.node;
        }
        Err(EstimatorError::Malformed {
            estimator: "Pipeline",
            reason: "pipeline steps form a cycle".to_string(),
        })
    }

    fn transform(&self, id: NodeId, x: &[f64]) -> Result<Vec<f64>, EstimatorError> {
        let node = self.node(id)?;
        node.require_runtime_attributes()?;

        match &node.estimator {
            Estimator::SimpleImputer { statistics, .. } => impute(node, statistics, x),
            Estimator::StandardScaler { mean, scale, .. } => {
                standardize(mean.as_deref(), scale.as_deref(), x)
            }
            Estimator::Pipeline { steps, .. } => {
                let mut out = x.to_vec();
                for step in steps {
                    out = self.transform(step.node, &out)?;
                }
                Ok(out)
            }
            other => Err(EstimatorError::Unsupported {
                estimator: other.kind_name(),
                capability: "transform",
            }),
        }
    }

    fn class_index(&self, id: NodeId, x: &[f64]) -> Result<usize, EstimatorError> {
        let node = self.node(id)?;
        node.require_runtime_attributes()?;
        let kind = node.estimator.kind_name();

        match &node.estimator {
            Estimator::LogisticRegression { coef, intercept, .. }
            | Estimator::LinearSvc { coef, intercept, .. } => {
                match linear_margin(kind, coef, intercept, x)? {
                    Margin::Scalar(m) => Ok(usize::from(m > 0.0)),
                    Margin::Vector(scores) => argmax(&scores).ok_or_else(|| EstimatorError::Malformed {
                        estimator: kind,
                        reason: "decision function is NaN".to_string(),
                    }),
                }
            }
            Estimator::DecisionTreeClassifier { tree, .. } => {
                argmax(tree_leaf(tree, x)?).ok_or_else(|| EstimatorError::Malformed {
                    estimator: kind,
                    reason: "leaf holds no class weights".to_string(),
                })
            }
            Estimator::RandomForestClassifier { .. }
            | Estimator::VotingClassifier {
                voting: Voting::Soft,
                ..
            } => {
                let probs = self.proba(id, x)?;
                argmax(&probs).ok_or_else(|| EstimatorError::Malformed {
                    estimator: kind,
                    reason: "no class probabilities".to_string(),
                })
            }
            Estimator::VotingClassifier {
                voting: Voting::Hard,
                fitted,
                weights,
                classes,
                ..
            } => {
                let picks = fitted
                    .iter()
                    .map(|&member| {
                        let (fid, fx) = self.prepare(member, x)?;
                        self.class_index(fid, &fx)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                ScoreAggregator::new(weights.clone())
                    .vote(&picks, classes.len())
                    .map_err(|reason| EstimatorError::Malformed {
                        estimator: kind,
                        reason,
                    })
            }
            _ => Err(EstimatorError::Unsupported {
                estimator: kind,
                capability: "predict",
            }),
        }
    }

    fn proba(&self, id: NodeId, x: &[f64]) -> Result<Vec<f64>, EstimatorError> {
        let node = self.node(id)?;
        node.require_runtime_attributes()?;
        let kind = node.estimator.kind_name();

        match &node.estimator {
            Estimator::LogisticRegression { coef, intercept, .. } => {
                match linear_margin(kind, coef, intercept, x)? {
                    Margin::Scalar(m) => {
                        let p = logistic(m);
                        Ok(vec![1.0 - p, p])
                    }
                    Margin::Vector(scores) if one_vs_rest(node) => {
                        let raw: Vec<f64> = scores.into_iter().map(logistic).collect();
                        let total: f64 = raw.iter().sum();
                        Ok(raw.into_iter().map(|p| p / total).collect())
                    }
                    Margin::Vector(scores) => Ok(softmax(&scores)),
                }
            }
            Estimator::DecisionTreeClassifier { tree, .. } => {
                let leaf = tree_leaf(tree, x)?;
                let total: f64 = leaf.iter().sum();
                if total > 0.0 {
                    Ok(leaf.iter().map(|v| v / total).collect())
                } else {
                    Ok(vec![1.0 / leaf.len() as f64; leaf.len()])
                }
            }
            Estimator::RandomForestClassifier { fitted, .. } => {
                let members = self.member_probas(fitted, x)?;
                ScoreAggregator::equal_weights()
                    .average(&members)
                    .map_err(|reason| EstimatorError::Malformed {
                        estimator: kind,
                        reason,
                    })
            }
            Estimator::VotingClassifier {
                voting: Voting::Soft,
                fitted,
                weights,
                ..
            } => {
                let members = self.member_probas(fitted, x)?;
                ScoreAggregator::new(weights.clone())
                    .average(&members)
                    .map_err(|reason| EstimatorError::Malformed {
                        estimator: kind,
                        reason,
                    })
            }
            _ => Err(EstimatorError::Unsupported {
                estimator: kind,
                capability: "predict_proba",
            }),
        }
    }

    fn member_probas(&self, members: &[NodeId], x: &[f64]) -> Result<Vec<Vec<f64>>, EstimatorError> {
        members
            .iter()
            .map(|&member| {
                let (fid, fx) = self.prepare(member, x)?;
                self.proba(fid, &fx)
            })
            .collect()
    }

    fn margin(&self, id: NodeId, x: &[f64]) -> Result<Margin, EstimatorError> {
        let node = self.node(id)?;
        node.require_runtime_attributes()?;
        let kind = node.estimator.kind_name();

        match &node.estimator {
            Estimator::LogisticRegression { coef, intercept, .. }
            | Estimator::LinearSvc { coef, intercept, .. } => {
                linear_margin(kind, coef, intercept, x)
            }
            _ => Err(EstimatorError::Unsupported {
                estimator: kind,
                capability: "decision_function",
            }),
        }
    }
}

fn one_vs_rest(node: &Node) -> bool {
    node.attrs
        .get("multi_class")
        .and_then(|v| v.as_str())
        .map(|v| v == "ovr")
        .unwrap_or(false)
}

fn impute(node: &Node, statistics: &[Option<f64>], x: &[f64]) -> Result<Vec<f64>, EstimatorError> {
    if statistics.len() != x.len() {
        return Err(EstimatorError::FeatureCount {
            estimator: "SimpleImputer",
            expected: statistics.len(),
            found: x.len(),
        });
    }
    let keep_empty = node.attr("keep_empty_features")?.as_bool().unwrap_or(false);

    let mut out = Vec::with_capacity(x.len());
    for (&value, statistic) in x.iter().zip(statistics) {
        match statistic {
            Some(fill) if value.is_nan() => out.push(*fill),
            Some(_) => out.push(value),
            // Feature was empty at fit time: dropped unless kept as zeros.
            None if keep_empty => out.push(if value.is_nan() { 0.0 } else { value }),
            None => {}
        }
    }
    Ok(out)
}

fn standardize(
    mean: Option<&[f64]>,
    scale: Option<&[f64]>,
    x: &[f64],
) -> Result<Vec<f64>, EstimatorError> {
    for expected in [mean.map(<[f64]>::len), scale.map(<[f64]>::len)]
        .into_iter()
        .flatten()
    {
        if expected != x.len() {
            return Err(EstimatorError::FeatureCount {
                estimator: "StandardScaler",
                expected,
                found: x.len(),
            });
        }
    }

    Ok(x.iter()
        .enumerate()
        .map(|(i, &v)| {
            let centered = mean.map_or(v, |m| v - m[i]);
            match scale.map(|s| s[i]) {
                Some(s) if s != 0.0 => centered / s,
                _ => centered,
            }
        })
        .collect())
}

fn linear_margin(
    estimator: &'static str,
    coef: &[Vec<f64>],
    intercept: &[f64],
    x: &[f64],
) -> Result<Margin, EstimatorError> {
    if coef.is_empty() || coef.len() != intercept.len() {
        return Err(EstimatorError::Malformed {
            estimator,
            reason: format!("{} coefficient rows, {} intercepts", coef.len(), intercept.len()),
        });
    }
    if x.iter().any(|v| v.is_nan()) {
        return Err(EstimatorError::MissingValue { estimator });
    }

    let mut scores = Vec::with_capacity(coef.len());
    for (row, b) in coef.iter().zip(intercept) {
        if row.len() != x.len() {
            return Err(EstimatorError::FeatureCount {
                estimator,
                expected: row.len(),
                found: x.len(),
            });
        }
        scores.push(row.iter().zip(x).map(|(w, v)| w * v).sum::<f64>() + b);
    }

    if scores.len() == 1 {
        Ok(Margin::Scalar(scores[0]))
    } else {
        Ok(Margin::Vector(scores))
    }
}

/// Walk a tree to its leaf and return the leaf's class weights.
fn tree_leaf<'a>(tree: &'a Tree, x: &[f64]) -> Result<&'a [f64], EstimatorError> {
    const KIND: &str = "DecisionTreeClassifier";
    let malformed = |reason: String| EstimatorError::Malformed {
        estimator: KIND,
        reason,
    };

    let n = tree.children_left.len();
    if n == 0
        || tree.children_right.len() != n
        || tree.feature.len() != n
        || tree.threshold.len() != n
        || tree.value.len() != n
    {
        return Err(malformed("tree arrays differ in length".to_string()));
    }

    let mut node = 0usize;
    // A well formed tree reaches a leaf in fewer than `n` steps.
    for _ in 0..n {
        let left = tree.children_left[node];
        if left < 0 {
            return Ok(&tree.value[node]);
        }
        let feature = usize::try_from(tree.feature[node])
            .map_err(|_| malformed(format!("split node {node} has no feature")))?;
        let value = *x.get(feature).ok_or(EstimatorError::FeatureCount {
            estimator: KIND,
            expected: feature + 1,
            found: x.len(),
        })?;

        let go_left = if value.is_nan() {
            match &tree.missing_go_to_left {
                Some(routes) => routes.get(node).copied().unwrap_or(0) == 1,
                None => return Err(EstimatorError::MissingValue { estimator: KIND }),
            }
        } else {
            value <= tree.threshold[node]
        };

        let next = if go_left { left } else { tree.children_right[node] };
        node = usize::try_from(next)
            .ok()
            .filter(|&i| i < n)
            .ok_or_else(|| malformed(format!("node {node} points outside the tree")))?;
    }
    Err(malformed("tree does not terminate".to_string()))
}

/// `1 / (1 + e^-x)`
pub fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Softmax with the row maximum subtracted first.
pub fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}
