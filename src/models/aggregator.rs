//! Combining member outputs of ensemble estimators

/// Aggregates per-member outputs of an ensemble into one class distribution
/// or one voted class.
#[derive(Debug, Clone, Default)]
pub struct ScoreAggregator {
    /// Member weights; `None` weighs every member equally
    weights: Option<Vec<f64>>,
}

impl ScoreAggregator {
    /// Create an aggregator with explicit member weights.
    pub fn new(weights: Option<Vec<f64>>) -> Self {
        Self { weights }
    }

    /// Create aggregator with equal weights for all members.
    pub fn equal_weights() -> Self {
        Self { weights: None }
    }

    fn weight(&self, member: usize) -> f64 {
        self.weights
            .as_ref()
            .and_then(|w| w.get(member).copied())
            .unwrap_or(1.0)
    }

    fn check_members(&self, members: usize) -> Result<(), String> {
        if members == 0 {
            return Err("ensemble has no fitted members".to_string());
        }
        match &self.weights {
            Some(w) if w.len() != members => Err(format!(
                "{} weights for {} members",
                w.len(),
                members
            )),
            _ => Ok(()),
        }
    }

    /// Weighted average of member class distributions.
    ///
    /// Every member must report the same number of classes.
    pub fn average(&self, distributions: &[Vec<f64>]) -> Result<Vec<f64>, String> {
        self.check_members(distributions.len())?;

        let n_classes = distributions[0].len();
        let mut sum = vec![0.0; n_classes];
        let mut total_weight = 0.0;

        for (member, probs) in distributions.iter().enumerate() {
            if probs.len() != n_classes {
                return Err(format!(
                    "member {} reports {} classes, expected {}",
                    member,
                    probs.len(),
                    n_classes
                ));
            }
            let weight = self.weight(member);
            for (acc, p) in sum.iter_mut().zip(probs) {
                *acc += p * weight;
            }
            total_weight += weight;
        }

        if total_weight > 0.0 {
            Ok(sum.into_iter().map(|s| s / total_weight).collect())
        } else {
            Err("ensemble weights sum to zero".to_string())
        }
    }

    /// Weighted majority vote over member class indices. Ties go to the
    /// lowest class index.
    pub fn vote(&self, picks: &[usize], n_classes: usize) -> Result<usize, String> {
        self.check_members(picks.len())?;

        let mut tally = vec![0.0; n_classes];
        for (member, &class) in picks.iter().enumerate() {
            let slot = tally
                .get_mut(class)
                .ok_or_else(|| format!("member {member} voted for unknown class {class}"))?;
            *slot += self.weight(member);
        }

        argmax(&tally).ok_or_else(|| "no classes to vote for".to_string())
    }
}

/// Index of the largest value, first one on ties. NaN never wins.
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some(b) if values[b] >= v => {}
            _ => best = Some(i),
        }
    }
    best
}

/// Largest value, NaN-aware.
pub fn max_score(values: &[f64]) -> Option<f64> {
    argmax(values).map(|i| values[i])
}
