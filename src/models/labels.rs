//! Translation of raw training-time class labels into the canonical vocabulary

use crate::error::LoadError;
use crate::models::artifact::ClassLabel;
use std::collections::{BTreeSet, HashMap};

/// Maps a model's raw class labels onto the canonical labels by rank: the
/// raw labels are sorted and the i-th one maps to the i-th canonical label.
#[derive(Debug, Clone)]
pub struct LabelMapper {
    mapping: HashMap<String, String>,
    /// (raw, canonical) in rank order
    pairs: Vec<(String, String)>,
}

impl LabelMapper {
    /// Build the mapping for `model`. The distinct raw class count must
    /// equal the canonical vocabulary size.
    pub fn build(model: &str, raw: &[ClassLabel], canonical: &[String]) -> Result<Self, LoadError> {
        let sorted: BTreeSet<&ClassLabel> = raw.iter().collect();
        let raw_names: Vec<String> = sorted.iter().map(|label| label.to_string()).collect();

        // Labels that only differ in type (1 vs "1") collapse on lookup.
        let distinct: BTreeSet<&str> = raw_names.iter().map(String::as_str).collect();
        if distinct.len() != canonical.len() || raw_names.len() != canonical.len() {
            return Err(LoadError::ClassCountMismatch {
                model: model.to_string(),
                found: distinct.len(),
                expected: canonical.len(),
            });
        }

        let pairs: Vec<(String, String)> = raw_names.into_iter().zip(canonical.iter().cloned()).collect();
        let mapping = pairs.iter().cloned().collect();

        Ok(Self { mapping, pairs })
    }

    /// Canonical label for `raw`, or the raw label's string form when the
    /// mapping does not know it.
    pub fn map(&self, raw: &ClassLabel) -> String {
        let key = raw.to_string();
        match self.mapping.get(&key) {
            Some(canonical) => canonical.clone(),
            None => key,
        }
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::testing::labels;

    fn canonical() -> Vec<String> {
        vec![
            "Candidate".to_string(),
            "Confirmed".to_string(),
            "False Positive".to_string(),
        ]
    }

    #[test]
    fn test_maps_by_sorted_rank() {
        let mapper = LabelMapper::build("lr", &labels(&["FP", "CAND", "CONF"]), &canonical()).unwrap();

        assert_eq!(mapper.map(&ClassLabel::from("CAND")), "Candidate");
        assert_eq!(mapper.map(&ClassLabel::from("CONF")), "Confirmed");
        assert_eq!(mapper.map(&ClassLabel::from("FP")), "False Positive");
    }

    #[test]
    fn test_mapping_independent_of_raw_order() {
        let canonical = canonical();
        let orders = [
            ["CANDIDATE", "CONFIRMED", "FALSE POSITIVE"],
            ["FALSE POSITIVE", "CANDIDATE", "CONFIRMED"],
            ["CONFIRMED", "FALSE POSITIVE", "CANDIDATE"],
        ];
        let reference = LabelMapper::build("rf", &labels(&orders[0]), &canonical).unwrap();

        for order in &orders[1..] {
            let mapper = LabelMapper::build("rf", &labels(order), &canonical).unwrap();
            assert_eq!(mapper.pairs(), reference.pairs());
        }

        // Bijection onto the canonical set
        let targets: BTreeSet<&str> = reference.pairs().iter().map(|(_, c)| c.as_str()).collect();
        assert_eq!(targets.len(), 3);
        assert_eq!(reference.len(), 3);
    }

    #[test]
    fn test_integer_labels_sort_numerically() {
        let raw = vec![ClassLabel::Int(10), ClassLabel::Int(2), ClassLabel::Int(-1)];
        let mapper = LabelMapper::build("lr", &raw, &canonical()).unwrap();

        assert_eq!(mapper.map(&ClassLabel::Int(-1)), "Candidate");
        assert_eq!(mapper.map(&ClassLabel::Int(2)), "Confirmed");
        assert_eq!(mapper.map(&ClassLabel::Int(10)), "False Positive");
    }

    #[test]
    fn test_class_count_mismatch() {
        for raw in [
            labels(&["A", "B"]),
            labels(&["A", "B", "C", "D"]),
            labels(&[]),
            labels(&["A", "A", "B"]),
        ] {
            let err = LabelMapper::build("rf", &raw, &canonical()).unwrap_err();
            assert!(matches!(err, LoadError::ClassCountMismatch { expected: 3, .. }));
        }

        let colliding = vec![ClassLabel::Int(1), ClassLabel::from("1"), ClassLabel::from("2")];
        assert!(LabelMapper::build("rf", &colliding, &canonical()).is_err());
    }

    #[test]
    fn test_unknown_label_passes_through() {
        let mapper = LabelMapper::build("lr", &labels(&["a", "b", "c"]), &canonical()).unwrap();
        assert_eq!(mapper.map(&ClassLabel::from("zeta")), "zeta");
        assert_eq!(mapper.map(&ClassLabel::Int(7)), "7");
    }
}
