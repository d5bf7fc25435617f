//! Bounded cartesian-product sampler over per-field candidate sequences
//!
//! When several fields each contribute multiple candidate patterns, the full
//! cartesian product explodes. The scheduler emits "lock-step" combinations
//! first — combination *i* pairs candidate `i mod len` of every field — so
//! every candidate of every field appears in at least one early combination
//! before the cap is reached. Only then does it fall back to full
//! cartesian-product enumeration, skipping what lock-step already emitted.
//! Everything is lazy: nothing beyond what the consumer pulls is computed.

use std::collections::HashSet;
use std::hash::Hash;

use indexmap::IndexMap;

use crate::error::EngineError;

/// Default cap applied by the derivation algorithms
pub const DEFAULT_MAX_COMBINATIONS: usize = 64;

/// A capped combination schedule over named candidate sequences
#[derive(Debug, Clone)]
pub struct CombinationSpec<K, V> {
    fields: Vec<(K, Vec<V>)>,
    max_combinations: usize,
}

impl<K, V> CombinationSpec<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    /// Build a schedule; fields with no candidates contribute nothing and are
    /// dropped, and a cap below 1 is invalid configuration
    pub fn new(
        fields: Vec<(K, Vec<V>)>,
        max_combinations: usize,
    ) -> Result<Self, EngineError> {
        if max_combinations < 1 {
            return Err(EngineError::InvalidCombinationCap(max_combinations));
        }
        let fields = fields
            .into_iter()
            .filter(|(_, candidates)| !candidates.is_empty())
            .collect();
        Ok(CombinationSpec {
            fields,
            max_combinations,
        })
    }

    pub fn combinations(&self) -> Combinations<K, V> {
        let lockstep_rounds = self
            .fields
            .iter()
            .map(|(_, candidates)| candidates.len())
            .max()
            .unwrap_or(0);
        Combinations {
            fields: self.fields.clone(),
            max_combinations: self.max_combinations,
            emitted: 0,
            lockstep_rounds,
            round: 0,
            seen: HashSet::new(),
            odometer: None,
            exhausted: self.fields.is_empty(),
        }
    }
}

/// Lazy iterator over combination maps
pub struct Combinations<K, V> {
    fields: Vec<(K, Vec<V>)>,
    max_combinations: usize,
    emitted: usize,
    lockstep_rounds: usize,
    round: usize,
    seen: HashSet<Vec<usize>>,
    odometer: Option<Vec<usize>>,
    exhausted: bool,
}

impl<K, V> Combinations<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    fn assemble(&self, indices: &[usize]) -> IndexMap<K, V> {
        self.fields
            .iter()
            .zip(indices)
            .map(|((key, candidates), &i)| (key.clone(), candidates[i].clone()))
            .collect()
    }

    /// Advance the odometer to the next index vector, most-significant last
    fn bump_odometer(&mut self) -> Option<Vec<usize>> {
        if self.odometer.is_none() {
            let start = vec![0; self.fields.len()];
            self.odometer = Some(start.clone());
            return Some(start);
        }
        let sizes: Vec<usize> = self.fields.iter().map(|(_, c)| c.len()).collect();
        let indices = self.odometer.as_mut().expect("odometer was initialized");
        for position in (0..indices.len()).rev() {
            indices[position] += 1;
            if indices[position] < sizes[position] {
                return Some(indices.clone());
            }
            indices[position] = 0;
        }
        None
    }
}

impl<K, V> Iterator for Combinations<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    type Item = IndexMap<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted || self.emitted >= self.max_combinations {
            return None;
        }

        // phase 1: lock-step, wrapping exhausted fields round-robin
        if self.round < self.lockstep_rounds {
            let indices: Vec<usize> = self
                .fields
                .iter()
                .map(|(_, candidates)| self.round % candidates.len())
                .collect();
            self.round += 1;
            self.seen.insert(indices.clone());
            self.emitted += 1;
            return Some(self.assemble(&indices));
        }

        // phase 2: cartesian product, skipping lock-step emissions
        loop {
            let indices = match self.bump_odometer() {
                Some(indices) => indices,
                None => {
                    self.exhausted = true;
                    return None;
                }
            };
            if self.seen.contains(&indices) {
                continue;
            }
            self.emitted += 1;
            return Some(self.assemble(&indices));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pairs<'a>(combo: &'a IndexMap<&'a str, i64>) -> Vec<(&'a str, i64)> {
        combo.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn test_cap_respected_with_lockstep_prefix() {
        let spec = CombinationSpec::new(
            vec![("a", vec![1, 2, 3]), ("b", vec![10, 20])],
            4,
        )
        .unwrap();
        let combos: Vec<_> = spec.combinations().collect();

        assert_eq!(combos.len(), 4);
        // lock-step pairs come first
        assert_eq!(pairs(&combos[0]), vec![("a", 1), ("b", 10)]);
        assert_eq!(pairs(&combos[1]), vec![("a", 2), ("b", 20)]);
        // the shorter field wraps round-robin so candidate 3 still appears
        assert_eq!(pairs(&combos[2]), vec![("a", 3), ("b", 10)]);
    }

    #[test]
    fn test_cartesian_fallback_skips_lockstep_duplicates() {
        let spec = CombinationSpec::new(
            vec![("a", vec![1, 2]), ("b", vec![10, 20])],
            100,
        )
        .unwrap();
        let combos: Vec<_> = spec.combinations().collect();

        // 2x2 product, no duplicates
        assert_eq!(combos.len(), 4);
        let mut seen: Vec<Vec<(&str, i64)>> = combos.iter().map(pairs).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn test_every_candidate_appears_before_cap() {
        let spec = CombinationSpec::new(
            vec![("a", vec![1, 2, 3, 4, 5]), ("b", vec![10]), ("c", vec![7, 8])],
            5,
        )
        .unwrap();
        let combos: Vec<_> = spec.combinations().collect();
        assert_eq!(combos.len(), 5);
        for candidate in [1, 2, 3, 4, 5] {
            assert!(combos.iter().any(|c| c["a"] == candidate));
        }
        for candidate in [7, 8] {
            assert!(combos.iter().any(|c| c["c"] == candidate));
        }
    }

    #[test]
    fn test_empty_field_is_dropped() {
        let spec = CombinationSpec::new(
            vec![("a", vec![1]), ("b", Vec::<i64>::new())],
            10,
        )
        .unwrap();
        let combos: Vec<_> = spec.combinations().collect();
        assert_eq!(combos.len(), 1);
        assert!(!combos[0].contains_key("b"));
    }

    #[test]
    fn test_all_fields_empty_yields_nothing() {
        let spec = CombinationSpec::new(
            vec![("a", Vec::<i64>::new()), ("b", Vec::<i64>::new())],
            10,
        )
        .unwrap();
        assert_eq!(spec.combinations().count(), 0);
    }

    #[test]
    fn test_zero_cap_is_invalid() {
        let result = CombinationSpec::new(vec![("a", vec![1])], 0);
        assert!(matches!(result, Err(EngineError::InvalidCombinationCap(0))));
    }

    #[test]
    fn test_laziness_is_preserved() {
        // a product far too large to materialize still serves the first pulls
        let big: Vec<i64> = (0..1000).collect();
        let spec = CombinationSpec::new(
            vec![("a", big.clone()), ("b", big.clone()), ("c", big)],
            usize::MAX,
        )
        .unwrap();
        let first: Vec<_> = spec.combinations().take(3).collect();
        assert_eq!(first.len(), 3);
    }
}
