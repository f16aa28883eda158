//! Variable orderings.
//!
//! An [`Ordering`] assigns every key a slot `0..n`. Slots are contiguous and the mapping
//! is injective; together with the dimensions of the stored values it determines where
//! each variable lives in a tangent vector and in the columns of a linear system. The
//! same ordering must be used for every step of an optimization run.
//!
//! Orderings are built by hand, from the insertion order of a store
//! ([`Ordering::natural`]) or by an [`OrderingBuilder`] looking at which variables
//! appear together in the objective. [`MinimumDegreeOrdering`] is a greedy
//! fill-reducing heuristic over that dependency structure.

use crate::core::{CoreError, CoreResult, key::Key, values::Values};
use std::collections::{BTreeSet, HashMap};

/// Injective mapping from keys to contiguous slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ordering {
    keys: Vec<Key>,
    slots: HashMap<Key, usize>,
}

impl Ordering {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ordering with slots assigned in iteration order.
    pub fn from_keys<I: IntoIterator<Item = Key>>(keys: I) -> CoreResult<Self> {
        let mut ordering = Ordering::new();
        for key in keys {
            ordering.push(key)?;
        }
        Ok(ordering)
    }

    /// Insertion order of `values`.
    pub fn natural(values: &Values) -> Self {
        let keys = values.keys();
        let slots = keys.iter().enumerate().map(|(i, k)| (*k, i)).collect();
        Ordering { keys, slots }
    }

    /// Append `key` to the next free slot and return that slot.
    pub fn push(&mut self, key: Key) -> CoreResult<usize> {
        if self.slots.contains_key(&key) {
            return Err(CoreError::InvalidOrdering(format!(
                "key {key} is ordered twice"
            )));
        }
        let slot = self.keys.len();
        self.slots.insert(key, slot);
        self.keys.push(key);
        Ok(slot)
    }

    pub fn slot(&self, key: &Key) -> Option<usize> {
        self.slots.get(key).copied()
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.slots.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys by slot.
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn iter(&self) -> impl Iterator<Item = (Key, usize)> + '_ {
        self.keys.iter().enumerate().map(|(slot, key)| (*key, slot))
    }
}

/// Strategy for computing an ordering from the objective's dependency structure.
///
/// `structure` lists, per objective term, the keys that term depends on. Every key of
/// `structure` must appear in `keys`, and the result must cover exactly `keys`.
pub trait OrderingBuilder {
    fn build(&self, keys: &[Key], structure: &[Vec<Key>]) -> CoreResult<Ordering>;
}

/// Keys in the order they are given.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalOrdering;

impl OrderingBuilder for NaturalOrdering {
    fn build(&self, keys: &[Key], structure: &[Vec<Key>]) -> CoreResult<Ordering> {
        let ordering = Ordering::from_keys(keys.iter().copied())?;
        check_structure(&ordering, structure)?;
        Ok(ordering)
    }
}

/// Greedy minimum-degree elimination ordering.
///
/// Repeatedly eliminates the variable with the fewest remaining neighbours, connecting
/// its neighbours to each other. Ties go to the key given first, so the result is
/// deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinimumDegreeOrdering;

impl OrderingBuilder for MinimumDegreeOrdering {
    fn build(&self, keys: &[Key], structure: &[Vec<Key>]) -> CoreResult<Ordering> {
        let positions = Ordering::from_keys(keys.iter().copied())?;
        check_structure(&positions, structure)?;

        let n = keys.len();
        let mut adjacency: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
        for term in structure {
            let members: Vec<usize> = term.iter().filter_map(|k| positions.slot(k)).collect();
            for &a in &members {
                for &b in &members {
                    if a != b {
                        adjacency[a].insert(b);
                    }
                }
            }
        }

        let mut eliminated = vec![false; n];
        let mut ordering = Ordering::new();
        for _ in 0..n {
            let next = (0..n)
                .filter(|&v| !eliminated[v])
                .min_by_key(|&v| (adjacency[v].len(), v));
            let Some(v) = next else { break };

            let neighbours: Vec<usize> = adjacency[v].iter().copied().collect();
            for &a in &neighbours {
                adjacency[a].remove(&v);
                for &b in &neighbours {
                    if a != b {
                        adjacency[a].insert(b);
                    }
                }
            }
            adjacency[v].clear();
            eliminated[v] = true;
            ordering.push(keys[v])?;
        }
        Ok(ordering)
    }
}

fn check_structure(ordering: &Ordering, structure: &[Vec<Key>]) -> CoreResult<()> {
    match structure.iter().flatten().find(|k| !ordering.contains(k)) {
        Some(key) => Err(CoreError::KeyDoesNotExist {
            operation: "order",
            key: *key,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn x(i: u64) -> Key {
        Key::new('x', i)
    }

    #[test]
    fn test_from_keys_rejects_duplicates() {
        let result = Ordering::from_keys([x(0), x(1), x(0)]);
        assert!(matches!(result, Err(CoreError::InvalidOrdering(_))));
    }

    #[test]
    fn test_slots_are_contiguous() -> TestResult {
        let ordering = Ordering::from_keys([x(5), x(2), x(9)])?;
        assert_eq!(ordering.slot(&x(5)), Some(0));
        assert_eq!(ordering.slot(&x(2)), Some(1));
        assert_eq!(ordering.slot(&x(9)), Some(2));
        assert_eq!(ordering.slot(&x(0)), None);
        assert_eq!(ordering.keys(), &[x(5), x(2), x(9)]);
        assert_eq!(
            ordering.iter().collect::<Vec<_>>(),
            vec![(x(5), 0), (x(2), 1), (x(9), 2)]
        );
        Ok(())
    }

    #[test]
    fn test_natural_follows_insertion_order() -> TestResult {
        let mut values = Values::new();
        values.insert(x(3), &1.0_f64)?;
        values.insert(x(1), &1.0_f64)?;
        values.insert(x(2), &1.0_f64)?;
        let ordering = Ordering::natural(&values);
        assert_eq!(ordering.keys(), &[x(3), x(1), x(2)]);
        Ok(())
    }

    #[test]
    fn test_natural_builder_checks_structure() {
        let keys = [x(0), x(1)];
        let structure = vec![vec![x(0), x(7)]];
        assert_eq!(
            NaturalOrdering.build(&keys, &structure),
            Err(CoreError::KeyDoesNotExist {
                operation: "order",
                key: x(7)
            })
        );
    }

    #[test]
    fn test_minimum_degree_star_defers_center() -> TestResult {
        let center = Key::new('c', 0);
        let keys = [center, x(1), x(2), x(3)];
        let structure = vec![vec![center, x(1)], vec![center, x(2)], vec![center, x(3)]];

        let ordering = MinimumDegreeOrdering.build(&keys, &structure)?;
        // once two leaves are gone the center and the last leaf tie at degree one
        assert_eq!(ordering.keys(), &[x(1), x(2), center, x(3)]);
        Ok(())
    }

    #[test]
    fn test_minimum_degree_chain() -> TestResult {
        let keys = [x(2), x(0), x(1), x(3)];
        let structure = vec![vec![x(0), x(1)], vec![x(1), x(2)], vec![x(2), x(3)]];

        let ordering = MinimumDegreeOrdering.build(&keys, &structure)?;
        // x0 and x3 both have degree one; x0 is listed first
        assert_eq!(ordering.keys(), &[x(0), x(1), x(2), x(3)]);
        Ok(())
    }

    #[test]
    fn test_minimum_degree_covers_isolated_keys() -> TestResult {
        let keys = [x(0), x(1), x(2)];
        let structure = vec![vec![x(0), x(1)], vec![x(1)]];

        let ordering = MinimumDegreeOrdering.build(&keys, &structure)?;
        assert_eq!(ordering.len(), 3);
        assert!(keys.iter().all(|k| ordering.contains(k)));
        // isolated key has degree zero
        assert_eq!(ordering.slot(&x(2)), Some(0));
        Ok(())
    }
}
