//! The variable store.
//!
//! [`Values`] maps [`Key`]s to manifold-valued variables of arbitrary concrete type. Each
//! entry is an owned clone behind `Box<dyn Value>`, so the store never aliases the
//! caller's objects and cloning a store is a deep copy. Entries keep their insertion
//! order.
//!
//! The concrete type bound to a key is fixed for the key's lifetime: [`Values::update`]
//! with a value of a different type fails with [`CoreError::IncorrectType`] instead of
//! overwriting. Type checks compare [`TypeId`](std::any::TypeId)s of the most derived
//! type.
//!
//! Bulk manifold operations take an [`Ordering`] that lays the keys out in a tangent
//! vector. [`Values::retract`] is pure: it returns a new store and leaves the receiver
//! untouched, which is what lets the optimizer try a step and throw it away.
//!
//! Every fallible operation validates before it mutates, so an error always leaves the
//! store in its pre-call state.
//!
//! # Example
//!
//! ```
//! use manifold_lm::core::{key::Key, ordering::Ordering, values::Values};
//! use manifold_lm::manifold::{pose2::Pose2, rot2::Rot2};
//! use nalgebra::DVector;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut values = Values::new();
//! values.insert(Key::new('x', 0), &Pose2::new(0.0, 0.0, 0.0))?;
//! values.insert(Key::new('r', 0), &Rot2::from_angle(0.5))?;
//!
//! let ordering = Ordering::natural(&values);
//! assert_eq!(values.total_dimension(&ordering)?, 4);
//!
//! let delta = DVector::from_vec(vec![1.0, 0.0, 0.0, 0.25]);
//! let moved = values.retract(&delta, &ordering)?;
//! assert!((moved.retrieve::<Rot2>(&Key::new('r', 0))?.angle() - 0.75).abs() < 1e-12);
//! # Ok(())
//! # }
//! ```

use crate::core::{CoreError, CoreResult, key::Key, ordering::Ordering};
use crate::manifold::{Manifold, ManifoldError, Value};
use nalgebra::DVector;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};

/// Insertion-ordered, type-erased store of manifold-valued variables.
#[derive(Debug, Clone, Default)]
pub struct Values {
    entries: Vec<(Key, Box<dyn Value>)>,
    positions: HashMap<Key, usize>,
}

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn exists(&self, key: &Key) -> bool {
        self.positions.contains_key(key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<Key> {
        self.entries.iter().map(|(key, _)| *key).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Key, &dyn Value)> + '_ {
        self.entries
            .iter()
            .map(|(key, value)| (*key, value.as_ref()))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.positions.clear();
    }

    /// Insert a clone of `value` under `key`.
    pub fn insert<T: Manifold>(&mut self, key: Key, value: &T) -> CoreResult<()> {
        self.insert_boxed(key, Box::new(value.clone()))
    }

    /// Insert an already type-erased value.
    pub fn insert_boxed(&mut self, key: Key, value: Box<dyn Value>) -> CoreResult<()> {
        if self.exists(&key) {
            return Err(CoreError::KeyAlreadyExists { key });
        }
        self.positions.insert(key, self.entries.len());
        self.entries.push((key, value));
        Ok(())
    }

    /// Replace the value under `key` with a clone of `value`.
    ///
    /// The stored and new value must have the same concrete type.
    pub fn update<T: Manifold>(&mut self, key: Key, value: &T) -> CoreResult<()> {
        self.update_boxed(key, Box::new(value.clone()))
    }

    pub fn update_boxed(&mut self, key: Key, value: Box<dyn Value>) -> CoreResult<()> {
        let position = self.checked_update_position(key, value.as_ref())?;
        self.entries[position].1 = value;
        Ok(())
    }

    /// Remove `key` and drop its value. Remaining entries keep their relative order.
    pub fn erase(&mut self, key: &Key) -> CoreResult<()> {
        let position = self.position(key, "erase")?;
        self.entries.remove(position);
        self.positions.remove(key);
        for (k, _) in &self.entries[position..] {
            if let Some(p) = self.positions.get_mut(k) {
                *p -= 1;
            }
        }
        Ok(())
    }

    /// Erased access to the value under `key`.
    pub fn at(&self, key: &Key) -> CoreResult<&dyn Value> {
        let position = self.position(key, "retrieve")?;
        Ok(self.entries[position].1.as_ref())
    }

    /// Typed access to the value under `key`.
    pub fn retrieve<T: Manifold>(&self, key: &Key) -> CoreResult<&T> {
        let value = self.at(key)?;
        value
            .downcast_ref::<T>()
            .ok_or_else(|| CoreError::IncorrectType {
                key: *key,
                stored: value.type_name(),
                requested: std::any::type_name::<T>(),
            })
    }

    /// `TypeId` of the value stored under `key`, if any.
    pub fn type_id_of(&self, key: &Key) -> Option<TypeId> {
        self.at(key).ok().map(|value| value.value_type_id())
    }

    /// Insert every entry of `other`. Nothing is inserted if any key already exists.
    pub fn insert_all(&mut self, other: &Values) -> CoreResult<()> {
        if let Some(key) = other.entries.iter().map(|(k, _)| k).find(|k| self.exists(k)) {
            return Err(CoreError::KeyAlreadyExists { key: *key });
        }
        for (key, value) in &other.entries {
            self.insert_boxed(*key, value.clone())?;
        }
        Ok(())
    }

    /// Update every entry of `other`. Nothing is updated if any key is missing or has a
    /// different concrete type.
    pub fn update_all(&mut self, other: &Values) -> CoreResult<()> {
        let mut positions = Vec::with_capacity(other.len());
        for (key, value) in &other.entries {
            positions.push(self.checked_update_position(*key, value.as_ref())?);
        }
        for (position, (_, value)) in positions.into_iter().zip(&other.entries) {
            self.entries[position].1 = value.clone();
        }
        Ok(())
    }

    /// Total tangent dimension of all stored values.
    pub fn dim(&self) -> usize {
        self.entries.iter().map(|(_, value)| value.dim()).sum()
    }

    /// Per-slot dimensions, in ordering order.
    pub fn dims(&self, ordering: &Ordering) -> CoreResult<Vec<usize>> {
        self.check_ordering(ordering)?;
        let mut dims = vec![0; ordering.len()];
        for (key, value) in &self.entries {
            if let Some(slot) = ordering.slot(key) {
                dims[slot] = value.dim();
            }
        }
        Ok(dims)
    }

    pub fn total_dimension(&self, ordering: &Ordering) -> CoreResult<usize> {
        Ok(self.dims(ordering)?.iter().sum())
    }

    /// Zero tangent vector laid out by `ordering`.
    pub fn zero_vectors(&self, ordering: &Ordering) -> CoreResult<DVector<f64>> {
        Ok(DVector::zeros(self.total_dimension(ordering)?))
    }

    /// Starting offset of every slot in a tangent vector, and the total dimension.
    pub fn offsets(&self, ordering: &Ordering) -> CoreResult<(Vec<usize>, usize)> {
        let dims = self.dims(ordering)?;
        let mut offsets = Vec::with_capacity(dims.len());
        let mut total = 0;
        for dim in dims {
            offsets.push(total);
            total += dim;
        }
        Ok((offsets, total))
    }

    /// Retract every value by its slice of `delta`, returning a new store.
    pub fn retract(&self, delta: &DVector<f64>, ordering: &Ordering) -> CoreResult<Values> {
        let (offsets, total) = self.offsets(ordering)?;
        if delta.len() != total {
            return Err(CoreError::SizeMismatch(format!(
                "tangent vector has {} entries, ordering requires {}",
                delta.len(),
                total
            )));
        }

        let mut entries = Vec::with_capacity(self.entries.len());
        for (key, value) in &self.entries {
            let slot = ordering.slot(key).ok_or(CoreError::KeyDoesNotExist {
                operation: "retract",
                key: *key,
            })?;
            let sub = delta.rows(offsets[slot], value.dim()).into_owned();
            entries.push((*key, value.retract_value(&sub)?));
        }

        Ok(Values {
            entries,
            positions: self.positions.clone(),
        })
    }

    /// Tangent vector taking every value of `self` to the matching value of `other`.
    ///
    /// Values are matched by key. Both stores must hold the same keys with the same
    /// concrete types.
    pub fn local_coordinates(&self, other: &Values, ordering: &Ordering) -> CoreResult<DVector<f64>> {
        if self.len() != other.len() {
            return Err(CoreError::SizeMismatch(format!(
                "stores hold {} and {} values",
                self.len(),
                other.len()
            )));
        }
        if let Some(key) = self.entries.iter().map(|(k, _)| k).find(|k| !other.exists(k)) {
            return Err(CoreError::SizeMismatch(format!(
                "key {key} is missing from the other store"
            )));
        }

        let (offsets, total) = self.offsets(ordering)?;
        let mut delta = DVector::zeros(total);
        for (key, value) in &self.entries {
            let (slot, theirs) = match (ordering.slot(key), other.at(key)) {
                (Some(slot), Ok(theirs)) => (slot, theirs),
                _ => {
                    return Err(CoreError::SizeMismatch(format!(
                        "key {key} cannot be matched"
                    )));
                }
            };
            let local = value
                .local_coordinates_value(theirs)
                .map_err(|e| match e {
                    ManifoldError::TypeMismatch { .. } => CoreError::IncorrectType {
                        key: *key,
                        stored: value.type_name(),
                        requested: theirs.type_name(),
                    },
                    e => CoreError::from(e),
                })?;
            if local.len() != value.dim() {
                return Err(CoreError::SizeMismatch(format!(
                    "local coordinates of {key} have {} entries, expected {}",
                    local.len(),
                    value.dim()
                )));
            }
            delta.rows_mut(offsets[slot], local.len()).copy_from(&local);
        }
        Ok(delta)
    }

    /// Same keys, same concrete types and pairwise `equals` within `tolerance`.
    pub fn equals(&self, other: &Values, tolerance: f64) -> bool {
        self.len() == other.len()
            && self.entries.iter().all(|(key, value)| {
                other
                    .at(key)
                    .is_ok_and(|theirs| value.equals_value(theirs, tolerance))
            })
    }

    fn position(&self, key: &Key, operation: &'static str) -> CoreResult<usize> {
        self.positions
            .get(key)
            .copied()
            .ok_or(CoreError::KeyDoesNotExist {
                operation,
                key: *key,
            })
    }

    fn checked_update_position(&self, key: Key, value: &dyn Value) -> CoreResult<usize> {
        let position = self.position(&key, "update")?;
        let stored = self.entries[position].1.as_ref();
        if stored.value_type_id() != value.value_type_id() {
            return Err(CoreError::IncorrectType {
                key,
                stored: stored.type_name(),
                requested: value.type_name(),
            });
        }
        Ok(position)
    }

    /// The ordering must place exactly the stored keys.
    fn check_ordering(&self, ordering: &Ordering) -> CoreResult<()> {
        if ordering.len() != self.len() {
            return Err(CoreError::SizeMismatch(format!(
                "ordering has {} keys, store has {}",
                ordering.len(),
                self.len()
            )));
        }
        match self.entries.iter().find(|(key, _)| !ordering.contains(key)) {
            Some((key, _)) => Err(CoreError::SizeMismatch(format!(
                "key {key} is not in the ordering"
            ))),
            None => Ok(()),
        }
    }
}

impl Display for Values {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Values with {} entries:", self.len())?;
        for (key, value) in &self.entries {
            writeln!(f, "  {key}: {value}")?;
        }
        Ok(())
    }
}
