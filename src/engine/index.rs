//! # Component value indexes
//!
//! Inverted `value -> entity set` maps kept consistent with the live values
//! of indexed and link components.
//!
//! ## Purpose
//! Answer "which entities carry value `V`" in `O(1)` and "which entities carry
//! a value in `[min, max]`" in `O(K log K)` over the `K` distinct values,
//! without scanning component columns.
//!
//! ## Design
//! - [`ValueIndex<K>`] is the shared map shape.
//! - [`ComponentIndex<T>`] files entities under `T::index_key()`.
//! - [`LinkIndex<T>`] files entities under the target entity of a link
//!   component, giving `O(1)` "who points at me" lookups.
//! - Stores hold indexes behind the crate-private `ErasedIndex` trait and feed
//!   them every add, update and remove of the indexed type, whether the change
//!   came from a direct call or from command-buffer playback.
//!
//! ## Invariants
//! - After any add, update or remove, `index[v]` is exactly the set of live
//!   entities whose current value maps to `v`.
//! - Empty buckets are removed, so `distinct_values()` only yields values
//!   carried by at least one entity.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::marker::PhantomData;

use crate::engine::component::{IndexedComponent, LinkComponent};
use crate::engine::entity::Entity;

/// Inverted map from value to the set of entities carrying it.
#[derive(Debug, Clone)]
pub struct ValueIndex<K> {
    buckets: HashMap<K, HashSet<Entity>>,
    entries: usize,
}

impl<K> Default for ValueIndex<K> {
    fn default() -> Self {
        Self { buckets: HashMap::new(), entries: 0 }
    }
}

impl<K: Hash + Eq + Clone> ValueIndex<K> {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Files `entity` under `key`.
    pub fn insert(&mut self, key: K, entity: Entity) {
        if self.buckets.entry(key).or_default().insert(entity) {
            self.entries += 1;
        }
    }

    /// Removes `entity` from `key`, dropping the bucket once empty.
    pub fn remove(&mut self, key: &K, entity: Entity) {
        if let Some(bucket) = self.buckets.get_mut(key) {
            if bucket.remove(&entity) {
                self.entries -= 1;
            }
            if bucket.is_empty() {
                self.buckets.remove(key);
            }
        }
    }

    /// Entities filed under `key`.
    pub fn entities_with(&self, key: &K) -> impl Iterator<Item = Entity> + '_ {
        self.buckets.get(key).into_iter().flat_map(|bucket| bucket.iter().copied())
    }

    /// Number of entities filed under `key`.
    pub fn count_with(&self, key: &K) -> usize {
        self.buckets.get(key).map_or(0, HashSet::len)
    }

    /// Returns `true` if `entity` is filed under `key`.
    pub fn contains(&self, key: &K, entity: Entity) -> bool {
        self.buckets.get(key).map_or(false, |bucket| bucket.contains(&entity))
    }

    /// Distinct values carried by at least one entity.
    pub fn distinct_values(&self) -> impl Iterator<Item = &K> + '_ {
        self.buckets.keys()
    }

    /// Number of distinct values.
    pub fn distinct_len(&self) -> usize {
        self.buckets.len()
    }

    /// Total number of `(value, entity)` entries.
    pub fn len(&self) -> usize {
        self.entries
    }

    /// Returns `true` if nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }
}

impl<K: Hash + Eq + Clone + Ord> ValueIndex<K> {
    /// Entities whose value lies in `[min, max]`, grouped by ascending value.
    ///
    /// `min > max` yields an empty result.
    pub fn entities_in_range(&self, min: &K, max: &K) -> Vec<Entity> {
        if min > max {
            return Vec::new();
        }
        let mut keys: Vec<&K> = self.buckets.keys().filter(|key| *key >= min && *key <= max).collect();
        keys.sort_unstable();
        let mut result = Vec::new();
        for key in keys {
            if let Some(bucket) = self.buckets.get(key) {
                let start = result.len();
                result.extend(bucket.iter().copied());
                result[start..].sort_unstable_by_key(|entity: &Entity| entity.id);
            }
        }
        result
    }
}

/// Type-erased hooks a store drives on every change of an indexed component.
pub(crate) trait ErasedIndex: Send + Sync {
    fn insert_value(&mut self, entity: Entity, value: &dyn Any);
    fn remove_value(&mut self, entity: Entity, value: &dyn Any);
    /// Target of a link value; `None` for non-link indexes.
    fn link_target(&self, value: &dyn Any) -> Option<Entity>;
    /// Sources pointing at `target`; empty for non-link indexes.
    fn link_sources(&self, target: Entity) -> Vec<Entity>;
    fn as_any(&self) -> &dyn Any;
}

/// Value index over an [`IndexedComponent`].
pub struct ComponentIndex<T: IndexedComponent> {
    values: ValueIndex<T::Key>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: IndexedComponent> ComponentIndex<T> {
    pub(crate) fn new() -> Self {
        Self { values: ValueIndex::new(), _marker: PhantomData }
    }

    /// Entities whose value maps to `key`.
    pub fn entities_with(&self, key: &T::Key) -> impl Iterator<Item = Entity> + '_ {
        self.values.entities_with(key)
    }

    /// Number of entities whose value maps to `key`.
    pub fn count_with(&self, key: &T::Key) -> usize {
        self.values.count_with(key)
    }

    /// Entities whose value lies in `[min, max]`.
    pub fn entities_in_range(&self, min: &T::Key, max: &T::Key) -> Vec<Entity> {
        self.values.entities_in_range(min, max)
    }

    /// Distinct keys currently in use.
    pub fn distinct_values(&self) -> impl Iterator<Item = &T::Key> + '_ {
        self.values.distinct_values()
    }

    /// Underlying map.
    pub fn values(&self) -> &ValueIndex<T::Key> {
        &self.values
    }
}

impl<T: IndexedComponent> ErasedIndex for ComponentIndex<T> {
    fn insert_value(&mut self, entity: Entity, value: &dyn Any) {
        if let Some(value) = value.downcast_ref::<T>() {
            self.values.insert(value.index_key(), entity);
        }
    }

    fn remove_value(&mut self, entity: Entity, value: &dyn Any) {
        if let Some(value) = value.downcast_ref::<T>() {
            self.values.remove(&value.index_key(), entity);
        }
    }

    fn link_target(&self, _value: &dyn Any) -> Option<Entity> {
        None
    }

    fn link_sources(&self, _target: Entity) -> Vec<Entity> {
        Vec::new()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Target index over a [`LinkComponent`].
pub struct LinkIndex<T: LinkComponent> {
    targets: ValueIndex<Entity>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: LinkComponent> LinkIndex<T> {
    pub(crate) fn new() -> Self {
        Self { targets: ValueIndex::new(), _marker: PhantomData }
    }

    /// Entities whose link component points at `target`.
    pub fn sources_of(&self, target: Entity) -> impl Iterator<Item = Entity> + '_ {
        self.targets.entities_with(&target)
    }

    /// Distinct targets currently linked to.
    pub fn targets(&self) -> impl Iterator<Item = Entity> + '_ {
        self.targets.distinct_values().copied()
    }

    /// Underlying map.
    pub fn values(&self) -> &ValueIndex<Entity> {
        &self.targets
    }
}

impl<T: LinkComponent> ErasedIndex for LinkIndex<T> {
    fn insert_value(&mut self, entity: Entity, value: &dyn Any) {
        if let Some(value) = value.downcast_ref::<T>() {
            self.targets.insert(value.target(), entity);
        }
    }

    fn remove_value(&mut self, entity: Entity, value: &dyn Any) {
        if let Some(value) = value.downcast_ref::<T>() {
            self.targets.remove(&value.target(), entity);
        }
    }

    fn link_target(&self, value: &dyn Any) -> Option<Entity> {
        value.downcast_ref::<T>().map(LinkComponent::target)
    }

    fn link_sources(&self, target: Entity) -> Vec<Entity> {
        let mut sources: Vec<Entity> = self.targets.entities_with(&target).collect();
        sources.sort_unstable();
        sources
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
