//! # Relations
//!
//! Multi-valued, key-addressed components. An entity may own any number of
//! values of one relation type, distinguished by [`Relation::relation_key`].
//!
//! ## Storage model
//! One [`RelationTable<R>`] per relation type:
//!
//! ```text
//! values:    [R; n]          dense, swap-remove on delete
//! owners:    [Entity; n]     owner of each row
//! positions: id -> [row]     rows owned by an entity, in insertion order
//! incoming:  target -> [src] reverse map for link relations
//! ```
//!
//! ## Invariants
//! - `positions[id].len()` equals the number of rows whose owner is `id`.
//! - An id with no rows has no `positions` entry.
//! - For every row `r`, `positions[owners[r].id]` contains `r` exactly once.
//! - For every link row, `incoming[target]` contains its owner once per row.

use std::any::Any;
use std::collections::HashMap;

use smallvec::SmallVec;

use crate::engine::component::Relation;
use crate::engine::entity::Entity;
use crate::engine::types::EntityID;

type Positions = SmallVec<[u32; 4]>;

/// Storage for every value of one relation type.
pub struct RelationTable<R: Relation> {
    values: Vec<R>,
    owners: Vec<Entity>,
    positions: HashMap<EntityID, Positions>,
    incoming: HashMap<Entity, SmallVec<[Entity; 4]>>,
}

impl<R: Relation> Default for RelationTable<R> {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            owners: Vec::new(),
            positions: HashMap::new(),
            incoming: HashMap::new(),
        }
    }
}

impl<R: Relation> RelationTable<R> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of relation rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the table holds no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All rows, in storage order.
    #[inline]
    pub fn values(&self) -> &[R] {
        &self.values
    }

    /// Owners parallel to [`values`](Self::values).
    #[inline]
    pub fn owners(&self) -> &[Entity] {
        &self.owners
    }

    /// Returns `true` if `owner` has a position-map entry.
    #[inline]
    pub fn contains_owner(&self, owner: Entity) -> bool {
        self.positions.contains_key(&owner.id)
    }

    fn find_row(&self, owner: Entity, key: &R::Key) -> Option<(usize, u32)> {
        self.positions.get(&owner.id)?.iter().enumerate().find_map(|(slot, &row)| {
            (self.values[row as usize].relation_key() == *key).then_some((slot, row))
        })
    }

    /// Adds `value`, or replaces the value with the same key.
    ///
    /// ## Returns
    /// The replaced value, if one existed.
    pub fn insert(&mut self, owner: Entity, value: R) -> Option<R> {
        let key = value.relation_key();
        if let Some((_, row)) = self.find_row(owner, &key) {
            let previous = std::mem::replace(&mut self.values[row as usize], value);
            if let Some(target) = previous.link_target() {
                self.unlink(target, owner);
            }
            if let Some(target) = self.values[row as usize].link_target() {
                self.incoming.entry(target).or_default().push(owner);
            }
            return Some(previous);
        }

        let row = self.values.len() as u32;
        if let Some(target) = value.link_target() {
            self.incoming.entry(target).or_default().push(owner);
        }
        self.values.push(value);
        self.owners.push(owner);
        self.positions.entry(owner.id).or_default().push(row);
        None
    }

    /// Returns the value of `owner` with `key`.
    pub fn get(&self, owner: Entity, key: &R::Key) -> Option<&R> {
        self.find_row(owner, key).map(|(_, row)| &self.values[row as usize])
    }

    /// Values owned by `owner`, in insertion order.
    pub fn relations_of(&self, owner: Entity) -> impl Iterator<Item = &R> + '_ {
        self.positions
            .get(&owner.id)
            .into_iter()
            .flat_map(move |rows| rows.iter().map(move |&row| &self.values[row as usize]))
    }

    /// Number of values owned by `owner`.
    pub fn count_of(&self, owner: Entity) -> usize {
        self.positions.get(&owner.id).map_or(0, |rows| rows.len())
    }

    /// Owners of link relations pointing at `target`.
    pub fn sources_of(&self, target: Entity) -> impl Iterator<Item = Entity> + '_ {
        self.incoming.get(&target).into_iter().flat_map(|sources| sources.iter().copied())
    }

    /// Removes the value of `owner` with `key`.
    pub fn remove(&mut self, owner: Entity, key: &R::Key) -> Option<R> {
        let (slot, row) = self.find_row(owner, key)?;
        Some(self.remove_at(owner, slot, row))
    }

    fn remove_at(&mut self, owner: Entity, slot: usize, row: u32) -> R {
        if let Some(rows) = self.positions.get_mut(&owner.id) {
            rows.remove(slot);
            if rows.is_empty() {
                self.positions.remove(&owner.id);
            }
        }

        let last = (self.values.len() - 1) as u32;
        let value = self.values.swap_remove(row as usize);
        self.owners.swap_remove(row as usize);
        if row != last {
            let moved_owner = self.owners[row as usize];
            if let Some(rows) = self.positions.get_mut(&moved_owner.id) {
                if let Some(position) = rows.iter_mut().find(|position| **position == last) {
                    *position = row;
                }
            }
        }

        if let Some(target) = value.link_target() {
            self.unlink(target, owner);
        }
        value
    }

    /// Removes every value owned by `owner`, in insertion order.
    pub fn remove_all_of(&mut self, owner: Entity) -> Vec<R> {
        let mut removed = Vec::with_capacity(self.count_of(owner));
        while let Some(&row) = self.positions.get(&owner.id).and_then(|rows| rows.first()) {
            removed.push(self.remove_at(owner, 0, row));
        }
        removed
    }

    /// Removes every link relation pointing at `target`.
    ///
    /// ## Returns
    /// The distinct owners that lost at least one relation.
    pub fn remove_links_to(&mut self, target: Entity) -> Vec<Entity> {
        let Some(sources) = self.incoming.get(&target).cloned() else {
            return Vec::new();
        };
        let mut touched: Vec<Entity> = Vec::with_capacity(sources.len());
        for source in sources {
            let found = self.positions.get(&source.id).and_then(|rows| {
                rows.iter().enumerate().find_map(|(slot, &row)| {
                    (self.values[row as usize].link_target() == Some(target)).then_some((slot, row))
                })
            });
            if let Some((slot, row)) = found {
                self.remove_at(source, slot, row);
                if !touched.contains(&source) {
                    touched.push(source);
                }
            }
        }
        self.incoming.remove(&target);
        touched
    }

    fn unlink(&mut self, target: Entity, owner: Entity) {
        if let Some(sources) = self.incoming.get_mut(&target) {
            if let Some(index) = sources.iter().position(|source| *source == owner) {
                sources.remove(index);
            }
            if sources.is_empty() {
                self.incoming.remove(&target);
            }
        }
    }
}

/// Type-erased hooks a store drives on entity deletion.
pub(crate) trait ErasedRelationTable: Send + Sync {
    fn remove_owner(&mut self, owner: Entity) -> usize;
    fn remove_links_to(&mut self, target: Entity) -> Vec<Entity>;
    fn owns_any(&self, owner: Entity) -> bool;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<R: Relation> ErasedRelationTable for RelationTable<R> {
    fn remove_owner(&mut self, owner: Entity) -> usize {
        self.remove_all_of(owner).len()
    }

    fn remove_links_to(&mut self, target: Entity) -> Vec<Entity> {
        RelationTable::remove_links_to(self, target)
    }

    fn owns_any(&self, owner: Entity) -> bool {
        self.contains_owner(owner)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
