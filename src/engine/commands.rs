//! # Command buffers
//!
//! Deferred structural changes, recorded while a query iterates and applied
//! later at a synchronization point.
//!
//! ## Recording
//! Every recorded command is folded, in record order, into one aggregate per
//! entity. An `entity -> slot` map finds the aggregate in `O(1)`, so queuing
//! many commands against many entities never rescans the buffer.
//!
//! Folding rules for one component type on one entity:
//! - a removal after an addition cancels it (component absent),
//! - an addition after a removal restores it (component present),
//! - the last recorded value wins.
//!
//! Misuse is reported at record time: unregistered types fail immediately,
//! and any command recorded after a delete of the same entity fails with
//! [`StoreError::CommandAfterDelete`].
//!
//! ## Playback
//! 1. Every touched entity and every link target is validated first; on a
//!    stale handle, or a link to an entity queued for deletion, nothing is
//!    applied.
//! 2. Each entity is moved **once** to its final archetype, however many
//!    commands were recorded for it.
//! 3. Final values are written into the destination row.
//! 4. Events fire once per entity in phase order: tags, removals, then
//!    additions and updates. `Add` vs `Update` is decided against the
//!    entity's archetype *before* playback, never an intermediate state.
//!
//! A reusable buffer keeps its allocations after playback; a single-use one
//! rejects a second playback with [`StoreError::CommandBufferConsumed`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::component::{Component, Schema, TagSet};
use crate::engine::entity::Entity;
use crate::engine::error::{StoreError, StoreResult};
use crate::engine::events::ComponentAction;
use crate::engine::storage::{value_ref, BoxedValue};
use crate::engine::store::Store;
use crate::engine::types::{ComponentBits, ComponentID, SignatureChange, TagBits};

/// Folded commands for one entity.
struct EntityChange {
    entity: Entity,
    add_components: ComponentBits,
    remove_components: ComponentBits,
    add_tags: TagBits,
    remove_tags: TagBits,
    values: Vec<(ComponentID, BoxedValue)>,
    created: bool,
    deleted: bool,
}

impl EntityChange {
    fn new(entity: Entity) -> Self {
        Self {
            entity,
            add_components: ComponentBits::new(),
            remove_components: ComponentBits::new(),
            add_tags: TagBits::new(),
            remove_tags: TagBits::new(),
            values: Vec::new(),
            created: false,
            deleted: false,
        }
    }

    fn signature_change(&self) -> SignatureChange {
        SignatureChange {
            add_components: self.add_components,
            remove_components: self.remove_components,
            add_tags: self.add_tags,
            remove_tags: self.remove_tags,
        }
    }
}

/// Summary of one playback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    /// Entities touched by at least one command.
    pub entities: usize,
    /// Archetype moves performed.
    pub moves: usize,
    /// Entities created through the buffer.
    pub creates: usize,
    /// Entities deleted through the buffer.
    pub deletes: usize,
}

/// Queue of deferred structural changes.
///
/// ## Purpose
/// Records component, tag, create and delete commands while the store is
/// borrowed by a query, then applies them in one pass with
/// [`CommandBuffer::playback`].
///
/// ## Invariants
/// * Each touched entity has exactly one folded aggregate
/// * A deleted entity accepts no further command until playback
/// * Playback validates every entity and link target before changing
///   anything
///
/// A buffer is tied to the schema of the store it was created for;
/// playing it into a store with another schema fails with
/// [`StoreError::SchemaMismatch`].
pub struct CommandBuffer {
    schema: Arc<Schema>,
    changes: Vec<EntityChange>,
    slots: HashMap<Entity, usize>,
    command_count: usize,
    reusable: bool,
    consumed: bool,
}

impl CommandBuffer {
    /// Creates a buffer for `store`, reusable per the store's configuration.
    pub fn new(store: &Store) -> Self {
        Self::with_schema(Arc::clone(store.schema()), store.config().reusable_command_buffers)
    }

    /// Creates a buffer for stores built from `schema`.
    pub fn with_schema(schema: Arc<Schema>, reusable: bool) -> Self {
        Self {
            schema,
            changes: Vec::new(),
            slots: HashMap::new(),
            command_count: 0,
            reusable,
            consumed: false,
        }
    }

    /// Number of commands recorded since the last playback.
    #[inline]
    pub fn len(&self) -> usize {
        self.command_count
    }

    /// Returns `true` if nothing is queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.command_count == 0
    }

    /// Number of distinct entities touched.
    #[inline]
    pub fn entity_count(&self) -> usize {
        self.changes.len()
    }

    /// Returns `true` if the buffer survives playback for reuse.
    #[inline]
    pub fn is_reusable(&self) -> bool {
        self.reusable
    }

    /// Sets whether the buffer survives playback for reuse.
    pub fn set_reusable(&mut self, reusable: bool) {
        self.reusable = reusable;
    }

    fn slot(&mut self, entity: Entity) -> StoreResult<&mut EntityChange> {
        if self.consumed {
            return Err(StoreError::CommandBufferConsumed);
        }
        let index = match self.slots.get(&entity) {
            Some(&index) => index,
            None => {
                let index = self.changes.len();
                self.changes.push(EntityChange::new(entity));
                self.slots.insert(entity, index);
                index
            }
        };
        let change = &mut self.changes[index];
        if change.deleted {
            return Err(StoreError::CommandAfterDelete { entity });
        }
        self.command_count += 1;
        Ok(change)
    }

    /// Queues adding (or updating) component `T`.
    pub fn add_component<T: Component>(&mut self, entity: Entity, value: T) -> StoreResult<()> {
        let component = self.schema.component_id::<T>()?;
        let change = self.slot(entity)?;
        change.add_components.set(component);
        change.remove_components.clear(component);
        let value: BoxedValue = Box::new(value);
        match change.values.iter_mut().find(|(id, _)| *id == component) {
            Some(slot) => slot.1 = value,
            None => change.values.push((component, value)),
        }
        Ok(())
    }

    /// Queues removing component `T`.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> StoreResult<()> {
        let component = self.schema.component_id::<T>()?;
        let change = self.slot(entity)?;
        change.remove_components.set(component);
        change.add_components.clear(component);
        change.values.retain(|(id, _)| *id != component);
        Ok(())
    }

    /// Queues adding tag `T`.
    pub fn add_tag<T: 'static>(&mut self, entity: Entity) -> StoreResult<()> {
        let mut tags = TagBits::new();
        tags.set(self.schema.tag_id::<T>()?);
        self.queue_tags(entity, tags, true)
    }

    /// Queues removing tag `T`.
    pub fn remove_tag<T: 'static>(&mut self, entity: Entity) -> StoreResult<()> {
        let mut tags = TagBits::new();
        tags.set(self.schema.tag_id::<T>()?);
        self.queue_tags(entity, tags, false)
    }

    /// Queues adding every tag of `S`.
    pub fn add_tags<S: TagSet>(&mut self, entity: Entity) -> StoreResult<()> {
        let tags = S::tag_bits(&self.schema)?;
        self.queue_tags(entity, tags, true)
    }

    /// Queues removing every tag of `S`.
    pub fn remove_tags<S: TagSet>(&mut self, entity: Entity) -> StoreResult<()> {
        let tags = S::tag_bits(&self.schema)?;
        self.queue_tags(entity, tags, false)
    }

    fn queue_tags(&mut self, entity: Entity, tags: TagBits, add: bool) -> StoreResult<()> {
        let change = self.slot(entity)?;
        if add {
            change.add_tags = change.add_tags.union(&tags);
            change.remove_tags = change.remove_tags.difference(&tags);
        } else {
            change.remove_tags = change.remove_tags.union(&tags);
            change.add_tags = change.add_tags.difference(&tags);
        }
        Ok(())
    }

    /// Reserves a new entity in `store` and queues its creation.
    ///
    /// The returned handle can be used for further commands right away.
    pub fn create_entity(&mut self, store: &Store) -> StoreResult<Entity> {
        let entity = store.reserve_entity();
        self.slot(entity)?.created = true;
        Ok(entity)
    }

    /// Queues deleting `entity`. No further command may target it.
    pub fn delete_entity(&mut self, entity: Entity) -> StoreResult<()> {
        let change = self.slot(entity)?;
        change.deleted = true;
        change.values.clear();
        Ok(())
    }

    /// Applies every queued command to `store`.
    pub fn playback(&mut self, store: &mut Store) -> StoreResult<PlaybackStats> {
        if self.consumed {
            return Err(StoreError::CommandBufferConsumed);
        }
        if !Arc::ptr_eq(&self.schema, store.schema()) {
            return Err(StoreError::SchemaMismatch);
        }
        store.loops.ensure_idle()?;
        store.flush_reserved()?;

        for change in &self.changes {
            store.live_node(change.entity)?;
            for (component, value) in &change.values {
                if let Some(target) = store.link_target_of(*component, value_ref(value)) {
                    store.live_node(target)?;
                    let doomed = self.slots.get(&target).map_or(false, |&slot| self.changes[slot].deleted);
                    if doomed {
                        return Err(StoreError::EntityNotFound { entity: target });
                    }
                }
            }
        }

        let mut stats = PlaybackStats { entities: self.changes.len(), ..PlaybackStats::default() };
        for change in self.changes.drain(..) {
            if change.created {
                stats.creates += 1;
            }
            if change.deleted {
                store.delete_entity(change.entity)?;
                stats.deletes += 1;
                continue;
            }
            if Self::apply(store, change)? {
                stats.moves += 1;
            }
        }

        self.slots.clear();
        self.command_count = 0;
        if !self.reusable {
            self.consumed = true;
            self.changes = Vec::new();
            self.slots = HashMap::new();
        }
        store.stats.playbacks += 1;
        tracing::debug!(
            entities = stats.entities,
            moves = stats.moves,
            creates = stats.creates,
            deletes = stats.deletes,
            "command buffer played back"
        );
        Ok(stats)
    }

    /// Applies the folded change of one entity. Returns `true` if it moved.
    fn apply(store: &mut Store, change: EntityChange) -> StoreResult<bool> {
        let entity = change.entity;
        let location = store.entity_location(entity)?;
        let original = *store.archetypes[location.archetype as usize].signature();
        let signature_change = change.signature_change();
        let target = original.transition(&signature_change);

        let mut added = Vec::new();
        let mut updated = Vec::new();
        for (component, value) in change.values {
            if original.components.has(component) {
                updated.push((component, value));
            } else {
                added.push((component, value));
            }
        }

        let removed_bits = original.components.difference(&target.components);
        let capture = removed_bits.iter().any(|component| store.observes(component));
        let moves = target != original;
        let (location, removed) = store.move_entity(entity, location, &signature_change, added, capture)?;

        let mut old_values = Vec::with_capacity(updated.len());
        for (component, value) in updated {
            let archetype = &mut store.archetypes[location.archetype as usize];
            let old = archetype.replace_value(component, location.row, value)?;
            old_values.push((component, old));
        }

        store.tags_changed(
            entity,
            target.tags.difference(&original.tags),
            original.tags.difference(&target.tags),
        );

        for component in removed_bits.iter() {
            let old = removed.iter().find(|(id, _)| *id == component).map(|(_, value)| value);
            store.component_removed(entity, component, old);
        }

        let written = change.add_components.intersection(&target.components);
        for component in written.iter() {
            if original.components.has(component) {
                let old = old_values.iter().find(|(id, _)| *id == component).map(|(_, value)| value);
                if store.observes(component) {
                    store.component_written(entity, location, component, ComponentAction::Update, old);
                }
            } else {
                store.component_written(entity, location, component, ComponentAction::Add, None);
            }
        }

        Ok(moves)
    }
}
