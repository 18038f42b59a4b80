//! # Structural change engine
//!
//! Every operation that changes which archetype an entity lives in, or
//! whether it exists at all, goes through this module.
//!
//! ## Moving a row
//! Given the entity's current archetype `A` and a [`SignatureChange`], the
//! destination signature is `(A ∪ add) \ remove`. When it equals `A` nothing
//! happens: adding a present bit or removing an absent one is idempotent.
//! Otherwise the destination archetype `B` is looked up (or created) and one
//! row is moved:
//!
//! 1. shared columns move their value from `A` to a new last row of `B`,
//! 2. columns only in `B` receive the caller's values,
//! 3. columns only in `A` drop their value,
//! 4. the source row is swap-removed and the node of the entity previously
//!    occupying the last row of `A` is patched to its new row.
//!
//! ## Guards
//! Every structural entry point checks the query loop counter first and fails
//! with [`StoreError::QueryLoopActive`] while an enumerator is alive.
//!
//! ## Observers
//! Old values are captured only when somebody observes them, i.e. when a
//! component subscriber exists or the component type is indexed.

use std::any::{type_name, Any};

use crate::engine::component::{Bundle, Component, TagSet};
use crate::engine::entity::{Entity, EntityLocation, NodeFlags};
use crate::engine::error::{StoreError, StoreResult};
use crate::engine::events::{ComponentAction, ComponentChanged, TagsChanged};
use crate::engine::storage::{value_ref, BoxedValue};
use crate::engine::store::Store;
use crate::engine::types::{ComponentID, SignatureChange, TagBits, EMPTY_ARCHETYPE};

impl Store {
    /// Prepares a structural change: checks the loop guard, materializes
    /// reservations and resolves the entity's location.
    pub(crate) fn begin_structural(&mut self, entity: Entity) -> StoreResult<EntityLocation> {
        self.loops.ensure_idle()?;
        self.flush_reserved()?;
        self.entity_location(entity)
    }

    /// Materializes reservations unless a query loop is open.
    pub(crate) fn flush_if_idle(&mut self) -> StoreResult<()> {
        if self.loops.active() == 0 {
            self.flush_reserved()?;
        }
        Ok(())
    }

    /// Moves `entity` to the archetype described by applying `change`.
    ///
    /// `added` holds one value per component the move adds. When `capture`
    /// is set, values of removed components are returned.
    pub(crate) fn move_entity(
        &mut self,
        entity: Entity,
        location: EntityLocation,
        change: &SignatureChange,
        added: Vec<(ComponentID, BoxedValue)>,
        capture: bool,
    ) -> StoreResult<(EntityLocation, Vec<(ComponentID, BoxedValue)>)> {
        let source_signature = *self.archetypes[location.archetype as usize].signature();
        let destination_signature = source_signature.transition(change);
        if destination_signature == source_signature {
            return Ok((location, Vec::new()));
        }

        let destination = self.get_or_create_archetype(destination_signature)?;
        let (source_archetype, destination_archetype) =
            Self::get_archetype_pair_mut(&mut self.archetypes, location.archetype, destination)?;
        let moved = source_archetype.move_row_to_archetype(destination_archetype, location.row, added, capture)?;

        if let Some(swapped) = moved.swapped {
            self.nodes.set_location(swapped.id, location.archetype, location.row);
        }
        self.nodes.set_location(entity.id, destination, moved.destination_row);
        self.stats.archetype_moves += 1;
        tracing::trace!(
            %entity,
            from = location.archetype,
            to = destination,
            row = moved.destination_row,
            "entity moved"
        );

        Ok((EntityLocation { archetype: destination, row: moved.destination_row }, moved.removed))
    }

    /// Target of `value` if `component` is a link component.
    pub(crate) fn link_target_of(&self, component: ComponentID, value: &dyn Any) -> Option<Entity> {
        self.indexes
            .get(component as usize)
            .and_then(Option::as_ref)
            .and_then(|index| index.link_target(value))
    }

    /// Rejects a link component whose target is not a live entity.
    pub(crate) fn check_link_target(&self, component: ComponentID, value: &dyn Any) -> StoreResult<()> {
        match self.link_target_of(component, value) {
            Some(target) => self.live_node(target).map(|_| ()),
            None => Ok(()),
        }
    }

    #[inline]
    pub(crate) fn observes(&self, component: ComponentID) -> bool {
        self.events.wants_components()
            || self.indexes.get(component as usize).map_or(false, Option::is_some)
    }

    /// Files the current value of `component` at `location` in its index and
    /// fires an `Add` or `Update` event.
    pub(crate) fn component_written(
        &mut self,
        entity: Entity,
        location: EntityLocation,
        component: ComponentID,
        action: ComponentAction,
        old_value: Option<&BoxedValue>,
    ) {
        let Store { archetypes, indexes, nodes, events, .. } = &mut *self;
        let value = archetypes[location.archetype as usize].get_any(component, location.row);
        if let Some(index) = indexes.get_mut(component as usize).and_then(Option::as_mut) {
            if let Some(old) = old_value {
                index.remove_value(entity, value_ref(old));
            }
            if let Some(value) = value {
                index.insert_value(entity, value);
                if let Some(node) = index.link_target(value).and_then(|target| nodes.get_mut(target)) {
                    node.flags.insert(NodeFlags::LINK_TARGET);
                }
            }
        }
        if events.wants_components() {
            events.component_changed(&ComponentChanged {
                entity,
                component,
                action,
                old_value: old_value.map(value_ref),
            });
        }
    }

    /// Removes the old value of `component` from its index and fires a
    /// `Remove` event.
    pub(crate) fn component_removed(&mut self, entity: Entity, component: ComponentID, old_value: Option<&BoxedValue>) {
        if let (Some(index), Some(old)) = (
            self.indexes.get_mut(component as usize).and_then(Option::as_mut),
            old_value,
        ) {
            index.remove_value(entity, value_ref(old));
        }
        if self.events.wants_components() {
            self.events.component_changed(&ComponentChanged {
                entity,
                component,
                action: ComponentAction::Remove,
                old_value: old_value.map(value_ref),
            });
        }
    }

    pub(crate) fn tags_changed(&mut self, entity: Entity, added: TagBits, removed: TagBits) {
        if self.events.wants_tags() && !(added.is_empty() && removed.is_empty()) {
            self.events.tags_changed(&TagsChanged { entity, added, removed });
        }
    }

    // ── entity creation ────────────────────────────────────────────────────

    /// Creates an entity without components or tags.
    pub fn create_entity(&mut self) -> StoreResult<Entity> {
        self.loops.ensure_idle()?;
        self.flush_reserved()?;
        let row = self.archetypes[EMPTY_ARCHETYPE as usize].len() as u32;
        let entity = self.nodes.allocate(EMPTY_ARCHETYPE, row);
        self.archetypes[EMPTY_ARCHETYPE as usize].extend_empty(&[entity])?;
        self.stats.entities_created += 1;
        tracing::trace!(%entity, "entity created");
        self.events.entity_created(entity);
        Ok(entity)
    }

    /// Creates one entity directly in the archetype of `bundle`.
    pub fn create_entity_with(&mut self, bundle: &Bundle) -> StoreResult<Entity> {
        self.create_entities(1, bundle)?
            .pop()
            .ok_or(StoreError::Internal("bulk creation returned no entity"))
    }

    /// Creates `count` entities carrying clones of the values in `bundle`.
    ///
    /// One archetype lookup, then `count` row appends.
    pub fn create_entities(&mut self, count: usize, bundle: &Bundle) -> StoreResult<Vec<Entity>> {
        bundle.check_schema(&self.schema)?;
        self.loops.ensure_idle()?;
        self.flush_reserved()?;
        for (component, value) in bundle.values() {
            self.check_link_target(component, value)?;
        }
        let archetype = self.get_or_create_archetype(bundle.signature())?;
        let values: Vec<_> = bundle.values().collect();
        let first = self.archetypes[archetype as usize].len() as u32;
        let entities: Vec<Entity> = (0..count)
            .map(|offset| self.nodes.allocate(archetype, first + offset as u32))
            .collect();
        self.archetypes[archetype as usize].extend_cloned(&entities, &values)?;
        self.stats.entities_created += count as u64;

        let Store { indexes, nodes, events, .. } = &mut *self;
        for &(component, value) in &values {
            if let Some(index) = indexes.get_mut(component as usize).and_then(Option::as_mut) {
                for &entity in &entities {
                    index.insert_value(entity, value);
                }
                if let Some(node) = index.link_target(value).and_then(|target| nodes.get_mut(target)) {
                    node.flags.insert(NodeFlags::LINK_TARGET);
                }
            }
        }
        for &entity in &entities {
            tracing::trace!(%entity, archetype, "entity created");
            events.entity_created(entity);
        }
        Ok(entities)
    }

    // ── components ─────────────────────────────────────────────────────────

    /// Adds component `T` to `entity`, or replaces its value if present.
    ///
    /// ## Returns
    /// `Add` if the entity moved to a new archetype, `Update` if the value was
    /// replaced in place.
    pub fn add_component<T: Component>(&mut self, entity: Entity, value: T) -> StoreResult<ComponentAction> {
        let component = self.schema.component_id::<T>()?;
        self.add_component_boxed(entity, component, Box::new(value))
    }

    pub(crate) fn add_component_boxed(
        &mut self,
        entity: Entity,
        component: ComponentID,
        value: BoxedValue,
    ) -> StoreResult<ComponentAction> {
        self.flush_if_idle()?;
        let location = self.entity_location(entity)?;
        self.check_link_target(component, value_ref(&value))?;
        if self.archetypes[location.archetype as usize].has(component) {
            self.replace_component(entity, location, component, value)?;
            return Ok(ComponentAction::Update);
        }

        let location = self.begin_structural(entity)?;
        let mut change = SignatureChange::default();
        change.add_components.set(component);
        let (location, _) = self.move_entity(entity, location, &change, vec![(component, value)], false)?;
        self.component_written(entity, location, component, ComponentAction::Add, None);
        Ok(ComponentAction::Add)
    }

    /// Replaces the value of component `T`; the entity must already carry it.
    ///
    /// ## Returns
    /// The previous value.
    pub fn set_component<T: Component>(&mut self, entity: Entity, value: T) -> StoreResult<T> {
        let component = self.schema.component_id::<T>()?;
        self.flush_if_idle()?;
        let location = self.entity_location(entity)?;
        if !self.archetypes[location.archetype as usize].has(component) {
            return Err(StoreError::MissingComponent { entity, name: type_name::<T>() });
        }
        self.check_link_target(component, &value)?;
        let old = self.replace_component(entity, location, component, Box::new(value))?;
        old.downcast::<T>()
            .map(|old| *old)
            .map_err(|_| StoreError::Internal("column returned value of foreign type"))
    }

    pub(crate) fn replace_component(
        &mut self,
        entity: Entity,
        location: EntityLocation,
        component: ComponentID,
        value: BoxedValue,
    ) -> StoreResult<BoxedValue> {
        let old = self.archetypes[location.archetype as usize].replace_value(component, location.row, value)?;
        if self.observes(component) {
            self.component_written(entity, location, component, ComponentAction::Update, Some(&old));
        }
        Ok(old)
    }

    /// Removes component `T` from `entity`.
    ///
    /// Removing an absent component is a no-op returning `None`.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> StoreResult<Option<T>> {
        let component = self.schema.component_id::<T>()?;
        match self.remove_component_by_id(entity, component)? {
            Some(old) => old
                .downcast::<T>()
                .map(|old| Some(*old))
                .map_err(|_| StoreError::Internal("column returned value of foreign type")),
            None => Ok(None),
        }
    }

    pub(crate) fn remove_component_by_id(&mut self, entity: Entity, component: ComponentID) -> StoreResult<Option<BoxedValue>> {
        self.flush_if_idle()?;
        let location = self.entity_location(entity)?;
        if !self.archetypes[location.archetype as usize].has(component) {
            return Ok(None);
        }

        let location = self.begin_structural(entity)?;
        let mut change = SignatureChange::default();
        change.remove_components.set(component);
        let (_, removed) = self.move_entity(entity, location, &change, Vec::new(), true)?;
        let old = removed.into_iter().find(|(id, _)| *id == component).map(|(_, value)| value);
        self.component_removed(entity, component, old.as_ref());
        Ok(old)
    }

    // ── tags ───────────────────────────────────────────────────────────────

    /// Adds tag `T` to `entity`.
    pub fn add_tag<T: 'static>(&mut self, entity: Entity) -> StoreResult<bool> {
        let mut tags = TagBits::new();
        tags.set(self.schema.tag_id::<T>()?);
        self.change_tags(entity, tags, TagBits::new())
    }

    /// Removes tag `T` from `entity`.
    pub fn remove_tag<T: 'static>(&mut self, entity: Entity) -> StoreResult<bool> {
        let mut tags = TagBits::new();
        tags.set(self.schema.tag_id::<T>()?);
        self.change_tags(entity, TagBits::new(), tags)
    }

    /// Adds every tag of `S` in one move.
    pub fn add_tags<S: TagSet>(&mut self, entity: Entity) -> StoreResult<bool> {
        let tags = S::tag_bits(&self.schema)?;
        self.change_tags(entity, tags, TagBits::new())
    }

    /// Removes every tag of `S` in one move.
    pub fn remove_tags<S: TagSet>(&mut self, entity: Entity) -> StoreResult<bool> {
        let tags = S::tag_bits(&self.schema)?;
        self.change_tags(entity, TagBits::new(), tags)
    }

    /// Applies tag additions and removals in one move.
    ///
    /// ## Returns
    /// `true` if the entity's tag set changed.
    pub(crate) fn change_tags(&mut self, entity: Entity, add: TagBits, remove: TagBits) -> StoreResult<bool> {
        self.flush_if_idle()?;
        let location = self.entity_location(entity)?;
        let before = self.archetypes[location.archetype as usize].signature().tags;
        let after = before.union(&add).difference(&remove);
        if before == after {
            return Ok(false);
        }

        let location = self.begin_structural(entity)?;
        let change = SignatureChange { add_tags: add, remove_tags: remove, ..SignatureChange::default() };
        self.move_entity(entity, location, &change, Vec::new(), false)?;
        self.tags_changed(entity, after.difference(&before), before.difference(&after));
        Ok(true)
    }

    // ── deletion ───────────────────────────────────────────────────────────

    /// Deletes `entity`.
    ///
    /// ## Cascade
    /// - relations owned by the entity are removed,
    /// - link relations pointing at it are removed from their owners,
    /// - link components pointing at it are removed from their sources,
    /// - its index entries are dropped.
    ///
    /// The id returns to the free list with a bumped revision.
    pub fn delete_entity(&mut self, entity: Entity) -> StoreResult<()> {
        let location = self.begin_structural(entity)?;
        let flags = self.live_node(entity)?.flags;

        if flags.contains(NodeFlags::RELATION_SOURCE) {
            for table in &mut self.relations {
                table.remove_owner(entity);
            }
        }

        if flags.contains(NodeFlags::RELATION_TARGET) {
            let mut touched = Vec::new();
            for table in &mut self.relations {
                touched.extend(table.remove_links_to(entity));
            }
            for source in touched {
                self.refresh_relation_source_flag(source);
            }
        }

        let mut location = location;
        if flags.contains(NodeFlags::LINK_TARGET) {
            let mut links: Vec<(ComponentID, Entity)> = Vec::new();
            for (component, index) in self.indexes.iter().enumerate() {
                if let Some(index) = index {
                    links.extend(
                        index
                            .link_sources(entity)
                            .into_iter()
                            .filter(|source| *source != entity)
                            .map(|source| (component as ComponentID, source)),
                    );
                }
            }
            for (component, source) in links {
                self.remove_component_by_id(source, component)?;
            }
            location = self.entity_location(entity)?;
        }

        let Store { archetypes, indexes, .. } = &mut *self;
        let archetype = &mut archetypes[location.archetype as usize];
        for component in archetype.signature().components.iter() {
            if let (Some(index), Some(value)) = (
                indexes.get_mut(component as usize).and_then(Option::as_mut),
                archetype.get_any(component, location.row),
            ) {
                index.remove_value(entity, value);
            }
        }
        let removal = archetype.swap_remove_row(location.row, false)?;
        if let Some(swapped) = removal.swapped {
            self.nodes.set_location(swapped.id, location.archetype, location.row);
        }
        self.nodes.free(entity.id);
        self.stats.entities_deleted += 1;
        tracing::trace!(%entity, "entity deleted");
        self.events.entity_deleted(entity);
        Ok(())
    }
}
