//! # Entity store
//!
//! The [`Store`] owns every piece of state of one logical world:
//!
//! * the node table mapping entity ids to `(archetype, row, revision)`,
//! * the archetype registry (`Signature -> ArchetypeID`, created on demand
//!   and never destroyed),
//! * value indexes of indexed and link components,
//! * one relation table per relation type,
//! * change subscribers and the query loop counter.
//!
//! ## Access model
//!
//! A store has a single logical mutator. Read-only access (`&Store`) may fan
//! out across threads for queries. Structural mutation goes through
//! `&mut Store`, either directly (see the `structural` module) or through a
//! [`CommandBuffer`](crate::CommandBuffer) replayed at a synchronization
//! point.
//!
//! Every public entry point that takes an [`Entity`] validates the handle
//! against the node table first and rejects null, freed or stale handles with
//! [`StoreError::EntityNotFound`].

use std::any::type_name;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::engine::archetype::Archetype;
use crate::engine::borrow::{QueryLoopGuard, QueryLoopTracker};
use crate::engine::component::{Component, IndexedComponent, LinkComponent, Relation, Schema, TagSet};
use crate::engine::config::StoreConfig;
use crate::engine::entity::{Entity, EntityLocation, EntityNodes, Node, NodeFlags};
use crate::engine::error::{SchemaError, StoreError, StoreResult};
use crate::engine::events::{ComponentChanged, EventHub, SubscriptionId, TagsChanged};
use crate::engine::index::{ComponentIndex, ErasedIndex, LinkIndex};
use crate::engine::query::{Query, QueryData};
use crate::engine::relation::{ErasedRelationTable, RelationTable};
use crate::engine::types::{ArchetypeID, ComponentID, RowID, Signature, EMPTY_ARCHETYPE};

/// Counters describing the work a store has performed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Rows moved between archetypes.
    pub archetype_moves: u64,
    /// Entities created, including materialized reservations.
    pub entities_created: u64,
    /// Entities deleted.
    pub entities_deleted: u64,
    /// Command buffers played back.
    pub playbacks: u64,
}

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// In-memory archetype entity store.
///
/// ## Responsibilities
/// * Owns the entity table, every archetype and its component columns
/// * Maps signatures to archetype ids and creates archetypes on first use
/// * Keeps value indexes, link indexes and relation tables in step with
///   every structural change
/// * Dispatches change events to subscribers
///
/// ## Invariants
/// * Every live entity occupies exactly one row of exactly one archetype, and
///   its node points at that row
/// * Index contents equal the live values of their component type
/// * No structural change happens while a query loop is open
///
/// ## Concurrency
/// `Store` is `Send + Sync`. Shared access allows reads and entity
/// reservations; structural changes and mutable queries need `&mut Store`.
pub struct Store {
    pub(crate) id: u64,
    pub(crate) schema: Arc<Schema>,
    pub(crate) config: StoreConfig,
    pub(crate) nodes: EntityNodes,
    pub(crate) archetypes: Vec<Archetype>,
    pub(crate) signature_map: HashMap<Signature, ArchetypeID>,
    pub(crate) indexes: Vec<Option<Box<dyn ErasedIndex>>>,
    pub(crate) relations: Vec<Box<dyn ErasedRelationTable>>,
    pub(crate) events: EventHub,
    pub(crate) loops: QueryLoopTracker,
    pub(crate) stats: StoreStats,
}

impl Store {
    /// Creates a store with default configuration.
    pub fn new(schema: Arc<Schema>) -> Self {
        Self::with_config(schema, StoreConfig::default())
    }

    /// Creates a store from a finalized schema.
    pub fn with_config(schema: Arc<Schema>, config: StoreConfig) -> Self {
        let empty = Archetype::empty(EMPTY_ARCHETYPE, &schema);
        let mut signature_map = HashMap::new();
        signature_map.insert(Signature::empty(), EMPTY_ARCHETYPE);
        let indexes = schema.components().iter().map(|desc| desc.new_index()).collect();
        let relations = schema.relations().iter().map(|desc| desc.new_table()).collect();
        tracing::debug!(
            components = schema.component_count(),
            tags = schema.tag_count(),
            relations = schema.relation_count(),
            capacity = config.initial_entity_capacity,
            "store created"
        );
        Self {
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            nodes: EntityNodes::with_capacity(config.initial_entity_capacity),
            archetypes: vec![empty],
            signature_map,
            indexes,
            relations,
            events: EventHub::default(),
            loops: QueryLoopTracker::new(),
            stats: StoreStats::default(),
            schema,
            config,
        }
    }

    /// Schema the store was built from.
    #[inline]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Store configuration.
    #[inline]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Work counters.
    #[inline]
    pub fn stats(&self) -> StoreStats {
        self.stats
    }

    /// Number of live entities.
    #[inline]
    pub fn entity_count(&self) -> usize {
        self.nodes.alive()
    }

    /// Number of archetypes ever created, including the empty one.
    #[inline]
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// All archetypes in creation order.
    #[inline]
    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    /// Archetype by id.
    #[inline]
    pub fn archetype(&self, id: ArchetypeID) -> Option<&Archetype> {
        self.archetypes.get(id as usize)
    }

    /// Id of the archetype registered for `signature`, if any.
    #[inline]
    pub fn archetype_id_of(&self, signature: &Signature) -> Option<ArchetypeID> {
        self.signature_map.get(signature).copied()
    }

    /// Handles of all live entities in id order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.nodes.iter_alive()
    }

    // ── entity lookup ───────────────────────────────────────────────────────

    /// Returns `true` if the handle refers to a live entity.
    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.nodes.is_alive(entity)
    }

    pub(crate) fn live_node(&self, entity: Entity) -> StoreResult<Node> {
        match self.nodes.get(entity) {
            Some(node) => Ok(*node),
            None => {
                tracing::warn!(%entity, "rejected unknown or stale entity");
                Err(StoreError::EntityNotFound { entity })
            }
        }
    }

    /// Archetype and row currently holding `entity`.
    pub fn entity_location(&self, entity: Entity) -> StoreResult<EntityLocation> {
        self.live_node(entity)?
            .location()
            .ok_or(StoreError::Internal("live node without archetype"))
    }

    /// Signature of the archetype holding `entity`.
    pub fn signature_of(&self, entity: Entity) -> StoreResult<Signature> {
        let location = self.entity_location(entity)?;
        Ok(*self.archetypes[location.archetype as usize].signature())
    }

    /// Ownership flags of `entity`.
    pub fn entity_flags(&self, entity: Entity) -> StoreResult<NodeFlags> {
        Ok(self.live_node(entity)?.flags)
    }

    // ── component access ───────────────────────────────────────────────────

    /// Returns the component `T` of `entity`.
    pub fn get_component<T: Component>(&self, entity: Entity) -> StoreResult<&T> {
        let component = self.schema.component_id::<T>()?;
        let location = self.entity_location(entity)?;
        self.archetypes[location.archetype as usize]
            .get::<T>(component, location.row)
            .ok_or(StoreError::MissingComponent { entity, name: type_name::<T>() })
    }

    /// Returns the component `T` of `entity` mutably.
    ///
    /// Indexed and link components are rejected, since writing through the
    /// reference would bypass their index; use `set_component` instead.
    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> StoreResult<&mut T> {
        let desc = self.schema.component_desc::<T>()?;
        if desc.is_indexed() {
            return Err(StoreError::IndexedComponentMutation { name: type_name::<T>() });
        }
        let component = desc.id;
        let location = self.entity_location(entity)?;
        self.archetypes[location.archetype as usize]
            .get_mut::<T>(component, location.row)
            .ok_or(StoreError::MissingComponent { entity, name: type_name::<T>() })
    }

    /// Returns `true` if `entity` carries component `T`.
    pub fn has_component<T: Component>(&self, entity: Entity) -> StoreResult<bool> {
        let component = self.schema.component_id::<T>()?;
        Ok(self.signature_of(entity)?.components.has(component))
    }

    /// Returns `true` if `entity` carries tag `T`.
    pub fn has_tag<T: 'static>(&self, entity: Entity) -> StoreResult<bool> {
        let tag = self.schema.tag_id::<T>()?;
        Ok(self.signature_of(entity)?.tags.has(tag))
    }

    /// Returns `true` if `entity` carries every tag of `S`.
    pub fn has_all_tags<S: TagSet>(&self, entity: Entity) -> StoreResult<bool> {
        let tags = S::tag_bits(&self.schema)?;
        Ok(self.signature_of(entity)?.tags.contains_all(&tags))
    }

    // ── query loops ────────────────────────────────────────────────────────

    /// Builds a query over this store's schema.
    pub fn query<Q: QueryData>(&self) -> StoreResult<Query<Q>> {
        Query::new(&self.schema)
    }

    /// Opens a query loop; structural changes fail until the guard drops.
    pub fn query_loop_guard(&self) -> QueryLoopGuard {
        self.loops.enter()
    }

    /// Number of open query loops.
    #[inline]
    pub fn active_query_loops(&self) -> u32 {
        self.loops.active()
    }

    // ── archetype registry ─────────────────────────────────────────────────

    pub(crate) fn get_or_create_archetype(&mut self, signature: Signature) -> StoreResult<ArchetypeID> {
        if let Some(&id) = self.signature_map.get(&signature) {
            return Ok(id);
        }

        let id = self.archetypes.len() as ArchetypeID;
        let archetype = Archetype::new(id, signature, &self.schema)?;
        tracing::debug!(
            archetype = id,
            components = signature.components.count(),
            tags = signature.tags.count(),
            "archetype created"
        );
        self.archetypes.push(archetype);
        self.signature_map.insert(signature, id);
        Ok(id)
    }

    #[inline]
    pub(crate) fn get_archetype_pair_mut(
        archetypes: &mut [Archetype],
        a: ArchetypeID,
        b: ArchetypeID,
    ) -> StoreResult<(&mut Archetype, &mut Archetype)> {
        if a == b || a as usize >= archetypes.len() || b as usize >= archetypes.len() {
            return Err(StoreError::Internal("invalid archetype pair"));
        }

        let (low, high) = if a < b { (a, b) } else { (b, a) };
        let (head, tail) = archetypes.split_at_mut(high as usize);

        let left = &mut head[low as usize];
        let right = &mut tail[0];

        Ok(if a < b { (left, right) } else { (right, left) })
    }

    // ── reservation ────────────────────────────────────────────────────────

    /// Reserves an entity id without exclusive access.
    ///
    /// The entity becomes live, in the empty archetype, at the next structural
    /// operation or command-buffer playback.
    pub fn reserve_entity(&self) -> Entity {
        self.nodes.reserve()
    }

    /// Materializes pending reservations.
    pub(crate) fn flush_reserved(&mut self) -> StoreResult<()> {
        if self.nodes.pending_reservations() == 0 {
            return Ok(());
        }
        let first = self.archetypes[EMPTY_ARCHETYPE as usize].len() as RowID;
        let created = self.nodes.flush_reserved(EMPTY_ARCHETYPE, first);
        self.archetypes[EMPTY_ARCHETYPE as usize].extend_empty(&created)?;
        self.stats.entities_created += created.len() as u64;
        for entity in created {
            tracing::trace!(%entity, "reserved entity materialized");
            self.events.entity_created(entity);
        }
        Ok(())
    }

    // ── subscriptions ──────────────────────────────────────────────────────

    /// Subscribes to component add, update and remove events.
    pub fn on_component_changed(&mut self, f: impl FnMut(&ComponentChanged<'_>) + Send + Sync + 'static) -> SubscriptionId {
        self.events.on_component_changed(f)
    }

    /// Subscribes to tag changes.
    pub fn on_tags_changed(&mut self, f: impl FnMut(&TagsChanged) + Send + Sync + 'static) -> SubscriptionId {
        self.events.on_tags_changed(f)
    }

    /// Subscribes to entity creation.
    pub fn on_entity_created(&mut self, f: impl FnMut(Entity) + Send + Sync + 'static) -> SubscriptionId {
        self.events.on_entity_created(f)
    }

    /// Subscribes to entity deletion.
    pub fn on_entity_deleted(&mut self, f: impl FnMut(Entity) + Send + Sync + 'static) -> SubscriptionId {
        self.events.on_entity_deleted(f)
    }

    /// Removes a subscription. Returns `false` if it was unknown.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    // ── indexes ────────────────────────────────────────────────────────────

    fn erased_index(&self, component: ComponentID, name: &'static str) -> StoreResult<&dyn ErasedIndex> {
        self.indexes
            .get(component as usize)
            .and_then(|index| index.as_deref())
            .ok_or(StoreError::NotIndexed { name })
    }

    /// Value index of indexed component `T`.
    pub fn index<T: IndexedComponent>(&self) -> StoreResult<&ComponentIndex<T>> {
        let component = self.schema.component_id::<T>()?;
        self.erased_index(component, type_name::<T>())?
            .as_any()
            .downcast_ref::<ComponentIndex<T>>()
            .ok_or(StoreError::Schema(SchemaError::WrongRole {
                name: type_name::<T>(),
                expected: "an indexed component",
            }))
    }

    /// Target index of link component `T`.
    pub fn link_index<T: LinkComponent>(&self) -> StoreResult<&LinkIndex<T>> {
        let component = self.schema.component_id::<T>()?;
        self.erased_index(component, type_name::<T>())?
            .as_any()
            .downcast_ref::<LinkIndex<T>>()
            .ok_or(StoreError::Schema(SchemaError::WrongRole {
                name: type_name::<T>(),
                expected: "a link component",
            }))
    }

    /// Entities whose link component `T` points at `target`, in id order.
    pub fn incoming_links<T: LinkComponent>(&self, target: Entity) -> StoreResult<Vec<Entity>> {
        let mut sources: Vec<Entity> = self.link_index::<T>()?.sources_of(target).collect();
        sources.sort_unstable();
        Ok(sources)
    }

    // ── relations ──────────────────────────────────────────────────────────

    /// Relation table of `R`.
    pub fn relation_table<R: Relation>(&self) -> StoreResult<&RelationTable<R>> {
        let relation = self.schema.relation_id::<R>()?;
        self.relations[relation as usize]
            .as_any()
            .downcast_ref::<RelationTable<R>>()
            .ok_or(StoreError::Internal("relation table type mismatch"))
    }

    fn relation_table_mut<R: Relation>(&mut self) -> StoreResult<&mut RelationTable<R>> {
        let relation = self.schema.relation_id::<R>()?;
        self.relations[relation as usize]
            .as_any_mut()
            .downcast_mut::<RelationTable<R>>()
            .ok_or(StoreError::Internal("relation table type mismatch"))
    }

    /// Adds a relation to `entity`, replacing the one with the same key.
    ///
    /// ## Returns
    /// `true` if a new relation was added, `false` if one was replaced.
    pub fn add_relation<R: Relation>(&mut self, entity: Entity, value: R) -> StoreResult<bool> {
        self.flush_if_idle()?;
        self.live_node(entity)?;
        let target = value.link_target();
        if let Some(target) = target {
            self.live_node(target)?;
        }
        let replaced = self.relation_table_mut::<R>()?.insert(entity, value);
        if let Some(node) = self.nodes.node_mut(entity.id) {
            node.flags.insert(NodeFlags::RELATION_SOURCE);
        }
        if let Some(node) = target.and_then(|target| self.nodes.node_mut(target.id)) {
            node.flags.insert(NodeFlags::RELATION_TARGET);
        }
        Ok(replaced.is_none())
    }

    /// Removes the relation of `entity` with `key`.
    ///
    /// ## Returns
    /// The removed value, or `None` if the entity had no relation with `key`.
    pub fn remove_relation<R: Relation>(&mut self, entity: Entity, key: &R::Key) -> StoreResult<Option<R>> {
        self.live_node(entity)?;
        let removed = self.relation_table_mut::<R>()?.remove(entity, key);
        if removed.is_some() {
            self.refresh_relation_source_flag(entity);
        }
        Ok(removed)
    }

    /// Returns the relation of `entity` with `key`.
    pub fn get_relation<R: Relation>(&self, entity: Entity, key: &R::Key) -> StoreResult<&R> {
        self.live_node(entity)?;
        self.relation_table::<R>()?
            .get(entity, key)
            .ok_or(StoreError::RelationKeyNotFound { entity, name: type_name::<R>() })
    }

    /// Relations of `entity`, in insertion order.
    pub fn relations<R: Relation>(&self, entity: Entity) -> StoreResult<Vec<&R>> {
        self.live_node(entity)?;
        Ok(self.relation_table::<R>()?.relations_of(entity).collect())
    }

    /// Number of relations `entity` owns.
    pub fn relation_count<R: Relation>(&self, entity: Entity) -> StoreResult<usize> {
        self.live_node(entity)?;
        Ok(self.relation_table::<R>()?.count_of(entity))
    }

    /// Owners of link relations `R` pointing at `target`, in id order.
    pub fn incoming_relation_links<R: Relation>(&self, target: Entity) -> StoreResult<Vec<Entity>> {
        let mut sources: Vec<Entity> = self.relation_table::<R>()?.sources_of(target).collect();
        sources.sort_unstable();
        sources.dedup();
        Ok(sources)
    }

    pub(crate) fn refresh_relation_source_flag(&mut self, entity: Entity) {
        let owns_any = self.relations.iter().any(|table| table.owns_any(entity));
        if let Some(node) = self.nodes.node_mut(entity.id) {
            node.flags.set(NodeFlags::RELATION_SOURCE, owns_any);
        }
    }
}
