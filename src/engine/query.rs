//! Typed queries over archetype storage.
//!
//! A [`Query<Q>`] names the component types it reads or writes through the
//! tuple `Q` and narrows the matching archetypes with tag and component
//! filters and, optionally, value predicates on indexed components.
//!
//! ## Matching
//! An archetype with signature `S` matches when
//!
//! ```text
//! S.components ⊇ required  ∧  S.components ∩ forbidden = ∅
//!   ∧ (any_of = ∅ ∨ S ∩ any_of ≠ ∅)
//! ```
//!
//! and the analogous tag conditions hold. `required` holds every component of
//! `Q` plus the extra `with_all_components` set.
//!
//! ## Caching
//! Archetypes are never destroyed, so the matching list only grows. A query
//! remembers how many archetypes it has already classified (its watermark) and
//! on each run only inspects archetypes created since.
//!
//! ## Chunks
//! Iteration yields [`Chunk`]s: one per non-empty matching archetype, each a
//! row range with one slice per queried component and the parallel entity
//! slice. With value predicates the matching rows are scattered, so the query
//! falls back to single-row chunks, visited in ascending entity order.
//!
//! ## Loop guard
//! Every iteration holds a query loop guard for its whole duration; structural
//! changes attempted meanwhile fail with
//! [`StoreError::QueryLoopActive`]. Record them in a
//! [`CommandBuffer`](crate::CommandBuffer) instead.
//!
//! ## Example
//! ```ignore
//! let mut moving = store.query::<(Position, Velocity)>()?
//!     .without_all_tags::<(Frozen,)>()?;
//! moving.for_each_mut(&mut store, |_, (position, velocity)| {
//!     position.x += velocity.x;
//! })?;
//! ```

use std::any::type_name;
use std::collections::{BTreeMap, HashSet};
use std::marker::PhantomData;
use std::ops::Range;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::engine::archetype::Archetype;
use crate::engine::borrow::QueryLoopGuard;
use crate::engine::component::{Component, ComponentKind, ComponentSet, IndexedComponent, Schema, TagSet};
use crate::engine::entity::{Entity, EntityLocation};
use crate::engine::error::{SchemaError, StoreError, StoreResult};
use crate::engine::jobs::JobRunner;
use crate::engine::storage::{Column, TypeErasedColumn};
use crate::engine::store::Store;
use crate::engine::types::{lcm, ArchetypeID, ComponentBits, ComponentID, Signature, TagBits};

/// Tuple of component types a query iterates.
///
/// Implemented for `(A,)` through `(A, B, C, D, E)`.
pub trait QueryData: 'static {
    /// One shared slice per component.
    type Slices<'a>: Copy + Send + Sync
    where
        Self: 'a;
    /// One mutable slice per component.
    type SlicesMut<'a>: Send
    where
        Self: 'a;
    /// One shared reference per component.
    type Item<'a>
    where
        Self: 'a;
    /// One mutable reference per component.
    type ItemMut<'a>
    where
        Self: 'a;

    /// Resolves the component ids, in tuple order.
    fn component_ids(schema: &Schema) -> Result<Vec<ComponentID>, SchemaError>;

    /// Borrows the full columns of `archetype`.
    fn fetch<'a>(archetype: &'a Archetype, ids: &[ComponentID]) -> Option<Self::Slices<'a>>;

    /// Downcasts disjoint mutable columns, given in tuple order.
    fn from_columns_mut<'a>(columns: Vec<&'a mut Box<dyn TypeErasedColumn>>) -> Option<Self::SlicesMut<'a>>;

    /// Narrows shared slices to `range`.
    fn slice<'a>(slices: Self::Slices<'a>, range: Range<usize>) -> Self::Slices<'a>;

    /// Splits mutable slices at `mid`.
    fn split_at_mut<'a>(slices: Self::SlicesMut<'a>, mid: usize) -> (Self::SlicesMut<'a>, Self::SlicesMut<'a>);

    /// References of one row.
    fn item<'a>(slices: Self::Slices<'a>, row: usize) -> Self::Item<'a>;

    /// Mutable references of one row.
    fn item_mut<'a, 'b>(slices: &'b mut Self::SlicesMut<'a>, row: usize) -> Self::ItemMut<'b>;
}

macro_rules! impl_query_data {
    ($($name:ident : $var:ident : $idx:tt),+) => {
        impl<$($name: Component),+> QueryData for ($($name,)+) {
            type Slices<'a> = ($(&'a [$name],)+);
            type SlicesMut<'a> = ($(&'a mut [$name],)+);
            type Item<'a> = ($(&'a $name,)+);
            type ItemMut<'a> = ($(&'a mut $name,)+);

            fn component_ids(schema: &Schema) -> Result<Vec<ComponentID>, SchemaError> {
                Ok(vec![$(schema.component_id::<$name>()?),+])
            }

            fn fetch<'a>(archetype: &'a Archetype, ids: &[ComponentID]) -> Option<Self::Slices<'a>> {
                Some(($(archetype.column::<$name>(*ids.get($idx)?)?,)+))
            }

            fn from_columns_mut<'a>(columns: Vec<&'a mut Box<dyn TypeErasedColumn>>) -> Option<Self::SlicesMut<'a>> {
                let mut columns = columns.into_iter();
                Some(($(
                    columns
                        .next()?
                        .as_any_mut()
                        .downcast_mut::<Column<$name>>()?
                        .as_mut_slice(),
                )+))
            }

            fn slice<'a>(slices: Self::Slices<'a>, range: Range<usize>) -> Self::Slices<'a> {
                ($(&slices.$idx[range.clone()],)+)
            }

            fn split_at_mut<'a>(slices: Self::SlicesMut<'a>, mid: usize) -> (Self::SlicesMut<'a>, Self::SlicesMut<'a>) {
                let ($($var,)+) = slices;
                $(let $var = $var.split_at_mut(mid);)+
                (($($var.0,)+), ($($var.1,)+))
            }

            #[inline]
            fn item<'a>(slices: Self::Slices<'a>, row: usize) -> Self::Item<'a> {
                ($(&slices.$idx[row],)+)
            }

            #[inline]
            fn item_mut<'a, 'b>(slices: &'b mut Self::SlicesMut<'a>, row: usize) -> Self::ItemMut<'b> {
                ($(&mut slices.$idx[row],)+)
            }
        }
    };
}

impl_query_data!(A: a: 0);
impl_query_data!(A: a: 0, B: b: 1);
impl_query_data!(A: a: 0, B: b: 1, C: c: 2);
impl_query_data!(A: a: 0, B: b: 1, C: c: 2, D: d: 3);
impl_query_data!(A: a: 0, B: b: 1, C: c: 2, D: d: 3, E: e: 4);

/// Read-only row range of one archetype.
pub struct Chunk<'a, Q: QueryData> {
    archetype: ArchetypeID,
    start: usize,
    entities: &'a [Entity],
    components: Q::Slices<'a>,
}

impl<'a, Q: QueryData> Clone for Chunk<'a, Q> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, Q: QueryData> Copy for Chunk<'a, Q> {}

impl<'a, Q: QueryData> Chunk<'a, Q> {
    /// Archetype the rows belong to.
    #[inline]
    pub fn archetype(&self) -> ArchetypeID {
        self.archetype
    }

    /// First archetype row covered by the chunk.
    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    /// Number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the chunk has no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entity of every row.
    #[inline]
    pub fn entities(&self) -> &'a [Entity] {
        self.entities
    }

    /// One slice per queried component.
    #[inline]
    pub fn components(&self) -> Q::Slices<'a> {
        self.components
    }

    /// Entity and component references of every row.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, Q::Item<'a>)> + 'a {
        let components = self.components;
        self.entities
            .iter()
            .enumerate()
            .map(move |(row, &entity)| (entity, Q::item(components, row)))
    }
}

/// Mutable row range of one archetype.
///
/// Chunks of the same run never overlap, so they can be handed to different
/// worker threads.
pub struct ChunkMut<'a, Q: QueryData> {
    archetype: ArchetypeID,
    start: usize,
    entities: &'a [Entity],
    components: Q::SlicesMut<'a>,
}

impl<'a, Q: QueryData> ChunkMut<'a, Q> {
    /// Archetype the rows belong to.
    #[inline]
    pub fn archetype(&self) -> ArchetypeID {
        self.archetype
    }

    /// First archetype row covered by the chunk.
    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    /// Number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the chunk has no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entity of every row.
    #[inline]
    pub fn entities(&self) -> &'a [Entity] {
        self.entities
    }

    /// One mutable slice per queried component.
    #[inline]
    pub fn components_mut(&mut self) -> &mut Q::SlicesMut<'a> {
        &mut self.components
    }

    /// Consumes the chunk into its entity slice and component slices.
    pub fn into_parts(self) -> (&'a [Entity], Q::SlicesMut<'a>) {
        (self.entities, self.components)
    }

    /// Calls `f` for every row.
    pub fn for_each(&mut self, mut f: impl FnMut(Entity, Q::ItemMut<'_>)) {
        for (row, &entity) in self.entities.iter().enumerate() {
            f(entity, Q::item_mut(&mut self.components, row));
        }
    }

    /// Splits into `[0, mid)` and `[mid, len)`.
    pub fn split_at(self, mid: usize) -> (Self, Self) {
        let ChunkMut { archetype, start, entities, components } = self;
        let (left_entities, right_entities) = entities.split_at(mid);
        let (left, right) = Q::split_at_mut(components, mid);
        (
            ChunkMut { archetype, start, entities: left_entities, components: left },
            ChunkMut { archetype, start: start + mid, entities: right_entities, components: right },
        )
    }
}

/// Archetype-level filter of a query.
#[derive(Clone, Debug, Default)]
struct QueryFilter {
    all_components: ComponentBits,
    any_components: ComponentBits,
    without_components: ComponentBits,
    all_tags: TagBits,
    any_tags: TagBits,
    without_any_tags: TagBits,
    without_all_tags: SmallVec<[TagBits; 2]>,
}

impl QueryFilter {
    fn matches(&self, signature: &Signature) -> bool {
        let components = &signature.components;
        let tags = &signature.tags;
        components.contains_all(&self.all_components)
            && !components.intersects(&self.without_components)
            && (self.any_components.is_empty() || components.intersects(&self.any_components))
            && tags.contains_all(&self.all_tags)
            && !tags.intersects(&self.without_any_tags)
            && (self.any_tags.is_empty() || tags.intersects(&self.any_tags))
            && self
                .without_all_tags
                .iter()
                .all(|forbidden| forbidden.is_empty() || !tags.contains_all(forbidden))
    }
}

type EntityPredicate = Box<dyn Fn(&Store) -> StoreResult<Vec<Entity>> + Send + Sync>;

/// Filtered, cached view over the archetypes of a store.
///
/// ## Role
/// Selects the archetypes whose signature contains every component of `Q`
/// plus the `with`/`without` filters, and hands out their columns as
/// [`Chunk`]s or [`ChunkMut`]s.
///
/// ## Caching
/// Matching archetypes are cached together with a watermark of the store's
/// archetype count, so later runs only test archetypes created since.
/// The cache belongs to one store at a time; switching stores rebuilds it.
///
/// ## Invariants
/// * Every run holds a [`QueryLoopGuard`] for as long as it yields chunks
/// * Value predicates narrow results to single-row chunks
pub struct Query<Q: QueryData> {
    schema: Arc<Schema>,
    ids: Vec<ComponentID>,
    multiple: usize,
    indexed: Option<&'static str>,
    filter: QueryFilter,
    predicates: Vec<EntityPredicate>,
    cache: Vec<ArchetypeID>,
    watermark: usize,
    store_id: u64,
    _marker: PhantomData<fn() -> Q>,
}

impl<Q: QueryData> Query<Q> {
    /// Builds a query against `schema`.
    ///
    /// Fails if a component of `Q` is unregistered or listed twice.
    pub fn new(schema: &Arc<Schema>) -> StoreResult<Self> {
        let ids = Q::component_ids(schema)?;
        let mut filter = QueryFilter::default();
        let mut multiple = 1;
        let mut indexed = None;
        for &id in &ids {
            let desc = schema.component(id).ok_or(StoreError::Internal("component id without descriptor"))?;
            if filter.all_components.has(id) {
                return Err(StoreError::DuplicateQueryComponent { name: desc.name });
            }
            filter.all_components.set(id);
            multiple = lcm(multiple, desc.lanes);
            if desc.is_indexed() && indexed.is_none() {
                indexed = Some(desc.name);
            }
        }
        Ok(Self {
            schema: Arc::clone(schema),
            ids,
            multiple,
            indexed,
            filter,
            predicates: Vec::new(),
            cache: Vec::new(),
            watermark: 0,
            store_id: 0,
            _marker: PhantomData,
        })
    }

    /// Ids of the queried components, in tuple order.
    pub fn component_ids(&self) -> &[ComponentID] {
        &self.ids
    }

    /// Least common multiple of the lane groupings of the queried
    /// components. Parallel sub-ranges are sized in multiples of it.
    pub fn component_multiple(&self) -> usize {
        self.multiple
    }

    /// Returns `true` if the query narrows rows by value.
    pub fn has_value_predicates(&self) -> bool {
        !self.predicates.is_empty()
    }

    fn filter_changed(mut self) -> Self {
        self.cache.clear();
        self.watermark = 0;
        self
    }

    // ── tag filters ────────────────────────────────────────────────────────

    /// Requires every tag of `S`.
    pub fn with_all_tags<S: TagSet>(mut self) -> StoreResult<Self> {
        self.filter.all_tags = self.filter.all_tags.union(&S::tag_bits(&self.schema)?);
        Ok(self.filter_changed())
    }

    /// Requires at least one tag of `S`.
    pub fn with_any_tags<S: TagSet>(mut self) -> StoreResult<Self> {
        self.filter.any_tags = self.filter.any_tags.union(&S::tag_bits(&self.schema)?);
        Ok(self.filter_changed())
    }

    /// Excludes entities carrying any tag of `S`.
    pub fn without_any_tags<S: TagSet>(mut self) -> StoreResult<Self> {
        self.filter.without_any_tags = self.filter.without_any_tags.union(&S::tag_bits(&self.schema)?);
        Ok(self.filter_changed())
    }

    /// Excludes entities carrying every tag of `S`.
    pub fn without_all_tags<S: TagSet>(mut self) -> StoreResult<Self> {
        let tags = S::tag_bits(&self.schema)?;
        self.filter.without_all_tags.push(tags);
        Ok(self.filter_changed())
    }

    // ── component filters ──────────────────────────────────────────────────

    /// Requires every component of `S` without iterating it.
    pub fn with_all_components<S: ComponentSet>(mut self) -> StoreResult<Self> {
        self.filter.all_components = self.filter.all_components.union(&S::component_bits(&self.schema)?);
        Ok(self.filter_changed())
    }

    /// Requires at least one component of `S`.
    pub fn with_any_components<S: ComponentSet>(mut self) -> StoreResult<Self> {
        self.filter.any_components = self.filter.any_components.union(&S::component_bits(&self.schema)?);
        Ok(self.filter_changed())
    }

    /// Excludes entities carrying any component of `S`.
    pub fn without_any_components<S: ComponentSet>(mut self) -> StoreResult<Self> {
        self.filter.without_components = self.filter.without_components.union(&S::component_bits(&self.schema)?);
        Ok(self.filter_changed())
    }

    // ── value predicates ───────────────────────────────────────────────────

    fn indexed_component<T: IndexedComponent>(&self) -> StoreResult<ComponentID> {
        let desc = self.schema.component_desc::<T>()?;
        if desc.kind != ComponentKind::Indexed {
            return Err(StoreError::NotIndexed { name: type_name::<T>() });
        }
        Ok(desc.id)
    }

    /// Keeps only entities whose `T` maps to `key`.
    pub fn with_value<T: IndexedComponent>(mut self, key: T::Key) -> StoreResult<Self> {
        let component = self.indexed_component::<T>()?;
        self.filter.all_components.set(component);
        self.predicates
            .push(Box::new(move |store: &Store| Ok(store.index::<T>()?.entities_with(&key).collect())));
        Ok(self.filter_changed())
    }

    /// Keeps only entities whose `T` maps into `[min, max]`.
    ///
    /// `min > max` matches nothing.
    pub fn with_value_range<T: IndexedComponent>(mut self, min: T::Key, max: T::Key) -> StoreResult<Self> {
        let component = self.indexed_component::<T>()?;
        self.filter.all_components.set(component);
        self.predicates
            .push(Box::new(move |store: &Store| Ok(store.index::<T>()?.entities_in_range(&min, &max))));
        Ok(self.filter_changed())
    }

    // ── resolution ─────────────────────────────────────────────────────────

    /// Classifies archetypes created since the last call.
    fn refresh(&mut self, store: &Store) -> StoreResult<()> {
        if !Arc::ptr_eq(&self.schema, store.schema()) {
            return Err(StoreError::SchemaMismatch);
        }
        if self.store_id != store.id {
            self.cache.clear();
            self.watermark = 0;
            self.store_id = store.id;
        }
        let archetypes = store.archetypes();
        for archetype in &archetypes[self.watermark..] {
            if self.filter.matches(archetype.signature()) {
                self.cache.push(archetype.id());
            }
        }
        self.watermark = archetypes.len();
        Ok(())
    }

    /// Ids of every matching archetype, in creation order.
    pub fn matching_archetypes(&mut self, store: &Store) -> StoreResult<&[ArchetypeID]> {
        self.refresh(store)?;
        Ok(&self.cache)
    }

    /// Rows selected by the value predicates, in ascending entity order.
    /// `None` when the query has no predicates.
    fn predicate_rows(&self, store: &Store) -> StoreResult<Option<Vec<EntityLocation>>> {
        let Some((first, rest)) = self.predicates.split_first() else {
            return Ok(None);
        };
        let mut candidates = first(store)?;
        for predicate in rest {
            let allowed: HashSet<Entity> = predicate(store)?.into_iter().collect();
            candidates.retain(|entity| allowed.contains(entity));
        }
        candidates.sort_unstable();
        candidates.dedup();

        let mut rows = Vec::with_capacity(candidates.len());
        for entity in candidates {
            let location = store.entity_location(entity)?;
            if self.filter.matches(store.archetypes[location.archetype as usize].signature()) {
                rows.push(location);
            }
        }
        Ok(Some(rows))
    }

    fn ensure_writable(&self) -> StoreResult<()> {
        match self.indexed {
            Some(name) => Err(StoreError::IndexedComponentMutation { name }),
            None => Ok(()),
        }
    }

    fn chunk_mut<'a>(archetype: &'a mut Archetype, ids: &[ComponentID]) -> StoreResult<ChunkMut<'a, Q>> {
        let id = archetype.id();
        let (entities, columns) = archetype
            .entities_and_columns_mut(ids)
            .ok_or(StoreError::Internal("matched archetype lacks a queried column"))?;
        let components = Q::from_columns_mut(columns).ok_or(StoreError::Internal("queried column has foreign type"))?;
        Ok(ChunkMut { archetype: id, start: 0, entities, components })
    }

    // ── iteration ──────────────────────────────────────────────────────────

    /// Read-only chunks of every matching archetype.
    ///
    /// The returned iterator holds a query loop guard until dropped.
    pub fn chunks<'a>(&'a mut self, store: &'a Store) -> StoreResult<Chunks<'a, Q>> {
        self.refresh(store)?;
        let guard = store.query_loop_guard();
        let source = match self.predicate_rows(store)? {
            Some(rows) => ChunkSource::Rows(rows.into_iter()),
            None => ChunkSource::Archetypes(self.cache.iter()),
        };
        Ok(Chunks { store, ids: &self.ids, source, _guard: guard, _marker: PhantomData })
    }

    /// Calls `f` for every matching entity.
    pub fn for_each(&mut self, store: &Store, mut f: impl FnMut(Entity, Q::Item<'_>)) -> StoreResult<()> {
        for chunk in self.chunks(store)? {
            for (entity, item) in chunk.iter() {
                f(entity, item);
            }
        }
        Ok(())
    }

    /// Handles of every matching entity.
    pub fn entities(&mut self, store: &Store) -> StoreResult<Vec<Entity>> {
        let mut entities = Vec::new();
        for chunk in self.chunks(store)? {
            entities.extend_from_slice(chunk.entities());
        }
        Ok(entities)
    }

    /// Number of matching entities.
    pub fn count(&mut self, store: &Store) -> StoreResult<usize> {
        Ok(self.chunks(store)?.map(|chunk| chunk.len()).sum())
    }

    /// Calls `f` with a mutable chunk per matching archetype, or per matching
    /// row when value predicates are present.
    ///
    /// Rejected with `IndexedComponentMutation` if `Q` contains an indexed
    /// component.
    pub fn for_each_chunk_mut(&mut self, store: &mut Store, mut f: impl FnMut(ChunkMut<'_, Q>)) -> StoreResult<()> {
        self.ensure_writable()?;
        self.refresh(store)?;
        let rows = self.predicate_rows(store)?;
        let _guard = store.query_loop_guard();
        match rows {
            None => {
                for &id in &self.cache {
                    let archetype = store
                        .archetypes
                        .get_mut(id as usize)
                        .ok_or(StoreError::Internal("cached archetype missing"))?;
                    if archetype.is_empty() {
                        continue;
                    }
                    f(Self::chunk_mut(archetype, &self.ids)?);
                }
            }
            Some(rows) => {
                for location in rows {
                    let archetype = store
                        .archetypes
                        .get_mut(location.archetype as usize)
                        .ok_or(StoreError::Internal("entity location points at missing archetype"))?;
                    let row = location.row as usize;
                    let (_, tail) = Self::chunk_mut(archetype, &self.ids)?.split_at(row);
                    let (single, _) = tail.split_at(1);
                    f(single);
                }
            }
        }
        Ok(())
    }

    /// Calls `f` with mutable references for every matching entity.
    pub fn for_each_mut(&mut self, store: &mut Store, mut f: impl FnMut(Entity, Q::ItemMut<'_>)) -> StoreResult<()> {
        self.for_each_chunk_mut(store, |mut chunk| chunk.for_each(&mut f))
    }

    /// Runs `f` over every matching row on `runner`'s worker pool.
    ///
    /// Each archetype range is split into contiguous, non-overlapping
    /// sub-ranges whose length is a multiple of
    /// [`component_multiple`](Self::component_multiple). Sub-ranges no longer
    /// than the runner's minimum run on the calling thread. Returns once every
    /// sub-range has completed.
    pub fn run_parallel<F>(&mut self, store: &mut Store, runner: &JobRunner, f: F) -> StoreResult<()>
    where
        F: Fn(ChunkMut<'_, Q>) + Send + Sync,
    {
        self.ensure_writable()?;
        self.refresh(store)?;
        let rows = self.predicate_rows(store)?;
        let _guard = store.query_loop_guard();

        let mut chunks: Vec<ChunkMut<'_, Q>> = Vec::new();
        match rows {
            None => {
                for archetype in store.archetypes.iter_mut() {
                    if archetype.is_empty() || self.cache.binary_search(&archetype.id()).is_err() {
                        continue;
                    }
                    chunks.push(Self::chunk_mut(archetype, &self.ids)?);
                }
            }
            Some(rows) => {
                let mut by_archetype: BTreeMap<ArchetypeID, Vec<usize>> = BTreeMap::new();
                for location in rows {
                    by_archetype.entry(location.archetype).or_default().push(location.row as usize);
                }
                for archetype in store.archetypes.iter_mut() {
                    let Some(selected) = by_archetype.get_mut(&archetype.id()) else { continue };
                    selected.sort_unstable();
                    let mut rest = Self::chunk_mut(archetype, &self.ids)?;
                    let mut consumed = 0;
                    for &row in selected.iter() {
                        let (_, tail) = rest.split_at(row - consumed);
                        let (single, remainder) = tail.split_at(1);
                        chunks.push(single);
                        rest = remainder;
                        consumed = row + 1;
                    }
                }
            }
        }

        runner.run_chunks(chunks, self.multiple, &f);
        Ok(())
    }
}

enum ChunkSource<'a> {
    Archetypes(std::slice::Iter<'a, ArchetypeID>),
    Rows(std::vec::IntoIter<EntityLocation>),
}

/// Iterator over the read-only chunks of a query.
pub struct Chunks<'a, Q: QueryData> {
    store: &'a Store,
    ids: &'a [ComponentID],
    source: ChunkSource<'a>,
    _guard: QueryLoopGuard,
    _marker: PhantomData<fn() -> Q>,
}

impl<'a, Q: QueryData> Iterator for Chunks<'a, Q> {
    type Item = Chunk<'a, Q>;

    fn next(&mut self) -> Option<Self::Item> {
        let store = self.store;
        loop {
            match &mut self.source {
                ChunkSource::Archetypes(ids) => {
                    let archetype = store.archetype(*ids.next()?)?;
                    if archetype.is_empty() {
                        continue;
                    }
                    let components = Q::fetch(archetype, self.ids)?;
                    return Some(Chunk { archetype: archetype.id(), start: 0, entities: archetype.entities(), components });
                }
                ChunkSource::Rows(rows) => {
                    let location = rows.next()?;
                    let archetype = store.archetype(location.archetype)?;
                    let row = location.row as usize;
                    let components = Q::slice(Q::fetch(archetype, self.ids)?, row..row + 1);
                    return Some(Chunk {
                        archetype: archetype.id(),
                        start: row,
                        entities: &archetype.entities()[row..row + 1],
                        components,
                    });
                }
            }
        }
    }
}
