//! # Schema
//!
//! This module provides the explicit registry object that assigns dense ids
//! to component, tag and relation types, and the type-erased factories stores
//! use to allocate columns, value indexes and relation tables.
//!
//! ## Purpose
//! A [`Schema`] decouples type information (`TypeId`, name, size, alignment)
//! from runtime storage, so archetypes can hold heterogeneous columns behind
//! [`TypeErasedColumn`]. There is no process-wide state: every store is built
//! from its own `Arc<Schema>`, and several stores with different schemas can
//! live in the same process.
//!
//! ## Design
//! - Types are registered on a [`SchemaBuilder`] and receive a compact id in
//!   `[0, CAP)` for their kind.
//! - Each component descriptor stores a column factory function pointer and,
//!   for indexed and link components, an index factory.
//! - [`SchemaBuilder::build`] finalizes the schema. A store can only be
//!   created from a finalized schema, so registration after store creation is
//!   impossible by construction.
//!
//! ## Invariants
//! - Ids are unique and stable for the lifetime of the schema.
//! - Stable keys are unique per kind.
//! - Every component descriptor carries a column factory.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::mem::{align_of, size_of};
use std::sync::Arc;

use crate::engine::entity::Entity;
use crate::engine::error::{SchemaError, StoreError, StoreResult};
use crate::engine::index::{ComponentIndex, ErasedIndex, LinkIndex};
use crate::engine::relation::{ErasedRelationTable, RelationTable};
use crate::engine::storage::{Column, TypeErasedColumn};
use crate::engine::types::{
    ComponentBits, ComponentID, RelationID, Signature, TagBits, TagID, COMPONENT_CAP, RELATION_CAP, TAG_CAP,
};

/// Width in bytes of the widest SIMD register rows are grouped for.
pub const LANE_BYTES: usize = 32;

/// Marker for types storable as components.
///
/// Implemented automatically for every `'static + Send + Sync + Clone` type.
pub trait Component: 'static + Send + Sync + Clone {}

impl<T: 'static + Send + Sync + Clone> Component for T {}

/// A component whose values are tracked by an inverted value index.
pub trait IndexedComponent: Component {
    /// Indexed key derived from the component value.
    type Key: Hash + Eq + Ord + Clone + Debug + Send + Sync + 'static;

    /// Returns the key this value is filed under.
    fn index_key(&self) -> Self::Key;
}

/// A component whose value points at another entity.
///
/// Link components are indexed by target, and removed from every source when
/// the target is deleted.
pub trait LinkComponent: Component {
    /// Entity this value points at.
    fn target(&self) -> Entity;
}

/// A multi-valued, key-addressed component type.
pub trait Relation: 'static + Send + Sync + Clone {
    /// Key distinguishing relations of the same owner.
    type Key: Hash + Eq + Clone + Debug + Send + Sync + 'static;

    /// Returns the key of this relation value.
    fn relation_key(&self) -> Self::Key;

    /// Target entity for link relations. Plain relations return `None`.
    fn link_target(&self) -> Option<Entity> {
        None
    }
}

/// Factory for an empty component column.
pub type ColumnFactory = fn() -> Box<dyn TypeErasedColumn>;
/// Factory for an empty value index.
pub(crate) type IndexFactory = fn() -> Box<dyn ErasedIndex>;
/// Factory for an empty relation table.
pub(crate) type RelationFactory = fn() -> Box<dyn ErasedRelationTable>;

fn new_column<T: Component>() -> Box<dyn TypeErasedColumn> {
    Box::new(Column::<T>::new())
}

fn new_component_index<T: IndexedComponent>() -> Box<dyn ErasedIndex> {
    Box::new(ComponentIndex::<T>::new())
}

fn new_link_index<T: LinkComponent>() -> Box<dyn ErasedIndex> {
    Box::new(LinkIndex::<T>::new())
}

fn new_relation_table<R: Relation>() -> Box<dyn ErasedRelationTable> {
    Box::new(RelationTable::<R>::new())
}

/// Role a component type was registered in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentKind {
    /// Plain column storage.
    Plain,
    /// Column storage plus a value index.
    Indexed,
    /// Column storage plus a target index and delete cascade.
    Link,
}

/// Registration record for one component type.
#[derive(Clone, Debug)]
pub struct ComponentDesc {
    /// Dense component id.
    pub id: ComponentID,
    /// Stable key (defaults to the Rust type name).
    pub key: String,
    /// Rust type name.
    pub name: &'static str,
    /// `TypeId` of the component type.
    pub type_id: TypeId,
    /// `size_of::<T>()`.
    pub size: usize,
    /// `align_of::<T>()`.
    pub align: usize,
    /// Number of rows grouped into one SIMD batching unit.
    pub lanes: usize,
    /// Registration role.
    pub kind: ComponentKind,
    column_factory: ColumnFactory,
    index_factory: Option<IndexFactory>,
}

impl ComponentDesc {
    fn of<T: Component>(id: ComponentID, key: String, kind: ComponentKind, index_factory: Option<IndexFactory>) -> Self {
        let size = size_of::<T>();
        let lanes = if size > 0 && LANE_BYTES % size == 0 { LANE_BYTES / size } else { 1 };
        Self {
            id,
            key,
            name: type_name::<T>(),
            type_id: TypeId::of::<T>(),
            size,
            align: align_of::<T>(),
            lanes,
            kind,
            column_factory: new_column::<T>,
            index_factory,
        }
    }

    /// Allocates an empty column for this component.
    #[inline]
    pub fn new_column(&self) -> Box<dyn TypeErasedColumn> {
        (self.column_factory)()
    }

    pub(crate) fn new_index(&self) -> Option<Box<dyn ErasedIndex>> {
        self.index_factory.map(|factory| factory())
    }

    /// Returns `true` for indexed and link components.
    #[inline]
    pub fn is_indexed(&self) -> bool {
        self.kind != ComponentKind::Plain
    }
}

/// Registration record for one tag type.
#[derive(Clone, Debug)]
pub struct TagDesc {
    /// Dense tag id.
    pub id: TagID,
    /// Stable key.
    pub key: String,
    /// Rust type name.
    pub name: &'static str,
    /// `TypeId` of the tag type.
    pub type_id: TypeId,
}

/// Registration record for one relation type.
#[derive(Clone, Debug)]
pub struct RelationDesc {
    /// Dense relation id.
    pub id: RelationID,
    /// Stable key.
    pub key: String,
    /// Rust type name.
    pub name: &'static str,
    /// `TypeId` of the relation type.
    pub type_id: TypeId,
    factory: RelationFactory,
}

impl RelationDesc {
    pub(crate) fn new_table(&self) -> Box<dyn ErasedRelationTable> {
        (self.factory)()
    }
}

/// Finalized registry of component, tag and relation types.
#[derive(Debug)]
pub struct Schema {
    components: Vec<ComponentDesc>,
    component_by_type: HashMap<TypeId, ComponentID>,
    component_by_key: HashMap<String, ComponentID>,
    tags: Vec<TagDesc>,
    tag_by_type: HashMap<TypeId, TagID>,
    tag_by_key: HashMap<String, TagID>,
    relations: Vec<RelationDesc>,
    relation_by_type: HashMap<TypeId, RelationID>,
}

impl Schema {
    /// Starts a new builder.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Number of registered component types.
    #[inline]
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Number of registered tag types.
    #[inline]
    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    /// Number of registered relation types.
    #[inline]
    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    /// All component descriptors, ordered by id.
    #[inline]
    pub fn components(&self) -> &[ComponentDesc] {
        &self.components
    }

    /// All tag descriptors, ordered by id.
    #[inline]
    pub fn tags(&self) -> &[TagDesc] {
        &self.tags
    }

    /// All relation descriptors, ordered by id.
    #[inline]
    pub fn relations(&self) -> &[RelationDesc] {
        &self.relations
    }

    /// Descriptor of component `id`.
    #[inline]
    pub fn component(&self, id: ComponentID) -> Option<&ComponentDesc> {
        self.components.get(id as usize)
    }

    /// Id of component type `T`.
    pub fn component_id<T: 'static>(&self) -> Result<ComponentID, SchemaError> {
        self.component_by_type
            .get(&TypeId::of::<T>())
            .copied()
            .ok_or(SchemaError::UnregisteredComponent { name: type_name::<T>() })
    }

    /// Descriptor of component type `T`.
    pub fn component_desc<T: 'static>(&self) -> Result<&ComponentDesc, SchemaError> {
        let id = self.component_id::<T>()?;
        Ok(&self.components[id as usize])
    }

    /// Id of the component registered under a stable key.
    pub fn component_id_by_key(&self, key: &str) -> Result<ComponentID, SchemaError> {
        self.component_by_key
            .get(key)
            .copied()
            .ok_or_else(|| SchemaError::UnknownKey { key: key.to_owned() })
    }

    /// Id of tag type `T`.
    pub fn tag_id<T: 'static>(&self) -> Result<TagID, SchemaError> {
        self.tag_by_type
            .get(&TypeId::of::<T>())
            .copied()
            .ok_or(SchemaError::UnregisteredTag { name: type_name::<T>() })
    }

    /// Id of the tag registered under a stable key.
    pub fn tag_id_by_key(&self, key: &str) -> Result<TagID, SchemaError> {
        self.tag_by_key
            .get(key)
            .copied()
            .ok_or_else(|| SchemaError::UnknownKey { key: key.to_owned() })
    }

    /// Id of relation type `R`.
    pub fn relation_id<R: 'static>(&self) -> Result<RelationID, SchemaError> {
        self.relation_by_type
            .get(&TypeId::of::<R>())
            .copied()
            .ok_or(SchemaError::UnregisteredRelation { name: type_name::<R>() })
    }
}

/// Collects registrations and finalizes them into a [`Schema`].
///
/// ## Example
/// ```
/// use archestore::Schema;
///
/// #[derive(Clone)]
/// struct Position { x: f32, y: f32 }
/// struct Disabled;
///
/// let mut builder = Schema::builder();
/// builder.register_component::<Position>()?;
/// builder.register_tag::<Disabled>()?;
/// let schema = builder.build();
/// assert_eq!(schema.component_count(), 1);
/// # Ok::<(), archestore::SchemaError>(())
/// ```
#[derive(Default)]
pub struct SchemaBuilder {
    schema: Schema,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            components: Vec::new(),
            component_by_type: HashMap::new(),
            component_by_key: HashMap::new(),
            tags: Vec::new(),
            tag_by_type: HashMap::new(),
            tag_by_key: HashMap::new(),
            relations: Vec::new(),
            relation_by_type: HashMap::new(),
        }
    }
}

impl SchemaBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plain component keyed by its type name.
    pub fn register_component<T: Component>(&mut self) -> Result<ComponentID, SchemaError> {
        self.push_component::<T>(type_name::<T>().to_owned(), ComponentKind::Plain, None)
    }

    /// Registers a plain component under an explicit stable key.
    pub fn register_component_named<T: Component>(&mut self, key: &str) -> Result<ComponentID, SchemaError> {
        self.push_component::<T>(key.to_owned(), ComponentKind::Plain, None)
    }

    /// Registers a component together with a value index.
    pub fn register_indexed<T: IndexedComponent>(&mut self) -> Result<ComponentID, SchemaError> {
        self.push_component::<T>(
            type_name::<T>().to_owned(),
            ComponentKind::Indexed,
            Some(new_component_index::<T>),
        )
    }

    /// Registers a link component (indexed by target entity).
    pub fn register_link<T: LinkComponent>(&mut self) -> Result<ComponentID, SchemaError> {
        self.push_component::<T>(type_name::<T>().to_owned(), ComponentKind::Link, Some(new_link_index::<T>))
    }

    /// Registers a tag type.
    pub fn register_tag<T: 'static>(&mut self) -> Result<TagID, SchemaError> {
        self.register_tag_named::<T>(type_name::<T>())
    }

    /// Registers a tag type under an explicit stable key.
    pub fn register_tag_named<T: 'static>(&mut self, key: &str) -> Result<TagID, SchemaError> {
        let schema = &mut self.schema;
        let type_id = TypeId::of::<T>();
        if schema.tag_by_type.contains_key(&type_id) {
            return Err(SchemaError::DuplicateType { name: type_name::<T>() });
        }
        if schema.tag_by_key.contains_key(key) {
            return Err(SchemaError::DuplicateKey { key: key.to_owned() });
        }
        if schema.tags.len() >= TAG_CAP {
            return Err(SchemaError::Capacity { kind: "tag", cap: TAG_CAP });
        }
        let id = schema.tags.len() as TagID;
        schema.tags.push(TagDesc { id, key: key.to_owned(), name: type_name::<T>(), type_id });
        schema.tag_by_type.insert(type_id, id);
        schema.tag_by_key.insert(key.to_owned(), id);
        Ok(id)
    }

    /// Registers a relation type.
    pub fn register_relation<R: Relation>(&mut self) -> Result<RelationID, SchemaError> {
        let schema = &mut self.schema;
        let type_id = TypeId::of::<R>();
        if schema.relation_by_type.contains_key(&type_id) {
            return Err(SchemaError::DuplicateType { name: type_name::<R>() });
        }
        if schema.relations.len() >= RELATION_CAP {
            return Err(SchemaError::Capacity { kind: "relation", cap: RELATION_CAP });
        }
        let id = schema.relations.len() as RelationID;
        schema.relations.push(RelationDesc {
            id,
            key: type_name::<R>().to_owned(),
            name: type_name::<R>(),
            type_id,
            factory: new_relation_table::<R>,
        });
        schema.relation_by_type.insert(type_id, id);
        Ok(id)
    }

    /// Finalizes the registry.
    pub fn build(self) -> Arc<Schema> {
        tracing::debug!(
            components = self.schema.components.len(),
            tags = self.schema.tags.len(),
            relations = self.schema.relations.len(),
            "schema finalized"
        );
        Arc::new(self.schema)
    }

    fn push_component<T: Component>(
        &mut self,
        key: String,
        kind: ComponentKind,
        index_factory: Option<IndexFactory>,
    ) -> Result<ComponentID, SchemaError> {
        let schema = &mut self.schema;
        let type_id = TypeId::of::<T>();
        if schema.component_by_type.contains_key(&type_id) {
            return Err(SchemaError::DuplicateType { name: type_name::<T>() });
        }
        if schema.component_by_key.contains_key(&key) {
            return Err(SchemaError::DuplicateKey { key });
        }
        if schema.components.len() >= COMPONENT_CAP {
            return Err(SchemaError::Capacity { kind: "component", cap: COMPONENT_CAP });
        }
        let id = schema.components.len() as ComponentID;
        schema.component_by_type.insert(type_id, id);
        schema.component_by_key.insert(key.clone(), id);
        schema.components.push(ComponentDesc::of::<T>(id, key, kind, index_factory));
        Ok(id)
    }
}

/// A compile-time set of tag types, e.g. `(Disabled,)` or `(A, B)`.
pub trait TagSet {
    /// Resolves the set to tag bits.
    fn tag_bits(schema: &Schema) -> Result<TagBits, SchemaError>;
}

/// A compile-time set of component types used as a filter.
pub trait ComponentSet {
    /// Resolves the set to component bits.
    fn component_bits(schema: &Schema) -> Result<ComponentBits, SchemaError>;
}

impl TagSet for () {
    fn tag_bits(_: &Schema) -> Result<TagBits, SchemaError> {
        Ok(TagBits::new())
    }
}

impl ComponentSet for () {
    fn component_bits(_: &Schema) -> Result<ComponentBits, SchemaError> {
        Ok(ComponentBits::new())
    }
}

macro_rules! impl_type_sets {
    ($($name:ident),+) => {
        impl<$($name: 'static),+> TagSet for ($($name,)+) {
            fn tag_bits(schema: &Schema) -> Result<TagBits, SchemaError> {
                let mut bits = TagBits::new();
                $( bits.set(schema.tag_id::<$name>()?); )+
                Ok(bits)
            }
        }

        impl<$($name: 'static),+> ComponentSet for ($($name,)+) {
            fn component_bits(schema: &Schema) -> Result<ComponentBits, SchemaError> {
                let mut bits = ComponentBits::new();
                $( bits.set(schema.component_id::<$name>()?); )+
                Ok(bits)
            }
        }
    };
}

impl_type_sets!(A);
impl_type_sets!(A, B);
impl_type_sets!(A, B, C);
impl_type_sets!(A, B, C, D);
impl_type_sets!(A, B, C, D, E);
impl_type_sets!(A, B, C, D, E, F);

/// Type-erased set of component values and tags describing a new entity.
///
/// Used by [`Store::create_entity_with`](crate::Store::create_entity_with)
/// and [`Store::create_entities`](crate::Store::create_entities) to place
/// entities directly into their final archetype.
pub struct Bundle {
    schema: Arc<Schema>,
    signature: Signature,
    values: Vec<(ComponentID, Box<dyn Any + Send + Sync>)>,
}

impl Bundle {
    /// Creates an empty bundle for `schema`.
    pub fn new(schema: &Arc<Schema>) -> Self {
        Self { schema: Arc::clone(schema), signature: Signature::empty(), values: Vec::new() }
    }

    /// Adds or replaces a component value.
    pub fn with<T: Component>(mut self, value: T) -> StoreResult<Self> {
        self.insert(value)?;
        Ok(self)
    }

    /// Adds a tag.
    pub fn with_tag<T: 'static>(mut self) -> StoreResult<Self> {
        let id = self.schema.tag_id::<T>()?;
        self.signature.tags.set(id);
        Ok(self)
    }

    /// Adds or replaces a component value in place.
    pub fn insert<T: Component>(&mut self, value: T) -> StoreResult<()> {
        let id = self.schema.component_id::<T>()?;
        match self.values.iter_mut().find(|(existing, _)| *existing == id) {
            Some(slot) => slot.1 = Box::new(value),
            None => {
                self.values.push((id, Box::new(value)));
                self.signature.components.set(id);
            }
        }
        Ok(())
    }

    /// Signature of the archetype entities created from this bundle land in.
    #[inline]
    pub fn signature(&self) -> Signature {
        self.signature
    }

    /// Number of component values.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the bundle carries no components.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn check_schema(&self, schema: &Arc<Schema>) -> StoreResult<()> {
        if Arc::ptr_eq(&self.schema, schema) {
            Ok(())
        } else {
            Err(StoreError::BundleTypeMismatch)
        }
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = (ComponentID, &dyn Any)> + '_ {
        self.values.iter().map(|(id, value)| (*id, &**value as &dyn Any))
    }
}
