//! # archestore
//!
//! In-memory archetype entity store.
//!
//! Entities are grouped by their exact set of component types and tags (their
//! [`Signature`]) into dense, column-major [`Archetype`] tables. Adding or
//! removing a component moves the entity's row to another table; queries walk
//! whole tables as contiguous slices.
//!
//! ## Design Goals
//! - Archetype-based storage for cache efficiency
//! - Deferred structural changes through [`CommandBuffer`], applied with one
//!   archetype move per entity
//! - Chunked, optionally parallel query iteration
//! - Value indexes and one-to-many relations kept consistent with every
//!   structural change
//!
//! ## Example
//! ```
//! use archestore::{Schema, Store};
//!
//! #[derive(Clone)]
//! struct Position(f32);
//!
//! let mut builder = Schema::builder();
//! builder.register_component::<Position>().unwrap();
//! let mut store = Store::new(builder.build());
//!
//! let entity = store.create_entity().unwrap();
//! store.add_component(entity, Position(1.0)).unwrap();
//! assert_eq!(store.get_component::<Position>(entity).unwrap().0, 1.0);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]
#![deny(dead_code)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

pub use engine::store::{Store, StoreStats};

pub use engine::config::StoreConfig;

pub use engine::entity::{Entity, EntityLocation, NodeFlags};

pub use engine::component::{
    Bundle,
    Component,
    ComponentDesc,
    ComponentKind,
    ComponentSet,
    IndexedComponent,
    LinkComponent,
    Relation,
    Schema,
    SchemaBuilder,
    TagSet,
};

pub use engine::archetype::Archetype;

pub use engine::commands::{CommandBuffer, PlaybackStats};

pub use engine::query::{Chunk, ChunkMut, Chunks, Query, QueryData};

pub use engine::jobs::JobRunner;

pub use engine::borrow::QueryLoopGuard;

pub use engine::events::{ComponentAction, ComponentChanged, SubscriptionId, TagsChanged};

pub use engine::index::{ComponentIndex, LinkIndex, ValueIndex};

pub use engine::relation::RelationTable;

pub use engine::error::{ColumnError, ConfigError, SchemaError, StoreError, StoreResult};

pub use engine::types::{
    ArchetypeID,
    ComponentBits,
    ComponentID,
    EntityID,
    RelationID,
    Signature,
    SignatureChange,
    TagBits,
    TagID,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used store types.
///
/// Import with:
/// ```rust
/// use archestore::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Bundle,
        CommandBuffer,
        Component,
        ComponentAction,
        Entity,
        IndexedComponent,
        JobRunner,
        LinkComponent,
        Query,
        Relation,
        Schema,
        Store,
        StoreConfig,
        StoreError,
        StoreResult,
    };
}
