//! Error types for the store.
//!
//! Errors are small, focused enums composed into the aggregate [`StoreError`]
//! through `From` conversions so call sites can use `?` freely.
//!
//! ## Taxonomy
//! * **Misuse errors**: a stale entity handle, a structural change while a
//!   query loop is active, an unregistered type, a missing relation key. These
//!   indicate logic bugs and are returned immediately from the public entry
//!   point that detected them. No operation partially applies before one is
//!   returned.
//! * **Data errors**: degenerate but valid requests (e.g. an index range
//!   with `min > max`) are *not* errors; they produce empty results.
//!
//! ## Display vs. Debug
//! * `Display` is short and suitable for logs.
//! * `Debug` (derived) retains full structure for diagnostics.

use std::any::TypeId;

use thiserror::Error;

use crate::engine::entity::Entity;
use crate::engine::types::RowID;

/// Convenience alias used by every fallible store operation.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures raised by a single component column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ColumnError {
    /// A row index addressed storage outside `[0, len)`.
    #[error("row {row} out of bounds (column length {len})")]
    RowOutOfBounds {
        /// Row that was addressed.
        row: RowID,
        /// Current column length.
        len: usize,
    },

    /// A value or source column did not match the column's element type.
    #[error("column type mismatch: expected {expected}, actual {actual:?}")]
    TypeMismatch {
        /// Element type name declared by the column.
        expected: &'static str,
        /// `TypeId` of the value supplied by the caller.
        actual: TypeId,
    },
}

/// Failures raised while building or consulting a [`Schema`](crate::Schema).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Two registrations used the same stable key.
    #[error("duplicate schema key `{key}`")]
    DuplicateKey {
        /// Offending key.
        key: String,
    },

    /// The same Rust type was registered twice in the same role.
    #[error("type `{name}` is already registered")]
    DuplicateType {
        /// Rust type name.
        name: &'static str,
    },

    /// Registration exceeded a compile-time capacity.
    #[error("{kind} capacity exceeded (max {cap})")]
    Capacity {
        /// What ran out (`"component"`, `"tag"`, `"relation"`).
        kind: &'static str,
        /// Configured capacity.
        cap: usize,
    },

    /// A component type was used without being registered.
    #[error("component `{name}` is not registered")]
    UnregisteredComponent {
        /// Rust type name.
        name: &'static str,
    },

    /// A tag type was used without being registered.
    #[error("tag `{name}` is not registered")]
    UnregisteredTag {
        /// Rust type name.
        name: &'static str,
    },

    /// A relation type was used without being registered.
    #[error("relation `{name}` is not registered")]
    UnregisteredRelation {
        /// Rust type name.
        name: &'static str,
    },

    /// A type was registered, but not in the role the caller required
    /// (e.g. asking for incoming links of a plain component).
    #[error("`{name}` is not registered as {expected}")]
    WrongRole {
        /// Rust type name.
        name: &'static str,
        /// Role the caller required.
        expected: &'static str,
    },

    /// No component is registered under the given stable key.
    #[error("no component registered under key `{key}`")]
    UnknownKey {
        /// Key that was looked up.
        key: String,
    },
}

/// Aggregate error returned by store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The entity handle is null, freed, or carries a stale revision.
    #[error("entity {entity} not found")]
    EntityNotFound {
        /// Rejected handle.
        entity: Entity,
    },

    /// A structural change was attempted while query enumerators are alive.
    #[error("structural change while {loops} query loop(s) are active")]
    QueryLoopActive {
        /// Number of active enumerators at the time of the call.
        loops: u32,
    },

    /// Schema lookup failure.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Column-level failure.
    #[error(transparent)]
    Column(#[from] ColumnError),

    /// An update-only operation targeted a component the entity does not carry.
    #[error("entity {entity} has no component `{name}`")]
    MissingComponent {
        /// Target entity.
        entity: Entity,
        /// Rust type name of the component.
        name: &'static str,
    },

    /// An index lookup targeted a component registered without an index.
    #[error("component `{name}` is not indexed")]
    NotIndexed {
        /// Rust type name of the component.
        name: &'static str,
    },

    /// Mutable access would bypass the value index of an indexed component.
    #[error("component `{name}` is indexed; use set_component instead of mutable access")]
    IndexedComponentMutation {
        /// Rust type name of the component.
        name: &'static str,
    },

    /// A relation lookup found no value with the requested key.
    #[error("entity {entity} has no `{name}` relation with the requested key")]
    RelationKeyNotFound {
        /// Owning entity.
        entity: Entity,
        /// Rust type name of the relation.
        name: &'static str,
    },

    /// A query listed the same component type twice.
    #[error("component `{name}` listed more than once in query")]
    DuplicateQueryComponent {
        /// Rust type name of the component.
        name: &'static str,
    },

    /// A bundle built against a different schema was handed to this store.
    #[error("bundle was built against a different schema")]
    BundleTypeMismatch,

    /// A query or command buffer built against a different schema was used
    /// with this store.
    #[error("query or command buffer was built against a different schema")]
    SchemaMismatch,

    /// A single-use command buffer was played back twice.
    #[error("command buffer already played back")]
    CommandBufferConsumed,

    /// A command was recorded for an entity already queued for deletion.
    #[error("command recorded after delete of entity {entity}")]
    CommandAfterDelete {
        /// Target entity.
        entity: Entity,
    },

    /// An internal invariant was violated.
    #[error("internal invariant violated: {0}")]
    Internal(&'static str),
}

/// Failures while loading a [`StoreConfig`](crate::StoreConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML document could not be parsed.
    #[error("invalid store config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The worker pool could not be created.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
