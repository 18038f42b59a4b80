//! # Engine Module
//!
//! Store internals, one subsystem per file:
//! - identifiers, signatures and errors (`types`, `error`)
//! - schema, columns and archetypes (`component`, `storage`, `archetype`)
//! - entity nodes and the store itself (`entity`, `store`, `structural`)
//! - deferred changes (`commands`) and change events (`events`)
//! - queries, loop guards and parallel jobs (`query`, `borrow`, `jobs`)
//! - value indexes and relations (`index`, `relation`)
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod error;
pub mod config;
pub mod component;
pub mod storage;
pub mod entity;
pub mod archetype;
pub mod store;
pub mod structural;
pub mod events;
pub mod commands;
pub mod borrow;
pub mod query;
pub mod jobs;
pub mod index;
pub mod relation;
