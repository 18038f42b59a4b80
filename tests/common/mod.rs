#![allow(dead_code)]

use std::sync::Arc;

use archestore::{Entity, IndexedComponent, LinkComponent, Relation, Schema, Store, StoreConfig};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Velocity {
    pub dx: f32,
    pub dy: f32,
}

/// Indexed by team number.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Team(pub u32);

impl IndexedComponent for Team {
    type Key = u32;

    fn index_key(&self) -> u32 {
        self.0
    }
}

/// Indexed, used for range lookups.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Level(pub i32);

impl IndexedComponent for Level {
    type Key = i32;

    fn index_key(&self) -> i32 {
        self.0
    }
}

/// Implements `IndexedComponent` but is registered as a plain component.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Score(pub i32);

impl IndexedComponent for Score {
    type Key = i32;

    fn index_key(&self) -> i32 {
        self.0
    }
}

/// Link component pointing at a parent entity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Parent(pub Entity);

impl LinkComponent for Parent {
    fn target(&self) -> Entity {
        self.0
    }
}

pub struct Disabled;
pub struct Frozen;
pub struct Marked;

/// Keyed relation without a target.
#[derive(Clone, Debug, PartialEq)]
pub struct Slot {
    pub key: char,
    pub value: i32,
}

impl Relation for Slot {
    type Key = char;

    fn relation_key(&self) -> char {
        self.key
    }
}

/// Link relation: one entry per followed entity.
#[derive(Clone, Debug, PartialEq)]
pub struct Follows(pub Entity);

impl Relation for Follows {
    type Key = Entity;

    fn relation_key(&self) -> Entity {
        self.0
    }

    fn link_target(&self) -> Option<Entity> {
        Some(self.0)
    }
}

/// Component ids follow registration order: Position 0, Velocity 1, Team 2,
/// Level 3, Score 4, Parent 5.
pub fn schema() -> Arc<Schema> {
    let mut builder = Schema::builder();
    builder.register_component::<Position>().unwrap();
    builder.register_component::<Velocity>().unwrap();
    builder.register_indexed::<Team>().unwrap();
    builder.register_indexed::<Level>().unwrap();
    builder.register_component::<Score>().unwrap();
    builder.register_link::<Parent>().unwrap();
    builder.register_tag::<Disabled>().unwrap();
    builder.register_tag::<Frozen>().unwrap();
    builder.register_tag::<Marked>().unwrap();
    builder.register_relation::<Slot>().unwrap();
    builder.register_relation::<Follows>().unwrap();
    builder.build()
}

pub fn store() -> Store {
    Store::new(schema())
}

pub fn store_with(config: StoreConfig) -> Store {
    Store::with_config(schema(), config)
}

/// Checks that every row of every archetype points back at its entity and
/// that the row count matches the live entity count.
pub fn assert_consistent(store: &Store) {
    let mut rows = 0;
    for archetype in store.archetypes() {
        assert!(archetype.is_consistent(), "archetype {} has ragged columns", archetype.id());
        for (row, &entity) in archetype.entities().iter().enumerate() {
            let location = store.entity_location(entity).unwrap();
            assert_eq!(location.archetype, archetype.id(), "{entity} points at wrong archetype");
            assert_eq!(location.row as usize, row, "{entity} points at wrong row");
        }
        rows += archetype.len();
    }
    assert_eq!(rows, store.entity_count());
}

/// Spawns `count` entities carrying `Position(i, 0)`.
pub fn spawn_positions(store: &mut Store, count: usize) -> Vec<Entity> {
    (0..count)
        .map(|i| {
            let entity = store.create_entity().unwrap();
            store.add_component(entity, Position::new(i as f32, 0.0)).unwrap();
            entity
        })
        .collect()
}
