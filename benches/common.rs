#![allow(dead_code)]

use std::sync::Arc;

use archestore::{Bundle, Schema, Store, StoreResult};

pub const AGENTS_SMALL: usize = 10_000;
pub const AGENTS_MED: usize = 100_000;
pub const AGENTS_LARGE: usize = 1_000_000;

#[derive(Clone, Copy)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Copy)]
pub struct Wealth {
    pub value: f32,
}

#[derive(Clone, Copy)]
pub struct Productivity {
    pub rate: f32,
}

pub struct Idle;

pub fn schema() -> Arc<Schema> {
    let mut builder = Schema::builder();
    builder.register_component::<Position>().expect("register Position");
    builder.register_component::<Wealth>().expect("register Wealth");
    builder.register_component::<Productivity>().expect("register Productivity");
    builder.register_tag::<Idle>().expect("register Idle");
    builder.build()
}

/// Store holding `agent_count` agents carrying all three components.
pub fn setup_world(agent_count: usize) -> StoreResult<Store> {
    let mut store = Store::new(schema());
    let bundle = Bundle::new(store.schema())
        .with(Position { x: 0.0, y: 0.0 })?
        .with(Wealth { value: 100.0 })?
        .with(Productivity { rate: 1.0 })?;
    store.create_entities(agent_count, &bundle)?;
    Ok(store)
}
