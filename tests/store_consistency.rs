use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use archestore::{Bundle, ComponentAction, Entity, StoreError};

mod common;
use common::*;

#[test]
fn create_and_delete_recycles_ids_with_new_revision() {
    let mut store = store();

    let a = store.create_entity().unwrap();
    let b = store.create_entity().unwrap();
    assert_eq!((a.id, a.revision), (1, 0));
    assert_eq!((b.id, b.revision), (2, 0));

    store.delete_entity(a).unwrap();
    assert!(!store.is_alive(a));
    assert_eq!(store.entity_count(), 1);

    let c = store.create_entity().unwrap();
    assert_eq!(c.id, a.id);
    assert_eq!(c.revision, a.revision + 1);
    assert!(store.is_alive(c));

    // The stale handle is rejected everywhere.
    assert_eq!(store.entity_location(a), Err(StoreError::EntityNotFound { entity: a }));
    assert_eq!(
        store.add_component(a, Position::new(0.0, 0.0)),
        Err(StoreError::EntityNotFound { entity: a })
    );
    assert_eq!(store.delete_entity(a), Err(StoreError::EntityNotFound { entity: a }));
    assert_consistent(&store);
}

#[test]
fn null_entity_is_never_alive() {
    let mut store = store();
    store.create_entity().unwrap();
    assert!(Entity::NULL.is_null());
    assert!(!store.is_alive(Entity::NULL));
    assert!(store.get_component::<Position>(Entity::NULL).is_err());
}

#[test]
fn swap_with_last_patches_moved_entity() {
    let mut store = store();
    let entities = spawn_positions(&mut store, 3);
    let archetype = store.entity_location(entities[0]).unwrap().archetype;

    // Moving the first row out pulls the last row into row 0.
    store.add_component(entities[0], Velocity { dx: 1.0, dy: 0.0 }).unwrap();

    let moved = store.entity_location(entities[2]).unwrap();
    assert_eq!(moved.archetype, archetype);
    assert_eq!(moved.row, 0);
    assert_eq!(store.get_component::<Position>(entities[2]).unwrap().x, 2.0);
    assert_eq!(store.get_component::<Position>(entities[0]).unwrap().x, 0.0);
    assert_consistent(&store);
}

#[test]
fn adding_present_or_removing_absent_is_idempotent() {
    let mut store = store();
    let entity = store.create_entity().unwrap();
    assert_eq!(store.add_component(entity, Position::new(1.0, 2.0)).unwrap(), ComponentAction::Add);
    let signature = store.signature_of(entity).unwrap();
    let moves = store.stats().archetype_moves;

    assert_eq!(store.add_component(entity, Position::new(3.0, 4.0)).unwrap(), ComponentAction::Update);
    assert_eq!(store.remove_component::<Velocity>(entity).unwrap(), None);
    assert!(!store.remove_tag::<Disabled>(entity).unwrap());

    assert_eq!(store.signature_of(entity).unwrap(), signature);
    assert_eq!(store.stats().archetype_moves, moves);
    assert_eq!(*store.get_component::<Position>(entity).unwrap(), Position::new(3.0, 4.0));

    assert!(store.add_tag::<Disabled>(entity).unwrap());
    assert!(!store.add_tag::<Disabled>(entity).unwrap());
    assert!(store.has_tag::<Disabled>(entity).unwrap());
}

#[test]
fn set_component_requires_presence() {
    let mut store = store();
    let entity = store.create_entity().unwrap();
    assert!(matches!(
        store.set_component(entity, Position::new(0.0, 0.0)),
        Err(StoreError::MissingComponent { .. })
    ));

    store.add_component(entity, Position::new(1.0, 1.0)).unwrap();
    let old = store.set_component(entity, Position::new(5.0, 5.0)).unwrap();
    assert_eq!(old, Position::new(1.0, 1.0));
    assert_eq!(store.get_component::<Position>(entity).unwrap().x, 5.0);
}

#[test]
fn mutable_access_to_indexed_component_is_rejected() {
    let mut store = store();
    let entity = store.create_entity().unwrap();
    store.add_component(entity, Team(1)).unwrap();
    assert!(matches!(
        store.get_component_mut::<Team>(entity),
        Err(StoreError::IndexedComponentMutation { .. })
    ));

    store.add_component(entity, Position::new(0.0, 0.0)).unwrap();
    store.get_component_mut::<Position>(entity).unwrap().x = 9.0;
    assert_eq!(store.get_component::<Position>(entity).unwrap().x, 9.0);
}

#[test]
fn tag_sets_change_in_one_move() {
    let mut store = store();
    let entity = store.create_entity().unwrap();
    let moves = store.stats().archetype_moves;

    assert!(store.add_tags::<(Disabled, Frozen)>(entity).unwrap());
    assert_eq!(store.stats().archetype_moves, moves + 1);
    assert!(store.has_all_tags::<(Disabled, Frozen)>(entity).unwrap());

    assert!(store.remove_tags::<(Disabled, Frozen)>(entity).unwrap());
    assert!(!store.has_tag::<Frozen>(entity).unwrap());
    assert_eq!(store.stats().archetype_moves, moves + 2);
}

#[test]
fn structural_changes_fail_while_a_query_loop_is_open() {
    let mut store = store();
    let entity = store.create_entity().unwrap();
    store.add_component(entity, Position::new(0.0, 0.0)).unwrap();

    let guard = store.query_loop_guard();
    assert_eq!(store.active_query_loops(), 1);
    assert_eq!(store.create_entity(), Err(StoreError::QueryLoopActive { loops: 1 }));
    assert_eq!(
        store.add_component(entity, Velocity { dx: 0.0, dy: 0.0 }),
        Err(StoreError::QueryLoopActive { loops: 1 })
    );
    assert_eq!(store.delete_entity(entity), Err(StoreError::QueryLoopActive { loops: 1 }));

    // Value updates are not structural.
    assert_eq!(store.add_component(entity, Position::new(1.0, 0.0)).unwrap(), ComponentAction::Update);

    let nested = store.query_loop_guard();
    assert_eq!(store.active_query_loops(), 2);
    drop(nested);
    drop(guard);
    assert_eq!(store.active_query_loops(), 0);
    store.delete_entity(entity).unwrap();
}

#[test]
fn reserved_entities_materialize_on_next_structural_change() {
    let mut store = store();
    let existing = store.create_entity().unwrap();
    let reserved = store.reserve_entity();
    assert!(!store.is_alive(reserved));

    store.add_component(existing, Position::new(0.0, 0.0)).unwrap();
    assert!(store.is_alive(reserved));
    assert_eq!(store.signature_of(reserved).unwrap(), archestore::Signature::empty());
    assert_eq!(store.entity_count(), 2);
    assert_consistent(&store);
}

#[test]
fn bulk_creation_places_entities_in_final_archetype() {
    let mut store = store();
    let bundle = Bundle::new(store.schema())
        .with(Position::new(1.0, 2.0))
        .unwrap()
        .with(Team(4))
        .unwrap()
        .with_tag::<Marked>()
        .unwrap();

    let entities = store.create_entities(100, &bundle).unwrap();
    assert_eq!(entities.len(), 100);
    assert_eq!(store.stats().archetype_moves, 0);

    let archetype = store.entity_location(entities[0]).unwrap().archetype;
    assert!(entities.iter().all(|&e| store.entity_location(e).unwrap().archetype == archetype));
    assert!(store.has_tag::<Marked>(entities[50]).unwrap());
    assert_eq!(store.index::<Team>().unwrap().count_with(&4), 100);

    let column = store.archetype(archetype).unwrap().column::<Position>(0).unwrap();
    assert_eq!(column.len(), 100);
    assert!(column.iter().all(|p| *p == Position::new(1.0, 2.0)));
    assert_consistent(&store);
}

#[test]
fn bundle_from_foreign_schema_is_rejected() {
    let mut store = store();
    let other = schema();
    let bundle = Bundle::new(&other).with(Position::new(0.0, 0.0)).unwrap();
    assert_eq!(store.create_entities(1, &bundle), Err(StoreError::BundleTypeMismatch));
}

#[test]
fn direct_changes_fire_events() {
    let mut store = store();
    let log = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&log);
    store.on_component_changed(move |event| {
        let old = event.old::<Position>().map(|p| p.x);
        sink.lock().unwrap().push((event.component, event.action, old));
    });
    let created = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&created);
    store.on_entity_created(move |entity| sink.lock().unwrap().push(entity));

    let entity = store.create_entity().unwrap();
    store.add_component(entity, Position::new(1.0, 0.0)).unwrap();
    store.add_component(entity, Position::new(2.0, 0.0)).unwrap();
    store.remove_component::<Position>(entity).unwrap();

    assert_eq!(*created.lock().unwrap(), vec![entity]);
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            (0, ComponentAction::Add, None),
            (0, ComponentAction::Update, Some(1.0)),
            (0, ComponentAction::Remove, Some(2.0)),
        ]
    );
}

#[test]
fn unsubscribed_listener_is_silent() {
    let mut store = store();
    let count = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&count);
    let id = store.on_entity_deleted(move |_| *sink.lock().unwrap() += 1);

    let a = store.create_entity().unwrap();
    store.delete_entity(a).unwrap();
    assert!(store.unsubscribe(id));
    assert!(!store.unsubscribe(id));
    let b = store.create_entity().unwrap();
    store.delete_entity(b).unwrap();
    assert_eq!(*count.lock().unwrap(), 1);
}

#[derive(Clone, Debug, Default, PartialEq)]
struct Model {
    position: Option<Position>,
    velocity: Option<Velocity>,
    disabled: bool,
}

#[test]
fn randomized_operations_keep_rows_and_nodes_consistent() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut store = store();
    let mut model: HashMap<Entity, Model> = HashMap::new();
    let mut live: Vec<Entity> = Vec::new();

    for step in 0..4000 {
        let op = if live.is_empty() { 0 } else { rng.gen_range(0..8) };
        match op {
            0 | 1 => {
                let entity = store.create_entity().unwrap();
                model.insert(entity, Model::default());
                live.push(entity);
            }
            2 => {
                let entity = live.swap_remove(rng.gen_range(0..live.len()));
                store.delete_entity(entity).unwrap();
                model.remove(&entity);
                assert!(!store.is_alive(entity));
            }
            3 => {
                let entity = live[rng.gen_range(0..live.len())];
                let value = Position::new(step as f32, rng.gen());
                store.add_component(entity, value).unwrap();
                model.get_mut(&entity).unwrap().position = Some(value);
            }
            4 => {
                let entity = live[rng.gen_range(0..live.len())];
                let removed = store.remove_component::<Position>(entity).unwrap();
                assert_eq!(removed, model.get_mut(&entity).unwrap().position.take());
            }
            5 => {
                let entity = live[rng.gen_range(0..live.len())];
                let value = Velocity { dx: rng.gen(), dy: step as f32 };
                store.add_component(entity, value).unwrap();
                model.get_mut(&entity).unwrap().velocity = Some(value);
            }
            6 => {
                let entity = live[rng.gen_range(0..live.len())];
                let removed = store.remove_component::<Velocity>(entity).unwrap();
                assert_eq!(removed, model.get_mut(&entity).unwrap().velocity.take());
            }
            _ => {
                let entity = live[rng.gen_range(0..live.len())];
                let state = model.get_mut(&entity).unwrap();
                if state.disabled {
                    store.remove_tag::<Disabled>(entity).unwrap();
                } else {
                    store.add_tag::<Disabled>(entity).unwrap();
                }
                state.disabled = !state.disabled;
            }
        }

        if step % 100 == 0 {
            assert_consistent(&store);
        }
    }

    assert_consistent(&store);
    assert_eq!(store.entity_count(), model.len());
    for (&entity, state) in &model {
        assert_eq!(store.get_component::<Position>(entity).ok().copied(), state.position);
        assert_eq!(store.get_component::<Velocity>(entity).ok().copied(), state.velocity);
        assert_eq!(store.has_tag::<Disabled>(entity).unwrap(), state.disabled);
    }
}
