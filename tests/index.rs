use std::collections::HashMap;

use archestore::{Bundle, CommandBuffer, Entity, StoreError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

mod common;
use common::*;

fn with_team(store: &archestore::Store, team: u32) -> Vec<Entity> {
    let mut entities: Vec<Entity> = store.index::<Team>().unwrap().entities_with(&team).collect();
    entities.sort();
    entities
}

#[test]
fn index_follows_direct_changes() {
    let mut store = store();
    let entities = spawn_positions(&mut store, 4);

    for &entity in &entities {
        store.add_component(entity, Team(1)).unwrap();
    }
    assert_eq!(with_team(&store, 1), entities);

    // Re-adding replaces the indexed value.
    store.add_component(entities[0], Team(2)).unwrap();
    store.set_component(entities[1], Team(2)).unwrap();
    assert_eq!(with_team(&store, 1), entities[2..].to_vec());
    assert_eq!(with_team(&store, 2), entities[..2].to_vec());

    assert_eq!(store.remove_component::<Team>(entities[2]).unwrap(), Some(Team(1)));
    store.delete_entity(entities[3]).unwrap();
    assert!(with_team(&store, 1).is_empty());

    let index = store.index::<Team>().unwrap();
    assert_eq!(index.distinct_values().copied().collect::<Vec<_>>(), vec![2]);
    assert_eq!(index.values().len(), 2);
}

#[test]
fn index_follows_bundles_and_playback() {
    let mut store = store();
    let bundle = Bundle::new(store.schema()).with(Team(5)).unwrap().with(Position::new(0.0, 0.0)).unwrap();
    let spawned = store.create_entities(3, &bundle).unwrap();
    let single = store.create_entity_with(&bundle).unwrap();
    assert_eq!(store.index::<Team>().unwrap().count_with(&5), 4);

    let mut commands = CommandBuffer::new(&store);
    commands.add_component(spawned[0], Team(6)).unwrap();
    commands.remove_component::<Team>(spawned[1]).unwrap();
    commands.delete_entity(single).unwrap();
    let created = commands.create_entity(&store).unwrap();
    commands.add_component(created, Team(6)).unwrap();
    commands.playback(&mut store).unwrap();

    assert_eq!(with_team(&store, 5), vec![spawned[2]]);
    assert_eq!(with_team(&store, 6), {
        let mut expected = vec![spawned[0], created];
        expected.sort();
        expected
    });
}

#[test]
fn value_range_lookup() {
    let mut store = store();
    let entities = spawn_positions(&mut store, 10);
    for (i, &entity) in entities.iter().enumerate() {
        store.add_component(entity, Level(i as i32 - 5)).unwrap();
    }
    let index = store.index::<Level>().unwrap();
    assert_eq!(index.entities_in_range(&-1, &1), entities[4..=6].to_vec());
    assert_eq!(index.entities_in_range(&10, &20), Vec::<Entity>::new());
    assert!(index.entities_in_range(&1, &-1).is_empty());

    let mut distinct: Vec<i32> = index.distinct_values().copied().collect();
    distinct.sort_unstable();
    assert_eq!(distinct, (-5..5).collect::<Vec<_>>());
}

#[test]
fn plain_components_have_no_index() {
    let store = store();
    assert!(matches!(store.index::<Score>(), Err(StoreError::NotIndexed { .. })));
}

#[test]
fn deleting_a_link_target_strips_incoming_links() {
    let mut store = store();
    let parent = store.create_entity().unwrap();
    let other = store.create_entity().unwrap();
    let children = spawn_positions(&mut store, 3);
    for &child in &children {
        store.add_component(child, Parent(parent)).unwrap();
    }
    store.add_component(other, Parent(children[0])).unwrap();

    assert_eq!(store.incoming_links::<Parent>(parent).unwrap(), children);
    assert_eq!(store.incoming_links::<Parent>(children[0]).unwrap(), vec![other]);

    store.delete_entity(parent).unwrap();
    for &child in &children {
        assert!(store.is_alive(child));
        assert!(!store.has_component::<Parent>(child).unwrap());
        assert!(store.has_component::<Position>(child).unwrap());
    }
    assert!(store.incoming_links::<Parent>(parent).unwrap().is_empty());
    assert_eq!(store.link_index::<Parent>().unwrap().targets().collect::<Vec<_>>(), vec![children[0]]);
    assert_consistent(&store);
}

#[test]
fn retargeting_a_link_moves_its_index_entry() {
    let mut store = store();
    let a = store.create_entity().unwrap();
    let b = store.create_entity().unwrap();
    let child = store.create_entity().unwrap();
    store.add_component(child, Parent(a)).unwrap();
    store.set_component(child, Parent(b)).unwrap();

    assert!(store.incoming_links::<Parent>(a).unwrap().is_empty());
    assert_eq!(store.incoming_links::<Parent>(b).unwrap(), vec![child]);

    // The old target no longer cascades.
    store.delete_entity(a).unwrap();
    assert_eq!(store.get_component::<Parent>(child).unwrap().0, b);
}

#[test]
fn self_link_is_dropped_with_its_entity() {
    let mut store = store();
    let entity = store.create_entity().unwrap();
    store.add_component(entity, Parent(entity)).unwrap();
    store.delete_entity(entity).unwrap();
    assert!(store.link_index::<Parent>().unwrap().values().is_empty());
    assert_consistent(&store);
}

#[test]
fn link_to_a_reserved_entity_cascades_once_materialized() {
    let mut store = store();
    let anchor = store.create_entity().unwrap();
    let source = store.create_entity().unwrap();
    store.add_component(source, Parent(anchor)).unwrap();

    let mut commands = CommandBuffer::new(&store);
    let reserved = commands.create_entity(&store).unwrap();
    store.set_component(source, Parent(reserved)).unwrap();
    commands.playback(&mut store).unwrap();
    assert!(store.incoming_links::<Parent>(anchor).unwrap().is_empty());
    assert_eq!(store.incoming_links::<Parent>(reserved).unwrap(), vec![source]);

    store.delete_entity(reserved).unwrap();
    assert!(!store.has_component::<Parent>(source).unwrap());
    assert!(store.incoming_links::<Parent>(reserved).unwrap().is_empty());
    assert!(store.link_index::<Parent>().unwrap().values().is_empty());
    assert_consistent(&store);
}

#[test]
fn link_to_a_dead_target_is_rejected() {
    let mut store = store();
    let live = store.create_entity().unwrap();
    let source = store.create_entity().unwrap();
    let dead = store.create_entity().unwrap();
    store.delete_entity(dead).unwrap();
    let not_found = |result: Result<_, StoreError>| matches!(result, Err(StoreError::EntityNotFound { entity }) if entity == dead);

    assert!(not_found(store.add_component(source, Parent(dead)).map(|_| ())));
    assert!(!store.has_component::<Parent>(source).unwrap());

    store.add_component(source, Parent(live)).unwrap();
    assert!(not_found(store.set_component(source, Parent(dead)).map(|_| ())));
    assert!(not_found(store.add_component(source, Parent(dead)).map(|_| ())));
    assert_eq!(store.get_component::<Parent>(source).unwrap().0, live);

    let bundle = Bundle::new(store.schema()).with(Parent(dead)).unwrap();
    let count = store.entity_count();
    assert!(not_found(store.create_entities(2, &bundle).map(|_| ())));
    assert_eq!(store.entity_count(), count);

    let mut commands = CommandBuffer::new(&store);
    commands.add_component(source, Parent(dead)).unwrap();
    assert!(not_found(commands.playback(&mut store).map(|_| ())));
    assert_eq!(store.get_component::<Parent>(source).unwrap().0, live);
    assert!(store.incoming_links::<Parent>(dead).unwrap().is_empty());
    assert_eq!(store.incoming_links::<Parent>(live).unwrap(), vec![source]);
}

#[test]
fn link_to_an_entity_deleted_in_the_same_buffer_is_rejected() {
    let mut store = store();
    let target = store.create_entity().unwrap();
    let source = store.create_entity().unwrap();

    let mut commands = CommandBuffer::new(&store);
    commands.delete_entity(target).unwrap();
    commands.add_component(source, Parent(target)).unwrap();
    assert!(matches!(
        commands.playback(&mut store),
        Err(StoreError::EntityNotFound { entity }) if entity == target
    ));
    assert!(store.is_alive(target));
    assert!(!store.has_component::<Parent>(source).unwrap());
}

#[derive(Clone, Copy, Debug, Default)]
struct Indexed {
    team: Option<u32>,
    parent: Option<Entity>,
}

fn delete_from_model(model: &mut HashMap<Entity, Indexed>, entity: Entity) {
    model.remove(&entity);
    for state in model.values_mut() {
        if state.parent == Some(entity) {
            state.parent = None;
        }
    }
}

#[test]
fn randomized_writes_keep_indexes_exact() {
    let mut rng = StdRng::seed_from_u64(0x1dea);
    let mut store = store();
    let mut model: HashMap<Entity, Indexed> = HashMap::new();
    let mut live: Vec<Entity> = Vec::new();

    for step in 0..3000 {
        let op = if live.len() < 2 { 0 } else { rng.gen_range(0..8) };
        match op {
            0 => {
                let entity = store.create_entity().unwrap();
                model.insert(entity, Indexed::default());
                live.push(entity);
            }
            1 => {
                let entity = live.swap_remove(rng.gen_range(0..live.len()));
                store.delete_entity(entity).unwrap();
                delete_from_model(&mut model, entity);
            }
            2 => {
                let entity = live[rng.gen_range(0..live.len())];
                let team = rng.gen_range(0..4);
                store.add_component(entity, Team(team)).unwrap();
                model.get_mut(&entity).unwrap().team = Some(team);
            }
            3 => {
                let entity = live[rng.gen_range(0..live.len())];
                let removed = store.remove_component::<Team>(entity).unwrap().map(|team| team.0);
                assert_eq!(removed, model.get_mut(&entity).unwrap().team.take());
            }
            4 => {
                let entity = live[rng.gen_range(0..live.len())];
                let target = live[rng.gen_range(0..live.len())];
                let state = model.get_mut(&entity).unwrap();
                if state.parent.is_some() {
                    store.set_component(entity, Parent(target)).unwrap();
                } else {
                    store.add_component(entity, Parent(target)).unwrap();
                }
                state.parent = Some(target);
            }
            5 => {
                let entity = live[rng.gen_range(0..live.len())];
                let removed = store.remove_component::<Parent>(entity).unwrap().map(|parent| parent.0);
                assert_eq!(removed, model.get_mut(&entity).unwrap().parent.take());
            }
            _ => {
                let mut commands = CommandBuffer::new(&store);
                for _ in 0..rng.gen_range(1..6) {
                    let entity = live[rng.gen_range(0..live.len())];
                    let state = model.get_mut(&entity).unwrap();
                    match rng.gen_range(0..4) {
                        0 => {
                            let team = rng.gen_range(0..4);
                            commands.add_component(entity, Team(team)).unwrap();
                            state.team = Some(team);
                        }
                        1 => {
                            commands.remove_component::<Team>(entity).unwrap();
                            state.team = None;
                        }
                        2 => {
                            let target = live[rng.gen_range(0..live.len())];
                            commands.add_component(entity, Parent(target)).unwrap();
                            state.parent = Some(target);
                        }
                        _ => {
                            commands.remove_component::<Parent>(entity).unwrap();
                            state.parent = None;
                        }
                    }
                }
                if rng.gen_bool(0.3) {
                    let created = commands.create_entity(&store).unwrap();
                    let team = rng.gen_range(0..4);
                    commands.add_component(created, Team(team)).unwrap();
                    model.insert(created, Indexed { team: Some(team), parent: None });
                    live.push(created);
                }
                commands.playback(&mut store).unwrap();
            }
        }

        if step % 50 == 0 || step == 2999 {
            for team in 0..4 {
                let mut expected: Vec<Entity> =
                    model.iter().filter(|(_, state)| state.team == Some(team)).map(|(&e, _)| e).collect();
                expected.sort();
                assert_eq!(with_team(&store, team), expected, "team {team} at step {step}");
            }
            for &target in &live {
                let mut expected: Vec<Entity> =
                    model.iter().filter(|(_, state)| state.parent == Some(target)).map(|(&e, _)| e).collect();
                expected.sort();
                assert_eq!(store.incoming_links::<Parent>(target).unwrap(), expected, "links to {target} at step {step}");
            }
            assert_consistent(&store);
        }
    }
}
