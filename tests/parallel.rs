use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;

use archestore::{ArchetypeID, Entity, JobRunner, Store, StoreConfig};

mod common;
use common::*;

/// Two archetypes of moving entities plus some static ones.
fn world(count: usize) -> (Store, Vec<Entity>) {
    let mut store = store();
    let entities = spawn_positions(&mut store, count);
    for (i, &entity) in entities.iter().enumerate() {
        if i % 5 != 0 {
            store.add_component(entity, Velocity { dx: i as f32, dy: 1.0 }).unwrap();
        }
        if i % 3 == 0 {
            store.add_tag::<Marked>(entity).unwrap();
        }
    }
    (store, entities)
}

fn positions(store: &Store, entities: &[Entity]) -> Vec<Position> {
    entities.iter().map(|&e| *store.get_component::<Position>(e).unwrap()).collect()
}

#[test]
fn parallel_matches_sequential_for_any_thread_count() {
    let (mut expected, entities) = world(3000);
    let mut query = expected.query::<(Position, Velocity)>().unwrap();
    let mut sequential_rows = 0;
    query
        .for_each_mut(&mut expected, |_, (position, velocity)| {
            position.x += velocity.dx * 0.5;
            position.y -= velocity.dy;
            sequential_rows += 1;
        })
        .unwrap();
    let expected = positions(&expected, &entities);

    for threads in 1..=8 {
        for min_parallel_len in [0, 16, 5000] {
            let (mut store, entities) = world(3000);
            let runner = JobRunner::with_threads(threads, min_parallel_len).unwrap();
            let rows = AtomicUsize::new(0);
            let mut query = store.query::<(Position, Velocity)>().unwrap();
            query
                .run_parallel(&mut store, &runner, |mut chunk| {
                    rows.fetch_add(chunk.len(), Ordering::Relaxed);
                    chunk.for_each(|_, (position, velocity)| {
                        position.x += velocity.dx * 0.5;
                        position.y -= velocity.dy;
                    });
                })
                .unwrap();
            assert_eq!(rows.load(Ordering::Relaxed), sequential_rows, "threads {threads}");
            assert_eq!(positions(&store, &entities), expected, "threads {threads}, min {min_parallel_len}");
            assert_eq!(store.active_query_loops(), 0);
            assert_consistent(&store);
        }
    }
}

#[test]
fn sub_ranges_are_aligned_and_disjoint() {
    let (mut store, _) = world(2000);
    let runner = JobRunner::with_threads(4, 8).unwrap();
    let mut query = store.query::<(Position, Velocity)>().unwrap();
    let multiple = query.component_multiple();
    assert_eq!(multiple, 4);

    let ranges: Mutex<Vec<(ArchetypeID, usize, usize)>> = Mutex::new(Vec::new());
    query
        .run_parallel(&mut store, &runner, |chunk| {
            ranges.lock().unwrap().push((chunk.archetype(), chunk.start(), chunk.len()));
        })
        .unwrap();

    let mut by_archetype: BTreeMap<ArchetypeID, Vec<(usize, usize)>> = BTreeMap::new();
    for (archetype, start, len) in ranges.into_inner().unwrap() {
        assert_eq!(start % multiple, 0, "sub-range starts off a multiple boundary");
        assert!(len > 0);
        by_archetype.entry(archetype).or_default().push((start, len));
    }
    for (archetype, mut ranges) in by_archetype {
        ranges.sort_unstable();
        let mut next = 0;
        for (start, len) in ranges {
            assert_eq!(start, next, "gap or overlap in archetype {archetype}");
            next = start + len;
        }
        assert_eq!(next, store.archetype(archetype).unwrap().len());
    }
}

#[test]
fn sub_range_length() {
    let runner = JobRunner::with_threads(4, 16).unwrap();
    assert_eq!(runner.sub_range_len(100, 4), 28);
    assert_eq!(runner.sub_range_len(1000, 4), 252);
    assert_eq!(runner.sub_range_len(1000, 1), 250);
    // Never at or below the minimum.
    assert_eq!(runner.sub_range_len(20, 1), 17);
    assert_eq!(runner.sub_range_len(20, 8), 24);

    let runner = JobRunner::with_threads(3, 0).unwrap();
    assert_eq!(runner.sub_range_len(10, 4), 4);
    assert_eq!(runner.sub_range_len(10, 0), 4);
}

#[test]
fn sub_range_length_saturates_for_huge_minimums() {
    let runner = JobRunner::with_threads(4, usize::MAX - 1).unwrap();
    assert_eq!(runner.sub_range_len(100, 4), usize::MAX);
    assert_eq!(runner.sub_range_len(100, 1), usize::MAX);

    let runner = JobRunner::with_threads(4, usize::MAX).unwrap();
    assert_eq!(runner.sub_range_len(100, 8), usize::MAX);
}

#[test]
fn small_work_runs_on_the_calling_thread() {
    let (mut store, _) = world(40);
    let runner = JobRunner::with_threads(4, 1000).unwrap();
    let caller = thread::current().id();
    let threads = Mutex::new(Vec::new());
    let mut query = store.query::<(Position,)>().unwrap();
    query
        .run_parallel(&mut store, &runner, |_| threads.lock().unwrap().push(thread::current().id()))
        .unwrap();
    let threads = threads.into_inner().unwrap();
    assert!(!threads.is_empty());
    assert!(threads.iter().all(|&id| id == caller));
}

#[test]
fn large_work_reaches_worker_threads() {
    let (mut store, _) = world(4000);
    let runner = JobRunner::with_threads(4, 0).unwrap();
    let caller = thread::current().id();
    let remote = AtomicUsize::new(0);
    let mut query = store.query::<(Position,)>().unwrap();
    query
        .run_parallel(&mut store, &runner, |chunk| {
            if thread::current().id() != caller {
                remote.fetch_add(chunk.len(), Ordering::Relaxed);
            }
        })
        .unwrap();
    assert!(remote.load(Ordering::Relaxed) > 0);
}

#[test]
fn parallel_run_with_value_predicate() {
    let (mut store, entities) = world(300);
    for (i, &entity) in entities.iter().enumerate() {
        store.add_component(entity, Level(i as i32)).unwrap();
    }
    let runner = JobRunner::with_threads(4, 0).unwrap();
    let mut query = store.query::<(Position,)>().unwrap().with_value_range::<Level>(100, 199).unwrap();
    let rows = AtomicUsize::new(0);
    query
        .run_parallel(&mut store, &runner, |mut chunk| {
            assert_eq!(chunk.len(), 1);
            rows.fetch_add(1, Ordering::Relaxed);
            chunk.for_each(|_, (position,)| position.y = -1.0);
        })
        .unwrap();
    assert_eq!(rows.into_inner(), 100);
    for (i, &entity) in entities.iter().enumerate() {
        let y = store.get_component::<Position>(entity).unwrap().y;
        assert_eq!(y == -1.0, (100..200).contains(&i), "entity {i}");
    }
}

#[test]
fn runner_from_config() {
    let config = StoreConfig { worker_threads: 3, min_parallel_chunk_len: 64, ..StoreConfig::default() };
    let runner = JobRunner::new(&config).unwrap();
    assert_eq!(runner.threads(), 3);
    assert_eq!(runner.min_parallel_len(), 64);

    let runner = JobRunner::new(&StoreConfig::default()).unwrap();
    assert!(runner.threads() >= 1);

    assert_eq!(JobRunner::with_threads(0, 0).unwrap().threads(), 1);
}
