use std::hint::black_box;

use archestore::CommandBuffer;
use criterion::*;

mod common;
use common::*;

fn playback_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("playback");

    group.bench_function("tag_and_remove_100k", |b| {
        b.iter_batched(
            || {
                let store = setup_world(AGENTS_MED).expect("world");
                let mut commands = CommandBuffer::new(&store);
                for entity in store.entities() {
                    commands.add_tag::<Idle>(entity).expect("queue tag");
                    commands.remove_component::<Productivity>(entity).expect("queue remove");
                    commands.add_component(entity, Wealth { value: 0.0 }).expect("queue add");
                }
                (store, commands)
            },
            |(mut store, mut commands)| {
                let stats = commands.playback(&mut store).expect("playback");
                black_box((store, stats));
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("create_via_buffer_100k", |b| {
        b.iter_batched(
            || {
                let store = setup_world(0).expect("world");
                let mut commands = CommandBuffer::new(&store);
                for _ in 0..AGENTS_MED {
                    let entity = commands.create_entity(&store).expect("reserve");
                    commands.add_component(entity, Position { x: 0.0, y: 0.0 }).expect("queue add");
                }
                (store, commands)
            },
            |(mut store, mut commands)| {
                commands.playback(&mut store).expect("playback");
                black_box(store);
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, playback_benchmark);
criterion_main!(benches);
