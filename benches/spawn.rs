use std::hint::black_box;

use archestore::{Bundle, Store};
use criterion::*;

mod common;
use common::*;

fn spawn_benchmark(c: &mut Criterion) {
    let schema = common::schema();
    let mut group = c.benchmark_group("spawn");

    group.bench_function("create_entities_100k", |b| {
        b.iter(|| {
            let mut store = Store::new(schema.clone());
            let bundle = Bundle::new(store.schema())
                .with(Position { x: 0.0, y: 0.0 })
                .expect("bundle")
                .with(Wealth { value: 100.0 })
                .expect("bundle");
            store.create_entities(AGENTS_MED, &bundle).expect("bulk create");
            black_box(store);
        });
    });

    group.bench_function("create_then_add_100k", |b| {
        b.iter(|| {
            let mut store = Store::new(schema.clone());
            for _ in 0..AGENTS_MED {
                let entity = store.create_entity().expect("create");
                store.add_component(entity, Position { x: 0.0, y: 0.0 }).expect("add Position");
                store.add_component(entity, Wealth { value: 100.0 }).expect("add Wealth");
            }
            black_box(store);
        });
    });

    group.bench_function("recycle_10k", |b| {
        b.iter_batched(
            || setup_world(AGENTS_SMALL).expect("world"),
            |mut store| {
                let entities: Vec<_> = store.entities().collect();
                for entity in entities {
                    store.delete_entity(entity).expect("delete");
                }
                for _ in 0..AGENTS_SMALL {
                    store.create_entity().expect("create");
                }
                black_box(store);
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, spawn_benchmark);
criterion_main!(benches);
