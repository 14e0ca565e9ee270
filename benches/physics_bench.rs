use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use planar_accelerator::{collision::narrowphase, *};
use std::hint::black_box;

const DT: f32 = 1.0 / 60.0;

/// Ground plus `columns` independent stacks of ten boxes, one island each.
fn prepare_world(columns: usize) -> World {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    let ground = world.create_body(&BodyDef::fixed()).expect("ground");
    let width = columns as f32 * 2.0 + 2.0;
    world
        .create_fixture(ground, &Shape::rect(width, 0.5, 1.0).expect("ground shape").into())
        .expect("ground fixture");
    for column in 0..columns {
        for row in 0..10 {
            let body = world
                .create_body(&BodyDef::dynamic().position(Vec2::new(
                    column as f32 * 2.0 - width * 0.5,
                    1.0 + row as f32 * 1.01,
                )))
                .expect("box");
            world
                .create_fixture(body, &Shape::rect(0.5, 0.5, 1.0).expect("box shape").into())
                .expect("box fixture");
        }
    }
    world
}

fn prepare_pyramid(base: usize) -> World {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    let ground = world.create_body(&BodyDef::fixed()).expect("ground");
    world
        .create_fixture(ground, &Shape::rect(40.0, 0.5, 1.0).expect("ground shape").into())
        .expect("ground fixture");
    for row in 0..base {
        let count = base - row;
        let start = -(count as f32) * 0.5;
        for i in 0..count {
            let body = world
                .create_body(&BodyDef::dynamic().position(Vec2::new(
                    start + i as f32 * 1.02,
                    1.0 + row as f32 * 1.01,
                )))
                .expect("box");
            world
                .create_fixture(body, &Shape::rect(0.5, 0.5, 1.0).expect("box shape").into())
                .expect("box fixture");
        }
    }
    world
}

fn bench_world_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("world_step");
    for &columns in &[8usize, 32, 128] {
        group.bench_with_input(BenchmarkId::new("sequential", columns), &columns, |b, &columns| {
            let mut world = prepare_world(columns);
            world.set_parallel_enabled(false);
            b.iter(|| world.step(black_box(DT), 8, 3))
        });
        group.bench_with_input(BenchmarkId::new("parallel", columns), &columns, |b, &columns| {
            let mut world = prepare_world(columns);
            world.set_parallel_enabled(true);
            b.iter(|| world.step(black_box(DT), 8, 3))
        });
    }
    group.finish();
}

fn bench_pyramid(c: &mut Criterion) {
    let mut group = c.benchmark_group("pyramid");
    group.sample_size(20);
    for &base in &[10usize, 20] {
        group.bench_with_input(BenchmarkId::new("settle_60_steps", base), &base, |b, &base| {
            b.iter(|| {
                let mut world = prepare_pyramid(base);
                for _ in 0..60 {
                    world.step(DT, 8, 3);
                }
                black_box(world.profile().contact_count)
            })
        });
    }
    group.finish();
}

fn bench_broad_phase(c: &mut Criterion) {
    let mut group = c.benchmark_group("broad_phase");
    for &count in &[256usize, 1024, 4096] {
        group.bench_with_input(BenchmarkId::new("move_and_pair", count), &count, |b, &count| {
            let side = (count as f32).sqrt().ceil() as usize;
            let mut broad_phase = BroadPhase::<usize>::new();
            let proxies: Vec<usize> = (0..count)
                .map(|i| {
                    let center = Vec2::new((i % side) as f32 * 0.9, (i / side) as f32 * 0.9);
                    broad_phase.create_proxy(
                        &Aabb::new(center - Vec2::splat(0.5), center + Vec2::splat(0.5)),
                        i,
                    )
                })
                .collect();
            let mut offset = 0.0_f32;
            b.iter(|| {
                offset = -offset + 0.3;
                for (i, &proxy) in proxies.iter().enumerate() {
                    let center =
                        Vec2::new((i % side) as f32 * 0.9 + offset, (i / side) as f32 * 0.9);
                    broad_phase.move_proxy(
                        proxy,
                        &Aabb::new(center - Vec2::splat(0.5), center + Vec2::splat(0.5)),
                        Vec2::new(offset, 0.0),
                    );
                }
                let mut pairs = 0usize;
                broad_phase.update_pairs(|_| pairs += 1);
                black_box(pairs)
            })
        });
    }
    group.finish();
}

fn bench_narrow_phase(c: &mut Criterion) {
    let mut group = c.benchmark_group("narrow_phase");
    let square = Shape::rect(0.5, 0.5, 1.0).expect("square");
    let disc = Shape::circle(Vec2::ZERO, 0.5, 1.0).expect("disc");
    let transforms: Vec<(Transform, Transform)> = (0..1000)
        .map(|i| {
            let angle = i as f32 * 0.01;
            (
                Transform::new(Vec2::ZERO, 0.0),
                Transform::new(Vec2::new(0.8, 0.1), angle),
            )
        })
        .collect();

    group.bench_function("polygons", |b| {
        b.iter(|| {
            for (xf_a, xf_b) in &transforms {
                black_box(narrowphase::collide(&square, 0, xf_a, &square, 0, xf_b));
            }
        })
    });
    group.bench_function("polygon_circle", |b| {
        b.iter(|| {
            for (xf_a, xf_b) in &transforms {
                black_box(narrowphase::collide(&square, 0, xf_a, &disc, 0, xf_b));
            }
        })
    });
    group.finish();
}

fn bench_ray_cast(c: &mut Criterion) {
    let mut group = c.benchmark_group("ray_cast");
    let world = prepare_world(32);
    group.bench_function("closest", |b| {
        b.iter(|| {
            black_box(world.ray_cast_closest(
                black_box(Vec2::new(-80.0, 5.0)),
                black_box(Vec2::new(80.0, 5.0)),
            ))
        })
    });
    group.bench_function("all", |b| {
        b.iter(|| {
            black_box(world.ray_cast_all(
                black_box(Vec2::new(-80.0, 5.0)),
                black_box(Vec2::new(80.0, 5.0)),
            ))
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_world_step,
    bench_pyramid,
    bench_broad_phase,
    bench_narrow_phase,
    bench_ray_cast
);
criterion_main!(benches);
