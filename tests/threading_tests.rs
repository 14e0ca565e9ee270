use planar_accelerator::*;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const DT: f32 = 1.0 / 60.0;

fn falling_world() -> (World, BodyHandle) {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    let body = world
        .create_body(&BodyDef::dynamic().position(Vec2::new(0.0, 100.0)))
        .expect("body");
    world
        .create_fixture(body, &Shape::circle(Vec2::ZERO, 0.5, 1.0).expect("shape").into())
        .expect("fixture");
    (world, body)
}

#[test]
fn world_is_sync_and_send() {
    fn assert_sync_send<T: Sync + Send>() {}
    assert_sync_send::<World>();
    assert_sync_send::<SharedWorld>();
    assert_sync_send::<PhysicsEngine>();
}

#[test]
fn world_can_be_stepped_from_several_threads() {
    let (world, body) = falling_world();
    let world = Arc::new(Mutex::new(world));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let world = Arc::clone(&world);
            thread::spawn(move || {
                world.lock().expect("world lock poisoned").step(DT, 8, 3);
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("stepping thread panicked");
    }

    let world = world.lock().expect("world lock poisoned");
    assert_eq!(world.profile().body_count, 1);
    assert!(world.body(body).unwrap().position().y < 100.0);
}

#[test]
fn readers_see_monotonic_frames() {
    let (world, body) = falling_world();
    let shared = Arc::new(SharedWorld::new(world));

    let reader = {
        let shared = Arc::clone(&shared);
        thread::spawn(move || {
            let mut last_frame = 0;
            let mut last_y = f32::MAX;
            while last_frame < 10 {
                let Some(frame) = shared.wait_for_frame_timeout(last_frame, Duration::from_secs(5)) else {
                    panic!("simulation stalled after frame {}", last_frame);
                };
                assert!(frame > last_frame);
                let y = shared.read().body(body).expect("body").position().y;
                assert!(y <= last_y, "body rose from {} to {}", last_y, y);
                last_frame = frame;
                last_y = y;
            }
            last_frame
        })
    };

    for expected in 1..=10 {
        assert_eq!(shared.step(DT, 8, 3), expected);
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(reader.join().expect("reader panicked"), 10);
}

#[test]
fn writers_queue_behind_the_step() {
    let (world, body) = falling_world();
    let shared = Arc::new(SharedWorld::new(world));

    let writer = {
        let shared = Arc::clone(&shared);
        thread::spawn(move || {
            shared.wait_for_frame(0);
            shared
                .write()
                .body_mut(body)
                .expect("body")
                .set_linear_velocity(Vec2::new(1.0, 0.0));
        })
    };

    shared.step(DT, 8, 3);
    writer.join().expect("writer panicked");
    shared.step(DT, 8, 3);

    let world = Arc::try_unwrap(shared)
        .expect("no other owners remain")
        .into_inner();
    assert!(world.body(body).unwrap().position().x > 0.0);
}
