use planar_accelerator::*;
use std::sync::{Arc, Mutex};

const DT: f32 = 1.0 / 60.0;

fn world_with_ground() -> World {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    let ground = world.create_body(&BodyDef::fixed()).expect("ground");
    world
        .create_fixture(ground, &Shape::rect(20.0, 0.5, 1.0).expect("ground shape").into())
        .expect("ground fixture");
    world
}

fn compound(world: &mut World, speed: f32) -> BodyHandle {
    let body = world
        .create_body(
            &BodyDef::dynamic()
                .position(Vec2::new(0.0, 3.0))
                .linear_velocity(Vec2::new(0.0, -speed)),
        )
        .expect("compound body");
    for x in [-0.5, 0.5] {
        world
            .create_fixture(
                body,
                &Shape::oriented_box(0.5, 0.25, Vec2::new(x, 0.0), 0.0, 1.0)
                    .expect("half shape")
                    .into(),
            )
            .expect("half fixture");
    }
    body
}

#[test]
fn hard_impact_splits_body_into_parts() {
    let mut world = world_with_ground();
    let body = compound(&mut world, 20.0);
    world.set_body_strength(body, Some(1.0)).expect("strength");

    let events: Arc<Mutex<Vec<(BodyHandle, Vec<BodyHandle>)>>> = Arc::default();
    {
        let events = Arc::clone(&events);
        world.on_body_broken(move |broken, parts, _| {
            events
                .lock()
                .expect("event lock")
                .push((broken, parts.to_vec()));
        });
    }

    for _ in 0..60 {
        world.step(DT, 8, 3);
    }

    let events = events.lock().expect("event lock");
    assert_eq!(events.len(), 1, "body should break exactly once");
    let (broken, parts) = &events[0];
    assert_eq!(*broken, body);
    assert_eq!(parts.len(), 2);
    assert!(world.body(body).is_none());
    assert_eq!(world.body_count(), 3);
    for &part in parts {
        let part = world.body(part).expect("fragment");
        assert_eq!(part.fixtures().len(), 1);
        assert!((part.mass() - 0.5).abs() < 1e-4, "fragment mass {}", part.mass());
        assert!(part.position().y > 0.0, "fragments rest on the ground");
    }
    assert_eq!(world.body_strength(body), None);
}

#[test]
fn strong_bodies_survive_impact() {
    let mut world = world_with_ground();
    let body = compound(&mut world, 20.0);
    world.set_body_strength(body, Some(1.0e6)).expect("strength");

    for _ in 0..60 {
        world.step(DT, 8, 3);
    }
    assert!(world.body(body).is_some());
    assert_eq!(world.body_count(), 2);
    assert_eq!(world.body_strength(body), Some(1.0e6));
}

#[test]
fn unbreakable_bodies_are_untouched() {
    let mut world = world_with_ground();
    let body = compound(&mut world, 20.0);
    world.set_body_strength(body, Some(1.0)).expect("strength");
    world.set_body_strength(body, None).expect("clear strength");

    for _ in 0..60 {
        world.step(DT, 8, 3);
    }
    assert_eq!(world.body(body).expect("body").fixtures().len(), 2);
}

#[test]
fn invalid_strength_is_rejected() {
    let mut world = world_with_ground();
    let body = compound(&mut world, 0.0);
    assert!(world.set_body_strength(body, Some(0.0)).is_err());
    assert!(world.set_body_strength(body, Some(f32::NAN)).is_err());
    world.destroy_body(body).expect("destroy");
    assert!(world.set_body_strength(body, Some(1.0)).is_err());
}
