use planar_accelerator::*;

const DT: f32 = 1.0 / 60.0;

fn world_with_ground() -> (World, BodyHandle) {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    let ground = world.create_body(&BodyDef::fixed()).expect("ground body");
    world
        .create_fixture(ground, &Shape::rect(20.0, 0.5, 1.0).expect("ground shape").into())
        .expect("ground fixture");
    (world, ground)
}

fn add_box(world: &mut World, position: Vec2) -> BodyHandle {
    let body = world
        .create_body(&BodyDef::dynamic().position(position))
        .expect("box body");
    world
        .create_fixture(body, &Shape::rect(0.5, 0.5, 1.0).expect("box shape").into())
        .expect("box fixture");
    body
}

#[test]
fn bodies_fall_under_gravity() {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    let body = add_box(&mut world, Vec2::new(0.0, 10.0));

    world.step(DT, 8, 3);

    let position_y = world.body(body).expect("body should exist").position().y;
    assert!(position_y < 10.0, "body should start falling, y = {}", position_y);
}

#[test]
fn box_stack_settles_and_sleeps() {
    let (mut world, _) = world_with_ground();
    let boxes: Vec<BodyHandle> = (0..5)
        .map(|i| add_box(&mut world, Vec2::new(0.0, 1.0 + i as f32)))
        .collect();

    for _ in 0..300 {
        world.step(DT, 8, 3);
    }

    for (i, &handle) in boxes.iter().enumerate() {
        let body = world.body(handle).expect("box");
        assert!(!body.is_awake(), "box {} should be asleep", i);
        let expected = 1.0 + i as f32;
        assert!(
            (body.position().y - expected).abs() < 0.15,
            "box {} drifted to {}",
            i,
            body.position().y
        );
        assert!(body.position().x.abs() < 0.05, "box {} slid to x = {}", i, body.position().x);
    }
}

#[test]
fn sleeping_bodies_wake_when_pushed() {
    let (mut world, _) = world_with_ground();
    let body = add_box(&mut world, Vec2::new(0.0, 1.0));
    for _ in 0..120 {
        world.step(DT, 8, 3);
    }
    assert!(!world.body(body).unwrap().is_awake());

    let resting_x = world.body(body).unwrap().position().x;
    world
        .body_mut(body)
        .unwrap()
        .apply_linear_impulse_to_center(Vec2::new(3.0, 0.0), true);
    for _ in 0..10 {
        world.step(DT, 8, 3);
    }
    let body = world.body(body).unwrap();
    assert!(body.is_awake());
    assert!(body.position().x > resting_x + 0.1);
}

#[test]
fn zero_time_step_leaves_resting_scene_unchanged() {
    let (mut world, _) = world_with_ground();
    let body = add_box(&mut world, Vec2::new(0.0, 1.0));
    for _ in 0..30 {
        world.step(DT, 8, 3);
    }
    let (position, angle, linear, angular) = {
        let body = world.body(body).unwrap();
        (body.position(), body.angle(), body.linear_velocity(), body.angular_velocity())
    };

    for _ in 0..10 {
        world.step(0.0, 8, 3);
    }

    let body = world.body(body).unwrap();
    assert_eq!(body.position(), position);
    assert_eq!(body.angle(), angle);
    assert_eq!(body.linear_velocity(), linear);
    assert_eq!(body.angular_velocity(), angular);
    assert_eq!(world.contact_count(), 1);
}

#[test]
fn elastic_ball_bounces_back_up() {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    let ground = world.create_body(&BodyDef::fixed()).unwrap();
    world
        .create_fixture(
            ground,
            &FixtureDef::new(Shape::rect(20.0, 0.5, 1.0).unwrap()).restitution(1.0),
        )
        .unwrap();
    let ball = world
        .create_body(&BodyDef::dynamic().position(Vec2::new(0.0, 5.0)))
        .unwrap();
    world
        .create_fixture(
            ball,
            &FixtureDef::new(Shape::circle(Vec2::ZERO, 0.5, 1.0).unwrap()).restitution(1.0),
        )
        .unwrap();

    let mut bounced = false;
    let mut apex: f32 = 0.0;
    for _ in 0..180 {
        world.step(DT, 8, 3);
        let body = world.body(ball).unwrap();
        if body.linear_velocity().y > 0.0 {
            bounced = true;
        }
        if bounced {
            apex = apex.max(body.position().y);
        }
    }
    assert!(bounced, "ball never bounced");
    assert!(apex > 3.5, "ball only rebounded to {}", apex);
}

#[test]
fn disabled_bodies_are_ignored() {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    let body = world
        .create_body(&BodyDef::dynamic().position(Vec2::new(0.0, 3.0)).enabled(false))
        .unwrap();
    world
        .create_fixture(body, &Shape::circle(Vec2::ZERO, 0.5, 1.0).unwrap().into())
        .unwrap();
    assert_eq!(world.broad_phase().proxy_count(), 0);

    for _ in 0..30 {
        world.step(DT, 8, 3);
    }
    assert_eq!(world.body(body).unwrap().position(), Vec2::new(0.0, 3.0));

    world.set_body_enabled(body, true).unwrap();
    assert_eq!(world.broad_phase().proxy_count(), 1);
    world.step(DT, 8, 3);
    assert!(world.body(body).unwrap().position().y < 3.0);
}

#[test]
fn changing_body_type_resets_mass_and_motion() {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    let body = world
        .create_body(&BodyDef::fixed().position(Vec2::new(0.0, 2.0)))
        .unwrap();
    world
        .create_fixture(body, &Shape::rect(0.5, 0.5, 2.0).unwrap().into())
        .unwrap();
    assert_eq!(world.body(body).unwrap().mass(), 0.0);

    world.set_body_type(body, BodyType::Dynamic).unwrap();
    assert!((world.body(body).unwrap().mass() - 2.0).abs() < 1e-4);
    world.step(DT, 8, 3);
    assert!(world.body(body).unwrap().position().y < 2.0);

    world.set_body_type(body, BodyType::Static).unwrap();
    let body = world.body(body).unwrap();
    assert_eq!(body.linear_velocity(), Vec2::ZERO);
    assert!(!body.is_awake());
}

#[test]
fn destroying_a_fixture_updates_mass() {
    let mut world = World::new(Vec2::ZERO);
    let body = world.create_body(&BodyDef::dynamic()).unwrap();
    let left = world
        .create_fixture(
            body,
            &Shape::oriented_box(0.5, 0.5, Vec2::new(-1.0, 0.0), 0.0, 1.0).unwrap().into(),
        )
        .unwrap();
    world
        .create_fixture(
            body,
            &Shape::oriented_box(0.5, 0.5, Vec2::new(1.0, 0.0), 0.0, 1.0).unwrap().into(),
        )
        .unwrap();
    assert!((world.body(body).unwrap().mass() - 2.0).abs() < 1e-4);
    assert!(world.body(body).unwrap().local_center().length() < 1e-5);

    world.destroy_fixture(left).unwrap();
    let body = world.body(body).unwrap();
    assert!((body.mass() - 1.0).abs() < 1e-4);
    assert!((body.local_center() - Vec2::new(1.0, 0.0)).length() < 1e-4);
    assert!(world.destroy_fixture(left).is_err());
}

#[test]
fn fixed_rotation_keeps_angle() {
    let (mut world, _) = world_with_ground();
    let body = world
        .create_body(
            &BodyDef::dynamic()
                .position(Vec2::new(0.0, 3.0))
                .angular_velocity(4.0),
        )
        .unwrap();
    world
        .create_fixture(body, &Shape::rect(0.5, 0.5, 1.0).unwrap().into())
        .unwrap();
    world.set_fixed_rotation(body, true).unwrap();
    for _ in 0..60 {
        world.step(DT, 8, 3);
    }
    let body = world.body(body).unwrap();
    assert_eq!(body.angle(), 0.0);
    assert_eq!(body.angular_velocity(), 0.0);
}

#[test]
fn profile_counts_last_step() {
    let (mut world, _) = world_with_ground();
    add_box(&mut world, Vec2::new(-3.0, 1.0));
    add_box(&mut world, Vec2::new(3.0, 1.0));
    world.step(DT, 8, 3);
    world.step(DT, 8, 3);

    let profile = world.profile();
    assert_eq!(profile.body_count, 3);
    assert_eq!(profile.contact_count, 2);
    assert_eq!(profile.island_count, 2);
}

#[test]
fn engine_runs_fixed_steps() {
    let mut engine = PhysicsEngine::new(DT);
    let body = add_box(engine.world_mut(), Vec2::new(0.0, 10.0));
    let steps = engine.step(0.11);
    assert_eq!(steps, 6);
    assert!(engine.world().body(body).unwrap().position().y < 10.0);
}
