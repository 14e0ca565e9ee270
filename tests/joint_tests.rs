use planar_accelerator::{dynamics::joints::JointKind, *};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

const DT: f32 = 1.0 / 60.0;

fn run(world: &mut World, steps: usize) {
    for _ in 0..steps {
        world.step(DT, 8, 3);
    }
}

fn dynamic_box(world: &mut World, position: Vec2, half: Vec2, density: f32) -> BodyHandle {
    let body = world
        .create_body(&BodyDef::dynamic().position(position))
        .expect("body");
    world
        .create_fixture(
            body,
            &Shape::rect(half.x, half.y, density).expect("box shape").into(),
        )
        .expect("fixture");
    body
}

fn wheel(world: &mut World, position: Vec2) -> BodyHandle {
    let body = world
        .create_body(&BodyDef::dynamic().position(position))
        .expect("wheel body");
    world
        .create_fixture(
            body,
            &Shape::circle(Vec2::ZERO, 0.5, 1.0).expect("wheel shape").into(),
        )
        .expect("wheel fixture");
    body
}

#[test]
fn pendulum_keeps_its_length() {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    let pivot = Vec2::new(0.0, 5.0);
    let bob = wheel(&mut world, Vec2::new(2.0, 5.0));
    world
        .create_joint(&RevoluteJointDef::new(None, bob, pivot).into())
        .expect("revolute joint");

    let mut lowest = f32::MAX;
    for _ in 0..120 {
        world.step(DT, 8, 3);
        let position = world.body(bob).unwrap().position();
        let length = (position - pivot).length();
        assert!((length - 2.0).abs() < 0.05, "pendulum stretched to {}", length);
        lowest = lowest.min(position.y);
    }
    assert!(lowest < 3.2, "pendulum never swung down, lowest y = {}", lowest);
}

#[test]
fn revolute_limit_stops_the_swing() {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    let bar = dynamic_box(&mut world, Vec2::new(1.0, 0.0), Vec2::new(1.0, 0.1), 1.0);
    world
        .create_joint(
            &RevoluteJointDef::new(None, bar, Vec2::ZERO)
                .limits(-0.25, 0.25)
                .into(),
        )
        .expect("limited revolute");

    for _ in 0..120 {
        world.step(DT, 8, 3);
        let angle = world.body(bar).unwrap().angle();
        assert!(angle > -0.3, "limit overshot to {}", angle);
    }
    let angle = world.body(bar).unwrap().angle();
    assert!((angle + 0.25).abs() < 0.03, "bar should rest on the lower limit, angle = {}", angle);
}

#[test]
fn revolute_motor_reaches_target_speed() {
    let mut world = World::new(Vec2::ZERO);
    let body = wheel(&mut world, Vec2::ZERO);
    let joint = world
        .create_joint(
            &RevoluteJointDef::new(None, body, Vec2::ZERO)
                .motor(3.0, 1000.0)
                .into(),
        )
        .expect("motorised revolute");

    run(&mut world, 30);
    let omega = world.body(body).unwrap().angular_velocity();
    assert!((omega - 3.0).abs() < 0.01, "motor speed {}", omega);

    match world.joint_mut(joint).expect("joint").kind_mut() {
        JointKind::Revolute(revolute) => revolute.set_motor_speed(-1.0),
        other => panic!("unexpected joint kind {:?}", other.joint_type()),
    }
    run(&mut world, 30);
    let omega = world.body(body).unwrap().angular_velocity();
    assert!((omega + 1.0).abs() < 0.01, "motor speed {}", omega);
}

#[test]
fn prismatic_motor_drives_to_the_limit() {
    let mut world = World::new(Vec2::ZERO);
    let slider = dynamic_box(&mut world, Vec2::ZERO, Vec2::splat(0.5), 1.0);
    world
        .create_joint(
            &PrismaticJointDef::new(None, slider, Vec2::ZERO, Vec2::X)
                .limits(-1.0, 1.0)
                .motor(2.0, 1000.0)
                .into(),
        )
        .expect("prismatic joint");

    run(&mut world, 120);
    let body = world.body(slider).unwrap();
    assert!((body.position().x - 1.0).abs() < 0.02, "slider at {:?}", body.position());
    assert!(body.position().y.abs() < 1e-3);
    assert!(body.angle().abs() < 1e-3);
}

#[test]
fn distance_joint_holds_rest_length() {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    let anchor = Vec2::new(0.0, 5.0);
    let body = wheel(&mut world, Vec2::new(1.5, 3.0));
    world
        .create_joint(&DistanceJointDef::new(None, body, anchor, Vec2::new(1.5, 3.0)).into())
        .expect("distance joint");
    let rest = (Vec2::new(1.5, 3.0) - anchor).length();

    run(&mut world, 120);
    let length = (world.body(body).unwrap().position() - anchor).length();
    assert!((length - rest).abs() < 0.02, "distance drifted to {}", length);
}

#[test]
fn soft_distance_joint_oscillates_around_rest_length() {
    let mut world = World::new(Vec2::ZERO);
    let body = wheel(&mut world, Vec2::new(3.0, 0.0));
    world
        .create_joint(
            &DistanceJointDef::new(None, body, Vec2::ZERO, Vec2::new(3.0, 0.0))
                .length(2.0)
                .spring(2.0, 0.7)
                .into(),
        )
        .expect("spring joint");

    run(&mut world, 240);
    let length = world.body(body).unwrap().position().length();
    assert!((length - 2.0).abs() < 0.05, "spring settled at {}", length);
}

#[test]
fn weld_holds_cantilever() {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    let beam = dynamic_box(&mut world, Vec2::new(1.0, 0.0), Vec2::new(1.0, 0.1), 1.0);
    world
        .create_joint(&WeldJointDef::new(None, beam, Vec2::ZERO).into())
        .expect("weld joint");

    run(&mut world, 60);
    let body = world.body(beam).unwrap();
    assert!(
        (body.position() - Vec2::new(1.0, 0.0)).length() < 0.05,
        "beam sagged to {:?}",
        body.position()
    );
    assert!(body.angle().abs() < 0.05, "beam rotated to {}", body.angle());
}

#[test]
fn pulley_conserves_rope_length() {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    let ground_a = Vec2::new(-2.0, 5.0);
    let ground_b = Vec2::new(2.0, 5.0);
    let heavy = dynamic_box(&mut world, Vec2::new(-2.0, 0.0), Vec2::splat(0.5), 2.0);
    let light = dynamic_box(&mut world, Vec2::new(2.0, 0.0), Vec2::splat(0.5), 1.0);
    let ground = world.create_body(&BodyDef::fixed()).expect("ground");
    world
        .create_joint(
            &PulleyJointDef::new(
                Some(heavy),
                light,
                ground_a,
                ground_b,
                Vec2::new(-2.0, 0.0),
                Vec2::new(2.0, 0.0),
                1.0,
            )
            .into(),
        )
        .expect("pulley joint");
    // Keeps the pair from swinging sideways.
    for (body, x) in [(heavy, -2.0), (light, 2.0)] {
        world
            .create_joint(
                &PrismaticJointDef::new(Some(ground), body, Vec2::new(x, 0.0), Vec2::Y).into(),
            )
            .expect("guide rail");
    }

    run(&mut world, 60);
    let heavy_y = world.body(heavy).unwrap().position().y;
    let light_y = world.body(light).unwrap().position().y;
    assert!(heavy_y < -0.5, "heavy side should descend, y = {}", heavy_y);
    assert!(light_y > 0.5, "light side should rise, y = {}", light_y);
    let rope = (5.0 - heavy_y) + (5.0 - light_y);
    assert!((rope - 10.0).abs() < 0.05, "rope length changed to {}", rope);
}

#[test]
fn gear_couples_two_wheels() {
    let mut world = World::new(Vec2::ZERO);
    let first = wheel(&mut world, Vec2::ZERO);
    let second = wheel(&mut world, Vec2::new(3.0, 0.0));
    let joint1 = world
        .create_joint(
            &RevoluteJointDef::new(None, first, Vec2::ZERO)
                .motor(1.0, 1000.0)
                .into(),
        )
        .expect("driver");
    let joint2 = world
        .create_joint(&RevoluteJointDef::new(None, second, Vec2::new(3.0, 0.0)).into())
        .expect("follower");
    let gear = world
        .create_joint(&GearJointDef::new(joint1, joint2, 2.0).into())
        .expect("gear joint");

    run(&mut world, 60);
    let angle1 = world.body(first).unwrap().angle();
    let angle2 = world.body(second).unwrap().angle();
    assert!(angle1 > 0.5, "driver barely turned: {}", angle1);
    assert!(
        (angle1 + 2.0 * angle2).abs() < 0.02,
        "gear slipped: {} + 2 * {}",
        angle1,
        angle2
    );

    world.destroy_joint(joint2).expect("destroy follower");
    assert!(world.joint(gear).is_none(), "gear must go with its joint");
}

#[test]
fn motor_joint_tracks_offset() {
    let mut world = World::new(Vec2::ZERO);
    let body = dynamic_box(&mut world, Vec2::ZERO, Vec2::splat(0.5), 1.0);
    let joint = world
        .create_joint(
            &MotorJointDef::new(None, body)
                .max_force(1000.0)
                .max_torque(1000.0)
                .into(),
        )
        .expect("motor joint");
    match world.joint_mut(joint).expect("joint").kind_mut() {
        JointKind::Motor(motor) => {
            motor.set_linear_offset(Vec2::new(2.0, 1.0));
            motor.set_angular_offset(0.5);
        }
        other => panic!("unexpected joint kind {:?}", other.joint_type()),
    }

    run(&mut world, 120);
    let body = world.body(body).unwrap();
    assert!(
        (body.position() - Vec2::new(2.0, 1.0)).length() < 0.02,
        "body at {:?}",
        body.position()
    );
    assert!((body.angle() - 0.5).abs() < 0.02, "angle {}", body.angle());
}

#[test]
fn friction_joint_stops_sliding() {
    let mut world = World::new(Vec2::ZERO);
    let body = world
        .create_body(&BodyDef::dynamic().linear_velocity(Vec2::new(5.0, 0.0)))
        .expect("puck");
    world
        .create_fixture(body, &Shape::rect(0.5, 0.5, 1.0).unwrap().into())
        .expect("puck fixture");
    world
        .create_joint(&FrictionJointDef::new(None, body, Vec2::ZERO).limits(10.0, 10.0).into())
        .expect("friction joint");

    world.step(DT, 8, 3);
    let speed = world.body(body).unwrap().linear_velocity().x;
    assert!(speed < 5.0 && speed > 4.0, "friction should decelerate gradually, v = {}", speed);

    run(&mut world, 60);
    let body = world.body(body).unwrap();
    assert!(body.linear_velocity().length() < 1e-3);
    assert!(body.position().x > 1.0 && body.position().x < 1.5);
}

#[test]
fn angle_joint_reaches_target() {
    let mut world = World::new(Vec2::ZERO);
    let body = dynamic_box(&mut world, Vec2::ZERO, Vec2::splat(0.5), 1.0);
    world
        .create_joint(&AngleJointDef::new(None, body).target(0.5).into())
        .expect("angle joint");

    run(&mut world, 120);
    let angle = world.body(body).unwrap().angle();
    assert!((angle - 0.5).abs() < 0.01, "angle {}", angle);
}

#[test]
fn overloaded_joint_breaks() {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    let bob = dynamic_box(&mut world, Vec2::new(0.0, 3.0), Vec2::splat(0.5), 10.0);
    let joint = world
        .create_joint(
            &JointDef::from(RevoluteJointDef::new(None, bob, Vec2::new(0.0, 5.0))).breakpoint(0.5),
        )
        .expect("fragile joint");

    let broken = Arc::new(AtomicUsize::new(0));
    {
        let broken = Arc::clone(&broken);
        world.on_joint_broken(move |handle, _, _| {
            assert_eq!(handle, joint);
            broken.fetch_add(1, Ordering::SeqCst);
        });
    }

    run(&mut world, 5);
    assert_eq!(broken.load(Ordering::SeqCst), 1);
    assert_eq!(world.joint_count(), 0);
    assert!(world.body(bob).unwrap().joint_handles().is_empty());
    assert!(world.destroy_joint(joint).is_err());
}

#[test]
fn joints_disable_collision_between_their_bodies() {
    let mut world = World::new(Vec2::ZERO);
    let a = wheel(&mut world, Vec2::ZERO);
    let b = wheel(&mut world, Vec2::new(0.8, 0.0));
    world.step(DT, 8, 3);
    assert_eq!(world.contact_count(), 1);

    let joint = world
        .create_joint(&DistanceJointDef::new(Some(a), b, Vec2::ZERO, Vec2::new(0.8, 0.0)).into())
        .expect("distance joint");
    world.step(DT, 8, 3);
    assert_eq!(world.contact_count(), 0);

    world.destroy_joint(joint).expect("destroy joint");

    let c = wheel(&mut world, Vec2::new(0.0, 0.8));
    world
        .create_joint(
            &JointDef::from(DistanceJointDef::new(Some(a), c, Vec2::ZERO, Vec2::new(0.0, 0.8)))
                .collide_connected(true),
        )
        .expect("colliding distance joint");
    world.step(DT, 8, 3);
    let touching = world
        .contacts()
        .filter(|(_, contact)| {
            let pair = (contact.body_a(), contact.body_b());
            pair == (a, c) || pair == (c, a)
        })
        .count();
    assert_eq!(touching, 1, "collide_connected joints keep their contact");
}
