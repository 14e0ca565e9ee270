use planar_accelerator::*;

const DT: f32 = 1.0 / 60.0;
const WALL_X: f32 = 5.0;
// Default maximum translation per step.
const MAX_STEP: f32 = 2.0;

fn world(continuous: bool) -> World {
    let settings = WorldSettings {
        continuous_physics: continuous,
        ..WorldSettings::default()
    };
    World::with_settings(Vec2::ZERO, settings).expect("valid settings")
}

fn thin_wall(world: &mut World, body_def: BodyDef, density: f32) -> BodyHandle {
    let wall = world
        .create_body(&body_def.position(Vec2::new(WALL_X, 0.0)))
        .expect("wall body");
    world
        .create_fixture(wall, &Shape::rect(0.05, 5.0, density).expect("wall shape").into())
        .expect("wall fixture");
    wall
}

fn projectile(world: &mut World, bullet: bool) -> BodyHandle {
    // 120 m/s covers two metres per step, far more than the wall is thick.
    let body = world
        .create_body(
            &BodyDef::dynamic()
                .linear_velocity(Vec2::new(120.0, 0.0))
                .bullet(bullet),
        )
        .expect("projectile body");
    world
        .create_fixture(body, &Shape::circle(Vec2::ZERO, 0.1, 1.0).expect("ball").into())
        .expect("projectile fixture");
    body
}

fn run(world: &mut World, steps: usize) {
    for _ in 0..steps {
        world.step(DT, 8, 3);
    }
}

#[test]
fn fast_ball_does_not_tunnel_through_static_wall() {
    let mut world = world(true);
    thin_wall(&mut world, BodyDef::fixed(), 1.0);
    let ball = projectile(&mut world, false);

    run(&mut world, 30);
    let x = world.body(ball).unwrap().position().x;
    assert!(x < WALL_X, "ball tunnelled to x = {}", x);
}

#[test]
fn without_continuous_physics_the_ball_tunnels() {
    let mut world = world(false);
    thin_wall(&mut world, BodyDef::fixed(), 1.0);
    let ball = projectile(&mut world, false);

    run(&mut world, 30);
    let x = world.body(ball).unwrap().position().x;
    assert!(x > WALL_X, "ball should have skipped the wall, x = {}", x);
}

#[test]
fn steps_are_clamped_to_max_translation() {
    let mut world = world(true);
    let ball = projectile(&mut world, false);
    world
        .body_mut(ball)
        .unwrap()
        .set_linear_velocity(Vec2::new(600.0, 0.0));
    world.step(DT, 8, 3);

    let body = world.body(ball).unwrap();
    assert!((body.position().x - MAX_STEP).abs() < 1e-4, "moved {}", body.position().x);
    assert!((body.linear_velocity().x - MAX_STEP / DT).abs() < 1e-2);
}

#[test]
fn bullets_stop_at_dynamic_bodies() {
    let mut world = world(true);
    let plank = thin_wall(&mut world, BodyDef::dynamic(), 50.0);
    let ball = projectile(&mut world, true);

    run(&mut world, 10);
    let ball_x = world.body(ball).unwrap().position().x;
    let plank_x = world.body(plank).unwrap().position().x;
    assert!(ball_x < plank_x, "bullet passed the plank: {} vs {}", ball_x, plank_x);
    assert!(plank_x > WALL_X, "plank should be pushed by the bullet");
}

#[test]
fn non_bullets_pass_dynamic_bodies() {
    let mut world = world(true);
    let plank = thin_wall(&mut world, BodyDef::dynamic(), 50.0);
    let ball = projectile(&mut world, false);

    run(&mut world, 10);
    let ball_x = world.body(ball).unwrap().position().x;
    let plank_x = world.body(plank).unwrap().position().x;
    assert!(ball_x > plank_x, "only bullets are swept against dynamic bodies");
}
