use planar_accelerator::*;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

const DT: f32 = 1.0 / 60.0;

fn scene() -> (World, BodyHandle, BodyHandle) {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    let ground = world.create_body(&BodyDef::fixed()).expect("ground");
    world
        .create_fixture(ground, &Shape::rect(20.0, 0.5, 1.0).expect("ground shape").into())
        .expect("ground fixture");
    let body = world
        .create_body(&BodyDef::dynamic().position(Vec2::new(0.0, 1.5)))
        .expect("box");
    world
        .create_fixture(body, &Shape::rect(0.5, 0.5, 1.0).expect("box shape").into())
        .expect("box fixture");
    (world, ground, body)
}

fn run(world: &mut World, steps: usize) {
    for _ in 0..steps {
        world.step(DT, 8, 3);
    }
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

#[test]
fn begin_and_end_come_in_pairs() {
    let (mut world, ground, body) = scene();
    let begins = counter();
    let ends = counter();
    {
        let begins = Arc::clone(&begins);
        world.on_begin_contact(move |contact, _| {
            let pair = (contact.body_a(), contact.body_b());
            assert!(pair == (ground, body) || pair == (body, ground));
            assert!(contact.is_touching());
            begins.fetch_add(1, Ordering::SeqCst);
        });
        let ends = Arc::clone(&ends);
        world.on_end_contact(move |_, _| {
            ends.fetch_add(1, Ordering::SeqCst);
        });
    }

    run(&mut world, 60);
    assert_eq!(begins.load(Ordering::SeqCst), 1);
    assert_eq!(ends.load(Ordering::SeqCst), 0);

    world.set_transform(body, Vec2::new(0.0, 10.0), 0.0).unwrap();
    world.step(DT, 8, 3);
    assert_eq!(ends.load(Ordering::SeqCst), 1);
}

#[test]
fn vetoed_contacts_never_touch() {
    let (mut world, _, body) = scene();
    let begins = counter();
    let ends = counter();
    {
        let begins = Arc::clone(&begins);
        world.on_begin_contact(move |contact, _| {
            contact.set_enabled(false);
            begins.fetch_add(1, Ordering::SeqCst);
        });
        let ends = Arc::clone(&ends);
        world.on_end_contact(move |_, _| {
            ends.fetch_add(1, Ordering::SeqCst);
        });
    }

    run(&mut world, 120);
    assert!(world.body(body).unwrap().position().y < -2.0, "box should fall through");
    // A vetoed contact stays untouched, so overlap keeps asking again.
    assert!(begins.load(Ordering::SeqCst) > 1);
    assert_eq!(ends.load(Ordering::SeqCst), 0);
}

#[test]
fn pre_solve_can_disable_a_contact() {
    let (mut world, _, body) = scene();
    let begins = counter();
    {
        let begins = Arc::clone(&begins);
        world.on_begin_contact(move |_, _| {
            begins.fetch_add(1, Ordering::SeqCst);
        });
    }
    world.on_pre_solve(|contact, _, _| contact.set_enabled(false));

    run(&mut world, 120);
    assert!(world.body(body).unwrap().position().y < -2.0, "box should fall through");
    assert_eq!(begins.load(Ordering::SeqCst), 1);
}

#[test]
fn pre_solve_sees_the_previous_manifold() {
    let (mut world, _, _) = scene();
    let persisted = counter();
    {
        let persisted = Arc::clone(&persisted);
        world.on_pre_solve(move |contact, old_manifold, _| {
            if old_manifold.point_count > 0 && contact.manifold().point_count > 0 {
                persisted.fetch_add(1, Ordering::SeqCst);
            }
        });
    }
    run(&mut world, 60);
    assert!(persisted.load(Ordering::SeqCst) > 10);
}

#[test]
fn post_solve_reports_supporting_impulse() {
    let (mut world, _, _) = scene();
    let last = Arc::new(Mutex::new(0.0_f32));
    {
        let last = Arc::clone(&last);
        world.on_post_solve(move |_, impulse, _| {
            let total: f32 = impulse.normal_impulses[..impulse.count].iter().sum();
            *last.lock().expect("impulse lock") = total;
        });
    }
    world.set_settings(WorldSettings {
        allow_sleep: false,
        ..WorldSettings::default()
    })
    .expect("valid settings");

    run(&mut world, 120);
    // A one kilogram box under gravity needs m * g * dt per step.
    let total = *last.lock().expect("impulse lock");
    assert!((total - 10.0 * DT).abs() < 0.02, "supporting impulse {}", total);
}

#[test]
fn tangent_speed_turns_the_ground_into_a_conveyor() {
    let (mut world, _, body) = scene();
    world.on_pre_solve(|contact, _, _| contact.set_tangent_speed(3.0));

    run(&mut world, 60);
    let x = world.body(body).unwrap().position().x;
    assert!(x.abs() > 0.5, "conveyor did not move the box, x = {}", x);
}

#[test]
fn commands_are_applied_after_the_step() {
    let (mut world, ground, body) = scene();
    world.on_begin_contact(move |contact, commands| {
        let other = if contact.body_a() == ground {
            contact.body_b()
        } else {
            contact.body_a()
        };
        commands.destroy_body(other);
    });

    let mut destroyed_at = None;
    for step in 0..60 {
        world.step(DT, 8, 3);
        assert!(world.pending_commands().is_empty());
        if world.body(body).is_none() {
            destroyed_at = Some(step);
            break;
        }
    }
    assert!(destroyed_at.is_some(), "touching box should be destroyed");
    assert_eq!(world.body_count(), 1);
    assert_eq!(world.contact_count(), 0);
}

#[test]
fn stale_commands_are_skipped() {
    let (mut world, ground, body) = scene();
    world.on_begin_contact(move |_, commands| {
        commands.destroy_body(body);
        commands.set_linear_velocity(body, Vec2::new(1.0, 0.0));
    });

    run(&mut world, 60);
    assert!(world.body(body).is_none());
    assert!(world.body(ground).is_some());
}
