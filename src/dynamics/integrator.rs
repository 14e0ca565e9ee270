use glam::Vec2;

use crate::{
    config::WorldSettings,
    core::{
        body::{Body, BodyType},
        types::{Position, Velocity},
    },
    dynamics::solver::SolverBody,
};

/// Semi-implicit Euler integration shared by islands, TOI sub-steps and
/// kinematic bodies.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Integrator {
    pub gravity: Vec2,
    pub dt: f32,
    max_translation: f32,
    max_rotation: f32,
    linear_sleep_tolerance: f32,
    angular_sleep_tolerance: f32,
}

impl Integrator {
    pub fn new(gravity: Vec2, dt: f32, settings: &WorldSettings) -> Self {
        Self {
            gravity,
            dt,
            max_translation: settings.max_translation,
            max_rotation: settings.max_rotation,
            linear_sleep_tolerance: settings.linear_sleep_tolerance,
            angular_sleep_tolerance: settings.angular_sleep_tolerance,
        }
    }

    /// Applies gravity, accumulated forces and damping to a dynamic body.
    pub fn integrate_velocity(&self, body: &SolverBody, velocity: &mut Velocity) {
        if body.body_type != BodyType::Dynamic {
            return;
        }
        let h = self.dt;
        velocity.linear +=
            h * body.inv_mass * (body.gravity_scale * body.mass * self.gravity + body.force);
        velocity.angular += h * body.inv_inertia * body.torque;

        // Pade approximation of exp(-c h), stable for any damping.
        velocity.linear *= 1.0 / (1.0 + h * body.linear_damping);
        velocity.angular *= 1.0 / (1.0 + h * body.angular_damping);
    }

    /// Advances a position, scaling the velocity down when the step would
    /// exceed the translation or rotation limit.
    pub fn integrate_position(&self, position: &mut Position, velocity: &mut Velocity) {
        let h = self.dt;
        let translation = h * velocity.linear;
        if translation.length_squared() > self.max_translation * self.max_translation {
            velocity.linear *= self.max_translation / translation.length();
        }
        let rotation = h * velocity.angular;
        if rotation * rotation > self.max_rotation * self.max_rotation {
            velocity.angular *= self.max_rotation / rotation.abs();
        }
        position.c += h * velocity.linear;
        position.a += h * velocity.angular;
    }

    /// Moves a kinematic body by its velocity and advances its sleep timer.
    /// Returns the timer.
    pub fn integrate_kinematic(&self, body: &mut Body) -> f32 {
        body.sweep.c0 = body.sweep.c;
        body.sweep.a0 = body.sweep.a;

        let mut position = Position {
            c: body.sweep.c,
            a: body.sweep.a,
        };
        let mut velocity = Velocity::new(body.linear_velocity, body.angular_velocity);
        self.integrate_position(&mut position, &mut velocity);

        body.sweep.c = position.c;
        body.sweep.a = position.a;
        body.linear_velocity = velocity.linear;
        body.angular_velocity = velocity.angular;
        body.synchronize_transform();

        self.accumulate_sleep(&mut body.sleep_time, body.allow_sleep, &velocity)
    }

    /// Adds `dt` to a resting body's sleep timer or resets it for a moving one.
    pub fn accumulate_sleep(&self, sleep_time: &mut f32, allow_sleep: bool, velocity: &Velocity) -> f32 {
        let lin_tol = self.linear_sleep_tolerance;
        let ang_tol = self.angular_sleep_tolerance;
        if !allow_sleep
            || velocity.angular * velocity.angular > ang_tol * ang_tol
            || velocity.linear.length_squared() > lin_tol * lin_tol
        {
            *sleep_time = 0.0;
        } else {
            *sleep_time += self.dt;
        }
        *sleep_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::body::BodyDef;
    use approx::assert_relative_eq;

    fn integrator() -> Integrator {
        Integrator::new(Vec2::new(0.0, -10.0), 0.1, &WorldSettings::default())
    }

    fn dynamic_body(mass: f32) -> SolverBody {
        SolverBody {
            body_type: BodyType::Dynamic,
            mass,
            inv_mass: 1.0 / mass,
            gravity_scale: 1.0,
            ..SolverBody::ground()
        }
    }

    #[test]
    fn gravity_is_independent_of_mass() {
        let mut light = Velocity::default();
        let mut heavy = Velocity::default();
        integrator().integrate_velocity(&dynamic_body(1.0), &mut light);
        integrator().integrate_velocity(&dynamic_body(50.0), &mut heavy);
        assert_relative_eq!(light.linear.y, -1.0, epsilon = 1e-6);
        assert_relative_eq!(heavy.linear.y, -1.0, epsilon = 1e-6);
    }

    #[test]
    fn static_slots_are_not_accelerated() {
        let mut velocity = Velocity::default();
        integrator().integrate_velocity(&SolverBody::ground(), &mut velocity);
        assert_eq!(velocity, Velocity::default());
    }

    #[test]
    fn damping_slows_without_reversing() {
        let mut body = dynamic_body(1.0);
        body.gravity_scale = 0.0;
        body.linear_damping = 1000.0;
        let mut velocity = Velocity::new(Vec2::new(5.0, 0.0), 0.0);
        integrator().integrate_velocity(&body, &mut velocity);
        assert!(velocity.linear.x > 0.0 && velocity.linear.x < 0.1);
    }

    #[test]
    fn translation_is_clamped_per_step() {
        let mut position = Position::default();
        let mut velocity = Velocity::new(Vec2::new(1000.0, 0.0), 0.0);
        let integrator = integrator();
        integrator.integrate_position(&mut position, &mut velocity);
        assert_relative_eq!(position.c.x, integrator.max_translation, epsilon = 1e-4);
        assert_relative_eq!(velocity.linear.x, integrator.max_translation / 0.1, epsilon = 1e-3);
    }

    #[test]
    fn kinematic_body_moves_and_resets_its_timer() {
        let mut body = Body::new(&BodyDef::kinematic().linear_velocity(Vec2::new(2.0, 0.0)));
        body.sleep_time = 3.0;
        let timer = integrator().integrate_kinematic(&mut body);
        assert_relative_eq!(body.position().x, 0.2, epsilon = 1e-6);
        assert_relative_eq!(body.sweep.c0.x, 0.0);
        assert_eq!(timer, 0.0);
    }

    #[test]
    fn resting_bodies_accumulate_sleep_time() {
        let integrator = integrator();
        let mut timer = 0.0;
        integrator.accumulate_sleep(&mut timer, true, &Velocity::default());
        integrator.accumulate_sleep(&mut timer, true, &Velocity::default());
        assert_relative_eq!(timer, 0.2, epsilon = 1e-6);
        integrator.accumulate_sleep(&mut timer, false, &Velocity::default());
        assert_eq!(timer, 0.0);
    }
}
