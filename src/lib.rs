//! Planar Accelerator – 2D rigid-body physics for Rust.
//!
//! Bodies carry fixtures (circles, convex polygons, edges and chains); a
//! dynamic AABB tree finds candidate pairs, the narrow-phase builds contact
//! manifolds and a sequential-impulse solver resolves contacts and joints
//! island by island. Fast bodies are swept with time of impact so they do
//! not tunnel through thin geometry.

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod utils;
pub mod world;

pub use glam::{Mat2, Vec2};

pub use collision::{
    aabb::Aabb,
    broadphase::BroadPhase,
    manifold::{Manifold, WorldManifold},
    queries::{RaycastControl, RaycastHit},
};
pub use config::{ContinuousSettings, WorldSettings};
pub use core::{
    body::{Body, BodyDef, BodyType},
    fixture::{Filter, Fixture, FixtureDef},
    shape::Shape,
    types::{MassData, Material, Rot, Transform, Velocity},
};
pub use dynamics::{
    contact::{Contact, ContactImpulse, ContactView},
    joints::{
        AngleJointDef, DistanceJointDef, FrictionJointDef, GearJointDef, Joint, JointDef, JointType,
        MotorJointDef, PrismaticJointDef, PulleyJointDef, RevoluteJointDef, WeldJointDef,
    },
};
pub use error::{PhysicsError, PhysicsResult};
pub use utils::allocator::{BodyHandle, ContactHandle, FixtureHandle, JointHandle};
pub use utils::profiling::StepProfile;
pub use world::{Command, DeferredCommands, SharedWorld, World};

use config::{
    DEFAULT_GRAVITY, DEFAULT_MAX_FRAME_TIME, DEFAULT_POSITION_ITERATIONS, DEFAULT_TIME_STEP,
    DEFAULT_VELOCITY_ITERATIONS,
};

/// High-level convenience wrapper that owns a [`World`] and steps it at a
/// fixed rate from variable frame times.
pub struct PhysicsEngine {
    world: World,
    time_step: f32,
    velocity_iterations: u32,
    position_iterations: u32,
    max_frame_time: f32,
    accumulator: f32,
}

impl PhysicsEngine {
    /// Creates an engine with default gravity and the provided fixed timestep.
    pub fn new(time_step: f32) -> Self {
        Self::with_world(World::new(Vec2::from_array(DEFAULT_GRAVITY)), time_step)
    }

    pub fn with_world(world: World, time_step: f32) -> Self {
        Self {
            world,
            time_step,
            velocity_iterations: DEFAULT_VELOCITY_ITERATIONS,
            position_iterations: DEFAULT_POSITION_ITERATIONS,
            max_frame_time: DEFAULT_MAX_FRAME_TIME,
            accumulator: 0.0,
        }
    }

    pub fn set_iterations(&mut self, velocity_iterations: u32, position_iterations: u32) {
        self.velocity_iterations = velocity_iterations;
        self.position_iterations = position_iterations;
    }

    /// Caps the frame time fed into the accumulator so a long stall does not
    /// trigger an avalanche of catch-up steps.
    pub fn set_max_frame_time(&mut self, max_frame_time: f32) {
        self.max_frame_time = max_frame_time.max(self.time_step);
    }

    /// Advances the simulation by the provided frame time, running as many
    /// fixed steps as fit. Returns the number of steps taken.
    pub fn step(&mut self, frame_time: f32) -> u32 {
        if !(frame_time.is_finite() && self.time_step > 0.0) {
            log::warn!("ignoring frame time {frame_time}");
            return 0;
        }
        self.accumulator += frame_time.clamp(0.0, self.max_frame_time);

        let mut steps = 0;
        while self.accumulator >= self.time_step {
            self.world
                .step(self.time_step, self.velocity_iterations, self.position_iterations);
            self.accumulator -= self.time_step;
            steps += 1;
        }
        steps
    }

    /// Fraction of a step left in the accumulator, for interpolating
    /// rendered poses between the last two steps.
    pub fn alpha(&self) -> f32 {
        if self.time_step > 0.0 {
            self.accumulator / self.time_step
        } else {
            0.0
        }
    }

    /// Enables or disables parallel island solving.
    pub fn set_parallel_enabled(&mut self, enabled: bool) {
        self.world.set_parallel_enabled(enabled);
    }

    /// Returns whether the engine is currently using parallel execution.
    pub fn parallel_enabled(&self) -> bool {
        self.world.parallel_enabled()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn into_world(self) -> World {
        self.world
    }
}

impl Default for PhysicsEngine {
    fn default() -> Self {
        Self::new(DEFAULT_TIME_STEP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_time_is_split_into_fixed_steps() {
        let mut engine = PhysicsEngine::new(0.01);
        assert_eq!(engine.step(0.035), 3);
        assert!((engine.alpha() - 0.5).abs() < 1e-3);
        assert_eq!(engine.step(0.006), 1);
    }

    #[test]
    fn long_frames_are_clamped() {
        let mut engine = PhysicsEngine::new(0.01);
        engine.set_max_frame_time(0.05);
        assert_eq!(engine.step(10.0), 5);
        assert_eq!(engine.step(f32::NAN), 0);
    }
}
