//! Global configuration constants and runtime settings for the Planar Accelerator engine.

use serde::{Deserialize, Serialize};

use crate::error::PhysicsError;

/// Default gravity vector applied in the physics world (Y-up).
pub const DEFAULT_GRAVITY: [f32; 2] = [0.0, -9.81];

/// Default integration timestep (in seconds).
pub const DEFAULT_TIME_STEP: f32 = 1.0 / 60.0;

/// Default number of velocity iterations performed per step.
pub const DEFAULT_VELOCITY_ITERATIONS: u32 = 8;

/// Default number of position iterations performed per step.
pub const DEFAULT_POSITION_ITERATIONS: u32 = 3;

/// Largest frame time accepted by the fixed-step driver before clamping.
pub const DEFAULT_MAX_FRAME_TIME: f32 = 0.25;

/// Maximum number of contact points between two convex shapes.
pub const MAX_MANIFOLD_POINTS: usize = 2;

/// Maximum number of vertices on a convex polygon.
pub const MAX_POLYGON_VERTICES: usize = 8;

/// Margin added to every tight AABB stored in the dynamic tree, in meters.
pub const AABB_EXTENSION: f32 = 0.1;

/// Scales the displacement prediction of moving proxies.
pub const AABB_MULTIPLIER: f32 = 4.0;

/// Collision and constraint tolerance, in meters.
pub const LINEAR_SLOP: f32 = 0.005;

/// Collision and constraint tolerance, in radians.
pub const ANGULAR_SLOP: f32 = 2.0 / 180.0 * std::f32::consts::PI;

/// Skin radius shared by polygons, edges and chains.
pub const POLYGON_RADIUS: f32 = 2.0 * LINEAR_SLOP;

/// Maximum position correction applied per position iteration.
pub const MAX_LINEAR_CORRECTION: f32 = 0.2;

/// Maximum angular correction applied per position iteration.
pub const MAX_ANGULAR_CORRECTION: f32 = 8.0 / 180.0 * std::f32::consts::PI;

/// Fraction of the overlap resolved per position iteration.
pub const BAUMGARTE: f32 = 0.2;

/// Position correction factor used while resolving TOI events.
pub const TOI_BAUMGARTE: f32 = 0.75;

/// Default time a body must rest before it is put to sleep (seconds).
pub const TIME_TO_SLEEP: f32 = 0.5;

/// Default linear speed below which a body counts as resting.
pub const LINEAR_SLEEP_TOLERANCE: f32 = 0.01;

/// Default angular speed below which a body counts as resting.
pub const ANGULAR_SLEEP_TOLERANCE: f32 = 2.0 / 180.0 * std::f32::consts::PI;

/// Default approach speed required before restitution is applied.
pub const VELOCITY_THRESHOLD: f32 = 1.0;

/// Default cap on body translation per step.
pub const MAX_TRANSLATION: f32 = 2.0;

/// Default cap on body rotation per step.
pub const MAX_ROTATION: f32 = 0.5 * std::f32::consts::PI;

/// Default cap on TOI sub-steps per contact.
pub const MAX_SUB_STEPS: u32 = 8;

/// Default cap on contacts gathered in a TOI mini-island.
pub const MAX_TOI_CONTACTS: usize = 32;

/// Knobs of the continuous collision pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinuousSettings {
    /// Number of TOI events a single contact may trigger within one step.
    pub max_sub_steps: u32,
    /// Capacity of the mini-island built around a TOI event.
    pub max_toi_contacts: usize,
    /// Conservative-advancement iterations before a TOI query gives up.
    pub toi_max_iterations: u32,
    /// Root finder iterations per separating axis.
    pub toi_max_root_iterations: u32,
    /// A contact is only swept when one of its bodies moved further than this
    /// fraction of its smallest extent. Zero sweeps every eligible contact.
    pub motion_threshold: f32,
}

impl Default for ContinuousSettings {
    fn default() -> Self {
        Self {
            max_sub_steps: MAX_SUB_STEPS,
            max_toi_contacts: MAX_TOI_CONTACTS,
            toi_max_iterations: 20,
            toi_max_root_iterations: 50,
            motion_threshold: 0.0,
        }
    }
}

/// Runtime switches of a [`World`](crate::world::World).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldSettings {
    pub allow_sleep: bool,
    pub warm_starting: bool,
    pub continuous_physics: bool,
    pub auto_clear_forces: bool,
    pub time_to_sleep: f32,
    pub linear_sleep_tolerance: f32,
    pub angular_sleep_tolerance: f32,
    pub velocity_threshold: f32,
    pub max_translation: f32,
    pub max_rotation: f32,
    pub ccd: ContinuousSettings,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            allow_sleep: true,
            warm_starting: true,
            continuous_physics: true,
            auto_clear_forces: true,
            time_to_sleep: TIME_TO_SLEEP,
            linear_sleep_tolerance: LINEAR_SLEEP_TOLERANCE,
            angular_sleep_tolerance: ANGULAR_SLEEP_TOLERANCE,
            velocity_threshold: VELOCITY_THRESHOLD,
            max_translation: MAX_TRANSLATION,
            max_rotation: MAX_ROTATION,
            ccd: ContinuousSettings::default(),
        }
    }
}

impl WorldSettings {
    /// Rejects settings that would make the solver misbehave.
    pub fn validate(&self) -> Result<(), PhysicsError> {
        let positive = [
            (self.time_to_sleep, "time_to_sleep must be positive"),
            (self.max_translation, "max_translation must be positive"),
            (self.max_rotation, "max_rotation must be positive"),
        ];
        for (value, reason) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(PhysicsError::InvalidConfiguration { reason });
            }
        }
        let non_negative = [
            (self.linear_sleep_tolerance, "linear_sleep_tolerance must be >= 0"),
            (self.angular_sleep_tolerance, "angular_sleep_tolerance must be >= 0"),
            (self.velocity_threshold, "velocity_threshold must be >= 0"),
            (self.ccd.motion_threshold, "ccd.motion_threshold must be >= 0"),
        ];
        for (value, reason) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(PhysicsError::InvalidConfiguration { reason });
            }
        }
        if self.ccd.max_toi_contacts == 0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "ccd.max_toi_contacts must be at least 1",
            });
        }
        if self.ccd.toi_max_iterations == 0 || self.ccd.toi_max_root_iterations == 0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "TOI iteration caps must be at least 1",
            });
        }
        Ok(())
    }
}
