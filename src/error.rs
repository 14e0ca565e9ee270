//! Error types for Planar Accelerator.
//!
//! Only programmer errors detected at API boundaries are reported here.
//! Expected outcomes such as "no contact" or "no impact within the step" are
//! ordinary return values.

use thiserror::Error;

/// Errors raised when building shapes, bodies, joints or settings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhysicsError {
    /// Shape geometry or density was rejected.
    #[error("invalid shape: {reason}")]
    InvalidShape {
        /// What was wrong with the geometry.
        reason: &'static str,
    },

    /// A joint definition cannot be attached in this world.
    #[error("invalid joint: {reason}")]
    InvalidJoint {
        /// What was wrong with the joint.
        reason: &'static str,
    },

    /// A body definition contained non-finite or out of range values.
    #[error("invalid body: {reason}")]
    InvalidBody {
        /// What was wrong with the body.
        reason: &'static str,
    },

    /// The handle refers to an object that was destroyed or never existed.
    #[error("stale or unknown {kind} handle")]
    StaleHandle {
        /// Kind of handle ("body", "fixture", "joint").
        kind: &'static str,
    },

    /// A settings value was out of range.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration {
        /// What was wrong with the configuration.
        reason: &'static str,
    },
}

/// Convenience alias used throughout the crate.
pub type PhysicsResult<T> = Result<T, PhysicsError>;
