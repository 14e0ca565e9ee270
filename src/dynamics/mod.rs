//! Simulation dynamics: contacts, islands, the sequential-impulse solver,
//! integration and joints.

pub mod contact;
pub(crate) mod contact_manager;
pub(crate) mod integrator;
pub(crate) mod island;
pub mod joints;
pub mod solver;

pub use contact::{Contact, ContactImpulse, ContactView};
pub use joints::{Joint, JointDef, JointKind, JointType};
pub use solver::TimeStep;
