//! Utility helpers: handle arenas, 2D math, logging and step profiling.

pub mod allocator;
pub mod logging;
pub mod math;
pub mod profiling;

pub use allocator::{Arena, ArenaHandle, GenerationalId};
pub use math::*;
