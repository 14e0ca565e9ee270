//! Collision detection: bounding volumes, broad-phase, narrow-phase, distance, TOI and queries.

pub mod aabb;
pub mod broadphase;
pub mod ccd;
pub mod clipping;
pub mod distance;
pub mod dynamic_tree;
pub mod manifold;
pub mod narrowphase;
pub mod queries;

pub use aabb::{Aabb, RayCastInput, RayCastOutput};
pub use broadphase::{BroadPhase, ProxyPair};
pub use ccd::{time_of_impact, ToiInput, ToiLimits, ToiOutput, ToiState};
pub use distance::{distance, test_overlap, DistanceInput, DistanceOutput, DistanceProxy, SimplexCache};
pub use dynamic_tree::DynamicTree;
pub use manifold::{ContactId, FeatureType, Manifold, ManifoldPoint, ManifoldType, PointState, WorldManifold};
pub use narrowphase::{collide, ContactKind};
pub use queries::{RaycastControl, RaycastHit, WorldQuery};
