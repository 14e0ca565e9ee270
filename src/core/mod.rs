//! Core simulation entities: shapes, bodies, fixtures and the math types they share.

pub mod body;
pub mod fixture;
pub mod shape;
pub mod types;

pub use body::{Body, BodyDef, BodyType};
pub use fixture::{Filter, Fixture, FixtureDef, FixtureProxy, ProxyRef};
pub use shape::{ChainShape, CircleShape, EdgeShape, PolygonShape, Shape, ShapeExtent, ShapeType};
pub use types::{MassData, Material, MixingMode, Position, Rot, Sweep, Transform, Velocity};
