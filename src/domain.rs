//! The domain module encapsulates the warehouse rules. It defines the `Forklift` with its
//! `Kinematics`, the `Warehouse` registry holding everything placed on the floor, the collision
//! rules between them and the autopilot.
//!
//! The module knows nothing about Bevy or the control channel, so every rule can be exercised
//! in plain unit tests.

pub mod autopilot;
mod basis;
mod collision;
mod environment;
mod forklift;
mod kinematics;
mod warehouse;

pub use autopilot::AutopilotConfig;
pub use basis::{Angle, Position};
pub use collision::{HasCollision, Shape};
pub use environment::{Arena, Container, DropZone, Shelf};
pub use forklift::{Forklift, Sensor, Sensors, FORKLIFT_RADIUS};
pub use kinematics::{Kinematics, KinematicsConfig, MovementDirection};
pub use warehouse::{Category, EntityId, LayoutConfig, PlacementError, Warehouse};
