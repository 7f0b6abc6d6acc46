//! Core data structures and traits for meshlod
//!
//! This crate provides the fundamental types shared by the LOD pipeline:
//! drawable meshes and models, vertex layouts, simplification-friendly raw
//! geometry, deferred asset references and the device/resolver capabilities
//! the pipeline consumes from its host.

pub mod point;
pub mod vertex;
pub mod mesh;
pub mod model;
pub mod geometry;
pub mod traits;
pub mod device;
pub mod error;

pub use point::*;
pub use vertex::*;
pub use mesh::*;
pub use model::*;
pub use geometry::*;
pub use traits::*;
pub use device::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Matrix3, Matrix4, Point3, Vector2, Vector3, Vector4};
