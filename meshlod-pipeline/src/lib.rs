//! LOD generation pipeline
//!
//! Turns a source model into a reduced level of detail:
//! - Mesh data extraction from CPU copies or device readback
//! - Per-level triangle budgets and edge collapse simplification
//! - Reassembly into renderer-ready vertex and index buffers
//! - LOD descriptors, persisted LOD assets and chains of levels

pub mod extract;
pub mod assemble;
pub mod config;
pub mod resolver;
pub mod descriptor;
pub mod asset;
pub mod chain;

pub use extract::*;
pub use assemble::*;
pub use config::*;
pub use resolver::*;
pub use descriptor::*;
pub use asset::*;
pub use chain::*;
