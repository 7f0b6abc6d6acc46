//! Mesh simplification for level-of-detail generation
//!
//! This crate provides the pieces of the LOD pipeline that reduce geometry:
//! - Triangle budgets from a quality factor
//! - The quadric error metric
//! - Quadric-driven edge collapse simplification

pub mod budget;
pub mod quadric;
pub mod edge_collapse;

pub use budget::*;
pub use quadric::*;
pub use edge_collapse::*;

use meshlod_core::{RawGeometry, Result};
use std::fmt;

/// Why a simplification run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Termination {
    /// Active triangle count is at or below the target
    TargetReached,
    /// Every remaining edge would fold over, pinch or move a locked vertex
    NoCollapsibleEdges,
    /// The cheapest remaining collapse exceeds the configured error threshold
    ErrorThreshold,
    /// The configured maximum number of collapses was performed
    CollapseBudget,
    /// The configured wall-clock budget ran out
    TimeBudget,
    /// The caller raised the cancellation flag
    Cancelled,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Termination::TargetReached => "target reached",
            Termination::NoCollapsibleEdges => "no collapsible edges left",
            Termination::ErrorThreshold => "error threshold exceeded",
            Termination::CollapseBudget => "collapse budget exhausted",
            Termination::TimeBudget => "time budget exhausted",
            Termination::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Reduced geometry plus how the run went
#[derive(Debug, Clone)]
pub struct SimplificationResult {
    pub geometry: RawGeometry,
    pub original_triangles: usize,
    pub target_triangles: usize,
    /// Number of edge collapses performed
    pub collapses: usize,
    pub termination: Termination,
}

impl SimplificationResult {
    pub fn triangle_count(&self) -> usize {
        self.geometry.triangle_count()
    }

    /// Whether the result fits the requested budget
    pub fn reached_target(&self) -> bool {
        self.triangle_count() <= self.target_triangles
    }
}

/// Reduce a mesh to a triangle budget
pub trait MeshSimplifier {
    /// Simplify `geometry` until at most `target_triangles` remain, or no
    /// further collapse is possible (best effort, annotated in the result)
    fn simplify(&self, geometry: &RawGeometry, target_triangles: usize) -> Result<SimplificationResult>;

    /// Simplify to the budget implied by a quality factor
    fn simplify_to_quality(&self, geometry: &RawGeometry, quality: f32) -> Result<SimplificationResult> {
        let target = budget::target_triangles(geometry.triangle_count(), quality);
        self.simplify(geometry, target)
    }
}
