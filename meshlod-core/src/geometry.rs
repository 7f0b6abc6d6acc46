//! Simplification-friendly geometry arrays

use crate::error::{Error, Result};
use crate::point::{Point3d, Vector2f, Vector3f, Vector4f};

/// Plain per-vertex arrays plus a flat triangle index list.
///
/// Attribute arrays are either empty (attribute absent) or exactly as long as
/// `positions`. Positions are kept in double precision because quadrics are
/// accumulated over many collapses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawGeometry {
    pub positions: Vec<Point3d>,
    /// Three indices per triangle
    pub indices: Vec<u32>,
    pub uvs: Vec<Vector2f>,
    pub normals: Vec<Vector3f>,
    pub tangents: Vec<Vector4f>,
}

impl RawGeometry {
    /// Create geometry from positions and indices only
    pub fn new(positions: Vec<Point3d>, indices: Vec<u32>) -> Self {
        Self {
            positions,
            indices,
            ..Default::default()
        }
    }

    pub fn with_uvs(mut self, uvs: Vec<Vector2f>) -> Self {
        self.uvs = uvs;
        self
    }

    pub fn with_normals(mut self, normals: Vec<Vector3f>) -> Self {
        self.normals = normals;
        self
    }

    pub fn with_tangents(mut self, tangents: Vec<Vector4f>) -> Self {
        self.tangents = tangents;
        self
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn has_uvs(&self) -> bool {
        !self.uvs.is_empty()
    }

    pub fn has_normals(&self) -> bool {
        !self.normals.is_empty()
    }

    pub fn has_tangents(&self) -> bool {
        !self.tangents.is_empty()
    }

    /// Iterate triangles as index triples
    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]])
    }

    /// Check the lock-step and index range invariants
    pub fn validate(&self) -> Result<()> {
        if self.indices.len() % 3 != 0 {
            return Err(Error::InvalidData(format!(
                "index count {} is not a multiple of 3",
                self.indices.len()
            )));
        }
        let n = self.positions.len();
        for (name, len) in [
            ("uv", self.uvs.len()),
            ("normal", self.normals.len()),
            ("tangent", self.tangents.len()),
        ] {
            if len != 0 && len != n {
                return Err(Error::InvalidData(format!(
                    "{} array has {} entries for {} vertices",
                    name, len, n
                )));
            }
        }
        if let Some(&bad) = self.indices.iter().find(|&&i| i as usize >= n) {
            return Err(Error::InvalidData(format!(
                "index {} out of range for {} vertices",
                bad, n
            )));
        }
        Ok(())
    }
}
