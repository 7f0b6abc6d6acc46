//! Drawable mesh data structures

use crate::point::Point3f;
use crate::vertex::{IndexFormat, VertexLayout};
use std::sync::Arc;

/// Primitive assembly mode of a draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Point3f,
    pub max: Point3f,
}

impl BoundingBox {
    pub fn new(min: Point3f, max: Point3f) -> Self {
        Self { min, max }
    }

    /// Smallest box containing every point, `None` when empty
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Point3f>,
    {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let mut min = first;
        let mut max = first;
        for p in iter {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }
        Some(Self { min, max })
    }

    pub fn center(&self) -> Point3f {
        nalgebra::center(&self.min, &self.max)
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            min: Point3f::origin(),
            max: Point3f::origin(),
        }
    }
}

/// Opaque identifier of a buffer owned by a graphics device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u64);

/// A device buffer, optionally with a CPU-resident copy of its contents
#[derive(Debug, Clone)]
pub struct BufferRef {
    pub handle: BufferHandle,
    pub data: Option<Arc<[u8]>>,
}

impl BufferRef {
    /// Buffer that only lives on the device
    pub fn device_only(handle: BufferHandle) -> Self {
        Self { handle, data: None }
    }

    /// Buffer with a CPU copy of its bytes
    pub fn with_data(handle: BufferHandle, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            handle,
            data: Some(data.into()),
        }
    }

    pub fn is_cpu_resident(&self) -> bool {
        self.data.is_some()
    }
}

/// Vertex buffer bound to a draw
#[derive(Debug, Clone)]
pub struct VertexBufferBinding {
    pub buffer: BufferRef,
    pub layout: VertexLayout,
    pub count: usize,
}

/// Index buffer bound to a draw
#[derive(Debug, Clone)]
pub struct IndexBufferBinding {
    pub buffer: BufferRef,
    pub format: IndexFormat,
    pub count: usize,
}

/// Everything needed to issue one draw call
#[derive(Debug, Clone)]
pub struct MeshDraw {
    pub topology: PrimitiveTopology,
    pub vertex_buffers: Vec<VertexBufferBinding>,
    pub index_buffer: Option<IndexBufferBinding>,
    /// Number of indices (or vertices, for non-indexed draws) to draw
    pub draw_count: usize,
}

impl MeshDraw {
    /// Whether every bound buffer carries a CPU copy
    pub fn is_cpu_resident(&self) -> bool {
        self.vertex_buffers.iter().all(|b| b.buffer.is_cpu_resident())
            && self
                .index_buffer
                .as_ref()
                .map_or(true, |b| b.buffer.is_cpu_resident())
    }

    /// Vertex count of the first stream
    pub fn vertex_count(&self) -> usize {
        self.vertex_buffers.first().map_or(0, |b| b.count)
    }

    /// Index count, zero for non-indexed draws
    pub fn index_count(&self) -> usize {
        self.index_buffer.as_ref().map_or(0, |b| b.count)
    }
}

/// A drawable unit of a model
#[derive(Debug, Clone)]
pub struct Mesh {
    pub name: Option<String>,
    pub draw: MeshDraw,
    pub bounding_box: BoundingBox,
    /// Slot in the owning model's material list
    pub material_index: usize,
}

impl Mesh {
    pub fn new(draw: MeshDraw, bounding_box: BoundingBox) -> Self {
        Self {
            name: None,
            draw,
            bounding_box,
            material_index: 0,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_material(mut self, material_index: usize) -> Self {
        self.material_index = material_index;
        self
    }

    /// Number of triangles drawn, for triangle-list meshes
    pub fn triangle_count(&self) -> usize {
        match self.draw.topology {
            PrimitiveTopology::TriangleList => self.draw.draw_count / 3,
            _ => 0,
        }
    }
}
