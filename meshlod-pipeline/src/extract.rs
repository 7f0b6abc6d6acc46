//! Mesh data extraction
//!
//! Reads a drawable mesh's buffers into plain arrays. Two storage locations
//! are supported behind one [`MeshDataSource`] trait: buffers that carry a
//! CPU copy are decoded in place, device-only buffers are read back through
//! the [`GraphicsDevice`] first.

use meshlod_core::{
    Error, GraphicsDevice, IndexFormat, Mesh, MeshDraw, Point3d, RawGeometry, Result, Vector2f,
    Vector3f, Vector4f, VertexBufferBinding, VertexElement, VertexSemantic,
};
use std::borrow::Cow;

/// Per-vertex and index data of one mesh.
///
/// Position and index data are mandatory. Optional attributes come back as
/// empty vectors when the mesh does not carry them.
pub trait MeshDataSource {
    fn vertex_count(&self) -> usize;
    fn index_count(&self) -> usize;
    fn indices(&self) -> Result<Vec<u32>>;
    fn positions(&self) -> Result<Vec<Point3d>>;
    fn uvs(&self) -> Result<Vec<Vector2f>>;
    fn normals(&self) -> Result<Vec<Vector3f>>;
    fn tangents(&self) -> Result<Vec<Vector4f>>;
}

/// Buffer bytes of a mesh, borrowed or read back, plus the decode logic
struct MeshBuffers<'a> {
    draw: &'a MeshDraw,
    vertex_bytes: Vec<Cow<'a, [u8]>>,
    index_bytes: Cow<'a, [u8]>,
    vertex_count: usize,
}

impl<'a> MeshBuffers<'a> {
    fn new(draw: &'a MeshDraw, vertex_bytes: Vec<Cow<'a, [u8]>>, index_bytes: Cow<'a, [u8]>) -> Result<Self> {
        let index = index_binding(draw)?;
        position_element(draw)?;

        let vertex_count = draw.vertex_count();
        if let Some(other) = draw.vertex_buffers.iter().find(|b| b.count != vertex_count) {
            return Err(Error::InvalidData(format!(
                "vertex streams disagree on count ({} vs {})",
                vertex_count, other.count
            )));
        }
        for (binding, bytes) in draw.vertex_buffers.iter().zip(&vertex_bytes) {
            if !binding.layout.is_valid() {
                return Err(Error::InvalidData(format!(
                    "vertex layout {:?} has elements outside its stride of {} bytes",
                    binding.layout.elements, binding.layout.stride
                )));
            }
            let needed = binding.count.saturating_mul(binding.layout.stride as usize);
            if bytes.len() < needed {
                return Err(Error::InvalidData(format!(
                    "vertex buffer holds {} bytes, {} vertices of stride {} need {}",
                    bytes.len(),
                    binding.count,
                    binding.layout.stride,
                    needed
                )));
            }
        }
        let needed = index.count * index.format.size();
        if index_bytes.len() < needed {
            return Err(Error::InvalidData(format!(
                "index buffer holds {} bytes, {} indices need {}",
                index_bytes.len(),
                index.count,
                needed
            )));
        }

        Ok(Self {
            draw,
            vertex_bytes,
            index_bytes,
            vertex_count,
        })
    }

    fn index_count(&self) -> usize {
        self.draw.index_count()
    }

    fn indices(&self) -> Result<Vec<u32>> {
        let index = index_binding(self.draw)?;
        let size = index.format.size();
        let bytes = &self.index_bytes[..index.count * size];
        let indices: Vec<u32> = match index.format {
            IndexFormat::U16 => bytes
                .chunks_exact(size)
                .map(|c| bytemuck::pod_read_unaligned::<u16>(c) as u32)
                .collect(),
            IndexFormat::U32 => bytes
                .chunks_exact(size)
                .map(bytemuck::pod_read_unaligned::<u32>)
                .collect(),
        };
        if let Some(&bad) = indices.iter().find(|&&i| i as usize >= self.vertex_count) {
            return Err(Error::InvalidData(format!(
                "index {} out of range for {} vertices",
                bad, self.vertex_count
            )));
        }
        Ok(indices)
    }

    /// Components of `semantic` per vertex, `None` when the mesh lacks it
    fn element(&self, semantic: VertexSemantic) -> Option<(&[u8], u32, &VertexElement)> {
        self.draw
            .vertex_buffers
            .iter()
            .zip(&self.vertex_bytes)
            .find_map(|(binding, bytes)| {
                binding
                    .layout
                    .find(semantic)
                    .map(|e| (&bytes[..], binding.layout.stride, e))
            })
    }

    /// Read `N` floats of `semantic` per vertex; components the element does
    /// not store take the value from `fill`
    fn read<const N: usize>(&self, semantic: VertexSemantic, fill: [f32; N]) -> Option<Vec<[f32; N]>> {
        let (bytes, stride, element) = self.element(semantic)?;
        let stored = element.format.components().min(N);
        let values = (0..self.vertex_count)
            .map(|i| {
                let base = i * stride as usize + element.offset as usize;
                let mut out = fill;
                for (c, value) in out.iter_mut().enumerate().take(stored) {
                    let at = base + c * 4;
                    *value = bytemuck::pod_read_unaligned::<f32>(&bytes[at..at + 4]);
                }
                out
            })
            .collect();
        Some(values)
    }

    fn positions(&self) -> Result<Vec<Point3d>> {
        let values = self
            .read::<3>(VertexSemantic::Position, [0.0; 3])
            .ok_or_else(|| Error::MissingAttribute("position".to_string()))?;
        Ok(values
            .into_iter()
            .map(|[x, y, z]| Point3d::new(x as f64, y as f64, z as f64))
            .collect())
    }

    fn uvs(&self) -> Vec<Vector2f> {
        self.read::<2>(VertexSemantic::TexCoord(0), [0.0; 2])
            .map(|v| v.into_iter().map(Vector2f::from).collect())
            .unwrap_or_default()
    }

    fn normals(&self) -> Vec<Vector3f> {
        self.read::<3>(VertexSemantic::Normal, [0.0; 3])
            .map(|v| v.into_iter().map(Vector3f::from).collect())
            .unwrap_or_default()
    }

    fn tangents(&self) -> Vec<Vector4f> {
        self.read::<4>(VertexSemantic::Tangent, [0.0, 0.0, 0.0, 1.0])
            .map(|v| v.into_iter().map(Vector4f::from).collect())
            .unwrap_or_default()
    }
}

fn index_binding(draw: &MeshDraw) -> Result<&meshlod_core::IndexBufferBinding> {
    draw.index_buffer
        .as_ref()
        .ok_or_else(|| Error::MissingAttribute("index buffer".to_string()))
}

fn position_element(draw: &MeshDraw) -> Result<&VertexElement> {
    draw.vertex_buffers
        .iter()
        .find_map(|b| b.layout.find(VertexSemantic::Position))
        .ok_or_else(|| Error::MissingAttribute("position".to_string()))
}

macro_rules! impl_mesh_data_source {
    ($ty:ident) => {
        impl MeshDataSource for $ty<'_> {
            fn vertex_count(&self) -> usize {
                self.buffers.vertex_count
            }

            fn index_count(&self) -> usize {
                self.buffers.index_count()
            }

            fn indices(&self) -> Result<Vec<u32>> {
                self.buffers.indices()
            }

            fn positions(&self) -> Result<Vec<Point3d>> {
                self.buffers.positions()
            }

            fn uvs(&self) -> Result<Vec<Vector2f>> {
                Ok(self.buffers.uvs())
            }

            fn normals(&self) -> Result<Vec<Vector3f>> {
                Ok(self.buffers.normals())
            }

            fn tangents(&self) -> Result<Vec<Vector4f>> {
                Ok(self.buffers.tangents())
            }
        }
    };
}

/// Mesh whose buffers all carry a CPU copy; decoded without copying
pub struct CpuMeshData<'a> {
    buffers: MeshBuffers<'a>,
}

impl<'a> CpuMeshData<'a> {
    pub fn new(mesh: &'a Mesh) -> Result<Self> {
        let draw = &mesh.draw;
        let index = index_binding(draw)?;
        let vertex_bytes = draw
            .vertex_buffers
            .iter()
            .map(|b| cpu_bytes(b).map(Cow::Borrowed))
            .collect::<Result<Vec<_>>>()?;
        let index_bytes = index
            .buffer
            .data
            .as_deref()
            .ok_or_else(|| Error::InvalidData(format!("index buffer {:?} has no CPU copy", index.buffer.handle)))?;
        Ok(Self {
            buffers: MeshBuffers::new(draw, vertex_bytes, Cow::Borrowed(index_bytes))?,
        })
    }
}

fn cpu_bytes(binding: &VertexBufferBinding) -> Result<&[u8]> {
    binding.buffer.data.as_deref().ok_or_else(|| {
        Error::InvalidData(format!(
            "vertex buffer {:?} has no CPU copy",
            binding.buffer.handle
        ))
    })
}

/// Mesh whose buffers live on the device; every buffer is read back once
pub struct GpuMeshData<'a> {
    buffers: MeshBuffers<'a>,
}

impl<'a> GpuMeshData<'a> {
    /// Blocking readback of every buffer the mesh references
    pub fn read_back(mesh: &'a Mesh, device: &dyn GraphicsDevice) -> Result<Self> {
        let draw = &mesh.draw;
        let index = index_binding(draw)?;
        position_element(draw)?;

        let vertex_bytes = draw
            .vertex_buffers
            .iter()
            .map(|b| device.read_buffer(b.buffer.handle).map(Cow::Owned))
            .collect::<Result<Vec<_>>>()?;
        let index_bytes = device.read_buffer(index.buffer.handle)?;
        log::debug!(
            "read back {} vertex buffer(s) and {} index bytes",
            vertex_bytes.len(),
            index_bytes.len()
        );
        Ok(Self {
            buffers: MeshBuffers::new(draw, vertex_bytes, Cow::Owned(index_bytes))?,
        })
    }
}

impl_mesh_data_source!(CpuMeshData);
impl_mesh_data_source!(GpuMeshData);

/// Pick the cheapest way to read `mesh`: CPU copies when every buffer has
/// one, device readback otherwise
pub fn mesh_data_source<'a>(mesh: &'a Mesh, device: &dyn GraphicsDevice) -> Result<Box<dyn MeshDataSource + 'a>> {
    if mesh.draw.is_cpu_resident() {
        Ok(Box::new(CpuMeshData::new(mesh)?))
    } else {
        Ok(Box::new(GpuMeshData::read_back(mesh, device)?))
    }
}

/// Gather a source into simplification-ready geometry
pub fn extract_geometry(source: &dyn MeshDataSource) -> Result<RawGeometry> {
    let geometry = RawGeometry {
        positions: source.positions()?,
        indices: source.indices()?,
        uvs: source.uvs()?,
        normals: source.normals()?,
        tangents: source.tangents()?,
    };
    geometry.validate()?;
    Ok(geometry)
}

/// Extract the geometry of `mesh`, reading back from `device` if needed
pub fn extract_mesh(mesh: &Mesh, device: &dyn GraphicsDevice) -> Result<RawGeometry> {
    let source = mesh_data_source(mesh, device)?;
    extract_geometry(source.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshlod_core::{
        BoundingBox, BufferHandle, BufferRef, HeadlessDevice, IndexBufferBinding, PrimitiveTopology,
        VertexFormat, VertexLayout, VertexPositionNormalTexture,
    };

    fn quad_vertices() -> Vec<VertexPositionNormalTexture> {
        vec![
            VertexPositionNormalTexture::new([0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0]),
            VertexPositionNormalTexture::new([1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0]),
            VertexPositionNormalTexture::new([1.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 1.0]),
            VertexPositionNormalTexture::new([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0]),
        ]
    }

    fn cpu_quad(indices: &[u16]) -> Mesh {
        let vertices = quad_vertices();
        let draw = MeshDraw {
            topology: PrimitiveTopology::TriangleList,
            vertex_buffers: vec![VertexBufferBinding {
                buffer: BufferRef::with_data(BufferHandle(1), bytemuck::cast_slice::<_, u8>(vertices.as_slice()).to_vec()),
                layout: VertexPositionNormalTexture::layout(),
                count: vertices.len(),
            }],
            index_buffer: Some(IndexBufferBinding {
                buffer: BufferRef::with_data(BufferHandle(2), bytemuck::cast_slice::<_, u8>(indices).to_vec()),
                format: IndexFormat::U16,
                count: indices.len(),
            }),
            draw_count: indices.len(),
        };
        Mesh::new(draw, BoundingBox::default())
    }

    #[test]
    fn test_cpu_extraction() {
        let mesh = cpu_quad(&[0, 1, 2, 0, 2, 3]);
        let source = CpuMeshData::new(&mesh).unwrap();
        assert_eq!(source.vertex_count(), 4);
        assert_eq!(source.index_count(), 6);

        let g = extract_geometry(&source).unwrap();
        assert_eq!(g.indices, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(g.positions[2], Point3d::new(1.0, 1.0, 0.0));
        assert_eq!(g.uvs[3], Vector2f::new(0.0, 1.0));
        assert_eq!(g.normals.len(), 4);
        assert!(g.tangents.is_empty());
    }

    #[test]
    fn test_gpu_readback_extraction() {
        let device = HeadlessDevice::new();
        let vertices = quad_vertices();
        let layout = VertexPositionNormalTexture::layout();
        let vb = device
            .create_vertex_buffer(bytemuck::cast_slice(vertices.as_slice()), &layout)
            .unwrap();
        let indices: [u16; 6] = [0, 1, 2, 0, 2, 3];
        let ib = device
            .create_index_buffer(bytemuck::cast_slice(&indices[..]), IndexFormat::U16)
            .unwrap();
        let mesh = Mesh::new(
            MeshDraw {
                topology: PrimitiveTopology::TriangleList,
                vertex_buffers: vec![VertexBufferBinding {
                    buffer: BufferRef::device_only(vb),
                    layout,
                    count: 4,
                }],
                index_buffer: Some(IndexBufferBinding {
                    buffer: BufferRef::device_only(ib),
                    format: IndexFormat::U16,
                    count: 6,
                }),
                draw_count: 6,
            },
            BoundingBox::default(),
        );

        assert!(CpuMeshData::new(&mesh).is_err());
        let g = extract_mesh(&mesh, &device).unwrap();
        assert_eq!(g, extract_mesh(&cpu_quad(&indices), &device).unwrap());
    }

    #[test]
    fn test_missing_normals() {
        let layout = VertexLayout::packed(&[(VertexSemantic::Position, VertexFormat::Float32x3)]);
        let positions: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let indices: [u32; 3] = [0, 1, 2];
        let mesh = Mesh::new(
            MeshDraw {
                topology: PrimitiveTopology::TriangleList,
                vertex_buffers: vec![VertexBufferBinding {
                    buffer: BufferRef::with_data(BufferHandle(1), bytemuck::cast_slice::<_, u8>(&positions[..]).to_vec()),
                    layout,
                    count: 3,
                }],
                index_buffer: Some(IndexBufferBinding {
                    buffer: BufferRef::with_data(BufferHandle(2), bytemuck::cast_slice::<_, u8>(&indices[..]).to_vec()),
                    format: IndexFormat::U32,
                    count: 3,
                }),
                draw_count: 3,
            },
            BoundingBox::default(),
        );
        let g = extract_mesh(&mesh, &HeadlessDevice::new()).unwrap();
        assert!(g.normals.is_empty() && g.uvs.is_empty() && g.tangents.is_empty());
        assert_eq!(g.triangle_count(), 1);
    }

    #[test]
    fn test_missing_index_buffer() {
        let mut mesh = cpu_quad(&[0, 1, 2]);
        mesh.draw.index_buffer = None;
        assert!(matches!(CpuMeshData::new(&mesh), Err(Error::MissingAttribute(_))));
    }

    #[test]
    fn test_missing_position() {
        let mut mesh = cpu_quad(&[0, 1, 2]);
        mesh.draw.vertex_buffers[0].layout.elements.retain(|e| e.semantic != VertexSemantic::Position);
        assert!(matches!(CpuMeshData::new(&mesh), Err(Error::MissingAttribute(_))));
    }

    #[test]
    fn test_index_out_of_range() {
        let mesh = cpu_quad(&[0, 1, 9]);
        let source = CpuMeshData::new(&mesh).unwrap();
        assert!(matches!(source.indices(), Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_element_past_stride() {
        let mut layout = VertexLayout::packed(&[(VertexSemantic::Position, VertexFormat::Float32x3)]);
        layout.elements[0].offset = 8;
        let positions: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let indices: [u16; 3] = [0, 1, 2];
        let mesh = Mesh::new(
            MeshDraw {
                topology: PrimitiveTopology::TriangleList,
                vertex_buffers: vec![VertexBufferBinding {
                    buffer: BufferRef::with_data(BufferHandle(1), bytemuck::cast_slice::<_, u8>(&positions[..]).to_vec()),
                    layout,
                    count: 3,
                }],
                index_buffer: Some(IndexBufferBinding {
                    buffer: BufferRef::with_data(BufferHandle(2), bytemuck::cast_slice::<_, u8>(&indices[..]).to_vec()),
                    format: IndexFormat::U16,
                    count: 3,
                }),
                draw_count: 3,
            },
            BoundingBox::default(),
        );
        assert!(matches!(
            extract_mesh(&mesh, &HeadlessDevice::new()),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn test_short_vertex_buffer() {
        let mut mesh = cpu_quad(&[0, 1, 2]);
        mesh.draw.vertex_buffers[0].count = 10;
        assert!(matches!(CpuMeshData::new(&mesh), Err(Error::InvalidData(_))));
    }
}
