//! Renderer-ready buffer assembly

use meshlod_core::{
    BufferRef, Error, GraphicsDevice, IndexBufferBinding, IndexFormat, Mesh, MeshDraw,
    PrimitiveTopology, RawGeometry, Result, VertexBufferBinding, VertexFormat, VertexLayout,
    VertexSemantic,
};

/// Turns simplified geometry back into a drawable mesh.
///
/// Vertices are interleaved as position, normal, UV0 and tangent, each only
/// when the geometry carries it. The index width follows the index count and
/// is checked against the device before any buffer is created.
pub struct BufferAssembler<'d> {
    device: &'d dyn GraphicsDevice,
    retain_cpu_copy: bool,
}

impl<'d> BufferAssembler<'d> {
    pub fn new(device: &'d dyn GraphicsDevice) -> Self {
        Self {
            device,
            retain_cpu_copy: true,
        }
    }

    /// Keep a CPU copy of the uploaded bytes on the produced buffers
    pub fn with_cpu_copy(mut self, retain: bool) -> Self {
        self.retain_cpu_copy = retain;
        self
    }

    /// Interleaved layout for the attributes present in `geometry`
    pub fn vertex_layout(geometry: &RawGeometry) -> VertexLayout {
        let mut elements = vec![(VertexSemantic::Position, VertexFormat::Float32x3)];
        if geometry.has_normals() {
            elements.push((VertexSemantic::Normal, VertexFormat::Float32x3));
        }
        if geometry.has_uvs() {
            elements.push((VertexSemantic::TexCoord(0), VertexFormat::Float32x2));
        }
        if geometry.has_tangents() {
            elements.push((VertexSemantic::Tangent, VertexFormat::Float32x4));
        }
        VertexLayout::packed(&elements)
    }

    /// Vertex bytes matching [`Self::vertex_layout`]
    pub fn interleave(geometry: &RawGeometry) -> Vec<u8> {
        let stride = Self::vertex_layout(geometry).stride as usize / 4;
        let mut floats = Vec::with_capacity(geometry.vertex_count() * stride);
        for i in 0..geometry.vertex_count() {
            let p = geometry.positions[i];
            floats.extend_from_slice(&[p.x as f32, p.y as f32, p.z as f32]);
            if let Some(n) = geometry.normals.get(i) {
                floats.extend_from_slice(n.as_slice());
            }
            if let Some(uv) = geometry.uvs.get(i) {
                floats.extend_from_slice(uv.as_slice());
            }
            if let Some(t) = geometry.tangents.get(i) {
                floats.extend_from_slice(t.as_slice());
            }
        }
        bytemuck::cast_slice(&floats).to_vec()
    }

    /// Index bytes at `format` width
    pub fn index_bytes(geometry: &RawGeometry, format: IndexFormat) -> Result<Vec<u8>> {
        match format {
            IndexFormat::U32 => Ok(bytemuck::cast_slice(&geometry.indices).to_vec()),
            IndexFormat::U16 => {
                let narrow = geometry
                    .indices
                    .iter()
                    .map(|&i| {
                        u16::try_from(i).map_err(|_| {
                            Error::InvalidData(format!("index {} does not fit a 16-bit index buffer", i))
                        })
                    })
                    .collect::<Result<Vec<u16>>>()?;
                Ok(bytemuck::cast_slice(&narrow).to_vec())
            }
        }
    }

    /// Build the mesh replacing `source`, keeping its bounds, name and material
    pub fn assemble(&self, geometry: &RawGeometry, source: &Mesh) -> Result<Mesh> {
        if source.draw.topology != PrimitiveTopology::TriangleList {
            return Err(Error::UnsupportedTopology(source.draw.topology));
        }
        geometry.validate()?;

        let index_count = geometry.index_count();
        let format = IndexFormat::for_index_count(index_count);
        if format == IndexFormat::U32 && !self.device.supports_32bit_indices() {
            return Err(Error::UnsupportedHardware { index_count });
        }
        let index_bytes = Self::index_bytes(geometry, format)?;

        let layout = Self::vertex_layout(geometry);
        let vertex_bytes = Self::interleave(geometry);

        let vertex_handle = self.device.create_vertex_buffer(&vertex_bytes, &layout)?;
        let index_handle = self.device.create_index_buffer(&index_bytes, format)?;
        log::trace!(
            "assembled {} vertices (stride {}) and {} {:?} indices",
            geometry.vertex_count(),
            layout.stride,
            index_count,
            format
        );

        let (vertex_buffer, index_buffer) = if self.retain_cpu_copy {
            (
                BufferRef::with_data(vertex_handle, vertex_bytes),
                BufferRef::with_data(index_handle, index_bytes),
            )
        } else {
            (
                BufferRef::device_only(vertex_handle),
                BufferRef::device_only(index_handle),
            )
        };

        let draw = MeshDraw {
            topology: PrimitiveTopology::TriangleList,
            vertex_buffers: vec![VertexBufferBinding {
                buffer: vertex_buffer,
                layout,
                count: geometry.vertex_count(),
            }],
            index_buffer: Some(IndexBufferBinding {
                buffer: index_buffer,
                format,
                count: index_count,
            }),
            draw_count: index_count,
        };

        Ok(Mesh {
            name: source.name.clone(),
            draw,
            bounding_box: source.bounding_box,
            material_index: source.material_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshlod_core::{BoundingBox, HeadlessDevice, Point3d, Point3f, Vector2f, Vector3f, Vector4f};

    fn triangle() -> RawGeometry {
        RawGeometry::new(
            vec![
                Point3d::new(0.0, 0.0, 0.0),
                Point3d::new(1.0, 0.0, 0.0),
                Point3d::new(0.0, 1.0, 0.0),
            ],
            vec![0, 1, 2],
        )
    }

    fn source_mesh(topology: PrimitiveTopology) -> Mesh {
        let draw = MeshDraw {
            topology,
            vertex_buffers: Vec::new(),
            index_buffer: None,
            draw_count: 0,
        };
        Mesh::new(
            draw,
            BoundingBox::new(Point3f::new(-5.0, -5.0, -5.0), Point3f::new(5.0, 5.0, 5.0)),
        )
        .with_name("hull")
        .with_material(2)
    }

    #[test]
    fn test_layout_follows_attributes() {
        let layout = BufferAssembler::vertex_layout(&triangle());
        assert_eq!(layout.stride, 12);
        assert_eq!(layout.elements.len(), 1);

        let g = triangle()
            .with_uvs(vec![Vector2f::zeros(); 3])
            .with_normals(vec![Vector3f::z(); 3])
            .with_tangents(vec![Vector4f::new(1.0, 0.0, 0.0, 1.0); 3]);
        let layout = BufferAssembler::vertex_layout(&g);
        assert_eq!(layout.stride, 48);
        assert_eq!(layout.find(VertexSemantic::Normal).unwrap().offset, 12);
        assert_eq!(layout.find(VertexSemantic::TexCoord(0)).unwrap().offset, 24);
        assert_eq!(layout.find(VertexSemantic::Tangent).unwrap().offset, 32);
        assert_eq!(BufferAssembler::interleave(&g).len(), 3 * 48);
    }

    #[test]
    fn test_interleave_values() {
        let g = triangle().with_normals(vec![Vector3f::z(); 3]);
        let bytes = BufferAssembler::interleave(&g);
        let floats: Vec<f32> = bytes
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned::<f32>)
            .collect();
        assert_eq!(&floats[6..12], &[1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_assemble_copies_source_metadata() {
        let device = HeadlessDevice::new();
        let source = source_mesh(PrimitiveTopology::TriangleList);
        let mesh = BufferAssembler::new(&device).assemble(&triangle(), &source).unwrap();

        assert_eq!(mesh.bounding_box, source.bounding_box);
        assert_eq!(mesh.material_index, 2);
        assert_eq!(mesh.name.as_deref(), Some("hull"));
        assert_eq!(mesh.draw.draw_count, 3);
        assert_eq!(mesh.draw.index_count(), 3);
        assert_eq!(mesh.draw.index_buffer.as_ref().unwrap().format, IndexFormat::U16);
        assert!(mesh.draw.is_cpu_resident());
        assert_eq!(device.buffer_count(), 2);
    }

    #[test]
    fn test_device_only_buffers() {
        let device = HeadlessDevice::new();
        let mesh = BufferAssembler::new(&device)
            .with_cpu_copy(false)
            .assemble(&triangle(), &source_mesh(PrimitiveTopology::TriangleList))
            .unwrap();
        assert!(!mesh.draw.is_cpu_resident());
        let handle = mesh.draw.index_buffer.as_ref().unwrap().buffer.handle;
        assert_eq!(device.read_buffer(handle).unwrap(), vec![0, 0, 1, 0, 2, 0]);
    }

    #[test]
    fn test_rejects_non_triangle_topology() {
        let device = HeadlessDevice::new();
        let result = BufferAssembler::new(&device).assemble(&triangle(), &source_mesh(PrimitiveTopology::LineList));
        assert!(matches!(result, Err(Error::UnsupportedTopology(PrimitiveTopology::LineList))));
    }

    #[test]
    fn test_wide_indices_need_hardware_support() {
        let n = IndexFormat::U16_LIMIT;
        let g = RawGeometry::new(
            vec![Point3d::new(0.0, 0.0, 0.0), Point3d::new(1.0, 0.0, 0.0), Point3d::new(0.0, 1.0, 0.0)],
            (0..n as u32 + 2).map(|i| i % 3).collect(),
        );
        assert_eq!(g.index_count() % 3, 0);

        let limited = HeadlessDevice::with_32bit_indices(false);
        let result = BufferAssembler::new(&limited).assemble(&g, &source_mesh(PrimitiveTopology::TriangleList));
        assert!(matches!(result, Err(Error::UnsupportedHardware { index_count }) if index_count == n + 2));
        assert_eq!(limited.buffer_count(), 0);

        let device = HeadlessDevice::new();
        let mesh = BufferAssembler::new(&device)
            .assemble(&g, &source_mesh(PrimitiveTopology::TriangleList))
            .unwrap();
        assert_eq!(mesh.draw.index_buffer.as_ref().unwrap().format, IndexFormat::U32);
    }

    #[test]
    fn test_empty_geometry() {
        let device = HeadlessDevice::new();
        let mesh = BufferAssembler::new(&device)
            .assemble(&RawGeometry::default(), &source_mesh(PrimitiveTopology::TriangleList))
            .unwrap();
        assert_eq!(mesh.draw.draw_count, 0);
        assert_eq!(mesh.draw.vertex_count(), 0);
        assert_eq!(mesh.triangle_count(), 0);
    }
}
