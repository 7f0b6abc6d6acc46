//! LOD descriptors and per-level generation
//!
//! A [`LodDescriptor`] only records what a level is made of: the source
//! model reference, the level number, the quality factor and the material
//! list. Geometry is produced on demand by running every mesh of the source
//! through extraction, budgeting, simplification and buffer assembly.

use crate::assemble::BufferAssembler;
use crate::config::LodConfig;
use crate::extract::extract_mesh;
use meshlod_core::{
    AssetReference, Error, GraphicsDevice, MaterialSlot, Mesh, Model, ModelResolver,
    PrimitiveTopology, Result,
};
use meshlod_simplification::{
    clamp_quality, target_triangles, CancelFlag, EdgeCollapseSimplifier, MeshSimplifier, Termination,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Parameters of one level of detail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LodDescriptor {
    /// 1-based level number
    pub level: u32,
    /// Fraction of triangles to keep; clamped to `[0, 1]` when used
    pub quality: f32,
    pub source: Option<AssetReference>,
    pub materials: Vec<MaterialSlot>,
}

impl LodDescriptor {
    pub fn new(level: u32, quality: f32, source: AssetReference) -> Self {
        Self {
            level,
            quality,
            source: Some(source),
            materials: Vec::new(),
        }
    }

    pub fn with_materials(mut self, materials: Vec<MaterialSlot>) -> Self {
        self.materials = materials;
        self
    }

    /// Materialize this level with default settings
    pub fn generate(&self, resolver: &dyn ModelResolver, device: &dyn GraphicsDevice) -> Result<Model> {
        LodGenerator::new(resolver, device).generate(self)
    }

    /// Materialize this level, also reporting per-mesh statistics
    pub fn generate_with_report(
        &self,
        resolver: &dyn ModelResolver,
        device: &dyn GraphicsDevice,
    ) -> Result<(Model, LodReport)> {
        LodGenerator::new(resolver, device).generate_with_report(self)
    }
}

/// Outcome of simplifying one mesh
#[derive(Debug, Clone, PartialEq)]
pub struct MeshReport {
    pub mesh: usize,
    pub original_triangles: usize,
    pub target_triangles: usize,
    pub result_triangles: usize,
    pub collapses: usize,
    pub termination: Termination,
}

impl MeshReport {
    pub fn reached_target(&self) -> bool {
        self.result_triangles <= self.target_triangles
    }
}

/// Statistics and warnings of one generated level
#[derive(Debug)]
pub struct LodReport {
    pub level: u32,
    /// Quality after clamping
    pub quality: f32,
    pub meshes: Vec<MeshReport>,
    /// Non-fatal problems, e.g. [`Error::DegenerateResult`]
    pub warnings: Vec<Error>,
}

impl LodReport {
    fn new(level: u32, quality: f32) -> Self {
        Self {
            level,
            quality,
            meshes: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn original_triangles(&self) -> usize {
        self.meshes.iter().map(|m| m.original_triangles).sum()
    }

    pub fn result_triangles(&self) -> usize {
        self.meshes.iter().map(|m| m.result_triangles).sum()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Runs descriptors against a resolver and device
pub struct LodGenerator<'a> {
    resolver: &'a dyn ModelResolver,
    device: &'a dyn GraphicsDevice,
    config: LodConfig,
    cancel: Option<CancelFlag>,
}

impl<'a> LodGenerator<'a> {
    pub fn new(resolver: &'a dyn ModelResolver, device: &'a dyn GraphicsDevice) -> Self {
        Self {
            resolver,
            device,
            config: LodConfig::default(),
            cancel: None,
        }
    }

    pub fn with_config(mut self, config: LodConfig) -> Self {
        self.config = config;
        self
    }

    /// Stop simplification early (best effort) once `flag` is raised
    pub fn with_cancel(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn config(&self) -> &LodConfig {
        &self.config
    }

    pub fn generate(&self, descriptor: &LodDescriptor) -> Result<Model> {
        self.generate_with_report(descriptor).map(|(model, _)| model)
    }

    pub fn generate_with_report(&self, descriptor: &LodDescriptor) -> Result<(Model, LodReport)> {
        let source = self
            .resolve(descriptor)
            .map_err(|e| e.at_level(descriptor.level))?;
        self.generate_from_model(descriptor, &source)
    }

    /// Look up the descriptor's source model
    pub fn resolve(&self, descriptor: &LodDescriptor) -> Result<Arc<Model>> {
        let reference = descriptor
            .source
            .as_ref()
            .ok_or_else(|| Error::MissingSource("no source model set".to_string()))?;
        self.resolver.resolve(reference)
    }

    /// Generate a level from an already resolved source model.
    ///
    /// Fails on the first mesh that fails; no partial model is returned.
    pub fn generate_from_model(&self, descriptor: &LodDescriptor, source: &Model) -> Result<(Model, LodReport)> {
        let level = descriptor.level;
        let mut report = LodReport::new(level, clamp_quality(descriptor.quality));

        if !descriptor.materials.is_empty() && descriptor.materials.len() != source.materials.len() {
            let warning = Error::InvalidData(format!(
                "descriptor lists {} materials, source model has {}",
                descriptor.materials.len(),
                source.materials.len()
            ));
            log::warn!("[LOD][{}] {}", level, warning);
            report.warnings.push(warning);
        }

        let mut simplifier = EdgeCollapseSimplifier::with_config(self.config.simplifier.clone());
        if let Some(flag) = &self.cancel {
            simplifier = simplifier.with_cancel(flag.clone());
        }
        let assembler = BufferAssembler::new(self.device).with_cpu_copy(self.config.retain_cpu_copy);

        let mut meshes = Vec::with_capacity(source.meshes.len());
        for (index, mesh) in source.meshes.iter().enumerate() {
            let lod_mesh = self
                .generate_mesh(descriptor, source, index, mesh, &simplifier, &assembler, &mut report)
                .map_err(|e| e.at_level(level))?;
            meshes.push(lod_mesh);
        }

        log::info!(
            "[LOD][{}] Generated {} meshes => Triangles {} to {}",
            level,
            meshes.len(),
            report.original_triangles(),
            report.result_triangles()
        );
        Ok((Model::from_meshes(meshes, source.materials.clone()), report))
    }

    #[allow(clippy::too_many_arguments)]
    fn generate_mesh(
        &self,
        descriptor: &LodDescriptor,
        source: &Model,
        index: usize,
        mesh: &Mesh,
        simplifier: &EdgeCollapseSimplifier,
        assembler: &BufferAssembler<'_>,
        report: &mut LodReport,
    ) -> Result<Mesh> {
        let level = descriptor.level;
        if mesh.draw.topology != PrimitiveTopology::TriangleList {
            return Err(Error::UnsupportedTopology(mesh.draw.topology));
        }
        if !source.materials.is_empty() {
            source.material_for(mesh)?;
        }

        let geometry = extract_mesh(mesh, self.device)?;
        let original = geometry.triangle_count();
        let quality = clamp_quality(descriptor.quality);
        let target = target_triangles(original, quality);
        log::info!(
            "[LOD][{}] Start generate => Quality {} => Triangles {} to {}",
            level,
            quality,
            original,
            target
        );

        if target == 0 && original > 0 {
            let degenerate = Error::DegenerateResult { level, mesh: index };
            if self.config.fail_on_degenerate {
                return Err(degenerate);
            }
            log::warn!("[LOD][{}] {}", level, degenerate);
            report.warnings.push(degenerate);
        }

        let result = simplifier.simplify(&geometry, target)?;
        if !result.reached_target() {
            log::warn!(
                "[LOD][{}] mesh {} stopped at {} triangles, target {} ({})",
                level,
                index,
                result.triangle_count(),
                target,
                result.termination
            );
        }

        let lod_mesh = assembler.assemble(&result.geometry, mesh)?;
        log::info!("[LOD][{}] Total triangle count {}", level, lod_mesh.triangle_count());

        report.meshes.push(MeshReport {
            mesh: index,
            original_triangles: original,
            target_triangles: target,
            result_triangles: result.triangle_count(),
            collapses: result.collapses,
            termination: result.termination,
        });
        Ok(lod_mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ModelStore;
    use meshlod_core::{
        BoundingBox, BufferHandle, BufferRef, HeadlessDevice, IndexBufferBinding, IndexFormat, MeshDraw,
        VertexBufferBinding, VertexFormat, VertexLayout, VertexSemantic,
    };

    /// Flat `w` x `h` vertex grid as a CPU-resident mesh
    fn grid_mesh(w: usize, h: usize) -> Mesh {
        let mut positions = Vec::with_capacity(w * h * 3);
        for y in 0..h {
            for x in 0..w {
                positions.extend_from_slice(&[x as f32, y as f32, 0.0]);
            }
        }
        let mut indices: Vec<u16> = Vec::new();
        for y in 0..(h - 1) {
            for x in 0..(w - 1) {
                let tl = (y * w + x) as u16;
                let bl = tl + w as u16;
                indices.extend_from_slice(&[tl, bl, tl + 1, tl + 1, bl, bl + 1]);
            }
        }
        let draw = MeshDraw {
            topology: PrimitiveTopology::TriangleList,
            vertex_buffers: vec![VertexBufferBinding {
                buffer: BufferRef::with_data(BufferHandle(1), bytemuck::cast_slice::<f32, u8>(&positions).to_vec()),
                layout: VertexLayout::packed(&[(VertexSemantic::Position, VertexFormat::Float32x3)]),
                count: w * h,
            }],
            index_buffer: Some(IndexBufferBinding {
                buffer: BufferRef::with_data(BufferHandle(2), bytemuck::cast_slice::<u16, u8>(&indices).to_vec()),
                format: IndexFormat::U16,
                count: indices.len(),
            }),
            draw_count: indices.len(),
        };
        Mesh::new(draw, BoundingBox::default())
    }

    fn store_with(model: Model) -> (ModelStore, AssetReference) {
        let store = ModelStore::new();
        let reference = AssetReference::new(1, "models/grid");
        store.insert(reference.clone(), model).unwrap();
        (store, reference)
    }

    #[test]
    fn test_missing_source() {
        let store = ModelStore::new();
        let device = HeadlessDevice::new();
        let mut descriptor = LodDescriptor::new(2, 0.5, AssetReference::new(9, "nowhere"));
        let err = descriptor.generate(&store, &device).unwrap_err();
        assert!(matches!(err, Error::Lod { level: 2, .. }));
        assert!(matches!(err.root(), Error::MissingSource(_)));

        descriptor.source = None;
        let err = descriptor.generate(&store, &device).unwrap_err();
        assert!(matches!(err.root(), Error::MissingSource(_)));
    }

    #[test]
    fn test_report_counts() {
        let (store, reference) = store_with(Model::from_meshes(vec![grid_mesh(6, 6)], Vec::new()));
        let device = HeadlessDevice::new();
        let (model, report) = LodDescriptor::new(1, 0.5, reference)
            .generate_with_report(&store, &device)
            .unwrap();

        assert_eq!(model.mesh_count(), 1);
        assert_eq!(report.meshes.len(), 1);
        assert_eq!(report.original_triangles(), 50);
        assert_eq!(report.meshes[0].target_triangles, 25);
        assert!(report.meshes[0].reached_target());
        assert_eq!(model.triangle_count(), report.result_triangles());
        assert!(!report.has_warnings());
    }

    #[test]
    fn test_degenerate_can_be_fatal() {
        let (store, reference) = store_with(Model::from_meshes(vec![grid_mesh(4, 4)], Vec::new()));
        let device = HeadlessDevice::new();
        let generator = LodGenerator::new(&store, &device).with_config(LodConfig {
            fail_on_degenerate: true,
            ..Default::default()
        });
        let err = generator.generate(&LodDescriptor::new(3, 0.0, reference)).unwrap_err();
        assert!(matches!(err.root(), Error::DegenerateResult { level: 3, mesh: 0 }));
    }

    #[test]
    fn test_material_index_out_of_range() {
        let model = Model::from_meshes(
            vec![grid_mesh(3, 3).with_material(4)],
            vec![MaterialSlot::new("hull")],
        );
        let (store, reference) = store_with(model);
        let err = LodDescriptor::new(1, 0.5, reference)
            .generate(&store, &HeadlessDevice::new())
            .unwrap_err();
        assert!(matches!(err.root(), Error::MissingAttribute(_)));
    }

    #[test]
    fn test_material_count_mismatch_warns() {
        let model = Model::from_meshes(vec![grid_mesh(3, 3)], vec![MaterialSlot::new("hull")]);
        let (store, reference) = store_with(model);
        let descriptor = LodDescriptor::new(1, 1.0, reference)
            .with_materials(vec![MaterialSlot::new("a"), MaterialSlot::new("b")]);
        let (model, report) = descriptor
            .generate_with_report(&store, &HeadlessDevice::new())
            .unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(model.materials, vec![MaterialSlot::new("hull")]);
    }

    #[test]
    fn test_cancelled_generation_keeps_geometry() {
        let (store, reference) = store_with(Model::from_meshes(vec![grid_mesh(6, 6)], Vec::new()));
        let device = HeadlessDevice::new();
        let flag = CancelFlag::new();
        flag.cancel();
        let (model, report) = LodGenerator::new(&store, &device)
            .with_cancel(flag)
            .generate_with_report(&LodDescriptor::new(1, 0.2, reference))
            .unwrap();
        assert_eq!(report.meshes[0].termination, Termination::Cancelled);
        assert_eq!(model.triangle_count(), 50);
    }

    #[test]
    fn test_descriptor_json() {
        let descriptor = LodDescriptor::new(2, 0.25, AssetReference::new(3, "models/rock"))
            .with_materials(vec![MaterialSlot::new("stone")]);
        let json = serde_json::to_string(&descriptor).unwrap();
        let back: LodDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, descriptor);
    }
}
