//! Models, material slots and deferred asset references

use crate::error::{Error, Result};
use crate::mesh::Mesh;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Deferred reference to an asset that may not be loaded yet.
///
/// Only an identifier and a logical location; resolving it is the job of a
/// resolver at the point of use.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetReference {
    pub id: u64,
    pub location: String,
}

impl AssetReference {
    pub fn new(id: u64, location: impl Into<String>) -> Self {
        Self {
            id,
            location: location.into(),
        }
    }
}

impl fmt::Display for AssetReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.location)
    }
}

/// A named material slot; the material itself is referenced, never owned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialSlot {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<AssetReference>,
}

impl MaterialSlot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            material: None,
        }
    }

    pub fn with_material(mut self, material: AssetReference) -> Self {
        self.material = Some(material);
        self
    }
}

/// An ordered list of meshes plus their material slots
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub meshes: Vec<Mesh>,
    pub materials: Vec<MaterialSlot>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_meshes(meshes: Vec<Mesh>, materials: Vec<MaterialSlot>) -> Self {
        Self { meshes, materials }
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> usize {
        self.meshes.push(mesh);
        self.meshes.len() - 1
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Total triangle count over all triangle-list meshes
    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(Mesh::triangle_count).sum()
    }

    /// Material slot used by `mesh`
    pub fn material_for(&self, mesh: &Mesh) -> Result<&MaterialSlot> {
        self.materials.get(mesh.material_index).ok_or_else(|| {
            Error::MissingAttribute(format!(
                "material slot {} is out of range ({} materials)",
                mesh.material_index,
                self.materials.len()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{BoundingBox, MeshDraw, PrimitiveTopology};

    fn empty_mesh(material_index: usize) -> Mesh {
        Mesh::new(
            MeshDraw {
                topology: PrimitiveTopology::TriangleList,
                vertex_buffers: Vec::new(),
                index_buffer: None,
                draw_count: 6,
            },
            BoundingBox::default(),
        )
        .with_material(material_index)
    }

    #[test]
    fn test_material_lookup() {
        let model = Model::from_meshes(
            vec![empty_mesh(0), empty_mesh(3)],
            vec![MaterialSlot::new("Material")],
        );
        assert_eq!(model.material_for(&model.meshes[0]).unwrap().name, "Material");
        assert!(matches!(
            model.material_for(&model.meshes[1]),
            Err(Error::MissingAttribute(_))
        ));
        assert_eq!(model.triangle_count(), 4);
    }

    #[test]
    fn test_reference_serde() {
        let slot = MaterialSlot::new("Body").with_material(AssetReference::new(7, "materials/body"));
        let json = serde_json::to_string(&slot).unwrap();
        let back: MaterialSlot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, slot);
        assert_eq!(AssetReference::new(7, "materials/body").to_string(), "7:materials/body");
    }
}
