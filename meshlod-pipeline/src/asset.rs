//! Persisted LOD assets
//!
//! Only the parameters of a level are stored; the geometry is regenerated
//! from the source model whenever it is needed.

use crate::chain::LodChain;
use crate::descriptor::LodDescriptor;
use meshlod_core::{AssetReference, MaterialSlot, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_level() -> u32 {
    1
}

fn default_quality() -> f32 {
    0.5
}

/// Build-time description of one LOD level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LodAsset {
    #[serde(default)]
    pub source: Option<AssetReference>,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default = "default_quality")]
    pub quality: f32,
    #[serde(default)]
    pub materials: Vec<MaterialSlot>,
}

impl Default for LodAsset {
    fn default() -> Self {
        Self {
            source: None,
            level: default_level(),
            quality: default_quality(),
            materials: Vec::new(),
        }
    }
}

impl LodAsset {
    pub fn new(source: AssetReference, level: u32) -> Self {
        Self {
            source: Some(source),
            level,
            ..Default::default()
        }
    }

    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = quality;
        self
    }

    /// Descriptor the runtime generates this level from
    pub fn compile(&self) -> LodDescriptor {
        LodDescriptor {
            level: self.level,
            quality: self.quality,
            source: self.source.clone(),
            materials: self.materials.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

/// A LOD asset and the location it is stored under
#[derive(Debug, Clone, PartialEq)]
pub struct LodAssetItem {
    pub location: String,
    pub asset: LodAsset,
}

/// LOD assets created for one base model
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedLods {
    pub base: AssetReference,
    /// Levels in ascending order
    pub items: Vec<LodAssetItem>,
}

impl ImportedLods {
    /// Where the base model finds its levels, in level order
    pub fn lod_locations(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.location.as_str()).collect()
    }

    /// Asset stored at `location`, if it is one of this model's levels
    pub fn find(&self, location: &str) -> Option<&LodAsset> {
        self.items
            .iter()
            .find(|item| item.location == location)
            .map(|item| &item.asset)
    }

    /// Chain generating every imported level from the base model
    pub fn chain(&self) -> Result<LodChain> {
        LodChain::from_levels(
            self.base.clone(),
            self.items.iter().map(|item| item.asset.compile()).collect(),
        )
    }
}

/// Create assets for levels `1..=levels` of an imported model.
///
/// Each level references `source`, copies `materials` and is stored at
/// `"{model_location}_LOD{level}"`. The result keeps the base reference so
/// the model's levels can be listed and generated together.
pub fn import_lods(
    model_location: &str,
    source: &AssetReference,
    materials: &[MaterialSlot],
    levels: u32,
) -> ImportedLods {
    let items = (1..=levels)
        .map(|level| {
            let mut asset = LodAsset::new(source.clone(), level);
            asset.materials = materials.to_vec();
            LodAssetItem {
                location: format!("{}_LOD{}", model_location, level),
                asset,
            }
        })
        .collect();
    ImportedLods {
        base: source.clone(),
        items,
    }
}
