//! Sets of LOD levels over one base model

use crate::config::LodConfig;
use crate::descriptor::{LodDescriptor, LodGenerator, LodReport};
use meshlod_core::{AssetReference, Error, GraphicsDevice, Model, ModelResolver, Result};
use rayon::prelude::*;

/// Levels of detail that all reference the same base model
#[derive(Debug, Clone, PartialEq)]
pub struct LodChain {
    base: AssetReference,
    levels: Vec<LodDescriptor>,
}

impl LodChain {
    pub fn new(base: AssetReference) -> Self {
        Self {
            base,
            levels: Vec::new(),
        }
    }

    /// Chain of descriptors; every one must reference `base`
    pub fn from_levels(base: AssetReference, levels: Vec<LodDescriptor>) -> Result<Self> {
        let mut chain = Self::new(base);
        for level in levels {
            chain.push(level)?;
        }
        Ok(chain)
    }

    pub fn push(&mut self, descriptor: LodDescriptor) -> Result<()> {
        if descriptor.source.as_ref() != Some(&self.base) {
            return Err(Error::InvalidData(format!(
                "LOD level {} does not reference base model {}",
                descriptor.level, self.base
            )));
        }
        self.levels.push(descriptor);
        Ok(())
    }

    pub fn base(&self) -> &AssetReference {
        &self.base
    }

    pub fn levels(&self) -> &[LodDescriptor] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Generate every level in order, resolving the base model once
    pub fn generate_all(
        &self,
        resolver: &dyn ModelResolver,
        device: &dyn GraphicsDevice,
        config: &LodConfig,
    ) -> Result<Vec<(Model, LodReport)>> {
        let generator = LodGenerator::new(resolver, device).with_config(config.clone());
        let base = resolver.resolve(&self.base)?;
        self.levels
            .iter()
            .map(|level| generator.generate_from_model(level, &base))
            .collect()
    }

    /// Generate levels concurrently on the rayon pool; output keeps level order
    pub fn generate_parallel(
        &self,
        resolver: &dyn ModelResolver,
        device: &dyn GraphicsDevice,
        config: &LodConfig,
    ) -> Result<Vec<(Model, LodReport)>> {
        let generator = LodGenerator::new(resolver, device).with_config(config.clone());
        let base = resolver.resolve(&self.base)?;
        log::debug!("generating {} LOD levels of {} in parallel", self.levels.len(), self.base);
        self.levels
            .par_iter()
            .map(|level| generator.generate_from_model(level, &base))
            .collect()
    }
}
