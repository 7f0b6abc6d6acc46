//! LOD generation settings

use meshlod_core::Result;
use meshlod_simplification::{EdgeCollapseSimplifier, SimplifierConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings shared by every level generated with them.
///
/// Loadable from TOML; every field is optional there:
///
/// ```toml
/// retain_cpu_copy = false
///
/// [simplifier]
/// boundary_weight = 50.0
/// max_collapses = 100000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodConfig {
    pub simplifier: SimplifierConfig,
    /// Keep CPU copies of the generated buffers (needed to re-extract them
    /// without a device readback)
    pub retain_cpu_copy: bool,
    /// Treat a zero triangle budget as an error instead of a warning
    pub fail_on_degenerate: bool,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            simplifier: SimplifierConfig::default(),
            retain_cpu_copy: true,
            fail_on_degenerate: false,
        }
    }
}

impl LodConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Simplifier configured from these settings
    pub fn simplifier(&self) -> EdgeCollapseSimplifier {
        EdgeCollapseSimplifier::with_config(self.simplifier.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshlod_core::Error;

    #[test]
    fn test_defaults() {
        let config = LodConfig::default();
        assert!(config.retain_cpu_copy);
        assert!(!config.fail_on_degenerate);
        assert_eq!(config.simplifier, SimplifierConfig::default());
        assert_eq!(LodConfig::from_toml_str("").unwrap(), config);
    }

    #[test]
    fn test_partial_toml() {
        let config = LodConfig::from_toml_str(
            r#"
            fail_on_degenerate = true

            [simplifier]
            boundary_weight = 50.0
            max_collapses = 1000
            "#,
        )
        .unwrap();
        assert!(config.fail_on_degenerate);
        assert!(config.retain_cpu_copy);
        assert_eq!(config.simplifier.boundary_weight, 50.0);
        assert_eq!(config.simplifier.max_collapses, Some(1000));
        assert!(!config.simplifier.preserve_seams);
    }

    #[test]
    fn test_bad_toml() {
        let result = LodConfig::from_toml_str("retain_cpu_copy = \"yes\"");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = LodConfig::load("/nonexistent/meshlod.toml");
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
