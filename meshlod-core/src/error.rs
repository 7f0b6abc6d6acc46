//! Error types for meshlod

use crate::mesh::PrimitiveTopology;
use thiserror::Error;

/// Main error type for meshlod operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Position or index data (or a referenced material slot) is absent
    #[error("Missing attribute: {0}")]
    MissingAttribute(String),

    /// The LOD has no source model, or the reference could not be resolved
    #[error("Missing source model: {0}")]
    MissingSource(String),

    /// The quality factor resolves to zero target triangles.
    ///
    /// Reported as a warning unless the caller asks for it to be fatal.
    #[error("Degenerate result: mesh {mesh} of LOD level {level} has a zero triangle budget")]
    DegenerateResult { level: u32, mesh: usize },

    #[error("Unsupported hardware: {index_count} indices need 32-bit index buffers, which the target device does not support")]
    UnsupportedHardware { index_count: usize },

    #[error("Unsupported topology: {0:?} (only triangle lists can be simplified)")]
    UnsupportedTopology(PrimitiveTopology),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A failure attributed to one LOD level
    #[error("LOD level {level}: {source}")]
    Lod {
        level: u32,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Attach the LOD level the error belongs to
    pub fn at_level(self, level: u32) -> Self {
        match self {
            Error::Lod { .. } => self,
            other => Error::Lod {
                level,
                source: Box::new(other),
            },
        }
    }

    /// The underlying error, looking through level attribution
    pub fn root(&self) -> &Error {
        match self {
            Error::Lod { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(feature = "gpu")]
impl From<wgpu::BufferAsyncError> for Error {
    fn from(e: wgpu::BufferAsyncError) -> Self {
        Error::Gpu(format!("buffer mapping failed: {}", e))
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

/// Result type alias for meshlod operations
pub type Result<T> = std::result::Result<T, Error>;
