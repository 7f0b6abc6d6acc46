//! Capabilities consumed from the host engine

use crate::error::Result;
use crate::mesh::BufferHandle;
use crate::model::{AssetReference, Model};
use crate::vertex::{IndexFormat, VertexLayout};
use std::sync::Arc;

/// Device-resource creation, capability queries and readback.
///
/// Implementations must serialize access to their command queue internally;
/// LOD generation for different levels may call into the same device from
/// several threads.
pub trait GraphicsDevice: Send + Sync {
    /// Upload an interleaved vertex buffer
    fn create_vertex_buffer(&self, bytes: &[u8], layout: &VertexLayout) -> Result<BufferHandle>;

    /// Upload an index buffer of the given element width
    fn create_index_buffer(&self, bytes: &[u8], format: IndexFormat) -> Result<BufferHandle>;

    /// Whether 32-bit index buffers can be drawn on this device
    fn supports_32bit_indices(&self) -> bool;

    /// Copy a buffer's contents back to the CPU, blocking until the copy completes
    fn read_buffer(&self, handle: BufferHandle) -> Result<Vec<u8>>;
}

/// Resolves deferred model references at the point of use
pub trait ModelResolver: Send + Sync {
    fn resolve(&self, reference: &AssetReference) -> Result<Arc<Model>>;
}
