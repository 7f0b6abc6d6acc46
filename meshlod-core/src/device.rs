//! In-memory graphics device

use crate::error::{Error, Result};
use crate::mesh::BufferHandle;
use crate::traits::GraphicsDevice;
use crate::vertex::{IndexFormat, VertexLayout};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// What a headless buffer was created as
#[derive(Debug, Clone, PartialEq)]
pub enum BufferKind {
    Vertex(VertexLayout),
    Index(IndexFormat),
}

#[derive(Debug)]
struct StoredBuffer {
    kind: BufferKind,
    bytes: Vec<u8>,
}

/// Graphics device that keeps every buffer in host memory.
///
/// Used for CPU-only hosts (asset build machines) and tests. The 32-bit index
/// capability is configurable so limited hardware profiles can be emulated.
pub struct HeadlessDevice {
    supports_32bit_indices: bool,
    next_handle: AtomicU64,
    buffers: Mutex<HashMap<BufferHandle, StoredBuffer>>,
}

impl HeadlessDevice {
    /// Device with full 32-bit index support
    pub fn new() -> Self {
        Self::with_32bit_indices(true)
    }

    /// Device emulating a hardware profile with or without 32-bit indices
    pub fn with_32bit_indices(supported: bool) -> Self {
        Self {
            supports_32bit_indices: supported,
            next_handle: AtomicU64::new(1),
            buffers: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live buffers
    pub fn buffer_count(&self) -> usize {
        self.lock().map(|b| b.len()).unwrap_or(0)
    }

    /// How a buffer was created
    pub fn buffer_kind(&self, handle: BufferHandle) -> Option<BufferKind> {
        self.lock()
            .ok()
            .and_then(|b| b.get(&handle).map(|s| s.kind.clone()))
    }

    /// Drop a buffer, returning whether it existed
    pub fn release(&self, handle: BufferHandle) -> bool {
        self.lock()
            .map(|mut b| b.remove(&handle).is_some())
            .unwrap_or(false)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<BufferHandle, StoredBuffer>>> {
        self.buffers
            .lock()
            .map_err(|_| Error::Gpu("headless buffer table poisoned".to_string()))
    }

    fn store(&self, kind: BufferKind, bytes: &[u8]) -> Result<BufferHandle> {
        let handle = BufferHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        log::trace!("headless buffer {:?}: {} bytes as {:?}", handle, bytes.len(), kind);
        self.lock()?.insert(
            handle,
            StoredBuffer {
                kind,
                bytes: bytes.to_vec(),
            },
        );
        Ok(handle)
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn create_vertex_buffer(&self, bytes: &[u8], layout: &VertexLayout) -> Result<BufferHandle> {
        if !layout.is_valid() || bytes.len() % layout.stride as usize != 0 {
            return Err(Error::InvalidData(format!(
                "{} bytes do not match vertex stride {}",
                bytes.len(),
                layout.stride
            )));
        }
        self.store(BufferKind::Vertex(layout.clone()), bytes)
    }

    fn create_index_buffer(&self, bytes: &[u8], format: IndexFormat) -> Result<BufferHandle> {
        if format == IndexFormat::U32 && !self.supports_32bit_indices {
            return Err(Error::UnsupportedHardware {
                index_count: bytes.len() / format.size(),
            });
        }
        if bytes.len() % format.size() != 0 {
            return Err(Error::InvalidData(format!(
                "{} bytes is not a whole number of {:?} indices",
                bytes.len(),
                format
            )));
        }
        self.store(BufferKind::Index(format), bytes)
    }

    fn supports_32bit_indices(&self) -> bool {
        self.supports_32bit_indices
    }

    fn read_buffer(&self, handle: BufferHandle) -> Result<Vec<u8>> {
        self.lock()?
            .get(&handle)
            .map(|s| s.bytes.clone())
            .ok_or_else(|| Error::Gpu(format!("unknown buffer {:?}", handle)))
    }
}
