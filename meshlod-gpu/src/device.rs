//! GPU device management

use meshlod_core::{BufferHandle, Error, GraphicsDevice, IndexFormat, Result, VertexLayout};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use wgpu::util::DeviceExt;

struct GpuBuffer {
    buffer: wgpu::Buffer,
    /// Bytes uploaded, before alignment padding
    len: u64,
}

/// GPU context owning the wgpu device and every mesh buffer created on it.
///
/// Buffers are addressed by [`BufferHandle`]. Queue submissions for readback
/// are serialized, so one context can serve several LOD levels generated on
/// different threads.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter: wgpu::Adapter,
    buffers: Mutex<HashMap<BufferHandle, GpuBuffer>>,
    next_handle: AtomicU64,
    submission: Mutex<()>,
    supports_32bit_indices: bool,
}

impl GpuContext {
    /// Create a new GPU context
    pub async fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| Error::Gpu("Failed to find suitable adapter".to_string()))?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("meshlod GPU Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults(),
                    ..Default::default()
                },
                None,
            )
            .await
            .map_err(|e| Error::Gpu(format!("Failed to create device: {}", e)))?;

        let supports_32bit_indices = adapter
            .get_downlevel_capabilities()
            .flags
            .contains(wgpu::DownlevelFlags::FULL_DRAW_INDEX_UINT32);
        log::info!(
            "GPU device on {} ({:?}), 32-bit indices: {}",
            adapter.get_info().name,
            adapter.get_info().backend,
            supports_32bit_indices
        );

        Ok(Self {
            device,
            queue,
            adapter,
            buffers: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            submission: Mutex::new(()),
            supports_32bit_indices,
        })
    }

    /// Create a context from synchronous code
    pub fn new_blocking() -> Result<Self> {
        pollster::block_on(Self::new())
    }

    /// Number of live mesh buffers
    pub fn buffer_count(&self) -> usize {
        self.lock_buffers().map(|b| b.len()).unwrap_or(0)
    }

    /// Destroy a buffer, returning whether it existed
    pub fn release(&self, handle: BufferHandle) -> bool {
        match self.lock_buffers().map(|mut b| b.remove(&handle)) {
            Ok(Some(stored)) => {
                stored.buffer.destroy();
                true
            }
            _ => false,
        }
    }

    /// The wgpu buffer behind `handle`, for binding in render passes
    pub fn with_buffer<R>(&self, handle: BufferHandle, f: impl FnOnce(&wgpu::Buffer) -> R) -> Result<R> {
        let buffers = self.lock_buffers()?;
        let stored = buffers
            .get(&handle)
            .ok_or_else(|| Error::Gpu(format!("unknown buffer {:?}", handle)))?;
        Ok(f(&stored.buffer))
    }

    fn lock_buffers(&self) -> Result<MutexGuard<'_, HashMap<BufferHandle, GpuBuffer>>> {
        self.buffers
            .lock()
            .map_err(|_| Error::Gpu("buffer table poisoned".to_string()))
    }

    fn upload(&self, label: &str, bytes: &[u8], usage: wgpu::BufferUsages) -> Result<BufferHandle> {
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytes,
            usage: usage | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
        });
        let handle = BufferHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        log::trace!("{} {:?}: {} bytes", label, handle, bytes.len());
        self.lock_buffers()?.insert(
            handle,
            GpuBuffer {
                buffer,
                len: bytes.len() as u64,
            },
        );
        Ok(handle)
    }
}

impl GraphicsDevice for GpuContext {
    fn create_vertex_buffer(&self, bytes: &[u8], layout: &VertexLayout) -> Result<BufferHandle> {
        if !layout.is_valid() || bytes.len() % layout.stride as usize != 0 {
            return Err(Error::InvalidData(format!(
                "{} bytes do not match vertex stride {}",
                bytes.len(),
                layout.stride
            )));
        }
        self.upload("meshlod vertex buffer", bytes, wgpu::BufferUsages::VERTEX)
    }

    fn create_index_buffer(&self, bytes: &[u8], format: IndexFormat) -> Result<BufferHandle> {
        if format == IndexFormat::U32 && !self.supports_32bit_indices {
            return Err(Error::UnsupportedHardware {
                index_count: bytes.len() / format.size(),
            });
        }
        self.upload("meshlod index buffer", bytes, wgpu::BufferUsages::INDEX)
    }

    fn supports_32bit_indices(&self) -> bool {
        self.supports_32bit_indices
    }

    fn read_buffer(&self, handle: BufferHandle) -> Result<Vec<u8>> {
        let _submission = self
            .submission
            .lock()
            .map_err(|_| Error::Gpu("submission lock poisoned".to_string()))?;

        let (staging, len) = {
            let buffers = self.lock_buffers()?;
            let stored = buffers
                .get(&handle)
                .ok_or_else(|| Error::Gpu(format!("unknown buffer {:?}", handle)))?;
            if stored.len == 0 {
                return Ok(Vec::new());
            }

            let size = wgpu::util::align_to(stored.len, wgpu::COPY_BUFFER_ALIGNMENT);
            let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("meshlod readback staging buffer"),
                size,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            });
            let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("meshlod readback encoder"),
            });
            encoder.copy_buffer_to_buffer(&stored.buffer, 0, &staging, 0, size);
            self.queue.submit(std::iter::once(encoder.finish()));
            (staging, stored.len as usize)
        };

        let buffer_slice = staging.slice(..);
        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);

        pollster::block_on(receiver.receive())
            .ok_or_else(|| Error::Gpu("Failed to receive mapping result".to_string()))??;

        let data = buffer_slice.get_mapped_range();
        let bytes = data[..len].to_vec();
        drop(data);
        staging.unmap();

        Ok(bytes)
    }
}
