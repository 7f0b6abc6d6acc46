//! # meshlod GPU
//!
//! A [`GraphicsDevice`](meshlod_core::GraphicsDevice) backed by wgpu, so LOD
//! levels can be uploaded straight to VRAM and GPU-resident source meshes
//! can be read back for simplification.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use meshlod_gpu::GpuContext;
//! use meshlod_core::GraphicsDevice;
//!
//! fn example() -> meshlod_core::Result<()> {
//!     let gpu = GpuContext::new_blocking()?;
//!     println!("32-bit indices: {}", gpu.supports_32bit_indices());
//!     Ok(())
//! }
//! ```

pub mod device;

pub use device::GpuContext;
