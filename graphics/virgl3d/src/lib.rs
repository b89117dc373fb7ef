//! VirGL 3D for VirtIO-GPU
//!
//! This crate drives a paravirtualized 3D GPU: it encodes Gallium state and
//! draw commands into the VirGL command stream and manages the context,
//! resources and transfer memory that stream operates on.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │       Caller        │
//! │ (ioctl / typed API) │
//! └──────────┬──────────┘
//!            │
//! ┌──────────▼──────────┐
//! │    Virgl3dDevice    │  validate, take the device lock
//! └──────────┬──────────┘
//!            │
//! ┌──────────▼──────────┐     ┌──────────────────┐
//! │   ResourceManager   │────►│ Encoder          │
//! │ context, resources, │     │ TransferRegion   │
//! │ scanout surfaces    │     │ HandleAllocator  │
//! └──────────┬──────────┘     └──────────────────┘
//!            │
//! ┌──────────▼──────────┐
//! │     GpuAdapter      │  e.g. VirtioGpuAdapter
//! └──────────┬──────────┘
//!            │
//! ┌──────────▼──────────┐
//! │  Host virglrenderer │
//! └─────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use virgl3d::{BindFlags, Resource3DSpecification, Virgl3dConfig, Virgl3dDevice};
//!
//! let device = Virgl3dDevice::new(adapter, Virgl3dConfig::default())?;
//! device.setup()?;
//!
//! let vbo = device.create_resource(&Resource3DSpecification::buffer(
//!     4096,
//!     BindFlags::VERTEX_BUFFER,
//! ))?;
//! device.transfer_data(1, 0, vertices.len(), &vertices[..])?;
//!
//! let mut encoder = virgl3d::Encoder::growable();
//! encoder.transfer3d(&virgl3d::Transfer3d::flat_upload(vbo, vertices.len() as u32))?;
//! encoder.end_transfers()?;
//! encoder.clear_color(0.0, 0.0, 0.5)?;
//! device.submit_cmd(encoder.len(), encoder.words())?;
//! device.flush_display()?;
//! ```

#![no_std]

extern crate alloc;

pub mod adapter;
pub mod commands;
pub mod config;
pub mod device;
pub mod encoder;
pub mod error;
pub mod handle;
pub mod manager;
pub mod protocol;
pub mod stream;
pub mod transfer;
pub mod virtio;

pub use adapter::{AdapterResult, GpuAdapter};
pub use commands::{
    BlendState, DrawInfo, Transfer3d, VertexBufferBinding, VertexElement, ViewportState,
};
pub use config::Virgl3dConfig;
pub use device::{ControlArg, ControlCode, Virgl3dDevice};
pub use encoder::{BoundedSink, Encoder, RecordBuilder, WordSink};
pub use error::{AdapterError, Error, Result};
pub use handle::HandleAllocator;
pub use manager::{DeviceState, Drawtarget, ResourceManager};
pub use protocol::{
    BindFlags, Box3d, ClearBuffers, ContextId, ObjectHandle, ObjectType, PipePrimitive,
    PipeTextureTarget, Rect, Resource3DSpecification, ResourceId, ShaderType, TextureFormat,
    TransferDirection, VirGLCommand,
};
pub use transfer::{CopySource, CopyTarget, TransferRegion};
pub use virtio::{ControlQueue, VirtioGpuAdapter};
