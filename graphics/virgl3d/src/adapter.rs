//! GPU adapter interface
//!
//! The lower-level device the resource manager drives. An adapter owns the
//! host-side objects (contexts and resources), accepts command buffers and
//! presents resources on a scanout.

use crate::error::AdapterError;
use crate::protocol::{ContextId, Rect, Resource3DSpecification, ResourceId};

/// Result type for adapter requests
pub type AdapterResult<T> = core::result::Result<T, AdapterError>;

/// Lower-level GPU adapter
pub trait GpuAdapter: Send {
    /// Create a rendering context
    fn create_context(&mut self, name: &str) -> AdapterResult<ContextId>;

    /// Destroy a rendering context
    fn destroy_context(&mut self, ctx: ContextId) -> AdapterResult<()>;

    /// Create a 3D resource and return the id assigned to it
    fn create_3d_resource(&mut self, spec: &Resource3DSpecification) -> AdapterResult<ResourceId>;

    /// Make `resource` usable from `ctx`
    fn attach_resource_to_context(&mut self, ctx: ContextId, resource: ResourceId)
        -> AdapterResult<()>;

    /// Remove `resource` from `ctx`
    fn detach_resource_from_context(
        &mut self,
        ctx: ContextId,
        resource: ResourceId,
    ) -> AdapterResult<()>;

    /// Back `resource` with guest memory at `address`
    fn ensure_backing_storage(
        &mut self,
        resource: ResourceId,
        address: u64,
        length: usize,
    ) -> AdapterResult<()>;

    /// Largest command buffer accepted by [`GpuAdapter::submit_command_buffer`], in words
    fn max_command_words(&self) -> usize;

    /// Execute a command buffer in `ctx`
    fn submit_command_buffer(&mut self, ctx: ContextId, words: &[u32]) -> AdapterResult<()>;

    /// Present the `rect` area of `resource`
    fn flush_resource(&mut self, resource: ResourceId, rect: Rect) -> AdapterResult<()>;

    /// Point a scanout at `resource`, or disable it when `None`
    fn set_scanout(
        &mut self,
        scanout_id: u32,
        resource: Option<ResourceId>,
        rect: Rect,
    ) -> AdapterResult<()>;
}
