//! VirtIO-GPU adapter
//!
//! Implements [`GpuAdapter`] by sending VirtIO-GPU control requests over a
//! [`ControlQueue`]. Requests are serialized little-endian in the layout of
//! the VirtIO-GPU specification; the queue returns the response type of the
//! reply header.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::adapter::{AdapterResult, GpuAdapter};
use crate::error::AdapterError;
use crate::handle::HandleAllocator;
use crate::protocol::{ContextId, Rect, Resource3DSpecification, ResourceId};

/// Default limit for a single SUBMIT_3D payload, in words
pub const DEFAULT_MAX_COMMAND_WORDS: usize = 64 * 1024;

/// Longest context debug name the host accepts
pub const MAX_DEBUG_NAME: usize = 64;

/// VirtIO GPU command types
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum CommandType {
    SetScanout = 0x0103,
    ResourceFlush = 0x0104,
    ResourceAttachBacking = 0x0106,

    CtxCreate = 0x0200,
    CtxDestroy,
    CtxAttachResource,
    CtxDetachResource,
    ResourceCreate3d,
    Submit3d = 0x0207,

    RespOkNodata = 0x1100,

    RespErrUnspec = 0x1200,
    RespErrOutOfMemory,
    RespErrInvalidScanoutId,
    RespErrInvalidResourceId,
    RespErrInvalidContextId,
    RespErrInvalidParameter,
}

/// Capset the rendering context is created for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CapsetType {
    Virgl = 1,
    Virgl2 = 2,
}

/// Map a response type to the request outcome
pub fn check_response(resp_type: u32) -> AdapterResult<()> {
    match resp_type {
        0x1100..=0x11FF => Ok(()),
        x if x == CommandType::RespErrOutOfMemory as u32 => Err(AdapterError::OutOfMemory),
        x if x == CommandType::RespErrInvalidScanoutId as u32 => {
            Err(AdapterError::InvalidScanoutId)
        }
        x if x == CommandType::RespErrInvalidResourceId as u32 => {
            Err(AdapterError::InvalidResourceId)
        }
        x if x == CommandType::RespErrInvalidContextId as u32 => {
            Err(AdapterError::InvalidContextId)
        }
        x if x == CommandType::RespErrInvalidParameter as u32 => {
            Err(AdapterError::InvalidParameter)
        }
        _ => Err(AdapterError::Unspecified),
    }
}

/// Transport for control requests
pub trait ControlQueue: Send {
    /// Send one serialized request and wait for the reply.
    ///
    /// Returns the `type` field of the response header.
    fn send(&mut self, request: &[u8]) -> AdapterResult<u32>;
}

/// Little-endian request serialization
trait Wire {
    fn write_to(&self, buf: &mut Vec<u8>);

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_to(&mut buf);
        buf
    }
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_u64(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_rect(buf: &mut Vec<u8>, rect: &Rect) {
    put_u32(buf, rect.x);
    put_u32(buf, rect.y);
    put_u32(buf, rect.width);
    put_u32(buf, rect.height);
}

/// Control header for all VirtIO GPU commands
#[derive(Debug, Clone, Copy)]
pub struct ControlHeader {
    pub cmd_type: u32,
    pub flags: u32,
    pub fence_id: u64,
    pub ctx_id: u32,
    pub ring_idx: u8,
}

impl ControlHeader {
    /// Size of the serialized header in bytes
    pub const SIZE: usize = 24;

    pub fn new(cmd_type: CommandType) -> Self {
        Self {
            cmd_type: cmd_type as u32,
            flags: 0,
            fence_id: 0,
            ctx_id: 0,
            ring_idx: 0,
        }
    }

    pub fn with_context(mut self, ctx_id: u32) -> Self {
        self.ctx_id = ctx_id;
        self
    }
}

impl Wire for ControlHeader {
    fn write_to(&self, buf: &mut Vec<u8>) {
        put_u32(buf, self.cmd_type);
        put_u32(buf, self.flags);
        put_u64(buf, self.fence_id);
        put_u32(buf, self.ctx_id);
        buf.extend_from_slice(&[self.ring_idx, 0, 0, 0]);
    }
}

/// 3D context create request
#[derive(Debug, Clone, Copy)]
pub struct CtxCreate {
    pub header: ControlHeader,
    pub nlen: u32,
    pub context_init: u32,
    pub debug_name: [u8; MAX_DEBUG_NAME],
}

impl CtxCreate {
    pub fn new(ctx_id: u32, capset: CapsetType, name: &[u8]) -> Self {
        let mut debug_name = [0u8; MAX_DEBUG_NAME];
        let len = name.len().min(MAX_DEBUG_NAME);
        debug_name[..len].copy_from_slice(&name[..len]);

        Self {
            header: ControlHeader::new(CommandType::CtxCreate).with_context(ctx_id),
            nlen: len as u32,
            context_init: capset as u32,
            debug_name,
        }
    }
}

impl Wire for CtxCreate {
    fn write_to(&self, buf: &mut Vec<u8>) {
        self.header.write_to(buf);
        put_u32(buf, self.nlen);
        put_u32(buf, self.context_init);
        buf.extend_from_slice(&self.debug_name);
    }
}

/// 3D context destroy request
#[derive(Debug, Clone, Copy)]
pub struct CtxDestroy {
    pub header: ControlHeader,
}

impl CtxDestroy {
    pub fn new(ctx_id: u32) -> Self {
        Self {
            header: ControlHeader::new(CommandType::CtxDestroy).with_context(ctx_id),
        }
    }
}

impl Wire for CtxDestroy {
    fn write_to(&self, buf: &mut Vec<u8>) {
        self.header.write_to(buf);
    }
}

/// Attach or detach a resource to a context
#[derive(Debug, Clone, Copy)]
pub struct CtxResource {
    pub header: ControlHeader,
    pub resource_id: u32,
}

impl CtxResource {
    pub fn attach(ctx_id: u32, resource_id: u32) -> Self {
        Self {
            header: ControlHeader::new(CommandType::CtxAttachResource).with_context(ctx_id),
            resource_id,
        }
    }

    pub fn detach(ctx_id: u32, resource_id: u32) -> Self {
        Self {
            header: ControlHeader::new(CommandType::CtxDetachResource).with_context(ctx_id),
            resource_id,
        }
    }
}

impl Wire for CtxResource {
    fn write_to(&self, buf: &mut Vec<u8>) {
        self.header.write_to(buf);
        put_u32(buf, self.resource_id);
        put_u32(buf, 0);
    }
}

/// 3D resource create request
#[derive(Debug, Clone, Copy)]
pub struct ResourceCreate3d {
    pub header: ControlHeader,
    pub resource_id: u32,
    pub spec: Resource3DSpecification,
}

impl ResourceCreate3d {
    pub fn new(resource_id: u32, spec: Resource3DSpecification) -> Self {
        Self {
            header: ControlHeader::new(CommandType::ResourceCreate3d),
            resource_id,
            spec,
        }
    }
}

impl Wire for ResourceCreate3d {
    fn write_to(&self, buf: &mut Vec<u8>) {
        self.header.write_to(buf);
        put_u32(buf, self.resource_id);
        put_u32(buf, self.spec.target as u32);
        put_u32(buf, self.spec.format);
        put_u32(buf, self.spec.bind.bits());
        put_u32(buf, self.spec.width);
        put_u32(buf, self.spec.height);
        put_u32(buf, self.spec.depth);
        put_u32(buf, self.spec.array_size);
        put_u32(buf, self.spec.last_level);
        put_u32(buf, self.spec.nr_samples);
        put_u32(buf, self.spec.flags);
        put_u32(buf, 0);
    }
}

/// Attach backing request with a single memory entry
#[derive(Debug, Clone, Copy)]
pub struct AttachBacking {
    pub header: ControlHeader,
    pub resource_id: u32,
    pub addr: u64,
    pub length: u32,
}

impl AttachBacking {
    pub fn new(resource_id: u32, addr: u64, length: u32) -> Self {
        Self {
            header: ControlHeader::new(CommandType::ResourceAttachBacking),
            resource_id,
            addr,
            length,
        }
    }
}

impl Wire for AttachBacking {
    fn write_to(&self, buf: &mut Vec<u8>) {
        self.header.write_to(buf);
        put_u32(buf, self.resource_id);
        put_u32(buf, 1); // nr_entries
        put_u64(buf, self.addr);
        put_u32(buf, self.length);
        put_u32(buf, 0);
    }
}

/// 3D command submit request
pub struct Submit3d<'a> {
    pub header: ControlHeader,
    pub commands: &'a [u32],
}

impl<'a> Submit3d<'a> {
    pub fn new(ctx_id: u32, commands: &'a [u32]) -> Self {
        Self {
            header: ControlHeader::new(CommandType::Submit3d).with_context(ctx_id),
            commands,
        }
    }
}

impl Wire for Submit3d<'_> {
    fn write_to(&self, buf: &mut Vec<u8>) {
        self.header.write_to(buf);
        put_u32(buf, (self.commands.len() * 4) as u32);
        put_u32(buf, 0);
        buf.reserve(self.commands.len() * 4);
        for word in self.commands {
            put_u32(buf, *word);
        }
    }
}

/// Resource flush request
#[derive(Debug, Clone, Copy)]
pub struct ResourceFlush {
    pub header: ControlHeader,
    pub rect: Rect,
    pub resource_id: u32,
}

impl ResourceFlush {
    pub fn new(resource_id: u32, rect: Rect) -> Self {
        Self {
            header: ControlHeader::new(CommandType::ResourceFlush),
            rect,
            resource_id,
        }
    }
}

impl Wire for ResourceFlush {
    fn write_to(&self, buf: &mut Vec<u8>) {
        self.header.write_to(buf);
        put_rect(buf, &self.rect);
        put_u32(buf, self.resource_id);
        put_u32(buf, 0);
    }
}

/// Set scanout request
#[derive(Debug, Clone, Copy)]
pub struct SetScanout {
    pub header: ControlHeader,
    pub rect: Rect,
    pub scanout_id: u32,
    pub resource_id: u32,
}

impl SetScanout {
    pub fn new(scanout_id: u32, resource_id: u32, rect: Rect) -> Self {
        Self {
            header: ControlHeader::new(CommandType::SetScanout),
            rect,
            scanout_id,
            resource_id,
        }
    }
}

impl Wire for SetScanout {
    fn write_to(&self, buf: &mut Vec<u8>) {
        self.header.write_to(buf);
        put_rect(buf, &self.rect);
        put_u32(buf, self.scanout_id);
        put_u32(buf, self.resource_id);
    }
}

/// [`GpuAdapter`] over a VirtIO-GPU control queue
pub struct VirtioGpuAdapter<Q: ControlQueue> {
    queue: Q,
    ids: HandleAllocator,
    next_ctx_id: AtomicU32,
    max_command_words: usize,
}

impl<Q: ControlQueue> VirtioGpuAdapter<Q> {
    pub fn new(queue: Q) -> Self {
        Self {
            queue,
            ids: HandleAllocator::new(),
            next_ctx_id: AtomicU32::new(1),
            max_command_words: DEFAULT_MAX_COMMAND_WORDS,
        }
    }

    /// Override the SUBMIT_3D size limit
    pub fn with_max_command_words(mut self, words: usize) -> Self {
        self.max_command_words = words;
        self
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    fn request(&mut self, message: &dyn Wire) -> AdapterResult<()> {
        let bytes = message.to_bytes();
        let resp_type = self.queue.send(&bytes)?;
        check_response(resp_type).map_err(|err| {
            log::error!(
                "VirtIO-GPU request {:#x} failed: {}",
                u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
                err
            );
            err
        })
    }
}

impl<Q: ControlQueue> GpuAdapter for VirtioGpuAdapter<Q> {
    fn create_context(&mut self, name: &str) -> AdapterResult<ContextId> {
        let ctx_id = self.next_ctx_id.fetch_add(1, Ordering::SeqCst);
        self.request(&CtxCreate::new(ctx_id, CapsetType::Virgl, name.as_bytes()))?;
        Ok(ContextId::new(ctx_id))
    }

    fn destroy_context(&mut self, ctx: ContextId) -> AdapterResult<()> {
        self.request(&CtxDestroy::new(ctx.value()))
    }

    fn create_3d_resource(&mut self, spec: &Resource3DSpecification) -> AdapterResult<ResourceId> {
        let id = self.ids.allocate_resource_id().ok_or_else(|| {
            log::error!("VirtIO-GPU resource ids exhausted");
            AdapterError::OutOfMemory
        })?;
        self.request(&ResourceCreate3d::new(id.value(), *spec))?;
        Ok(id)
    }

    fn attach_resource_to_context(
        &mut self,
        ctx: ContextId,
        resource: ResourceId,
    ) -> AdapterResult<()> {
        self.request(&CtxResource::attach(ctx.value(), resource.value()))
    }

    fn detach_resource_from_context(
        &mut self,
        ctx: ContextId,
        resource: ResourceId,
    ) -> AdapterResult<()> {
        self.request(&CtxResource::detach(ctx.value(), resource.value()))
    }

    fn ensure_backing_storage(
        &mut self,
        resource: ResourceId,
        address: u64,
        length: usize,
    ) -> AdapterResult<()> {
        let length = u32::try_from(length).map_err(|_| AdapterError::InvalidParameter)?;
        self.request(&AttachBacking::new(resource.value(), address, length))
    }

    fn max_command_words(&self) -> usize {
        self.max_command_words
    }

    fn submit_command_buffer(&mut self, ctx: ContextId, words: &[u32]) -> AdapterResult<()> {
        if words.len() > self.max_command_words {
            return Err(AdapterError::InvalidParameter);
        }
        self.request(&Submit3d::new(ctx.value(), words))
    }

    fn flush_resource(&mut self, resource: ResourceId, rect: Rect) -> AdapterResult<()> {
        self.request(&ResourceFlush::new(resource.value(), rect))
    }

    fn set_scanout(
        &mut self,
        scanout_id: u32,
        resource: Option<ResourceId>,
        rect: Rect,
    ) -> AdapterResult<()> {
        let resource_id = resource.unwrap_or(ResourceId::NONE).value();
        self.request(&SetScanout::new(scanout_id, resource_id, rect))
    }
}
