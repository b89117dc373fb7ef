//! Resource and context lifecycle
//!
//! [`ResourceManager`] owns the rendering context, the transfer region, the
//! registry of created resources and the scanout surface map. Every command
//! buffer it emits is encoded into local storage first and only handed to
//! the adapter once it is complete.
//!
//! ```text
//! Uninitialized ──new──► ContextReady ──setup──► Operational
//!                              │                      │
//!                              └──────finish──────────┴──► TornDown
//! ```

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::adapter::GpuAdapter;
use crate::commands::{
    BlendState, Transfer3d, ViewportState, MAX_FRAMEBUFFER_EXTENT, TRANSFER_USAGE_READBACK,
};
use crate::commands::{TWEAK_GLES_EMULATE_BGRA, TWEAK_GLES_SAMPLES_PASSED};
use crate::config::Virgl3dConfig;
use crate::encoder::Encoder;
use crate::handle::HandleAllocator;
use crate::protocol::{
    BindFlags, Box3d, ContextId, ObjectHandle, ObjectType, Rect, Resource3DSpecification,
    ResourceId, TransferDirection,
};
use crate::transfer::{CopySource, CopyTarget, TransferRegion};
use crate::{Error, Result};

/// Sub-context used for all rendering state
const SUB_CTX: u32 = 1;

/// Tessellation level applied during setup
const DEFAULT_TESS_LEVEL: f32 = 1.0;

/// Lifecycle state of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// No context yet
    Uninitialized,
    /// Context created, rendering state not set up
    ContextReady,
    /// Drawtarget and pipeline state set up
    Operational,
    /// Context destroyed
    TornDown,
}

/// Resource currently used as render target and scanout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drawtarget {
    pub resource: ResourceId,
    pub rect: Rect,
}

/// Resource known to the manager. Only backed resources are registered.
#[derive(Debug, Clone, Copy)]
struct ResourceEntry {
    spec: Resource3DSpecification,
}

/// Owner of one context and everything created in it
pub struct ResourceManager<A: GpuAdapter> {
    adapter: A,
    config: Virgl3dConfig,
    state: DeviceState,
    ctx: Option<ContextId>,
    handles: HandleAllocator,
    region: TransferRegion,
    resources: BTreeMap<ResourceId, ResourceEntry>,
    scanouts: BTreeMap<ResourceId, ObjectHandle>,
    drawtarget: Option<Drawtarget>,
    /// The configured scanout currently shows one of our resources
    scanout_bound: bool,
}

impl<A: GpuAdapter> ResourceManager<A> {
    /// Create the manager and its rendering context
    pub fn new(adapter: A, config: Virgl3dConfig) -> Result<Self> {
        config.validate()?;

        let region = TransferRegion::new(config.transfer_capacity());
        let mut manager = Self {
            adapter,
            config,
            state: DeviceState::Uninitialized,
            ctx: None,
            handles: HandleAllocator::new(),
            region,
            resources: BTreeMap::new(),
            scanouts: BTreeMap::new(),
            drawtarget: None,
            scanout_bound: false,
        };
        manager.create_context()?;
        Ok(manager)
    }

    fn create_context(&mut self) -> Result<()> {
        if self.state != DeviceState::Uninitialized {
            return Err(Error::InvalidState(self.state));
        }
        let ctx = self
            .adapter
            .create_context(self.config.context_name)
            .map_err(|err| {
                log::error!("Failed to create VirGL context: {}", err);
                Error::from(err)
            })?;
        log::info!("Created VirGL context {}", ctx.value());

        self.ctx = Some(ctx);
        self.state = DeviceState::ContextReady;
        Ok(())
    }

    fn require_context(&self) -> Result<ContextId> {
        match (self.state, self.ctx) {
            (DeviceState::ContextReady | DeviceState::Operational, Some(ctx)) => Ok(ctx),
            (state, _) => Err(Error::InvalidState(state)),
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn context_id(&self) -> Option<ContextId> {
        self.ctx
    }

    pub fn config(&self) -> &Virgl3dConfig {
        &self.config
    }

    pub fn drawtarget(&self) -> Option<Drawtarget> {
        self.drawtarget
    }

    pub fn region(&self) -> &TransferRegion {
        &self.region
    }

    /// Host side of the transfer region
    pub fn region_mut(&mut self) -> &mut TransferRegion {
        &mut self.region
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    /// Whether `resource` was created through this manager
    pub fn has_resource(&self, resource: ResourceId) -> bool {
        self.resources.contains_key(&resource)
    }

    /// Surface handle registered for `resource`
    pub fn scanout_surface(&self, resource: ResourceId) -> Option<ObjectHandle> {
        self.scanouts.get(&resource).copied()
    }

    /// Allocate a handle from the device object namespace
    pub fn allocate_object_handle(&self) -> ObjectHandle {
        let handle = self.handles.allocate_object_handle();
        log::debug!("Allocated object handle {}", handle.value());
        handle
    }

    /// Create a resource, attach it to the context and back it with the
    /// transfer region
    pub fn create_resource(&mut self, spec: &Resource3DSpecification) -> Result<ResourceId> {
        let ctx = self.require_context()?;
        if !spec.is_valid() {
            log::warn!("Rejected resource specification {:?}", spec);
            return Err(Error::InvalidResourceSpec);
        }

        let resource = self.adapter.create_3d_resource(spec).map_err(|err| {
            log::warn!("Resource creation refused: {}", err);
            Error::from(err)
        })?;
        self.adapter.attach_resource_to_context(ctx, resource)?;

        let backing = self.adapter.ensure_backing_storage(
            resource,
            self.region.base_address(),
            self.region.capacity(),
        );
        if let Err(err) = backing {
            log::warn!("No backing storage for resource {}: {}", resource.value(), err);
            if let Err(detach) = self.adapter.detach_resource_from_context(ctx, resource) {
                log::error!("Failed to detach resource {}: {}", resource.value(), detach);
            }
            return Err(err.into());
        }

        self.resources.insert(resource, ResourceEntry { spec: *spec });
        log::debug!(
            "Created resource {} ({}x{}x{})",
            resource.value(),
            spec.width,
            spec.height,
            spec.depth
        );
        Ok(resource)
    }

    /// Move `length` bytes between caller memory and the transfer region.
    ///
    /// Only guest to host is accepted; the region is filled from host
    /// resources by [`ResourceManager::read_scanout`] instead.
    pub fn transfer_data<S>(
        &mut self,
        direction: TransferDirection,
        offset: usize,
        length: usize,
        source: &S,
    ) -> Result<()>
    where
        S: CopySource + ?Sized,
    {
        self.require_context()?;
        if direction != TransferDirection::ToHost {
            log::warn!("Rejected {:?} transfer from caller", direction);
            return Err(Error::InvalidDirection(direction as u32));
        }
        self.region.write(offset, length, source)?;
        log::debug!("Staged {} bytes at offset {}", length, offset);
        Ok(())
    }

    /// Execute a complete command buffer in the context
    pub fn submit_command_buffer(&mut self, words: &[u32]) -> Result<()> {
        let ctx = self.require_context()?;
        let capacity = self.adapter.max_command_words();
        if words.len() > capacity {
            log::warn!(
                "Command buffer of {} words exceeds {} words",
                words.len(),
                capacity
            );
            return Err(Error::CommandBufferTooLarge {
                words: words.len(),
                capacity,
            });
        }
        self.adapter.submit_command_buffer(ctx, words)?;
        log::debug!("Submitted {} command words", words.len());
        Ok(())
    }

    /// Present the drawtarget
    pub fn flush_display(&mut self) -> Result<()> {
        self.require_context()?;
        let drawtarget = self.drawtarget.ok_or(Error::NoDrawtarget)?;
        self.adapter
            .flush_resource(drawtarget.resource, drawtarget.rect)?;
        Ok(())
    }

    /// Create a surface over `resource` and make it the render target
    pub fn register_scanout_framebuffer(&mut self, resource: ResourceId) -> Result<ObjectHandle> {
        self.require_context()?;
        let entry = *self
            .resources
            .get(&resource)
            .ok_or(Error::UnknownResource(resource))?;
        if self.scanouts.contains_key(&resource) {
            return Err(Error::AlreadyRegistered(resource));
        }
        if entry.spec.width > MAX_FRAMEBUFFER_EXTENT || entry.spec.height > MAX_FRAMEBUFFER_EXTENT {
            log::warn!(
                "Resource {} too large for scanout: {}x{}",
                resource.value(),
                entry.spec.width,
                entry.spec.height
            );
            return Err(Error::InvalidArgument);
        }

        let surface = self.handles.allocate_object_handle();
        let mut encoder = Encoder::growable();
        encoder.create_surface(surface, resource, self.config.format)?;
        encoder.set_framebuffer_state(ObjectHandle::NULL, &[surface])?;
        encoder.set_framebuffer_state_no_attach(entry.spec.width, entry.spec.height, 0, 0)?;
        self.submit_command_buffer(encoder.words())?;

        self.scanouts.insert(resource, surface);
        log::debug!(
            "Registered resource {} for scanout with surface {}",
            resource.value(),
            surface.value()
        );
        Ok(surface)
    }

    /// Destroy the scanout surface of `resource`
    pub fn unregister_scanout_framebuffer(&mut self, resource: ResourceId) -> Result<()> {
        self.require_context()?;
        let surface = *self
            .scanouts
            .get(&resource)
            .ok_or(Error::NotRegistered(resource))?;

        let mut encoder = Encoder::growable();
        encoder.destroy_object(surface, ObjectType::Surface)?;
        self.submit_command_buffer(encoder.words())?;

        self.scanouts.remove(&resource);
        log::debug!("Unregistered resource {} from scanout", resource.value());
        Ok(())
    }

    /// Copy `dirty_rect` of a scanout resource into the start of the
    /// transfer region. Returns the number of bytes the host writes.
    pub fn transfer_scanout(&mut self, resource: ResourceId, dirty_rect: Rect) -> Result<usize> {
        self.require_context()?;
        let entry = *self
            .resources
            .get(&resource)
            .ok_or(Error::UnknownResource(resource))?;
        if !self.scanouts.contains_key(&resource) {
            return Err(Error::NotRegistered(resource));
        }
        let within = |start: u32, len: u32, limit: u32| {
            start.checked_add(len).map_or(false, |end| end <= limit)
        };
        if dirty_rect.is_empty()
            || !within(dirty_rect.x, dirty_rect.width, entry.spec.width)
            || !within(dirty_rect.y, dirty_rect.height, entry.spec.height)
        {
            return Err(Error::InvalidArgument);
        }

        let stride = dirty_rect
            .width
            .checked_mul(self.config.format.bytes_per_pixel())
            .ok_or(Error::InvalidArgument)?;
        let length = stride as usize * dirty_rect.height as usize;
        self.region.check_range(0, length)?;

        let transfer = Transfer3d {
            resource,
            level: 0,
            usage: TRANSFER_USAGE_READBACK,
            stride,
            layer_stride: 0,
            region: Box3d::from_rect(dirty_rect),
            data_offset: 0,
            direction: TransferDirection::FromHost,
        };
        let mut encoder = Encoder::growable();
        encoder.transfer3d(&transfer)?;
        encoder.end_transfers()?;
        self.submit_command_buffer(encoder.words())?;
        Ok(length)
    }

    /// Read `rect` of a scanout resource into `target`
    pub fn read_scanout<T>(&mut self, resource: ResourceId, rect: Rect, target: &mut T) -> Result<usize>
    where
        T: CopyTarget + ?Sized,
    {
        let length = self.transfer_scanout(resource, rect)?;
        self.region.read(0, length, target)?;
        Ok(length)
    }

    /// Build the drawtarget and the default pipeline state
    pub fn setup(&mut self) -> Result<()> {
        if self.state != DeviceState::ContextReady {
            log::warn!("Setup rejected in state {:?}", self.state);
            return Err(Error::InvalidState(self.state));
        }

        let rect = self.config.display_rect();
        let spec = Resource3DSpecification::texture_2d(
            rect.width,
            rect.height,
            self.config.format,
            BindFlags::RENDER_TARGET | BindFlags::SCANOUT,
        );
        let resource = self.create_resource(&spec)?;
        if let Err(err) = self.build_drawtarget(resource, rect) {
            log::error!("VirGL setup failed: {}", err);
            self.release_drawtarget(resource);
            return Err(err);
        }

        self.drawtarget = Some(Drawtarget { resource, rect });
        self.state = DeviceState::Operational;
        log::info!(
            "VirGL setup complete: drawtarget {} on scanout {}",
            resource.value(),
            self.config.scanout_id
        );
        Ok(())
    }

    fn build_drawtarget(&mut self, resource: ResourceId, rect: Rect) -> Result<()> {
        self.adapter
            .set_scanout(self.config.scanout_id, Some(resource), rect)?;
        self.scanout_bound = true;

        let mut encoder = Encoder::growable();
        encoder.create_sub_ctx(SUB_CTX)?;
        encoder.set_sub_ctx(SUB_CTX)?;
        encoder.set_tweaks(TWEAK_GLES_EMULATE_BGRA, 1)?;
        encoder.set_tweaks(TWEAK_GLES_SAMPLES_PASSED, 1024)?;
        encoder.set_polygon_stipple(&[0xFFFF_FFFF; 32])?;
        self.submit_command_buffer(encoder.words())?;

        self.register_scanout_framebuffer(resource)?;

        let blend = self.handles.allocate_object_handle();
        let mut encoder = Encoder::growable();
        encoder.set_viewport_state(0, &[ViewportState::for_extent(rect.width, rect.height)])?;
        encoder.create_blend(blend, &BlendState::opaque())?;
        encoder.bind_object(blend, ObjectType::Blend)?;
        encoder.set_tess_state([DEFAULT_TESS_LEVEL; 4], [DEFAULT_TESS_LEVEL; 2])?;
        self.submit_command_buffer(encoder.words())
    }

    /// Undo a partial setup so a later setup or finish starts clean
    fn release_drawtarget(&mut self, resource: ResourceId) {
        if self.scanouts.contains_key(&resource) {
            if let Err(err) = self.unregister_scanout_framebuffer(resource) {
                log::error!("Failed to destroy surface of resource {}: {}", resource.value(), err);
                self.scanouts.remove(&resource);
            }
        }
        if let Err(err) = self.release_scanout() {
            log::error!("Failed to release scanout {}: {}", self.config.scanout_id, err);
        }
        if let Some(ctx) = self.ctx {
            if let Err(err) = self.adapter.detach_resource_from_context(ctx, resource) {
                log::error!("Failed to detach resource {}: {}", resource.value(), err);
            }
        }
        self.resources.remove(&resource);
    }

    /// Hand the configured scanout back if one of our resources is shown on it
    fn release_scanout(&mut self) -> Result<()> {
        if !self.scanout_bound {
            return Ok(());
        }
        self.scanout_bound = false;
        self.adapter
            .set_scanout(self.config.scanout_id, None, self.config.display_rect())?;
        Ok(())
    }

    /// Release everything created in the context and destroy it.
    ///
    /// Teardown continues past individual failures; the first one is
    /// returned and the manager ends up torn down either way.
    pub fn finish(&mut self) -> Result<()> {
        let ctx = self.require_context()?;
        let mut result = Ok(());

        if !self.scanouts.is_empty() {
            let mut encoder = Encoder::growable();
            for surface in self.scanouts.values() {
                encoder.destroy_object(*surface, ObjectType::Surface)?;
            }
            let words: Vec<u32> = encoder.into_inner();
            record(&mut result, self.submit_command_buffer(&words));
            self.scanouts.clear();
        }

        self.drawtarget = None;
        let released = self.release_scanout();
        record(&mut result, released);

        for resource in self.resources.keys() {
            let detached = self.adapter.detach_resource_from_context(ctx, *resource);
            record(&mut result, detached.map_err(Error::from));
        }
        self.resources.clear();

        record(
            &mut result,
            self.adapter.destroy_context(ctx).map_err(Error::from),
        );
        self.ctx = None;
        self.state = DeviceState::TornDown;
        log::info!("VirGL context {} torn down", ctx.value());
        result
    }
}

/// Keep the first error of a multi-step operation
fn record(result: &mut Result<()>, step: Result<()>) {
    if let Err(err) = step {
        log::error!("Teardown step failed: {}", err);
        if result.is_ok() {
            *result = Err(err);
        }
    }
}
