//! VirGL 3D device control surface
//!
//! [`Virgl3dDevice`] is the externally visible device. Each operation
//! validates its input and then runs against the [`ResourceManager`] while
//! holding the device lock, so command buffers reach the host in the order
//! they were submitted and no caller observes a partially written transfer
//! region.

use spin::Mutex;

use crate::adapter::GpuAdapter;
use crate::config::Virgl3dConfig;
use crate::manager::{DeviceState, ResourceManager};
use crate::protocol::{ObjectHandle, Rect, Resource3DSpecification, ResourceId, TransferDirection};
use crate::transfer::{CopySource, CopyTarget};
use crate::{Error, Result};

/// Operations accepted by [`Virgl3dDevice::ioctl`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ControlCode {
    Setup = 1,
    TransferData,
    SubmitCmd,
    FlushDisplay,
    CreateResource,
    Finish,
    ReadScanout,
    AllocateHandle,
}

impl ControlCode {
    pub fn from_raw(code: u32) -> Option<Self> {
        match code {
            1 => Some(ControlCode::Setup),
            2 => Some(ControlCode::TransferData),
            3 => Some(ControlCode::SubmitCmd),
            4 => Some(ControlCode::FlushDisplay),
            5 => Some(ControlCode::CreateResource),
            6 => Some(ControlCode::Finish),
            7 => Some(ControlCode::ReadScanout),
            8 => Some(ControlCode::AllocateHandle),
            _ => None,
        }
    }
}

/// Argument of a control request
pub enum ControlArg<'a> {
    None,
    Transfer {
        direction: u32,
        offset: usize,
        length: usize,
        data: &'a [u8],
    },
    Submit {
        count: usize,
        words: &'a [u32],
    },
    Resource(&'a Resource3DSpecification),
    Scanout {
        resource: ResourceId,
        rect: Rect,
        out: &'a mut [u8],
    },
}

/// VirGL 3D device
pub struct Virgl3dDevice<A: GpuAdapter> {
    inner: Mutex<ResourceManager<A>>,
}

impl<A: GpuAdapter> Virgl3dDevice<A> {
    /// Create the device and its rendering context
    pub fn new(adapter: A, config: Virgl3dConfig) -> Result<Self> {
        let manager = ResourceManager::new(adapter, config)?;
        Ok(Self {
            inner: Mutex::new(manager),
        })
    }

    /// Run `op` with exclusive access to the device state
    pub fn with_exclusive_lock<R, F>(&self, op: F) -> Result<R>
    where
        F: FnOnce(&mut ResourceManager<A>) -> Result<R>,
    {
        let mut manager = self.inner.lock();
        op(&mut manager)
    }

    pub fn state(&self) -> DeviceState {
        self.inner.lock().state()
    }

    /// One-time rendering setup
    pub fn setup(&self) -> Result<()> {
        self.with_exclusive_lock(|manager| manager.setup())
    }

    /// Stage caller bytes in the transfer region
    pub fn transfer_data<S>(
        &self,
        direction: u32,
        offset: usize,
        length: usize,
        source: &S,
    ) -> Result<()>
    where
        S: CopySource + ?Sized,
    {
        let direction =
            TransferDirection::from_raw(direction).ok_or(Error::InvalidDirection(direction))?;
        self.with_exclusive_lock(|manager| manager.transfer_data(direction, offset, length, source))
    }

    /// Submit the first `count` words of `words`
    pub fn submit_cmd(&self, count: usize, words: &[u32]) -> Result<()> {
        let words = words.get(..count).ok_or(Error::BadAddress)?;
        self.with_exclusive_lock(|manager| manager.submit_command_buffer(words))
    }

    pub fn flush_display(&self) -> Result<()> {
        self.with_exclusive_lock(|manager| manager.flush_display())
    }

    pub fn create_resource(&self, spec: &Resource3DSpecification) -> Result<ResourceId> {
        self.with_exclusive_lock(|manager| manager.create_resource(spec))
    }

    /// Tear down the context and hand the display back
    pub fn finish(&self) -> Result<()> {
        self.with_exclusive_lock(|manager| manager.finish())
    }

    pub fn read_scanout<T>(&self, resource: ResourceId, rect: Rect, target: &mut T) -> Result<usize>
    where
        T: CopyTarget + ?Sized,
    {
        self.with_exclusive_lock(|manager| manager.read_scanout(resource, rect, target))
    }

    pub fn register_scanout_framebuffer(&self, resource: ResourceId) -> Result<ObjectHandle> {
        self.with_exclusive_lock(|manager| manager.register_scanout_framebuffer(resource))
    }

    pub fn unregister_scanout_framebuffer(&self, resource: ResourceId) -> Result<()> {
        self.with_exclusive_lock(|manager| manager.unregister_scanout_framebuffer(resource))
    }

    pub fn transfer_scanout(&self, resource: ResourceId, dirty_rect: Rect) -> Result<usize> {
        self.with_exclusive_lock(|manager| manager.transfer_scanout(resource, dirty_rect))
    }

    /// Allocate a handle for a caller-built command buffer
    pub fn allocate_object_handle(&self) -> ObjectHandle {
        self.inner.lock().allocate_object_handle()
    }

    /// Dispatch a raw control request.
    ///
    /// Returns the resource id for CREATE_RESOURCE, the handle for
    /// ALLOCATE_HANDLE, the byte count for READ_SCANOUT and zero otherwise.
    pub fn ioctl(&self, code: u32, arg: ControlArg<'_>) -> syscall::Result<usize> {
        let control = ControlCode::from_raw(code).ok_or_else(|| {
            log::warn!("Unknown VirGL control code {:#x}", code);
            Error::UnknownOperation(code)
        })?;

        let value = match (control, arg) {
            (ControlCode::Setup, ControlArg::None) => self.setup().map(|_| 0),
            (
                ControlCode::TransferData,
                ControlArg::Transfer {
                    direction,
                    offset,
                    length,
                    data,
                },
            ) => self.transfer_data(direction, offset, length, data).map(|_| 0),
            (ControlCode::SubmitCmd, ControlArg::Submit { count, words }) => {
                self.submit_cmd(count, words).map(|_| 0)
            }
            (ControlCode::FlushDisplay, ControlArg::None) => self.flush_display().map(|_| 0),
            (ControlCode::CreateResource, ControlArg::Resource(spec)) => self
                .create_resource(spec)
                .map(|resource| resource.value() as usize),
            (ControlCode::Finish, ControlArg::None) => self.finish().map(|_| 0),
            (ControlCode::ReadScanout, ControlArg::Scanout { resource, rect, out }) => {
                self.read_scanout(resource, rect, out)
            }
            (ControlCode::AllocateHandle, ControlArg::None) => {
                Ok(self.allocate_object_handle().value() as usize)
            }
            (control, _) => {
                log::warn!("Argument does not match {:?}", control);
                Err(Error::InvalidArgument)
            }
        };
        Ok(value?)
    }

    /// Dispatch a raw control request, encoding failures as a negated errno
    pub fn ioctl_raw(&self, code: u32, arg: ControlArg<'_>) -> usize {
        syscall::Error::mux(self.ioctl(code, arg))
    }
}
