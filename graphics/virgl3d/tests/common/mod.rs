#![allow(dead_code)]

use virgl3d::{
    AdapterError, AdapterResult, ContextId, GpuAdapter, Rect, Resource3DSpecification,
    ResourceId, Virgl3dConfig, Virgl3dDevice,
};

/// First resource id handed out by [`RecordingAdapter`]
pub const FIRST_RESOURCE: u32 = 100;

/// One adapter request
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateContext(String),
    DestroyContext(ContextId),
    CreateResource(Resource3DSpecification),
    Attach(ContextId, ResourceId),
    Detach(ContextId, ResourceId),
    Backing(ResourceId, u64, usize),
    Submit(ContextId, Vec<u32>),
    Flush(ResourceId, Rect),
    SetScanout(u32, Option<ResourceId>, Rect),
}

/// Adapter that records every request and can be told to refuse some
pub struct RecordingAdapter {
    pub calls: Vec<Call>,
    pub max_words: usize,
    pub refuse_context: bool,
    pub refuse_resource: Option<AdapterError>,
    pub refuse_backing: bool,
    /// Zero-based index of a command buffer submission to refuse
    pub refuse_submission: Option<usize>,
    submit_attempts: usize,
    next_resource: u32,
}

impl RecordingAdapter {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            max_words: 4096,
            refuse_context: false,
            refuse_resource: None,
            refuse_backing: false,
            refuse_submission: None,
            submit_attempts: 0,
            next_resource: FIRST_RESOURCE,
        }
    }

    /// Command buffers submitted so far
    pub fn submissions(&self) -> Vec<Vec<u32>> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Submit(_, words) => Some(words.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_submission(&self) -> Vec<u32> {
        self.submissions().pop().expect("nothing submitted")
    }
}

impl GpuAdapter for RecordingAdapter {
    fn create_context(&mut self, name: &str) -> AdapterResult<ContextId> {
        if self.refuse_context {
            return Err(AdapterError::OutOfMemory);
        }
        self.calls.push(Call::CreateContext(name.to_string()));
        Ok(ContextId::new(1))
    }

    fn destroy_context(&mut self, ctx: ContextId) -> AdapterResult<()> {
        self.calls.push(Call::DestroyContext(ctx));
        Ok(())
    }

    fn create_3d_resource(&mut self, spec: &Resource3DSpecification) -> AdapterResult<ResourceId> {
        if let Some(err) = self.refuse_resource.take() {
            return Err(err);
        }
        self.calls.push(Call::CreateResource(*spec));
        let id = ResourceId::new(self.next_resource);
        self.next_resource += 1;
        Ok(id)
    }

    fn attach_resource_to_context(
        &mut self,
        ctx: ContextId,
        resource: ResourceId,
    ) -> AdapterResult<()> {
        self.calls.push(Call::Attach(ctx, resource));
        Ok(())
    }

    fn detach_resource_from_context(
        &mut self,
        ctx: ContextId,
        resource: ResourceId,
    ) -> AdapterResult<()> {
        self.calls.push(Call::Detach(ctx, resource));
        Ok(())
    }

    fn ensure_backing_storage(
        &mut self,
        resource: ResourceId,
        address: u64,
        length: usize,
    ) -> AdapterResult<()> {
        if self.refuse_backing {
            return Err(AdapterError::InvalidParameter);
        }
        self.calls.push(Call::Backing(resource, address, length));
        Ok(())
    }

    fn max_command_words(&self) -> usize {
        self.max_words
    }

    fn submit_command_buffer(&mut self, ctx: ContextId, words: &[u32]) -> AdapterResult<()> {
        let attempt = self.submit_attempts;
        self.submit_attempts += 1;
        if self.refuse_submission == Some(attempt) {
            return Err(AdapterError::InvalidParameter);
        }
        self.calls.push(Call::Submit(ctx, words.to_vec()));
        Ok(())
    }

    fn flush_resource(&mut self, resource: ResourceId, rect: Rect) -> AdapterResult<()> {
        self.calls.push(Call::Flush(resource, rect));
        Ok(())
    }

    fn set_scanout(
        &mut self,
        scanout_id: u32,
        resource: Option<ResourceId>,
        rect: Rect,
    ) -> AdapterResult<()> {
        self.calls.push(Call::SetScanout(scanout_id, resource, rect));
        Ok(())
    }
}

/// Device over a fresh recording adapter with the default configuration
pub fn device() -> Virgl3dDevice<RecordingAdapter> {
    Virgl3dDevice::new(RecordingAdapter::new(), Virgl3dConfig::default())
        .expect("device creation failed")
}

/// Snapshot of the adapter requests made by `device`
pub fn calls(device: &Virgl3dDevice<RecordingAdapter>) -> Vec<Call> {
    device
        .with_exclusive_lock(|manager| Ok(manager.adapter().calls.clone()))
        .unwrap()
}

pub fn last_submission(device: &Virgl3dDevice<RecordingAdapter>) -> Vec<u32> {
    device
        .with_exclusive_lock(|manager| Ok(manager.adapter().last_submission()))
        .unwrap()
}
