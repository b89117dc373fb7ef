//! Identifier allocation
//!
//! Object handles and resource ids come from independent monotonic
//! counters. Values below [`FIRST_HANDLE`] are reserved; nothing is recycled.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::protocol::{ObjectHandle, ResourceId};

/// First value issued in either namespace
pub const FIRST_HANDLE: u32 = 16;

/// Allocator for object handles and resource ids
#[derive(Debug)]
pub struct HandleAllocator {
    next_object: AtomicU32,
    next_resource: AtomicU32,
}

impl HandleAllocator {
    pub const fn new() -> Self {
        Self {
            next_object: AtomicU32::new(FIRST_HANDLE),
            next_resource: AtomicU32::new(FIRST_HANDLE),
        }
    }

    /// Allocate a new pipe-state object handle.
    ///
    /// Panics once the namespace is exhausted.
    pub fn allocate_object_handle(&self) -> ObjectHandle {
        match self.try_allocate_object_handle() {
            Some(handle) => handle,
            None => panic!("object handle namespace exhausted"),
        }
    }

    /// Allocate a new pipe-state object handle, or `None` once the
    /// namespace is exhausted
    pub fn try_allocate_object_handle(&self) -> Option<ObjectHandle> {
        next_value(&self.next_object).map(ObjectHandle::new)
    }

    /// Allocate a new resource id, or `None` once the namespace is exhausted
    pub fn allocate_resource_id(&self) -> Option<ResourceId> {
        next_value(&self.next_resource).map(ResourceId::new)
    }
}

/// Take the counter value and advance it. An exhausted counter is left at
/// `u32::MAX` so no value is issued twice.
fn next_value(counter: &AtomicU32) -> Option<u32> {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |next| next.checked_add(1))
        .ok()
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new()
    }
}
