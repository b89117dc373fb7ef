mod common;

use common::{Call, RecordingAdapter, FIRST_RESOURCE};
use virgl3d::stream::records;
use virgl3d::{
    AdapterError, BindFlags, ContextId, DeviceState, Error, ObjectHandle, Rect,
    Resource3DSpecification, ResourceId, TextureFormat, VirGLCommand, Virgl3dConfig,
    Virgl3dDevice,
};

const CTX: ContextId = ContextId::new(1);

fn texture(width: u32, height: u32) -> Resource3DSpecification {
    Resource3DSpecification::texture_2d(
        width,
        height,
        TextureFormat::B8G8R8X8Unorm,
        BindFlags::RENDER_TARGET,
    )
}

fn opcodes(words: &[u32]) -> Vec<VirGLCommand> {
    records(words)
        .map(|record| record.unwrap().0.command().unwrap())
        .collect()
}

#[test]
fn test_context_created_once_at_construction() {
    let device = common::device();
    assert_eq!(device.state(), DeviceState::ContextReady);
    assert_eq!(
        common::calls(&device),
        vec![Call::CreateContext("virgl3d".to_string())]
    );
}

#[test]
fn test_context_refusal_fails_construction() {
    let mut adapter = RecordingAdapter::new();
    adapter.refuse_context = true;
    let result = Virgl3dDevice::new(adapter, Virgl3dConfig::default());
    assert!(matches!(
        result,
        Err(Error::Adapter(AdapterError::OutOfMemory))
    ));
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = Virgl3dConfig::default().transfer_pages(0);
    assert!(matches!(
        Virgl3dDevice::new(RecordingAdapter::new(), config),
        Err(Error::InvalidConfig)
    ));
}

#[test]
fn test_setup_sequence() {
    let device = common::device();
    device.setup().unwrap();
    assert_eq!(device.state(), DeviceState::Operational);

    let drawtarget = ResourceId::new(FIRST_RESOURCE);
    let display = Rect::new(0, 0, 1024, 768);
    let calls = common::calls(&device);
    assert_eq!(
        calls[1],
        Call::CreateResource(Resource3DSpecification::texture_2d(
            1024,
            768,
            TextureFormat::B8G8R8X8Unorm,
            BindFlags::RENDER_TARGET | BindFlags::SCANOUT,
        ))
    );
    assert_eq!(calls[2], Call::Attach(CTX, drawtarget));
    assert!(matches!(calls[3], Call::Backing(id, _, 131072) if id == drawtarget));
    assert_eq!(calls[4], Call::SetScanout(0, Some(drawtarget), display));

    let submissions = device
        .with_exclusive_lock(|manager| Ok(manager.adapter().submissions()))
        .unwrap();
    assert_eq!(submissions.len(), 3);
    assert_eq!(
        opcodes(&submissions[0]),
        [
            VirGLCommand::CreateSubCtx,
            VirGLCommand::SetSubCtx,
            VirGLCommand::SetTweaks,
            VirGLCommand::SetTweaks,
            VirGLCommand::SetPolygonStipple,
        ]
    );
    assert_eq!(
        submissions[1],
        [
            0x0005_0801,
            16,
            FIRST_RESOURCE,
            TextureFormat::B8G8R8X8Unorm as u32,
            0,
            0,
            0x0003_0005,
            1,
            0,
            16,
            0x0002_0026,
            (768 << 16) | 1024,
            0,
        ]
    );
    assert_eq!(
        opcodes(&submissions[2]),
        [
            VirGLCommand::SetViewportState,
            VirGLCommand::CreateObject,
            VirGLCommand::BindObject,
            VirGLCommand::SetTessState,
        ]
    );

    device.flush_display().unwrap();
    assert_eq!(
        common::calls(&device).last(),
        Some(&Call::Flush(drawtarget, display))
    );
}

#[test]
fn test_failed_setup_is_rolled_back() {
    let mut adapter = RecordingAdapter::new();
    adapter.max_words = 10;
    let device = Virgl3dDevice::new(adapter, Virgl3dConfig::default()).unwrap();

    assert_eq!(
        device.setup(),
        Err(Error::CommandBufferTooLarge {
            words: 43,
            capacity: 10
        })
    );
    assert_eq!(device.state(), DeviceState::ContextReady);

    let first = ResourceId::new(FIRST_RESOURCE);
    let display = Rect::new(0, 0, 1024, 768);
    let calls = common::calls(&device);
    assert_eq!(calls.len(), 7);
    assert_eq!(calls[4], Call::SetScanout(0, Some(first), display));
    assert_eq!(calls[5], Call::SetScanout(0, None, display));
    assert_eq!(calls[6], Call::Detach(CTX, first));
    let known = device
        .with_exclusive_lock(|manager| {
            Ok((manager.has_resource(first), manager.drawtarget()))
        })
        .unwrap();
    assert_eq!(known, (false, None));

    // A retry builds exactly one new drawtarget
    device
        .with_exclusive_lock(|manager| {
            manager.adapter_mut().max_words = 4096;
            Ok(())
        })
        .unwrap();
    device.setup().unwrap();
    let second = ResourceId::new(FIRST_RESOURCE + 1);
    let creates = common::calls(&device)
        .iter()
        .filter(|call| matches!(call, Call::CreateResource(_)))
        .count();
    assert_eq!(creates, 2);

    let before = common::calls(&device).len();
    device.finish().unwrap();
    assert_eq!(
        &common::calls(&device)[before..],
        &[
            Call::Submit(CTX, vec![0x0001_0803, 16]),
            Call::SetScanout(0, None, display),
            Call::Detach(CTX, second),
            Call::DestroyContext(CTX),
        ]
    );
}

#[test]
fn test_setup_failure_after_registration_destroys_surface() {
    let mut adapter = RecordingAdapter::new();
    adapter.refuse_submission = Some(2);
    let device = Virgl3dDevice::new(adapter, Virgl3dConfig::default()).unwrap();

    assert_eq!(
        device.setup(),
        Err(Error::Adapter(AdapterError::InvalidParameter))
    );
    assert_eq!(device.state(), DeviceState::ContextReady);

    let drawtarget = ResourceId::new(FIRST_RESOURCE);
    let calls = common::calls(&device);
    let tail = &calls[calls.len() - 3..];
    assert_eq!(
        tail,
        &[
            Call::Submit(CTX, vec![0x0001_0803, 16]),
            Call::SetScanout(0, None, Rect::new(0, 0, 1024, 768)),
            Call::Detach(CTX, drawtarget),
        ]
    );
    let surface = device
        .with_exclusive_lock(|manager| Ok(manager.scanout_surface(drawtarget)))
        .unwrap();
    assert_eq!(surface, None);

    let before = calls.len();
    device.finish().unwrap();
    assert_eq!(
        &common::calls(&device)[before..],
        &[Call::DestroyContext(CTX)]
    );
}

#[test]
fn test_setup_twice_is_rejected() {
    let device = common::device();
    device.setup().unwrap();
    let before = common::calls(&device).len();
    assert_eq!(
        device.setup(),
        Err(Error::InvalidState(DeviceState::Operational))
    );
    assert_eq!(common::calls(&device).len(), before);
}

#[test]
fn test_flush_without_drawtarget() {
    let device = common::device();
    assert_eq!(device.flush_display(), Err(Error::NoDrawtarget));
}

#[test]
fn test_finish_tears_down() {
    let device = common::device();
    device.setup().unwrap();
    let before = common::calls(&device).len();

    device.finish().unwrap();
    assert_eq!(device.state(), DeviceState::TornDown);

    let drawtarget = ResourceId::new(FIRST_RESOURCE);
    let calls = common::calls(&device);
    assert_eq!(
        &calls[before..],
        &[
            Call::Submit(CTX, vec![0x0001_0803, 16]),
            Call::SetScanout(0, None, Rect::new(0, 0, 1024, 768)),
            Call::Detach(CTX, drawtarget),
            Call::DestroyContext(CTX),
        ]
    );
}

#[test]
fn test_operations_after_finish_fail() {
    let device = common::device();
    device.finish().unwrap();

    let torn_down = Err(Error::InvalidState(DeviceState::TornDown));
    assert_eq!(device.finish(), torn_down);
    assert_eq!(device.setup(), torn_down);
    assert_eq!(device.submit_cmd(1, &[0x0000_002C]), torn_down);
    assert_eq!(device.transfer_data(1, 0, 1, &[0u8][..]), torn_down);
    assert_eq!(
        device.create_resource(&texture(4, 4)),
        Err(Error::InvalidState(DeviceState::TornDown))
    );
}

#[test]
fn test_transfer_overflow_leaves_region_unchanged() {
    let device = common::device();
    let capacity = 32 * 4096;
    let data = vec![0xABu8; 128];

    assert_eq!(
        device.transfer_data(1, capacity - 64, 128, &data[..]),
        Err(Error::TransferOutOfBounds {
            offset: capacity - 64,
            length: 128,
            capacity,
        })
    );
    let untouched = device
        .with_exclusive_lock(|manager| Ok(manager.region().as_slice().iter().all(|b| *b == 0)))
        .unwrap();
    assert!(untouched);

    device.transfer_data(1, capacity - 128, 128, &data[..]).unwrap();
}

#[test]
fn test_transfer_direction_validation() {
    let device = common::device();
    let data = [1u8; 4];
    assert_eq!(
        device.transfer_data(2, 0, 4, &data[..]),
        Err(Error::InvalidDirection(2))
    );
    assert_eq!(
        device.transfer_data(3, 0, 4, &data[..]),
        Err(Error::InvalidDirection(3))
    );
    assert_eq!(
        device.transfer_data(0, 0, 4, &data[..]),
        Err(Error::InvalidDirection(0))
    );
}

#[test]
fn test_oversized_submit_is_not_forwarded() {
    let mut adapter = RecordingAdapter::new();
    adapter.max_words = 8;
    let device = Virgl3dDevice::new(adapter, Virgl3dConfig::default()).unwrap();

    let words = [0u32; 9];
    assert_eq!(
        device.submit_cmd(words.len(), &words),
        Err(Error::CommandBufferTooLarge {
            words: 9,
            capacity: 8
        })
    );
    assert_eq!(
        device.submit_cmd(10, &words),
        Err(Error::BadAddress)
    );
    assert!(common::calls(&device)
        .iter()
        .all(|call| !matches!(call, Call::Submit(..))));

    device.submit_cmd(8, &words).unwrap();
}

#[test]
fn test_scanout_registration_rules() {
    let device = common::device();
    let resource = device.create_resource(&texture(64, 64)).unwrap();

    let surface = device.register_scanout_framebuffer(resource).unwrap();
    assert_eq!(
        device.register_scanout_framebuffer(resource),
        Err(Error::AlreadyRegistered(resource))
    );

    device.unregister_scanout_framebuffer(resource).unwrap();
    assert_eq!(
        common::last_submission(&device),
        [0x0001_0803, surface.value()]
    );
    assert_eq!(
        device.unregister_scanout_framebuffer(resource),
        Err(Error::NotRegistered(resource))
    );

    let again = device.register_scanout_framebuffer(resource).unwrap();
    assert_ne!(again, surface);
}

#[test]
fn test_scanout_rejects_extent_beyond_16_bits() {
    let device = common::device();
    let wide = device
        .create_resource(&Resource3DSpecification::buffer(
            70_000,
            BindFlags::VERTEX_BUFFER,
        ))
        .unwrap();
    let submitted = common::calls(&device).len();

    assert_eq!(
        device.register_scanout_framebuffer(wide),
        Err(Error::InvalidArgument)
    );
    assert_eq!(common::calls(&device).len(), submitted);
    assert_eq!(device.allocate_object_handle(), ObjectHandle::new(16));
}

#[test]
fn test_scanout_requires_known_resource() {
    let device = common::device();
    let stranger = ResourceId::new(999);
    assert_eq!(
        device.register_scanout_framebuffer(stranger),
        Err(Error::UnknownResource(stranger))
    );
    assert_eq!(
        device.unregister_scanout_framebuffer(stranger),
        Err(Error::NotRegistered(stranger))
    );
}

#[test]
fn test_transfer_scanout_validation() {
    let device = common::device();
    let resource = device.create_resource(&texture(64, 64)).unwrap();
    assert_eq!(
        device.transfer_scanout(resource, Rect::new(0, 0, 8, 8)),
        Err(Error::NotRegistered(resource))
    );

    device.register_scanout_framebuffer(resource).unwrap();
    assert_eq!(
        device.transfer_scanout(resource, Rect::new(60, 0, 8, 8)),
        Err(Error::InvalidArgument)
    );
    assert_eq!(
        device.transfer_scanout(resource, Rect::new(0, 0, 0, 8)),
        Err(Error::InvalidArgument)
    );
}

#[test]
fn test_resource_refusal_leaves_device_usable() {
    let device = common::device();
    device
        .with_exclusive_lock(|manager| {
            manager.adapter_mut().refuse_resource = Some(AdapterError::OutOfMemory);
            Ok(())
        })
        .unwrap();

    assert_eq!(
        device.create_resource(&texture(8, 8)),
        Err(Error::Adapter(AdapterError::OutOfMemory))
    );
    let resource = device.create_resource(&texture(8, 8)).unwrap();
    assert_eq!(resource, ResourceId::new(FIRST_RESOURCE));
}

#[test]
fn test_unbacked_resource_is_not_registered() {
    let device = common::device();
    device
        .with_exclusive_lock(|manager| {
            manager.adapter_mut().refuse_backing = true;
            Ok(())
        })
        .unwrap();

    assert_eq!(
        device.create_resource(&texture(8, 8)),
        Err(Error::Adapter(AdapterError::InvalidParameter))
    );
    let unbacked = ResourceId::new(FIRST_RESOURCE);
    assert!(common::calls(&device).contains(&Call::Detach(CTX, unbacked)));
    assert_eq!(
        device.register_scanout_framebuffer(unbacked),
        Err(Error::UnknownResource(unbacked))
    );
}

#[test]
fn test_invalid_spec_never_reaches_adapter() {
    let device = common::device();
    let mut spec = texture(8, 8);
    spec.depth = 0;
    assert_eq!(device.create_resource(&spec), Err(Error::InvalidResourceSpec));
    assert_eq!(common::calls(&device).len(), 1);
}

#[test]
fn test_device_handles_are_shared_with_setup() {
    let device = common::device();
    let first = device.allocate_object_handle();
    assert_eq!(first, ObjectHandle::new(16));

    device.setup().unwrap();
    // Drawtarget surface and blend object follow the handle drawn above
    let surface = device
        .with_exclusive_lock(|manager| Ok(manager.scanout_surface(ResourceId::new(FIRST_RESOURCE))))
        .unwrap();
    assert_eq!(surface, Some(ObjectHandle::new(17)));
    assert_eq!(device.allocate_object_handle(), ObjectHandle::new(19));
}
