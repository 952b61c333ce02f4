//! Transfer Manager Integration Tests
//!
//! Tests for:
//! - Staged partial copies with read-back verification
//! - Staging-pool exhaustion across multiple commits
//! - Concurrent transactions from many threads
//! - Queue-family ownership round-trips
//! - Staging reclaim and the transaction state machine
//! - Image uploads and read-backs

use std::sync::Arc;

use helios::errors::HeliosError;
use helios::gpu::{
    Access, BufferDescriptor, BufferUsage, Device, DeviceDescriptor, Extent3, ImageAspects,
    ImageDescriptor, ImageLayout, ImageUsage, Offset3, PipelineStages,
};
use helios::memory::{
    BarrierLocation, BufferBarrier, BufferToBufferCopy, ImageBarrier, ImageRegion,
    ImageToBufferCopy, StagingBufferCopy, StagingImageCopy, TransferBuffer, TransferImage,
    TransferManager,
};

fn device() -> Arc<Device> {
    let _ = env_logger::builder().is_test(true).try_init();
    Device::new(&DeviceDescriptor::default()).unwrap()
}

fn host_buffer(device: &Device, size: u64) -> Arc<TransferBuffer> {
    let buffer = device
        .create_buffer(&BufferDescriptor {
            size,
            usage: BufferUsage::STORAGE | BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST,
            host_visible: true,
        })
        .unwrap();
    TransferBuffer::new(buffer, 0)
}

fn device_buffer(device: &Device, size: u64) -> Arc<TransferBuffer> {
    let buffer = device
        .create_buffer(&BufferDescriptor {
            size,
            usage: BufferUsage::STORAGE | BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST,
            host_visible: false,
        })
        .unwrap();
    TransferBuffer::new(buffer, 0)
}

fn transfer_read_barrier(buffer: &Arc<TransferBuffer>) -> BufferBarrier {
    BufferBarrier {
        buffer: buffer.clone(),
        dst_family: None,
        src_stage: PipelineStages::NONE,
        dst_stage: PipelineStages::TRANSFER,
        src_access: Access::NONE,
        dst_access: Access::TRANSFER_READ,
    }
}

fn host_read_barrier(buffer: &Arc<TransferBuffer>) -> BufferBarrier {
    BufferBarrier {
        buffer: buffer.clone(),
        dst_family: None,
        src_stage: PipelineStages::NONE,
        dst_stage: PipelineStages::HOST,
        src_access: Access::NONE,
        dst_access: Access::HOST_READ,
    }
}

// ============================================================================
// Partial copies
// ============================================================================

#[test]
fn partial_copies_land_at_their_offsets() {
    let device = device();
    let manager = TransferManager::new(device.clone(), 1 << 20).unwrap();

    let element_count = 1024u32;
    let data: Vec<u32> = (0..element_count).collect();
    let bytes: &[u8] = bytemuck::cast_slice(&data);

    let src = host_buffer(&device, u64::from(element_count) * 4);
    let dst = host_buffer(&device, u64::from(element_count) * 4);

    // Fill the source through the staging pool.
    let mut transaction = manager.begin();
    let staged = transaction
        .stage_buffer_copy(
            &StagingBufferCopy {
                dst: src.clone(),
                data: bytes,
                offset: 0,
                dst_on_dedicated_transfer: false,
            },
            Some(&transfer_read_barrier(&src)),
            false,
        )
        .unwrap();
    assert!(staged);
    transaction.commit().unwrap();
    transaction.wait().unwrap();

    // First block of 256 elements to the first block.
    let mut transaction = manager.begin();
    transaction
        .stage_buffer_to_buffer(
            &BufferToBufferCopy {
                src: src.clone(),
                dst: dst.clone(),
                size: Some(256 * 4),
                src_offset: 0,
                dst_offset: 0,
                src_on_dedicated_transfer: false,
                dst_on_dedicated_transfer: false,
            },
            Some(&transfer_read_barrier(&src)),
            Some(&host_read_barrier(&dst)),
        )
        .unwrap();
    transaction.commit().unwrap();
    transaction.wait().unwrap();
    assert_eq!(dst.read(0, 256 * 4).unwrap(), bytes[..256 * 4]);

    // Fourth block of 256 elements to the second block.
    let mut transaction = manager.begin();
    transaction
        .stage_buffer_to_buffer(
            &BufferToBufferCopy {
                src: src.clone(),
                dst: dst.clone(),
                size: Some(256 * 4),
                src_offset: 256 * 4 * 3,
                dst_offset: 256 * 4,
                src_on_dedicated_transfer: false,
                dst_on_dedicated_transfer: false,
            },
            Some(&transfer_read_barrier(&src)),
            Some(&host_read_barrier(&dst)),
        )
        .unwrap();
    transaction.commit().unwrap();
    transaction.wait().unwrap();
    assert_eq!(
        dst.read(256 * 4, 256 * 4).unwrap(),
        bytes[256 * 4 * 3..256 * 4 * 4]
    );
}

#[test]
fn manual_barriers_cover_multiple_copies() {
    let device = device();
    let manager = TransferManager::new(device.clone(), 1 << 20).unwrap();
    let data: Vec<u32> = (0..1024).collect();
    let bytes: &[u8] = bytemuck::cast_slice(&data);

    let src = host_buffer(&device, 4096);
    let dst = host_buffer(&device, 4096);
    src.write(0, bytes).unwrap();

    let mut transaction = manager.begin();
    transaction
        .stage_barrier(transfer_read_barrier(&src), BarrierLocation::BeforeCopy)
        .unwrap();
    transaction
        .stage_barrier(
            BufferBarrier {
                buffer: dst.clone(),
                dst_family: None,
                src_stage: PipelineStages::NONE,
                dst_stage: PipelineStages::TRANSFER,
                src_access: Access::NONE,
                dst_access: Access::TRANSFER_WRITE,
            },
            BarrierLocation::BeforeCopy,
        )
        .unwrap();
    // Two copies bracketed by a single pair of manual barriers.
    transaction
        .stage_buffer_to_buffer(
            &BufferToBufferCopy {
                src: src.clone(),
                dst: dst.clone(),
                size: Some(1024),
                src_offset: 0,
                dst_offset: 2048,
                src_on_dedicated_transfer: false,
                dst_on_dedicated_transfer: false,
            },
            None,
            None,
        )
        .unwrap();
    transaction
        .stage_buffer_to_buffer(
            &BufferToBufferCopy {
                src: src.clone(),
                dst: dst.clone(),
                size: Some(1024),
                src_offset: 2048,
                dst_offset: 3072,
                src_on_dedicated_transfer: false,
                dst_on_dedicated_transfer: false,
            },
            None,
            None,
        )
        .unwrap();
    transaction
        .stage_barrier(
            BufferBarrier {
                buffer: dst.clone(),
                dst_family: None,
                src_stage: PipelineStages::TRANSFER,
                dst_stage: PipelineStages::HOST,
                src_access: Access::TRANSFER_WRITE,
                dst_access: Access::HOST_READ,
            },
            BarrierLocation::AfterCopy,
        )
        .unwrap();
    transaction.commit().unwrap();
    transaction.wait().unwrap();

    assert_eq!(dst.read(2048, 1024).unwrap(), bytes[..1024]);
    assert_eq!(dst.read(3072, 1024).unwrap(), bytes[2048..3072]);
}

// ============================================================================
// Pool exhaustion
// ============================================================================

#[test]
fn large_copies_span_multiple_commits() {
    // Pool of 256 KiB; eight 128 KiB uploads need exactly four commits.
    let device = device();
    let manager = TransferManager::new(device.clone(), 256 * 1024).unwrap();
    let data = vec![0xa5u8; 128 * 1024];
    let buffers: Vec<_> = (0..8).map(|_| device_buffer(&device, 128 * 1024)).collect();

    let mut transaction = manager.begin();
    let mut commits = 0usize;
    let mut index = 0usize;
    while index < buffers.len() {
        let copy = StagingBufferCopy {
            dst: buffers[index].clone(),
            data: &data,
            offset: 0,
            dst_on_dedicated_transfer: true,
        };
        if transaction.stage_buffer_copy(&copy, None, true).unwrap() {
            index += 1;
        } else {
            transaction.commit().unwrap();
            commits += 1;
            transaction = manager.begin();
        }
    }
    transaction.commit().unwrap();
    transaction.wait().unwrap();
    commits += 1;

    assert_eq!(commits, 4);
    assert_eq!(manager.staging_pool().free_space(), 256 * 1024);
}

#[test]
fn failed_allocation_without_wait_returns_false() {
    let device = device();
    let manager = TransferManager::new(device.clone(), 128).unwrap();
    let dst = device_buffer(&device, 1024);
    let data = vec![0u8; 256];

    let mut transaction = manager.begin();
    let staged = transaction
        .stage_buffer_copy(
            &StagingBufferCopy {
                dst,
                data: &data,
                offset: 0,
                dst_on_dedicated_transfer: false,
            },
            None,
            false,
        )
        .unwrap();
    assert!(!staged);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn concurrent_transactions_roundtrip_correctly() {
    let device = device();
    let manager = TransferManager::new(device.clone(), 1 << 20).unwrap();
    let data: Vec<u32> = (0..256).collect();
    let bytes: Vec<u8> = bytemuck::cast_slice(&data).to_vec();

    std::thread::scope(|scope| {
        for _ in 0..16 {
            let device = device.clone();
            let manager = manager.clone();
            let bytes = bytes.clone();
            scope.spawn(move || {
                for _ in 0..100 {
                    let dev = device_buffer(&device, 1024);
                    let host = host_buffer(&device, 1024);

                    // Upload into the device buffer.
                    let mut upload = manager.begin();
                    assert!(
                        upload
                            .stage_buffer_copy(
                                &StagingBufferCopy {
                                    dst: dev.clone(),
                                    data: &bytes,
                                    offset: 0,
                                    dst_on_dedicated_transfer: false,
                                },
                                Some(&transfer_read_barrier(&dev)),
                                true,
                            )
                            .unwrap()
                    );
                    upload.commit().unwrap();
                    upload.wait().unwrap();

                    // Copy back into the host buffer.
                    let mut readback = manager.begin();
                    readback
                        .stage_buffer_to_buffer(
                            &BufferToBufferCopy {
                                src: dev.clone(),
                                dst: host.clone(),
                                size: None,
                                src_offset: 0,
                                dst_offset: 0,
                                src_on_dedicated_transfer: false,
                                dst_on_dedicated_transfer: false,
                            },
                            Some(&transfer_read_barrier(&dev)),
                            Some(&host_read_barrier(&host)),
                        )
                        .unwrap();
                    readback.commit().unwrap();
                    readback.wait().unwrap();

                    assert_eq!(host.read(0, 1024).unwrap(), bytes);
                }
            });
        }
    });
}

// ============================================================================
// Ownership
// ============================================================================

#[test]
fn ownership_transfers_follow_the_barrier_destination() {
    let device = device();
    let manager = TransferManager::new(device.clone(), 4096).unwrap();
    let buffer = device_buffer(&device, 256);
    assert_eq!(buffer.queue_family(), 0);

    let mut transaction = manager.begin();
    transaction
        .stage_barrier(
            BufferBarrier {
                buffer: buffer.clone(),
                dst_family: Some(2),
                src_stage: PipelineStages::NONE,
                dst_stage: PipelineStages::TRANSFER,
                src_access: Access::NONE,
                dst_access: Access::TRANSFER_WRITE,
            },
            BarrierLocation::BeforeCopy,
        )
        .unwrap();
    transaction.commit().unwrap();

    // Release on family 0, acquire on family 2: one signal each.
    assert_eq!(transaction.semaphore_values().unwrap(), &[1, 0, 1]);
    transaction.wait().unwrap();
    assert_eq!(buffer.queue_family(), 2);
}

#[test]
fn dedicated_transfer_routes_ownership_and_back() {
    let device = device();
    let manager = TransferManager::new(device.clone(), 4096).unwrap();
    let buffer = device_buffer(&device, 256);
    let data = vec![7u8; 256];

    let mut transaction = manager.begin();
    assert!(
        transaction
            .stage_buffer_copy(
                &StagingBufferCopy {
                    dst: buffer.clone(),
                    data: &data,
                    offset: 0,
                    dst_on_dedicated_transfer: true,
                },
                Some(&BufferBarrier {
                    buffer: buffer.clone(),
                    dst_family: None,
                    src_stage: PipelineStages::NONE,
                    dst_stage: PipelineStages::COMPUTE_SHADER,
                    src_access: Access::NONE,
                    dst_access: Access::SHADER_READ,
                }),
                false,
            )
            .unwrap()
    );
    transaction.commit().unwrap();
    transaction.wait().unwrap();

    // Ownership went through the transfer family and returned.
    assert_eq!(buffer.queue_family(), 0);
}

// ============================================================================
// Reclaim & state machine
// ============================================================================

#[test]
fn staging_space_returns_after_wait() {
    let device = device();
    let manager = TransferManager::new(device.clone(), 1024).unwrap();
    let dst = device_buffer(&device, 1024);
    let data = vec![1u8; 256];

    for _ in 0..3 {
        let mut transaction = manager.begin();
        assert!(
            transaction
                .stage_buffer_copy(
                    &StagingBufferCopy {
                        dst: dst.clone(),
                        data: &data,
                        offset: 0,
                        dst_on_dedicated_transfer: false,
                    },
                    None,
                    false,
                )
                .unwrap()
        );
        transaction.commit().unwrap();
        transaction.wait().unwrap();
    }
    assert_eq!(manager.staging_pool().free_space(), 1024);
}

#[test]
fn dropped_transactions_reclaim_on_manager_wait() {
    let device = device();
    let manager = TransferManager::new(device.clone(), 1024).unwrap();
    let dst = device_buffer(&device, 1024);
    let data = vec![1u8; 512];

    let mut transaction = manager.begin();
    assert!(
        transaction
            .stage_buffer_copy(
                &StagingBufferCopy {
                    dst: dst.clone(),
                    data: &data,
                    offset: 0,
                    dst_on_dedicated_transfer: false,
                },
                None,
                false,
            )
            .unwrap()
    );
    transaction.commit().unwrap();
    drop(transaction);

    assert_eq!(manager.staging_pool().free_space(), 512);
    manager.wait().unwrap();
    assert_eq!(manager.staging_pool().free_space(), 1024);
}

#[test]
fn transaction_state_machine_is_enforced() {
    let device = device();
    let manager = TransferManager::new(device.clone(), 4096).unwrap();
    let dst = device_buffer(&device, 256);
    let data = vec![0u8; 64];

    let mut transaction = manager.begin();
    assert!(matches!(
        transaction.wait(),
        Err(HeliosError::InvalidState(_))
    ));
    assert!(matches!(
        transaction.semaphore_values(),
        Err(HeliosError::InvalidState(_))
    ));

    transaction.commit().unwrap();
    assert!(matches!(
        transaction.commit(),
        Err(HeliosError::InvalidState(_))
    ));
    assert!(matches!(
        transaction.stage_buffer_copy(
            &StagingBufferCopy {
                dst,
                data: &data,
                offset: 0,
                dst_on_dedicated_transfer: false,
            },
            None,
            false,
        ),
        Err(HeliosError::InvalidState(_))
    ));
    transaction.wait().unwrap();
}

// ============================================================================
// Images
// ============================================================================

#[test]
fn image_upload_and_readback() {
    let device = device();
    let manager = TransferManager::new(device.clone(), 1 << 16).unwrap();

    let image = TransferImage::new(
        device
            .create_image(&ImageDescriptor {
                extent: Extent3::new(4, 4, 1),
                mip_levels: 1,
                array_layers: 1,
                bytes_per_texel: 4,
                usage: ImageUsage::TRANSFER_SRC | ImageUsage::TRANSFER_DST,
            })
            .unwrap(),
        0,
    );
    let texels: Vec<u8> = (0..64).collect();
    let region = ImageRegion {
        data_offset: 0,
        aspects: ImageAspects::COLOR,
        mip_level: 0,
        base_array_layer: 0,
        layer_count: 1,
        offset: Offset3::default(),
        extent: Extent3::new(4, 4, 1),
    };

    let mut upload = manager.begin();
    assert!(
        upload
            .stage_image_copy(
                &StagingImageCopy {
                    dst: image.clone(),
                    data: &texels,
                    regions: vec![region.clone()],
                    dst_on_dedicated_transfer: false,
                },
                Some(&ImageBarrier {
                    image: image.clone(),
                    dst_family: None,
                    src_stage: PipelineStages::NONE,
                    dst_stage: PipelineStages::FRAGMENT_SHADER,
                    src_access: Access::NONE,
                    dst_access: Access::SHADER_READ,
                    src_layout: ImageLayout::Undefined,
                    dst_layout: ImageLayout::ShaderReadOnly,
                    aspects: ImageAspects::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                }),
                false,
            )
            .unwrap()
    );
    upload.commit().unwrap();
    upload.wait().unwrap();
    assert_eq!(image.image().read_subresource(0, 0).unwrap(), texels);

    // Read the image back into a host buffer.
    let readback_buffer = host_buffer(&device, 64);
    let mut readback = manager.begin();
    readback
        .stage_image_to_buffer(
            &ImageToBufferCopy {
                src: image.clone(),
                dst: readback_buffer.clone(),
                regions: vec![region],
                dst_on_dedicated_transfer: false,
            },
            None,
            Some(&host_read_barrier(&readback_buffer)),
        )
        .unwrap();
    readback.commit().unwrap();
    readback.wait().unwrap();
    assert_eq!(readback_buffer.read(0, 64).unwrap(), texels);
}

#[test]
fn image_tiles_track_their_owning_family() {
    let device = device();
    let manager = TransferManager::new(device.clone(), 4096).unwrap();
    let image = TransferImage::new(
        device
            .create_image(&ImageDescriptor {
                extent: Extent3::new(8, 8, 1),
                mip_levels: 2,
                array_layers: 2,
                bytes_per_texel: 4,
                usage: ImageUsage::TRANSFER_DST,
            })
            .unwrap(),
        0,
    );

    let mut transaction = manager.begin();
    transaction
        .stage_image_barrier(
            ImageBarrier {
                image: image.clone(),
                dst_family: Some(1),
                src_stage: PipelineStages::NONE,
                dst_stage: PipelineStages::COMPUTE_SHADER,
                src_access: Access::NONE,
                dst_access: Access::SHADER_READ,
                src_layout: ImageLayout::Undefined,
                dst_layout: ImageLayout::General,
                aspects: ImageAspects::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 2,
            },
            BarrierLocation::BeforeCopy,
        )
        .unwrap();
    transaction.commit().unwrap();
    transaction.wait().unwrap();

    // Only the first mip changed hands.
    assert_eq!(image.queue_family(0, 0), 1);
    assert_eq!(image.queue_family(0, 1), 1);
    assert_eq!(image.queue_family(1, 0), 0);
    assert_eq!(image.queue_family(1, 1), 0);
}
