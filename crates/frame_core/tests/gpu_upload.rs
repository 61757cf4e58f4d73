//! Upload and read-back against a real device.
//!
//! Needs a Vulkan driver; run with `cargo test -- --ignored`.

use ash::vk;
use frame_core::config::RendererConfig;
use frame_core::render::uniform::{ObjectUniform, UniformLayout};
use frame_core::render::vulkan::{UploadContext, VulkanContext, VulkanError};

fn headless() -> VulkanContext {
    let config = RendererConfig {
        application_name: "frame_core tests".to_string(),
        enable_validation: false,
        ..RendererConfig::default()
    };
    VulkanContext::headless(&config).expect("headless Vulkan device")
}

#[test]
#[ignore = "requires a Vulkan device"]
fn upload_then_download_round_trips() {
    let context = headless();
    let upload = UploadContext::new(&context).unwrap();

    let data: Vec<u8> = (0..=255u8).cycle().take(4099).collect();
    let buffer = upload
        .create_device_local_buffer(vk::BufferUsageFlags::TRANSFER_SRC, &data)
        .unwrap();

    assert!(!buffer.is_host_visible());
    assert_eq!(upload.download_from_buffer(&buffer, data.len()).unwrap(), data);
}

#[test]
#[ignore = "requires a Vulkan device"]
fn partial_read_back_returns_prefix() {
    let context = headless();
    let upload = UploadContext::new(&context).unwrap();

    let values: Vec<u32> = (0..64).collect();
    let buffer = upload
        .create_device_local_buffer(vk::BufferUsageFlags::TRANSFER_SRC, bytemuck::cast_slice(&values))
        .unwrap();

    let bytes = upload.download_from_buffer(&buffer, 16).unwrap();
    assert_eq!(bytemuck::cast_slice::<u8, u32>(&bytes), &[0, 1, 2, 3]);
}

#[test]
#[ignore = "requires a Vulkan device"]
fn impossible_memory_request_is_out_of_memory() {
    let context = headless();
    let allocator = context.allocator();

    // No memory type has every property bit set at once
    let requirements = vk::MemoryRequirements {
        size: 256,
        alignment: 256,
        memory_type_bits: u32::MAX,
    };
    let err = allocator
        .allocate(requirements, vk::MemoryPropertyFlags::from_raw(u32::MAX), 256)
        .unwrap_err();
    assert!(matches!(err, VulkanError::OutOfMemory { .. }));
}

#[test]
#[ignore = "requires a Vulkan device"]
fn uniform_regions_respect_device_alignment() {
    let context = headless();
    let alignment = context.physical_device().min_uniform_buffer_offset_alignment();
    let layout = UniformLayout::new(
        std::mem::size_of::<ObjectUniform>() as vk::DeviceSize,
        alignment,
        3,
        2,
    );

    for slot in 0..3 {
        for object in 0..2 {
            assert_eq!(layout.offset(slot, object) % alignment.max(1), 0);
        }
    }
}

#[test]
#[ignore = "requires a Vulkan device"]
#[should_panic(expected = "destroyed twice")]
fn destroying_a_buffer_twice_panics() {
    let context = headless();
    let mut buffer = context
        .allocator()
        .create_buffer(vk::BufferUsageFlags::UNIFORM_BUFFER, 64, true)
        .unwrap();

    buffer.destroy();
    assert!(!buffer.is_live());
    assert_eq!(buffer.size(), 0);

    buffer.destroy();
}
