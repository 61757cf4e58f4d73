//! Synchronous staging uploads and read-backs
//!
//! Every transfer allocates a transient host-visible staging buffer, records a
//! single copy on the transfer queue, submits, and blocks until the device is
//! idle. Only scene construction and tests use this path, never the per-frame
//! loop.

use ash::{vk, Device};

use super::buffer::{GpuBuffer, ResourceAllocator};
use super::commands::{CommandPool, CommandRecorder};
use super::context::VulkanContext;
use super::{VkResultExt, VulkanResult};

/// One-shot transfer submissions on the transfer queue
pub struct UploadContext {
    device: Device,
    queue: vk::Queue,
    command_pool: CommandPool,
    command_buffer: vk::CommandBuffer,
    allocator: ResourceAllocator,
}

impl UploadContext {
    /// Create the transfer command pool for `context`
    pub fn new(context: &VulkanContext) -> VulkanResult<Self> {
        let device = context.raw_device();
        let command_pool = CommandPool::new(device.clone(), context.queue_families().transfer)?;
        let command_buffer = command_pool.allocate_command_buffer()?;

        Ok(Self {
            device,
            queue: context.transfer_queue(),
            command_pool,
            command_buffer,
            allocator: context.allocator(),
        })
    }

    /// Allocator used for staging buffers
    pub fn allocator(&self) -> &ResourceAllocator {
        &self.allocator
    }

    /// Copy `data` into the start of `destination`.
    ///
    /// Returns once the copy has completed; the staging buffer is gone by then.
    ///
    /// # Panics
    /// If `data` does not fit in `destination`.
    pub fn upload_to_buffer(&self, destination: &GpuBuffer, data: &[u8]) -> VulkanResult<()> {
        let size = data.len() as vk::DeviceSize;
        assert!(
            size <= destination.size(),
            "upload of {} bytes into a {} byte buffer",
            size,
            destination.size()
        );
        if data.is_empty() {
            return Ok(());
        }

        let mut staging =
            self.allocator
                .create_buffer(vk::BufferUsageFlags::TRANSFER_SRC, size, true)?;
        staging.write_bytes(0, data)?;

        self.copy_and_wait(staging.handle(), destination.handle(), size)?;

        staging.destroy();
        log::debug!("Uploaded {} bytes", size);
        Ok(())
    }

    /// Create a device-local buffer holding `data`
    pub fn create_device_local_buffer(
        &self,
        usage: vk::BufferUsageFlags,
        data: &[u8],
    ) -> VulkanResult<GpuBuffer> {
        let buffer = self.allocator.create_buffer(
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            data.len() as vk::DeviceSize,
            false,
        )?;
        self.upload_to_buffer(&buffer, data)?;
        Ok(buffer)
    }

    /// Copy the first `len` bytes of `source` back to the CPU
    ///
    /// # Panics
    /// If `len` exceeds the size of `source`.
    pub fn download_from_buffer(&self, source: &GpuBuffer, len: usize) -> VulkanResult<Vec<u8>> {
        let size = len as vk::DeviceSize;
        assert!(
            size <= source.size(),
            "read-back of {} bytes from a {} byte buffer",
            size,
            source.size()
        );
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut staging =
            self.allocator
                .create_buffer(vk::BufferUsageFlags::TRANSFER_DST, size, true)?;

        self.copy_and_wait(source.handle(), staging.handle(), size)?;

        let bytes = staging.read_bytes(0, len)?;
        staging.destroy();
        Ok(bytes)
    }

    fn copy_and_wait(&self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) -> VulkanResult<()> {
        self.command_pool.reset()?;

        let mut recorder = CommandRecorder::new(self.command_buffer, self.device.clone());
        recorder.begin()?;
        recorder.cmd_copy_buffer(
            src,
            dst,
            &[vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            }],
        );
        let command_buffer = recorder.end()?;

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);

        unsafe {
            self.device
                .queue_submit(self.queue, &[submit_info.build()], vk::Fence::null())
                .check("vkQueueSubmit")?;
            self.device.device_wait_idle().check("vkDeviceWaitIdle")
        }
    }
}
