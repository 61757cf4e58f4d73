//! Window collaborator interface
//!
//! The renderer never owns a window. It asks the host for the drawable size,
//! pushes title text back, and lets the host turn its native handle into a
//! `vk::SurfaceKHR`.

use ash::vk;

use super::vulkan::VulkanResult;

/// What the renderer needs from the window that displays it
pub trait RenderSurface {
    /// Current drawable size in pixels; zero in either axis while minimised
    fn drawable_size(&self) -> (u32, u32);

    /// Replace the window title
    fn set_title(&mut self, title: &str);

    /// Instance extensions the windowing system needs for presentation
    fn required_instance_extensions(&self) -> VulkanResult<Vec<String>>;

    /// Create a presentation surface for this window on `instance`
    fn create_surface(&self, instance: vk::Instance) -> VulkanResult<vk::SurfaceKHR>;
}
