//! Vulkan error types
//!
//! Every fallible API call goes through [`VkResultExt::check`], which records the
//! call name and the source location of the caller so setup failures can be
//! traced back without a debugger.

use std::fmt;
use std::panic::Location;

use ash::prelude::VkResult;
use ash::vk;
use thiserror::Error;

use crate::config::ConfigError;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// A Vulkan entry point returned an error code
    #[error("{call} failed with {result:?} at {location}")]
    Call {
        /// Name of the failed entry point
        call: &'static str,
        /// Result code returned by the driver
        result: vk::Result,
        /// Where in this crate the call was issued
        location: CallSite,
    },

    /// No memory type satisfies both the type bits and the requested properties
    #[error("Out of memory: no memory type for {requested} bytes with {properties:?}")]
    OutOfMemory {
        /// Number of bytes that were requested
        requested: vk::DeviceSize,
        /// Property flags the allocation asked for
        properties: vk::MemoryPropertyFlags,
    },

    /// A required instance, device or queue capability is missing
    #[error("Missing capability: {0}")]
    MissingCapability(String),

    /// The surface does not offer the fixed presentation format
    #[error("Surface format {format:?}/{color_space:?} is not supported")]
    UnsupportedSurfaceFormat {
        /// Requested image format
        format: vk::Format,
        /// Requested colour space
        color_space: vk::ColorSpaceKHR,
    },

    /// The presentation surface is gone
    #[error("Presentation surface lost")]
    SurfaceLost,

    /// The logical device is gone
    #[error("Device lost")]
    DeviceLost,

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// The window collaborator could not satisfy a request
    #[error("Window error: {0}")]
    Window(String),

    /// Renderer configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl VulkanError {
    /// Whether a per-frame failure must terminate the render loop.
    ///
    /// Everything else degrades to skipping the frame and recreating the
    /// swapchain on the next tick.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::SurfaceLost | Self::DeviceLost => true,
            Self::Call { result, .. } => matches!(
                *result,
                vk::Result::ERROR_SURFACE_LOST_KHR | vk::Result::ERROR_DEVICE_LOST
            ),
            _ => false,
        }
    }

    /// Result code carried by a failed call, if any
    pub fn vk_result(&self) -> Option<vk::Result> {
        match self {
            Self::Call { result, .. } => Some(*result),
            _ => None,
        }
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Source location of a failed Vulkan call
#[derive(Debug, Clone, Copy)]
pub struct CallSite(&'static Location<'static>);

impl CallSite {
    /// Location of the function that called into the tracked helper
    #[track_caller]
    pub fn here() -> Self {
        Self(Location::caller())
    }

    /// File the call was issued from
    pub fn file(&self) -> &'static str {
        self.0.file()
    }

    /// Line the call was issued from
    pub fn line(&self) -> u32 {
        self.0.line()
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.0.file(), self.0.line())
    }
}

/// Attach the entry point name and caller location to an `ash` result
pub trait VkResultExt<T> {
    /// Convert into a [`VulkanResult`], naming the call that produced it
    fn check(self, call: &'static str) -> VulkanResult<T>;
}

impl<T> VkResultExt<T> for VkResult<T> {
    #[track_caller]
    fn check(self, call: &'static str) -> VulkanResult<T> {
        match self {
            Ok(value) => Ok(value),
            Err(result) => Err(VulkanError::Call {
                call,
                result,
                location: CallSite::here(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_records_call_and_location() {
        let failed: VkResult<()> = Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        let line = line!() + 1;
        let err = failed.check("vkAllocateMemory").unwrap_err();

        match &err {
            VulkanError::Call { call, result, location } => {
                assert_eq!(*call, "vkAllocateMemory");
                assert_eq!(*result, vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
                assert!(location.file().ends_with("error.rs"));
                assert_eq!(location.line(), line);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().starts_with("vkAllocateMemory failed"));
    }

    #[test]
    fn only_lost_surface_or_device_is_fatal() {
        let out_of_date: VkResult<()> = Err(vk::Result::ERROR_OUT_OF_DATE_KHR);
        assert!(!out_of_date.check("vkQueuePresentKHR").unwrap_err().is_fatal());

        let lost: VkResult<()> = Err(vk::Result::ERROR_SURFACE_LOST_KHR);
        assert!(lost.check("vkQueuePresentKHR").unwrap_err().is_fatal());

        assert!(VulkanError::DeviceLost.is_fatal());
        assert!(!VulkanError::OutOfMemory {
            requested: 64,
            properties: vk::MemoryPropertyFlags::HOST_VISIBLE,
        }
        .is_fatal());
    }
}
