//! # Frame Core
//!
//! Frame lifecycle and GPU synchronization for a Vulkan rasterizer.
//!
//! The core owns device resources, uploads scene geometry once, streams
//! per-object uniforms into slot-partitioned regions, and drives the
//! acquire, record, submit and present cycle for a window it never owns.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use frame_core::prelude::*;
//!
//! fn run(window: &mut dyn RenderSurface, scene: &SceneDescription, shaders: ShaderSource<'_>)
//!     -> VulkanResult<()>
//! {
//!     let mut renderer = Renderer::new(window, RendererConfig::default(), scene, shaders)?;
//!     loop {
//!         renderer.update(window);
//!         if renderer.draw()? == FrameStatus::Paused {
//!             break;
//!         }
//!     }
//!     renderer.wait_for_idle()
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod foundation;
pub mod render;

/// Common imports for applications driving the renderer
pub mod prelude {
    pub use crate::config::{Config, ConfigError, PresentModePreference, RendererConfig};
    pub use crate::foundation::math::{Mat4, Vec3};
    pub use crate::render::vulkan::{VulkanError, VulkanResult};
    pub use crate::render::{
        FrameStatus, MeshData, RenderItemDesc, RenderSurface, Renderer, SceneDescription, ShaderSource,
        SubmeshRange, Vertex,
    };
}
