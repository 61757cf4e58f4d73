//! Rendering: Vulkan wrappers plus the frame lifecycle built on them
//!
//! - `vulkan`: RAII wrappers over `ash`
//! - `frame`: frame slots, swapchain recreation and frame pacing
//! - `uniform`: aligned per-slot, per-object uniform regions
//! - `scene`: geometry and render items
//! - `renderer`: the per-tick state machine

pub mod frame;
pub mod renderer;
pub mod scene;
pub mod uniform;
pub mod vulkan;
pub mod window;

pub use renderer::{FrameStatus, Renderer, ShaderSource};
pub use scene::{MeshData, MeshGeometry, RenderItem, RenderItemDesc, SceneDescription, SubmeshRange, Vertex};
pub use window::RenderSurface;
