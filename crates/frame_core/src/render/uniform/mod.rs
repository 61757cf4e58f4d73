//! Uniform streaming: aligned per-frame and per-object regions

pub mod layout;
pub mod payload;
pub mod stream;

pub use layout::{align_up, RegionVersions, UniformLayout, UniformRegion};
pub use payload::{FrameUniform, ObjectUniform};
pub use stream::{binding_plan, SlotDescriptors, UniformStream};
