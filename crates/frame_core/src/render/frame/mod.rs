//! Frame slots, their lifecycle and frame pacing

pub mod manager;
pub mod pacing;
pub mod slot;

pub use manager::FrameResourceManager;
pub use pacing::{FramePacer, FrameState, FrameTicket};
pub use slot::FrameSlot;
