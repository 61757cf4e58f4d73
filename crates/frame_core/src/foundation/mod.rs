//! Foundation module - small utilities shared by the renderer
//!
//! - Math types for uniform payloads
//! - Frame timing and FPS counting
//! - Logging initialization

pub mod logging;
pub mod math;
pub mod time;
