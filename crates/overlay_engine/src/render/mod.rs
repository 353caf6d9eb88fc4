//! # Rendering
//!
//! - **vulkan**: device, swapchain, pipeline and renderer wrappers
//! - **frame**: the per-frame state machine, independent of Vulkan calls
//! - **effects**: text effect parameters and their push-constant layout
//! - **geometry**: the fixed triangle and text quad
//! - **window**: GLFW window and key bindings

pub mod effects;
pub mod frame;
pub mod geometry;
pub mod vulkan;
pub mod window;

pub use effects::{EffectKind, EffectParameters, EffectPushConstants, SharedEffectParameters};
pub use frame::{FrameBackend, FrameOutcome, FrameScheduler, FrameStats};
pub use window::{InputAction, Window, WindowError, WindowEvent};
