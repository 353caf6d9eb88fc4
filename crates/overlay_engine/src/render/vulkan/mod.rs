//! Vulkan rendering backend
//!
//! Thin RAII wrappers over `ash`, each owning a clone of the device handle,
//! plus the [`VulkanRenderer`] that assembles them into a frame backend.

pub mod buffer;
pub mod commands;
pub mod context;
pub mod descriptor_set;
pub mod framebuffer;
pub mod generation;
pub mod render_pass;
pub mod renderer;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod vertex_layout;

pub use buffer::{Buffer, IndexBuffer, VertexBuffer};
pub use commands::{CommandPool, CommandRecorder};
pub use context::{LogicalDevice, PhysicalDeviceInfo, VulkanContext, VulkanError, VulkanInstance, VulkanResult};
pub use descriptor_set::GlyphDescriptors;
pub use framebuffer::Framebuffer;
pub use generation::GenerationSlot;
pub use render_pass::RenderPass;
pub use renderer::{Scene, VulkanRenderer};
pub use shader::{BlendMode, GraphicsPipeline, PipelineBuilder, ShaderModule};
pub use swapchain::{PresentationTarget, Swapchain};
pub use sync::{Fence, FrameSync, Semaphore};
pub use texture::Texture;
pub use vertex_layout::VertexLayout;
