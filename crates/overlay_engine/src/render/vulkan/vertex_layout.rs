//! Vulkan vertex input descriptions for the geometry types
//!
//! Kept out of `render::geometry` so the vertex types stay backend-agnostic.

use ash::vk;
use std::mem::{offset_of, size_of};

use crate::render::geometry::{ColorVertex, TexturedVertex};

/// Describes how a vertex type is laid out in a single interleaved buffer
pub trait VertexLayout {
    /// Binding 0, advanced per vertex
    fn binding_description() -> vk::VertexInputBindingDescription;

    /// One attribute per shader input location
    fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription>;
}

fn binding_for<V>() -> vk::VertexInputBindingDescription {
    vk::VertexInputBindingDescription {
        binding: 0,
        stride: size_of::<V>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    }
}

impl VertexLayout for ColorVertex {
    fn binding_description() -> vk::VertexInputBindingDescription {
        binding_for::<Self>()
    }

    fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            // Position (location = 0)
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(ColorVertex, position) as u32,
            },
            // Color (location = 1)
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(ColorVertex, color) as u32,
            },
        ]
    }
}

impl VertexLayout for TexturedVertex {
    fn binding_description() -> vk::VertexInputBindingDescription {
        binding_for::<Self>()
    }

    fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            // Position (location = 0)
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(TexturedVertex, position) as u32,
            },
            // Texture coordinate (location = 1)
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(TexturedVertex, tex_coord) as u32,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_vertex_layout() {
        let binding = ColorVertex::binding_description();
        assert_eq!(binding.stride, 20);

        let attributes = ColorVertex::attribute_descriptions();
        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes[0].offset, 0);
        assert_eq!(attributes[1].offset, 8);
        assert_eq!(attributes[1].location, 1);
    }

    #[test]
    fn test_textured_vertex_layout() {
        let binding = TexturedVertex::binding_description();
        assert_eq!(binding.stride, 16);

        let attributes = TexturedVertex::attribute_descriptions();
        assert_eq!(attributes[1].offset, 8);
        assert_eq!(attributes[1].format, vk::Format::R32G32_SFLOAT);
    }
}
