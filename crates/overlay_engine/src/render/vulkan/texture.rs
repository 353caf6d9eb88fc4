//! Sampled RGBA texture for the glyph bitmap
//!
//! Uploaded once through a staging buffer. Changing the text means building
//! a new texture and dropping the old one after the device is idle.

use ash::{vk, Device};

use crate::render::vulkan::buffer::Buffer;
use crate::render::vulkan::commands::CommandPool;
use crate::render::vulkan::{VulkanContext, VulkanError, VulkanResult};
use crate::text::GlyphTexture;

/// Access masks and stages for a supported layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionMasks {
    /// Accesses that must complete before the transition
    pub src_access: vk::AccessFlags,
    /// Accesses that wait for the transition
    pub dst_access: vk::AccessFlags,
    /// Stage producing `src_access`
    pub src_stage: vk::PipelineStageFlags,
    /// Stage consuming `dst_access`
    pub dst_stage: vk::PipelineStageFlags,
}

/// Barrier parameters for the upload transitions
pub fn transition_masks(old: vk::ImageLayout, new: vk::ImageLayout) -> VulkanResult<TransitionMasks> {
    match (old, new) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok(TransitionMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        }),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => Ok(TransitionMasks {
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::SHADER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        }),
        _ => Err(VulkanError::InvalidOperation {
            reason: format!("Unsupported layout transition {:?} -> {:?}", old, new),
        }),
    }
}

/// Image, view, sampler and memory for one 2D texture
pub struct Texture {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    image_view: vk::ImageView,
    sampler: vk::Sampler,
    extent: vk::Extent2D,
}

impl Texture {
    /// Upload a rasterized glyph bitmap
    pub fn from_glyphs(
        context: &VulkanContext,
        command_pool: &CommandPool,
        glyphs: &GlyphTexture,
    ) -> VulkanResult<Self> {
        Self::from_rgba(context, command_pool, glyphs.width, glyphs.height, &glyphs.rgba)
    }

    /// Upload tightly packed RGBA8 pixels
    pub fn from_rgba(
        context: &VulkanContext,
        command_pool: &CommandPool,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> VulkanResult<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || rgba.len() != expected {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "Texture data is {} bytes, expected {} for {}x{}",
                    rgba.len(),
                    expected,
                    width,
                    height
                ),
            });
        }

        let extent = vk::Extent2D { width, height };
        let format = vk::Format::R8G8B8A8_UNORM;
        let device = context.raw_device();

        // Null handles are valid to destroy, so Drop covers partial construction
        let mut texture = Self {
            device: device.clone(),
            image: vk::Image::null(),
            memory: vk::DeviceMemory::null(),
            image_view: vk::ImageView::null(),
            sampler: vk::Sampler::null(),
            extent,
        };

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D { width, height, depth: 1 })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        texture.image = unsafe { device.create_image(&image_info, None).map_err(VulkanError::Api)? };

        let requirements = unsafe { device.get_image_memory_requirements(texture.image) };
        let memory_type_index =
            context.find_memory_type(requirements.memory_type_bits, vk::MemoryPropertyFlags::DEVICE_LOCAL)?;
        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        texture.memory = unsafe { device.allocate_memory(&alloc_info, None).map_err(VulkanError::Api)? };
        unsafe {
            device
                .bind_image_memory(texture.image, texture.memory, 0)
                .map_err(VulkanError::Api)?;
        }

        let staging = Buffer::staging(context, rgba)?;
        let image = texture.image;
        command_pool.execute_once(context.queue(), |recorder| {
            let to_transfer = transition_masks(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)?;
            recorder.cmd_image_barrier(
                layout_barrier(image, vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL, to_transfer),
                to_transfer.src_stage,
                to_transfer.dst_stage,
            );

            recorder.cmd_copy_buffer_to_image(staging.handle(), image, extent);

            let to_shader =
                transition_masks(vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)?;
            recorder.cmd_image_barrier(
                layout_barrier(
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    to_shader,
                ),
                to_shader.src_stage,
                to_shader.dst_stage,
            );
            Ok(())
        })?;

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(texture.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(color_subresource_range());
        texture.image_view = unsafe { device.create_image_view(&view_info, None).map_err(VulkanError::Api)? };

        // Transparent border so neighborhood sampling past the edge reads zero coverage
        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_BORDER)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_BORDER)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_BORDER)
            .border_color(vk::BorderColor::FLOAT_TRANSPARENT_BLACK)
            .anisotropy_enable(false)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .min_lod(0.0)
            .max_lod(0.0);
        texture.sampler = unsafe { device.create_sampler(&sampler_info, None).map_err(VulkanError::Api)? };

        log::debug!("Uploaded {}x{} texture", width, height);
        Ok(texture)
    }

    /// Image view handle
    pub fn image_view(&self) -> vk::ImageView {
        self.image_view
    }

    /// Sampler handle
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    /// Texture size in texels
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
            self.device.destroy_image_view(self.image_view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

fn layout_barrier(
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    masks: TransitionMasks,
) -> vk::ImageMemoryBarrier {
    vk::ImageMemoryBarrier::builder()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(color_subresource_range())
        .src_access_mask(masks.src_access)
        .dst_access_mask(masks.dst_access)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_transitions() {
        let first = transition_masks(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(first.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(first.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let second =
            transition_masks(vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL).unwrap();
        assert_eq!(second.src_access, first.dst_access);
        assert_eq!(second.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_unsupported_transition() {
        let result = transition_masks(vk::ImageLayout::PRESENT_SRC_KHR, vk::ImageLayout::UNDEFINED);
        assert!(matches!(result, Err(VulkanError::InvalidOperation { .. })));
    }
}
