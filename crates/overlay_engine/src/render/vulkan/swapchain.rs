//! Vulkan swapchain management
//!
//! A swapchain is built from the surface capabilities current at build time
//! and replaced wholesale on recreation, never patched. The `choose_*`
//! helpers are pure so the selection policy can be tested without a GPU.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use crate::render::vulkan::shader::BlendMode;
use crate::render::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Pick the surface format, preferring 8-bit sRGB with sRGB nonlinear color space
pub fn choose_surface_format(available: &[vk::SurfaceFormatKHR]) -> VulkanResult<vk::SurfaceFormatKHR> {
    let preferred = vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };

    match available {
        [] => Err(VulkanError::InitializationFailed("Surface reports no formats".to_string())),
        [only] if only.format == vk::Format::UNDEFINED => Ok(preferred),
        formats => Ok(formats
            .iter()
            .find(|sf| {
                matches!(sf.format, vk::Format::B8G8R8A8_SRGB | vk::Format::R8G8B8A8_SRGB)
                    && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .copied()
            .unwrap_or(formats[0])),
    }
}

/// MAILBOX when available, FIFO otherwise (always supported)
pub fn choose_present_mode(available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    available
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Resolve the swapchain extent; never returns a zero dimension
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, desired: vk::Extent2D) -> vk::Extent2D {
    let current = caps.current_extent;
    if current.width != u32::MAX && current.width > 0 && current.height > 0 {
        return current;
    }

    let min_width = caps.min_image_extent.width.max(1);
    let min_height = caps.min_image_extent.height.max(1);
    let max_width = caps.max_image_extent.width.max(min_width);
    let max_height = caps.max_image_extent.height.max(min_height);

    vk::Extent2D {
        width: desired.width.clamp(min_width, max_width),
        height: desired.height.clamp(min_height, max_height),
    }
}

/// One more than the minimum, capped by the maximum (0 means unbounded)
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        desired.min(caps.max_image_count)
    } else {
        desired
    }
}

/// Pick the composite alpha mode
///
/// A transparent window needs the compositor to honor alpha, so only
/// pre- or post-multiplied modes qualify. Falling back to OPAQUE would
/// silently paint a black background.
pub fn choose_composite_alpha(
    supported: vk::CompositeAlphaFlagsKHR,
    transparent: bool,
) -> VulkanResult<vk::CompositeAlphaFlagsKHR> {
    if transparent {
        [
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
            vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        ]
        .into_iter()
        .find(|&mode| supported.contains(mode))
        .ok_or(VulkanError::NoAlphaCompositeMode)
    } else {
        [
            vk::CompositeAlphaFlagsKHR::OPAQUE,
            vk::CompositeAlphaFlagsKHR::INHERIT,
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
            vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        ]
        .into_iter()
        .find(|&mode| supported.contains(mode))
        .ok_or_else(|| VulkanError::InitializationFailed("Surface reports no composite alpha modes".to_string()))
    }
}

/// Surface format and composite alpha a swapchain will be built with
///
/// The render pass and pipeline depend on both, so they are chosen before
/// the swapchain and compared on every recreation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentationTarget {
    /// Image format and color space
    pub surface_format: vk::SurfaceFormatKHR,
    /// How the compositor treats the image's alpha
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
}

impl PresentationTarget {
    /// Choose from what the surface reports
    pub fn choose(
        formats: &[vk::SurfaceFormatKHR],
        supported_composite_alpha: vk::CompositeAlphaFlagsKHR,
        transparent: bool,
    ) -> VulkanResult<Self> {
        Ok(Self {
            surface_format: choose_surface_format(formats)?,
            composite_alpha: choose_composite_alpha(supported_composite_alpha, transparent)?,
        })
    }

    /// Query the surface as it is now and choose
    pub fn query(context: &VulkanContext, transparent: bool) -> VulkanResult<Self> {
        let physical_device = context.physical_device().device;
        let surface = context.surface();
        let surface_loader = context.surface_loader();

        let (caps, formats) = unsafe {
            (
                surface_loader
                    .get_physical_device_surface_capabilities(physical_device, surface)
                    .map_err(VulkanError::Api)?,
                surface_loader
                    .get_physical_device_surface_formats(physical_device, surface)
                    .map_err(VulkanError::Api)?,
            )
        };

        Self::choose(&formats, caps.supported_composite_alpha, transparent)
    }

    /// Blend factors the pipeline needs for this composite alpha mode
    pub fn blend_mode(&self) -> BlendMode {
        BlendMode::for_composite_alpha(self.composite_alpha)
    }

    /// Whether moving from `previous` to `self` invalidates the render pass
    /// and pipeline
    ///
    /// A color space change alone only affects the swapchain.
    pub fn needs_new_pipeline(&self, previous: &Self) -> bool {
        self.surface_format.format != previous.surface_format.format || self.blend_mode() != previous.blend_mode()
    }
}

/// Swapchain management wrapper with RAII cleanup
pub struct Swapchain {
    device: Device,
    swapchain_loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
    composite_alpha: vk::CompositeAlphaFlagsKHR,
}

impl Swapchain {
    /// Build a swapchain for `target` from the surface's current capabilities
    pub fn new(context: &VulkanContext, desired_extent: vk::Extent2D, target: &PresentationTarget) -> VulkanResult<Self> {
        let physical_device = context.physical_device().device;
        let surface = context.surface();
        let surface_loader = context.surface_loader();

        let surface_caps = unsafe {
            surface_loader
                .get_physical_device_surface_capabilities(physical_device, surface)
                .map_err(VulkanError::Api)?
        };
        let present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(physical_device, surface)
                .map_err(VulkanError::Api)?
        };

        let format = target.surface_format;
        let composite_alpha = target.composite_alpha;
        let present_mode = choose_present_mode(&present_modes);
        let extent = choose_extent(&surface_caps, desired_extent);
        let image_count = choose_image_count(&surface_caps);

        let swapchain_create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(composite_alpha)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let device = context.raw_device();
        let swapchain_loader = context.swapchain_loader().clone();

        let swapchain = unsafe {
            swapchain_loader
                .create_swapchain(&swapchain_create_info, None)
                .map_err(VulkanError::Api)?
        };

        let images = match unsafe { swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(VulkanError::Api(e));
            }
        };

        // Partially built views are released through Drop on the error path
        let mut built = Self {
            device,
            swapchain_loader,
            swapchain,
            images,
            image_views: Vec::new(),
            format,
            extent,
            present_mode,
            composite_alpha,
        };

        for &image in &built.images {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            let view = unsafe { built.device.create_image_view(&create_info, None).map_err(VulkanError::Api)? };
            built.image_views.push(view);
        }

        log::info!(
            "Created swapchain {}x{} ({:?}, {:?}, {:?}, {} images)",
            extent.width,
            extent.height,
            format.format,
            present_mode,
            composite_alpha,
            built.images.len()
        );

        Ok(built)
    }

    /// Get swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Get the chosen present mode
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Get the chosen composite alpha mode
    pub fn composite_alpha(&self) -> vk::CompositeAlphaFlagsKHR {
        self.composite_alpha
    }

    /// Get image views
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Get swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Get image count
    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &image_view in &self.image_views {
                self.device.destroy_image_view(image_view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
        log::debug!("Destroyed swapchain {}x{}", self.extent.width, self.extent.height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: (u32, u32), max: (u32, u32), current: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            ..Default::default()
        }
    }

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn test_extent_clamped_into_capability_range() {
        let caps = caps((100, 50), (1920, 1080), (u32::MAX, u32::MAX));
        for width in (0..=4000).step_by(97) {
            for height in (0..=3000).step_by(89) {
                let chosen = choose_extent(&caps, extent(width, height));
                assert!((100..=1920).contains(&chosen.width), "width {} out of range", chosen.width);
                assert!((50..=1080).contains(&chosen.height), "height {} out of range", chosen.height);
            }
        }

        // Requests already inside the range pass through untouched
        assert_eq!(choose_extent(&caps, extent(800, 600)), extent(800, 600));
    }

    #[test]
    fn test_defined_current_extent_wins() {
        let caps = caps((1, 1), (4096, 4096), (1024, 768));
        assert_eq!(choose_extent(&caps, extent(800, 600)), extent(1024, 768));
    }

    #[test]
    fn test_degenerate_extent_never_zero() {
        // Minimized window: current extent reported as 0x0, minimum 0x0
        let caps = caps((0, 0), (0, 0), (0, 0));
        let chosen = choose_extent(&caps, extent(0, 0));
        assert_eq!(chosen, extent(1, 1));

        let caps = caps_with_range((1, 1), (2048, 2048));
        assert_eq!(choose_extent(&caps, extent(0, 300)), extent(1, 300));
    }

    fn caps_with_range(min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        caps(min, max, (u32::MAX, u32::MAX))
    }

    #[test]
    fn test_image_count() {
        let mut caps = caps_with_range((1, 1), (64, 64));
        assert_eq!(choose_image_count(&caps), 3);

        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);
    }

    #[test]
    fn test_surface_format_preference() {
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };

        assert_eq!(choose_surface_format(&[unorm, srgb]).unwrap().format, srgb.format);
        assert_eq!(choose_surface_format(&[unorm]).unwrap().format, unorm.format);

        let undefined = vk::SurfaceFormatKHR {
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(choose_surface_format(&[undefined]).unwrap().format, vk::Format::B8G8R8A8_SRGB);
        assert!(choose_surface_format(&[]).is_err());
    }

    #[test]
    fn test_present_mode_preference() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_transparent_requires_alpha_composite() {
        let all = vk::CompositeAlphaFlagsKHR::OPAQUE
            | vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED
            | vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED;
        assert_eq!(
            choose_composite_alpha(all, true).unwrap(),
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED
        );

        let post_only = vk::CompositeAlphaFlagsKHR::OPAQUE | vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED;
        assert_eq!(
            choose_composite_alpha(post_only, true).unwrap(),
            vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED
        );

        let opaque_only = vk::CompositeAlphaFlagsKHR::OPAQUE | vk::CompositeAlphaFlagsKHR::INHERIT;
        assert!(matches!(
            choose_composite_alpha(opaque_only, true),
            Err(VulkanError::NoAlphaCompositeMode)
        ));
    }

    #[test]
    fn test_opaque_composite_fallbacks() {
        let all = vk::CompositeAlphaFlagsKHR::OPAQUE | vk::CompositeAlphaFlagsKHR::INHERIT;
        assert_eq!(choose_composite_alpha(all, false).unwrap(), vk::CompositeAlphaFlagsKHR::OPAQUE);
        assert_eq!(
            choose_composite_alpha(vk::CompositeAlphaFlagsKHR::INHERIT, false).unwrap(),
            vk::CompositeAlphaFlagsKHR::INHERIT
        );
        assert_eq!(
            choose_composite_alpha(vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED, false).unwrap(),
            vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED
        );
    }

    fn target(format: vk::Format, color_space: vk::ColorSpaceKHR, alpha: vk::CompositeAlphaFlagsKHR) -> PresentationTarget {
        PresentationTarget::choose(&[vk::SurfaceFormatKHR { format, color_space }], alpha, true).unwrap()
    }

    #[test]
    fn test_format_change_requires_new_pipeline() {
        let before = target(
            vk::Format::B8G8R8A8_SRGB,
            vk::ColorSpaceKHR::SRGB_NONLINEAR,
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        );
        // Surface moved to an HDR output that only offers a float format
        let after = target(
            vk::Format::R16G16B16A16_SFLOAT,
            vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        );

        assert_eq!(after.surface_format.format, vk::Format::R16G16B16A16_SFLOAT);
        assert!(after.needs_new_pipeline(&before));
        assert!(before.needs_new_pipeline(&after));
    }

    #[test]
    fn test_unchanged_surface_keeps_pipeline() {
        let before = target(
            vk::Format::B8G8R8A8_SRGB,
            vk::ColorSpaceKHR::SRGB_NONLINEAR,
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        );
        assert!(!before.needs_new_pipeline(&before));

        let recolored = target(
            vk::Format::B8G8R8A8_SRGB,
            vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT,
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        );
        assert!(!recolored.needs_new_pipeline(&before));
    }

    #[test]
    fn test_composite_alpha_change_requires_new_blend_state() {
        let pre = target(
            vk::Format::B8G8R8A8_SRGB,
            vk::ColorSpaceKHR::SRGB_NONLINEAR,
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        );
        let post = target(
            vk::Format::B8G8R8A8_SRGB,
            vk::ColorSpaceKHR::SRGB_NONLINEAR,
            vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        );

        assert_eq!(pre.blend_mode(), BlendMode::Premultiplied);
        assert_eq!(post.blend_mode(), BlendMode::Straight);
        assert!(post.needs_new_pipeline(&pre));
    }

    #[test]
    fn test_target_propagates_selection_errors() {
        assert!(PresentationTarget::choose(&[], vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED, true).is_err());

        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert!(matches!(
            PresentationTarget::choose(&[srgb], vk::CompositeAlphaFlagsKHR::OPAQUE, true),
            Err(VulkanError::NoAlphaCompositeMode)
        ));
    }
}
