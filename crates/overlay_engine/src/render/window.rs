//! Window management using GLFW
//!
//! Creates a Vulkan-ready window (no client API) and turns GLFW's event
//! queue into the few events the overlay cares about.

use ash::vk;
use thiserror::Error;

use crate::config::WindowConfig;

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW could not be initialized
    #[error("GLFW initialization failed: {0}")]
    InitializationFailed(String),

    /// GLFW refused to create the window
    #[error("Window creation failed")]
    CreationFailed,

    /// GLFW has no Vulkan loader or the platform cannot present
    #[error("Vulkan is not supported by this GLFW build or platform")]
    VulkanUnsupported,

    /// Surface creation returned an error
    #[error("Failed to create Vulkan surface: {0:?}")]
    SurfaceCreation(vk::Result),
}

/// Result type for window operations
pub type WindowResult<T> = Result<T, WindowError>;

/// User request decoded from a key press
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputAction {
    /// Set the overlay opacity
    SetOpacity(f32),
    /// Advance to the next text effect
    CycleEffect,
}

/// Events surfaced to the frame loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowEvent {
    /// Drawable size changed; zero means minimized
    Resized(u32, u32),
    /// The user asked to close the window
    CloseRequested,
    /// A mapped key was pressed
    Input(InputAction),
}

/// Key binding: `1`-`9` set opacity 0.1-0.9, `0` sets 1.0, `E` cycles effects
pub fn map_key(key: glfw::Key) -> Option<InputAction> {
    use glfw::Key;

    let opacity = match key {
        Key::Num1 => 0.1,
        Key::Num2 => 0.2,
        Key::Num3 => 0.3,
        Key::Num4 => 0.4,
        Key::Num5 => 0.5,
        Key::Num6 => 0.6,
        Key::Num7 => 0.7,
        Key::Num8 => 0.8,
        Key::Num9 => 0.9,
        Key::Num0 => 1.0,
        Key::E => return Some(InputAction::CycleEffect),
        _ => return None,
    };
    Some(InputAction::SetOpacity(opacity))
}

/// Translate one raw GLFW event
pub fn translate_event(event: glfw::WindowEvent) -> Option<WindowEvent> {
    match event {
        glfw::WindowEvent::FramebufferSize(width, height) => {
            Some(WindowEvent::Resized(width.max(0) as u32, height.max(0) as u32))
        }
        glfw::WindowEvent::Close => Some(WindowEvent::CloseRequested),
        glfw::WindowEvent::Key(glfw::Key::Escape, _, glfw::Action::Press, _) => Some(WindowEvent::CloseRequested),
        glfw::WindowEvent::Key(key, _, glfw::Action::Press, _) => map_key(key).map(WindowEvent::Input),
        _ => None,
    }
}

/// GLFW window wrapper with proper resource management
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
}

impl Window {
    /// Create a window from its configuration
    pub fn new(config: &WindowConfig) -> WindowResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors).map_err(|e| WindowError::InitializationFailed(format!("{:?}", e)))?;

        if !glfw.vulkan_supported() {
            return Err(WindowError::VulkanUnsupported);
        }

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(true));
        glfw.window_hint(glfw::WindowHint::TransparentFramebuffer(config.transparent));
        glfw.window_hint(glfw::WindowHint::Floating(config.always_on_top));
        glfw.window_hint(glfw::WindowHint::Decorated(config.decorated));

        let (mut window, events) = glfw
            .create_window(config.width, config.height, &config.title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        log::info!(
            "Created window \"{}\" {}x{} (transparent: {}, always on top: {})",
            config.title,
            config.width,
            config.height,
            config.transparent,
            config.always_on_top
        );

        Ok(Self { glfw, window, events })
    }

    /// Pump the OS queue and return the translated events in arrival order
    pub fn poll(&mut self) -> Vec<WindowEvent> {
        self.glfw.poll_events();
        glfw::flush_messages(&self.events)
            .filter_map(|(_, event)| translate_event(event))
            .collect()
    }

    /// Whether GLFW has flagged the window for closing
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Flag the window for closing
    pub fn request_close(&mut self) {
        self.window.set_should_close(true);
    }

    /// Drawable size in pixels
    pub fn framebuffer_extent(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width.max(0) as u32, height.max(0) as u32)
    }

    /// Get required Vulkan instance extensions from GLFW
    pub fn required_instance_extensions(&self) -> WindowResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or(WindowError::VulkanUnsupported)
    }

    /// Create Vulkan surface using GLFW's built-in functionality
    pub fn create_surface(&self, instance: vk::Instance) -> WindowResult<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self.window.create_window_surface(instance, std::ptr::null(), &mut surface);

        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(WindowError::SurfaceCreation(result))
        }
    }
}
