//! # Text Effects
//!
//! Pure data describing how the text fragment shader styles glyph coverage.
//! Nothing here touches the GPU: the frame loop takes one snapshot per frame
//! and serializes it into [`EffectPushConstants`].
//!
//! All effects share one pipeline. Switching is a branch on
//! `effect_type` inside `text.frag`, so no rebuild is ever needed.

pub mod reference;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

/// Lowest opacity the overlay can be set to
pub const MIN_OPACITY: f32 = 0.1;
/// Highest opacity
pub const MAX_OPACITY: f32 = 1.0;

/// Fragment effect selected by the `effect_type` push constant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EffectKind {
    /// Plain white text
    #[default]
    Normal,
    /// Max coverage over a 5x5 neighborhood in the outline color
    Outline,
    /// Darkened copy at a fixed offset beneath the text
    Shadow,
    /// Distance-weighted 7x7 coverage sum in the glow color
    Glow,
}

impl EffectKind {
    /// Every effect in cycle order
    pub const ALL: [Self; 4] = [Self::Normal, Self::Outline, Self::Shadow, Self::Glow];

    /// Next effect, wrapping from Glow back to Normal
    pub fn next(self) -> Self {
        match self {
            Self::Normal => Self::Outline,
            Self::Outline => Self::Shadow,
            Self::Shadow => Self::Glow,
            Self::Glow => Self::Normal,
        }
    }

    /// Value written to `effect_type`
    pub fn id(self) -> i32 {
        match self {
            Self::Normal => 0,
            Self::Outline => 1,
            Self::Shadow => 2,
            Self::Glow => 3,
        }
    }

    /// Inverse of [`EffectKind::id`]
    pub fn from_id(id: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.id() == id)
    }

    /// Display name
    pub fn name(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Outline => "Outline",
            Self::Shadow => "Shadow",
            Self::Glow => "Glow",
        }
    }
}

impl std::fmt::Display for EffectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Push-constant block read by `text.frag` (std430, 24 bytes)
///
/// `shadow_offset` is a vec2 and must start on an 8-byte boundary, hence
/// the explicit padding after `outline_width`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct EffectPushConstants {
    /// Global opacity multiplier
    pub opacity: f32,
    /// [`EffectKind::id`]
    pub effect_type: i32,
    /// Outline sampling radius multiplier in texels
    pub outline_width: f32,
    /// Unused; keeps `shadow_offset` at offset 16
    pub _pad: f32,
    /// Shadow displacement in texels
    pub shadow_offset: [f32; 2],
}

impl EffectPushConstants {
    /// Raw bytes for `vkCmdPushConstants`
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

fn clamp_opacity(value: f32) -> f32 {
    if value.is_nan() {
        MAX_OPACITY
    } else {
        value.clamp(MIN_OPACITY, MAX_OPACITY)
    }
}

/// Current styling of the text overlay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectParameters {
    opacity: f32,
    effect: EffectKind,
    outline_width: f32,
    shadow_offset: [f32; 2],
}

impl EffectParameters {
    /// Build parameters, clamping the opacity
    pub fn new(opacity: f32, effect: EffectKind, outline_width: f32, shadow_offset: [f32; 2]) -> Self {
        Self {
            opacity: clamp_opacity(opacity),
            effect,
            outline_width,
            shadow_offset,
        }
    }

    /// Parameters from the `[effects]` config section
    pub fn from_config(config: &crate::config::EffectConfig) -> Self {
        Self::new(config.opacity, config.effect, config.outline_width, config.shadow_offset)
    }

    /// Set opacity, clamped to [0.1, 1.0]; NaN means fully opaque
    pub fn set_opacity(&mut self, value: f32) {
        self.opacity = clamp_opacity(value);
    }

    /// Current opacity
    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Advance to the next effect and return it
    pub fn cycle_effect(&mut self) -> EffectKind {
        self.effect = self.effect.next();
        self.effect
    }

    /// Select an effect directly
    pub fn set_effect(&mut self, effect: EffectKind) {
        self.effect = effect;
    }

    /// Current effect
    pub fn effect(&self) -> EffectKind {
        self.effect
    }

    /// Outline radius multiplier
    pub fn outline_width(&self) -> f32 {
        self.outline_width
    }

    /// Shadow displacement in texels
    pub fn shadow_offset(&self) -> [f32; 2] {
        self.shadow_offset
    }

    /// Serialize into the fragment push-constant layout
    pub fn to_push_constants(&self) -> EffectPushConstants {
        EffectPushConstants {
            opacity: self.opacity,
            effect_type: self.effect.id(),
            outline_width: self.outline_width,
            _pad: 0.0,
            shadow_offset: self.shadow_offset,
        }
    }
}

impl Default for EffectParameters {
    fn default() -> Self {
        Self::from_config(&crate::config::EffectConfig::default())
    }
}

/// Effect parameters shared between input handling and the frame loop
///
/// Writers lock for the duration of one setter; the frame loop copies the
/// whole value once per frame so it never sees a half-applied update.
#[derive(Debug, Clone, Default)]
pub struct SharedEffectParameters {
    inner: Arc<Mutex<EffectParameters>>,
}

impl SharedEffectParameters {
    /// Share an initial value
    pub fn new(parameters: EffectParameters) -> Self {
        Self {
            inner: Arc::new(Mutex::new(parameters)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EffectParameters> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Copy of the current value
    pub fn snapshot(&self) -> EffectParameters {
        *self.lock()
    }

    /// Apply a mutation atomically with respect to `snapshot`
    pub fn update<R>(&self, f: impl FnOnce(&mut EffectParameters) -> R) -> R {
        f(&mut self.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::mem::{offset_of, size_of};

    #[test]
    fn test_opacity_clamped() {
        let mut params = EffectParameters::default();

        params.set_opacity(5.0);
        assert_relative_eq!(params.opacity(), 1.0);

        params.set_opacity(-1.0);
        assert_relative_eq!(params.opacity(), 0.1);

        params.set_opacity(0.05);
        assert_relative_eq!(params.opacity(), 0.1);

        params.set_opacity(f32::NAN);
        assert_relative_eq!(params.opacity(), 1.0);

        params.set_opacity(f32::NEG_INFINITY);
        assert_relative_eq!(params.opacity(), 0.1);
    }

    #[test]
    fn test_opacity_setter_idempotent() {
        for value in [-3.0, 0.0, 0.1, 0.37, 0.5, 1.0, 1.5, 100.0] {
            let mut once = EffectParameters::default();
            once.set_opacity(value);
            let mut twice = once;
            twice.set_opacity(twice.opacity());
            assert_eq!(once, twice);
            assert!((MIN_OPACITY..=MAX_OPACITY).contains(&once.opacity()));
        }
    }

    #[test]
    fn test_cycle_has_order_four() {
        for start in EffectKind::ALL {
            let mut params = EffectParameters::default();
            params.set_effect(start);
            let seen: Vec<_> = (0..4).map(|_| params.cycle_effect()).collect();
            assert_eq!(params.effect(), start);

            // Every other effect is visited exactly once on the way round
            for kind in EffectKind::ALL {
                assert_eq!(seen.iter().filter(|&&k| k == kind).count(), 1);
            }
        }
    }

    #[test]
    fn test_ids_round_trip() {
        for kind in EffectKind::ALL {
            assert_eq!(EffectKind::from_id(kind.id()), Some(kind));
        }
        assert_eq!(EffectKind::Outline.id(), 1);
        assert_eq!(EffectKind::from_id(4), None);
    }

    #[test]
    fn test_push_constant_layout() {
        assert_eq!(size_of::<EffectPushConstants>(), 24);
        assert_eq!(offset_of!(EffectPushConstants, opacity), 0);
        assert_eq!(offset_of!(EffectPushConstants, effect_type), 4);
        assert_eq!(offset_of!(EffectPushConstants, outline_width), 8);
        assert_eq!(offset_of!(EffectPushConstants, shadow_offset), 16);
    }

    #[test]
    fn test_outline_half_opacity_block() {
        let mut params = EffectParameters::new(1.0, EffectKind::Normal, 2.5, [3.0, 3.0]);
        params.set_effect(EffectKind::Outline);
        params.set_opacity(0.5);

        let block = params.to_push_constants();
        assert_relative_eq!(block.opacity, 0.5);
        assert_eq!(block.effect_type, 1);
        assert_relative_eq!(block.outline_width, 2.5);

        let bytes = block.as_bytes();
        assert_eq!(bytes.len(), 24);
        assert_eq!(&bytes[4..8], &1i32.to_ne_bytes());
    }

    #[test]
    fn test_shared_snapshot_is_whole_value() {
        let shared = SharedEffectParameters::new(EffectParameters::default());
        let writer = shared.clone();

        let handle = std::thread::spawn(move || {
            for i in 0..1000 {
                writer.update(|p| {
                    p.set_opacity(if i % 2 == 0 { 0.2 } else { 0.8 });
                    p.set_effect(if i % 2 == 0 { EffectKind::Shadow } else { EffectKind::Glow });
                });
            }
        });

        for _ in 0..1000 {
            let snapshot = shared.snapshot();
            let consistent = snapshot == EffectParameters::default()
                || (snapshot.effect() == EffectKind::Shadow && (snapshot.opacity() - 0.2).abs() < 1e-6)
                || (snapshot.effect() == EffectKind::Glow && (snapshot.opacity() - 0.8).abs() < 1e-6);
            assert!(consistent, "torn snapshot: {:?}", snapshot);
        }

        handle.join().unwrap();
    }
}
