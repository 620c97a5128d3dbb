// src/states/types.rs
//! Plain value types used by the state descriptors.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Blend factor applied to the source or destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Blend {
    Zero,
    One,
    SourceColor,
    InverseSourceColor,
    SourceAlpha,
    InverseSourceAlpha,
    DestinationAlpha,
    InverseDestinationAlpha,
    DestinationColor,
    InverseDestinationColor,
    SourceAlphaSaturate,
    BlendFactor,
    InverseBlendFactor,
    SecondarySourceColor,
    InverseSecondarySourceColor,
    SecondarySourceAlpha,
    InverseSecondarySourceAlpha,
}

/// How source and destination are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BlendOperation {
    Add,
    Subtract,
    ReverseSubtract,
    Minimum,
    Maximum,
}

bitflags::bitflags! {
    /// Channels written to the render target.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ColorWriteMask: u8 {
        const RED = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE = 1 << 2;
        const ALPHA = 1 << 3;
        const ALL = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits() | Self::ALPHA.bits();
    }
}

/// Comparison used by depth, stencil and comparison samplers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Comparison {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum StencilOperation {
    Keep,
    Zero,
    Replace,
    IncrementClamp,
    DecrementClamp,
    Invert,
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FillMode {
    Wireframe,
    Solid,
}

/// Minification / magnification / mip filtering combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Filter {
    MinMagMipPoint,
    MinMagPointMipLinear,
    MinPointMagLinearMipPoint,
    MinPointMagMipLinear,
    MinLinearMagMipPoint,
    MinLinearMagPointMipLinear,
    MinMagLinearMipPoint,
    MinMagMipLinear,
    Anisotropic,
}

/// Texture addressing outside of `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TextureWrap {
    Wrap,
    Mirror,
    Clamp,
    Border,
    MirrorOnce,
}

/// RGBA color. Compared and hashed bit-for-bit so it can key a cache.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const TRANSPARENT: Color = Color::new(0.0, 0.0, 0.0, 0.0);
    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    fn bits(&self) -> [u32; 4] {
        [state_bits(self.r), state_bits(self.g), state_bits(self.b), state_bits(self.a)]
    }
}

impl PartialEq for Color {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for Color {}

impl Hash for Color {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

/// Bit pattern used for state equality: `-0.0` folds into `0.0`, a NaN only
/// equals the very same NaN.
#[inline]
fn state_bits(value: f32) -> u32 {
    if value == 0.0 {
        0
    } else {
        value.to_bits()
    }
}

/// Hashes an `f32` the same way state equality compares it.
#[inline]
pub(crate) fn hash_f32<H: Hasher>(value: f32, state: &mut H) {
    state_bits(value).hash(state);
}

#[inline]
pub(crate) fn f32_eq(a: f32, b: f32) -> bool {
    state_bits(a) == state_bits(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colors_compare_by_bits() {
        assert_eq!(Color::new(0.5, 0.5, 0.5, 1.0), Color::new(0.5, 0.5, 0.5, 1.0));
        assert_ne!(Color::new(0.5, 0.0, 0.0, 0.0), Color::new(-0.5, 0.0, 0.0, 0.0));
        let nan = Color::new(f32::NAN, 0.0, 0.0, 1.0);
        assert_eq!(nan, nan);
    }

    #[test]
    fn signed_zero_is_one_value() {
        assert_eq!(Color::new(0.0, 0.0, 0.0, 0.0), Color::TRANSPARENT);
        assert_eq!(Color::new(-0.0, 0.0, 0.0, 0.0), Color::TRANSPARENT);
        assert!(f32_eq(-0.0, 0.0));
        assert!(!f32_eq(f32::NAN, 0.0));

        let hash = |value: f32| {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            hash_f32(value, &mut hasher);
            hasher.finish()
        };
        assert_eq!(hash(-0.0), hash(0.0));
    }

    #[test]
    fn write_mask_all() {
        assert_eq!(ColorWriteMask::ALL.bits(), 0b1111);
        assert!(ColorWriteMask::ALL.contains(ColorWriteMask::GREEN | ColorWriteMask::ALPHA));
    }
}
