// src/states/sampler.rs
//! Texture sampler configuration.

use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use super::types::{f32_eq, hash_f32};
use super::{locked, Color, Comparison, Filter, StateHeader, StateKind, StateValue, TextureWrap};
use crate::builder::StateBuilder;
use crate::device::{NativeHandle, StateDevice};
use crate::error::{Result, StateError};

/// Highest anisotropy level a sampler accepts.
pub const MAX_ANISOTROPY: u32 = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerState {
    #[serde(skip)]
    header: StateHeader,
    filter: Filter,
    wrap_u: TextureWrap,
    wrap_v: TextureWrap,
    wrap_w: TextureWrap,
    max_anisotropy: u32,
    comparison: Comparison,
    border_color: Color,
    min_lod: f32,
    max_lod: f32,
    mip_lod_bias: f32,
}

fn check_anisotropy(level: u32) -> Result<()> {
    if !(1..=MAX_ANISOTROPY).contains(&level) {
        return Err(StateError::out_of_range(
            "max anisotropy",
            level as usize,
            1,
            MAX_ANISOTROPY as usize + 1,
        ));
    }
    Ok(())
}

impl SamplerState {
    fn preset(filter: Filter, wrap: TextureWrap, max_anisotropy: u32) -> Self {
        locked(Self {
            header: StateHeader::new(),
            filter,
            wrap_u: wrap,
            wrap_v: wrap,
            wrap_w: wrap,
            max_anisotropy,
            comparison: Comparison::Never,
            border_color: Color::TRANSPARENT,
            min_lod: f32::MIN,
            max_lod: f32::MAX,
            mip_lod_bias: 0.0,
        })
    }

    /// Trilinear filtering with wrapping addressing.
    pub fn wrapping() -> Self {
        Self::preset(Filter::MinMagMipLinear, TextureWrap::Wrap, 1)
    }

    pub fn anisotropic_filtering() -> Self {
        Self::preset(Filter::Anisotropic, TextureWrap::Wrap, MAX_ANISOTROPY)
    }

    pub fn point_filtering() -> Self {
        Self::preset(Filter::MinMagMipPoint, TextureWrap::Clamp, 1)
    }

    pub fn point_filtering_wrapping() -> Self {
        Self::preset(Filter::MinMagMipPoint, TextureWrap::Wrap, 1)
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    /// Addressing modes for `(u, v, w)`.
    pub fn wrap(&self) -> (TextureWrap, TextureWrap, TextureWrap) {
        (self.wrap_u, self.wrap_v, self.wrap_w)
    }

    pub fn max_anisotropy(&self) -> u32 {
        self.max_anisotropy
    }

    pub fn comparison(&self) -> Comparison {
        self.comparison
    }

    pub fn border_color(&self) -> Color {
        self.border_color
    }

    pub fn lod_range(&self) -> (f32, f32) {
        (self.min_lod, self.max_lod)
    }

    pub fn mip_lod_bias(&self) -> f32 {
        self.mip_lod_bias
    }

    pub fn set_filter(&mut self, filter: Filter) -> Result<()> {
        self.header.check_unlocked(Self::KIND)?;
        self.filter = filter;
        Ok(())
    }

    pub fn set_wrap(&mut self, u: TextureWrap, v: TextureWrap, w: TextureWrap) -> Result<()> {
        self.header.check_unlocked(Self::KIND)?;
        self.wrap_u = u;
        self.wrap_v = v;
        self.wrap_w = w;
        Ok(())
    }

    pub fn set_max_anisotropy(&mut self, level: u32) -> Result<()> {
        self.header.check_unlocked(Self::KIND)?;
        check_anisotropy(level)?;
        self.max_anisotropy = level;
        Ok(())
    }

    pub fn set_comparison(&mut self, comparison: Comparison) -> Result<()> {
        self.header.check_unlocked(Self::KIND)?;
        self.comparison = comparison;
        Ok(())
    }

    pub fn set_border_color(&mut self, color: Color) -> Result<()> {
        self.header.check_unlocked(Self::KIND)?;
        self.border_color = color;
        Ok(())
    }

    pub fn set_lod(&mut self, min: f32, max: f32, bias: f32) -> Result<()> {
        self.header.check_unlocked(Self::KIND)?;
        self.min_lod = min;
        self.max_lod = max;
        self.mip_lod_bias = bias;
        Ok(())
    }
}

impl PartialEq for SamplerState {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
            || (self.filter == other.filter
                && self.wrap_u == other.wrap_u
                && self.wrap_v == other.wrap_v
                && self.wrap_w == other.wrap_w
                && self.max_anisotropy == other.max_anisotropy
                && self.comparison == other.comparison
                && self.border_color == other.border_color
                && f32_eq(self.min_lod, other.min_lod)
                && f32_eq(self.max_lod, other.max_lod)
                && f32_eq(self.mip_lod_bias, other.mip_lod_bias))
    }
}

impl Eq for SamplerState {}

impl Hash for SamplerState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.filter.hash(state);
        self.wrap_u.hash(state);
        self.wrap_v.hash(state);
        self.wrap_w.hash(state);
        self.max_anisotropy.hash(state);
        self.comparison.hash(state);
        self.border_color.hash(state);
        hash_f32(self.min_lod, state);
        hash_f32(self.max_lod, state);
        hash_f32(self.mip_lod_bias, state);
    }
}

impl Default for SamplerState {
    fn default() -> Self {
        Self::preset_default().clone()
    }
}

impl StateValue for SamplerState {
    const KIND: StateKind = StateKind::Sampler;

    fn header(&self) -> &StateHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut StateHeader {
        &mut self.header
    }

    fn assign_fields(&mut self, other: &Self) {
        self.filter = other.filter;
        self.wrap_u = other.wrap_u;
        self.wrap_v = other.wrap_v;
        self.wrap_w = other.wrap_w;
        self.max_anisotropy = other.max_anisotropy;
        self.comparison = other.comparison;
        self.border_color = other.border_color;
        self.min_lod = other.min_lod;
        self.max_lod = other.max_lod;
        self.mip_lod_bias = other.mip_lod_bias;
    }

    /// Trilinear filtering, clamped addressing.
    fn preset_default() -> &'static Self {
        static DEFAULT: OnceLock<SamplerState> = OnceLock::new();
        DEFAULT.get_or_init(|| Self::preset(Filter::MinMagMipLinear, TextureWrap::Clamp, 1))
    }

    fn presets() -> Vec<Self> {
        vec![
            locked(Self::preset_default().clone()),
            Self::wrapping(),
            Self::anisotropic_filtering(),
            Self::point_filtering(),
            Self::point_filtering_wrapping(),
        ]
    }

    fn create_native(&self, device: &dyn StateDevice, label: &str) -> Result<Option<NativeHandle>> {
        device.create_sampler_state(self, label).map(Some)
    }
}

// ----------------------------------------------------------------------------
// Builder
// ----------------------------------------------------------------------------

impl StateBuilder<SamplerState> {
    pub fn filter(&mut self, filter: Filter) -> &mut Self {
        self.working.filter = filter;
        self
    }

    /// Sets the addressing modes; `v` and `w` default to `u`.
    pub fn wrap(&mut self, u: TextureWrap, v: Option<TextureWrap>, w: Option<TextureWrap>) -> &mut Self {
        self.working.wrap_u = u;
        self.working.wrap_v = v.unwrap_or(u);
        self.working.wrap_w = w.unwrap_or(u);
        self
    }

    /// Fails with `OutOfRange` outside `1..=16`, leaving the working state untouched.
    pub fn max_anisotropy(&mut self, level: u32) -> Result<&mut Self> {
        check_anisotropy(level)?;
        self.working.max_anisotropy = level;
        Ok(self)
    }

    pub fn comparison(&mut self, comparison: Comparison) -> &mut Self {
        self.working.comparison = comparison;
        self
    }

    pub fn border_color(&mut self, color: Color) -> &mut Self {
        self.working.border_color = color;
        self
    }

    pub fn lod(&mut self, min: f32, max: f32, bias: f32) -> &mut Self {
        self.working.min_lod = min;
        self.working.max_lod = max;
        self.working.mip_lod_bias = bias;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anisotropy_bounds() {
        let mut builder = StateBuilder::<SamplerState>::new();
        assert!(builder.max_anisotropy(0).unwrap_err().is_out_of_range());
        assert!(builder.max_anisotropy(17).is_err());
        assert_eq!(builder.working().max_anisotropy(), 1);

        builder.filter(Filter::Anisotropic).max_anisotropy(16).unwrap();
        assert_eq!(builder.working().max_anisotropy(), 16);
    }

    #[test]
    fn wrap_defaults_to_u() {
        let mut builder = StateBuilder::<SamplerState>::new();
        builder.wrap(TextureWrap::Mirror, None, Some(TextureWrap::Border));
        assert_eq!(
            builder.working().wrap(),
            (TextureWrap::Mirror, TextureWrap::Mirror, TextureWrap::Border)
        );
    }

    #[test]
    fn builder_reproduces_presets() {
        let mut builder = StateBuilder::<SamplerState>::new();
        builder.wrap(TextureWrap::Wrap, None, None);
        assert_eq!(builder.working(), &SamplerState::wrapping());

        builder.filter(Filter::MinMagMipPoint);
        assert_eq!(builder.working(), &SamplerState::point_filtering_wrapping());
    }

    #[test]
    fn setter_on_copy() {
        let mut state = SamplerState::point_filtering().clone();
        assert!(state.set_max_anisotropy(32).is_err());
        state.set_border_color(Color::BLACK).unwrap();
        assert_eq!(state.border_color(), Color::BLACK);
        assert_eq!(state.max_anisotropy(), 1);
    }

    #[test]
    fn negative_zero_bias_shares_cache_entry() {
        use crate::cache::StateCache;
        use crate::device::HeadlessDevice;

        let cache = StateCache::<SamplerState>::new(HeadlessDevice::shared());
        let mut builder = StateBuilder::<SamplerState>::new();
        let (min, max) = builder.working().lod_range();

        builder.lod(min, max, 0.0);
        let positive = builder.build_cached(&cache).unwrap();
        builder.lod(min, max, -0.0);
        let negative = builder.build_cached(&cache).unwrap();

        assert!(std::sync::Arc::ptr_eq(&positive, &negative));
        assert_eq!(cache.len(), 1);
    }
}
