// src/states/raster.rs
//! Rasterizer configuration.

use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use super::types::{f32_eq, hash_f32};
use super::{locked, CullMode, FillMode, StateHeader, StateKind, StateValue};
use crate::builder::StateBuilder;
use crate::device::{NativeHandle, StateDevice};
use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterState {
    #[serde(skip)]
    header: StateHeader,
    cull_mode: CullMode,
    fill_mode: FillMode,
    front_counter_clockwise: bool,
    depth_bias: i32,
    depth_bias_clamp: f32,
    slope_scaled_depth_bias: f32,
    depth_clip_enabled: bool,
    scissor_enabled: bool,
    multisample_enabled: bool,
    antialiased_lines_enabled: bool,
}

impl RasterState {
    fn preset(cull_mode: CullMode, fill_mode: FillMode) -> Self {
        locked(Self {
            header: StateHeader::new(),
            cull_mode,
            fill_mode,
            front_counter_clockwise: false,
            depth_bias: 0,
            depth_bias_clamp: 0.0,
            slope_scaled_depth_bias: 0.0,
            depth_clip_enabled: true,
            scissor_enabled: false,
            multisample_enabled: false,
            antialiased_lines_enabled: false,
        })
    }

    /// Wireframe fill, no culling.
    pub fn wireframe() -> Self {
        Self::preset(CullMode::None, FillMode::Wireframe)
    }

    pub fn cull_front_face() -> Self {
        Self::preset(CullMode::Front, FillMode::Solid)
    }

    pub fn no_culling() -> Self {
        Self::preset(CullMode::None, FillMode::Solid)
    }

    pub fn cull_mode(&self) -> CullMode {
        self.cull_mode
    }

    pub fn fill_mode(&self) -> FillMode {
        self.fill_mode
    }

    pub fn is_front_counter_clockwise(&self) -> bool {
        self.front_counter_clockwise
    }

    pub fn depth_bias(&self) -> i32 {
        self.depth_bias
    }

    pub fn depth_bias_clamp(&self) -> f32 {
        self.depth_bias_clamp
    }

    pub fn slope_scaled_depth_bias(&self) -> f32 {
        self.slope_scaled_depth_bias
    }

    pub fn is_depth_clip_enabled(&self) -> bool {
        self.depth_clip_enabled
    }

    pub fn is_scissor_enabled(&self) -> bool {
        self.scissor_enabled
    }

    pub fn is_multisample_enabled(&self) -> bool {
        self.multisample_enabled
    }

    pub fn is_antialiased_lines_enabled(&self) -> bool {
        self.antialiased_lines_enabled
    }

    pub fn set_cull_mode(&mut self, mode: CullMode) -> Result<()> {
        self.header.check_unlocked(Self::KIND)?;
        self.cull_mode = mode;
        Ok(())
    }

    pub fn set_fill_mode(&mut self, mode: FillMode) -> Result<()> {
        self.header.check_unlocked(Self::KIND)?;
        self.fill_mode = mode;
        Ok(())
    }

    pub fn set_front_counter_clockwise(&mut self, ccw: bool) -> Result<()> {
        self.header.check_unlocked(Self::KIND)?;
        self.front_counter_clockwise = ccw;
        Ok(())
    }

    pub fn set_depth_bias(&mut self, bias: i32, clamp: f32, slope_scaled: f32) -> Result<()> {
        self.header.check_unlocked(Self::KIND)?;
        self.depth_bias = bias;
        self.depth_bias_clamp = clamp;
        self.slope_scaled_depth_bias = slope_scaled;
        Ok(())
    }

    pub fn set_depth_clip_enabled(&mut self, enabled: bool) -> Result<()> {
        self.header.check_unlocked(Self::KIND)?;
        self.depth_clip_enabled = enabled;
        Ok(())
    }

    pub fn set_scissor_enabled(&mut self, enabled: bool) -> Result<()> {
        self.header.check_unlocked(Self::KIND)?;
        self.scissor_enabled = enabled;
        Ok(())
    }

    pub fn set_multisample_enabled(&mut self, enabled: bool) -> Result<()> {
        self.header.check_unlocked(Self::KIND)?;
        self.multisample_enabled = enabled;
        Ok(())
    }

    pub fn set_antialiased_lines_enabled(&mut self, enabled: bool) -> Result<()> {
        self.header.check_unlocked(Self::KIND)?;
        self.antialiased_lines_enabled = enabled;
        Ok(())
    }
}

impl PartialEq for RasterState {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
            || (self.cull_mode == other.cull_mode
                && self.fill_mode == other.fill_mode
                && self.front_counter_clockwise == other.front_counter_clockwise
                && self.depth_bias == other.depth_bias
                && f32_eq(self.depth_bias_clamp, other.depth_bias_clamp)
                && f32_eq(self.slope_scaled_depth_bias, other.slope_scaled_depth_bias)
                && self.depth_clip_enabled == other.depth_clip_enabled
                && self.scissor_enabled == other.scissor_enabled
                && self.multisample_enabled == other.multisample_enabled
                && self.antialiased_lines_enabled == other.antialiased_lines_enabled)
    }
}

impl Eq for RasterState {}

impl Hash for RasterState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.cull_mode.hash(state);
        self.fill_mode.hash(state);
        self.front_counter_clockwise.hash(state);
        self.depth_bias.hash(state);
        hash_f32(self.depth_bias_clamp, state);
        hash_f32(self.slope_scaled_depth_bias, state);
        self.depth_clip_enabled.hash(state);
        self.scissor_enabled.hash(state);
        self.multisample_enabled.hash(state);
        self.antialiased_lines_enabled.hash(state);
    }
}

impl Default for RasterState {
    fn default() -> Self {
        Self::preset_default().clone()
    }
}

impl StateValue for RasterState {
    const KIND: StateKind = StateKind::Raster;

    fn header(&self) -> &StateHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut StateHeader {
        &mut self.header
    }

    fn assign_fields(&mut self, other: &Self) {
        self.cull_mode = other.cull_mode;
        self.fill_mode = other.fill_mode;
        self.front_counter_clockwise = other.front_counter_clockwise;
        self.depth_bias = other.depth_bias;
        self.depth_bias_clamp = other.depth_bias_clamp;
        self.slope_scaled_depth_bias = other.slope_scaled_depth_bias;
        self.depth_clip_enabled = other.depth_clip_enabled;
        self.scissor_enabled = other.scissor_enabled;
        self.multisample_enabled = other.multisample_enabled;
        self.antialiased_lines_enabled = other.antialiased_lines_enabled;
    }

    /// Solid fill, back faces culled, clockwise front faces.
    fn preset_default() -> &'static Self {
        static DEFAULT: OnceLock<RasterState> = OnceLock::new();
        DEFAULT.get_or_init(|| Self::preset(CullMode::Back, FillMode::Solid))
    }

    fn presets() -> Vec<Self> {
        vec![
            locked(Self::preset_default().clone()),
            Self::wireframe(),
            Self::cull_front_face(),
            Self::no_culling(),
        ]
    }

    fn create_native(&self, device: &dyn StateDevice, label: &str) -> Result<Option<NativeHandle>> {
        device.create_raster_state(self, label).map(Some)
    }
}

// ----------------------------------------------------------------------------
// Builder
// ----------------------------------------------------------------------------

impl StateBuilder<RasterState> {
    /// Sets the cull mode; the winding order is only touched when given.
    pub fn cull_mode(&mut self, mode: CullMode, front_counter_clockwise: Option<bool>) -> &mut Self {
        self.working.cull_mode = mode;
        if let Some(ccw) = front_counter_clockwise {
            self.working.front_counter_clockwise = ccw;
        }
        self
    }

    pub fn fill_mode(&mut self, mode: FillMode) -> &mut Self {
        self.working.fill_mode = mode;
        self
    }

    pub fn depth_bias(&mut self, bias: i32, clamp: f32, slope_scaled: f32) -> &mut Self {
        self.working.depth_bias = bias;
        self.working.depth_bias_clamp = clamp;
        self.working.slope_scaled_depth_bias = slope_scaled;
        self
    }

    pub fn depth_clip(&mut self, enabled: bool) -> &mut Self {
        self.working.depth_clip_enabled = enabled;
        self
    }

    pub fn scissor(&mut self, enabled: bool) -> &mut Self {
        self.working.scissor_enabled = enabled;
        self
    }

    pub fn multisample(&mut self, enabled: bool, antialiased_lines: bool) -> &mut Self {
        self.working.multisample_enabled = enabled;
        self.working.antialiased_lines_enabled = antialiased_lines;
        self
    }
}
