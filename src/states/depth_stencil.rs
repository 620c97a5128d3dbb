// src/states/depth_stencil.rs
//! Depth and stencil test configuration.

use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use super::{locked, Comparison, StateHeader, StateKind, StateValue, StencilOperation};
use crate::builder::StateBuilder;
use crate::device::{NativeHandle, StateDevice};
use crate::error::Result;

/// Stencil operations for one face orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StencilFace {
    pub fail: StencilOperation,
    pub depth_fail: StencilOperation,
    pub pass: StencilOperation,
    pub comparison: Comparison,
}

impl StencilFace {
    pub const KEEP_ALWAYS: StencilFace = StencilFace {
        fail: StencilOperation::Keep,
        depth_fail: StencilOperation::Keep,
        pass: StencilOperation::Keep,
        comparison: Comparison::Always,
    };
}

impl Default for StencilFace {
    fn default() -> Self {
        Self::KEEP_ALWAYS
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthStencilState {
    #[serde(skip)]
    header: StateHeader,
    depth_enabled: bool,
    depth_write_enabled: bool,
    depth_comparison: Comparison,
    stencil_enabled: bool,
    stencil_read_mask: u8,
    stencil_write_mask: u8,
    front_face: StencilFace,
    back_face: StencilFace,
}

impl DepthStencilState {
    fn preset(depth: bool, depth_write: bool, stencil: bool) -> Self {
        locked(Self {
            header: StateHeader::new(),
            depth_enabled: depth,
            depth_write_enabled: depth_write,
            depth_comparison: Comparison::LessEqual,
            stencil_enabled: stencil,
            stencil_read_mask: 0xff,
            stencil_write_mask: 0xff,
            front_face: StencilFace::KEEP_ALWAYS,
            back_face: StencilFace::KEEP_ALWAYS,
        })
    }

    pub fn depth_enabled() -> Self {
        Self::preset(true, true, false)
    }

    /// Depth test without depth writes, for transparent geometry.
    pub fn depth_enabled_no_write() -> Self {
        Self::preset(true, false, false)
    }

    pub fn stencil_enabled() -> Self {
        Self::preset(false, false, true)
    }

    pub fn depth_stencil_enabled() -> Self {
        Self::preset(true, true, true)
    }

    pub fn is_depth_enabled(&self) -> bool {
        self.depth_enabled
    }

    pub fn is_depth_write_enabled(&self) -> bool {
        self.depth_write_enabled
    }

    pub fn depth_comparison(&self) -> Comparison {
        self.depth_comparison
    }

    pub fn is_stencil_enabled(&self) -> bool {
        self.stencil_enabled
    }

    pub fn stencil_read_mask(&self) -> u8 {
        self.stencil_read_mask
    }

    pub fn stencil_write_mask(&self) -> u8 {
        self.stencil_write_mask
    }

    pub fn front_face(&self) -> StencilFace {
        self.front_face
    }

    pub fn back_face(&self) -> StencilFace {
        self.back_face
    }

    pub fn set_depth_enabled(&mut self, enabled: bool) -> Result<()> {
        self.header.check_unlocked(Self::KIND)?;
        self.depth_enabled = enabled;
        Ok(())
    }

    pub fn set_depth_write_enabled(&mut self, enabled: bool) -> Result<()> {
        self.header.check_unlocked(Self::KIND)?;
        self.depth_write_enabled = enabled;
        Ok(())
    }

    pub fn set_depth_comparison(&mut self, comparison: Comparison) -> Result<()> {
        self.header.check_unlocked(Self::KIND)?;
        self.depth_comparison = comparison;
        Ok(())
    }

    pub fn set_stencil_enabled(&mut self, enabled: bool) -> Result<()> {
        self.header.check_unlocked(Self::KIND)?;
        self.stencil_enabled = enabled;
        Ok(())
    }

    pub fn set_stencil_masks(&mut self, read: u8, write: u8) -> Result<()> {
        self.header.check_unlocked(Self::KIND)?;
        self.stencil_read_mask = read;
        self.stencil_write_mask = write;
        Ok(())
    }

    pub fn set_front_face(&mut self, face: StencilFace) -> Result<()> {
        self.header.check_unlocked(Self::KIND)?;
        self.front_face = face;
        Ok(())
    }

    pub fn set_back_face(&mut self, face: StencilFace) -> Result<()> {
        self.header.check_unlocked(Self::KIND)?;
        self.back_face = face;
        Ok(())
    }
}

impl PartialEq for DepthStencilState {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
            || (self.depth_enabled == other.depth_enabled
                && self.depth_write_enabled == other.depth_write_enabled
                && self.depth_comparison == other.depth_comparison
                && self.stencil_enabled == other.stencil_enabled
                && self.stencil_read_mask == other.stencil_read_mask
                && self.stencil_write_mask == other.stencil_write_mask
                && self.front_face == other.front_face
                && self.back_face == other.back_face)
    }
}

impl Eq for DepthStencilState {}

impl Hash for DepthStencilState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.depth_enabled.hash(state);
        self.depth_write_enabled.hash(state);
        self.depth_comparison.hash(state);
        self.stencil_enabled.hash(state);
        self.stencil_read_mask.hash(state);
        self.stencil_write_mask.hash(state);
        self.front_face.hash(state);
        self.back_face.hash(state);
    }
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self::preset_default().clone()
    }
}

impl StateValue for DepthStencilState {
    const KIND: StateKind = StateKind::DepthStencil;

    fn header(&self) -> &StateHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut StateHeader {
        &mut self.header
    }

    fn assign_fields(&mut self, other: &Self) {
        self.depth_enabled = other.depth_enabled;
        self.depth_write_enabled = other.depth_write_enabled;
        self.depth_comparison = other.depth_comparison;
        self.stencil_enabled = other.stencil_enabled;
        self.stencil_read_mask = other.stencil_read_mask;
        self.stencil_write_mask = other.stencil_write_mask;
        self.front_face = other.front_face;
        self.back_face = other.back_face;
    }

    /// Depth and stencil tests both disabled.
    fn preset_default() -> &'static Self {
        static DEFAULT: OnceLock<DepthStencilState> = OnceLock::new();
        DEFAULT.get_or_init(|| Self::preset(false, false, false))
    }

    fn presets() -> Vec<Self> {
        vec![
            locked(Self::preset_default().clone()),
            Self::depth_enabled(),
            Self::depth_enabled_no_write(),
            Self::stencil_enabled(),
            Self::depth_stencil_enabled(),
        ]
    }

    fn create_native(&self, device: &dyn StateDevice, label: &str) -> Result<Option<NativeHandle>> {
        device.create_depth_stencil_state(self, label).map(Some)
    }
}

// ----------------------------------------------------------------------------
// Builder
// ----------------------------------------------------------------------------

impl StateBuilder<DepthStencilState> {
    /// Enables or disables the depth test; `write` defaults to the current setting.
    pub fn depth_test(&mut self, enabled: bool, write: Option<bool>) -> &mut Self {
        self.working.depth_enabled = enabled;
        if let Some(write) = write {
            self.working.depth_write_enabled = write;
        }
        self
    }

    pub fn depth_comparison(&mut self, comparison: Comparison) -> &mut Self {
        self.working.depth_comparison = comparison;
        self
    }

    pub fn stencil_test(&mut self, enabled: bool) -> &mut Self {
        self.working.stencil_enabled = enabled;
        self
    }

    pub fn stencil_masks(&mut self, read: u8, write: u8) -> &mut Self {
        self.working.stencil_read_mask = read;
        self.working.stencil_write_mask = write;
        self
    }

    /// Sets both faces at once; `back` defaults to `front`.
    pub fn stencil_faces(&mut self, front: StencilFace, back: Option<StencilFace>) -> &mut Self {
        self.working.front_face = front;
        self.working.back_face = back.unwrap_or(front);
        self
    }
}
