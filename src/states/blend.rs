// src/states/blend.rs
//! Per-render-target blend state.
//!
//! A render target blend state has no native object of its own: the device
//! compiles all render targets of a pipeline into one combined blend object
//! (see [`crate::pipeline::PipelineState`]).

use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use super::{locked, Blend, BlendOperation, ColorWriteMask, StateHeader, StateKind, StateValue};
use crate::builder::StateBuilder;
use crate::device::{NativeHandle, StateDevice};
use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlendState {
    #[serde(skip)]
    header: StateHeader,
    is_blending_enabled: bool,
    color_operation: BlendOperation,
    alpha_operation: BlendOperation,
    source_color_blend: Blend,
    destination_color_blend: Blend,
    source_alpha_blend: Blend,
    destination_alpha_blend: Blend,
    write_mask: ColorWriteMask,
}

impl BlendState {
    fn with_factors(enabled: bool, source: Blend, destination: Blend) -> Self {
        locked(Self {
            header: StateHeader::new(),
            is_blending_enabled: enabled,
            color_operation: BlendOperation::Add,
            alpha_operation: BlendOperation::Add,
            source_color_blend: source,
            destination_color_blend: destination,
            source_alpha_blend: Blend::One,
            destination_alpha_blend: Blend::Zero,
            write_mask: ColorWriteMask::ALL,
        })
    }

    /// Blending enabled with an opaque `One`/`Zero` equation.
    pub fn no_blending() -> Self {
        Self::with_factors(true, Blend::One, Blend::Zero)
    }

    /// Classic alpha blending.
    pub fn modulated() -> Self {
        Self::with_factors(true, Blend::SourceAlpha, Blend::InverseSourceAlpha)
    }

    pub fn additive() -> Self {
        Self::with_factors(true, Blend::SourceAlpha, Blend::One)
    }

    pub fn inverted() -> Self {
        Self::with_factors(true, Blend::InverseDestinationColor, Blend::InverseSourceColor)
    }

    /// Alpha blending for premultiplied colors.
    pub fn premultiplied() -> Self {
        Self::with_factors(true, Blend::One, Blend::InverseSourceAlpha)
    }

    pub fn is_blending_enabled(&self) -> bool {
        self.is_blending_enabled
    }

    pub fn color_operation(&self) -> BlendOperation {
        self.color_operation
    }

    pub fn alpha_operation(&self) -> BlendOperation {
        self.alpha_operation
    }

    pub fn source_color_blend(&self) -> Blend {
        self.source_color_blend
    }

    pub fn destination_color_blend(&self) -> Blend {
        self.destination_color_blend
    }

    pub fn source_alpha_blend(&self) -> Blend {
        self.source_alpha_blend
    }

    pub fn destination_alpha_blend(&self) -> Blend {
        self.destination_alpha_blend
    }

    pub fn write_mask(&self) -> ColorWriteMask {
        self.write_mask
    }

    pub fn set_blending_enabled(&mut self, enabled: bool) -> Result<()> {
        self.header.check_unlocked(Self::KIND)?;
        self.is_blending_enabled = enabled;
        Ok(())
    }

    pub fn set_color_operation(&mut self, operation: BlendOperation) -> Result<()> {
        self.header.check_unlocked(Self::KIND)?;
        self.color_operation = operation;
        Ok(())
    }

    pub fn set_alpha_operation(&mut self, operation: BlendOperation) -> Result<()> {
        self.header.check_unlocked(Self::KIND)?;
        self.alpha_operation = operation;
        Ok(())
    }

    pub fn set_source_color_blend(&mut self, blend: Blend) -> Result<()> {
        self.header.check_unlocked(Self::KIND)?;
        self.source_color_blend = blend;
        Ok(())
    }

    pub fn set_destination_color_blend(&mut self, blend: Blend) -> Result<()> {
        self.header.check_unlocked(Self::KIND)?;
        self.destination_color_blend = blend;
        Ok(())
    }

    pub fn set_source_alpha_blend(&mut self, blend: Blend) -> Result<()> {
        self.header.check_unlocked(Self::KIND)?;
        self.source_alpha_blend = blend;
        Ok(())
    }

    pub fn set_destination_alpha_blend(&mut self, blend: Blend) -> Result<()> {
        self.header.check_unlocked(Self::KIND)?;
        self.destination_alpha_blend = blend;
        Ok(())
    }

    pub fn set_write_mask(&mut self, mask: ColorWriteMask) -> Result<()> {
        self.header.check_unlocked(Self::KIND)?;
        self.write_mask = mask;
        Ok(())
    }
}

impl PartialEq for BlendState {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
            || (self.is_blending_enabled == other.is_blending_enabled
                && self.color_operation == other.color_operation
                && self.alpha_operation == other.alpha_operation
                && self.source_color_blend == other.source_color_blend
                && self.destination_color_blend == other.destination_color_blend
                && self.source_alpha_blend == other.source_alpha_blend
                && self.destination_alpha_blend == other.destination_alpha_blend
                && self.write_mask == other.write_mask)
    }
}

impl Eq for BlendState {}

impl Hash for BlendState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.is_blending_enabled.hash(state);
        self.color_operation.hash(state);
        self.alpha_operation.hash(state);
        self.source_color_blend.hash(state);
        self.destination_color_blend.hash(state);
        self.source_alpha_blend.hash(state);
        self.destination_alpha_blend.hash(state);
        self.write_mask.hash(state);
    }
}

impl Default for BlendState {
    fn default() -> Self {
        Self::preset_default().clone()
    }
}

impl StateValue for BlendState {
    const KIND: StateKind = StateKind::Blend;

    fn header(&self) -> &StateHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut StateHeader {
        &mut self.header
    }

    fn assign_fields(&mut self, other: &Self) {
        self.is_blending_enabled = other.is_blending_enabled;
        self.color_operation = other.color_operation;
        self.alpha_operation = other.alpha_operation;
        self.source_color_blend = other.source_color_blend;
        self.destination_color_blend = other.destination_color_blend;
        self.source_alpha_blend = other.source_alpha_blend;
        self.destination_alpha_blend = other.destination_alpha_blend;
        self.write_mask = other.write_mask;
    }

    /// Blending disabled, `One`/`Zero`, all channels written.
    fn preset_default() -> &'static Self {
        static DEFAULT: OnceLock<BlendState> = OnceLock::new();
        DEFAULT.get_or_init(|| Self::with_factors(false, Blend::One, Blend::Zero))
    }

    fn presets() -> Vec<Self> {
        vec![
            locked(Self::preset_default().clone()),
            Self::no_blending(),
            Self::modulated(),
            Self::additive(),
            Self::inverted(),
            Self::premultiplied(),
        ]
    }

    fn create_native(&self, _device: &dyn StateDevice, _label: &str) -> Result<Option<NativeHandle>> {
        Ok(None)
    }
}

// ----------------------------------------------------------------------------
// Builder
// ----------------------------------------------------------------------------

impl StateBuilder<BlendState> {
    pub fn source_blend(&mut self, color: Blend, alpha: Blend) -> &mut Self {
        self.working.source_color_blend = color;
        self.working.source_alpha_blend = alpha;
        self
    }

    pub fn destination_blend(&mut self, color: Blend, alpha: Blend) -> &mut Self {
        self.working.destination_color_blend = color;
        self.working.destination_alpha_blend = alpha;
        self
    }

    pub fn blend_operation(&mut self, color: BlendOperation, alpha: BlendOperation) -> &mut Self {
        self.working.color_operation = color;
        self.working.alpha_operation = alpha;
        self
    }

    pub fn write_mask(&mut self, mask: ColorWriteMask) -> &mut Self {
        self.working.write_mask = mask;
        self
    }

    pub fn enable_blending(&mut self) -> &mut Self {
        self.working.is_blending_enabled = true;
        self
    }

    pub fn disable_blending(&mut self) -> &mut Self {
        self.working.is_blending_enabled = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::StateCache;
    use crate::device::HeadlessDevice;
    use std::collections::hash_map::DefaultHasher;
    use std::sync::Arc;

    fn hash_of(state: &BlendState) -> u64 {
        let mut hasher = DefaultHasher::new();
        state.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn equality_ignores_identity() {
        let a = BlendState::modulated();
        let b = BlendState::modulated();
        assert_ne!(a.id(), b.id());
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_ne!(a, BlendState::additive());
    }

    #[test]
    fn presets_are_locked() {
        let mut state = BlendState::additive();
        let err = state.set_blending_enabled(false).unwrap_err();
        assert!(err.is_immutable());
        assert!(state.is_blending_enabled());
    }

    #[test]
    fn copies_are_mutable() {
        let mut state = BlendState::additive().clone();
        state.set_write_mask(ColorWriteMask::RED).unwrap();
        assert_eq!(state.write_mask(), ColorWriteMask::RED);
    }

    #[test]
    fn copy_from_respects_lock() {
        let mut target = BlendState::default();
        target.copy_from(&BlendState::inverted()).unwrap();
        assert_eq!(target, BlendState::inverted());

        target.lock();
        assert!(target.copy_from(&BlendState::modulated()).is_err());
        assert_eq!(target, BlendState::inverted());
    }

    #[test]
    fn alpha_blend_scenario() {
        let cache = StateCache::<BlendState>::new(HeadlessDevice::shared());
        let mut builder = StateBuilder::<BlendState>::new();
        builder
            .source_blend(Blend::SourceAlpha, Blend::One)
            .destination_blend(Blend::InverseSourceAlpha, Blend::Zero)
            .enable_blending();

        let first = builder.build_cached(&cache).unwrap();
        let second = builder.build_cached(&cache).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        builder.disable_blending();
        let third = builder.build_cached(&cache).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert!(first.is_blending_enabled());
        assert!(!third.is_blending_enabled());
        assert_eq!(*first, BlendState::modulated());
    }

    #[test]
    fn deserialized_states_are_fresh() {
        let json = serde_json::to_string(&BlendState::premultiplied()).unwrap();
        let state: BlendState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, BlendState::premultiplied());
        assert!(!state.is_locked());
        assert!(state.native().is_none());
    }
}
