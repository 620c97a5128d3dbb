// src/state_tracker.rs
//! Works out which parts of the pipeline must be re-applied between two
//! consecutive draws.

use std::ops::Range;
use std::sync::Arc;

use crate::draw_call::{DrawCall, SamplerSlots};
use crate::pipeline::{same_ref, PipelineState, ShaderStage};
use crate::states::Color;

bitflags::bitflags! {
    /// Pipeline parts that differ from the previously applied draw.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StateChanges: u32 {
        const TOPOLOGY = 1 << 0;
        const RASTER_STATE = 1 << 1;
        const BLEND_STATE = 1 << 2;
        const DEPTH_STENCIL_STATE = 1 << 3;
        const VERTEX_SHADER = 1 << 4;
        const PIXEL_SHADER = 1 << 5;
        const GEOMETRY_SHADER = 1 << 6;
        const DOMAIN_SHADER = 1 << 7;
        const HULL_SHADER = 1 << 8;
        const SAMPLERS = 1 << 9;
        const BLEND_FACTOR = 1 << 10;
        const BLEND_SAMPLE_MASK = 1 << 11;
        const STENCIL_REFERENCE = 1 << 12;

        const SHADERS = Self::VERTEX_SHADER.bits()
            | Self::PIXEL_SHADER.bits()
            | Self::GEOMETRY_SHADER.bits()
            | Self::DOMAIN_SHADER.bits()
            | Self::HULL_SHADER.bits();
    }
}

const SHADER_FLAGS: [(ShaderStage, StateChanges); 5] = [
    (ShaderStage::Vertex, StateChanges::VERTEX_SHADER),
    (ShaderStage::Pixel, StateChanges::PIXEL_SHADER),
    (ShaderStage::Geometry, StateChanges::GEOMETRY_SHADER),
    (ShaderStage::Domain, StateChanges::DOMAIN_SHADER),
    (ShaderStage::Hull, StateChanges::HULL_SHADER),
];

/// Remembers what was last applied to the device.
#[derive(Debug, Default)]
pub struct StateTracker {
    pipeline: Option<Arc<PipelineState>>,
    samplers: SamplerSlots,
    sampler_span: Range<usize>,
    blend_factor: Option<Color>,
    blend_sample_mask: Option<u32>,
    stencil_reference: Option<u32>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets the applied state; the next draw reports everything it binds.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Compares `draw` with the previously evaluated draw and records it as
    /// the applied state.
    pub fn evaluate(&mut self, draw: &DrawCall) -> StateChanges {
        let mut changes = StateChanges::empty();

        let same_pipeline = matches!(
            (&self.pipeline, draw.pipeline_state()),
            (Some(current), Some(next)) if Arc::ptr_eq(current, next)
        );
        if !same_pipeline {
            changes |= pipeline_changes(self.pipeline.as_deref(), draw.pipeline_state().map(|p| &**p));
            self.pipeline = draw.pipeline_state().cloned();
        }

        if sampler_changes(&mut self.samplers, &mut self.sampler_span, draw.samplers()) {
            changes |= StateChanges::SAMPLERS;
        }

        if self.blend_factor != Some(draw.blend_factor()) {
            changes |= StateChanges::BLEND_FACTOR;
            self.blend_factor = Some(draw.blend_factor());
        }
        if self.blend_sample_mask != Some(draw.blend_sample_mask()) {
            changes |= StateChanges::BLEND_SAMPLE_MASK;
            self.blend_sample_mask = Some(draw.blend_sample_mask());
        }
        if self.stencil_reference != Some(draw.stencil_reference()) {
            changes |= StateChanges::STENCIL_REFERENCE;
            self.stencil_reference = Some(draw.stencil_reference());
        }

        changes
    }
}

fn pipeline_changes(current: Option<&PipelineState>, next: Option<&PipelineState>) -> StateChanges {
    let (current, next) = match (current, next) {
        (Some(current), Some(next)) => (current, next),
        (None, None) => return StateChanges::empty(),
        (_, Some(next)) => return bound_parts(next),
        (Some(current), None) => return bound_parts(current),
    };

    let mut changes = StateChanges::empty();
    if current.topology() != next.topology() {
        changes |= StateChanges::TOPOLOGY;
    }
    if !same_ref(current.raster_state(), next.raster_state()) {
        changes |= StateChanges::RASTER_STATE;
    }
    if !same_ref(current.depth_stencil_state(), next.depth_stencil_state()) {
        changes |= StateChanges::DEPTH_STENCIL_STATE;
    }
    let blend_differs = current.is_alpha_to_coverage_enabled() != next.is_alpha_to_coverage_enabled()
        || current.is_independent_blend_enabled() != next.is_independent_blend_enabled()
        || current
            .blend_states()
            .as_slice()
            .iter()
            .zip(next.blend_states().as_slice())
            .any(|(a, b)| !same_ref(a.as_ref(), b.as_ref()));
    if blend_differs {
        changes |= StateChanges::BLEND_STATE;
    }
    for (stage, flag) in SHADER_FLAGS {
        if !same_ref(current.shader(stage), next.shader(stage)) {
            changes |= flag;
        }
    }
    changes
}

/// Everything a pipeline binds, used when there is nothing to compare with.
fn bound_parts(pipeline: &PipelineState) -> StateChanges {
    let mut changes = StateChanges::TOPOLOGY | StateChanges::BLEND_STATE;
    if pipeline.raster_state().is_some() {
        changes |= StateChanges::RASTER_STATE;
    }
    if pipeline.depth_stencil_state().is_some() {
        changes |= StateChanges::DEPTH_STENCIL_STATE;
    }
    for (stage, flag) in SHADER_FLAGS {
        if pipeline.shader(stage).is_some() {
            changes |= flag;
        }
    }
    changes
}

/// Applies the sampler span of `next` to `applied`, reporting whether any slot
/// actually changed. Slots the previous draw bound outside that span are
/// unbound.
fn sampler_changes(applied: &mut SamplerSlots, bound: &mut Range<usize>, next: &SamplerSlots) -> bool {
    let span = next.dirty_range();
    let union = if bound.is_empty() {
        span.clone()
    } else if span.is_empty() {
        bound.clone()
    } else {
        bound.start.min(span.start)..bound.end.max(span.end)
    };

    let mut changed = false;
    for slot in union {
        let wanted = if span.contains(&slot) {
            next.get(slot).and_then(Option::as_ref)
        } else {
            None
        };
        let same = applied
            .get(slot)
            .is_some_and(|current| same_ref(current.as_ref(), wanted));
        if !same && applied.set(slot, wanted.cloned()).is_ok() {
            changed = true;
        }
    }
    *bound = span;
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HeadlessDevice;
    use crate::graphics::GraphicsStates;
    use crate::pipeline::{PrimitiveTopology, Shader};
    use crate::states::{RasterState, SamplerState};

    fn graphics() -> GraphicsStates {
        GraphicsStates::builder()
            .device(HeadlessDevice::shared())
            .build()
            .unwrap()
    }

    #[test]
    fn first_draw_reports_bound_parts() {
        let graphics = graphics();
        let vs = Arc::new(Shader::new(ShaderStage::Vertex, "vs"));
        let mut pipeline = graphics.pipeline_builder();
        pipeline.vertex_shader(Some(vs)).unwrap();
        let pipeline = pipeline.build().unwrap();

        let mut draw = graphics.draw_call_builder();
        draw.pipeline_state(Some(pipeline)).unwrap();
        let lease = draw.build().unwrap();

        let mut tracker = StateTracker::new();
        let changes = tracker.evaluate(&lease.read().unwrap());
        assert!(changes.contains(StateChanges::TOPOLOGY | StateChanges::VERTEX_SHADER));
        assert!(!changes.contains(StateChanges::PIXEL_SHADER));
        assert!(changes.contains(StateChanges::BLEND_FACTOR | StateChanges::STENCIL_REFERENCE));
        assert!(!changes.contains(StateChanges::SAMPLERS));
    }

    #[test]
    fn identical_pipeline_short_circuits() {
        let graphics = graphics();
        let pipeline = graphics.pipeline_builder().build().unwrap();
        let mut draw = graphics.draw_call_builder();
        draw.pipeline_state(Some(pipeline)).unwrap();

        let mut tracker = StateTracker::new();
        tracker.evaluate(&draw.build().unwrap().read().unwrap());
        let changes = tracker.evaluate(&draw.build().unwrap().read().unwrap());
        assert!(changes.is_empty());
    }

    #[test]
    fn only_changed_members_are_reported() {
        let graphics = graphics();
        let mut builder = graphics.pipeline_builder();
        builder.raster_state(Some(Arc::new(RasterState::wireframe()))).unwrap();
        let wire = builder.build().unwrap();
        builder.topology(PrimitiveTopology::LineStrip);
        let lines = builder.build().unwrap();

        let mut draw = graphics.draw_call_builder();
        let mut tracker = StateTracker::new();
        draw.pipeline_state(Some(wire)).unwrap();
        tracker.evaluate(&draw.build().unwrap().read().unwrap());
        draw.pipeline_state(Some(lines)).unwrap();
        let changes = tracker.evaluate(&draw.build().unwrap().read().unwrap());
        assert_eq!(changes, StateChanges::TOPOLOGY);
    }

    #[test]
    fn samplers_compare_dirty_span_only() {
        let graphics = graphics();
        let pipeline = graphics.pipeline_builder().build().unwrap();
        let mut draw = graphics.draw_call_builder();
        draw.pipeline_state(Some(pipeline)).unwrap();
        draw.sampler_state(Some(Arc::new(SamplerState::wrapping())), 2).unwrap();

        let mut tracker = StateTracker::new();
        let first = tracker.evaluate(&draw.build().unwrap().read().unwrap());
        assert!(first.contains(StateChanges::SAMPLERS));

        let again = tracker.evaluate(&draw.build().unwrap().read().unwrap());
        assert!(!again.contains(StateChanges::SAMPLERS));

        draw.sampler_state(Some(Arc::new(SamplerState::point_filtering())), 2).unwrap();
        let swapped = tracker.evaluate(&draw.build().unwrap().read().unwrap());
        assert_eq!(swapped, StateChanges::SAMPLERS);

        tracker.reset();
        let after_reset = tracker.evaluate(&draw.build().unwrap().read().unwrap());
        assert!(after_reset.contains(StateChanges::SAMPLERS | StateChanges::BLEND_STATE));
    }

    #[test]
    fn samplers_dropped_by_the_next_draw_are_unbound() {
        let graphics = graphics();
        let pipeline = graphics.pipeline_builder().build().unwrap();
        let wrapping = Arc::new(SamplerState::wrapping());
        let point = Arc::new(SamplerState::point_filtering());

        let mut draw = graphics.draw_call_builder();
        draw.pipeline_state(Some(Arc::clone(&pipeline)))
            .unwrap()
            .sampler_states(&[Arc::clone(&wrapping), Arc::clone(&point)], 0)
            .unwrap();
        let mut tracker = StateTracker::new();
        tracker.evaluate(&draw.build().unwrap().read().unwrap());

        draw.clear();
        draw.pipeline_state(Some(pipeline))
            .unwrap()
            .sampler_state(Some(wrapping), 0)
            .unwrap();
        let narrower = tracker.evaluate(&draw.build().unwrap().read().unwrap());
        assert_eq!(narrower, StateChanges::SAMPLERS);
        assert!(tracker.samplers.get(1).unwrap().is_none());

        let again = tracker.evaluate(&draw.build().unwrap().read().unwrap());
        assert!(again.is_empty());
    }
}
