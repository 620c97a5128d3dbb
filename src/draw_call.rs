// src/draw_call.rs
//! Transient per-draw records, recycled through the context's ring pool.

use std::sync::Arc;

use crate::dirty::DirtyArray;
use crate::error::{check_slot, check_span, Result, StateError};
use crate::gpu::PoolLease;
use crate::graphics::GraphicsStates;
use crate::pipeline::PipelineState;
use crate::states::{Color, SamplerState};

/// Sampler slots per draw.
pub const MAX_SAMPLER_SLOTS: usize = 16;

pub type SamplerSlots = DirtyArray<Option<Arc<SamplerState>>, MAX_SAMPLER_SLOTS>;

#[derive(Debug, Clone)]
pub struct DrawCall {
    pipeline: Option<Arc<PipelineState>>,
    samplers: SamplerSlots,
    vertex_start: u32,
    vertex_count: u32,
    index_start: u32,
    index_count: u32,
    base_vertex: i32,
    instance_count: u32,
    blend_factor: Color,
    blend_sample_mask: u32,
    stencil_reference: u32,
}

impl Default for DrawCall {
    fn default() -> Self {
        Self {
            pipeline: None,
            samplers: SamplerSlots::new(),
            vertex_start: 0,
            vertex_count: 0,
            index_start: 0,
            index_count: 0,
            base_vertex: 0,
            instance_count: 1,
            blend_factor: Color::WHITE,
            blend_sample_mask: u32::MAX,
            stencil_reference: 0,
        }
    }
}

impl DrawCall {
    pub fn pipeline_state(&self) -> Option<&Arc<PipelineState>> {
        self.pipeline.as_ref()
    }

    pub fn samplers(&self) -> &SamplerSlots {
        &self.samplers
    }

    pub fn sampler_state(&self, slot: usize) -> Option<&Arc<SamplerState>> {
        self.samplers.get(slot).and_then(Option::as_ref)
    }

    pub fn vertex_range(&self) -> (u32, u32) {
        (self.vertex_start, self.vertex_count)
    }

    pub fn index_range(&self) -> (u32, u32) {
        (self.index_start, self.index_count)
    }

    pub fn base_vertex(&self) -> i32 {
        self.base_vertex
    }

    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    pub fn is_indexed(&self) -> bool {
        self.index_count > 0
    }

    pub fn blend_factor(&self) -> Color {
        self.blend_factor
    }

    pub fn blend_sample_mask(&self) -> u32 {
        self.blend_sample_mask
    }

    pub fn stencil_reference(&self) -> u32 {
        self.stencil_reference
    }

    /// Overwrites this record in place.
    pub fn assign(&mut self, other: &DrawCall) {
        self.pipeline.clone_from(&other.pipeline);
        self.samplers.assign(&other.samplers);
        self.vertex_start = other.vertex_start;
        self.vertex_count = other.vertex_count;
        self.index_start = other.index_start;
        self.index_count = other.index_count;
        self.base_vertex = other.base_vertex;
        self.instance_count = other.instance_count;
        self.blend_factor = other.blend_factor;
        self.blend_sample_mask = other.blend_sample_mask;
        self.stencil_reference = other.stencil_reference;
    }
}

/// Stages one draw and snapshots it into a pooled [`DrawCall`].
///
/// Leases are valid for one frame: the pool recycles a slot after
/// `draw_call_pool_capacity` further builds.
#[derive(Debug)]
pub struct DrawCallBuilder<'g> {
    graphics: &'g GraphicsStates,
    working: DrawCall,
}

impl<'g> DrawCallBuilder<'g> {
    pub fn new(graphics: &'g GraphicsStates) -> Self {
        Self {
            graphics,
            working: DrawCall::default(),
        }
    }

    pub fn working(&self) -> &DrawCall {
        &self.working
    }

    pub fn pipeline_state(&mut self, pipeline: Option<Arc<PipelineState>>) -> Result<&mut Self> {
        self.working.pipeline = pipeline
            .map(|p| self.graphics.pipelines().cache_shared(p))
            .transpose()?;
        Ok(self)
    }

    pub fn sampler_state(&mut self, state: Option<Arc<SamplerState>>, slot: usize) -> Result<&mut Self> {
        check_slot("sampler slot", slot, MAX_SAMPLER_SLOTS)?;
        let state = state
            .map(|s| self.graphics.sampler_states().cache_shared(s))
            .transpose()?;
        self.working.samplers.set(slot, state)?;
        Ok(self)
    }

    pub fn sampler_states(&mut self, states: &[Arc<SamplerState>], start_slot: usize) -> Result<&mut Self> {
        check_slot("sampler slot", start_slot, MAX_SAMPLER_SLOTS)?;
        check_span("sampler slots", start_slot, states.len(), MAX_SAMPLER_SLOTS)?;
        let cache = self.graphics.sampler_states();
        let canonical = states
            .iter()
            .map(|s| cache.cache_shared(Arc::clone(s)).map(Some))
            .collect::<Result<Vec<_>>>()?;
        self.working.samplers.set_range(start_slot, &canonical)?;
        Ok(self)
    }

    pub fn vertex_range(&mut self, start: u32, count: u32) -> &mut Self {
        self.working.vertex_start = start;
        self.working.vertex_count = count;
        self
    }

    pub fn index_range(&mut self, start: u32, count: u32, base_vertex: i32) -> &mut Self {
        self.working.index_start = start;
        self.working.index_count = count;
        self.working.base_vertex = base_vertex;
        self
    }

    pub fn instances(&mut self, count: u32) -> &mut Self {
        self.working.instance_count = count;
        self
    }

    pub fn blend_factor(&mut self, factor: Color) -> &mut Self {
        self.working.blend_factor = factor;
        self
    }

    pub fn blend_sample_mask(&mut self, mask: u32) -> &mut Self {
        self.working.blend_sample_mask = mask;
        self
    }

    pub fn stencil_reference(&mut self, reference: u32) -> &mut Self {
        self.working.stencil_reference = reference;
        self
    }

    pub fn clear(&mut self) -> &mut Self {
        self.working = DrawCall::default();
        self
    }

    pub fn reset_to(&mut self, draw: Option<&DrawCall>) -> &mut Self {
        match draw {
            Some(draw) => self.working.assign(draw),
            None => {
                self.clear();
            }
        }
        self
    }

    /// Copies the working draw into the next pool slot.
    pub fn build(&self) -> Result<PoolLease<'g, DrawCall>> {
        if self.working.pipeline.is_none() {
            return Err(StateError::MissingDependency("pipeline state"));
        }
        self.graphics
            .draw_calls()
            .allocate(|slot| slot.assign(&self.working))
    }
}
