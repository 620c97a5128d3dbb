// src/graphics.rs
//! The graphics state context: one cache per state kind, the pipeline cache
//! and the draw call pool, all bound to one device.
//!
//! - Cache lifetime equals context lifetime; nothing is evicted behind the
//!   caller's back.
//! - Safe to share across render threads (`&GraphicsStates` is all builders
//!   need).

use std::fmt;
use std::sync::Arc;

use log::info;

use crate::cache::{CacheStats, StateCache};
use crate::config::StateConfig;
use crate::device::StateDevice;
use crate::draw_call::{DrawCall, DrawCallBuilder};
use crate::error::{Result, StateError};
use crate::gpu::RingPool;
use crate::pipeline::{BlendObjects, PipelineState, PipelineStateBuilder};
use crate::states::{BlendState, DepthStencilState, RasterState, SamplerState, StateValue};

/// Aggregated counters of every cache and the draw call pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphicsStats {
    pub blend: CacheStats,
    pub depth_stencil: CacheStats,
    pub raster: CacheStats,
    pub sampler: CacheStats,
    pub pipeline: CacheStats,
    /// Live combined blend objects shared by the pipelines.
    pub blend_objects: usize,
    pub draw_call_allocations: u64,
    pub draw_call_capacity: usize,
}

impl GraphicsStats {
    /// Canonical state objects alive in all caches.
    pub fn total_entries(&self) -> usize {
        self.blend.entries
            + self.depth_stencil.entries
            + self.raster.entries
            + self.sampler.entries
            + self.pipeline.entries
    }
}

pub struct GraphicsStates {
    device: Arc<dyn StateDevice>,
    config: StateConfig,
    blend: StateCache<BlendState>,
    depth_stencil: StateCache<DepthStencilState>,
    raster: StateCache<RasterState>,
    samplers: StateCache<SamplerState>,
    pipelines: StateCache<PipelineState>,
    blend_objects: Arc<BlendObjects>,
    draw_calls: RingPool<DrawCall>,
}

fn new_cache<S: StateValue>(device: &Arc<dyn StateDevice>, seed: bool) -> Result<StateCache<S>> {
    if seed {
        StateCache::with_presets(Arc::clone(device))
    } else {
        Ok(StateCache::new(Arc::clone(device)))
    }
}

impl GraphicsStates {
    pub fn builder() -> GraphicsStatesBuilder {
        GraphicsStatesBuilder::default()
    }

    pub fn device(&self) -> &Arc<dyn StateDevice> {
        &self.device
    }

    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    pub fn blend_states(&self) -> &StateCache<BlendState> {
        &self.blend
    }

    pub fn depth_stencil_states(&self) -> &StateCache<DepthStencilState> {
        &self.depth_stencil
    }

    pub fn raster_states(&self) -> &StateCache<RasterState> {
        &self.raster
    }

    pub fn sampler_states(&self) -> &StateCache<SamplerState> {
        &self.samplers
    }

    pub fn pipelines(&self) -> &StateCache<PipelineState> {
        &self.pipelines
    }

    pub fn draw_calls(&self) -> &RingPool<DrawCall> {
        &self.draw_calls
    }

    pub fn pipeline_builder(&self) -> PipelineStateBuilder<'_> {
        PipelineStateBuilder::new(self)
    }

    pub fn draw_call_builder(&self) -> DrawCallBuilder<'_> {
        DrawCallBuilder::new(self)
    }

    /// Empties every cache and reseeds the presets. Objects already handed
    /// out stay valid but are no longer canonical; native objects nobody else
    /// holds are released.
    pub fn clear_state_cache(&self) -> Result<()> {
        // Composites first: they hold references into the other caches.
        self.pipelines.clear()?;
        self.blend_objects.clear();
        self.blend.clear()?;
        self.depth_stencil.clear()?;
        self.raster.clear()?;
        self.samplers.clear()?;
        info!("graphics state caches cleared");
        Ok(())
    }

    pub fn stats(&self) -> GraphicsStats {
        GraphicsStats {
            blend: self.blend.stats(),
            depth_stencil: self.depth_stencil.stats(),
            raster: self.raster.stats(),
            sampler: self.samplers.stats(),
            pipeline: self.pipelines.stats(),
            blend_objects: self.blend_objects.len(),
            draw_call_allocations: self.draw_calls.allocations(),
            draw_call_capacity: self.draw_calls.capacity(),
        }
    }
}

impl fmt::Debug for GraphicsStates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphicsStates")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct GraphicsStatesBuilder {
    device: Option<Arc<dyn StateDevice>>,
    config: StateConfig,
}

impl GraphicsStatesBuilder {
    pub fn device(mut self, device: Arc<dyn StateDevice>) -> Self {
        self.device = Some(device);
        self
    }

    pub fn config(mut self, config: StateConfig) -> Self {
        self.config = config;
        self
    }

    /// Fails with `MissingDependency` when no device was supplied.
    pub fn build(self) -> Result<GraphicsStates> {
        let device = self
            .device
            .ok_or(StateError::MissingDependency("graphics device"))?;
        let config = self.config;
        config.validate()?;

        let seed = config.seed_presets;
        let blend_objects = Arc::new(BlendObjects::default());
        let pipelines = {
            let objects = Arc::clone(&blend_objects);
            let device = Arc::clone(&device);
            new_cache::<PipelineState>(&device, seed)?.with_native_factory(Box::new(
                move |pipeline: &PipelineState, label: &str| objects.acquire(&device, pipeline, label).map(Some),
            ))
        };
        let graphics = GraphicsStates {
            blend: new_cache(&device, seed)?,
            depth_stencil: new_cache(&device, seed)?,
            raster: new_cache(&device, seed)?,
            samplers: new_cache(&device, seed)?,
            pipelines,
            blend_objects,
            draw_calls: RingPool::with_stale_detection(
                config.draw_call_pool_capacity,
                config.detect_stale_slots,
                DrawCall::default,
            )?,
            device,
            config,
        };

        info!(
            "graphics states ready: {} preset states, {} draw call slots (stale checks {})",
            graphics.stats().total_entries(),
            graphics.draw_calls.capacity(),
            if graphics.config.detect_stale_slots { "on" } else { "off" }
        );
        Ok(graphics)
    }
}

impl fmt::Debug for GraphicsStatesBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphicsStatesBuilder")
            .field("has_device", &self.device.is_some())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::StateBuilder;
    use crate::device::HeadlessDevice;
    use crate::states::{CullMode, StateKind};

    #[test]
    fn device_is_required() {
        let err = GraphicsStates::builder().build().unwrap_err();
        assert_eq!(err, StateError::MissingDependency("graphics device"));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = GraphicsStates::builder()
            .device(HeadlessDevice::shared())
            .config(StateConfig::default().with_pool_capacity(0))
            .build()
            .unwrap_err();
        assert!(err.is_out_of_range());
    }

    #[test]
    fn caches_start_with_presets() {
        let device = HeadlessDevice::shared();
        let graphics = GraphicsStates::builder().device(device.clone()).build().unwrap();
        let stats = graphics.stats();
        assert_eq!(stats.blend.entries, BlendState::presets().len());
        assert_eq!(stats.raster.entries, RasterState::presets().len());
        assert_eq!(stats.pipeline.entries, 0);
        assert_eq!(stats.draw_call_capacity, 4096);
        // Per-target blend states have no native object of their own.
        assert_eq!(device.created(StateKind::Blend), 0);
        assert_eq!(device.created(StateKind::Sampler), SamplerState::presets().len());
    }

    #[test]
    fn unseeded_context_starts_empty() {
        let graphics = GraphicsStates::builder()
            .device(HeadlessDevice::shared())
            .config(StateConfig {
                seed_presets: false,
                ..StateConfig::debug()
            })
            .build()
            .unwrap();
        assert_eq!(graphics.stats().total_entries(), 0);
        assert_eq!(graphics.draw_calls().capacity(), 256);
    }

    #[test]
    fn clear_state_cache_reseeds() {
        let graphics = GraphicsStates::builder()
            .device(HeadlessDevice::shared())
            .build()
            .unwrap();
        let mut raster = StateBuilder::<RasterState>::new();
        raster.cull_mode(CullMode::Front, Some(true));
        let custom = raster.build_cached(graphics.raster_states()).unwrap();
        graphics.pipeline_builder().build().unwrap();
        let before = graphics.stats().total_entries();

        graphics.clear_state_cache().unwrap();
        let stats = graphics.stats();
        assert_eq!(stats.total_entries(), before - 2);
        assert_eq!(stats.raster.clears, 1);
        assert!(!graphics.raster_states().is_canonical(&custom));
    }

    #[test]
    fn cleared_native_objects_are_released_by_their_last_owner() {
        let device = HeadlessDevice::shared();
        let graphics = GraphicsStates::builder().device(device.clone()).build().unwrap();
        let presets = RasterState::presets().len();

        let mut raster = StateBuilder::<RasterState>::new();
        raster.cull_mode(CullMode::Front, Some(true));
        let custom = raster.build_cached(graphics.raster_states()).unwrap();
        let pipeline = graphics.pipeline_builder().build().unwrap();
        assert_eq!(device.created(StateKind::Raster), presets + 1);
        assert_eq!(graphics.stats().blend_objects, 1);
        drop(pipeline);

        graphics.clear_state_cache().unwrap();
        assert_eq!(device.released(StateKind::Raster), presets);
        assert_eq!(device.released(StateKind::Blend), 1);
        assert_eq!(graphics.stats().blend_objects, 0);
        assert!(custom.native().is_some());

        drop(custom);
        assert_eq!(device.released(StateKind::Raster), presets + 1);
        assert_eq!(device.live(StateKind::Raster), presets);
    }
}
