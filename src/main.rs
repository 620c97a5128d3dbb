// src/main.rs
//! Headless walkthrough of the state caches and the draw call pool.

use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use log::{info, LevelFilter};

use slop_render_state::states::{Blend, CullMode, FillMode, SamplerState};
use slop_render_state::{
    BlendState, GraphicsStates, HeadlessDevice, RasterState, Shader, ShaderStage, StateBuilder,
    StateConfig, StateKind, StateTracker, StateValue,
};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const FRAMES: usize = 3;
const DRAWS_PER_FRAME: usize = 200;

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(if cfg!(debug_assertions) {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .format_timestamp_millis()
        .format_target(false)
        .parse_default_env()
        .init();

    let device = HeadlessDevice::shared();
    let graphics = GraphicsStates::builder()
        .device(device.clone())
        .config(StateConfig::debug())
        .build()
        .context("creating graphics states")?;

    blend_scenario(&graphics)?;
    simulate_frames(&graphics)?;

    let stats = graphics.stats();
    info!("cache stats: {:#?}", stats);
    info!(
        "native objects: {} blend, {} depth/stencil, {} raster, {} sampler",
        device.created(StateKind::Blend),
        device.created(StateKind::DepthStencil),
        device.created(StateKind::Raster),
        device.created(StateKind::Sampler)
    );
    Ok(())
}

/// Two builds of one configuration share an instance; a different one does not.
fn blend_scenario(graphics: &GraphicsStates) -> Result<()> {
    let mut builder = StateBuilder::<BlendState>::new();
    builder
        .source_blend(Blend::SourceAlpha, Blend::One)
        .destination_blend(Blend::InverseSourceAlpha, Blend::Zero)
        .enable_blending();

    let first = builder.build_cached(graphics.blend_states())?;
    let second = builder.build_cached(graphics.blend_states())?;
    ensure!(Arc::ptr_eq(&first, &second), "equal blend states were not deduplicated");

    builder.disable_blending();
    let third = builder.build_cached(graphics.blend_states())?;
    ensure!(!Arc::ptr_eq(&first, &third), "distinct blend states were aliased");
    ensure!(first.is_blending_enabled(), "cached blend state changed after build");

    info!("blend scenario ok: {} / {}", first.debug_name(), third.debug_name());
    Ok(())
}

fn simulate_frames(graphics: &GraphicsStates) -> Result<()> {
    let vs = Arc::new(Shader::new(ShaderStage::Vertex, "demo.vs"));
    let ps = Arc::new(Shader::new(ShaderStage::Pixel, "demo.ps"));

    let mut raster = StateBuilder::<RasterState>::new();
    let mut pipelines = Vec::new();
    for (cull, fill) in [
        (CullMode::Back, FillMode::Solid),
        (CullMode::None, FillMode::Wireframe),
    ] {
        raster.cull_mode(cull, None).fill_mode(fill);
        let mut builder = graphics.pipeline_builder();
        builder
            .raster_state(Some(Arc::new(raster.build())))?
            .blend_state(Some(Arc::new(BlendState::modulated())), 0)?
            .vertex_shader(Some(Arc::clone(&vs)))?
            .pixel_shader(Some(Arc::clone(&ps)))?;
        pipelines.push(builder.build()?);
    }

    let samplers = [
        Arc::new(SamplerState::anisotropic_filtering()),
        Arc::new(SamplerState::point_filtering()),
    ];
    let mut tracker = StateTracker::new();
    for frame in 0..FRAMES {
        let mut draw = graphics.draw_call_builder();
        let mut switches = 0usize;
        for i in 0..DRAWS_PER_FRAME {
            draw.pipeline_state(Some(Arc::clone(&pipelines[i / 50 % pipelines.len()])))?
                .sampler_states(&samplers[i % 2..], 0)?
                .vertex_range((i * 36) as u32, 36);
            let lease = draw.build()?;
            let call = lease.read()?;
            if !tracker.evaluate(&call).is_empty() {
                switches += 1;
            }
        }
        tracker.reset();
        info!(
            "frame {}: {} draws, {} state switches, pool at {} allocations",
            frame,
            DRAWS_PER_FRAME,
            switches,
            graphics.draw_calls().allocations()
        );
    }
    Ok(())
}
