// src/pipeline.rs
//! Pipeline state composite and its builder.
//!
//! A [`PipelineState`] bundles the per-render-target blend states, the
//! depth/stencil and raster states, the shader stages and the primitive
//! topology of one draw. Every member reference is canonical (it came out of a
//! [`StateCache`](crate::cache::StateCache)), so two composites are equal iff
//! each member is the *same* `Arc`. Composite lookups never compare fields.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock, Weak};

use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3;

use crate::device::{BlendDescription, NativeHandle, NativeObject, StateDevice};
use crate::dirty::DirtyArray;
use crate::error::{check_slot, check_span, Result, StateError};
use crate::graphics::GraphicsStates;
use crate::states::{locked, BlendState, DepthStencilState, RasterState, StateHeader, StateKind, StateValue};

/// Simultaneous render targets a pipeline can blend into.
pub const MAX_RENDER_TARGETS: usize = 8;

pub type BlendSlots = DirtyArray<Option<Arc<BlendState>>, MAX_RENDER_TARGETS>;

// ============================================================================
// Shaders and topology
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderStage {
    Vertex,
    Pixel,
    Geometry,
    Domain,
    Hull,
}

/// Compiled shader owned by the application. Only its stage is inspected here.
#[derive(Debug)]
pub struct Shader {
    stage: ShaderStage,
    name: String,
    native: Option<NativeHandle>,
}

impl Shader {
    pub fn new(stage: ShaderStage, name: impl Into<String>) -> Self {
        Self {
            stage,
            name: name.into(),
            native: None,
        }
    }

    pub fn with_native(mut self, native: NativeHandle) -> Self {
        self.native = Some(native);
        self
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn native(&self) -> Option<NativeHandle> {
        self.native
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
    LineListWithAdjacency,
    TriangleListWithAdjacency,
}

#[inline]
pub(crate) fn same_ref<T>(a: Option<&Arc<T>>, b: Option<&Arc<T>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

#[inline]
pub(crate) fn hash_ref<T, H: Hasher>(value: &Option<Arc<T>>, state: &mut H) {
    value.as_ref().map(|v| Arc::as_ptr(v) as *const () as usize).hash(state);
}

// ============================================================================
// PipelineState
// ============================================================================

#[derive(Debug, Clone)]
pub struct PipelineState {
    header: StateHeader,
    blend_states: BlendSlots,
    depth_stencil: Option<Arc<DepthStencilState>>,
    raster: Option<Arc<RasterState>>,
    vertex_shader: Option<Arc<Shader>>,
    pixel_shader: Option<Arc<Shader>>,
    geometry_shader: Option<Arc<Shader>>,
    domain_shader: Option<Arc<Shader>>,
    hull_shader: Option<Arc<Shader>>,
    topology: PrimitiveTopology,
    alpha_to_coverage: bool,
    independent_blend: bool,
}

impl PipelineState {
    fn empty() -> Self {
        Self {
            header: StateHeader::new(),
            blend_states: BlendSlots::new(),
            depth_stencil: None,
            raster: None,
            vertex_shader: None,
            pixel_shader: None,
            geometry_shader: None,
            domain_shader: None,
            hull_shader: None,
            topology: PrimitiveTopology::TriangleList,
            alpha_to_coverage: false,
            independent_blend: false,
        }
    }

    pub fn blend_state(&self, slot: usize) -> Option<&Arc<BlendState>> {
        self.blend_states.get(slot).and_then(Option::as_ref)
    }

    pub fn blend_states(&self) -> &BlendSlots {
        &self.blend_states
    }

    pub fn depth_stencil_state(&self) -> Option<&Arc<DepthStencilState>> {
        self.depth_stencil.as_ref()
    }

    pub fn raster_state(&self) -> Option<&Arc<RasterState>> {
        self.raster.as_ref()
    }

    pub fn shader(&self, stage: ShaderStage) -> Option<&Arc<Shader>> {
        self.shader_slot(stage).as_ref()
    }

    pub fn topology(&self) -> PrimitiveTopology {
        self.topology
    }

    pub fn is_alpha_to_coverage_enabled(&self) -> bool {
        self.alpha_to_coverage
    }

    pub fn is_independent_blend_enabled(&self) -> bool {
        self.independent_blend
    }

    fn shader_slot(&self, stage: ShaderStage) -> &Option<Arc<Shader>> {
        match stage {
            ShaderStage::Vertex => &self.vertex_shader,
            ShaderStage::Pixel => &self.pixel_shader,
            ShaderStage::Geometry => &self.geometry_shader,
            ShaderStage::Domain => &self.domain_shader,
            ShaderStage::Hull => &self.hull_shader,
        }
    }

    fn shader_slot_mut(&mut self, stage: ShaderStage) -> &mut Option<Arc<Shader>> {
        match stage {
            ShaderStage::Vertex => &mut self.vertex_shader,
            ShaderStage::Pixel => &mut self.pixel_shader,
            ShaderStage::Geometry => &mut self.geometry_shader,
            ShaderStage::Domain => &mut self.domain_shader,
            ShaderStage::Hull => &mut self.hull_shader,
        }
    }

    /// The combined blend description, built from the dirty slots only.
    pub fn blend_description(&self) -> BlendDescription<'_> {
        BlendDescription {
            alpha_to_coverage: self.alpha_to_coverage,
            independent_blend: self.independent_blend,
            render_targets: self.blend_states.dirty_items(),
            first_slot: self.blend_states.dirty_range().start,
        }
    }
}

impl PartialEq for PipelineState {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        self.topology == other.topology
            && self.alpha_to_coverage == other.alpha_to_coverage
            && self.independent_blend == other.independent_blend
            && same_ref(self.depth_stencil.as_ref(), other.depth_stencil.as_ref())
            && same_ref(self.raster.as_ref(), other.raster.as_ref())
            && same_ref(self.vertex_shader.as_ref(), other.vertex_shader.as_ref())
            && same_ref(self.pixel_shader.as_ref(), other.pixel_shader.as_ref())
            && same_ref(self.geometry_shader.as_ref(), other.geometry_shader.as_ref())
            && same_ref(self.domain_shader.as_ref(), other.domain_shader.as_ref())
            && same_ref(self.hull_shader.as_ref(), other.hull_shader.as_ref())
            && self
                .blend_states
                .as_slice()
                .iter()
                .zip(other.blend_states.as_slice())
                .all(|(a, b)| same_ref(a.as_ref(), b.as_ref()))
    }
}

impl Eq for PipelineState {}

impl Hash for PipelineState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.topology.hash(state);
        self.alpha_to_coverage.hash(state);
        self.independent_blend.hash(state);
        hash_ref(&self.depth_stencil, state);
        hash_ref(&self.raster, state);
        hash_ref(&self.vertex_shader, state);
        hash_ref(&self.pixel_shader, state);
        hash_ref(&self.geometry_shader, state);
        hash_ref(&self.domain_shader, state);
        hash_ref(&self.hull_shader, state);
        for slot in self.blend_states.as_slice() {
            hash_ref(slot, state);
        }
    }
}

impl StateValue for PipelineState {
    const KIND: StateKind = StateKind::Pipeline;
    const NATIVE_KIND: StateKind = StateKind::Blend;

    fn header(&self) -> &StateHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut StateHeader {
        &mut self.header
    }

    fn assign_fields(&mut self, other: &Self) {
        self.blend_states.assign(&other.blend_states);
        self.depth_stencil.clone_from(&other.depth_stencil);
        self.raster.clone_from(&other.raster);
        self.vertex_shader.clone_from(&other.vertex_shader);
        self.pixel_shader.clone_from(&other.pixel_shader);
        self.geometry_shader.clone_from(&other.geometry_shader);
        self.domain_shader.clone_from(&other.domain_shader);
        self.hull_shader.clone_from(&other.hull_shader);
        self.topology = other.topology;
        self.alpha_to_coverage = other.alpha_to_coverage;
        self.independent_blend = other.independent_blend;
    }

    /// Nothing bound, triangle lists.
    fn preset_default() -> &'static Self {
        static DEFAULT: OnceLock<PipelineState> = OnceLock::new();
        DEFAULT.get_or_init(|| locked(Self::empty()))
    }

    /// Pipelines are application specific; there is nothing to seed.
    fn presets() -> Vec<Self> {
        Vec::new()
    }

    fn create_native(&self, device: &dyn StateDevice, label: &str) -> Result<Option<NativeHandle>> {
        device.create_blend_state(&self.blend_description(), label).map(Some)
    }
}

// ============================================================================
// Combined blend objects
// ============================================================================

/// Identity of a combined blend object: the blend flags plus the addresses of
/// the canonical blend states in the dirty span.
#[derive(Debug, PartialEq, Eq)]
struct BlendSetup {
    alpha_to_coverage: bool,
    independent_blend: bool,
    first_slot: usize,
    render_targets: Vec<Option<usize>>,
}

impl BlendSetup {
    fn of(desc: &BlendDescription<'_>) -> Self {
        Self {
            alpha_to_coverage: desc.alpha_to_coverage,
            independent_blend: desc.independent_blend,
            first_slot: desc.first_slot,
            render_targets: desc
                .render_targets
                .iter()
                .map(|target| target.as_ref().map(|s| Arc::as_ptr(s) as usize))
                .collect(),
        }
    }

    fn key(&self) -> u64 {
        let mut hasher = Xxh3::new();
        self.alpha_to_coverage.hash(&mut hasher);
        self.independent_blend.hash(&mut hasher);
        self.first_slot.hash(&mut hasher);
        self.render_targets.hash(&mut hasher);
        hasher.finish()
    }
}

/// Combined blend objects shared by every pipeline with the same blend setup.
///
/// Entries are weak: an object is released once the last pipeline using it is
/// gone. A live entry keeps its pipelines, and so the blend states whose
/// addresses form the key, alive.
#[derive(Debug, Default)]
pub(crate) struct BlendObjects {
    entries: Mutex<HashMap<u64, Vec<(BlendSetup, Weak<NativeObject>)>>>,
}

impl BlendObjects {
    pub(crate) fn acquire(
        &self,
        device: &Arc<dyn StateDevice>,
        pipeline: &PipelineState,
        label: &str,
    ) -> Result<Arc<NativeObject>> {
        let desc = pipeline.blend_description();
        let setup = BlendSetup::of(&desc);
        let key = setup.key();

        let mut entries = self.entries.lock();
        if let Some(bucket) = entries.get_mut(&key) {
            bucket.retain(|(_, object)| object.strong_count() > 0);
            let shared = bucket
                .iter()
                .find(|(existing, _)| *existing == setup)
                .and_then(|(_, object)| object.upgrade());
            if let Some(object) = shared {
                debug!("{} reuses blend object {}", label, object.handle().raw());
                return Ok(object);
            }
        }

        let handle = device.create_blend_state(&desc, label)?;
        let object = Arc::new(NativeObject::new(Arc::clone(device), StateKind::Blend, handle));
        entries
            .entry(key)
            .or_default()
            .push((setup, Arc::downgrade(&object)));
        Ok(object)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .lock()
            .values()
            .flatten()
            .filter(|(_, object)| object.strong_count() > 0)
            .count()
    }

    pub(crate) fn clear(&self) {
        self.entries.lock().clear();
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Configures pipeline composites against one [`GraphicsStates`] context.
///
/// Every member handed to a setter is first canonicalized through the
/// context's caches, which is what keeps composite equality a pointer check.
/// Like [`StateBuilder`](crate::builder::StateBuilder) it is not thread-safe.
#[derive(Debug)]
pub struct PipelineStateBuilder<'g> {
    graphics: &'g GraphicsStates,
    working: PipelineState,
}

impl<'g> PipelineStateBuilder<'g> {
    pub fn new(graphics: &'g GraphicsStates) -> Self {
        Self {
            graphics,
            working: PipelineState::preset_default().clone(),
        }
    }

    pub fn working(&self) -> &PipelineState {
        &self.working
    }

    /// Binds `state` to render target `slot` (`None` unbinds).
    pub fn blend_state(&mut self, state: Option<Arc<BlendState>>, slot: usize) -> Result<&mut Self> {
        check_slot("render target slot", slot, MAX_RENDER_TARGETS)?;
        let state = state
            .map(|s| self.graphics.blend_states().cache_shared(s))
            .transpose()?;
        self.working.blend_states.set(slot, state)?;
        Ok(self)
    }

    /// Binds `states` to consecutive render targets starting at `start_slot`.
    pub fn blend_states(&mut self, states: &[Arc<BlendState>], start_slot: usize) -> Result<&mut Self> {
        check_slot("render target slot", start_slot, MAX_RENDER_TARGETS)?;
        check_span("render target slots", start_slot, states.len(), MAX_RENDER_TARGETS)?;
        let cache = self.graphics.blend_states();
        let canonical = states
            .iter()
            .map(|s| cache.cache_shared(Arc::clone(s)).map(Some))
            .collect::<Result<Vec<_>>>()?;
        self.working.blend_states.set_range(start_slot, &canonical)?;
        Ok(self)
    }

    pub fn depth_stencil_state(&mut self, state: Option<Arc<DepthStencilState>>) -> Result<&mut Self> {
        self.working.depth_stencil = state
            .map(|s| self.graphics.depth_stencil_states().cache_shared(s))
            .transpose()?;
        Ok(self)
    }

    pub fn raster_state(&mut self, state: Option<Arc<RasterState>>) -> Result<&mut Self> {
        self.working.raster = state
            .map(|s| self.graphics.raster_states().cache_shared(s))
            .transpose()?;
        Ok(self)
    }

    /// Binds `shader` to `stage`; a shader compiled for another stage is rejected.
    pub fn shader(&mut self, stage: ShaderStage, shader: Option<Arc<Shader>>) -> Result<&mut Self> {
        if let Some(shader) = &shader {
            if shader.stage() != stage {
                return Err(StateError::ShaderStageMismatch {
                    expected: stage,
                    actual: shader.stage(),
                });
            }
        }
        *self.working.shader_slot_mut(stage) = shader;
        Ok(self)
    }

    pub fn vertex_shader(&mut self, shader: Option<Arc<Shader>>) -> Result<&mut Self> {
        self.shader(ShaderStage::Vertex, shader)
    }

    pub fn pixel_shader(&mut self, shader: Option<Arc<Shader>>) -> Result<&mut Self> {
        self.shader(ShaderStage::Pixel, shader)
    }

    pub fn geometry_shader(&mut self, shader: Option<Arc<Shader>>) -> Result<&mut Self> {
        self.shader(ShaderStage::Geometry, shader)
    }

    pub fn domain_shader(&mut self, shader: Option<Arc<Shader>>) -> Result<&mut Self> {
        self.shader(ShaderStage::Domain, shader)
    }

    pub fn hull_shader(&mut self, shader: Option<Arc<Shader>>) -> Result<&mut Self> {
        self.shader(ShaderStage::Hull, shader)
    }

    pub fn topology(&mut self, topology: PrimitiveTopology) -> &mut Self {
        self.working.topology = topology;
        self
    }

    pub fn alpha_to_coverage(&mut self, enabled: bool) -> &mut Self {
        self.working.alpha_to_coverage = enabled;
        self
    }

    pub fn independent_blend(&mut self, enabled: bool) -> &mut Self {
        self.working.independent_blend = enabled;
        self
    }

    pub fn clear(&mut self) -> &mut Self {
        self.working.assign_fields(PipelineState::preset_default());
        self
    }

    pub fn reset_to(&mut self, state: Option<&PipelineState>) -> &mut Self {
        match state {
            Some(state) => self.working.assign_fields(state),
            None => {
                self.clear();
            }
        }
        self
    }

    /// The canonical composite for the working configuration. The first build
    /// of a configuration creates its combined native blend object.
    pub fn build(&self) -> Result<Arc<PipelineState>> {
        self.graphics.pipelines().cache_ref(&self.working)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::StateBuilder;
    use crate::device::HeadlessDevice;
    use crate::states::{Blend, CullMode};

    fn graphics() -> (Arc<HeadlessDevice>, GraphicsStates) {
        let device = HeadlessDevice::shared();
        let graphics = GraphicsStates::builder()
            .device(device.clone())
            .build()
            .unwrap();
        (device, graphics)
    }

    #[test]
    fn equal_configurations_share_one_composite() {
        let (device, graphics) = graphics();
        let vs = Arc::new(Shader::new(ShaderStage::Vertex, "mesh.vs"));

        let build = || {
            let mut builder = graphics.pipeline_builder();
            builder
                .blend_state(Some(Arc::new(BlendState::modulated())), 0)
                .unwrap()
                .raster_state(Some(Arc::new(RasterState::wireframe())))
                .unwrap()
                .vertex_shader(Some(Arc::clone(&vs)))
                .unwrap();
            builder.build().unwrap()
        };

        let a = build();
        let b = build();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.is_locked());
        assert_eq!(graphics.pipelines().len(), 1);
        assert_eq!(device.created(StateKind::Pipeline), 0);
        // The composite owns the combined blend object.
        assert!(a.native().is_some());
    }

    #[test]
    fn pipelines_with_one_blend_setup_share_a_blend_object() {
        let (device, graphics) = graphics();
        let build = |name: &str| {
            let mut builder = graphics.pipeline_builder();
            builder
                .blend_state(Some(Arc::new(BlendState::modulated())), 0)
                .unwrap()
                .vertex_shader(Some(Arc::new(Shader::new(ShaderStage::Vertex, name))))
                .unwrap();
            builder.build().unwrap()
        };

        let first = build("sprite.vs");
        let second = build("mesh.vs");
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.native(), second.native());
        assert_eq!(device.created(StateKind::Blend), 1);

        let mut builder = graphics.pipeline_builder();
        builder
            .blend_state(Some(Arc::new(BlendState::modulated())), 0)
            .unwrap()
            .alpha_to_coverage(true);
        let coverage = builder.build().unwrap();
        assert_ne!(coverage.native(), first.native());
        assert_eq!(device.created(StateKind::Blend), 2);

        drop((first, second, coverage));
        graphics.clear_state_cache().unwrap();
        assert_eq!(device.live(StateKind::Blend), 0);
    }

    #[test]
    fn members_are_canonicalized() {
        let (_device, graphics) = graphics();
        let mut builder = graphics.pipeline_builder();
        builder
            .raster_state(Some(Arc::new(RasterState::wireframe())))
            .unwrap();
        let raster = builder.working().raster_state().unwrap();
        assert!(graphics.raster_states().is_canonical(raster));
    }

    #[test]
    fn slot_validation_happens_first() {
        let (_device, graphics) = graphics();
        let mut builder = graphics.pipeline_builder();
        builder.blend_state(Some(Arc::new(BlendState::additive())), 7).unwrap();

        let err = builder
            .blend_state(Some(Arc::new(BlendState::modulated())), MAX_RENDER_TARGETS)
            .unwrap_err();
        assert!(err.is_out_of_range());

        let two = [Arc::new(BlendState::modulated()), Arc::new(BlendState::inverted())];
        assert!(builder.blend_states(&two, 7).is_err());
        assert!(builder.blend_states(&two, MAX_RENDER_TARGETS).is_err());

        assert_eq!(builder.working().blend_states().dirty_range(), 7..8);
        assert_eq!(**builder.working().blend_state(7).unwrap(), BlendState::additive());
        assert!(builder.working().blend_state(0).is_none());
    }

    #[test]
    fn blend_description_covers_dirty_span() {
        let (_device, graphics) = graphics();
        let mut builder = graphics.pipeline_builder();
        let states = [Arc::new(BlendState::modulated()), Arc::new(BlendState::additive())];
        builder.blend_states(&states, 2).unwrap().independent_blend(true);

        let pipeline = builder.build().unwrap();
        let desc = pipeline.blend_description();
        assert_eq!(desc.first_slot, 2);
        assert_eq!(desc.render_targets.len(), 2);
        assert!(desc.independent_blend);
    }

    #[test]
    fn shader_stage_is_checked() {
        let (_device, graphics) = graphics();
        let mut builder = graphics.pipeline_builder();
        let ps = Arc::new(Shader::new(ShaderStage::Pixel, "lit.ps"));
        let err = builder.vertex_shader(Some(Arc::clone(&ps))).unwrap_err();
        assert_eq!(
            err,
            StateError::ShaderStageMismatch {
                expected: ShaderStage::Vertex,
                actual: ShaderStage::Pixel
            }
        );
        assert!(builder.working().shader(ShaderStage::Vertex).is_none());
        builder.pixel_shader(Some(ps)).unwrap();
        assert!(builder.working().shader(ShaderStage::Pixel).is_some());
    }

    #[test]
    fn distinct_members_give_distinct_composites() {
        let (_device, graphics) = graphics();
        let mut raster = StateBuilder::<RasterState>::new();
        let mut builder = graphics.pipeline_builder();

        raster.cull_mode(CullMode::Front, None);
        builder.raster_state(Some(Arc::new(raster.build()))).unwrap();
        let front = builder.build().unwrap();

        raster.cull_mode(CullMode::None, None);
        builder.raster_state(Some(Arc::new(raster.build()))).unwrap();
        let none = builder.build().unwrap();

        assert!(!Arc::ptr_eq(&front, &none));
        assert_eq!(front.raster_state().unwrap().cull_mode(), CullMode::Front);
    }

    #[test]
    fn clear_and_reset() {
        let (_device, graphics) = graphics();
        let mut builder = graphics.pipeline_builder();
        builder
            .topology(PrimitiveTopology::LineList)
            .alpha_to_coverage(true)
            .blend_state(Some(Arc::new(BlendState::additive())), 0)
            .unwrap();
        let built = builder.build().unwrap();

        builder.clear();
        assert_eq!(builder.working(), PipelineState::preset_default());
        assert!(!builder.working().blend_states().is_dirty());

        builder.reset_to(Some(&built));
        assert_eq!(builder.working(), &*built);
        assert!(Arc::ptr_eq(&builder.build().unwrap(), &built));

        builder.reset_to(None);
        assert_eq!(builder.working().topology(), PrimitiveTopology::TriangleList);
    }

    #[test]
    fn blend_builder_output_feeds_pipeline() {
        let (_device, graphics) = graphics();
        let mut blend = StateBuilder::<BlendState>::new();
        blend
            .source_blend(Blend::One, Blend::One)
            .destination_blend(Blend::InverseSourceAlpha, Blend::Zero)
            .enable_blending();
        let premultiplied = blend.build_cached(graphics.blend_states()).unwrap();
        // Seeded preset instance is returned.
        assert!(graphics.blend_states().is_canonical(&premultiplied));
        assert_eq!(*premultiplied, BlendState::premultiplied());

        let mut builder = graphics.pipeline_builder();
        builder.blend_state(Some(Arc::clone(&premultiplied)), 0).unwrap();
        assert!(Arc::ptr_eq(builder.working().blend_state(0).unwrap(), &premultiplied));
    }
}
