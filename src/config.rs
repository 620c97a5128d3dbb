// src/config.rs
//! Settings for a [`GraphicsStates`](crate::graphics::GraphicsStates) context.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StateError};
use crate::gpu::DEFAULT_POOL_CAPACITY;

// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Draw call slots recycled per lap of the ring pool.
    pub draw_call_pool_capacity: usize,
    /// Fail fast with `StaleSlot` when a recycled draw call is touched.
    pub detect_stale_slots: bool,
    /// Pre-populate every cache with the well-known presets.
    pub seed_presets: bool,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            draw_call_pool_capacity: DEFAULT_POOL_CAPACITY,
            detect_stale_slots: cfg!(debug_assertions),
            seed_presets: true,
        }
    }
}

impl StateConfig {
    /// Small pool with stale-slot checks, for tools and tests.
    pub fn debug() -> Self {
        Self {
            draw_call_pool_capacity: 256,
            detect_stale_slots: true,
            ..Default::default()
        }
    }

    /// No safety net: recycled slots are overwritten silently.
    pub fn release() -> Self {
        Self {
            detect_stale_slots: false,
            ..Default::default()
        }
    }

    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.draw_call_pool_capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.draw_call_pool_capacity == 0 {
            return Err(StateError::out_of_range("draw call pool capacity", 0, 1, usize::MAX));
        }
        Ok(())
    }
}
