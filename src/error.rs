// src/error.rs
//! Error handling for the whole crate.
//!
//! - **Performance**: enum discriminant (cheap match), allocations *only* on the
//!   device error path.
//! - Every failure is local and synchronous: the library detects and reports,
//!   recovery is up to the application.

use thiserror::Error;

use crate::pipeline::ShaderStage;
use crate::states::{StateId, StateKind};

/// Main error type. Send + Sync + 'static, cheap to clone and compare in tests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StateError {
    /// A setter was called on a locked (shared or published) state object.
    #[error("{kind} state #{id} is immutable")]
    Immutable { kind: StateKind, id: StateId },

    /// A slot or range argument fell outside `[min, max)`.
    #[error("{name} out of range: {value} not in [{min}, {max})")]
    OutOfRange {
        name: &'static str,
        value: usize,
        min: usize,
        max: usize,
    },

    /// A required collaborator was never supplied.
    #[error("missing required dependency: {0}")]
    MissingDependency(&'static str),

    /// A pooled object was used after the ring pool recycled its slot.
    #[error("pool slot {index} was recycled (lease generation {leased}, slot generation {current})")]
    StaleSlot {
        index: usize,
        leased: u64,
        current: u64,
    },

    /// A shader was bound to a pipeline stage it was not compiled for.
    #[error("shader for the {actual:?} stage cannot be bound to the {expected:?} stage")]
    ShaderStageMismatch {
        expected: ShaderStage,
        actual: ShaderStage,
    },

    /// The native device refused to create a state object.
    #[error("device error: {0}")]
    Device(String),
}

impl StateError {
    #[inline]
    pub fn device<S: Into<String>>(msg: S) -> Self {
        Self::Device(msg.into())
    }

    /// Builds an `OutOfRange` error for a value that must lie in `[min, max)`.
    #[inline]
    pub fn out_of_range(name: &'static str, value: usize, min: usize, max: usize) -> Self {
        Self::OutOfRange {
            name,
            value,
            min,
            max,
        }
    }

    #[inline]
    pub fn is_immutable(&self) -> bool {
        matches!(self, StateError::Immutable { .. })
    }

    #[inline]
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, StateError::OutOfRange { .. })
    }

    #[inline]
    pub fn is_missing_dependency(&self) -> bool {
        matches!(self, StateError::MissingDependency(_))
    }

    #[inline]
    pub fn is_stale_slot(&self) -> bool {
        matches!(self, StateError::StaleSlot { .. })
    }
}

/// Convenient `Result` alias: use `crate::Result<T>` everywhere.
pub type Result<T> = std::result::Result<T, StateError>;

/// Fails with `OutOfRange` unless `value < max`.
#[inline]
pub(crate) fn check_slot(name: &'static str, value: usize, max: usize) -> Result<()> {
    if value >= max {
        return Err(StateError::out_of_range(name, value, 0, max));
    }
    Ok(())
}

/// Fails with `OutOfRange` unless `start..start + count` fits inside `[0, max)`.
#[inline]
pub(crate) fn check_span(name: &'static str, start: usize, count: usize, max: usize) -> Result<()> {
    match start.checked_add(count) {
        Some(end) if end <= max => Ok(()),
        _ => Err(StateError::out_of_range(name, start.saturating_add(count), 0, max + 1)),
    }
}
