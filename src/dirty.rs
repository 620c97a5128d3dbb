// src/dirty.rs
//! Fixed-size slot array that remembers which contiguous span was written.
//!
//! Materializing a native description only needs the slots touched since the
//! last [`DirtyArray::mark_clean`], so consumers read [`DirtyArray::dirty_items`]
//! instead of walking the whole array.

use std::ops::Range;

use crate::error::{check_slot, check_span, Result};

#[derive(Debug, Clone)]
pub struct DirtyArray<T, const N: usize> {
    items: [T; N],
    /// Half-open `[start, end)` span written since the last clean.
    dirty: Option<(usize, usize)>,
}

impl<T: Default, const N: usize> DirtyArray<T, N> {
    pub fn new() -> Self {
        Self {
            items: std::array::from_fn(|_| T::default()),
            dirty: None,
        }
    }

    /// Puts every slot back to its default and forgets the dirty span.
    pub fn reset(&mut self) {
        self.items.iter_mut().for_each(|item| *item = T::default());
        self.dirty = None;
    }
}

impl<T: Default, const N: usize> Default for DirtyArray<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> DirtyArray<T, N> {
    pub const CAPACITY: usize = N;

    /// Writes one slot. Fails without any change when `index >= N`.
    pub fn set(&mut self, index: usize, value: T) -> Result<()> {
        check_slot("slot", index, N)?;
        self.items[index] = value;
        self.touch(index, index + 1);
        Ok(())
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.is_some()
    }

    /// The written span, empty when clean.
    pub fn dirty_range(&self) -> Range<usize> {
        match self.dirty {
            Some((start, end)) => start..end,
            None => 0..0,
        }
    }

    pub fn dirty_items(&self) -> &[T] {
        &self.items[self.dirty_range()]
    }

    pub fn mark_clean(&mut self) {
        self.dirty = None;
    }

    fn touch(&mut self, start: usize, end: usize) {
        self.dirty = Some(match self.dirty {
            Some((s, e)) => (s.min(start), e.max(end)),
            None => (start, end),
        });
    }
}

impl<T: Clone, const N: usize> DirtyArray<T, N> {
    /// Writes `values` into consecutive slots from `start`. The whole span is
    /// validated before anything is written.
    pub fn set_range(&mut self, start: usize, values: &[T]) -> Result<()> {
        check_slot("start slot", start, N)?;
        check_span("slots", start, values.len(), N)?;
        if values.is_empty() {
            return Ok(());
        }
        let end = start + values.len();
        self.items[start..end].clone_from_slice(values);
        self.touch(start, end);
        Ok(())
    }

    /// Copies items and dirty span from `other` without reallocating.
    pub fn assign(&mut self, other: &Self) {
        self.items.clone_from_slice(&other.items);
        self.dirty = other.dirty;
    }
}
