// src/gpu/mod.rs
//! Allocation machinery for transient per-frame objects.

pub mod ring_pool;

pub use ring_pool::{PoolLease, RingPool, DEFAULT_POOL_CAPACITY};
