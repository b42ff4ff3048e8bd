// src/fanout/mod.rs

//! Fan-out helpers for running several closures as one unit.
//!
//! - [`sequence`] runs closures one after another, lazily, as their results
//!   are pulled ([`TaskSequence`]).
//! - [`group`] runs closures concurrently and collects their outcomes in
//!   completion or submission order ([`TaskGroup`]).
//!
//! Both produce exactly one [`TaskOutcome`](crate::task::TaskOutcome) per
//! closure that is consumed, and neither lets a failing closure cancel its
//! siblings.

pub mod group;
pub mod sequence;

pub use group::TaskGroup;
pub use sequence::{SequenceHandle, TaskSequence};
