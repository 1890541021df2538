//! # stemslice Core Library
//!
//! A multislice engine for scanning transmission electron microscopy: it
//! propagates a focused electron probe through a sliced sample potential at
//! every scan position and bins the exit waves into a depth-resolved virtual
//! detector.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture.
//!
//! - **[`core`]: The Foundation.** Stateless models and math: Fourier grids and the
//!   toroidal quarter-shift, scan positions, electron optics, detector binning,
//!   batched FFTs and the sink interfaces used for persistence.
//!
//! - **[`engine`]: The Logic Core.** The stateful run machinery: configuration,
//!   work dispatch, lock-free output volumes, the transform-plan lock and the
//!   per-batch propagation tasks.
//!
//! - **[`workflows`]: The Public API.** Prepares a launch, runs configurations
//!   across a worker pool and returns the accumulated volumes.

pub mod core;
pub mod engine;
pub mod workflows;
