//! # Engine Module
//!
//! This module implements the run machinery of the multislice simulation:
//! configuration, shared output state, work distribution across worker threads
//! and the per-batch propagation tasks.
//!
//! ## Overview
//!
//! A run starts from a validated [`config::SimulationConfig`]. The workflow
//! layer builds the read-only inputs once, then hands every worker a
//! [`context::SimulationContext`]. Workers pull disjoint probe ranges from the
//! [`dispatcher::WorkDispatcher`], propagate them in batches and accumulate the
//! results into [`output::OutputVolume`]s without locking, since each probe
//! owns its output cells.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Simulation parameters, output options and the builder
//! - **Error Handling** ([`error`]) - Engine-level error type wrapping every layer below it
//! - **Progress Monitoring** ([`progress`]) - Observational progress callbacks
//! - **Work Distribution** ([`dispatcher`]) - Thread-safe issuer of probe ranges
//! - **Shared Output** ([`output`]) - Accumulate-only 4D volumes
//! - **Plan Serialization** ([`planner`]) - The lock guarding transform plan creation
//! - **Depth Bookkeeping** ([`layers`]) - Which slices are recorded and at what depth
//! - **Tasks** ([`tasks`]) - Batched propagation, output accumulation and single-probe runs

pub mod config;
pub(crate) mod context;
pub mod dispatcher;
pub mod error;
pub mod layers;
pub mod output;
pub mod planner;
pub mod progress;
pub(crate) mod tasks;
