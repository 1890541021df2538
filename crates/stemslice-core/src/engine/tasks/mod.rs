//! Per-worker computational units of a multislice run.
//!
//! [`multislice`] holds the batched propagation loop and the worker that
//! drains the dispatcher, [`accumulate`] reduces exit waves into detector
//! bins, centre-of-mass vectors and exported diffraction patterns, and
//! [`single_probe`] propagates one probe without binning.

pub mod accumulate;
pub mod multislice;
pub mod single_probe;
