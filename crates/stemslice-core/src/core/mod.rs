//! # Core Module
//!
//! This module provides the stateless building blocks of the multislice
//! simulation: coordinate systems, electron optics, detector geometry and the
//! batched transforms the propagation engine is built on.
//!
//! ## Overview
//!
//! Everything in `core` is computed once per launch (or once per sample
//! configuration for the transmission stack) and is read-only afterwards, so
//! it can be shared across worker threads without synchronization.
//!
//! ## Architecture
//!
//! - **Coordinates** ([`grid`], [`toroidal`]) - Fourier grids, the anti-aliasing
//!   band limit and the quarter-shift window used to crop non-aliased fields
//! - **Scanning** ([`scan`]) - Raster and arbitrary probe positions
//! - **Optics** ([`optics`]) - Wavelength, aberrations, probe, propagator and
//!   transmission function
//! - **Detection** ([`detector`]) - Angular binning of diffraction intensity
//! - **Transforms** ([`fft`]) - Probe-major batched 2D FFTs
//! - **Sinks** ([`io`]) - Interfaces to external persistence

pub mod detector;
pub mod fft;
pub mod grid;
pub mod io;
pub mod optics;
pub mod scan;
pub mod toroidal;
