//! # Workflows Module
//!
//! High-level entry points that tie the `core` and `engine` layers together
//! into complete multislice simulations.
//!
//! ## Overview
//!
//! A caller either runs a single configuration with [`multislice::run`], or
//! calls [`multislice::prepare`] once and feeds several frozen-phonon
//! configurations through [`multislice::MultisliceSetup::run_configuration`]
//! before collecting the summed volumes with
//! [`multislice::MultisliceSetup::finish`]. Averaging over configurations is
//! left to the caller.
//!
//! ## Architecture
//!
//! - **Multislice Workflow** ([`multislice`]) - Launch preparation, the worker
//!   pool, per-configuration propagation and single-probe propagation.

pub mod multislice;
