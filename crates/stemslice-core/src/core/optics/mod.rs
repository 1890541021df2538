//! Electron-optical building blocks: relativistic constants, the aberration
//! function, the initial probe, the free-space propagator and the per-slice
//! transmission function.

pub mod aberration;
pub mod constants;
pub mod probe;
pub mod propagator;
pub mod transmission;
