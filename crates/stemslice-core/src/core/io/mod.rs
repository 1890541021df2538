//! Interfaces to the external collaborators that persist simulation products.
//!
//! The engine never writes files itself. Diffraction datasets and the initial
//! probe are handed to implementations of [`sink::DatacubeSink`] and
//! [`sink::ProbeSink`] supplied by the caller.

pub mod sink;
