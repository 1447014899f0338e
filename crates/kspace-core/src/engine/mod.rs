//! # Engine Module
//!
//! The stateful reciprocal-space pipeline: a configured PME instance owning
//! scratch grids, FFT plans, cached influence tables and a thread pool.
//!
//! ## Overview
//!
//! A [`pme::Pme`] instance is created from validated [`config::PmeOptions`],
//! given a lattice, and then driven through the `compute_*_rec` operations.
//! Each compute call runs the same staged pipeline — spread, forward FFT,
//! convolution, inverse FFT, probe — with every stage completing before the
//! next begins and each stage parallelized over the instance's pool.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - validated setup parameters
//! - **Error Handling** ([`error`]) - the engine error taxonomy
//! - **Scratch Grids** ([`grid`]) - real and half-complex 3-D work arrays
//! - **FFT Plans** ([`fft`]) - per-setup real↔half-complex 3-D transforms
//! - **Influence Function** ([`influence`]) - per-k convolution weights and
//!   virial factors, cached per lattice
//! - **Spreading** ([`spread`]) - charge/multipole deposition onto the grid
//! - **Probing** ([`probe`]) - back-interpolation of potentials and forces
//! - **Orchestration** ([`pme`]) - the public instance and its state machine

pub mod config;
pub mod error;
pub(crate) mod fft;
pub mod grid;
pub(crate) mod influence;
pub mod pme;
pub(crate) mod probe;
pub(crate) mod spread;
