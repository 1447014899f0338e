//! # kspace Core Library
//!
//! A reciprocal-space Particle Mesh Ewald (PME) engine for evaluating
//! long-range pairwise interactions of the form U = Σᵢⱼ qᵢqⱼ/rᵢⱼⁿ under
//! periodic boundary conditions. The short-range half of the Ewald split is
//! a direct pairwise sum handled by the caller; this library owns the hard
//! part: the reciprocal-space pipeline of B-spline charge spreading, FFT,
//! convolution with an Ewald influence function, and back-interpolation of
//! potentials, fields, forces and virials.
//!
//! ## Architectural Philosophy
//!
//! The library is split into two layers with a strict dependency direction:
//!
//! - **[`core`]: The Foundation.** Stateless mathematics — the dense
//!   [`core::matrix::Matrix`] container and its borrowed views, lattice
//!   geometry, cardinal B-splines, Cartesian multipole algebra, and the
//!   incomplete gamma function backing general r⁻ⁿ kernels.
//!
//! - **[`engine`]: The Logic Core.** The stateful orchestration layer — a
//!   configured [`engine::pme::Pme`] instance owning its scratch grids, FFT
//!   plans, influence-function tables and thread pool, and exposing the
//!   `compute_*_rec` operations.
//!
//! A third, deliberately thin layer lives in the sibling `kspace-ffi` crate:
//! flat C-callable entry points that marshal plain arrays into matrix views.

pub mod core;
pub mod engine;
