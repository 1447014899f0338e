//! # Core Module
//!
//! Stateless mathematical building blocks for the PME engine.
//!
//! ## Overview
//!
//! Everything in this module is a pure function of its inputs: no scratch
//! buffers, no caches, no thread pools. The [`engine`](crate::engine) layer
//! composes these pieces into the stateful reciprocal-space pipeline.
//!
//! ## Architecture
//!
//! - **Scalar abstraction** ([`scalar`]) - the [`scalar::Real`] trait that
//!   monomorphizes the engine over f32/f64
//! - **Dense linear algebra** ([`matrix`]) - row-major matrices, borrowed
//!   views, strided slices, inversion and symmetric diagonalization
//! - **Lattice geometry** ([`lattice`]) - unit-cell construction, reciprocal
//!   vectors, fractional coordinate transforms
//! - **Interpolation** ([`splines`]) - cardinal B-spline values and
//!   derivatives at arbitrary fractional offsets
//! - **Multipole algebra** ([`multipole`]) - canonical Cartesian component
//!   enumeration and Cartesian→fractional coefficient transforms
//! - **Special functions** ([`gamma`]) - the upper incomplete gamma function
//!   for general r⁻ⁿ influence kernels

pub mod gamma;
pub mod lattice;
pub mod matrix;
pub mod multipole;
pub mod scalar;
pub mod splines;
