use crate::core::scalar::Real;
use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};

/// Real-space grid dimensions (A, B, C). The half-complex counterpart keeps
/// the full A and B extents and C/2 + 1 bins along the fastest axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridDims {
    pub a: usize,
    pub b: usize,
    pub c: usize,
}

impl GridDims {
    pub fn new(a: usize, b: usize, c: usize) -> Self {
        Self { a, b, c }
    }

    pub fn half_c(&self) -> usize {
        self.c / 2 + 1
    }

    pub fn real_len(&self) -> usize {
        self.a * self.b * self.c
    }

    pub fn complex_len(&self) -> usize {
        self.a * self.b * self.half_c()
    }

    /// Elements per a-plane of the real grid.
    pub fn real_plane_len(&self) -> usize {
        self.b * self.c
    }

    /// Elements per a-plane of the half-complex grid.
    pub fn complex_plane_len(&self) -> usize {
        self.b * self.half_c()
    }

    /// Linearized index into the real grid (C fastest).
    pub fn flat_index(&self, a: usize, b: usize, c: usize) -> usize {
        (a * self.b + b) * self.c + c
    }

    /// Signed frequency of a bin index on a full (non-halved) axis.
    pub(crate) fn signed_frequency(bin: usize, extent: usize) -> isize {
        if bin <= extent / 2 {
            bin as isize
        } else {
            bin as isize - extent as isize
        }
    }

    /// Number of spectrum elements a half-complex z-bin stands for: the DC
    /// plane and (for even C) the Nyquist plane are their own conjugates.
    pub(crate) fn hermitian_multiplicity(&self, z_bin: usize) -> usize {
        if z_bin == 0 || (self.c % 2 == 0 && z_bin == self.c / 2) {
            1
        } else {
            2
        }
    }
}

/// Owned real scratch grid of shape (A, B, C), row-major with C fastest.
#[derive(Debug, Clone)]
pub(crate) struct RealGrid<R: Real> {
    pub dims: GridDims,
    pub data: Vec<R>,
}

impl<R: Real> RealGrid<R> {
    pub fn new(dims: GridDims) -> Self {
        Self {
            dims,
            data: vec![R::zero(); dims.real_len()],
        }
    }

    pub fn fill_zero(&mut self) {
        self.data.fill(R::zero());
    }
}

/// Owned half-complex scratch grid of shape (A, B, C/2 + 1).
#[derive(Debug, Clone)]
pub(crate) struct ComplexGrid<R: Real> {
    pub dims: GridDims,
    pub data: Vec<Complex<R>>,
}

impl<R: Real> ComplexGrid<R> {
    pub fn new(dims: GridDims) -> Self {
        Self {
            dims,
            data: vec![Complex::new(R::zero(), R::zero()); dims.complex_len()],
        }
    }
}
