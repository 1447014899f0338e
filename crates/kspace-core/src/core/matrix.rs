use super::scalar::Real;
use nalgebra::DMatrix;
use num_traits::{Float, One, Zero};
use rustfft::num_complex::Complex;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Index, IndexMut, Mul, MulAssign, Neg, Sub, SubAssign};
use thiserror::Error;

/// Absolute tolerance used when checking that a matrix is symmetric.
const SYMMETRY_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Error, PartialEq)]
pub enum MatrixError {
    #[error("dimensions {left:?} and {right:?} are incompatible for {op}")]
    DimensionMismatch {
        op: &'static str,
        left: (usize, usize),
        right: (usize, usize),
    },

    #[error("{op} requires a square matrix, got {rows}x{cols}")]
    NotSquare {
        op: &'static str,
        rows: usize,
        cols: usize,
    },

    #[error("{op} requires a symmetric matrix")]
    NotSymmetric { op: &'static str },

    #[error("matrix is numerically singular (eigenvalue {eigenvalue:e})")]
    Singular { eigenvalue: f64 },

    #[error("eigensolver failed to converge")]
    EigensolverFailure,

    #[error("inconsistent row length: expected {expected}, found {found}")]
    InconsistentRows { expected: usize, found: usize },

    #[error("buffer of length {len} cannot back a {rows}x{cols} matrix")]
    BufferSize {
        rows: usize,
        cols: usize,
        len: usize,
    },

    #[error("slice operation on slices of different lengths ({left} vs {right})")]
    SliceSizeMismatch { left: usize, right: usize },

    #[error("slice operation requires contiguous (stride 1) data")]
    NonContiguousSlice,
}

/// Ordering of eigenpairs returned by [`Matrix::diagonalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Element type stored in a [`Matrix`]: a real scalar or a complex pair.
pub trait Element:
    Copy
    + PartialEq
    + fmt::Debug
    + Send
    + Sync
    + Zero
    + One
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + Sum<Self>
    + 'static
{
    /// Component-wise comparison within an absolute tolerance.
    fn within(self, other: Self, tolerance: f64) -> bool;

    /// Fixed-point rendering used by the `Display` implementation.
    fn write_fixed(self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl Element for f64 {
    fn within(self, other: Self, tolerance: f64) -> bool {
        (self - other).abs() <= tolerance
    }

    fn write_fixed(self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:18.10}")
    }
}

impl Element for f32 {
    fn within(self, other: Self, tolerance: f64) -> bool {
        (f64::from(self) - f64::from(other)).abs() <= tolerance
    }

    fn write_fixed(self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:18.10}")
    }
}

impl<R: Real> Element for Complex<R> {
    fn within(self, other: Self, tolerance: f64) -> bool {
        (self.re.as_f64() - other.re.as_f64()).abs() <= tolerance
            && (self.im.as_f64() - other.im.as_f64()).abs() <= tolerance
    }

    fn write_fixed(self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:18.10}, {:18.10})", self.re.as_f64(), self.im.as_f64())
    }
}

/// Dense row-major matrix owning its storage.
///
/// The non-owning counterparts are [`MatrixView`] and [`MatrixViewMut`],
/// which the compute kernels operate on so that caller-provided buffers are
/// borrowed rather than copied at the flat boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix<T: Element> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

/// Read-only borrowed view over row-major storage.
#[derive(Debug, Clone, Copy)]
pub struct MatrixView<'a, T: Element> {
    rows: usize,
    cols: usize,
    data: &'a [T],
}

/// Mutable borrowed view over row-major storage.
#[derive(Debug)]
pub struct MatrixViewMut<'a, T: Element> {
    rows: usize,
    cols: usize,
    data: &'a mut [T],
}

/// Read-only strided window into a matrix (a row, a column, or any regular
/// sub-sampling of the linearized storage).
#[derive(Debug, Clone, Copy)]
pub struct Slice<'a, T: Element> {
    data: &'a [T],
    stride: usize,
    len: usize,
}

/// Mutable strided window into a matrix.
#[derive(Debug)]
pub struct SliceMut<'a, T: Element> {
    data: &'a mut [T],
    stride: usize,
    len: usize,
}

impl<T: Element> Matrix<T> {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![T::zero(); rows * cols],
        }
    }

    /// Identity matrix of the given dimension.
    pub fn identity(n: usize) -> Self {
        let mut out = Self::zeros(n, n);
        for i in 0..n {
            out[(i, i)] = T::one();
        }
        out
    }

    /// Builds a matrix from an explicit row-major buffer.
    pub fn from_row_major(rows: usize, cols: usize, data: Vec<T>) -> Result<Self, MatrixError> {
        if data.len() != rows * cols {
            return Err(MatrixError::BufferSize {
                rows,
                cols,
                len: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Builds a matrix from nested rows, checking that they are rectangular.
    pub fn from_rows(rows: &[Vec<T>]) -> Result<Self, MatrixError> {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(n_rows * n_cols);
        for row in rows {
            if row.len() != n_cols {
                return Err(MatrixError::InconsistentRows {
                    expected: n_cols,
                    found: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: n_rows,
            cols: n_cols,
            data,
        })
    }

    /// Builds a matrix from a fixed-size nested array.
    pub fn from_array<const M: usize, const N: usize>(array: [[T; N]; M]) -> Self {
        let mut data = Vec::with_capacity(M * N);
        for row in &array {
            data.extend_from_slice(row);
        }
        Self {
            rows: M,
            cols: N,
            data,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn as_view(&self) -> MatrixView<'_, T> {
        MatrixView {
            rows: self.rows,
            cols: self.cols,
            data: &self.data,
        }
    }

    pub fn as_view_mut(&mut self) -> MatrixViewMut<'_, T> {
        MatrixViewMut {
            rows: self.rows,
            cols: self.cols,
            data: &mut self.data,
        }
    }

    pub fn row(&self, r: usize) -> &[T] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub fn row_mut(&mut self, r: usize) -> &mut [T] {
        &mut self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub fn row_slice(&self, r: usize) -> Slice<'_, T> {
        self.as_view().row_slice(r)
    }

    pub fn col(&self, c: usize) -> Slice<'_, T> {
        self.as_view().col(c)
    }

    pub fn col_mut(&mut self, c: usize) -> SliceMut<'_, T> {
        let (rows, cols) = (self.rows, self.cols);
        SliceMut {
            data: &mut self.data[c..],
            stride: cols,
            len: rows,
        }
    }

    pub fn set_constant(&mut self, value: T) {
        self.data.fill(value);
    }

    pub fn set_zero(&mut self) {
        self.set_constant(T::zero());
    }

    /// True when every element has magnitude at most `threshold`.
    pub fn is_near_zero(&self, threshold: f64) -> bool {
        self.data.iter().all(|v| v.within(T::zero(), threshold))
    }

    pub fn multiply(&self, other: MatrixView<'_, T>) -> Result<Matrix<T>, MatrixError> {
        self.as_view().multiply(other)
    }

    pub fn dot(&self, other: MatrixView<'_, T>) -> Result<T, MatrixError> {
        self.as_view().dot(other)
    }

    pub fn almost_equals(&self, other: MatrixView<'_, T>, tolerance: f64) -> Result<bool, MatrixError> {
        self.as_view().almost_equals(other, tolerance)
    }

    /// Transposes the matrix in place by following the permutation cycles of
    /// the linearized buffer, then swaps the dimensions.
    pub fn transpose_in_place(&mut self) {
        let len = self.data.len();
        if len > 1 {
            let last = len - 1;
            let rows = self.rows;
            let mut visited = vec![false; len];
            for cycle in 1..last {
                if visited[cycle] {
                    continue;
                }
                let mut a = cycle;
                loop {
                    a = if a == last { last } else { (rows * a) % last };
                    self.data.swap(a, cycle);
                    visited[a] = true;
                    if a == cycle {
                        break;
                    }
                }
            }
        }
        std::mem::swap(&mut self.rows, &mut self.cols);
    }

    /// Transposed deep copy, leaving `self` untouched.
    pub fn transposed(&self) -> Matrix<T> {
        let mut copy = self.clone();
        copy.transpose_in_place();
        copy
    }
}

impl<T: Element> Index<(usize, usize)> for Matrix<T> {
    type Output = T;

    fn index(&self, (r, c): (usize, usize)) -> &T {
        &self.data[r * self.cols + c]
    }
}

impl<T: Element> IndexMut<(usize, usize)> for Matrix<T> {
    fn index_mut(&mut self, (r, c): (usize, usize)) -> &mut T {
        &mut self.data[r * self.cols + c]
    }
}

impl<T: Element> fmt::Display for Matrix<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..self.rows {
            for v in self.row(r) {
                v.write_fixed(f)?;
                write!(f, " ")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl<'a, T: Element> MatrixView<'a, T> {
    /// Wraps an existing row-major buffer without copying it.
    pub fn new(rows: usize, cols: usize, data: &'a [T]) -> Result<Self, MatrixError> {
        if data.len() < rows * cols {
            return Err(MatrixError::BufferSize {
                rows,
                cols,
                len: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// The row-major backing storage, exactly `rows * cols` long.
    pub fn data(&self) -> &'a [T] {
        &self.data[..self.rows * self.cols]
    }

    pub fn row(&self, r: usize) -> &'a [T] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub fn row_slice(&self, r: usize) -> Slice<'a, T> {
        Slice {
            data: self.row(r),
            stride: 1,
            len: self.cols,
        }
    }

    pub fn col(&self, c: usize) -> Slice<'a, T> {
        Slice {
            data: &self.data[c..],
            stride: self.cols,
            len: self.rows,
        }
    }

    pub fn to_owned(&self) -> Matrix<T> {
        let mut data = Vec::with_capacity(self.rows * self.cols);
        data.extend_from_slice(&self.data[..self.rows * self.cols]);
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data,
        }
    }

    /// Naive triple-loop product. Linear-algebra throughput does not
    /// dominate the PME pipeline, so no attempt is made to block or tile.
    pub fn multiply(&self, other: MatrixView<'_, T>) -> Result<Matrix<T>, MatrixError> {
        if self.cols != other.rows {
            return Err(MatrixError::DimensionMismatch {
                op: "multiply",
                left: (self.rows, self.cols),
                right: (other.rows, other.cols),
            });
        }
        let mut product = Matrix::zeros(self.rows, other.cols);
        for r in 0..self.rows {
            let lhs_row = self.row(r);
            let out_row = product.row_mut(r);
            for (link, &lhs) in lhs_row.iter().enumerate() {
                let rhs_row = other.row(link);
                for (out, &rhs) in out_row.iter_mut().zip(rhs_row) {
                    *out += lhs * rhs;
                }
            }
        }
        Ok(product)
    }

    /// Inner product of the linearized buffers.
    pub fn dot(&self, other: MatrixView<'_, T>) -> Result<T, MatrixError> {
        self.check_same_size(other, "dot")?;
        Ok(self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(&a, &b)| a * b)
            .sum())
    }

    /// Element-wise comparison within an absolute tolerance, for both real
    /// and complex element types.
    pub fn almost_equals(
        &self,
        other: MatrixView<'_, T>,
        tolerance: f64,
    ) -> Result<bool, MatrixError> {
        self.check_same_size(other, "almost_equals")?;
        Ok(self
            .data
            .iter()
            .zip(other.data.iter())
            .all(|(&a, &b)| a.within(b, tolerance)))
    }

    fn check_same_size(&self, other: MatrixView<'_, T>, op: &'static str) -> Result<(), MatrixError> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(MatrixError::DimensionMismatch {
                op,
                left: (self.rows, self.cols),
                right: (other.rows, other.cols),
            });
        }
        Ok(())
    }
}

impl<T: Element> Index<(usize, usize)> for MatrixView<'_, T> {
    type Output = T;

    fn index(&self, (r, c): (usize, usize)) -> &T {
        &self.data[r * self.cols + c]
    }
}

impl<'a, T: Element> MatrixViewMut<'a, T> {
    /// Wraps an existing row-major buffer for in-place mutation.
    pub fn new(rows: usize, cols: usize, data: &'a mut [T]) -> Result<Self, MatrixError> {
        if data.len() < rows * cols {
            return Err(MatrixError::BufferSize {
                rows,
                cols,
                len: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn as_view(&self) -> MatrixView<'_, T> {
        MatrixView {
            rows: self.rows,
            cols: self.cols,
            data: self.data,
        }
    }

    pub fn row(&self, r: usize) -> &[T] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub fn row_mut(&mut self, r: usize) -> &mut [T] {
        &mut self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// The row-major backing storage, exactly `rows * cols` long; used to
    /// hand disjoint row chunks to parallel writers.
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data[..self.rows * self.cols]
    }
}

impl<T: Element> Index<(usize, usize)> for MatrixViewMut<'_, T> {
    type Output = T;

    fn index(&self, (r, c): (usize, usize)) -> &T {
        &self.data[r * self.cols + c]
    }
}

impl<T: Element> IndexMut<(usize, usize)> for MatrixViewMut<'_, T> {
    fn index_mut(&mut self, (r, c): (usize, usize)) -> &mut T {
        &mut self.data[r * self.cols + c]
    }
}

impl<'a, T: Element> Slice<'a, T> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn is_contiguous(&self) -> bool {
        self.stride == 1
    }

    pub fn get(&self, i: usize) -> T {
        self.data[i * self.stride]
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + 'a {
        let data = self.data;
        let stride = self.stride;
        (0..self.len).map(move |i| data[i * stride])
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }

    /// Element-wise difference of two contiguous slices, returned as a new
    /// one-row matrix.
    pub fn sub(&self, other: Slice<'_, T>) -> Result<Matrix<T>, MatrixError> {
        check_slice_pair(self.len, self.stride, other.len, other.stride)?;
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .take(self.len)
            .map(|(&a, &b)| a - b)
            .collect();
        Matrix::from_row_major(1, self.len, data)
    }
}

impl<'a, T: Element> SliceMut<'a, T> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, i: usize) -> T {
        self.data[i * self.stride]
    }

    pub fn set(&mut self, i: usize, value: T) {
        self.data[i * self.stride] = value;
    }

    /// Multiplies every element by `factor`; valid for any stride.
    pub fn scale(&mut self, factor: T) {
        for i in 0..self.len {
            self.data[i * self.stride] *= factor;
        }
    }

    /// Adds `value` to every element; valid for any stride.
    pub fn add_scalar(&mut self, value: T) {
        for i in 0..self.len {
            self.data[i * self.stride] += value;
        }
    }

    /// In-place element-wise sum with another slice. Both slices must be
    /// contiguous and of equal length.
    pub fn add_assign(&mut self, other: Slice<'_, T>) -> Result<(), MatrixError> {
        check_slice_pair(self.len, self.stride, other.len, other.stride)?;
        for (dst, &src) in self.data[..self.len].iter_mut().zip(other.data) {
            *dst += src;
        }
        Ok(())
    }

    /// In-place element-wise difference with another slice. Both slices must
    /// be contiguous and of equal length.
    pub fn sub_assign(&mut self, other: Slice<'_, T>) -> Result<(), MatrixError> {
        check_slice_pair(self.len, self.stride, other.len, other.stride)?;
        for (dst, &src) in self.data[..self.len].iter_mut().zip(other.data) {
            *dst -= src;
        }
        Ok(())
    }
}

fn check_slice_pair(
    len_a: usize,
    stride_a: usize,
    len_b: usize,
    stride_b: usize,
) -> Result<(), MatrixError> {
    if len_a != len_b {
        return Err(MatrixError::SliceSizeMismatch {
            left: len_a,
            right: len_b,
        });
    }
    if stride_a != 1 || stride_b != 1 {
        return Err(MatrixError::NonContiguousSlice);
    }
    Ok(())
}

impl<R: Real> Matrix<R> {
    /// Copy of this matrix with every element cast to another precision.
    pub fn cast<U: Real>(&self) -> Matrix<U> {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|v| U::of(v.as_f64())).collect(),
        }
    }

    pub fn is_symmetric(&self, tolerance: f64) -> bool {
        if self.rows != self.cols {
            return false;
        }
        for r in 0..self.rows {
            for c in 0..r {
                if !self[(r, c)].within(self[(c, r)], tolerance) {
                    return false;
                }
            }
        }
        true
    }

    /// Determinant of a 3×3 matrix.
    pub fn determinant3(&self) -> Result<R, MatrixError> {
        if self.rows != 3 || self.cols != 3 {
            return Err(MatrixError::NotSquare {
                op: "determinant3",
                rows: self.rows,
                cols: self.cols,
            });
        }
        let d = &self.data;
        Ok(d[0] * (d[4] * d[8] - d[7] * d[5]) - d[1] * (d[3] * d[8] - d[5] * d[6])
            + d[2] * (d[3] * d[7] - d[4] * d[6]))
    }

    /// Inverts the matrix, leaving the original untouched.
    ///
    /// The 3×3 case is by far the most common one in lattice work and uses
    /// the closed-form cofactor expansion. Anything larger must be symmetric
    /// and goes through the spectral decomposition, failing when an
    /// eigenvalue sits below the singularity guard.
    pub fn inverse(&self) -> Result<Matrix<R>, MatrixError> {
        if self.rows != self.cols {
            return Err(MatrixError::NotSquare {
                op: "inverse",
                rows: self.rows,
                cols: self.cols,
            });
        }

        if self.rows == 3 {
            let d = &self.data;
            let det = self.determinant3()?;
            if det == R::zero() {
                return Err(MatrixError::Singular { eigenvalue: 0.0 });
            }
            let inv_det = R::one() / det;
            let mut out = Matrix::zeros(3, 3);
            out.data[0] = (d[4] * d[8] - d[7] * d[5]) * inv_det;
            out.data[1] = (d[2] * d[7] - d[1] * d[8]) * inv_det;
            out.data[2] = (d[1] * d[5] - d[2] * d[4]) * inv_det;
            out.data[3] = (d[5] * d[6] - d[3] * d[8]) * inv_det;
            out.data[4] = (d[0] * d[8] - d[2] * d[6]) * inv_det;
            out.data[5] = (d[3] * d[2] - d[0] * d[5]) * inv_det;
            out.data[6] = (d[3] * d[7] - d[6] * d[4]) * inv_det;
            out.data[7] = (d[6] * d[1] - d[0] * d[7]) * inv_det;
            out.data[8] = (d[0] * d[4] - d[3] * d[1]) * inv_det;
            return Ok(out);
        }

        let (values, vectors) = self.diagonalize(SortOrder::Ascending)?;
        let max_magnitude = values
            .iter()
            .map(|v| Float::abs(*v))
            .fold(R::zero(), Float::max);
        let guard = max_magnitude * R::epsilon() * R::of(16.0);
        let mut inverted = Vec::with_capacity(values.len());
        for v in &values {
            if Float::abs(*v) <= guard {
                return Err(MatrixError::Singular {
                    eigenvalue: v.as_f64(),
                });
            }
            inverted.push(R::one() / *v);
        }
        Ok(recompose(&inverted, &vectors))
    }

    /// Symmetric eigendecomposition, delegated to the external eigensolver.
    ///
    /// Returns the eigenvalues sorted per `order` and the eigenvectors as
    /// the correspondingly ordered columns of a square matrix. The solve
    /// runs in double precision for either scalar type.
    pub fn diagonalize(&self, order: SortOrder) -> Result<(Vec<R>, Matrix<R>), MatrixError> {
        if self.rows != self.cols {
            return Err(MatrixError::NotSquare {
                op: "diagonalize",
                rows: self.rows,
                cols: self.cols,
            });
        }
        if !self.is_symmetric(SYMMETRY_TOLERANCE) {
            return Err(MatrixError::NotSymmetric { op: "diagonalize" });
        }

        let n = self.rows;
        let general = DMatrix::from_fn(n, n, |r, c| self[(r, c)].as_f64());
        let eigen = general
            .try_symmetric_eigen(f64::EPSILON, 4096)
            .ok_or(MatrixError::EigensolverFailure)?;

        let mut permutation: Vec<usize> = (0..n).collect();
        permutation.sort_by(|&a, &b| {
            eigen.eigenvalues[a]
                .partial_cmp(&eigen.eigenvalues[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if order == SortOrder::Descending {
            permutation.reverse();
        }

        let values = permutation
            .iter()
            .map(|&i| R::of(eigen.eigenvalues[i]))
            .collect();
        let mut vectors = Matrix::zeros(n, n);
        for (c, &src) in permutation.iter().enumerate() {
            for r in 0..n {
                vectors[(r, c)] = R::of(eigen.eigenvectors[(r, src)]);
            }
        }
        Ok((values, vectors))
    }

    /// Applies a scalar function through the spectral decomposition:
    /// V·diag(f(λ))·Vᵀ. Symmetric matrices only.
    pub fn apply_symmetric(&self, f: impl Fn(R) -> R) -> Result<Matrix<R>, MatrixError> {
        let (values, vectors) = self.diagonalize(SortOrder::Ascending)?;
        let mapped: Vec<R> = values.into_iter().map(f).collect();
        Ok(recompose(&mapped, &vectors))
    }
}

/// Rebuilds V·diag(values)·Vᵀ from eigenvalues and column eigenvectors.
fn recompose<R: Real>(values: &[R], vectors: &Matrix<R>) -> Matrix<R> {
    let n = values.len();
    let mut out = Matrix::zeros(n, n);
    for (k, &value) in values.iter().enumerate() {
        for r in 0..n {
            let vr = vectors[(r, k)] * value;
            for c in 0..n {
                out[(r, c)] += vr * vectors[(c, k)];
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    fn matrix_3x3() -> Matrix<f64> {
        Matrix::from_array([[2.0, 0.0, 1.0], [3.0, 1.0, 0.0], [0.0, 4.0, 1.0]])
    }

    #[test]
    fn transpose_of_transpose_is_identity() {
        let m = Matrix::from_array([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let round_trip = m.transposed().transposed();
        assert_eq!(m, round_trip);
    }

    #[test]
    fn transpose_in_place_handles_non_square_shapes() {
        let mut m = Matrix::from_array([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        m.transpose_in_place();
        assert_eq!(m.rows(), 3);
        assert_eq!(m.cols(), 2);
        assert_eq!(m[(0, 1)], 4.0);
        assert_eq!(m[(2, 0)], 3.0);
        assert_eq!(m[(2, 1)], 6.0);
    }

    #[test]
    fn multiply_matches_hand_computed_product() {
        let a = Matrix::from_array([[1.0, 2.0], [3.0, 4.0]]);
        let b = Matrix::from_array([[5.0, 6.0], [7.0, 8.0]]);
        let p = a.multiply(b.as_view()).unwrap();
        let expected = Matrix::from_array([[19.0, 22.0], [43.0, 50.0]]);
        assert!(p.almost_equals(expected.as_view(), TOLERANCE).unwrap());
    }

    #[test]
    fn multiply_rejects_incompatible_dimensions() {
        let a = Matrix::<f64>::zeros(2, 3);
        let b = Matrix::<f64>::zeros(2, 3);
        assert!(matches!(
            a.multiply(b.as_view()),
            Err(MatrixError::DimensionMismatch { op: "multiply", .. })
        ));
    }

    #[test]
    fn closed_form_3x3_inverse_reproduces_identity() {
        let m = matrix_3x3();
        let product = m.inverse().unwrap().multiply(m.as_view()).unwrap();
        assert!(product
            .almost_equals(Matrix::identity(3).as_view(), 1e-14)
            .unwrap());
    }

    #[test]
    fn spectral_inverse_reproduces_identity_for_symmetric_matrix() {
        let m = Matrix::from_array([
            [4.0, 1.0, 0.0, 0.0],
            [1.0, 3.0, 1.0, 0.0],
            [0.0, 1.0, 2.0, 1.0],
            [0.0, 0.0, 1.0, 5.0],
        ]);
        let product = m.inverse().unwrap().multiply(m.as_view()).unwrap();
        assert!(product
            .almost_equals(Matrix::identity(4).as_view(), 1e-10)
            .unwrap());
    }

    #[test]
    fn inverse_fails_for_singular_symmetric_matrix() {
        let m = Matrix::from_array([
            [1.0, 1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        assert!(matches!(m.inverse(), Err(MatrixError::Singular { .. })));
    }

    #[test]
    fn inverse_of_larger_non_symmetric_matrix_is_rejected() {
        let mut m = Matrix::<f64>::identity(4);
        m[(0, 3)] = 2.0;
        assert!(matches!(
            m.inverse(),
            Err(MatrixError::NotSymmetric { op: "diagonalize" })
        ));
    }

    #[test]
    fn diagonalize_recomposes_symmetric_matrix() {
        let m = Matrix::from_array([[2.0, 1.0, 0.0], [1.0, 3.0, 1.0], [0.0, 1.0, 4.0]]);
        let (values, vectors) = m.diagonalize(SortOrder::Ascending).unwrap();
        let recomposed = super::recompose(&values, &vectors);
        assert!(recomposed.almost_equals(m.as_view(), 1e-10).unwrap());
    }

    #[test]
    fn diagonalize_orders_eigenvalues_both_ways() {
        let m = Matrix::from_array([[2.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, 5.0]]);
        let (ascending, _) = m.diagonalize(SortOrder::Ascending).unwrap();
        assert!(ascending.windows(2).all(|w| w[0] < w[1]));
        let (descending, _) = m.diagonalize(SortOrder::Descending).unwrap();
        assert!(descending.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn diagonalize_pairs_eigenvalues_with_their_columns() {
        let m = Matrix::from_array([[2.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, 5.0]]);
        let (values, vectors) = m.diagonalize(SortOrder::Ascending).unwrap();
        for (value, expected) in values.iter().zip([-1.0, 2.0, 5.0]) {
            assert!((value - expected).abs() < 1e-12);
        }
        // The eigenvector for -1 is e_y, for 2 is e_x, for 5 is e_z.
        assert!((vectors[(1, 0)].abs() - 1.0).abs() < 1e-12);
        assert!((vectors[(0, 1)].abs() - 1.0).abs() < 1e-12);
        assert!((vectors[(2, 2)].abs() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn diagonalize_rejects_non_square_and_non_symmetric() {
        let rect = Matrix::<f64>::zeros(2, 3);
        assert!(matches!(
            rect.diagonalize(SortOrder::Ascending),
            Err(MatrixError::NotSquare { .. })
        ));
        let skew = Matrix::from_array([[0.0, 1.0], [-1.0, 0.0]]);
        assert!(matches!(
            skew.diagonalize(SortOrder::Ascending),
            Err(MatrixError::NotSymmetric { .. })
        ));
    }

    #[test]
    fn apply_symmetric_square_root_squares_back() {
        let m = Matrix::from_array([[4.0, 1.0], [1.0, 9.0]]);
        let root = m.apply_symmetric(|v| v.sqrt()).unwrap();
        let squared = root.multiply(root.as_view()).unwrap();
        assert!(squared.almost_equals(m.as_view(), 1e-10).unwrap());
    }

    #[test]
    fn almost_equals_covers_complex_elements() {
        use rustfft::num_complex::Complex;
        let a = Matrix::from_array([[Complex::new(1.0_f64, 2.0)]]);
        let mut b = a.clone();
        assert!(a.almost_equals(b.as_view(), 1e-12).unwrap());
        b[(0, 0)] = Complex::new(1.0, 2.0 + 1e-6);
        assert!(!a.almost_equals(b.as_view(), 1e-9).unwrap());
        assert!(a.almost_equals(b.as_view(), 1e-3).unwrap());
    }

    #[test]
    fn almost_equals_fails_fast_on_size_mismatch() {
        let a = Matrix::<f64>::zeros(2, 2);
        let b = Matrix::<f64>::zeros(2, 3);
        assert!(a.almost_equals(b.as_view(), 1e-12).is_err());
    }

    #[test]
    fn dot_is_the_inner_product_of_linearized_buffers() {
        let a = Matrix::from_array([[1.0, 2.0], [3.0, 4.0]]);
        let b = Matrix::from_array([[5.0, 6.0], [7.0, 8.0]]);
        assert_eq!(a.dot(b.as_view()).unwrap(), 70.0);
    }

    #[test]
    fn column_slices_are_strided_rows_are_contiguous() {
        let m = matrix_3x3();
        assert_eq!(m.col(1).to_vec(), vec![0.0, 1.0, 4.0]);
        assert_eq!(m.col(1).stride(), 3);
        assert!(m.row_slice(0).is_contiguous());
        assert_eq!(m.row_slice(2).to_vec(), vec![0.0, 4.0, 1.0]);
    }

    #[test]
    fn slice_arithmetic_requires_contiguous_operands() {
        let mut m = matrix_3x3();
        let other = Matrix::from_array([[1.0, 1.0, 1.0]]);
        let mut col = m.col_mut(0);
        assert!(matches!(
            col.add_assign(other.row_slice(0)),
            Err(MatrixError::NonContiguousSlice)
        ));
    }

    #[test]
    fn slice_scalar_arithmetic_works_on_any_stride() {
        let mut m = matrix_3x3();
        m.col_mut(2).scale(2.0);
        assert_eq!(m[(0, 2)], 2.0);
        assert_eq!(m[(2, 2)], 2.0);
        m.col_mut(2).add_scalar(1.0);
        assert_eq!(m[(1, 2)], 1.0);
    }

    #[test]
    fn contiguous_slice_arithmetic_is_element_wise() {
        let mut m = matrix_3x3();
        let addend = Matrix::from_array([[1.0, 2.0, 3.0]]);
        {
            let mut view = m.as_view_mut();
            let row = view.row_mut(0);
            let mut target = SliceMut {
                data: row,
                stride: 1,
                len: 3,
            };
            target.add_assign(addend.row_slice(0)).unwrap();
        }
        assert_eq!(m.row(0), &[3.0, 2.0, 4.0]);
    }

    #[test]
    fn cast_round_trips_through_single_precision() {
        let m = matrix_3x3();
        let narrowed: Matrix<f32> = m.cast();
        let widened: Matrix<f64> = narrowed.cast();
        assert!(m.almost_equals(widened.as_view(), 1e-6).unwrap());
    }

    #[test]
    fn from_rows_rejects_ragged_input() {
        let result = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0]]);
        assert!(matches!(
            result,
            Err(MatrixError::InconsistentRows {
                expected: 2,
                found: 1
            })
        ));
    }

    #[test]
    fn is_near_zero_applies_threshold_element_wise() {
        let m = Matrix::from_array([[1e-12, -1e-12], [0.0, 1e-12]]);
        assert!(m.is_near_zero(1e-10));
        assert!(!m.is_near_zero(1e-13));
    }
}
