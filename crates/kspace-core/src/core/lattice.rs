//! Unit-cell geometry: construction of the lattice matrix from cell
//! parameters, the reciprocal lattice, and fractional↔Cartesian transforms.
//!
//! Coordinates follow the row-vector convention used by the flat boundary's
//! (nAtoms × 3) arrays: a Cartesian row x maps to fractional coordinates
//! through u = x·L⁻¹, with the rows of L being the lattice vectors a, b, c.

use super::matrix::{Matrix, MatrixError, SortOrder};
use super::scalar::Real;
use num_traits::Float;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum LatticeError {
    #[error("lattice length {name} must be positive, got {value}")]
    NonPositiveLength { name: &'static str, value: f64 },

    #[error("lattice angle {name} must lie strictly between 0 and 180 degrees, got {value}")]
    InvalidAngle { name: &'static str, value: f64 },

    #[error("cell parameters do not describe a positive-volume lattice")]
    Degenerate,

    #[error("metric tensor is not positive definite (eigenvalue {eigenvalue:e})")]
    NotPositiveDefinite { eigenvalue: f64 },

    #[error(transparent)]
    Matrix(#[from] MatrixError),
}

/// Orientation convention for the constructed lattice matrix.
///
/// The choice is observable: it rotates the frame in which the caller
/// receives forces and stresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LatticeType {
    /// a along +x, b in the xy half-plane with positive y.
    XAligned,
    /// The symmetric positive-definite square root of the metric tensor.
    ShapeMatrix,
}

/// A unit cell with its cached inverse and volume.
#[derive(Debug, Clone)]
pub struct Lattice<R: Real> {
    direct: Matrix<R>,
    inverse: Matrix<R>,
    volume: R,
}

impl<R: Real> Lattice<R> {
    /// Builds the lattice matrix from cell edge lengths (a, b, c) and angles
    /// (α, β, γ, in degrees), in the requested orientation convention.
    pub fn build(
        a: R,
        b: R,
        c: R,
        alpha: R,
        beta: R,
        gamma: R,
        kind: LatticeType,
    ) -> Result<Self, LatticeError> {
        let lengths = [("a", a.as_f64()), ("b", b.as_f64()), ("c", c.as_f64())];
        for (name, value) in lengths {
            if !(value > 0.0) {
                return Err(LatticeError::NonPositiveLength { name, value });
            }
        }
        let angles = [
            ("alpha", alpha.as_f64()),
            ("beta", beta.as_f64()),
            ("gamma", gamma.as_f64()),
        ];
        for (name, value) in angles {
            if !(value > 0.0 && value < 180.0) {
                return Err(LatticeError::InvalidAngle { name, value });
            }
        }

        let (a, b, c) = (a.as_f64(), b.as_f64(), c.as_f64());
        let cos_alpha = alpha.as_f64().to_radians().cos();
        let cos_beta = beta.as_f64().to_radians().cos();
        let (sin_gamma, cos_gamma) = gamma.as_f64().to_radians().sin_cos();

        let direct = match kind {
            LatticeType::XAligned => {
                let cx = c * cos_beta;
                let cy = c * (cos_alpha - cos_beta * cos_gamma) / sin_gamma;
                let cz_squared = c * c - cx * cx - cy * cy;
                if cz_squared <= 0.0 {
                    return Err(LatticeError::Degenerate);
                }
                Matrix::from_array([
                    [R::of(a), R::zero(), R::zero()],
                    [R::of(b * cos_gamma), R::of(b * sin_gamma), R::zero()],
                    [R::of(cx), R::of(cy), R::of(cz_squared.sqrt())],
                ])
            }
            LatticeType::ShapeMatrix => {
                let metric = Matrix::from_array([
                    [R::of(a * a), R::of(a * b * cos_gamma), R::of(a * c * cos_beta)],
                    [R::of(a * b * cos_gamma), R::of(b * b), R::of(b * c * cos_alpha)],
                    [R::of(a * c * cos_beta), R::of(b * c * cos_alpha), R::of(c * c)],
                ]);
                let (values, _) = metric.diagonalize(SortOrder::Ascending)?;
                if values[0] <= R::zero() {
                    return Err(LatticeError::NotPositiveDefinite {
                        eigenvalue: values[0].as_f64(),
                    });
                }
                metric.apply_symmetric(Float::sqrt)?
            }
        };

        Self::from_matrix(direct)
    }

    /// Wraps an explicit 3×3 lattice matrix whose rows are a, b, c.
    pub fn from_matrix(direct: Matrix<R>) -> Result<Self, LatticeError> {
        let determinant = direct.determinant3()?;
        let volume = Float::abs(determinant);
        if !(volume.as_f64() > 0.0) {
            return Err(LatticeError::Degenerate);
        }
        let inverse = direct.inverse()?;
        Ok(Self {
            direct,
            inverse,
            volume,
        })
    }

    /// The lattice matrix; rows are the Cartesian vectors a, b, c.
    pub fn direct(&self) -> &Matrix<R> {
        &self.direct
    }

    /// Cached inverse of the lattice matrix.
    pub fn inverse(&self) -> &Matrix<R> {
        &self.inverse
    }

    /// Cell volume |det L|, always positive.
    pub fn volume(&self) -> R {
        self.volume
    }

    /// Reciprocal lattice 2π·L⁻ᵀ, satisfying reciprocal · Lᵀ = 2π·I.
    pub fn reciprocal(&self) -> Matrix<R> {
        let mut out = self.inverse.transposed();
        let tau = R::of(TAU);
        for v in out.data_mut() {
            *v *= tau;
        }
        out
    }

    /// Fractional coordinates of a Cartesian row vector: u = x·L⁻¹.
    pub fn fractional_of(&self, cartesian: [R; 3]) -> [R; 3] {
        let mut out = [R::zero(); 3];
        for (alpha, out_value) in out.iter_mut().enumerate() {
            let mut acc = R::zero();
            for (j, &x) in cartesian.iter().enumerate() {
                acc += x * self.inverse[(j, alpha)];
            }
            *out_value = acc;
        }
        out
    }

    /// Cartesian coordinates of a fractional row vector: x = u·L.
    pub fn cartesian_of(&self, fractional: [R; 3]) -> [R; 3] {
        let mut out = [R::zero(); 3];
        for (j, out_value) in out.iter_mut().enumerate() {
            let mut acc = R::zero();
            for (alpha, &u) in fractional.iter().enumerate() {
                acc += u * self.direct[(alpha, j)];
            }
            *out_value = acc;
        }
        out
    }

    /// The Cartesian→grid transform ∂w_α/∂x_j = N_α·(L⁻¹)_jα, with N the
    /// grid dimension along axis α. Feeds the multipole transform and the
    /// force mapping back to the Cartesian frame.
    pub fn scaled_inverse(&self, dims: (usize, usize, usize)) -> Matrix<R> {
        let scale = [
            R::of(dims.0 as f64),
            R::of(dims.1 as f64),
            R::of(dims.2 as f64),
        ];
        let mut out = Matrix::zeros(3, 3);
        for j in 0..3 {
            for (alpha, &factor) in scale.iter().enumerate() {
                out[(j, alpha)] = self.inverse[(j, alpha)] * factor;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::TAU;

    fn triclinic_shape() -> Lattice<f64> {
        Lattice::build(10.0, 12.0, 15.0, 80.0, 90.0, 100.0, LatticeType::ShapeMatrix).unwrap()
    }

    #[test]
    fn cubic_x_aligned_lattice_is_diagonal() {
        let lattice =
            Lattice::<f64>::build(10.0, 10.0, 10.0, 90.0, 90.0, 90.0, LatticeType::XAligned)
                .unwrap();
        let expected = Matrix::from_array([
            [10.0, 0.0, 0.0],
            [0.0, 10.0, 0.0],
            [0.0, 0.0, 10.0],
        ]);
        assert!(lattice
            .direct()
            .almost_equals(expected.as_view(), 1e-12)
            .unwrap());
        assert!((lattice.volume() - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn x_aligned_orientation_places_a_along_x_and_b_in_the_upper_half_plane() {
        let lattice =
            Lattice::<f64>::build(8.0, 9.0, 11.0, 75.0, 85.0, 95.0, LatticeType::XAligned).unwrap();
        let direct = lattice.direct();
        assert_eq!(direct[(0, 1)], 0.0);
        assert_eq!(direct[(0, 2)], 0.0);
        assert_eq!(direct[(1, 2)], 0.0);
        assert!(direct[(1, 1)] > 0.0);
        assert!(direct[(2, 2)] > 0.0);
    }

    #[test]
    fn shape_matrix_lattice_is_symmetric_and_reproduces_the_metric() {
        let lattice = triclinic_shape();
        let direct = lattice.direct();
        assert!(direct.is_symmetric(1e-9));
        let metric = direct.multiply(direct.as_view()).unwrap();
        assert!((metric[(0, 0)] - 100.0).abs() < 1e-8);
        assert!((metric[(1, 1)] - 144.0).abs() < 1e-8);
        assert!((metric[(2, 2)] - 225.0).abs() < 1e-8);
        let expected_ab = 10.0 * 12.0 * 100.0f64.to_radians().cos();
        assert!((metric[(0, 1)] - expected_ab).abs() < 1e-8);
    }

    #[test]
    fn reciprocal_times_transposed_lattice_is_two_pi_identity() {
        for kind in [LatticeType::XAligned, LatticeType::ShapeMatrix] {
            let lattice = Lattice::<f64>::build(10.0, 12.0, 15.0, 80.0, 90.0, 100.0, kind).unwrap();
            let product = lattice
                .reciprocal()
                .multiply(lattice.direct().transposed().as_view())
                .unwrap();
            let mut expected = Matrix::identity(3);
            for v in expected.data_mut() {
                *v *= TAU;
            }
            assert!(product.almost_equals(expected.as_view(), 1e-12).unwrap());
        }
    }

    #[test]
    fn triclinic_volume_matches_the_closed_form() {
        let lattice = triclinic_shape();
        let (ca, cb, cg) = (
            80.0f64.to_radians().cos(),
            90.0f64.to_radians().cos(),
            100.0f64.to_radians().cos(),
        );
        let expected =
            10.0 * 12.0 * 15.0 * (1.0 - ca * ca - cb * cb - cg * cg + 2.0 * ca * cb * cg).sqrt();
        assert!((lattice.volume() - expected).abs() < 1e-10);
    }

    #[test]
    fn fractional_round_trip_is_the_identity() {
        let lattice = triclinic_shape();
        let fractional = [0.17, 0.83, 0.41];
        let cartesian = lattice.cartesian_of(fractional);
        let back = lattice.fractional_of(cartesian);
        for (u, v) in fractional.iter().zip(&back) {
            assert!((u - v).abs() < 1e-12);
        }
    }

    #[test]
    fn scaled_inverse_carries_the_grid_dimensions() {
        let lattice =
            Lattice::<f64>::build(10.0, 20.0, 40.0, 90.0, 90.0, 90.0, LatticeType::XAligned)
                .unwrap();
        let scaled = lattice.scaled_inverse((16, 32, 64));
        assert!((scaled[(0, 0)] - 1.6).abs() < 1e-12);
        assert!((scaled[(1, 1)] - 1.6).abs() < 1e-12);
        assert!((scaled[(2, 2)] - 1.6).abs() < 1e-12);
    }

    #[test]
    fn rejects_non_positive_lengths_and_out_of_range_angles() {
        assert!(matches!(
            Lattice::<f64>::build(0.0, 1.0, 1.0, 90.0, 90.0, 90.0, LatticeType::XAligned),
            Err(LatticeError::NonPositiveLength { name: "a", .. })
        ));
        assert!(matches!(
            Lattice::<f64>::build(1.0, 1.0, 1.0, 90.0, 180.0, 90.0, LatticeType::XAligned),
            Err(LatticeError::InvalidAngle { name: "beta", .. })
        ));
    }

    #[test]
    fn rejects_angle_combinations_without_a_real_cell() {
        assert!(matches!(
            Lattice::<f64>::build(10.0, 10.0, 10.0, 20.0, 150.0, 20.0, LatticeType::XAligned),
            Err(LatticeError::Degenerate)
        ));
    }
}
