use super::error::PmeError;
use super::grid::GridDims;
use serde::{Deserialize, Serialize};

/// Setup parameters for a PME instance.
///
/// κ and the scale factor are stored in double precision regardless of the
/// instance's scalar type; they are narrowed once at table-build time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PmeOptions {
    /// Exponent n of the r⁻ⁿ kernel (1 = Coulomb, 6 = dispersion).
    pub r_power: u16,
    /// Ewald splitting parameter κ > 0; larger values shift work from the
    /// direct sum into this reciprocal-space engine.
    pub kappa: f64,
    /// Cardinal B-spline interpolation order p ≥ 2.
    pub spline_order: usize,
    /// Real-space grid dimensions; each must be at least the spline order
    /// and is ideally a product of small primes for the FFT.
    pub grid: GridDims,
    /// Overall scale applied to energies, forces and virials (e.g. the
    /// Coulomb constant in the caller's unit system).
    pub scale_factor: f64,
    /// Worker thread count; 0 selects one worker per available core.
    pub threads: usize,
}

impl PmeOptions {
    /// A Coulomb (n = 1) configuration with unit scale.
    pub fn coulomb(kappa: f64, spline_order: usize, grid: GridDims) -> Self {
        Self {
            r_power: 1,
            kappa,
            spline_order,
            grid,
            scale_factor: 1.0,
            threads: 1,
        }
    }

    pub fn validate(&self) -> Result<(), PmeError> {
        if self.r_power == 0 {
            return Err(PmeError::InvalidParameter {
                name: "r_power",
                message: "kernel exponent must be at least 1".into(),
            });
        }
        if !(self.kappa > 0.0) || !self.kappa.is_finite() {
            return Err(PmeError::InvalidParameter {
                name: "kappa",
                message: format!("splitting parameter must be positive, got {}", self.kappa),
            });
        }
        if self.spline_order < 2 {
            return Err(PmeError::InvalidParameter {
                name: "spline_order",
                message: format!("spline order must be at least 2, got {}", self.spline_order),
            });
        }
        if !self.scale_factor.is_finite() {
            return Err(PmeError::InvalidParameter {
                name: "scale_factor",
                message: format!("scale factor must be finite, got {}", self.scale_factor),
            });
        }
        for (axis, dim) in [
            ('a', self.grid.a),
            ('b', self.grid.b),
            ('c', self.grid.c),
        ] {
            if dim < self.spline_order {
                return Err(PmeError::GridBelowSplineOrder {
                    axis,
                    dim,
                    order: self.spline_order,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> PmeOptions {
        PmeOptions::coulomb(0.3, 6, GridDims::new(32, 32, 32))
    }

    #[test]
    fn default_coulomb_options_validate() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn zero_kernel_exponent_is_rejected() {
        let mut options = valid();
        options.r_power = 0;
        assert!(matches!(
            options.validate(),
            Err(PmeError::InvalidParameter { name: "r_power", .. })
        ));
    }

    #[test]
    fn non_positive_kappa_is_rejected() {
        let mut options = valid();
        options.kappa = 0.0;
        assert!(matches!(
            options.validate(),
            Err(PmeError::InvalidParameter { name: "kappa", .. })
        ));
        options.kappa = f64::NAN;
        assert!(options.validate().is_err());
    }

    #[test]
    fn spline_order_below_two_is_rejected() {
        let mut options = valid();
        options.spline_order = 1;
        assert!(matches!(
            options.validate(),
            Err(PmeError::InvalidParameter {
                name: "spline_order",
                ..
            })
        ));
    }

    #[test]
    fn grid_smaller_than_the_spline_support_is_rejected() {
        let mut options = valid();
        options.grid.b = 4;
        assert!(matches!(
            options.validate(),
            Err(PmeError::GridBelowSplineOrder { axis: 'b', dim: 4, .. })
        ));
    }
}
