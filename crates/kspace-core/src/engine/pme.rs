use super::config::PmeOptions;
use super::error::PmeError;
use super::fft::Fft3;
use super::grid::{ComplexGrid, GridDims, RealGrid};
use super::influence::{self, InfluenceTable};
use super::probe::{probe_forces, probe_potential};
use super::spread::spread;
use crate::core::lattice::{Lattice, LatticeType};
use crate::core::matrix::{Matrix, MatrixView, MatrixViewMut};
use crate::core::multipole::{n_cartesian, FractionalTransform};
use crate::core::scalar::Real;
use num_traits::Float;
use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::{debug, info, trace};

/// A configured PME instance: the reciprocal-space half of an Ewald sum for
/// r⁻ⁿ interactions.
///
/// Owns every piece of mutable state the pipeline needs — scratch grids,
/// FFT plans, the worker pool, and the lattice-dependent caches — so that
/// repeated compute calls allocate almost nothing. Caller matrices are
/// borrowed as views for the duration of a call and never copied beyond the
/// fractional-coordinate and coefficient scratch.
///
/// Lifecycle: construct with [`Pme::new`], assign a cell with
/// [`Pme::set_lattice_vectors`], then call any of the `compute_*_rec`
/// operations. Changing the lattice invalidates the
/// influence-function and multipole-transform caches; changing any setup
/// parameter means building a fresh instance.
pub struct Pme<R: Real> {
    options: PmeOptions,
    dims: GridDims,
    pool: ThreadPool,
    fft: Fft3<R>,
    grid: RealGrid<R>,
    khat: ComplexGrid<R>,
    lattice: Option<Lattice<R>>,
    influence: Option<InfluenceTable<R>>,
    transform: Option<FractionalTransform<R>>,
    scaled_inverse: Option<Matrix<R>>,
}

impl<R: Real> Pme<R> {
    pub fn new(options: PmeOptions) -> Result<Self, PmeError> {
        options.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.threads)
            .build()
            .map_err(|e| PmeError::ThreadPool(e.to_string()))?;
        let dims = options.grid;
        info!(
            r_power = options.r_power,
            kappa = options.kappa,
            spline_order = options.spline_order,
            grid = ?dims,
            workers = pool.current_num_threads(),
            "configured PME instance"
        );
        Ok(Self {
            options,
            dims,
            fft: Fft3::new(dims),
            grid: RealGrid::new(dims),
            khat: ComplexGrid::new(dims),
            pool,
            lattice: None,
            influence: None,
            transform: None,
            scaled_inverse: None,
        })
    }

    pub fn options(&self) -> &PmeOptions {
        &self.options
    }

    pub fn lattice(&self) -> Option<&Lattice<R>> {
        self.lattice.as_ref()
    }

    /// Sets (or replaces) the unit cell from edge lengths and angles in
    /// degrees, dropping every lattice-dependent cache.
    pub fn set_lattice_vectors(
        &mut self,
        a: R,
        b: R,
        c: R,
        alpha: R,
        beta: R,
        gamma: R,
        kind: LatticeType,
    ) -> Result<(), PmeError> {
        let lattice = Lattice::build(a, b, c, alpha, beta, gamma, kind)?;
        debug!(
            volume = lattice.volume().as_f64(),
            ?kind,
            "lattice updated; influence and transform caches dropped"
        );
        self.lattice = Some(lattice);
        self.influence = None;
        self.transform = None;
        self.scaled_inverse = None;
        Ok(())
    }

    /// Reciprocal-space energy.
    pub fn compute_e_rec(
        &mut self,
        angmom: usize,
        parameters: MatrixView<'_, R>,
        coordinates: MatrixView<'_, R>,
    ) -> Result<R, PmeError> {
        self.check_system(angmom, angmom, parameters, coordinates)?;
        self.fill_spectrum(angmom, parameters, coordinates)?;
        let table = self.influence()?;
        Ok(influence::convolve_energy(&self.khat, table, &self.pool))
    }

    /// Reciprocal-space energy plus forces, accumulated into `forces`.
    pub fn compute_ef_rec(
        &mut self,
        angmom: usize,
        parameters: MatrixView<'_, R>,
        coordinates: MatrixView<'_, R>,
        mut forces: MatrixViewMut<'_, R>,
    ) -> Result<R, PmeError> {
        self.check_system(angmom, angmom + 1, parameters, coordinates)?;
        self.check_shape("forces", forces.rows(), forces.cols(), coordinates.rows(), 3)?;
        let (fractional, coefficients) =
            self.fill_spectrum(angmom, parameters, coordinates)?;

        let table = self.influence.as_ref().ok_or(PmeError::LatticeNotSet)?;
        let energy = influence::convolve_scale(&mut self.khat, table, &self.pool);
        self.fft.inverse(&mut self.khat, &mut self.grid, &self.pool)?;

        let scaled_inverse = self.scaled_inverse.as_ref().ok_or(PmeError::LatticeNotSet)?;
        probe_forces(
            &self.grid,
            self.options.spline_order,
            angmom,
            &fractional,
            &coefficients,
            scaled_inverse,
            &mut forces,
            &self.pool,
        );
        Ok(energy)
    }

    /// Reciprocal-space energy, forces, and virial; forces and the
    /// upper-triangular (xx, xy, xz, yy, yz, zz) virial are accumulated.
    pub fn compute_efv_rec(
        &mut self,
        angmom: usize,
        parameters: MatrixView<'_, R>,
        coordinates: MatrixView<'_, R>,
        mut forces: MatrixViewMut<'_, R>,
        virial: &mut [R; 6],
    ) -> Result<R, PmeError> {
        self.check_system(angmom, angmom + 1, parameters, coordinates)?;
        self.check_shape("forces", forces.rows(), forces.cols(), coordinates.rows(), 3)?;
        let (fractional, coefficients) =
            self.fill_spectrum(angmom, parameters, coordinates)?;

        let table = self.influence.as_ref().ok_or(PmeError::LatticeNotSet)?;
        let lattice = self.lattice.as_ref().ok_or(PmeError::LatticeNotSet)?;
        let (energy, contribution) =
            influence::convolve_scale_virial(&mut self.khat, table, lattice, &self.pool);
        for (total, v) in virial.iter_mut().zip(contribution) {
            *total += v;
        }

        self.fft.inverse(&mut self.khat, &mut self.grid, &self.pool)?;
        let scaled_inverse = self.scaled_inverse.as_ref().ok_or(PmeError::LatticeNotSet)?;
        probe_forces(
            &self.grid,
            self.options.spline_order,
            angmom,
            &fractional,
            &coefficients,
            scaled_inverse,
            &mut forces,
            &self.pool,
        );
        Ok(energy)
    }

    /// Reciprocal-space potential (and its Cartesian derivatives up to
    /// `deriv_level`) generated by the parameter-bearing atoms, evaluated at
    /// arbitrary probe points. Returns an (nProbes × nCartesian) matrix.
    pub fn compute_p_rec(
        &mut self,
        angmom: usize,
        parameters: MatrixView<'_, R>,
        coordinates: MatrixView<'_, R>,
        probes: MatrixView<'_, R>,
        deriv_level: usize,
    ) -> Result<Matrix<R>, PmeError> {
        let needed = angmom.max(deriv_level);
        self.check_system(angmom, needed, parameters, coordinates)?;
        if probes.cols() != 3 {
            return Err(PmeError::ShapeMismatch {
                matrix: "probe coordinates",
                rows: probes.rows(),
                cols: probes.cols(),
                expected_rows: probes.rows(),
                expected_cols: 3,
            });
        }
        self.ensure_transform(needed)?;
        self.fill_spectrum(angmom, parameters, coordinates)?;

        let table = self.influence.as_ref().ok_or(PmeError::LatticeNotSet)?;
        influence::convolve_scale(&mut self.khat, table, &self.pool);
        self.fft.inverse(&mut self.khat, &mut self.grid, &self.pool)?;

        let lattice = self.lattice.as_ref().ok_or(PmeError::LatticeNotSet)?;
        let probe_fractional = wrapped_fractional(lattice, probes, &self.pool);
        let transform = self.transform.as_ref().ok_or(PmeError::LatticeNotSet)?;
        let mut out = Matrix::zeros(probes.rows(), n_cartesian(deriv_level));
        probe_potential(
            &self.grid,
            self.options.spline_order,
            deriv_level,
            &probe_fractional,
            transform,
            &mut out,
            &self.pool,
        );
        Ok(out)
    }

    /// Spreads the system onto the grid and runs the forward FFT, leaving
    /// ρ̂ in the spectrum scratch. Returns the wrapped fractional
    /// coordinates and grid-frame coefficients for the probe stage.
    fn fill_spectrum(
        &mut self,
        angmom: usize,
        parameters: MatrixView<'_, R>,
        coordinates: MatrixView<'_, R>,
    ) -> Result<(Matrix<R>, Matrix<R>), PmeError> {
        self.ensure_transform(angmom)?;
        let lattice = self.lattice.as_ref().ok_or(PmeError::LatticeNotSet)?;
        if self.influence.is_none() {
            self.influence = Some(influence::build(&self.options, lattice, &self.pool));
        }

        trace!(
            n_atoms = coordinates.rows(),
            angmom,
            "spreading parameters and transforming to reciprocal space"
        );

        let fractional = wrapped_fractional(lattice, coordinates, &self.pool);
        let transform = self.transform.as_ref().ok_or(PmeError::LatticeNotSet)?;
        let n_coefficients = n_cartesian(angmom);
        let mut coefficients = Matrix::zeros(parameters.rows(), n_coefficients);
        self.pool.install(|| {
            coefficients
                .data_mut()
                .par_chunks_mut(n_coefficients)
                .zip(parameters.data().par_chunks(n_coefficients))
                .for_each(|(out, row)| transform.apply(row, out))
        });

        spread(
            &mut self.grid,
            self.options.spline_order,
            angmom,
            &fractional,
            &coefficients,
            &self.pool,
        );
        self.fft.forward(&mut self.grid, &mut self.khat, &self.pool)?;
        Ok((fractional, coefficients))
    }

    fn ensure_transform(&mut self, max_order: usize) -> Result<(), PmeError> {
        let lattice = self.lattice.as_ref().ok_or(PmeError::LatticeNotSet)?;
        if self.scaled_inverse.is_none() {
            self.scaled_inverse =
                Some(lattice.scaled_inverse((self.dims.a, self.dims.b, self.dims.c)));
        }
        let stale = self
            .transform
            .as_ref()
            .map_or(true, |t| t.max_order() < max_order);
        if stale {
            let scaled = self.scaled_inverse.as_ref().ok_or(PmeError::LatticeNotSet)?;
            debug!(max_order, "building Cartesian→fractional multipole transform");
            self.transform = Some(FractionalTransform::build(scaled, max_order));
        }
        Ok(())
    }

    fn influence(&self) -> Result<&InfluenceTable<R>, PmeError> {
        self.influence.as_ref().ok_or(PmeError::LatticeNotSet)
    }

    fn check_system(
        &self,
        angmom: usize,
        derivs_needed: usize,
        parameters: MatrixView<'_, R>,
        coordinates: MatrixView<'_, R>,
    ) -> Result<(), PmeError> {
        if self.options.spline_order <= derivs_needed {
            return Err(PmeError::SplineOrderTooLow {
                order: self.options.spline_order,
                required: derivs_needed,
                angmom,
            });
        }
        self.check_shape(
            "coordinates",
            coordinates.rows(),
            coordinates.cols(),
            coordinates.rows(),
            3,
        )?;
        self.check_shape(
            "parameters",
            parameters.rows(),
            parameters.cols(),
            coordinates.rows(),
            n_cartesian(angmom),
        )
    }

    fn check_shape(
        &self,
        matrix: &'static str,
        rows: usize,
        cols: usize,
        expected_rows: usize,
        expected_cols: usize,
    ) -> Result<(), PmeError> {
        if rows != expected_rows || cols != expected_cols {
            return Err(PmeError::ShapeMismatch {
                matrix,
                rows,
                cols,
                expected_rows,
                expected_cols,
            });
        }
        Ok(())
    }
}

/// Fractional coordinates wrapped into [0, 1)³ for a batch of Cartesian
/// rows.
fn wrapped_fractional<R: Real>(
    lattice: &Lattice<R>,
    coordinates: MatrixView<'_, R>,
    pool: &ThreadPool,
) -> Matrix<R> {
    let mut fractional = Matrix::zeros(coordinates.rows(), 3);
    pool.install(|| {
        fractional
            .data_mut()
            .par_chunks_mut(3)
            .zip(coordinates.data().par_chunks(3))
            .for_each(|(out, row)| {
                let u = lattice.fractional_of([row[0], row[1], row[2]]);
                for (slot, value) in out.iter_mut().zip(u) {
                    *slot = value - Float::floor(value);
                }
            })
    });
    fractional
}
