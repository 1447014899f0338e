use super::error::PmeError;
use super::grid::{ComplexGrid, GridDims, RealGrid};
use crate::core::scalar::Real;
use rayon::prelude::*;
use rayon::ThreadPool;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Per-setup 3-D real↔half-complex FFT plans.
///
/// The transform factorizes into a real↔complex pass along the fastest axis
/// (C) and complex passes along B and A. Both directions are unnormalized;
/// the convolution weights carry every physical prefactor, so no 1/N scaling
/// appears anywhere in the pipeline.
pub(crate) struct Fft3<R: Real> {
    dims: GridDims,
    r2c: Arc<dyn RealToComplex<R>>,
    c2r: Arc<dyn ComplexToReal<R>>,
    forward_b: Arc<dyn Fft<R>>,
    inverse_b: Arc<dyn Fft<R>>,
    forward_a: Arc<dyn Fft<R>>,
    inverse_a: Arc<dyn Fft<R>>,
    /// Transposed (pencil-major) workspace for the A-axis passes.
    pencils: Vec<Complex<R>>,
}

impl<R: Real> Fft3<R> {
    pub fn new(dims: GridDims) -> Self {
        let mut real_planner = RealFftPlanner::<R>::new();
        let mut planner = FftPlanner::<R>::new();
        Self {
            dims,
            r2c: real_planner.plan_fft_forward(dims.c),
            c2r: real_planner.plan_fft_inverse(dims.c),
            forward_b: planner.plan_fft_forward(dims.b),
            inverse_b: planner.plan_fft_inverse(dims.b),
            forward_a: planner.plan_fft_forward(dims.a),
            inverse_a: planner.plan_fft_inverse(dims.a),
            pencils: vec![Complex::new(R::zero(), R::zero()); dims.complex_len()],
        }
    }

    /// Real-to-half-complex forward transform. The real grid is consumed as
    /// scratch by the C-axis pass.
    pub fn forward(
        &mut self,
        real: &mut RealGrid<R>,
        khat: &mut ComplexGrid<R>,
        pool: &ThreadPool,
    ) -> Result<(), PmeError> {
        let dims = self.dims;
        let half_c = dims.half_c();

        let r2c = Arc::clone(&self.r2c);
        pool.install(|| {
            real.data
                .par_chunks_mut(dims.c)
                .zip(khat.data.par_chunks_mut(half_c))
                .try_for_each_init(
                    || vec![Complex::new(R::zero(), R::zero()); r2c.get_scratch_len()],
                    |scratch, (row, spectrum)| {
                        r2c.process_with_scratch(row, spectrum, scratch)
                            .map_err(|e| PmeError::Fft(e.to_string()))
                    },
                )
        })?;

        Self::pass_axis_b(dims, &self.forward_b, &mut khat.data, pool);
        Self::pass_axis_a(dims, &self.forward_a, &mut self.pencils, &mut khat.data, pool);
        Ok(())
    }

    /// Half-complex-to-real inverse transform. The spectrum grid is consumed
    /// as scratch.
    pub fn inverse(
        &mut self,
        khat: &mut ComplexGrid<R>,
        real: &mut RealGrid<R>,
        pool: &ThreadPool,
    ) -> Result<(), PmeError> {
        let dims = self.dims;
        let half_c = dims.half_c();

        Self::pass_axis_a(dims, &self.inverse_a, &mut self.pencils, &mut khat.data, pool);
        Self::pass_axis_b(dims, &self.inverse_b, &mut khat.data, pool);

        let even_c = dims.c % 2 == 0;
        let c2r = Arc::clone(&self.c2r);
        pool.install(|| {
            khat.data
                .par_chunks_mut(half_c)
                .zip(real.data.par_chunks_mut(dims.c))
                .try_for_each_init(
                    || vec![Complex::new(R::zero(), R::zero()); c2r.get_scratch_len()],
                    |scratch, (spectrum, row)| {
                        // The DC (and, for even C, Nyquist) bins of each row
                        // are real up to rounding once the A and B passes are
                        // done; scrub the residue the c2r pass would reject.
                        spectrum[0].im = R::zero();
                        if even_c {
                            spectrum[half_c - 1].im = R::zero();
                        }
                        c2r.process_with_scratch(spectrum, row, scratch)
                            .map_err(|e| PmeError::Fft(e.to_string()))
                    },
                )
        })
    }

    /// Complex pass along B: within every a-plane, transform the length-B
    /// columns of the (B × C/2+1) sub-array.
    fn pass_axis_b(
        dims: GridDims,
        plan: &Arc<dyn Fft<R>>,
        data: &mut [Complex<R>],
        pool: &ThreadPool,
    ) {
        let half_c = dims.half_c();
        let plane_len = dims.complex_plane_len();
        pool.install(|| {
            data.par_chunks_mut(plane_len).for_each_init(
                || {
                    (
                        vec![Complex::new(R::zero(), R::zero()); dims.b],
                        vec![Complex::new(R::zero(), R::zero()); plan.get_inplace_scratch_len()],
                    )
                },
                |(column, scratch), plane| {
                    for z in 0..half_c {
                        for (b, value) in column.iter_mut().enumerate() {
                            *value = plane[b * half_c + z];
                        }
                        plan.process_with_scratch(column, scratch);
                        for (b, value) in column.iter().enumerate() {
                            plane[b * half_c + z] = *value;
                        }
                    }
                },
            )
        });
    }

    /// Complex pass along A: transpose into pencil-major order so each
    /// length-A line is contiguous, transform, and scatter back.
    fn pass_axis_a(
        dims: GridDims,
        plan: &Arc<dyn Fft<R>>,
        pencils: &mut [Complex<R>],
        data: &mut [Complex<R>],
        pool: &ThreadPool,
    ) {
        let a = dims.a;
        let pencil_count = dims.complex_plane_len();

        {
            let source: &[Complex<R>] = data;
            pool.install(|| {
                pencils.par_chunks_mut(a).enumerate().for_each_init(
                    || vec![Complex::new(R::zero(), R::zero()); plan.get_inplace_scratch_len()],
                    |scratch, (pencil, line)| {
                        for (ai, value) in line.iter_mut().enumerate() {
                            *value = source[ai * pencil_count + pencil];
                        }
                        plan.process_with_scratch(line, scratch);
                    },
                )
            });
        }

        let transformed: &[Complex<R>] = pencils;
        pool.install(|| {
            data.par_chunks_mut(pencil_count)
                .enumerate()
                .for_each(|(ai, plane)| {
                    for (pencil, value) in plane.iter_mut().enumerate() {
                        *value = transformed[pencil * a + ai];
                    }
                })
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(threads: usize) -> ThreadPool {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .unwrap()
    }

    fn filled_grid(dims: GridDims) -> RealGrid<f64> {
        let mut grid = RealGrid::new(dims);
        for (i, v) in grid.data.iter_mut().enumerate() {
            // Deterministic, sign-varying fill.
            *v = ((i * 2654435761) % 1000) as f64 / 499.0 - 1.0;
        }
        grid
    }

    #[test]
    fn impulse_at_origin_transforms_to_a_flat_spectrum() {
        let dims = GridDims::new(8, 6, 10);
        let mut fft = Fft3::<f64>::new(dims);
        let pool = pool(1);
        let mut real = RealGrid::new(dims);
        real.data[0] = 1.0;
        let mut khat = ComplexGrid::new(dims);
        fft.forward(&mut real, &mut khat, &pool).unwrap();
        for value in &khat.data {
            assert!((value.re - 1.0).abs() < 1e-12);
            assert!(value.im.abs() < 1e-12);
        }
    }

    #[test]
    fn round_trip_scales_by_the_grid_size() {
        for dims in [GridDims::new(8, 6, 10), GridDims::new(6, 8, 9)] {
            let mut fft = Fft3::<f64>::new(dims);
            let pool = pool(1);
            let mut real = filled_grid(dims);
            let original = real.data.clone();
            let mut khat = ComplexGrid::new(dims);
            fft.forward(&mut real, &mut khat, &pool).unwrap();
            fft.inverse(&mut khat, &mut real, &pool).unwrap();
            let scale = dims.real_len() as f64;
            for (out, orig) in real.data.iter().zip(&original) {
                assert!(
                    (out / scale - orig).abs() < 1e-12,
                    "round trip mismatch for dims {dims:?}"
                );
            }
        }
    }

    #[test]
    fn parseval_holds_with_hermitian_multiplicities() {
        let dims = GridDims::new(8, 6, 10);
        let mut fft = Fft3::<f64>::new(dims);
        let pool = pool(1);
        let mut real = filled_grid(dims);
        let sum_squares: f64 = real.data.iter().map(|v| v * v).sum();
        let mut khat = ComplexGrid::new(dims);
        fft.forward(&mut real, &mut khat, &pool).unwrap();

        let half_c = dims.half_c();
        let mut spectral = 0.0;
        for (i, value) in khat.data.iter().enumerate() {
            let multiplicity = dims.hermitian_multiplicity(i % half_c) as f64;
            spectral += multiplicity * value.norm_sqr();
        }
        let expected = sum_squares * dims.real_len() as f64;
        assert!((spectral - expected).abs() / expected < 1e-12);
    }

    #[test]
    fn results_are_identical_across_thread_counts() {
        let dims = GridDims::new(12, 8, 10);
        let mut serial = Fft3::<f64>::new(dims);
        let mut threaded = Fft3::<f64>::new(dims);
        let single = pool(1);
        let multi = pool(4);

        let mut real_a = filled_grid(dims);
        let mut real_b = filled_grid(dims);
        let mut khat_a = ComplexGrid::new(dims);
        let mut khat_b = ComplexGrid::new(dims);
        serial.forward(&mut real_a, &mut khat_a, &single).unwrap();
        threaded.forward(&mut real_b, &mut khat_b, &multi).unwrap();
        for (a, b) in khat_a.data.iter().zip(&khat_b.data) {
            assert_eq!(a, b);
        }
    }
}
