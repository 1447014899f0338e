use super::config::PmeOptions;
use super::grid::{ComplexGrid, GridDims};
use crate::core::gamma::upper_incomplete_gamma;
use crate::core::lattice::Lattice;
use crate::core::scalar::Real;
use crate::core::splines::SplineTable;
use itertools::iproduct;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::f64::consts::{PI, TAU};
use tracing::debug;

/// Per-axis structure-factor moduli below this are treated as zero bins
/// (odd spline orders vanish at the Nyquist frequency).
const MODULUS_GUARD: f64 = 1e-10;

/// Cached per-k convolution weights and the companion virial factors, laid
/// out exactly like the half-complex spectrum. Valid for one combination of
/// grid dimensions, lattice, κ, spline order, kernel exponent and scale;
/// the orchestrator rebuilds it when any of those change.
pub(crate) struct InfluenceTable<R: Real> {
    pub theta: Vec<R>,
    pub virial_factor: Vec<R>,
}

/// The r⁻ⁿ reciprocal-space kernel with its volume/scale prefactor folded
/// in. The Coulomb case is closed-form; general exponents go through the
/// incomplete gamma function.
pub(crate) struct Kernel {
    coulomb: bool,
    n: f64,
    prefactor: f64,
}

impl Kernel {
    pub fn new(r_power: u16, scale_factor: f64, kappa: f64, volume: f64) -> Self {
        let n = f64::from(r_power);
        if r_power == 1 {
            Self {
                coulomb: true,
                n,
                prefactor: scale_factor / (PI * volume),
            }
        } else {
            let complete_gamma = statrs::function::gamma::gamma(n / 2.0);
            Self {
                coulomb: false,
                n,
                prefactor: scale_factor * PI.powf(1.5) * kappa.powf(n - 3.0)
                    / (volume * complete_gamma),
            }
        }
    }

    /// Returns (θ before the B-spline factor, virial factor) for one bin,
    /// with x = π²m²/κ².
    pub fn evaluate(&self, x: f64, m_squared: f64) -> (f64, f64) {
        if self.coulomb {
            let theta = self.prefactor * (-x).exp() / m_squared;
            (theta, -2.0 * (1.0 + x))
        } else {
            let f = x.powf((self.n - 3.0) / 2.0)
                * upper_incomplete_gamma((3.0 - self.n) / 2.0, x);
            let theta = self.prefactor * f;
            let virial = (self.n - 3.0) - 2.0 * (-x).exp() / f;
            (theta, virial)
        }
    }
}

/// Builds the influence table for the configured kernel on the given
/// lattice, parallelized over a-planes of the half-complex grid.
pub(crate) fn build<R: Real>(
    options: &PmeOptions,
    lattice: &Lattice<R>,
    pool: &ThreadPool,
) -> InfluenceTable<R> {
    let dims = options.grid;
    let half_c = dims.half_c();
    let plane_len = dims.complex_plane_len();

    let moduli_a = spline_moduli(options.spline_order, dims.a);
    let moduli_b = spline_moduli(options.spline_order, dims.b);
    let moduli_c = spline_moduli(options.spline_order, dims.c);

    let inverse = lattice_inverse_f64(lattice);
    let kappa = options.kappa;
    let x_prefactor = PI * PI / (kappa * kappa);
    let kernel = Kernel::new(
        options.r_power,
        options.scale_factor,
        kappa,
        lattice.volume().as_f64(),
    );

    debug!(
        r_power = options.r_power,
        kappa,
        ?dims,
        "building influence function table"
    );

    let mut theta = vec![R::zero(); dims.complex_len()];
    let mut virial_factor = vec![R::zero(); dims.complex_len()];
    pool.install(|| {
        theta
            .par_chunks_mut(plane_len)
            .zip(virial_factor.par_chunks_mut(plane_len))
            .enumerate()
            .for_each(|(ka, (theta_plane, virial_plane))| {
                let fa = GridDims::signed_frequency(ka, dims.a) as f64;
                for (kb, kz) in iproduct!(0..dims.b, 0..half_c) {
                    if ka == 0 && kb == 0 && kz == 0 {
                        continue;
                    }
                    let fb = GridDims::signed_frequency(kb, dims.b) as f64;
                    let fc = kz as f64;
                    let denominator = moduli_a[ka] * moduli_b[kb] * moduli_c[kz];
                    if denominator < MODULUS_GUARD {
                        continue;
                    }

                    let mut m_squared = 0.0;
                    for row in &inverse {
                        let m_j = row[0] * fa + row[1] * fb + row[2] * fc;
                        m_squared += m_j * m_j;
                    }
                    let x = x_prefactor * m_squared;
                    let (bare_theta, virial) = kernel.evaluate(x, m_squared);

                    let index = kb * half_c + kz;
                    theta_plane[index] = R::of(bare_theta / denominator);
                    virial_plane[index] = R::of(virial);
                }
            })
    });

    InfluenceTable {
        theta,
        virial_factor,
    }
}

/// Energy-only reduction ½·Σ c_k·θ_k·|ρ̂_k|², leaving the spectrum intact.
pub(crate) fn convolve_energy<R: Real>(
    khat: &ComplexGrid<R>,
    table: &InfluenceTable<R>,
    pool: &ThreadPool,
) -> R {
    let dims = khat.dims;
    let plane_len = dims.complex_plane_len();
    let partials: Vec<f64> = pool.install(|| {
        khat.data
            .par_chunks(plane_len)
            .zip(table.theta.par_chunks(plane_len))
            .map(|(spectrum, weights)| plane_energy(dims, spectrum, weights))
            .collect()
    });
    R::of(0.5 * partials.iter().sum::<f64>())
}

/// Scales the spectrum by θ in place and returns the energy.
pub(crate) fn convolve_scale<R: Real>(
    khat: &mut ComplexGrid<R>,
    table: &InfluenceTable<R>,
    pool: &ThreadPool,
) -> R {
    let dims = khat.dims;
    let plane_len = dims.complex_plane_len();
    let partials: Vec<f64> = pool.install(|| {
        khat.data
            .par_chunks_mut(plane_len)
            .zip(table.theta.par_chunks(plane_len))
            .map(|(spectrum, weights)| {
                let energy = plane_energy(dims, spectrum, weights);
                for (value, &weight) in spectrum.iter_mut().zip(weights) {
                    *value = *value * weight;
                }
                energy
            })
            .collect()
    });
    R::of(0.5 * partials.iter().sum::<f64>())
}

/// As [`convolve_scale`], additionally accumulating the k-space virial
/// W_ab = Σ_k E_k (δ_ab + v_k·m_a·m_b/m²) in upper-triangular order
/// (xx, xy, xz, yy, yz, zz).
pub(crate) fn convolve_scale_virial<R: Real>(
    khat: &mut ComplexGrid<R>,
    table: &InfluenceTable<R>,
    lattice: &Lattice<R>,
    pool: &ThreadPool,
) -> (R, [R; 6]) {
    let dims = khat.dims;
    let half_c = dims.half_c();
    let plane_len = dims.complex_plane_len();
    let inverse = lattice_inverse_f64(lattice);

    let partials: Vec<(f64, [f64; 6])> = pool.install(|| {
        khat.data
            .par_chunks_mut(plane_len)
            .zip(
                table
                    .theta
                    .par_chunks(plane_len)
                    .zip(table.virial_factor.par_chunks(plane_len)),
            )
            .enumerate()
            .map(|(ka, (spectrum, (weights, virial_factors)))| {
                let fa = GridDims::signed_frequency(ka, dims.a) as f64;
                let mut energy = 0.0;
                let mut virial = [0.0f64; 6];
                for kb in 0..dims.b {
                    let fb = GridDims::signed_frequency(kb, dims.b) as f64;
                    for kz in 0..half_c {
                        let index = kb * half_c + kz;
                        let weight = weights[index].as_f64();
                        if weight == 0.0 {
                            continue;
                        }
                        let fc = kz as f64;
                        let multiplicity = dims.hermitian_multiplicity(kz) as f64;
                        let bin_energy = 0.5
                            * multiplicity
                            * weight
                            * spectrum[index].norm_sqr().as_f64();
                        energy += bin_energy;

                        let mut m = [0.0f64; 3];
                        let mut m_squared = 0.0;
                        for (m_j, row) in m.iter_mut().zip(&inverse) {
                            *m_j = row[0] * fa + row[1] * fb + row[2] * fc;
                            m_squared += *m_j * *m_j;
                        }
                        let factor = virial_factors[index].as_f64() / m_squared;
                        virial[0] += bin_energy * (1.0 + factor * m[0] * m[0]);
                        virial[1] += bin_energy * factor * m[0] * m[1];
                        virial[2] += bin_energy * factor * m[0] * m[2];
                        virial[3] += bin_energy * (1.0 + factor * m[1] * m[1]);
                        virial[4] += bin_energy * factor * m[1] * m[2];
                        virial[5] += bin_energy * (1.0 + factor * m[2] * m[2]);

                        spectrum[index] = spectrum[index] * weights[index];
                    }
                }
                (energy, virial)
            })
            .collect()
    });

    let mut energy = 0.0;
    let mut virial = [0.0f64; 6];
    for (plane_energy, plane_virial) in partials {
        energy += plane_energy;
        for (total, v) in virial.iter_mut().zip(plane_virial) {
            *total += v;
        }
    }
    (R::of(energy), virial.map(R::of))
}

fn plane_energy<R: Real>(
    dims: GridDims,
    spectrum: &[rustfft::num_complex::Complex<R>],
    weights: &[R],
) -> f64 {
    let half_c = dims.half_c();
    let mut acc = 0.0;
    for (i, (value, weight)) in spectrum.iter().zip(weights).enumerate() {
        let multiplicity = dims.hermitian_multiplicity(i % half_c) as f64;
        acc += multiplicity * weight.as_f64() * value.norm_sqr().as_f64();
    }
    acc
}

fn lattice_inverse_f64<R: Real>(lattice: &Lattice<R>) -> [[f64; 3]; 3] {
    let inverse = lattice.inverse();
    let mut out = [[0.0; 3]; 3];
    for (j, row) in out.iter_mut().enumerate() {
        for (i, value) in row.iter_mut().enumerate() {
            *value = inverse[(j, i)].as_f64();
        }
    }
    out
}

/// |Σⱼ M_p(j)·e^(2πi·j·k/N)|² for every bin of one axis; the inverse of the
/// per-axis product is the B-spline structure factor B(k).
fn spline_moduli(order: usize, extent: usize) -> Vec<f64> {
    let mut table = SplineTable::<f64>::new(order, 0);
    table.evaluate(0.0);
    let nodes = table.values();
    (0..extent)
        .map(|k| {
            let phase = TAU * k as f64 / extent as f64;
            let mut re = 0.0;
            let mut im = 0.0;
            for (j, &node) in nodes.iter().enumerate().skip(1) {
                re += node * (phase * j as f64).cos();
                im += node * (phase * j as f64).sin();
            }
            re * re + im * im
        })
        .collect()
}
