use super::grid::RealGrid;
use super::spread::{component_list, AxisScratch};
use crate::core::matrix::{Matrix, MatrixViewMut};
use crate::core::multipole::{component_index, n_cartesian, FractionalTransform};
use crate::core::scalar::Real;
use rayon::prelude::*;
use rayon::ThreadPool;

/// Accumulates the potential-derivative tensor of one atom from the
/// convolved grid: entry t is the grid-frame derivative Dᵗφ at the atom
/// position, for every component of total order ≤ the scratch's derivative
/// capacity.
fn gather_derivatives<R: Real>(
    grid: &RealGrid<R>,
    order: usize,
    comps: &[[usize; 3]],
    scratch: &AxisScratch<R>,
    pair_weights: &mut [R],
    phi: &mut [R],
) {
    let dims = grid.dims;
    let [table_a, table_b, table_c] = &scratch.tables;
    let [index_a, index_b, index_c] = &scratch.indices;

    phi.fill(R::zero());
    for ia in 0..order {
        let row_base_a = index_a[ia] * dims.b;
        for ib in 0..order {
            for (weight, comp) in pair_weights.iter_mut().zip(comps) {
                *weight =
                    table_a.derivative(comp[0])[ia] * table_b.derivative(comp[1])[ib];
            }
            let base = (row_base_a + index_b[ib]) * dims.c;
            for ic in 0..order {
                let value = grid.data[base + index_c[ic]];
                for ((out, weight), comp) in phi.iter_mut().zip(pair_weights.iter()).zip(comps) {
                    *out += value * *weight * table_c.derivative(comp[2])[ic];
                }
            }
        }
    }
}

/// Back-interpolates forces onto the caller's force matrix (accumulating,
/// never overwriting). Per-atom outputs are independent, so atoms are
/// partitioned across the pool with no reduction step.
#[allow(clippy::too_many_arguments)]
pub(crate) fn probe_forces<R: Real>(
    grid: &RealGrid<R>,
    order: usize,
    angmom: usize,
    fractional: &Matrix<R>,
    coefficients: &Matrix<R>,
    scaled_inverse: &Matrix<R>,
    forces: &mut MatrixViewMut<'_, R>,
    pool: &ThreadPool,
) {
    let dims = grid.dims;
    let derivs = angmom + 1;
    let comps = component_list(derivs);
    let n_source = n_cartesian(angmom);

    // Index of component t + e_α for every source component and axis.
    let mut raised = Vec::with_capacity(n_source * 3);
    for comp in &comps[..n_source] {
        for axis in 0..3 {
            let mut lifted = *comp;
            lifted[axis] += 1;
            raised.push(component_index(lifted));
        }
    }

    let mut frame = [[R::zero(); 3]; 3];
    for (j, row) in frame.iter_mut().enumerate() {
        for (alpha, value) in row.iter_mut().enumerate() {
            *value = scaled_inverse[(j, alpha)];
        }
    }

    pool.install(|| {
        forces
            .data_mut()
            .par_chunks_mut(3)
            .zip(
                fractional
                    .data()
                    .par_chunks(3)
                    .zip(coefficients.data().par_chunks(n_source)),
            )
            .for_each_init(
                || {
                    (
                        AxisScratch::<R>::new(order, derivs),
                        vec![R::zero(); comps.len()],
                        vec![R::zero(); comps.len()],
                    )
                },
                |(scratch, pair_weights, phi), (force_row, (atom_fractional, atom_coeffs))| {
                    scratch.prepare(dims, atom_fractional);
                    gather_derivatives(grid, order, &comps, scratch, pair_weights, phi);

                    let mut gradient = [R::zero(); 3];
                    for (t, &coefficient) in atom_coeffs.iter().enumerate() {
                        for (alpha, slot) in gradient.iter_mut().enumerate() {
                            *slot += coefficient * phi[raised[t * 3 + alpha]];
                        }
                    }
                    for (j, out) in force_row.iter_mut().enumerate() {
                        let mut force = R::zero();
                        for (alpha, &g) in gradient.iter().enumerate() {
                            force += frame[j][alpha] * g;
                        }
                        *out -= force;
                    }
                },
            )
    });
}

/// Potential (and Cartesian derivatives up to the transform's order) at
/// arbitrary probe points, written row-by-row into `out`.
pub(crate) fn probe_potential<R: Real>(
    grid: &RealGrid<R>,
    order: usize,
    deriv_level: usize,
    probe_fractional: &Matrix<R>,
    transform: &FractionalTransform<R>,
    out: &mut Matrix<R>,
    pool: &ThreadPool,
) {
    let dims = grid.dims;
    let comps = component_list(deriv_level);
    let n_out = n_cartesian(deriv_level);

    pool.install(|| {
        out.data_mut()
            .par_chunks_mut(n_out)
            .zip(probe_fractional.data().par_chunks(3))
            .for_each_init(
                || {
                    (
                        AxisScratch::<R>::new(order, deriv_level),
                        vec![R::zero(); comps.len()],
                        vec![R::zero(); comps.len()],
                    )
                },
                |(scratch, pair_weights, phi), (out_row, probe)| {
                    scratch.prepare(dims, probe);
                    gather_derivatives(grid, order, &comps, scratch, pair_weights, phi);
                    transform.apply_transposed(phi, out_row);
                },
            )
    });
}
