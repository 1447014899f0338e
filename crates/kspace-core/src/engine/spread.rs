use super::grid::{GridDims, RealGrid};
use crate::core::matrix::Matrix;
use crate::core::multipole::components;
use crate::core::scalar::Real;
use crate::core::splines::SplineTable;
use num_traits::Float;
use rayon::prelude::*;
use rayon::ThreadPool;

/// Per-worker spline scratch: one table and one wrapped-index buffer per
/// grid axis, refilled in place for every atom.
pub(crate) struct AxisScratch<R: Real> {
    pub tables: [SplineTable<R>; 3],
    pub indices: [Vec<usize>; 3],
}

impl<R: Real> AxisScratch<R> {
    pub fn new(order: usize, derivs: usize) -> Self {
        Self {
            tables: [
                SplineTable::new(order, derivs),
                SplineTable::new(order, derivs),
                SplineTable::new(order, derivs),
            ],
            indices: [
                Vec::with_capacity(order),
                Vec::with_capacity(order),
                Vec::with_capacity(order),
            ],
        }
    }

    /// Evaluates the three axis tables at an atom's wrapped fractional
    /// position and records the wrapped grid indices of its support, with
    /// entry t of each index buffer holding the grid point ⌊s⌋ − t.
    pub fn prepare(&mut self, dims: GridDims, fractional: &[R]) {
        let extents = [dims.a, dims.b, dims.c];
        for axis in 0..3 {
            let extent = extents[axis];
            let scale = R::of(extent as f64);
            let mut s = fractional[axis] * scale;
            // u < 1 can still round up to the full extent.
            if s >= scale {
                s = R::zero();
            }
            let top = Float::floor(s);
            self.tables[axis].evaluate(s - top);

            let order = self.tables[axis].order();
            let top = top.as_f64() as isize;
            let indices = &mut self.indices[axis];
            indices.clear();
            for t in 0..order as isize {
                indices.push((top - t).rem_euclid(extent as isize) as usize);
            }
        }
    }
}

/// All Cartesian exponent triples of total order ≤ `angmom`, in the global
/// parameter ordering.
pub(crate) fn component_list(angmom: usize) -> Vec<[usize; 3]> {
    (0..=angmom).flat_map(components).collect()
}

/// Spreads grid-frame multipole coefficients onto the real grid.
///
/// Atoms are chunked in index order across the pool, each chunk writing a
/// private full-shape grid; the partial grids are then reduced plane by
/// plane in chunk order, so every cell accumulates its atoms in the same
/// order on every run with a given thread count. Atomic grid writes are
/// deliberately absent from this path.
pub(crate) fn spread<R: Real>(
    grid: &mut RealGrid<R>,
    order: usize,
    angmom: usize,
    fractional: &Matrix<R>,
    coefficients: &Matrix<R>,
    pool: &ThreadPool,
) {
    let dims = grid.dims;
    grid.fill_zero();
    let n_atoms = fractional.rows();
    if n_atoms == 0 {
        return;
    }

    let comps = component_list(angmom);
    let workers = pool.current_num_threads().max(1);
    let chunk = n_atoms.div_ceil(workers);
    let n_chunks = n_atoms.div_ceil(chunk);

    let partial_grids: Vec<Vec<R>> = pool.install(|| {
        (0..n_chunks)
            .into_par_iter()
            .map(|chunk_index| {
                let start = chunk_index * chunk;
                let end = (start + chunk).min(n_atoms);
                let mut local = vec![R::zero(); dims.real_len()];
                let mut scratch = AxisScratch::new(order, angmom);
                let mut pair_weights = vec![R::zero(); comps.len()];
                for atom in start..end {
                    scratch.prepare(dims, fractional.row(atom));
                    spread_atom(
                        &mut local,
                        dims,
                        order,
                        &comps,
                        coefficients.row(atom),
                        &scratch,
                        &mut pair_weights,
                    );
                }
                local
            })
            .collect()
    });

    let plane_len = dims.real_plane_len();
    pool.install(|| {
        grid.data
            .par_chunks_mut(plane_len)
            .enumerate()
            .for_each(|(plane, out)| {
                let offset = plane * plane_len;
                for partial in &partial_grids {
                    for (dst, &src) in out.iter_mut().zip(&partial[offset..offset + plane_len]) {
                        *dst += src;
                    }
                }
            })
    });
}

fn spread_atom<R: Real>(
    data: &mut [R],
    dims: GridDims,
    order: usize,
    comps: &[[usize; 3]],
    coefficients: &[R],
    scratch: &AxisScratch<R>,
    pair_weights: &mut [R],
) {
    let [table_a, table_b, table_c] = &scratch.tables;
    let [index_a, index_b, index_c] = &scratch.indices;

    for ia in 0..order {
        let row_base_a = index_a[ia] * dims.b;
        for ib in 0..order {
            for ((weight, comp), &coefficient) in
                pair_weights.iter_mut().zip(comps).zip(coefficients)
            {
                *weight = coefficient
                    * table_a.derivative(comp[0])[ia]
                    * table_b.derivative(comp[1])[ib];
            }
            let base = (row_base_a + index_b[ib]) * dims.c;
            for ic in 0..order {
                let mut value = R::zero();
                for (weight, comp) in pair_weights.iter().zip(comps) {
                    value += *weight * table_c.derivative(comp[2])[ic];
                }
                data[base + index_c[ic]] += value;
            }
        }
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

    fn single_atom_setup(u: [f64; 3]) -> (RealGrid<f64>, Matrix<f64>, Matrix<f64>) {
        let dims = GridDims::new(12, 12, 12);
        let grid = RealGrid::new(dims);
        let fractional = Matrix::from_array([u]);
        let charges = Matrix::from_array([[1.5]]);
        (grid, fractional, charges)
    }

    #[test]
    fn spread_conserves_total_charge() {
        let (mut grid, fractional, charges) = single_atom_setup([0.37, 0.81, 0.05]);
        spread(&mut grid, 6, 0, &fractional, &charges, &pool(1));
        let total: f64 = grid.data.iter().sum();
        assert!((total - 1.5).abs() < 1e-13);
    }

    #[test]
    fn spread_wraps_support_across_the_boundary() {
        let (mut grid, fractional, charges) = single_atom_setup([0.01, 0.5, 0.99]);
        spread(&mut grid, 6, 0, &fractional, &charges, &pool(1));
        let total: f64 = grid.data.iter().sum();
        assert!((total - 1.5).abs() < 1e-13);
        // Support along a must reach the top of the axis through wrapping.
        let dims = grid.dims;
        let mut wrapped = 0.0;
        for b in 0..dims.b {
            for c in 0..dims.c {
                wrapped += grid.data[dims.flat_index(11, b, c)].abs();
            }
        }
        assert!(wrapped > 0.0);
    }

    #[test]
    fn dipole_spread_sums_to_zero_net_charge() {
        let dims = GridDims::new(12, 12, 12);
        let mut grid = RealGrid::new(dims);
        let fractional = Matrix::from_array([[0.42, 0.17, 0.66]]);
        let coefficients = Matrix::from_array([[0.0, 1.0, -0.5, 0.25]]);
        spread(&mut grid, 6, 1, &fractional, &coefficients, &pool(1));
        let total: f64 = grid.data.iter().sum();
        assert!(total.abs() < 1e-12);
    }

    #[test]
    fn chunked_spreading_matches_the_serial_reduction() {
        let dims = GridDims::new(10, 10, 10);
        let n_atoms = 23;
        let mut fractional_rows = Vec::new();
        let mut charge_rows = Vec::new();
        for i in 0..n_atoms {
            let f = i as f64 / n_atoms as f64;
            fractional_rows.push(vec![f, (0.3 + 0.61 * f).fract(), (0.7 + 0.17 * f).fract()]);
            charge_rows.push(vec![if i % 2 == 0 { 1.0 } else { -1.0 }]);
        }
        let fractional = Matrix::from_rows(&fractional_rows).unwrap();
        let charges = Matrix::from_rows(&charge_rows).unwrap();

        let mut serial = RealGrid::new(dims);
        let mut threaded = RealGrid::new(dims);
        spread(&mut serial, 4, 0, &fractional, &charges, &pool(1));
        spread(&mut threaded, 4, 0, &fractional, &charges, &pool(4));
        for (a, b) in serial.data.iter().zip(&threaded.data) {
            assert!((a - b).abs() < 1e-13);
        }
    }
}
