//! Canonical Cartesian multipole components and their conversion into the
//! fractional (grid) frame.
//!
//! A parameter vector of angular momentum L holds one coefficient per
//! Cartesian component of total order ≤ L, ordered as
//! 1, x, y, z, xx, xy, xz, yy, yz, zz, … — within each order the exponent
//! triples are enumerated with the x power descending, then the y power.
//! The coefficients are derivative coefficients with respect to the atom
//! position: the generalized density an atom spreads is
//! ρ(x) = Σ_t c_t (∂/∂x_atom)ᵗ δ(x − x_atom), so a physical dipole μ enters
//! as +μ.
//!
//! Spreading and probing work in grid coordinates, so a Cartesian derivative
//! Dˣⱼ must be rewritten as Σ_α S_jα D^w_α with S the grid-scaled
//! Cartesian→fractional 3×3. Expanding the resulting products of linear
//! forms once per lattice change yields a block-diagonal transformation
//! matrix applied per atom.

use super::matrix::Matrix;
use super::scalar::Real;
use std::collections::HashMap;

/// Number of Cartesian components of total order ≤ `angmom`:
/// (L+1)(L+2)(L+3)/6.
pub fn n_cartesian(angmom: usize) -> usize {
    (angmom + 1) * (angmom + 2) * (angmom + 3) / 6
}

/// Number of components of exactly the given total order: (k+1)(k+2)/2.
pub fn n_components(order: usize) -> usize {
    (order + 1) * (order + 2) / 2
}

/// Exponent triples of the given total order, in canonical ordering.
pub fn components(order: usize) -> Vec<[usize; 3]> {
    let mut out = Vec::with_capacity(n_components(order));
    for a in (0..=order).rev() {
        for b in (0..=order - a).rev() {
            out.push([a, b, order - a - b]);
        }
    }
    out
}

/// Position of an exponent triple in the global component list.
pub fn component_index(component: [usize; 3]) -> usize {
    let [a, b, c] = component;
    let order = a + b + c;
    let offset = if order == 0 { 0 } else { n_cartesian(order - 1) };
    let beyond_a = order - a;
    offset + beyond_a * (beyond_a + 1) / 2 + (beyond_a - b)
}

/// Block-diagonal Cartesian→fractional coefficient transform for all orders
/// up to `max_order`, built from the grid-scaled Cartesian→fractional 3×3.
///
/// Rebuilt only when the lattice, the grid dimensions, or the requested
/// maximum order change.
#[derive(Debug, Clone)]
pub struct FractionalTransform<R: Real> {
    max_order: usize,
    matrix: Matrix<R>,
}

impl<R: Real> FractionalTransform<R> {
    /// `scaled_inverse[j][α]` must be ∂w_α/∂x_j, i.e. the lattice inverse
    /// with each column scaled by the grid dimension of its axis.
    pub fn build(scaled_inverse: &Matrix<R>, max_order: usize) -> Self {
        debug_assert_eq!(scaled_inverse.rows(), 3);
        debug_assert_eq!(scaled_inverse.cols(), 3);

        let n = n_cartesian(max_order);
        let mut matrix = Matrix::zeros(n, n);
        for order in 0..=max_order {
            for source in components(order) {
                let column = component_index(source);
                for (target, coefficient) in expand(scaled_inverse, source) {
                    matrix[(component_index(target), column)] = coefficient;
                }
            }
        }
        Self { max_order, matrix }
    }

    pub fn max_order(&self) -> usize {
        self.max_order
    }

    /// Converts a Cartesian coefficient vector into grid-frame coefficients.
    /// `input` and `output` have length `n_cartesian(L)` for some L ≤ the
    /// transform's maximum order.
    pub fn apply(&self, input: &[R], output: &mut [R]) {
        debug_assert_eq!(input.len(), output.len());
        debug_assert!(input.len() <= self.matrix.cols());
        let n = input.len();
        for (r, out) in output.iter_mut().enumerate() {
            let row = &self.matrix.row(r)[..n];
            *out = row.iter().zip(input).map(|(&m, &v)| m * v).sum();
        }
    }

    /// Converts a grid-frame derivative tensor (e.g. probed potential
    /// derivatives) back into Cartesian derivatives; this is the transposed
    /// action of [`apply`](Self::apply).
    pub fn apply_transposed(&self, input: &[R], output: &mut [R]) {
        debug_assert_eq!(input.len(), output.len());
        for (c, out) in output.iter_mut().enumerate() {
            let mut acc = R::zero();
            for (r, &v) in input.iter().enumerate() {
                acc = acc + self.matrix[(r, c)] * v;
            }
            *out = acc;
        }
    }
}

/// Expands Πⱼ (Σ_α S_jα D_α)^(tⱼ) into grid-frame components of the same
/// total order.
fn expand<R: Real>(s: &Matrix<R>, source: [usize; 3]) -> HashMap<[usize; 3], R> {
    let mut poly: HashMap<[usize; 3], R> = HashMap::new();
    poly.insert([0, 0, 0], R::one());
    for (j, &power) in source.iter().enumerate() {
        for _ in 0..power {
            let mut next: HashMap<[usize; 3], R> = HashMap::with_capacity(poly.len() * 3);
            for (&exponents, &coefficient) in &poly {
                for axis in 0..3 {
                    let factor = s[(j, axis)];
                    if factor == R::zero() {
                        continue;
                    }
                    let mut grown = exponents;
                    grown[axis] += 1;
                    *next.entry(grown).or_insert_with(R::zero) += coefficient * factor;
                }
            }
            poly = next;
        }
    }
    poly
}
