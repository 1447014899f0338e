//! Cardinal B-spline values and derivatives at fractional grid offsets.
//!
//! For spline order p and offset w ∈ [0, 1) the table holds the p
//! consecutive weights M_p(w + i), i = 0..p−1, that an atom contributes to
//! its p surrounding grid points along one axis, together with derivative
//! rows up to a configurable order. Values are built by the order-elevation
//! recurrence
//!
//! M_k(x) = (x·M_{k−1}(x) + (k − x)·M_{k−1}(x − 1)) / (k − 1)
//!
//! seeded at the box function M₁, and the d-th derivative row follows from
//! M_p⁽ᵈ⁾(x) = Σⱼ (−1)ʲ C(d, j) M_{p−d}(x − j).

use super::scalar::Real;

/// Reusable per-axis table of spline values and derivative rows.
///
/// One table per axis lives in each worker's scratch during spreading and
/// probing; `evaluate` refills it in place for every atom without
/// reallocating.
#[derive(Debug, Clone)]
pub struct SplineTable<R: Real> {
    order: usize,
    derivs: usize,
    /// (derivs + 1) rows of `order` entries; row d is the d-th derivative.
    rows: Vec<R>,
    /// Zero-padded values of M_{order−d}(w + i) for each derivative order d.
    snapshots: Vec<R>,
    work: Vec<R>,
}

impl<R: Real> SplineTable<R> {
    /// A table for splines of the given order carrying `derivs` derivative
    /// rows. Requires `order ≥ 2` and `derivs < order`, which the engine
    /// validates before any table is built.
    pub fn new(order: usize, derivs: usize) -> Self {
        debug_assert!(order >= 2);
        debug_assert!(derivs < order);
        Self {
            order,
            derivs,
            rows: vec![R::zero(); (derivs + 1) * order],
            snapshots: vec![R::zero(); (derivs + 1) * order],
            work: vec![R::zero(); order],
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn derivs(&self) -> usize {
        self.derivs
    }

    /// Recomputes all rows for the fractional offset `w ∈ [0, 1)`.
    pub fn evaluate(&mut self, w: R) {
        let p = self.order;
        let d = self.derivs;

        self.work.fill(R::zero());
        self.work[0] = R::one();
        if d >= p - 1 {
            // The box-function row backs the (p−1)-th derivative.
            self.snapshots[(p - 1) * p..p * p].copy_from_slice(&self.work);
        }

        for k in 2..=p {
            let km1 = R::of((k - 1) as f64);
            let kf = R::of(k as f64);
            for i in (0..k).rev() {
                let x = w + R::of(i as f64);
                let left = x * self.work[i];
                let right = if i > 0 {
                    (kf - x) * self.work[i - 1]
                } else {
                    R::zero()
                };
                self.work[i] = (left + right) / km1;
            }
            if k < p && k + d >= p {
                let r = p - k;
                self.snapshots[r * p..(r + 1) * p].copy_from_slice(&self.work);
            }
        }
        self.rows[..p].copy_from_slice(&self.work);

        // Derivative rows as signed binomial combinations of the lower-order
        // snapshots.
        for r in 1..=d {
            let snap = &self.snapshots[r * p..(r + 1) * p];
            let mut binomial = vec![0.0f64; r + 1];
            binomial[0] = 1.0;
            for j in 1..=r {
                binomial[j] = binomial[j - 1] * (r - j + 1) as f64 / j as f64;
            }
            for i in 0..p {
                let mut acc = R::zero();
                for (j, &coeff) in binomial.iter().enumerate() {
                    if j > i {
                        break;
                    }
                    let sign = if j % 2 == 0 { 1.0 } else { -1.0 };
                    acc = acc + R::of(sign * coeff) * snap[i - j];
                }
                self.rows[r * p + i] = acc;
            }
        }
    }

    /// Spline values M_p(w + i); entry i weights grid point ⌊s⌋ − i.
    pub fn values(&self) -> &[R] {
        &self.rows[..self.order]
    }

    /// The d-th derivative row; d = 0 returns the values.
    pub fn derivative(&self, d: usize) -> &[R] {
        &self.rows[d * self.order..(d + 1) * self.order]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_at(order: usize, derivs: usize, w: f64) -> SplineTable<f64> {
        let mut table = SplineTable::new(order, derivs);
        table.evaluate(w);
        table
    }

    #[test]
    fn order_two_is_linear_interpolation() {
        let table = table_at(2, 0, 0.3);
        assert!((table.values()[0] - 0.3).abs() < 1e-15);
        assert!((table.values()[1] - 0.7).abs() < 1e-15);
    }

    #[test]
    fn cubic_node_values_match_the_classical_ones() {
        let table = table_at(4, 0, 0.0);
        let v = table.values();
        assert!((v[0] - 0.0).abs() < 1e-15);
        assert!((v[1] - 1.0 / 6.0).abs() < 1e-15);
        assert!((v[2] - 2.0 / 3.0).abs() < 1e-15);
        assert!((v[3] - 1.0 / 6.0).abs() < 1e-15);
    }

    #[test]
    fn weights_sum_to_one_for_all_orders_and_offsets() {
        for &order in &[4usize, 6, 8] {
            for &w in &[0.0, 0.25, 0.5, 0.999] {
                let table = table_at(order, 0, w);
                let sum: f64 = table.values().iter().sum();
                assert!(
                    (sum - 1.0).abs() < 1e-14,
                    "partition of unity violated for p={order}, w={w}: {sum}"
                );
            }
        }
    }

    #[test]
    fn derivative_rows_sum_to_zero() {
        for &order in &[4usize, 6, 8] {
            for &w in &[0.1, 0.5, 0.9] {
                let table = table_at(order, 2, w);
                for d in 1..=2 {
                    let sum: f64 = table.derivative(d).iter().sum();
                    assert!(
                        sum.abs() < 1e-13,
                        "derivative sum nonzero for p={order}, d={d}, w={w}: {sum}"
                    );
                }
            }
        }
    }

    #[test]
    fn first_derivative_matches_finite_differences() {
        let h = 1e-6;
        for &w in &[0.2, 0.5, 0.8] {
            let mut plus = SplineTable::<f64>::new(6, 0);
            let mut minus = SplineTable::<f64>::new(6, 0);
            plus.evaluate(w + h);
            minus.evaluate(w - h);
            let table = table_at(6, 1, w);
            for i in 0..6 {
                let fd = (plus.values()[i] - minus.values()[i]) / (2.0 * h);
                assert!(
                    (table.derivative(1)[i] - fd).abs() < 1e-8,
                    "derivative mismatch at i={i}, w={w}"
                );
            }
        }
    }

    #[test]
    fn second_derivative_matches_finite_differences() {
        let h = 1e-4;
        let w = 0.4;
        let mut plus = SplineTable::<f64>::new(6, 0);
        let mut minus = SplineTable::<f64>::new(6, 0);
        let mut center = SplineTable::<f64>::new(6, 0);
        plus.evaluate(w + h);
        minus.evaluate(w - h);
        center.evaluate(w);
        let table = table_at(6, 2, w);
        for i in 0..6 {
            let fd = (plus.values()[i] - 2.0 * center.values()[i] + minus.values()[i]) / (h * h);
            assert!((table.derivative(2)[i] - fd).abs() < 1e-6);
        }
    }

    #[test]
    fn reevaluation_overwrites_previous_state() {
        let mut table = SplineTable::<f64>::new(6, 1);
        table.evaluate(0.9);
        let stale: Vec<f64> = table.values().to_vec();
        table.evaluate(0.1);
        table.evaluate(0.9);
        for (a, b) in table.values().iter().zip(&stale) {
            assert!((a - b).abs() < 1e-15);
        }
    }
}
