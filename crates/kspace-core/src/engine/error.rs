use crate::core::lattice::LatticeError;
use crate::core::matrix::MatrixError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PmeError {
    #[error("invalid {name}: {message}")]
    InvalidParameter {
        name: &'static str,
        message: String,
    },

    #[error("grid dimension {axis} is {dim}, below the spline order {order}")]
    GridBelowSplineOrder {
        axis: char,
        dim: usize,
        order: usize,
    },

    #[error(
        "spline order {order} cannot supply order-{required} derivatives \
         (angular momentum {angmom})"
    )]
    SplineOrderTooLow {
        order: usize,
        required: usize,
        angmom: usize,
    },

    #[error("lattice vectors have not been set")]
    LatticeNotSet,

    #[error(
        "{matrix} matrix is {rows}x{cols}, expected {expected_rows}x{expected_cols}"
    )]
    ShapeMismatch {
        matrix: &'static str,
        rows: usize,
        cols: usize,
        expected_rows: usize,
        expected_cols: usize,
    },

    #[error("thread pool construction failed: {0}")]
    ThreadPool(String),

    #[error("fft execution failed: {0}")]
    Fft(String),

    #[error(transparent)]
    Matrix(#[from] MatrixError),

    #[error(transparent)]
    Lattice(#[from] LatticeError),
}
