//! Communication service used by the solver

use crate::error::CommError;
use num_complex::Complex64;

/// Reduction applied by [`Communicator::reduce`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Min,
    Max,
    Sum,
}

impl ReduceOp {
    /// Fold a set of values; NaN wins for `Max` so divergence is never hidden
    pub fn fold(self, values: impl IntoIterator<Item = f64>) -> f64 {
        let mut iter = values.into_iter();
        let Some(first) = iter.next() else {
            return match self {
                ReduceOp::Min => f64::INFINITY,
                ReduceOp::Max => f64::NEG_INFINITY,
                ReduceOp::Sum => 0.0,
            };
        };
        iter.fold(first, |acc, x| match self {
            ReduceOp::Sum => acc + x,
            ReduceOp::Min => acc.min(x),
            ReduceOp::Max => {
                if acc.is_nan() || x.is_nan() {
                    f64::NAN
                } else {
                    acc.max(x)
                }
            }
        })
    }
}

/// Point-to-point and collective primitives of a process group
///
/// Sends are buffered and never block. Receives are posted with
/// [`Communicator::irecv`] and completed together by
/// [`Communicator::wait_all`], which returns the buffers in posting order.
pub trait Communicator: Send {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    fn is_root(&self) -> bool {
        self.rank() == 0
    }

    /// Replace `data` on every rank with the values held by `root`
    fn broadcast(&self, root: usize, data: &mut Vec<f64>) -> Result<(), CommError>;

    fn isend(&mut self, peer: usize, data: Vec<Complex64>) -> Result<(), CommError>;

    /// Post a receive of exactly `len` values from `peer`
    fn irecv(&mut self, peer: usize, len: usize) -> Result<(), CommError>;

    /// Complete every posted receive
    fn wait_all(&mut self) -> Result<Vec<Vec<Complex64>>, CommError>;

    /// Reduce one value over the group; every rank gets the result
    fn reduce(&self, value: f64, op: ReduceOp) -> Result<f64, CommError>;

    /// Tear the whole group down; blocked ranks return `CommError::Aborted`
    fn abort(&self, reason: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold() {
        assert_eq!(ReduceOp::Sum.fold([1.0, 2.0, 3.5]), 6.5);
        assert_eq!(ReduceOp::Min.fold([4.0, -1.0]), -1.0);
        assert!(ReduceOp::Max.fold([1.0, f64::NAN, 3.0]).is_nan());
        assert_eq!(ReduceOp::Sum.fold(std::iter::empty()), 0.0);
    }
}
