//! Single-process communicator

use super::traits::{Communicator, ReduceOp};
use crate::error::CommError;
use num_complex::Complex64;

/// Group of one rank; there are no peers to talk to
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialComm;

impl SerialComm {
    pub fn new() -> Self {
        Self
    }
}

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn broadcast(&self, root: usize, _data: &mut Vec<f64>) -> Result<(), CommError> {
        if root != 0 {
            return Err(CommError::InvalidPeer { peer: root, size: 1 });
        }
        Ok(())
    }

    fn isend(&mut self, peer: usize, _data: Vec<Complex64>) -> Result<(), CommError> {
        Err(CommError::InvalidPeer { peer, size: 1 })
    }

    fn irecv(&mut self, peer: usize, _len: usize) -> Result<(), CommError> {
        Err(CommError::InvalidPeer { peer, size: 1 })
    }

    fn wait_all(&mut self) -> Result<Vec<Vec<Complex64>>, CommError> {
        Ok(Vec::new())
    }

    fn reduce(&self, value: f64, _op: ReduceOp) -> Result<f64, CommError> {
        Ok(value)
    }

    fn abort(&self, reason: &str) {
        log::error!("Aborting: {}", reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_rank() {
        let mut comm = SerialComm::new();
        assert!(comm.is_root());
        assert_eq!(comm.reduce(2.5, ReduceOp::Max).unwrap(), 2.5);
        assert!(comm.wait_all().unwrap().is_empty());
        assert_eq!(
            comm.isend(1, Vec::new()).unwrap_err(),
            CommError::InvalidPeer { peer: 1, size: 1 }
        );
    }
}
