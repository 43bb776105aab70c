//! In-process communicator: one rank per thread
//!
//! Point-to-point messages travel over channels, one inbox per rank.
//! Collectives are an all-gather behind a mutex and condition variable,
//! completed by the last rank to arrive.

use super::traits::{Communicator, ReduceOp};
use crate::error::CommError;
use num_complex::Complex64;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

const POLL: Duration = Duration::from_millis(20);

struct Message {
    source: usize,
    data: Vec<Complex64>,
}

struct Collective {
    generation: u64,
    arrived: usize,
    values: Vec<Vec<f64>>,
    result: Arc<Vec<Vec<f64>>>,
}

struct Shared {
    size: usize,
    aborted: AtomicBool,
    aborted_by: AtomicUsize,
    collective: Mutex<Collective>,
    cv: Condvar,
}

/// Factory for a group of [`ThreadComm`] ranks
pub struct ThreadGroup;

impl ThreadGroup {
    /// One communicator per rank; move each into its own thread
    pub fn create(size: usize) -> Vec<ThreadComm> {
        let shared = Arc::new(Shared {
            size,
            aborted: AtomicBool::new(false),
            aborted_by: AtomicUsize::new(usize::MAX),
            collective: Mutex::new(Collective {
                generation: 0,
                arrived: 0,
                values: vec![Vec::new(); size],
                result: Arc::new(Vec::new()),
            }),
            cv: Condvar::new(),
        });
        let (senders, inboxes): (Vec<Sender<Message>>, Vec<Receiver<Message>>) =
            (0..size).map(|_| mpsc::channel()).unzip();
        inboxes
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| ThreadComm {
                rank,
                shared: Arc::clone(&shared),
                senders: senders.clone(),
                inbox,
                stash: HashMap::new(),
                posted: Vec::new(),
            })
            .collect()
    }
}

/// One rank of an in-process group
pub struct ThreadComm {
    rank: usize,
    shared: Arc<Shared>,
    senders: Vec<Sender<Message>>,
    inbox: Receiver<Message>,
    /// Messages that arrived before their receive was waited on
    stash: HashMap<usize, VecDeque<Vec<Complex64>>>,
    posted: Vec<(usize, usize)>,
}

impl ThreadComm {
    fn aborted(&self) -> Option<CommError> {
        if self.shared.aborted.load(Ordering::SeqCst) {
            Some(CommError::Aborted {
                rank: self.shared.aborted_by.load(Ordering::SeqCst),
            })
        } else {
            None
        }
    }

    fn check_peer(&self, peer: usize) -> Result<(), CommError> {
        if peer >= self.shared.size {
            return Err(CommError::InvalidPeer {
                peer,
                size: self.shared.size,
            });
        }
        Ok(())
    }

    fn poisoned(&self) -> CommError {
        CommError::Aborted { rank: self.rank }
    }

    /// Every rank contributes `values`; every rank gets all contributions
    fn all_gather(&self, values: Vec<f64>) -> Result<Arc<Vec<Vec<f64>>>, CommError> {
        let shared = &self.shared;
        let mut st = shared.collective.lock().map_err(|_| self.poisoned())?;
        if let Some(err) = self.aborted() {
            return Err(err);
        }
        let generation = st.generation;
        st.values[self.rank] = values;
        st.arrived += 1;
        if st.arrived == shared.size {
            let values = std::mem::replace(&mut st.values, vec![Vec::new(); shared.size]);
            st.result = Arc::new(values);
            st.arrived = 0;
            st.generation += 1;
            shared.cv.notify_all();
            return Ok(Arc::clone(&st.result));
        }
        loop {
            st = shared
                .cv
                .wait_timeout(st, POLL)
                .map_err(|_| self.poisoned())?
                .0;
            if st.generation != generation {
                return Ok(Arc::clone(&st.result));
            }
            if let Some(err) = self.aborted() {
                return Err(err);
            }
        }
    }

    fn receive_from(&mut self, peer: usize) -> Result<Vec<Complex64>, CommError> {
        if let Some(data) = self.stash.get_mut(&peer).and_then(|q| q.pop_front()) {
            return Ok(data);
        }
        loop {
            match self.inbox.recv_timeout(POLL) {
                Ok(msg) if msg.source == peer => return Ok(msg.data),
                Ok(msg) => self.stash.entry(msg.source).or_default().push_back(msg.data),
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(err) = self.aborted() {
                        return Err(err);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Err(CommError::Disconnected { peer }),
            }
        }
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn broadcast(&self, root: usize, data: &mut Vec<f64>) -> Result<(), CommError> {
        self.check_peer(root)?;
        let mine = if self.rank == root { data.clone() } else { Vec::new() };
        let all = self.all_gather(mine)?;
        data.clone_from(&all[root]);
        Ok(())
    }

    fn isend(&mut self, peer: usize, data: Vec<Complex64>) -> Result<(), CommError> {
        self.check_peer(peer)?;
        if let Some(err) = self.aborted() {
            return Err(err);
        }
        self.senders[peer]
            .send(Message {
                source: self.rank,
                data,
            })
            .map_err(|_| CommError::Disconnected { peer })
    }

    fn irecv(&mut self, peer: usize, len: usize) -> Result<(), CommError> {
        self.check_peer(peer)?;
        self.posted.push((peer, len));
        Ok(())
    }

    fn wait_all(&mut self) -> Result<Vec<Vec<Complex64>>, CommError> {
        let posted = std::mem::take(&mut self.posted);
        let mut out = Vec::with_capacity(posted.len());
        for (peer, len) in posted {
            let data = self.receive_from(peer)?;
            if data.len() != len {
                return Err(CommError::BufferSize {
                    peer,
                    expected: len,
                    actual: data.len(),
                });
            }
            out.push(data);
        }
        Ok(out)
    }

    fn reduce(&self, value: f64, op: ReduceOp) -> Result<f64, CommError> {
        let all = self.all_gather(vec![value])?;
        Ok(op.fold(all.iter().filter_map(|v| v.first().copied())))
    }

    fn abort(&self, reason: &str) {
        log::error!("Rank {} aborting the process group: {}", self.rank, reason);
        if !self.shared.aborted.swap(true, Ordering::SeqCst) {
            self.shared.aborted_by.store(self.rank, Ordering::SeqCst);
        }
        // wake ranks blocked in a collective
        if let Ok(_guard) = self.shared.collective.lock() {
            self.shared.cv.notify_all();
        }
    }
}

impl Drop for ThreadComm {
    /// A rank unwinding from a panic takes the group down with it; its peers
    /// would otherwise wait forever, since every rank holds all senders
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.abort("rank thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_ring_exchange_and_reduce() {
        let comms = ThreadGroup::create(4);
        let results: Vec<(Vec<Complex64>, f64)> = thread::scope(|scope| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|mut comm| {
                    scope.spawn(move || {
                        let (rank, size) = (comm.rank(), comm.size());
                        let next = (rank + 1) % size;
                        let prev = (rank + size - 1) % size;
                        comm.isend(next, vec![Complex64::new(rank as f64, 1.0); 2]).unwrap();
                        comm.irecv(prev, 2).unwrap();
                        let got = comm.wait_all().unwrap().remove(0);
                        let sum = comm.reduce(rank as f64, ReduceOp::Sum).unwrap();
                        (got, sum)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for (rank, (got, sum)) in results.iter().enumerate() {
            assert_eq!(got[0].re, ((rank + 3) % 4) as f64);
            assert_eq!(*sum, 6.0);
        }
    }

    #[test]
    fn test_out_of_order_messages_are_stashed() {
        let mut comms = ThreadGroup::create(3);
        let mut c2 = comms.pop().unwrap();
        let mut c1 = comms.pop().unwrap();
        let mut c0 = comms.pop().unwrap();
        c2.isend(0, vec![Complex64::new(2.0, 0.0)]).unwrap();
        c1.isend(0, vec![Complex64::new(1.0, 0.0); 3]).unwrap();
        c0.irecv(1, 3).unwrap();
        c0.irecv(2, 1).unwrap();
        let got = c0.wait_all().unwrap();
        assert_eq!(got[0].len(), 3);
        assert_eq!(got[1][0].re, 2.0);
    }

    #[test]
    fn test_buffer_size_mismatch() {
        let mut comms = ThreadGroup::create(2);
        let mut c1 = comms.pop().unwrap();
        let mut c0 = comms.pop().unwrap();
        c1.isend(0, vec![Complex64::new(0.0, 0.0); 4]).unwrap();
        c0.irecv(1, 5).unwrap();
        assert_eq!(
            c0.wait_all().unwrap_err(),
            CommError::BufferSize {
                peer: 1,
                expected: 5,
                actual: 4
            }
        );
    }

    #[test]
    fn test_abort_wakes_blocked_ranks() {
        let comms = ThreadGroup::create(3);
        let errors: Vec<Option<CommError>> = thread::scope(|scope| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|mut comm| {
                    scope.spawn(move || {
                        if comm.rank() == 2 {
                            thread::sleep(Duration::from_millis(50));
                            comm.abort("test");
                            return None;
                        }
                        if comm.rank() == 0 {
                            comm.irecv(2, 1).unwrap();
                            return comm.wait_all().err();
                        }
                        comm.reduce(1.0, ReduceOp::Max).err()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(errors[0], Some(CommError::Aborted { rank: 2 }));
        assert_eq!(errors[1], Some(CommError::Aborted { rank: 2 }));
    }

    #[test]
    fn test_panicking_rank_aborts_group() {
        let comms = ThreadGroup::create(3);
        let errors: Vec<Option<Option<CommError>>> = thread::scope(|scope| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|mut comm| {
                    scope.spawn(move || {
                        match comm.rank() {
                            1 => panic!("rank 1 fails"),
                            0 => {
                                comm.irecv(1, 1).unwrap();
                                comm.wait_all().err()
                            }
                            _ => comm.reduce(1.0, ReduceOp::Sum).err(),
                        }
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().ok()).collect()
        });
        assert_eq!(errors[0], Some(Some(CommError::Aborted { rank: 1 })));
        assert_eq!(errors[1], None);
        assert_eq!(errors[2], Some(Some(CommError::Aborted { rank: 1 })));
    }

    #[test]
    fn test_broadcast() {
        let comms = ThreadGroup::create(2);
        let values: Vec<Vec<f64>> = thread::scope(|scope| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    scope.spawn(move || {
                        let mut data = if comm.rank() == 1 { vec![4.0, 5.0] } else { Vec::new() };
                        comm.broadcast(1, &mut data).unwrap();
                        data
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(values[0], vec![4.0, 5.0]);
    }
}
