//! A single nonce-search thread.
//!
//! Grounded on the source hasher's loop (`hash[:] <- BlockHashes; select { hash, control,
//! default: grind }`): a worker blocks once for its first block hash, then spins grinding
//! nonces, checking its inbox and control channel on every iteration without blocking.

use crate::hashslot::HashSlot;
use crate::lxrpow::{LxrPoW, INTERESTING_FLOOR};
use crate::types::Solution;
use log::debug;
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::time::Instant;

/// Control messages sent down a worker's control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Stop,
}

/// Handle to a running worker thread: its inbox for new block hashes, and the join handle to
/// wait for its exit once stopped.
pub struct WorkerHandle {
    pub id: u32,
    pub inbox: Arc<HashSlot>,
    control: Sender<Control>,
    join: Option<std::thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Send the stop signal and join the thread. Idempotent: calling it twice is a no-op the
    /// second time.
    pub fn stop(&mut self) {
        if let Some(handle) = self.join.take() {
            let _ = self.control.send(Control::Stop);
            self.inbox.close();
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawn a worker thread. `nonce` is the worker's starting point in its disjoint nonce stream
/// (see [`crate::pool::WorkerPool`] for how the pool derives it per instance).
pub fn spawn(id: u32, nonce: u64, lx: LxrPoW, solutions: Sender<Solution>) -> WorkerHandle {
    let inbox = Arc::new(HashSlot::new());
    let (control_tx, control_rx) = std::sync::mpsc::channel::<Control>();

    let worker_inbox = inbox.clone();
    let join = std::thread::spawn(move || run(id, nonce, lx, worker_inbox, control_rx, solutions));

    WorkerHandle { id, inbox, control: control_tx, join: Some(join) }
}

fn run(
    id: u32,
    mut nonce: u64,
    lx: LxrPoW,
    inbox: Arc<HashSlot>,
    control: Receiver<Control>,
    solutions: Sender<Solution>,
) {
    // Block for the first hash: never grade against an undefined block.
    let mut current_hash = match inbox.recv_blocking() {
        Some(hash) => hash,
        None => return, // closed before ever publishing a hash
    };
    let mut best_grade: u64 = 0;
    let mut hash_count: u64 = 0;

    loop {
        if let Some(hash) = inbox.try_recv() {
            current_hash = hash;
            best_grade = 0;
            continue;
        }

        match control.try_recv() {
            Ok(Control::Stop) => {
                debug!("worker {id} stopping");
                return;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => return,
        }

        hash_count += 1;
        nonce ^= (nonce << 17) ^ (nonce >> 9) ^ hash_count;

        let grade = lx.grade(&current_hash, nonce);
        if grade > best_grade || grade > INTERESTING_FLOOR {
            best_grade = grade;
            let solution = Solution {
                block_hash: current_hash,
                nonce,
                grade,
                worker_id: id,
                hash_count,
                timestamp: Instant::now(),
            };
            if solutions.send(solution).is_err() {
                return; // pool's outbox is gone; nothing left to report to
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytemap::{ByteMap, DEFAULT_PASSES};
    use crate::lxrpow::{LxrPoW, LxrPoWParams};
    use std::sync::Arc as StdArc;

    fn lx() -> LxrPoW {
        let map = StdArc::new(ByteMap::build(12, DEFAULT_PASSES, 0).unwrap());
        LxrPoW::new(LxrPoWParams { loops: 4, bits: 12, passes: DEFAULT_PASSES }, map).unwrap()
    }

    #[test]
    fn emits_at_least_one_solution_then_stops_cleanly() {
        let (sol_tx, sol_rx) = std::sync::mpsc::channel();
        let mut handle = spawn(0, 7, lx(), sol_tx);
        handle.inbox.publish([1u8; 32]);

        let solution = sol_rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(solution.worker_id, 0);
        assert_eq!(solution.block_hash, [1u8; 32]);

        handle.stop();
        handle.stop(); // idempotent
    }

    #[test]
    fn new_hash_resets_best_grade_tracking() {
        let (sol_tx, sol_rx) = std::sync::mpsc::channel();
        let mut handle = spawn(1, 99, lx(), sol_tx);
        handle.inbox.publish([2u8; 32]);
        let _ = sol_rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();

        handle.inbox.publish([3u8; 32]);
        let second = sol_rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(second.block_hash, [3u8; 32]);

        handle.stop();
    }
}
