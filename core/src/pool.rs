//! Fan a stream of block hashes out to `Instances` workers and multiplex their solutions back
//! into a single channel.

use crate::hashslot::HashSlot;
use crate::lxrpow::LxrPoW;
use crate::types::{BlockHash, Solution};
use crate::worker::{self, WorkerHandle};
use log::info;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

/// A pool of worker threads sharing one block-hash inbox and one solution outbox.
pub struct WorkerPool {
    inbox: Arc<HashSlot>,
    solutions: Receiver<Solution>,
    fan_out: Option<std::thread::JoinHandle<()>>,
    workers: Vec<WorkerHandle>,
}

impl WorkerPool {
    /// Spawn `instances` workers. Nonces are derived as `n_i = (seed ^ i) << 19 ^ (seed ^ i) >>
    /// 11`, guaranteeing disjoint starting points across instances.
    pub fn start(instances: u32, seed: u64, lx: LxrPoW) -> Self {
        let (solutions_tx, solutions_rx) = std::sync::mpsc::channel::<Solution>();
        let mut workers = Vec::with_capacity(instances as usize);

        for i in 0..instances {
            let base = seed ^ (i as u64);
            let nonce = (base << 19) ^ (base >> 11);
            workers.push(worker::spawn(i, nonce, lx.clone(), solutions_tx.clone()));
        }

        let pool_inbox = Arc::new(HashSlot::new());
        let worker_inboxes: Vec<Arc<HashSlot>> = workers.iter().map(|w| w.inbox.clone()).collect();

        let fan_out_inbox = pool_inbox.clone();
        let fan_out = std::thread::spawn(move || fan_out_loop(fan_out_inbox, worker_inboxes));

        info!("worker pool started with {instances} instances (seed {seed:#x})");

        WorkerPool { inbox: pool_inbox, solutions: solutions_rx, fan_out: Some(fan_out), workers }
    }

    /// Broadcast a new block hash to every worker.
    pub fn send_hash(&self, hash: BlockHash) {
        self.inbox.publish(hash);
    }

    /// Non-blocking poll for the next improving solution from any worker.
    pub fn try_recv_solution(&self) -> Option<Solution> {
        self.solutions.try_recv().ok()
    }

    pub fn recv_solution_timeout(&self, timeout: std::time::Duration) -> Option<Solution> {
        self.solutions.recv_timeout(timeout).ok()
    }

    /// Stop the fan-out thread and every worker. Idempotent.
    pub fn stop(&mut self) {
        self.inbox.close();
        if let Some(handle) = self.fan_out.take() {
            let _ = handle.join();
        }
        for worker in &mut self.workers {
            worker.stop();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Blocks for the next hash from the coordinator and republishes it to every worker's own
/// slot, which coalesces away anything a worker hasn't yet picked up.
fn fan_out_loop(pool_inbox: Arc<HashSlot>, worker_inboxes: Vec<Arc<HashSlot>>) {
    while let Some(hash) = pool_inbox.recv_blocking() {
        for inbox in &worker_inboxes {
            inbox.publish(hash);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytemap::{ByteMap, DEFAULT_PASSES};
    use crate::lxrpow::LxrPoWParams;

    fn lx() -> LxrPoW {
        let map = Arc::new(ByteMap::build(12, DEFAULT_PASSES, 0).unwrap());
        LxrPoW::new(LxrPoWParams { loops: 4, bits: 12, passes: DEFAULT_PASSES }, map).unwrap()
    }

    #[test]
    fn pool_reports_solutions_from_multiple_workers() {
        let mut pool = WorkerPool::start(3, 1, lx());
        pool.send_hash([9u8; 32]);

        let solution = pool.recv_solution_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(solution.block_hash, [9u8; 32]);

        pool.stop();
    }

    #[test]
    fn disjoint_nonce_seeds_across_instances() {
        // the derivation itself, independent of thread scheduling
        let seed = 0x1234_5678u64;
        let n0 = (seed ^ 0) << 19 ^ (seed ^ 0) >> 11;
        let n1 = (seed ^ 1) << 19 ^ (seed ^ 1) >> 11;
        assert_ne!(n0, n1);
    }
}
