//! The miner coordinator: owns one worker pool, tracks the current block, and turns improving
//! solutions into submissions against the mining store.
//!
//! Grounded on the source miner's event loop (`select { solution, control, default: poll
//! settings }`), reworked as an explicit non-blocking poll loop over a `try_recv` solution
//! channel, a `try_recv` control channel, and a plain settings comparison — no `select!` macro
//! is pulled in since two non-blocking checks per iteration cover the same ground.

use crate::error::Result;
use crate::lxrpow::LxrPoW;
use crate::pool::WorkerPool;
use crate::store::MiningStore;
use crate::types::Submission;
use crate::worker::Control;
use chrono::Utc;
use log::info;
use std::collections::HashMap;
use std::sync::mpsc::{self, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Handle to a running coordinator thread.
pub struct CoordinatorHandle {
    pub miner_idx: u64,
    control: Sender<Control>,
    join: Option<JoinHandle<()>>,
}

impl CoordinatorHandle {
    /// Send the stop signal and join. Idempotent.
    pub fn stop(&mut self) {
        if let Some(handle) = self.join.take() {
            let _ = self.control.send(Control::Stop);
            let _ = handle.join();
        }
    }
}

impl Drop for CoordinatorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Register `token_url` as this coordinator's miner identity and spawn its thread.
pub fn spawn(
    token_url: String,
    instances: u32,
    seed: u64,
    lx: LxrPoW,
    store: Arc<MiningStore>,
) -> Result<CoordinatorHandle> {
    let miner_idx = store.register_miner(&token_url)?;
    let (control_tx, control_rx) = mpsc::channel::<Control>();

    let join = std::thread::spawn(move || {
        run(miner_idx, token_url, instances, seed, lx, store, control_rx)
    });

    Ok(CoordinatorHandle { miner_idx, control: control_tx, join: Some(join) })
}

fn run(
    miner_idx: u64,
    token_url: String,
    instances: u32,
    seed: u64,
    lx: LxrPoW,
    store: Arc<MiningStore>,
    control: mpsc::Receiver<Control>,
) {
    let mut current_settings = store.sync();
    let pool = WorkerPool::start(instances, seed, lx);
    pool.send_hash(current_settings.dn_hash);

    let mut best_grade: Option<u64> = None;
    let mut hash_counts: HashMap<u32, u64> = HashMap::new();
    let started = Instant::now();

    loop {
        match control.try_recv() {
            Ok(Control::Stop) => break,
            Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        if let Some(solution) = pool.try_recv_solution() {
            hash_counts.insert(solution.worker_id, solution.hash_count);

            let improved = best_grade.is_none_or(|best| solution.grade > best);
            if improved {
                best_grade = Some(solution.grade);

                let submission = Submission {
                    timestamp: Utc::now(),
                    dn_index: current_settings.dn_index,
                    dn_hash: current_settings.dn_hash,
                    block_index: current_settings.block_index,
                    nonce: solution.nonce,
                    miner_idx,
                    pow: solution.grade,
                };

                let total_hashes: u64 = hash_counts.values().sum();
                let elapsed = started.elapsed().as_secs_f64().max(0.001);
                info!(
                    "miner {miner_idx} worker {} block {} url={} dn={} nonce={:#018x} grade={:#018x} hashes={total_hashes} h/s={:.0}",
                    solution.worker_id,
                    current_settings.block_index,
                    truncate(&token_url, 25),
                    hex::encode(&current_settings.dn_hash[..4]),
                    solution.nonce,
                    solution.grade,
                    total_hashes as f64 / elapsed,
                );

                store.add_submission(submission);
            }
            continue;
        }

        match store.latest_settings() {
            Some(settings) if settings.dn_hash != current_settings.dn_hash => {
                current_settings = settings;
                pool.send_hash(current_settings.dn_hash);
                best_grade = None;
                hash_counts.clear();
            }
            _ => std::thread::sleep(Duration::from_millis(10)),
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
