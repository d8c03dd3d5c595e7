//! Block-close detection, submission validation, and difficulty adjustment.
//!
//! Grounded on the source validator's tick loop (`Sync`, scan submissions descending by grade,
//! build next settings, `AdjustDifficulty`), with the difficulty formula reproduced exactly:
//! small-space two's-complement scaling damped by half the relative block-time error.

use crate::lxrpow::LxrPoW;
use crate::store::MiningStore;
use crate::types::{Settings, Submission};
use crate::worker::Control;
use chrono::{DateTime, Utc};
use log::info;
use sha2::{Digest, Sha256};
use std::sync::mpsc::{self, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Source of the next `dn_index`, decoupled from the validator loop so a real upstream feed
/// could stand in for the simulation constant used here.
pub trait DnFeed: Send {
    fn next_dn_index(&mut self, current: u64) -> u64;
}

/// Advances `dn_index` by a fixed step each block, standing in for a real consensus feed.
pub struct SimulatedDnFeed {
    step: u64,
}

impl SimulatedDnFeed {
    pub fn new(step: u64) -> Self {
        SimulatedDnFeed { step }
    }
}

impl Default for SimulatedDnFeed {
    fn default() -> Self {
        SimulatedDnFeed::new(100)
    }
}

impl DnFeed for SimulatedDnFeed {
    fn next_dn_index(&mut self, current: u64) -> u64 {
        current + self.step
    }
}

/// A validator bound to one mining store and one grading function.
pub struct Validator {
    store: Arc<MiningStore>,
    lx: LxrPoW,
    dn_feed: Box<dyn DnFeed>,
    block_times: Vec<f64>,
}

impl Validator {
    pub fn new(store: Arc<MiningStore>, lx: LxrPoW) -> Self {
        Validator { store, lx, dn_feed: Box::new(SimulatedDnFeed::default()), block_times: Vec::new() }
    }

    pub fn with_dn_feed(store: Arc<MiningStore>, lx: LxrPoW, dn_feed: Box<dyn DnFeed>) -> Self {
        Validator { store, lx, dn_feed, block_times: Vec::new() }
    }

    /// Run one tick: detect a block close, validate, adjust difficulty, append the next
    /// settings. Returns `true` if a block was closed.
    pub fn tick(&mut self) -> bool {
        let (settings, submissions) = self.store.current_state();

        let close_at = submissions
            .iter()
            .enumerate()
            .rev()
            .find(|(_, sub)| sub.pow >= settings.difficulty && self.validate(sub, &settings))
            .map(|(i, _)| i);

        let Some(i) = close_at else { return false };

        let now = Utc::now();
        let new_block_index = settings.block_index + 1;
        let new_dn_hash: [u8; 32] = Sha256::digest(settings.dn_hash).into();
        let new_dn_index = self.dn_feed.next_dn_index(settings.dn_index);
        let (new_difficulty, new_window_block_index) =
            self.adjust_difficulty(&settings, now, new_block_index);

        let point_earners = i as u64 + 1;
        let new_settings = Settings {
            timestamp: now,
            window_block_index: new_window_block_index,
            window_timestamp: if new_window_block_index == settings.window_block_index {
                settings.window_timestamp
            } else {
                now
            },
            diff_window: settings.diff_window,
            dn_index: new_dn_index,
            block_index: new_block_index,
            dn_hash: new_dn_hash,
            difficulty: new_difficulty,
            block_time: settings.block_time,
            payout_freq: settings.payout_freq,
            qualifies: settings.qualifies + point_earners,
            loops: settings.loops,
            bits: settings.bits,
            last_diff: settings.difficulty,
        };

        info!(
            "block {} closed: {point_earners} point-earning submission(s), difficulty {:#018x} -> {:#018x}",
            settings.block_index, settings.difficulty, new_difficulty
        );
        self.store.add_settings(new_settings);
        true
    }

    fn validate(&self, sub: &Submission, settings: &Settings) -> bool {
        if sub.block_index != settings.block_index
            || sub.dn_hash != settings.dn_hash
            || sub.dn_index != settings.dn_index
        {
            return false;
        }
        if !self.store.miner_registered(sub.miner_idx) {
            return false;
        }
        self.lx.grade(&sub.dn_hash, sub.nonce) == sub.pow
    }

    /// Small-space two's-complement difficulty scaling, damped by half the relative error
    /// between the rolling average block time and the configured target.
    fn adjust_difficulty(
        &mut self,
        old: &Settings,
        new_timestamp: DateTime<Utc>,
        new_block_index: u64,
    ) -> (u64, u64) {
        let interval = (new_timestamp - old.timestamp).num_milliseconds() as f64 / 1000.0;
        self.block_times.push(interval.max(0.0));

        if (self.block_times.len() as u16) < old.diff_window {
            return (old.difficulty, old.window_block_index);
        }

        let avg = self.block_times.iter().sum::<f64>() / self.block_times.len() as f64;
        let target = old.block_time as f64;
        let delta = ((target - avg) / 2.0).clamp(-0.5, 0.5);

        let f = old.difficulty.wrapping_neg() as f64;
        let new_f = f * (1.0 - delta);
        let new_difficulty = (new_f as u64).wrapping_neg();

        self.block_times.clear();
        (new_difficulty, new_block_index)
    }
}

/// Handle to a validator running on its own thread, ticking once a second.
pub struct ValidatorHandle {
    control: Sender<Control>,
    join: Option<JoinHandle<()>>,
}

impl ValidatorHandle {
    pub fn stop(&mut self) {
        if let Some(handle) = self.join.take() {
            let _ = self.control.send(Control::Stop);
            let _ = handle.join();
        }
    }
}

impl Drop for ValidatorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

pub fn spawn(validator: Validator) -> ValidatorHandle {
    let (control_tx, control_rx) = mpsc::channel::<Control>();
    let join = std::thread::spawn(move || run(validator, control_rx));
    ValidatorHandle { control: control_tx, join: Some(join) }
}

fn run(mut validator: Validator, control: mpsc::Receiver<Control>) {
    loop {
        match control.try_recv() {
            Ok(Control::Stop) => return,
            Err(TryRecvError::Disconnected) => return,
            Err(TryRecvError::Empty) => {}
        }
        validator.tick();
        std::thread::sleep(Duration::from_secs(1));
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

    fn seed(store: &MiningStore, dn_hash: [u8; 32], difficulty: u64, diff_window: u16) -> Settings {
        let settings = Settings {
            timestamp: Utc::now(),
            window_block_index: 0,
            window_timestamp: Utc::now(),
            diff_window,
            dn_index: 0,
            block_index: 0,
            dn_hash,
            difficulty,
            block_time: 600,
            payout_freq: 14400,
            qualifies: 0,
            loops: 4,
            bits: 12,
            last_diff: difficulty,
        };
        store.add_settings(settings.clone());
        settings
    }

    #[test]
    fn rejects_submission_with_wrong_declared_grade() {
        let store = Arc::new(MiningStore::new());
        let hash = [9u8; 32];
        let settings = seed(&store, hash, 0, 10);
        let grading = lx();
        let mut validator = Validator::new(store.clone(), grading.clone());

        let real_grade = grading.grade(&hash, 42);
        let forged = Submission {
            timestamp: Utc::now(),
            dn_index: settings.dn_index,
            dn_hash: hash,
            block_index: settings.block_index,
            nonce: 42,
            miner_idx: store.register_miner("https://miner.example/x").unwrap(),
            pow: real_grade.wrapping_add(1), // declared grade doesn't match recomputation
        };
        store.add_submission(forged);

        assert!(!validator.tick(), "a submission with a forged pow must not close the block");
    }

    #[test]
    fn closes_block_and_advances_dn_hash() {
        let store = Arc::new(MiningStore::new());
        let hash = [3u8; 32];
        let settings = seed(&store, hash, 0, 10); // difficulty 0: anything qualifies
        let grading = lx();
        let miner_idx = store.register_miner("https://miner.example/y").unwrap();

        let nonce = 7;
        let grade = grading.grade(&hash, nonce);
        store.add_submission(Submission {
            timestamp: Utc::now(),
            dn_index: settings.dn_index,
            dn_hash: hash,
            block_index: settings.block_index,
            nonce,
            miner_idx,
            pow: grade,
        });

        let mut validator = Validator::new(store.clone(), grading);
        assert!(validator.tick());

        let next = store.latest_settings().unwrap();
        assert_eq!(next.block_index, 1);
        let expected_dn_hash: [u8; 32] = Sha256::digest(hash).into();
        assert_eq!(next.dn_hash, expected_dn_hash);
        assert_eq!(next.dn_index, 100);
        assert_eq!(next.qualifies, 1);
    }

    #[test]
    fn difficulty_rises_when_blocks_close_too_fast() {
        let store = Arc::new(MiningStore::new());
        let mut validator = Validator::new(store.clone(), lx());

        let old = Settings {
            timestamp: Utc::now(),
            window_block_index: 0,
            window_timestamp: Utc::now(),
            diff_window: 3,
            dn_index: 0,
            block_index: 0,
            dn_hash: [0u8; 32],
            difficulty: 0xFF00_0000_0000_0000,
            block_time: 600,
            payout_freq: 14400,
            qualifies: 0,
            loops: 4,
            bits: 12,
            last_diff: 0xFF00_0000_0000_0000,
        };

        let fast = old.timestamp + chrono::Duration::seconds(60); // far faster than target 600s
        let (d1, _) = validator.adjust_difficulty(&old, fast, 1);
        let (d2, _) = validator.adjust_difficulty(&old, fast, 2);
        let (d3, w3) = validator.adjust_difficulty(&old, fast, 3);

        assert_eq!(d1, old.difficulty);
        assert_eq!(d2, old.difficulty);
        assert!(d3 > old.difficulty, "faster-than-target blocks must raise difficulty");
        assert_eq!(w3, 3);
    }
}
