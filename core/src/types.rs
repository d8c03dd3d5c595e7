//! Data model shared across the worker, store, coordinator, and validator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Opaque 32-byte identifier of the block currently being mined.
pub type BlockHash = [u8; 32];

/// A worker's self-reported solution, consumed within the mining pipeline. Never persisted
/// directly; the coordinator wraps the winning one into a [`Submission`].
#[derive(Debug, Clone)]
pub struct Solution {
    pub block_hash: BlockHash,
    pub nonce: u64,
    pub grade: u64,
    pub worker_id: u32,
    pub hash_count: u64,
    pub timestamp: Instant,
}

/// The durable form of a [`Solution`], tagged with miner identity and the block it claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub timestamp: DateTime<Utc>,
    pub dn_index: u64,
    pub dn_hash: BlockHash,
    pub block_index: u64,
    pub nonce: u64,
    pub miner_idx: u64,
    pub pow: u64,
}

/// The mutable control record. A new `Settings` is appended whenever a block closes; miners
/// re-read the latest one to learn `(dn_hash, difficulty, block_index)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub timestamp: DateTime<Utc>,
    pub window_block_index: u64,
    pub window_timestamp: DateTime<Utc>,
    pub diff_window: u16,
    pub dn_index: u64,
    pub block_index: u64,
    pub dn_hash: BlockHash,
    pub difficulty: u64,
    pub block_time: u16,
    pub payout_freq: u64,
    pub qualifies: u64,
    pub loops: u16,
    pub bits: u16,
    pub last_diff: u64,
}

/// Interesting-submissions floor: the store keeps submissions below `difficulty` but above this
/// value so a validator has something to look at even before a block closes.
pub const INTERESTING_SUBMISSIONS_FLOOR: u64 = 0xFFF0_0000_0000_0000;

/// Absolute floor a worker reports at regardless of its running best.
pub const WORKER_REPORT_FLOOR: u64 = crate::lxrpow::INTERESTING_FLOOR;
