//! The Mining ADI: an in-memory, append-only ledger of settings and submissions, with miner and
//! validator registries.
//!
//! Grounded on the source's `MAdi` (package-level `sync.RWMutex` + four tables), but fixing the
//! racy `Sync()` the source has (it unlocks before spin-waiting on `len(m.Settings) > 0`, which
//! can miss a concurrent `AddSettings`). Here a single lock guards all four tables and `Sync`
//! waits on a proper condition variable instead of polling.

use crate::error::Result;
use crate::registry::UrlRegistry;
use crate::types::{BlockHash, Settings, Submission, INTERESTING_SUBMISSIONS_FLOOR};
use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct StoreState {
    settings: Vec<Settings>,
    submissions: Vec<Submission>,
    miners: UrlRegistry,
    validators: UrlRegistry,
}

/// The shared mutable ledger, handed to coordinators and validators via `Arc`.
pub struct MiningStore {
    state: Mutex<StoreState>,
    settings_appended: Condvar,
}

impl MiningStore {
    pub fn new() -> Self {
        MiningStore { state: Mutex::new(StoreState::default()), settings_appended: Condvar::new() }
    }

    /// Lower-case and parse `token_url`; idempotent across repeated registrations.
    pub fn register_miner(&self, token_url: &str) -> Result<u64> {
        self.state.lock().miners.register(token_url)
    }

    pub fn register_validator(&self, book_url: &str) -> Result<u64> {
        self.state.lock().validators.register(book_url)
    }

    pub fn miner_url(&self, idx: u64) -> Option<String> {
        self.state.lock().miners.url_for(idx).map(str::to_string)
    }

    pub fn miner_registered(&self, idx: u64) -> bool {
        self.state.lock().miners.contains_index(idx)
    }

    /// Return the latest settings, blocking (on a condition variable, not a spin loop) until at
    /// least one has been appended.
    pub fn sync(&self) -> Settings {
        let mut state = self.state.lock();
        loop {
            if let Some(settings) = state.settings.last() {
                return settings.clone();
            }
            self.settings_appended.wait(&mut state);
        }
    }

    /// Non-blocking peek at the latest settings, for callers (the coordinator) that poll
    /// instead of blocking.
    pub fn latest_settings(&self) -> Option<Settings> {
        self.state.lock().settings.last().cloned()
    }

    /// Current settings and all submissions matching its `(dn_hash, block_index)`, sorted
    /// non-decreasing by grade. Both are read under one lock acquisition so a validator never
    /// sees submissions for a settings record it didn't also observe.
    pub fn current_state(&self) -> (Settings, Vec<Submission>) {
        let mut state = self.state.lock();
        loop {
            if let Some(settings) = state.settings.last().cloned() {
                let mut matching: Vec<Submission> = state
                    .submissions
                    .iter()
                    .filter(|s| s.dn_hash == settings.dn_hash && s.block_index == settings.block_index)
                    .cloned()
                    .collect();
                matching.sort_by_key(|s| s.pow);
                return (settings, matching);
            }
            self.settings_appended.wait(&mut state);
        }
    }

    /// Current `dn_hash` and all submissions matching the current `(dn_hash, block_index)`,
    /// sorted non-decreasing by grade.
    pub fn get_block(&self) -> (BlockHash, Vec<Submission>) {
        let (settings, submissions) = self.current_state();
        (settings.dn_hash, submissions)
    }

    /// Append `sub` unless a pre-check rejects it: a submission already meeting difficulty has
    /// been accepted for this block, the grade is below both difficulty and the
    /// interesting-submissions floor, or the submission targets a stale `dn_hash`.
    pub fn add_submission(&self, sub: Submission) {
        let mut state = self.state.lock();
        let Some(settings) = state.settings.last().cloned() else { return };

        if sub.dn_hash != settings.dn_hash {
            return;
        }
        let already_won = state
            .submissions
            .iter()
            .filter(|s| s.dn_hash == settings.dn_hash && s.block_index == settings.block_index)
            .any(|s| s.pow >= settings.difficulty);
        if already_won {
            return;
        }
        if sub.pow < settings.difficulty && sub.pow < INTERESTING_SUBMISSIONS_FLOOR {
            return;
        }

        state.submissions.push(sub);
    }

    /// Append a new settings record, waking anyone blocked in [`Self::sync`].
    pub fn add_settings(&self, settings: Settings) {
        let mut state = self.state.lock();
        state.settings.push(settings);
        self.settings_appended.notify_all();
    }
}

impl Default for MiningStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn settings(dn_hash: BlockHash, block_index: u64, difficulty: u64) -> Settings {
        Settings {
            timestamp: Utc::now(),
            window_block_index: block_index,
            window_timestamp: Utc::now(),
            diff_window: 10,
            dn_index: 100,
            block_index,
            dn_hash,
            difficulty,
            block_time: 600,
            payout_freq: 4 * 60 * 60,
            qualifies: 0,
            loops: 16,
            bits: 30,
            last_diff: difficulty,
        }
    }

    fn submission(dn_hash: BlockHash, block_index: u64, pow: u64) -> Submission {
        Submission {
            timestamp: Utc::now(),
            dn_index: 100,
            dn_hash,
            block_index,
            nonce: 1,
            miner_idx: 0,
            pow,
        }
    }

    #[test]
    fn register_miner_is_idempotent() {
        let store = MiningStore::new();
        let a = store.register_miner("https://miner.example/a").unwrap();
        let b = store.register_miner("https://miner.example/a").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn get_block_returns_sorted_ascending() {
        let store = MiningStore::new();
        let hash = [7u8; 32];
        store.add_settings(settings(hash, 1, 10));
        store.add_submission(submission(hash, 1, 50));
        store.add_submission(submission(hash, 1, 20));
        store.add_submission(submission(hash, 1, 30));

        let (dn_hash, subs) = store.get_block();
        assert_eq!(dn_hash, hash);
        let grades: Vec<u64> = subs.iter().map(|s| s.pow).collect();
        assert_eq!(grades, vec![20, 30, 50]);
    }

    #[test]
    fn rejects_stale_dn_hash() {
        let store = MiningStore::new();
        store.add_settings(settings([1u8; 32], 1, 10));
        store.add_submission(submission([2u8; 32], 1, 100));
        let (_, subs) = store.get_block();
        assert!(subs.is_empty());
    }

    #[test]
    fn rejects_below_floor_submission() {
        let store = MiningStore::new();
        let hash = [3u8; 32];
        store.add_settings(settings(hash, 1, 0xFFFF_FFFF_FFFF_FFFF));
        store.add_submission(submission(hash, 1, 1));
        let (_, subs) = store.get_block();
        assert!(subs.is_empty(), "submission below both difficulty and floor must be dropped");
    }

    #[test]
    fn drops_further_submissions_once_block_is_won() {
        let store = MiningStore::new();
        let hash = [4u8; 32];
        store.add_settings(settings(hash, 1, 10));
        store.add_submission(submission(hash, 1, 20)); // meets difficulty
        store.add_submission(submission(hash, 1, 25)); // should be dropped
        let (_, subs) = store.get_block();
        assert_eq!(subs.len(), 1);
    }

    #[test]
    fn sync_blocks_until_settings_appended() {
        use std::sync::Arc;
        use std::time::Duration;

        let store = Arc::new(MiningStore::new());
        let reader = store.clone();
        let handle = std::thread::spawn(move || reader.sync());

        std::thread::sleep(Duration::from_millis(50));
        store.add_settings(settings([5u8; 32], 1, 1));

        let settings = handle.join().unwrap();
        assert_eq!(settings.dn_hash, [5u8; 32]);
    }
}
