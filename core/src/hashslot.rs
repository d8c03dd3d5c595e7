//! A single-slot, coalescing mailbox for the latest block hash.
//!
//! Workers and the pool's fan-out task only ever care about the *newest* hash: a queued-up
//! backlog of stale hashes is pure waste. A slot that the writer simply overwrites gives the
//! "drain any pending hash before forwarding the new one" behaviour for free, with no explicit
//! drain step needed.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::types::BlockHash;

pub struct HashSlot {
    state: Mutex<Option<BlockHash>>,
    cvar: Condvar,
    closed: AtomicBool,
}

impl HashSlot {
    pub fn new() -> Self {
        HashSlot { state: Mutex::new(None), cvar: Condvar::new(), closed: AtomicBool::new(false) }
    }

    /// Publish a new hash, waking anyone blocked in [`Self::recv_blocking`].
    pub fn publish(&self, hash: BlockHash) {
        let mut guard = self.state.lock();
        *guard = Some(hash);
        self.cvar.notify_all();
    }

    /// Block until a hash is available, then consume it. Returns `None` once [`Self::close`]
    /// has been called and no hash is pending.
    pub fn recv_blocking(&self) -> Option<BlockHash> {
        let mut guard = self.state.lock();
        loop {
            if let Some(hash) = guard.take() {
                return Some(hash);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.cvar.wait_for(&mut guard, Duration::from_millis(50));
        }
    }

    /// Non-blocking: take the pending hash if there is one.
    pub fn try_recv(&self) -> Option<BlockHash> {
        self.state.lock().take()
    }

    /// Wake any blocked receiver with no more hashes coming.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.cvar.notify_all();
    }
}

impl Default for HashSlot {
    fn default() -> Self {
        Self::new()
    }
}
