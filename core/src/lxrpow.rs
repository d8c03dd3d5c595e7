//! The LxrPoW grading function: given a block hash and a nonce, produce a 64-bit grade where
//! larger is better. Grinding touches the shared [`ByteMap`] at a data-dependent address on
//! every step, so evaluating many nonces in parallel is bandwidth-bound rather than
//! compute-bound.

use crate::bytemap::ByteMap;
use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Parameters that fully determine the grading function. Any change maps PoW into a
/// completely different space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LxrPoWParams {
    /// Number of grinds through the 40-byte working buffer; more loops cost more time per hash.
    pub loops: u32,
    /// `log2` of the ByteMap size.
    pub bits: u32,
    /// Shuffle passes used when the ByteMap was built.
    pub passes: u32,
}

impl LxrPoWParams {
    pub fn validate(&self) -> Result<()> {
        if !(crate::bytemap::MIN_BITS..=crate::bytemap::MAX_BITS).contains(&self.bits) {
            return Err(Error::InvalidBits(self.bits));
        }
        if self.loops < 1 {
            return Err(Error::InvalidLoops(self.loops));
        }
        Ok(())
    }
}

/// The grading function bound to one ByteMap.
///
/// Cheap to clone (holds an `Arc` to the table) so every worker thread can own its own handle.
#[derive(Clone)]
pub struct LxrPoW {
    params: LxrPoWParams,
    map: Arc<ByteMap>,
}

/// Grades above this floor are always reported, even if they do not beat a worker's running
/// best — the "interesting submissions" threshold the store also enforces.
pub const INTERESTING_FLOOR: u64 = 0xFFFF_0000_0000_0000;

impl LxrPoW {
    pub fn new(params: LxrPoWParams, map: Arc<ByteMap>) -> Result<Self> {
        params.validate()?;
        Ok(LxrPoW { params, map })
    }

    pub fn params(&self) -> LxrPoWParams {
        self.params
    }

    pub fn map(&self) -> &Arc<ByteMap> {
        &self.map
    }

    /// Grade `(hash, nonce)`. Total: no error conditions once constructed.
    pub fn grade(&self, hash: &[u8; 32], nonce: u64) -> u64 {
        let mut l = mix(hash, nonce);
        let mask = self.map.mask();
        let mut state = u64::from_be_bytes(l[..8].try_into().unwrap());

        for _ in 0..self.params.loops {
            for byte in l.iter_mut() {
                state = (state << 17) ^ (state >> 7) ^ u64::from(self.map.get(state & mask) ^ *byte);
                *byte = state as u8;
            }
        }

        finalize(&l)
    }
}

/// Build the 40-byte working buffer: 8 big-endian nonce bytes followed by the block hash,
/// SHA-256'd into the first 32 bytes so the grind starts from a well-mixed state.
fn mix(hash: &[u8; 32], nonce: u64) -> [u8; 40] {
    let mut pre = [0u8; 40];
    pre[..8].copy_from_slice(&nonce.to_be_bytes());
    pre[8..].copy_from_slice(hash);

    let digest = Sha256::digest(pre);

    let mut l = [0u8; 40];
    l[..32].copy_from_slice(&digest);
    l[32..].copy_from_slice(&pre[32..]);
    l
}

/// SHA-256 the ground-down buffer; the grade is the big-endian u64 of the first 8 bytes.
fn finalize(l: &[u8; 40]) -> u64 {
    let digest = Sha256::digest(l);
    u64::from_be_bytes(digest[..8].try_into().unwrap())
}
