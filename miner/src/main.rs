//! Entry point wiring `Config → ByteMap → LxrPoW → MiningStore → N × MinerCoordinator +
//! Validator`, all sharing one in-process mining store.
//!
//! Grounded on the teacher's node binary's shutdown pattern (`AtomicBool` flag flipped by
//! `ctrlc::set_handler`, polled from the main loop) and its core-uses-thiserror /
//! binary-uses-anyhow error split.

use anyhow::{Context, Result};
use lxrpow_config::Config;
use lxrpow_core::bytemap::ByteMap;
use lxrpow_core::lxrpow::{LxrPoW, LxrPoWParams};
use lxrpow_core::store::MiningStore;
use lxrpow_core::types::Settings;
use lxrpow_core::{coordinator, validator};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    init_logging();

    let config = Config::load().context("failed to load miner configuration")?;
    log::info!(
        "starting miner: index={} miner_cnt={} instances={} loops={} bits={} seed={:#x}",
        config.index,
        config.miner_cnt,
        config.instances,
        config.loops,
        config.bits,
        config.seed,
    );

    let map = Arc::new(
        ByteMap::build(config.bits, lxrpow_core::bytemap::DEFAULT_PASSES, config.seed)
            .context("failed to build ByteMap")?,
    );
    let lx = LxrPoW::new(
        LxrPoWParams { loops: config.loops, bits: config.bits, passes: lxrpow_core::bytemap::DEFAULT_PASSES },
        map,
    )
    .context("invalid LxrPoW parameters")?;

    let store = Arc::new(MiningStore::new());
    store.add_settings(genesis_settings(&config));

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_handler = shutdown.clone();
    ctrlc::set_handler(move || {
        log::info!("shutdown requested");
        shutdown_handler.store(true, Ordering::SeqCst);
    })
    .context("failed to install Ctrl-C handler")?;

    let mut coordinators = Vec::with_capacity(config.miner_cnt as usize);
    for i in 0..config.miner_cnt {
        let token_url = if config.miner_cnt == 1 {
            config.token_url.clone()
        } else {
            format!("{}/{}", config.token_url.trim_end_matches('/'), i)
        };
        let handle = coordinator::spawn(token_url, config.instances, config.seed ^ (i as u64), lx.clone(), store.clone())
            .context("failed to start miner coordinator")?;
        coordinators.push(handle);
    }

    let validator_handle = validator::spawn(validator::Validator::new(store.clone(), lx.clone()));

    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    log::info!("stopping {} coordinator(s) and the validator", coordinators.len());
    drop(validator_handle);
    drop(coordinators);

    Ok(())
}

/// The first `Settings` record, since the store starts empty and `Sync()` would otherwise block
/// forever. `dn_hash` is seeded from the configured phrase so re-runs with the same phrase start
/// from the same genesis block.
fn genesis_settings(config: &Config) -> Settings {
    use sha2::{Digest, Sha256};
    let dn_hash: [u8; 32] = Sha256::digest(config.phrase.as_bytes()).into();
    let now = chrono::Utc::now();
    Settings {
        timestamp: now,
        window_block_index: 0,
        window_timestamp: now,
        diff_window: config.window,
        dn_index: 0,
        block_index: 0,
        dn_hash,
        difficulty: config.difficulty,
        block_time: config.block_time,
        payout_freq: 4 * 60 * 60,
        qualifies: 0,
        loops: config.loops as u16,
        bits: config.bits as u16,
        last_diff: config.difficulty,
    }
}

fn init_logging() {
    use flexi_logger::{FileSpec, Logger};

    let result = Logger::try_with_env_or_str("info")
        .and_then(|logger| {
            logger
                .log_to_file(FileSpec::default().directory("logs").basename("lxrpow-miner"))
                .duplicate_to_stderr(flexi_logger::Duplicate::Info)
                .rotate(
                    flexi_logger::Criterion::Size(10_000_000),
                    flexi_logger::Naming::Timestamps,
                    flexi_logger::Cleanup::KeepLogFiles(5),
                )
                .start()
        });

    if result.is_err() {
        // Logs directory not writable or similar: fall back to stderr-only logging rather than
        // failing the whole process over a logging backend.
        let _ = env_logger::try_init();
    }
}
