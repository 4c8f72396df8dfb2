// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared-memory key/value store for CAN frames, keyed by CAN identifier.
//!
//! A single writer process and any number of reader processes attach to a
//! POSIX shared-memory region containing a fixed-size hash table of CAN
//! records. Writers publish through a seqlock per bucket so readers never
//! block on a writer; a region-wide mutex and condition variable let readers
//! subscribe to changes instead of polling.
//!
//! # Quick start
//!
//! ```no_run
//! can_shm::init().unwrap();
//! can_shm::set(0x123, 4, &[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
//! let record = can_shm::get(0x123).unwrap();
//! assert_eq!(record.data(), &[0xDE, 0xAD, 0xBE, 0xEF]);
//! ```
//!
//! Two index strategies are available: the default general-purpose linear
//! probing table (any 29-bit CAN identifier, up to the configured bucket
//! count), and an opt-in perfect-hash table (see [`hash::perfect_table`])
//! restricted to a fixed, enumerable identifier set with O(1) collision-free
//! lookup. [`Store::init`] picks between them via [`RegionConfig`].

pub mod bucket;
pub mod error;
pub mod hash;
pub mod header;
pub mod metrics;
pub mod record;
pub mod region;
pub mod segment;
pub mod store;
pub mod sync;

pub use error::{Result, ShmError};
pub use hash::linear::{report_collisions, CollisionGroup};
#[cfg(feature = "perfect-hash")]
pub use hash::perfect_table::{DEMO_CAN_IDS, INDEX_TO_CAN_ID};
pub use metrics::Stats;
pub use record::{CanId, Record, CAN_ID_MAX, MAX_PAYLOAD};
pub use region::RegionConfig;
pub use store::Store;

use std::sync::OnceLock;

static GLOBAL_STORE: OnceLock<Store> = OnceLock::new();

fn global() -> Result<&'static Store> {
    if let Some(store) = GLOBAL_STORE.get() {
        return Ok(store);
    }
    let store = Store::init(RegionConfig::default())?;
    Ok(GLOBAL_STORE.get_or_init(|| store))
}

/// Attaches the process-wide store using default configuration
/// (`/can_data_shm`, 4096 buckets, linear probing). Safe to call more than
/// once; later calls are no-ops once the store is attached.
pub fn init() -> Result<()> {
    global().map(|_| ())
}

/// Publishes a frame under `can_id`. `data.len()` must equal `dlc` and be at
/// most [`MAX_PAYLOAD`].
pub fn set(can_id: u32, dlc: u16, data: &[u8]) -> Result<()> {
    global()?.set(can_id, dlc, data)
}

/// Reads the current value stored under `can_id`.
pub fn get(can_id: u32) -> Result<Record> {
    global()?.get(can_id)
}

/// Removes the value stored under `can_id`, if present.
pub fn delete(can_id: u32) -> Result<()> {
    global()?.delete(can_id)
}

/// Blocks until `can_id` has been written to `count` times or `timeout_ms`
/// elapses (negative means wait indefinitely).
pub fn subscribe(
    can_id: u32,
    count: u32,
    timeout_ms: i32,
    callback: impl FnMut(&Record),
) -> Result<()> {
    global()?.subscribe(can_id, count, timeout_ms, callback)
}

/// Blocks until `can_id` is written to once, or `timeout_ms` elapses.
pub fn subscribe_once(can_id: u32, timeout_ms: i32) -> Result<Record> {
    global()?.subscribe_once(can_id, timeout_ms)
}

/// Snapshot of the process-wide store's counters.
pub fn stats() -> Result<Stats> {
    Ok(global()?.stats())
}

/// Unlinks the default region's name from the filesystem namespace.
///
/// Mirrors `can_shm_cleanup`'s role as an explicit teardown call: existing
/// mappings in this or other processes, including the process-wide
/// singleton, remain valid until they drop. Call this once, from whichever
/// process is responsible for the region's lifetime, when no further
/// process will need to attach to it.
pub fn cleanup() {
    if let Err(e) = segment::ShmSegment::unlink(region::RegionConfig::default().segment_name.as_str()) {
        log::warn!("cleanup: unlink failed: {e}");
    }
}
