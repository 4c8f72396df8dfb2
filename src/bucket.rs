// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! A single hash-table slot: a process-shared mutex guarding a validity
//! state and a seqlock-protected record.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::Result;
use crate::record::{Record, SeqlockRecord};
use crate::sync::RawMutex;

/// Observable state of a [`Bucket`].
///
/// `Tombstone` exists so that deleting an entry does not break the probe
/// chain of later entries that hashed to the same home slot: lookups keep
/// probing past a tombstone, while inserts may reclaim one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketState {
    Empty,
    Occupied,
    Tombstone,
}

const STATE_EMPTY: u8 = 0;
const STATE_OCCUPIED: u8 = 1;
const STATE_TOMBSTONE: u8 = 2;

/// A bucket in the fixed-size hash table embedded in the shared-memory
/// region.
#[repr(C, align(64))]
pub struct Bucket {
    mutex: RawMutex,
    state: AtomicU8,
    _pad: [u8; 7],
    record: SeqlockRecord,
}

impl Bucket {
    /// # Safety
    /// `ptr` must point to writable memory at least `size_of::<Bucket>()`
    /// bytes wide; must be called exactly once, by the region's initializer,
    /// before any other process attaches.
    pub unsafe fn init_in_place(ptr: *mut Bucket) -> Result<()> {
        RawMutex::init_in_place(std::ptr::addr_of_mut!((*ptr).mutex))?;
        std::ptr::addr_of_mut!((*ptr).state).write(AtomicU8::new(STATE_EMPTY));
        std::ptr::addr_of_mut!((*ptr).record).write(SeqlockRecord::new());
        Ok(())
    }

    pub fn state(&self) -> BucketState {
        match self.state.load(Ordering::Acquire) {
            STATE_OCCUPIED => BucketState::Occupied,
            STATE_TOMBSTONE => BucketState::Tombstone,
            _ => BucketState::Empty,
        }
    }

    pub fn can_id(&self) -> u32 {
        self.record.read().map(|r| r.can_id).unwrap_or(u32::MAX)
    }

    pub fn read(&self) -> Result<Record> {
        self.record.read()
    }

    /// Writes `can_id`'s record into this bucket and marks it occupied.
    /// Caller must hold this bucket's lock.
    fn write_locked(&self, can_id: u32, dlc: u16, data: &[u8], timestamp: u64) {
        self.record.write(can_id, dlc, data, timestamp);
        self.state.store(STATE_OCCUPIED, Ordering::Release);
    }

    pub fn lock(&self) -> Result<BucketGuard<'_>> {
        let guard = self.mutex.lock()?;
        Ok(BucketGuard { bucket: self, _guard: guard })
    }
}

/// A lock held on a [`Bucket`], granting permission to mutate its state and
/// record.
pub struct BucketGuard<'a> {
    bucket: &'a Bucket,
    _guard: crate::sync::MutexGuard<'a>,
}

impl BucketGuard<'_> {
    pub fn state(&self) -> BucketState {
        self.bucket.state()
    }

    pub fn write(&self, can_id: u32, dlc: u16, data: &[u8], timestamp: u64) {
        self.bucket.write_locked(can_id, dlc, data, timestamp);
    }

    pub fn clear_to_tombstone(&self) {
        self.bucket.record.write(0, 0, &[], 0);
        self.bucket.state.store(STATE_TOMBSTONE, Ordering::Release);
    }

    pub fn read(&self) -> Result<Record> {
        self.bucket.read()
    }
}
