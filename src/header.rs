// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The fixed-size header at the front of the shared-memory region.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;
use crate::sync::{RawCondvar, RawMutex};

/// Sentinel identifying a correctly laid-out region, derived from the
/// reference implementation's `0xCADDA7A` widened to fill 32 bits.
pub const MAGIC: u32 = 0x0CAD_DA7A;

/// Layout version. Bumped whenever [`RegionHeader`] or [`crate::bucket::Bucket`]
/// change in a way that is not binary compatible.
pub const LAYOUT_VERSION: u32 = 1;

/// Canonical default bucket count, matching `MAX_CAN_ENTRIES` in the
/// reference implementation.
pub const DEFAULT_BUCKET_COUNT: u32 = 4096;

/// Canonical default shared-memory object name.
pub const DEFAULT_SEGMENT_NAME: &str = "/can_data_shm";

/// Header occupying the first cache lines of the region, followed
/// immediately by `bucket_count` [`crate::bucket::Bucket`] values.
#[repr(C, align(64))]
pub struct RegionHeader {
    magic: AtomicU64,
    version: AtomicU64,
    bucket_count: AtomicU64,
    global_sequence: AtomicU64,
    global_mutex: RawMutex,
    update_condition: RawCondvar,
    total_sets: AtomicU64,
    total_gets: AtomicU64,
    total_subscribes: AtomicU64,
    total_probes: AtomicU64,
    collision_count: AtomicU64,
    _pad: [u8; 8],
}

const _: () = assert!(std::mem::size_of::<RegionHeader>() % 64 == 0);

impl RegionHeader {
    /// Total byte size of the header, used by region sizing.
    pub const SIZE: usize = std::mem::size_of::<RegionHeader>();

    /// # Safety
    /// `ptr` must point to writable memory at least [`RegionHeader::SIZE`]
    /// bytes wide; must be called exactly once, by the process that created
    /// the underlying shared-memory object, before publishing the magic
    /// number that lets other processes attach without reinitializing.
    pub unsafe fn init_in_place(ptr: *mut RegionHeader, bucket_count: u32) -> Result<()> {
        RawMutex::init_in_place(std::ptr::addr_of_mut!((*ptr).global_mutex))?;
        RawCondvar::init_in_place(std::ptr::addr_of_mut!((*ptr).update_condition))?;

        std::ptr::addr_of_mut!((*ptr).version).write(AtomicU64::new(LAYOUT_VERSION as u64));
        std::ptr::addr_of_mut!((*ptr).bucket_count).write(AtomicU64::new(bucket_count as u64));
        std::ptr::addr_of_mut!((*ptr).global_sequence).write(AtomicU64::new(0));
        std::ptr::addr_of_mut!((*ptr).total_sets).write(AtomicU64::new(0));
        std::ptr::addr_of_mut!((*ptr).total_gets).write(AtomicU64::new(0));
        std::ptr::addr_of_mut!((*ptr).total_subscribes).write(AtomicU64::new(0));
        std::ptr::addr_of_mut!((*ptr).total_probes).write(AtomicU64::new(0));
        std::ptr::addr_of_mut!((*ptr).collision_count).write(AtomicU64::new(0));

        // Magic is published last (Release) so an attaching process that
        // observes it can trust every field above is initialized.
        std::ptr::addr_of_mut!((*ptr).magic).write(AtomicU64::new(0));
        (*ptr).magic.store(MAGIC as u64, Ordering::Release);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.magic.load(Ordering::Acquire) == MAGIC as u64
    }

    pub fn bucket_count(&self) -> u32 {
        self.bucket_count.load(Ordering::Relaxed) as u32
    }

    pub fn version(&self) -> u32 {
        self.version.load(Ordering::Relaxed) as u32
    }

    pub fn global_mutex(&self) -> &RawMutex {
        &self.global_mutex
    }

    pub fn update_condition(&self) -> &RawCondvar {
        &self.update_condition
    }

    pub fn bump_global_sequence(&self) -> u64 {
        self.global_sequence.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn global_sequence(&self) -> u64 {
        self.global_sequence.load(Ordering::Acquire)
    }

    pub fn inc_sets(&self) {
        self.total_sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_gets(&self) {
        self.total_gets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_subscribes(&self) {
        self.total_subscribes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_probes(&self, n: u64) {
        self.total_probes.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_collisions(&self) {
        self.collision_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot_counts(&self) -> (u64, u64, u64, u64, u64) {
        (
            self.total_sets.load(Ordering::Relaxed),
            self.total_gets.load(Ordering::Relaxed),
            self.total_subscribes.load(Ordering::Relaxed),
            self.total_probes.load(Ordering::Relaxed),
            self.collision_count.load(Ordering::Relaxed),
        )
    }
}
