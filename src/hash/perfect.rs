// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Set/get/delete over the closed perfect-hash table.
//!
//! Unlike linear probing, a lookup touches exactly one bucket: there is no
//! probe chain, so delete can clear the slot directly without a tombstone.

use crate::bucket::BucketState;
use crate::error::{Result, ShmError};
use crate::hash::perfect_table::{index_for, is_admissible, TABLE_SIZE};
use crate::region::Region;

fn require_admissible(can_id: u32) -> Result<u32> {
    if !is_admissible(can_id) {
        return Err(ShmError::InvalidId(can_id));
    }
    Ok(index_for(can_id))
}

pub fn set(region: &Region, can_id: u32, dlc: u16, data: &[u8], timestamp: u64) -> Result<()> {
    debug_assert_eq!(region.bucket_count() as usize, TABLE_SIZE);
    let index = require_admissible(can_id)?;
    let guard = region.bucket(index).lock()?;
    guard.write(can_id, dlc, data, timestamp);
    Ok(())
}

pub fn get(region: &Region, can_id: u32) -> Result<crate::record::Record> {
    debug_assert_eq!(region.bucket_count() as usize, TABLE_SIZE);
    let index = require_admissible(can_id)?;
    let bucket = region.bucket(index);
    if bucket.state() != BucketState::Occupied {
        return Err(ShmError::NotFound);
    }
    let record = bucket.read()?;
    if record.can_id != can_id {
        return Err(ShmError::NotFound);
    }
    Ok(record)
}

pub fn delete(region: &Region, can_id: u32) -> Result<()> {
    debug_assert_eq!(region.bucket_count() as usize, TABLE_SIZE);
    let index = require_admissible(can_id)?;
    let bucket = region.bucket(index);
    if bucket.state() != BucketState::Occupied || bucket.can_id() != can_id {
        return Err(ShmError::NotFound);
    }
    let guard = bucket.lock()?;
    guard.clear_to_tombstone();
    Ok(())
}
