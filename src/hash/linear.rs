// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Linear-probing insert/lookup over a [`Region`]'s bucket array.

use crate::bucket::BucketState;
use crate::error::{Result, ShmError};
use crate::hash::mix29;
use crate::region::Region;

/// Outcome of probing for a slot to insert into.
pub enum InsertSlot {
    /// Reuse this index (either it was empty, a tombstone, or already held
    /// the same CAN identifier).
    Use { index: u32, probes: u32, was_collision: bool },
}

/// Probes from `can_id`'s home slot looking for a slot to write into:
/// the first empty or tombstoned slot, or an existing slot already holding
/// this identifier (an update in place).
///
/// Matches `can_shm_set_linear_probing`'s scan order, but treats tombstones
/// as reusable rather than only recognizing `Empty`.
pub fn find_for_insert(region: &Region, can_id: u32) -> Result<InsertSlot> {
    let home = mix29(can_id, region.bucket_count());
    let mut reusable: Option<(u32, u32)> = None;

    for probes in 0..region.bucket_count() {
        let index = (home + probes) % region.bucket_count();
        let bucket = region.bucket(index);
        match bucket.state() {
            BucketState::Empty => {
                let (index, probes) = reusable.unwrap_or((index, probes));
                return Ok(InsertSlot::Use {
                    index,
                    probes: probes + 1,
                    was_collision: probes > 0,
                });
            }
            BucketState::Tombstone => {
                if reusable.is_none() {
                    reusable = Some((index, probes));
                }
            }
            BucketState::Occupied => {
                if bucket.can_id() == can_id {
                    return Ok(InsertSlot::Use {
                        index,
                        probes: probes + 1,
                        was_collision: false,
                    });
                }
            }
        }
    }

    if let Some((index, probes)) = reusable {
        return Ok(InsertSlot::Use {
            index,
            probes: probes + 1,
            was_collision: true,
        });
    }

    Err(ShmError::TableFull)
}

/// Probes from `can_id`'s home slot looking for an existing occupied slot
/// holding it. Tombstones are skipped over, not treated as a miss, so a
/// delete never breaks the chain of entries inserted after it.
pub fn find_for_lookup(region: &Region, can_id: u32) -> Option<u32> {
    let home = mix29(can_id, region.bucket_count());

    for probes in 0..region.bucket_count() {
        let index = (home + probes) % region.bucket_count();
        let bucket = region.bucket(index);
        match bucket.state() {
            BucketState::Empty => return None,
            BucketState::Tombstone => continue,
            BucketState::Occupied => {
                if bucket.can_id() == can_id {
                    return Some(index);
                }
            }
        }
    }
    None
}

/// A group of CAN identifiers that all hash to the same home slot under
/// [`mix29`], supplementing the original's `can_shm_test_hash_collisions`
/// debug utility as a pure, shared-memory-free helper.
#[derive(Debug, Clone)]
pub struct CollisionGroup {
    pub home: u32,
    pub ids: Vec<u32>,
}

/// Groups `ids` by their home slot under a table of `bucket_count` entries,
/// returning only groups with more than one member.
pub fn report_collisions(ids: &[u32], bucket_count: u32) -> Vec<CollisionGroup> {
    use std::collections::HashMap;

    let mut by_home: HashMap<u32, Vec<u32>> = HashMap::new();
    for &id in ids {
        by_home.entry(mix29(id, bucket_count)).or_default().push(id);
    }

    let mut groups: Vec<CollisionGroup> = by_home
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|(home, ids)| CollisionGroup { home, ids })
        .collect();
    groups.sort_by_key(|g| g.home);
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::RegionConfig;

    fn unique_region(tag: &str, bucket_count: u32) -> Region {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let config = RegionConfig::default()
            .with_segment_name(format!("/can_shm_test_linear_{tag}_{nanos}"))
            .with_bucket_count(bucket_count);
        Region::attach(&config).unwrap()
    }

    #[test]
    fn insert_then_lookup_same_id() {
        let region = unique_region("basic", 64);

        let slot = find_for_insert(&region, 0x200).unwrap();
        let InsertSlot::Use { index, .. } = slot;
        {
            let guard = region.bucket(index).lock().unwrap();
            guard.write(0x200, 1, &[1], 0);
        }
        assert_eq!(find_for_lookup(&region, 0x200), Some(index));
    }

    #[test]
    fn tombstone_preserves_probe_chain() {
        let region = unique_region("tombstone", 8);

        // Force a collision by using identifiers that share a home slot:
        // mix29 reduces mod bucket_count, so ids differing by bucket_count
        // share a home index whenever the XOR-fold term doesn't change.
        let home = crate::hash::mix29(0x10, 8);
        let mut second_id = 0x10u32;
        loop {
            second_id += 8;
            if crate::hash::mix29(second_id, 8) == home && second_id != 0x10 {
                break;
            }
        }

        let InsertSlot::Use { index: idx_a, .. } = find_for_insert(&region, 0x10).unwrap();
        {
            let guard = region.bucket(idx_a).lock().unwrap();
            guard.write(0x10, 1, &[1], 0);
        }

        let InsertSlot::Use { index: idx_b, .. } = find_for_insert(&region, second_id).unwrap();
        assert_ne!(idx_a, idx_b, "expected a real collision for this test");
        {
            let guard = region.bucket(idx_b).lock().unwrap();
            guard.write(second_id, 1, &[2], 0);
        }

        {
            let guard = region.bucket(idx_a).lock().unwrap();
            guard.clear_to_tombstone();
        }

        assert_eq!(find_for_lookup(&region, second_id), Some(idx_b));
    }

    #[test]
    fn reinsert_past_a_tombstone_updates_the_existing_occupied_copy() {
        let region = unique_region("reinsert", 8);

        let home = crate::hash::mix29(0x10, 8);
        let mut second_id = 0x10u32;
        loop {
            second_id += 8;
            if crate::hash::mix29(second_id, 8) == home && second_id != 0x10 {
                break;
            }
        }

        let InsertSlot::Use { index: idx_a, .. } = find_for_insert(&region, 0x10).unwrap();
        {
            let guard = region.bucket(idx_a).lock().unwrap();
            guard.write(0x10, 1, &[1], 0);
        }

        let InsertSlot::Use { index: idx_b, .. } = find_for_insert(&region, second_id).unwrap();
        {
            let guard = region.bucket(idx_b).lock().unwrap();
            guard.write(second_id, 1, &[2], 0);
        }

        // Tombstone the near slot, then "reinsert" the far id: find_for_insert
        // must keep probing past the tombstone and land back on idx_b rather
        // than writing a stale duplicate at idx_a.
        {
            let guard = region.bucket(idx_a).lock().unwrap();
            guard.clear_to_tombstone();
        }

        let InsertSlot::Use { index: idx_reuse, .. } = find_for_insert(&region, second_id).unwrap();
        assert_eq!(idx_reuse, idx_b);
    }

    #[test]
    fn collisions_are_grouped_by_home_slot() {
        let groups = report_collisions(&[0x10, 0x18, 0x20], 8);
        assert!(groups.iter().any(|g| g.ids.len() >= 2));
    }
}
