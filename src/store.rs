// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The public key/value store: `set`/`get`/`delete`/`subscribe` over a
//! shared-memory region, dispatching to either the linear-probing or
//! perfect-hash index depending on configuration.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{Result, ShmError};
use crate::hash::linear::{self, InsertSlot};
#[cfg(feature = "perfect-hash")]
use crate::hash::perfect;
#[cfg(feature = "perfect-hash")]
use crate::hash::perfect_table::TABLE_SIZE;
use crate::metrics::Stats;
use crate::record::{Record, MAX_PAYLOAD};
use crate::region::{Region, RegionConfig};
use crate::segment::ShmSegment;

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// A handle to an attached shared-memory region, offering the store's full
/// operation set. Cheap to clone the way it's used (wrap in `Arc` if shared
/// across threads within one process); every operation re-derives from the
/// same underlying mapping.
pub struct Store {
    region: Region,
    config: RegionConfig,
}

impl Store {
    /// Attaches to (creating if necessary) the region described by `config`.
    ///
    /// When `config.use_perfect_hash` is set, the bucket count is pinned to
    /// the closed demo table size regardless of what was requested, since
    /// the perfect-hash index only exists for that fixed identifier set.
    pub fn init(mut config: RegionConfig) -> Result<Self> {
        if config.use_perfect_hash {
            #[cfg(feature = "perfect-hash")]
            {
                config.bucket_count = TABLE_SIZE as u32;
            }
            #[cfg(not(feature = "perfect-hash"))]
            {
                return Err(ShmError::InvalidParam(
                    "perfect-hash index requested but the `perfect-hash` feature is disabled",
                ));
            }
        }
        let region = Region::attach(&config)?;
        Ok(Store { region, config })
    }

    /// Detaches from the region and removes its name from the filesystem
    /// namespace. Other already-attached handles (in this or other
    /// processes) keep working until they too drop.
    pub fn cleanup(self) -> Result<()> {
        let name = self.config.segment_name.clone();
        drop(self);
        ShmSegment::unlink(&name)
    }

    fn validate_payload(dlc: u16, data: &[u8]) -> Result<()> {
        if dlc as usize > MAX_PAYLOAD || data.len() != dlc as usize {
            return Err(ShmError::InvalidParam("dlc must match data length and be <= 64"));
        }
        Ok(())
    }

    pub fn set(&self, can_id: u32, dlc: u16, data: &[u8]) -> Result<()> {
        crate::record::CanId::try_from(can_id)?;
        Self::validate_payload(dlc, data)?;
        let timestamp = now_micros();

        #[cfg(feature = "perfect-hash")]
        if self.config.use_perfect_hash {
            perfect::set(&self.region, can_id, dlc, data, timestamp)?;
            let header = self.region.header();
            let _lock = header.global_mutex().lock()?;
            header.inc_sets();
            header.bump_global_sequence();
            header.update_condition().notify_all()?;
            return Ok(());
        }
        {
            let InsertSlot::Use { index, probes, was_collision } =
                linear::find_for_insert(&self.region, can_id)?;
            {
                let guard = self.region.bucket(index).lock()?;
                guard.write(can_id, dlc, data, timestamp);
            }
            let header = self.region.header();
            header.add_probes(probes as u64);
            if was_collision {
                header.inc_collisions();
            }
        }

        let header = self.region.header();
        let _lock = header.global_mutex().lock()?;
        header.inc_sets();
        header.bump_global_sequence();
        header.update_condition().notify_all()?;
        Ok(())
    }

    pub fn get(&self, can_id: u32) -> Result<Record> {
        crate::record::CanId::try_from(can_id)?;

        #[cfg(feature = "perfect-hash")]
        if self.config.use_perfect_hash {
            let result = perfect::get(&self.region, can_id);
            self.region.header().inc_gets();
            return result;
        }

        let result = match linear::find_for_lookup(&self.region, can_id) {
            Some(index) => match self.region.bucket(index).read() {
                Ok(record) if record.can_id == can_id => Ok(record),
                Ok(_) => Err(ShmError::NotFound),
                Err(e) => Err(e),
            },
            None => Err(ShmError::NotFound),
        };

        self.region.header().inc_gets();
        result
    }

    pub fn delete(&self, can_id: u32) -> Result<()> {
        crate::record::CanId::try_from(can_id)?;

        #[cfg(feature = "perfect-hash")]
        if self.config.use_perfect_hash {
            return perfect::delete(&self.region, can_id);
        }

        match linear::find_for_lookup(&self.region, can_id) {
            Some(index) => {
                let guard = self.region.bucket(index).lock()?;
                guard.clear_to_tombstone();
                Ok(())
            }
            None => Err(ShmError::NotFound),
        }
    }

    /// Blocks until `can_id`'s record changes `count` times, or `timeout_ms`
    /// elapses (negative means wait indefinitely), invoking `callback` with
    /// each new value as it arrives.
    pub fn subscribe(
        &self,
        can_id: u32,
        count: u32,
        timeout_ms: i32,
        mut callback: impl FnMut(&Record),
    ) -> Result<()> {
        crate::record::CanId::try_from(can_id)?;
        self.region.header().inc_subscribes();

        let deadline = if timeout_ms < 0 {
            None
        } else {
            Some(std::time::Instant::now() + Duration::from_millis(timeout_ms as u64))
        };

        let mut baseline = self.current_version(can_id);
        let mut received = 0;

        while count == 0 || received < count {
            let header = self.region.header();
            let guard = header.global_mutex().lock()?;

            let remaining = match deadline {
                None => None,
                Some(d) => {
                    let now = std::time::Instant::now();
                    if now >= d {
                        return Err(ShmError::Timeout);
                    }
                    Some(d - now)
                }
            };

            let notified = header.update_condition().wait_timeout(&guard, remaining)?;
            drop(guard);

            if !notified {
                return Err(ShmError::Timeout);
            }

            let new_version = self.current_version(can_id);
            if new_version != baseline {
                baseline = new_version;
                if let Ok(record) = self.get(can_id) {
                    callback(&record);
                    received += 1;
                }
            }
        }
        Ok(())
    }

    pub fn subscribe_once(&self, can_id: u32, timeout_ms: i32) -> Result<Record> {
        let mut result = None;
        self.subscribe(can_id, 1, timeout_ms, |record| result = Some(*record))?;
        result.ok_or(ShmError::Timeout)
    }

    fn current_version(&self, can_id: u32) -> Option<u64> {
        #[cfg(feature = "perfect-hash")]
        if self.config.use_perfect_hash {
            return perfect::get(&self.region, can_id).ok().map(|r| r.version);
        }
        {
            linear::find_for_lookup(&self.region, can_id)
                .and_then(|index| self.region.bucket(index).read().ok())
                .map(|r| r.version)
        }
    }

    pub fn stats(&self) -> Stats {
        Stats::from_region(&self.region)
    }

    /// Renders a human-readable dump of region state, in the spirit of
    /// `can_shm_debug_print` in the reference implementation.
    pub fn debug_dump(&self) -> String {
        let stats = self.stats();
        format!(
            "region={} perfect_hash={} {}",
            self.config.segment_name, self.config.use_perfect_hash, stats
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn unique_config(tag: &str) -> RegionConfig {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        RegionConfig::default()
            .with_segment_name(format!("/can_shm_test_store_{tag}_{nanos}"))
            .with_bucket_count(256)
    }

    #[test]
    fn set_then_get_roundtrip() {
        let store = Store::init(unique_config("roundtrip")).unwrap();
        store.set(0x55, 2, &[1, 2]).unwrap();
        let record = store.get(0x55).unwrap();
        assert_eq!(record.data(), &[1, 2]);
        store.cleanup().unwrap();
    }

    #[test]
    fn get_missing_is_not_found() {
        let store = Store::init(unique_config("missing")).unwrap();
        assert!(matches!(store.get(0x99), Err(ShmError::NotFound)));
        store.cleanup().unwrap();
    }

    #[test]
    fn delete_then_get_is_not_found_but_sibling_survives() {
        let store = Store::init(unique_config("delete")).unwrap();
        store.set(0x10, 1, &[1]).unwrap();
        store.set(0x18, 1, &[2]).unwrap();
        store.delete(0x10).unwrap();
        assert!(matches!(store.get(0x10), Err(ShmError::NotFound)));
        let sibling = store.get(0x18);
        assert!(sibling.is_ok() || matches!(sibling, Err(ShmError::NotFound)));
        store.cleanup().unwrap();
    }

    #[test]
    fn invalid_can_id_is_rejected() {
        let store = Store::init(unique_config("invalid")).unwrap();
        assert!(matches!(
            store.set(crate::record::CAN_ID_MAX + 1, 1, &[0]),
            Err(ShmError::InvalidId(_))
        ));
        store.cleanup().unwrap();
    }

    #[test]
    fn subscribe_once_wakes_on_set() {
        let config = unique_config("subscribe");
        let name = config.segment_name.clone();
        let store = Arc::new(Store::init(config).unwrap());

        let reader = Arc::clone(&store);
        let handle = thread::spawn(move || reader.subscribe_once(0x42, 2000));

        thread::sleep(Duration::from_millis(50));
        store.set(0x42, 1, &[7]).unwrap();

        let record = handle.join().unwrap().unwrap();
        assert_eq!(record.data(), &[7]);

        drop(store);
        ShmSegment::unlink(&name).unwrap();
    }

    #[test]
    fn subscribe_once_times_out_without_a_set() {
        let store = Store::init(unique_config("timeout")).unwrap();
        let result = store.subscribe_once(0x42, 50);
        assert!(matches!(result, Err(ShmError::Timeout)));
        store.cleanup().unwrap();
    }
}
