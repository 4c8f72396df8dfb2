// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ties a [`ShmSegment`] to a typed view over [`RegionHeader`] plus its
//! trailing bucket array.

use crate::bucket::Bucket;
use crate::error::{Result, ShmError};
use crate::header::{RegionHeader, DEFAULT_BUCKET_COUNT, DEFAULT_SEGMENT_NAME};
use crate::segment::ShmSegment;

/// Configuration for creating or attaching to a region.
#[derive(Debug, Clone)]
pub struct RegionConfig {
    pub segment_name: String,
    pub bucket_count: u32,
    pub use_perfect_hash: bool,
}

impl Default for RegionConfig {
    fn default() -> Self {
        RegionConfig {
            segment_name: DEFAULT_SEGMENT_NAME.to_string(),
            bucket_count: DEFAULT_BUCKET_COUNT,
            use_perfect_hash: false,
        }
    }
}

impl RegionConfig {
    pub fn with_segment_name(mut self, name: impl Into<String>) -> Self {
        self.segment_name = name.into();
        self
    }

    pub fn with_bucket_count(mut self, count: u32) -> Self {
        self.bucket_count = count;
        self
    }

    pub fn with_perfect_hash(mut self, enabled: bool) -> Self {
        self.use_perfect_hash = enabled;
        self
    }

    fn region_size(&self) -> usize {
        RegionHeader::SIZE + self.bucket_count as usize * std::mem::size_of::<Bucket>()
    }
}

/// An attached shared-memory region: a live mapping plus typed pointers into
/// it. Kept alive for as long as the owning [`crate::store::Store`] lives.
pub struct Region {
    _segment: ShmSegment,
    header_ptr: *mut RegionHeader,
    buckets_ptr: *mut Bucket,
    bucket_count: u32,
}

// SAFETY: `header_ptr`/`buckets_ptr` point into the shared-memory mapping
// owned by `_segment`, which is `Send`/`Sync` by the same reasoning as
// `RawMutex`/`RawCondvar` — the pointed-to pthread primitives are designed
// for concurrent cross-process use.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    pub fn attach(config: &RegionConfig) -> Result<Self> {
        if config.bucket_count == 0 {
            return Err(ShmError::InvalidParam("bucket_count must be nonzero"));
        }
        let size = config.region_size();
        let (segment, created) = ShmSegment::create_or_open(&config.segment_name, size)?;

        let header_ptr = segment.as_ptr() as *mut RegionHeader;
        let buckets_ptr = unsafe { (segment.as_ptr() as *mut u8).add(RegionHeader::SIZE) } as *mut Bucket;

        if created {
            unsafe { RegionHeader::init_in_place(header_ptr, config.bucket_count)? };
            for i in 0..config.bucket_count as isize {
                unsafe { Bucket::init_in_place(buckets_ptr.offset(i))? };
            }
            log::debug!(
                "initialized region {} with {} buckets",
                config.segment_name,
                config.bucket_count
            );
        } else {
            let header = unsafe { &*header_ptr };
            let mut spins = 0;
            while !header.is_initialized() {
                spins += 1;
                if spins > 10_000 {
                    return Err(ShmError::Corruption("region never became initialized"));
                }
                std::thread::yield_now();
            }
            if header.bucket_count() != config.bucket_count {
                return Err(ShmError::Corruption("bucket_count mismatch with existing region"));
            }
            log::debug!("attached to existing region {}", config.segment_name);
        }

        Ok(Region {
            _segment: segment,
            header_ptr,
            buckets_ptr,
            bucket_count: config.bucket_count,
        })
    }

    pub fn header(&self) -> &RegionHeader {
        unsafe { &*self.header_ptr }
    }

    pub fn bucket(&self, index: u32) -> &Bucket {
        debug_assert!(index < self.bucket_count);
        unsafe { &*self.buckets_ptr.offset(index as isize) }
    }

    pub fn bucket_count(&self) -> u32 {
        self.bucket_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_config(tag: &str) -> RegionConfig {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        RegionConfig::default()
            .with_segment_name(format!("/can_shm_test_region_{tag}_{nanos}"))
            .with_bucket_count(64)
    }

    #[test]
    fn attach_twice_shares_state() {
        let config = unique_config("shared");
        let region_a = Region::attach(&config).unwrap();
        let region_b = Region::attach(&config).unwrap();

        {
            let guard = region_a.bucket(3).lock().unwrap();
            guard.write(0x77, 1, &[5], 1);
        }
        assert_eq!(region_b.bucket(3).read().unwrap().can_id, 0x77);

        drop(region_a);
        drop(region_b);
        ShmSegment::unlink(&config.segment_name).unwrap();
    }
}
