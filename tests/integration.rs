// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end tests against the public API, exercising the store as a
//! black box the way a producer/consumer pair of processes would.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use can_shm::region::RegionConfig;
use can_shm::store::Store;
use can_shm::ShmError;

fn unique_config(tag: &str) -> RegionConfig {
    let _ = env_logger::builder().is_test(true).try_init();
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    RegionConfig::default()
        .with_segment_name(format!("/can_shm_it_{tag}_{nanos}"))
        .with_bucket_count(512)
}

#[test]
fn scenario_set_then_get_returns_same_frame() {
    let store = Store::init(unique_config("set_get")).unwrap();
    store.set(0x7DE, 8, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();

    let record = store.get(0x7DE).unwrap();
    assert_eq!(record.can_id, 0x7DE);
    assert_eq!(record.dlc, 8);
    assert_eq!(record.data(), &[1, 2, 3, 4, 5, 6, 7, 8]);

    store.cleanup().unwrap();
}

#[test]
fn scenario_get_on_empty_table_is_not_found() {
    let store = Store::init(unique_config("empty")).unwrap();
    assert!(matches!(store.get(0x123), Err(ShmError::NotFound)));
    store.cleanup().unwrap();
}

#[test]
fn scenario_two_handles_see_each_others_writes() {
    let config = unique_config("two_handles");
    let writer = Store::init(config.clone()).unwrap();
    let reader = Store::init(config.clone()).unwrap();

    writer.set(0x301, 1, &[0xAB]).unwrap();
    assert_eq!(reader.get(0x301).unwrap().data(), &[0xAB]);

    drop(writer);
    drop(reader);
    can_shm::segment::ShmSegment::unlink(&config.segment_name).unwrap();
}

#[test]
fn scenario_repeated_set_increments_version_and_is_observable() {
    let store = Store::init(unique_config("versions")).unwrap();
    store.set(0x10, 1, &[1]).unwrap();
    let first = store.get(0x10).unwrap();
    store.set(0x10, 1, &[2]).unwrap();
    let second = store.get(0x10).unwrap();

    assert!(second.version > first.version);
    assert_eq!(second.data(), &[2]);

    store.cleanup().unwrap();
}

#[test]
fn scenario_delete_then_sibling_lookup_still_succeeds() {
    let store = Store::init(unique_config("delete_sibling")).unwrap();

    let home = can_shm::hash::mix29(0x10, 512);
    let mut sibling_id = 0x10u32;
    loop {
        sibling_id += 512;
        if can_shm::hash::mix29(sibling_id, 512) == home {
            break;
        }
    }

    store.set(0x10, 1, &[1]).unwrap();
    store.set(sibling_id, 1, &[2]).unwrap();
    store.delete(0x10).unwrap();

    assert!(matches!(store.get(0x10), Err(ShmError::NotFound)));
    assert_eq!(store.get(sibling_id).unwrap().data(), &[2]);

    store.cleanup().unwrap();
}

#[test]
fn scenario_subscribe_delivers_count_updates_in_order() {
    let config = unique_config("subscribe_count");
    let name = config.segment_name.clone();
    let store = Arc::new(Store::init(config).unwrap());

    let reader = Arc::clone(&store);
    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        reader
            .subscribe(0x55, 3, 5_000, |record| seen.push(record.data()[0]))
            .unwrap();
        seen
    });

    thread::sleep(Duration::from_millis(30));
    for v in [1u8, 2, 3] {
        store.set(0x55, 1, &[v]).unwrap();
        thread::sleep(Duration::from_millis(10));
    }

    let seen = handle.join().unwrap();
    assert_eq!(seen, vec![1, 2, 3]);

    drop(store);
    can_shm::segment::ShmSegment::unlink(&name).unwrap();
}

#[test]
fn scenario_subscribe_once_times_out_with_no_writer() {
    let store = Store::init(unique_config("subscribe_timeout")).unwrap();
    let result = store.subscribe_once(0x99, 60);
    assert!(matches!(result, Err(ShmError::Timeout)));
    store.cleanup().unwrap();
}

#[test]
fn scenario_perfect_hash_admissible_set_round_trips() {
    let config = unique_config("perfect")
        .with_perfect_hash(true);
    let store = Store::init(config).unwrap();

    for &id in &can_shm::DEMO_CAN_IDS {
        store.set(id, 2, &[0x11, 0x22]).unwrap();
    }
    for &id in &can_shm::DEMO_CAN_IDS {
        assert_eq!(store.get(id).unwrap().data(), &[0x11, 0x22]);
    }

    assert!(matches!(store.set(0x999, 1, &[0]), Err(ShmError::InvalidId(_))));

    store.cleanup().unwrap();
}
