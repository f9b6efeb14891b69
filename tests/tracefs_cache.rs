//! End-to-end tests: mount table -> tracing directory -> format files -> cache.
//!
//! Most tests run against a fake tracefs tree in a temp dir. The test that
//! reads the real tracing directory needs root and is `#[ignore]`d:
//! ```
//! sudo cargo test --test tracefs_cache -- --ignored
//! ```

mod common;

use std::sync::Arc;

use common::{FakeTracefs, SCHED_SWITCH, SCHED_WAKEUP};
use tracepoint_cache::{
    FieldArray, TracepointCache, TracepointError, TracepointName, TracingDirResolver,
};

fn cache_for(fake: &FakeTracefs) -> TracepointCache {
    TracepointCache::with_resolver(Arc::new(TracingDirResolver::new(fake.mounts())))
}

#[test]
fn test_tracefs_mount() {
    let fake = FakeTracefs::new(false);
    fake.add_event("sched", "sched_switch", SCHED_SWITCH);

    let mut cache = cache_for(&fake);
    let name = TracepointName::new("sched", "sched_switch");
    let metadata = cache.find_or_add_from_system(name).unwrap();
    assert_eq!(metadata.id(), 316);
    assert_eq!(metadata.name(), name);
    assert_eq!(
        cache.resolver().tracing_dir(),
        Some(fake.tracing_dir.as_path())
    );
}

#[test]
fn test_debugfs_mount() {
    let fake = FakeTracefs::new(true);
    fake.add_event("sched", "sched_wakeup", SCHED_WAKEUP);

    let mut cache = cache_for(&fake);
    let metadata = cache
        .add_from_system(TracepointName::new("sched", "sched_wakeup"))
        .unwrap();
    assert_eq!(metadata.id(), 318);
    assert!(cache
        .resolver()
        .tracing_dir()
        .unwrap()
        .ends_with("kernel/tracing"));
}

#[test]
fn test_name_and_id_lookups_agree() {
    let fake = FakeTracefs::new(false);
    fake.add_event("sched", "sched_switch", SCHED_SWITCH)
        .add_event("sched", "sched_wakeup", SCHED_WAKEUP);

    let mut cache = cache_for(&fake);
    for event in ["sched_switch", "sched_wakeup"] {
        cache
            .add_from_system(TracepointName::new("sched", event))
            .unwrap();
    }

    for event in ["sched_switch", "sched_wakeup"] {
        let by_name = cache
            .find_by_name(TracepointName::new("sched", event))
            .unwrap();
        let by_id = cache.find_by_id(by_name.id()).unwrap();
        assert!(std::ptr::eq(by_name, by_id));
    }
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_readd_keeps_prior_results() {
    let fake = FakeTracefs::new(false);
    fake.add_event("sched", "sched_switch", SCHED_SWITCH);

    let mut cache = cache_for(&fake);
    let name = TracepointName::new("sched", "sched_switch");
    cache.add_from_system(name).unwrap();

    let err = cache.add_from_system(name).unwrap_err();
    assert!(matches!(err, TracepointError::AlreadyExists { id: 316, .. }));
    let err = cache.add_from_format("sched", SCHED_SWITCH, true).unwrap_err();
    assert!(err.is_already_exists());

    assert_eq!(cache.len(), 1);
    assert_eq!(cache.find_by_id(316).unwrap().name(), name);
    assert_eq!(cache.find_by_name(name).unwrap().id(), 316);

    assert_eq!(cache.find_or_add_from_system(name).unwrap().id(), 316);
}

#[test]
fn test_raw_sample_dispatch() {
    let fake = FakeTracefs::new(false);
    fake.add_event("sched", "sched_switch", SCHED_SWITCH)
        .add_event("sched", "sched_wakeup", SCHED_WAKEUP);

    let mut cache = cache_for(&fake);
    assert!(cache.find_by_raw_data(&[0u8; 64]).is_none());

    cache
        .find_or_add_from_system(TracepointName::new("sched", "sched_switch"))
        .unwrap();
    cache
        .find_or_add_from_system(TracepointName::new("sched", "sched_wakeup"))
        .unwrap();
    assert_eq!(cache.common_type_offset(), Some(0));
    assert_eq!(cache.common_type_size(), Some(2));

    let mut sample = vec![0u8; 36];
    sample[..2].copy_from_slice(&318u16.to_ne_bytes());
    let metadata = cache.find_by_raw_data(&sample).unwrap();
    assert_eq!(metadata.event_name(), "sched_wakeup");

    let comm = metadata.field("comm").unwrap();
    assert_eq!(comm.array(), FieldArray::Fixed(16));
    assert_eq!(comm.offset(), 8);

    sample[..2].copy_from_slice(&9u16.to_ne_bytes());
    assert!(cache.find_by_raw_data(&sample).is_none());
    assert!(cache.find_by_raw_data(&[0x3e]).is_none());
}

#[test]
fn test_no_tracing_mount() {
    let fake = FakeTracefs::new(false);
    std::fs::write(fake.mounts(), "proc /proc proc rw 0 0\n").unwrap();

    let mut cache = cache_for(&fake);
    let err = cache
        .find_or_add_from_system(TracepointName::new("sched", "sched_switch"))
        .unwrap_err();
    assert!(matches!(err, TracepointError::Unsupported));
    assert_eq!(err.errno(), nix::errno::Errno::ENOTSUP);
    assert!(cache.is_empty());
}

#[test]
fn test_missing_event() {
    let fake = FakeTracefs::new(false);
    let mut cache = cache_for(&fake);
    let err = cache
        .find_or_add_from_system(TracepointName::new("sched", "sched_switch"))
        .unwrap_err();
    assert!(matches!(err, TracepointError::NotFound { .. }));
    assert!(cache.is_empty());
    assert_eq!(cache.common_type(), None);
}

#[test]
#[ignore] // Requires root and a mounted tracefs
fn test_real_sched_switch() {
    let mut cache = TracepointCache::new();
    let metadata = cache
        .find_or_add_from_system(TracepointName::new("sched", "sched_switch"))
        .expect("Failed to load sched:sched_switch");
    assert_eq!(metadata.event_name(), "sched_switch");
    assert!(metadata.field("prev_pid").is_some());
    let size = metadata.common_type_size();
    assert_eq!(cache.common_type_size(), Some(size));
}
