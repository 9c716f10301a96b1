//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;

use dut_cache::{Config, FactsCache};
use dut_utils::test::setup;
use tempfile::TempDir;

//
// Helper functions.
//

fn persistent_cache(dir: &TempDir) -> FactsCache {
    let config = Config {
        enabled: true,
        persistent: true,
        dir: dir.path().join("cache").display().to_string(),
    };
    FactsCache::new(&config)
}

//
// Tests.
//

#[test]
fn read_missing_entry() {
    setup();

    let cache = FactsCache::in_memory();
    assert_eq!(cache.read::<String>("dut1", "host_vars"), None);
}

#[test]
fn entries_are_zoned() {
    setup();

    let cache = FactsCache::in_memory();
    cache.write("dut1", "os_version", &"4.1".to_owned()).unwrap();
    cache.write("dut2", "os_version", &"4.2".to_owned()).unwrap();

    assert_eq!(
        cache.read::<String>("dut1", "os_version").as_deref(),
        Some("4.1")
    );
    assert_eq!(
        cache.read::<String>("dut2", "os_version").as_deref(),
        Some("4.2")
    );
}

#[test]
fn stored_null_is_not_absent() {
    setup();

    let cache = FactsCache::in_memory();
    cache.write("dut1", "mgmt_ip", &None::<String>).unwrap();

    assert_eq!(cache.read::<Option<String>>("dut1", "mgmt_ip"), Some(None));
}

#[test]
fn undecodable_entry_reads_as_absent() {
    setup();

    let cache = FactsCache::in_memory();
    cache.write("dut1", "asic_count", &"many".to_owned()).unwrap();

    assert_eq!(cache.read::<u32>("dut1", "asic_count"), None);
}

#[test]
fn persistent_across_instances() {
    setup();

    let dir = tempfile::tempdir().unwrap();
    let facts = BTreeMap::from([("hwsku".to_owned(), "ACS-MSN2700".to_owned())]);
    {
        let cache = persistent_cache(&dir);
        cache.write("str-msn2700-01", "host_vars", &facts).unwrap();
        assert!(
            dir.path()
                .join("cache")
                .join("str-msn2700-01.json")
                .exists()
        );
    }

    let cache = persistent_cache(&dir);
    assert_eq!(
        cache.read::<BTreeMap<String, String>>("str-msn2700-01", "host_vars"),
        Some(facts)
    );
}

#[test]
fn similar_zone_names_stay_separate() {
    setup();

    let dir = tempfile::tempdir().unwrap();
    {
        let cache = persistent_cache(&dir);
        cache.write("a/b", "host_vars", &"slash".to_owned()).unwrap();
        cache.write("a_b", "host_vars", &"underscore".to_owned()).unwrap();
        cache.write("a%2Fb", "host_vars", &"escaped".to_owned()).unwrap();
    }

    let cache = persistent_cache(&dir);
    for (zone, value) in [("a/b", "slash"), ("a_b", "underscore"), ("a%2Fb", "escaped")] {
        assert_eq!(
            cache.read::<String>(zone, "host_vars").as_deref(),
            Some(value)
        );
    }

    cache.cleanup(Some("a/b"), None).unwrap();
    let cache = persistent_cache(&dir);
    assert_eq!(cache.read::<String>("a/b", "host_vars"), None);
    assert_eq!(
        cache.read::<String>("a_b", "host_vars").as_deref(),
        Some("underscore")
    );
}

#[test]
fn corrupt_zone_file_starts_over() {
    setup();

    let dir = tempfile::tempdir().unwrap();
    let location = dir.path().join("cache");
    std::fs::create_dir_all(&location).unwrap();
    std::fs::write(location.join("dut1.json"), "{not json").unwrap();

    let cache = persistent_cache(&dir);
    assert_eq!(cache.read::<String>("dut1", "host_vars"), None);
    cache.write("dut1", "host_vars", &"ok".to_owned()).unwrap();
    assert_eq!(
        cache.read::<String>("dut1", "host_vars").as_deref(),
        Some("ok")
    );
}

#[test]
fn cleanup_single_entry() {
    setup();

    let cache = FactsCache::in_memory();
    cache.write("dut1", "a", &1).unwrap();
    cache.write("dut1", "b", &2).unwrap();

    cache.cleanup(Some("dut1"), Some("a")).unwrap();
    assert_eq!(cache.read::<u32>("dut1", "a"), None);
    assert_eq!(cache.read::<u32>("dut1", "b"), Some(2));
}

#[test]
fn cleanup_zone() {
    setup();

    let dir = tempfile::tempdir().unwrap();
    let cache = persistent_cache(&dir);
    cache.write("dut1", "a", &1).unwrap();
    cache.write("dut2", "a", &2).unwrap();

    cache.cleanup(Some("dut1"), None).unwrap();
    assert!(!dir.path().join("cache").join("dut1.json").exists());
    assert_eq!(cache.read::<u32>("dut1", "a"), None);
    assert_eq!(cache.read::<u32>("dut2", "a"), Some(2));
}

#[test]
fn cleanup_everything() {
    setup();

    let dir = tempfile::tempdir().unwrap();
    let cache = persistent_cache(&dir);
    cache.write("dut1", "a", &1).unwrap();
    cache.write("dut2", "a", &2).unwrap();

    cache.cleanup(None, None).unwrap();
    assert!(!dir.path().join("cache").exists());
    assert_eq!(cache.read::<u32>("dut1", "a"), None);
    assert_eq!(cache.read::<u32>("dut2", "a"), None);

    // The cache stays usable after a full cleanup.
    cache.write("dut1", "a", &3).unwrap();
    assert_eq!(cache.read::<u32>("dut1", "a"), Some(3));
}
