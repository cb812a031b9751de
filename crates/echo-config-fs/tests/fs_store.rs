// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! FsConfigStore round-trips through a temporary directory.
#![allow(clippy::unwrap_used)]

use echo_app_core::config::{ConfigError, ConfigStore};
use echo_config_fs::FsConfigStore;

#[test]
fn missing_key_is_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FsConfigStore::at(tmp.path()).unwrap();
    assert!(matches!(store.load_raw("config"), Err(ConfigError::NotFound)));
}

#[test]
fn saved_blob_lands_in_yml_file() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FsConfigStore::at(tmp.path().join("nested")).unwrap();
    store.save_raw("config", b"enabled: true\n").unwrap();

    assert_eq!(store.path_for("config"), tmp.path().join("nested/config.yml"));
    assert_eq!(store.load_raw("config").unwrap(), b"enabled: true\n");
    assert!(!tmp.path().join("nested/config.yml.tmp").exists());
}

#[test]
fn overwrite_replaces_previous_contents() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FsConfigStore::at(tmp.path()).unwrap();
    store.save_raw("config", b"a: 1\nb: 2\n").unwrap();
    store.save_raw("config", b"a: 3\n").unwrap();
    assert_eq!(store.load_raw("config").unwrap(), b"a: 3\n");
    assert_eq!(store.data_dir(), tmp.path());
}
