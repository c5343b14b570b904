//! Integration tests for configuration loading and persistence
//!
//! Covers:
//! - Missing config file falls back to defaults and writes them out
//! - Malformed config file is reported, not silently replaced
//! - Config path resolution priority (CLI > env > platform default)
//! - ConfigStore updates are persisted
//!
//! Tests that touch VIDSYNC_CONFIG are marked #[serial] so they do not race
//! each other on the process environment.

use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;
use vidsync_common::config::{
    default_config_path, resolve_config_path, ConfigStore, SyncMode, TomlConfig, CONFIG_ENV_VAR,
};

#[test]
fn test_missing_file_uses_defaults_and_creates_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let config = TomlConfig::load_or_create(&path).unwrap();

    assert_eq!(config, TomlConfig::default());
    assert!(path.exists(), "default config should be written out");

    // Written file must load back to the same values
    let reloaded = TomlConfig::load_or_create(&path).unwrap();
    assert_eq!(reloaded, config);
}

#[test]
fn test_malformed_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "port = \"not a number\"").unwrap();

    assert!(TomlConfig::load_or_create(&path).is_err());
    // The broken file is left alone for the user to fix
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "port = \"not a number\""
    );
}

#[test]
fn test_save_round_trips_nested_sections() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");

    let mut config = TomlConfig::default();
    config.media_dir = PathBuf::from("/srv/media");
    config.sync_mode = SyncMode::Primary;
    config.engine.extra_args = vec!["--mute=yes".to_string()];
    config.sync.reconnect_backoff_ms = 250;
    config.save(&path).unwrap();

    let loaded = TomlConfig::load_or_create(&path).unwrap();
    assert_eq!(loaded.media_dir, PathBuf::from("/srv/media"));
    assert_eq!(loaded.sync_mode, SyncMode::Primary);
    assert_eq!(loaded.engine.extra_args, vec!["--mute=yes".to_string()]);
    assert_eq!(loaded.sync.reconnect_backoff_ms, 250);
}

#[test]
#[serial]
fn test_cli_argument_wins_over_env() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/vidsync-env.toml");

    let cli = PathBuf::from("/tmp/vidsync-cli.toml");
    assert_eq!(resolve_config_path(Some(&cli)), cli);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_used_without_cli_argument() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/vidsync-env.toml");

    assert_eq!(
        resolve_config_path(None),
        PathBuf::from("/tmp/vidsync-env.toml")
    );

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_platform_default_when_nothing_set() {
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(resolve_config_path(None), default_config_path());
    assert!(default_config_path().ends_with("config.toml") || default_config_path().ends_with("vidsync.toml"));
}

#[test]
fn test_config_store_update_persists() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    let store = ConfigStore::new(path.clone(), TomlConfig::default());

    store
        .update(|c| {
            c.volume = 40;
            c.sync_mode = SyncMode::Subordinate;
            c.primary_address = "192.168.1.20".to_string();
        })
        .unwrap();

    assert_eq!(store.get().volume, 40);
    assert_eq!(store.path(), path.as_path());

    let on_disk = TomlConfig::load_or_create(&path).unwrap();
    assert_eq!(on_disk.volume, 40);
    assert_eq!(on_disk.sync_mode, SyncMode::Subordinate);
    assert_eq!(on_disk.primary_address, "192.168.1.20");
}

#[test]
#[serial]
fn test_config_store_open_uses_cli_path() {
    env::remove_var(CONFIG_ENV_VAR);
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("device.toml");
    std::fs::write(&path, "port = 9191\n").unwrap();

    let store = ConfigStore::open(Some(&path)).unwrap();
    assert_eq!(store.get().port, 9191);
    assert_eq!(store.path(), path.as_path());
}
