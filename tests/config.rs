//! Configuration checks driven from outside the library, the way the
//! binary does it: load, apply CLI-style overrides, then validate again.

use segue::config::Config;

#[test]
fn test_overridden_config_revalidates() {
    let mut config = Config::default();
    config.host = "0.0.0.0".to_string();
    config.port = 7100;
    config.validate().expect("address overrides leave settings valid");

    // A bad runtime setting must still be caught after the override pass.
    config.settings.volume = 1.5;
    assert!(config.validate().is_err());
}

#[test]
fn test_load_rejects_zero_near_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[settings]\nnear_end_ms = 0\n").unwrap();
    assert!(Config::load(Some(&path)).is_err());
}
