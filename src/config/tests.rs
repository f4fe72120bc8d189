use super::*;
use serial_test::serial;
use std::fs;
use tempfile::TempDir;

fn missing_file(dir: &TempDir) -> String {
    dir.path().join("absent").to_string_lossy().into_owned()
}

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.node.namespace, "sb");
    assert_eq!(settings.registry.alive_interval_secs, 30);
    assert_eq!(settings.requests.beat_millis, 1000);
    assert_eq!(settings.requests.default_timeout_beats, 30);
    assert_eq!(settings.logging.level, "info");
    assert!(settings.validate().is_ok());
}

#[test]
fn test_merge_keeps_given_values() {
    let partial = PartialSettings {
        registry: Some(super::settings::PartialRegistrySettings {
            alive_interval_secs: Some(5),
        }),
        ..Default::default()
    };
    let settings = Settings::merge(partial);
    assert_eq!(settings.registry.alive_interval_secs, 5);
    assert_eq!(settings.node, Settings::default().node);
}

#[test]
fn test_validate_rejects_bad_values() {
    let mut settings = Settings::default();
    settings.registry.alive_interval_secs = 0;
    assert!(matches!(settings.validate(), Err(BusError::Config(_))));

    let mut settings = Settings::default();
    settings.node.namespace = "a|b".into();
    assert!(settings.validate().is_err());

    let mut settings = Settings::default();
    settings.requests.default_timeout_beats = 0;
    assert!(settings.validate().is_err());
}

#[test]
#[serial]
fn test_load_config_without_sources_uses_defaults() {
    let dir = TempDir::new().unwrap();
    temp_env::with_vars_unset(
        ["SWITCHBOARD__NODE__ID", "SWITCHBOARD__REGISTRY__ALIVE_INTERVAL_SECS"],
        || {
            let settings = load_config_from(&missing_file(&dir)).unwrap();
            assert_eq!(settings, Settings::default());
        },
    );
}

#[test]
#[serial]
fn test_load_config_from_file_overrides_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("node.toml");
    fs::write(
        &path,
        r#"
            [node]
            id = "node-a"
            namespace = "fabric"

            [requests]
            beat_millis = 250
        "#,
    )
    .unwrap();

    temp_env::with_vars_unset(["SWITCHBOARD__NODE__ID"], || {
        let settings = load_config_from(path.to_str().unwrap()).unwrap();
        assert_eq!(settings.node.id, "node-a");
        assert_eq!(settings.node.namespace, "fabric");
        assert_eq!(settings.requests.beat_millis, 250);
        assert_eq!(settings.requests.default_timeout_beats, 30);
    });
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("node.toml");
    fs::write(&path, "[node]\nid = \"from-file\"\n").unwrap();

    temp_env::with_vars(
        [
            ("SWITCHBOARD__NODE__ID", Some("from-env")),
            ("SWITCHBOARD__REGISTRY__ALIVE_INTERVAL_SECS", Some("7")),
        ],
        || {
            let settings = load_config_from(path.to_str().unwrap()).unwrap();
            assert_eq!(settings.node.id, "from-env");
            assert_eq!(settings.registry.alive_interval_secs, 7);
        },
    );
}

#[test]
#[serial]
fn test_invalid_environment_value_is_rejected() {
    let dir = TempDir::new().unwrap();
    temp_env::with_vars(
        [("SWITCHBOARD__REGISTRY__ALIVE_INTERVAL_SECS", Some("0"))],
        || {
            let err = load_config_from(&missing_file(&dir)).unwrap_err();
            assert!(matches!(err, BusError::Config(_)));
        },
    );
}
