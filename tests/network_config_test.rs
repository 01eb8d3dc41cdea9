use pipelink::Error;
use pipelink::infrastructure::config::AppConfig;
use pipelink::network::config::{
    DEFAULT_PACKET_SIZE, DEFAULT_POLL_INTERVAL, DEFAULT_PORT, ListenerConfig, default_download_dir,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn test_default_listener_config() {
    let config = ListenerConfig::default();

    assert_eq!(config.port, DEFAULT_PORT);
    assert_eq!(config.port, 30000);
    assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
    assert_eq!(config.download_dir, default_download_dir());
    assert!(config.download_dir.ends_with("Downloads"));
}

#[test]
fn test_custom_listener_config() {
    let config = ListenerConfig::new(12345)
        .with_download_dir("/tmp/incoming")
        .with_poll_interval(Duration::from_millis(5));

    assert_eq!(config.port, 12345);
    assert_eq!(config.download_dir, PathBuf::from("/tmp/incoming"));
    assert_eq!(config.poll_interval, Duration::from_millis(5));
}

#[test]
fn test_bind_addr() {
    let config = ListenerConfig::new(8080);
    let expected: SocketAddr = "0.0.0.0:8080".parse().unwrap();
    assert_eq!(config.bind_addr(), expected);
}

#[test]
fn test_app_config_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pipelink.json");
    let path = path.to_str().unwrap();

    let config = AppConfig {
        listen_port: 31000,
        destination_address: Some("127.0.0.1".to_string()),
        download_directory: dir.path().join("dl").to_string_lossy().into_owned(),
        ..AppConfig::default()
    };
    config.save_to_file(path).unwrap();

    let loaded = AppConfig::load(path).unwrap();
    assert_eq!(loaded, config);
    loaded.validate().unwrap();

    loaded.ensure_directories().unwrap();
    assert!(loaded.download_dir_path().is_dir());

    let listener_config = loaded.listener_config();
    assert_eq!(listener_config.port, 31000);
    assert_eq!(listener_config.download_dir, loaded.download_dir_path());
}

#[test]
fn test_load_or_default_falls_back() {
    let config = AppConfig::load_or_default(Some("/definitely/not/here.json"));
    assert_eq!(config, AppConfig::default());
    assert_eq!(AppConfig::load_or_default(None), AppConfig::default());
}

#[test]
fn test_load_rejects_bad_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(matches!(
        AppConfig::load(path.to_str().unwrap()),
        Err(Error::Json(_))
    ));
}

#[test]
fn test_validate_rejects_bad_values() {
    let config = AppConfig {
        poll_interval_ms: 0,
        ..AppConfig::default()
    };
    assert!(matches!(config.validate(), Err(Error::Config(_))));

    let config = AppConfig {
        packet_size: DEFAULT_PACKET_SIZE / 100,
        ..AppConfig::default()
    };
    assert!(matches!(config.validate(), Err(Error::Config(_))));

    let config = AppConfig {
        destination_address: Some("999.1.1.1".to_string()),
        ..AppConfig::default()
    };
    assert!(matches!(config.validate(), Err(Error::InvalidAddress(_))));
}
