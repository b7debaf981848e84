//! Sink API key loading: keychain first, environment variable fallback.

use serial_test::serial;
use tasting_sync::config::{GlobalConfig, API_KEY_ENV};
use tasting_sync::AppError;

fn config_with_sink() -> GlobalConfig {
    GlobalConfig::from_toml_str("[sink]\nendpoint = \"https://backend.example.com\"\n")
        .expect("valid config")
}

#[tokio::test]
#[serial]
async fn env_var_supplies_api_key() {
    std::env::set_var(API_KEY_ENV, "anon-key-123");
    let mut config = config_with_sink();

    config.load_credentials().await.expect("credentials");
    std::env::remove_var(API_KEY_ENV);

    assert_eq!(config.sink.expect("sink").api_key, "anon-key-123");
}

#[tokio::test]
#[serial]
async fn missing_key_is_config_error() {
    std::env::remove_var(API_KEY_ENV);
    let mut config = config_with_sink();

    let err = config.load_credentials().await.unwrap_err();
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains(API_KEY_ENV)));
}

#[tokio::test]
#[serial]
async fn no_sink_needs_no_credentials() {
    std::env::remove_var(API_KEY_ENV);
    let mut config = GlobalConfig::from_toml_str("").expect("defaults");

    config.load_credentials().await.expect("nothing to load");
    assert!(config.sink.is_none());
}
