//! Tests for configuration loading from files

use img_transform_gateway::config::Settings;
use std::io::Write;

#[test]
fn test_load_from_toml_file() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    write!(
        file,
        r#"
[server]
port = 9090

[prompt]
max_length = 64

[rate_limit.per_client]
times = 2
window_secs = 30

[engine]
kind = "mock"
"#
    )
    .unwrap();

    let settings = Settings::load_from_path(file.path()).unwrap();
    assert_eq!(settings.server.port, 9090);
    assert_eq!(settings.prompt.max_length, 64);
    assert_eq!(settings.rate_limit.per_client.times, 2);
    assert_eq!(settings.rate_limit.per_client.window_secs, 30);
    // Untouched sections keep their defaults.
    assert_eq!(settings.image.max_file_size, 10 * 1024 * 1024);
    assert!(settings.validate().is_ok());
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let settings = Settings::load_from_path("does/not/exist.toml").unwrap();
    assert_eq!(settings.server.port, 8080);
    assert_eq!(settings.rate_limit.global.times, 10);
}

#[test]
fn test_invalid_bounds_fail_validation() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    write!(
        file,
        r#"
[model]
min_inference_steps = 9
max_inference_steps = 3

[engine]
kind = "mock"
"#
    )
    .unwrap();

    let settings = Settings::load_from_path(file.path()).unwrap();
    assert!(settings.validate().is_err());
}
