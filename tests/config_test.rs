use std::collections::HashMap;
use std::time::Duration;

use collatz_mq::config::Config;
use collatz_mq::error::Error;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| map.get(name).cloned()
}

#[test]
fn env_overrides_defaults() {
    let mut config = Config::default();
    config
        .apply_env(lookup(&[
            ("COLLATZ_MESSAGES", "4"),
            ("COLLATZ_MAX_RANDOM", "50"),
            ("COLLATZ_SEED", "7"),
            ("COLLATZ_QUEUE_NAME", "/from-env"),
            ("COLLATZ_RECEIVE_TIMEOUT_SECS", "3"),
            ("LOG_LEVEL", "debug"),
        ]))
        .unwrap();

    assert_eq!(config.messages, 4);
    assert_eq!(config.max_random, 50);
    assert_eq!(config.seed, Some(7));
    assert_eq!(config.queue_name, "/from-env");
    assert_eq!(config.receive_timeout, Duration::from_secs(3));
    assert_eq!(config.log_level, "debug");
    assert!(config.otel_endpoint.is_none());
    config.validate().unwrap();
}

#[test]
fn unparsable_env_value_is_a_config_error() {
    let mut config = Config::default();
    let err = config
        .apply_env(lookup(&[("COLLATZ_MESSAGES", "ten")]))
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn toml_file_overrides_defaults() {
    let config = Config::from_toml(
        r#"
        messages = 3
        max_random = 100
        message_ceiling = 20
        seed = 11
        queue_name = "/from-file"
        send_retries = 5
        "#,
    )
    .unwrap();

    assert_eq!(config.messages, 3);
    assert_eq!(config.max_random, 100);
    assert_eq!(config.message_ceiling, 20);
    assert_eq!(config.seed, Some(11));
    assert_eq!(config.queue_name, "/from-file");
    assert_eq!(config.send_retries, 5);
    assert_eq!(config.receive_timeout, Config::default().receive_timeout);
}

#[test]
fn unknown_toml_keys_are_rejected() {
    let err = Config::from_toml("messagez = 3").unwrap_err();
    assert!(matches!(err, Error::Toml(_)));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn config_file_is_read_from_disk() {
    let path = std::env::temp_dir().join(format!("collatz-{}.toml", uuid::Uuid::new_v4()));
    std::fs::write(&path, "messages = 2\nmax_random = 9\n").unwrap();

    let config = Config::from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.messages, 2);
    assert_eq!(config.max_random, 9);
}

#[test]
fn missing_config_file_is_a_config_error() {
    let path = std::env::temp_dir().join(format!("missing-{}.toml", uuid::Uuid::new_v4()));
    assert!(matches!(Config::from_file(&path), Err(Error::Config(_))));
}

#[test]
fn ceiling_violation_fails_validation() {
    let mut config = Config::default();
    config
        .apply_env(lookup(&[("COLLATZ_MESSAGES", "11")]))
        .unwrap();
    assert!(matches!(config.validate(), Err(Error::Config(_))));
}

#[test]
fn zero_timeouts_fail_validation() {
    let mut from_env = Config::default();
    from_env
        .apply_env(lookup(&[("COLLATZ_RECEIVE_TIMEOUT_SECS", "0")]))
        .unwrap();
    let err = from_env.validate().unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert_eq!(err.exit_code(), 2);

    let from_file = Config::from_toml("send_timeout_secs = 0").unwrap();
    let err = from_file.validate().unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert_eq!(err.exit_code(), 2);
}
