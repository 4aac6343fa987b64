// Config loading and validation tests

use dockerbridge::config::{AppConfig, BackendKind};
use std::io::Write;
use std::time::Duration;

const VALID_CONFIG: &str = r#"
[server]
port = 8081
host = "0.0.0.0"
client_channel_capacity = 32

[docker]
backend = "cli"
binary = "docker"
helper_image = "alpine:3"
command_timeout_secs = 60

[polling]
interval_ms = 10000
debounce_ms = 1000
heartbeat_secs = 30
client_timeout_secs = 90
stats_log_interval_secs = 60

[exec]
kill_timeout_ms = 2000

[volumes]
max_file_bytes = 102400

[[containers]]
name = "whoami"
image = "traefik/whoami:latest"
ports = [{ containerPort = 80, hostPort = 8081 }]
"#;

#[test]
fn test_config_loads_from_str() {
    let config = AppConfig::load_from_str(VALID_CONFIG).expect("load_from_str");
    assert_eq!(config.server.port, 8081);
    assert_eq!(config.server.client_channel_capacity, 32);
    assert_eq!(config.docker.backend, BackendKind::Cli);
    assert_eq!(config.docker.command_timeout(), Duration::from_secs(60));
    assert_eq!(config.polling.interval(), Duration::from_secs(10));
    assert_eq!(config.polling.debounce(), Duration::from_secs(1));
    assert_eq!(config.exec.kill_timeout(), Duration::from_secs(2));
    assert_eq!(config.containers.len(), 1);
    assert_eq!(config.containers[0].ports[0].host_port, Some(8081));
}

#[test]
fn test_config_defaults_for_optional_sections() {
    let minimal = r#"
[server]
port = 8081
host = "127.0.0.1"
"#;
    let config = AppConfig::load_from_str(minimal).expect("minimal config");
    assert_eq!(config.docker.binary, "docker");
    assert_eq!(config.polling.interval_ms, 10_000);
    assert_eq!(config.polling.heartbeat_secs, 30);
    assert_eq!(config.polling.client_timeout_secs, 90);
    assert_eq!(config.exec.kill_timeout_ms, 2_000);
    assert_eq!(config.volumes.max_file_bytes, 100 * 1024);
    assert!(config.actions.verify_postconditions);
    assert!(config.containers.is_empty());
}

#[test]
fn test_config_validation_rejects_invalid_port() {
    let bad = VALID_CONFIG.replace("port = 8081\n", "port = 0\n");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("server.port"));
}

#[test]
fn test_config_validation_rejects_zero_channel_capacity() {
    let bad = VALID_CONFIG.replace("client_channel_capacity = 32", "client_channel_capacity = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("client_channel_capacity"));
}

#[test]
fn test_config_validation_rejects_zero_interval() {
    let bad = VALID_CONFIG.replace("interval_ms = 10000", "interval_ms = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("polling.interval_ms"));
}

#[test]
fn test_config_validation_rejects_client_timeout_below_heartbeat() {
    let bad = VALID_CONFIG.replace("client_timeout_secs = 90", "client_timeout_secs = 10");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("client_timeout_secs"));
}

#[test]
fn test_config_validation_rejects_zero_kill_timeout() {
    let bad = VALID_CONFIG.replace("kill_timeout_ms = 2000", "kill_timeout_ms = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("exec.kill_timeout_ms"));
}

#[test]
fn test_config_http_backend_requires_host_and_port() {
    let bad = VALID_CONFIG.replace("backend = \"cli\"", "backend = \"http\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("docker.host"));

    let good = VALID_CONFIG.replace(
        "backend = \"cli\"",
        "backend = \"http\"\nhost = \"10.0.0.2\"\nport = 2375\nprotocol = \"http\"",
    );
    let config = AppConfig::load_from_str(&good).expect("http backend config");
    assert_eq!(
        config.docker.api_url().as_deref(),
        Some("http://10.0.0.2:2375")
    );
}

#[test]
fn test_config_http_backend_rejects_tls() {
    let bad = VALID_CONFIG.replace(
        "backend = \"cli\"",
        "backend = \"http\"\nhost = \"10.0.0.2\"\nport = 2376\nprotocol = \"https\"",
    );
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("docker.protocol"));
}

#[test]
fn test_config_validation_names_the_bad_managed_container() {
    let bad = VALID_CONFIG.replace("containerPort = 80", "containerPort = 70000");
    let err = AppConfig::load_from_str(&bad).unwrap_err().to_string();
    assert!(err.contains("containers[0] (whoami)"), "{}", err);
    assert!(err.contains("70000"), "{}", err);
}

#[test]
fn test_config_load_reads_config_file_env() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(VALID_CONFIG.as_bytes()).unwrap();
    // SAFETY: no other test in this binary reads CONFIG_FILE.
    unsafe { std::env::set_var("CONFIG_FILE", file.path()) };
    let config = AppConfig::load().expect("load from file");
    assert_eq!(config.server.port, 8081);
}

#[test]
fn test_volume_text_extension_check() {
    let config = AppConfig::load_from_str(VALID_CONFIG).unwrap();
    assert!(config.volumes.is_text_file("conf.d/default.conf"));
    assert!(config.volumes.is_text_file("logs/APP.LOG"));
    assert!(!config.volumes.is_text_file("bin/busybox"));
    assert!(!config.volumes.is_text_file(".env"));
    assert!(!config.volumes.is_text_file("data/db.sqlite"));
}
