use agentic_web_scraper::config::AppConfig;
use serial_test::serial;
use std::env;
use std::fs;
use std::io::Write;

const BIN: &str = "agentic-web-scraper";

// Helper to clear environment variables that might interfere with tests
fn clear_env_vars() {
    unsafe {
        env::remove_var("SCRAPER_SERVER__PORT");
        env::remove_var("SCRAPER_SCRAPER__CONCURRENT_LIMIT");
        env::remove_var("SCRAPER_LOGGING__JSON");
        env::remove_var("CONFIG_FILE");
        env::remove_var("PORT");
    }
}

#[test]
#[serial]
fn test_default_config() {
    clear_env_vars();

    let config = AppConfig::load_from_args([BIN]).expect("defaults should load");
    assert_eq!(config, AppConfig::default());
    assert_eq!(config.server.port, 8000);
    assert_eq!(config.server.keepalive_secs, 30);
    assert_eq!(config.scraper.concurrent_limit, 5);
}

#[test]
#[serial]
fn test_env_override() {
    clear_env_vars();
    unsafe {
        env::set_var("SCRAPER_SERVER__PORT", "9090");
        env::set_var("SCRAPER_SCRAPER__CONCURRENT_LIMIT", "2");
        env::set_var("SCRAPER_LOGGING__JSON", "true");
    }

    let config = AppConfig::load_from_args([BIN]).expect("Failed to load config");
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.scraper.concurrent_limit, 2);
    assert!(config.logging.json);

    clear_env_vars();
}

#[test]
#[serial]
fn test_file_load_and_cli_precedence() {
    clear_env_vars();

    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .expect("Failed to create temp config");
    writeln!(
        file,
        "server:\n  port: 7070\n  host: 0.0.0.0\nscraper:\n  user_agent: test-agent/1.0"
    )
    .unwrap();
    let path = file.path().to_str().unwrap().to_string();

    unsafe {
        env::set_var("CONFIG_FILE", &path);
    }
    let config = AppConfig::load_from_args([BIN]).expect("Failed to load config from file");
    assert_eq!(config.server.port, 7070);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.scraper.user_agent, "test-agent/1.0");

    // Environment beats the file, flags beat both.
    unsafe {
        env::set_var("SCRAPER_SERVER__PORT", "7171");
    }
    let config = AppConfig::load_from_args([BIN]).unwrap();
    assert_eq!(config.server.port, 7171);

    let config = AppConfig::load_from_args([BIN, "--port", "7272", "--log-level", "debug"]).unwrap();
    assert_eq!(config.server.port, 7272);
    assert_eq!(config.logging.level, "debug");

    clear_env_vars();
}

#[test]
#[serial]
fn test_cwd_config_fallback() {
    clear_env_vars();

    let cwd_path = "config.yaml";
    fs::write(cwd_path, "server:\n  port: 6060\n").expect("Failed to write ./config.yaml");

    let config = AppConfig::load_from_args([BIN]);

    fs::remove_file(cwd_path).unwrap();
    assert_eq!(config.expect("Failed to load config").server.port, 6060);
}

#[test]
#[serial]
fn test_bad_flags_are_reported() {
    clear_env_vars();
    assert!(AppConfig::load_from_args([BIN, "--sse", "--cli"]).is_err());
}
