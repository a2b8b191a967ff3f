//! Tests for config loading

use std::io::Write;

use roomwatch::config::Config;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_config_file_exists() {
    let config_path = std::path::Path::new("config.toml");
    assert!(
        config_path.exists(),
        "config.toml should exist in project root"
    );
}

#[test]
fn test_sample_config_is_valid() {
    let config = Config::from_file(std::path::Path::new("config.toml")).unwrap();
    config.validate().unwrap();

    assert_eq!(config.scraper.horizon_months, 6);
    assert_eq!(config.rate_limit.interval_ms, 10_000);
    assert_eq!(config.constant_expectations().unwrap().len(), 3);
    assert!(config.scraper.historical_start.is_some());
}

#[test]
fn test_partial_file_keeps_defaults() {
    let file = write_config(
        r#"
[source]
base_url = "http://localhost:8080"

[rate_limit]
interval_ms = 2000
"#,
    );

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.source.base_url, "http://localhost:8080");
    assert_eq!(config.rate_limit.interval_ms, 2000);
    assert_eq!(config.rate_limit.minimum_interval_ms, 1000);
    assert_eq!(config.retry.max_retries, 5);
    assert_eq!(config.source.token_header, "dea-CSRFToken");
    assert_eq!(
        config.bookings_url().unwrap().as_str(),
        "http://localhost:8080/ServerApi.aspx/BrowseEvents"
    );
}

#[test]
fn test_historical_dates_parse() {
    let file = write_config(
        r#"
[scraper]
historical_start = "2025-01-01"
historical_end = "2025-03-31"
"#,
    );

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(
        config.scraper.historical_start,
        chrono::NaiveDate::from_ymd_opt(2025, 1, 1)
    );
    assert_eq!(
        config.scraper.historical_end,
        chrono::NaiveDate::from_ymd_opt(2025, 3, 31)
    );
}

#[test]
fn test_custom_constants_replace_defaults() {
    let file = write_config(
        r#"
[constants]
timezone_abbreviation = "PT"
"#,
    );

    let config = Config::from_file(file.path()).unwrap();
    let expectations = config.constant_expectations().unwrap();
    assert_eq!(expectations.len(), 1);
}

#[test]
fn test_invalid_files_are_rejected() {
    let file = write_config("this is = not [valid toml");
    let err = Config::from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse TOML"));

    let file = write_config(
        r#"
[rate_limit]
interval_ms = 500
minimum_interval_ms = 1000
"#,
    );
    assert!(Config::load(Some(file.path())).is_err());

    let missing = std::path::Path::new("/nonexistent/roomwatch.toml");
    let err = Config::from_file(missing).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
