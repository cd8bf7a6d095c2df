use serial_test::serial;

use super::*;

const LEGACY_VARS: [&str; 3] = ["REDIS_ADDR", "REDIS_PASSWD", "LISTEN_ADDR"];

/// Sets legacy variables for one test and clears them on drop.
struct LegacyEnv;

impl LegacyEnv {
    fn with(vars: &[(&str, &str)]) -> Self {
        clear_legacy_env();
        for (name, value) in vars {
            // SAFETY: every test that touches the environment is `#[serial]`.
            unsafe { std::env::set_var(name, value) };
        }
        Self
    }
}

impl Drop for LegacyEnv {
    fn drop(&mut self) {
        clear_legacy_env();
    }
}

fn clear_legacy_env() {
    for name in LEGACY_VARS {
        // SAFETY: see `LegacyEnv::with`.
        unsafe { std::env::remove_var(name) };
    }
}

fn settings_from_cli(args: &[&str]) -> Settings {
    let cli = CliArgs::try_parse_from(args).expect("arguments should parse");
    let mut raw = RawSettings::default();
    raw.apply_cli_overrides(&cli);
    Settings::from_raw(raw).expect("valid settings")
}

#[test]
fn defaults_resolve_without_any_source() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
    assert_eq!(settings.server.graceful_shutdown, Duration::from_secs(10));
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert!(settings.redis.is_none());
    assert_eq!(settings.upstream.ttls.data, Duration::from_secs(1800));
    assert_eq!(settings.upstream.ttls.most_recent, Duration::from_secs(600));
    assert!(settings.upstream.timeout.is_none());
    assert_eq!(
        settings.upstream.endpoints.state_daily,
        "https://covidtracking.com/api/states/daily"
    );
    assert_eq!(settings.chart.time_zone, chrono_tz::America::Los_Angeles);
    assert_eq!(settings.chart.static_dir, PathBuf::from("static"));
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn bare_port_listen_addr_binds_all_interfaces() {
    let mut raw = RawSettings::default();
    raw.server.host = Some("127.0.0.1".to_string());
    raw.apply_serve_overrides(&ServeOverrides {
        listen_addr: Some(":9090".to_string()),
        ..Default::default()
    });

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.server.addr, "0.0.0.0:9090".parse::<SocketAddr>().unwrap());
}

#[test]
fn invalid_listen_addr_names_the_key() {
    let mut raw = RawSettings::default();
    raw.server.listen_addr = Some("nowhere".to_string());

    let err = Settings::from_raw(raw).expect_err("invalid address");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "server.listen_addr",
            ..
        }
    ));
}

#[test]
fn bare_redis_address_defaults_to_tls_with_password() {
    let mut raw = RawSettings::default();
    raw.apply_data_overrides(&DataOverrides {
        redis_addr: Some("cache.internal:6380".to_string()),
        redis_password: Some("s3cret".to_string()),
        ..Default::default()
    });

    let redis = Settings::from_raw(raw)
        .expect("valid settings")
        .redis
        .expect("redis configured");
    assert_eq!(redis.url, "rediss://:s3cret@cache.internal:6380/0");
    assert_eq!(redis.endpoint, "rediss://cache.internal:6380/0");
    assert!(!format!("{redis:?}").contains("s3cret"));
}

#[test]
fn redis_tls_can_be_disabled() {
    let mut raw = RawSettings::default();
    raw.redis.addr = Some("localhost:6379".to_string());
    raw.redis.tls = Some(false);
    raw.redis.db = Some(2);

    let redis = Settings::from_raw(raw)
        .expect("valid settings")
        .redis
        .expect("redis configured");
    assert_eq!(redis.url, "redis://localhost:6379/2");
}

#[test]
fn redis_url_passes_through_without_credentials_in_endpoint() {
    let mut raw = RawSettings::default();
    raw.redis.addr = Some("redis://user:pw@localhost:6379/1".to_string());

    let redis = Settings::from_raw(raw)
        .expect("valid settings")
        .redis
        .expect("redis configured");
    assert_eq!(redis.url, "redis://user:pw@localhost:6379/1");
    assert_eq!(redis.endpoint, "redis://localhost:6379/1");
}

#[test]
fn blank_redis_address_selects_memory_store() {
    let mut raw = RawSettings::default();
    raw.redis.addr = Some("   ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.redis.is_none());
}

#[test]
fn base_url_without_trailing_slash_keeps_last_segment() {
    let mut raw = RawSettings::default();
    raw.upstream.base_url = Some("http://localhost:9000/api".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.upstream.endpoints.us_most_recent,
        "http://localhost:9000/api/us"
    );
}

#[test]
fn unknown_time_zone_is_rejected() {
    let mut raw = RawSettings::default();
    raw.chart.time_zone = Some("Mars/Olympus_Mons".to_string());

    let err = Settings::from_raw(raw).expect_err("invalid zone");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "chart.time_zone",
            ..
        }
    ));
}

#[test]
fn zero_timeout_is_rejected() {
    let mut raw = RawSettings::default();
    raw.upstream.timeout_seconds = Some(0);

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
#[serial]
fn default_to_serve_command() {
    let _env = LegacyEnv::with(&[]);
    let args = CliArgs::parse_from(["covid-chart"]);
    let command = args.command.unwrap_or(Command::Serve);
    assert!(matches!(command, Command::Serve));
}

#[test]
#[serial]
fn parse_payload_arguments() {
    let _env = LegacyEnv::with(&[]);
    let args = CliArgs::parse_from([
        "covid-chart",
        "payload",
        "--state",
        "ca",
        "--upstream-base-url",
        "http://localhost:9000/api/",
    ]);

    assert_eq!(
        args.overrides.data.upstream_base_url.as_deref(),
        Some("http://localhost:9000/api/")
    );
    match args.command.expect("payload command") {
        Command::Payload(payload) => assert_eq!(payload.state.as_deref(), Some("ca")),
        _ => panic!("wrong command parsed"),
    }
}

#[test]
#[serial]
fn bare_invocation_reads_legacy_environment() {
    let _env = LegacyEnv::with(&[
        ("REDIS_ADDR", "cache.example:6379"),
        ("REDIS_PASSWD", "s3cret"),
        ("LISTEN_ADDR", ":9999"),
    ]);

    let settings = settings_from_cli(&["covid-chart"]);

    assert_eq!(settings.server.addr, "0.0.0.0:9999".parse::<SocketAddr>().unwrap());
    let redis = settings.redis.expect("redis configured from environment");
    assert_eq!(redis.url, "rediss://:s3cret@cache.example:6379/0");
    assert_eq!(redis.endpoint, "rediss://cache.example:6379/0");
}

#[test]
#[serial]
fn serve_subcommand_reads_legacy_environment() {
    let _env = LegacyEnv::with(&[
        ("REDIS_ADDR", "cache.example:6379"),
        ("LISTEN_ADDR", ":9999"),
    ]);

    let settings = settings_from_cli(&["covid-chart", "serve"]);

    assert_eq!(settings.server.addr.port(), 9999);
    assert_eq!(
        settings.redis.expect("redis configured").url,
        "rediss://cache.example:6379/0"
    );
}

#[test]
#[serial]
fn flags_after_subcommand_win_over_legacy_environment() {
    let _env = LegacyEnv::with(&[
        ("REDIS_ADDR", "cache.example:6379"),
        ("LISTEN_ADDR", ":9999"),
    ]);

    let settings = settings_from_cli(&[
        "covid-chart",
        "serve",
        "--redis-addr",
        "redis://localhost:6379/3",
        "--listen-addr",
        "127.0.0.1:7000",
    ]);

    assert_eq!(settings.server.addr, "127.0.0.1:7000".parse::<SocketAddr>().unwrap());
    assert_eq!(
        settings.redis.expect("redis configured").url,
        "redis://localhost:6379/3"
    );
}

#[test]
#[serial]
fn payload_reads_redis_environment_but_not_listen_address() {
    let _env = LegacyEnv::with(&[
        ("REDIS_ADDR", "cache.example:6379"),
        ("LISTEN_ADDR", "not-an-address"),
    ]);

    let settings = settings_from_cli(&["covid-chart", "payload", "--state", "ny"]);

    assert!(settings.redis.is_some());
    assert_eq!(settings.server.addr, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
}

#[test]
#[serial]
fn bare_invocation_without_environment_uses_memory_store() {
    let _env = LegacyEnv::with(&[]);

    let settings = settings_from_cli(&["covid-chart"]);

    assert!(settings.redis.is_none());
    assert_eq!(settings.server.addr, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
}
