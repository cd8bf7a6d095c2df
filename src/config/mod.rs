//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::application::dataset::{DEFAULT_BASE_URL, DatasetTtls, Endpoints};
use crate::util::timezone::DEFAULT_REFERENCE_ZONE;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "covid-chart";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 10;
const DEFAULT_DATA_TTL_SECS: u64 = 30 * 60;
const DEFAULT_MOST_RECENT_TTL_SECS: u64 = 10 * 60;
const DEFAULT_STATIC_DIR: &str = "static";
const DEFAULT_USER_AGENT: &str = concat!("covid-chart/", env!("CARGO_PKG_VERSION"));
const WILDCARD_HOST: &str = "0.0.0.0";

/// Command-line arguments for the covid-chart binary.
///
/// Overrides are global so they apply with or without a subcommand; the
/// legacy `REDIS_ADDR`, `REDIS_PASSWD` and `LISTEN_ADDR` variables are read
/// on every invocation.
#[derive(Debug, Parser)]
#[command(name = "covid-chart", version, about = "COVID-19 chart server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "COVID_CHART_CONFIG_FILE",
        value_name = "PATH",
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: ServeOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the chart HTTP server (default).
    Serve,
    /// Print the chart payload for a jurisdiction as JSON.
    Payload(PayloadArgs),
}

#[derive(Debug, Args, Clone)]
pub struct PayloadArgs {
    /// Two-letter state code; the national payload is printed when omitted.
    #[arg(long = "state", value_name = "CODE")]
    pub state: Option<String>,
}

/// Overrides shared by every command that reads upstream data.
#[derive(Debug, Args, Default, Clone)]
pub struct DataOverrides {
    /// Redis address (`host:port` or a `redis://`/`rediss://` URL).
    #[arg(long = "redis-addr", env = "REDIS_ADDR", value_name = "ADDR", global = true)]
    pub redis_addr: Option<String>,

    /// Redis password.
    #[arg(
        long = "redis-password",
        env = "REDIS_PASSWD",
        value_name = "PASSWORD",
        hide_env_values = true,
        global = true
    )]
    pub redis_password: Option<String>,

    /// Toggle TLS for bare Redis addresses.
    #[arg(
        long = "redis-tls",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub redis_tls: Option<bool>,

    /// Override the upstream API base URL.
    #[arg(long = "upstream-base-url", value_name = "URL", global = true)]
    pub upstream_base_url: Option<String>,

    /// Override the zone used to decide which day counts as yesterday.
    #[arg(long = "chart-time-zone", value_name = "ZONE", global = true)]
    pub time_zone: Option<String>,
}

/// Server and logging overrides; `payload` only honours the data subset.
#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub data: DataOverrides,

    /// Listen address such as `:8080` or `127.0.0.1:8080`; wins over host/port.
    #[arg(long = "listen-addr", env = "LISTEN_ADDR", value_name = "ADDR", global = true)]
    pub listen_addr: Option<String>,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST", global = true)]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT", global = true)]
    pub port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(
        long = "server-graceful-shutdown-seconds",
        value_name = "SECONDS",
        global = true
    )]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the directory served under `/static/`.
    #[arg(long = "chart-static-dir", value_name = "PATH", global = true)]
    pub static_dir: Option<PathBuf>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    /// `None` selects the in-process store.
    pub redis: Option<RedisSettings>,
    pub upstream: UpstreamSettings,
    pub chart: ChartSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Clone)]
pub struct RedisSettings {
    /// Connection URL, credentials included.
    pub url: String,
    /// Credential-free form for logs.
    pub endpoint: String,
}

impl std::fmt::Debug for RedisSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSettings")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub endpoints: Endpoints,
    pub ttls: DatasetTtls,
    pub timeout: Option<Duration>,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct ChartSettings {
    pub time_zone: Tz,
    pub static_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("COVID_CHART").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_cli_overrides(cli);

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    redis: RawRedisSettings,
    upstream: RawUpstreamSettings,
    chart: RawChartSettings,
}

impl RawSettings {
    fn apply_cli_overrides(&mut self, cli: &CliArgs) {
        match cli.command.as_ref() {
            None | Some(Command::Serve) => self.apply_serve_overrides(&cli.overrides),
            Some(Command::Payload(_)) => self.apply_data_overrides(&cli.overrides.data),
        }
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(addr) = overrides.listen_addr.as_ref() {
            self.server.listen_addr = Some(addr.clone());
        }
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(dir) = overrides.static_dir.as_ref() {
            self.chart.static_dir = Some(dir.clone());
        }
        self.apply_data_overrides(&overrides.data);
    }

    fn apply_data_overrides(&mut self, overrides: &DataOverrides) {
        if let Some(addr) = overrides.redis_addr.as_ref() {
            self.redis.addr = Some(addr.clone());
        }
        if let Some(password) = overrides.redis_password.as_ref() {
            self.redis.password = Some(password.clone());
        }
        if let Some(tls) = overrides.redis_tls {
            self.redis.tls = Some(tls);
        }
        if let Some(url) = overrides.upstream_base_url.as_ref() {
            self.upstream.base_url = Some(url.clone());
        }
        if let Some(zone) = overrides.time_zone.as_ref() {
            self.chart.time_zone = Some(zone.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            redis,
            upstream,
            chart,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let redis = build_redis_settings(redis)?;
        let upstream = build_upstream_settings(upstream)?;
        let chart = build_chart_settings(chart)?;

        Ok(Self {
            server,
            logging,
            redis,
            upstream,
            chart,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let addr = match non_empty(server.listen_addr) {
        Some(listen_addr) => parse_listen_addr(&listen_addr)
            .map_err(|reason| LoadError::invalid("server.listen_addr", reason))?,
        None => {
            let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
            let port = server.port.unwrap_or(DEFAULT_PORT);
            if port == 0 {
                return Err(LoadError::invalid(
                    "server.port",
                    "port must be greater than zero",
                ));
            }
            parse_socket_addr(&host, port)
                .map_err(|reason| LoadError::invalid("server.host", reason))?
        }
    };

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_redis_settings(redis: RawRedisSettings) -> Result<Option<RedisSettings>, LoadError> {
    let Some(addr) = non_empty(redis.addr) else {
        return Ok(None);
    };
    let password = non_empty(redis.password);

    if addr.starts_with("redis://") || addr.starts_with("rediss://") {
        let url = Url::parse(&addr)
            .map_err(|err| LoadError::invalid("redis.addr", format!("invalid url: {err}")))?;
        let endpoint = display_endpoint(&url);
        return Ok(Some(RedisSettings {
            url: url.into(),
            endpoint,
        }));
    }

    let scheme = if redis.tls.unwrap_or(true) {
        "rediss"
    } else {
        "redis"
    };
    let db = redis.db.unwrap_or(0);
    let mut url = Url::parse(&format!("{scheme}://{addr}/{db}"))
        .map_err(|err| LoadError::invalid("redis.addr", format!("invalid address `{addr}`: {err}")))?;
    if let Some(password) = password.as_deref() {
        url.set_password(Some(password))
            .map_err(|_| LoadError::invalid("redis.password", "address cannot carry credentials"))?;
    }

    Ok(Some(RedisSettings {
        url: url.into(),
        endpoint: format!("{scheme}://{addr}/{db}"),
    }))
}

fn build_upstream_settings(upstream: RawUpstreamSettings) -> Result<UpstreamSettings, LoadError> {
    let raw_base = non_empty(upstream.base_url).unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    // `Url::join` drops the last segment unless the base ends with a slash.
    let raw_base = if raw_base.ends_with('/') {
        raw_base
    } else {
        format!("{raw_base}/")
    };
    let base_url = Url::parse(&raw_base)
        .map_err(|err| LoadError::invalid("upstream.base_url", format!("invalid url: {err}")))?;
    if !matches!(base_url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "upstream.base_url",
            "scheme must be http or https",
        ));
    }
    let endpoints = Endpoints::from_base(&base_url)
        .map_err(|err| LoadError::invalid("upstream.base_url", err.to_string()))?;

    let data_secs = upstream.data_ttl_seconds.unwrap_or(DEFAULT_DATA_TTL_SECS);
    let most_recent_secs = upstream
        .most_recent_ttl_seconds
        .unwrap_or(DEFAULT_MOST_RECENT_TTL_SECS);
    let ttls = DatasetTtls {
        data: Duration::from_secs(data_secs),
        most_recent: Duration::from_secs(most_recent_secs),
    };

    let timeout = match upstream.timeout_seconds {
        Some(0) => {
            return Err(LoadError::invalid(
                "upstream.timeout_seconds",
                "must be greater than zero",
            ));
        }
        Some(seconds) => Some(Duration::from_secs(seconds)),
        None => None,
    };

    let user_agent =
        non_empty(upstream.user_agent).unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

    Ok(UpstreamSettings {
        endpoints,
        ttls,
        timeout,
        user_agent,
    })
}

fn build_chart_settings(chart: RawChartSettings) -> Result<ChartSettings, LoadError> {
    let time_zone = match non_empty(chart.time_zone) {
        Some(name) => name.parse::<Tz>().map_err(|err| {
            LoadError::invalid("chart.time_zone", format!("unknown zone `{name}`: {err}"))
        })?,
        None => DEFAULT_REFERENCE_ZONE,
    };

    let static_dir = chart
        .static_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR));
    if static_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "chart.static_dir",
            "path must not be empty",
        ));
    }

    Ok(ChartSettings {
        time_zone,
        static_dir,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    listen_addr: Option<String>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRedisSettings {
    addr: Option<String>,
    password: Option<String>,
    tls: Option<bool>,
    db: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUpstreamSettings {
    base_url: Option<String>,
    data_ttl_seconds: Option<u64>,
    most_recent_ttl_seconds: Option<u64>,
    timeout_seconds: Option<u64>,
    user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawChartSettings {
    time_zone: Option<String>,
    static_dir: Option<PathBuf>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

/// Accepts `host:port` or a bare `:port`, which binds every interface.
fn parse_listen_addr(value: &str) -> Result<SocketAddr, String> {
    let candidate = if value.starts_with(':') {
        format!("{WILDCARD_HOST}{value}")
    } else {
        value.to_string()
    };
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{value}`: {err}"))
}

fn display_endpoint(url: &Url) -> String {
    let mut display = url.clone();
    let _ = display.set_password(None);
    let _ = display.set_username("");
    display.into()
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests;
