//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, ValueHint};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "brezza";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DATABASE_URL: &str = "sqlite://brezza.db?mode=rwc";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_CACHE_MAX_COST_BYTES: u64 = 1 << 29;
const DEFAULT_CACHE_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_VIEW_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_CONTENT_ROOT: &str = "content";
const DEFAULT_SITE_ROOT: &str = ".";
const DEFAULT_LOCALE_DIR: &str = "locale";
const MIN_SALT_BYTES: usize = 8;

/// Command-line arguments for the brezza binary.
#[derive(Debug, Parser)]
#[command(name = "brezza", version, about = "Brezza blog server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "BREZZA_CONFIG_FILE", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP server.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown window, in seconds.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Emit logs as JSON.
    #[arg(long = "log-json", value_parser = clap::builder::BoolishValueParser::new(), value_name = "BOOL")]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database connection pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the fragment cache byte budget.
    #[arg(long = "cache-max-cost-bytes", value_name = "BYTES")]
    pub cache_max_cost_bytes: Option<u64>,

    /// Override the cache admission queue capacity.
    #[arg(long = "cache-queue-capacity", value_name = "COUNT")]
    pub cache_queue_capacity: Option<usize>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub identity: IdentitySettings,
    pub cache: CacheSettings,
    pub content: ContentSettings,
    pub languages: Vec<LanguageSettings>,
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

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct IdentitySettings {
    /// Salt for client handle derivation. Changing it orphans every
    /// persisted handle.
    pub salt: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub max_cost_bytes: NonZeroU64,
    pub queue_capacity: NonZeroUsize,
    pub view_queue_capacity: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct ContentSettings {
    pub root: PathBuf,
    /// Directory containing the `views/` template tree.
    pub site_root: PathBuf,
    pub locale_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct LanguageSettings {
    /// Two-letter language code used in paths.
    pub name: String,
    /// Locale file under the locale directory.
    pub locale_file: String,
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

    builder = builder.add_source(Environment::with_prefix("BREZZA").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Parse CLI arguments, then load settings.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let cli = CliArgs::parse();
    let settings = load(&cli)?;
    Ok((cli, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    identity: RawIdentitySettings,
    cache: RawCacheSettings,
    content: RawContentSettings,
    languages: Vec<RawLanguageSettings>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
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
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawIdentitySettings {
    salt: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    max_cost_bytes: Option<u64>,
    queue_capacity: Option<usize>,
    view_queue_capacity: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawContentSettings {
    root: Option<PathBuf>,
    site_root: Option<PathBuf>,
    locale_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawLanguageSettings {
    name: String,
    locale_file: Option<String>,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
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
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(bytes) = overrides.cache_max_cost_bytes {
            self.cache.max_cost_bytes = Some(bytes);
        }
        if let Some(capacity) = overrides.cache_queue_capacity {
            self.cache.queue_capacity = Some(capacity);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            identity,
            cache,
            content,
            languages,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            identity: build_identity_settings(identity)?,
            cache: build_cache_settings(cache)?,
            content: build_content_settings(content),
            languages: build_language_settings(languages)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = format!("{host}:{port}")
        .parse::<SocketAddr>()
        .map_err(|err| LoadError::invalid("server.addr", err.to_string()))?;

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
        Some(level) => LevelFilter::from_str(level.as_str())
            .map_err(|err| LoadError::invalid("logging.level", format!("failed to parse: {err}")))?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database
        .url
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

    let max_connections = NonZeroU32::new(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),
    )
    .ok_or_else(|| LoadError::invalid("database.max_connections", "must be greater than zero"))?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_identity_settings(identity: RawIdentitySettings) -> Result<IdentitySettings, LoadError> {
    let salt = identity.salt.unwrap_or_default().into_bytes();
    if salt.len() < MIN_SALT_BYTES {
        return Err(LoadError::invalid(
            "identity.salt",
            format!("must be at least {MIN_SALT_BYTES} bytes"),
        ));
    }
    Ok(IdentitySettings { salt })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let max_cost_bytes =
        NonZeroU64::new(cache.max_cost_bytes.unwrap_or(DEFAULT_CACHE_MAX_COST_BYTES))
            .ok_or_else(|| LoadError::invalid("cache.max_cost_bytes", "must be greater than zero"))?;
    let queue_capacity = NonZeroUsize::new(
        cache.queue_capacity.unwrap_or(DEFAULT_CACHE_QUEUE_CAPACITY),
    )
    .ok_or_else(|| LoadError::invalid("cache.queue_capacity", "must be greater than zero"))?;
    let view_queue_capacity = NonZeroUsize::new(
        cache
            .view_queue_capacity
            .unwrap_or(DEFAULT_VIEW_QUEUE_CAPACITY),
    )
    .ok_or_else(|| {
        LoadError::invalid("cache.view_queue_capacity", "must be greater than zero")
    })?;

    Ok(CacheSettings {
        max_cost_bytes,
        queue_capacity,
        view_queue_capacity,
    })
}

fn build_content_settings(content: RawContentSettings) -> ContentSettings {
    ContentSettings {
        root: content
            .root
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONTENT_ROOT)),
        site_root: content
            .site_root
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SITE_ROOT)),
        locale_dir: content
            .locale_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCALE_DIR)),
    }
}

fn build_language_settings(
    languages: Vec<RawLanguageSettings>,
) -> Result<Vec<LanguageSettings>, LoadError> {
    if languages.is_empty() {
        return Ok(vec![LanguageSettings {
            name: "en".to_string(),
            locale_file: "en.json".to_string(),
        }]);
    }

    let mut built = Vec::with_capacity(languages.len());
    for language in languages {
        if language.name.chars().count() != 2 {
            return Err(LoadError::invalid(
                "languages.name",
                format!("'{}' is not a two-letter language code", language.name),
            ));
        }
        let locale_file = language
            .locale_file
            .unwrap_or_else(|| format!("{}.json", language.name));
        built.push(LanguageSettings {
            name: language.name,
            locale_file,
        });
    }
    Ok(built)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_with_salt() -> RawSettings {
        RawSettings {
            identity: RawIdentitySettings {
                salt: Some("0123456789abcdef".to_string()),
            },
            ..RawSettings::default()
        }
    }

    #[test]
    fn defaults_fill_every_section() {
        let settings = Settings::from_raw(raw_with_salt()).expect("valid defaults");
        assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
        assert_eq!(settings.database.url, DEFAULT_DATABASE_URL);
        assert_eq!(
            settings.cache.max_cost_bytes.get(),
            DEFAULT_CACHE_MAX_COST_BYTES
        );
        assert_eq!(settings.languages.len(), 1);
        assert_eq!(settings.languages[0].name, "en");
    }

    #[test]
    fn short_salts_are_rejected() {
        let mut raw = raw_with_salt();
        raw.identity.salt = Some("short".to_string());
        let err = Settings::from_raw(raw).expect_err("salt too short");
        assert!(matches!(err, LoadError::Invalid { key, .. } if key == "identity.salt"));
    }

    #[test]
    fn missing_salt_is_rejected() {
        let err = Settings::from_raw(RawSettings::default()).expect_err("no salt");
        assert!(matches!(err, LoadError::Invalid { key, .. } if key == "identity.salt"));
    }

    #[test]
    fn serve_overrides_take_precedence() {
        let mut raw = raw_with_salt();
        raw.apply_serve_overrides(&ServeOverrides {
            server_port: Some(8080),
            database_url: Some("sqlite://override.db".to_string()),
            ..ServeOverrides::default()
        });
        let settings = Settings::from_raw(raw).expect("valid");
        assert_eq!(settings.server.addr.port(), 8080);
        assert_eq!(settings.database.url, "sqlite://override.db");
    }

    #[test]
    fn language_codes_must_be_two_letters() {
        let mut raw = raw_with_salt();
        raw.languages = vec![RawLanguageSettings {
            name: "english".to_string(),
            locale_file: None,
        }];
        let err = Settings::from_raw(raw).expect_err("bad code");
        assert!(matches!(err, LoadError::Invalid { key, .. } if key == "languages.name"));
    }
}
