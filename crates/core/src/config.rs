//! Layered configuration: built-in defaults, then `tradedesk.toml`, then `TRADEDESK_*`
//! environment variables, then programmatic overrides. The merged result is validated once.

use std::env;
use std::fmt::Display;
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["tradedesk.toml", "config/tradedesk.toml"];

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub credit: CreditConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CreditConfig {
    /// Usage rate (percent of the limit) above which a credit check warns.
    pub usage_warning_pct: f64,
    /// How many transactions a credit summary carries.
    pub recent_transactions: u32,
    /// Read-compute-write attempts before a conflicting ledger write gives up.
    pub max_write_attempts: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// Values that win over every other source, typically from command-line flags.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://tradedesk.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            credit: CreditConfig::default(),
        }
    }
}

impl Default for CreditConfig {
    fn default() -> Self {
        Self { usage_warning_pct: 80.0, recent_transactions: 20, max_write_attempts: 3 }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        match locate_file(options.config_path.as_deref()) {
            Some(path) => config.merge_file(read_file(&path)?),
            None if options.require_file => {
                let expected = options
                    .config_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATHS[0]));
                return Err(ConfigError::MissingConfigFile(expected));
            }
            None => {}
        }

        config.merge_env()?;
        config.merge_overrides(options.overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.database.url.trim();
        if !(url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:") {
            return Err(ConfigError::Validation(
                "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                    .to_string(),
            ));
        }
        within("database.max_connections", self.database.max_connections, 1..=u32::MAX)?;
        within("database.timeout_secs", self.database.timeout_secs, 1..=300)?;

        if !matches!(
            self.logging.level.trim().to_ascii_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(ConfigError::Validation(
                "logging.level must be one of trace|debug|info|warn|error".to_string(),
            ));
        }

        within("credit.usage_warning_pct", self.credit.usage_warning_pct, 0.0..=100.0)?;
        within("credit.recent_transactions", self.credit.recent_transactions, 1..=500)?;
        within("credit.max_write_attempts", self.credit.max_write_attempts, 1..=10)?;
        Ok(())
    }

    fn merge_file(&mut self, file: FileConfig) {
        let FileConfig { database, logging, credit } = file;

        let database = database.unwrap_or_default();
        assign(&mut self.database.url, database.url);
        assign(&mut self.database.max_connections, database.max_connections);
        assign(&mut self.database.timeout_secs, database.timeout_secs);

        let logging = logging.unwrap_or_default();
        assign(&mut self.logging.level, logging.level);
        assign(&mut self.logging.format, logging.format);

        let credit = credit.unwrap_or_default();
        assign(&mut self.credit.usage_warning_pct, credit.usage_warning_pct);
        assign(&mut self.credit.recent_transactions, credit.recent_transactions);
        assign(&mut self.credit.max_write_attempts, credit.max_write_attempts);
    }

    /// Applies `TRADEDESK_*` variables. Blank values are ignored; malformed numbers are errors.
    fn merge_env(&mut self) -> Result<(), ConfigError> {
        assign(&mut self.database.url, env_value(&["TRADEDESK_DATABASE_URL"]));
        assign(
            &mut self.database.max_connections,
            env_parsed(&["TRADEDESK_DATABASE_MAX_CONNECTIONS"])?,
        );
        assign(&mut self.database.timeout_secs, env_parsed(&["TRADEDESK_DATABASE_TIMEOUT_SECS"])?);

        assign(
            &mut self.logging.level,
            env_value(&["TRADEDESK_LOGGING_LEVEL", "TRADEDESK_LOG_LEVEL"]),
        );
        if let Some(format) = env_value(&["TRADEDESK_LOGGING_FORMAT", "TRADEDESK_LOG_FORMAT"]) {
            self.logging.format = format.parse()?;
        }

        assign(
            &mut self.credit.usage_warning_pct,
            env_parsed(&["TRADEDESK_CREDIT_USAGE_WARNING_PCT"])?,
        );
        assign(
            &mut self.credit.recent_transactions,
            env_parsed(&["TRADEDESK_CREDIT_RECENT_TRANSACTIONS"])?,
        );
        assign(
            &mut self.credit.max_write_attempts,
            env_parsed(&["TRADEDESK_CREDIT_MAX_WRITE_ATTEMPTS"])?,
        );
        Ok(())
    }

    fn merge_overrides(&mut self, overrides: ConfigOverrides) {
        assign(&mut self.database.url, overrides.database_url);
        assign(&mut self.logging.level, overrides.log_level);
        assign(&mut self.logging.format, overrides.log_format);
    }
}

fn assign<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn within<T>(key: &str, value: T, range: RangeInclusive<T>) -> Result<(), ConfigError>
where
    T: PartialOrd + Display,
{
    if range.contains(&value) {
        return Ok(());
    }
    Err(ConfigError::Validation(format!(
        "{key} must be in range {}..={} (got {value})",
        range.start(),
        range.end()
    )))
}

fn locate_file(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => path.exists().then(|| path.to_path_buf()),
        None => DEFAULT_CONFIG_PATHS.into_iter().map(PathBuf::from).find(|path| path.exists()),
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str(&interpolate(&raw)?)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

/// Replaces every `${VAR}` with the variable's value; an unset variable is an error.
fn interpolate(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let var = &after[..end];
        let value = env::var(var)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: var.to_string() })?;
        output.push_str(&value);
        rest = &after[end + 1..];
    }

    output.push_str(rest);
    Ok(output)
}

/// First non-blank value among `keys`, which are checked in order.
fn env_value(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| env::var(key).ok().filter(|value| !value.trim().is_empty()))
}

fn env_parsed<T: FromStr>(keys: &[&str]) -> Result<Option<T>, ConfigError> {
    for key in keys {
        let Some(value) = env_value(&[*key]) else { continue };
        return value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value });
    }
    Ok(None)
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    database: Option<DatabaseSection>,
    logging: Option<LoggingSection>,
    credit: Option<CreditSection>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabaseSection {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingSection {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct CreditSection {
    usage_warning_pct: Option<f64>,
    recent_transactions: Option<u32>,
    max_write_attempts: Option<u32>,
}
