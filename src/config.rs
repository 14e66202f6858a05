//! Environment configuration with validation.
//!
//! Everything is read once at startup. Values are trimmed and empty strings
//! count as unset, so `FOO=` behaves like an absent variable.

use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::observability::LogFormat;
use crate::token::verifier::DEFAULT_IDENTITY_CLAIM;
use crate::token::{KeyError, VerifierConfig};

/// Default HTTP listen address.
pub const DEFAULT_HTTP_ADDR: &str = ":8080";
/// Default SPOE listen address.
pub const DEFAULT_SPOE_ADDR: &str = ":9000";
/// Largest frame the agent accepts unless configured otherwise.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16380;
/// Smallest frame size SPOP allows.
pub const MIN_FRAME_SIZE: u32 = 256;
/// Frame length is carried in 24 usable bits.
pub const MAX_FRAME_SIZE: u32 = 0x00ff_ffff;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Missing required field
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    /// Environment variable parse error
    #[error("Failed to parse environment variable {name}: {reason}")]
    ParseError { name: String, reason: String },

    /// Public key rejected
    #[error("Invalid public key: {0}")]
    InvalidKey(#[from] KeyError),

    /// SPOE frame size out of range
    #[error("Invalid max frame size: must be between {MIN_FRAME_SIZE} and {MAX_FRAME_SIZE}")]
    InvalidFrameSize,

    /// Zero shutdown timeout
    #[error("Invalid shutdown timeout: must be greater than 0")]
    InvalidTimeout,
}

/// Which front end to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Http,
    Spoe,
}

impl Mode {
    /// Unknown values select HTTP.
    pub fn parse_lenient(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("spoe") {
            Self::Spoe
        } else {
            Self::Http
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Spoe => "spoe",
        }
    }

    fn default_addr(&self) -> &'static str {
        match self {
            Self::Http => DEFAULT_HTTP_ADDR,
            Self::Spoe => DEFAULT_SPOE_ADDR,
        }
    }
}

/// How rejection reasons are written into the SPOE `reason` variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReasonFormat {
    /// Verifier error text
    #[default]
    Raw,
    /// Stable reason code
    Code,
}

impl std::str::FromStr for ReasonFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "code" => Ok(Self::Code),
            other => Err(format!("expected 'raw' or 'code', got '{other}'")),
        }
    }
}

/// SPOE agent settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoeSettings {
    pub message_name: String,
    pub auth_arg: String,
    pub api_key_arg: String,
    pub max_frame_size: u32,
    pub reason_format: ReasonFormat,
}

impl Default for SpoeSettings {
    fn default() -> Self {
        Self {
            message_name: "verify".to_string(),
            auth_arg: "auth".to_string(),
            api_key_arg: "api_key".to_string(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            reason_format: ReasonFormat::Raw,
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    /// `host:port`; the host may be a name resolved at bind time
    pub listen_addr: String,
    pub verifier: VerifierConfig,
    /// Admin bypass key; `None` disables the bypass
    pub admin_api_key: Option<String>,
    pub spoe: SpoeSettings,
    pub shutdown_timeout: Duration,
    pub debug: bool,
    pub log_format: LogFormat,
}

impl Config {
    /// Loads configuration from the environment, after an optional `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let key_hex = var("PASETO_V4_PUBLIC_KEY_HEX")
            .ok_or_else(|| ConfigError::MissingRequired("PASETO_V4_PUBLIC_KEY_HEX".to_string()))?;

        let mode = var("MODE").map_or(Mode::Http, |m| Mode::parse_lenient(&m));
        let listen_addr = parse_listen_addr(
            "LISTEN_ADDR",
            var("LISTEN_ADDR").as_deref().unwrap_or(mode.default_addr()),
        )?;

        let verifier = VerifierConfig::from_hex(&key_hex)?
            .with_ignore_time(is_true(var("IGNORE_EXP")))
            .with_audience(var("REQUIRE_AUD"))
            .with_issuer(var("REQUIRE_ISS"))
            .with_identity_claim(var("USER_FIELD").unwrap_or_else(|| DEFAULT_IDENTITY_CLAIM.into()));

        let defaults = SpoeSettings::default();
        let spoe = SpoeSettings {
            message_name: var("MESSAGE_NAME").unwrap_or(defaults.message_name),
            auth_arg: var("AUTH_ARG").unwrap_or(defaults.auth_arg),
            api_key_arg: var("API_KEY_ARG").unwrap_or(defaults.api_key_arg),
            max_frame_size: parse_var(
                "SPOE_MAX_FRAME_SIZE",
                var("SPOE_MAX_FRAME_SIZE"),
                defaults.max_frame_size,
            )?,
            reason_format: parse_var("REASON_FORMAT", var("REASON_FORMAT"), defaults.reason_format)?,
        };

        let config = Self {
            mode,
            listen_addr,
            verifier,
            admin_api_key: var("ADMIN_API_KEY"),
            spoe,
            shutdown_timeout: Duration::from_secs(parse_var(
                "SHUTDOWN_TIMEOUT",
                var("SHUTDOWN_TIMEOUT"),
                10u64,
            )?),
            debug: is_true(var("DEBUG")),
            log_format: parse_var("LOG_FORMAT", var("LOG_FORMAT"), LogFormat::Text)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_FRAME_SIZE..=MAX_FRAME_SIZE).contains(&self.spoe.max_frame_size) {
            return Err(ConfigError::InvalidFrameSize);
        }
        if self.shutdown_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }
}

fn is_true(value: Option<String>) -> bool {
    value.is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

fn parse_var<T>(name: &str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(val) => val.parse().map_err(|e: T::Err| ConfigError::ParseError {
            name: name.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Accepts `host:port` or `:port`, the latter binding every IPv4 interface.
/// Host names are kept as given and resolved when the listener binds.
pub fn parse_listen_addr(name: &str, value: &str) -> Result<String, ConfigError> {
    let invalid = |reason: &str| ConfigError::ParseError {
        name: name.to_string(),
        reason: format!("'{value}': {reason}"),
    };

    let value = value.trim();
    let (host, port) = value
        .rsplit_once(':')
        .ok_or_else(|| invalid("expected host:port"))?;
    port.parse::<u16>().map_err(|_| invalid("invalid port"))?;

    if host.is_empty() {
        return Ok(format!("0.0.0.0:{port}"));
    }
    Ok(value.to_string())
}
