//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `AUDIOPRESS_CONFIG`
//! environment variable. A missing file is not an error: every field has a default.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `AUDIOPRESS_` override YAML values
//! 3. **PORT** - Special case: overrides `port` if set, as most hosting platforms inject it
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `AUDIOPRESS_ENCODER__TIMEOUT=60s` sets the `encoder.timeout` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use audiopress::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Server will bind to {}:{}", config.host, config.port);
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Override server port
//! AUDIOPRESS_PORT=9000
//!
//! # Cap uploads at 50 MiB
//! AUDIOPRESS_MAX_UPLOAD_SIZE=52428800
//!
//! # Use a specific encoder binary with a shorter timeout
//! AUDIOPRESS_ENCODER__PROGRAM=/usr/local/bin/ffmpeg
//! AUDIOPRESS_ENCODER__TIMEOUT=90s
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Default cap on the total request body, in bytes (100 MiB).
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 100 * 1024 * 1024;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "AUDIOPRESS_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// Loaded from YAML and environment variables. All fields have defaults defined in the
/// `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Maximum accepted request body size in bytes. Larger requests are rejected with 413
    /// before the upload handler runs.
    pub max_upload_size: u64,
    /// Directory used to stage uploads and encoder output. Created at startup if absent.
    pub temp_dir: PathBuf,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
    /// External encoder settings
    pub encoder: EncoderConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            temp_dir: std::env::temp_dir(),
            enable_otel_export: false,
            encoder: EncoderConfig::default(),
        }
    }
}

/// Settings for the external encoder process.
///
/// Only the binary and its time budget are configurable; the argument list is fixed.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncoderConfig {
    /// Encoder binary, either a name resolved via `PATH` or an absolute path
    pub program: PathBuf,
    /// Hard wall-clock limit for a single encode
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Run `<program> -version` at startup and refuse to start if it fails
    pub verify_on_startup: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            timeout: Duration::from_secs(180),
            verify_on_startup: true,
        }
    }
}

/// Reasons a loaded configuration is unusable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config validation: max_upload_size must be greater than zero")]
    ZeroUploadSize,
    #[error("Config validation: encoder.timeout must be greater than zero")]
    ZeroEncoderTimeout,
    #[error("Config validation: encoder.program must not be empty")]
    EmptyEncoderProgram,
}

impl Config {
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_upload_size == 0 {
            return Err(ConfigError::ZeroUploadSize);
        }
        if self.encoder.timeout.is_zero() {
            return Err(ConfigError::ZeroEncoderTimeout);
        }
        if self.encoder.program.as_os_str().is_empty() {
            return Err(ConfigError::EmptyEncoderProgram);
        }
        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            // AUDIOPRESS_CONFIG names the file itself and is consumed by clap
            .merge(Env::prefixed("AUDIOPRESS_").split("__").ignore(&["config"]))
            .merge(Env::raw().only(&["PORT"]))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Request body cap as a `usize`, saturating on 32-bit targets.
    pub fn max_upload_bytes(&self) -> usize {
        usize::try_from(self.max_upload_size).unwrap_or(usize::MAX)
    }
}
