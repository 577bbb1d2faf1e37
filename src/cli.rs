//! CLI parser
use clap::{Parser, ValueEnum};
use std::num::NonZeroU16;
use std::time::Duration;

use crate::constants::{
    DEFAULT_DATABASE_PATH, DEFAULT_GENERATION_DEADLINE, DEFAULT_MAX_IMAGE_BYTES,
    DEFAULT_RATE_LIMIT_MAX_REQUESTS, DEFAULT_RATE_LIMIT_WINDOW, DEFAULT_REPLICATE_API_BASE,
    DEFAULT_REPLICATE_MODEL,
};
use crate::generation::GenerationConfig;
use crate::ratelimit::RateLimitConfig;

/// Where rate limit counters live.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum RateLimitBackend {
    /// In process memory; per server process.
    #[default]
    Memory,
    /// In the sqlite database; shared by every process using it.
    Sqlite,
}

#[derive(Parser, Debug)]
/// CLI Options
pub struct CliOptions {
    #[clap(long, help = "Enable debug logging", env = "RETROCAM_DEBUG")]
    /// Enable debug logging. Env: RETROCAM_DEBUG
    pub debug: bool,
    #[clap(long, short, default_value = "9000", env = "RETROCAM_PORT")]
    /// http listener, defaults to `9000`.
    /// Env: RETROCAM_PORT
    pub port: NonZeroU16,
    #[clap(
        long,
        short,
        default_value = "127.0.0.1",
        env = "RETROCAM_LISTEN_ADDRESS"
    )]
    /// Listen address, defaults to `127.0.0.1`.
    /// Env: RETROCAM_LISTEN_ADDRESS
    pub listen_address: String,

    #[clap(long, env = "REPLICATE_API_TOKEN", hide_env_values = true)]
    /// Replicate API token. Without it every generation fails with a config error.
    /// Env: REPLICATE_API_TOKEN
    pub replicate_api_token: Option<String>,
    #[clap(long, default_value = DEFAULT_REPLICATE_API_BASE, env = "RETROCAM_REPLICATE_API_BASE")]
    /// Replicate API root.
    /// Env: RETROCAM_REPLICATE_API_BASE
    pub replicate_api_base: String,
    #[clap(long, default_value = DEFAULT_REPLICATE_MODEL, env = "RETROCAM_MODEL")]
    /// Model to run, `owner/name` or `owner/name:version`.
    /// Env: RETROCAM_MODEL
    pub model: String,

    #[clap(long, default_value_t = DEFAULT_RATE_LIMIT_MAX_REQUESTS, env = "RETROCAM_RATE_LIMIT")]
    /// Requests allowed per client per window.
    /// Env: RETROCAM_RATE_LIMIT
    pub rate_limit: u32,
    #[clap(
        long,
        default_value_t = DEFAULT_RATE_LIMIT_WINDOW.as_secs(),
        env = "RETROCAM_RATE_LIMIT_WINDOW_SECS"
    )]
    /// Rate limit window, in seconds.
    /// Env: RETROCAM_RATE_LIMIT_WINDOW_SECS
    pub rate_limit_window_secs: u64,
    #[clap(long, value_enum, default_value_t, env = "RETROCAM_RATE_LIMIT_BACKEND")]
    /// Where rate limit counters are kept.
    /// Env: RETROCAM_RATE_LIMIT_BACKEND
    pub rate_limit_backend: RateLimitBackend,
    #[clap(long, default_value = DEFAULT_DATABASE_PATH, env = "RETROCAM_DATABASE_PATH")]
    /// Path to the sqlite database used by the `sqlite` backend.
    /// Env: RETROCAM_DATABASE_PATH
    pub database_path: String,

    #[clap(
        long,
        default_value_t = DEFAULT_GENERATION_DEADLINE.as_secs(),
        env = "RETROCAM_DEADLINE_SECS"
    )]
    /// Seconds a generation may take before it is canceled.
    /// Env: RETROCAM_DEADLINE_SECS
    pub deadline_secs: u64,
    #[clap(long, default_value_t = DEFAULT_MAX_IMAGE_BYTES, env = "RETROCAM_MAX_IMAGE_BYTES")]
    /// Largest inline image accepted, in decoded bytes.
    /// Env: RETROCAM_MAX_IMAGE_BYTES
    pub max_image_bytes: usize,
}

impl CliOptions {
    /// Quota settings from the options.
    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: self.rate_limit,
            window: Duration::from_secs(self.rate_limit_window_secs),
        }
    }

    /// Generation settings from the options; backoff timings keep their
    /// defaults.
    pub fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            deadline: Duration::from_secs(self.deadline_secs),
            max_image_bytes: self.max_image_bytes,
            ..GenerationConfig::default()
        }
    }

    /// The API token, if one was given and isn't blank.
    pub fn api_token(&self) -> Option<&str> {
        self.replicate_api_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}
