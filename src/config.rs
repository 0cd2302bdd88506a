//! Runtime configuration: defaults or a JSON file, `AUTHGATE_*` environment
//! overrides and command-line flags, in that order of precedence (last wins).

use std::env;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::identity::MIN_TOKEN_BYTES;

#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GateConfig {
    pub http_port: u16,
    pub token_ttl_secs: u64,
    pub token_byte_length: usize,
    /// The single accepted account.
    pub username: String,
    pub password: String,
    pub secret_min: i64,
    pub secret_max: i64,
    /// 0 disables the background sweep; expiry is still enforced lazily.
    pub sweep_interval_secs: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            http_port: 7878,
            token_ttl_secs: 60 * 60,
            token_byte_length: MIN_TOKEN_BYTES,
            username: "bob".to_string(),
            password: "password".to_string(),
            secret_min: -20,
            secret_max: 55,
            sweep_interval_secs: 60,
        }
    }
}

impl std::fmt::Debug for GateConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateConfig")
            .field("http_port", &self.http_port)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("token_byte_length", &self.token_byte_length)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("secret_min", &self.secret_min)
            .field("secret_max", &self.secret_max)
            .field("sweep_interval_secs", &self.sweep_interval_secs)
            .finish()
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.windows(2).find(|w| w[0] == flag).and_then(|w| w[1].parse::<T>().ok())
}

impl GateConfig {
    pub fn token_ttl(&self) -> Duration { Duration::from_secs(self.token_ttl_secs) }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    /// Base settings (JSON file named by `AUTHGATE_CONFIG`, else defaults)
    /// overlaid with the environment.
    pub fn load() -> Result<Self> {
        let base = match env::var("AUTHGATE_CONFIG") {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading config file {path}"))?;
                serde_json::from_str(&raw).with_context(|| format!("parsing config file {path}"))?
            }
            Err(_) => Self::default(),
        };
        Ok(base.overlay_env())
    }

    /// Overlay any `AUTHGATE_*` variables that parse.
    pub fn overlay_env(self) -> Self {
        let mut cfg = self;
        if let Some(v) = parse_env("AUTHGATE_HTTP_PORT") { cfg.http_port = v; }
        if let Some(v) = parse_env("AUTHGATE_TOKEN_TTL_SECS") { cfg.token_ttl_secs = v; }
        if let Some(v) = parse_env("AUTHGATE_TOKEN_BYTE_LENGTH") { cfg.token_byte_length = v; }
        if let Ok(v) = env::var("AUTHGATE_USERNAME") { cfg.username = v; }
        if let Ok(v) = env::var("AUTHGATE_PASSWORD") { cfg.password = v; }
        if let Some(v) = parse_env("AUTHGATE_SECRET_MIN") { cfg.secret_min = v; }
        if let Some(v) = parse_env("AUTHGATE_SECRET_MAX") { cfg.secret_max = v; }
        if let Some(v) = parse_env("AUTHGATE_SWEEP_INTERVAL_SECS") { cfg.sweep_interval_secs = v; }
        cfg
    }

    /// Apply `--port` and `--ttl` flags.
    pub fn apply_args(mut self, args: &[String]) -> Self {
        if let Some(p) = parse_arg(args, "--port") { self.http_port = p; }
        if let Some(t) = parse_arg(args, "--ttl") { self.token_ttl_secs = t; }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.token_ttl_secs == 0 {
            bail!("token_ttl_secs must be greater than 0");
        }
        if self.token_byte_length < MIN_TOKEN_BYTES {
            bail!("token_byte_length must be at least {MIN_TOKEN_BYTES} (got {})", self.token_byte_length);
        }
        if self.username.is_empty() || self.password.is_empty() {
            bail!("username and password must not be empty");
        }
        if self.secret_min > self.secret_max {
            bail!("secret_min ({}) must not exceed secret_max ({})", self.secret_min, self.secret_max);
        }
        Ok(())
    }
}
