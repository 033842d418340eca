use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use staffing_core::{FloaterWeighting, SessionConfig};

const PREFIX: &str = "CARETRACK__";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub log_format: LogFormat,
    pub weighting: FloaterWeighting,
    pub session: SessionConfig,
    pub seed_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            log_format: LogFormat::default(),
            weighting: FloaterWeighting::default(),
            session: SessionConfig::default(),
            seed_file: None,
        }
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let name = format!("{PREFIX}{key}");
    match lookup(&name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{e}"))
            .with_context(|| format!("invalid {name}={raw}")),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Reads `CARETRACK__*` keys through `lookup`; unset keys keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Config::default();
        let settle_ms = parse(
            &lookup,
            "ROSTER__SETTLE_DELAY_MS",
            defaults.session.settle_delay.as_millis() as u64,
        )?;
        let stale_ms = parse(
            &lookup,
            "ROSTER__STALE_WINDOW_MS",
            defaults.session.stale_window.as_millis() as u64,
        )?;
        let idle_ms = parse(
            &lookup,
            "ROSTER__SESSION_IDLE_TTL_MS",
            defaults.session.idle_ttl.as_millis() as u64,
        )?;
        Ok(Self {
            port: parse(&lookup, "SERVER__PORT", defaults.port)?,
            log_format: parse(&lookup, "LOG__FORMAT", defaults.log_format)?,
            weighting: parse(&lookup, "STAFFING__FLOATER_WEIGHTING", defaults.weighting)?,
            session: SessionConfig {
                settle_delay: Duration::from_millis(settle_ms),
                stale_window: Duration::from_millis(stale_ms),
                idle_ttl: Duration::from_millis(idle_ms),
            },
            seed_file: lookup(&format!("{PREFIX}SEED_FILE"))
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        })
    }
}
