use std::{path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Context, Result};

/// Runtime settings of the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub hostname: String,
    pub message_dir: PathBuf,
    pub attachment_dir: PathBuf,
    pub max_message_size: usize,
    pub max_line_length: usize,
    pub idle_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:25".to_string(),
            hostname: "naive-mail".to_string(),
            message_dir: PathBuf::from("emails"),
            attachment_dir: PathBuf::from("attachments"),
            max_message_size: 10 * 1024 * 1024,
            max_line_length: 65536,
            idle_timeout: Duration::from_secs(300),
        }
    }
}

impl Config {
    /// Build the configuration from `NAIVE_MAIL_*` environment variables.
    ///
    /// Unset variables fall back to the defaults. A variable that is set but
    /// cannot be parsed is an error.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let bind = lookup("NAIVE_MAIL_BIND").unwrap_or_else(|| {
            tracing::warn!("NAIVE_MAIL_BIND not set, listening on {}", defaults.bind);
            defaults.bind.clone()
        });

        Ok(Self {
            bind,
            hostname: lookup("NAIVE_MAIL_HOSTNAME").unwrap_or(defaults.hostname),
            message_dir: lookup("NAIVE_MAIL_MESSAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.message_dir),
            attachment_dir: lookup("NAIVE_MAIL_ATTACHMENT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.attachment_dir),
            max_message_size: parse_var(
                &lookup,
                "NAIVE_MAIL_MAX_MESSAGE_SIZE",
                defaults.max_message_size,
            )?,
            max_line_length: parse_var(
                &lookup,
                "NAIVE_MAIL_MAX_LINE_LENGTH",
                defaults.max_line_length,
            )?,
            idle_timeout: Duration::from_secs(parse_var(
                &lookup,
                "NAIVE_MAIL_IDLE_TIMEOUT",
                defaults.idle_timeout.as_secs(),
            )?),
        })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr + std::fmt::Display,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value {raw:?} for {key}")),
        None => {
            tracing::debug!("{} not set, using {}", key, default);
            Ok(default)
        }
    }
}
