//! Server configuration.
//!
//! Everything the server needs is collected into one [`ServerConfig`] and
//! handed to the router, with environment variables overriding defaults.

use std::fmt::Display;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::DEFAULT_CHUNK_SIZE;

/// Listen port when `PORT` is unset.
pub const DEFAULT_PORT: u16 = 8080;

/// Request body limit for uploads when `MAX_UPLOAD_BYTES` is unset.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Configuration value that could not be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {key}={value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime configuration of the streaming server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub listen_addr: SocketAddr,
    /// Directory media is served from and uploads are written to.
    pub media_dir: PathBuf,
    /// Root of the `/static` tree.
    pub static_dir: PathBuf,
    /// Bytes read and sent per body chunk.
    pub chunk_size: usize,
    /// Largest accepted upload request body.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            media_dir: std::env::temp_dir(),
            static_dir: PathBuf::from("wwwroot"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `PORT`, `MEDIA_FOLDER`, `STATIC_DIR`,
    /// `STREAM_CHUNK_SIZE` and `MAX_UPLOAD_BYTES`.
    ///
    /// # Errors
    /// - `ConfigError::Invalid` - a numeric variable did not parse, or the chunk size is zero
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ServerConfig::from_env`] with variables read through `lookup`.
    /// Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let lookup = |key: &str| lookup(key).filter(|value| !value.is_empty());
        let mut config = Self::default();

        if let Some(port) = lookup("PORT") {
            config.listen_addr.set_port(parse_var("PORT", port)?);
        }

        if let Some(dir) = lookup("MEDIA_FOLDER") {
            config.media_dir = PathBuf::from(dir);
        }

        if let Some(dir) = lookup("STATIC_DIR") {
            config.static_dir = PathBuf::from(dir);
        }

        if let Some(size) = lookup("STREAM_CHUNK_SIZE") {
            let chunk_size: usize = parse_var("STREAM_CHUNK_SIZE", size.clone())?;
            if chunk_size == 0 {
                return Err(ConfigError::Invalid {
                    key: "STREAM_CHUNK_SIZE",
                    value: size,
                    reason: "must be greater than zero".to_string(),
                });
            }
            config.chunk_size = chunk_size;
        }

        if let Some(limit) = lookup("MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = parse_var("MAX_UPLOAD_BYTES", limit)?;
        }

        Ok(config)
    }

    /// Creates the media directory if it does not exist yet.
    pub async fn ensure_media_dir(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.media_dir).await
    }
}

fn parse_var<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value,
    })
}
