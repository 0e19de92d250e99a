//! Errors raised while persisting the scattering configuration.

use std::path::PathBuf;

/// Errors that can occur when locating, loading, saving, or parsing `config.ron`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The platform exposes no per-user configuration directory.
    #[error("no user configuration directory available")]
    NoConfigDir,

    /// Failed to read the config file from disk.
    #[error("failed to read config: {0}")]
    ReadError(#[source] std::io::Error),

    /// Failed to write the config file to disk.
    #[error("failed to write config: {0}")]
    WriteError(#[source] std::io::Error),

    /// Failed to parse RON content.
    #[error("failed to parse config: {0}")]
    ParseError(#[source] ron::error::SpannedError),

    /// Failed to serialize config to RON.
    #[error("failed to serialize config: {0}")]
    SerializeError(#[source] ron::Error),

    /// The config path exists but is not a directory.
    #[error("config path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
}
