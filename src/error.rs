//! wgden Error Types

use thiserror::Error;

/// Result type alias for wgden operations
pub type Result<T> = std::result::Result<T, Error>;

/// wgden error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Registry errors
    #[error("Peer already exists: {0}")]
    DuplicateName(String),

    #[error("Peer not found: {0}")]
    NotFound(String),

    #[error("Invalid peer record {name}: {reason}")]
    InvalidRecord { name: String, reason: String },

    #[error("Invalid peer type: {0}")]
    InvalidPeerType(String),

    // Resolution errors
    #[error("Name does not resolve: {0}")]
    UnresolvableName(String),

    #[error("DNS resolver error: {0}")]
    Dns(String),

    // Key material errors
    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    // Rendering errors
    #[error("Render failed: {0}")]
    Render(String),

    // Locking errors
    #[error("Registry is locked by another process: {0}")]
    RegistryLocked(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error means the requested peer simply does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Check if this error stems from bad persisted state (as opposed to
    /// bad input or environment)
    pub fn is_corrupt_state(&self) -> bool {
        matches!(self, Error::InvalidRecord { .. } | Error::InvalidPeerType(_))
    }
}
