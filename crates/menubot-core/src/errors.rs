use std::path::PathBuf;

/// Core error type.
///
/// Only configuration problems (environment, menu definition) are fatal, and
/// only at startup. Request-time problems never surface as `Error`: bad input
/// degrades to `InboundUpdate::Unknown` and delivery problems are reported as
/// `DeliveryResult`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("menu error: {0}")]
    Menu(String),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("cannot read {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
