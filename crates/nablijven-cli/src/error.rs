use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] nablijven_core::Error),
    #[error(transparent)]
    Remote(#[from] nablijven_core::remote::RemoteError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Detention not found: {0}")]
    DetentionNotFound(String),
    #[error("No session day for {0}; pass --day MAANDAG, DINSDAG or DONDERDAG")]
    UnknownSessionDay(String),
}
