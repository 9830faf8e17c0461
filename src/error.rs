use std::sync::Arc;

use thiserror::Error;

/// Errors are `Clone` so a single in-flight fetch can settle every waiter.
#[derive(Error, Debug, Clone)]
pub enum GerritError {
    #[error("API error: {0}")]
    Api(String),

    #[error("HTTP {status} for {url}")]
    Http { status: u16, url: String },

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for GerritError {
    fn from(err: std::io::Error) -> Self {
        GerritError::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for GerritError {
    fn from(err: reqwest::Error) -> Self {
        GerritError::Transport(err.to_string())
    }
}

impl GerritError {
    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            GerritError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GerritError>;
