//! Browser pool error types.

use thiserror::Error;

/// Errors that can occur while managing or driving browser instances.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("pool exhausted: all {0} browser instances are in use")]
    PoolExhausted(usize),

    #[error("browser closed unexpectedly")]
    BrowserClosed,

    #[error("no element is focused")]
    NoFocusedElement,

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("renderer is unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
