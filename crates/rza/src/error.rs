//! Errors
use crate::Str;

/// Everything that can go wrong while setting up or driving a widget.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The widget's declared defaults were neither a list of names, a mapping
    /// nor absent.
    #[error("defaults must be a list of names, a mapping or absent, found {found}")]
    MalformedDefaults { found: Str },

    /// The widget stopped observing before the awaited event happened.
    #[error("widget was disconnected")]
    Disconnected,

    /// The host environment refused an operation.
    #[error("host error: {0}")]
    Host(String),

    /// The widget's render function failed.
    #[error("render failed: {0:#}")]
    Render(anyhow::Error),
}
