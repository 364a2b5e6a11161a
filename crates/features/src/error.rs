use std::{error::Error as StdError, time::Duration};

use crate::command::Trigger;

/// Crate-wide result type for feature operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by features and the feature registry.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configuration document is not a JSON object.
    #[error("failed to retrieve config map - {source}")]
    ConfigMap {
        #[source]
        source: serde_json::Error,
    },

    /// One feature's configuration payload is malformed.
    #[error("failed to deserialise JSON key {key} - {source}")]
    Configuration {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A configured feature could not be set up.
    #[error("{trigger} failed to initialise - {message}")]
    Initialisation { trigger: Trigger, message: String },

    /// Two configured features claim the same trigger.
    #[error("trigger {trigger} is claimed by both {first} and {second}")]
    DuplicateTrigger {
        trigger: Trigger,
        first: &'static str,
        second: &'static str,
    },

    /// No registered feature answers to the trigger.
    #[error("unknown trigger {trigger}")]
    UnknownTrigger { trigger: String },

    /// The command text is empty after trimming.
    #[error("command is empty")]
    EmptyCommand,

    /// Malformed sub-command; the message is the usage text shown to the user.
    #[error("{0}")]
    Grammar(String),

    /// The feature's runtime state does not allow the operation (session gone,
    /// pool saturated, not initialised).
    #[error("{0}")]
    State(String),

    /// A self test did not finish before its deadline.
    #[error("self test did not finish within {}s", .0.as_secs())]
    Timeout(Duration),

    /// Wrapped failure from an external dependency.
    #[error("{context} - {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("{0}")]
    Message(String),
}

impl Error {
    #[must_use]
    pub fn initialisation(trigger: Trigger, message: impl std::fmt::Display) -> Self {
        Self::Initialisation {
            trigger,
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn grammar(usage: impl Into<String>) -> Self {
        Self::Grammar(usage.into())
    }

    #[must_use]
    pub fn state(message: impl Into<String>) -> Self {
        Self::State(message.into())
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

impl switchboard_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

switchboard_common::impl_context!();
