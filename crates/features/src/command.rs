//! Command, outcome and trigger types shared by every feature.

use std::{borrow::Borrow, fmt};

use crate::error::Error;

/// Default time budget for a command when the channel does not set one.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// Short prefix selecting a feature in the command grammar, e.g. `.s` for shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Trigger(&'static str);

impl Trigger {
    pub const fn new(prefix: &'static str) -> Self {
        Self(prefix)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Borrow<str> for Trigger {
    fn borrow(&self) -> &str {
        self.0
    }
}

impl PartialEq<str> for Trigger {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Trigger {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Trigger-stripped command text plus the channel it arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Channel that delivered the command, e.g. `smtp`, `sms`, `http`.
    pub channel: String,
    pub timeout_secs: u64,
    pub content: String,
}

impl Command {
    pub fn new(channel: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Strip surrounding whitespace; an empty command is an error.
    pub fn trim(&mut self) -> Result<(), Error> {
        let trimmed = self.content.trim();
        if trimmed.len() != self.content.len() {
            self.content = trimmed.to_string();
        }
        if self.content.is_empty() {
            return Err(Error::EmptyCommand);
        }
        Ok(())
    }
}

/// Result of executing a command: an optional error plus free-text output.
///
/// Having neither an error nor output is a valid, successful outcome.
#[derive(Debug, Default)]
pub struct Outcome {
    pub error: Option<Error>,
    pub output: String,
}

impl Outcome {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            error: None,
            output: output.into(),
        }
    }

    pub fn failed(error: Error) -> Self {
        Self {
            error: Some(error),
            output: String::new(),
        }
    }

    /// An error that still carries whatever output was produced.
    pub fn failed_with_output(error: Error, output: impl Into<String>) -> Self {
        Self {
            error: Some(error),
            output: output.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Text to send back to the channel: the error message when present,
    /// followed by any output.
    pub fn combined_text(&self) -> String {
        match &self.error {
            Some(err) if self.output.is_empty() => err.to_string(),
            Some(err) => format!("{err}\n{}", self.output),
            None => self.output.clone(),
        }
    }
}

impl From<Result<String, Error>> for Outcome {
    fn from(result: Result<String, Error>) -> Self {
        match result {
            Ok(output) => Self::ok(output),
            Err(error) => Self::failed(error),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn trim_strips_whitespace() {
        let mut cmd = Command::new("sms", "  g http://example.com \n");
        cmd.trim().unwrap();
        assert_eq!(cmd.content, "g http://example.com");
    }

    #[test]
    fn trim_rejects_blank_content() {
        let mut cmd = Command::new("sms", " \t ");
        assert!(matches!(cmd.trim(), Err(Error::EmptyCommand)));
    }

    #[test]
    fn empty_outcome_is_success() {
        let outcome = Outcome::default();
        assert!(outcome.is_ok());
        assert_eq!(outcome.combined_text(), "");
    }

    #[test]
    fn combined_text_prefers_error() {
        let outcome = Outcome::failed_with_output(Error::state("exit status 1"), "partial");
        assert_eq!(outcome.combined_text(), "exit status 1\npartial");
        assert_eq!(
            Outcome::failed(Error::EmptyCommand).combined_text(),
            "command is empty"
        );
    }

    #[test]
    fn trigger_compares_with_str() {
        let trigger = Trigger::new(".bp");
        assert_eq!(trigger, ".bp");
        assert_eq!(trigger.to_string(), ".bp");
    }
}
