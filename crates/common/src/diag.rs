//! Diagnostic logger producing one-line messages of the form
//! `Component[ID].Function(actor): Error "<err>" - <message>`.
//!
//! Every segment is optional. An empty segment is dropped together with its
//! separator, so a logger without an ID never renders `Component[]`.

use std::fmt::{Display, Write as _};

use tracing::{error, info, warn};

/// Names the component instance that emits messages, e.g. `("HTTPD", "0.0.0.0:80")`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Logger {
    pub component_name: String,
    pub component_id: String,
}

impl Logger {
    pub fn new(component_name: impl Into<String>, component_id: impl Into<String>) -> Self {
        Self {
            component_name: component_name.into(),
            component_id: component_id.into(),
        }
    }

    /// Render a message without an error segment.
    pub fn format(&self, function: &str, actor: &str, message: impl Display) -> String {
        self.compose(function, actor, None, &message.to_string())
    }

    /// Render a message carrying an error segment.
    pub fn format_err(
        &self,
        function: &str,
        actor: &str,
        err: &dyn Display,
        message: impl Display,
    ) -> String {
        self.compose(function, actor, Some(err.to_string()), &message.to_string())
    }

    pub fn info(&self, function: &str, actor: &str, message: impl Display) {
        info!(
            component = %self.component_name,
            component_id = %self.component_id,
            "{}",
            self.format(function, actor, message)
        );
    }

    pub fn warn(&self, function: &str, actor: &str, err: &dyn Display, message: impl Display) {
        warn!(
            component = %self.component_name,
            component_id = %self.component_id,
            "{}",
            self.format_err(function, actor, err, message)
        );
    }

    pub fn error(&self, function: &str, actor: &str, err: &dyn Display, message: impl Display) {
        error!(
            component = %self.component_name,
            component_id = %self.component_id,
            "{}",
            self.format_err(function, actor, err, message)
        );
    }

    fn compose(&self, function: &str, actor: &str, err: Option<String>, message: &str) -> String {
        let mut origin = self.component_name.clone();
        if !self.component_id.is_empty() {
            let _ = write!(origin, "[{}]", self.component_id);
        }

        let mut call = function.to_string();
        if !actor.is_empty() {
            let _ = write!(call, "({actor})");
        }

        let mut out = match (origin.is_empty(), call.is_empty()) {
            (false, false) => format!("{origin}.{call}"),
            (false, true) => origin,
            (true, _) => call,
        };

        let mut body = String::new();
        if let Some(err) = err {
            let _ = write!(body, "Error \"{err}\"");
            if !message.is_empty() {
                body.push_str(" - ");
            }
        }
        body.push_str(message);

        if !out.is_empty() && !body.is_empty() {
            out.push_str(": ");
        }
        out.push_str(&body);
        out
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("SMTPD", "0.0.0.0:25", "start", "alice", "listening", "SMTPD[0.0.0.0:25].start(alice): listening")]
    #[case("SMTPD", "", "start", "", "listening", "SMTPD.start: listening")]
    #[case("", "", "start", "bob", "listening", "start(bob): listening")]
    #[case("SMTPD", "1", "", "", "listening", "SMTPD[1]: listening")]
    #[case("", "", "", "", "listening", "listening")]
    #[case("SMTPD", "", "", "", "", "SMTPD")]
    fn format_drops_empty_segments(
        #[case] component: &str,
        #[case] id: &str,
        #[case] function: &str,
        #[case] actor: &str,
        #[case] message: &str,
        #[case] expected: &str,
    ) {
        let logger = Logger::new(component, id);
        assert_eq!(logger.format(function, actor, message), expected);
    }

    #[test]
    fn format_err_includes_quoted_error() {
        let logger = Logger::new("HTTPD", "0.0.0.0:80");
        assert_eq!(
            logger.format_err("serve", "1.2.3.4", &"no such file", "failed to start component"),
            "HTTPD[0.0.0.0:80].serve(1.2.3.4): Error \"no such file\" - failed to start component"
        );
    }

    #[test]
    fn format_err_without_message_has_no_dangling_separator() {
        let logger = Logger::default();
        assert_eq!(logger.format_err("", "", &"boom", ""), "Error \"boom\"");
    }
}
