//! Shell command execution (`.s <command>`).

use std::{
    path::PathBuf,
    process::Stdio,
    sync::OnceLock,
    time::Duration,
};

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    tokio::process::Command as Process,
    tracing::{debug, warn},
};

use crate::{
    command::{Command, Outcome, Trigger},
    error::{Error, Result},
    feature::Feature,
};

pub const TRIGGER: Trigger = Trigger::new(".s");

const SELF_TEST_MARKER: &str = "switchboard-shell-ok";

/// Run-time bound used when the configuration leaves `timeout_secs` at 0.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Interpreter invoked as `<interpreter> -c <command>`. Unset disables the feature.
    pub interpreter: Option<String>,
    /// Upper bound on a command's run time; the command's own timeout applies
    /// if shorter. 0 selects [`DEFAULT_TIMEOUT_SECS`].
    pub timeout_secs: u64,
    /// Output beyond this many bytes is cut off.
    pub max_output_bytes: usize,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            interpreter: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_output_bytes: 4 * 1024,
        }
    }
}

/// Runs commands through a configured shell interpreter.
pub struct Shell {
    config: ShellConfig,
    resolved: OnceLock<PathBuf>,
}

impl Shell {
    pub fn new(config: ShellConfig) -> Self {
        Self {
            config,
            resolved: OnceLock::new(),
        }
    }

    fn interpreter(&self) -> Option<&str> {
        self.config
            .interpreter
            .as_deref()
            .filter(|path| !path.trim().is_empty())
    }

    /// Effective limit for a command asking for `requested_secs` (0 for no
    /// preference).
    fn time_limit(&self, requested_secs: u64) -> Duration {
        let ceiling = match self.config.timeout_secs {
            0 => DEFAULT_TIMEOUT_SECS,
            secs => secs,
        };
        let secs = match requested_secs {
            0 => ceiling,
            secs => secs.min(ceiling),
        };
        Duration::from_secs(secs)
    }

    /// Run `command`, returning combined stdout/stderr and the exit code.
    async fn run(&self, command: &str, limit: Duration) -> Result<(String, i32)> {
        let program = match (self.resolved.get(), self.interpreter()) {
            (Some(path), _) => path.clone(),
            (None, Some(name)) => PathBuf::from(name),
            (None, None) => return Err(Error::state("shell interpreter is not configured")),
        };
        debug!(command, timeout_secs = limit.as_secs(), "running shell command");

        let child = Process::new(&program)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                Error::external(format!("failed to start {}", program.display()), err)
            })?;

        let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => return Err(Error::external("failed to run command", err)),
            Err(_) => {
                warn!(command, "shell command timed out");
                return Err(Error::state(format!(
                    "command timed out after {}s",
                    limit.as_secs()
                )));
            },
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        let text = truncate(text.trim(), self.config.max_output_bytes);
        Ok((text, output.status.code().unwrap_or(-1)))
    }
}

fn truncate(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n... [output truncated]", &text[..end])
}

#[async_trait]
impl Feature for Shell {
    fn key(&self) -> &'static str {
        "shell"
    }

    fn trigger(&self) -> Trigger {
        TRIGGER
    }

    fn is_configured(&self) -> bool {
        self.interpreter().is_some()
    }

    async fn initialise(&self) -> Result<()> {
        let Some(name) = self.interpreter() else {
            return Err(Error::initialisation(TRIGGER, "interpreter is not set"));
        };
        let path = which::which(name).map_err(|err| {
            Error::initialisation(TRIGGER, format!("cannot find interpreter {name} - {err}"))
        })?;
        let _ = self.resolved.set(path);
        Ok(())
    }

    async fn self_test(&self) -> Result<()> {
        let (output, code) = self
            .run(
                &format!("echo {SELF_TEST_MARKER}"),
                self.time_limit(0),
            )
            .await?;
        if code != 0 || !output.contains(SELF_TEST_MARKER) {
            return Err(Error::state(format!(
                "unexpected self test output (exit status {code}): {output}"
            )));
        }
        Ok(())
    }

    async fn execute(&self, mut cmd: Command) -> Outcome {
        if let Err(err) = cmd.trim() {
            return Outcome::failed(err);
        }
        match self.run(&cmd.content, self.time_limit(cmd.timeout_secs)).await {
            Ok((output, 0)) => Outcome::ok(output),
            Ok((output, code)) => {
                Outcome::failed_with_output(Error::state(format!("exit status {code}")), output)
            },
            Err(err) => Outcome::failed(err),
        }
    }
}
