//! Operating system login accounts.

use std::path::{Path, PathBuf};

use {
    anyhow::{Context, bail},
    async_trait::async_trait,
    tokio::process::Command,
    tracing::info,
};

/// Enumerates and locks accounts that can log in to the host.
#[async_trait]
pub trait LoginAccounts: Send + Sync {
    /// Names of accounts that currently have a usable login shell.
    async fn login_accounts(&self) -> anyhow::Result<Vec<String>>;

    /// Prevent `account` from logging in.
    async fn lock(&self, account: &str) -> anyhow::Result<()>;
}

/// Reads accounts from a passwd(5) file and locks them with `passwd -l`.
#[derive(Debug, Clone)]
pub struct SystemLoginAccounts {
    passwd_path: PathBuf,
    lock_program: String,
}

impl Default for SystemLoginAccounts {
    fn default() -> Self {
        Self {
            passwd_path: PathBuf::from("/etc/passwd"),
            lock_program: "passwd".into(),
        }
    }
}

impl SystemLoginAccounts {
    #[must_use]
    pub fn with_passwd_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.passwd_path = path.into();
        self
    }

    /// Program invoked as `<program> -l <account>` to lock an account.
    #[must_use]
    pub fn with_lock_program(mut self, program: impl Into<String>) -> Self {
        self.lock_program = program.into();
        self
    }

    pub fn passwd_path(&self) -> &Path {
        &self.passwd_path
    }
}

fn has_login_shell(shell: &str) -> bool {
    let name = shell.rsplit('/').next().unwrap_or(shell);
    !name.is_empty() && name != "nologin" && name != "false"
}

/// Accounts from passwd(5) content whose shell permits logging in.
fn parse_login_accounts(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(':').collect();
            match fields.as_slice() {
                [name, _, _, _, _, _, shell] if !name.is_empty() && has_login_shell(shell) => {
                    Some((*name).to_string())
                },
                _ => None,
            }
        })
        .collect()
}

#[async_trait]
impl LoginAccounts for SystemLoginAccounts {
    async fn login_accounts(&self) -> anyhow::Result<Vec<String>> {
        let content = tokio::fs::read_to_string(&self.passwd_path)
            .await
            .with_context(|| format!("failed to read {}", self.passwd_path.display()))?;
        Ok(parse_login_accounts(&content))
    }

    async fn lock(&self, account: &str) -> anyhow::Result<()> {
        let output = Command::new(&self.lock_program)
            .arg("-l")
            .arg(account)
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.lock_program))?;
        if !output.status.success() {
            bail!(
                "{} -l {account} exited with {}: {}",
                self.lock_program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        info!(account, "locked login account");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, rstest::rstest, std::io::Write};

    const PASSWD: &str = "\
root:x:0:0:root:/root:/bin/bash
daemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin
# comment line
sync:x:4:65534:sync:/bin:/bin/sync
ftp:x:5:5::/srv/ftp:/bin/false
broken-line
alice:x:1000:1000:Alice,,,:/home/alice:/usr/bin/zsh
nobody:x:65534:65534:nobody:/nonexistent:
";

    #[test]
    fn parses_login_capable_accounts() {
        assert_eq!(parse_login_accounts(PASSWD), vec!["root", "sync", "alice"]);
    }

    #[rstest]
    #[case("/bin/bash", true)]
    #[case("/usr/sbin/nologin", false)]
    #[case("/sbin/nologin", false)]
    #[case("/bin/false", false)]
    #[case("", false)]
    fn login_shell_detection(#[case] shell: &str, #[case] expected: bool) {
        assert_eq!(has_login_shell(shell), expected);
    }

    #[tokio::test]
    async fn reads_passwd_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(PASSWD.as_bytes()).unwrap();
        let accounts = SystemLoginAccounts::default().with_passwd_path(file.path());
        assert_eq!(accounts.login_accounts().await.unwrap(), vec![
            "root", "sync", "alice"
        ]);
    }

    #[tokio::test]
    async fn missing_passwd_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let accounts = SystemLoginAccounts::default().with_passwd_path(dir.path().join("passwd"));
        let err = accounts.login_accounts().await.unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[tokio::test]
    async fn lock_reports_program_failure() {
        let ok = SystemLoginAccounts::default().with_lock_program("true");
        ok.lock("alice").await.unwrap();

        let failing = SystemLoginAccounts::default().with_lock_program("false");
        let err = failing.lock("alice").await.unwrap_err();
        assert!(err.to_string().contains("false -l alice"), "{err}");
    }
}
