use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Cycles may not run more often than this.
pub const MIN_INTERVAL_SEC: u64 = 120;
/// Interval used when none is configured.
pub const DEFAULT_INTERVAL_SEC: u64 = 24 * 3600;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Seconds between cycles. Zero selects [`DEFAULT_INTERVAL_SEC`].
    pub interval_sec: u64,
    /// Login-capable accounts left untouched. When empty, no account is locked.
    pub block_system_login_except: Vec<String>,
}

impl MaintenanceConfig {
    /// Fill in defaults and check bounds. Safe to call repeatedly.
    pub fn normalise(&mut self) -> Result<()> {
        if self.interval_sec == 0 {
            self.interval_sec = DEFAULT_INTERVAL_SEC;
        }
        if self.interval_sec < MIN_INTERVAL_SEC {
            return Err(Error::configuration(
                "interval_sec",
                format!(
                    "{} is below the minimum of {MIN_INTERVAL_SEC} seconds",
                    self.interval_sec
                ),
            ));
        }
        Ok(())
    }

    pub fn is_allowed_login(&self, account: &str) -> bool {
        self.block_system_login_except.iter().any(|a| a == account)
    }
}
