use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// Failures found by one maintenance cycle. Passing checks are not listed.
#[derive(Debug, Clone)]
pub struct MaintenanceReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Account name (or the enumeration step) to error.
    pub login_accounts: BTreeMap<String, String>,
    /// Feature trigger to self test error.
    pub features: BTreeMap<String, String>,
    /// Probe name to error.
    pub probes: BTreeMap<String, String>,
}

impl MaintenanceReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            login_accounts: BTreeMap::new(),
            features: BTreeMap::new(),
            probes: BTreeMap::new(),
        }
    }

    pub fn failure_count(&self) -> usize {
        self.login_accounts.len() + self.features.len() + self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failure_count() == 0
    }

    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        Err(Error::Aggregate {
            failures: self.failure_count(),
            summary: self.to_string(),
        })
    }
}

fn write_section(
    f: &mut fmt::Formatter<'_>,
    title: &str,
    entries: &BTreeMap<String, String>,
) -> fmt::Result {
    if entries.is_empty() {
        return Ok(());
    }
    writeln!(f, "{title}:")?;
    for (key, error) in entries {
        writeln!(f, "  {key}: {error}")?;
    }
    Ok(())
}

impl fmt::Display for MaintenanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Maintenance cycle {} to {}",
            self.started_at.to_rfc3339(),
            self.finished_at.to_rfc3339()
        )?;
        if self.is_empty() {
            return writeln!(f, "No problems found.");
        }
        write_section(f, "Login accounts", &self.login_accounts)?;
        write_section(f, "Features", &self.features)?;
        write_section(f, "Probes", &self.probes)
    }
}
