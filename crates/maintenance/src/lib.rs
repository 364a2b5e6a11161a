//! Periodic maintenance: login-account lockdown, feature self tests and
//! collaborator probes, rolled up into one report per cycle.

pub mod accounts;
pub mod config;
pub mod error;
pub mod probe;
pub mod report;
pub mod service;

pub use {
    accounts::{LoginAccounts, SystemLoginAccounts},
    config::MaintenanceConfig,
    error::{Error, Result},
    probe::{HealthProbe, HttpEndpointProbe, Notifier},
    report::MaintenanceReport,
    service::Maintenance,
};
