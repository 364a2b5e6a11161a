//! Feature catalogue and trigger dispatch.
//!
//! Every capability reachable from a channel (shell, knowledge lookup, remote
//! browser, ...) implements [`Feature`]. A [`FeatureSet`] deserialises their
//! configuration, initialises the configured ones, maps triggers to features
//! and runs their self tests concurrently.

pub mod browser;
pub mod command;
pub mod env_info;
pub mod error;
pub mod feature;
pub mod knowledge;
pub mod registry;
pub mod shell;

pub use {
    command::{Command, Outcome, Trigger},
    error::{Error, Result},
    feature::Feature,
    registry::{CheckStatus, FeatureConfigs, FeatureSet},
};
