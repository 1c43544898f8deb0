// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Merge order, later wins: compiled defaults, `/etc/parley/parley.toml`,
//! `$XDG_CONFIG_HOME/parley/parley.toml`, `./parley.toml`, `PARLEY_*` env vars.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use tracing::debug;

use crate::model::ParleyConfig;

/// Top-level sections an environment variable can address.
pub const SECTIONS: &[&str] = &[
    "agent", "telegram", "openai", "storage", "dialog", "billing", "triggers",
];

/// Name of the configuration file looked up in every location.
pub const FILE_NAME: &str = "parley.toml";

/// Candidate config files, lowest precedence first.
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/parley").join(FILE_NAME)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("parley").join(FILE_NAME));
    }
    paths.push(PathBuf::from(FILE_NAME));
    paths
}

/// Builds the full Figment: defaults, config files, then environment.
pub fn build_figment() -> Figment {
    let mut figment = Figment::new().merge(Serialized::defaults(ParleyConfig::default()));
    for path in config_paths() {
        if path.exists() {
            debug!(path = %path.display(), "merging config file");
        }
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(env_provider())
}

/// Loads configuration from the standard locations with env overrides.
pub fn load_config() -> Result<ParleyConfig, figment::Error> {
    build_figment().extract()
}

/// Loads configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<ParleyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ParleyConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Loads configuration from one explicit file, with env overrides.
pub fn load_config_from_path(path: &Path) -> Result<ParleyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ParleyConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// `PARLEY_<SECTION>_<KEY>` maps to `<section>.<key>`.
///
/// Only the first underscore after a known section name becomes a dot, so
/// `PARLEY_TELEGRAM_BOT_TOKEN` is `telegram.bot_token`. `PARLEY_BILLING_PACKAGE_*`
/// reaches the nested package table.
fn env_provider() -> Env {
    Env::prefixed("PARLEY_").map(|key| env_key_to_path(key.as_str()).into())
}

pub(crate) fn env_key_to_path(key: &str) -> String {
    // Figment hands over the key with its original case.
    let key = key.to_ascii_lowercase();
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            if *section == "billing"
                && let Some(field) = rest.strip_prefix("package_")
            {
                return format!("billing.package.{field}");
            }
            return format!("{section}.{rest}");
        }
    }
    key
}
