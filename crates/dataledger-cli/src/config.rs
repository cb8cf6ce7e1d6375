// SPDX-License-Identifier: Apache-2.0

use dataledger_core::{
    ENV_AUTH_TOKEN, ENV_ENDPOINT_URL, ENV_MANIFEST_PATH, ENV_MAX_DETAIL_LINES,
    ENV_MAX_SUMMARY_LINES, ENV_PRODUCTION_BUCKET, ENV_STAGING_BUCKET,
};
use dataledger_ops::DiffLimits;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Settings {
    pub endpoint_url: String,
    pub auth_token: Option<String>,
    pub production_bucket: String,
    pub staging_bucket: String,
    pub manifest_path: PathBuf,
    pub diff_limits: DiffLimits,
}

impl Settings {
    /// Reads everything from the environment (after `.env` loading at
    /// startup). Missing required variables are reported by name.
    pub fn from_env() -> Result<Self, String> {
        let endpoint_url = require(ENV_ENDPOINT_URL)?;
        let production_bucket = require(ENV_PRODUCTION_BUCKET)?;
        let staging_bucket = require(ENV_STAGING_BUCKET)?;
        if production_bucket == staging_bucket {
            return Err(format!(
                "{ENV_PRODUCTION_BUCKET} and {ENV_STAGING_BUCKET} must name different buckets"
            ));
        }

        let manifest_path = optional(ENV_MANIFEST_PATH)
            .map_or_else(|| PathBuf::from("manifest.json"), PathBuf::from);

        let mut diff_limits = DiffLimits::default();
        if let Some(value) = optional(ENV_MAX_SUMMARY_LINES) {
            diff_limits.max_summary_lines = parse_count(ENV_MAX_SUMMARY_LINES, &value)?;
        }
        if let Some(value) = optional(ENV_MAX_DETAIL_LINES) {
            diff_limits.max_detail_lines = parse_count(ENV_MAX_DETAIL_LINES, &value)?;
        }

        Ok(Self {
            endpoint_url,
            auth_token: optional(ENV_AUTH_TOKEN),
            production_bucket,
            staging_bucket,
            manifest_path,
            diff_limits,
        })
    }
}

fn require(name: &str) -> Result<String, String> {
    optional(name).ok_or_else(|| format!("environment variable {name} is required"))
}

fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_count(name: &str, value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(format!("{name} must be a positive integer, got '{value}'")),
    }
}
