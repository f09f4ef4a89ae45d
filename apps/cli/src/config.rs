use std::{collections::HashMap, fs, path::Path, path::PathBuf, time::Duration};

use anyhow::Context;
use client_core::{
    parse_contract_address, ConfirmationPolicy, ContractSettings, VotingAbi,
    DEFAULT_CONTRACT_ADDRESS,
};
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "voting.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub rpc_url: Option<String>,
    pub contract_address: String,
    pub artifact_path: Option<PathBuf>,
    pub poll_interval_ms: u64,
    /// `0` waits for confirmation indefinitely.
    pub confirmation_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rpc_url: None,
            contract_address: DEFAULT_CONTRACT_ADDRESS.into(),
            artifact_path: None,
            poll_interval_ms: 500,
            confirmation_timeout_secs: 300,
        }
    }
}

impl Settings {
    pub fn rpc_endpoint(&self) -> anyhow::Result<Option<Url>> {
        let Some(raw) = self.rpc_url.as_deref().map(str::trim) else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }
        let url = Url::parse(raw).with_context(|| format!("invalid rpc url '{raw}'"))?;
        Ok(Some(url))
    }

    pub fn confirmation_policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            timeout: (self.confirmation_timeout_secs > 0)
                .then(|| Duration::from_secs(self.confirmation_timeout_secs)),
        }
    }

    pub fn contract_settings(&self) -> anyhow::Result<ContractSettings> {
        let address = parse_contract_address(&self.contract_address)?;
        let abi = match &self.artifact_path {
            Some(path) => VotingAbi::from_artifact_path(path)
                .with_context(|| format!("failed to load contract artifact '{}'", path.display()))?,
            None => VotingAbi::embedded()?,
        };
        Ok(ContractSettings::new(address, abi).with_confirmation(self.confirmation_policy()))
    }
}

pub fn load_settings(config_path: &Path) -> Settings {
    load_settings_from(config_path, |key| std::env::var(key).ok())
}

/// Layers defaults, the optional TOML file, then environment overrides.
pub fn load_settings_from(config_path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(config_path) {
        match toml::from_str::<HashMap<String, toml::Value>>(&raw) {
            Ok(file_cfg) => apply_file_values(&mut settings, &file_cfg),
            Err(err) => tracing::warn!(
                "config: ignoring unreadable file path={} error={err}",
                config_path.display()
            ),
        }
    }

    if let Some(v) = env("VOTING_RPC_URL") {
        settings.rpc_url = Some(v);
    }
    if let Some(v) = env("APP__RPC_URL") {
        settings.rpc_url = Some(v);
    }

    if let Some(v) = env("VOTING_CONTRACT_ADDRESS") {
        settings.contract_address = v;
    }
    if let Some(v) = env("APP__CONTRACT_ADDRESS") {
        settings.contract_address = v;
    }

    if let Some(v) = env("APP__ARTIFACT_PATH") {
        settings.artifact_path = Some(PathBuf::from(v));
    }

    if let Some(v) = env("APP__POLL_INTERVAL_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.poll_interval_ms = parsed;
        }
    }

    if let Some(v) = env("APP__CONFIRMATION_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.confirmation_timeout_secs = parsed;
        }
    }

    settings
}

fn apply_file_values(settings: &mut Settings, file_cfg: &HashMap<String, toml::Value>) {
    if let Some(v) = file_cfg.get("rpc_url").and_then(toml::Value::as_str) {
        settings.rpc_url = Some(v.to_string());
    }
    if let Some(v) = file_cfg.get("contract_address").and_then(toml::Value::as_str) {
        settings.contract_address = v.to_string();
    }
    if let Some(v) = file_cfg.get("artifact_path").and_then(toml::Value::as_str) {
        settings.artifact_path = Some(PathBuf::from(v));
    }
    if let Some(v) = file_cfg.get("poll_interval_ms").and_then(as_u64) {
        settings.poll_interval_ms = v;
    }
    if let Some(v) = file_cfg
        .get("confirmation_timeout_secs")
        .and_then(as_u64)
    {
        settings.confirmation_timeout_secs = v;
    }
}

fn as_u64(value: &toml::Value) -> Option<u64> {
    match value {
        toml::Value::Integer(n) => u64::try_from(*n).ok(),
        toml::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
