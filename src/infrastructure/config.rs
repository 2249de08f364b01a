//! Console configuration.
//!
//! Settings come from a JSON file; a missing file means defaults. Selected
//! fields can be overridden from the environment, which is how the identity
//! token is usually supplied.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Account, DomainError, DEFAULT_MEMO_MAX_BYTES};

pub const DEFAULT_CONFIG_FILE: &str = "plantify-admin.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", .path.display())]
    Io { path: PathBuf, source: std::io::Error },
    #[error("invalid config {}: {source}", .path.display())]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("invalid payer account: {0}")]
    Payer(DomainError),
}

/// Where an RPC service lives and how long to wait for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl EndpointConfig {
    fn local(service: &str) -> Self {
        Self {
            url: format!("http://127.0.0.1:8080/{service}"),
            timeout_secs: 30,
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self::local("backend")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: EndpointConfig,
    pub ledger: EndpointConfig,
    /// Bearer token of the operator identity, shared by both clients.
    pub identity_token: Option<String>,
    /// Paying account; enables the balance check before transfers.
    pub payer: Option<String>,
    pub transfer_fee: Option<u128>,
    pub memo_max_bytes: usize,
    pub journal_path: PathBuf,
    pub log_path: PathBuf,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: EndpointConfig::local("backend"),
            ledger: EndpointConfig::local("ledger"),
            identity_token: None,
            payer: None,
            transfer_fee: None,
            memo_max_bytes: DEFAULT_MEMO_MAX_BYTES,
            journal_path: PathBuf::from("plantify-receipts.json"),
            log_path: PathBuf::from("plantify-admin.log"),
            log_filter: "plantify_admin=info".to_string(),
        }
    }
}

impl Config {
    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads `path` and applies overrides from the process environment.
    pub fn from_file_and_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("PLANTIFY_BACKEND_URL") {
            self.backend.url = url;
        }
        if let Some(url) = lookup("PLANTIFY_LEDGER_URL") {
            self.ledger.url = url;
        }
        if let Some(token) = lookup("PLANTIFY_IDENTITY_TOKEN") {
            self.identity_token = Some(token);
        }
        if let Some(payer) = lookup("PLANTIFY_PAYER") {
            self.payer = Some(payer);
        }
        if let Some(path) = lookup("PLANTIFY_JOURNAL") {
            self.journal_path = PathBuf::from(path);
        }
    }

    pub fn payer_account(&self) -> Result<Option<Account>, ConfigError> {
        self.payer
            .as_deref()
            .map(|payer| payer.parse().map_err(ConfigError::Payer))
            .transpose()
    }
}
