//! Client configuration.
//!
//! Defaults can be overridden by a YAML file and then by explicit builder
//! calls, which is the order the chat binary applies them in.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use utf8path::Path;

use crate::client::{DEFAULT_API_URL, DEFAULT_TIMEOUT, SmartAsset};
use crate::credentials::{CredentialStore, FileCredentialStore, default_path};
use crate::error::{Error, Result};

/// Settings for talking to a SmartAsset server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// API root.  `None` means `$SMARTASSET_API_URL`, then the local default.
    pub base_url: Option<String>,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Credential file.  `None` means the default location.
    pub credentials_path: Option<String>,

    /// Whether replies are streamed as they are generated.
    pub streaming: bool,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self {
            base_url: None,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            credentials_path: None,
            streaming: false,
        }
    }

    /// Read a YAML config file.  Missing keys keep their defaults.
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|err| Error::io(format!("failed to read config {path}"), err))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_credentials_path(mut self, path: impl Into<String>) -> Self {
        self.credentials_path = Some(path.into());
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The base URL the client will use, after the environment override.
    pub fn resolved_base_url(&self) -> String {
        self.base_url
            .clone()
            .or_else(|| std::env::var("SMARTASSET_API_URL").ok())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    pub fn credentials_path(&self) -> Result<Path<'static>> {
        match &self.credentials_path {
            Some(path) => Ok(Path::from(path.as_str()).into_owned()),
            None => default_path(),
        }
    }

    /// Open the configured credential file.
    pub fn credential_store(&self) -> Result<Arc<dyn CredentialStore>> {
        Ok(Arc::new(FileCredentialStore::new(self.credentials_path()?)))
    }

    /// Build an HTTP client that reads its credential from `credentials`.
    pub fn client(&self, credentials: Arc<dyn CredentialStore>) -> Result<SmartAsset> {
        SmartAsset::with_options(
            Some(self.resolved_base_url()),
            Some(self.timeout()),
            credentials,
        )
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}
