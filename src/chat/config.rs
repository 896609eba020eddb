//! Command-line flags for `smartasset-chat` and how they combine with the
//! YAML config file.
//!
//! This module provides CLI argument parsing via `arrrg` and the resolved
//! configuration the REPL runs with.

use std::time::Duration;

use arrrg_derive::CommandLine;

use crate::config::ClientConfig;
use crate::error::Result;

/// Command-line arguments for the smartasset-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// YAML file with client settings.
    #[arrrg(optional, "YAML config file", "PATH")]
    pub config: Option<String>,

    /// API root.
    #[arrrg(optional, "API base URL (default: http://localhost:8000/api/v1/)", "URL")]
    pub api_url: Option<String>,

    /// Request timeout.
    #[arrrg(optional, "Request timeout in seconds (default: 60)", "SECS")]
    pub timeout_secs: Option<u64>,

    /// Credential file.
    #[arrrg(optional, "Where to keep the sign-in credential", "PATH")]
    pub credentials: Option<String>,

    /// Stream replies.
    #[arrrg(flag, "Stream replies as they are generated")]
    pub stream: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Configuration for a chat run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// How to reach the server.
    pub client: ClientConfig,

    /// False when `--no-color` is given.
    pub use_color: bool,
}

impl ChatConfig {
    pub fn new() -> Self {
        Self {
            client: ClientConfig::new(),
            use_color: true,
        }
    }

    /// Resolve arguments: the config file first, then flags on top.
    pub fn from_args(args: ChatArgs) -> Result<Self> {
        let base = match &args.config {
            Some(path) => ClientConfig::from_file(path)?,
            None => ClientConfig::new(),
        };
        Ok(Self::with_base(base, args))
    }

    fn with_base(mut client: ClientConfig, args: ChatArgs) -> Self {
        if let Some(url) = args.api_url {
            client = client.with_base_url(url);
        }
        if let Some(secs) = args.timeout_secs {
            client = client.with_timeout(Duration::from_secs(secs));
        }
        if let Some(path) = args.credentials {
            client = client.with_credentials_path(path);
        }
        if args.stream {
            client = client.with_streaming(true);
        }
        ChatConfig {
            client,
            use_color: !args.no_color,
        }
    }

    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_args_defaults() {
        let config = ChatConfig::from_args(ChatArgs::default()).unwrap();
        assert_eq!(config, ChatConfig::new());
        assert!(config.use_color);
        assert!(!config.client.streaming);
    }

    #[test]
    fn config_from_args_custom() {
        let args = ChatArgs {
            config: None,
            api_url: Some("https://advice.example.ca/api/v1/".to_string()),
            timeout_secs: Some(10),
            credentials: Some("/tmp/creds.json".to_string()),
            stream: true,
            no_color: true,
        };
        let config = ChatConfig::from_args(args).unwrap();
        assert_eq!(
            config.client.base_url.as_deref(),
            Some("https://advice.example.ca/api/v1/")
        );
        assert_eq!(config.client.timeout_secs, 10);
        assert_eq!(
            config.client.credentials_path.as_deref(),
            Some("/tmp/creds.json")
        );
        assert!(config.client.streaming);
        assert!(!config.use_color);
    }

    #[test]
    fn flags_override_file() {
        let file = ClientConfig::from_yaml("base_url: http://file/api/v1/\ntimeout_secs: 30\n")
            .unwrap();
        let args = ChatArgs {
            api_url: Some("http://flag/api/v1/".to_string()),
            ..ChatArgs::default()
        };
        let config = ChatConfig::with_base(file, args);
        assert_eq!(config.client.base_url.as_deref(), Some("http://flag/api/v1/"));
        assert_eq!(config.client.timeout_secs, 30);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let args = ChatArgs {
            config: Some("/nonexistent/smartasset.yaml".to_string()),
            ..ChatArgs::default()
        };
        assert!(ChatConfig::from_args(args).is_err());
    }
}
