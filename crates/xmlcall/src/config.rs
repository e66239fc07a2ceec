//! # Client Configuration
//!
//! Where calls go and how their request bodies are sent.
//!
//! Built programmatically through `ClientConfig::builder`, or deserialized by
//! the embedding application; every field but `url` has a default.
//!
//! ```
//! use xmlcall::{ClientConfig, Mode};
//!
//! let config = ClientConfig::builder("http://localhost:8080/RPC2")
//!     .mode(Mode::Streamed)
//!     .user_agent("uploader/2.0")
//!     .build()
//!     .unwrap();
//! assert_eq!(config.write_capacity, 8);
//! ```

use serde::Deserialize;

use crate::error::Error;
use crate::error::Result;

pub const DEFAULT_USER_AGENT: &str = concat!("xmlcall/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_WRITE_CAPACITY: usize = 8;

/// How the request body reaches the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// The whole request is assembled first and sent with a `Content-Length`.
    #[default]
    Buffered,
    /// The request is opened immediately and each param is written as it is pushed.
    Streamed,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    /// Endpoint every call is posted to.
    pub url: String,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Request chunks a transport may queue before writes wait.
    #[serde(default = "default_write_capacity")]
    pub write_capacity: usize,
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_write_capacity() -> usize {
    DEFAULT_WRITE_CAPACITY
}

impl ClientConfig {
    /// A buffered-mode configuration with default settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mode: Mode::default(),
            user_agent: default_user_agent(),
            write_capacity: DEFAULT_WRITE_CAPACITY,
        }
    }

    pub fn builder(url: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder { config: Self::new(url) }
    }

    /// Checks the settings a transport cannot work without.
    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(Error::Usage(format!("url must be http(s), got {:?}", self.url)));
        }
        if self.write_capacity == 0 {
            return Err(Error::Usage("write_capacity must be at least 1".into()));
        }
        Ok(())
    }
}

/// Fluent builder for `ClientConfig`.
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn mode(mut self, mode: Mode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn write_capacity(mut self, capacity: usize) -> Self {
        self.config.write_capacity = capacity;
        self
    }

    pub fn build(self) -> Result<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
