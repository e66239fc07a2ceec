//! # XML-RPC Client
//!
//! This module provides the `Client` abstraction for making calls over a transport.
//! It owns the configuration and hands out `Call`s bound to it.

use std::sync::Arc;

use xmlwire::Value;

use crate::call::Call;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::http::HttpTransport;
use crate::transport::Transport;

/// Client for making remote calls over a transport.
///
/// Cheap to clone; clones share the transport and configuration.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    config: Arc<ClientConfig>,
}

impl Client {
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        Self { transport, config: Arc::new(config) }
    }

    /// A client posting over HTTP with a default `reqwest` client.
    pub fn http(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(Arc::new(HttpTransport::new()), config))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Starts a call in the `Building` state.
    ///
    /// In streamed mode this opens the request, so transport errors surface here.
    pub async fn start_call(&self, method: &str) -> Result<Call> {
        Call::start(self.transport.clone(), &self.config, method).await
    }

    /// Makes a call with the given params and waits for its value.
    pub async fn call(&self, method: &str, params: &[Value]) -> Result<Value> {
        let mut call = self.start_call(method).await?;
        for param in params {
            call.push_param(param).await?;
        }
        call.finish().await
    }
}
