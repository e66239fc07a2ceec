//! # Call Orchestrator
//!
//! Drives one method call through its lifecycle:
//! `Building → Dispatched → AwaitingResponse → Completed | Failed`.
//!
//! ## Invariants
//! - **Eager Serialization**: Params are serialized the moment they are pushed.
//!   In `Buffered` mode the fragments accumulate in memory; in `Streamed` mode the
//!   request is already open and each fragment is written straight away.
//! - **One Binary Param**: At most one streamed binary param is open, and it must
//!   be ended before another param is pushed or the call is finalized.
//! - **Single Outcome**: A call ends exactly once, as `Completed` with a value or
//!   `Failed` with one error. After that the transport is never touched again and
//!   the parser never sees another byte.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tracing::debug;
use tracing::trace;
use tracing::warn;
use xmlwire::Base64Stream;
use xmlwire::Response;
use xmlwire::ResponseParser;
use xmlwire::Value;
use xmlwire::envelope::CALL_EPILOGUE;
use xmlwire::envelope::call_preamble;
use xmlwire::envelope::encode_param;

use crate::config::ClientConfig;
use crate::config::Mode;
use crate::error::Error;
use crate::error::Result;
use crate::pending::AbortSignal;
use crate::pending::PendingCall;
use crate::stats::CallStats;
use crate::stats::StatsHandle;
use crate::transport;
use crate::transport::Connection;
use crate::transport::RequestHead;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Accepting params.
    Building,
    /// The request has been finalized and is being sent.
    Dispatched,
    /// The response head arrived; its body is being parsed.
    AwaitingResponse,
    Completed,
    Failed,
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CallState::Completed | CallState::Failed)
    }
}

/// A method call under construction.
///
/// Dropping a call that still holds an open request aborts that request.
pub struct Call {
    method: String,
    mode: Mode,
    head: RequestHead,
    transport: Arc<dyn Transport>,
    connection: Option<Box<dyn Connection>>,
    /// Buffered: the request so far. Streamed: markup not yet written.
    body: String,
    binary: Option<Base64Stream>,
    state: watch::Sender<CallState>,
    stats: StatsHandle,
}

impl Call {
    pub(crate) async fn start(
        transport: Arc<dyn Transport>,
        config: &ClientConfig,
        method: &str,
    ) -> Result<Self> {
        let head = RequestHead {
            url: config.url.clone(),
            user_agent: config.user_agent.clone(),
            content_length: None,
            write_capacity: config.write_capacity,
        };
        let (state, _) = watch::channel(CallState::Building);

        let mut call = Self {
            method: method.to_string(),
            mode: config.mode,
            head,
            transport,
            connection: None,
            body: call_preamble(method),
            binary: None,
            state,
            stats: StatsHandle::default(),
        };

        if call.mode == Mode::Streamed {
            let connection = call.transport.open(&call.head).await?;
            call.connection = Some(connection);
            let flushed = call.flush().await;
            flushed.map_err(|e| call.fail(e))?;
        }

        debug!(method = %call.method, mode = ?call.mode, "call started");
        Ok(call)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn state(&self) -> CallState {
        *self.state.borrow()
    }

    /// A receiver notified on every state transition.
    pub fn watch_state(&self) -> watch::Receiver<CallState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> CallStats {
        self.stats.snapshot()
    }

    /// Serializes `value` as the next param.
    ///
    /// A value with no wire form fails with `Error::Wire` and leaves the call
    /// usable; nothing of it has been written.
    pub async fn push_param(&mut self, value: &Value) -> Result<()> {
        self.ensure_building()?;
        let fragment = encode_param(value)?;
        self.body.push_str(&fragment);
        let flushed = self.flush().await;
        flushed.map_err(|e| self.fail(e))
    }

    /// Converts a host value with `serde` and pushes it as the next param.
    pub async fn push<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let value = xmlwire::to_value(value)?;
        self.push_param(&value).await
    }

    /// Opens a binary param whose bytes are pushed in chunks.
    pub fn push_binary_param(&mut self) -> Result<BinaryParam<'_>> {
        self.ensure_building()?;
        self.binary = Some(Base64Stream::start(&mut self.body));
        Ok(BinaryParam { call: self })
    }

    /// The binary param left open by a dropped `BinaryParam`, if any.
    pub fn open_binary_param(&mut self) -> Option<BinaryParam<'_>> {
        if self.binary.is_some() && self.state() == CallState::Building {
            Some(BinaryParam { call: self })
        } else {
            None
        }
    }

    /// Finalizes the request and drives the call to its outcome on this task.
    pub async fn finish(mut self) -> Result<Value> {
        if let Err(e) = self.ensure_building() {
            return Err(self.fail(e));
        }
        self.complete(AbortSignal::never()).await
    }

    /// Finalizes the request and drives the call on a spawned task.
    ///
    /// Must be called within a tokio runtime.
    pub fn dispatch(mut self) -> Result<PendingCall> {
        if let Err(e) = self.ensure_building() {
            return Err(self.fail(e));
        }

        let (abort, signal) = AbortSignal::new();
        let (done_tx, done_rx) = oneshot::channel();
        let state = self.state.subscribe();
        let stats = self.stats.clone();

        tokio::spawn(async move {
            let result = self.complete(signal).await;
            let _ = done_tx.send(result);
        });

        Ok(PendingCall::new(done_rx, abort, state, stats))
    }

    /// Abandons the call while it is still being built.
    pub fn abort(mut self) {
        self.fail(Error::Aborted);
    }

    fn ensure_building(&self) -> Result<()> {
        let state = self.state();
        if state != CallState::Building {
            return Err(Error::Usage(format!("call is {:?}, no longer building", state)));
        }
        if self.binary.is_some() {
            return Err(Error::Usage("a binary param is still open".into()));
        }
        Ok(())
    }

    /// Writes pending markup in streamed mode. A no-op when buffered.
    async fn flush(&mut self) -> Result<()> {
        if self.mode == Mode::Buffered || self.body.is_empty() {
            return Ok(());
        }
        let chunk = Bytes::from(std::mem::take(&mut self.body));
        let len = chunk.len();
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| Error::Usage("request is not open".into()))?;
        connection.write(chunk).await?;
        self.stats.update(|s| s.add_write(len));
        trace!(method = %self.method, bytes = len, "request chunk written");
        Ok(())
    }

    async fn complete(mut self, mut signal: AbortSignal) -> Result<Value> {
        let outcome = tokio::select! {
            biased;
            () = signal.aborted() => Err(Error::Aborted),
            result = self.exchange() => result,
        };

        match outcome {
            Ok(value) => {
                self.connection = None;
                self.state.send_replace(CallState::Completed);
                debug!(method = %self.method, kind = value.kind(), "call completed");
                Ok(value)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn exchange(&mut self) -> Result<Value> {
        self.body.push_str(CALL_EPILOGUE);
        self.state.send_replace(CallState::Dispatched);
        debug!(method = %self.method, "call dispatched");

        if self.mode == Mode::Buffered {
            let body = Bytes::from(std::mem::take(&mut self.body));
            let head = RequestHead { content_length: Some(body.len() as u64), ..self.head.clone() };
            self.connection = Some(self.transport.open(&head).await?);
            let connection = self
                .connection
                .as_mut()
                .ok_or_else(|| Error::Usage("request is not open".into()))?;
            let len = body.len();
            connection.write(body).await?;
            self.stats.update(|s| s.add_write(len));
        } else {
            self.flush().await?;
        }

        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| Error::Usage("request is not open".into()))?;
        let head = connection.finish().await?;
        self.state.send_replace(CallState::AwaitingResponse);
        debug!(method = %self.method, status = head.status, "response received");

        if !head.is_success() {
            return Err(transport::Error::Status(head.status).into());
        }

        let mut parser = ResponseParser::new();
        while let Some(chunk) = connection.chunk().await? {
            trace!(method = %self.method, bytes = chunk.len(), "response chunk");
            let fed = parser.feed(&chunk);
            let events = parser.events_seen() as u64;
            self.stats.update(|s| {
                s.add_chunk(chunk.len());
                s.parse_events = events;
            });
            fed?;
        }

        match parser.finish()? {
            Response::Success(value) => Ok(value),
            Response::Fault(fault) => Err(Error::Fault(fault)),
        }
    }

    /// Moves the call to `Failed` and tears down its request.
    fn fail(&mut self, error: Error) -> Error {
        if let Some(mut connection) = self.connection.take() {
            connection.abort();
        }
        self.binary = None;
        self.body.clear();
        self.state.send_replace(CallState::Failed);
        warn!(method = %self.method, error = %error, "call failed");
        error
    }
}

impl Drop for Call {
    fn drop(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.abort();
            if !self.state().is_terminal() {
                self.state.send_replace(CallState::Failed);
            }
        }
    }
}

/// An open binary param. Bytes pushed here are base64-encoded on the fly.
pub struct BinaryParam<'a> {
    call: &'a mut Call,
}

impl BinaryParam<'_> {
    /// Encodes a chunk. Returns `true` if whole base64 groups were produced;
    /// up to two trailing bytes wait for the next chunk.
    pub async fn push(&mut self, bytes: &[u8]) -> Result<bool> {
        let call = &mut *self.call;
        if call.state() != CallState::Building {
            return Err(Error::Usage("binary push on a call that is no longer building".into()));
        }
        let stream = call
            .binary
            .as_mut()
            .ok_or_else(|| Error::Usage("binary param already ended".into()))?;
        let produced = stream.push(bytes, &mut call.body)?;
        let flushed = call.flush().await;
        flushed.map_err(|e| call.fail(e))?;
        Ok(produced)
    }

    /// Flushes the padded tail and closes the param.
    pub async fn end(self) -> Result<()> {
        let call = self.call;
        let mut stream = call
            .binary
            .take()
            .ok_or_else(|| Error::Usage("binary param already ended".into()))?;
        stream.end(&mut call.body)?;
        let flushed = call.flush().await;
        flushed.map_err(|e| call.fail(e))
    }
}
