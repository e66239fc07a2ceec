//! Scripted transports for testing.
//!
//! A `ScriptedTransport` answers every request with a canned response and
//! records what the caller sent, so tests can assert on both sides of an
//! exchange without a network.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use xmlwire::Fault;
use xmlwire::Value;
use xmlwire::envelope::encode_fault;
use xmlwire::envelope::encode_response;

use crate::transport;
use crate::transport::Connection;
use crate::transport::RequestHead;
use crate::transport::ResponseHead;
use crate::transport::Transport;

/// Everything a scripted transport observed.
#[derive(Debug, Clone, Default)]
pub struct RequestLog {
    /// Heads passed to `open`, in order.
    pub heads: Vec<RequestHead>,
    /// Concatenated request body bytes.
    pub body: Vec<u8>,
    /// Number of `write` calls.
    pub writes: usize,
    /// Whether `finish` was reached.
    pub finished: bool,
    /// Whether `abort` was called.
    pub aborted: bool,
    /// Response chunks handed out by `chunk`.
    pub chunks_served: usize,
}

impl RequestLog {
    pub fn opens(&self) -> usize {
        self.heads.len()
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Clone)]
enum Script {
    Respond { head: ResponseHead, chunks: Vec<Bytes>, then: Option<transport::Error> },
    RefuseOpen(transport::Error),
    FailWrite(transport::Error),
    Stall,
}

/// A transport that plays back one scripted response per request.
#[derive(Clone)]
pub struct ScriptedTransport {
    script: Script,
    log: Arc<Mutex<RequestLog>>,
}

impl ScriptedTransport {
    fn new(script: Script) -> Self {
        Self { script, log: Arc::new(Mutex::new(RequestLog::default())) }
    }

    /// Responds with `status` and a single body chunk.
    pub fn respond(status: u16, body: impl Into<Bytes>) -> Self {
        Self::respond_chunked(status, vec![body.into()])
    }

    /// Responds with `status` and the given body chunks, in order.
    pub fn respond_chunked(status: u16, chunks: Vec<Bytes>) -> Self {
        let head = ResponseHead {
            status,
            headers: vec![("Content-Type".into(), "text/xml".into())],
        };
        Self::new(Script::Respond { head, chunks, then: None })
    }

    /// Responds 200 with a success document carrying `value`.
    pub fn success(value: &Value) -> xmlwire::Result<Self> {
        Ok(Self::respond(200, encode_response(value)?))
    }

    /// Responds 200 with a fault document.
    pub fn fault(fault: &Fault) -> Self {
        Self::respond(200, encode_fault(fault))
    }

    /// Serves `chunks`, then fails the body read with `error`.
    pub fn fail_mid_response(status: u16, chunks: Vec<Bytes>, error: transport::Error) -> Self {
        Self::new(Script::Respond { head: ResponseHead::new(status), chunks, then: Some(error) })
    }

    /// Fails in `open`.
    pub fn refuse(error: transport::Error) -> Self {
        Self::new(Script::RefuseOpen(error))
    }

    /// Opens, then fails the first `write`.
    pub fn fail_write(error: transport::Error) -> Self {
        Self::new(Script::FailWrite(error))
    }

    /// Accepts the request but never produces a response head.
    pub fn stall() -> Self {
        Self::new(Script::Stall)
    }

    /// Snapshot of everything observed so far.
    pub fn log(&self) -> RequestLog {
        self.log.lock().clone()
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, head: &RequestHead) -> transport::Result<Box<dyn Connection>> {
        if let Script::RefuseOpen(error) = &self.script {
            return Err(error.clone());
        }
        self.log.lock().heads.push(head.clone());

        let (chunks, then) = match &self.script {
            Script::Respond { chunks, then, .. } => (chunks.iter().cloned().collect(), then.clone()),
            _ => (VecDeque::new(), None),
        };
        Ok(Box::new(ScriptedConnection {
            script: self.script.clone(),
            log: self.log.clone(),
            chunks,
            then,
            aborted: false,
        }))
    }
}

struct ScriptedConnection {
    script: Script,
    log: Arc<Mutex<RequestLog>>,
    chunks: VecDeque<Bytes>,
    then: Option<transport::Error>,
    aborted: bool,
}

impl ScriptedConnection {
    fn check(&self) -> transport::Result<()> {
        if self.aborted {
            return Err(transport::Error::ConnectionLost("aborted".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Connection for ScriptedConnection {
    async fn write(&mut self, chunk: Bytes) -> transport::Result<()> {
        self.check()?;
        if let Script::FailWrite(error) = &self.script {
            return Err(error.clone());
        }
        let mut log = self.log.lock();
        log.writes += 1;
        log.body.extend_from_slice(&chunk);
        Ok(())
    }

    async fn finish(&mut self) -> transport::Result<ResponseHead> {
        self.check()?;
        self.log.lock().finished = true;
        match &self.script {
            Script::Respond { head, .. } => Ok(head.clone()),
            Script::Stall => std::future::pending().await,
            Script::RefuseOpen(error) | Script::FailWrite(error) => Err(error.clone()),
        }
    }

    async fn chunk(&mut self) -> transport::Result<Option<Bytes>> {
        self.check()?;
        match self.chunks.pop_front() {
            Some(chunk) => {
                self.log.lock().chunks_served += 1;
                Ok(Some(chunk))
            }
            None => match self.then.take() {
                Some(error) => Err(error),
                None => Ok(None),
            },
        }
    }

    fn abort(&mut self) {
        self.aborted = true;
        self.log.lock().aborted = true;
    }
}
