//! # HTTP Transport
//!
//! `Transport` over `reqwest`. The request body is a stream fed from a bounded
//! channel, so `Connection::write` waits whenever the socket falls behind.

use bytes::Bytes;
use reqwest::Body;
use reqwest::header::CONTENT_LENGTH;
use reqwest::header::CONTENT_TYPE;
use reqwest::header::USER_AGENT;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::transport::Connection;
use crate::transport::Error;
use crate::transport::RequestHead;
use crate::transport::ResponseHead;
use crate::transport::Result;
use crate::transport::Transport;

/// Posts `text/xml` requests with a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a preconfigured client (proxies, TLS roots, pooling).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn open(&self, head: &RequestHead) -> Result<Box<dyn Connection>> {
        let (tx, rx) = mpsc::channel::<Bytes>(head.write_capacity.max(1));

        let body = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (Ok::<Bytes, std::io::Error>(chunk), rx))
        });

        let mut request = self
            .client
            .post(&head.url)
            .header(CONTENT_TYPE, "text/xml")
            .header(USER_AGENT, &head.user_agent);
        if let Some(len) = head.content_length {
            request = request.header(CONTENT_LENGTH, len);
        }

        let pending = tokio::spawn(request.body(Body::wrap_stream(body)).send());
        trace!(url = %head.url, content_length = ?head.content_length, "HTTP request opened");

        Ok(Box::new(HttpConnection { body: Some(tx), pending: Some(pending), response: None }))
    }
}

struct HttpConnection {
    body: Option<mpsc::Sender<Bytes>>,
    pending: Option<JoinHandle<reqwest::Result<reqwest::Response>>>,
    response: Option<reqwest::Response>,
}

impl HttpConnection {
    /// Waits for the spawned request and keeps its response.
    async fn await_response(&mut self) -> Result<&mut reqwest::Response> {
        if self.response.is_none() {
            let pending = self
                .pending
                .take()
                .ok_or_else(|| Error::ConnectionLost("request was aborted".into()))?;
            let response = pending
                .await
                .map_err(|e| Error::Io(format!("request task failed: {}", e)))?
                .map_err(map_reqwest)?;
            self.response = Some(response);
        }
        self.response
            .as_mut()
            .ok_or_else(|| Error::ConnectionLost("response unavailable".into()))
    }
}

#[async_trait::async_trait]
impl Connection for HttpConnection {
    async fn write(&mut self, chunk: Bytes) -> Result<()> {
        let body = self
            .body
            .as_ref()
            .ok_or_else(|| Error::Io("write after end of request body".into()))?;
        if body.send(chunk).await.is_ok() {
            return Ok(());
        }

        // the body stream was dropped, so the request itself has ended
        self.body = None;
        match self.await_response().await {
            Err(e) => Err(e),
            Ok(_) => Err(Error::ConnectionLost("server stopped reading the request body".into())),
        }
    }

    async fn finish(&mut self) -> Result<ResponseHead> {
        // closing the channel ends the body stream
        self.body = None;
        let response = self.await_response().await?;

        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        Ok(ResponseHead { status: response.status().as_u16(), headers })
    }

    async fn chunk(&mut self) -> Result<Option<Bytes>> {
        let response = self
            .response
            .as_mut()
            .ok_or_else(|| Error::Io("chunk requested before the response head".into()))?;
        response.chunk().await.map_err(map_reqwest)
    }

    fn abort(&mut self) {
        self.body = None;
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
        self.response = None;
    }
}

fn map_reqwest(e: reqwest::Error) -> Error {
    if e.is_connect() || e.is_body() || e.is_request() {
        Error::ConnectionLost(e.to_string())
    } else {
        Error::Io(e.to_string())
    }
}
