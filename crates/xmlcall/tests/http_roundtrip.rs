//! Calls over real HTTP against a minimal in-process server.

use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use xmlcall::Client;
use xmlcall::ClientConfig;
use xmlcall::Error;
use xmlcall::Mode;
use xmlcall::http::HttpTransport;
use xmlcall::transport;
use xmlwire::Value;
use xmlwire::envelope::encode_call;
use xmlwire::envelope::encode_response;

// ============================================================================
//  MINI SERVER
// ============================================================================

/// What the server saw of one request.
#[derive(Debug)]
struct Received {
    head: String,
    body: Vec<u8>,
}

impl Received {
    fn header(&self, name: &str) -> Option<String> {
        header(&self.head, name)
    }

    fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn header(head: &str, name: &str) -> Option<String> {
    head.lines().skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim().eq_ignore_ascii_case(name).then(|| value.trim().to_string())
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Decodes a complete `Transfer-Encoding: chunked` body.
fn dechunk(mut raw: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut out = Vec::new();
    loop {
        let line_end = find(raw, b"\r\n").ok_or_else(|| anyhow::anyhow!("missing chunk size"))?;
        let size_line = std::str::from_utf8(&raw[..line_end])?;
        let size_hex = size_line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_hex, 16)?;
        raw = &raw[line_end + 2..];
        if size == 0 {
            return Ok(out);
        }
        anyhow::ensure!(raw.len() >= size + 2, "truncated chunk");
        out.extend_from_slice(&raw[..size]);
        raw = &raw[size + 2..];
    }
}

/// Serves exactly one request with `status` and `reply`, then closes.
async fn serve_once(
    status: u16,
    reply: String,
) -> anyhow::Result<(String, JoinHandle<anyhow::Result<Received>>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("http://{}/RPC2", listener.local_addr()?);

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await?;
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];

        let head_end = loop {
            if let Some(pos) = find(&buf, b"\r\n\r\n") {
                break pos;
            }
            let n = socket.read(&mut chunk).await?;
            anyhow::ensure!(n > 0, "connection closed inside the request head");
            buf.extend_from_slice(&chunk[..n]);
        };
        let head = String::from_utf8(buf[..head_end].to_vec())?;
        let mut rest = buf[head_end + 4..].to_vec();

        let body = match header(&head, "content-length") {
            Some(len) => {
                let len: usize = len.parse()?;
                while rest.len() < len {
                    let n = socket.read(&mut chunk).await?;
                    anyhow::ensure!(n > 0, "connection closed inside the request body");
                    rest.extend_from_slice(&chunk[..n]);
                }
                rest
            }
            None => {
                while !rest.ends_with(b"0\r\n\r\n") {
                    let n = socket.read(&mut chunk).await?;
                    anyhow::ensure!(n > 0, "connection closed inside a chunked body");
                    rest.extend_from_slice(&chunk[..n]);
                }
                dechunk(&rest)?
            }
        };

        let reason = if status == 200 { "OK" } else { "Internal Server Error" };
        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: text/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            reason,
            reply.len(),
            reply
        );
        socket.write_all(response.as_bytes()).await?;
        socket.shutdown().await?;

        Ok(Received { head, body })
    });

    Ok((url, handle))
}

fn client(url: &str, mode: Mode) -> anyhow::Result<Client> {
    let http = reqwest::Client::builder().no_proxy().build()?;
    let config = ClientConfig::builder(url).mode(mode).user_agent("roundtrip-test/1.0").build()?;
    Ok(Client::new(Arc::new(HttpTransport::with_client(http)), config))
}

// ============================================================================
//  ROUND TRIPS
// ============================================================================

#[tokio::test]
async fn test_buffered_call_over_http() -> anyhow::Result<()> {
    let answer = Value::structure([("sum", Value::Int(5)), ("label", Value::from("a < b"))]);
    let (url, server) = serve_once(200, encode_response(&answer)?).await?;
    let client = client(&url, Mode::Buffered)?;

    let params = [Value::Int(2), Value::Int(3)];
    let value = client.call("math.add", &params).await?;
    assert_eq!(value, answer);

    let received = server.await??;
    let expected = encode_call("math.add", &params)?;
    assert!(received.head.starts_with("POST /RPC2 HTTP/1.1"));
    assert_eq!(received.header("content-type").as_deref(), Some("text/xml"));
    assert_eq!(received.header("user-agent").as_deref(), Some("roundtrip-test/1.0"));
    assert_eq!(received.header("content-length"), Some(expected.len().to_string()));
    assert_eq!(received.body_text(), expected);
    Ok(())
}

#[tokio::test]
async fn test_streamed_call_over_http() -> anyhow::Result<()> {
    let (url, server) = serve_once(200, encode_response(&Value::Bool(true))?).await?;
    let client = client(&url, Mode::Streamed)?;
    let payload: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();

    let mut call = client.start_call("files.put").await?;
    call.push_param(&Value::from("blob.bin")).await?;
    let mut binary = call.push_binary_param()?;
    for piece in payload.chunks(777) {
        binary.push(piece).await?;
    }
    binary.end().await?;
    assert_eq!(call.finish().await?, Value::Bool(true));

    let received = server.await??;
    assert_eq!(received.header("content-length"), None);
    assert_eq!(
        received.header("transfer-encoding").map(|v| v.to_ascii_lowercase()).as_deref(),
        Some("chunked")
    );
    let expected = encode_call("files.put", &[Value::from("blob.bin"), Value::Base64(payload)])?;
    assert_eq!(received.body_text(), expected);
    Ok(())
}

#[tokio::test]
async fn test_server_error_over_http() -> anyhow::Result<()> {
    let (url, server) = serve_once(500, "<html>boom</html>".to_string()).await?;
    let client = client(&url, Mode::Buffered)?;

    match client.call("anything", &[]).await {
        Err(Error::Transport(transport::Error::Status(500))) => {}
        other => panic!("Expected Status(500), got {:?}", other),
    }
    server.await??;
    Ok(())
}

#[tokio::test]
async fn test_fault_over_http() -> anyhow::Result<()> {
    let fault = xmlwire::Fault { code: 4, message: "Too many parameters".into() };
    let (url, server) = serve_once(200, xmlwire::envelope::encode_fault(&fault)).await?;
    let client = client(&url, Mode::Streamed)?;

    match client.call("system.listMethods", &[Value::Int(1)]).await {
        Err(Error::Fault(f)) => assert_eq!(f, fault),
        other => panic!("Expected fault, got {:?}", other),
    }
    server.await??;
    Ok(())
}

#[tokio::test]
async fn test_connection_refused() -> anyhow::Result<()> {
    // bind and drop to find a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("http://{}/RPC2", listener.local_addr()?);
    drop(listener);

    let client = client(&url, Mode::Buffered)?;
    match client.call("ping", &[]).await {
        Err(Error::Transport(_)) => {}
        other => panic!("Expected transport error, got {:?}", other),
    }
    Ok(())
}
