// src/realtime/transport.rs
//
// The persistent-connection seam and its JSON-lines implementation.
//
// Frames are newline-delimited UTF-8 JSON. The first line sent after
// connecting carries the short-lived bearer token; everything received
// after that is an event frame.

use async_trait::async_trait;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::error::{AppError, AppResult};

/// A live, already-authenticated event stream.
#[async_trait]
pub trait RealtimeStream: Send {
    /// Next UTF-8 text frame, or None once the connection closed.
    async fn next_frame(&mut self) -> Option<String>;
}

/// Opens one persistent connection per call, authenticating with the token
/// supplied at connect time.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    async fn connect(&self, token: &str) -> AppResult<Box<dyn RealtimeStream>>;
}

/// Supplies the short-lived credential; queried fresh at every connect so a
/// reconnect never reuses an expired token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> AppResult<String>;
}

/// Token source for long-lived credentials (tests, service accounts).
pub struct StaticTokenSource(String);

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn token(&self) -> AppResult<String> {
        Ok(self.0.clone())
    }
}

/// JSON-lines transport over TCP.
pub struct JsonLineTransport {
    addr: String,
}

impl JsonLineTransport {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl RealtimeTransport for JsonLineTransport {
    async fn connect(&self, token: &str) -> AppResult<Box<dyn RealtimeStream>> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| AppError::Transport(format!("realtime connect failed: {e}")))?;
        let (read_half, write_half) = stream.into_split();

        let mut writer = BufWriter::new(write_half);
        let hello = json!({ "token": token }).to_string();
        writer.write_all(hello.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        Ok(Box::new(JsonLineStream {
            reader: BufReader::new(read_half),
            line_buf: String::new(),
            // Kept alive so the write half is not shut down while we read.
            _writer: writer,
        }))
    }
}

struct JsonLineStream {
    reader: BufReader<OwnedReadHalf>,
    line_buf: String,
    _writer: BufWriter<OwnedWriteHalf>,
}

#[async_trait]
impl RealtimeStream for JsonLineStream {
    async fn next_frame(&mut self) -> Option<String> {
        loop {
            self.line_buf.clear();
            match self.reader.read_line(&mut self.line_buf).await {
                Ok(0) | Err(_) => return None,
                Ok(_) => {
                    let frame = self.line_buf.trim();
                    if !frame.is_empty() {
                        return Some(frame.to_string());
                    }
                }
            }
        }
    }
}
