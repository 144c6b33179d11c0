//! Test utilities for component runtime tests.
//!
//! Provides a scripted server peer that speaks the server side of the
//! component protocol over an in-memory duplex pipe.

#![allow(dead_code)]

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::time::timeout;
use waddle_component::{Component, ComponentConfig};

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Component name used across tests.
pub const COMPONENT_NAME: &str = "bot.example.com";

/// Shared secret used across tests.
pub const SECRET: &str = "secret";

/// Stream ID the peer assigns.
pub const STREAM_ID: &str = "abc123";

/// SHA-1 of `STREAM_ID` followed by `SECRET`, hex encoded.
pub const EXPECTED_DIGEST: &str = "b67adbb9f7287b8f2d9c809b39a804b2123fc4c0";

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init();
    });
}

pub fn test_config() -> ComponentConfig {
    ComponentConfig::new("localhost:5347", COMPONENT_NAME, SECRET).with_traffic_log(true)
}

/// The server end of a component connection.
pub struct ServerPeer {
    stream: DuplexStream,
    buffer: String,
}

impl ServerPeer {
    pub fn new(stream: DuplexStream) -> Self {
        Self {
            stream,
            buffer: String::new(),
        }
    }

    /// Send raw data.
    pub async fn send(&mut self, data: &str) -> std::io::Result<()> {
        self.stream.write_all(data.as_bytes()).await?;
        self.stream.flush().await
    }

    /// Read one chunk with timeout. Returns the number of bytes read.
    async fn read_chunk(&mut self, timeout_dur: Duration) -> std::io::Result<usize> {
        let mut buf = [0u8; 4096];
        let n = timeout(timeout_dur, self.stream.read(&mut buf))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "Timeout"))??;
        self.buffer.push_str(&String::from_utf8_lossy(&buf[..n]));
        Ok(n)
    }

    /// Read until `pattern` is seen, consuming everything up to and
    /// including it.
    pub async fn read_until(&mut self, pattern: &str) -> std::io::Result<String> {
        let start = std::time::Instant::now();
        loop {
            if let Some(index) = self.buffer.find(pattern) {
                let end = index + pattern.len();
                let consumed = self.buffer[..end].to_string();
                self.buffer.drain(..end);
                return Ok(consumed);
            }

            let remaining = DEFAULT_TIMEOUT.saturating_sub(start.elapsed());
            if self.read_chunk(remaining).await? == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("Connection closed waiting for: {pattern}"),
                ));
            }
        }
    }

    /// Read until the component closes its side of the connection.
    /// Returns everything received after the last consumed pattern.
    pub async fn read_to_eof(&mut self) -> std::io::Result<String> {
        while self.read_chunk(DEFAULT_TIMEOUT).await? > 0 {}
        Ok(std::mem::take(&mut self.buffer))
    }

    /// Read the component's stream header.
    pub async fn expect_stream_open(&mut self) -> std::io::Result<String> {
        let mut header = self.read_until("<stream:stream").await?;
        header.push_str(&self.read_until(">").await?);
        Ok(header)
    }

    /// Send the server's stream header.
    pub async fn open_stream(&mut self, id: &str) -> std::io::Result<()> {
        self.send(&format!(
            "<?xml version='1.0'?>\
            <stream:stream xmlns:stream='http://etherx.jabber.org/streams' \
            xmlns='jabber:component:accept' from='{COMPONENT_NAME}' id='{id}'>"
        ))
        .await
    }

    /// Read the `<handshake/>` and return the digest inside it.
    pub async fn expect_handshake(&mut self) -> std::io::Result<String> {
        let received = self.read_until("</handshake>").await?;
        let digest = received
            .rsplit_once("<handshake>")
            .map(|(_, rest)| rest.trim_end_matches("</handshake>").to_string())
            .unwrap_or_default();
        Ok(digest)
    }

    /// Play the server side of a successful handshake.
    pub async fn accept(&mut self) -> std::io::Result<String> {
        self.expect_stream_open().await?;
        self.open_stream(STREAM_ID).await?;
        let digest = self.expect_handshake().await?;
        self.send("<handshake/>").await?;
        Ok(digest)
    }

    /// Read one complete top-level element ending in `</{name}>`.
    pub async fn read_element(&mut self, name: &str) -> std::io::Result<minidom::Element> {
        let received = self.read_until(&format!("</{name}>")).await?;
        let start = received.find(&format!("<{name}")).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, format!("No <{name}> in {received}"))
        })?;
        received[start..]
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, format!("{e}")))
    }
}

/// Connect a component to a scripted peer that accepts the handshake.
pub async fn connected_component() -> (Component, ServerPeer) {
    connected_component_with_capacity(8192).await
}

/// Like [`connected_component`], with `capacity` bytes of buffering in each
/// direction of the pipe.
pub async fn connected_component_with_capacity(capacity: usize) -> (Component, ServerPeer) {
    init_tracing();

    let (client, server) = tokio::io::duplex(capacity);
    let mut peer = ServerPeer::new(server);
    let config = test_config();

    let (component, digest) = tokio::join!(Component::handshake(client, &config), peer.accept());
    assert_eq!(digest.unwrap(), EXPECTED_DIGEST);

    (component.unwrap(), peer)
}
