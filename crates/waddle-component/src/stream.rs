//! Writing side of the component stream.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use minidom::Element;
use quick_xml::escape::escape;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tracing::{debug, trace};

use crate::parser::{ns, StartTag, StreamHeader};
use crate::{ComponentError, Result, Stanza};

/// Tracing target for raw stream traffic.
pub const TRAFFIC_TARGET: &str = "waddle_component::traffic";

/// Serializes stanzas onto the component's half of the connection.
pub struct StanzaWriter<W> {
    inner: W,
    closed: bool,
    /// Set while a write is in progress; stays set if that write was dropped
    interrupted: bool,
}

impl<W: AsyncWrite + Unpin> StanzaWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            closed: false,
            interrupted: false,
        }
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Serialize one stanza and flush it.
    pub async fn encode(&mut self, stanza: Stanza) -> Result<()> {
        let xml = stanza_to_xml(stanza)?;
        self.write_raw(&xml).await
    }

    /// Write raw XML to the stream.
    pub async fn write_raw(&mut self, xml: &str) -> Result<()> {
        if self.closed || self.interrupted {
            return Err(ComponentError::Closed);
        }
        self.interrupted = true;
        self.inner.write_all(xml.as_bytes()).await?;
        self.inner.flush().await?;
        self.interrupted = false;
        Ok(())
    }

    /// Whether a write was abandoned part way, leaving a partial element on
    /// the wire.
    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Send `</stream:stream>` and shut the connection down.
    ///
    /// After an interrupted write only the shutdown is performed. Calling
    /// this again is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let sent = if self.interrupted {
            debug!("Skipping stream close after interrupted write");
            Ok(())
        } else {
            async {
                self.inner.write_all(b"</stream:stream>").await?;
                self.inner.flush().await
            }
            .await
        };
        let shutdown = self.inner.shutdown().await;

        debug!("Closed component stream");
        sent?;
        shutdown?;
        Ok(())
    }
}

/// Serialize a stanza to its wire form.
pub fn stanza_to_xml(stanza: Stanza) -> Result<String> {
    let element: Element = match stanza {
        Stanza::StreamOpen(header) => return Ok(stream_open_xml(&header)),
        Stanza::Handshake { digest } => {
            return Ok(format!("<handshake>{}</handshake>", escape(digest.as_str())));
        }
        Stanza::Message(message) => message.into(),
        Stanza::Presence(presence) => presence.into(),
        Stanza::Iq(iq) => iq.into(),
        Stanza::Unknown(tag) => unknown_to_element(&tag),
    };

    let mut output = Vec::new();
    element
        .write_to(&mut output)
        .map_err(|e| ComponentError::xml_encode(format!("Failed to serialize element: {e}")))?;
    String::from_utf8(output).map_err(|e| ComponentError::xml_encode(format!("Invalid UTF-8: {e}")))
}

fn stream_open_xml(header: &StreamHeader) -> String {
    let mut xml = format!(
        "<?xml version='1.0'?>\
        <stream:stream xmlns='{}' xmlns:stream='{}'",
        ns::COMPONENT_ACCEPT,
        ns::STREAM
    );
    for (name, value) in [
        ("to", &header.to),
        ("from", &header.from),
        ("id", &header.id),
        ("version", &header.version),
        ("xml:lang", &header.lang),
    ] {
        if let Some(value) = value {
            xml.push_str(&format!(" {name}='{}'", escape(value.as_str())));
        }
    }
    xml.push('>');
    xml
}

fn unknown_to_element(tag: &StartTag) -> Element {
    let namespace = match tag.prefix() {
        Some(prefix) => tag.attr(&format!("xmlns:{prefix}")),
        None => tag.attr("xmlns"),
    }
    .unwrap_or(ns::COMPONENT_ACCEPT);

    let mut builder = Element::builder(tag.local_name(), namespace);
    for (key, value) in &tag.attributes {
        if key == "xmlns" || key.starts_with("xmlns:") {
            continue;
        }
        builder = builder.attr(key.as_str(), value.as_str());
    }
    builder.build()
}

/// Connection wrapper that traces every chunk read or written.
///
/// Tracing is emitted at `TRACE` level under [`TRAFFIC_TARGET`] and only
/// when enabled, so it can be switched on per connection.
pub struct TrafficLog<S> {
    inner: S,
    enabled: bool,
}

impl<S> TrafficLog<S> {
    pub fn new(inner: S, enabled: bool) -> Self {
        Self { inner, enabled }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for TrafficLog<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);

        if self.enabled {
            if let Poll::Ready(Ok(())) = &poll {
                let data = &buf.filled()[before..];
                if !data.is_empty() {
                    trace!(target: TRAFFIC_TARGET, direction = "recv", xml = %String::from_utf8_lossy(data));
                }
            }
        }
        poll
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TrafficLog<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write(cx, buf);

        if self.enabled {
            if let Poll::Ready(Ok(written)) = &poll {
                trace!(target: TRAFFIC_TARGET, direction = "send", xml = %String::from_utf8_lossy(&buf[..*written]));
            }
        }
        poll
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
