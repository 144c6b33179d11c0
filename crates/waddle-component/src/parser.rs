//! Pull parsing of the component stream using quick-xml and minidom.
//!
//! The server's stream is one long-lived XML document. [`StanzaReader`]
//! walks it token by token: the `<stream:stream>` root is surfaced as a
//! [`StreamHeader`], and each top-level child is either consumed into a
//! [`minidom::Element`] and converted into a typed [`Stanza`], or skipped
//! along with its whole subtree.
//!
//! Top-level elements are re-serialized from the token stream and parsed
//! in isolation, so the namespace declarations made on the stream root are
//! carried over onto each element before it is handed to minidom.

use minidom::Element;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use tokio::io::{AsyncRead, BufReader};
use tracing::{debug, trace};

use crate::{ComponentError, Result, Stanza};

/// Namespace URIs used on a component stream
pub mod ns {
    /// XEP-0114 component namespace
    pub const COMPONENT_ACCEPT: &str = "jabber:component:accept";
    /// XMPP streams namespace
    pub const STREAM: &str = "http://etherx.jabber.org/streams";
    /// Stream error condition namespace
    pub const STREAM_ERRORS: &str = "urn:ietf:params:xml:ns:xmpp-streams";
    /// Stanza error condition namespace
    pub const STANZAS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";
}

/// Parsed stream header information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamHeader {
    /// The 'to' attribute
    pub to: Option<String>,
    /// The 'from' attribute (the component's name, as echoed by the server)
    pub from: Option<String>,
    /// The 'id' attribute (stream ID, set by server)
    pub id: Option<String>,
    /// The 'version' attribute
    pub version: Option<String>,
    /// The 'xml:lang' attribute
    pub lang: Option<String>,
}

impl StreamHeader {
    /// Build a header from the attributes of a `<stream:stream>` start tag.
    pub fn from_start_tag(tag: &StartTag) -> Self {
        let attr = |name: &str| tag.attr(name).map(str::to_string);
        Self {
            to: attr("to"),
            from: attr("from"),
            id: attr("id"),
            version: attr("version"),
            lang: attr("xml:lang"),
        }
    }

    /// The stream ID, which the handshake digest is computed over.
    pub fn require_id(&self) -> Result<&str> {
        self.id
            .as_deref()
            .ok_or_else(|| ComponentError::protocol("Stream header without id"))
    }
}

/// An element start tag as it appeared on the wire.
///
/// Names are kept qualified (`stream:error`), attributes are unescaped
/// and kept in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTag {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    /// `<name/>` rather than `<name>`
    pub self_closing: bool,
}

impl StartTag {
    fn from_bytes(start: &BytesStart<'_>, self_closing: bool) -> Result<Self> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();

        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| ComponentError::xml_parse(format!("Invalid attribute: {e}")))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| ComponentError::xml_parse(format!("Invalid attribute value: {e}")))?
                .into_owned();
            attributes.push((key, value));
        }

        Ok(Self {
            name,
            attributes,
            self_closing,
        })
    }

    /// Name without its namespace prefix.
    pub fn local_name(&self) -> &str {
        self.name
            .split_once(':')
            .map_or(self.name.as_str(), |(_, local)| local)
    }

    /// Namespace prefix, if the name has one.
    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    /// Look up an attribute by its qualified name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// A single token of the server's stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// The `<stream:stream>` root was opened
    StreamOpen(StreamHeader),
    /// An element started
    Start(StartTag),
    /// An element ended; at the top level this is `</stream:stream>`
    End(String),
    /// The underlying connection reached end of file
    Eof,
    /// Text, comments, declarations and other tokens with no meaning here
    Other,
}

/// Reads tokens and stanzas from the server's half of the connection.
pub struct StanzaReader<R> {
    reader: Reader<BufReader<R>>,
    buf: Vec<u8>,
    /// Namespace declarations in scope for top-level elements
    scope: Vec<(String, String)>,
}

impl<R: AsyncRead + Unpin> StanzaReader<R> {
    /// Create a reader over the given byte source.
    pub fn new(inner: R) -> Self {
        let mut reader = Reader::from_reader(BufReader::new(inner));
        reader.config_mut().trim_text(false);

        Self {
            reader,
            buf: Vec::with_capacity(4096),
            scope: vec![
                ("xmlns".to_string(), ns::COMPONENT_ACCEPT.to_string()),
                ("xmlns:stream".to_string(), ns::STREAM.to_string()),
            ],
        }
    }

    /// Read the next token.
    pub async fn next_token(&mut self) -> Result<Token> {
        self.buf.clear();
        let event = self
            .reader
            .read_event_into_async(&mut self.buf)
            .await
            .map_err(|e| ComponentError::xml_parse(e.to_string()))?;

        let token = match event {
            Event::Start(start) => Token::Start(StartTag::from_bytes(&start, false)?),
            Event::Empty(start) => Token::Start(StartTag::from_bytes(&start, true)?),
            Event::End(end) => Token::End(String::from_utf8_lossy(end.name().as_ref()).into_owned()),
            Event::Eof => Token::Eof,
            _ => Token::Other,
        };

        match token {
            Token::Start(tag) if self.is_stream_open(&tag) => {
                self.open_scope(&tag);
                Ok(Token::StreamOpen(StreamHeader::from_start_tag(&tag)))
            }
            token => Ok(token),
        }
    }

    /// Read the next top-level stanza.
    ///
    /// Returns `Ok(None)` once the server closes the stream or the
    /// connection reaches end of file.
    pub async fn next_stanza(&mut self) -> Result<Option<Stanza>> {
        loop {
            match self.next_token().await? {
                Token::Start(tag) => return self.decode_stanza(tag).await.map(Some),
                Token::End(name) => {
                    debug!(element = %name, "Server closed the stream");
                    return Ok(None);
                }
                Token::Eof => {
                    debug!("Connection reached end of file");
                    return Ok(None);
                }
                Token::StreamOpen(_) => {
                    return Err(ComponentError::protocol("Unexpected stream restart"));
                }
                Token::Other => continue,
            }
        }
    }

    /// Consume the element opened by `tag` and turn it into a [`Stanza`].
    ///
    /// `<message/>`, `<presence/>` and `<iq/>` are decoded into their typed
    /// forms. A `<stream:error/>` is returned as
    /// [`ComponentError::StreamError`]. Anything else has its subtree
    /// discarded and is reported as [`Stanza::Unknown`].
    pub async fn decode_stanza(&mut self, tag: StartTag) -> Result<Stanza> {
        if self.is_stream_error(&tag) {
            let element = self.read_element(&tag).await?;
            return Err(stream_error(&element));
        }

        match tag.local_name() {
            "message" | "presence" | "iq" => {
                let element = self.read_element(&tag).await?;
                Stanza::try_from(element)
            }
            _ => {
                trace!(element = %tag.name, "Skipping unknown element");
                self.skip_element(&tag).await?;
                Ok(Stanza::Unknown(tag))
            }
        }
    }

    /// Consume the element opened by `tag` into a minidom tree.
    pub async fn read_element(&mut self, tag: &StartTag) -> Result<Element> {
        let mut writer = Writer::new(Vec::new());

        let mut root = BytesStart::new(tag.name.as_str());
        for (key, value) in &tag.attributes {
            root.push_attribute((key.as_str(), value.as_str()));
        }
        for (key, value) in &self.scope {
            if tag.attr(key).is_none() {
                root.push_attribute((key.as_str(), value.as_str()));
            }
        }

        if tag.self_closing {
            writer
                .write_event(Event::Empty(root))
                .map_err(|e| ComponentError::xml_parse(e.to_string()))?;
        } else {
            writer
                .write_event(Event::Start(root))
                .map_err(|e| ComponentError::xml_parse(e.to_string()))?;

            let mut depth = 1usize;
            while depth > 0 {
                self.buf.clear();
                let event = self
                    .reader
                    .read_event_into_async(&mut self.buf)
                    .await
                    .map_err(|e| ComponentError::xml_parse(e.to_string()))?;

                match &event {
                    Event::Start(_) => depth += 1,
                    Event::End(_) => depth -= 1,
                    Event::Eof => {
                        return Err(ComponentError::xml_parse(format!(
                            "Stream ended inside <{}>",
                            tag.name
                        )));
                    }
                    Event::Comment(_) | Event::PI(_) | Event::Decl(_) | Event::DocType(_) => {
                        continue;
                    }
                    _ => {}
                }

                writer
                    .write_event(event)
                    .map_err(|e| ComponentError::xml_parse(e.to_string()))?;
            }
        }

        let xml = String::from_utf8(writer.into_inner())
            .map_err(|e| ComponentError::xml_parse(e.to_string()))?;
        xml.parse::<Element>()
            .map_err(|e| ComponentError::xml_parse(format!("<{}>: {e}", tag.name)))
    }

    /// Discard the element opened by `tag` and everything inside it.
    pub async fn skip_element(&mut self, tag: &StartTag) -> Result<()> {
        if tag.self_closing {
            return Ok(());
        }

        let mut depth = 1usize;
        while depth > 0 {
            self.buf.clear();
            let event = self
                .reader
                .read_event_into_async(&mut self.buf)
                .await
                .map_err(|e| ComponentError::xml_parse(e.to_string()))?;

            match event {
                Event::Start(_) => depth += 1,
                Event::End(_) => depth -= 1,
                Event::Eof => {
                    return Err(ComponentError::xml_parse(format!(
                        "Stream ended inside <{}>",
                        tag.name
                    )));
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn is_stream_open(&self, tag: &StartTag) -> bool {
        !tag.self_closing && tag.local_name() == "stream" && self.resolve_ns(tag) == Some(ns::STREAM)
    }

    /// Whether `tag` opens a `<stream:error/>`.
    pub fn is_stream_error(&self, tag: &StartTag) -> bool {
        tag.local_name() == "error" && self.resolve_ns(tag) == Some(ns::STREAM)
    }

    fn resolve_ns<'a>(&'a self, tag: &'a StartTag) -> Option<&'a str> {
        let key = match tag.prefix() {
            Some(prefix) => format!("xmlns:{prefix}"),
            None => "xmlns".to_string(),
        };

        tag.attr(&key).or_else(|| {
            self.scope
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str())
        })
    }

    fn open_scope(&mut self, stream: &StartTag) {
        for (key, value) in &stream.attributes {
            if key != "xmlns" && !key.starts_with("xmlns:") {
                continue;
            }
            match self.scope.iter_mut().find(|(k, _)| k == key) {
                Some(entry) => entry.1 = value.clone(),
                None => self.scope.push((key.clone(), value.clone())),
            }
        }
    }
}

/// Convert a `<stream:error/>` element into [`ComponentError::StreamError`].
pub fn stream_error(element: &Element) -> ComponentError {
    let condition = element
        .children()
        .find(|child| child.ns() == ns::STREAM_ERRORS && child.name() != "text")
        .map_or_else(|| "undefined-condition".to_string(), |child| child.name().to_string());
    let text = element
        .get_child("text", ns::STREAM_ERRORS)
        .map(Element::text)
        .filter(|text| !text.is_empty());

    ComponentError::StreamError { condition, text }
}
