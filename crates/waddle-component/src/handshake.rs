//! Component handshake (XEP-0114 Section 3).
//!
//! # Protocol Overview
//!
//! 1. Component opens a stream to its own name in `jabber:component:accept`
//! 2. Server answers with its stream header, carrying a stream ID
//! 3. Component sends `<handshake/>` with the hex digest of the secret
//! 4. Server answers with an empty `<handshake/>`, or a stream error
//!
//! # Digest
//!
//! ```text
//! digest = lowercase-hex(SHA-1(stream_id || shared_secret))
//! ```
//!
//! The state machine itself ([`Handshake::advance`]) performs no IO; the
//! driver [`perform`] feeds it the inputs read from the stream and writes
//! whatever it asks to send.
//!
//! # References
//!
//! - [XEP-0114: Jabber Component Protocol](https://xmpp.org/extensions/xep-0114.html)

use std::fmt;

use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, instrument, warn};

use crate::parser::{StanzaReader, StreamHeader, Token};
use crate::stream::StanzaWriter;
use crate::{ComponentError, Result, Stanza};

/// Compute the handshake digest for a stream ID and shared secret.
pub fn handshake_digest(stream_id: &str, secret: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(stream_id.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Handshake progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HandshakeState {
    /// Connection established, nothing sent yet
    #[default]
    Connected,
    /// Stream header sent, waiting for the server's
    AwaitingStreamOpen,
    /// Digest sent, waiting for the server's verdict
    DigestSent,
    /// Server accepted the component
    Ready,
    /// Terminal failure
    Failed,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::AwaitingStreamOpen => write!(f, "awaiting-stream-open"),
            Self::DigestSent => write!(f, "digest-sent"),
            Self::Ready => write!(f, "ready"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Events that drive the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeInput {
    /// Start the handshake
    Begin,
    /// The server opened its stream
    StreamOpened(StreamHeader),
    /// The server answered with `<handshake/>`
    Accepted,
    /// The server sent a stream error
    Rejected {
        condition: String,
        text: Option<String>,
    },
    /// The server sent some other element
    Unexpected(String),
}

/// Handshake state machine for a single connection.
pub struct Handshake {
    name: String,
    secret: String,
    state: HandshakeState,
    stream_header: Option<StreamHeader>,
}

impl Handshake {
    pub fn new(name: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            secret: secret.into(),
            state: HandshakeState::default(),
            stream_header: None,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// The server's stream header, once received.
    pub fn stream_header(&self) -> Option<&StreamHeader> {
        self.stream_header.as_ref()
    }

    /// Apply one input, returning the stanza to send next, if any.
    ///
    /// Any error moves the machine to [`HandshakeState::Failed`], after
    /// which every further input is rejected.
    pub fn advance(&mut self, input: HandshakeInput) -> Result<Option<Stanza>> {
        match self.transition(input) {
            Ok((state, outgoing)) => {
                self.state = state;
                Ok(outgoing)
            }
            Err(e) => {
                self.state = HandshakeState::Failed;
                Err(e)
            }
        }
    }

    fn transition(&mut self, input: HandshakeInput) -> Result<(HandshakeState, Option<Stanza>)> {
        use HandshakeInput as I;
        use HandshakeState as S;

        match (self.state, input) {
            (S::Failed, _) => Err(ComponentError::protocol("Handshake already failed")),
            (S::Connected, I::Begin) => {
                let header = StreamHeader {
                    to: Some(self.name.clone()),
                    ..StreamHeader::default()
                };
                Ok((S::AwaitingStreamOpen, Some(Stanza::StreamOpen(header))))
            }
            (S::AwaitingStreamOpen, I::StreamOpened(header)) => {
                let digest = handshake_digest(header.require_id()?, &self.secret);
                self.stream_header = Some(header);
                Ok((S::DigestSent, Some(Stanza::Handshake { digest })))
            }
            (S::DigestSent, I::Accepted) => Ok((S::Ready, None)),
            (S::DigestSent, I::Rejected { condition, text }) => {
                let reason = match text {
                    Some(text) => format!("{condition} ({text})"),
                    None => condition,
                };
                Err(ComponentError::auth_failed(reason))
            }
            (_, I::Rejected { condition, text }) => {
                Err(ComponentError::StreamError { condition, text })
            }
            (state, I::Unexpected(name)) => Err(ComponentError::protocol(format!(
                "Unexpected <{name}/> in handshake state {state}"
            ))),
            (state, input) => Err(ComponentError::protocol(format!(
                "Unexpected {input:?} in handshake state {state}"
            ))),
        }
    }
}

/// Run the handshake over an established connection.
///
/// Returns the server's stream header once the component is accepted.
#[instrument(name = "component.handshake", skip_all, fields(name = %name))]
pub async fn perform<R, W>(
    reader: &mut StanzaReader<R>,
    writer: &mut StanzaWriter<W>,
    name: &str,
    secret: &str,
) -> Result<StreamHeader>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut handshake = Handshake::new(name, secret);
    let mut input = HandshakeInput::Begin;

    loop {
        if let Some(stanza) = handshake.advance(input)? {
            debug!(state = %handshake.state(), stanza = stanza.name(), "Sending handshake step");
            writer.encode(stanza).await?;
        }

        if handshake.state() == HandshakeState::Ready {
            break;
        }

        input = match read_input(reader).await {
            Ok(input) => input,
            Err(e) => {
                warn!(state = %handshake.state(), error = %e, "Handshake aborted");
                return Err(e);
            }
        };
    }

    let header = handshake.stream_header.take().unwrap_or_default();
    debug!(stream_id = ?header.id, "Handshake accepted");
    Ok(header)
}

async fn read_input<R: AsyncRead + Unpin>(reader: &mut StanzaReader<R>) -> Result<HandshakeInput> {
    loop {
        match reader.next_token().await? {
            Token::StreamOpen(header) => return Ok(HandshakeInput::StreamOpened(header)),
            Token::Start(tag) => {
                if reader.is_stream_error(&tag) {
                    let element = reader.read_element(&tag).await?;
                    return match crate::parser::stream_error(&element) {
                        ComponentError::StreamError { condition, text } => {
                            Ok(HandshakeInput::Rejected { condition, text })
                        }
                        other => Err(other),
                    };
                }

                reader.skip_element(&tag).await?;
                if tag.local_name() == "handshake" {
                    return Ok(HandshakeInput::Accepted);
                }
                return Ok(HandshakeInput::Unexpected(tag.name));
            }
            Token::End(_) | Token::Eof => {
                return Err(ComponentError::protocol("Stream closed during handshake"));
            }
            Token::Other => continue,
        }
    }
}
