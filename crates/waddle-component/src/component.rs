//! Component runtime: handshake, read and write loops, and dispatch.
//!
//! After the handshake the connection is split in two:
//!
//! - the write loop owns the write half and drains both the outbound
//!   channel and direct [`ComponentHandle::send`] requests onto it
//! - the read loop decodes stanzas and forwards them on the inbound channel
//!
//! Both observe one [`CancellationToken`], and every write races it, so a
//! stalled peer cannot hold up shutdown. Whichever loop stops first cancels
//! the token. The read loop then takes the write half back from the write
//! loop, reports at most one error, closes the inbound and error channels
//! and finally closes the connection.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::handler::Handler;
use crate::handshake;
use crate::parser::{StanzaReader, StreamHeader};
use crate::stanza::{Iq, Stanza};
use crate::stream::{StanzaWriter, TrafficLog};
use crate::{ComponentConfig, ComponentError, Result};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// What the write loop hands back when it exits: the write half, for the
/// read loop to close, and the error that stopped it, if any.
type WriteOutcome = (StanzaWriter<BoxedWriter>, Option<ComponentError>);

/// Channels connecting a started [`Component`] to its caller.
///
/// Each channel holds a single item, so a slow consumer of `inbound`
/// pauses reading and a full `outbound` pauses the sender.
pub struct StanzaChannels {
    /// Stanzas to send to the server. Dropping every sender shuts the
    /// component down.
    pub outbound: mpsc::Sender<Stanza>,
    /// Stanzas received from the server
    pub inbound: mpsc::Receiver<Stanza>,
    /// At most one error, delivered before `inbound` closes
    pub errors: mpsc::Receiver<ComponentError>,
}

/// A stanza written on behalf of [`ComponentHandle::send`].
struct DirectWrite {
    stanza: Stanza,
    done: oneshot::Sender<Result<()>>,
}

/// Cloneable handle for sending stanzas and shutting the component down.
#[derive(Clone)]
pub struct ComponentHandle {
    name: Arc<str>,
    cancel: CancellationToken,
    direct: mpsc::Sender<DirectWrite>,
}

impl ComponentHandle {
    /// The name the component authenticated as.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write a stanza to the connection, bypassing the outbound channel, and
    /// wait until it has been flushed.
    ///
    /// Fails with [`ComponentError::Closed`] once the component has been
    /// shut down, including when shutdown interrupts the write. A failed
    /// write is returned here and also stops the component.
    pub async fn send(&self, stanza: impl Into<Stanza>) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ComponentError::Closed);
        }

        let (done, written) = oneshot::channel();
        let request = DirectWrite {
            stanza: stanza.into(),
            done,
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ComponentError::Closed),
            queued = self.direct.send(request) => queued.map_err(|_| ComponentError::Closed)?,
        }

        written.await.map_err(|_| ComponentError::Closed)?
    }

    /// Ask both loops to stop. Does not wait for them.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Whether shutdown has been requested.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Parts of an authenticated connection handed to the read loop by
/// [`Component::start`].
struct Pending {
    reader: StanzaReader<BoxedReader>,
    outbound: mpsc::Sender<Stanza>,
    write_task: JoinHandle<WriteOutcome>,
}

/// An authenticated component connection.
///
/// The write loop runs from the moment the handshake succeeds, so
/// [`send`](Self::send) works before [`start`](Self::start).
pub struct Component {
    handle: ComponentHandle,
    stream_header: StreamHeader,
    pending: Option<Pending>,
}

impl Component {
    /// Connect to the server over TCP and perform the handshake.
    #[instrument(name = "component.connect", skip(config), fields(address = %config.address, name = %config.name))]
    pub async fn connect(config: &ComponentConfig) -> Result<Self> {
        config.validate()?;
        let stream = TcpStream::connect(&config.address)
            .await
            .map_err(ComponentError::Connect)?;
        debug!("TCP connection established");
        Self::handshake(stream, config).await
    }

    /// Perform the handshake over an already established connection.
    ///
    /// On failure the connection is closed before the error is returned.
    pub async fn handshake<S>(stream: S, config: &ComponentConfig) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        config.validate()?;

        let (read_half, write_half) = tokio::io::split(TrafficLog::new(stream, config.log_traffic));
        let mut reader = StanzaReader::new(Box::new(read_half) as BoxedReader);
        let mut writer = StanzaWriter::new(Box::new(write_half) as BoxedWriter);

        let stream_header =
            match handshake::perform(&mut reader, &mut writer, &config.name, &config.shared_secret)
                .await
            {
                Ok(header) => header,
                Err(e) => {
                    if let Err(close_error) = writer.close().await {
                        debug!(error = %close_error, "Error closing stream after failed handshake");
                    }
                    return Err(e);
                }
            };

        info!(name = %config.name, stream_id = ?stream_header.id, "Component authenticated");

        let cancel = CancellationToken::new();
        let (direct_tx, direct_rx) = mpsc::channel(1);
        let (outbound_tx, outbound_rx) = mpsc::channel(1);
        let write_task = tokio::spawn(write_loop(writer, cancel.clone(), direct_rx, outbound_rx));

        Ok(Self {
            handle: ComponentHandle {
                name: Arc::from(config.name.as_str()),
                cancel,
                direct: direct_tx,
            },
            stream_header,
            pending: Some(Pending {
                reader,
                outbound: outbound_tx,
                write_task,
            }),
        })
    }

    /// The name the component authenticated as.
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// Stream ID assigned by the server.
    pub fn stream_id(&self) -> Option<&str> {
        self.stream_header.id.as_deref()
    }

    /// The stream header the server opened its stream with.
    pub fn stream_header(&self) -> &StreamHeader {
        &self.stream_header
    }

    /// A handle for sending stanzas and shutting down from other tasks.
    pub fn handle(&self) -> ComponentHandle {
        self.handle.clone()
    }

    /// See [`ComponentHandle::send`].
    pub async fn send(&self, stanza: impl Into<Stanza>) -> Result<()> {
        self.handle.send(stanza).await
    }

    /// See [`ComponentHandle::close`].
    pub fn close(&self) {
        self.handle.close();
    }

    /// Spawn the read loop and return the component's channels.
    ///
    /// Can only be called once; later calls fail with
    /// [`ComponentError::AlreadyStarted`].
    pub fn start(&mut self) -> Result<StanzaChannels> {
        let Pending {
            reader,
            outbound,
            write_task,
        } = self.pending.take().ok_or(ComponentError::AlreadyStarted)?;

        let (inbound_tx, inbound_rx) = mpsc::channel(1);
        let (error_tx, error_rx) = mpsc::channel(1);

        tokio::spawn(read_loop(
            reader,
            self.handle.clone(),
            inbound_tx,
            error_tx,
            write_task,
        ));

        debug!(name = %self.handle.name(), "Component started");

        Ok(StanzaChannels {
            outbound,
            inbound: inbound_rx,
            errors: error_rx,
        })
    }

    /// Start the component and dispatch inbound stanzas to `handler`.
    ///
    /// disco#info queries are answered automatically. Returns when the
    /// server closes the stream (`Ok`), or on the first error from the
    /// connection or a handler. The component is shut down either way.
    #[instrument(name = "component.run", skip_all, fields(name = %self.handle.name()))]
    pub async fn run<H: Handler>(mut self, handler: H) -> Result<()> {
        let StanzaChannels {
            outbound,
            mut inbound,
            mut errors,
        } = self.start()?;
        let handle = self.handle();

        let result = loop {
            tokio::select! {
                biased;
                error = errors.recv() => match error {
                    Some(error) => break Err(error),
                    None => break drain(&handler, &handle, &outbound, &mut inbound).await,
                },
                stanza = inbound.recv() => match stanza {
                    Some(stanza) => {
                        if let Err(e) = dispatch(&handler, &handle, &outbound, stanza).await {
                            break Err(e);
                        }
                    }
                    None => break errors.recv().await.map_or(Ok(()), Err),
                },
            }
        };

        match &result {
            Ok(()) => info!("Component stream ended"),
            Err(e) => warn!(error = %e, "Component stopped"),
        }
        handle.close();
        result
    }
}

/// Dispatch whatever is still buffered once the connection is gone.
async fn drain<H: Handler>(
    handler: &H,
    handle: &ComponentHandle,
    outbound: &mpsc::Sender<Stanza>,
    inbound: &mut mpsc::Receiver<Stanza>,
) -> Result<()> {
    while let Some(stanza) = inbound.recv().await {
        dispatch(handler, handle, outbound, stanza).await?;
    }
    Ok(())
}

async fn dispatch<H: Handler>(
    handler: &H,
    handle: &ComponentHandle,
    outbound: &mpsc::Sender<Stanza>,
    stanza: Stanza,
) -> Result<()> {
    match stanza {
        Stanza::Message(message) => handler.message(handle, message).await,
        Stanza::Presence(presence) => handler.presence(handle, presence).await,
        Stanza::Iq(iq) if iq.is_disco_info() => {
            let reply = disco_reply(handler, handle, &iq).await?;
            outbound
                .send(Stanza::Iq(reply))
                .await
                .map_err(|_| ComponentError::Closed)
        }
        Stanza::Iq(iq) => handler.iq(handle, iq).await,
        Stanza::Unknown(tag) => handler.unknown(handle, tag).await,
        other => Err(ComponentError::protocol(format!(
            "Unexpected <{}/> after handshake",
            other.name()
        ))),
    }
}

async fn disco_reply<H: Handler>(handler: &H, handle: &ComponentHandle, query: &Iq) -> Result<Iq> {
    let (identities, features) = handler.disco_info(handle, query).await?;
    debug!(
        from = ?query.header.from.as_ref().map(ToString::to_string),
        identities = identities.len(),
        features = features.len(),
        "Answering disco#info query"
    );
    Ok(query.disco_info_result(identities, features))
}

#[instrument(name = "component.write_loop", skip_all)]
async fn write_loop(
    mut writer: StanzaWriter<BoxedWriter>,
    cancel: CancellationToken,
    mut direct: mpsc::Receiver<DirectWrite>,
    mut outbound: mpsc::Receiver<Stanza>,
) -> WriteOutcome {
    loop {
        let (stanza, done) = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Write loop cancelled");
                return (writer, None);
            }
            Some(request) = direct.recv() => (request.stanza, Some(request.done)),
            stanza = outbound.recv() => match stanza {
                Some(stanza) => (stanza, None),
                None => {
                    debug!("Outbound channel closed, shutting down");
                    cancel.cancel();
                    return (writer, None);
                }
            },
        };

        let name = stanza.name().to_string();
        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = writer.encode(stanza) => Some(result),
        };
        let Some(result) = written else {
            debug!(stanza = %name, "Write interrupted by shutdown");
            return (writer, None);
        };

        match (result, done) {
            (Ok(()), done) => {
                trace!(stanza = %name, "Sent stanza");
                if done.is_some_and(|done| done.send(Ok(())).is_err()) {
                    debug!(stanza = %name, "Sender stopped waiting for its write");
                }
            }
            // The caller of `send` receives the error; it is not reported twice.
            (Err(e), Some(done)) => {
                warn!(error = %e, stanza = %name, "Failed to send stanza");
                cancel.cancel();
                if let Err(Err(e)) = done.send(Err(e)) {
                    debug!(error = %e, "Sender stopped waiting for its write");
                }
                return (writer, None);
            }
            (Err(e), None) => {
                warn!(error = %e, stanza = %name, "Failed to send stanza");
                cancel.cancel();
                return (writer, Some(e));
            }
        }
    }
}

#[instrument(name = "component.read_loop", skip_all)]
async fn read_loop(
    mut reader: StanzaReader<BoxedReader>,
    handle: ComponentHandle,
    inbound: mpsc::Sender<Stanza>,
    errors: mpsc::Sender<ComponentError>,
    write_task: JoinHandle<WriteOutcome>,
) {
    let read_result = receive(&mut reader, &handle.cancel, &inbound).await;
    handle.cancel.cancel();

    let (writer, write_error) = match write_task.await {
        Ok((writer, error)) => (Some(writer), error),
        Err(e) => {
            warn!(error = %e, "Write loop terminated abnormally");
            (None, None)
        }
    };

    let error = match (read_result, write_error) {
        (Err(error), Some(secondary)) => {
            warn!(error = %secondary, "Dropping write error after read error");
            Some(error)
        }
        (Err(error), None) => Some(error),
        (Ok(()), write_error) => write_error,
    };

    if let Some(error) = error {
        warn!(error = %error, "Component connection failed");
        if errors.send(error).await.is_err() {
            debug!("Error receiver already dropped");
        }
    }

    drop(inbound);
    drop(errors);
    if let Some(mut writer) = writer {
        if let Err(e) = writer.close().await {
            debug!(error = %e, "Error closing component stream");
        }
    }
    info!(name = %handle.name(), "Component connection closed");
}

async fn receive(
    reader: &mut StanzaReader<BoxedReader>,
    cancel: &CancellationToken,
    inbound: &mpsc::Sender<Stanza>,
) -> Result<()> {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            next = reader.next_stanza() => next?,
        };

        let Some(stanza) = next else {
            return Ok(());
        };
        trace!(stanza = %stanza.name(), "Received stanza");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            sent = inbound.send(stanza) => {
                if sent.is_err() {
                    debug!("Inbound receiver dropped, stopping read loop");
                    return Ok(());
                }
            }
        }
    }
}
