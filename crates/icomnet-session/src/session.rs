//! The public session handle.
//!
//! A [`Session`] is one pseudo-connection to one radio port. It owns the
//! IO task while connected and survives reconnects: subscribers keep their
//! event receiver across `disconnect()`/`connect()` cycles.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use icomnet_core::{ChannelKind, ConnectionState, DatagramTransport, Endpoint, Error, Result};
use icomnet_proto::TransportBody;
use icomnet_transport::UdpTransport;

use crate::builder::{SessionBuilder, SessionConfig};
use crate::events::{Inbound, MessageTag, SessionEvent};
use crate::io::{IoConfig, Reply, Request, SessionIo, spawn_io_task};

/// Point-in-time view of a session's state and counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Lifecycle state.
    pub state: ConnectionState,
    /// Our endpoint.
    pub local: Endpoint,
    /// The radio's endpoint, learned from its SynAck.
    pub remote: Endpoint,
    /// Sequence number the next outbound frame will carry.
    pub send_sequence: u16,
    /// Sequence number expected on the next ping request.
    pub ping_sequence: u16,
    /// Sequence number expected on the next non-ping frame.
    pub recv_sequence: u16,
}

/// A pending reply returned by [`Session::send`].
#[must_use = "a completion does nothing unless waited on"]
pub struct Completion {
    pending: Option<(MessageTag, Reply)>,
    timeout: Duration,
    cmd_tx: mpsc::Sender<Request>,
}

impl Completion {
    /// The tag being waited for, if any.
    pub fn tag(&self) -> Option<MessageTag> {
        self.pending.as_ref().map(|(tag, _)| *tag)
    }

    /// Wait for the reply.
    ///
    /// Returns `Ok(None)` at once when the send registered no waiter.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] when no matching message arrives within the
    /// session's reply timeout (the waiter is removed), and
    /// [`Error::ConnectionLost`] when the session closes first.
    pub async fn wait(self) -> Result<Option<Inbound>> {
        let Some((tag, reply)) = self.pending else {
            return Ok(None);
        };

        let outcome = tokio::time::timeout(self.timeout, reply).await;
        match outcome {
            Ok(Ok(result)) => result.map(Some),
            Ok(Err(_)) => Err(Error::ConnectionLost),
            Err(_) => {
                debug!(%tag, timeout = ?self.timeout, "reply timed out");
                let _ = self.cmd_tx.send(Request::CancelWait { tag }).await;
                Err(Error::Timeout)
            }
        }
    }
}

/// One session to one radio port.
pub struct Session {
    config: SessionConfig,
    io: Option<SessionIo>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl Session {
    /// Create a disconnected session.
    pub fn new(config: SessionConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity);
        Session {
            config,
            io: None,
            event_tx,
        }
    }

    /// Start a [`SessionBuilder`].
    pub fn builder(channel: ChannelKind) -> SessionBuilder {
        SessionBuilder::new(channel)
    }

    /// The session's configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Current state and counters.
    ///
    /// A session whose IO task has exited reports `Disconnected` with
    /// zeroed counters.
    pub async fn snapshot(&self) -> SessionSnapshot {
        match &self.io {
            Some(io) => io.snapshot().await.unwrap_or_default(),
            None => SessionSnapshot::default(),
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ConnectionState {
        self.snapshot().await.state
    }

    /// Open a UDP socket to `host:port` and run the handshake.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyConnected`] unless the session is disconnected;
    /// socket and resolution errors; [`Error::Timeout`] when the handshake
    /// does not finish within the handshake timeout.
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        self.ensure_disconnected().await?;
        self.emit(SessionEvent::Connecting);
        debug!(channel = %self.config.channel, host, port, "connecting session");

        let opened = match UdpTransport::resolve(host, port).await {
            Ok(remote) => UdpTransport::open(&self.config.bind_addr, remote).await,
            Err(e) => Err(e),
        };
        let transport = match opened {
            Ok(transport) => transport,
            Err(e) => {
                self.emit(SessionEvent::Error(e.to_string()));
                self.emit(SessionEvent::Disconnected);
                return Err(e);
            }
        };

        self.start(Box::new(transport)).await
    }

    /// Run the handshake over an already-opened transport.
    pub async fn connect_with_transport(
        &mut self,
        transport: Box<dyn DatagramTransport>,
    ) -> Result<()> {
        self.ensure_disconnected().await?;
        self.emit(SessionEvent::Connecting);
        self.start(transport).await
    }

    /// Transmit `body`, optionally waiting for a reply tagged `wait_for`.
    ///
    /// The frame is stamped with the next send sequence number and both
    /// endpoints. Only one waiter per tag may be outstanding.
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`] when there is no IO task,
    /// [`Error::WaiterBusy`] when `wait_for` already has a waiter (nothing
    /// is sent), or the socket error if transmission fails.
    pub async fn send(
        &self,
        body: TransportBody,
        wait_for: Option<MessageTag>,
    ) -> Result<Completion> {
        let io = self.io.as_ref().ok_or(Error::NotConnected)?;
        let reply = io.send(body, wait_for).await?;
        Ok(Completion {
            pending: wait_for.zip(reply),
            timeout: self.config.reply_timeout,
            cmd_tx: io.cmd_tx.clone(),
        })
    }

    /// Send `body` and wait for the reply tagged `tag`.
    pub async fn request(&self, body: TransportBody, tag: MessageTag) -> Result<Inbound> {
        self.send(body, Some(tag))
            .await?
            .wait()
            .await?
            .ok_or(Error::ConnectionLost)
    }

    /// Close the session.
    ///
    /// A connected session first sends a `Disconnect` frame. Outstanding
    /// waiters fail with [`Error::ConnectionLost`]. Disconnecting an idle
    /// session is a no-op.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(io) = self.io.take() {
            debug!(channel = %self.config.channel, "disconnecting session");
            io.shutdown().await;
        }
        Ok(())
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    async fn ensure_disconnected(&mut self) -> Result<()> {
        if self.state().await != ConnectionState::Disconnected {
            return Err(Error::AlreadyConnected);
        }
        // Reap a task that exited on its own.
        if let Some(io) = self.io.take() {
            let _ = io.task.await;
        }
        Ok(())
    }

    async fn start(&mut self, transport: Box<dyn DatagramTransport>) -> Result<()> {
        let local = Endpoint::new(transport.local_port(), self.config.local_id);
        self.io = Some(spawn_io_task(
            transport,
            IoConfig {
                channel: self.config.channel,
                local,
                request_capacity: self.config.request_capacity,
            },
            self.event_tx.clone(),
        ));

        let error = match tokio::time::timeout(self.config.handshake_timeout, self.handshake()).await
        {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e,
            Err(_) => Error::Timeout,
        };

        tracing::warn!(channel = %self.config.channel, error = %error, "handshake failed");
        self.emit(SessionEvent::Error(error.to_string()));
        if let Some(io) = self.io.take() {
            io.shutdown().await;
        }
        Err(error)
    }

    async fn handshake(&self) -> Result<()> {
        let synack = self.request(TransportBody::Syn, MessageTag::SynAck).await?;
        debug!(remote = %synack.sender, "handshake: syn-ack");
        let ready = self.request(TransportBody::Ready, MessageTag::Ready).await?;
        debug!(sequence = ready.sequence, "handshake: ready");
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(io) = &self.io {
            io.cancel.cancel();
        }
    }
}
