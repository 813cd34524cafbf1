//! IO task for one session.
//!
//! The task owns the socket and all session state: sequence counters,
//! endpoints, and the waiter table. Callers talk to it through
//! [`SessionIo`] with oneshot replies, so the state needs no locks.
//!
//! The task handles: sequence stamping, the Syn/Ready handshake
//! transitions, ping replies, payload decoding for the session's channel,
//! waiter resolution, and teardown on local or remote disconnect.

use std::collections::HashMap;
use std::ops::ControlFlow;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use icomnet_core::{ChannelKind, ConnectionState, DatagramTransport, Endpoint, Error, Result};
use icomnet_proto::{ControlMessage, SerialFrame, TransportBody, TransportFrame, TransportType};

use crate::events::{Inbound, MessageTag, Payload, SessionEvent};
use crate::session::SessionSnapshot;

/// Receive buffer size; one UDP datagram always fits.
const MAX_DATAGRAM: usize = 65_536;

/// Receiving half of a registered waiter.
pub(crate) type Reply = oneshot::Receiver<Result<Inbound>>;

type Waiter = oneshot::Sender<Result<Inbound>>;

/// Configuration for the IO task.
pub(crate) struct IoConfig {
    /// Codec applied to data payloads.
    pub channel: ChannelKind,
    /// Our endpoint, stamped as sender on every frame.
    pub local: Endpoint,
    /// Request channel capacity.
    pub request_capacity: usize,
}

/// A request sent from the session handle to the IO task.
pub(crate) enum Request {
    /// Stamp and transmit a frame, optionally registering a waiter.
    Send {
        body: TransportBody,
        wait_for: Option<MessageTag>,
        reply: oneshot::Sender<Result<Option<Reply>>>,
    },
    /// Drop an abandoned waiter.
    CancelWait { tag: MessageTag },
    /// Report the current state and counters.
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    /// Say goodbye to the radio and stop.
    Close,
}

/// Handle to the IO task. Stored inside [`Session`](crate::Session).
pub(crate) struct SessionIo {
    pub cmd_tx: mpsc::Sender<Request>,
    pub cancel: CancellationToken,
    pub task: JoinHandle<()>,
}

impl SessionIo {
    /// Transmit `body`; returns the reply receiver when `wait_for` is set.
    pub async fn send(
        &self,
        body: TransportBody,
        wait_for: Option<MessageTag>,
    ) -> Result<Option<Reply>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Request::Send {
                body,
                wait_for,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::NotConnected)?;

        match reply_rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::NotConnected),
        }
    }

    /// Current state, or `None` once the task has exited.
    pub async fn snapshot(&self) -> Option<SessionSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Request::Snapshot { reply: reply_tx })
            .await
            .ok()?;
        reply_rx.await.ok()
    }

    /// Close the session and wait for the task to finish.
    pub async fn shutdown(self) {
        let _ = self.cmd_tx.send(Request::Close).await;
        let _ = self.task.await;
    }
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Spawn the IO task in the `Listening` state.
pub(crate) fn spawn_io_task(
    transport: Box<dyn DatagramTransport>,
    config: IoConfig,
    event_tx: broadcast::Sender<SessionEvent>,
) -> SessionIo {
    let (cmd_tx, cmd_rx) = mpsc::channel::<Request>(config.request_capacity);
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();

    let state = IoState::new(config.channel, config.local, event_tx);
    let task = tokio::spawn(io_loop(transport, state, cmd_rx, cancel_clone));

    SessionIo {
        cmd_tx,
        cancel,
        task,
    }
}

// ---------------------------------------------------------------------------
// IO loop
// ---------------------------------------------------------------------------

/// The main IO loop. Runs as a spawned Tokio task.
///
/// Uses `tokio::select! { biased; }` to prioritize:
/// 1. Cancellation
/// 2. Caller requests
/// 3. Inbound datagrams
async fn io_loop(
    transport: Box<dyn DatagramTransport>,
    mut state: IoState,
    mut cmd_rx: mpsc::Receiver<Request>,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("session IO task cancelled");
                break;
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(request) => {
                        if state.handle_request(&*transport, request).await.is_break() {
                            break;
                        }
                    }
                    None => {
                        debug!("all session handles dropped, exiting IO task");
                        break;
                    }
                }
            }

            received = transport.recv(&mut buf) => {
                match received {
                    Ok(n) => {
                        if state.handle_datagram(&*transport, &buf[..n]).await.is_break() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(local = %state.local, error = %e, "session socket failed");
                        state.emit(SessionEvent::Error(e.to_string()));
                        break;
                    }
                }
            }
        }
    }

    state.teardown();
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

struct IoState {
    channel: ChannelKind,
    state: ConnectionState,
    local: Endpoint,
    remote: Endpoint,
    send_sequence: u16,
    ping_sequence: u16,
    recv_sequence: u16,
    synack_seen: bool,
    waiters: HashMap<MessageTag, Waiter>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl IoState {
    fn new(channel: ChannelKind, local: Endpoint, event_tx: broadcast::Sender<SessionEvent>) -> Self {
        IoState {
            channel,
            state: ConnectionState::Listening,
            local,
            remote: Endpoint::default(),
            send_sequence: 0,
            ping_sequence: 0,
            recv_sequence: 0,
            synack_seen: false,
            waiters: HashMap::new(),
            event_tx,
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            local: self.local,
            remote: self.remote,
            send_sequence: self.send_sequence,
            ping_sequence: self.ping_sequence,
            recv_sequence: self.recv_sequence,
        }
    }

    async fn handle_request(
        &mut self,
        transport: &dyn DatagramTransport,
        request: Request,
    ) -> ControlFlow<()> {
        match request {
            Request::Send {
                body,
                wait_for,
                reply,
            } => {
                let result = self.send(transport, body, wait_for).await;
                let _ = reply.send(result);
            }
            Request::CancelWait { tag } => {
                if self.waiters.get(&tag).is_some_and(|w| w.is_closed()) {
                    self.waiters.remove(&tag);
                    debug!(%tag, "abandoned waiter removed");
                }
            }
            Request::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Request::Close => {
                if self.state == ConnectionState::Connected {
                    let sequence = self.next_sequence();
                    if let Err(e) = self.transmit(transport, sequence, TransportBody::Disconnect).await {
                        debug!(error = %e, "disconnect notice not delivered");
                    }
                }
                debug!(local = %self.local, "session closed locally");
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Check the waiter slot, stamp, transmit, then register.
    async fn send(
        &mut self,
        transport: &dyn DatagramTransport,
        body: TransportBody,
        wait_for: Option<MessageTag>,
    ) -> Result<Option<Reply>> {
        if let Some(tag) = wait_for {
            if self.waiters.get(&tag).is_some_and(|w| !w.is_closed()) {
                return Err(Error::WaiterBusy(tag.to_string()));
            }
        }

        let sequence = self.next_sequence();
        self.transmit(transport, sequence, body).await?;

        Ok(wait_for.map(|tag| {
            let (tx, rx) = oneshot::channel();
            self.waiters.insert(tag, tx);
            rx
        }))
    }

    fn next_sequence(&mut self) -> u16 {
        let sequence = self.send_sequence;
        self.send_sequence = self.send_sequence.wrapping_add(1);
        sequence
    }

    async fn transmit(
        &self,
        transport: &dyn DatagramTransport,
        sequence: u16,
        body: TransportBody,
    ) -> Result<()> {
        let frame = TransportFrame::new(sequence, self.local, self.remote, body);
        tracing::trace!(
            sequence,
            type_code = frame.body.type_code(),
            receiver = %self.remote,
            "sending frame"
        );
        transport.send(&frame.encode()).await
    }

    async fn handle_datagram(
        &mut self,
        transport: &dyn DatagramTransport,
        datagram: &[u8],
    ) -> ControlFlow<()> {
        let frame = match TransportFrame::decode(datagram) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, bytes = datagram.len(), "dropping undecodable datagram");
                return ControlFlow::Continue(());
            }
        };

        let TransportFrame {
            sequence,
            sender,
            body,
            ..
        } = frame;

        let (kind, payload) = match body {
            TransportBody::Ping { reply, ping_id } => {
                if !reply {
                    self.answer_ping(transport, sequence, ping_id).await;
                }
                return ControlFlow::Continue(());
            }
            TransportBody::Unknown { type_code, payload } => {
                debug!(
                    error = %Error::UnknownType(type_code),
                    bytes = payload.len(),
                    "ignoring frame"
                );
                return ControlFlow::Continue(());
            }
            TransportBody::Data(data) => (TransportType::Data, decode_payload(self.channel, data)),
            TransportBody::Retransmit(seqs) => {
                debug!(?seqs, "radio requested retransmit");
                (TransportType::Retransmit, Payload::Retransmit(seqs))
            }
            TransportBody::Syn => (TransportType::Syn, Payload::Empty),
            TransportBody::SynAck => (TransportType::SynAck, Payload::Empty),
            TransportBody::Disconnect => (TransportType::Disconnect, Payload::Empty),
            TransportBody::Ready => (TransportType::Ready, Payload::Empty),
        };

        if self.recv_sequence != 0 && self.recv_sequence != sequence {
            tracing::warn!(
                expected = self.recv_sequence,
                received = sequence,
                "receive sequence mismatch"
            );
        }
        self.recv_sequence = sequence.wrapping_add(1);

        let inbound = Inbound {
            kind,
            sequence,
            sender,
            payload,
        };

        match kind {
            TransportType::SynAck if self.state == ConnectionState::Listening => {
                self.remote = sender;
                self.synack_seen = true;
                debug!(remote = %sender, "syn acknowledged");
            }
            TransportType::Ready
                if self.state == ConnectionState::Listening && self.synack_seen =>
            {
                self.recv_sequence = sequence;
                self.state = ConnectionState::Connected;
                debug!(local = %self.local, remote = %self.remote, sequence, "session connected");
                self.emit(SessionEvent::Connected);
            }
            _ => {}
        }

        self.resolve(&inbound);

        match kind {
            TransportType::Data => {
                self.emit(SessionEvent::Message(inbound));
                ControlFlow::Continue(())
            }
            TransportType::Disconnect => {
                debug!(remote = %self.remote, "radio closed the session");
                ControlFlow::Break(())
            }
            _ => ControlFlow::Continue(()),
        }
    }

    async fn answer_ping(&mut self, transport: &dyn DatagramTransport, sequence: u16, ping_id: u32) {
        if self.ping_sequence != 0 && self.ping_sequence != sequence {
            tracing::warn!(
                expected = self.ping_sequence,
                received = sequence,
                "ping sequence mismatch"
            );
        }
        self.ping_sequence = sequence.wrapping_add(1);

        let body = TransportBody::Ping {
            reply: true,
            ping_id,
        };
        if let Err(e) = self.transmit(transport, sequence, body).await {
            tracing::warn!(error = %e, sequence, "ping reply not sent");
        }
    }

    fn resolve(&mut self, inbound: &Inbound) {
        if matches!(&inbound.payload, Payload::Civ(msg) if msg.is_nak()) {
            self.reject_civ_waiters(inbound.sequence);
        }
        for tag in inbound.tags() {
            if let Some(waiter) = self.waiters.remove(&tag) {
                debug!(%tag, sequence = inbound.sequence, "reply matched");
                let _ = waiter.send(Ok(inbound.clone()));
            }
        }
    }

    /// A NAK names no command, so it fails every pending CI-V request.
    fn reject_civ_waiters(&mut self, sequence: u16) {
        let tags: Vec<MessageTag> = self
            .waiters
            .keys()
            .filter(|tag| matches!(tag, MessageTag::Civ(_)))
            .copied()
            .collect();
        if tags.is_empty() {
            debug!(sequence, "NAK with no pending CI-V request");
        }
        for tag in tags {
            if let Some(waiter) = self.waiters.remove(&tag) {
                tracing::warn!(%tag, sequence, "radio rejected command");
                let _ = waiter.send(Err(Error::Rejected));
            }
        }
    }

    fn teardown(&mut self) {
        for (_, waiter) in self.waiters.drain() {
            let _ = waiter.send(Err(Error::ConnectionLost));
        }
        self.state = ConnectionState::Disconnected;
        debug!(local = %self.local, "session disconnected");
        self.emit(SessionEvent::Disconnected);
    }
}

/// Decode a data payload with the channel's codec.
///
/// Failures degrade to [`Payload::Raw`]; empty payloads are the radio's
/// idle frames and are passed through silently.
fn decode_payload(channel: ChannelKind, data: Vec<u8>) -> Payload {
    if data.is_empty() {
        return Payload::Raw(data);
    }
    let decoded = match channel {
        ChannelKind::Control => ControlMessage::decode(&data).map(Payload::Control),
        ChannelKind::Serial => SerialFrame::decode(&data)
            .and_then(|frame| frame.civ_message())
            .map(Payload::Civ),
        ChannelKind::Audio => return Payload::Raw(data),
    };
    decoded.unwrap_or_else(|e| {
        tracing::warn!(%channel, error = %e, bytes = data.len(), "data payload not decoded");
        Payload::Raw(data)
    })
}
