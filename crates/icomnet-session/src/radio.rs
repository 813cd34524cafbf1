//! Radio -- one logged-in radio with its control and serial sessions.
//!
//! Connecting a radio is a fixed sequence on the control port: handshake,
//! login, capabilities, then a connection request that tells the radio
//! which local port our serial session listens on and returns the radio's
//! serial port. The serial session is then opened against that port.
//!
//! # Example
//!
//! ```no_run
//! use icomnet_civ::DecodedCommand;
//! use icomnet_session::RadioBuilder;
//!
//! # async fn example() -> icomnet_core::Result<()> {
//! let mut radio = RadioBuilder::new("192.168.1.50")
//!     .username("ic-705")
//!     .password("secret")
//!     .build()
//!     .await?;
//! let reply = radio
//!     .request(DecodedCommand::new("read-operating-frequency"))
//!     .await?;
//! println!("{:?}", reply.command.field("frequency"));
//! radio.disconnect().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use icomnet_civ::{CONTROLLER_ADDR, CivMessage, DecodedCommand};
use icomnet_core::{ChannelKind, Error, Result};
use icomnet_proto::{ConnectionRequest, ConnectionResponse, RadioInfo};
use icomnet_transport::UdpTransport;

use crate::builder::{DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_REPLY_TIMEOUT, SessionBuilder};
use crate::control::ControlChannel;
use crate::events::SessionEvent;
use crate::serial::SerialChannel;

/// Default UDP port of the radio's control channel.
pub const DEFAULT_CONTROL_PORT: u16 = 50001;

/// A session event tagged with the channel it came from.
#[derive(Debug, Clone)]
pub struct RadioEvent {
    /// Which session emitted the event.
    pub channel: ChannelKind,
    /// The event.
    pub event: SessionEvent,
}

/// Fluent builder for [`Radio`].
pub struct RadioBuilder {
    host: String,
    control_port: u16,
    username: String,
    password: String,
    program: String,
    serial_port: Option<u16>,
    civ_address: Option<u8>,
    bind_addr: String,
    reply_timeout: Duration,
    handshake_timeout: Duration,
}

impl RadioBuilder {
    /// Start a builder for the radio at `host`.
    pub fn new(host: &str) -> Self {
        RadioBuilder {
            host: host.to_string(),
            control_port: DEFAULT_CONTROL_PORT,
            username: String::new(),
            password: String::new(),
            program: "icomnet".to_string(),
            serial_port: None,
            civ_address: None,
            bind_addr: "0.0.0.0:0".to_string(),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Control port (default 50001).
    pub fn control_port(mut self, port: u16) -> Self {
        self.control_port = port;
        self
    }

    /// Login username.
    pub fn username(mut self, username: &str) -> Self {
        self.username = username.to_string();
        self
    }

    /// Login password.
    pub fn password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    /// Program name sent at login (default `"icomnet"`).
    pub fn program(mut self, program: &str) -> Self {
        self.program = program.to_string();
        self
    }

    /// Use this serial port instead of the one the radio grants.
    pub fn serial_port(mut self, port: u16) -> Self {
        self.serial_port = Some(port);
        self
    }

    /// Use this CI-V address instead of the one the radio advertises.
    pub fn civ_address(mut self, address: u8) -> Self {
        self.civ_address = Some(address);
        self
    }

    /// Local bind address for both sessions (default `"0.0.0.0:0"`).
    pub fn bind_addr(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Reply timeout for both sessions (default 2 s).
    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Handshake timeout for both sessions (default 5 s).
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Connect, log in, and open the serial channel.
    pub async fn build(self) -> Result<Radio> {
        let control_session = self.session(ChannelKind::Control).build();
        let serial_session = self.session(ChannelKind::Serial).build();

        let (event_tx, _) = broadcast::channel(256);
        let forwarders = CancellationToken::new();
        forward_events(ChannelKind::Control, control_session.subscribe(), &event_tx, &forwarders);
        forward_events(ChannelKind::Serial, serial_session.subscribe(), &event_tx, &forwarders);

        let mut control = ControlChannel::new(control_session)?;
        let mut serial = SerialChannel::new(serial_session)?;

        let negotiated = match self.negotiate(&mut control, &mut serial).await {
            Ok(negotiated) => negotiated,
            Err(e) => {
                let _ = serial.disconnect().await;
                let _ = control.disconnect().await;
                forwarders.cancel();
                return Err(e);
            }
        };

        let civ_address = self.civ_address.unwrap_or(negotiated.info.civ_address);
        debug!(
            radio = %negotiated.info.name,
            civ_address,
            civ_port = negotiated.streams.civ_port,
            "radio ready"
        );
        Ok(Radio {
            control,
            serial,
            info: negotiated.info,
            streams: negotiated.streams,
            civ_address,
            event_tx,
            forwarders,
        })
    }

    fn session(&self, channel: ChannelKind) -> SessionBuilder {
        SessionBuilder::new(channel)
            .bind_addr(&self.bind_addr)
            .reply_timeout(self.reply_timeout)
            .handshake_timeout(self.handshake_timeout)
    }

    async fn negotiate(
        &self,
        control: &mut ControlChannel,
        serial: &mut SerialChannel,
    ) -> Result<Negotiated> {
        control.connect(&self.host, self.control_port).await?;
        control
            .login(&self.username, &self.password, &self.program)
            .await?;

        let info = control
            .capabilities()
            .await?
            .radios
            .into_iter()
            .next()
            .ok_or_else(|| Error::Transport("radio advertised no radios".into()))?;

        // Bind first so the request can name our serial port.
        let serial_transport = UdpTransport::bind(&self.bind_addr).await?;
        let streams = control
            .request_connection(ConnectionRequest {
                guid: info.guid,
                name: info.name.clone(),
                username: self.username.clone(),
                civ_port: u32::from(serial_transport.local_addr().port()),
                ..ConnectionRequest::default()
            })
            .await?;

        let civ_port = match (self.serial_port, streams.civ_port) {
            (Some(port), _) => port,
            (None, 0) => self.control_port.wrapping_add(1),
            (None, port) => port,
        };
        let remote = UdpTransport::resolve(&self.host, civ_port).await?;
        serial_transport.connect(remote).await?;
        serial
            .session_mut()
            .connect_with_transport(Box::new(serial_transport))
            .await?;

        Ok(Negotiated { info, streams })
    }
}

struct Negotiated {
    info: RadioInfo,
    streams: ConnectionResponse,
}

fn forward_events(
    channel: ChannelKind,
    mut rx: broadcast::Receiver<SessionEvent>,
    tx: &broadcast::Sender<RadioEvent>,
    cancel: &CancellationToken,
) {
    let tx = tx.clone();
    let cancel = cancel.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Ok(event) => {
                        let _ = tx.send(RadioEvent { channel, event });
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(%channel, skipped, "radio event forwarder lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    });
}

/// A connected, logged-in radio.
pub struct Radio {
    control: ControlChannel,
    serial: SerialChannel,
    info: RadioInfo,
    streams: ConnectionResponse,
    civ_address: u8,
    event_tx: broadcast::Sender<RadioEvent>,
    forwarders: CancellationToken,
}

impl Radio {
    /// Start a [`RadioBuilder`].
    pub fn builder(host: &str) -> RadioBuilder {
        RadioBuilder::new(host)
    }

    /// The radio record selected from the capabilities response.
    pub fn info(&self) -> &RadioInfo {
        &self.info
    }

    /// Ports granted by the connection response.
    pub fn streams(&self) -> &ConnectionResponse {
        &self.streams
    }

    /// CI-V address commands are sent to.
    pub fn civ_address(&self) -> u8 {
        self.civ_address
    }

    /// The control channel client.
    pub fn control(&mut self) -> &mut ControlChannel {
        &mut self.control
    }

    /// The serial channel client.
    pub fn serial(&mut self) -> &mut SerialChannel {
        &mut self.serial
    }

    /// Events from both sessions.
    pub fn subscribe(&self) -> broadcast::Receiver<RadioEvent> {
        self.event_tx.subscribe()
    }

    /// Send a CI-V command to the radio.
    pub async fn send(&mut self, command: DecodedCommand) -> Result<()> {
        let message = self.address(command);
        self.serial.send_civ(&message).await
    }

    /// Send a CI-V command and wait for the radio's answer to it. A NAK
    /// from the radio is [`Error::Rejected`].
    pub async fn request(&mut self, command: DecodedCommand) -> Result<CivMessage> {
        let message = self.address(command);
        self.serial.request_civ(&message).await
    }

    /// Log out and close both sessions.
    ///
    /// Logout is best effort; both sessions are closed regardless.
    pub async fn disconnect(&mut self) -> Result<()> {
        self.serial.disconnect().await?;
        if let Err(e) = self.control.logout(self.info.guid).await {
            tracing::warn!(error = %e, "logout not acknowledged");
        }
        self.control.disconnect().await
    }

    fn address(&self, command: DecodedCommand) -> CivMessage {
        CivMessage {
            destination: self.civ_address,
            source: CONTROLLER_ADDR,
            command,
        }
    }
}

impl Drop for Radio {
    fn drop(&mut self) {
        self.forwarders.cancel();
    }
}
