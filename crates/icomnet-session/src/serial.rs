//! Serial channel client: CI-V commands over the radio's serial port.

use tracing::debug;

use icomnet_civ::{CivMessage, encode_civ, tree};
use icomnet_core::{ChannelKind, Error, Result};
use icomnet_proto::{SerialFrame, TransportBody};

use crate::events::{MessageTag, Payload};
use crate::session::Session;

/// Client for a serial-kind [`Session`].
pub struct SerialChannel {
    session: Session,
    sequence: u16,
}

impl SerialChannel {
    /// Wrap a session. The session must be configured for
    /// [`ChannelKind::Serial`].
    pub fn new(session: Session) -> Result<Self> {
        let channel = session.config().channel;
        if channel != ChannelKind::Serial {
            return Err(Error::Transport(format!(
                "serial client needs a serial session, got {channel}"
            )));
        }
        Ok(SerialChannel {
            session,
            sequence: 0,
        })
    }

    /// The underlying session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Mutable access, e.g. to connect the session.
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Send a CI-V command without waiting for an answer.
    pub async fn send_civ(&mut self, message: &CivMessage) -> Result<()> {
        let body = self.wrap(message)?;
        self.session.send(body, None).await?.wait().await?;
        Ok(())
    }

    /// Send a CI-V command and wait for the radio's frame carrying the
    /// same command.
    ///
    /// # Errors
    ///
    /// [`Error::Rejected`] when the radio answers with a NAK,
    /// [`Error::Timeout`] when it does not answer at all.
    pub async fn request_civ(&mut self, message: &CivMessage) -> Result<CivMessage> {
        let code = tree::standard()
            .command_code(&message.command.command)
            .ok_or_else(|| Error::UnknownCommand(message.command.command.clone()))?;
        let body = self.wrap(message)?;
        let inbound = self.session.request(body, MessageTag::Civ(code)).await?;
        match inbound.payload {
            Payload::Civ(reply) => Ok(reply),
            other => Err(Error::MalformedHeader(format!(
                "serial reply without CI-V payload: {other:?}"
            ))),
        }
    }

    /// Disconnect the underlying session.
    pub async fn disconnect(&mut self) -> Result<()> {
        self.session.disconnect().await
    }

    fn wrap(&mut self, message: &CivMessage) -> Result<TransportBody> {
        let civ = encode_civ(message)?;
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        debug!(
            command = %message.command.command,
            destination = message.destination,
            sequence,
            "sending CI-V"
        );
        Ok(TransportBody::Data(SerialFrame::civ(sequence, civ).encode()?))
    }
}
