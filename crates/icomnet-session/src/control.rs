//! Control channel client: login, capabilities, stream negotiation.
//!
//! The control channel is the radio's well-known port (50001 by default).
//! After the transport handshake the client logs in, reads the radio list,
//! and asks the radio to open its serial and audio ports.

use tracing::debug;

use icomnet_core::{ChannelKind, Error, Result};
use icomnet_proto::{
    Capabilities, ConnectionRequest, ConnectionResponse, ControlBody, ControlKind, ControlMessage,
    Guid, LoginRequest, LoginResponse, Logout, TransportBody,
};

use crate::events::{MessageTag, Payload};
use crate::session::Session;

/// Client for a control-kind [`Session`].
pub struct ControlChannel {
    session: Session,
    sequence: u16,
    token_request: u16,
    token: u32,
}

impl ControlChannel {
    /// Wrap a session. The session must be configured for
    /// [`ChannelKind::Control`].
    pub fn new(session: Session) -> Result<Self> {
        let channel = session.config().channel;
        if channel != ChannelKind::Control {
            return Err(Error::Transport(format!(
                "control client needs a control session, got {channel}"
            )));
        }
        Ok(ControlChannel {
            session,
            sequence: 0,
            token_request: 0,
            token: 0,
        })
    }

    /// The underlying session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Token granted at login, zero before.
    pub fn token(&self) -> u32 {
        self.token
    }

    /// Connect the underlying session.
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        self.sequence = 0;
        self.token = 0;
        self.session.connect(host, port).await
    }

    /// Log in with plaintext credentials.
    ///
    /// Picks a fresh random token request and stores the token the radio
    /// grants.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCredential`] when the radio rejects the login or a
    /// credential cannot be enciphered.
    pub async fn login(
        &mut self,
        username: &str,
        password: &str,
        program: &str,
    ) -> Result<LoginResponse> {
        self.token_request = rand::random();
        debug!(program, token_request = self.token_request, "logging in");

        let body = ControlBody::LoginRequest(LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
            program: program.to_string(),
        });
        let reply = self.exchange(body, ControlKind::LoginResponse).await?;

        let ControlBody::LoginResponse(response) = reply.body else {
            return Err(unexpected(&reply));
        };
        if !response.is_success() {
            tracing::warn!(error = response.error, "radio rejected login");
            return Err(Error::InvalidCredential(format!(
                "login rejected by radio (error 0x{:08x})",
                response.error
            )));
        }

        self.token = reply.token;
        debug!(
            token = self.token,
            connection = %response.connection,
            "logged in"
        );
        Ok(response)
    }

    /// Read the list of radios behind this control port.
    pub async fn capabilities(&mut self) -> Result<Capabilities> {
        let reply = self
            .exchange(
                ControlBody::CapabilitiesRequest(Vec::new()),
                ControlKind::CapabilitiesResponse,
            )
            .await?;
        match reply.body {
            ControlBody::CapabilitiesResponse(caps) => {
                debug!(radios = caps.radios.len(), "capabilities received");
                Ok(caps)
            }
            _ => Err(unexpected(&reply)),
        }
    }

    /// Ask the radio to open its serial and audio streams.
    ///
    /// The response carries the radio ports to connect the serial and
    /// audio sessions to.
    pub async fn request_connection(
        &mut self,
        request: ConnectionRequest,
    ) -> Result<ConnectionResponse> {
        let reply = self
            .exchange(
                ControlBody::ConnectionRequest(request),
                ControlKind::ConnectionResponse,
            )
            .await?;
        match reply.body {
            ControlBody::ConnectionResponse(response) => {
                if response.error != 0 {
                    return Err(Error::Transport(format!(
                        "radio refused streams (error 0x{:08x})",
                        response.error
                    )));
                }
                debug!(
                    civ_port = response.civ_port,
                    audio_port = response.audio_port,
                    "streams granted"
                );
                Ok(response)
            }
            _ => Err(unexpected(&reply)),
        }
    }

    /// Log out of the radio identified by `guid`.
    pub async fn logout(&mut self, guid: Guid) -> Result<()> {
        let body = ControlBody::LogoutRequest(Logout { guid, code: 0 });
        self.exchange(body, ControlKind::LogoutResponse).await?;
        self.token = 0;
        debug!(%guid, "logged out");
        Ok(())
    }

    /// Disconnect the underlying session.
    pub async fn disconnect(&mut self) -> Result<()> {
        self.session.disconnect().await
    }

    async fn exchange(&mut self, body: ControlBody, reply: ControlKind) -> Result<ControlMessage> {
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);

        let message = ControlMessage::new(sequence, self.token_request, self.token, body);
        let inbound = self
            .session
            .request(
                TransportBody::Data(message.encode()?),
                MessageTag::Control(reply),
            )
            .await?;

        match inbound.payload {
            Payload::Control(msg) => Ok(msg),
            other => Err(Error::MalformedHeader(format!(
                "control reply without control payload: {other:?}"
            ))),
        }
    }
}

fn unexpected(reply: &ControlMessage) -> Error {
    Error::UnknownType((u16::from(reply.body.type_code()) << 8) | u16::from(reply.body.request_code()))
}
