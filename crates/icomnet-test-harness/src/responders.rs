//! Ready-made [`Responder`] scripts.

use icomnet_civ::{CivMessage, decode_civ, encode_civ};
use icomnet_proto::{
    Capabilities, ConnectionResponse, ControlBody, ControlMessage, LoginResponse, RadioInfo,
    SerialFrame,
};

use crate::mock_radio::Responder;

/// What a scripted control port answers.
#[derive(Debug, Clone, Default)]
pub struct ControlScript {
    /// Token granted at login.
    pub token: u32,
    /// Login error code; nonzero rejects the login.
    pub login_error: u32,
    /// Radios listed in the capabilities response.
    pub radios: Vec<RadioInfo>,
    /// Serial port granted by the connection response.
    pub civ_port: u16,
    /// Audio port granted by the connection response.
    pub audio_port: u16,
}

/// Answer login, capabilities, connection and logout requests per
/// `script`. Anything else goes unanswered.
pub fn control_responder(script: ControlScript) -> Responder {
    Box::new(move |payload| {
        let Ok(request) = ControlMessage::decode(payload) else {
            return Vec::new();
        };
        let mut token = request.token;
        let body = match request.body {
            ControlBody::LoginRequest(_) => {
                token = script.token;
                ControlBody::LoginResponse(LoginResponse {
                    auth_id: 1,
                    error: script.login_error,
                    connection: "FTTH".to_string(),
                })
            }
            ControlBody::CapabilitiesRequest(_) => ControlBody::CapabilitiesResponse(Capabilities {
                radios: script.radios.clone(),
            }),
            ControlBody::ConnectionRequest(req) => ControlBody::ConnectionResponse(ConnectionResponse {
                guid: req.guid,
                error: 0,
                disconnect: 0,
                civ_port: script.civ_port,
                audio_port: script.audio_port,
            }),
            ControlBody::LogoutRequest(logout) => ControlBody::LogoutResponse(logout),
            _ => return Vec::new(),
        };
        let reply = ControlMessage::new(request.sequence, request.token_request, token, body);
        reply.encode().map(|bytes| vec![bytes]).unwrap_or_default()
    })
}

/// Decode each serial payload as CI-V and send back whatever `answer`
/// returns for it.
pub fn civ_responder<F>(answer: F) -> Responder
where
    F: Fn(&CivMessage) -> Option<CivMessage> + Send + Sync + 'static,
{
    Box::new(move |payload| {
        let Ok(frame) = SerialFrame::decode(payload) else {
            return Vec::new();
        };
        let Ok(request) = decode_civ(&frame.payload) else {
            return Vec::new();
        };
        answer(&request)
            .and_then(|reply| encode_civ(&reply).ok())
            .and_then(|civ| SerialFrame::civ(frame.sequence, civ).encode().ok())
            .into_iter()
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use icomnet_civ::{CONTROLLER_ADDR, DecodedCommand};
    use icomnet_proto::{Guid, LoginRequest};

    #[test]
    fn control_login_grants_token() {
        let responder = control_responder(ControlScript {
            token: 0xCAFE,
            ..Default::default()
        });
        let login = ControlMessage::new(
            3,
            0x1111,
            0,
            ControlBody::LoginRequest(LoginRequest {
                username: "ic-705".into(),
                password: "secret".into(),
                program: "test".into(),
            }),
        );
        let answers = responder(&login.encode().unwrap());
        assert_eq!(answers.len(), 1);
        let reply = ControlMessage::decode(&answers[0]).unwrap();
        assert_eq!(reply.sequence, 3);
        assert_eq!(reply.token_request, 0x1111);
        assert_eq!(reply.token, 0xCAFE);
        assert!(matches!(reply.body, ControlBody::LoginResponse(ref r) if r.is_success()));
    }

    #[test]
    fn control_connection_grants_ports() {
        let responder = control_responder(ControlScript {
            civ_port: 50002,
            audio_port: 50003,
            ..Default::default()
        });
        let request = ControlMessage::new(
            0,
            0,
            0,
            ControlBody::ConnectionRequest(icomnet_proto::ConnectionRequest {
                guid: Guid([7; 16]),
                ..Default::default()
            }),
        );
        let reply = ControlMessage::decode(&responder(&request.encode().unwrap())[0]).unwrap();
        match reply.body {
            ControlBody::ConnectionResponse(r) => {
                assert_eq!(r.guid, Guid([7; 16]));
                assert_eq!(r.civ_port, 50002);
                assert_eq!(r.audio_port, 50003);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn control_ignores_garbage() {
        let responder = control_responder(ControlScript::default());
        assert!(responder(&[1, 2, 3]).is_empty());
    }

    #[test]
    fn civ_answers_in_kind() {
        let responder = civ_responder(|request| {
            (request.command.command == "read-operating-frequency").then(|| CivMessage {
                destination: request.source,
                source: request.destination,
                command: DecodedCommand::new("read-operating-frequency")
                    .with("frequency", 14_074_000i64),
            })
        });

        let civ = encode_civ(&CivMessage {
            destination: 0xA4,
            source: CONTROLLER_ADDR,
            command: DecodedCommand::new("read-operating-frequency"),
        })
        .unwrap();
        let answers = responder(&SerialFrame::civ(5, civ).encode().unwrap());
        assert_eq!(answers.len(), 1);

        let frame = SerialFrame::decode(&answers[0]).unwrap();
        assert_eq!(frame.sequence, 5);
        let reply = frame.civ_message().unwrap();
        assert_eq!(reply.destination, CONTROLLER_ADDR);
        assert_eq!(reply.command.field("frequency").and_then(|v| v.as_int()), Some(14_074_000));
    }
}
