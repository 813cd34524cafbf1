//! Control and serial channels, and the full radio bring-up, against
//! scripted mock radios.

use std::time::Duration;

use icomnet_civ::{CONTROLLER_ADDR, CivMessage, DecodedCommand};
use icomnet_core::{ChannelKind, ConnectionState, Error};
use icomnet_proto::{
    ConnectionRequest, ControlBody, ControlMessage, Guid, RadioInfo, SerialFrame, TransportBody,
    TransportFrame,
};
use icomnet_session::{ControlChannel, Radio, SerialChannel, SessionBuilder, SessionEvent};
use icomnet_test_harness::{ControlScript, MockRadio, civ_responder, control_responder};

const WAIT: Duration = Duration::from_secs(2);
const GUID: Guid = Guid([0x5A; 16]);

fn ic705() -> RadioInfo {
    RadioInfo {
        guid: GUID,
        name: "IC-705".to_string(),
        civ_address: 0xA4,
        ..RadioInfo::default()
    }
}

fn script(token: u32) -> ControlScript {
    ControlScript {
        token,
        radios: vec![ic705()],
        ..ControlScript::default()
    }
}

async fn control_mock(script: ControlScript) -> MockRadio {
    MockRadio::builder()
        .responder(control_responder(script))
        .start()
        .await
        .unwrap()
}

/// Answers frequency reads with 14.074 MHz and ignores everything else.
async fn serial_mock() -> MockRadio {
    MockRadio::builder()
        .responder(civ_responder(|request| {
            (request.command.command == "read-operating-frequency").then(|| CivMessage {
                destination: request.source,
                source: request.destination,
                command: DecodedCommand::new("read-operating-frequency")
                    .with("frequency", 14_074_000i64),
            })
        }))
        .start()
        .await
        .unwrap()
}

fn channel_session(channel: ChannelKind) -> icomnet_session::Session {
    SessionBuilder::new(channel)
        .bind_addr("127.0.0.1:0")
        .reply_timeout(Duration::from_millis(500))
        .build()
}

fn control_requests(radio: &MockRadio) -> Vec<ControlMessage> {
    radio
        .frames()
        .into_iter()
        .filter_map(|f| match f.body {
            TransportBody::Data(payload) => ControlMessage::decode(&payload).ok(),
            _ => None,
        })
        .collect()
}

fn civ_requests(frames: &[TransportFrame]) -> Vec<CivMessage> {
    frames
        .iter()
        .filter_map(|f| match &f.body {
            TransportBody::Data(payload) => SerialFrame::decode(payload).ok(),
            _ => None,
        })
        .filter_map(|frame| frame.civ_message().ok())
        .collect()
}

// ---------------------------------------------------------------
// Control channel
// ---------------------------------------------------------------

#[tokio::test]
async fn control_login_and_capabilities() {
    let radio = control_mock(script(0xCAFE_F00D)).await;
    let mut control = ControlChannel::new(channel_session(ChannelKind::Control)).unwrap();

    control.connect("127.0.0.1", radio.port()).await.unwrap();
    control.login("ic-705", "secret", "tests").await.unwrap();
    assert_eq!(control.token(), 0xCAFE_F00D);

    let caps = control.capabilities().await.unwrap();
    assert_eq!(caps.radios, vec![ic705()]);

    let sent = control_requests(&radio);
    match &sent[0].body {
        ControlBody::LoginRequest(login) => {
            assert_eq!(login.username, "ic-705");
            assert_eq!(login.password, "secret");
            assert_eq!(login.program, "tests");
        }
        other => panic!("expected login first, got {other:?}"),
    }
    assert_eq!(sent[1].token, 0xCAFE_F00D, "later requests carry the token");
    assert_eq!(sent[1].token_request, sent[0].token_request);
    assert!(sent[1].sequence > sent[0].sequence);

    control.disconnect().await.unwrap();
}

#[tokio::test]
async fn rejected_login_is_a_credential_error() {
    let radio = control_mock(ControlScript {
        login_error: 0xFEFF_FFFF,
        ..script(1)
    })
    .await;
    let mut control = ControlChannel::new(channel_session(ChannelKind::Control)).unwrap();
    control.connect("127.0.0.1", radio.port()).await.unwrap();

    let result = control.login("ic-705", "wrong", "tests").await;
    assert!(matches!(result, Err(Error::InvalidCredential(_))), "got {result:?}");
    assert_eq!(control.token(), 0);
}

#[tokio::test]
async fn connection_request_grants_ports_and_logout_is_acknowledged() {
    let radio = control_mock(ControlScript {
        civ_port: 50002,
        audio_port: 50003,
        ..script(7)
    })
    .await;
    let mut control = ControlChannel::new(channel_session(ChannelKind::Control)).unwrap();
    control.connect("127.0.0.1", radio.port()).await.unwrap();
    control.login("ic-705", "secret", "tests").await.unwrap();

    let granted = control
        .request_connection(ConnectionRequest {
            guid: GUID,
            name: "IC-705".into(),
            username: "ic-705".into(),
            civ_port: 40001,
            ..ConnectionRequest::default()
        })
        .await
        .unwrap();
    assert_eq!(granted.guid, GUID);
    assert_eq!(granted.civ_port, 50002);
    assert_eq!(granted.audio_port, 50003);

    control.logout(GUID).await.unwrap();
    assert!(
        control_requests(&radio)
            .iter()
            .any(|m| matches!(&m.body, ControlBody::LogoutRequest(l) if l.guid == GUID))
    );
}

#[test]
fn channel_clients_check_the_session_kind() {
    let serial = channel_session(ChannelKind::Serial);
    assert!(ControlChannel::new(serial).is_err());
    let control = channel_session(ChannelKind::Control);
    assert!(SerialChannel::new(control).is_err());
}

// ---------------------------------------------------------------
// Serial channel
// ---------------------------------------------------------------

#[tokio::test]
async fn serial_request_matches_reply_by_command() {
    let radio = serial_mock().await;
    let mut serial = SerialChannel::new(channel_session(ChannelKind::Serial)).unwrap();
    serial
        .session_mut()
        .connect("127.0.0.1", radio.port())
        .await
        .unwrap();

    let reply = serial
        .request_civ(&CivMessage {
            destination: 0xA4,
            source: CONTROLLER_ADDR,
            command: DecodedCommand::new("read-operating-frequency"),
        })
        .await
        .unwrap();
    assert_eq!(reply.source, 0xA4);
    assert_eq!(reply.destination, CONTROLLER_ADDR);
    assert_eq!(
        reply.command.field("frequency").and_then(|v| v.as_int()),
        Some(14_074_000)
    );
}

#[tokio::test]
async fn serial_request_for_unknown_command_fails_locally() {
    let radio = serial_mock().await;
    let mut serial = SerialChannel::new(channel_session(ChannelKind::Serial)).unwrap();
    serial
        .session_mut()
        .connect("127.0.0.1", radio.port())
        .await
        .unwrap();

    let result = serial
        .request_civ(&CivMessage {
            destination: 0xA4,
            source: CONTROLLER_ADDR,
            command: DecodedCommand::new("warp-drive"),
        })
        .await;
    assert!(matches!(result, Err(Error::UnknownCommand(_))), "got {result:?}");
}

#[tokio::test]
async fn serial_request_rejected_by_radio_fails_fast() {
    let radio = MockRadio::builder()
        .responder(civ_responder(|request| {
            Some(CivMessage {
                destination: request.source,
                source: request.destination,
                command: DecodedCommand::new("fail"),
            })
        }))
        .start()
        .await
        .unwrap();
    let mut serial = SerialChannel::new(channel_session(ChannelKind::Serial)).unwrap();
    serial
        .session_mut()
        .connect("127.0.0.1", radio.port())
        .await
        .unwrap();

    let started = tokio::time::Instant::now();
    let result = serial
        .request_civ(&CivMessage {
            destination: 0xA4,
            source: CONTROLLER_ADDR,
            command: DecodedCommand::new("read-operating-frequency"),
        })
        .await;
    assert!(matches!(result, Err(Error::Rejected)), "got {result:?}");
    assert!(started.elapsed() < Duration::from_millis(400));

    // The session stays usable after a rejection.
    assert_eq!(
        serial.session().state().await,
        ConnectionState::Connected
    );
}

#[tokio::test]
async fn serial_fire_and_forget_reaches_radio() {
    let radio = serial_mock().await;
    let mut serial = SerialChannel::new(channel_session(ChannelKind::Serial)).unwrap();
    serial
        .session_mut()
        .connect("127.0.0.1", radio.port())
        .await
        .unwrap();

    serial
        .send_civ(&CivMessage {
            destination: 0xA4,
            source: CONTROLLER_ADDR,
            command: DecodedCommand::new("set-operating-frequency").with("frequency", 7_074_000i64),
        })
        .await
        .unwrap();

    radio
        .wait_for_frame(|f| matches!(f.body, TransportBody::Data(_)), WAIT)
        .await
        .expect("data frame");
    let sent = civ_requests(&radio.frames());
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].command.command, "set-operating-frequency");
    assert_eq!(
        sent[0].command.field("frequency").and_then(|v| v.as_int()),
        Some(7_074_000)
    );
}

// ---------------------------------------------------------------
// Radio bring-up
// ---------------------------------------------------------------

#[tokio::test]
async fn radio_brings_up_both_channels() {
    let serial = serial_mock().await;
    let control = control_mock(ControlScript {
        civ_port: serial.port(),
        ..script(0x1234_5678)
    })
    .await;

    let mut radio = Radio::builder("127.0.0.1")
        .control_port(control.port())
        .username("ic-705")
        .password("secret")
        .bind_addr("127.0.0.1:0")
        .reply_timeout(Duration::from_millis(500))
        .build()
        .await
        .unwrap();

    assert_eq!(radio.info().name, "IC-705");
    assert_eq!(radio.civ_address(), 0xA4);
    assert_eq!(radio.streams().civ_port, serial.port());
    assert_eq!(radio.control().token(), 0x1234_5678);
    assert_eq!(
        radio.serial().session().state().await,
        ConnectionState::Connected
    );

    // The connection request names a real local serial port.
    let serial_snapshot = radio.serial().session().snapshot().await;
    let offered = control_requests(&control)
        .into_iter()
        .find_map(|m| match m.body {
            ControlBody::ConnectionRequest(req) => Some(req),
            _ => None,
        })
        .expect("connection request");
    assert_eq!(offered.guid, GUID);
    assert_eq!(offered.username, "ic-705");
    assert_ne!(offered.civ_port, 0);
    assert_eq!(serial_snapshot.state, ConnectionState::Connected);

    let reply = radio
        .request(DecodedCommand::new("read-operating-frequency"))
        .await
        .unwrap();
    assert_eq!(
        reply.command.field("frequency").and_then(|v| v.as_int()),
        Some(14_074_000)
    );
    let sent = civ_requests(&serial.frames());
    assert_eq!(sent[0].destination, 0xA4);
    assert_eq!(sent[0].source, CONTROLLER_ADDR);

    radio.disconnect().await.unwrap();
    assert!(
        control
            .wait_for_frame(|f| f.body == TransportBody::Disconnect, WAIT)
            .await
            .is_some()
    );
    assert!(
        serial
            .wait_for_frame(|f| f.body == TransportBody::Disconnect, WAIT)
            .await
            .is_some()
    );
    assert!(
        control_requests(&control)
            .iter()
            .any(|m| matches!(m.body, ControlBody::LogoutRequest(_)))
    );
}

#[tokio::test]
async fn radio_address_override_wins() {
    let serial = serial_mock().await;
    let control = control_mock(script(9)).await;

    let mut radio = Radio::builder("127.0.0.1")
        .control_port(control.port())
        .serial_port(serial.port())
        .civ_address(0x94)
        .bind_addr("127.0.0.1:0")
        .build()
        .await
        .unwrap();
    assert_eq!(radio.civ_address(), 0x94);

    radio
        .send(DecodedCommand::new("read-operating-frequency"))
        .await
        .unwrap();
    serial
        .wait_for_frame(|f| matches!(f.body, TransportBody::Data(_)), WAIT)
        .await
        .expect("data frame");
    assert_eq!(civ_requests(&serial.frames())[0].destination, 0x94);

    radio.disconnect().await.unwrap();
}

#[tokio::test]
async fn radio_events_are_tagged_by_channel() {
    let serial = serial_mock().await;
    let control = control_mock(ControlScript {
        civ_port: serial.port(),
        ..script(3)
    })
    .await;

    let mut radio = Radio::builder("127.0.0.1")
        .control_port(control.port())
        .bind_addr("127.0.0.1:0")
        .build()
        .await
        .unwrap();
    let mut events = radio.subscribe();

    radio.disconnect().await.unwrap();

    let mut closed = Vec::new();
    tokio::time::timeout(WAIT, async {
        while closed.len() < 2 {
            let event = events.recv().await.unwrap();
            if matches!(event.event, SessionEvent::Disconnected) {
                closed.push(event.channel);
            }
        }
    })
    .await
    .expect("both sessions report disconnect");
    assert!(closed.contains(&ChannelKind::Control));
    assert!(closed.contains(&ChannelKind::Serial));
}

#[tokio::test]
async fn radio_without_radios_fails_and_hangs_up() {
    let control = control_mock(ControlScript {
        radios: Vec::new(),
        ..script(3)
    })
    .await;

    let result = Radio::builder("127.0.0.1")
        .control_port(control.port())
        .bind_addr("127.0.0.1:0")
        .build()
        .await;
    assert!(matches!(result, Err(Error::Transport(_))));
    assert!(
        control
            .wait_for_frame(|f| f.body == TransportBody::Disconnect, WAIT)
            .await
            .is_some()
    );
}

#[tokio::test]
async fn radio_login_failure_surfaces() {
    let control = control_mock(ControlScript {
        login_error: 1,
        ..script(3)
    })
    .await;

    let result = Radio::builder("127.0.0.1")
        .control_port(control.port())
        .bind_addr("127.0.0.1:0")
        .build()
        .await;
    assert!(matches!(result, Err(Error::InvalidCredential(_))));
}
