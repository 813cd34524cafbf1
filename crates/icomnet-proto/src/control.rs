//! Control channel codec.
//!
//! The control channel negotiates a session with the radio: login,
//! capability discovery, opening the serial and audio streams, and
//! logout. Its messages ride inside transport `Data` bodies and, unlike
//! the transport layer, are big-endian throughout.
//!
//! ```text
//!  0     2      4    5    6     8     10         12      16
//! +-----+------+----+----+-----+-----+----------+-------+--------
//! |resv |length|type|req |seq  |resv |token_req |token  | body...
//! +-----+------+----+----+-----+-----+----------+-------+--------
//! ```
//!
//! `length` counts the control header plus body. Bodies are fixed-size
//! records selected by `type` and, for requests and responses, by `req`.

use std::fmt;
use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, BytesMut};
use icomnet_core::{Error, Result, ensure_len};

use crate::cipher::{self, CREDENTIAL_LEN};

/// Size of the control header in bytes.
pub const CONTROL_HEADER_SIZE: usize = 0x10;
/// Login request body size.
pub const LOGIN_REQUEST_SIZE: usize = 96;
/// Login response body size.
pub const LOGIN_RESPONSE_SIZE: usize = 64;
/// Logout request and response body size.
pub const LOGOUT_SIZE: usize = 32;
/// Connection request body size.
pub const CONNECTION_REQUEST_SIZE: usize = 112;
/// Connection response body size.
pub const CONNECTION_RESPONSE_SIZE: usize = 48;
/// Status body size.
pub const STATUS_SIZE: usize = 112;
/// Fixed part of a capabilities response, before the radio records.
pub const CAPABILITIES_HEADER_SIZE: usize = 34;
/// Size of one radio record in a capabilities response.
pub const RADIO_RECORD_SIZE: usize = 102;

const TYPE_REQUEST: u8 = 0x01;
const TYPE_RESPONSE: u8 = 0x02;
const TYPE_STATUS: u8 = 0x03;

const REQ_LOGIN: u8 = 0x00;
const REQ_LOGOUT: u8 = 0x01;
const REQ_CAPABILITIES: u8 = 0x02;
const REQ_CONNECTION: u8 = 0x03;

/// A 16-byte identifier, displayed as `8-4-4-4-12` hex.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Guid(pub [u8; 16]);

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Control replies a caller can wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    /// Answer to a login request.
    LoginResponse,
    /// Answer to a logout request.
    LogoutResponse,
    /// Answer to a capabilities request.
    CapabilitiesResponse,
    /// Answer to a connection request.
    ConnectionResponse,
    /// Unsolicited radio status.
    Status,
}

/// Login request: enciphered credentials plus the client's program name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginRequest {
    /// Plaintext username (enciphered on the wire).
    pub username: String,
    /// Plaintext password (enciphered on the wire).
    pub password: String,
    /// Client program name.
    pub program: String,
}

/// Login response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginResponse {
    /// Authentication id assigned by the radio.
    pub auth_id: u16,
    /// Zero on success.
    pub error: u32,
    /// Connection type label, e.g. `"FTTH"`.
    pub connection: String,
}

impl LoginResponse {
    /// Whether the radio accepted the credentials.
    pub fn is_success(&self) -> bool {
        self.error == 0
    }
}

/// Logout request or response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Logout {
    /// Radio GUID.
    pub guid: Guid,
    /// Request or result code.
    pub code: u32,
}

/// One radio advertised in a capabilities response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RadioInfo {
    /// Radio GUID, used when requesting a connection.
    pub guid: Guid,
    /// Radio model name.
    pub name: String,
    /// Audio device name.
    pub audio: String,
    /// Connection type.
    pub connection_type: u16,
    /// CI-V address of the radio.
    pub civ_address: u8,
    /// Supported receive sample rates.
    pub rx_sample: u16,
    /// Supported transmit sample rates.
    pub tx_sample: u16,
    /// Feature enable flag.
    pub enable_a: u8,
    /// Feature enable flag.
    pub enable_b: u8,
    /// Feature enable flag.
    pub enable_c: u8,
    /// Baud rate of the virtual serial port.
    pub bitrate: u32,
    /// Capability flags.
    pub cap_f: u16,
    /// Capability flags.
    pub cap_g: u16,
}

/// Capabilities response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Radios reachable through this control channel.
    pub radios: Vec<RadioInfo>,
}

/// Request to open the serial and audio streams.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionRequest {
    /// Radio GUID from [`RadioInfo::guid`].
    pub guid: Guid,
    /// Radio name.
    pub name: String,
    /// Plaintext username (enciphered on the wire).
    pub username: String,
    /// Enable receive audio.
    pub rx_enable: u8,
    /// Enable transmit audio.
    pub tx_enable: u8,
    /// Receive codec.
    pub rx_codec: u8,
    /// Transmit codec.
    pub tx_codec: u8,
    /// Receive sample rate.
    pub rx_sample: u32,
    /// Transmit sample rate.
    pub tx_sample: u32,
    /// Local port for the serial stream.
    pub civ_port: u32,
    /// Local port for the audio stream.
    pub audio_port: u32,
    /// Transmit buffer length.
    pub tx_buffer: u32,
    /// Conversion flag.
    pub convert: u8,
}

/// Answer to a connection request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionResponse {
    /// Radio GUID.
    pub guid: Guid,
    /// Zero on success.
    pub error: u32,
    /// Nonzero when the radio is dropping the connection.
    pub disconnect: u8,
    /// Radio port serving the serial stream.
    pub civ_port: u16,
    /// Radio port serving the audio stream.
    pub audio_port: u16,
}

/// Radio status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// Header request code; radios normally send zero.
    pub request_code: u8,
    /// Radio GUID.
    pub guid: Guid,
    /// Radio name.
    pub name: String,
    /// Nonzero when another client holds the radio.
    pub busy: u32,
    /// Program name of the current client.
    pub program: String,
    /// Address of the current client.
    pub ip: Ipv4Addr,
}

impl Default for Status {
    fn default() -> Self {
        Status {
            request_code: 0,
            guid: Guid::default(),
            name: String::new(),
            busy: 0,
            program: String::new(),
            ip: Ipv4Addr::UNSPECIFIED,
        }
    }
}

/// A control body, selected by `(type, request)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlBody {
    /// Client login.
    LoginRequest(LoginRequest),
    /// Login result.
    LoginResponse(LoginResponse),
    /// Client logout.
    LogoutRequest(Logout),
    /// Logout result.
    LogoutResponse(Logout),
    /// Capabilities query; the body is opaque.
    CapabilitiesRequest(Vec<u8>),
    /// Radio capabilities.
    CapabilitiesResponse(Capabilities),
    /// Open the serial and audio streams.
    ConnectionRequest(ConnectionRequest),
    /// Stream ports.
    ConnectionResponse(ConnectionResponse),
    /// Radio status.
    Status(Status),
    /// Unknown `(type, request)` pair; the body is kept raw.
    Unknown {
        /// Header type code.
        type_code: u8,
        /// Header request code.
        request_code: u8,
        /// Body bytes.
        payload: Vec<u8>,
    },
}

impl ControlBody {
    /// Header `type` code.
    pub fn type_code(&self) -> u8 {
        match self {
            ControlBody::LoginRequest(_)
            | ControlBody::LogoutRequest(_)
            | ControlBody::CapabilitiesRequest(_)
            | ControlBody::ConnectionRequest(_) => TYPE_REQUEST,
            ControlBody::LoginResponse(_)
            | ControlBody::LogoutResponse(_)
            | ControlBody::CapabilitiesResponse(_)
            | ControlBody::ConnectionResponse(_) => TYPE_RESPONSE,
            ControlBody::Status(_) => TYPE_STATUS,
            ControlBody::Unknown { type_code, .. } => *type_code,
        }
    }

    /// Header `request` code. Status messages carry their own.
    pub fn request_code(&self) -> u8 {
        match self {
            ControlBody::LoginRequest(_) | ControlBody::LoginResponse(_) => REQ_LOGIN,
            ControlBody::LogoutRequest(_) | ControlBody::LogoutResponse(_) => REQ_LOGOUT,
            ControlBody::CapabilitiesRequest(_) | ControlBody::CapabilitiesResponse(_) => {
                REQ_CAPABILITIES
            }
            ControlBody::ConnectionRequest(_) | ControlBody::ConnectionResponse(_) => {
                REQ_CONNECTION
            }
            ControlBody::Status(s) => s.request_code,
            ControlBody::Unknown { request_code, .. } => *request_code,
        }
    }

    /// The reply kind this body represents, if it is a reply.
    pub fn kind(&self) -> Option<ControlKind> {
        match self {
            ControlBody::LoginResponse(_) => Some(ControlKind::LoginResponse),
            ControlBody::LogoutResponse(_) => Some(ControlKind::LogoutResponse),
            ControlBody::CapabilitiesResponse(_) => Some(ControlKind::CapabilitiesResponse),
            ControlBody::ConnectionResponse(_) => Some(ControlKind::ConnectionResponse),
            ControlBody::Status(_) => Some(ControlKind::Status),
            _ => None,
        }
    }
}

/// One control channel message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    /// Control-layer sequence number.
    pub sequence: u16,
    /// Random token chosen by the client at login.
    pub token_request: u16,
    /// Token granted by the radio.
    pub token: u32,
    /// Message body.
    pub body: ControlBody,
}

impl ControlMessage {
    /// Create a message.
    pub fn new(sequence: u16, token_request: u16, token: u32, body: ControlBody) -> Self {
        ControlMessage {
            sequence,
            token_request,
            token,
            body,
        }
    }

    /// Serialize the message, recomputing `length`.
    ///
    /// Fails if a string does not fit its field or a credential cannot be
    /// enciphered.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut body = BytesMut::new();
        encode_body(&self.body, &mut body)?;

        let length = CONTROL_HEADER_SIZE + body.len();
        let length = u16::try_from(length)
            .map_err(|_| Error::Encode(format!("control message of {length} bytes")))?;

        let mut buf = BytesMut::with_capacity(usize::from(length));
        buf.put_bytes(0, 2);
        buf.put_u16(length);
        buf.put_u8(self.body.type_code());
        buf.put_u8(self.body.request_code());
        buf.put_u16(self.sequence);
        buf.put_bytes(0, 2);
        buf.put_u16(self.token_request);
        buf.put_u32(self.token);
        buf.put_slice(&body);
        Ok(buf.to_vec())
    }

    /// Parse a control message from a transport `Data` payload.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < CONTROL_HEADER_SIZE {
            return Err(Error::MalformedHeader(format!(
                "control message is {} bytes, header needs {CONTROL_HEADER_SIZE}",
                buf.len()
            )));
        }

        let mut hdr = &buf[..CONTROL_HEADER_SIZE];
        hdr.advance(2);
        let length = usize::from(hdr.get_u16());
        let type_code = hdr.get_u8();
        let request_code = hdr.get_u8();
        let sequence = hdr.get_u16();
        hdr.advance(2);
        let token_request = hdr.get_u16();
        let token = hdr.get_u32();

        if length < CONTROL_HEADER_SIZE {
            return Err(Error::MalformedHeader(format!(
                "declared control length {length} is shorter than the header"
            )));
        }
        ensure_len(buf, length)?;

        let body = decode_body(type_code, request_code, &buf[CONTROL_HEADER_SIZE..length])?;
        Ok(ControlMessage {
            sequence,
            token_request,
            token,
            body,
        })
    }
}

fn encode_body(body: &ControlBody, buf: &mut BytesMut) -> Result<()> {
    match body {
        ControlBody::LoginRequest(r) => {
            buf.put_bytes(0, 32);
            put_credential(buf, &r.username)?;
            put_credential(buf, &r.password)?;
            put_str(buf, &r.program, 16)?;
            buf.put_bytes(0, 16);
        }
        ControlBody::LoginResponse(r) => {
            buf.put_u16(r.auth_id);
            buf.put_bytes(0, 14);
            buf.put_u32(r.error);
            buf.put_bytes(0, 12);
            put_str(buf, &r.connection, 16)?;
            buf.put_bytes(0, 16);
        }
        ControlBody::LogoutRequest(l) | ControlBody::LogoutResponse(l) => {
            buf.put_slice(&l.guid.0);
            buf.put_u32(l.code);
            buf.put_bytes(0, 12);
        }
        ControlBody::CapabilitiesRequest(p) => buf.put_slice(p),
        ControlBody::CapabilitiesResponse(c) => {
            let count = u16::try_from(c.radios.len())
                .map_err(|_| Error::Encode(format!("{} radios", c.radios.len())))?;
            buf.put_bytes(0, 32);
            buf.put_u16(count);
            for radio in &c.radios {
                put_radio(buf, radio)?;
            }
        }
        ControlBody::ConnectionRequest(r) => {
            buf.put_slice(&r.guid.0);
            buf.put_bytes(0, 16);
            put_str(buf, &r.name, 32)?;
            put_credential(buf, &r.username)?;
            buf.put_u8(r.rx_enable);
            buf.put_u8(r.tx_enable);
            buf.put_u8(r.rx_codec);
            buf.put_u8(r.tx_codec);
            buf.put_u32(r.rx_sample);
            buf.put_u32(r.tx_sample);
            buf.put_u32(r.civ_port);
            buf.put_u32(r.audio_port);
            buf.put_u32(r.tx_buffer);
            buf.put_u8(r.convert);
            buf.put_bytes(0, 7);
        }
        ControlBody::ConnectionResponse(r) => {
            buf.put_slice(&r.guid.0);
            buf.put_u32(r.error);
            buf.put_bytes(0, 12);
            buf.put_u8(r.disconnect);
            buf.put_bytes(0, 1);
            buf.put_u16(r.civ_port);
            buf.put_bytes(0, 2);
            buf.put_u16(r.audio_port);
            buf.put_bytes(0, 8);
        }
        ControlBody::Status(s) => {
            buf.put_slice(&s.guid.0);
            buf.put_bytes(0, 16);
            put_str(buf, &s.name, 32)?;
            buf.put_u32(s.busy);
            put_str(buf, &s.program, 16)?;
            buf.put_bytes(0, 16);
            buf.put_u32(u32::from(s.ip));
            buf.put_bytes(0, 8);
        }
        ControlBody::Unknown { payload, .. } => buf.put_slice(payload),
    }
    Ok(())
}

fn put_radio(buf: &mut BytesMut, r: &RadioInfo) -> Result<()> {
    buf.put_slice(&r.guid.0);
    put_str(buf, &r.name, 32)?;
    put_str(buf, &r.audio, 32)?;
    buf.put_u16(r.connection_type);
    buf.put_u8(r.civ_address);
    buf.put_u16(r.rx_sample);
    buf.put_u16(r.tx_sample);
    buf.put_u8(r.enable_a);
    buf.put_u8(r.enable_b);
    buf.put_u8(r.enable_c);
    buf.put_u32(r.bitrate);
    buf.put_u16(r.cap_f);
    buf.put_u8(0);
    buf.put_u16(r.cap_g);
    buf.put_bytes(0, 3);
    Ok(())
}

fn decode_body(type_code: u8, request_code: u8, mut body: &[u8]) -> Result<ControlBody> {
    let b = &mut body;
    let decoded = match (type_code, request_code) {
        (TYPE_REQUEST, REQ_LOGIN) => {
            ensure_len(*b, LOGIN_REQUEST_SIZE)?;
            b.advance(32);
            let username = get_credential(b);
            let password = get_credential(b);
            let program = get_str(b, 16);
            ControlBody::LoginRequest(LoginRequest {
                username,
                password,
                program,
            })
        }
        (TYPE_RESPONSE, REQ_LOGIN) => {
            ensure_len(*b, LOGIN_RESPONSE_SIZE)?;
            let auth_id = b.get_u16();
            b.advance(14);
            let error = b.get_u32();
            b.advance(12);
            let connection = get_str(b, 16);
            ControlBody::LoginResponse(LoginResponse {
                auth_id,
                error,
                connection,
            })
        }
        (TYPE_REQUEST | TYPE_RESPONSE, REQ_LOGOUT) => {
            ensure_len(*b, LOGOUT_SIZE)?;
            let logout = Logout {
                guid: get_guid(b),
                code: b.get_u32(),
            };
            if type_code == TYPE_REQUEST {
                ControlBody::LogoutRequest(logout)
            } else {
                ControlBody::LogoutResponse(logout)
            }
        }
        (TYPE_REQUEST, REQ_CAPABILITIES) => ControlBody::CapabilitiesRequest(b.to_vec()),
        (TYPE_RESPONSE, REQ_CAPABILITIES) => {
            ensure_len(*b, CAPABILITIES_HEADER_SIZE)?;
            b.advance(32);
            let count = usize::from(b.get_u16());
            ensure_len(*b, count * RADIO_RECORD_SIZE)?;
            let radios = (0..count).map(|_| get_radio(b)).collect();
            ControlBody::CapabilitiesResponse(Capabilities { radios })
        }
        (TYPE_REQUEST, REQ_CONNECTION) => {
            ensure_len(*b, CONNECTION_REQUEST_SIZE)?;
            let guid = get_guid(b);
            b.advance(16);
            let name = get_str(b, 32);
            let username = get_credential(b);
            ControlBody::ConnectionRequest(ConnectionRequest {
                guid,
                name,
                username,
                rx_enable: b.get_u8(),
                tx_enable: b.get_u8(),
                rx_codec: b.get_u8(),
                tx_codec: b.get_u8(),
                rx_sample: b.get_u32(),
                tx_sample: b.get_u32(),
                civ_port: b.get_u32(),
                audio_port: b.get_u32(),
                tx_buffer: b.get_u32(),
                convert: b.get_u8(),
            })
        }
        (TYPE_RESPONSE, REQ_CONNECTION) => {
            ensure_len(*b, CONNECTION_RESPONSE_SIZE)?;
            let guid = get_guid(b);
            let error = b.get_u32();
            b.advance(12);
            let disconnect = b.get_u8();
            b.advance(1);
            let civ_port = b.get_u16();
            b.advance(2);
            let audio_port = b.get_u16();
            ControlBody::ConnectionResponse(ConnectionResponse {
                guid,
                error,
                disconnect,
                civ_port,
                audio_port,
            })
        }
        (TYPE_STATUS, _) => {
            ensure_len(*b, STATUS_SIZE)?;
            let guid = get_guid(b);
            b.advance(16);
            let name = get_str(b, 32);
            let busy = b.get_u32();
            let program = get_str(b, 16);
            b.advance(16);
            let ip = Ipv4Addr::from(b.get_u32());
            ControlBody::Status(Status {
                request_code,
                guid,
                name,
                busy,
                program,
                ip,
            })
        }
        _ => {
            tracing::debug!(
                error = %Error::UnknownType(u16::from(type_code) << 8 | u16::from(request_code)),
                "keeping control body raw"
            );
            ControlBody::Unknown {
                type_code,
                request_code,
                payload: b.to_vec(),
            }
        }
    };
    Ok(decoded)
}

fn get_radio(b: &mut &[u8]) -> RadioInfo {
    let guid = get_guid(b);
    let name = get_str(b, 32);
    let audio = get_str(b, 32);
    let connection_type = b.get_u16();
    let civ_address = b.get_u8();
    let rx_sample = b.get_u16();
    let tx_sample = b.get_u16();
    let enable_a = b.get_u8();
    let enable_b = b.get_u8();
    let enable_c = b.get_u8();
    let bitrate = b.get_u32();
    let cap_f = b.get_u16();
    b.advance(1);
    let cap_g = b.get_u16();
    b.advance(3);
    RadioInfo {
        guid,
        name,
        audio,
        connection_type,
        civ_address,
        rx_sample,
        tx_sample,
        enable_a,
        enable_b,
        enable_c,
        bitrate,
        cap_f,
        cap_g,
    }
}

fn get_guid(b: &mut &[u8]) -> Guid {
    let mut guid = [0u8; 16];
    b.copy_to_slice(&mut guid);
    Guid(guid)
}

/// Read a NUL-padded string field of `width` bytes.
fn get_str(b: &mut &[u8], width: usize) -> String {
    let field = &b[..width];
    let end = field.iter().position(|&c| c == 0).unwrap_or(width);
    let s = String::from_utf8_lossy(&field[..end]).into_owned();
    b.advance(width);
    s
}

fn put_str(buf: &mut BytesMut, s: &str, width: usize) -> Result<()> {
    if s.len() > width {
        return Err(Error::Encode(format!(
            "{s:?} is {} bytes, field holds {width}",
            s.len()
        )));
    }
    buf.put_slice(s.as_bytes());
    buf.put_bytes(0, width - s.len());
    Ok(())
}

/// Read an enciphered credential. An undecipherable field reads as empty.
fn get_credential(b: &mut &[u8]) -> String {
    let raw = get_str(b, CREDENTIAL_LEN);
    match cipher::decrypt(&raw) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "undecipherable credential field");
            String::new()
        }
    }
}

fn put_credential(buf: &mut BytesMut, plain: &str) -> Result<()> {
    let enc = cipher::encrypt(plain)?;
    put_str(buf, &enc, CREDENTIAL_LEN)
}
