//! Mock radio peer over loopback UDP.
//!
//! [`MockRadio`] binds a random localhost port and serves one client. It
//! answers `Syn` with `SynAck` and `Ready` with `Ready`, hands every data
//! payload to a [`Responder`], and records all decoded frames so tests
//! can assert on what the client sent.
//!
//! # Example
//!
//! ```no_run
//! use icomnet_test_harness::MockRadio;
//!
//! # async fn example() -> icomnet_core::Result<()> {
//! let radio = MockRadio::builder().id(0x4242).start().await?;
//! // point a session at 127.0.0.1:radio.port() ...
//! radio.send_ping(1, 0xFACE).await?;
//! radio.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use icomnet_core::{Endpoint, Error, Result};
use icomnet_proto::{TransportBody, TransportFrame};
use icomnet_transport::UdpTransport;

/// Maps one inbound data payload to zero or more data payloads to send
/// back.
pub type Responder = Box<dyn Fn(&[u8]) -> Vec<Vec<u8>> + Send + Sync>;

/// How long the receive loop blocks before checking for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Fluent builder for [`MockRadio`].
pub struct MockRadioBuilder {
    id: u16,
    initial_sequence: u16,
    answer_syn: bool,
    answer_ready: bool,
    responder: Option<Responder>,
}

impl MockRadioBuilder {
    fn new() -> Self {
        MockRadioBuilder {
            id: 0x7AD1,
            initial_sequence: 1,
            answer_syn: true,
            answer_ready: true,
            responder: None,
        }
    }

    /// Connection id the radio stamps in its frames.
    pub fn id(mut self, id: u16) -> Self {
        self.id = id;
        self
    }

    /// Sequence number carried by the `Ready` reply (default 1). Data
    /// frames continue from it.
    pub fn initial_sequence(mut self, sequence: u16) -> Self {
        self.initial_sequence = sequence;
        self
    }

    /// Never answer `Syn`, so handshakes time out.
    pub fn ignore_syn(mut self) -> Self {
        self.answer_syn = false;
        self
    }

    /// Answer `Syn` but never `Ready`.
    pub fn ignore_ready(mut self) -> Self {
        self.answer_ready = false;
        self
    }

    /// Script the answers to data frames.
    pub fn responder(mut self, responder: Responder) -> Self {
        self.responder = Some(responder);
        self
    }

    /// Bind and start serving.
    pub async fn start(self) -> Result<MockRadio> {
        let socket = Arc::new(UdpTransport::bind("127.0.0.1:0").await?);
        let addr = socket.local_addr();
        let endpoint = Endpoint::new(addr.port(), self.id);
        let shared = Arc::new(Mutex::new(Shared {
            client: None,
            client_endpoint: Endpoint::default(),
            data_sequence: self.initial_sequence,
            frames: Vec::new(),
        }));
        let cancel = CancellationToken::new();

        let server = Server {
            socket: Arc::clone(&socket),
            endpoint,
            shared: Arc::clone(&shared),
            initial_sequence: self.initial_sequence,
            answer_syn: self.answer_syn,
            answer_ready: self.answer_ready,
            responder: self.responder,
        };
        let task = tokio::spawn(server.run(cancel.clone()));

        tracing::debug!(addr = %addr, %endpoint, "mock radio listening");
        Ok(MockRadio {
            socket,
            addr,
            endpoint,
            shared,
            cancel,
            task: Some(task),
        })
    }
}

struct Shared {
    client: Option<SocketAddr>,
    client_endpoint: Endpoint,
    data_sequence: u16,
    frames: Vec<TransportFrame>,
}

/// A scripted radio on a loopback UDP port.
pub struct MockRadio {
    socket: Arc<UdpTransport>,
    addr: SocketAddr,
    endpoint: Endpoint,
    shared: Arc<Mutex<Shared>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl MockRadio {
    /// Start configuring a mock radio.
    pub fn builder() -> MockRadioBuilder {
        MockRadioBuilder::new()
    }

    /// Start a mock radio with default behavior and no responder.
    pub async fn start() -> Result<Self> {
        Self::builder().start().await
    }

    /// Address the mock is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Port the mock is bound to.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// The endpoint the mock stamps as sender.
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Every frame received so far, in order.
    pub fn frames(&self) -> Vec<TransportFrame> {
        lock(&self.shared).frames.clone()
    }

    /// Forget recorded frames.
    pub fn clear_frames(&self) {
        lock(&self.shared).frames.clear();
    }

    /// Poll the recorded frames until one matches `pred`.
    pub async fn wait_for_frame<F>(&self, pred: F, timeout: Duration) -> Option<TransportFrame>
    where
        F: Fn(&TransportFrame) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(frame) = lock(&self.shared).frames.iter().find(|f| pred(f)) {
                return Some(frame.clone());
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Send an arbitrary frame to the client.
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`] until the client has sent something.
    pub async fn send_frame(&self, sequence: u16, body: TransportBody) -> Result<()> {
        let (client, receiver) = {
            let shared = lock(&self.shared);
            (shared.client.ok_or(Error::NotConnected)?, shared.client_endpoint)
        };
        let frame = TransportFrame::new(sequence, self.endpoint, receiver, body);
        self.socket.send_to(&frame.encode(), client).await
    }

    /// Send a data payload using the next data sequence number.
    pub async fn send_data(&self, payload: Vec<u8>) -> Result<()> {
        let sequence = next_data_sequence(&self.shared);
        self.send_frame(sequence, TransportBody::Data(payload)).await
    }

    /// Send a ping request.
    pub async fn send_ping(&self, sequence: u16, ping_id: u32) -> Result<()> {
        self.send_frame(
            sequence,
            TransportBody::Ping {
                reply: false,
                ping_id,
            },
        )
        .await
    }

    /// Stop serving.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for MockRadio {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Server {
    socket: Arc<UdpTransport>,
    endpoint: Endpoint,
    shared: Arc<Mutex<Shared>>,
    initial_sequence: u16,
    answer_syn: bool,
    answer_ready: bool,
    responder: Option<Responder>,
}

impl Server {
    async fn run(self, cancel: CancellationToken) {
        let mut buf = vec![0u8; 65_536];
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                received = self.socket.recv_from(&mut buf, POLL_INTERVAL) => {
                    match received {
                        Ok((n, src)) => self.handle(src, &buf[..n]).await,
                        Err(Error::Timeout) => {}
                        Err(e) => tracing::debug!(error = %e, "mock radio receive failed"),
                    }
                }
            }
        }
    }

    async fn handle(&self, src: SocketAddr, datagram: &[u8]) {
        let frame = match TransportFrame::decode(datagram) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(error = %e, "mock radio got an undecodable datagram");
                return;
            }
        };

        let client_endpoint = frame.sender;
        let replies: Vec<(u16, TransportBody)> = {
            let mut shared = lock(&self.shared);
            shared.client = Some(src);
            shared.client_endpoint = client_endpoint;
            shared.frames.push(frame.clone());
            match &frame.body {
                TransportBody::Syn if self.answer_syn => vec![(0, TransportBody::SynAck)],
                TransportBody::Ready if self.answer_ready => {
                    vec![(self.initial_sequence, TransportBody::Ready)]
                }
                _ => Vec::new(),
            }
        };

        let mut replies = replies;
        if let (TransportBody::Data(payload), Some(responder)) = (&frame.body, &self.responder) {
            for answer in responder(payload) {
                let sequence = next_data_sequence(&self.shared);
                replies.push((sequence, TransportBody::Data(answer)));
            }
        }

        for (sequence, body) in replies {
            let reply = TransportFrame::new(sequence, self.endpoint, client_endpoint, body);
            if let Err(e) = self.socket.send_to(&reply.encode(), src).await {
                tracing::debug!(error = %e, "mock radio send failed");
            }
        }
    }
}

fn next_data_sequence(shared: &Mutex<Shared>) -> u16 {
    let mut shared = lock(shared);
    let sequence = shared.data_sequence;
    shared.data_sequence = shared.data_sequence.wrapping_add(1);
    sequence
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
