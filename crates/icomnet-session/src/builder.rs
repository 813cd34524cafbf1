//! SessionBuilder -- fluent configuration for [`Session`] instances.
//!
//! # Example
//!
//! ```no_run
//! use icomnet_core::ChannelKind;
//! use icomnet_session::SessionBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> icomnet_core::Result<()> {
//! let mut session = SessionBuilder::new(ChannelKind::Serial)
//!     .reply_timeout(Duration::from_millis(500))
//!     .build();
//! session.connect("192.168.1.50", 50002).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use icomnet_core::ChannelKind;

use crate::session::Session;

/// Default time a [`Completion`](crate::Completion) waits for its reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// Default bound on the whole Syn/Ready handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolved session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Which sub-protocol the session's data frames carry.
    pub channel: ChannelKind,
    /// Connection id advertised in the sender endpoint of every frame.
    pub local_id: u16,
    /// Local address to bind, e.g. `"0.0.0.0:0"`.
    pub bind_addr: String,
    /// How long a caller waits for a tagged reply.
    pub reply_timeout: Duration,
    /// Upper bound on `connect()` from Syn to Ready.
    pub handshake_timeout: Duration,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
    /// Capacity of the request channel into the IO task.
    pub request_capacity: usize,
}

/// Fluent builder for [`Session`].
///
/// Every setting has a default, so the simplest usage is
/// `SessionBuilder::new(ChannelKind::Control).build()`.
pub struct SessionBuilder {
    config: SessionConfig,
}

impl SessionBuilder {
    /// Start a builder for a session on `channel`.
    ///
    /// The local id defaults to a random value.
    pub fn new(channel: ChannelKind) -> Self {
        SessionBuilder {
            config: SessionConfig {
                channel,
                local_id: rand::random(),
                bind_addr: "0.0.0.0:0".to_string(),
                reply_timeout: DEFAULT_REPLY_TIMEOUT,
                handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
                event_capacity: 256,
                request_capacity: 32,
            },
        }
    }

    /// Set the local connection id.
    pub fn local_id(mut self, id: u16) -> Self {
        self.config.local_id = id;
        self
    }

    /// Set the local bind address (default `"0.0.0.0:0"`).
    pub fn bind_addr(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Set the reply timeout (default 2 s).
    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.config.reply_timeout = timeout;
        self
    }

    /// Set the handshake timeout (default 5 s).
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Set the event channel capacity (default 256).
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity.max(1);
        self
    }

    /// Set the request channel capacity (default 32).
    pub fn request_capacity(mut self, capacity: usize) -> Self {
        self.config.request_capacity = capacity.max(1);
        self
    }

    /// The configuration built so far.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Create a disconnected session.
    pub fn build(self) -> Session {
        Session::new(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let builder = SessionBuilder::new(ChannelKind::Control);
        let config = builder.config();
        assert_eq!(config.channel, ChannelKind::Control);
        assert_eq!(config.bind_addr, "0.0.0.0:0");
        assert_eq!(config.reply_timeout, Duration::from_secs(2));
        assert_eq!(config.handshake_timeout, Duration::from_secs(5));
        assert_eq!(config.event_capacity, 256);
        assert_eq!(config.request_capacity, 32);
    }

    #[test]
    fn setters_chain() {
        let builder = SessionBuilder::new(ChannelKind::Serial)
            .local_id(0x1234)
            .bind_addr("127.0.0.1:0")
            .reply_timeout(Duration::from_millis(250))
            .handshake_timeout(Duration::from_secs(1))
            .event_capacity(0)
            .request_capacity(8);
        let config = builder.config();
        assert_eq!(config.channel, ChannelKind::Serial);
        assert_eq!(config.local_id, 0x1234);
        assert_eq!(config.bind_addr, "127.0.0.1:0");
        assert_eq!(config.reply_timeout, Duration::from_millis(250));
        assert_eq!(config.handshake_timeout, Duration::from_secs(1));
        assert_eq!(config.event_capacity, 1, "broadcast needs capacity >= 1");
        assert_eq!(config.request_capacity, 8);
    }
}
