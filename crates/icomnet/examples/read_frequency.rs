//! Log in to a networked Icom radio and read its frequency.
//!
//! Connects to the control port, logs in, opens the serial channel, then
//! reads the operating frequency and prints every session event for ten
//! seconds.
//!
//! # Usage
//!
//! ```sh
//! RUST_LOG=icomnet_session=debug \
//!     cargo run -p icomnet --example read_frequency -- 192.168.1.50 ic-705 secret
//! ```

use std::time::Duration;

use icomnet::civ::DecodedCommand;
use icomnet::session::{Radio, SessionEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "192.168.1.50".to_string());
    let username = args.next().unwrap_or_default();
    let password = args.next().unwrap_or_default();

    println!("Connecting to {}...", host);
    let mut radio = Radio::builder(&host)
        .username(&username)
        .password(&password)
        .build()
        .await?;

    let info = radio.info();
    println!(
        "Connected: {} (CI-V 0x{:02X}, serial port {})",
        info.name,
        radio.civ_address(),
        radio.streams().civ_port
    );

    let mut events = radio.subscribe();

    let reply = radio
        .request(DecodedCommand::new("read-operating-frequency"))
        .await?;
    match reply.command.field("frequency").and_then(|v| v.as_int()) {
        Some(hz) => println!("Frequency: {} Hz ({:.3} MHz)", hz, hz as f64 / 1_000_000.0),
        None => println!("Reply: {}", serde_json::to_string(&reply)?),
    }

    // Transceive traffic shows up as session messages.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Ok(event)) => match event.event {
                SessionEvent::Message(inbound) => {
                    println!("[{}] {:?}", event.channel, inbound.payload)
                }
                other => println!("[{}] {:?}", event.channel, other),
            },
            Ok(Err(_)) | Err(_) => break,
        }
    }

    radio.disconnect().await?;
    println!("Disconnected.");
    Ok(())
}
