//! Decode a hex-dumped datagram without touching the network.
//!
//! Takes one transport datagram as hex and prints the transport header,
//! then the control or CI-V payload inside it.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p icomnet --example decode_capture -- serial 1500000000...
//! ```

use icomnet::ChannelKind;
use icomnet::proto::{ControlMessage, SerialFrame, TransportBody, TransportFrame};

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let channel: ChannelKind = args
        .next()
        .unwrap_or_else(|| "control".to_string())
        .parse()?;
    let hex_dump: String = args.collect::<String>().split_whitespace().collect();
    let bytes = hex::decode(hex_dump)?;

    let frame = TransportFrame::decode(&bytes)?;
    println!(
        "{:?} seq={} {} -> {}",
        frame.body.kind(),
        frame.sequence,
        frame.sender,
        frame.receiver
    );

    let TransportBody::Data(payload) = &frame.body else {
        println!("{:?}", frame.body);
        return Ok(());
    };
    match channel {
        ChannelKind::Control => println!("{:#?}", ControlMessage::decode(payload)?),
        ChannelKind::Serial => {
            let serial = SerialFrame::decode(payload)?;
            println!("{:#?}", serial.civ_message()?);
        }
        ChannelKind::Audio => println!("{} bytes of audio", payload.len()),
    }
    Ok(())
}
