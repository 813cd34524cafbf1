// icomnet test application -- CLI tool for poking at the Icom network
// protocol: decode captured datagrams, build CI-V frames, run the
// credential cipher, and talk to a real radio.
//
// Usage:
//   icomnet-test-app decode-civ FE FE E0 A4 03 00 40 07 14 00 FD
//   icomnet-test-app encode-civ '{"command":"set-operating-frequency","frequency":7074000}'
//   icomnet-test-app decode-net --channel serial 1500000000...
//   icomnet-test-app encrypt ic-705
//   icomnet-test-app connect --host 192.168.1.50 --username ic-705 --password secret
//   icomnet-test-app civ --host 192.168.1.50 --username ic-705 --password secret \
//       read-operating-frequency
//   icomnet-test-app civ --host 192.168.1.50 ... set-operating-frequency \
//       --fields '{"frequency":14074000}' --no-wait

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use icomnet::ChannelKind;
use icomnet::civ::{self, CONTROLLER_ADDR, CivMessage, DecodedCommand};
use icomnet::proto::{ControlMessage, SerialFrame, TransportBody, TransportFrame, cipher};
use icomnet::session::{ControlChannel, DEFAULT_CONTROL_PORT, Radio, SessionBuilder};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// icomnet test application -- exercises the protocol stack from the
/// command line.
#[derive(Parser)]
#[command(name = "icomnet-test-app", version, about)]
struct Cli {
    /// Log at debug level. RUST_LOG takes precedence when set.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print CI-V messages as compact JSON instead of pretty JSON.
    #[arg(long, global = true)]
    compact: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode a CI-V frame given as hex (spaces allowed).
    DecodeCiv {
        /// Frame bytes, e.g. `FE FE E0 A4 03 FD`.
        #[arg(required = true)]
        hex: Vec<String>,
    },

    /// Encode a CI-V frame from a JSON command mapping.
    EncodeCiv {
        /// `{"command": "...", <field>: <value>, ...}`
        json: String,

        /// Destination CI-V address (hex).
        #[arg(long, default_value = "A4", value_parser = parse_hex_u8)]
        to: u8,

        /// Source CI-V address (hex).
        #[arg(long, default_value = "E0", value_parser = parse_hex_u8)]
        from: u8,
    },

    /// Decode a captured network datagram given as hex.
    DecodeNet {
        /// Which channel the datagram was captured on.
        #[arg(long, default_value = "control")]
        channel: ChannelKind,

        /// Datagram bytes.
        #[arg(required = true)]
        hex: Vec<String>,
    },

    /// Encipher a credential.
    Encrypt { text: String },

    /// Decipher a credential.
    Decrypt { text: String },

    /// Connect to the control port, log in, and list the radios.
    Connect {
        #[command(flatten)]
        radio: RadioArgs,
    },

    /// Bring up a radio and send one CI-V command.
    Civ {
        #[command(flatten)]
        radio: RadioArgs,

        /// Command name, e.g. `read-operating-frequency`.
        command: String,

        /// Field values as a JSON object.
        #[arg(long)]
        fields: Option<String>,

        /// Override the radio's CI-V address (hex).
        #[arg(long, value_parser = parse_hex_u8)]
        civ_addr: Option<u8>,

        /// Send without waiting for an answer to the same command.
        #[arg(long)]
        no_wait: bool,
    },
}

#[derive(Args)]
struct RadioArgs {
    /// Radio host name or IP address.
    #[arg(long)]
    host: String,

    /// Control port.
    #[arg(long, default_value_t = DEFAULT_CONTROL_PORT)]
    port: u16,

    #[arg(long, default_value = "")]
    username: String,

    #[arg(long, default_value = "")]
    password: String,

    /// Program name sent at login.
    #[arg(long, default_value = "icomnet")]
    program: String,

    /// Reply timeout in milliseconds.
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,
}

/// Parse a hex string like "0x98" or "98" into a u8.
fn parse_hex_u8(s: &str) -> std::result::Result<u8, String> {
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u8::from_str_radix(s, 16).map_err(|e| format!("invalid hex byte: {e}"))
}

/// Join hex arguments and decode them, ignoring whitespace.
fn parse_hex_bytes(parts: &[String]) -> Result<Vec<u8>> {
    let digits: String = parts
        .iter()
        .flat_map(|p| p.split_whitespace())
        .collect();
    hex::decode(&digits).with_context(|| format!("invalid hex: {digits}"))
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ---------------------------------------------------------------------------
// Offline commands
// ---------------------------------------------------------------------------

fn print_civ(message: &CivMessage, compact: bool) -> Result<()> {
    let json = if compact {
        serde_json::to_string(message)?
    } else {
        serde_json::to_string_pretty(message)?
    };
    println!("{json}");
    Ok(())
}

fn cmd_decode_civ(hex: &[String], compact: bool) -> Result<()> {
    let bytes = parse_hex_bytes(hex)?;
    let message = civ::decode_civ(&bytes).context("not a CI-V frame")?;
    print_civ(&message, compact)
}

fn cmd_encode_civ(json: &str, to: u8, from: u8) -> Result<()> {
    let command: DecodedCommand =
        serde_json::from_str(json).context("expected a JSON object with a \"command\" key")?;
    let bytes = civ::encode_civ(&CivMessage {
        destination: to,
        source: from,
        command,
    })?;
    println!("{}", hex::encode_upper(bytes));
    Ok(())
}

fn cmd_decode_net(channel: ChannelKind, hex: &[String], compact: bool) -> Result<()> {
    let bytes = parse_hex_bytes(hex)?;
    let frame = TransportFrame::decode(&bytes).context("not a transport datagram")?;

    let kind = frame
        .body
        .kind()
        .map(|k| format!("{k:?}"))
        .unwrap_or_else(|| format!("0x{:04X}", frame.body.type_code()));
    println!(
        "{kind} seq={} {} -> {} ({} bytes)",
        frame.sequence,
        frame.sender,
        frame.receiver,
        bytes.len()
    );

    let TransportBody::Data(payload) = &frame.body else {
        println!("{:#?}", frame.body);
        return Ok(());
    };
    match channel {
        ChannelKind::Control => {
            let message = ControlMessage::decode(payload).context("not a control message")?;
            println!("{message:#?}");
        }
        ChannelKind::Serial => {
            let serial = SerialFrame::decode(payload).context("not a serial frame")?;
            println!("serial id=0x{:02X} seq={}", serial.id, serial.sequence);
            print_civ(&serial.civ_message()?, compact)?;
        }
        ChannelKind::Audio => println!("{} bytes of audio", payload.len()),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Radio commands
// ---------------------------------------------------------------------------

async fn cmd_connect(args: &RadioArgs) -> Result<()> {
    let session = SessionBuilder::new(ChannelKind::Control)
        .reply_timeout(Duration::from_millis(args.timeout_ms))
        .build();
    let mut control = ControlChannel::new(session)?;

    control
        .connect(&args.host, args.port)
        .await
        .with_context(|| format!("no answer from {}:{}", args.host, args.port))?;
    let login = control
        .login(&args.username, &args.password, &args.program)
        .await
        .context("login failed")?;
    println!(
        "Logged in: connection {} token 0x{:08x}",
        login.connection,
        control.token()
    );

    let caps = control
        .capabilities()
        .await
        .context("capabilities request failed")?;
    if caps.radios.is_empty() {
        println!("No radios advertised.");
    }
    for radio in &caps.radios {
        println!("Radio {}", radio.name);
        println!("  GUID:          {}", radio.guid);
        println!("  CI-V address:  0x{:02X}", radio.civ_address);
        println!("  Audio:         {}", radio.audio);
        println!("  Rx/Tx sample:  {}/{}", radio.rx_sample, radio.tx_sample);
        println!("  Bitrate:       {}", radio.bitrate);
    }

    control.disconnect().await?;
    Ok(())
}

async fn cmd_civ(
    args: &RadioArgs,
    command: &str,
    fields: Option<&str>,
    civ_addr: Option<u8>,
    no_wait: bool,
    compact: bool,
) -> Result<()> {
    let mut mapping: serde_json::Value = match fields {
        Some(json) => serde_json::from_str(json).context("--fields is not valid JSON")?,
        None => serde_json::json!({}),
    };
    mapping
        .as_object_mut()
        .context("--fields must be a JSON object")?
        .insert("command".to_string(), command.into());
    let command: DecodedCommand = serde_json::from_value(mapping)?;

    let mut builder = Radio::builder(&args.host)
        .control_port(args.port)
        .username(&args.username)
        .password(&args.password)
        .program(&args.program)
        .reply_timeout(Duration::from_millis(args.timeout_ms));
    if let Some(addr) = civ_addr {
        builder = builder.civ_address(addr);
    }
    let mut radio = builder
        .build()
        .await
        .with_context(|| format!("failed to bring up radio at {}", args.host))?;
    tracing::info!(
        radio = %radio.info().name,
        civ_address = radio.civ_address(),
        "radio ready"
    );

    let result = if no_wait {
        radio.send(command).await.map_err(Into::into)
    } else {
        match radio.request(command).await {
            Ok(reply) => print_civ(&reply, compact),
            Err(e) => Err(e.into()),
        }
    };
    radio.disconnect().await.ok();
    result
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Command::DecodeCiv { hex } => cmd_decode_civ(hex, cli.compact),
        Command::EncodeCiv { json, to, from } => cmd_encode_civ(json, *to, *from),
        Command::DecodeNet { channel, hex } => cmd_decode_net(*channel, hex, cli.compact),
        Command::Encrypt { text } => {
            println!("{}", cipher::encrypt(text)?);
            Ok(())
        }
        Command::Decrypt { text } => {
            println!("{}", cipher::decrypt(text)?);
            Ok(())
        }
        Command::Connect { radio } => cmd_connect(radio).await,
        Command::Civ {
            radio,
            command,
            fields,
            civ_addr,
            no_wait,
        } => {
            cmd_civ(
                radio,
                command,
                fields.as_deref(),
                *civ_addr,
                *no_wait,
                cli.compact,
            )
            .await
        }
    }
}
