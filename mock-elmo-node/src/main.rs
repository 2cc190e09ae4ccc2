//! # Mock Elmo Node
//!
//! Simulates an Elmo controller on a (virtual) CAN bus so the driver and the `elmo` CLI
//! can run without hardware.
//!
//! This mock node:
//! - Answers the `SN[2]` self-test with the firmware's reply pattern
//! - Stores motor enable, unit mode, speed and limit registers
//! - Moves a simulated position toward PA/PR targets after `BG`
//! - Reports position, active current and maximum current
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p mock-elmo-node -- --interface vcan0 --node-id 127
//! ```

mod pdo_server;
mod registers;

use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use elmo_pdo::{Frame, NodeId};
use socketcan::{CanFrame, CanSocket, Socket};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use pdo_server::PdoServer;
use registers::{NodeProfile, RegisterTable};

#[derive(Debug, Parser)]
#[command(name = "mock-elmo", about = "Simulated Elmo controller on SocketCAN")]
struct Args {
    /// CAN interface to listen on.
    #[arg(short, long, default_value = "vcan0")]
    interface: String,

    /// Node id of the simulated controller.
    #[arg(short, long, default_value_t = 127)]
    node_id: u8,

    /// TOML file with the initial register values.
    #[arg(short, long)]
    profile: Option<PathBuf>,

    /// Disable the noise added to current readings.
    #[arg(long)]
    no_noise: bool,
}

const TICK_INTERVAL: Duration = Duration::from_millis(10);

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let node = NodeId::new(args.node_id)?;

    let profile = match &args.profile {
        Some(path) => NodeProfile::load(path)
            .with_context(|| format!("loading profile {}", path.display()))?,
        None => NodeProfile::default(),
    };

    info!(interface = %args.interface, %node, "mock Elmo node starting");

    let socket = CanSocket::open(&args.interface).with_context(|| {
        format!(
            "opening {}; create it with `ip link add dev {0} type vcan && ip link set up {0}`",
            args.interface
        )
    })?;
    socket
        .set_read_timeout(TICK_INTERVAL)
        .context("setting the socket read timeout")?;

    let registers = RegisterTable::from_profile(&profile);
    info!("register table loaded with {} entries", registers.len());
    registers.log_summary();

    let mut server = PdoServer::new(node, registers, profile.position);
    if args.no_noise {
        server = server.without_noise();
    }

    info!(
        "listening for commands on COB-ID 0x{:03X}, replying on 0x{:03X}",
        node.tx_cob_id(),
        node.reply_cob_id()
    );

    let mut last_tick = Instant::now();
    loop {
        match socket.read_frame() {
            Ok(can_frame) => match Frame::try_from(&can_frame) {
                Ok(frame) => {
                    if frame.id() == node.nmt_cob_id() {
                        debug!(frame = %frame, "NMT");
                    } else if let Some(reply) = server.handle_frame(&frame) {
                        send(&socket, &reply);
                    }
                }
                Err(err) => debug!("ignoring frame: {}", err),
            },
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(err) => warn!("CAN read error: {}", err),
        }

        let elapsed = last_tick.elapsed();
        if elapsed >= TICK_INTERVAL {
            server.tick(elapsed);
            last_tick = Instant::now();
        }
    }
}

fn send(socket: &CanSocket, reply: &Frame) {
    match CanFrame::try_from(reply) {
        Ok(frame) => {
            if let Err(err) = socket.write_frame(&frame) {
                error!("failed to send reply: {}", err);
            }
        }
        Err(err) => error!("unencodable reply {}: {}", reply, err),
    }
}
