//! Turn a phone's gravity sensor feed into incremental G-code
//!
//! Connects to a sensor app streaming JSON over TCP and prints one `G1` move
//! per message, so tilting the phone jogs the machine:
//!
//! ```text
//! sensor2gcode 10.10.10.132 1336 | deskcnc /dev/ttyUSB0
//! ```

use anyhow::Context;
use clap::Parser;
use deskcnc::{build_dispatch, LogFormat, LogLevel};
use serde::Deserialize;
use std::io::Write;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::instrument::WithSubscriber;

#[derive(Parser, Debug)]
#[command(name = "sensor2gcode", version, about = "Gravity sensor to G-code bridge")]
struct Cli {
    /// Sensor host.
    host: String,

    /// Sensor TCP port.
    port: u16,

    /// Millimeters per unit of gravity.
    #[arg(long, default_value_t = 0.2)]
    scale: f64,

    /// Feed rate for the emitted moves (mm/min).
    #[arg(long, default_value_t = 1200.0)]
    feed: f64,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn")]
    log_level: LogLevel,
}

#[derive(Debug, Deserialize)]
struct SensorMessage {
    gravity: Reading,
}

#[derive(Debug, Deserialize)]
struct Reading {
    value: Vec<f64>,
}

/// `G1` lines for every complete message in `chunk`
///
/// Decoding stops at the first undecodable value; the rest of the chunk is
/// dropped.
fn moves_from_chunk(chunk: &[u8], scale: f64) -> Vec<String> {
    let mut moves = Vec::new();
    for message in serde_json::Deserializer::from_slice(chunk).into_iter::<SensorMessage>() {
        match message {
            Ok(SensorMessage {
                gravity: Reading { value },
            }) if value.len() >= 2 => {
                moves.push(format!("G1 X{} Y{}", -value[0] * scale, -value[1] * scale));
            }
            Ok(_) => tracing::debug!("Gravity reading without X and Y"),
            Err(e) => {
                tracing::debug!("Skipping undecodable message: {}", e);
                break;
            }
        }
    }
    moves
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut stream = TcpStream::connect((cli.host.as_str(), cli.port))
        .await
        .with_context(|| format!("connecting to {}:{}", cli.host, cli.port))?;
    tracing::info!("Connected to {}:{}", cli.host, cli.port);

    let mut out = std::io::stdout().lock();
    writeln!(out, "G91")?;
    writeln!(out, "F{}", cli.feed)?;

    let mut buf = [0u8; 1024];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            tracing::info!("Sensor closed the connection");
            return Ok(());
        }
        for line in moves_from_chunk(&buf[..n], cli.scale) {
            writeln!(out, "{}", line)?;
        }
        out.flush()?;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let dispatch = build_dispatch(LogFormat::Text, cli.log_level);
    run(cli).with_subscriber(dispatch).await
}
