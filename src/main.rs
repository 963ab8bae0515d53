use anyhow::Context;
use clap::Parser;
use deskcnc::{build_controller, build_dispatch, Config, LogFormat, LogLevel, StreamSummary};
use deskcnc_communication::list_ports;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "deskcnc",
    version,
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (built ", env!("BUILD_DATE"), ")"),
    about = "Stream G-code to a HoFaLab DeskCNC milling machine"
)]
struct Cli {
    /// Serial device of the controller (e.g. /dev/ttyUSB0, COM3).
    #[arg(required_unless_present = "list_ports")]
    serial_port: Option<String>,

    /// G-code program; read from standard input when omitted.
    gcode_file: Option<PathBuf>,

    /// Configuration file (.toml or .json).
    #[arg(long, value_name = "PATH", env = "DESKCNC_CONFIG")]
    config: Option<PathBuf>,

    /// Firmware image (hex text).
    #[arg(long, value_name = "PATH")]
    firmware: Option<PathBuf>,

    /// Expected firmware upload response (hex text).
    #[arg(long, value_name = "PATH")]
    firmware_response: Option<PathBuf>,

    /// Give up after this many transport faults in a row.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    max_consecutive_faults: Option<u32>,

    /// List candidate serial ports and exit.
    #[arg(long)]
    list_ports: bool,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,
}

fn main() {
    let cli = Cli::parse();
    let dispatch = build_dispatch(cli.log_format, cli.log_level);

    let code = tracing::dispatcher::with_default(&dispatch, || match run(&cli) {
        Ok(()) => 0,
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("error: {err:#}");
            1
        }
    });
    std::process::exit(code);
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    if cli.list_ports {
        for port in list_ports()? {
            println!("{}", port);
        }
        return Ok(());
    }

    let config = load_config(cli)?;

    let interrupt = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(Arc::clone(&interrupt))?;

    let mut controller = build_controller(&config, Arc::clone(&interrupt))?;
    controller
        .connect()
        .with_context(|| format!("bringing up {}", config.connection.port))?;

    let summary = match &cli.gcode_file {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("opening {}", path.display()))?;
            controller.stream(BufReader::new(file), &interrupt)?
        }
        None => controller.stream(io::stdin().lock(), &interrupt)?,
    };
    report(&summary);
    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config =
        Config::load_or_default(cli.config.as_deref()).context("loading configuration")?;

    if let Some(port) = &cli.serial_port {
        config.connection.port = port.clone();
    }
    if let Some(path) = &cli.firmware {
        config.firmware.image_path = path.clone();
    }
    if let Some(path) = &cli.firmware_response {
        config.firmware.response_path = path.clone();
    }
    if cli.max_consecutive_faults.is_some() {
        config.machine.max_consecutive_faults = cli.max_consecutive_faults;
    }

    config.validate()?;
    Ok(config)
}

fn install_ctrlc_handler(interrupt: Arc<AtomicBool>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        interrupt.store(true, Ordering::SeqCst);
    })
    .context("signal handler setup failed")
}

fn report(summary: &StreamSummary) {
    if summary.interrupted {
        tracing::info!("Stopped by interrupt");
    }
    tracing::info!(
        lines = summary.lines_read,
        executed = summary.lines_executed,
        skipped = summary.lines_skipped,
        recovered = summary.faults_recovered,
        "Program finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_port_and_file() {
        let cli = Cli::try_parse_from(["deskcnc", "/dev/ttyUSB0", "part.nc"])
            .expect("port and file should parse");
        assert_eq!(cli.serial_port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(cli.gcode_file, Some(PathBuf::from("part.nc")));
        assert_eq!(cli.log_level, LogLevel::Info);
    }

    #[test]
    fn port_is_required() {
        let err = Cli::try_parse_from(["deskcnc"]).expect_err("missing port should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn extra_positionals_rejected() {
        let err = Cli::try_parse_from(["deskcnc", "COM3", "a.nc", "b.nc"])
            .expect_err("three positionals should fail");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn list_ports_needs_no_port() {
        let cli = Cli::try_parse_from(["deskcnc", "--list-ports"]).expect("should parse");
        assert!(cli.list_ports);
    }

    #[test]
    fn zero_fault_guard_rejected() {
        assert!(Cli::try_parse_from(["deskcnc", "COM3", "--max-consecutive-faults", "0"]).is_err());
    }

    #[test]
    fn flags_override_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deskcnc.toml");
        std::fs::write(&path, "[connection]\nport = \"COM1\"\n[machine]\nmax_consecutive_faults = 9\n")
            .unwrap();

        let cli = Cli::try_parse_from([
            "deskcnc",
            "/dev/ttyACM0",
            "--config",
            path.to_str().unwrap(),
            "--firmware",
            "fw.txt",
            "--max-consecutive-faults",
            "4",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();

        assert_eq!(config.connection.port, "/dev/ttyACM0");
        assert_eq!(config.firmware.image_path, PathBuf::from("fw.txt"));
        assert_eq!(config.machine.max_consecutive_faults, Some(4));
    }
}
