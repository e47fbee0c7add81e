//! `vislink`: talk to a camera over its serial command link.
//!
//! ```sh
//! vislink --port /dev/ttyACM0 cmd info
//! vislink --port /dev/ttyACM0 get /jevois/config/params.cfg --text
//! vislink --port /dev/ttyACM0 put ./script.cfg /jevois/config/script.cfg
//! vislink --mock console
//! ```
//!
//! Set `RUST_LOG=debug` to trace the link.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vislink_core::LinkConfig;
use vislink_core::constants::DEFAULT_BAUD_RATE;
use vislink_hardware::mock::MockCamera;
use vislink_hardware::{LinkDriver, LinkEvent, LinkHandle};
use vislink_protocol::{LineKind, Link, Outcome, Payload};

#[derive(Parser)]
#[command(name = "vislink", version, about = "Camera serial link client")]
struct Cli {
    /// Serial device, e.g. /dev/ttyACM0
    #[arg(long, required_unless_present = "mock")]
    port: Option<String>,

    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Link settings as JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Talk to an emulated camera instead of a port
    #[arg(long, default_value_t = false)]
    mock: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a command and print its reply
    Cmd {
        /// Command words, joined with spaces
        #[arg(required = true, trailing_var_arg = true)]
        words: Vec<String>,
    },
    /// Download a file from the camera
    Get {
        remote: String,
        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Treat the file as text and print it line by line
        #[arg(long, default_value_t = false)]
        text: bool,
    },
    /// Upload a local file to the camera
    Put { local: PathBuf, remote: String },
    /// Set a module parameter (setpar)
    Setpar { name: String, value: String },
    /// Set a camera control (setcam)
    Setcam { name: String, value: String },
    /// Interactive console: stdin lines go out untagged, device output is
    /// printed as it arrives
    Console,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => LinkConfig::load(path)
            .with_context(|| format!("loading link config {}", path.display()))?,
        None => LinkConfig::default(),
    };

    let handle = connect(&cli, &config)?;
    let result = run(&handle, cli.command).await;

    print_unsolicited(&handle).await?;
    let discarded = handle.shutdown().await.unwrap_or(0);
    if discarded > 0 {
        warn!(discarded, "Requests still pending at exit");
    }
    result
}

fn connect(cli: &Cli, config: &LinkConfig) -> Result<LinkHandle> {
    if cli.mock {
        info!("Using emulated camera");
        let (camera, output) = MockCamera::new();
        return Ok(LinkDriver::spawn(Link::with_config(camera, config)?, output));
    }
    let port = cli.port.as_deref().context("--port is required")?;
    open_serial(port, cli.baud, config)
}

#[cfg(feature = "hardware-serial")]
fn open_serial(port: &str, baud: u32, config: &LinkConfig) -> Result<LinkHandle> {
    use vislink_hardware::{SerialConfig, SerialTransport};

    let serial = SerialConfig {
        baud_rate: baud,
        ..SerialConfig::new(port)
    };
    let (transport, inbound) = SerialTransport::open(&serial)?;
    Ok(LinkDriver::spawn(Link::with_config(transport, config)?, inbound))
}

#[cfg(not(feature = "hardware-serial"))]
fn open_serial(port: &str, _baud: u32, _config: &LinkConfig) -> Result<LinkHandle> {
    bail!("cannot open {port}: built without the hardware-serial feature")
}

async fn run(handle: &LinkHandle, command: Command) -> Result<()> {
    match command {
        Command::Cmd { words } => {
            let outcome = handle.command(&words.join(" ")).await?;
            print_payload(finish(outcome)?, None)
        }
        Command::Get {
            remote,
            output,
            text,
        } => {
            let outcome = if text {
                handle.download_text_file(&remote).await?
            } else {
                handle.download_binary_file(&remote).await?
            };
            print_payload(finish(outcome)?, output)
        }
        Command::Put { local, remote } => {
            finish(handle.upload_local_file(&remote, &local).await?)?;
            info!(local = %local.display(), remote = %remote, "Upload complete");
            Ok(())
        }
        Command::Setpar { name, value } => {
            finish(handle.set_parameter(&name, &value).await?).map(drop)
        }
        Command::Setcam { name, value } => {
            finish(handle.set_camera_control(&name, &value).await?).map(drop)
        }
        Command::Console => console(handle).await,
    }
}

fn finish(outcome: Outcome) -> Result<Payload> {
    outcome
        .into_result()
        .or_else(|lines| bail!("camera reported: {}", lines.join(" | ")))
}

fn print_payload(payload: Payload, output: Option<PathBuf>) -> Result<()> {
    let bytes = match payload {
        Payload::Lines(lines) => lines.join("\n").into_bytes(),
        Payload::Bytes(bytes) => bytes.to_vec(),
    };
    match output {
        Some(path) => std::fs::write(&path, &bytes)
            .with_context(|| format!("writing {}", path.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
            Ok(())
        }
    }
}

async fn print_unsolicited(handle: &LinkHandle) -> Result<()> {
    let lines = match handle.drain_unsolicited().await {
        Ok(lines) => lines,
        Err(e) if e.is_disconnect() => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for line in lines {
        let kind = LineKind::classify(&line);
        let label = match kind {
            LineKind::Ok => "ok",
            LineKind::Debug => "debug",
            LineKind::Info => "info",
            LineKind::Error => "error",
            LineKind::Fatal => "fatal",
            LineKind::Plain => "",
        };
        if kind.is_error() {
            eprintln!("[{label}] {}", kind.body(&line));
        } else if label.is_empty() {
            println!("{line}");
        } else {
            println!("[{label}] {}", kind.body(&line));
        }
    }
    Ok(())
}

async fn console(handle: &LinkHandle) -> Result<()> {
    let mut events = handle.subscribe();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = stdin.next_line() => match line? {
                Some(text) => handle.write_line(text.trim_end()).await?,
                None => break,
            },
            event = events.recv() => match event {
                Ok(LinkEvent::LinesAvailable(_)) | Err(RecvError::Lagged(_)) => {
                    print_unsolicited(handle).await?;
                }
                Ok(LinkEvent::WriteFailed(reason)) => warn!(%reason, "Console write failed"),
                Ok(LinkEvent::Disconnected) | Err(RecvError::Closed) => {
                    bail!("camera disconnected")
                }
                Ok(_) => {}
            },
        }
    }
    Ok(())
}
