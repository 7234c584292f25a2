//! cityview - terminal viewer for the city traffic simulation server
//!
//! Draws the city map, agents and congestion as text on stdout and lets the
//! user drive the session from stdin:
//! - `start` (`s`): start the simulation and attach to its stream
//! - `stop` (`x`): stop the simulation
//! - `quit` (`q`), end of input or Ctrl-C: stop and exit
//!
//! Configuration, later sources win:
//! - built-in defaults (`http://127.0.0.1:8000`)
//! - `config.json` in the user config directory, or `--config <path>`
//! - `CITYVIEW_SERVER`, `CITYVIEW_REQUEST_TIMEOUT_MS`, `CITYVIEW_FAULT_COOLDOWN_MS`
//! - `--server <url>`
//!
//! Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use cityview::prelude::*;
use futures::StreamExt;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod paths;
mod render;

use paths::AppPaths;
use render::TerminalPresenter;

const USAGE: &str = "Usage: cityview [--server http://host:port] [--config path/to/config.json]";
const COMMANDS: &str = "commands: start (s), stop (x), quit (q), help (h)";

#[derive(Debug, Default, PartialEq)]
struct Args {
    server: Option<String>,
    config: Option<PathBuf>,
}

fn parse_args(mut argv: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut args = Args::default();
    while let Some(flag) = argv.next() {
        match flag.as_str() {
            "--server" => {
                args.server = Some(argv.next().ok_or("--server needs a URL")?);
            }
            "--config" => {
                args.config = Some(argv.next().ok_or("--config needs a path")?.into());
            }
            other => return Err(format!("Unknown argument: {other}")),
        }
    }
    Ok(args)
}

fn load_config(args: &Args) -> Result<ClientConfig, String> {
    let path = match &args.config {
        Some(path) => Some(path.clone()),
        None => AppPaths::new()
            .ok()
            .map(|p| p.config_file())
            .filter(|p| p.exists()),
    };

    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
            info!("Loaded config from {}", path.display());
            ClientConfig::from_json(&text)?
        }
        None => ClientConfig::default(),
    };
    config.apply_env();
    if let Some(server) = &args.server {
        config.server = server.clone();
    }
    Ok(config)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Command {
    Start,
    Stop,
    Quit,
    Help,
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "start" | "s" => Some(Command::Start),
            "stop" | "x" => Some(Command::Stop),
            "quit" | "exit" | "q" => Some(Command::Quit),
            "help" | "h" | "?" => Some(Command::Help),
            _ => None,
        }
    }
}

async fn read_commands(session: SessionHandle, shutdown: CancellationToken) {
    let mut lines = FramedRead::new(tokio::io::stdin(), LinesCodec::new());
    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("stdin: {}", e);
                break;
            }
        };
        match Command::parse(&line) {
            Some(Command::Start) => session.start(),
            Some(Command::Stop) => session.stop(),
            Some(Command::Quit) => break,
            Some(Command::Help) => println!("{COMMANDS}"),
            None if line.trim().is_empty() => {}
            None => warn!("Unknown command {:?}; {}", line.trim(), COMMANDS),
        }
    }
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{msg}\n{USAGE}");
            std::process::exit(2);
        }
    };
    let config = load_config(&args)?;
    info!("Simulation server: {}", config.server);

    let api = Arc::new(HttpApi::new(&config)?);
    let runtime = SessionRuntime::new(
        Arc::clone(&api),
        WebSocketConnector::new(config.stream_url()),
        api,
        TerminalPresenter::new(std::io::stdout()),
    )
    .with_fault_cooldown(config.fault_cooldown());

    let shutdown = CancellationToken::new();

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, shutting down");
                shutdown.cancel();
            }
        });
    }

    println!("{COMMANDS}");
    tokio::spawn(read_commands(runtime.handle(), shutdown.clone()));

    runtime.run(shutdown).await;
    info!("cityview stopped");
    Ok(())
}
