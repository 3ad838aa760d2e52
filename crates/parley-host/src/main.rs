//! Parley Host
//!
//! Serves permission, question and plan-approval requests from agents, and
//! replays agent event logs into a transcript.

use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use parley_core::config::load_config;
use parley_core::events::Backend;
use parley_core::permissions::PermissionMode;
use parley_host::console::ConsoleDialog;
use parley_host::permission::{BrokerConfig, PermissionBroker};
use parley_host::session::SessionHandle;

#[derive(Parser, Debug)]
#[command(name = "parley-host")]
#[command(version, about = "Parley host - permission broker and transcript assembler")]
struct Args {
    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long, global = true, env = "PARLEY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, global = true, env = "PARLEY_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer agent requests until interrupted.
    Serve(ServeArgs),
    /// Assemble a recorded event log and print the transcript as JSON.
    Replay(ReplayArgs),
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    /// Exchange directory shared with the agent.
    #[arg(long, env = "PARLEY_PERMISSION_DIR")]
    exchange_dir: Option<PathBuf>,

    /// Initial permission mode (default, acceptEdits, allowAll, denyAll).
    #[arg(long, env = "PARLEY_MODE")]
    mode: Option<PermissionMode>,

    /// Also accept requests on a Unix domain socket.
    #[arg(long)]
    socket: bool,

    /// Socket path (defaults to `parley.sock` in the exchange directory).
    #[arg(long, env = "PARLEY_SOCKET")]
    socket_path: Option<PathBuf>,

    /// Never prompt on the terminal; requests without a dialog fail closed.
    #[arg(long)]
    non_interactive: bool,

    /// Project directory whose `.parley/settings.json` is loaded.
    #[arg(long)]
    project: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct ReplayArgs {
    /// Backend that produced the log (native, claude, codex).
    #[arg(long, default_value = "native")]
    backend: Backend,

    /// Event log, one JSON object per line. Reads stdin when absent.
    file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    match args.command {
        Command::Serve(serve_args) => serve(serve_args, args.log_level, args.log_json).await,
        Command::Replay(replay_args) => {
            let level = args.log_level.unwrap_or_else(|| "warn".to_string());
            parley_core::tracing_init::init_tracing(
                &parley_core::tracing_init::default_filter("parley_host", &level),
                args.log_json,
            );
            replay(&replay_args)
        }
    }
}

async fn serve(args: ServeArgs, log_level: Option<String>, log_json: bool) -> anyhow::Result<()> {
    let project = match args.project {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let mut config = load_config(Some(&project))?;
    if let Some(dir) = args.exchange_dir {
        config.exchange.dir = Some(dir);
    }
    if let Some(mode) = args.mode {
        config.permissions.mode = mode;
    }
    if args.socket {
        config.exchange.socket_enabled = true;
    }
    if args.socket_path.is_some() {
        config.exchange.socket_path = args.socket_path;
    }
    if let Some(level) = log_level {
        config.log_level = level;
    }

    let log_filter = parley_core::tracing_init::default_filter("parley_host", &config.log_level);
    parley_core::tracing_init::init_tracing(&log_filter, log_json);

    let exchange = config.exchange.open_dir()?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        exchange_dir = %exchange.path().display(),
        mode = %config.permissions.mode,
        socket = config.exchange.socket_enabled,
        "Starting parley-host"
    );

    let mut broker = PermissionBroker::new(BrokerConfig::from(&config), exchange.clone());
    if !args.non_interactive {
        broker = broker.with_fallback(Arc::new(ConsoleDialog::new()));
    }
    let broker = Arc::new(broker);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let broker_handle = broker.spawn(shutdown_rx.clone()).await;

    #[cfg(unix)]
    let socket_handle = if config.exchange.socket_enabled {
        let path = config.exchange.socket_path(&exchange);
        let server = parley_host::permission::SocketServer::bind(Arc::clone(&broker), &path)
            .with_context(|| format!("binding {}", path.display()))?;
        info!(path = %server.path().display(), "Socket transport ready");
        Some(tokio::spawn(server.serve(shutdown_rx)))
    } else {
        drop(shutdown_rx);
        None
    };
    #[cfg(not(unix))]
    drop(shutdown_rx);

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = broker_handle.await;
    #[cfg(unix)]
    if let Some(handle) = socket_handle {
        let _ = handle.await;
    }

    info!("Host stopped");
    Ok(())
}

fn replay(args: &ReplayArgs) -> anyhow::Result<()> {
    let reader: Box<dyn BufRead> = match &args.file {
        Some(path) => Box::new(BufReader::new(
            std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(std::io::stdin().lock()),
    };

    let session = SessionHandle::new(args.backend);
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        session
            .feed_line(&line)
            .with_context(|| format!("line {}", index + 1))?;
    }

    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &session.snapshot())?;
    writeln!(stdout)?;
    Ok(())
}
