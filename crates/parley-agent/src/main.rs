//! Parley Agent
//!
//! Tool hook for the agent process. Reads a request payload from stdin, asks
//! the host, prints the verdict as JSON on stdout and exits 0 when the tool
//! may proceed, 2 otherwise.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use parley_agent::{AnyChannel, PathGuard, RequestEmitter};
use parley_core::config::load_config;
use parley_core::exchange::Question;

/// Exit status when the request was denied, rejected or left unanswered.
const EXIT_DENIED: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "parley-agent")]
#[command(version, about = "Parley agent - ask the host before a tool runs")]
struct Args {
    /// Exchange directory shared with the host.
    #[arg(long, env = "PARLEY_PERMISSION_DIR")]
    exchange_dir: Option<PathBuf>,

    /// Talk to the host over its Unix domain socket.
    #[arg(long)]
    socket: bool,

    /// Socket path (defaults to `parley.sock` in the exchange directory).
    #[arg(long, env = "PARLEY_SOCKET")]
    socket_path: Option<PathBuf>,

    /// Project root; temp paths are rewritten under it.
    #[arg(long, env = "PARLEY_PROJECT_DIR")]
    project: Option<PathBuf>,

    /// Log level filter (e.g. "info", "debug"); defaults to "warn".
    #[arg(long, env = "PARLEY_AGENT_LOG_LEVEL")]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "PARLEY_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Ask permission to run a tool.
    Permission,
    /// Ask the user to approve a plan.
    Plan,
    /// Ask the user to answer questions.
    Questions,
}

/// Stdin payload of the `permission` hook.
#[derive(Debug, Deserialize)]
struct PermissionPayload {
    #[serde(alias = "toolName")]
    tool_name: String,
    #[serde(default, alias = "tool_input", alias = "input")]
    inputs: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct QuestionsPayload {
    #[serde(default)]
    questions: Vec<Question>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let project = match args.project {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let mut config = load_config(Some(&project))?;
    if let Some(dir) = args.exchange_dir {
        config.exchange.dir = Some(dir);
    }
    if args.socket {
        config.exchange.socket_enabled = true;
    }
    if args.socket_path.is_some() {
        config.exchange.socket_path = args.socket_path;
    }
    // Quiet unless asked: the agent reads whatever the hook prints.
    let level = args.log_level.unwrap_or_else(|| "warn".to_string());
    parley_core::tracing_init::init_tracing(
        &parley_core::tracing_init::default_filter("parley_agent", &level),
        args.log_json,
    );

    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .context("reading hook payload from stdin")?;
    let payload: Value = serde_json::from_str(&raw).context("parsing hook payload")?;

    let emitter = RequestEmitter::new(
        AnyChannel::from_config(&config)?,
        PathGuard::from_config(&config.permissions, Some(&project)),
        config.timeouts.clone(),
    );

    let (verdict, proceed) = match args.command {
        Command::Permission => {
            let payload: PermissionPayload =
                serde_json::from_value(payload).context("parsing permission payload")?;
            let outcome = emitter
                .request_permission_with_inputs(&payload.tool_name, payload.inputs)
                .await;
            let allow = outcome.allow;
            (serde_json::to_value(outcome)?, allow)
        }
        Command::Plan => {
            let inputs = tool_input(payload);
            let verdict = emitter.request_plan_approval(&inputs).await;
            let approved = verdict.approved;
            (serde_json::to_value(verdict)?, approved)
        }
        Command::Questions => {
            let payload: QuestionsPayload = serde_json::from_value(Value::Object(tool_input(payload)))
                .context("parsing questions payload")?;
            let answers = emitter.request_user_answers(payload.questions).await;
            let answered = answers.is_some();
            (json!({ "answers": answers }), answered)
        }
    };

    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer(&mut stdout, &verdict)?;
    writeln!(stdout)?;

    Ok(if proceed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_DENIED)
    })
}

/// The tool input object, whether sent bare or wrapped in a hook envelope.
fn tool_input(payload: Value) -> Map<String, Value> {
    match payload {
        Value::Object(mut map) => match map.remove("tool_input") {
            Some(Value::Object(inner)) => inner,
            Some(other) => {
                map.insert("tool_input".into(), other);
                map
            }
            None => map,
        },
        _ => Map::new(),
    }
}
