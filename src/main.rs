//! CLI entry point: argument parsing, logging setup, and dispatch between
//! the daemon process and the short-lived request commands.

use clap::{Parser, Subcommand};
use lspc::client;
use lspc::config::{ConfigOverrides, DaemonConfig};
use lspc::error::LspcError;
use lspc::handlers;
use lspc::paths::{self, WorkspacePaths};
use lspc::registry_dir;
use std::path::PathBuf;
use tracing::warn;

#[derive(Parser)]
#[command(name = "lspc", version, about = "Daemon-backed LSP client for scripts and editor plugins")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level filter passed to `tracing_subscriber::EnvFilter`, e.g.
    /// "info", "debug", or a per-target filter like "lspc=trace".
    #[arg(long, global = true, env = "LSPC_LOG", default_value = "info")]
    log: String,

    /// Suppress client-side progress text; errors still go to stderr.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon in the foreground.
    ///
    /// Owns the language-server subprocesses for one workspace and answers
    /// requests over a local socket until told to stop or until it has been
    /// idle with no open documents for the configured timeout. Spawned
    /// automatically, fully detached, by the other subcommands — not
    /// normally invoked by hand.
    ///
    /// Examples:
    ///   lspc daemon --workspace /home/user/project --log-file /tmp/lspc.log
    Daemon {
        #[arg(long)]
        workspace: PathBuf,
        #[arg(long, env = "LSPC_LOG_FILE")]
        log_file: Option<PathBuf>,
    },

    /// Ensure a daemon is running for a workspace.
    ///
    /// Connects to the daemon for `dir` (default: current directory),
    /// spawning one if none is reachable yet, and waits until it answers.
    ///
    /// Examples:
    ///   lspc start
    ///   lspc start ~/code/myproject
    Start { dir: Option<PathBuf> },

    /// Shut down the daemon for the current directory's workspace.
    Stop,

    /// Shut down every daemon registered on this machine.
    StopAll,

    /// List every live daemon: one line per workspace, tab-separated.
    List,

    /// Print JSON daemon status: uptime, instance list, memory.
    Status,

    /// Print space-separated active language-server ids, for statusline use.
    Statusline,

    /// Print diagnostics for a file.
    ///
    /// Exit code 0 when clean, 2 when diagnostics were found, 1 on error.
    ///
    /// Examples:
    ///   lspc diagnostics src/main.rs
    Diagnostics {
        file: PathBuf,
        #[arg(long)]
        config_file: Option<PathBuf>,
    },

    /// Print hover information for a symbol in a file.
    ///
    /// Examples:
    ///   lspc hover src/main.rs add
    Hover {
        file: PathBuf,
        symbol: String,
        #[arg(long)]
        config_file: Option<PathBuf>,
    },

    /// Print the path to the daemon's log file for the current workspace.
    Logs,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let code = match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            e.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run(args: Args) -> Result<i32, LspcError> {
    match args.command {
        Command::Daemon { workspace, log_file } => run_daemon(&args.log, workspace, log_file).await,
        Command::Start { dir } => run_start(dir, args.quiet).await,
        Command::Stop => run_stop().await,
        Command::StopAll => run_stop_all().await,
        Command::List => run_list(),
        Command::Status => run_request("status", Vec::new(), None, args.quiet).await,
        Command::Statusline => run_request("statusline", Vec::new(), None, args.quiet).await,
        Command::Diagnostics { file, config_file } => run_diagnostics(file, config_file).await,
        Command::Hover { file, symbol, config_file } => run_hover(file, symbol, config_file).await,
        Command::Logs => run_request("logs", Vec::new(), None, args.quiet).await,
    }
}

async fn run_daemon(log_level: &str, workspace: PathBuf, log_file: Option<PathBuf>) -> Result<i32, LspcError> {
    let _guard = setup_logging(log_level, log_file.as_deref());
    let paths = WorkspacePaths::derive(&workspace)?;
    let config = DaemonConfig::load(&paths::state_dir(), ConfigOverrides::default());
    lspc::daemon::run(paths, config).await?;
    Ok(0)
}

async fn run_start(dir: Option<PathBuf>, quiet: bool) -> Result<i32, LspcError> {
    setup_logging("info", None);
    let dir = dir.unwrap_or(std::env::current_dir().map_err(LspcError::IoError)?);
    std::fs::create_dir_all(&dir).ok();
    let paths = WorkspacePaths::derive(&dir)?;
    client::connect_or_spawn(&paths, "status", Vec::new(), None).await?;
    if !quiet {
        println!("daemon ready for {}", paths.workspace.display());
    }
    Ok(0)
}

async fn run_stop() -> Result<i32, LspcError> {
    setup_logging("info", None);
    let paths = current_workspace_paths()?;
    // Never spawns a daemon just to stop it — nothing reachable means the
    // desired end state (no daemon running) already holds.
    match client::send_if_running(&paths, "stop", Vec::new(), None).await? {
        Some(response) => Ok(if response.success { 0 } else { 1 }),
        None => Ok(0),
    }
}

async fn run_stop_all() -> Result<i32, LspcError> {
    setup_logging("info", None);
    for record in registry_dir::list_live(&paths::state_dir()) {
        if let Err(e) = send_stop(&record.socket_path).await {
            warn!(workspace = %record.workspace, error = %e, "failed to stop daemon");
        }
    }
    Ok(0)
}

async fn send_stop(socket_path: &str) -> std::io::Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixStream;

    let mut stream = UnixStream::connect(socket_path).await?;
    let body = serde_json::to_vec(&serde_json::json!({ "command": "stop", "args": [] }))?;
    stream.write_all(&body).await?;
    stream.shutdown().await?;
    let mut discard = Vec::new();
    stream.read_to_end(&mut discard).await?;
    Ok(())
}

fn run_list() -> Result<i32, LspcError> {
    for record in registry_dir::list_live(&paths::state_dir()) {
        println!("{}\t{}\t{}", record.workspace, record.pid, record.socket_path);
    }
    Ok(0)
}

async fn run_diagnostics(file: PathBuf, config_file: Option<PathBuf>) -> Result<i32, LspcError> {
    setup_logging("info", None);
    let paths = current_workspace_paths()?;
    let config_file = config_file.map(|p| p.display().to_string());
    let file_arg = file.display().to_string();

    let response = client::connect_or_spawn(&paths, "diagnostics", vec![file_arg], config_file).await?;
    if let Some(result) = &response.result {
        if let Some(lines) = result.get("lines").and_then(|v| v.as_array()) {
            for line in lines {
                if let Some(text) = line.as_str() {
                    eprintln!("{text}");
                }
            }
        }
    }
    if let Some(error) = &response.error {
        eprintln!("Error: {error}");
    }
    Ok(handlers::exit_code_for("diagnostics", &response))
}

async fn run_hover(file: PathBuf, symbol: String, config_file: Option<PathBuf>) -> Result<i32, LspcError> {
    setup_logging("info", None);
    let paths = current_workspace_paths()?;
    let config_file = config_file.map(|p| p.display().to_string());
    let file_arg = file.display().to_string();

    let response = client::connect_or_spawn(&paths, "hover", vec![file_arg, symbol], config_file).await?;
    if let Some(text) = response.result.as_ref().and_then(|v| v.as_str()) {
        println!("{text}");
    }
    if let Some(error) = &response.error {
        eprintln!("Error: {error}");
    }
    Ok(handlers::exit_code_for("hover", &response))
}

async fn run_request(
    command: &str,
    args: Vec<String>,
    config_file: Option<String>,
    quiet: bool,
) -> Result<i32, LspcError> {
    setup_logging("info", None);
    let paths = current_workspace_paths()?;
    let response = client::connect_or_spawn(&paths, command, args, config_file).await?;
    if !quiet {
        match &response.result {
            Some(serde_json::Value::String(s)) => println!("{s}"),
            Some(value) => println!("{}", serde_json::to_string_pretty(value).unwrap_or_default()),
            None => {}
        }
        if let Some(error) = &response.error {
            eprintln!("Error: {error}");
        }
    }
    Ok(handlers::exit_code_for(command, &response))
}

fn current_workspace_paths() -> Result<WorkspacePaths, LspcError> {
    let cwd = std::env::current_dir().map_err(LspcError::IoError)?;
    WorkspacePaths::derive(&cwd).map_err(LspcError::IoError)
}

/// Build the global `tracing` subscriber: stdout when attached, a daily-
/// rolling file when a log file is given (the client launcher always
/// passes one when it spawns a detached daemon). Never panics — a log
/// directory that can't be created just falls back to stdout.
fn setup_logging(level: &str, log_file: Option<&std::path::Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let Some(path) = log_file else {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        return None;
    };

    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
    match std::fs::create_dir_all(dir) {
        Ok(()) => {
            let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("lspc.log");
            let appender = tracing_appender::rolling::daily(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(non_blocking)
                .with_ansi(false)
                .try_init();
            Some(guard)
        }
        Err(e) => {
            let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
            warn!(error = %e, path = %dir.display(), "failed to create log directory, falling back to stdout");
            None
        }
    }
}
