#![forbid(unsafe_code)]

mod entry;
mod server;
mod support;
mod tools;

pub(crate) use support::*;

use pf_core::batch::BatchPolicy;
use pf_storage::SqliteStore;
use pf_storage::sync::{LocalDirRemote, SyncEngine};
use std::fmt::Write as _;
use tracing_subscriber::EnvFilter;

// Widely deployed protocol baseline; behavior stays forward-compatible.
const MCP_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "pf-sync-mcp";
pub(crate) const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
const CRASH_FILE: &str = "pf_mcp_last_crash.txt";

fn write_last_crash(storage_dir: &std::path::Path, kind: &str, detail: &str) {
    let _ = std::fs::create_dir_all(storage_dir);
    let path = storage_dir.join(CRASH_FILE);

    let mut out = String::new();
    let ts_ms = pf_storage::time::now_ms();
    let _ = writeln!(out, "ts={}", pf_storage::time::ts_ms_to_rfc3339(ts_ms));
    let _ = writeln!(out, "pid={}", std::process::id());
    let _ = writeln!(out, "kind={kind}");
    let _ = writeln!(out, "version={SERVER_VERSION}");
    let cwd = std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));
    let _ = writeln!(out, "cwd={}", cwd.to_string_lossy());
    let _ = writeln!(out, "args={:?}", std::env::args().collect::<Vec<_>>());
    let _ = writeln!(out, "detail={detail}");

    let _ = std::fs::write(path, out);
}

fn install_crash_reporter(storage_dir: std::path::PathBuf) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let mut detail = info.to_string();
        let backtrace = std::backtrace::Backtrace::force_capture();
        let _ = write!(&mut detail, "\nbacktrace:\n{backtrace}");
        write_last_crash(&storage_dir, "panic", &detail);
        default_hook(info);
    }));
}

/// stdout carries the protocol, so logs go to stderr.
fn init_tracing() {
    let filter = EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(false)
        .try_init();
}

pub(crate) struct McpServer {
    initialized: bool,
    store: SqliteStore,
    engine: SyncEngine,
    remote: Option<LocalDirRemote>,
    policy: BatchPolicy,
    session: SessionLog,
}

fn usage() -> &'static str {
    "pf_mcp - local-first snapshot sync server (JSON-RPC over stdio)\n\n\
USAGE:\n\
  pf_mcp [--storage-dir DIR] [--remote-dir DIR] [--compress]\n\
         [--no-project-guard] [--max-task-depth N|none]\n\
\n\
FLAGS:\n\
  -h, --help       Print this help and exit\n\
  -V, --version    Print version and exit\n\
\n\
ENVIRONMENT:\n\
  PF_SYNC_STORAGE_DIR, PF_SYNC_REMOTE_DIR, PF_SYNC_COMPRESS, PF_SYNC_ENCRYPT_KEY,\n\
  PF_SYNC_ENFORCE_PROJECT, PF_SYNC_MAX_TASK_DEPTH, PF_SYNC_LOG\n\
\n\
NOTES:\n\
  - Default store: ./.pf_sync/ (optional settings file: <store>/pf_sync.yaml)\n\
  - The encryption password is read from the environment or the settings file only\n"
}

fn version_line() -> String {
    format!("pf_mcp {SERVER_VERSION} protocol={MCP_VERSION}")
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    if args
        .iter()
        .any(|arg| matches!(arg.as_str(), "-h" | "--help"))
    {
        print!("{}", usage());
        return Ok(());
    }
    if args
        .iter()
        .any(|arg| matches!(arg.as_str(), "-V" | "--version"))
    {
        println!("{}", version_line());
        return Ok(());
    }

    init_tracing();
    let config = Config::load(&args, |key| std::env::var(key).ok())?;
    install_crash_reporter(config.storage_dir.clone());
    let mut session_log = SessionLog::new(&config);

    let store = match SqliteStore::open(&config.storage_dir) {
        Ok(store) => store,
        Err(err) => {
            tracing::error!(code = err.code(), error = %err, "store open failed");
            session_log.note_error(&err.to_string());
            session_log.note_exit("store open failed");
            write_last_crash(&config.storage_dir, "error", &format!("{err:?}"));
            return Err(err.into());
        }
    };
    tracing::info!(?config, "pf_mcp starting");

    let mut server = McpServer::new(store, &config, session_log);
    let result = entry::run_stdio(&mut server);
    if let Err(err) = &result {
        write_last_crash(&config.storage_dir, "error", &format!("{err:?}"));
    }
    result
}
