#![forbid(unsafe_code)]

use crate::Config;
use pf_storage::time::{now_ms, ts_ms_to_rfc3339};
use serde_json::Value;
use std::fmt::Write as _;
use std::path::PathBuf;

pub(crate) const SESSION_LOG_FILE: &str = "pf_mcp_last_session.txt";

/// How the last tool call ended.
#[derive(Clone, Debug, PartialEq, Eq)]
struct ToolNote {
    name: String,
    /// `None` on success, otherwise the payload's error code.
    error_code: Option<String>,
}

/// Which store and remote this process serves, and where its last tool call and last sync
/// attempt ended. Rewritten in place after every change. Tool arguments, snapshot contents
/// and the encryption key never land here.
#[derive(Clone, Debug)]
pub(crate) struct SessionLog {
    path: PathBuf,
    started_at_ms: u64,
    pid: u32,
    remote_dir: Option<PathBuf>,
    codecs: &'static str,
    mode: Option<String>,
    requests: u64,
    last_method: Option<String>,
    last_tool: Option<ToolNote>,
    last_sync: Option<String>,
    last_sync_at_ms: Option<u64>,
    last_error: Option<String>,
    exit: Option<String>,
}

impl SessionLog {
    pub(crate) fn new(config: &Config) -> Self {
        let codecs = match (config.compress, config.encrypt_key.is_some()) {
            (false, false) => "plain",
            (true, false) => "compressed",
            (false, true) => "encrypted",
            (true, true) => "compressed+encrypted",
        };
        let this = Self {
            path: config.storage_dir.join(SESSION_LOG_FILE),
            started_at_ms: now_ms(),
            pid: std::process::id(),
            remote_dir: config.remote_dir.clone(),
            codecs,
            mode: None,
            requests: 0,
            last_method: None,
            last_tool: None,
            last_sync: None,
            last_sync_at_ms: None,
            last_error: None,
            exit: None,
        };
        this.flush();
        this
    }

    pub(crate) fn note_mode(&mut self, mode: &str) {
        self.mode = Some(mode.to_string());
        self.flush();
    }

    pub(crate) fn note_request(&mut self, method: &str) {
        self.requests += 1;
        let method = method.trim();
        if !method.is_empty() {
            self.last_method = Some(truncate(method, 96));
        }
        self.flush();
    }

    /// Records the outcome of a `tools/call` from its payload. A `sync_run` also updates the
    /// sync line: the outcome name on success, the error code otherwise.
    pub(crate) fn note_tool(&mut self, name: &str, payload: &Value) {
        let succeeded = payload
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let error_code = (!succeeded).then(|| {
            payload
                .pointer("/error/code")
                .and_then(Value::as_str)
                .unwrap_or("UNKNOWN")
                .to_string()
        });

        if name == "sync_run" {
            self.last_sync = Some(match &error_code {
                None => payload
                    .pointer("/result/outcome")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
                Some(code) => format!("error {code}"),
            });
            self.last_sync_at_ms = Some(now_ms());
        }
        if error_code.is_some()
            && let Some(message) = payload.pointer("/error/message").and_then(Value::as_str)
        {
            self.last_error = Some(truncate(message.trim(), 300));
        }
        self.last_tool = Some(ToolNote {
            name: truncate(name, 64),
            error_code,
        });
        self.flush();
    }

    pub(crate) fn note_error(&mut self, error: &str) {
        let error = error.trim();
        if error.is_empty() {
            return;
        }
        self.last_error = Some(truncate(error, 300));
        self.flush();
    }

    pub(crate) fn note_exit(&mut self, reason: &str) {
        self.exit = Some(truncate(reason.trim(), 120));
        self.flush();
    }

    fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "started={}", ts_ms_to_rfc3339(self.started_at_ms));
        let _ = writeln!(out, "pid={}", self.pid);
        let _ = writeln!(out, "version={}", crate::SERVER_VERSION);
        match &self.remote_dir {
            Some(dir) => {
                let _ = writeln!(out, "remote_dir={}", dir.display());
            }
            None => out.push_str("remote_dir=none\n"),
        }
        let _ = writeln!(out, "codecs={}", self.codecs);
        if let Some(mode) = &self.mode {
            let _ = writeln!(out, "mode={mode}");
        }
        let _ = writeln!(out, "requests={}", self.requests);
        if let Some(method) = &self.last_method {
            let _ = writeln!(out, "last_method={method}");
        }
        if let Some(tool) = &self.last_tool {
            match &tool.error_code {
                None => {
                    let _ = writeln!(out, "last_tool={} ok", tool.name);
                }
                Some(code) => {
                    let _ = writeln!(out, "last_tool={} {code}", tool.name);
                }
            }
        }
        if let Some(sync) = &self.last_sync {
            let _ = writeln!(out, "last_sync={sync}");
        }
        if let Some(at) = self.last_sync_at_ms {
            let _ = writeln!(out, "last_sync_at={}", ts_ms_to_rfc3339(at));
        }
        if let Some(err) = &self.last_error {
            let _ = writeln!(out, "last_error={err}");
        }
        if let Some(exit) = &self.exit {
            let _ = writeln!(out, "exit={exit}");
        }
        out
    }

    fn flush(&self) {
        if let Some(dir) = self.path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        let _ = std::fs::write(&self.path, self.render());
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(dir: &str) -> Config {
        Config {
            storage_dir: std::env::temp_dir().join(format!(
                "pf_mcp_session_{dir}_{}",
                std::process::id()
            )),
            remote_dir: Some(PathBuf::from("/srv/pf-remote")),
            compress: true,
            encrypt_key: Some("correct horse".to_string()),
            enforce_project: true,
            max_task_depth: None,
        }
    }

    #[test]
    fn sync_outcomes_and_failures_are_recorded() {
        let config = config("outcomes");
        let mut log = SessionLog::new(&config);
        log.note_request("tools/call");
        log.note_tool(
            "sync_run",
            &json!({"success": true, "result": {"outcome": "pulled", "remote": 1200}}),
        );
        let record = log.render();
        assert!(record.contains("codecs=compressed+encrypted\n"));
        assert!(record.contains("remote_dir=/srv/pf-remote\n"));
        assert!(record.contains("requests=1\n"));
        assert!(record.contains("last_tool=sync_run ok\n"));
        assert!(record.contains("last_sync=pulled\n"));
        assert!(!record.contains("correct horse"));

        log.note_tool(
            "sync_run",
            &json!({
                "success": false,
                "error": {"code": "SYNC_IN_PROGRESS", "message": "sync already in progress"}
            }),
        );
        log.note_tool("snapshot_export", &json!({"success": true, "result": {}}));
        let record = log.render();
        assert!(record.contains("last_tool=snapshot_export ok\n"));
        assert!(record.contains("last_sync=error SYNC_IN_PROGRESS\n"));
        assert!(record.contains("last_error=sync already in progress\n"));

        let _ = std::fs::remove_dir_all(&config.storage_dir);
    }
}
