#![forbid(unsafe_code)]

use crate::{Config, McpServer, SessionLog};
use pf_core::batch::BatchPolicy;
use pf_storage::SqliteStore;
use pf_storage::migrate::default_registry;
use pf_storage::pipeline::{Codecs, PasswordCipher};
use pf_storage::sync::{LocalDirRemote, SyncEngine};
use serde_json::{Value, json};

impl McpServer {
    pub(crate) fn new(store: SqliteStore, config: &Config, session: SessionLog) -> Self {
        let mut codecs = Codecs::plain().compressed(config.compress);
        if let Some(key) = &config.encrypt_key {
            codecs = codecs.with_cipher(PasswordCipher::new(key.clone()));
        }
        Self {
            initialized: false,
            store,
            engine: SyncEngine::new(codecs, default_registry()),
            remote: config.remote_dir.as_ref().map(LocalDirRemote::new),
            policy: BatchPolicy {
                enforce_project: config.enforce_project,
                max_depth: config.max_task_depth,
            },
            session,
        }
    }

    pub(crate) fn handle(&mut self, request: crate::JsonRpcRequest) -> Option<Value> {
        let method = request.method.as_str();

        if method == "initialize" {
            // Clients that never send `notifications/initialized` still get a usable session.
            self.initialized = true;
            return Some(crate::json_rpc_response(
                request.id,
                json!({
                    "protocolVersion": crate::MCP_VERSION,
                    "serverInfo": { "name": crate::SERVER_NAME, "version": crate::SERVER_VERSION },
                    "capabilities": { "tools": {} }
                }),
            ));
        }

        if method == "notifications/initialized" {
            self.initialized = true;
            return None;
        }

        if !self.initialized {
            return Some(crate::json_rpc_error(
                request.id,
                -32002,
                "Server not initialized",
            ));
        }

        if method == "ping" {
            return Some(crate::json_rpc_response(request.id, json!({})));
        }

        if method == "tools/list" {
            return Some(crate::json_rpc_response(
                request.id,
                json!({ "tools": crate::tools::tool_definitions() }),
            ));
        }

        if method == "tools/call" {
            let Some(params_obj) = request.params.as_ref().and_then(|v| v.as_object()) else {
                return Some(crate::json_rpc_error(
                    request.id,
                    -32602,
                    "params must be an object",
                ));
            };

            let tool_name = params_obj
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            let args = params_obj
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| json!({}));
            let response_body = self.call_tool(tool_name, args);
            self.session.note_tool(tool_name, &response_body);

            return Some(crate::json_rpc_response(
                request.id,
                json!({
                    "content": [crate::tool_text_content(&response_body)],
                    "isError": !response_body.get("success").and_then(|v| v.as_bool()).unwrap_or(false)
                }),
            ));
        }

        // Notifications never get a response, known or not.
        request.id.as_ref()?;
        Some(crate::json_rpc_error(
            request.id,
            -32601,
            &format!("Method not found: {method}"),
        ))
    }

    pub(crate) fn call_tool(&mut self, name: &str, args: Value) -> Value {
        match crate::tools::dispatch_tool(self, name, args) {
            Some(resp) => resp,
            None => crate::ai_error("UNKNOWN_TOOL", &format!("Unknown tool: {name}")),
        }
    }
}
