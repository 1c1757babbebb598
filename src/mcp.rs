// src/mcp.rs
// Model Context Protocol (JSON-RPC 2.0) envelopes and request dispatch

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::errors::ToolError;
use crate::handlers::ClusterTools;
use crate::policy::{permission_notice, Access, PermissionGate};
use crate::tools::ToolCatalogue;

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "proxmox-mcp";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// Incoming JSON-RPC request.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    /// `None` when the member is absent; an explicit `null` is kept as `Some(Null)`.
    #[serde(default, deserialize_with = "present")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl JsonRpcRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_none() && self.method.starts_with("notifications/")
    }
}

/// JSON-RPC response envelope. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        JsonRpcResponse {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<Value>, code: i64, message: impl Into<String>) -> Self {
        JsonRpcResponse {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

fn text_content(text: String, is_error: bool) -> Value {
    let mut result = json!({ "content": [{ "type": "text", "text": text }] });
    if is_error {
        result["isError"] = Value::Bool(true);
    }
    result
}

/// Routes requests to the tool catalogue and handlers. One instance serves
/// every transport for the lifetime of the process.
pub struct Dispatcher {
    catalogue: ToolCatalogue,
    gate: PermissionGate,
    tools: ClusterTools,
}

impl Dispatcher {
    pub fn new(catalogue: ToolCatalogue, gate: PermissionGate, tools: ClusterTools) -> Self {
        Dispatcher { catalogue, gate, tools }
    }

    /// Decodes one raw message and handles it. Returns `None` for
    /// notifications, which get no reply.
    pub async fn handle_payload(&self, payload: &[u8]) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_slice(payload) {
            Ok(value) => value,
            Err(e) => {
                warn!("Unparseable JSON-RPC message: {}", e);
                return Some(JsonRpcResponse::failure(None, PARSE_ERROR, "Parse error"));
            }
        };
        let id = value.as_object().and_then(|object| object.get("id")).cloned();
        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                return Some(JsonRpcResponse::failure(id, INVALID_REQUEST, format!("Invalid Request: {}", e)));
            }
        };
        if request.is_notification() {
            debug!("Notification {}", request.method);
            return None;
        }
        Some(self.handle(request).await)
    }

    pub async fn handle(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let JsonRpcRequest { jsonrpc, id, method, params } = request;
        if jsonrpc != JSONRPC_VERSION {
            return JsonRpcResponse::failure(id, INVALID_REQUEST, "Invalid Request: jsonrpc must be \"2.0\"");
        }
        debug!("Handling {}", method);

        match method.as_str() {
            "initialize" => JsonRpcResponse::success(id, self.initialize()),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => match self.list_tools() {
                Ok(result) => JsonRpcResponse::success(id, result),
                Err(e) => JsonRpcResponse::failure(id, INTERNAL_ERROR, format!("Internal error: {}", e)),
            },
            "tools/call" => {
                let params = params.unwrap_or(Value::Null);
                let Some(name) = params.get("name").and_then(Value::as_str) else {
                    return JsonRpcResponse::failure(id, INVALID_PARAMS, "Invalid params: tools/call needs a string 'name'");
                };
                let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
                JsonRpcResponse::success(id, self.call_tool(name, arguments).await)
            }
            other if other.starts_with("notifications/") => JsonRpcResponse::success(id, json!({})),
            other => JsonRpcResponse::failure(id, METHOD_NOT_FOUND, format!("Method not found: {}", other)),
        }
    }

    fn initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") }
        })
    }

    fn list_tools(&self) -> Result<Value, serde_json::Error> {
        let tools = self.catalogue.descriptors().map(serde_json::to_value).collect::<Result<Vec<_>, _>>()?;
        Ok(json!({ "tools": tools }))
    }

    /// Every outcome here is a successful envelope; tool failures are marked
    /// with `isError` inside the result.
    async fn call_tool(&self, name: &str, arguments: Value) -> Value {
        let tool = match self.catalogue.resolve(name) {
            Ok(tool) => tool,
            Err(e) => return tool_failure(e),
        };

        let access = self.gate.access_for(tool);
        if access == Access::Denied {
            info!("Refused {}: elevated permissions are disabled", name);
            return text_content(permission_notice(tool, &arguments), false);
        }

        let call = match self.catalogue.parse_call(tool, &arguments) {
            Ok(call) => call,
            Err(e) => return tool_failure(e),
        };
        match self.tools.run(call, access).await {
            Ok(text) => text_content(text, false),
            Err(e) => tool_failure(e),
        }
    }
}

fn tool_failure(error: ToolError) -> Value {
    warn!("Tool call failed: {}", error);
    let text = if matches!(error, ToolError::UnknownTool(_)) {
        error.to_string()
    } else {
        format!("❌ {}", error)
    };
    text_content(text, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{dispatcher, two_node_cluster, MockClient};
    use crate::tools::Tool;
    use std::sync::Arc;

    async fn roundtrip(dispatcher: &Dispatcher, message: Value) -> Value {
        let payload = serde_json::to_vec(&message).unwrap();
        let response = dispatcher.handle_payload(&payload).await.unwrap();
        serde_json::to_value(response).unwrap()
    }

    fn call(id: Value, name: &str, arguments: Value) -> Value {
        json!({"jsonrpc": "2.0", "id": id, "method": "tools/call", "params": {"name": name, "arguments": arguments}})
    }

    fn text_of(response: &Value) -> &str {
        response["result"]["content"][0]["text"].as_str().unwrap()
    }

    #[tokio::test]
    async fn initialize_reports_identity_and_tool_capability() {
        let dispatcher = dispatcher(Arc::new(MockClient::new()), false);
        let response = roundtrip(&dispatcher, json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"})).await;
        assert_eq!(response["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(response["result"]["serverInfo"]["name"], SERVER_NAME);
        assert!(response["result"]["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn tool_list_is_the_same_with_and_without_elevation() {
        let expected: Vec<&str> = Tool::ALL.iter().map(|t| t.name()).collect();
        for elevated in [false, true] {
            let dispatcher = dispatcher(Arc::new(MockClient::new()), elevated);
            let response = roundtrip(&dispatcher, json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})).await;
            let names: Vec<&str> = response["result"]["tools"]
                .as_array()
                .unwrap()
                .iter()
                .map(|tool| tool["name"].as_str().unwrap())
                .collect();
            assert_eq!(names, expected);
            assert!(response["result"]["tools"][0]["inputSchema"].is_object());
        }
    }

    #[tokio::test]
    async fn ids_are_echoed_verbatim() {
        let dispatcher = dispatcher(Arc::new(MockClient::new()), false);
        for id in [json!(7), json!("req-7"), Value::Null, json!(1.5)] {
            let response = roundtrip(&dispatcher, json!({"jsonrpc": "2.0", "id": id.clone(), "method": "ping"})).await;
            assert_eq!(response["id"], id);
            assert_eq!(response["result"], json!({}));
            assert!(response.as_object().unwrap().contains_key("id"));
        }
    }

    #[tokio::test]
    async fn unknown_method_is_a_protocol_failure() {
        let dispatcher = dispatcher(Arc::new(MockClient::new()), false);
        let response = roundtrip(&dispatcher, json!({"jsonrpc": "2.0", "id": "x", "method": "resources/list"})).await;
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);
        assert_eq!(response["id"], "x");
        assert!(response.get("result").is_none());
    }

    #[tokio::test]
    async fn unparseable_message_has_no_id() {
        let dispatcher = dispatcher(Arc::new(MockClient::new()), false);
        let response = dispatcher.handle_payload(b"{\"jsonrpc\": \"2.0\", \"id\": 1,").await.unwrap();
        assert_eq!(response.error.as_ref().unwrap().code, PARSE_ERROR);
        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("id").is_none());
    }

    #[tokio::test]
    async fn malformed_envelopes_are_invalid_requests() {
        let dispatcher = dispatcher(Arc::new(MockClient::new()), false);
        let wrong_version = roundtrip(&dispatcher, json!({"jsonrpc": "1.0", "id": 3, "method": "ping"})).await;
        assert_eq!(wrong_version["error"]["code"], INVALID_REQUEST);
        assert_eq!(wrong_version["id"], 3);

        let no_method = roundtrip(&dispatcher, json!({"jsonrpc": "2.0", "id": 4})).await;
        assert_eq!(no_method["error"]["code"], INVALID_REQUEST);
        assert_eq!(no_method["id"], 4);

        let not_an_object = roundtrip(&dispatcher, json!([1, 2, 3])).await;
        assert_eq!(not_an_object["error"]["code"], INVALID_REQUEST);
    }

    #[tokio::test]
    async fn notifications_get_no_reply() {
        let dispatcher = dispatcher(Arc::new(MockClient::new()), false);
        let payload = br#"{"jsonrpc": "2.0", "method": "notifications/initialized"}"#;
        assert!(dispatcher.handle_payload(payload).await.is_none());
    }

    #[tokio::test]
    async fn tools_call_without_name_is_invalid_params() {
        let dispatcher = dispatcher(Arc::new(MockClient::new()), false);
        let response =
            roundtrip(&dispatcher, json!({"jsonrpc": "2.0", "id": 5, "method": "tools/call", "params": {"arguments": {}}})).await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_in_content() {
        let dispatcher = dispatcher(Arc::new(MockClient::new()), true);
        let response = roundtrip(&dispatcher, call(json!(6), "nonexistent_tool", json!({}))).await;
        assert!(response.get("error").is_none());
        assert_eq!(text_of(&response), "Unknown tool: nonexistent_tool");
        assert_eq!(response["result"]["isError"], true);
    }

    #[tokio::test]
    async fn gated_command_returns_notice_without_touching_the_cluster() {
        let client = Arc::new(two_node_cluster());
        let dispatcher = dispatcher(client.clone(), false);
        let response = roundtrip(
            &dispatcher,
            call(json!(8), "proxmox_execute_vm_command", json!({"node": "n1", "vmid": "100", "command": "uptime"})),
        )
        .await;
        assert!(response.get("error").is_none());
        let text = text_of(&response);
        assert!(text.contains("uptime"));
        assert!(text.contains("Elevated permissions required"));
        assert!(response["result"].get("isError").is_none());
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn gated_tool_echoes_arguments_even_when_incomplete() {
        let client = Arc::new(MockClient::new());
        let dispatcher = dispatcher(client.clone(), false);
        let response = roundtrip(&dispatcher, call(json!(9), "proxmox_get_node_status", json!({"nod": "pve1"}))).await;
        assert!(text_of(&response).contains("\"nod\": \"pve1\""));
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_argument_is_named_before_any_request() {
        let client = Arc::new(two_node_cluster());
        let dispatcher = dispatcher(client.clone(), true);
        let response =
            roundtrip(&dispatcher, call(json!(10), "proxmox_get_vm_status", json!({"node": "pve1"}))).await;
        assert!(text_of(&response).contains("'vmid'"));
        assert_eq!(response["result"]["isError"], true);
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn container_listing_skips_the_unreachable_node() {
        let client = Arc::new(two_node_cluster());
        let dispatcher = dispatcher(client, false);
        let response = roundtrip(&dispatcher, call(json!(11), "proxmox_get_vms", json!({"type": "lxc"}))).await;
        let text = text_of(&response);
        assert!(text.find("101").unwrap() < text.find("103").unwrap());
        assert!(!text.contains("pve2"));
        assert!(response["result"].get("isError").is_none());
    }

    #[tokio::test]
    async fn elevated_command_reaches_the_guest_agent() {
        let client = Arc::new(
            MockClient::new()
                .with_get("/nodes/pve1/qemu/100/status/current", json!({"status": "running"}))
                .with_post("/nodes/pve1/qemu/100/agent/exec", json!({"pid": 99})),
        );
        let dispatcher = dispatcher(client.clone(), true);
        let response = roundtrip(
            &dispatcher,
            call(json!(12), "proxmox_execute_vm_command", json!({"node": "pve1", "vmid": 100, "command": "uptime"})),
        )
        .await;
        assert!(text_of(&response).contains("PID: 99"));
        assert_eq!(client.last_body(), Some(json!({"command": "uptime"})));
    }

    #[tokio::test]
    async fn api_errors_stay_inside_the_result() {
        let dispatcher = dispatcher(Arc::new(MockClient::new()), false);
        let response = roundtrip(&dispatcher, call(json!(13), "proxmox_get_nodes", Value::Null)).await;
        assert!(response.get("error").is_none());
        assert!(text_of(&response).contains("Proxmox API error"));
        assert_eq!(response["result"]["isError"], true);
    }

    #[tokio::test]
    async fn basic_cluster_status_is_not_refused() {
        let client = Arc::new(two_node_cluster());
        let dispatcher = dispatcher(client.clone(), false);
        let response = roundtrip(&dispatcher, call(json!(14), "proxmox_get_cluster_status", json!({}))).await;
        assert!(text_of(&response).contains("Basic view"));
        assert_eq!(client.calls(), vec!["GET /nodes".to_string()]);
    }
}
