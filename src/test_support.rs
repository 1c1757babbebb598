// src/test_support.rs
// In-memory ResourceClient and cluster fixtures shared by unit tests

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::api::ProxmoxApi;
use crate::errors::ApiError;
use crate::fanout::FanOut;
use crate::handlers::ClusterTools;
use crate::mcp::Dispatcher;
use crate::policy::PermissionGate;
use crate::proxmox_client::{RequestMethod, ResourceClient};
use crate::tools::ToolCatalogue;

/// Canned answers per (method, path). Paths without an answer fail like an
/// unreachable host.
#[derive(Default)]
pub struct MockClient {
    responses: HashMap<(RequestMethod, String), Result<Value, ApiError>>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<(RequestMethod, String, Option<Value>)>>,
}

impl MockClient {
    pub fn new() -> Self {
        MockClient::default()
    }

    pub fn with_get(mut self, path: &str, data: Value) -> Self {
        self.responses.insert((RequestMethod::Get, path.to_string()), Ok(data));
        self
    }

    pub fn with_post(mut self, path: &str, data: Value) -> Self {
        self.responses.insert((RequestMethod::Post, path.to_string()), Ok(data));
        self
    }

    pub fn with_status(mut self, method: RequestMethod, path: &str, status: u16, message: &str) -> Self {
        let error = ApiError::Status {
            path: path.to_string(),
            status,
            message: message.to_string(),
        };
        self.responses.insert((method, path.to_string()), Err(error));
        self
    }

    pub fn with_delay(mut self, path: &str, delay: Duration) -> Self {
        self.delays.insert(path.to_string(), delay);
        self
    }

    /// "METHOD /path" for every request seen, in arrival order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(method, path, _)| format!("{} {}", if *method == RequestMethod::Get { "GET" } else { "POST" }, path))
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_body(&self) -> Option<Value> {
        self.calls.lock().unwrap().last().and_then(|(_, _, body)| body.clone())
    }
}

#[async_trait]
impl ResourceClient for MockClient {
    async fn fetch_resource(
        &self,
        path: &str,
        method: RequestMethod,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        self.calls.lock().unwrap().push((method, path.to_string(), body));
        if let Some(delay) = self.delays.get(path) {
            tokio::time::sleep(*delay).await;
        }
        match self.responses.get(&(method, path.to_string())) {
            Some(answer) => answer.clone(),
            None => Err(ApiError::Transport {
                path: path.to_string(),
                message: "connection refused".to_string(),
            }),
        }
    }
}

/// Two nodes: pve1 answers everything, pve2 is listed but unreachable.
pub fn two_node_cluster() -> MockClient {
    MockClient::new()
        .with_get(
            "/nodes",
            json!([
                {"node": "pve2", "status": "offline"},
                {"node": "pve1", "status": "online", "cpu": 0.12, "maxcpu": 8,
                 "mem": 4294967296u64, "maxmem": 17179869184u64, "uptime": 93784}
            ]),
        )
        .with_get(
            "/nodes/pve1/qemu",
            json!([
                {"vmid": 100, "name": "web", "status": "running", "cpus": 2, "mem": 1073741824u64, "maxmem": 2147483648u64, "uptime": 3600}
            ]),
        )
        .with_get(
            "/nodes/pve1/lxc",
            json!([
                {"vmid": "103", "name": "cache", "status": "stopped"},
                {"vmid": "101", "name": "dns", "status": "running"}
            ]),
        )
        .with_get(
            "/nodes/pve1/storage",
            json!([
                {"storage": "local", "type": "dir", "content": "iso,vztmpl", "active": 1, "shared": 0,
                 "total": 100000000000u64, "used": 25000000000u64, "avail": 75000000000u64}
            ]),
        )
}

pub fn fanout() -> FanOut {
    FanOut::new(4, Duration::from_secs(5))
}

pub fn dispatcher(client: Arc<MockClient>, elevated: bool) -> Dispatcher {
    let tools = ClusterTools::new(ProxmoxApi::new(client), fanout());
    let catalogue = ToolCatalogue::build().unwrap();
    Dispatcher::new(catalogue, PermissionGate::new(elevated), tools)
}
