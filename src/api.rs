// src/api.rs
// Typed Proxmox VE endpoints on top of any ResourceClient

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::errors::ApiError;
use crate::inventory::{
    ClusterResource, ClusterStatusEntry, GuestKind, GuestStatus, GuestSummary, NodeStatus, NodeSummary,
    StorageSummary,
};
use crate::proxmox_client::{RequestMethod, ResourceClient};

// Reply of POST /nodes/{node}/qemu/{vmid}/agent/exec
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct AgentExecHandle {
    pub pid: Option<u64>,
}

/// Cheap to clone; every clone shares the same client.
#[derive(Clone)]
pub struct ProxmoxApi {
    client: Arc<dyn ResourceClient>,
}

impl ProxmoxApi {
    pub fn new(client: Arc<dyn ResourceClient>) -> Self {
        ProxmoxApi { client }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let data = self.client.fetch_resource(path, RequestMethod::Get, None).await?;
        decode(path, data)
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.client.fetch_resource(path, RequestMethod::Post, Some(body)).await
    }

    pub async fn nodes(&self) -> Result<Vec<NodeSummary>, ApiError> {
        self.get("/nodes").await
    }

    pub async fn node_status(&self, node: &str) -> Result<NodeStatus, ApiError> {
        self.get(&format!("/nodes/{}/status", node)).await
    }

    pub async fn guests(&self, node: &str, kind: GuestKind) -> Result<Vec<GuestSummary>, ApiError> {
        let mut guests: Vec<GuestSummary> = self.get(&format!("/nodes/{}/{}", node, kind.as_str())).await?;
        for guest in &mut guests {
            guest.node = node.to_string();
            guest.kind = kind;
        }
        Ok(guests)
    }

    pub async fn guest_status(&self, node: &str, kind: GuestKind, vmid: u32) -> Result<GuestStatus, ApiError> {
        self.get(&format!("/nodes/{}/{}/{}/status/current", node, kind.as_str(), vmid)).await
    }

    pub async fn storage(&self, node: &str) -> Result<Vec<StorageSummary>, ApiError> {
        let mut storages: Vec<StorageSummary> = self.get(&format!("/nodes/{}/storage", node)).await?;
        for storage in &mut storages {
            storage.node = node.to_string();
        }
        Ok(storages)
    }

    pub async fn cluster_status(&self) -> Result<Vec<ClusterStatusEntry>, ApiError> {
        self.get("/cluster/status").await
    }

    pub async fn cluster_resources(&self) -> Result<Vec<ClusterResource>, ApiError> {
        self.get("/cluster/resources").await
    }

    /// Hands the command to the QEMU guest agent. Returns as soon as the agent
    /// accepted it; the command may still be running.
    pub async fn agent_exec(&self, node: &str, vmid: u32, command: &str) -> Result<AgentExecHandle, ApiError> {
        let path = format!("/nodes/{}/qemu/{}/agent/exec", node, vmid);
        let data = self.post(&path, json!({ "command": command })).await?;
        decode(&path, data)
    }

    /// Runs the command in the container and waits for its output.
    pub async fn container_exec(&self, node: &str, vmid: u32, command: &str) -> Result<Value, ApiError> {
        let path = format!("/nodes/{}/lxc/{}/exec", node, vmid);
        self.post(&path, json!({ "command": command })).await
    }
}

fn decode<T: DeserializeOwned>(path: &str, data: Value) -> Result<T, ApiError> {
    serde_json::from_value(data).map_err(|e| ApiError::Payload {
        path: path.to_string(),
        message: e.to_string(),
    })
}
