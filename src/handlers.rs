// src/handlers.rs
// Executes validated tool calls against the cluster and renders the replies

use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

use crate::api::ProxmoxApi;
use crate::errors::ToolError;
use crate::fanout::{FanOut, FanOutResult};
use crate::guest_exec;
use crate::inventory::{ClusterOverview, GuestFilter, StorageSummary, Target, TargetKind};
use crate::policy::Access;
use crate::render;
use crate::tools::{GuestRef, ToolCall};

#[derive(Clone)]
pub struct ClusterTools {
    api: ProxmoxApi,
    fanout: FanOut,
}

impl ClusterTools {
    pub fn new(api: ProxmoxApi, fanout: FanOut) -> Self {
        ClusterTools { api, fanout }
    }

    /// Runs a call the permission gate already let through. `access` only
    /// matters for tools whose output depends on elevation.
    pub async fn run(&self, call: ToolCall, access: Access) -> Result<String, ToolError> {
        match call {
            ToolCall::GetNodes => self.nodes().await,
            ToolCall::GetNodeStatus { node } => self.node_status(&node).await,
            ToolCall::GetVms { node, filter } => self.guests(node, filter).await,
            ToolCall::GetVmStatus(guest) => self.guest_status(&guest).await,
            ToolCall::ExecuteVmCommand { guest, command } => self.execute(&guest, &command).await,
            ToolCall::GetStorage { node } => self.storage(node).await,
            ToolCall::GetClusterStatus => self.cluster_status(access).await,
        }
    }

    async fn nodes(&self) -> Result<String, ToolError> {
        let mut nodes = self.api.nodes().await?;
        nodes.sort_by(|a, b| a.node.cmp(&b.node));
        Ok(render::render_nodes(&nodes))
    }

    async fn node_status(&self, node: &str) -> Result<String, ToolError> {
        let status = self.api.node_status(node).await?;
        Ok(render::render_node_status(node, &status))
    }

    // An explicit node is used as given; otherwise every node the cluster lists
    async fn target_nodes(&self, node: Option<&str>) -> Result<Vec<String>, ToolError> {
        match node {
            Some(node) => Ok(vec![node.to_string()]),
            None => Ok(self.api.nodes().await?.into_iter().map(|n| n.node).collect()),
        }
    }

    async fn guests(&self, node: Option<String>, filter: GuestFilter) -> Result<String, ToolError> {
        let targets: Vec<Target> = self
            .target_nodes(node.as_deref())
            .await?
            .iter()
            .flat_map(|name| filter.kinds().iter().map(move |kind| Target::guests(name.clone(), *kind)))
            .collect();
        debug!("Listing guests over {} targets", targets.len());

        let api = &self.api;
        let result = self
            .fanout
            .query(targets, |target| async move {
                match target.kind {
                    TargetKind::Guest(kind) => api.guests(&target.node, kind).await,
                    TargetKind::Node => Ok(Vec::new()),
                }
            })
            .await;
        let lists = require_any(result, "Guest listing")?;

        // (vmid, node, kind) is unique; the map also gives the output order
        let merged: BTreeMap<_, _> = lists.into_iter().flatten().map(|guest| (guest.key(), guest)).collect();
        let guests: Vec<_> = merged.into_values().collect();
        Ok(render::render_guests(&guests, node.as_deref(), filter))
    }

    async fn guest_status(&self, guest: &GuestRef) -> Result<String, ToolError> {
        let status = self.api.guest_status(&guest.node, guest.kind, guest.vmid).await?;
        Ok(render::render_guest_status(guest, &status))
    }

    async fn execute(&self, guest: &GuestRef, command: &str) -> Result<String, ToolError> {
        let outcome = guest_exec::execute(&self.api, guest, command).await?;
        Ok(render::render_exec(guest, command, &outcome))
    }

    async fn storage(&self, node: Option<String>) -> Result<String, ToolError> {
        let targets: Vec<Target> = self.target_nodes(node.as_deref()).await?.into_iter().map(Target::node).collect();

        let api = &self.api;
        let result = self
            .fanout
            .query(targets, |target| async move { api.storage(&target.node).await })
            .await;
        let lists = require_any(result, "Storage listing")?;

        let storages = merge_storage(lists.into_iter().flatten());
        Ok(render::render_storage(&storages, node.as_deref()))
    }

    async fn cluster_status(&self, access: Access) -> Result<String, ToolError> {
        let overview = match access {
            Access::Full => {
                let (nodes, status, resources) =
                    tokio::join!(self.api.nodes(), self.api.cluster_status(), self.api.cluster_resources());
                // the node list is the basic view; the other two only enrich it
                let mut overview = ClusterOverview {
                    nodes: nodes?,
                    ..Default::default()
                };
                match status {
                    Ok(status) => overview.cluster = status.into_iter().find(|entry| entry.entry_type == "cluster"),
                    Err(e) => {
                        warn!("Cluster status unavailable: {}", e);
                        overview.unavailable.push("/cluster/status".to_string());
                    }
                }
                match resources {
                    Ok(resources) => overview.resources = Some(resources),
                    Err(e) => {
                        warn!("Cluster resources unavailable: {}", e);
                        overview.unavailable.push("/cluster/resources".to_string());
                    }
                }
                overview
            }
            Access::Basic | Access::Denied => ClusterOverview {
                nodes: self.api.nodes().await?,
                ..Default::default()
            },
        };
        Ok(render::render_cluster(&overview, access))
    }
}

fn require_any<T>(result: FanOutResult<T>, operation: &'static str) -> Result<Vec<T>, ToolError> {
    if result.all_failed() {
        return Err(ToolError::AllTargetsFailed {
            operation,
            details: result.failure_summary(),
        });
    }
    Ok(result.into_values().collect())
}

// Shared storages are reported by every node that mounts them; keep the first
fn merge_storage(storages: impl Iterator<Item = StorageSummary>) -> Vec<StorageSummary> {
    let mut seen_shared = HashSet::new();
    let mut merged: Vec<StorageSummary> = storages
        .filter(|storage| !storage.is_shared() || seen_shared.insert(storage.storage.clone()))
        .collect();
    merged.sort_by(|a, b| (&a.storage, &a.node).cmp(&(&b.storage, &b.node)));
    merged
}
