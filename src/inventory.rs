// src/inventory.rs
// Cluster inventory as reported by the Proxmox VE API, plus the fan-out target model

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// Represents the type of guest
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum GuestKind {
    #[default]
    Qemu,
    Lxc,
}

impl GuestKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "qemu" => Some(GuestKind::Qemu),
            "lxc" => Some(GuestKind::Lxc),
            _ => None,
        }
    }

    /// Path segment used by the REST API.
    pub fn as_str(self) -> &'static str {
        match self {
            GuestKind::Qemu => "qemu",
            GuestKind::Lxc => "lxc",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GuestKind::Qemu => "VM",
            GuestKind::Lxc => "container",
        }
    }
}

/// Which guest kinds a listing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GuestFilter {
    Qemu,
    Lxc,
    #[default]
    All,
}

impl GuestFilter {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "qemu" => Some(GuestFilter::Qemu),
            "lxc" => Some(GuestFilter::Lxc),
            "all" => Some(GuestFilter::All),
            _ => None,
        }
    }

    pub fn kinds(self) -> &'static [GuestKind] {
        match self {
            GuestFilter::Qemu => &[GuestKind::Qemu],
            GuestFilter::Lxc => &[GuestKind::Lxc],
            GuestFilter::All => &[GuestKind::Qemu, GuestKind::Lxc],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TargetKind {
    Node,
    Guest(GuestKind),
}

/// One addressable unit of a fan-out: a node, or one guest kind on a node.
/// Ordering is by node name first, which gives listings their stable order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Target {
    pub node: String,
    pub kind: TargetKind,
}

impl Target {
    pub fn node(node: impl Into<String>) -> Self {
        Target { node: node.into(), kind: TargetKind::Node }
    }

    pub fn guests(node: impl Into<String>, kind: GuestKind) -> Self {
        Target { node: node.into(), kind: TargetKind::Guest(kind) }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TargetKind::Node => write!(f, "node {}", self.node),
            TargetKind::Guest(kind) => write!(f, "{}/{}", self.node, kind.as_str()),
        }
    }
}

// Proxmox encodes booleans as 0/1 integers
pub fn flag(value: Option<u64>) -> bool {
    value.unwrap_or(0) != 0
}

// LXC listings have reported vmid as a string on some PVE releases
fn de_vmid<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawVmid {
        Number(u32),
        Text(String),
    }

    match RawVmid::deserialize(deserializer)? {
        RawVmid::Number(vmid) => Ok(vmid),
        RawVmid::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

// Entry of GET /nodes
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct NodeSummary {
    pub node: String,
    #[serde(default)]
    pub status: String,
    pub cpu: Option<f64>,
    pub maxcpu: Option<u32>,
    pub mem: Option<u64>,
    pub maxmem: Option<u64>,
    pub disk: Option<u64>,
    pub maxdisk: Option<u64>,
    pub uptime: Option<u64>,
}

impl NodeSummary {
    pub fn is_online(&self) -> bool {
        self.status == "online"
    }
}

// GET /nodes/{node}/status
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct NodeStatus {
    pub cpu: Option<f64>,
    #[serde(default)]
    pub loadavg: Vec<String>,
    pub memory: Option<MemoryUsage>,
    pub rootfs: Option<MemoryUsage>,
    pub swap: Option<MemoryUsage>,
    pub uptime: Option<u64>,
    pub kversion: Option<String>,
    pub pveversion: Option<String>,
    pub cpuinfo: Option<CpuInfo>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct MemoryUsage {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub used: u64,
    #[serde(default)]
    pub free: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct CpuInfo {
    pub model: Option<String>,
    pub cpus: Option<u32>,
    pub sockets: Option<u32>,
    pub cores: Option<u32>,
}

// Entry of GET /nodes/{node}/{qemu|lxc}; node and kind are filled in by the caller
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct GuestSummary {
    #[serde(deserialize_with = "de_vmid")]
    pub vmid: u32,
    pub name: Option<String>,
    #[serde(default)]
    pub status: String,
    pub cpu: Option<f64>,
    pub cpus: Option<f64>,
    pub mem: Option<u64>,
    pub maxmem: Option<u64>,
    pub maxdisk: Option<u64>,
    pub uptime: Option<u64>,
    #[serde(skip_deserializing, default)]
    pub node: String,
    #[serde(skip_deserializing, default)]
    pub kind: GuestKind,
}

impl GuestSummary {
    /// Guest ids are only unique per (node, kind).
    pub fn key(&self) -> (u32, String, GuestKind) {
        (self.vmid, self.node.clone(), self.kind)
    }
}

// GET /nodes/{node}/{kind}/{vmid}/status/current
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct GuestStatus {
    #[serde(default)]
    pub status: String,
    pub name: Option<String>,
    pub qmpstatus: Option<String>,
    pub cpu: Option<f64>,
    pub cpus: Option<f64>,
    pub mem: Option<u64>,
    pub maxmem: Option<u64>,
    pub disk: Option<u64>,
    pub maxdisk: Option<u64>,
    pub uptime: Option<u64>,
    pub netin: Option<u64>,
    pub netout: Option<u64>,
    pub agent: Option<u64>,
}

impl GuestStatus {
    pub fn is_running(&self) -> bool {
        self.status == "running"
    }
}

// Entry of GET /nodes/{node}/storage; node is filled in by the caller
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct StorageSummary {
    pub storage: String,
    #[serde(rename = "type", default)]
    pub storage_type: String,
    #[serde(default)]
    pub content: String,
    pub active: Option<u64>,
    pub enabled: Option<u64>,
    pub shared: Option<u64>,
    pub total: Option<u64>,
    pub used: Option<u64>,
    pub avail: Option<u64>,
    #[serde(skip_deserializing, default)]
    pub node: String,
}

impl StorageSummary {
    pub fn is_shared(&self) -> bool {
        flag(self.shared)
    }
}

// Entry of GET /cluster/status: one "cluster" row plus one row per node
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ClusterStatusEntry {
    #[serde(rename = "type")]
    pub entry_type: String,
    #[serde(default)]
    pub name: String,
    pub online: Option<u64>,
    pub quorate: Option<u64>,
    pub nodes: Option<u64>,
    pub ip: Option<String>,
}

// Entry of GET /cluster/resources
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ClusterResource {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub id: String,
    pub node: Option<String>,
    pub status: Option<String>,
    pub maxcpu: Option<f64>,
    pub mem: Option<u64>,
    pub maxmem: Option<u64>,
    pub disk: Option<u64>,
    pub maxdisk: Option<u64>,
}

/// Input for the cluster status report. `cluster` and `resources` are only
/// fetched with elevated access; `unavailable` names the endpoints that were
/// asked for but did not answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterOverview {
    pub nodes: Vec<NodeSummary>,
    pub cluster: Option<ClusterStatusEntry>,
    pub resources: Option<Vec<ClusterResource>>,
    pub unavailable: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn guest_vmid_accepts_number_or_string() {
        let numeric: GuestSummary = serde_json::from_value(json!({"vmid": 101, "status": "running"})).unwrap();
        let textual: GuestSummary = serde_json::from_value(json!({"vmid": "103", "status": "stopped"})).unwrap();
        assert_eq!(numeric.vmid, 101);
        assert_eq!(textual.vmid, 103);
        assert!(serde_json::from_value::<GuestSummary>(json!({"vmid": "abc"})).is_err());
    }

    #[test]
    fn targets_order_by_node_then_kind() {
        let mut targets = vec![
            Target::guests("pve2", GuestKind::Qemu),
            Target::guests("pve1", GuestKind::Lxc),
            Target::guests("pve1", GuestKind::Qemu),
        ];
        targets.sort();
        assert_eq!(
            targets,
            vec![
                Target::guests("pve1", GuestKind::Qemu),
                Target::guests("pve1", GuestKind::Lxc),
                Target::guests("pve2", GuestKind::Qemu),
            ]
        );
        assert_eq!(targets[1].to_string(), "pve1/lxc");
        assert_eq!(Target::node("pve3").to_string(), "node pve3");
    }

    #[test]
    fn guest_filter_expands_to_kinds() {
        assert_eq!(GuestFilter::All.kinds(), &[GuestKind::Qemu, GuestKind::Lxc]);
        assert_eq!(GuestFilter::parse("lxc"), Some(GuestFilter::Lxc));
        assert_eq!(GuestFilter::parse("docker"), None);
    }

    #[test]
    fn storage_type_field_is_renamed() {
        let storage: StorageSummary = serde_json::from_value(json!({
            "storage": "local-lvm", "type": "lvmthin", "content": "images,rootdir", "shared": 0
        }))
        .unwrap();
        assert_eq!(storage.storage_type, "lvmthin");
        assert!(!storage.is_shared());
    }
}
