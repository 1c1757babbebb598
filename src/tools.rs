// src/tools.rs
// The tool catalogue: the fixed set of tools, their schemas, and typed arguments

use jsonschema::JSONSchema;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::errors::ToolError;
use crate::inventory::{GuestFilter, GuestKind};
use crate::policy::ElevationRequirement;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tool {
    GetNodes,
    GetNodeStatus,
    GetVms,
    GetVmStatus,
    ExecuteVmCommand,
    GetStorage,
    GetClusterStatus,
}

impl Tool {
    pub const ALL: [Tool; 7] = [
        Tool::GetNodes,
        Tool::GetNodeStatus,
        Tool::GetVms,
        Tool::GetVmStatus,
        Tool::ExecuteVmCommand,
        Tool::GetStorage,
        Tool::GetClusterStatus,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Tool::GetNodes => "proxmox_get_nodes",
            Tool::GetNodeStatus => "proxmox_get_node_status",
            Tool::GetVms => "proxmox_get_vms",
            Tool::GetVmStatus => "proxmox_get_vm_status",
            Tool::ExecuteVmCommand => "proxmox_execute_vm_command",
            Tool::GetStorage => "proxmox_get_storage",
            Tool::GetClusterStatus => "proxmox_get_cluster_status",
        }
    }

    pub fn elevation(self) -> ElevationRequirement {
        match self {
            Tool::GetNodeStatus | Tool::ExecuteVmCommand => ElevationRequirement::Required,
            Tool::GetClusterStatus => ElevationRequirement::Enhances,
            Tool::GetNodes | Tool::GetVms | Tool::GetVmStatus | Tool::GetStorage => ElevationRequirement::None,
        }
    }

    pub fn elevation_reason(self) -> &'static str {
        match self {
            Tool::GetNodeStatus => "detailed host metrics need audit-level access (Sys.Audit)",
            Tool::ExecuteVmCommand => "it runs arbitrary commands inside guests (VM.Monitor / guest agent access)",
            Tool::GetClusterStatus => "cluster quorum and resource totals need audit-level access",
            Tool::GetNodes | Tool::GetVms | Tool::GetVmStatus | Tool::GetStorage => "no elevation needed",
        }
    }

    fn summary(self) -> &'static str {
        match self {
            Tool::GetNodes => "List all nodes in the Proxmox cluster with their status and resource usage.",
            Tool::GetNodeStatus => "Get detailed status for one node: CPU, load, memory, root filesystem and versions.",
            Tool::GetVms => "List virtual machines and containers across the cluster or on a single node.",
            Tool::GetVmStatus => "Get the current status of one virtual machine or container.",
            Tool::ExecuteVmCommand => {
                "Execute a shell command inside a VM (via the QEMU guest agent, asynchronous) or a container (synchronous)."
            }
            Tool::GetStorage => "List storage pools across the cluster or on a single node.",
            Tool::GetClusterStatus => "Get an overview of cluster health: nodes online, quorum and resource usage.",
        }
    }

    fn input_schema(self) -> Value {
        let node = json!({"type": "string", "description": "Node name, e.g. pve1"});
        let optional_node = json!({"type": "string", "description": "Node name; omit to query every node"});
        let vmid = json!({"type": ["string", "integer"], "description": "VM or container id, e.g. 100"});
        let guest_type = json!({"type": "string", "enum": ["qemu", "lxc"], "default": "qemu",
                                "description": "qemu for virtual machines, lxc for containers"});
        match self {
            Tool::GetNodes | Tool::GetClusterStatus => json!({"type": "object", "properties": {}}),
            Tool::GetNodeStatus => json!({
                "type": "object",
                "properties": {"node": node},
                "required": ["node"]
            }),
            Tool::GetVms => json!({
                "type": "object",
                "properties": {
                    "node": optional_node,
                    "type": {"type": "string", "enum": ["qemu", "lxc", "all"], "default": "all",
                             "description": "Which guests to list"}
                }
            }),
            Tool::GetVmStatus => json!({
                "type": "object",
                "properties": {"node": node, "vmid": vmid, "type": guest_type},
                "required": ["node", "vmid"]
            }),
            Tool::ExecuteVmCommand => json!({
                "type": "object",
                "properties": {
                    "node": node,
                    "vmid": vmid,
                    "command": {"type": "string", "description": "Shell command to run"},
                    "type": guest_type
                },
                "required": ["node", "vmid", "command"]
            }),
            Tool::GetStorage => json!({
                "type": "object",
                "properties": {"node": optional_node}
            }),
        }
    }

    fn required_fields(self) -> &'static [&'static str] {
        match self {
            Tool::GetNodes | Tool::GetVms | Tool::GetStorage | Tool::GetClusterStatus => &[],
            Tool::GetNodeStatus => &["node"],
            Tool::GetVmStatus => &["node", "vmid"],
            Tool::ExecuteVmCommand => &["node", "vmid", "command"],
        }
    }
}

/// What `tools/list` reports for one tool.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: String,
    pub input_schema: Value,
    pub requires_elevation: bool,
    #[serde(skip)]
    pub elevation: ElevationRequirement,
}

impl ToolDescriptor {
    fn for_tool(tool: Tool) -> Self {
        let description = match tool.elevation() {
            ElevationRequirement::None => tool.summary().to_string(),
            ElevationRequirement::Required => format!("{} Requires elevated permissions.", tool.summary()),
            ElevationRequirement::Enhances => {
                format!("{} Returns extended detail when elevated permissions are enabled.", tool.summary())
            }
        };
        ToolDescriptor {
            name: tool.name(),
            description,
            input_schema: tool.input_schema(),
            requires_elevation: tool.elevation() == ElevationRequirement::Required,
            elevation: tool.elevation(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestRef {
    pub node: String,
    pub vmid: u32,
    pub kind: GuestKind,
}

/// A resolved, validated call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    GetNodes,
    GetNodeStatus { node: String },
    GetVms { node: Option<String>, filter: GuestFilter },
    GetVmStatus(GuestRef),
    ExecuteVmCommand { guest: GuestRef, command: String },
    GetStorage { node: Option<String> },
    GetClusterStatus,
}

struct CatalogueEntry {
    tool: Tool,
    descriptor: ToolDescriptor,
    validator: JSONSchema,
}

/// Built once at startup; both `tools/list` and `tools/call` read from it.
pub struct ToolCatalogue {
    entries: Vec<CatalogueEntry>,
}

impl ToolCatalogue {
    pub fn build() -> Result<Self, ToolError> {
        let mut entries = Vec::with_capacity(Tool::ALL.len());
        for tool in Tool::ALL {
            let descriptor = ToolDescriptor::for_tool(tool);
            let validator = JSONSchema::compile(&descriptor.input_schema).map_err(|e| ToolError::InvalidSchema {
                tool: tool.name(),
                message: e.to_string(),
            })?;
            entries.push(CatalogueEntry { tool, descriptor, validator });
        }
        Ok(ToolCatalogue { entries })
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.entries.iter().map(|entry| &entry.descriptor)
    }

    pub fn resolve(&self, name: &str) -> Result<Tool, ToolError> {
        self.entries
            .iter()
            .find(|entry| entry.descriptor.name == name)
            .map(|entry| entry.tool)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }

    /// Checks required fields, then the JSON schema, then turns the arguments
    /// into a typed call. `null` arguments are treated as `{}`.
    pub fn parse_call(&self, tool: Tool, arguments: &Value) -> Result<ToolCall, ToolError> {
        let empty = Map::new();
        let args = match arguments {
            Value::Null => &empty,
            Value::Object(map) => map,
            other => {
                return Err(ToolError::InvalidArguments {
                    tool: tool.name(),
                    message: format!("arguments must be a JSON object, got {}", other),
                })
            }
        };

        for field in tool.required_fields() {
            if args.get(*field).map_or(true, Value::is_null) {
                return Err(ToolError::MissingArgument {
                    tool: tool.name(),
                    field: field.to_string(),
                });
            }
        }

        let entry = self.entries.iter().find(|entry| entry.tool == tool).ok_or_else(|| ToolError::UnknownTool(tool.name().to_string()))?;
        let instance = Value::Object(args.clone());
        if let Err(errors) = entry.validator.validate(&instance) {
            let message = errors.map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
            return Err(ToolError::InvalidArguments { tool: tool.name(), message });
        }

        let call = match tool {
            Tool::GetNodes => ToolCall::GetNodes,
            Tool::GetClusterStatus => ToolCall::GetClusterStatus,
            Tool::GetNodeStatus => ToolCall::GetNodeStatus { node: node_arg(tool, args)? },
            Tool::GetVms => ToolCall::GetVms {
                node: optional_node_arg(tool, args)?,
                filter: str_arg(args, "type").and_then(GuestFilter::parse).unwrap_or_default(),
            },
            Tool::GetVmStatus => ToolCall::GetVmStatus(guest_arg(tool, args)?),
            Tool::ExecuteVmCommand => {
                let guest = guest_arg(tool, args)?;
                let command = str_arg(args, "command").unwrap_or_default();
                if command.trim().is_empty() {
                    return Err(ToolError::InvalidArguments {
                        tool: tool.name(),
                        message: "command must not be empty".to_string(),
                    });
                }
                ToolCall::ExecuteVmCommand { guest, command: command.to_string() }
            }
            Tool::GetStorage => ToolCall::GetStorage { node: optional_node_arg(tool, args)? },
        };
        Ok(call)
    }
}

fn str_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

// Node names end up in REST paths, so only plain host-name characters pass
fn is_valid_node_name(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

fn node_arg(tool: Tool, args: &Map<String, Value>) -> Result<String, ToolError> {
    let node = str_arg(args, "node").unwrap_or_default().trim();
    if !is_valid_node_name(node) {
        return Err(ToolError::InvalidArguments {
            tool: tool.name(),
            message: format!("'{}' is not a valid node name", node),
        });
    }
    Ok(node.to_string())
}

fn optional_node_arg(tool: Tool, args: &Map<String, Value>) -> Result<Option<String>, ToolError> {
    match str_arg(args, "node") {
        Some(node) if !node.trim().is_empty() => node_arg(tool, args).map(Some),
        _ => Ok(None),
    }
}

fn guest_arg(tool: Tool, args: &Map<String, Value>) -> Result<GuestRef, ToolError> {
    let node = node_arg(tool, args)?;
    let raw = args.get("vmid").cloned().unwrap_or(Value::Null);
    let vmid = match &raw {
        Value::Number(number) => number.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(text) => text.trim().parse::<u32>().ok(),
        _ => None,
    };
    let vmid = match vmid {
        Some(vmid) if vmid > 0 => vmid,
        _ => {
            return Err(ToolError::InvalidArguments {
                tool: tool.name(),
                message: format!("vmid must be a positive integer, got {}", raw),
            })
        }
    };
    let kind = str_arg(args, "type").and_then(GuestKind::parse).unwrap_or_default();
    Ok(GuestRef { node, vmid, kind })
}
