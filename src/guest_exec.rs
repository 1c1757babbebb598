// src/guest_exec.rs
// Runs commands inside guests. VMs go through the QEMU guest agent and are
// fire-and-forget; containers share the host kernel and run synchronously.

use serde_json::Value;
use tracing::info;

use crate::api::ProxmoxApi;
use crate::errors::{ApiError, ToolError};
use crate::inventory::GuestKind;
use crate::tools::GuestRef;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    /// Accepted by the guest agent; completion is not tracked.
    Submitted { pid: Option<u64> },
    /// Finished inside the container.
    Completed { output: String },
}

pub async fn execute(api: &ProxmoxApi, guest: &GuestRef, command: &str) -> Result<ExecOutcome, ToolError> {
    match guest.kind {
        GuestKind::Qemu => submit_to_agent(api, guest, command).await,
        GuestKind::Lxc => run_in_container(api, guest, command).await,
    }
}

async fn submit_to_agent(api: &ProxmoxApi, guest: &GuestRef, command: &str) -> Result<ExecOutcome, ToolError> {
    let status = api
        .guest_status(&guest.node, GuestKind::Qemu, guest.vmid)
        .await
        .map_err(|e| failure(guest, command, e.to_string()))?;
    if !status.is_running() {
        return Err(failure(
            guest,
            command,
            format!("VM is not running (status: {})", if status.status.is_empty() { "unknown" } else { status.status.as_str() }),
        ));
    }

    let handle = api
        .agent_exec(&guest.node, guest.vmid, command)
        .await
        .map_err(|e| failure(guest, command, agent_hint(&e)))?;
    info!("Submitted command to guest agent of VM {} on {} (pid {:?})", guest.vmid, guest.node, handle.pid);
    Ok(ExecOutcome::Submitted { pid: handle.pid })
}

async fn run_in_container(api: &ProxmoxApi, guest: &GuestRef, command: &str) -> Result<ExecOutcome, ToolError> {
    let data = api
        .container_exec(&guest.node, guest.vmid, command)
        .await
        .map_err(|e| failure(guest, command, e.to_string()))?;
    info!("Executed command in container {} on {}", guest.vmid, guest.node);
    Ok(ExecOutcome::Completed { output: container_output(&data) })
}

fn failure(guest: &GuestRef, command: &str, message: String) -> ToolError {
    ToolError::CommandFailed {
        command: command.to_string(),
        node: guest.node.clone(),
        vmid: guest.vmid,
        kind: guest.kind.label(),
        message,
    }
}

fn agent_hint(error: &ApiError) -> String {
    let message = error.to_string();
    if message.to_ascii_lowercase().contains("agent") {
        format!("{} (is the QEMU guest agent installed, enabled and running?)", message)
    } else {
        message
    }
}

fn container_output(data: &Value) -> String {
    match data {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Object(map) => ["output", "out-data", "stdout"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string())),
        other => other.to_string(),
    }
}
