// src/policy.rs
// Permission gate: decides how far a tool may go with the configured API token

use serde_json::Value;
use tracing::info;

use crate::config::{Config, ENV_ALLOW_ELEVATED};
use crate::tools::Tool;

/// What a tool needs from the gate, declared once per tool in the catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElevationRequirement {
    /// Always runs.
    None,
    /// Refused unless elevated.
    Required,
    /// Runs either way; returns more detail when elevated.
    Enhances,
}

/// The gate's verdict for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Full,
    Basic,
    Denied,
}

/// Process-wide and immutable once built.
#[derive(Debug, Clone)]
pub struct PermissionGate {
    elevated: bool,
}

impl PermissionGate {
    pub fn new(elevated: bool) -> Self {
        PermissionGate { elevated }
    }

    pub fn from_config(config: &Config) -> Self {
        let gate = PermissionGate::new(config.permissions.allow_elevated);
        if gate.elevated {
            info!("Elevated tools enabled: node status detail, command execution, cluster resource totals.");
        } else {
            info!("Elevated tools disabled; privileged calls will return a permission notice.");
        }
        gate
    }

    pub fn is_elevated(&self) -> bool {
        self.elevated
    }

    pub fn access_for(&self, tool: Tool) -> Access {
        match (tool.elevation(), self.elevated) {
            (ElevationRequirement::None, _) => Access::Full,
            (_, true) => Access::Full,
            (ElevationRequirement::Enhances, false) => Access::Basic,
            (ElevationRequirement::Required, false) => Access::Denied,
        }
    }

    pub fn allows(&self, tool: Tool) -> bool {
        self.access_for(tool) != Access::Denied
    }
}

/// Text returned in place of a refused call's output.
pub fn permission_notice(tool: Tool, arguments: &Value) -> String {
    let shown = match arguments {
        Value::Null => "{}".to_string(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    };
    format!(
        "⚠️ Elevated permissions required\n\n\
         `{}` needs elevated permissions: {}.\n\n\
         Requested arguments:\n```json\n{}\n```\n\n\
         To allow it, set `{}=true` (or `allow_elevated = true` under [permissions]) and make sure the API \
         token has the matching Proxmox privileges, then restart the server.",
        tool.name(),
        tool.elevation_reason(),
        shown,
        ENV_ALLOW_ELEVATED
    )
}
