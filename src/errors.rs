// src/errors.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting '{field}' (set it in config.toml or via {env_var})")]
    MissingSetting {
        field: &'static str,
        env_var: &'static str,
    },
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("TOML deserialization error: {0}")]
    TomlError(#[from] toml::de::Error),
    #[error("XDG directory error: {0}")]
    XdgError(#[from] xdg::BaseDirectoriesError),
}

/// A single failed request against the Proxmox API.
///
/// Cloneable so fan-out can keep one per failed target.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("request to {path} failed: {message}")]
    Transport { path: String, message: String },
    #[error("{path} returned HTTP {status}: {message}")]
    Status {
        path: String,
        status: u16,
        message: String,
    },
    #[error("unexpected payload from {path}: {message}")]
    Payload { path: String, message: String },
    #[error("no answer from {target} within {timeout_ms} ms")]
    Timeout { target: String, timeout_ms: u64 },
}

/// Failures reported back to the caller inside a successful `tools/call` result.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Missing required argument '{field}' for {tool}")]
    MissingArgument { tool: &'static str, field: String },
    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: &'static str, message: String },
    #[error("Proxmox API error: {0}")]
    Api(#[from] ApiError),
    #[error("{operation} failed on every node: {details}")]
    AllTargetsFailed {
        operation: &'static str,
        details: String,
    },
    #[error("Failed to execute command `{command}` on {kind} {vmid} (node {node}): {message}")]
    CommandFailed {
        command: String,
        node: String,
        vmid: u32,
        kind: &'static str,
        message: String,
    },
    #[error("Invalid input schema for {tool}: {message}")]
    InvalidSchema { tool: &'static str, message: String },
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid bind address '{0}'")]
    InvalidBind(String),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON serialization error: {0}")]
    JsonSerializationError(#[from] serde_json::Error),
}
