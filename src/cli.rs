// src/cli.rs

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{Config, Transport};

/// proxmox-mcp: MCP server for a Proxmox VE cluster
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional path to the configuration file
    #[clap(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Transport to serve on (overrides [server].transport)
    #[clap(long, value_enum)]
    pub transport: Option<Transport>,

    /// Listen address for the HTTP transport (overrides [server].bind)
    #[clap(long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Enable elevated tools (node status, command execution, full cluster status)
    #[clap(long)]
    pub allow_elevated: bool,

    /// Set log level (RUST_LOG still wins)
    #[clap(long, value_name = "LEVEL", value_enum)]
    pub log_level: Option<LogLevelCli>,

    #[clap(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Serve MCP requests (default)
    Serve,
    /// Print the tool catalogue
    Tools {
        /// Print the exact tools/list result as JSON
        #[clap(long)]
        json: bool,
    },
    /// Validate the configuration and print the effective settings
    CheckConfig,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevelCli {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevelCli {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevelCli::Trace => "trace",
            LogLevelCli::Debug => "debug",
            LogLevelCli::Info => "info",
            LogLevelCli::Warn => "warn",
            LogLevelCli::Error => "error",
        }
    }
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve)
    }

    /// Flags are the last configuration layer; only flags actually given apply.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(transport) = self.transport {
            config.server.transport = transport;
        }
        if let Some(bind) = &self.bind {
            config.server.bind = bind.clone();
        }
        if self.allow_elevated {
            config.permissions.allow_elevated = true;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level.as_str().to_string();
        }
    }
}
