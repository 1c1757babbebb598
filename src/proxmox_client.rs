// src/proxmox_client.rs
// HTTP transport to the Proxmox VE REST API

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ProxmoxConfig;
use crate::errors::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestMethod {
    Get,
    Post,
}

/// Issues one authenticated request and hands back the payload's `data`
/// member. Implementations hold only read-only settings and are shared across
/// concurrent fan-out tasks.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    async fn fetch_resource(
        &self,
        path: &str,
        method: RequestMethod,
        body: Option<Value>,
    ) -> Result<Value, ApiError>;
}

pub struct ProxmoxClient {
    http: reqwest::Client,
    base_url: String,
    auth_header: String,
}

impl ProxmoxClient {
    pub fn new(config: &ProxmoxConfig) -> Result<Self> {
        if !config.verify_tls {
            warn!("TLS certificate verification is disabled for {}", config.host);
        }
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("Failed to build HTTP client for the Proxmox API")?;
        info!("Proxmox API client ready for {} as {}!{}", config.base_url(), config.user, config.token_name);
        Ok(ProxmoxClient {
            http,
            base_url: config.base_url(),
            auth_header: config.auth_header(),
        })
    }
}

#[async_trait]
impl ResourceClient for ProxmoxClient {
    async fn fetch_resource(
        &self,
        path: &str,
        method: RequestMethod,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("{:?} {}", method, url);

        let request = match method {
            RequestMethod::Get => self.http.get(&url),
            RequestMethod::Post => self.http.post(&url),
        }
        .header(AUTHORIZATION, &self.auth_header);
        let request = match body {
            Some(body) => request.json(&body),
            None => request,
        };

        let response = request.send().await.map_err(|e| ApiError::Transport {
            path: path.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            // Proxmox puts the reason in the status line and sometimes an `errors` body
            let body = response.text().await.unwrap_or_default();
            let message = match body.trim() {
                "" => status.canonical_reason().unwrap_or("request failed").to_string(),
                text => text.to_string(),
            };
            return Err(ApiError::Status {
                path: path.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let payload: Value = response.json().await.map_err(|e| ApiError::Payload {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        unwrap_data(path, payload)
    }
}

fn unwrap_data(path: &str, payload: Value) -> Result<Value, ApiError> {
    match payload {
        Value::Object(mut map) => map.remove("data").ok_or_else(|| ApiError::Payload {
            path: path.to_string(),
            message: "response has no 'data' member".to_string(),
        }),
        other => Err(ApiError::Payload {
            path: path.to_string(),
            message: format!("expected a JSON object, got {}", other),
        }),
    }
}
