//! REST client for node-info probes and voting-period proposal lists.
//!
//! `GovernanceApi` is the seam the poller talks to; `RestNodeClient` is the
//! reqwest implementation. Pagination is ignored: voting-period lists are
//! short unless a chain is being spammed.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::NodeConfig;
use crate::node::version::{SchemaVersion, SdkVersion, VOTING_PERIOD_STATUS};

pub const NODE_INFO_PATH: &str = "/cosmos/base/tendermint/v1beta1/node_info";

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("invalid response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },
}

impl NodeError {
    /// The endpoint that failed.
    pub fn url(&self) -> &str {
        match self {
            NodeError::Http { url, .. }
            | NodeError::Status { url, .. }
            | NodeError::InvalidResponse { url, .. } => url,
        }
    }
}

/// Governance endpoints of a node.
#[async_trait]
pub trait GovernanceApi: Send + Sync {
    /// Probe `node_info` and map the SDK version to a schema.
    async fn detect_version(&self, node: &NodeConfig) -> Result<SchemaVersion, NodeError>;

    /// Raw proposals currently in voting period.
    async fn voting_proposals(
        &self,
        node: &NodeConfig,
        version: SchemaVersion,
    ) -> Result<Vec<Value>, NodeError>;
}

#[derive(Debug, Deserialize)]
struct NodeInfoResponse {
    #[serde(default)]
    application_version: Option<ApplicationVersion>,
}

#[derive(Debug, Deserialize)]
struct ApplicationVersion {
    #[serde(default)]
    cosmos_sdk_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProposalsResponse {
    proposals: Vec<Value>,
}

pub struct RestNodeClient {
    client: reqwest::Client,
    probe_timeout: Duration,
    fetch_timeout: Duration,
}

impl RestNodeClient {
    pub fn new(probe_timeout: Duration, fetch_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            probe_timeout,
            fetch_timeout,
        }
    }

    async fn get_text(
        &self,
        url: &str,
        query: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<String, NodeError> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| NodeError::Http {
                url: url.to_string(),
                source: e,
            })?;

        if !resp.status().is_success() {
            return Err(NodeError::Status {
                url: url.to_string(),
                status: resp.status(),
            });
        }

        resp.text().await.map_err(|e| NodeError::Http {
            url: url.to_string(),
            source: e,
        })
    }
}

#[async_trait]
impl GovernanceApi for RestNodeClient {
    async fn detect_version(&self, node: &NodeConfig) -> Result<SchemaVersion, NodeError> {
        let url = format!("{}{}", node.base_url(), NODE_INFO_PATH);
        let body = self.get_text(&url, &[], self.probe_timeout).await?;
        let sdk = parse_node_info(&body).map_err(|reason| NodeError::InvalidResponse {
            url: url.clone(),
            reason,
        })?;
        let schema = sdk.schema();
        debug!(node = %node.label, major = sdk.major, minor = sdk.minor, schema = %schema, "detected SDK version");
        Ok(schema)
    }

    async fn voting_proposals(
        &self,
        node: &NodeConfig,
        version: SchemaVersion,
    ) -> Result<Vec<Value>, NodeError> {
        let url = format!("{}{}", node.base_url(), version.proposals_path());
        let body = self
            .get_text(
                &url,
                &[("proposal_status", VOTING_PERIOD_STATUS)],
                self.fetch_timeout,
            )
            .await?;
        parse_proposals(&body).map_err(|reason| NodeError::InvalidResponse { url, reason })
    }
}

/// Pull `application_version.cosmos_sdk_version` out of a node_info body.
pub fn parse_node_info(body: &str) -> Result<SdkVersion, String> {
    let info: NodeInfoResponse =
        serde_json::from_str(body).map_err(|e| format!("node_info parse error: {}", e))?;
    let raw = info
        .application_version
        .and_then(|v| v.cosmos_sdk_version)
        .ok_or_else(|| "missing application_version.cosmos_sdk_version".to_string())?;
    raw.parse()
}

pub fn parse_proposals(body: &str) -> Result<Vec<Value>, String> {
    let resp: ProposalsResponse =
        serde_json::from_str(body).map_err(|e| format!("proposals parse error: {}", e))?;
    Ok(resp.proposals)
}

/// Fetch a node's voting-period proposals, isolating failures: any error is
/// logged and the node contributes nothing this cycle.
pub async fn fetch_proposals(
    api: &dyn GovernanceApi,
    node: &NodeConfig,
    version: SchemaVersion,
) -> Vec<Value> {
    match api.voting_proposals(node, version).await {
        Ok(proposals) => {
            debug!(node = %node.label, count = proposals.len(), "fetched voting proposals");
            proposals
        }
        Err(e) => {
            warn!(node = %node.label, url = %e.url(), error = %e, "proposal fetch failed, skipping node this cycle");
            Vec::new()
        }
    }
}
