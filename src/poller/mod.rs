//! Poll loop.
//!
//! One cycle: capture the cutoff, detect every node's schema, fetch voting
//! proposals, keep the ones submitted inside `[watermark, cutoff)`,
//! normalize them, persist the new watermark, then notify. The watermark is
//! saved before any notification goes out, so a failed delivery is never
//! retried on the next cycle (at-most-once).

use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{NodeConfig, PollerConfig, ProbeFailurePolicy};
use crate::node::{fetch_proposals, GovernanceApi, NodeError, SchemaVersion};
use crate::notify::Notifier;
use crate::proposal::{submit_time, NormalizeError, NormalizedProposal, Normalizer};
use crate::watermark::{CycleWindow, Watermark, WatermarkStore};

#[derive(Error, Debug)]
pub enum PollError {
    #[error("can't get node info for {node} at {endpoint}, please check configuration: {source}")]
    UnreachableNode {
        node: String,
        endpoint: String,
        #[source]
        source: NodeError,
    },
}

/// What a cycle did.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub window: CycleWindow,
    /// Watermark to pass to the next cycle (already persisted).
    pub watermark: Watermark,
    pub nodes_polled: usize,
    pub nodes_skipped: usize,
    pub fetched: usize,
    pub dropped: usize,
    pub new_proposals: Vec<NormalizedProposal>,
    pub delivered: usize,
}

pub struct Poller {
    nodes: Vec<NodeConfig>,
    api: Arc<dyn GovernanceApi>,
    normalizer: Normalizer,
    notifier: Notifier,
    store: Arc<dyn WatermarkStore>,
    config: PollerConfig,
}

impl Poller {
    pub fn new(
        nodes: Vec<NodeConfig>,
        api: Arc<dyn GovernanceApi>,
        normalizer: Normalizer,
        notifier: Notifier,
        store: Arc<dyn WatermarkStore>,
        config: PollerConfig,
    ) -> Self {
        Self {
            nodes,
            api,
            normalizer,
            notifier,
            store,
            config,
        }
    }

    /// Cycle until a node probe fails under `ProbeFailurePolicy::Abort`.
    pub async fn run_forever(&self, mut watermark: Watermark) -> Result<(), PollError> {
        loop {
            let report = self.run_cycle(watermark).await?;
            watermark = report.watermark;
            debug!(secs = self.config.interval_secs, "sleeping until next cycle");
            tokio::time::sleep(self.config.interval()).await;
        }
    }

    pub async fn run_cycle(&self, watermark: Watermark) -> Result<CycleReport, PollError> {
        // Cutoff is taken before any request goes out.
        let window = CycleWindow::new(watermark, Watermark::now());
        info!(
            since = %watermark,
            until = %window.next_watermark(),
            nodes = self.nodes.len(),
            "poll cycle starting"
        );

        let targets = self.detect_all().await?;
        let batches = self.fetch_all(&targets).await;

        let mut pending = Vec::new();
        let mut fetched = 0;
        let mut dropped = 0;
        for ((node, version), raws) in targets.iter().zip(batches) {
            fetched += raws.len();
            for raw in &raws {
                match self.accept(node, *version, raw, &window) {
                    Ok(Some(proposal)) => {
                        debug!(proposal = %proposal, "new proposal");
                        pending.push(proposal);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        dropped += 1;
                        warn!(node = %node.label, error = %e, "dropping malformed proposal");
                        debug!(node = %node.label, raw = %raw, "malformed proposal payload");
                    }
                }
            }
        }

        let next = window.next_watermark();
        if let Err(e) = self.store.save(next) {
            error!(error = %e, watermark = %next, "failed to persist watermark");
        }

        let delivered = self.notifier.notify_all(&pending).await;

        info!(
            polled = targets.len(),
            fetched,
            new = pending.len(),
            dropped,
            delivered,
            watermark = %next,
            "poll cycle complete"
        );

        Ok(CycleReport {
            window,
            watermark: next,
            nodes_polled: targets.len(),
            nodes_skipped: self.nodes.len() - targets.len(),
            fetched,
            dropped,
            new_proposals: pending,
            delivered,
        })
    }

    async fn detect_all(&self) -> Result<Vec<(&NodeConfig, SchemaVersion)>, PollError> {
        let mut targets = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            match self.api.detect_version(node).await {
                Ok(version) => targets.push((node, version)),
                Err(e) => match self.config.on_probe_failure {
                    ProbeFailurePolicy::Abort => {
                        let endpoint = e.url().to_string();
                        return Err(PollError::UnreachableNode {
                            node: node.label.clone(),
                            endpoint,
                            source: e,
                        });
                    }
                    ProbeFailurePolicy::Skip => {
                        warn!(node = %node.label, url = %e.url(), error = %e, "node info probe failed, skipping node this cycle");
                    }
                },
            }
        }
        Ok(targets)
    }

    /// One batch per target, in target order.
    async fn fetch_all(&self, targets: &[(&NodeConfig, SchemaVersion)]) -> Vec<Vec<Value>> {
        let api = self.api.as_ref();
        if self.config.parallel_fetch {
            return join_all(
                targets
                    .iter()
                    .map(|(node, version)| fetch_proposals(api, node, *version)),
            )
            .await;
        }

        let mut batches = Vec::with_capacity(targets.len());
        for (node, version) in targets {
            batches.push(fetch_proposals(api, node, *version).await);
        }
        batches
    }

    fn accept(
        &self,
        node: &NodeConfig,
        version: SchemaVersion,
        raw: &Value,
        window: &CycleWindow,
    ) -> Result<Option<NormalizedProposal>, NormalizeError> {
        let submitted = submit_time(raw)?;
        if !window.contains(submitted) {
            return Ok(None);
        }
        self.normalizer.normalize(&node.label, raw, version).map(Some)
    }
}
