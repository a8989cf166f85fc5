use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use reqwest::Client;
use serde_json::Value;

use crate::{
    error::ForwardError,
    retry::RetryPolicy,
    schema::{ForwardAck, ForwardPayload, Item},
};

/// ============================================================
/// Occupancy filter
/// ============================================================
///
/// Inclusive `[min, max]` range on item occupancy plus the minimum
/// batch size worth sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccupancyFilter {
    pub min: i64,
    pub max: i64,
    pub min_batch: usize,
}

impl OccupancyFilter {
    pub fn new(min: i64, max: i64, min_batch: usize) -> Self {
        Self {
            min,
            max,
            min_batch,
        }
    }

    pub fn accepts(&self, item: &Item) -> bool {
        item.id.is_some() && (self.min..=self.max).contains(&item.occupancy())
    }

    /// Identifiers of accepted items, in collection order.
    pub fn select_ids(&self, items: &[Item]) -> Vec<Value> {
        items
            .iter()
            .filter(|item| self.accepts(item))
            .filter_map(|item| item.id.clone())
            .collect()
    }
}

/// Result of one forward attempt as seen by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum ForwardOutcome {
    /// Downstream accepted the batch
    Sent { count: usize, added: Option<u64> },

    /// No downstream configured, batch was only logged
    DryRun { count: usize },

    /// Fewer ids than the configured minimum
    Skipped { count: usize },
}

/// ============================================================
/// Forwarder
/// ============================================================
///
/// Posts `{ "servers": [ids...] }` to the aggregation endpoint.
///
/// DRY RUN:
/// - An empty URL disables the network call
/// - Batches are logged instead
///
/// Errors are returned to the scheduler, which logs and swallows them.
pub struct Forwarder {
    client: Client,
    url: Option<String>,
    retry: RetryPolicy,
}

impl Forwarder {
    pub fn new(url: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("building forward http client")?;

        let url = Some(url.trim().to_string()).filter(|u| !u.is_empty());
        if url.is_none() {
            warn!("[FORWARD] MAIN_API_URL not set – running in dry-run mode");
        }

        Ok(Self { client, url, retry })
    }

    pub fn is_dry_run(&self) -> bool {
        self.url.is_none()
    }

    /// Sends `ids` downstream unless the batch is below `min_batch`.
    pub async fn forward(
        &self,
        ids: Vec<Value>,
        min_batch: usize,
    ) -> Result<ForwardOutcome, ForwardError> {
        let count = ids.len();
        if count == 0 || count < min_batch {
            return Ok(ForwardOutcome::Skipped { count });
        }

        let Some(url) = self.url.as_deref() else {
            info!("[FORWARD] dry-run – {} ids", count);
            return Ok(ForwardOutcome::DryRun { count });
        };

        let payload = ForwardPayload { servers: ids };
        let ack = self.retry.run(|_| self.post(url, &payload)).await?;

        Ok(ForwardOutcome::Sent {
            count,
            added: ack.added,
        })
    }

    async fn post(&self, url: &str, payload: &ForwardPayload) -> Result<ForwardAck, ForwardError> {
        let resp = self.client.post(url).json(payload).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ForwardError::Status(status.as_u16()));
        }

        // The batch is delivered once a 2xx arrives; the acknowledgement
        // body is optional and may be unreadable
        match resp.bytes().await {
            Ok(body) => Ok(serde_json::from_slice(&body).unwrap_or_default()),
            Err(e) => {
                debug!("[FORWARD] unreadable acknowledgement: {}", e);
                Ok(ForwardAck::default())
            }
        }
    }
}
