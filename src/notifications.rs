use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::NotificationConfig;
use crate::core::store::EntityStore;
use crate::core::{DeliveryTarget, ScoredTransaction};

pub const HIGH_RISK_EVENT: &str = "high_risk_transaction";
pub const EVENT_HEADER: &str = "X-Fraud-Event";

/// Body POSTed to every matching delivery target.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub event: String,
    pub triggered_at: DateTime<Utc>,
    pub transaction: ScoredTransaction,
}

impl WebhookPayload {
    pub fn high_risk(tx: &ScoredTransaction, now: DateTime<Utc>) -> Self {
        Self {
            event: HIGH_RISK_EVENT.to_string(),
            triggered_at: now,
            transaction: tx.clone(),
        }
    }
}

/// Targets whose threshold is met by `score`.
pub fn matching_targets(targets: Vec<DeliveryTarget>, score: u8) -> Vec<DeliveryTarget> {
    targets.into_iter().filter(|t| t.accepts(score)).collect()
}

/// Webhook sender. Deliveries are fire-and-forget and never retried.
pub struct Notifier {
    enabled: bool,
    store: Arc<EntityStore>,
    client: reqwest::Client,
}

impl Notifier {
    pub fn new(config: &NotificationConfig, store: Arc<EntityStore>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build webhook client: {e}, using defaults");
                reqwest::Client::new()
            });
        Self {
            enabled: config.enabled,
            store,
            client,
        }
    }

    /// Queue a delivery to every active target whose threshold `tx` meets.
    /// Returns the number of deliveries spawned.
    pub fn notify(&self, tx: &ScoredTransaction) -> usize {
        if !self.enabled {
            return 0;
        }
        let targets = matching_targets(self.store.list_active_delivery_targets(), tx.risk_score);
        if targets.is_empty() {
            return 0;
        }

        // Never block the caller: deliveries run on whatever runtime we're inside.
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!(
                    "No async runtime, skipping {} webhook(s) for {}",
                    targets.len(),
                    tx.id()
                );
                return 0;
            }
        };

        let payload = Arc::new(WebhookPayload::high_risk(tx, Utc::now()));
        let count = targets.len();
        for target in targets {
            let client = self.client.clone();
            let payload = Arc::clone(&payload);
            handle.spawn(async move { deliver(client, target, payload).await });
        }
        count
    }
}

async fn deliver(client: reqwest::Client, target: DeliveryTarget, payload: Arc<WebhookPayload>) {
    let result = client
        .post(&target.url)
        .header(EVENT_HEADER, HIGH_RISK_EVENT)
        .json(payload.as_ref())
        .send()
        .await;
    match result {
        Ok(resp) if resp.status().is_success() => tracing::info!(
            "Webhook {} delivered {} (score {}) to {}: {}",
            target.id,
            payload.transaction.id(),
            payload.transaction.risk_score,
            target.url,
            resp.status()
        ),
        Ok(resp) => tracing::warn!(
            "Webhook {} rejected by {}: {}",
            target.id,
            target.url,
            resp.status()
        ),
        Err(e) => tracing::warn!("Webhook {} delivery to {} failed: {e}", target.id, target.url),
    }
}
