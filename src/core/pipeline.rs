use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::store::EntityStore;
use super::tx::validate_request;
use super::{ScoredTransaction, TransactionRequest};
use crate::error::{Error, Result, StoreError};
use crate::notifications::Notifier;
use crate::signals::ScoringEngine;

/// Messages from the pipeline to its consumer.
#[derive(Debug, Clone)]
pub enum PipelineOutput {
    Scored(Arc<ScoredTransaction>),
    Rejected { transaction_id: String, reason: String },
}

/// Validate, score, persist and notify, in that order.
pub struct Processor {
    engine: ScoringEngine,
    notifier: Notifier,
}

impl Processor {
    pub fn new(engine: ScoringEngine, notifier: Notifier) -> Self {
        Self { engine, notifier }
    }

    pub fn engine(&self) -> &ScoringEngine {
        &self.engine
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        self.engine.store()
    }

    /// Handle one live request. Webhooks fire only after a successful save.
    pub fn process(&self, req: TransactionRequest) -> Result<Arc<ScoredTransaction>> {
        let tx = self.record(req, Utc::now())?;
        let sent = self.notifier.notify(&tx);
        if sent > 0 {
            debug!("{} queued for {sent} webhook(s)", tx.id());
        }
        Ok(tx)
    }

    /// Score and save without notifying. History lookups run before the save,
    /// so a request never counts against itself.
    fn record(&self, req: TransactionRequest, now: DateTime<Utc>) -> Result<Arc<ScoredTransaction>> {
        validate_request(&req)?;
        if self.store().get(&req.transaction_id).is_some() {
            return Err(StoreError::DuplicateIdentifier(req.transaction_id).into());
        }

        let outcome = self.engine.score_at(&req, now);
        let (recommendation, risk_level) = self.engine.recommend(outcome.score);
        let scored = ScoredTransaction {
            request: req,
            risk_score: outcome.score,
            risk_level,
            recommendation,
            factors: outcome.factors,
            explanation: outcome.explanation,
            processed_at: now,
        };
        Ok(self.store().save(scored)?)
    }

    /// Process historical requests oldest first. Returns `(loaded, skipped)`.
    pub fn ingest_batch(&self, mut requests: Vec<TransactionRequest>) -> (usize, usize) {
        requests.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        let (mut loaded, mut skipped) = (0, 0);
        for req in requests {
            let id = req.transaction_id.clone();
            match self.record(req, Utc::now()) {
                Ok(_) => loaded += 1,
                Err(e) => {
                    debug!("Skipping {id}: {e}");
                    skipped += 1;
                }
            }
        }
        (loaded, skipped)
    }

    /// Load a JSON array of requests from disk and ingest it.
    pub fn load_seed_file(&self, path: impl AsRef<Path>) -> Result<(usize, usize)> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        let requests: Vec<TransactionRequest> = serde_json::from_str(&contents)?;
        let (loaded, skipped) = self.ingest_batch(requests);
        info!("Seed data loaded from {}: {loaded} loaded, {skipped} skipped", path.display());
        Ok((loaded, skipped))
    }
}

/// Run the pipeline: receive requests, process each, forward the outcome.
pub async fn run_pipeline(
    mut rx: mpsc::UnboundedReceiver<TransactionRequest>,
    out: mpsc::UnboundedSender<PipelineOutput>,
    processor: Arc<Processor>,
) {
    let mut processed: u64 = 0;
    let mut rejected: u64 = 0;

    info!("Pipeline started, waiting for transactions...");

    while let Some(req) = rx.recv().await {
        let id = req.transaction_id.clone();
        let output = match processor.process(req) {
            Ok(tx) => {
                debug!("{} scored {} ({:?})", tx.id(), tx.risk_score, tx.recommendation);
                PipelineOutput::Scored(tx)
            }
            Err(e) => {
                warn!("Rejected {id}: {e}");
                rejected += 1;
                PipelineOutput::Rejected {
                    transaction_id: id,
                    reason: e.to_string(),
                }
            }
        };
        processed += 1;

        if processed % 1000 == 0 {
            info!("Pipeline processed {processed} transactions, {rejected} rejected");
        }

        if out.send(output).is_err() {
            info!("Output channel closed, stopping pipeline");
            break;
        }
    }

    info!("Pipeline shutting down after {processed} transactions, {rejected} rejected");
}
