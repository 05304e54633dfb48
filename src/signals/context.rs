use std::sync::Arc;

use chrono::Duration;

use crate::config::ScoringConfig;
use crate::core::store::EntityStore;
use crate::core::{EntityType, ScoredTransaction, TransactionRequest};

/// A request plus the history snapshot every rule reads from.
///
/// Built before the request is saved, so none of the windows contain it.
#[derive(Debug)]
pub struct RuleContext<'a> {
    pub req: &'a TransactionRequest,
    pub config: &'a ScoringConfig,
    /// Same email, 24h before the request.
    pub email_last_24h: Vec<Arc<ScoredTransaction>>,
    /// Same email, 10 minutes before the request.
    pub email_last_10m: Vec<Arc<ScoredTransaction>>,
    pub ip_last_1h: Vec<Arc<ScoredTransaction>>,
    pub device_last_30m: Vec<Arc<ScoredTransaction>>,
    pub bin_last_1h: Vec<Arc<ScoredTransaction>>,
    /// Distinct card BINs ever used from the request's IP.
    pub unique_bins_by_ip: usize,
}

impl<'a> RuleContext<'a> {
    pub fn build(store: &EntityStore, req: &'a TransactionRequest, config: &'a ScoringConfig) -> Self {
        let t = req.timestamp;
        Self {
            req,
            config,
            email_last_24h: store.query_by_entity(EntityType::Email, &req.user_email, t - Duration::hours(24)),
            email_last_10m: store.query_by_entity(EntityType::Email, &req.user_email, t - Duration::minutes(10)),
            ip_last_1h: store.query_by_entity(EntityType::Ip, &req.ip_address, t - Duration::hours(1)),
            device_last_30m: store.query_by_entity(
                EntityType::Device,
                &req.device_fingerprint,
                t - Duration::minutes(30),
            ),
            bin_last_1h: store.query_by_entity(EntityType::Bin, &req.card_bin, t - Duration::hours(1)),
            unique_bins_by_ip: store.distinct_card_prefix_count(&req.ip_address),
        }
    }

    /// A context with no history at all.
    pub fn without_history(req: &'a TransactionRequest, config: &'a ScoringConfig) -> Self {
        Self {
            req,
            config,
            email_last_24h: Vec::new(),
            email_last_10m: Vec::new(),
            ip_last_1h: Vec::new(),
            device_last_30m: Vec::new(),
            bin_last_1h: Vec::new(),
            unique_bins_by_ip: 0,
        }
    }
}
