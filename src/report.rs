//! Aggregate views over stored transactions for operations dashboards.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::core::store::EntityStore;
use crate::core::{EntityType, RiskLevel, ScoredTransaction};
use crate::error::ValidationError;

const VELOCITY_MIN_COUNT: usize = 5;
const CARD_CYCLING_MIN_BINS: usize = 3;
const BIN_CONCENTRATION_MIN_COUNT: usize = 5;
const MAX_EXAMPLES: usize = 3;

/// Look-back accepted by [`entity_summary`], in days.
pub const ENTITY_SUMMARY_DAYS: std::ops::RangeInclusive<u32> = 1..=90;
pub const DEFAULT_SUMMARY_DAYS: u32 = 7;

/// An entity summary request in `type:value[:days]` form, e.g. `ip:1.2.3.4:30`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityQuery {
    pub entity: EntityType,
    pub value: String,
    pub days: u32,
}

impl FromStr for EntityQuery {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (entity, rest) = s.split_once(':').unwrap_or((s, ""));
        let entity: EntityType = entity.parse()?;
        // A trailing numeric segment is the look-back; anything else belongs to the value.
        let (value, days) = match rest.rsplit_once(':') {
            Some((value, days)) if !days.is_empty() && days.bytes().all(|b| b.is_ascii_digit()) => {
                let days = days.parse().unwrap_or(u32::MAX);
                (value, days)
            }
            _ => (rest, DEFAULT_SUMMARY_DAYS),
        };
        if value.trim().is_empty() {
            return Err(ValidationError::MissingField("value"));
        }
        if !ENTITY_SUMMARY_DAYS.contains(&days) {
            return Err(ValidationError::DaysOutOfRange(days));
        }
        Ok(Self {
            entity,
            value: value.to_string(),
            days,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FraudReport {
    pub generated_at: DateTime<Utc>,
    pub period: String,
    pub summary: ReportSummary,
    pub patterns: Vec<FraudPattern>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportSummary {
    pub total_transactions: usize,
    pub high_risk_count: usize,
    pub medium_risk_count: usize,
    pub low_risk_count: usize,
    pub avg_risk_score: f64,
    /// Summed amount of the high band only.
    pub total_flagged_amount: f64,
}

/// A recurring suspicious behaviour seen across the window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FraudPattern {
    #[serde(rename = "type")]
    pub pattern_type: String,
    pub description: String,
    pub count: usize,
    pub total_amount: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntitySummary {
    pub entity_type: EntityType,
    pub entity_value: String,
    pub period: String,
    pub total_count: usize,
    pub high_risk_count: usize,
    pub avg_risk_score: f64,
    pub total_amount: f64,
    /// Newest first.
    pub transactions: Vec<ScoredTransaction>,
}

/// Per-key tally used by the pattern detectors.
#[derive(Default)]
struct Group<'a> {
    count: usize,
    amount: f64,
    ids: Vec<&'a str>,
}

impl<'a> Group<'a> {
    fn add(&mut self, tx: &'a ScoredTransaction) {
        self.count += 1;
        self.amount += tx.request.amount;
        if self.ids.len() < MAX_EXAMPLES {
            self.ids.push(tx.id());
        }
    }

    fn examples(&self) -> Vec<String> {
        self.ids.iter().map(|id| id.to_string()).collect()
    }
}

fn average_score(records: &[Arc<ScoredTransaction>]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let total: u64 = records.iter().map(|tx| u64::from(tx.risk_score)).sum();
    total as f64 / records.len() as f64
}

/// Classify `records` and detect the four aggregate patterns.
///
/// Bands come from each record's stored risk level, so the report agrees with
/// whatever thresholds were in force when it was scored.
pub fn build_fraud_report(records: &[Arc<ScoredTransaction>], now: DateTime<Utc>, period: &str) -> FraudReport {
    let mut summary = ReportSummary {
        total_transactions: records.len(),
        avg_risk_score: average_score(records),
        ..ReportSummary::default()
    };

    // BTreeMaps keep iteration, and so example selection, deterministic.
    let mut by_ip: BTreeMap<&str, Group> = BTreeMap::new();
    let mut by_email: BTreeMap<&str, Group> = BTreeMap::new();
    let mut by_bin: BTreeMap<&str, Group> = BTreeMap::new();
    let mut bins_by_ip: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();

    let mut ordered: Vec<&ScoredTransaction> = records.iter().map(Arc::as_ref).collect();
    ordered.sort_by(|a, b| a.request.timestamp.cmp(&b.request.timestamp).then_with(|| a.id().cmp(b.id())));

    for tx in ordered {
        match tx.risk_level {
            RiskLevel::High => {
                summary.high_risk_count += 1;
                summary.total_flagged_amount += tx.request.amount;
            }
            RiskLevel::Medium => summary.medium_risk_count += 1,
            RiskLevel::Low => summary.low_risk_count += 1,
        }
        let req = &tx.request;
        by_ip.entry(&req.ip_address).or_default().add(tx);
        by_email.entry(&req.user_email).or_default().add(tx);
        by_bin.entry(&req.card_bin).or_default().add(tx);
        bins_by_ip.entry(&req.ip_address).or_default().insert(&req.card_bin);
    }

    let mut patterns = Vec::new();

    for (ip, group) in by_ip.iter().filter(|(_, g)| g.count >= VELOCITY_MIN_COUNT) {
        patterns.push(FraudPattern {
            pattern_type: "ip_velocity".into(),
            description: format!("IP {ip} made {} transactions in the window", group.count),
            count: group.count,
            total_amount: group.amount,
            examples: group.examples(),
        });
    }

    for (email, group) in by_email.iter().filter(|(_, g)| g.count >= VELOCITY_MIN_COUNT) {
        patterns.push(FraudPattern {
            pattern_type: "email_velocity".into(),
            description: format!("Email {email} made {} transactions in the window", group.count),
            count: group.count,
            total_amount: group.amount,
            examples: group.examples(),
        });
    }

    for (ip, bins) in bins_by_ip.iter().filter(|(_, b)| b.len() >= CARD_CYCLING_MIN_BINS) {
        let group = &by_ip[ip];
        patterns.push(FraudPattern {
            pattern_type: "card_cycling".into(),
            description: format!("IP {ip} used {} distinct card BINs", bins.len()),
            count: bins.len(),
            total_amount: group.amount,
            examples: group.examples(),
        });
    }

    for (bin, group) in by_bin.iter().filter(|(_, g)| g.count >= BIN_CONCENTRATION_MIN_COUNT) {
        patterns.push(FraudPattern {
            pattern_type: "bin_concentration".into(),
            description: format!("Card BIN {bin} appeared in {} transactions", group.count),
            count: group.count,
            total_amount: group.amount,
            examples: group.examples(),
        });
    }

    patterns.sort_by(|a, b| {
        Reverse(a.count)
            .cmp(&Reverse(b.count))
            .then_with(|| a.pattern_type.cmp(&b.pattern_type))
            .then_with(|| a.description.cmp(&b.description))
    });

    FraudReport {
        generated_at: now,
        period: period.to_string(),
        summary,
        patterns,
    }
}

/// Report over the 24 hours before `now`.
pub fn fraud_report(store: &EntityStore, now: DateTime<Utc>) -> FraudReport {
    let records = store.query_all(now - Duration::hours(24));
    tracing::debug!("Building fraud report over {} transactions", records.len());
    build_fraud_report(&records, now, "last_24_hours")
}

/// Activity of one entity over the last `days` days.
pub fn entity_summary(
    store: &EntityStore,
    entity: EntityType,
    value: &str,
    days: u32,
    now: DateTime<Utc>,
) -> Result<EntitySummary, ValidationError> {
    if !ENTITY_SUMMARY_DAYS.contains(&days) {
        return Err(ValidationError::DaysOutOfRange(days));
    }
    let mut records = store.query_by_entity_days(entity, value, days, now);
    records.sort_by(|a, b| b.request.timestamp.cmp(&a.request.timestamp).then_with(|| a.id().cmp(b.id())));

    Ok(EntitySummary {
        entity_type: entity,
        entity_value: value.to_string(),
        period: format!("last_{days}_days"),
        total_count: records.len(),
        high_risk_count: records.iter().filter(|tx| tx.risk_level == RiskLevel::High).count(),
        avg_risk_score: average_score(&records),
        total_amount: records.iter().map(|tx| tx.request.amount).sum(),
        transactions: records.iter().map(|tx| ScoredTransaction::clone(tx)).collect(),
    })
}
