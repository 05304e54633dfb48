pub mod context;
pub mod rules;
pub mod score;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::ScoringConfig;
use crate::core::store::EntityStore;
use crate::core::{BlocklistEntry, EntityType, ListType, Recommendation, RiskFactor, RiskLevel, TransactionRequest};
use context::RuleContext;
use rules::Rule;

/// Result of scoring one request. Not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreOutcome {
    pub score: u8,
    pub factors: Vec<RiskFactor>,
    pub explanation: String,
}

/// The scoring engine checks overrides, then applies all rules and reduces
/// their factors to a single score.
pub struct ScoringEngine {
    store: Arc<EntityStore>,
    config: ScoringConfig,
    rules: Vec<Box<dyn Rule + Send + Sync>>,
}

impl ScoringEngine {
    pub fn new(store: Arc<EntityStore>, config: ScoringConfig) -> Self {
        Self {
            store,
            config,
            rules: rules::default_rules(),
        }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    pub fn score(&self, req: &TransactionRequest) -> ScoreOutcome {
        self.score_at(req, Utc::now())
    }

    /// Score `req`, judging block/allow expiry against `now`.
    pub fn score_at(&self, req: &TransactionRequest, now: DateTime<Utc>) -> ScoreOutcome {
        if let Some(entry) = self.find_override(req, now) {
            tracing::debug!(
                "{} matched {} entry {} for {}",
                req.transaction_id,
                entry.list_type.as_str(),
                entry.id,
                entry.entity_type
            );
            return override_outcome(&entry);
        }

        let ctx = RuleContext::build(&self.store, req, &self.config);
        let factors: Vec<RiskFactor> = self
            .rules
            .iter()
            .flat_map(|rule| rule.evaluate(&ctx))
            .collect();

        let score = score::total_score(&factors);
        let explanation = score::build_explanation(score, &factors);
        ScoreOutcome {
            score,
            factors,
            explanation,
        }
    }

    pub fn recommend(&self, score: u8) -> (Recommendation, RiskLevel) {
        score::recommend(score, &self.config)
    }

    /// First live block/allow hit, checking email, ip, bin, device in that order.
    fn find_override(&self, req: &TransactionRequest, now: DateTime<Utc>) -> Option<BlocklistEntry> {
        EntityType::ALL
            .into_iter()
            .find_map(|entity| self.store.check_blocklist_at(entity, req.entity_value(entity), now))
    }
}

fn override_outcome(entry: &BlocklistEntry) -> ScoreOutcome {
    let (name, score) = match entry.list_type {
        ListType::Block => ("blocklist_match", 100),
        ListType::Allow => ("allowlist_match", 0),
    };
    let list = match entry.list_type {
        ListType::Block => "blocklist",
        ListType::Allow => "allowlist",
    };
    let factors = vec![RiskFactor::new(
        name,
        format!("{} '{}' is on the {list}: {}", entry.entity_type, entry.value, entry.reason),
        u32::from(score),
    )];
    let explanation = score::build_explanation(score, &factors);
    ScoreOutcome {
        score,
        factors,
        explanation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::tests::{base_time, make_tx};
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn engine() -> ScoringEngine {
        ScoringEngine::new(Arc::new(EntityStore::new()), ScoringConfig::default())
    }

    /// A clean BR request from a long-lived account.
    fn clean_req(id: &str, amount: f64) -> TransactionRequest {
        let mut req = make_tx(id, "shopper@example.com", "177.10.20.30", "453211", base_time()).request;
        req.amount = amount;
        req
    }

    fn factor<'a>(outcome: &'a ScoreOutcome, name: &str) -> Option<&'a RiskFactor> {
        outcome.factors.iter().find(|f| f.name == name)
    }

    fn list_entry(entity: EntityType, value: &str, list: ListType) -> BlocklistEntry {
        BlocklistEntry {
            id: format!("{}-{value}", list.as_str()),
            entity_type: entity,
            value: value.to_string(),
            list_type: list,
            reason: "manual review".into(),
            created_at: base_time(),
            expires_at: None,
        }
    }

    #[test]
    fn high_risk_cross_border_is_declined() {
        let engine = engine();
        let mut req = clean_req("txn_ru", 120.0);
        req.ip_country = "RU".into();
        req.card_country = "US".into();
        req.merchant_country = "BR".into();
        req.card_bin = "411111".into();
        req.timestamp = Utc.with_ymd_and_hms(2026, 2, 25, 3, 30, 0).unwrap();
        req.account_created_at = req.timestamp - Duration::minutes(15);

        let outcome = engine.score(&req);
        assert!(outcome.score > 70, "score {}", outcome.score);
        assert_eq!(engine.recommend(outcome.score).0, Recommendation::Decline);
        assert!(factor(&outcome, "bin_high_risk").is_some());
        assert!(factor(&outcome, "account_age_critical").is_some());
        assert!(factor(&outcome, "off_hours").is_some());
    }

    #[test]
    fn first_small_transaction_is_approved() {
        let engine = engine();
        let outcome = engine.score(&clean_req("txn_first", 30.0));
        assert_eq!(outcome.factors.len(), 1);
        assert_eq!(outcome.factors[0].name, "first_transaction");
        assert_eq!(outcome.factors[0].score_delta, 5);
        assert_eq!(outcome.score, 5);
        assert_eq!(engine.recommend(outcome.score), (Recommendation::Approve, RiskLevel::Low));
    }

    #[test]
    fn twelve_times_average_is_extreme_anomaly() {
        let engine = engine();
        for i in 0..3 {
            let mut tx = make_tx(
                &format!("h{i}"),
                "shopper@example.com",
                "177.10.20.30",
                "453211",
                base_time() - Duration::hours(3 + i),
            );
            tx.request.amount = [40.0, 50.0, 60.0][i as usize];
            engine.store().save(tx).unwrap();
        }
        let outcome = engine.score(&clean_req("txn_big", 600.0));
        let f = factor(&outcome, "amount_anomaly_extreme").unwrap();
        assert_eq!(f.score_delta, 30);
    }

    #[test]
    fn burst_from_one_email_caps_ten_minute_velocity() {
        let engine = engine();
        for i in 1..=8i64 {
            engine
                .store()
                .save(make_tx(
                    &format!("b{i}"),
                    "shopper@example.com",
                    &format!("10.0.0.{i}"),
                    "453211",
                    base_time() - Duration::seconds(100 * i),
                ))
                .unwrap();
        }
        let outcome = engine.score(&clean_req("txn_burst", 50.0));
        assert_eq!(factor(&outcome, "email_velocity_10min").unwrap().score_delta, 30);
        assert_eq!(factor(&outcome, "email_velocity_24h").unwrap().score_delta, 25);
    }

    #[test]
    fn three_bins_from_one_ip_is_card_cycling() {
        let engine = engine();
        for (i, bin) in ["111111", "222222", "333333"].iter().enumerate() {
            engine
                .store()
                .save(make_tx(
                    &format!("c{i}"),
                    &format!("acct{i}@example.com"),
                    "177.10.20.30",
                    bin,
                    base_time() - Duration::days(2),
                ))
                .unwrap();
        }
        let outcome = engine.score(&clean_req("txn_cycle", 20.0));
        let f = factor(&outcome, "card_cycling_ip").unwrap();
        assert!(f.score_delta >= 24);
        assert!(outcome.score >= 24);
    }

    #[test]
    fn blocklist_forces_hundred() {
        let engine = engine();
        engine
            .store()
            .upsert_blocklist_entry(list_entry(EntityType::Device, "dev-shopper@example.com", ListType::Block));
        let outcome = engine.score(&clean_req("txn_blocked", 10.0));
        assert_eq!(outcome.score, 100);
        assert_eq!(outcome.factors.len(), 1);
        assert_eq!(outcome.factors[0].name, "blocklist_match");
        assert_eq!(outcome.factors[0].score_delta, 100);
        assert_eq!(
            outcome.factors[0].description,
            "device 'dev-shopper@example.com' is on the blocklist: manual review"
        );
        assert_eq!(engine.recommend(outcome.score).0, Recommendation::Decline);
    }

    #[test]
    fn allowlist_forces_zero_despite_signals() {
        let engine = engine();
        engine
            .store()
            .upsert_blocklist_entry(list_entry(EntityType::Email, "shopper@example.com", ListType::Allow));
        let mut req = clean_req("txn_vip", 900.0);
        req.ip_country = "NG".into();
        req.card_bin = "411111".into();
        let outcome = engine.score(&req);
        assert_eq!(outcome.score, 0);
        assert_eq!(outcome.factors.len(), 1);
        assert_eq!(outcome.factors[0].name, "allowlist_match");
        assert_eq!(outcome.factors[0].score_delta, 0);
        assert_eq!(
            outcome.explanation,
            "Risk Score: 0. Factors: email 'shopper@example.com' is on the allowlist: manual review."
        );
    }

    #[test]
    fn email_override_is_checked_before_ip() {
        let engine = engine();
        engine
            .store()
            .upsert_blocklist_entry(list_entry(EntityType::Email, "shopper@example.com", ListType::Allow));
        engine
            .store()
            .upsert_blocklist_entry(list_entry(EntityType::Ip, "177.10.20.30", ListType::Block));
        let outcome = engine.score(&clean_req("txn_order", 10.0));
        assert_eq!(outcome.score, 0);
    }

    #[test]
    fn expired_override_is_ignored() {
        let engine = engine();
        let mut entry = list_entry(EntityType::Bin, "453211", ListType::Block);
        entry.expires_at = Some(base_time() - Duration::minutes(1));
        engine.store().upsert_blocklist_entry(entry);

        let outcome = engine.score_at(&clean_req("txn_expired", 30.0), base_time());
        assert_eq!(outcome.score, 5);
        assert!(factor(&outcome, "blocklist_match").is_none());
    }

    #[test]
    fn scoring_does_not_save() {
        let engine = engine();
        engine.score(&clean_req("txn_dry", 30.0));
        assert!(engine.store().is_empty());
    }

    proptest! {
        #[test]
        fn score_always_in_range(
            amount in 0.01f64..100_000.0,
            hour in 0u32..24,
            age_minutes in 0i64..100_000,
            ip in prop::sample::select(vec!["RU", "US", "BR", "MX", "", "ng"]),
            card in prop::sample::select(vec!["RU", "US", "BR", ""]),
            bin in prop::sample::select(vec!["411111", "472297", "453211"]),
            prior in 0usize..12,
        ) {
            let engine = engine();
            let t = Utc.with_ymd_and_hms(2026, 2, 25, hour, 15, 0).unwrap();
            for i in 0..prior {
                engine.store().save(make_tx(
                    &format!("p{i}"),
                    "shopper@example.com",
                    "177.10.20.30",
                    &format!("{:06}", i),
                    t - Duration::minutes(i as i64 * 3 + 1),
                )).unwrap();
            }
            let mut req = clean_req("txn_prop", amount);
            req.timestamp = t;
            req.account_created_at = t - Duration::minutes(age_minutes);
            req.ip_country = ip.to_string();
            req.card_country = card.to_string();
            req.card_bin = bin.to_string();

            let outcome = engine.score(&req);
            prop_assert!(outcome.score <= 100);
            let sum: u32 = outcome.factors.iter().map(|f| f.score_delta).sum();
            prop_assert_eq!(u32::from(outcome.score), sum.min(100));
        }
    }
}
