use std::collections::HashSet;

use chrono::{Duration, Timelike};

use super::context::RuleContext;
use crate::core::RiskFactor;

/// A scoring rule that inspects one aspect of a transaction and its history.
/// Returns zero or more factors, each with a non-negative delta.
pub trait Rule {
    fn name(&self) -> &str;
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<RiskFactor>;
}

/// Return all rules in evaluation order.
pub fn default_rules() -> Vec<Box<dyn Rule + Send + Sync>> {
    vec![
        Box::new(EmailVelocityRule),
        Box::new(IpVelocityRule),
        Box::new(DeviceVelocityRule),
        Box::new(CardCyclingRule),
        Box::new(GeographyRule),
        Box::new(AccountAgeRule),
        Box::new(PurchaseBehaviourRule),
        Box::new(CardBinRule),
        Box::new(TimingRule),
    ]
}

/// `per_unit * count`, capped at `cap`.
fn capped(per_unit: u32, count: usize, cap: u32) -> u32 {
    let count = u32::try_from(count).unwrap_or(u32::MAX);
    per_unit.saturating_mul(count).min(cap)
}

// --- Individual Rules ---

struct EmailVelocityRule;
impl Rule for EmailVelocityRule {
    fn name(&self) -> &str { "email_velocity" }
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<RiskFactor> {
        let mut factors = Vec::new();
        let n = ctx.email_last_24h.len();
        if n >= 2 {
            factors.push(RiskFactor::new(
                "email_velocity_24h",
                format!("Email used in {n} transactions in the last 24 hours"),
                capped(5, n, 25),
            ));
        }
        // Tight window: scripted checkout bursts.
        let n = ctx.email_last_10m.len();
        if n >= 2 {
            factors.push(RiskFactor::new(
                "email_velocity_10min",
                format!("Email used in {n} transactions in the last 10 minutes"),
                capped(10, n, 30),
            ));
        }
        factors
    }
}

struct IpVelocityRule;
impl Rule for IpVelocityRule {
    fn name(&self) -> &str { "ip_velocity" }
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<RiskFactor> {
        let n = ctx.ip_last_1h.len();
        if n < 3 {
            return Vec::new();
        }
        vec![RiskFactor::new(
            "ip_velocity_1h",
            format!("IP address used in {n} transactions in the last hour"),
            capped(8, n, 30),
        )]
    }
}

struct DeviceVelocityRule;
impl Rule for DeviceVelocityRule {
    fn name(&self) -> &str { "device_velocity" }
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<RiskFactor> {
        let n = ctx.device_last_30m.len();
        if n < 2 {
            return Vec::new();
        }
        vec![RiskFactor::new(
            "device_velocity_30min",
            format!("Device fingerprint used in {n} transactions in the last 30 minutes"),
            capped(12, n, 30),
        )]
    }
}

/// Many cards from one IP, or one BIN spread across many accounts.
struct CardCyclingRule;
impl Rule for CardCyclingRule {
    fn name(&self) -> &str { "card_cycling" }
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<RiskFactor> {
        let mut factors = Vec::new();

        let bins = ctx.unique_bins_by_ip;
        if bins >= 3 {
            factors.push(RiskFactor::new(
                "card_cycling_ip",
                format!("IP address has used {bins} different card BINs (possible card cycling)"),
                capped(8, bins, 30),
            ));
        }

        if ctx.bin_last_1h.len() >= 5 {
            let emails: HashSet<&str> = ctx
                .bin_last_1h
                .iter()
                .map(|tx| tx.request.user_email.as_str())
                .collect();
            if emails.len() >= 2 {
                factors.push(RiskFactor::new(
                    "bin_velocity_multi_user",
                    format!("Card BIN used by {} different accounts in the last hour", emails.len()),
                    capped(8, emails.len(), 25),
                ));
            }
        }

        factors
    }
}

struct GeographyRule;
impl Rule for GeographyRule {
    fn name(&self) -> &str { "geography" }
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<RiskFactor> {
        let mut factors = Vec::new();
        let ip = ctx.req.ip_country.trim().to_ascii_uppercase();
        let card = ctx.req.card_country.trim().to_ascii_uppercase();
        let merchant = ctx.req.merchant_country.trim().to_ascii_uppercase();
        let (ip, card, merchant) = (ip.as_str(), card.as_str(), merchant.as_str());
        let known = |c: &str| !c.is_empty();

        if known(ip) && known(card) && ip != card {
            factors.push(RiskFactor::new(
                "geo_ip_card_mismatch",
                format!("IP country ({ip}) doesn't match card issuing country ({card})"),
                25,
            ));
        }

        // Cross-border traffic inside the trusted region is routine.
        if known(ip) && known(merchant) && ip != merchant && !ctx.config.is_trusted_region(ip) {
            factors.push(RiskFactor::new(
                "geo_ip_merchant_mismatch",
                format!("IP country ({ip}) doesn't match merchant country ({merchant})"),
                10,
            ));
        }

        if ctx.config.is_high_risk_country(ip) {
            factors.push(RiskFactor::new(
                "geo_high_risk_country",
                format!("Transaction originated from high-risk country ({ip})"),
                15,
            ));
        }

        if known(ip) && known(card) && known(merchant) && ip != card && card != merchant && ip != merchant {
            factors.push(RiskFactor::new(
                "geo_three_way_mismatch",
                "IP country, card country, and merchant country are all different",
                10,
            ));
        }

        factors
    }
}

struct AccountAgeRule;
impl Rule for AccountAgeRule {
    fn name(&self) -> &str { "account_age" }
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<RiskFactor> {
        let age = ctx.req.timestamp - ctx.req.account_created_at;
        let factor = if age < Duration::hours(1) {
            RiskFactor::new(
                "account_age_critical",
                format!("Account created {} minutes ago (very new)", age.num_minutes().max(0)),
                25,
            )
        } else if age < Duration::hours(24) {
            RiskFactor::new(
                "account_age_new",
                format!("Account created {} hours ago", age.num_hours()),
                15,
            )
        } else if age < Duration::days(7) {
            RiskFactor::new(
                "account_age_week",
                format!("Account created {} days ago", age.num_days()),
                5,
            )
        } else {
            return Vec::new();
        };
        vec![factor]
    }
}

/// Compares the amount against the email's own 24h baseline.
struct PurchaseBehaviourRule;
impl Rule for PurchaseBehaviourRule {
    fn name(&self) -> &str { "purchase_behaviour" }
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<RiskFactor> {
        let history = &ctx.email_last_24h;
        let amount = ctx.req.amount;

        if history.is_empty() {
            let factor = if amount > ctx.config.first_transaction_high_amount {
                RiskFactor::new(
                    "first_transaction",
                    format!("First transaction with a high amount ({amount:.2} {})", ctx.req.currency),
                    15,
                )
            } else {
                RiskFactor::new("first_transaction", "First transaction recorded for this email address", 5)
            };
            return vec![factor];
        }

        let avg = history.iter().map(|tx| tx.request.amount).sum::<f64>() / history.len() as f64;
        if avg <= 0.0 {
            return Vec::new();
        }
        let ratio = amount / avg;
        let (name, delta) = if ratio >= 10.0 {
            ("amount_anomaly_extreme", 30)
        } else if ratio >= 5.0 {
            ("amount_anomaly_high", 20)
        } else if ratio >= 3.0 {
            ("amount_anomaly_medium", 10)
        } else {
            return Vec::new();
        };
        vec![RiskFactor::new(
            name,
            format!("Amount is {ratio:.1}x the email's 24h average ({avg:.2} avg)"),
            delta,
        )]
    }
}

struct CardBinRule;
impl Rule for CardBinRule {
    fn name(&self) -> &str { "card_bin" }
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<RiskFactor> {
        let bin = ctx.req.card_bin.as_str();
        if ctx.config.is_high_risk_bin(bin) {
            vec![RiskFactor::new(
                "bin_high_risk",
                format!("Card BIN {bin} is flagged for high fraud association"),
                30,
            )]
        } else if ctx.config.is_prepaid_bin(bin) {
            vec![RiskFactor::new(
                "bin_prepaid",
                format!("Card BIN {bin} is a prepaid card (commonly used in chargebacks)"),
                15,
            )]
        } else {
            Vec::new()
        }
    }
}

/// Low-oversight hours, UTC.
struct TimingRule;
impl Rule for TimingRule {
    fn name(&self) -> &str { "timing" }
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<RiskFactor> {
        let hour = ctx.req.timestamp.hour();
        let (start, end) = (ctx.config.off_hours_start, ctx.config.off_hours_end);
        if !ctx.config.is_off_hours(hour) {
            return Vec::new();
        }
        vec![RiskFactor::new(
            "off_hours",
            format!("Transaction at {hour:02}:00 UTC (off-hours {start:02}:00-{end:02}:00)"),
            10,
        )]
    }
}
