use crate::config::ScoringConfig;
use crate::core::{Recommendation, RiskFactor, RiskLevel};

/// Sum factor deltas and clamp to 0-100.
pub fn total_score(factors: &[RiskFactor]) -> u8 {
    let total = factors
        .iter()
        .fold(0u32, |acc, f| acc.saturating_add(f.score_delta));
    total.min(100) as u8
}

pub fn risk_level(score: u8, config: &ScoringConfig) -> RiskLevel {
    if score <= config.approve_threshold {
        RiskLevel::Low
    } else if score <= config.review_threshold {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    }
}

/// Map a score to its recommendation and the matching risk level.
pub fn recommend(score: u8, config: &ScoringConfig) -> (Recommendation, RiskLevel) {
    let level = risk_level(score, config);
    let recommendation = match level {
        RiskLevel::Low => Recommendation::Approve,
        RiskLevel::Medium => Recommendation::Review,
        RiskLevel::High => Recommendation::Decline,
    };
    (recommendation, level)
}

/// Human-readable summary of a score and the factors behind it.
pub fn build_explanation(score: u8, factors: &[RiskFactor]) -> String {
    if factors.is_empty() {
        return format!("Risk Score: {score}. No significant fraud indicators detected.");
    }
    let parts: Vec<String> = factors
        .iter()
        .map(|f| {
            if f.score_delta > 0 {
                format!("{} (+{})", f.description, f.score_delta)
            } else {
                f.description.clone()
            }
        })
        .collect();
    format!("Risk Score: {score}. Factors: {}.", parts.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factor(name: &str, delta: u32) -> RiskFactor {
        RiskFactor::new(name, format!("{name} fired"), delta)
    }

    #[test]
    fn empty_factors() {
        assert_eq!(total_score(&[]), 0);
    }

    #[test]
    fn sums_deltas() {
        let factors = vec![factor("a", 25), factor("b", 10)];
        assert_eq!(total_score(&factors), 35);
    }

    #[test]
    fn clamped_to_hundred() {
        let factors = vec![factor("a", 60), factor("b", 60), factor("c", u32::MAX)];
        assert_eq!(total_score(&factors), 100);
    }

    #[test]
    fn recommendation_bands() {
        let config = ScoringConfig::default();
        assert_eq!(recommend(0, &config), (Recommendation::Approve, RiskLevel::Low));
        assert_eq!(recommend(30, &config), (Recommendation::Approve, RiskLevel::Low));
        assert_eq!(recommend(31, &config), (Recommendation::Review, RiskLevel::Medium));
        assert_eq!(recommend(70, &config), (Recommendation::Review, RiskLevel::Medium));
        assert_eq!(recommend(71, &config), (Recommendation::Decline, RiskLevel::High));
        assert_eq!(recommend(100, &config), (Recommendation::Decline, RiskLevel::High));
    }

    #[test]
    fn bands_follow_config() {
        let config = ScoringConfig {
            approve_threshold: 10,
            review_threshold: 50,
            ..ScoringConfig::default()
        };
        assert_eq!(recommend(11, &config).0, Recommendation::Review);
        assert_eq!(recommend(51, &config).0, Recommendation::Decline);
    }

    #[test]
    fn explanation_without_factors() {
        assert_eq!(
            build_explanation(0, &[]),
            "Risk Score: 0. No significant fraud indicators detected."
        );
    }

    #[test]
    fn explanation_lists_factors_in_order() {
        let factors = vec![
            RiskFactor::new("geo_ip_card_mismatch", "IP country (RU) doesn't match card issuing country (US)", 25),
            RiskFactor::new("off_hours", "Transaction at 03:00 UTC", 10),
        ];
        assert_eq!(
            build_explanation(35, &factors),
            "Risk Score: 35. Factors: IP country (RU) doesn't match card issuing country (US) (+25); Transaction at 03:00 UTC (+10)."
        );
    }

    #[test]
    fn zero_delta_factor_shows_description_only() {
        let factors = vec![RiskFactor::new("allowlist_match", "email 'vip@x.com' is on the allowlist: VIP", 0)];
        assert_eq!(
            build_explanation(0, &factors),
            "Risk Score: 0. Factors: email 'vip@x.com' is on the allowlist: VIP."
        );
    }
}
