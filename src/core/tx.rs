use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{BlocklistEntry, DeliveryTarget, EntityType, ListType, TransactionRequest};
use crate::error::ValidationError;

/// Threshold applied when a delivery target is registered with 0 / no threshold.
pub const DEFAULT_DELIVERY_THRESHOLD: u8 = 80;

/// Reject a request with a missing or invalid field before it is scored.
pub fn validate_request(req: &TransactionRequest) -> Result<(), ValidationError> {
    let required = [
        ("transaction_id", req.transaction_id.as_str()),
        ("currency", req.currency.as_str()),
        ("user_email", req.user_email.as_str()),
        ("ip_address", req.ip_address.as_str()),
        ("card_bin", req.card_bin.as_str()),
        ("device_fingerprint", req.device_fingerprint.as_str()),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(ValidationError::MissingField(field));
        }
    }
    if req.amount.is_nan() || req.amount <= 0.0 {
        return Err(ValidationError::NonPositiveAmount);
    }
    Ok(())
}

/// Deserialize one JSON request line. Field checks are left to the caller,
/// so a well-formed but invalid request can still be reported by id.
pub fn decode_request(line: &str) -> crate::error::Result<TransactionRequest> {
    Ok(serde_json::from_str(line)?)
}

/// Parse one JSON request line and validate it.
pub fn parse_request(line: &str) -> crate::error::Result<TransactionRequest> {
    let req = decode_request(line)?;
    validate_request(&req)?;
    Ok(req)
}

/// Administrative request to add a block/allow rule.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBlocklistEntry {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub value: String,
    pub list_type: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewBlocklistEntry {
    pub fn into_entry(self, now: DateTime<Utc>) -> Result<BlocklistEntry, ValidationError> {
        let entity_type: EntityType = self.entity_type.parse()?;
        let list_type: ListType = self.list_type.parse()?;
        if self.value.trim().is_empty() {
            return Err(ValidationError::MissingField("value"));
        }
        Ok(BlocklistEntry {
            id: uuid::Uuid::new_v4().to_string(),
            entity_type,
            value: self.value,
            list_type,
            reason: self.reason,
            created_at: now,
            expires_at: self.expires_at,
        })
    }
}

/// Administrative request to register a webhook delivery target.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDeliveryTarget {
    pub url: String,
    #[serde(default)]
    pub threshold: u32,
}

impl NewDeliveryTarget {
    pub fn into_target(self, now: DateTime<Utc>) -> Result<DeliveryTarget, ValidationError> {
        if self.url.trim().is_empty() {
            return Err(ValidationError::MissingField("url"));
        }
        let threshold = match self.threshold {
            0 => DEFAULT_DELIVERY_THRESHOLD,
            t @ 1..=100 => t as u8,
            t => return Err(ValidationError::ThresholdOutOfRange(t)),
        };
        Ok(DeliveryTarget {
            id: uuid::Uuid::new_v4().to_string(),
            url: self.url,
            threshold,
            created_at: now,
            active: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn valid_request() -> TransactionRequest {
        TransactionRequest {
            transaction_id: "txn_1".into(),
            timestamp: Utc.with_ymd_and_hms(2026, 2, 25, 14, 0, 0).unwrap(),
            amount: 25.0,
            currency: "BRL".into(),
            user_email: "user@example.com".into(),
            ip_address: "177.10.20.30".into(),
            ip_country: "BR".into(),
            card_bin: "453211".into(),
            card_country: "BR".into(),
            device_fingerprint: "device-abc".into(),
            account_created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            merchant_country: "BR".into(),
        }
    }

    #[test]
    fn accepts_complete_request() {
        assert!(validate_request(&valid_request()).is_ok());
    }

    #[test]
    fn rejects_missing_fields() {
        let mut req = valid_request();
        req.user_email = String::new();
        assert_eq!(
            validate_request(&req),
            Err(ValidationError::MissingField("user_email"))
        );

        let mut req = valid_request();
        req.device_fingerprint = "   ".into();
        assert_eq!(
            validate_request(&req),
            Err(ValidationError::MissingField("device_fingerprint"))
        );
    }

    #[test]
    fn rejects_non_positive_amount() {
        let mut req = valid_request();
        req.amount = 0.0;
        assert_eq!(validate_request(&req), Err(ValidationError::NonPositiveAmount));
        req.amount = f64::NAN;
        assert_eq!(validate_request(&req), Err(ValidationError::NonPositiveAmount));
    }

    #[test]
    fn missing_country_codes_are_allowed() {
        let mut req = valid_request();
        req.ip_country.clear();
        req.card_country.clear();
        req.merchant_country.clear();
        assert!(validate_request(&req).is_ok());
    }

    #[test]
    fn parse_request_line() {
        let line = r#"{
            "transaction_id": "txn_9",
            "timestamp": "2026-02-25T14:00:00Z",
            "amount": 12.5,
            "currency": "MXN",
            "user_email": "a@b.com",
            "ip_address": "10.0.0.1",
            "ip_country": "MX",
            "card_bin": "453211",
            "card_country": "MX",
            "device_fingerprint": "d1",
            "account_created_at": "2025-01-01T00:00:00Z",
            "merchant_country": "MX"
        }"#;
        let req = parse_request(line).unwrap();
        assert_eq!(req.transaction_id, "txn_9");
        assert!(parse_request("{not json").is_err());
    }

    #[test]
    fn decode_keeps_invalid_but_well_formed_requests() {
        let line = r#"{
            "transaction_id": "bad1",
            "timestamp": "2026-02-25T14:00:00Z",
            "amount": 0,
            "currency": "BRL",
            "user_email": "a@b.com",
            "ip_address": "10.0.0.1",
            "card_bin": "453211",
            "device_fingerprint": "d1",
            "account_created_at": "2025-01-01T00:00:00Z"
        }"#;
        let req = decode_request(line).unwrap();
        assert_eq!(req.transaction_id, "bad1");
        assert!(matches!(
            parse_request(line),
            Err(crate::error::Error::Validation(ValidationError::NonPositiveAmount))
        ));
        assert!(matches!(decode_request("{not json"), Err(crate::error::Error::Json(_))));
    }

    #[test]
    fn blocklist_request_validation() {
        let now = Utc::now();
        let entry = NewBlocklistEntry {
            entity_type: "email".into(),
            value: "fraud@example.com".into(),
            list_type: "block".into(),
            reason: "confirmed chargeback".into(),
            expires_at: None,
        }
        .into_entry(now)
        .unwrap();
        assert_eq!(entry.entity_type, EntityType::Email);
        assert_eq!(entry.list_type, ListType::Block);
        assert!(!entry.id.is_empty());

        let bad_type = NewBlocklistEntry {
            entity_type: "phone".into(),
            value: "x".into(),
            list_type: "block".into(),
            reason: String::new(),
            expires_at: None,
        };
        assert!(matches!(
            bad_type.into_entry(now),
            Err(ValidationError::UnknownEntityType(_))
        ));

        let no_value = NewBlocklistEntry {
            entity_type: "ip".into(),
            value: String::new(),
            list_type: "allow".into(),
            reason: String::new(),
            expires_at: None,
        };
        assert_eq!(
            no_value.into_entry(now).unwrap_err(),
            ValidationError::MissingField("value")
        );
    }

    #[test]
    fn delivery_target_defaults_threshold() {
        let now = Utc::now();
        let target = NewDeliveryTarget { url: "http://hooks.local/a".into(), threshold: 0 }
            .into_target(now)
            .unwrap();
        assert_eq!(target.threshold, DEFAULT_DELIVERY_THRESHOLD);
        assert!(target.active);

        let err = NewDeliveryTarget { url: "http://hooks.local/a".into(), threshold: 101 }
            .into_target(now)
            .unwrap_err();
        assert_eq!(err, ValidationError::ThresholdOutOfRange(101));

        assert!(NewDeliveryTarget { url: String::new(), threshold: 50 }.into_target(now).is_err());
    }
}
