pub mod pipeline;
pub mod store;
pub mod tx;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// The inbound facts of a payment as submitted by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub transaction_id: String,
    pub timestamp: DateTime<Utc>,
    pub amount: f64,
    pub currency: String,
    pub user_email: String,
    pub ip_address: String,
    /// ISO-3166 alpha-2; empty when unknown.
    #[serde(default)]
    pub ip_country: String,
    /// First six digits of the card number.
    pub card_bin: String,
    /// Issuing country of the card, ISO-3166 alpha-2.
    #[serde(default)]
    pub card_country: String,
    pub device_fingerprint: String,
    pub account_created_at: DateTime<Utc>,
    #[serde(default)]
    pub merchant_country: String,
}

impl TransactionRequest {
    /// Value of the given entity axis for this request.
    pub fn entity_value(&self, entity: EntityType) -> &str {
        match entity {
            EntityType::Email => &self.user_email,
            EntityType::Ip => &self.ip_address,
            EntityType::Bin => &self.card_bin,
            EntityType::Device => &self.device_fingerprint,
        }
    }
}

/// A single fraud signal that contributed to a score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub name: String,
    pub description: String,
    pub score_delta: u32,
}

impl RiskFactor {
    pub fn new(name: &str, description: impl Into<String>, score_delta: u32) -> Self {
        Self {
            name: name.to_string(),
            description: description.into(),
            score_delta,
        }
    }
}

/// A request enriched with its analysis result. Written once, read many times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTransaction {
    #[serde(flatten)]
    pub request: TransactionRequest,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub recommendation: Recommendation,
    pub factors: Vec<RiskFactor>,
    pub explanation: String,
    pub processed_at: DateTime<Utc>,
}

impl ScoredTransaction {
    pub fn id(&self) -> &str {
        &self.request.transaction_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Approve,
    Review,
    Decline,
}

/// The four axes the store indexes history by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Email,
    Ip,
    Bin,
    Device,
}

impl EntityType {
    /// Override lookup order: first hit wins.
    pub const ALL: [EntityType; 4] = [
        EntityType::Email,
        EntityType::Ip,
        EntityType::Bin,
        EntityType::Device,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Email => "email",
            EntityType::Ip => "ip",
            EntityType::Bin => "bin",
            EntityType::Device => "device",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "email" => Ok(EntityType::Email),
            "ip" => Ok(EntityType::Ip),
            "bin" => Ok(EntityType::Bin),
            "device" => Ok(EntityType::Device),
            _ => Err(ValidationError::UnknownEntityType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListType {
    Block,
    Allow,
}

impl ListType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListType::Block => "block",
            ListType::Allow => "allow",
        }
    }
}

impl FromStr for ListType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "block" => Ok(ListType::Block),
            "allow" => Ok(ListType::Allow),
            _ => Err(ValidationError::UnknownListType(s.to_string())),
        }
    }
}

/// A manually managed block or allow rule. Block forces 100, allow forces 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlocklistEntry {
    pub id: String,
    pub entity_type: EntityType,
    pub value: String,
    pub list_type: ListType,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    /// `None` means permanent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl BlocklistEntry {
    /// An entry whose expiry is in the past is treated as absent.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires) => expires > now,
            None => true,
        }
    }
}

/// A registered webhook that receives scored transactions at or above `threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryTarget {
    pub id: String,
    pub url: String,
    pub threshold: u8,
    pub created_at: DateTime<Utc>,
    pub active: bool,
}

impl DeliveryTarget {
    pub fn accepts(&self, score: u8) -> bool {
        self.active && score >= self.threshold
    }
}
