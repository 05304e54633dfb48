pub mod config;
pub mod core;
pub mod error;
pub mod notifications;
pub mod report;
pub mod signals;

pub use crate::config::Config;
pub use crate::core::pipeline::{PipelineOutput, Processor, run_pipeline};
pub use crate::core::store::EntityStore;
pub use crate::core::{
    BlocklistEntry, DeliveryTarget, EntityType, ListType, Recommendation, RiskFactor, RiskLevel,
    ScoredTransaction, TransactionRequest,
};
pub use crate::error::{Error, Result};
pub use crate::signals::{ScoreOutcome, ScoringEngine};
