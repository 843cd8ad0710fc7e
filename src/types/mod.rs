//! Type definitions for the scoring pipeline

pub mod decision;
pub mod transaction;

pub use decision::{BatchSummary, ContextThresholds, ModelUsed, RiskDecision, RiskLevel};
pub use transaction::{RawTransaction, Transaction};
