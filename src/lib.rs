//! Sortwatch Backend Library
//!
//! Collects a paginated listing through a browser capability, validates its
//! reverse-chronological ordering and scores run quality against a rolling
//! history.

pub mod browser;
pub mod collector;
pub mod config;
pub mod events;
pub mod models;
pub mod quality;
pub mod time_parser;
pub mod validation;

pub use collector::{CollectError, PaginatedCollector};
pub use config::AuditConfig;
pub use quality::{QualityAggregator, QualityMetricsSnapshot};
pub use validation::{validate, ValidationResult};
