//! Scheduled web page change detection.
//!
//! The engine decides when each monitored item is due ([`schedule`]), reduces
//! fetched pages to comparable content ([`content`]), scores the difference
//! against the previous snapshot and drives the whole cycle for many items
//! under a bounded worker pool ([`check`]).

pub mod check;
pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod fetch;
pub mod models;
pub mod notify;
pub mod schedule;

pub use check::{CheckFailure, CheckOrchestrator, CheckOutcome, SkipReason, TickReport};
pub use config::{Config, EngineSettings};
pub use error::{AppError, Result};
