//! # Telemetry Module
//!
//! Records radio traffic to JSONL files with rotation.
//!
//! This module handles:
//! - Describing sent and observed frames ([`types::TrafficRecord`])
//! - Formatting as JSONL (JSON Lines)
//! - Writing to rotating log files
//! - Managing file rotation (max N records per file)
//! - Retaining only last M files

pub mod logger;
pub mod types;

pub use logger::TrafficLogger;
pub use types::{Direction, TrafficRecord};
