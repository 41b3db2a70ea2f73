//! Execution layer - scheduling passes, periodic checks and build triggering.

#![warn(missing_docs)]

pub mod config;
pub mod trigger;
pub mod engine;
pub mod checker;
pub mod gc;

pub use config::{ConfigError, EngineConfig};
pub use trigger::{BuildTrigger, LoggingTrigger};
pub use engine::{JobOutcome, SchedulingEngine, TickReport};
pub use checker::{CheckTickReport, CheckTicker};
pub use gc::{reachable, Reachable};
