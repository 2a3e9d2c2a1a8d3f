#![forbid(unsafe_code)]

//! Core domain model and business logic for the Somni sleep tracker.
//!
//! This crate provides:
//! - Domain types (sleep sessions, recommendations, timezone adjustments, profiles)
//! - Age baselines and the adaptive wake-window engine
//! - Timezone shift detection
//! - Session lifecycle with the one-open-session rule
//! - Persistence (JSONL session store, profile book, notification outbox, export)

pub mod types;
pub mod error;
pub mod clock;
pub mod config;
pub mod logging;
pub mod baseline;
pub mod repository;
pub mod store;
pub mod notify;
pub mod engine;
pub mod timezone;
pub mod session;
pub mod profile;
pub mod export;

// Re-export commonly used types
pub use error::{Error, ErrorKind, Result};
pub use types::*;
pub use clock::{ManualClock, SystemClock, TimeProvider};
pub use config::Config;
pub use baseline::compute_baseline;
pub use repository::{InMemoryRepository, Repository};
pub use store::JsonlRepository;
pub use notify::{NotificationScheduler, OutboxNotifier, TracingNotifier};
pub use engine::WakeWindowEngine;
pub use timezone::{build_adjustment_schedule, TimezoneShiftDetector};
pub use session::{DefaultSessionIdGenerator, SessionIdGenerator, SessionLifecycleManager};
pub use profile::ProfileBook;
