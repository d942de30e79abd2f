//! Tiered persistence for counters and visitor events.
//!
//! Every operation walks the tiers in order (MongoDB, local file, process
//! memory) and settles on the first one that succeeds. Tiers are tried
//! independently on each call: a failed database is retried on the next
//! request rather than being demoted.
//!
//! - [`counter`] - aggregate user and prediction counts
//! - [`events`] - append-only visitor, prediction and feedback records
//! - [`file`] - JSON / JSONL file tier
//! - [`memory`] - in-process tier, always last
//! - [`mongo`] - MongoDB tier, present only when a connection string is set

pub mod counter;
pub mod events;
pub mod file;
pub mod memory;
pub mod mongo;

pub use counter::{CounterBackend, CounterStore, ResetReport, TierStatus};
pub use events::{EventBackend, EventLog};
pub use file::{FileCounter, FileEvents};
pub use memory::{MemoryCounter, MemoryEvents, DEFAULT_MEMORY_EVENTS};
pub use mongo::{MongoCounter, MongoEvents, MongoStore};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::{PredictorError, Result};

/// A storage tier, in fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[serde(rename = "mongodb")]
    Database,
    File,
    Memory,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database => write!(f, "mongodb"),
            Self::File => write!(f, "file"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// Aggregate counts, persisted as one record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterState {
    #[serde(default)]
    pub total_users: u64,
    #[serde(default)]
    pub predictions: u64,
}

impl CounterState {
    #[must_use]
    pub fn new(total_users: u64, predictions: u64) -> Self {
        Self {
            total_users,
            predictions,
        }
    }

    /// Applies one prediction, counting the requester when they are new.
    pub fn record_prediction(&mut self, is_new_user: bool) {
        self.predictions += 1;
        if is_new_user {
            self.total_users += 1;
        }
    }
}

/// A page visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitorEvent {
    pub visitor_id: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A served prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visitor_id: Option<String>,
    pub cgpa: f64,
    pub package: f64,
    pub timestamp: DateTime<Utc>,
}

/// A feedback form submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visitor_id: Option<String>,
    pub name: String,
    pub email: String,
    pub message: String,
    pub rating: u8,
    pub timestamp: DateTime<Utc>,
}

/// One append-only record, routed to its own collection or file.
#[derive(Debug, Clone, PartialEq)]
pub enum EventRecord {
    Visit(VisitorEvent),
    Prediction(PredictionEvent),
    Feedback(FeedbackEntry),
}

impl EventRecord {
    /// Collection / file stem for this record kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Visit(_) => EventKind::Visits,
            Self::Prediction(_) => EventKind::Predictions,
            Self::Feedback(_) => EventKind::Feedback,
        }
    }
}

/// Record kinds, each persisted separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Visits,
    Predictions,
    Feedback,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [Self::Visits, Self::Predictions, Self::Feedback];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Visits => "visitors",
            Self::Predictions => "predictions",
            Self::Feedback => "feedback",
        }
    }
}

/// Counter store and event log sharing one tier chain.
pub struct Storage {
    pub counters: CounterStore,
    pub events: EventLog,
}

impl Storage {
    /// Builds the tier chain for a configuration.
    ///
    /// A database connection string that fails to parse is logged and the
    /// database tier is left out; it never fails startup.
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let mut counter_tiers: Vec<Box<dyn CounterBackend>> = Vec::new();
        let mut event_tiers: Vec<Box<dyn EventBackend>> = Vec::new();

        match config.database.uri.as_deref() {
            Some(uri) if !uri.trim().is_empty() => {
                match MongoStore::connect(uri, &config.database).await {
                    Ok(mongo) => {
                        info!(database = %config.database.name, "database tier enabled");
                        counter_tiers.push(Box::new(mongo.counter()));
                        event_tiers.push(Box::new(mongo.events()));
                    }
                    Err(e) => warn!("Database tier disabled: {}", e),
                }
            }
            _ => info!("No database connection string, using file storage"),
        }

        counter_tiers.push(Box::new(FileCounter::new(config.counter_file())));
        event_tiers.push(Box::new(FileEvents::new(&config.data_dir)));

        Ok(Self {
            counters: CounterStore::new(counter_tiers),
            events: EventLog::new(event_tiers).with_memory_cap(config.memory_events),
        })
    }

    /// File and memory tiers only, rooted at `data_dir`.
    #[must_use]
    pub fn local(data_dir: &std::path::Path) -> Self {
        Self {
            counters: CounterStore::new(vec![Box::new(FileCounter::new(
                data_dir.join(file::COUNTER_FILE),
            ))]),
            events: EventLog::new(vec![Box::new(FileEvents::new(data_dir))]),
        }
    }
}

/// Converts a task join failure into a storage error for `tier`.
pub(crate) fn join_error(tier: Tier, err: tokio::task::JoinError) -> PredictorError {
    PredictorError::storage(tier, format!("storage task failed: {err}"))
}
