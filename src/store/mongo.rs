//! MongoDB tier.
//!
//! Counters live in one document of the `counters` collection, updated with
//! `$inc` so concurrent increments from several processes can't lose
//! updates. Events go to one collection per kind, with `timestamp` stored as a
//! BSON date so sorting is chronological.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{self, doc, Bson, Document};
use mongodb::options::{ClientOptions, ReturnDocument};
use mongodb::{Client, Collection, Database};
use tracing::debug;

use super::counter::CounterBackend;
use super::events::EventBackend;
use super::{CounterState, EventKind, EventRecord, FeedbackEntry, Tier};
use crate::config::DatabaseConfig;
use crate::error::{IntoStorageError, PredictorError, Result};

/// `_id` of the single counter document.
pub const COUNTER_DOC_ID: &str = "global";

/// Name of the counter collection.
pub const COUNTER_COLLECTION: &str = "counters";

/// Connected database handle shared by the counter and event tiers.
#[derive(Debug, Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    /// Parses the connection string and builds a client.
    ///
    /// The driver connects lazily; an unreachable server surfaces on the
    /// first operation after the server selection timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection string is invalid.
    pub async fn connect(uri: &str, config: &DatabaseConfig) -> Result<Self> {
        let mut options = ClientOptions::parse(uri).await.into_storage(Tier::Database)?;
        let timeout = Duration::from_millis(config.timeout_ms);
        options.server_selection_timeout = Some(timeout);
        options.connect_timeout = Some(timeout);
        options.app_name = Some(env!("CARGO_PKG_NAME").to_string());

        let client = Client::with_options(options).into_storage(Tier::Database)?;
        debug!(database = %config.name, "mongodb client created");
        Ok(Self {
            db: client.database(&config.name),
        })
    }

    #[must_use]
    pub fn counter(&self) -> MongoCounter {
        MongoCounter {
            db: self.db.clone(),
            collection: self.db.collection(COUNTER_COLLECTION),
        }
    }

    #[must_use]
    pub fn events(&self) -> MongoEvents {
        MongoEvents {
            visits: self.db.collection(EventKind::Visits.name()),
            predictions: self.db.collection(EventKind::Predictions.name()),
            feedback: self.db.collection(EventKind::Feedback.name()),
        }
    }
}

/// Counter document `{_id: "global", total_users, predictions}`.
#[derive(Debug, Clone)]
pub struct MongoCounter {
    db: Database,
    collection: Collection<Document>,
}

fn counter_filter() -> Document {
    doc! { "_id": COUNTER_DOC_ID }
}

/// Reads a count stored as any BSON integer (or double, as older writers did).
fn read_count(document: &Document, key: &str) -> u64 {
    match document.get(key) {
        Some(Bson::Int64(v)) => u64::try_from(*v).unwrap_or(0),
        Some(Bson::Int32(v)) => u64::try_from(*v).unwrap_or(0),
        Some(Bson::Double(v)) if *v >= 0.0 => *v as u64,
        _ => 0,
    }
}

fn state_from(document: Option<Document>) -> CounterState {
    document
        .map(|d| CounterState::new(read_count(&d, "total_users"), read_count(&d, "predictions")))
        .unwrap_or_default()
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl CounterBackend for MongoCounter {
    fn tier(&self) -> Tier {
        Tier::Database
    }

    async fn load(&self) -> Result<CounterState> {
        let document = self
            .collection
            .find_one(counter_filter())
            .await
            .into_storage(Tier::Database)?;
        Ok(state_from(document))
    }

    async fn increment(&self, is_new_user: bool) -> Result<CounterState> {
        let update = doc! {
            "$inc": {
                "total_users": i64::from(is_new_user),
                "predictions": 1_i64,
            }
        };
        let document = self
            .collection
            .find_one_and_update(counter_filter(), update)
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .into_storage(Tier::Database)?;
        Ok(state_from(document))
    }

    async fn store(&self, state: CounterState) -> Result<()> {
        let update = doc! {
            "$set": {
                "total_users": to_i64(state.total_users),
                "predictions": to_i64(state.predictions),
            }
        };
        self.collection
            .update_one(counter_filter(), update)
            .upsert(true)
            .await
            .into_storage(Tier::Database)?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.db
            .run_command(doc! { "ping": 1 })
            .await
            .into_storage(Tier::Database)?;
        Ok(())
    }
}

/// Serializes an event with its `timestamp` as a BSON date.
fn event_document<T: serde::Serialize>(event: &T, timestamp: DateTime<Utc>) -> Result<Document> {
    let mut document = bson::to_document(event).into_storage(Tier::Database)?;
    document.insert(
        "timestamp",
        bson::DateTime::from_millis(timestamp.timestamp_millis()),
    );
    Ok(document)
}

/// Reads a stored feedback document. RFC 3339 string timestamps from older
/// writers are accepted too.
fn feedback_from(mut document: Document) -> Result<FeedbackEntry> {
    let timestamp = match document.remove("timestamp") {
        Some(Bson::DateTime(date)) => {
            DateTime::<Utc>::from_timestamp_millis(date.timestamp_millis()).ok_or_else(|| {
                PredictorError::storage(Tier::Database, "feedback timestamp out of range")
            })?
        }
        Some(Bson::String(text)) => DateTime::parse_from_rfc3339(&text)
            .into_storage(Tier::Database)?
            .with_timezone(&Utc),
        _ => {
            return Err(PredictorError::storage(
                Tier::Database,
                "feedback document has no timestamp",
            ))
        }
    };
    document.insert("timestamp", timestamp.to_rfc3339());
    bson::from_document(document).into_storage(Tier::Database)
}

/// Event collections `visitors`, `predictions` and `feedback`.
#[derive(Debug, Clone)]
pub struct MongoEvents {
    visits: Collection<Document>,
    predictions: Collection<Document>,
    feedback: Collection<Document>,
}

#[async_trait]
impl EventBackend for MongoEvents {
    fn tier(&self) -> Tier {
        Tier::Database
    }

    async fn append(&self, record: &EventRecord) -> Result<()> {
        let (collection, document) = match record {
            EventRecord::Visit(e) => (&self.visits, event_document(e, e.timestamp)?),
            EventRecord::Prediction(e) => (&self.predictions, event_document(e, e.timestamp)?),
            EventRecord::Feedback(e) => (&self.feedback, event_document(e, e.timestamp)?),
        };
        collection
            .insert_one(document)
            .await
            .into_storage(Tier::Database)?;
        Ok(())
    }

    async fn recent_feedback(&self, limit: usize) -> Result<Vec<FeedbackEntry>> {
        let cursor = self
            .feedback
            .find(doc! {})
            .sort(doc! { "timestamp": -1 })
            .limit(to_i64(limit as u64))
            .await
            .into_storage(Tier::Database)?;
        let documents = cursor
            .try_collect::<Vec<Document>>()
            .await
            .into_storage(Tier::Database)?;
        documents.into_iter().map(feedback_from).collect()
    }

    async fn feedback_count(&self) -> Result<u64> {
        self.feedback
            .count_documents(doc! {})
            .await
            .into_storage(Tier::Database)
    }
}
