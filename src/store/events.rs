//! Append-only visitor, prediction and feedback records over fallback tiers.

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

use super::{EventRecord, FeedbackEntry, MemoryEvents, PredictionEvent, Tier, VisitorEvent};
use crate::error::{PredictorError, Result};

/// Maximum accepted length of a feedback message.
pub const MAX_MESSAGE_LEN: usize = 2000;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static email pattern is valid")
});

/// A tier able to hold event records.
#[async_trait]
pub trait EventBackend: Send + Sync {
    fn tier(&self) -> Tier;

    /// Appends one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the tier can't be written.
    async fn append(&self, record: &EventRecord) -> Result<()>;

    /// Up to `limit` feedback entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the tier can't be read.
    async fn recent_feedback(&self, limit: usize) -> Result<Vec<FeedbackEntry>>;

    /// Total stored feedback entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the tier can't be read.
    async fn feedback_count(&self) -> Result<u64>;
}

/// Event log writing to the first tier that accepts a record.
pub struct EventLog {
    tiers: Vec<Box<dyn EventBackend>>,
    memory: MemoryEvents,
}

impl EventLog {
    /// Creates a log over `tiers`; the memory tier is appended implicitly.
    #[must_use]
    pub fn new(tiers: Vec<Box<dyn EventBackend>>) -> Self {
        Self {
            tiers,
            memory: MemoryEvents::default(),
        }
    }

    /// Memory-only log.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Vec::new())
    }

    /// Caps the records the memory tier keeps.
    #[must_use]
    pub fn with_memory_cap(mut self, cap: usize) -> Self {
        self.memory = MemoryEvents::with_cap(cap);
        self
    }

    /// Appends `record`, returning the tier that stored it.
    pub async fn append(&self, record: EventRecord) -> Tier {
        for backend in &self.tiers {
            match backend.append(&record).await {
                Ok(()) => return backend.tier(),
                Err(e) => warn!(
                    tier = %backend.tier(),
                    kind = record.kind().name(),
                    "Event write failed, falling back: {}",
                    e
                ),
            }
        }
        // The memory tier can't fail.
        let _ = self.memory.append(&record).await;
        Tier::Memory
    }

    pub async fn record_visit(&self, visitor_id: &str, path: &str, user_agent: Option<String>) {
        self.append(EventRecord::Visit(VisitorEvent {
            visitor_id: visitor_id.to_string(),
            path: path.to_string(),
            user_agent,
            timestamp: Utc::now(),
        }))
        .await;
    }

    pub async fn record_prediction(&self, visitor_id: Option<String>, cgpa: f64, package: f64) {
        self.append(EventRecord::Prediction(PredictionEvent {
            visitor_id,
            cgpa,
            package,
            timestamp: Utc::now(),
        }))
        .await;
    }

    /// Stores validated feedback and returns the tier that took it.
    pub async fn submit_feedback(&self, entry: FeedbackEntry) -> Tier {
        self.append(EventRecord::Feedback(entry)).await
    }

    /// Newest feedback from the first tier that answers.
    pub async fn recent_feedback(&self, limit: usize) -> Vec<FeedbackEntry> {
        for backend in &self.tiers {
            match backend.recent_feedback(limit).await {
                Ok(entries) => return entries,
                Err(e) => warn!(tier = %backend.tier(), "Feedback read failed, falling back: {}", e),
            }
        }
        self.memory.recent_feedback(limit).await.unwrap_or_default()
    }

    /// Feedback count from the first tier that answers.
    pub async fn feedback_count(&self) -> u64 {
        for backend in &self.tiers {
            match backend.feedback_count().await {
                Ok(count) => return count,
                Err(e) => warn!(tier = %backend.tier(), "Feedback count failed, falling back: {}", e),
            }
        }
        self.memory.feedback_count().await.unwrap_or_default()
    }
}

/// Raw feedback form fields.
#[derive(Debug, Clone, Default)]
pub struct FeedbackForm<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub message: &'a str,
    pub rating: &'a str,
}

impl FeedbackForm<'_> {
    /// Validates the fields into an entry.
    ///
    /// # Errors
    ///
    /// [`PredictorError::InvalidFeedback`] naming the first bad field.
    pub fn validate(&self, visitor_id: Option<String>) -> Result<FeedbackEntry> {
        let name = self.name.trim();
        let email = self.email.trim();
        let message = self.message.trim();

        if name.is_empty() || email.is_empty() || message.is_empty() {
            return Err(PredictorError::invalid_feedback(
                "name, email and message are required",
            ));
        }
        if !EMAIL_RE.is_match(email) {
            return Err(PredictorError::invalid_feedback("email address is not valid"));
        }
        if message.chars().count() > MAX_MESSAGE_LEN {
            return Err(PredictorError::invalid_feedback(format!(
                "message must be at most {MAX_MESSAGE_LEN} characters"
            )));
        }
        let rating = self
            .rating
            .trim()
            .parse::<u8>()
            .ok()
            .filter(|r| (1..=5).contains(r))
            .ok_or_else(|| PredictorError::invalid_feedback("rating must be between 1 and 5"))?;

        Ok(FeedbackEntry {
            visitor_id,
            name: name.to_string(),
            email: email.to_string(),
            message: message.to_string(),
            rating,
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FileEvents;
    use crate::testing::FailingEvents;
    use tempfile::TempDir;

    fn form<'a>(rating: &'a str) -> FeedbackForm<'a> {
        FeedbackForm {
            name: "Asha",
            email: "asha@example.com",
            message: "Spot on for my batch",
            rating,
        }
    }

    #[test]
    fn test_feedback_validation_accepts_complete_form() {
        let entry = form("5").validate(Some("v1".into())).unwrap();
        assert_eq!(entry.rating, 5);
        assert_eq!(entry.visitor_id.as_deref(), Some("v1"));
    }

    #[test]
    fn test_feedback_validation_rejects_bad_rating() {
        for rating in ["0", "6", "three", "", "-1"] {
            let err = form(rating).validate(None).unwrap_err();
            assert!(err.to_string().contains("rating"), "rating {rating}");
        }
    }

    #[test]
    fn test_feedback_validation_requires_fields() {
        let mut f = form("3");
        f.name = "   ";
        assert!(f.validate(None).unwrap_err().to_string().contains("required"));

        let mut f = form("3");
        f.email = "not-an-email";
        assert!(f.validate(None).unwrap_err().to_string().contains("email"));
    }

    #[test]
    fn test_feedback_validation_rejects_long_message() {
        let long = "x".repeat(MAX_MESSAGE_LEN + 1);
        let mut f = form("3");
        f.message = &long;
        assert!(f.validate(None).is_err());
    }

    #[tokio::test]
    async fn test_feedback_is_readable_from_same_tier() {
        let temp = TempDir::new().unwrap();
        let log = EventLog::new(vec![Box::new(FileEvents::new(temp.path()))]);

        let entry = form("4").validate(None).unwrap();
        assert_eq!(log.submit_feedback(entry.clone()).await, Tier::File);

        let recent = log.recent_feedback(10).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].name, entry.name);
        assert_eq!(recent[0].rating, 4);
        assert_eq!(log.feedback_count().await, 1);
    }

    #[tokio::test]
    async fn test_failing_tiers_fall_back_to_memory() {
        let log = EventLog::new(vec![
            Box::new(FailingEvents::new(Tier::Database)),
            Box::new(FailingEvents::new(Tier::File)),
        ]);

        let tier = log.submit_feedback(form("2").validate(None).unwrap()).await;
        assert_eq!(tier, Tier::Memory);
        assert_eq!(log.recent_feedback(5).await.len(), 1);
        assert_eq!(log.feedback_count().await, 1);
    }

    #[tokio::test]
    async fn test_memory_fallback_is_capped() {
        let log = EventLog::new(vec![Box::new(FailingEvents::new(Tier::File))]).with_memory_cap(4);
        for i in 0..50 {
            log.record_visit(&format!("v{i}"), "/", None).await;
        }
        let tier = log.submit_feedback(form("5").validate(None).unwrap()).await;

        assert_eq!(tier, Tier::Memory);
        assert_eq!(log.memory.len(), 4);
        assert_eq!(log.feedback_count().await, 1);
    }

    #[tokio::test]
    async fn test_visits_and_predictions_do_not_count_as_feedback() {
        let log = EventLog::in_memory();
        log.record_visit("v1", "/", None).await;
        log.record_prediction(Some("v1".into()), 8.5, 3.85).await;
        assert_eq!(log.feedback_count().await, 0);
    }
}
