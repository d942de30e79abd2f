//! Mock storage tiers.
//!
//! These provide controllable stand-ins for the database and file tiers so the
//! fallback chain can be exercised without a MongoDB server or a broken disk.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{PredictorError, Result};
use crate::store::{
    CounterBackend, CounterState, EventBackend, EventRecord, FeedbackEntry, MemoryCounter, Tier,
};

/// Counter tier that fails every operation, like an unreachable database.
///
/// # Example
///
/// ```rust,ignore
/// let store = CounterStore::new(vec![
///     Box::new(FailingCounter::new(Tier::Database)),
///     Box::new(FileCounter::new("counter.json")),
/// ]);
/// ```
#[derive(Debug, Clone)]
pub struct FailingCounter {
    tier: Tier,
    message: String,
}

impl FailingCounter {
    #[must_use]
    pub fn new(tier: Tier) -> Self {
        Self {
            tier,
            message: "server selection timed out".to_string(),
        }
    }

    /// Set the failure message.
    #[must_use]
    pub fn with_message(mut self, message: &str) -> Self {
        self.message = message.to_string();
        self
    }

    fn fail<T>(&self) -> Result<T> {
        Err(PredictorError::storage(self.tier, self.message.clone()))
    }
}

#[async_trait]
impl CounterBackend for FailingCounter {
    fn tier(&self) -> Tier {
        self.tier
    }

    async fn load(&self) -> Result<CounterState> {
        self.fail()
    }

    async fn increment(&self, _is_new_user: bool) -> Result<CounterState> {
        self.fail()
    }

    async fn store(&self, _state: CounterState) -> Result<()> {
        self.fail()
    }
}

/// Working in-memory counter posing as a database tier, counting calls.
#[derive(Debug, Default)]
pub struct RecordingCounter {
    inner: MemoryCounter,
    calls: Arc<AtomicU32>,
}

impl RecordingCounter {
    /// Shared handle to the call count of `load` and `increment`.
    #[must_use]
    pub fn calls(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl CounterBackend for RecordingCounter {
    fn tier(&self) -> Tier {
        Tier::Database
    }

    async fn load(&self) -> Result<CounterState> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.load().await
    }

    async fn increment(&self, is_new_user: bool) -> Result<CounterState> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.increment(is_new_user).await
    }

    async fn store(&self, state: CounterState) -> Result<()> {
        self.inner.store(state).await
    }
}

/// Event tier that fails every operation.
#[derive(Debug, Clone)]
pub struct FailingEvents {
    tier: Tier,
}

impl FailingEvents {
    #[must_use]
    pub fn new(tier: Tier) -> Self {
        Self { tier }
    }

    fn fail<T>(&self) -> Result<T> {
        Err(PredictorError::storage(self.tier, "write rejected"))
    }
}

#[async_trait]
impl EventBackend for FailingEvents {
    fn tier(&self) -> Tier {
        self.tier
    }

    async fn append(&self, _record: &EventRecord) -> Result<()> {
        self.fail()
    }

    async fn recent_feedback(&self, _limit: usize) -> Result<Vec<FeedbackEntry>> {
        self.fail()
    }

    async fn feedback_count(&self) -> Result<u64> {
        self.fail()
    }
}
