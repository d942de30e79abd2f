//! In-process tier. Never fails; lost on restart.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use super::counter::CounterBackend;
use super::events::EventBackend;
use super::{CounterState, EventRecord, FeedbackEntry, Tier};
use crate::error::Result;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counter held in process memory.
#[derive(Debug, Default)]
pub struct MemoryCounter {
    state: Mutex<CounterState>,
}

impl MemoryCounter {
    #[must_use]
    pub fn snapshot(&self) -> CounterState {
        *lock(&self.state)
    }

    pub fn set(&self, state: CounterState) {
        *lock(&self.state) = state;
    }

    /// Applies one prediction and returns the new state.
    pub fn apply(&self, is_new_user: bool) -> CounterState {
        let mut state = lock(&self.state);
        state.record_prediction(is_new_user);
        *state
    }
}

#[async_trait]
impl CounterBackend for MemoryCounter {
    fn tier(&self) -> Tier {
        Tier::Memory
    }

    async fn load(&self) -> Result<CounterState> {
        Ok(self.snapshot())
    }

    async fn increment(&self, is_new_user: bool) -> Result<CounterState> {
        Ok(self.apply(is_new_user))
    }

    async fn store(&self, state: CounterState) -> Result<()> {
        self.set(state);
        Ok(())
    }
}

/// Records kept by [`MemoryEvents`] unless configured otherwise.
pub const DEFAULT_MEMORY_EVENTS: usize = 1000;

/// Event records held in process memory, oldest evicted past the cap.
#[derive(Debug)]
pub struct MemoryEvents {
    records: Mutex<VecDeque<EventRecord>>,
    cap: usize,
}

impl Default for MemoryEvents {
    fn default() -> Self {
        Self::with_cap(DEFAULT_MEMORY_EVENTS)
    }
}

impl MemoryEvents {
    /// Holds at most `cap` records (at least one).
    #[must_use]
    pub fn with_cap(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            records: Mutex::new(VecDeque::with_capacity(cap.min(64))),
            cap,
        }
    }

    #[must_use]
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Number of stored records of every kind.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn feedback_entries(&self) -> Vec<FeedbackEntry> {
        lock(&self.records)
            .iter()
            .filter_map(|r| match r {
                EventRecord::Feedback(entry) => Some(entry.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl EventBackend for MemoryEvents {
    fn tier(&self) -> Tier {
        Tier::Memory
    }

    async fn append(&self, record: &EventRecord) -> Result<()> {
        let mut records = lock(&self.records);
        if records.len() >= self.cap {
            if let Some(evicted) = records.pop_front() {
                debug!(kind = evicted.kind().name(), "memory event tier full, evicting oldest");
            }
        }
        records.push_back(record.clone());
        Ok(())
    }

    async fn recent_feedback(&self, limit: usize) -> Result<Vec<FeedbackEntry>> {
        let mut entries = self.feedback_entries();
        entries.reverse();
        entries.truncate(limit);
        Ok(entries)
    }

    async fn feedback_count(&self) -> Result<u64> {
        Ok(self.feedback_entries().len() as u64)
    }
}
