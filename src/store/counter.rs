//! Aggregate visitor and prediction counters over fallback tiers.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{CounterState, MemoryCounter, Tier};
use crate::error::Result;

/// A tier able to hold the counter record.
///
/// Implementations own their atomicity: [`CounterBackend::increment`] must
/// apply the change and return the resulting state as one step.
#[async_trait]
pub trait CounterBackend: Send + Sync {
    /// Which tier this backend is.
    fn tier(&self) -> Tier;

    /// Reads the current counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the tier can't be read.
    async fn load(&self) -> Result<CounterState>;

    /// Adds one prediction (and one user when `is_new_user`).
    ///
    /// # Errors
    ///
    /// Returns an error if the tier can't be updated.
    async fn increment(&self, is_new_user: bool) -> Result<CounterState>;

    /// Overwrites the counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the tier can't be written.
    async fn store(&self, state: CounterState) -> Result<()>;

    /// Checks the tier is reachable.
    ///
    /// # Errors
    ///
    /// Returns the failure that made the tier unreachable.
    async fn ping(&self) -> Result<()> {
        self.load().await.map(|_| ())
    }
}

/// Reachability of one tier, as reported by `/debug`.
#[derive(Debug, Clone, Serialize)]
pub struct TierStatus {
    pub tier: Tier,
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-tier outcome of [`CounterStore::reset`].
#[derive(Debug, Clone, Serialize)]
pub struct ResetReport {
    pub tiers: Vec<TierStatus>,
}

impl ResetReport {
    /// Whether every tier was zeroed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.tiers.iter().all(|t| t.reachable)
    }

    /// Tiers that kept their old counts.
    pub fn failed(&self) -> impl Iterator<Item = &TierStatus> + '_ {
        self.tiers.iter().filter(|t| !t.reachable)
    }
}

/// Counter store walking its tiers in order with memory as the floor.
///
/// Updates are serialized through an async mutex so concurrent requests
/// can't interleave a read-modify-write on the file or memory tiers.
pub struct CounterStore {
    tiers: Vec<Box<dyn CounterBackend>>,
    memory: MemoryCounter,
    write_lock: Mutex<()>,
    /// Bumped under `write_lock` by every update; reads only refresh the
    /// memory mirror when no update landed while they were loading.
    writes: AtomicU64,
}

impl CounterStore {
    /// Creates a store over `tiers`; the memory tier is appended implicitly.
    #[must_use]
    pub fn new(tiers: Vec<Box<dyn CounterBackend>>) -> Self {
        Self {
            tiers,
            memory: MemoryCounter::default(),
            write_lock: Mutex::new(()),
            writes: AtomicU64::new(0),
        }
    }

    /// Memory-only store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Vec::new())
    }

    /// Tiers in the order they are tried, memory included.
    pub fn tiers(&self) -> impl Iterator<Item = Tier> + '_ {
        self.tiers
            .iter()
            .map(|t| t.tier())
            .chain(std::iter::once(Tier::Memory))
    }

    /// Current counts from the first tier that answers.
    pub async fn get_counts(&self) -> CounterState {
        let seen = self.writes.load(Ordering::Acquire);
        for backend in &self.tiers {
            match backend.load().await {
                Ok(state) => {
                    self.mirror_read(seen, state).await;
                    return state;
                }
                Err(e) => warn!(tier = %backend.tier(), "Counter read failed, falling back: {}", e),
            }
        }
        self.memory.snapshot()
    }

    async fn mirror_read(&self, seen: u64, state: CounterState) {
        let _guard = self.write_lock.lock().await;
        if self.writes.load(Ordering::Acquire) == seen {
            self.memory.set(state);
        }
    }

    /// Marks an update; call with `write_lock` held.
    fn bump(&self) {
        self.writes.fetch_add(1, Ordering::AcqRel);
    }

    /// Records one prediction on the first tier that accepts it.
    pub async fn increment(&self, is_new_user: bool) -> CounterState {
        let _guard = self.write_lock.lock().await;

        for backend in &self.tiers {
            match backend.increment(is_new_user).await {
                Ok(state) => {
                    debug!(tier = %backend.tier(), ?state, "counter incremented");
                    self.memory.set(state);
                    self.bump();
                    return state;
                }
                Err(e) => {
                    warn!(tier = %backend.tier(), "Counter update failed, falling back: {}", e)
                }
            }
        }
        self.bump();
        self.memory.apply(is_new_user)
    }

    /// Zeroes every tier and reports which ones failed.
    ///
    /// A failed tier keeps its counts, so they reappear once it is the
    /// first tier answering again.
    pub async fn reset(&self) -> ResetReport {
        let _guard = self.write_lock.lock().await;

        let mut tiers = Vec::with_capacity(self.tiers.len() + 1);
        for backend in &self.tiers {
            let result = backend.store(CounterState::default()).await;
            if let Err(e) = &result {
                warn!(tier = %backend.tier(), "Counter reset failed: {}", e);
            }
            tiers.push(TierStatus {
                tier: backend.tier(),
                reachable: result.is_ok(),
                error: result.err().map(|e| e.to_string()),
            });
        }
        self.memory.set(CounterState::default());
        self.bump();
        tiers.push(TierStatus {
            tier: Tier::Memory,
            reachable: true,
            error: None,
        });
        ResetReport { tiers }
    }

    /// Zeroes only the tiers of kind `tier`.
    ///
    /// # Errors
    ///
    /// Returns the first failure from a matching tier.
    pub async fn reset_tier(&self, tier: Tier) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        self.bump();
        if tier == Tier::Memory {
            self.memory.set(CounterState::default());
            return Ok(());
        }
        for backend in self.tiers.iter().filter(|b| b.tier() == tier) {
            backend.store(CounterState::default()).await?;
        }
        Ok(())
    }

    /// Pings every tier.
    pub async fn status(&self) -> Vec<TierStatus> {
        let mut statuses = Vec::with_capacity(self.tiers.len() + 1);
        for backend in &self.tiers {
            let result = backend.ping().await;
            statuses.push(TierStatus {
                tier: backend.tier(),
                reachable: result.is_ok(),
                error: result.err().map(|e| e.to_string()),
            });
        }
        statuses.push(TierStatus {
            tier: Tier::Memory,
            reachable: true,
            error: None,
        });
        statuses
    }
}
