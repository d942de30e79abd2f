//! Testing infrastructure for the placement predictor.
//!
//! Mock storage tiers that let tests drive the fallback chain deterministically.
//!
//! # Example
//!
//! ```rust,ignore
//! use placement_predictor::testing::FailingCounter;
//! use placement_predictor::store::{CounterStore, Tier};
//!
//! let store = CounterStore::new(vec![Box::new(FailingCounter::new(Tier::Database))]);
//! ```

pub mod mocks;

pub use mocks::*;
