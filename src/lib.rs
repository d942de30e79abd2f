//! Placement Predictor
//!
//! Predicts a placement package from a CGPA with a one-variable linear
//! regression, and tracks visitors, predictions and feedback through storage
//! tiers that degrade from MongoDB to a local file to process memory.
//!
//! # Architecture
//!
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Custom error types and handling
//! - [`model`] - Linear model, least squares fit, CGPA validation
//! - [`server`] - axum routes and the HTML page
//! - [`store`] - Counter store and event log over fallback tiers
//! - [`testing`] - Mock storage tiers
//!
//! # Example
//!
//! ```rust,ignore
//! use placement_predictor::model::{parse_cgpa, LinearModel};
//!
//! let model = LinearModel::hardcoded();
//! let cgpa = parse_cgpa("8.5")?;
//! assert_eq!(model.predict_rounded(cgpa), 3.85);
//! ```

pub mod config;
pub mod error;
pub mod model;
pub mod server;
pub mod store;
pub mod testing;

// Re-export commonly used types
pub use error::{IntoStorageError, PredictorError, Result};

pub use config::{AppConfig, DatabaseConfig, ModelConfig};

pub use model::{parse_cgpa, round2, validate_cgpa, LinearModel, ModelSource};

pub use server::{router, serve, AppState};

pub use store::{
    CounterBackend, CounterState, CounterStore, EventBackend, EventLog, FeedbackEntry, Storage,
    Tier,
};
