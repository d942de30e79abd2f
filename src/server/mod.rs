//! HTTP front end.
//!
//! An axum router over shared [`AppState`]. Every handler answers with a
//! rendered page or JSON body; failures become messages, not error statuses
//! (the admin token check is the one exception).

pub mod handlers;
pub mod page;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::AppConfig;
use crate::error::Result;
use crate::model::{parse_cgpa, LinearModel};
use crate::store::{CounterStore, EventLog, Storage};

/// Cookie carrying the per-browser random identifier.
pub const VISITOR_COOKIE: &str = "visitor_id";

/// Cookie marking a browser already counted as a user.
pub const COUNTED_COOKIE: &str = "counted";

/// Header holding the admin token.
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// State shared by every request.
pub struct AppState {
    pub config: AppConfig,
    pub model: LinearModel,
    pub counters: CounterStore,
    pub events: EventLog,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, model: LinearModel, storage: Storage) -> Self {
        Self {
            config,
            model,
            counters: storage.counters,
            events: storage.events,
        }
    }

    /// Validates the configuration, builds the model and connects storage.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid configuration or an unusable model file.
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let model = LinearModel::from_source(config.model.source, &config.model_file())?;
        info!(
            slope = model.slope,
            intercept = model.intercept,
            source = ?config.model.source,
            "model ready"
        );
        let storage = Storage::connect(&config).await?;
        Ok(Self::new(config, model, storage))
    }

    /// Parses `input` and returns `(cgpa, package)` with the package rounded.
    ///
    /// # Errors
    ///
    /// Returns a validation error for non-numeric or out-of-range input; the
    /// model is not consulted in that case.
    pub fn predict(&self, input: &str) -> Result<(f64, f64)> {
        let cgpa = parse_cgpa(input)?;
        Ok((cgpa, self.model.predict_rounded(cgpa)))
    }
}

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::home))
        .route("/predict", post(handlers::predict))
        .route("/feedback", post(handlers::feedback))
        .route("/api/predict", post(handlers::api_predict))
        .route("/debug", get(handlers::debug))
        .route("/admin/reset", post(handlers::admin_reset))
        .route("/admin/reset/file", post(handlers::admin_reset_file))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds the configured address and serves until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address can't be bound or the server fails.
pub async fn serve(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind((state.config.host.as_str(), state.config.port)).await?;
    let addr: SocketAddr = listener.local_addr()?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PredictorError;

    fn state() -> AppState {
        AppState {
            config: AppConfig::default(),
            model: LinearModel::hardcoded(),
            counters: CounterStore::in_memory(),
            events: EventLog::in_memory(),
        }
    }

    #[test]
    fn test_predict_valid_input() {
        let (cgpa, package) = state().predict("8.5").unwrap();
        assert_eq!(cgpa, 8.5);
        assert_eq!(package, 3.85);
    }

    #[test]
    fn test_predict_rejects_before_model() {
        let err = state().predict("15").unwrap_err();
        assert!(matches!(err, PredictorError::CgpaOutOfRange { .. }));
        let err = state().predict("abc").unwrap_err();
        assert!(matches!(err, PredictorError::InvalidCgpa { .. }));
    }

    #[tokio::test]
    async fn test_from_config_rejects_invalid_config() {
        let config = AppConfig {
            host: String::new(),
            ..AppConfig::default()
        };
        assert!(AppState::from_config(config).await.is_err());
    }
}
