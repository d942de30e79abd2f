//! Request handlers.

use std::sync::Arc;

use axum::extract::rejection::FormRejection;
use axum::extract::{Form, State};
use axum::http::header::USER_AGENT;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::page::{Notice, PageTemplate, PageView};
use super::{AppState, ADMIN_TOKEN_HEADER, COUNTED_COOKIE, VISITOR_COOKIE};
use crate::store::events::FeedbackForm;
use crate::store::{EventKind, FileEvents, Tier};

#[derive(Debug, Default, Deserialize)]
pub struct PredictInput {
    #[serde(default)]
    pub cgpa: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct FeedbackInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub rating: String,
}

fn long_lived_cookie(name: &'static str, value: String, days: i64) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(days))
        .build()
}

/// Returns the visitor id, issuing a cookie when the browser has none.
fn ensure_visitor(state: &AppState, jar: CookieJar) -> (CookieJar, String) {
    if let Some(id) = jar.get(VISITOR_COOKIE).map(|c| c.value().to_string()) {
        return (jar, id);
    }
    let id = Uuid::new_v4().to_string();
    debug!(visitor_id = %id, "issuing visitor cookie");
    let jar = jar.add(long_lived_cookie(
        VISITOR_COOKIE,
        id.clone(),
        state.config.cookie_max_age_days,
    ));
    (jar, id)
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn base_view(state: &AppState) -> PageView {
    let mut view = PageView::new(state.counters.get_counts().await);
    view.recent_feedback = state
        .events
        .recent_feedback(state.config.recent_feedback)
        .await;
    view
}

fn render(view: &PageView) -> Html<String> {
    Html(PageTemplate::new(view).render())
}

/// `GET /`
pub async fn home(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> (CookieJar, Html<String>) {
    let (jar, visitor_id) = ensure_visitor(&state, jar);
    state
        .events
        .record_visit(&visitor_id, "/", user_agent(&headers))
        .await;

    let view = base_view(&state).await;
    (jar, render(&view))
}

/// `POST /predict`
pub async fn predict(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    form: Result<Form<PredictInput>, FormRejection>,
) -> (CookieJar, Html<String>) {
    let input = form.map(|Form(f)| f.cgpa).unwrap_or_default();
    let is_new_user = jar.get(COUNTED_COOKIE).is_none();
    let (mut jar, visitor_id) = ensure_visitor(&state, jar);

    let mut view = base_view(&state).await;
    view.cgpa_input = input.clone();

    match state.predict(&input) {
        Ok((cgpa, package)) => {
            view.counts = state.counters.increment(is_new_user).await;
            state
                .events
                .record_prediction(Some(visitor_id), cgpa, package)
                .await;
            if is_new_user {
                jar = jar.add(long_lived_cookie(
                    COUNTED_COOKIE,
                    "1".to_string(),
                    state.config.cookie_max_age_days,
                ));
            }
            info!(cgpa, package, is_new_user, "prediction served");
            view.prediction = Some(Notice::Success(format!(
                "Your predicted package is {package:.2} LPA"
            )));
        }
        Err(e) => {
            info!(input = %input, "prediction rejected: {}", e);
            view.prediction = Some(Notice::Error(e.user_message()));
        }
    }

    (jar, render(&view))
}

/// `POST /feedback`
pub async fn feedback(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    form: Result<Form<FeedbackInput>, FormRejection>,
) -> (CookieJar, Html<String>) {
    let input = form.map(|Form(f)| f).unwrap_or_default();
    let (jar, visitor_id) = ensure_visitor(&state, jar);

    let submission = FeedbackForm {
        name: &input.name,
        email: &input.email,
        message: &input.message,
        rating: &input.rating,
    };

    let notice = match submission.validate(Some(visitor_id)) {
        Ok(entry) => {
            let rating = entry.rating;
            let tier = state.events.submit_feedback(entry).await;
            info!(rating, %tier, "feedback stored");
            Notice::Success("Thank you for your feedback!".to_string())
        }
        Err(e) => Notice::Error(e.user_message()),
    };

    // Read after the write so the new entry shows up.
    let mut view = base_view(&state).await;
    view.feedback = Some(notice);
    (jar, render(&view))
}

/// `POST /api/predict`: JSON variant without visitor tracking.
pub async fn api_predict(
    State(state): State<Arc<AppState>>,
    form: Result<Form<PredictInput>, FormRejection>,
) -> Json<serde_json::Value> {
    let input = form.map(|Form(f)| f.cgpa).unwrap_or_default();
    match state.predict(&input) {
        Ok((_, package)) => Json(json!({ "success": true, "prediction": package })),
        Err(e) => Json(json!({ "error": e.user_message() })),
    }
}

/// `GET /health`
pub async fn health() -> &'static str {
    "ok"
}

/// Rejects the request unless the configured admin token was sent.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = state.config.admin_token.as_deref() else {
        return Ok(());
    };
    let sent = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    if sent == Some(expected) {
        Ok(())
    } else {
        Err((StatusCode::FORBIDDEN, "forbidden").into_response())
    }
}

/// `GET /debug`: storage and environment diagnostics.
pub async fn debug(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }

    let config = &state.config;
    let file_events = FileEvents::new(&config.data_dir);
    let mut files = serde_json::Map::new();
    files.insert(
        config.counter_file().display().to_string(),
        json!(config.counter_file().exists()),
    );
    for kind in EventKind::ALL {
        let path = file_events.log_path(kind);
        files.insert(path.display().to_string(), json!(path.exists()));
    }

    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "cwd": std::env::current_dir().ok(),
        "data_dir": config.data_dir,
        "data_dir_exists": config.data_dir.is_dir(),
        "files": files,
        "database": {
            "uri_set": config.database.is_configured(),
            "name": config.database.name,
        },
        "tiers": state.counters.status().await,
        "counts": state.counters.get_counts().await,
        "feedback_count": state.events.feedback_count().await,
        "model": state.model,
        "config": config,
    }))
    .into_response()
}

/// `POST /admin/reset`: zero the counters on every tier.
///
/// Answers `"partial"` with the failed tiers listed when any tier kept its
/// counts.
pub async fn admin_reset(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }
    let report = state.counters.reset().await;
    let failed: Vec<Tier> = report.failed().map(|t| t.tier).collect();

    if failed.is_empty() {
        info!("counters reset on all tiers");
        Json(json!({ "status": "reset", "tiers": report.tiers })).into_response()
    } else {
        warn!(?failed, "counter reset incomplete");
        Json(json!({ "status": "partial", "failed": failed, "tiers": report.tiers }))
            .into_response()
    }
}

/// `POST /admin/reset/file`: zero only the counter file.
pub async fn admin_reset_file(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }
    match state.counters.reset_tier(Tier::File).await {
        Ok(()) => {
            info!("counter file reset");
            Json(json!({ "status": "reset", "tier": Tier::File })).into_response()
        }
        Err(e) => {
            warn!("Counter file reset failed: {}", e);
            Json(json!({ "error": e.user_message() })).into_response()
        }
    }
}
