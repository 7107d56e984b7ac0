// HTTP handlers: status, series, capture commands, sessions, export, diagnostic

use std::collections::BTreeSet;
use std::path::Path;

use axum::{
    Json,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Local};
use serde::Deserialize;
use tokio::time::Duration;

use super::AppState;
use crate::aggregation::RenderQuery;
use crate::diagnostic;
use crate::models::GroupBy;
use crate::models::timestamp::parse_local;
use crate::session::{self, SessionError, export};
use crate::source::CounterSource;
use crate::version::{NAME, VERSION};
use crate::worker::{INTERVAL_STEPS, SamplerCommand};

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let message = message.into();
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

fn session_error_response(e: &SessionError) -> Response {
    let status = match e {
        SessionError::EmptyResult => StatusCode::UNPROCESSABLE_ENTITY,
        SessionError::Io(_) | SessionError::Malformed(_) | SessionError::InvalidPath(_) => {
            StatusCode::BAD_REQUEST
        }
        SessionError::Csv(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, e.to_string())
}

/// Queues a command for the sampler; it runs between ticks, hence 202.
async fn send_command<S: CounterSource>(
    state: &AppState<S>,
    command: SamplerCommand,
    accepted: &str,
) -> Response {
    if state.commands.send(command).await.is_err() {
        tracing::warn!(operation = accepted, "sampler is not running");
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "sampler is not running");
    }
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "accepted": accepted })),
    )
        .into_response()
}

/// GET /version: returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

pub(super) async fn status_handler<S: CounterSource>(
    State(state): State<AppState<S>>,
) -> impl IntoResponse {
    Json(state.monitor.status())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SeriesParams {
    group_by: Option<String>,
    drive: Option<String>,
    database: Option<String>,
    /// Comma-separated group keys to leave out of the series.
    hidden: Option<String>,
}

impl SeriesParams {
    fn into_query(self) -> RenderQuery {
        let hidden: BTreeSet<String> = self
            .hidden
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();
        RenderQuery {
            group_by: self
                .group_by
                .as_deref()
                .map(GroupBy::from_label)
                .unwrap_or_default(),
            drive: self.drive,
            database: self.database,
            hidden,
        }
    }
}

/// GET /api/series: the chart model for the retained history.
pub(super) async fn series_handler<S: CounterSource>(
    State(state): State<AppState<S>>,
    Query(params): Query<SeriesParams>,
) -> impl IntoResponse {
    Json(state.monitor.render(&params.into_query()))
}

pub(super) async fn filters_handler<S: CounterSource>(
    State(state): State<AppState<S>>,
) -> impl IntoResponse {
    Json(state.monitor.filters())
}

pub(super) async fn intervals_handler() -> impl IntoResponse {
    Json(INTERVAL_STEPS)
}

pub(super) async fn start_handler<S: CounterSource>(State(state): State<AppState<S>>) -> Response {
    send_command(&state, SamplerCommand::Start, "start").await
}

pub(super) async fn stop_handler<S: CounterSource>(State(state): State<AppState<S>>) -> Response {
    send_command(&state, SamplerCommand::Stop, "stop").await
}

pub(super) async fn clear_handler<S: CounterSource>(State(state): State<AppState<S>>) -> Response {
    send_command(&state, SamplerCommand::Clear, "clear").await
}

#[derive(Debug, Deserialize)]
pub(super) struct IntervalBody {
    seconds: u32,
}

pub(super) async fn interval_handler<S: CounterSource>(
    State(state): State<AppState<S>>,
    Json(body): Json<IntervalBody>,
) -> Response {
    if body.seconds == 0 {
        return error_response(StatusCode::BAD_REQUEST, "seconds must be > 0");
    }
    send_command(&state, SamplerCommand::SetInterval(body.seconds), "interval").await
}

/// GET /api/session: the retained history in session-file form.
pub(super) async fn session_handler<S: CounterSource>(
    State(state): State<AppState<S>>,
) -> Response {
    match state.monitor.to_session() {
        Some(session) => Json(session).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "no captures to save"),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct SaveBody {
    path: Option<String>,
}

fn export_dir<S: CounterSource>(state: &AppState<S>) -> &Path {
    Path::new(&state.config.session.export_dir)
}

/// POST /api/session/save: `path` is relative to `session.export_dir`.
pub(super) async fn save_session_handler<S: CounterSource>(
    State(state): State<AppState<S>>,
    body: Option<Json<SaveBody>>,
) -> Response {
    let Some(session) = state.monitor.to_session() else {
        return error_response(StatusCode::CONFLICT, "no captures to save");
    };
    let name = body
        .and_then(|Json(b)| b.path)
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| session::default_session_file_name(Local::now()));
    let path = match session::resolve_in(export_dir(&state), &name) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, operation = "save_session", "session save rejected");
            return session_error_response(&e);
        }
    };
    match session::save(&path, &session).await {
        Ok(()) => {
            tracing::info!(
                operation = "save_session",
                path = %path.display(),
                captures = session.captures.len(),
                "session saved"
            );
            Json(serde_json::json!({
                "path": path.display().to_string(),
                "captures": session.captures.len(),
            }))
            .into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, operation = "save_session", "session save failed");
            session_error_response(&e)
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct LoadBody {
    path: String,
    from: Option<String>,
    to: Option<String>,
}

fn parse_bound(raw: Option<&str>, name: &str) -> Result<Option<DateTime<Local>>, Response> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => parse_local(s).map(Some).ok_or_else(|| {
            error_response(
                StatusCode::BAD_REQUEST,
                format!("{} is not a valid timestamp: {}", name, s),
            )
        }),
    }
}

/// POST /api/session/load: `path` is relative to `session.export_dir`. The history is
/// only replaced once the file parsed and the range kept at least one capture.
pub(super) async fn load_session_handler<S: CounterSource>(
    State(state): State<AppState<S>>,
    Json(body): Json<LoadBody>,
) -> Response {
    let from = match parse_bound(body.from.as_deref(), "from") {
        Ok(v) => v,
        Err(r) => return r,
    };
    let to = match parse_bound(body.to.as_deref(), "to") {
        Ok(v) => v,
        Err(r) => return r,
    };
    let loaded = match session::resolve_in(export_dir(&state), &body.path) {
        Ok(path) => session::load(&path).await,
        Err(e) => Err(e),
    }
    .and_then(|s| session::filter_by_time_range(s, from, to));
    let session = match loaded {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(
                error = %e,
                operation = "load_session",
                path = %body.path,
                "session load failed"
            );
            return session_error_response(&e);
        }
    };
    let captures = session.captures.len();
    let server = session.server.clone();
    let first = session.first_timestamp();
    let last = session.last_timestamp();
    if state
        .commands
        .send(SamplerCommand::Load(Box::new(session)))
        .await
        .is_err()
    {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "sampler is not running");
    }
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "accepted": "load",
            "server": server,
            "captures": captures,
            "first": first,
            "last": last,
        })),
    )
        .into_response()
}

/// GET /api/export.csv: one line per row per retained capture.
pub(super) async fn export_csv_handler<S: CounterSource>(
    State(state): State<AppState<S>>,
) -> Response {
    match export::export_csv(&state.monitor.history()) {
        Ok(bytes) => {
            let disposition = format!(
                "attachment; filename=\"{}\"",
                export::default_csv_file_name(Local::now())
            );
            (
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, operation = "export_csv", "csv export failed");
            session_error_response(&e)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct DiagnosticParams {
    /// `text` for the pipe-separated dump; JSON otherwise.
    format: Option<String>,
}

/// GET /api/diagnostic: two fresh snapshots ~1.1 s apart; the history is untouched.
pub(super) async fn diagnostic_handler<S: CounterSource>(
    State(state): State<AppState<S>>,
    Query(params): Query<DiagnosticParams>,
) -> Response {
    let fetch_timeout = Duration::from_secs(state.config.capture.fetch_timeout_secs);
    let server = state.config.source.server_name.clone();
    match diagnostic::run(server, state.source.as_ref(), fetch_timeout).await {
        Ok(report) if params.format.as_deref() == Some("text") => {
            let disposition = format!(
                "inline; filename=\"{}\"",
                diagnostic::default_diagnostic_file_name(report.taken_at)
            );
            (
                [
                    (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                report.to_text(),
            )
                .into_response()
        }
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, operation = "diagnostic", "diagnostic failed");
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}
