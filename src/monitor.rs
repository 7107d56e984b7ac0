// Shared capture state. The sampler task is the only writer; routes only read.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::aggregation::color::ColorRegistry;
use crate::aggregation::{FilterOptions, RenderOutput, RenderQuery, available_filters, render};
use crate::models::{CaptureSummary, DeltaCapture, SessionData};
use crate::retention::RetentionBuffer;
use crate::worker::CaptureState;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplerStatus {
    pub state: CaptureState,
    pub message: String,
    pub server: String,
    pub interval_seconds: u32,
    /// Captures produced since the last clear or load (evicted ones included).
    pub captures_total: u64,
    pub retained: usize,
    pub last_summary: Option<CaptureSummary>,
    pub session_start: Option<DateTime<Local>>,
    pub last_capture_at: Option<DateTime<Local>>,
}

pub struct Monitor {
    buffer: RwLock<RetentionBuffer>,
    colors: Mutex<ColorRegistry>,
    status: RwLock<SamplerStatus>,
    ws_clients: AtomicUsize,
}

impl Monitor {
    pub fn new(retention_cap: usize, server: impl Into<String>, interval_seconds: u32) -> Self {
        Self {
            buffer: RwLock::new(RetentionBuffer::new(retention_cap)),
            colors: Mutex::new(ColorRegistry::new()),
            status: RwLock::new(SamplerStatus {
                server: server.into(),
                interval_seconds,
                ..SamplerStatus::default()
            }),
            ws_clients: AtomicUsize::new(0),
        }
    }

    /// Appends and returns the shared handle that was stored.
    pub fn append(&self, capture: DeltaCapture) -> Arc<DeltaCapture> {
        let capture = Arc::new(capture);
        let mut buffer = self.buffer.write().unwrap_or_else(PoisonError::into_inner);
        buffer.push(capture.clone());
        let retained = buffer.len();
        drop(buffer);
        self.update_status(|s| {
            s.captures_total += 1;
            s.retained = retained;
            s.last_summary = Some(CaptureSummary::from(capture.as_ref()));
            s.last_capture_at = Some(capture.timestamp);
        });
        capture
    }

    /// Empties the history and forgets color assignments.
    pub fn clear(&self) {
        self.buffer
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.colors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
        self.update_status(|s| {
            s.captures_total = 0;
            s.retained = 0;
            s.last_summary = None;
            s.last_capture_at = None;
        });
    }

    /// Replaces the history with a loaded session.
    pub fn load_session(&self, session: SessionData) {
        let count = session.captures.len();
        let last = session.last_timestamp();
        let summary = session.captures.last().map(CaptureSummary::from);
        let mut buffer = self.buffer.write().unwrap_or_else(PoisonError::into_inner);
        buffer.replace(session.captures);
        let retained = buffer.len();
        drop(buffer);
        self.colors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
        self.update_status(|s| {
            s.server = session.server;
            s.interval_seconds = session.interval_seconds;
            s.session_start = Some(session.captured_at);
            s.captures_total = count as u64;
            s.retained = retained;
            s.last_summary = summary;
            s.last_capture_at = last;
        });
    }

    pub fn history(&self) -> Vec<Arc<DeltaCapture>> {
        self.buffer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .history()
    }

    pub fn len(&self) -> usize {
        self.buffer.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn render(&self, query: &RenderQuery) -> RenderOutput {
        let history = self.history();
        let mut colors = self.colors.lock().unwrap_or_else(PoisonError::into_inner);
        render(&history, query, &mut colors)
    }

    pub fn filters(&self) -> FilterOptions {
        available_filters(&self.history())
    }

    /// Current history as a session, or `None` when there is nothing to save.
    pub fn to_session(&self) -> Option<SessionData> {
        let history = self.history();
        if history.is_empty() {
            return None;
        }
        let status = self.status();
        let captured_at = status
            .session_start
            .or_else(|| history.first().map(|c| c.timestamp))?;
        Some(SessionData::new(
            status.server,
            captured_at,
            status.interval_seconds,
            history.iter().map(|c| c.as_ref().clone()).collect(),
        ))
    }

    pub fn status(&self) -> SamplerStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update_status(&self, f: impl FnOnce(&mut SamplerStatus)) {
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut status);
    }

    pub fn ws_clients(&self) -> &AtomicUsize {
        &self.ws_clients
    }

    pub fn ws_client_count(&self) -> usize {
        self.ws_clients.load(Ordering::Relaxed)
    }
}
