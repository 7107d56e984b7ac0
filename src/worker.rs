// Sampler: the single writer. Each tick fetches counters, computes the delta against
// the previous snapshot and appends it. Ticks never overlap; commands apply between ticks.

use std::sync::Arc;

use chrono::Local;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Duration, Instant, interval, interval_at, timeout};
use tracing::Instrument;

use crate::delta::compute_delta;
use crate::models::{CaptureSummary, DeltaCapture, SessionData, Snapshot};
use crate::monitor::Monitor;
use crate::source::{CounterSource, TransportError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum CaptureState {
    #[default]
    Idle,
    /// Sampling, but no delta yet (waiting for a second observation).
    Baseline,
    Capturing,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerEvent {
    Start,
    BaselineFailed,
    DeltaAppended,
    TickFailed,
    ConnectionLost,
    Stop,
    Cleared,
}

impl CaptureState {
    pub fn is_sampling(self) -> bool {
        matches!(self, CaptureState::Baseline | CaptureState::Capturing)
    }

    pub fn on(self, event: SamplerEvent) -> Self {
        use CaptureState::*;
        match (self, event) {
            (Idle | Stopped, SamplerEvent::Start) => Baseline,
            (Baseline, SamplerEvent::BaselineFailed) => Stopped,
            (Baseline | Capturing, SamplerEvent::DeltaAppended) => Capturing,
            (Baseline | Capturing, SamplerEvent::ConnectionLost | SamplerEvent::Stop) => Stopped,
            (Capturing, SamplerEvent::Cleared) => Baseline,
            (state, _) => state,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IntervalStep {
    pub seconds: u32,
    pub label: &'static str,
}

pub const INTERVAL_STEPS: [IntervalStep; 9] = [
    IntervalStep { seconds: 1, label: "1s" },
    IntervalStep { seconds: 5, label: "5s" },
    IntervalStep { seconds: 10, label: "10s" },
    IntervalStep { seconds: 30, label: "30s" },
    IntervalStep { seconds: 60, label: "1 min" },
    IntervalStep { seconds: 120, label: "2 min" },
    IntervalStep { seconds: 180, label: "3 min" },
    IntervalStep { seconds: 240, label: "4 min" },
    IntervalStep { seconds: 300, label: "5 min" },
];

pub fn interval_label(seconds: u32) -> String {
    INTERVAL_STEPS
        .iter()
        .find(|s| s.seconds == seconds)
        .map(|s| s.label.to_string())
        .unwrap_or_else(|| format!("{}s", seconds))
}

#[derive(Debug)]
pub enum SamplerCommand {
    Start,
    Stop,
    Clear,
    SetInterval(u32),
    Load(Box<SessionData>),
}

/// What one tick did; the loop only logs it, tests assert on it.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Not sampling.
    Skipped,
    /// Stored a new baseline; no delta yet.
    Baseline,
    Appended(CaptureSummary),
    /// Tick abandoned; the previous snapshot is untouched.
    Failed(TransportError),
    ConnectionLost(String),
}

pub struct Sampler<S: CounterSource> {
    source: Arc<S>,
    monitor: Arc<Monitor>,
    captures_tx: broadcast::Sender<Arc<DeltaCapture>>,
    fetch_timeout: Duration,
    state: CaptureState,
    previous: Option<Snapshot>,
}

impl<S: CounterSource> Sampler<S> {
    pub fn new(
        source: Arc<S>,
        monitor: Arc<Monitor>,
        captures_tx: broadcast::Sender<Arc<DeltaCapture>>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            source,
            monitor,
            captures_tx,
            fetch_timeout,
            state: CaptureState::Idle,
            previous: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn previous(&self) -> Option<&Snapshot> {
        self.previous.as_ref()
    }

    fn transition(&mut self, event: SamplerEvent) {
        let next = self.state.on(event);
        if next != self.state {
            tracing::debug!(from = ?self.state, to = ?next, ?event, "sampler state change");
        }
        self.state = next;
        self.monitor.update_status(|s| s.state = next);
    }

    fn report(&self, message: impl Into<String>) {
        let message = message.into();
        self.monitor.update_status(|s| s.message = message);
    }

    async fn take_snapshot(&self) -> Result<Snapshot, TransportError> {
        let rows = timeout(self.fetch_timeout, self.source.fetch_rows())
            .await
            .map_err(|_| TransportError::Timeout(self.fetch_timeout.as_secs()))??;
        Ok(Snapshot::new(Local::now(), rows))
    }

    /// Takes the baseline snapshot. Ignored while already sampling.
    pub async fn start(&mut self) {
        if self.state.is_sampling() {
            return;
        }
        self.previous = None;
        self.transition(SamplerEvent::Start);
        self.monitor
            .update_status(|s| s.session_start = Some(Local::now()));
        self.report("Baseline…");
        match self.take_snapshot().await {
            Ok(snapshot) => {
                tracing::info!(
                    operation = "baseline",
                    rows = snapshot.rows.len(),
                    "baseline taken"
                );
                self.report(format!(
                    "Baseline OK at {}",
                    snapshot.timestamp.format("%H:%M:%S")
                ));
                self.previous = Some(snapshot);
            }
            Err(e) => {
                tracing::warn!(error = %e, operation = "baseline", "baseline failed");
                self.transition(SamplerEvent::BaselineFailed);
                self.report(format!("Err: {}", e));
            }
        }
    }

    pub fn stop(&mut self) {
        if self.state.is_sampling() {
            self.transition(SamplerEvent::Stop);
            self.report("Stopped");
        }
    }

    /// Drops history, colors and the baseline; sampling re-baselines on the next tick.
    pub fn clear(&mut self) {
        self.monitor.clear();
        self.previous = None;
        self.transition(SamplerEvent::Cleared);
        self.report("Cleared");
    }

    /// Replaces the history with a loaded session. Live sampling stops.
    pub fn load(&mut self, session: SessionData) {
        self.stop();
        self.previous = None;
        let message = format!(
            "Loaded: {} ({} captures)",
            session.server,
            session.captures.len()
        );
        self.monitor.load_session(session);
        self.report(message);
    }

    pub async fn tick(&mut self) -> TickOutcome {
        if !self.state.is_sampling() {
            return TickOutcome::Skipped;
        }
        let snapshot = match self.take_snapshot().await {
            Ok(s) => s,
            Err(TransportError::Disconnected(msg)) => {
                tracing::warn!(error = %msg, operation = "tick", "connection lost");
                self.transition(SamplerEvent::ConnectionLost);
                self.report(format!("Connection lost: {}", msg));
                return TickOutcome::ConnectionLost(msg);
            }
            Err(e) => {
                tracing::warn!(error = %e, operation = "tick", "counter fetch failed");
                self.transition(SamplerEvent::TickFailed);
                self.report(format!("Err: {}", e));
                return TickOutcome::Failed(e);
            }
        };

        let outcome = match self.previous.take() {
            Some(previous) => {
                let capture = compute_delta(&previous, &snapshot);
                let summary = CaptureSummary::from(&capture);
                let stored = self.monitor.append(capture);
                // no receivers just means no live clients
                let _ = self.captures_tx.send(stored);
                self.transition(SamplerEvent::DeltaAppended);
                let total = self.monitor.status().captures_total;
                self.report(if summary.active_files > 0 {
                    format!("Cap: {} | IO detected", total)
                } else {
                    format!("Cap: {} | No physical IO", total)
                });
                tracing::debug!(
                    operation = "tick",
                    active = summary.active_files,
                    files = summary.total_files,
                    delta_reads = summary.delta_reads,
                    delta_writes = summary.delta_writes,
                    "capture appended"
                );
                TickOutcome::Appended(summary)
            }
            None => {
                self.report(format!(
                    "Baseline OK at {}",
                    snapshot.timestamp.format("%H:%M:%S")
                ));
                TickOutcome::Baseline
            }
        };
        self.previous = Some(snapshot);
        outcome
    }

    pub async fn apply(&mut self, command: SamplerCommand) {
        match command {
            SamplerCommand::Start => self.start().await,
            SamplerCommand::Stop => self.stop(),
            SamplerCommand::Clear => self.clear(),
            SamplerCommand::SetInterval(seconds) => {
                let seconds = seconds.max(1);
                self.monitor.update_status(|s| s.interval_seconds = seconds);
                if self.state.is_sampling() {
                    self.report(format!("Interval: {}", interval_label(seconds)));
                }
            }
            SamplerCommand::Load(session) => self.load(*session),
        }
    }
}

pub struct SamplerConfig {
    pub interval_secs: u32,
    /// How often to log app stats (real seconds).
    pub stats_log_interval_secs: u64,
}

fn tick_period(seconds: u32) -> Duration {
    Duration::from_secs(u64::from(seconds.max(1)))
}

/// Spawns the sampling loop. Commands are handled between ticks, so a stop never
/// interrupts a fetch in flight; it takes effect before the next tick.
pub fn spawn<S: CounterSource>(
    mut sampler: Sampler<S>,
    config: SamplerConfig,
    mut commands: mpsc::Receiver<SamplerCommand>,
    mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    let span = tracing::span!(
        tracing::Level::DEBUG,
        "sampler",
        interval_secs = config.interval_secs
    );
    let run = async move {
        let mut period = tick_period(config.interval_secs);
        let mut tick = interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut stats_log_tick = interval(Duration::from_secs(config.stats_log_interval_secs));
        stats_log_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let TickOutcome::ConnectionLost(msg) = sampler.tick().await {
                        tracing::warn!(error = %msg, "sampling stopped: connection lost");
                    }
                }
                command = commands.recv() => {
                    let Some(command) = command else {
                        tracing::debug!("Command channel closed");
                        break;
                    };
                    let restart_tick = match &command {
                        SamplerCommand::Start => true,
                        SamplerCommand::SetInterval(seconds) => {
                            period = tick_period(*seconds);
                            true
                        }
                        _ => false,
                    };
                    sampler.apply(command).await;
                    if restart_tick {
                        tick = interval_at(Instant::now() + period, period);
                        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                    }
                }
                _ = &mut shutdown_rx => {
                    tracing::debug!("Sampler shutting down");
                    break;
                }
                _ = stats_log_tick.tick() => {
                    let status = sampler.monitor.status();
                    tracing::info!(
                        state = ?status.state,
                        ws_clients = sampler.monitor.ws_client_count(),
                        captures_total = status.captures_total,
                        retained = status.retained,
                        "app stats"
                    );
                }
            }
        }
    };
    tokio::spawn(run.instrument(span))
}
