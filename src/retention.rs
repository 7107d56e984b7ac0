// Bounded, insertion-ordered history of delta captures (oldest evicted first).

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Local};

use crate::models::DeltaCapture;

/// Captures kept in memory when no cap is configured (6 hours at 1-minute ticks).
pub const DEFAULT_RETENTION_CAP: usize = 360;

#[derive(Debug, Clone)]
pub struct RetentionBuffer {
    captures: VecDeque<Arc<DeltaCapture>>,
    cap: usize,
}

impl Default for RetentionBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_CAP)
    }
}

impl RetentionBuffer {
    /// A cap of 0 is treated as 1.
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            captures: VecDeque::with_capacity(cap.min(DEFAULT_RETENTION_CAP)),
            cap,
        }
    }

    pub fn append(&mut self, capture: DeltaCapture) {
        self.push(Arc::new(capture));
    }

    pub fn push(&mut self, capture: Arc<DeltaCapture>) {
        self.captures.push_back(capture);
        self.evict();
    }

    /// Replaces the whole history (session load); the cap still applies.
    pub fn replace(&mut self, captures: impl IntoIterator<Item = DeltaCapture>) {
        self.captures = captures.into_iter().map(Arc::new).collect();
        self.evict();
    }

    pub fn clear(&mut self) {
        self.captures.clear();
    }

    /// Copy-on-read view: later appends or evictions do not affect the returned vector.
    pub fn history(&self) -> Vec<Arc<DeltaCapture>> {
        self.captures.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.captures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captures.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Local>> {
        self.captures.front().map(|c| c.timestamp)
    }

    pub fn last(&self) -> Option<Arc<DeltaCapture>> {
        self.captures.back().cloned()
    }

    fn evict(&mut self) {
        while self.captures.len() > self.cap {
            self.captures.pop_front();
        }
    }
}
