// Domain models: raw counter snapshots, per-interval deltas, sessions and grouping.

mod capture;
mod group;
mod session;
mod snapshot;
pub mod timestamp;

pub use capture::{CaptureSummary, DeltaCapture, DeltaRow};
pub use group::{ALL_FILTER, GroupBy, GroupInfo, Metric};
pub use session::{APPLICATION_TAG, SESSION_VERSION, SessionData};
pub use snapshot::{Snapshot, SnapshotRow};
