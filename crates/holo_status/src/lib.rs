//! Node status recording and range event auditing for HoloStore.
//!
//! Two independent pieces live here:
//!
//! - `StatusMonitor` consumes lifecycle and RPC events and keeps live
//!   node/store/range status; `StatusRecorder` turns that state into flat
//!   time series and summaries on demand.
//! - `RangeEventLog` is the durable, append-only record of range splits,
//!   written by `RangeDirectory` and audited by `check_split_invariants`.

pub mod clock;
pub mod config;
pub mod events;
pub mod histogram;
pub mod monitor;
pub mod range_log;
pub mod ranges;
pub mod recorder;
pub mod stats;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StatusConfig;
pub use events::StatusEvent;
pub use histogram::{HistogramWindowSet, LatencyHistogram, Quantile, TimeScale};
pub use monitor::{
    AggregateMismatch, EventFeed, EventSender, NodeStatus, RangeStatus, StatusMonitor, StoreStatus,
};
pub use range_log::{
    check_split_invariants, FileRangeEventLog, NewRangeEvent, RangeEventLog, RangeEventType,
    RangeLogEvent, SplitDetail, SplitViolation, SyncMode,
};
pub use ranges::{RangeDirectory, RangeIdAllocator, SplitOutcome};
pub use recorder::{sort_canonical, StatusRecorder, StatusSummaries, TimeSeriesDatapoint};
pub use stats::RangeStats;
