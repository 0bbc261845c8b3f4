//! Typed lifecycle and operational events consumed by the status monitor.
//!
//! Producers (store scanners, the replication layer, RPC dispatch wrappers and
//! node/store lifecycle management) build one of these and hand it to
//! `StatusMonitor::register`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::stats::RangeStats;

pub type NodeId = u64;
pub type StoreId = u64;
pub type RangeId = u64;

/// Node identity and address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub node_id: NodeId,
    /// Advertised RPC address, `host:port`.
    pub address: String,
}

/// Disk capacity as last reported by a store, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCapacity {
    /// Total bytes of the store's volume.
    pub capacity: i64,
    /// Bytes still free for new data.
    pub available: i64,
}

/// Store identity plus its latest reported capacity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDescriptor {
    pub store_id: StoreId,
    /// Node hosting the store.
    pub node_id: NodeId,
    pub capacity: StoreCapacity,
}

/// Range descriptor. Key spans are lexicographic and end-exclusive; an empty
/// `end_key` means the span is unbounded on the right.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeDescriptor {
    pub range_id: RangeId,
    pub start_key: Vec<u8>,
    pub end_key: Vec<u8>,
}

impl RangeDescriptor {
    pub fn contains_key(&self, key: &[u8]) -> bool {
        key >= self.start_key.as_slice()
            && (self.end_key.is_empty() || key < self.end_key.as_slice())
    }
}

/// The local node came up.
#[derive(Debug, Clone)]
pub struct StartNodeEvent {
    pub desc: NodeDescriptor,
    /// Start time in nanoseconds since the Unix epoch.
    pub started_at: i64,
}

/// A store on the local node came up. Restarting a known store resets it.
#[derive(Debug, Clone)]
pub struct StartStoreEvent {
    pub store_id: StoreId,
    /// Start time in nanoseconds since the Unix epoch.
    pub started_at: i64,
}

/// Periodic descriptor refresh; replaces the store's descriptor wholesale.
#[derive(Debug, Clone)]
pub struct StoreStatusEvent {
    pub desc: StoreDescriptor,
}

#[derive(Debug, Clone)]
pub struct BeginScanRangesEvent {
    /// Store whose range set is about to be re-enumerated.
    pub store_id: StoreId,
}

/// Closes a scan; ranges not registered since the matching begin are removed.
#[derive(Debug, Clone)]
pub struct EndScanRangesEvent {
    pub store_id: StoreId,
}

/// Registers a range with its absolute stats. `scan` marks registrations
/// issued by a store scan.
#[derive(Debug, Clone)]
pub struct RegisterRangeEvent {
    pub store_id: StoreId,
    pub desc: RangeDescriptor,
    /// Absolute stats; replaces any previous value for the range.
    pub stats: RangeStats,
    pub scan: bool,
}

/// Applies a stats delta to a registered range.
#[derive(Debug, Clone)]
pub struct UpdateRangeEvent {
    pub store_id: StoreId,
    pub desc: RangeDescriptor,
    /// Signed change added to the range's stats.
    pub delta: RangeStats,
}

/// Drops a range and subtracts its stats from the store.
#[derive(Debug, Clone)]
pub struct RemoveRangeEvent {
    pub store_id: StoreId,
    pub range_id: RangeId,
}

/// A local split: the original range shrinks by `original.delta` and the new
/// right-hand range is registered with `new.stats`. Both halves name the same
/// store.
#[derive(Debug, Clone)]
pub struct SplitRangeEvent {
    pub original: UpdateRangeEvent,
    pub new: RegisterRangeEvent,
}

/// A local merge: the surviving range absorbs `merged.delta` and
/// `removed_range_id` leaves the store.
#[derive(Debug, Clone)]
pub struct MergeRangeEvent {
    pub merged: UpdateRangeEvent,
    pub removed_range_id: RangeId,
}

/// Replication gauges for one store. Each report overwrites the last.
#[derive(Debug, Clone)]
pub struct ReplicationStatusEvent {
    pub store_id: StoreId,
    /// Ranges whose lease holder is on this store.
    pub leader_range_count: i64,
    /// Ranges with a quorum of live replicas.
    pub available_range_count: i64,
    /// Ranges at their full replication factor.
    pub replicated_range_count: i64,
}

/// One finished RPC call observed by the dispatch layer.
#[derive(Debug, Clone)]
pub struct CallEvent {
    /// Node that served the call; must be the local node.
    pub node_id: NodeId,
    /// RPC method name, matched case-insensitively.
    pub method: String,
    pub latency: Duration,
}

/// Every event kind the monitor understands.
#[derive(Debug, Clone)]
pub enum StatusEvent {
    StartNode(StartNodeEvent),
    StartStore(StartStoreEvent),
    StoreStatus(StoreStatusEvent),
    BeginScanRanges(BeginScanRangesEvent),
    RegisterRange(RegisterRangeEvent),
    EndScanRanges(EndScanRangesEvent),
    UpdateRange(UpdateRangeEvent),
    RemoveRange(RemoveRangeEvent),
    SplitRange(SplitRangeEvent),
    MergeRange(MergeRangeEvent),
    ReplicationStatus(ReplicationStatusEvent),
    CallSuccess(CallEvent),
    CallError(CallEvent),
}

impl StatusEvent {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            StatusEvent::StartNode(_) => "start_node",
            StatusEvent::StartStore(_) => "start_store",
            StatusEvent::StoreStatus(_) => "store_status",
            StatusEvent::BeginScanRanges(_) => "begin_scan_ranges",
            StatusEvent::RegisterRange(_) => "register_range",
            StatusEvent::EndScanRanges(_) => "end_scan_ranges",
            StatusEvent::UpdateRange(_) => "update_range",
            StatusEvent::RemoveRange(_) => "remove_range",
            StatusEvent::SplitRange(_) => "split_range",
            StatusEvent::MergeRange(_) => "merge_range",
            StatusEvent::ReplicationStatus(_) => "replication_status",
            StatusEvent::CallSuccess(_) => "call_success",
            StatusEvent::CallError(_) => "call_error",
        }
    }
}
