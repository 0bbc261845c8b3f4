//! Event-driven status monitor.
//!
//! `StatusMonitor` is the single writer of live node/store/range status. Every
//! event goes through `register`, which takes one mutex for the whole effect,
//! so a concurrent snapshot sees either none or all of an event. Totals are
//! maintained incrementally: range deltas adjust the owning store, and every
//! store mutation applies its before/after difference to the node.
//!
//! Events that reference an unknown node, store or range are dropped with a
//! warning. Producers race (one stream per store, one per RPC call site), so
//! occasional misordering must not take the monitor down.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::thread;

use anyhow::Context;

use crate::clock::Clock;
use crate::config::StatusConfig;
use crate::events::{
    CallEvent, NodeDescriptor, NodeId, RangeDescriptor, RangeId, RegisterRangeEvent,
    ReplicationStatusEvent, StatusEvent, StoreDescriptor, StoreId, UpdateRangeEvent,
};
use crate::histogram::{CallOutcome, HistogramWindowSet};
use crate::stats::RangeStats;

/// Live status of one range on one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeStatus {
    pub desc: RangeDescriptor,
    pub stats: RangeStats,
    /// Registered since the store's current scan began.
    pub scanned: bool,
}

/// Materialized status of one store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStatus {
    /// Latest descriptor reported for the store, including capacity.
    pub desc: StoreDescriptor,
    /// Owning node; 0 until the node has started.
    pub node_id: NodeId,
    /// Unix nanos when the store started.
    pub started_at: i64,
    /// Unix nanos of the snapshot that produced this copy.
    pub updated_at: i64,
    /// Sum of the stats of every live range on the store.
    pub stats: RangeStats,
    /// Number of live ranges on the store.
    pub range_count: i64,
    /// Ranges whose lease this store holds, as last reported by replication.
    pub leader_range_count: i64,
    /// Ranges with a quorum of live replicas, as last reported.
    pub available_range_count: i64,
    /// Ranges at their full replication factor, as last reported.
    pub replicated_range_count: i64,
}

/// Materialized status of the node: totals across its stores plus RPC counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeStatus {
    pub desc: NodeDescriptor,
    /// Unix nanos when the node started.
    pub started_at: i64,
    /// Unix nanos of the snapshot that produced this copy.
    pub updated_at: i64,
    /// Stores owned by the node, ascending.
    pub store_ids: Vec<StoreId>,
    /// Sum of the stats of every owned store.
    pub stats: RangeStats,
    /// Sum of `range_count` over owned stores.
    pub range_count: i64,
    /// Sum of `leader_range_count` over owned stores.
    pub leader_range_count: i64,
    /// Sum of `available_range_count` over owned stores.
    pub available_range_count: i64,
    /// Sum of `replicated_range_count` over owned stores.
    pub replicated_range_count: i64,
    /// Successful calls by method.
    pub call_success: BTreeMap<String, u64>,
    /// Failed calls by method.
    pub call_error: BTreeMap<String, u64>,
    /// Successful calls across all methods.
    pub success_count: u64,
    /// Failed calls across all methods.
    pub error_count: u64,
}

/// Store-level values that roll up into the node.
#[derive(Debug, Clone, Copy, Default)]
struct StoreTotals {
    stats: RangeStats,
    range_count: i64,
    leader_range_count: i64,
    available_range_count: i64,
    replicated_range_count: i64,
}

impl StoreTotals {
    fn of(status: &StoreStatus) -> Self {
        Self {
            stats: status.stats,
            range_count: status.range_count,
            leader_range_count: status.leader_range_count,
            available_range_count: status.available_range_count,
            replicated_range_count: status.replicated_range_count,
        }
    }
}

impl NodeStatus {
    fn apply_store_diff(&mut self, before: &StoreTotals, after: &StoreTotals) {
        self.stats.subtract(&before.stats);
        self.stats.add(&after.stats);
        self.range_count += after.range_count - before.range_count;
        self.leader_range_count += after.leader_range_count - before.leader_range_count;
        self.available_range_count += after.available_range_count - before.available_range_count;
        self.replicated_range_count +=
            after.replicated_range_count - before.replicated_range_count;
    }
}

#[derive(Debug)]
struct StoreRecord {
    status: StoreStatus,
    ranges: BTreeMap<RangeId, RangeStatus>,
    scanning: bool,
}

#[derive(Debug)]
struct MonitorState {
    node: Option<NodeStatus>,
    stores: BTreeMap<StoreId, StoreRecord>,
    windows: HistogramWindowSet,
}

/// Point-in-time copy of monitor state handed to the recorder.
#[derive(Debug, Clone)]
pub struct MonitorSnapshot {
    /// `None` until the node has started.
    pub node: Option<NodeStatus>,
    /// Every known store, ascending by store id.
    pub stores: Vec<StoreStatus>,
    pub windows: HistogramWindowSet,
}

/// A detected disagreement between incrementally maintained totals and a
/// recomputation from their parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateMismatch {
    StoreStats {
        store_id: StoreId,
        expected: RangeStats,
        actual: RangeStats,
    },
    StoreRangeCount {
        store_id: StoreId,
        expected: i64,
        actual: i64,
    },
    NodeStats {
        node_id: NodeId,
        expected: RangeStats,
        actual: RangeStats,
    },
    NodeCount {
        node_id: NodeId,
        field: &'static str,
        expected: i64,
        actual: i64,
    },
}

impl fmt::Display for AggregateMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateMismatch::StoreStats {
                store_id,
                expected,
                actual,
            } => write!(
                f,
                "store {store_id} stats diverged from its ranges: expected {expected:?}, have {actual:?}"
            ),
            AggregateMismatch::StoreRangeCount {
                store_id,
                expected,
                actual,
            } => write!(
                f,
                "store {store_id} range count {actual} != {expected} registered ranges"
            ),
            AggregateMismatch::NodeStats {
                node_id,
                expected,
                actual,
            } => write!(
                f,
                "node {node_id} stats diverged from its stores: expected {expected:?}, have {actual:?}"
            ),
            AggregateMismatch::NodeCount {
                node_id,
                field,
                expected,
                actual,
            } => write!(f, "node {node_id} {field} {actual} != store sum {expected}"),
        }
    }
}

/// The event bus and sole owner of live status state.
pub struct StatusMonitor {
    state: Mutex<MonitorState>,
    clock: Arc<dyn Clock>,
    dropped_events: AtomicU64,
}

impl StatusMonitor {
    pub fn new(config: &StatusConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let windows = HistogramWindowSet::new(config.time_scales.clone(), config.max_latency)
            .context("build latency windows")?;
        Ok(Self {
            state: Mutex::new(MonitorState {
                node: None,
                stores: BTreeMap::new(),
                windows,
            }),
            clock,
            dropped_events: AtomicU64::new(0),
        })
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Number of events dropped because they referenced unknown state.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply one event. Events for a given store/range must arrive in the
    /// order they happened; the monitor does not reorder.
    pub fn register(&self, event: StatusEvent) {
        let kind = event.kind();
        let now = self.clock.now_nanos();
        let mut state = self.lock();
        let applied = match event {
            StatusEvent::StartNode(ev) => {
                state.start_node(ev.desc, ev.started_at);
                true
            }
            StatusEvent::StartStore(ev) => {
                state.start_store(ev.store_id, ev.started_at);
                true
            }
            StatusEvent::StoreStatus(ev) => state.set_store_desc(ev.desc),
            StatusEvent::BeginScanRanges(ev) => state.with_store(ev.store_id, |store| {
                store.scanning = true;
                for range in store.ranges.values_mut() {
                    range.scanned = false;
                }
                true
            }),
            StatusEvent::RegisterRange(ev) => state.register_range(ev),
            StatusEvent::EndScanRanges(ev) => state.end_scan(ev.store_id),
            StatusEvent::UpdateRange(ev) => state.update_range(ev),
            StatusEvent::RemoveRange(ev) => state.with_store(ev.store_id, |store| {
                remove_range(store, ev.range_id)
            }),
            StatusEvent::SplitRange(ev) => {
                // Both halves are checked up front so a bad split changes nothing.
                let store_id = ev.original.store_id;
                let valid = ev.new.store_id == store_id
                    && ev.new.desc.range_id != ev.original.desc.range_id
                    && state.has_range(store_id, ev.original.desc.range_id)
                    && !state.has_range(store_id, ev.new.desc.range_id);
                valid && state.update_range(ev.original) && state.register_range(ev.new)
            }
            StatusEvent::MergeRange(ev) => {
                let store_id = ev.merged.store_id;
                let valid = ev.removed_range_id != ev.merged.desc.range_id
                    && state.has_range(store_id, ev.merged.desc.range_id)
                    && state.has_range(store_id, ev.removed_range_id);
                valid
                    && state.update_range(ev.merged)
                    && state.with_store(store_id, |store| {
                        remove_range(store, ev.removed_range_id)
                    })
            }
            StatusEvent::ReplicationStatus(ev) => state.set_replication(ev),
            StatusEvent::CallSuccess(ev) => state.record_call(ev, CallOutcome::Success, now),
            StatusEvent::CallError(ev) => state.record_call(ev, CallOutcome::Error, now),
        };
        drop(state);
        if !applied {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(event = kind, "status event referenced unknown state; dropped");
        }
    }

    /// Copy the current state. The lock is held only for the copy.
    pub fn snapshot(&self) -> MonitorSnapshot {
        let state = self.lock();
        MonitorSnapshot {
            node: state.node.clone(),
            stores: state.stores.values().map(|s| s.status.clone()).collect(),
            windows: state.windows.clone(),
        }
    }

    /// Live ranges of one store, ordered by range id.
    pub fn ranges(&self, store_id: StoreId) -> Option<Vec<RangeStatus>> {
        let state = self.lock();
        state
            .stores
            .get(&store_id)
            .map(|store| store.ranges.values().cloned().collect())
    }

    /// Recompute every total from its parts and report disagreements.
    pub fn check_consistency(&self) -> Vec<AggregateMismatch> {
        let state = self.lock();
        let mut out = Vec::new();
        let mut sum = StoreTotals::default();
        for (store_id, store) in &state.stores {
            let mut expected = RangeStats::default();
            for range in store.ranges.values() {
                expected.add(&range.stats);
            }
            if !expected.counters_eq(&store.status.stats) {
                out.push(AggregateMismatch::StoreStats {
                    store_id: *store_id,
                    expected,
                    actual: store.status.stats,
                });
            }
            let registered = store.ranges.len() as i64;
            if registered != store.status.range_count {
                out.push(AggregateMismatch::StoreRangeCount {
                    store_id: *store_id,
                    expected: registered,
                    actual: store.status.range_count,
                });
            }
            sum.stats.add(&store.status.stats);
            sum.range_count += store.status.range_count;
            sum.leader_range_count += store.status.leader_range_count;
            sum.available_range_count += store.status.available_range_count;
            sum.replicated_range_count += store.status.replicated_range_count;
        }
        let Some(node) = &state.node else {
            return out;
        };
        let node_id = node.desc.node_id;
        if !sum.stats.counters_eq(&node.stats) {
            out.push(AggregateMismatch::NodeStats {
                node_id,
                expected: sum.stats,
                actual: node.stats,
            });
        }
        for (field, expected, actual) in [
            ("range_count", sum.range_count, node.range_count),
            ("leader_range_count", sum.leader_range_count, node.leader_range_count),
            (
                "available_range_count",
                sum.available_range_count,
                node.available_range_count,
            ),
            (
                "replicated_range_count",
                sum.replicated_range_count,
                node.replicated_range_count,
            ),
        ] {
            if expected != actual {
                out.push(AggregateMismatch::NodeCount {
                    node_id,
                    field,
                    expected,
                    actual,
                });
            }
        }
        out
    }

    /// Start a dedicated aggregation worker fed through a channel.
    pub fn spawn_feed(self: &Arc<Self>) -> anyhow::Result<EventFeed> {
        let (tx, rx) = mpsc::channel();
        let monitor = Arc::clone(self);
        let worker = thread::Builder::new()
            .name("status-feed".to_string())
            .spawn(move || feed_worker(&monitor, rx))
            .context("spawn status feed thread")?;
        Ok(EventFeed {
            sender: EventSender { tx },
            worker: Some(worker),
        })
    }
}

impl MonitorState {
    fn start_node(&mut self, desc: NodeDescriptor, started_at: i64) {
        let node_id = desc.node_id;
        let mut node = NodeStatus {
            desc,
            started_at,
            updated_at: started_at,
            ..NodeStatus::default()
        };
        for (store_id, store) in &mut self.stores {
            // Stores started ahead of the node are adopted here.
            store.status.node_id = node_id;
            store.status.desc.node_id = node_id;
            node.store_ids.push(*store_id);
            node.apply_store_diff(&StoreTotals::default(), &StoreTotals::of(&store.status));
        }
        // A second start replaces the node wholesale; totals were rebuilt above.
        if let Some(prev) = self.node.take() {
            tracing::warn!(node_id, prev_node_id = prev.desc.node_id, "node restarted in monitor");
        }
        self.node = Some(node);
    }

    fn start_store(&mut self, store_id: StoreId, started_at: i64) {
        let node_id = self.node.as_ref().map(|n| n.desc.node_id).unwrap_or(0);
        let record = StoreRecord {
            status: StoreStatus {
                desc: StoreDescriptor {
                    store_id,
                    node_id,
                    ..StoreDescriptor::default()
                },
                node_id,
                started_at,
                updated_at: started_at,
                ..StoreStatus::default()
            },
            ranges: BTreeMap::new(),
            scanning: false,
        };
        let prev = self.stores.insert(store_id, record);
        if let Some(node) = self.node.as_mut() {
            match prev {
                // Restart: back the old store's totals out of the node.
                Some(prev) => {
                    node.apply_store_diff(&StoreTotals::of(&prev.status), &StoreTotals::default());
                    tracing::warn!(store_id, "store restarted; previous ranges discarded");
                }
                None => {
                    node.store_ids.push(store_id);
                    node.store_ids.sort_unstable();
                }
            }
        }
    }

    fn has_range(&self, store_id: StoreId, range_id: RangeId) -> bool {
        self.stores
            .get(&store_id)
            .is_some_and(|store| store.ranges.contains_key(&range_id))
    }

    /// Run `f` against a known store and fold its total change into the node.
    /// Returns false when the store is unknown or `f` rejected the event.
    fn with_store<F>(&mut self, store_id: StoreId, f: F) -> bool
    where
        F: FnOnce(&mut StoreRecord) -> bool,
    {
        let Some(store) = self.stores.get_mut(&store_id) else {
            tracing::debug!(store_id, "event for unknown store");
            return false;
        };
        let before = StoreTotals::of(&store.status);
        let applied = f(store);
        let after = StoreTotals::of(&store.status);
        // Stores started before the node are folded in by `start_node`.
        if let Some(node) = self.node.as_mut() {
            node.apply_store_diff(&before, &after);
        }
        applied
    }

    fn set_store_desc(&mut self, desc: StoreDescriptor) -> bool {
        let store_id = desc.store_id;
        self.with_store(store_id, |store| {
            store.status.desc = desc;
            true
        })
    }

    fn register_range(&mut self, ev: RegisterRangeEvent) -> bool {
        let RegisterRangeEvent {
            store_id,
            desc,
            stats,
            scan: _,
        } = ev;
        self.with_store(store_id, |store| {
            let range_id = desc.range_id;
            let prior = store.ranges.insert(
                range_id,
                RangeStatus {
                    desc,
                    stats,
                    scanned: true,
                },
            );
            match prior {
                // Re-registration replaces absolute stats, it does not add to them.
                Some(prior) => store.status.stats.subtract(&prior.stats),
                None => store.status.range_count += 1,
            }
            store.status.stats.add(&stats);
            true
        })
    }

    fn end_scan(&mut self, store_id: StoreId) -> bool {
        self.with_store(store_id, |store| {
            if !store.scanning {
                tracing::debug!(store_id, "end of range scan without a matching begin");
                return false;
            }
            store.scanning = false;
            // Anything not re-registered since the scan began has left the store.
            let stale: Vec<RangeId> = store
                .ranges
                .iter()
                .filter(|(_, range)| !range.scanned)
                .map(|(id, _)| *id)
                .collect();
            for range_id in stale {
                tracing::debug!(store_id, range_id, "range left store during scan");
                remove_range(store, range_id);
            }
            true
        })
    }

    fn update_range(&mut self, ev: UpdateRangeEvent) -> bool {
        let UpdateRangeEvent {
            store_id,
            desc,
            delta,
        } = ev;
        self.with_store(store_id, |store| {
            let Some(range) = store.ranges.get_mut(&desc.range_id) else {
                tracing::debug!(store_id, range_id = desc.range_id, "update for unknown range");
                return false;
            };
            range.stats.add(&delta);
            range.desc = desc;
            store.status.stats.add(&delta);
            true
        })
    }

    fn set_replication(&mut self, ev: ReplicationStatusEvent) -> bool {
        self.with_store(ev.store_id, |store| {
            store.status.leader_range_count = ev.leader_range_count;
            store.status.available_range_count = ev.available_range_count;
            store.status.replicated_range_count = ev.replicated_range_count;
            true
        })
    }

    fn record_call(&mut self, ev: CallEvent, outcome: CallOutcome, now: i64) -> bool {
        let Some(node) = self.node.as_mut() else {
            tracing::debug!(node_id = ev.node_id, "call event before node start");
            return false;
        };
        if node.desc.node_id != ev.node_id {
            tracing::debug!(
                node_id = ev.node_id,
                local_node_id = node.desc.node_id,
                "call event for another node"
            );
            return false;
        }
        // Method names are case-insensitive in metric names.
        let method = ev.method.trim().to_ascii_lowercase();
        let (by_method, total) = match outcome {
            CallOutcome::Success => (&mut node.call_success, &mut node.success_count),
            CallOutcome::Error => (&mut node.call_error, &mut node.error_count),
        };
        *by_method.entry(method.clone()).or_insert(0) += 1;
        *total += 1;
        self.windows.record(&method, outcome, ev.latency, now);
        true
    }
}

fn remove_range(store: &mut StoreRecord, range_id: RangeId) -> bool {
    let Some(range) = store.ranges.remove(&range_id) else {
        tracing::debug!(store_id = store.status.desc.store_id, range_id, "remove of unknown range");
        return false;
    };
    store.status.stats.subtract(&range.stats);
    store.status.range_count -= 1;
    true
}

/// Commands accepted by the feed worker.
enum FeedCommand {
    Event(StatusEvent),
    Flush(mpsc::Sender<()>),
    Shutdown,
}

/// Cloneable producer handle for the feed worker.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<FeedCommand>,
}

impl EventSender {
    pub fn send(&self, event: StatusEvent) -> anyhow::Result<()> {
        self.tx
            .send(FeedCommand::Event(event))
            .map_err(|_| anyhow::anyhow!("status feed closed"))
    }
}

/// Handle to the aggregation worker started by `StatusMonitor::spawn_feed`.
pub struct EventFeed {
    sender: EventSender,
    worker: Option<thread::JoinHandle<()>>,
}

impl EventFeed {
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    pub fn send(&self, event: StatusEvent) -> anyhow::Result<()> {
        self.sender.send(event)
    }

    /// Block until every event sent before this call has been applied.
    pub fn flush(&self) -> anyhow::Result<()> {
        let (tx, rx) = mpsc::channel();
        self.sender
            .tx
            .send(FeedCommand::Flush(tx))
            .map_err(|_| anyhow::anyhow!("status feed closed"))?;
        rx.recv().context("status feed flush response dropped")
    }

    /// Drain queued events and stop the worker.
    pub fn shutdown(mut self) -> anyhow::Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        let Some(worker) = self.worker.take() else {
            // Already shut down explicitly.
            return Ok(());
        };
        let _ = self.sender.tx.send(FeedCommand::Shutdown);
        worker
            .join()
            .map_err(|_| anyhow::anyhow!("status feed worker panicked"))
    }
}

impl Drop for EventFeed {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::error!(error = ?err, "status feed shutdown failed");
        }
    }
}

fn feed_worker(monitor: &StatusMonitor, rx: mpsc::Receiver<FeedCommand>) {
    while let Ok(cmd) = rx.recv() {
        match cmd {
            FeedCommand::Event(event) => monitor.register(event),
            // Everything queued ahead of the flush has been applied by now.
            FeedCommand::Flush(done) => {
                let _ = done.send(());
            }
            FeedCommand::Shutdown => break,
        }
    }
    tracing::debug!("status feed worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::{
        BeginScanRangesEvent, EndScanRangesEvent, MergeRangeEvent, RemoveRangeEvent,
        SplitRangeEvent, StartNodeEvent, StartStoreEvent, StoreCapacity, StoreStatusEvent,
    };
    use std::time::Duration;

    fn stats(live_bytes: i64) -> RangeStats {
        RangeStats {
            live_bytes,
            key_bytes: live_bytes * 2,
            live_count: 1,
            last_update_nanos: 10,
            ..RangeStats::default()
        }
    }

    fn desc(range_id: RangeId, start: &[u8], end: &[u8]) -> RangeDescriptor {
        RangeDescriptor {
            range_id,
            start_key: start.to_vec(),
            end_key: end.to_vec(),
        }
    }

    fn monitor() -> StatusMonitor {
        let monitor =
            StatusMonitor::new(&StatusConfig::default(), Arc::new(ManualClock::new(100))).unwrap();
        monitor.register(StatusEvent::StartNode(StartNodeEvent {
            desc: NodeDescriptor {
                node_id: 1,
                address: "127.0.0.1:26257".to_string(),
            },
            started_at: 10,
        }));
        monitor.register(StatusEvent::StartStore(StartStoreEvent {
            store_id: 1,
            started_at: 20,
        }));
        monitor
    }

    fn register(monitor: &StatusMonitor, range_id: RangeId, live_bytes: i64) {
        monitor.register(StatusEvent::RegisterRange(RegisterRangeEvent {
            store_id: 1,
            desc: desc(range_id, b"", b""),
            stats: stats(live_bytes),
            scan: true,
        }));
    }

    fn update(monitor: &StatusMonitor, range_id: RangeId, live_bytes: i64) {
        monitor.register(StatusEvent::UpdateRange(UpdateRangeEvent {
            store_id: 1,
            desc: desc(range_id, b"", b""),
            delta: stats(live_bytes),
        }));
    }

    fn store(monitor: &StatusMonitor) -> StoreStatus {
        monitor.snapshot().stores.remove(0)
    }

    fn assert_consistent(monitor: &StatusMonitor) {
        let mismatches = monitor.check_consistency();
        assert!(mismatches.is_empty(), "mismatches: {mismatches:?}");
    }

    #[test]
    fn store_total_tracks_ranges_across_interleavings() {
        let monitor = monitor();
        register(&monitor, 1, 5);
        update(&monitor, 1, 3);
        register(&monitor, 2, 7);
        update(&monitor, 2, -2);
        assert_consistent(&monitor);

        monitor.register(StatusEvent::BeginScanRanges(BeginScanRangesEvent { store_id: 1 }));
        register(&monitor, 1, 4);
        update(&monitor, 2, 1);
        monitor.register(StatusEvent::EndScanRanges(EndScanRangesEvent { store_id: 1 }));
        assert_consistent(&monitor);

        let status = store(&monitor);
        assert_eq!(status.range_count, 1);
        assert_eq!(status.stats.live_bytes, 4);
    }

    #[test]
    fn reregistering_replaces_prior_stats() {
        let monitor = monitor();
        register(&monitor, 1, 5);
        register(&monitor, 1, 9);
        let status = store(&monitor);
        assert_eq!(status.range_count, 1);
        assert_eq!(status.stats.live_bytes, 9);
        assert_consistent(&monitor);
    }

    #[test]
    fn end_scan_subtracts_exactly_the_dropped_range() {
        let monitor = monitor();
        register(&monitor, 1, 5);
        register(&monitor, 2, 11);
        update(&monitor, 2, 4);
        let before = store(&monitor).stats;

        monitor.register(StatusEvent::BeginScanRanges(BeginScanRangesEvent { store_id: 1 }));
        register(&monitor, 1, 5);
        monitor.register(StatusEvent::EndScanRanges(EndScanRangesEvent { store_id: 1 }));

        let after = store(&monitor).stats;
        assert_eq!(before.live_bytes - after.live_bytes, 15);
        assert_eq!(before.key_bytes - after.key_bytes, 30);
        assert_eq!(before.live_count - after.live_count, 2);
        assert_eq!(monitor.ranges(1).unwrap().len(), 1);
    }

    #[test]
    fn unknown_references_are_dropped_and_counted() {
        let monitor = monitor();
        update(&monitor, 42, 1);
        monitor.register(StatusEvent::StoreStatus(StoreStatusEvent {
            desc: StoreDescriptor {
                store_id: 9,
                node_id: 1,
                capacity: StoreCapacity {
                    capacity: 1,
                    available: 1,
                },
            },
        }));
        monitor.register(StatusEvent::ReplicationStatus(ReplicationStatusEvent {
            store_id: 9,
            leader_range_count: 1,
            available_range_count: 1,
            replicated_range_count: 1,
        }));
        monitor.register(StatusEvent::CallSuccess(CallEvent {
            node_id: 7,
            method: "get".to_string(),
            latency: Duration::from_millis(1),
        }));
        monitor.register(StatusEvent::EndScanRanges(EndScanRangesEvent { store_id: 1 }));

        assert_eq!(monitor.dropped_events(), 5);
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.stores.len(), 1);
        assert_eq!(snapshot.stores[0].stats, RangeStats::default());
        assert_eq!(snapshot.node.unwrap().success_count, 0);
    }

    #[test]
    fn split_and_merge_keep_totals() {
        let monitor = monitor();
        register(&monitor, 1, 10);
        monitor.register(StatusEvent::SplitRange(SplitRangeEvent {
            original: UpdateRangeEvent {
                store_id: 1,
                desc: desc(1, b"", b"m"),
                delta: RangeStats {
                    live_bytes: -4,
                    ..RangeStats::default()
                },
            },
            new: RegisterRangeEvent {
                store_id: 1,
                desc: desc(2, b"m", b""),
                stats: RangeStats {
                    live_bytes: 4,
                    ..RangeStats::default()
                },
                scan: false,
            },
        }));
        let status = store(&monitor);
        assert_eq!(status.range_count, 2);
        assert_eq!(status.stats.live_bytes, 10);
        assert_consistent(&monitor);

        monitor.register(StatusEvent::MergeRange(MergeRangeEvent {
            merged: UpdateRangeEvent {
                store_id: 1,
                desc: desc(1, b"", b""),
                delta: RangeStats {
                    live_bytes: 4,
                    ..RangeStats::default()
                },
            },
            removed_range_id: 2,
        }));
        let status = store(&monitor);
        assert_eq!(status.range_count, 1);
        assert_eq!(status.stats.live_bytes, 10);
        assert_eq!(monitor.ranges(1).unwrap()[0].desc.end_key, Vec::<u8>::new());
        assert_consistent(&monitor);

        monitor.register(StatusEvent::RemoveRange(RemoveRangeEvent {
            store_id: 1,
            range_id: 1,
        }));
        assert_eq!(store(&monitor).range_count, 0);
        assert_consistent(&monitor);
    }

    #[test]
    fn node_totals_follow_store_changes() {
        let monitor = monitor();
        monitor.register(StatusEvent::StartStore(StartStoreEvent {
            store_id: 2,
            started_at: 30,
        }));
        register(&monitor, 1, 3);
        monitor.register(StatusEvent::RegisterRange(RegisterRangeEvent {
            store_id: 2,
            desc: desc(1, b"", b""),
            stats: stats(6),
            scan: true,
        }));
        monitor.register(StatusEvent::ReplicationStatus(ReplicationStatusEvent {
            store_id: 2,
            leader_range_count: 1,
            available_range_count: 1,
            replicated_range_count: 1,
        }));

        let node = monitor.snapshot().node.unwrap();
        assert_eq!(node.store_ids, vec![1, 2]);
        assert_eq!(node.range_count, 2);
        assert_eq!(node.leader_range_count, 1);
        assert_eq!(node.stats.live_bytes, 9);
        assert_consistent(&monitor);
    }

    #[test]
    fn stores_started_before_node_roll_up() {
        let monitor =
            StatusMonitor::new(&StatusConfig::default(), Arc::new(ManualClock::new(0))).unwrap();
        monitor.register(StatusEvent::StartStore(StartStoreEvent {
            store_id: 3,
            started_at: 1,
        }));
        monitor.register(StatusEvent::RegisterRange(RegisterRangeEvent {
            store_id: 3,
            desc: desc(1, b"", b""),
            stats: stats(2),
            scan: false,
        }));
        monitor.register(StatusEvent::StartNode(StartNodeEvent {
            desc: NodeDescriptor {
                node_id: 4,
                address: String::new(),
            },
            started_at: 2,
        }));
        let snapshot = monitor.snapshot();
        let node = snapshot.node.unwrap();
        assert_eq!(node.store_ids, vec![3]);
        assert_eq!(node.range_count, 1);
        assert_eq!(snapshot.stores[0].node_id, 4);
        assert_eq!(snapshot.stores[0].desc.node_id, 4);
        assert_consistent(&monitor);
    }

    #[test]
    fn split_with_unknown_original_changes_nothing() {
        let monitor = monitor();
        register(&monitor, 1, 10);
        let before = monitor.snapshot();

        monitor.register(StatusEvent::SplitRange(SplitRangeEvent {
            original: UpdateRangeEvent {
                store_id: 1,
                desc: desc(99, b"", b"m"),
                delta: stats(-4),
            },
            new: RegisterRangeEvent {
                store_id: 1,
                desc: desc(100, b"m", b""),
                stats: stats(4),
                scan: false,
            },
        }));
        // New half already registered.
        monitor.register(StatusEvent::SplitRange(SplitRangeEvent {
            original: UpdateRangeEvent {
                store_id: 1,
                desc: desc(1, b"", b"m"),
                delta: stats(-4),
            },
            new: RegisterRangeEvent {
                store_id: 1,
                desc: desc(1, b"m", b""),
                stats: stats(4),
                scan: false,
            },
        }));

        assert_eq!(monitor.dropped_events(), 2);
        let after = monitor.snapshot();
        assert_eq!(after.stores, before.stores);
        assert_eq!(after.node, before.node);
        assert_eq!(monitor.ranges(1).unwrap().len(), 1);
        assert_consistent(&monitor);
    }

    #[test]
    fn merge_with_unknown_removed_range_changes_nothing() {
        let monitor = monitor();
        register(&monitor, 1, 10);
        register(&monitor, 2, 6);
        let before = monitor.snapshot();

        monitor.register(StatusEvent::MergeRange(MergeRangeEvent {
            merged: UpdateRangeEvent {
                store_id: 1,
                desc: desc(1, b"", b""),
                delta: stats(6),
            },
            removed_range_id: 42,
        }));
        monitor.register(StatusEvent::MergeRange(MergeRangeEvent {
            merged: UpdateRangeEvent {
                store_id: 1,
                desc: desc(2, b"", b""),
                delta: stats(6),
            },
            removed_range_id: 2,
        }));

        assert_eq!(monitor.dropped_events(), 2);
        let after = monitor.snapshot();
        assert_eq!(after.stores, before.stores);
        assert_eq!(after.node, before.node);
        assert_eq!(monitor.ranges(1).unwrap().len(), 2);
    }

    #[test]
    fn call_events_count_by_method() {
        let monitor = monitor();
        for method in ["Get", "put", "get"] {
            monitor.register(StatusEvent::CallSuccess(CallEvent {
                node_id: 1,
                method: method.to_string(),
                latency: Duration::from_micros(250),
            }));
        }
        monitor.register(StatusEvent::CallError(CallEvent {
            node_id: 1,
            method: "scan".to_string(),
            latency: Duration::from_millis(3),
        }));
        let node = monitor.snapshot().node.unwrap();
        assert_eq!(node.success_count, 3);
        assert_eq!(node.error_count, 1);
        assert_eq!(node.call_success["get"], 2);
        assert_eq!(node.call_error["scan"], 1);
    }

    #[test]
    fn feed_worker_applies_events_in_order() {
        let monitor = Arc::new(monitor());
        let feed = monitor.spawn_feed().unwrap();
        let sender = feed.sender();
        let producer = std::thread::spawn(move || {
            for i in 1..=50u64 {
                sender
                    .send(StatusEvent::RegisterRange(RegisterRangeEvent {
                        store_id: 1,
                        desc: desc(i, b"", b""),
                        stats: stats(1),
                        scan: false,
                    }))
                    .unwrap();
            }
        });
        producer.join().unwrap();
        feed.flush().unwrap();
        assert_eq!(store(&monitor).range_count, 50);
        feed.shutdown().unwrap();
        assert_consistent(&monitor);
    }
}
