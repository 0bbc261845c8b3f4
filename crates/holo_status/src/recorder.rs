//! Snapshot-time conversion of monitor state into time series and summaries.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::clock::Clock;
use crate::config::StatusConfig;
use crate::histogram::{Quantile, AGGREGATE_METHOD};
use crate::monitor::{NodeStatus, StatusMonitor, StoreStatus};
use crate::stats::RangeStats;

const STORE_PREFIX: &str = "store.";
const NODE_PREFIX: &str = "node.";

/// One named, sourced, timestamped value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeriesDatapoint {
    pub name: String,
    /// Store id or node id, rendered as a string.
    pub source: String,
    pub timestamp_nanos: i64,
    pub value: f64,
}

/// Order datapoints by name, then source, then timestamp.
pub fn sort_canonical(points: &mut [TimeSeriesDatapoint]) {
    points.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then_with(|| a.source.cmp(&b.source))
            .then_with(|| a.timestamp_nanos.cmp(&b.timestamp_nanos))
            .then_with(|| a.value.partial_cmp(&b.value).unwrap_or(Ordering::Equal))
    });
}

/// Node summary plus every store summary, stamped with the snapshot time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSummaries {
    pub node: NodeStatus,
    pub stores: Vec<StoreStatus>,
}

/// Reads the monitor on demand and produces flat metrics or summaries.
pub struct StatusRecorder {
    monitor: Arc<StatusMonitor>,
    clock: Arc<dyn Clock>,
    quantiles: Vec<Quantile>,
}

impl StatusRecorder {
    pub fn new(monitor: Arc<StatusMonitor>, clock: Arc<dyn Clock>, config: &StatusConfig) -> Self {
        Self {
            monitor,
            clock,
            quantiles: config.quantiles.clone(),
        }
    }

    /// Every store and node metric at a single `now`. Order is unspecified.
    pub fn time_series_data(&self) -> Vec<TimeSeriesDatapoint> {
        let now = self.clock.now_nanos();
        let snapshot = self.monitor.snapshot();
        let mut out = Vec::new();

        for store in &snapshot.stores {
            let mut emit = Emitter::new(&mut out, STORE_PREFIX, store.desc.store_id, now);
            emit.stats(&store.stats);
            emit.int("ranges", store.range_count);
            emit.int("ranges.leader", store.leader_range_count);
            emit.int("ranges.available", store.available_range_count);
            emit.int("ranges.replicated", store.replicated_range_count);
            emit.int("capacity", store.desc.capacity.capacity);
            emit.int("capacity.available", store.desc.capacity.available);
        }

        let Some(node) = &snapshot.node else {
            return out;
        };
        let mut emit = Emitter::new(&mut out, NODE_PREFIX, node.desc.node_id, now);
        emit.stats(&node.stats);
        emit.int("ranges", node.range_count);
        emit.int("ranges.leader", node.leader_range_count);
        emit.int("ranges.available", node.available_range_count);
        emit.int("ranges.replicated", node.replicated_range_count);
        let per_method = |map: &BTreeMap<String, u64>| {
            map.iter()
                .filter(|(method, _)| method.as_str() != AGGREGATE_METHOD)
                .map(|(method, count)| (method.clone(), *count))
                .collect::<Vec<_>>()
        };
        for (method, count) in per_method(&node.call_success) {
            emit.count(&format!("{method}.success-count"), count);
        }
        for (method, count) in per_method(&node.call_error) {
            emit.count(&format!("{method}.error-count"), count);
        }
        if node.success_count > 0 || node.error_count > 0 {
            emit.count(&format!("{AGGREGATE_METHOD}.success-count"), node.success_count);
            emit.count(&format!("{AGGREGATE_METHOD}.error-count"), node.error_count);
        }
        for (name, value) in snapshot.windows.count_metrics(now) {
            emit.count(&name, value);
        }
        for (name, value) in snapshot.windows.quantile_metrics(&self.quantiles, now) {
            emit.count(&name, value);
        }
        out
    }

    /// Node and store summaries with `updated_at` set to now. `None` until the
    /// node has started.
    pub fn status_summaries(&self) -> Option<StatusSummaries> {
        let now = self.clock.now_nanos();
        let snapshot = self.monitor.snapshot();
        let mut node = snapshot.node?;
        node.updated_at = now;
        let stores = snapshot
            .stores
            .into_iter()
            .map(|mut store| {
                store.updated_at = now;
                store
            })
            .collect();
        Some(StatusSummaries { node, stores })
    }
}

struct Emitter<'a> {
    out: &'a mut Vec<TimeSeriesDatapoint>,
    prefix: &'static str,
    source: String,
    now: i64,
}

impl<'a> Emitter<'a> {
    fn new(out: &'a mut Vec<TimeSeriesDatapoint>, prefix: &'static str, id: u64, now: i64) -> Self {
        Self {
            out,
            prefix,
            source: id.to_string(),
            now,
        }
    }

    fn stats(&mut self, stats: &RangeStats) {
        for (name, value) in stats.metric_fields() {
            self.int(name, value);
        }
    }

    fn int(&mut self, name: &str, value: i64) {
        self.push(name, value as f64);
    }

    fn count(&mut self, name: &str, value: u64) {
        self.push(name, value as f64);
    }

    fn push(&mut self, name: &str, value: f64) {
        self.out.push(TimeSeriesDatapoint {
            name: format!("{}{name}", self.prefix),
            source: self.source.clone(),
            timestamp_nanos: self.now,
            value,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::{
        CallEvent, NodeDescriptor, RangeDescriptor, RegisterRangeEvent, StartNodeEvent,
        StartStoreEvent, StatusEvent,
    };
    use std::time::Duration;

    fn setup() -> (Arc<StatusMonitor>, Arc<ManualClock>, StatusRecorder) {
        let clock = Arc::new(ManualClock::new(1_000));
        let config = StatusConfig::default();
        let monitor = Arc::new(StatusMonitor::new(&config, clock.clone()).unwrap());
        let recorder = StatusRecorder::new(monitor.clone(), clock.clone(), &config);
        (monitor, clock, recorder)
    }

    fn start(monitor: &StatusMonitor) {
        monitor.register(StatusEvent::StartNode(StartNodeEvent {
            desc: NodeDescriptor {
                node_id: 1,
                address: "n1".to_string(),
            },
            started_at: 5,
        }));
        monitor.register(StatusEvent::StartStore(StartStoreEvent {
            store_id: 2,
            started_at: 6,
        }));
    }

    fn value(points: &[TimeSeriesDatapoint], name: &str, source: &str) -> Option<f64> {
        points
            .iter()
            .find(|p| p.name == name && p.source == source)
            .map(|p| p.value)
    }

    #[test]
    fn summaries_absent_before_node_start() {
        let (monitor, _clock, recorder) = setup();
        assert!(recorder.status_summaries().is_none());
        monitor.register(StatusEvent::StartStore(StartStoreEvent {
            store_id: 2,
            started_at: 6,
        }));
        assert!(recorder.status_summaries().is_none());
        let points = recorder.time_series_data();
        assert_eq!(value(&points, "store.ranges", "2"), Some(0.0));
        assert!(points.iter().all(|p| p.name.starts_with(STORE_PREFIX)));
    }

    #[test]
    fn summaries_are_stamped_with_now() {
        let (monitor, clock, recorder) = setup();
        start(&monitor);
        clock.set(9_000);
        let summaries = recorder.status_summaries().unwrap();
        assert_eq!(summaries.node.updated_at, 9_000);
        assert_eq!(summaries.node.started_at, 5);
        assert_eq!(summaries.stores.len(), 1);
        assert_eq!(summaries.stores[0].updated_at, 9_000);
    }

    #[test]
    fn store_and_node_metrics_share_timestamp_and_sources() {
        let (monitor, _clock, recorder) = setup();
        start(&monitor);
        monitor.register(StatusEvent::RegisterRange(RegisterRangeEvent {
            store_id: 2,
            desc: RangeDescriptor {
                range_id: 1,
                ..RangeDescriptor::default()
            },
            stats: RangeStats {
                live_bytes: 12,
                ..RangeStats::default()
            },
            scan: false,
        }));
        let points = recorder.time_series_data();
        assert!(points.iter().all(|p| p.timestamp_nanos == 1_000));
        assert_eq!(value(&points, "store.livebytes", "2"), Some(12.0));
        assert_eq!(value(&points, "node.livebytes", "1"), Some(12.0));
        assert_eq!(value(&points, "node.ranges", "1"), Some(1.0));
        assert_eq!(value(&points, "store.capacity", "2"), Some(0.0));
    }

    #[test]
    fn call_metrics_cover_methods_and_aggregate() {
        let (monitor, _clock, recorder) = setup();
        start(&monitor);
        monitor.register(StatusEvent::CallSuccess(CallEvent {
            node_id: 1,
            method: "get".to_string(),
            latency: Duration::from_millis(2),
        }));
        let points = recorder.time_series_data();
        assert_eq!(value(&points, "node.get.success-count", "1"), Some(1.0));
        assert_eq!(value(&points, "node.exec.success-count", "1"), Some(1.0));
        assert_eq!(value(&points, "node.exec.error-count", "1"), Some(0.0));
        assert_eq!(value(&points, "node.exec.success-1m", "1"), Some(1.0));
        // Two significant digits: within 1% of the recorded 2ms.
        let p100 = value(&points, "node.get.latency-all-p100", "1").unwrap();
        assert!((2_000_000.0..2_020_000.0).contains(&p100), "p100={p100}");
    }

    #[test]
    fn sort_canonical_orders_by_name_then_source() {
        let point = |name: &str, source: &str, ts: i64| TimeSeriesDatapoint {
            name: name.to_string(),
            source: source.to_string(),
            timestamp_nanos: ts,
            value: 0.0,
        };
        let mut points = vec![
            point("b", "1", 1),
            point("a", "2", 1),
            point("a", "1", 2),
            point("a", "1", 1),
        ];
        sort_canonical(&mut points);
        let keys: Vec<(&str, &str, i64)> = points
            .iter()
            .map(|p| (p.name.as_str(), p.source.as_str(), p.timestamp_nanos))
            .collect();
        assert_eq!(keys, vec![("a", "1", 1), ("a", "1", 2), ("a", "2", 1), ("b", "1", 1)]);
    }
}
