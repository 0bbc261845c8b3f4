//! Multi-window latency histograms and call counters.
//!
//! Each RPC method class owns one latency histogram and one success/error
//! counter pair per configured time scale. Windowed scales keep a small ring
//! of sub-window slots tagged with their slot epoch; reads merge the slots that
//! are still inside the window, so a read never has to rotate (mutate) state.
//!
//! Latencies are recorded in nanoseconds into HDR histograms bounded by the
//! configured maximum latency, at two significant digits.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use anyhow::Context;
use hdrhistogram::Histogram;

/// Number of sub-window slots kept per windowed time scale.
const WINDOW_SLOTS: i64 = 6;
/// Significant figures kept by latency histograms.
const LATENCY_SIGFIGS: u8 = 2;

/// Method class that aggregates every call regardless of method.
pub const AGGREGATE_METHOD: &str = "exec";

/// A named time scale: either a sliding window or all-time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeScale {
    name: String,
    window: Option<Duration>,
}

impl TimeScale {
    pub fn windowed(name: impl Into<String>, window: Duration) -> Self {
        Self {
            name: name.into(),
            window: Some(window),
        }
    }

    pub fn all_time() -> Self {
        Self {
            name: "all".to_string(),
            window: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn window(&self) -> Option<Duration> {
        self.window
    }

    /// Parse `all` or `<n><s|m|h>`, e.g. `1m`, `10m`, `1h`.
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("all") {
            return Ok(Self::all_time());
        }
        anyhow::ensure!(raw.len() >= 2, "invalid time scale: {raw:?}");
        let (num, unit) = raw.split_at(raw.len() - 1);
        let n = num
            .parse::<u64>()
            .with_context(|| format!("invalid time scale: {raw:?}"))?;
        anyhow::ensure!(n > 0, "time scale must be positive: {raw:?}");
        let secs = match unit {
            "s" => n,
            "m" => n.saturating_mul(60),
            "h" => n.saturating_mul(3_600),
            _ => anyhow::bail!("invalid time scale unit in {raw:?} (expected s, m or h)"),
        };
        Ok(Self::windowed(raw, Duration::from_secs(secs)))
    }
}

impl fmt::Display for TimeScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Default scales: 1 minute, 10 minutes, 1 hour and all-time.
pub fn default_time_scales() -> Vec<TimeScale> {
    vec![
        TimeScale::windowed("1m", Duration::from_secs(60)),
        TimeScale::windowed("10m", Duration::from_secs(600)),
        TimeScale::windowed("1h", Duration::from_secs(3_600)),
        TimeScale::all_time(),
    ]
}

/// A percentile to report, with the label used in metric names (`p99.9`).
#[derive(Debug, Clone, PartialEq)]
pub struct Quantile {
    label: String,
    percentile: f64,
}

impl Quantile {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn percentile(&self) -> f64 {
        self.percentile
    }

    /// Parse a percentile such as `50` or `99.9`.
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let raw = raw.trim();
        let percentile = raw
            .parse::<f64>()
            .with_context(|| format!("invalid quantile: {raw:?}"))?;
        anyhow::ensure!(
            percentile > 0.0 && percentile <= 100.0,
            "quantile out of range (0, 100]: {raw:?}"
        );
        Ok(Self {
            label: format!("p{raw}"),
            percentile,
        })
    }
}

pub fn default_quantiles() -> Vec<Quantile> {
    ["50", "75", "90", "99", "99.9", "100"]
        .iter()
        .filter_map(|raw| Quantile::parse(raw).ok())
        .collect()
}

/// Values that can be merged across window slots.
pub trait WindowValue: Clone {
    fn merge_from(&mut self, other: &Self);
}

impl WindowValue for u64 {
    fn merge_from(&mut self, other: &Self) {
        *self = self.wrapping_add(*other);
    }
}

/// Latency distribution over nanosecond samples.
pub type LatencyHistogram = Histogram<u64>;

impl WindowValue for LatencyHistogram {
    fn merge_from(&mut self, other: &Self) {
        // Every slot is cloned from one template, so bounds always match.
        if let Err(err) = self.add(other) {
            tracing::warn!(error = ?err, "latency histogram merge failed");
        }
    }
}

/// A value aggregated over a sliding window (or all-time) of slots.
#[derive(Debug, Clone)]
pub struct Windowed<T: WindowValue> {
    /// Slot width; `None` for the all-time scale.
    slot_nanos: Option<i64>,
    /// Empty value used to reset slots and seed merges.
    blank: T,
    /// `(slot epoch, value)`; an epoch of `i64::MIN` marks a never-used slot.
    slots: Vec<(i64, T)>,
}

/// Latency histogram over one time scale.
pub type WindowedHistogram = Windowed<LatencyHistogram>;
/// Event counter over one time scale.
pub type WindowedCounter = Windowed<u64>;

impl<T: WindowValue> Windowed<T> {
    pub fn new(scale: &TimeScale, blank: T) -> Self {
        match scale.window() {
            Some(window) => {
                let window_nanos = i64::try_from(window.as_nanos()).unwrap_or(i64::MAX);
                Self {
                    slot_nanos: Some((window_nanos / WINDOW_SLOTS).max(1)),
                    slots: vec![(i64::MIN, blank.clone()); WINDOW_SLOTS as usize],
                    blank,
                }
            }
            None => Self {
                slot_nanos: None,
                slots: vec![(0, blank.clone())],
                blank,
            },
        }
    }

    /// Mutable access to the slot that covers `now_nanos`, resetting it if it
    /// still holds an expired epoch.
    pub fn current_mut(&mut self, now_nanos: i64) -> &mut T {
        let Some(slot_nanos) = self.slot_nanos else {
            return &mut self.slots[0].1;
        };
        let epoch = now_nanos.div_euclid(slot_nanos);
        let idx = epoch.rem_euclid(WINDOW_SLOTS) as usize;
        let slot = &mut self.slots[idx];
        if slot.0 != epoch {
            // Slot last written a full ring ago (or never).
            *slot = (epoch, self.blank.clone());
        }
        &mut slot.1
    }

    /// Merge of every slot still inside the window at `now_nanos`.
    pub fn merged(&self, now_nanos: i64) -> T {
        let Some(slot_nanos) = self.slot_nanos else {
            return self.slots[0].1.clone();
        };
        let epoch = now_nanos.div_euclid(slot_nanos);
        let mut out = self.blank.clone();
        for (slot_epoch, value) in &self.slots {
            let age = epoch.saturating_sub(*slot_epoch);
            // Stale slots (and slots stamped in the future) are skipped, not cleared.
            if (0..WINDOW_SLOTS).contains(&age) {
                out.merge_from(value);
            }
        }
        out
    }
}

/// Outcome of one RPC call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Error,
}

#[derive(Debug, Clone)]
struct MethodWindows {
    latency: Vec<WindowedHistogram>,
    success: Vec<WindowedCounter>,
    error: Vec<WindowedCounter>,
}

impl MethodWindows {
    fn new(scales: &[TimeScale], template: &LatencyHistogram) -> Self {
        Self {
            latency: scales
                .iter()
                .map(|scale| Windowed::new(scale, template.clone()))
                .collect(),
            success: scales.iter().map(|scale| Windowed::new(scale, 0)).collect(),
            error: scales.iter().map(|scale| Windowed::new(scale, 0)).collect(),
        }
    }
}

/// Per-method latency histograms and call counters at every time scale.
#[derive(Debug, Clone)]
pub struct HistogramWindowSet {
    scales: Vec<TimeScale>,
    max_latency_nanos: u64,
    /// Empty histogram with the configured bounds; every slot starts as a clone.
    template: LatencyHistogram,
    by_method: BTreeMap<String, MethodWindows>,
}

impl HistogramWindowSet {
    pub fn new(scales: Vec<TimeScale>, max_latency: Duration) -> anyhow::Result<Self> {
        // HDR needs the upper bound to be at least twice the lower bound of 1ns.
        let max_latency_nanos = u64::try_from(max_latency.as_nanos())
            .unwrap_or(u64::MAX)
            .max(2);
        let template = LatencyHistogram::new_with_bounds(1, max_latency_nanos, LATENCY_SIGFIGS)
            .map_err(|err| {
                anyhow::anyhow!("create latency histogram up to {max_latency_nanos}ns: {err:?}")
            })?;
        Ok(Self {
            scales,
            max_latency_nanos,
            template,
            by_method: BTreeMap::new(),
        })
    }

    pub fn scales(&self) -> &[TimeScale] {
        &self.scales
    }

    /// Record one call into `method` and into the aggregate class.
    pub fn record(&mut self, method: &str, outcome: CallOutcome, latency: Duration, now_nanos: i64) {
        let nanos = u64::try_from(latency.as_nanos())
            .unwrap_or(u64::MAX)
            .min(self.max_latency_nanos);
        self.record_class(method, outcome, nanos, now_nanos);
        if method != AGGREGATE_METHOD {
            self.record_class(AGGREGATE_METHOD, outcome, nanos, now_nanos);
        }
    }

    fn record_class(&mut self, class: &str, outcome: CallOutcome, nanos: u64, now_nanos: i64) {
        let scales = &self.scales;
        let template = &self.template;
        let windows = self
            .by_method
            .entry(class.to_string())
            .or_insert_with(|| MethodWindows::new(scales, template));
        for hist in &mut windows.latency {
            hist.current_mut(now_nanos).saturating_record(nanos);
        }
        let counters = match outcome {
            CallOutcome::Success => &mut windows.success,
            CallOutcome::Error => &mut windows.error,
        };
        for counter in counters {
            *counter.current_mut(now_nanos) += 1;
        }
    }

    /// `<method>.latency-<scale>-<quantile>` values in nanoseconds.
    pub fn quantile_metrics(&self, quantiles: &[Quantile], now_nanos: i64) -> Vec<(String, u64)> {
        let mut out = Vec::new();
        for (method, windows) in &self.by_method {
            for (scale, hist) in self.scales.iter().zip(&windows.latency) {
                let merged = hist.merged(now_nanos);
                for q in quantiles {
                    out.push((
                        format!("{method}.latency-{scale}-{}", q.label()),
                        merged.value_at_quantile(q.percentile() / 100.0),
                    ));
                }
            }
        }
        out
    }

    /// `<method>.success-<scale>` and `<method>.error-<scale>` call counts.
    pub fn count_metrics(&self, now_nanos: i64) -> Vec<(String, u64)> {
        let mut out = Vec::new();
        for (method, windows) in &self.by_method {
            for (idx, scale) in self.scales.iter().enumerate() {
                out.push((
                    format!("{method}.success-{scale}"),
                    windows.success[idx].merged(now_nanos),
                ));
                out.push((
                    format!("{method}.error-{scale}"),
                    windows.error[idx].merged(now_nanos),
                ));
            }
        }
        out
    }
}
