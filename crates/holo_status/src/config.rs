//! Environment-driven configuration for the status subsystem.

use std::time::Duration;

use anyhow::{Context, Result};

use crate::histogram::{default_quantiles, default_time_scales, Quantile, TimeScale};
use crate::range_log::{parse_sync_mode, SyncMode};

const DEFAULT_MAX_LATENCY_MS: u64 = 60_000;

/// Runtime knobs for the monitor, recorder and range event log.
#[derive(Debug, Clone)]
pub struct StatusConfig {
    /// Latency/count window scales, in emission order.
    pub time_scales: Vec<TimeScale>,
    /// Quantiles emitted per scale.
    pub quantiles: Vec<Quantile>,
    /// Latency samples above this are clamped to it.
    pub max_latency: Duration,
    pub rangelog_sync: SyncMode,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            time_scales: default_time_scales(),
            quantiles: default_quantiles(),
            max_latency: Duration::from_millis(DEFAULT_MAX_LATENCY_MS),
            rangelog_sync: SyncMode::Data,
        }
    }
}

impl StatusConfig {
    /// Builds config from `HOLO_STATUS_*` / `HOLO_RANGELOG_*` variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let time_scales = match std::env::var("HOLO_STATUS_TIME_SCALES").ok() {
            Some(raw) => parse_list(&raw, TimeScale::parse)
                .context("invalid HOLO_STATUS_TIME_SCALES")?,
            None => default_time_scales(),
        };
        let quantiles = match std::env::var("HOLO_STATUS_QUANTILES").ok() {
            Some(raw) => {
                parse_list(&raw, Quantile::parse).context("invalid HOLO_STATUS_QUANTILES")?
            }
            None => default_quantiles(),
        };
        let max_latency_ms = parse_u64(
            std::env::var("HOLO_STATUS_MAX_LATENCY_MS").ok(),
            DEFAULT_MAX_LATENCY_MS,
        )?
        // Histograms need a non-zero upper bound.
        .max(1);
        let rangelog_sync = std::env::var("HOLO_RANGELOG_SYNC_MODE")
            .ok()
            .map(|raw| parse_sync_mode(&raw))
            // Unset means sync_data; an unknown name means sync_all.
            .unwrap_or(SyncMode::Data);

        Ok(Self {
            time_scales,
            quantiles,
            max_latency: Duration::from_millis(max_latency_ms),
            rangelog_sync,
        })
    }
}

/// Parses a comma-separated list; empty entries are skipped and an empty
/// list is rejected.
fn parse_list<T>(raw: &str, parse: impl Fn(&str) -> Result<T>) -> Result<Vec<T>> {
    let items = raw
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(parse)
        .collect::<Result<Vec<_>>>()?;
    anyhow::ensure!(!items.is_empty(), "empty list: {raw:?}");
    Ok(items)
}

fn parse_u64(value: Option<String>, default_value: u64) -> Result<u64> {
    match value {
        Some(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("invalid u64 value: {raw}")),
        None => Ok(default_value),
    }
}
