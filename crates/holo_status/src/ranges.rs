//! In-memory range descriptor table and the split path that feeds the range
//! event log.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Context;

use crate::clock::Clock;
use crate::events::{RangeDescriptor, RangeId};
use crate::range_log::{RangeEventLog, RangeEventType, RangeLogEvent, SplitDetail};

/// Id of the range that covers the whole keyspace before any split.
pub const FIRST_RANGE_ID: RangeId = 1;

/// Monotonic source of range ids. Every id it returns is larger than any id
/// returned before.
#[derive(Debug)]
pub struct RangeIdAllocator {
    next: AtomicU64,
}

impl RangeIdAllocator {
    /// `next` is the first id that will be handed out.
    pub fn new(next: RangeId) -> Self {
        Self {
            next: AtomicU64::new(next),
        }
    }

    pub fn next(&self) -> RangeId {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// The id the next call to `next` would return.
    pub fn peek(&self) -> RangeId {
        self.next.load(Ordering::SeqCst)
    }

    fn advance_past(&self, id: RangeId) {
        self.next.fetch_max(id.saturating_add(1), Ordering::SeqCst);
    }
}

/// Result of one committed split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOutcome {
    pub left: RangeDescriptor,
    pub right: RangeDescriptor,
    pub event: RangeLogEvent,
}

/// Range table for one keyspace, sorted by start key. Every split is
/// recorded in the range event log before it becomes visible here.
pub struct RangeDirectory {
    log: Arc<dyn RangeEventLog>,
    clock: Arc<dyn Clock>,
    allocator: RangeIdAllocator,
    ranges: RwLock<Vec<RangeDescriptor>>,
}

impl RangeDirectory {
    /// A fresh directory with a single range covering every key.
    pub fn new(log: Arc<dyn RangeEventLog>, clock: Arc<dyn Clock>) -> Self {
        Self {
            log,
            clock,
            allocator: RangeIdAllocator::new(FIRST_RANGE_ID + 1),
            ranges: RwLock::new(vec![RangeDescriptor {
                range_id: FIRST_RANGE_ID,
                start_key: Vec::new(),
                end_key: Vec::new(),
            }]),
        }
    }

    /// Rebuild the table by replaying the split records already in `log`.
    pub fn recover(log: Arc<dyn RangeEventLog>, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let events = log
            .list_by_type(RangeEventType::Split)
            .context("read split history")?;
        let directory = Self::new(log, clock);
        {
            let mut ranges = directory.write_ranges();
            for event in &events {
                // Ids seen in the log are burned even if the record is unusable.
                directory.allocator.advance_past(event.range_id);
                if let Some(new_range_id) = event.other_range_id {
                    directory.allocator.advance_past(new_range_id);
                }
                let Ok(detail) = serde_json::from_str::<SplitDetail>(&event.info) else {
                    tracing::warn!(seq = event.seq, "split record without descriptors; skipped");
                    continue;
                };
                install_split(&mut ranges, detail.updated_desc, detail.new_desc)
                    .with_context(|| format!("replay split at seq {}", event.seq))?;
            }
        }
        Ok(directory)
    }

    pub fn allocator(&self) -> &RangeIdAllocator {
        &self.allocator
    }

    pub fn ranges(&self) -> Vec<RangeDescriptor> {
        self.read_ranges().clone()
    }

    pub fn range_for_key(&self, key: &[u8]) -> Option<RangeDescriptor> {
        self.read_ranges()
            .iter()
            .find(|desc| desc.contains_key(key))
            .cloned()
    }

    /// Split the range containing `split_key` at that key.
    ///
    /// The right-hand side gets a freshly allocated id. If the log append
    /// fails the split is abandoned and the table is left unchanged.
    pub fn admin_split(&self, split_key: Vec<u8>) -> anyhow::Result<SplitOutcome> {
        anyhow::ensure!(!split_key.is_empty(), "split key must not be empty");

        // Held across the log append so splits commit in log order.
        let mut ranges = self.write_ranges();
        let idx = ranges
            .iter()
            .position(|desc| desc.contains_key(&split_key))
            .ok_or_else(|| anyhow::anyhow!("split key does not map to any range"))?;
        let original = &ranges[idx];
        if split_key == original.start_key {
            anyhow::bail!(
                "split key is already the start of range {}",
                original.range_id
            );
        }

        // A failed append below burns this id; it is never reissued.
        let right = RangeDescriptor {
            range_id: self.allocator.next(),
            start_key: split_key.clone(),
            end_key: original.end_key.clone(),
        };
        let left = RangeDescriptor {
            range_id: original.range_id,
            start_key: original.start_key.clone(),
            end_key: split_key,
        };
        let info = serde_json::to_string(&SplitDetail {
            updated_desc: left.clone(),
            new_desc: right.clone(),
        })
        .context("encode split detail")?;

        let event = self
            .log
            .record_split(left.range_id, right.range_id, self.clock.now_nanos(), info)
            .with_context(|| format!("record split of range {}", left.range_id))?;

        // Durable now; publish both halves while still holding the lock.
        ranges[idx] = left.clone();
        ranges.insert(idx + 1, right.clone());
        tracing::info!(
            range_id = left.range_id,
            new_range_id = right.range_id,
            seq = event.seq,
            "range split"
        );
        Ok(SplitOutcome { left, right, event })
    }

    /// Perform the initial splits. Keys that already start a range are
    /// skipped.
    pub fn bootstrap(&self, initial_split_keys: &[Vec<u8>]) -> anyhow::Result<Vec<SplitOutcome>> {
        let mut keys = initial_split_keys.to_vec();
        keys.sort();
        keys.dedup();
        let mut outcomes = Vec::with_capacity(keys.len());
        for key in keys {
            if key.is_empty() || self.read_ranges().iter().any(|desc| desc.start_key == key) {
                tracing::debug!(key = ?key, "bootstrap split key already a boundary");
                continue;
            }
            outcomes.push(self.admin_split(key)?);
        }
        Ok(outcomes)
    }

    fn read_ranges(&self) -> RwLockReadGuard<'_, Vec<RangeDescriptor>> {
        self.ranges
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_ranges(&self) -> RwLockWriteGuard<'_, Vec<RangeDescriptor>> {
        self.ranges
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn install_split(
    ranges: &mut Vec<RangeDescriptor>,
    left: RangeDescriptor,
    right: RangeDescriptor,
) -> anyhow::Result<()> {
    let idx = ranges
        .iter()
        .position(|desc| desc.range_id == left.range_id)
        .ok_or_else(|| anyhow::anyhow!("range {} not present", left.range_id))?;
    anyhow::ensure!(
        ranges[idx].start_key == left.start_key && ranges[idx].end_key == right.end_key,
        "descriptors do not cover range {}",
        left.range_id
    );
    ranges[idx] = left;
    ranges.insert(idx + 1, right);
    Ok(())
}
