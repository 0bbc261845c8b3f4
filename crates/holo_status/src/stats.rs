//! Additive per-range storage statistics.
//!
//! `RangeStats` is the unit of aggregation for the status monitor: every range
//! carries one, every store carries the sum of its ranges, and the node carries
//! the sum of its stores. Values are signed so that deltas can shrink totals.

use serde::{Deserialize, Serialize};

/// Byte/record counters and ages for a range (or a sum of ranges).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeStats {
    pub live_bytes: i64,
    pub key_bytes: i64,
    pub val_bytes: i64,
    pub intent_bytes: i64,
    pub live_count: i64,
    pub key_count: i64,
    pub val_count: i64,
    pub intent_count: i64,
    pub intent_age: i64,
    pub gc_bytes_age: i64,
    /// Wall time of the most recent update folded into these stats.
    pub last_update_nanos: i64,
}

impl RangeStats {
    /// Fold `other` into `self`.
    ///
    /// Counters are summed; `last_update_nanos` keeps the later of the two
    /// timestamps. Both operations are commutative and associative, and the
    /// zero value is the identity. Counters wrap on overflow.
    pub fn add(&mut self, other: &RangeStats) {
        self.live_bytes = self.live_bytes.wrapping_add(other.live_bytes);
        self.key_bytes = self.key_bytes.wrapping_add(other.key_bytes);
        self.val_bytes = self.val_bytes.wrapping_add(other.val_bytes);
        self.intent_bytes = self.intent_bytes.wrapping_add(other.intent_bytes);
        self.live_count = self.live_count.wrapping_add(other.live_count);
        self.key_count = self.key_count.wrapping_add(other.key_count);
        self.val_count = self.val_count.wrapping_add(other.val_count);
        self.intent_count = self.intent_count.wrapping_add(other.intent_count);
        self.intent_age = self.intent_age.wrapping_add(other.intent_age);
        self.gc_bytes_age = self.gc_bytes_age.wrapping_add(other.gc_bytes_age);
        self.last_update_nanos = self.last_update_nanos.max(other.last_update_nanos);
    }

    /// Remove `other` from `self`.
    ///
    /// The timestamp is a high-water mark and is not rolled back. Wrapping
    /// subtraction exactly undoes a wrapping `add`.
    pub fn subtract(&mut self, other: &RangeStats) {
        self.live_bytes = self.live_bytes.wrapping_sub(other.live_bytes);
        self.key_bytes = self.key_bytes.wrapping_sub(other.key_bytes);
        self.val_bytes = self.val_bytes.wrapping_sub(other.val_bytes);
        self.intent_bytes = self.intent_bytes.wrapping_sub(other.intent_bytes);
        self.live_count = self.live_count.wrapping_sub(other.live_count);
        self.key_count = self.key_count.wrapping_sub(other.key_count);
        self.val_count = self.val_count.wrapping_sub(other.val_count);
        self.intent_count = self.intent_count.wrapping_sub(other.intent_count);
        self.intent_age = self.intent_age.wrapping_sub(other.intent_age);
        self.gc_bytes_age = self.gc_bytes_age.wrapping_sub(other.gc_bytes_age);
    }

    /// Return `self + other` without mutating either side.
    pub fn merged(mut self, other: &RangeStats) -> RangeStats {
        self.add(other);
        self
    }

    /// Compare the additive counters only, ignoring the timestamp high-water mark.
    pub fn counters_eq(&self, other: &RangeStats) -> bool {
        RangeStats {
            last_update_nanos: 0,
            ..*self
        } == RangeStats {
            last_update_nanos: 0,
            ..*other
        }
    }

    /// Named scalar fields in emission order.
    pub fn metric_fields(&self) -> [(&'static str, i64); 11] {
        [
            ("livebytes", self.live_bytes),
            ("keybytes", self.key_bytes),
            ("valbytes", self.val_bytes),
            ("intentbytes", self.intent_bytes),
            ("livecount", self.live_count),
            ("keycount", self.key_count),
            ("valcount", self.val_count),
            ("intentcount", self.intent_count),
            ("intentage", self.intent_age),
            ("gcbytesage", self.gc_bytes_age),
            ("lastupdatenanos", self.last_update_nanos),
        ]
    }
}
