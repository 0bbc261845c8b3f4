//! Durable, append-only audit log of structural range changes.
//!
//! Records are framed as `len: u32 BE | crc32: u32 BE | JSON payload` in a
//! single log file. Appends are serialized by a mutex and synced according to
//! the configured `SyncMode` before they are acknowledged. There is no update
//! or delete path.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use anyhow::Context;
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use crate::events::{RangeDescriptor, RangeId};
use crate::ranges::RangeIdAllocator;

/// File name used for the log within its directory.
pub const RANGE_LOG_FILE: &str = "rangelog.log";

const FRAME_HEADER_LEN: usize = 8;
/// Upper bound on one encoded record. A header declaring more is corruption.
const MAX_RECORD_LEN: usize = 1 << 20;

/// How hard an append pushes data to stable storage before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Rely on OS buffering.
    None,
    Data,
    All,
}

/// Parse a sync mode name. Unknown names map to the strictest mode.
pub fn parse_sync_mode(raw: &str) -> SyncMode {
    match raw.trim().to_ascii_lowercase().as_str() {
        "none" | "buffer" => SyncMode::None,
        "sync_data" => SyncMode::Data,
        "sync_all" => SyncMode::All,
        _ => SyncMode::All,
    }
}

/// Kind of structural change recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeEventType {
    Split,
}

impl RangeEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RangeEventType::Split => "split",
        }
    }
}

impl fmt::Display for RangeEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RangeEventType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "split" => Ok(RangeEventType::Split),
            other => anyhow::bail!("unknown range event type: {other:?}"),
        }
    }
}

/// An event to append; the log assigns the sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRangeEvent {
    pub event_type: RangeEventType,
    pub timestamp_nanos: i64,
    pub range_id: RangeId,
    pub other_range_id: Option<RangeId>,
    pub info: String,
}

/// A record as stored in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeLogEvent {
    pub seq: u64,
    pub event_type: RangeEventType,
    pub timestamp_nanos: i64,
    pub range_id: RangeId,
    pub other_range_id: Option<RangeId>,
    pub info: String,
}

/// Structured `info` payload written for splits: the left-hand descriptor
/// after the split and the new right-hand descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitDetail {
    pub updated_desc: RangeDescriptor,
    pub new_desc: RangeDescriptor,
}

/// Append-only range event store.
pub trait RangeEventLog: Send + Sync {
    /// Durably append one record. On error nothing was recorded.
    fn append(&self, event: NewRangeEvent) -> anyhow::Result<RangeLogEvent>;

    /// All records in append order.
    fn events(&self) -> anyhow::Result<Vec<RangeLogEvent>>;

    fn record_split(
        &self,
        range_id: RangeId,
        new_range_id: RangeId,
        timestamp_nanos: i64,
        info: String,
    ) -> anyhow::Result<RangeLogEvent> {
        self.append(NewRangeEvent {
            event_type: RangeEventType::Split,
            timestamp_nanos,
            range_id,
            other_range_id: Some(new_range_id),
            info,
        })
    }

    fn count_by_type(&self, event_type: RangeEventType) -> anyhow::Result<usize> {
        Ok(self
            .events()?
            .iter()
            .filter(|event| event.event_type == event_type)
            .count())
    }

    fn list_by_type(&self, event_type: RangeEventType) -> anyhow::Result<Vec<RangeLogEvent>> {
        Ok(self
            .events()?
            .into_iter()
            .filter(|event| event.event_type == event_type)
            .collect())
    }
}

struct LogInner {
    file: File,
    len: u64,
    next_seq: u64,
    events: Vec<RangeLogEvent>,
    /// Set when a failed append could not be rolled back; the file may hold a
    /// partial frame, so nothing more is written until the log is reopened.
    poisoned: bool,
}

/// File-backed range event log.
pub struct FileRangeEventLog {
    path: PathBuf,
    sync_mode: SyncMode,
    inner: Mutex<LogInner>,
}

impl FileRangeEventLog {
    /// Open or create the log under `dir`, replaying existing records.
    pub fn open(dir: impl AsRef<Path>, sync_mode: SyncMode) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("create range log dir {}", dir.display()))?;
        let path = dir.join(RANGE_LOG_FILE);

        let (events, valid_len) = read_log(&path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open range log {}", path.display()))?;
        let on_disk = file.metadata().context("stat range log")?.len();
        if on_disk > valid_len {
            // read_log only leaves a single partial frame behind.
            anyhow::ensure!(
                on_disk - valid_len <= (FRAME_HEADER_LEN + MAX_RECORD_LEN) as u64,
                "range log {} has {} unreadable bytes past offset {valid_len}",
                path.display(),
                on_disk - valid_len
            );
            tracing::warn!(
                path = %path.display(),
                torn_bytes = on_disk - valid_len,
                "truncating torn range log tail"
            );
            file.set_len(valid_len).context("truncate torn range log tail")?;
            sync_file(&file, sync_mode).context("sync range log after truncation")?;
        }

        let next_seq = events.last().map(|event| event.seq + 1).unwrap_or(1);
        tracing::debug!(path = %path.display(), records = events.len(), "opened range log");
        Ok(Self {
            path,
            sync_mode,
            inner: Mutex::new(LogInner {
                file,
                len: valid_len,
                next_seq,
                events,
                poisoned: false,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, LogInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RangeEventLog for FileRangeEventLog {
    fn append(&self, event: NewRangeEvent) -> anyhow::Result<RangeLogEvent> {
        let mut inner = self.lock();
        anyhow::ensure!(
            !inner.poisoned,
            "range log {} is poisoned by a failed rollback; reopen required",
            self.path.display()
        );
        let record = RangeLogEvent {
            seq: inner.next_seq,
            event_type: event.event_type,
            timestamp_nanos: event.timestamp_nanos,
            range_id: event.range_id,
            other_range_id: event.other_range_id,
            info: event.info,
        };
        let payload = serde_json::to_vec(&record).context("encode range log record")?;
        let frame = encode_frame(&payload)?;

        let prev_len = inner.len;
        let written = match inner.file.write_all(&frame) {
            Ok(()) => sync_file(&inner.file, self.sync_mode),
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            if let Err(trunc_err) = inner.file.set_len(prev_len) {
                // A partial frame may still be on disk. Later appends would land
                // after it and be lost as a torn tail on the next open.
                inner.poisoned = true;
                tracing::error!(
                    error = ?trunc_err,
                    path = %self.path.display(),
                    "failed to roll back partial range log append"
                );
            }
            return Err(err).context("append range log record");
        }

        inner.len = prev_len + frame.len() as u64;
        inner.next_seq += 1;
        inner.events.push(record.clone());
        Ok(record)
    }

    fn events(&self) -> anyhow::Result<Vec<RangeLogEvent>> {
        Ok(self.lock().events.clone())
    }

    fn count_by_type(&self, event_type: RangeEventType) -> anyhow::Result<usize> {
        Ok(self
            .lock()
            .events
            .iter()
            .filter(|event| event.event_type == event_type)
            .count())
    }

    fn list_by_type(&self, event_type: RangeEventType) -> anyhow::Result<Vec<RangeLogEvent>> {
        Ok(self
            .lock()
            .events
            .iter()
            .filter(|event| event.event_type == event_type)
            .cloned()
            .collect())
    }
}

fn encode_frame(payload: &[u8]) -> anyhow::Result<Vec<u8>> {
    anyhow::ensure!(
        payload.len() <= MAX_RECORD_LEN,
        "range log record too large: {} bytes",
        payload.len()
    );
    let len = u32::try_from(payload.len()).context("range log record too large")?;
    let mut hasher = Hasher::new();
    hasher.update(payload);
    let checksum = hasher.finalize();
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&checksum.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Decode every complete record. Returns the records and the byte length of
/// the valid prefix; anything past it is a torn tail.
///
/// A tail counts as torn only when it is shorter than a header, or when it is
/// a single frame whose declared length runs past EOF and whose bytes could
/// be a prefix of one JSON payload. Any other short read fails with the
/// offset, so a corrupt length field never hides the records after it.
fn read_log(path: &Path) -> anyhow::Result<(Vec<RangeLogEvent>, u64)> {
    let buf = match fs::read(path) {
        Ok(buf) => buf,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(err) => {
            return Err(err).with_context(|| format!("read range log {}", path.display()))
        }
    };

    let mut events: Vec<RangeLogEvent> = Vec::new();
    let mut offset = 0usize;
    while buf.len() - offset >= FRAME_HEADER_LEN {
        let header = &buf[offset..offset + FRAME_HEADER_LEN];
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let expected_crc = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        anyhow::ensure!(
            len <= MAX_RECORD_LEN,
            "range log frame at offset {offset} declares {len} bytes"
        );
        let start = offset + FRAME_HEADER_LEN;
        let end = start + len;
        if end > buf.len() {
            // Encoded JSON never holds control bytes; a following frame header
            // always does (its length's high byte is zero).
            anyhow::ensure!(
                buf[start..].iter().all(|byte| *byte >= 0x20),
                "range log frame at offset {offset} declares {len} bytes but later frames follow"
            );
            break;
        }
        let payload = &buf[start..end];
        let mut hasher = Hasher::new();
        hasher.update(payload);
        anyhow::ensure!(
            hasher.finalize() == expected_crc,
            "range log checksum mismatch at offset {offset}"
        );
        let record: RangeLogEvent = serde_json::from_slice(payload)
            .with_context(|| format!("decode range log record at offset {offset}"))?;
        if let Some(prev) = events.last() {
            anyhow::ensure!(
                record.seq > prev.seq,
                "range log sequence went backwards at offset {offset}: {} after {}",
                record.seq,
                prev.seq
            );
        }
        events.push(record);
        offset = end;
    }
    Ok((events, offset as u64))
}

fn sync_file(file: &File, mode: SyncMode) -> std::io::Result<()> {
    match mode {
        SyncMode::None => Ok(()),
        SyncMode::Data => file.sync_data(),
        SyncMode::All => file.sync_all(),
    }
}

/// A split record that breaks the id or partition invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitViolation {
    MissingNewRangeId {
        seq: u64,
        range_id: RangeId,
    },
    NonIncreasingId {
        seq: u64,
        range_id: RangeId,
        new_range_id: RangeId,
    },
    DuplicateNewRangeId {
        seq: u64,
        new_range_id: RangeId,
        first_seq: u64,
    },
    UnallocatedId {
        seq: u64,
        new_range_id: RangeId,
        next_unallocated: RangeId,
    },
    InvalidPartition {
        seq: u64,
        reason: String,
    },
}

impl fmt::Display for SplitViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitViolation::MissingNewRangeId { seq, range_id } => {
                write!(f, "seq {seq}: split of range {range_id} has no new range id")
            }
            SplitViolation::NonIncreasingId {
                seq,
                range_id,
                new_range_id,
            } => write!(
                f,
                "seq {seq}: new range id {new_range_id} is not greater than split range {range_id}"
            ),
            SplitViolation::DuplicateNewRangeId {
                seq,
                new_range_id,
                first_seq,
            } => write!(
                f,
                "seq {seq}: new range id {new_range_id} already created at seq {first_seq}"
            ),
            SplitViolation::UnallocatedId {
                seq,
                new_range_id,
                next_unallocated,
            } => write!(
                f,
                "seq {seq}: new range id {new_range_id} was never allocated (next is {next_unallocated})"
            ),
            SplitViolation::InvalidPartition { seq, reason } => {
                write!(f, "seq {seq}: split descriptors invalid: {reason}")
            }
        }
    }
}

/// Check every split record for id monotonicity, id uniqueness, allocator
/// agreement (when an allocator is given) and, when `info` carries a
/// `SplitDetail`, that the two descriptors partition the original span.
pub fn check_split_invariants(
    events: &[RangeLogEvent],
    allocator: Option<&RangeIdAllocator>,
) -> Vec<SplitViolation> {
    let mut violations = Vec::new();
    let mut created = std::collections::BTreeMap::<RangeId, u64>::new();
    for event in events
        .iter()
        .filter(|event| event.event_type == RangeEventType::Split)
    {
        let seq = event.seq;
        let Some(new_range_id) = event.other_range_id else {
            violations.push(SplitViolation::MissingNewRangeId {
                seq,
                range_id: event.range_id,
            });
            continue;
        };
        if new_range_id <= event.range_id {
            violations.push(SplitViolation::NonIncreasingId {
                seq,
                range_id: event.range_id,
                new_range_id,
            });
        }
        if let Some(first_seq) = created.insert(new_range_id, seq) {
            violations.push(SplitViolation::DuplicateNewRangeId {
                seq,
                new_range_id,
                first_seq,
            });
        }
        if let Some(allocator) = allocator {
            let next_unallocated = allocator.peek();
            if new_range_id >= next_unallocated {
                violations.push(SplitViolation::UnallocatedId {
                    seq,
                    new_range_id,
                    next_unallocated,
                });
            }
        }
        if let Ok(detail) = serde_json::from_str::<SplitDetail>(&event.info) {
            if let Err(reason) = check_split_detail(event.range_id, new_range_id, &detail) {
                violations.push(SplitViolation::InvalidPartition { seq, reason });
            }
        }
    }
    violations
}

fn check_split_detail(
    range_id: RangeId,
    new_range_id: RangeId,
    detail: &SplitDetail,
) -> Result<(), String> {
    let left = &detail.updated_desc;
    let right = &detail.new_desc;
    if left.range_id != range_id {
        return Err(format!(
            "updated descriptor names range {} instead of {range_id}",
            left.range_id
        ));
    }
    if right.range_id != new_range_id {
        return Err(format!(
            "new descriptor names range {} instead of {new_range_id}",
            right.range_id
        ));
    }
    if left.end_key != right.start_key {
        return Err("left end key does not meet right start key".to_string());
    }
    if left.start_key >= left.end_key {
        return Err("left-hand range is empty".to_string());
    }
    if !right.end_key.is_empty() && right.start_key >= right.end_key {
        return Err("right-hand range is empty".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn split_detail(range_id: RangeId, new_range_id: RangeId, key: &[u8]) -> String {
        serde_json::to_string(&SplitDetail {
            updated_desc: RangeDescriptor {
                range_id,
                start_key: Vec::new(),
                end_key: key.to_vec(),
            },
            new_desc: RangeDescriptor {
                range_id: new_range_id,
                start_key: key.to_vec(),
                end_key: Vec::new(),
            },
        })
        .unwrap()
    }

    fn record(seq: u64, range_id: RangeId, other: Option<RangeId>, info: &str) -> RangeLogEvent {
        RangeLogEvent {
            seq,
            event_type: RangeEventType::Split,
            timestamp_nanos: seq as i64,
            range_id,
            other_range_id: other,
            info: info.to_string(),
        }
    }

    #[test]
    fn sync_mode_names() {
        assert_eq!(parse_sync_mode("none"), SyncMode::None);
        assert_eq!(parse_sync_mode("BUFFER"), SyncMode::None);
        assert_eq!(parse_sync_mode("sync_data"), SyncMode::Data);
        assert_eq!(parse_sync_mode("sync_all"), SyncMode::All);
        assert_eq!(parse_sync_mode("whatever"), SyncMode::All);
    }

    #[test]
    fn event_type_string_form() {
        assert_eq!(RangeEventType::Split.as_str(), "split");
        assert_eq!("Split".parse::<RangeEventType>().unwrap(), RangeEventType::Split);
        assert!("merge".parse::<RangeEventType>().is_err());
        assert_eq!(
            serde_json::to_string(&RangeEventType::Split).unwrap(),
            "\"split\""
        );
    }

    #[test]
    fn append_assigns_sequence_and_persists() {
        let dir = TempDir::new().unwrap();
        let log = FileRangeEventLog::open(dir.path(), SyncMode::Data).unwrap();
        let first = log.record_split(1, 2, 10, split_detail(1, 2, b"m")).unwrap();
        let second = log.record_split(1, 3, 20, String::new()).unwrap();
        assert_eq!((first.seq, second.seq), (1, 2));
        drop(log);

        let log = FileRangeEventLog::open(dir.path(), SyncMode::Data).unwrap();
        assert_eq!(log.events().unwrap(), vec![first, second]);
        let third = log.record_split(2, 4, 30, String::new()).unwrap();
        assert_eq!(third.seq, 3);
        assert_eq!(log.count_by_type(RangeEventType::Split).unwrap(), 3);
    }

    #[test]
    fn torn_tail_is_truncated_on_open() {
        let dir = TempDir::new().unwrap();
        let log = FileRangeEventLog::open(dir.path(), SyncMode::None).unwrap();
        log.record_split(1, 2, 10, String::new()).unwrap();
        let path = log.path().to_path_buf();
        drop(log);

        let intact = fs::metadata(&path).unwrap().len();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0, 0, 0, 40, 1, 2, 3, 4, b'{']).unwrap();
        drop(file);

        let log = FileRangeEventLog::open(dir.path(), SyncMode::None).unwrap();
        assert_eq!(log.events().unwrap().len(), 1);
        assert_eq!(fs::metadata(&path).unwrap().len(), intact);
        assert_eq!(log.record_split(2, 3, 20, String::new()).unwrap().seq, 2);
    }

    fn three_splits(dir: &TempDir) -> (PathBuf, Vec<u8>) {
        let log = FileRangeEventLog::open(dir.path(), SyncMode::None).unwrap();
        for new_range_id in 2..5 {
            log.record_split(1, new_range_id, 10, String::new()).unwrap();
        }
        let path = log.path().to_path_buf();
        drop(log);
        let bytes = fs::read(&path).unwrap();
        (path, bytes)
    }

    fn frame_len(bytes: &[u8], offset: usize) -> usize {
        u32::from_be_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize
    }

    #[test]
    fn oversized_length_field_fails_open_and_keeps_records() {
        let dir = TempDir::new().unwrap();
        let (path, mut bytes) = three_splits(&dir);
        bytes[0] = 0x7f;
        fs::write(&path, &bytes).unwrap();

        let err = FileRangeEventLog::open(dir.path(), SyncMode::None)
            .err()
            .expect("corrupt length must fail open");
        assert!(err.to_string().contains("offset 0"), "{err:#}");
        assert_eq!(fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn middle_length_past_eof_fails_open_and_keeps_records() {
        let dir = TempDir::new().unwrap();
        let (path, mut bytes) = three_splits(&dir);
        let second = FRAME_HEADER_LEN + frame_len(&bytes, 0);
        let stretched = (frame_len(&bytes, second) + 4096) as u32;
        bytes[second..second + 4].copy_from_slice(&stretched.to_be_bytes());
        fs::write(&path, &bytes).unwrap();

        let err = FileRangeEventLog::open(dir.path(), SyncMode::None)
            .err()
            .expect("stretched frame must fail open");
        assert!(
            err.to_string().contains(&format!("offset {second}")),
            "{err:#}"
        );
        assert_eq!(fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn poisoned_log_rejects_appends_until_reopen() {
        let dir = TempDir::new().unwrap();
        let log = FileRangeEventLog::open(dir.path(), SyncMode::None).unwrap();
        log.record_split(1, 2, 10, String::new()).unwrap();
        log.lock().poisoned = true;

        let err = log.record_split(2, 3, 20, String::new()).unwrap_err();
        assert!(err.to_string().contains("poisoned"), "{err:#}");
        assert_eq!(log.events().unwrap().len(), 1);
        drop(log);

        let log = FileRangeEventLog::open(dir.path(), SyncMode::None).unwrap();
        assert_eq!(log.record_split(2, 3, 20, String::new()).unwrap().seq, 2);
    }

    #[test]
    fn typed_queries_match_full_scan() {
        let dir = TempDir::new().unwrap();
        let log = FileRangeEventLog::open(dir.path(), SyncMode::None).unwrap();
        log.record_split(1, 2, 10, String::new()).unwrap();
        log.record_split(2, 3, 20, String::new()).unwrap();

        let all = log.events().unwrap();
        assert_eq!(log.list_by_type(RangeEventType::Split).unwrap(), all);
        assert_eq!(log.count_by_type(RangeEventType::Split).unwrap(), all.len());
    }

    #[test]
    fn checksum_mismatch_is_an_error() {
        let dir = TempDir::new().unwrap();
        let log = FileRangeEventLog::open(dir.path(), SyncMode::None).unwrap();
        log.record_split(1, 2, 10, String::new()).unwrap();
        let path = log.path().to_path_buf();
        drop(log);

        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 2;
        bytes[last] ^= 0xff;
        fs::write(&path, bytes).unwrap();

        let err = FileRangeEventLog::open(dir.path(), SyncMode::None)
            .err()
            .expect("corrupt record must fail open");
        assert!(err.to_string().contains("checksum"), "{err:#}");
    }

    #[test]
    fn checker_accepts_well_formed_splits() {
        let allocator = RangeIdAllocator::new(4);
        let events = vec![
            record(1, 1, Some(2), &split_detail(1, 2, b"g")),
            record(2, 2, Some(3), "free-form note"),
        ];
        assert!(check_split_invariants(&events, Some(&allocator)).is_empty());
    }

    #[test]
    fn checker_reports_each_violation() {
        let allocator = RangeIdAllocator::new(5);
        let bad_partition = serde_json::to_string(&SplitDetail {
            updated_desc: RangeDescriptor {
                range_id: 1,
                start_key: Vec::new(),
                end_key: b"k".to_vec(),
            },
            new_desc: RangeDescriptor {
                range_id: 4,
                start_key: b"m".to_vec(),
                end_key: Vec::new(),
            },
        })
        .unwrap();
        let events = vec![
            record(1, 3, None, ""),
            record(2, 3, Some(2), ""),
            record(3, 1, Some(4), &bad_partition),
            record(4, 2, Some(4), ""),
            record(5, 2, Some(9), ""),
        ];
        let violations = check_split_invariants(&events, Some(&allocator));
        assert_eq!(
            violations,
            vec![
                SplitViolation::MissingNewRangeId { seq: 1, range_id: 3 },
                SplitViolation::NonIncreasingId {
                    seq: 2,
                    range_id: 3,
                    new_range_id: 2
                },
                SplitViolation::InvalidPartition {
                    seq: 3,
                    reason: "left end key does not meet right start key".to_string()
                },
                SplitViolation::DuplicateNewRangeId {
                    seq: 4,
                    new_range_id: 4,
                    first_seq: 3
                },
                SplitViolation::UnallocatedId {
                    seq: 5,
                    new_range_id: 9,
                    next_unallocated: 5
                },
            ]
        );
        assert!(violations[4].to_string().contains("never allocated"));
    }
}
