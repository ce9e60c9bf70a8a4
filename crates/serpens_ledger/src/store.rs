//! # Ledger Store
//!
//! **Append-Only Snapshot Journal**
//!
//! Every committed command appends one full [`LedgerState`] snapshot. Loading
//! returns the newest snapshot whose checksum verifies, so a write torn by a
//! crash costs at most the last command.
//!
//! ## Format
//!
//! ```text
//! [4 bytes: magic "SFLG"]
//! [4 bytes: version]
//! [8 bytes: sequence at last compaction]
//!
//! Record format:
//! [8 bytes: sequence]
//! [1 byte: record type (SNAPSHOT)]
//! [4 bytes: payload length]
//! [N bytes: payload (JSON ledger state)]
//! [4 bytes: CRC32 of above]
//! ```
//!
//! A record that fails its checksum is skipped and the scan resumes at the
//! next record that verifies; only bytes after the last verified record are
//! treated as a torn tail.
//!
//! [`JournalStore::compact`] rewrites the file as header plus latest
//! snapshot through a temporary file and a rename. The platform calls it
//! every `compact_after_snapshots` commits. [`JournalStore::read_only`]
//! inspects a journal without touching it.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{LedgerError, LedgerResult};
use crate::state::{LedgerState, SCHEMA_VERSION};

/// Magic bytes identifying a ledger journal.
const JOURNAL_MAGIC: &[u8; 4] = b"SFLG";

/// Current journal format version.
const JOURNAL_VERSION: u32 = 1;

/// Header size in bytes.
const HEADER_LEN: u64 = 16;

/// Sequence, type and length ahead of each payload.
const FRAME_HEAD_LEN: usize = 8 + 1 + 4;

/// Fixed bytes around each payload: frame head plus CRC.
const RECORD_OVERHEAD: usize = FRAME_HEAD_LEN + 4;

/// Journal record types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Full ledger snapshot.
    Snapshot = 1,
}

impl RecordType {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Snapshot),
            _ => None,
        }
    }
}

/// A single record read back from the journal.
#[derive(Clone, Debug)]
struct JournalRecord {
    sequence: u64,
    record_type: RecordType,
    payload: Vec<u8>,
}

/// Result of walking a journal file.
#[derive(Debug, Default)]
struct Scan {
    /// Newest verified record.
    last: Option<JournalRecord>,
    /// Verified records.
    records: u64,
    /// Highest sequence seen, header included.
    max_sequence: u64,
    /// Damaged regions stepped over before a later verified record.
    damaged_records: u64,
    /// End of the last verified record.
    valid_len: u64,
    /// Bytes after the last verified record.
    torn_bytes: u64,
}

/// What a read-only pass over a journal found.
#[derive(Clone, Debug)]
pub struct JournalReport {
    /// Newest verified state, `None` for a journal without snapshots.
    pub state: Option<LedgerState>,
    /// Verified snapshots in the file.
    pub snapshots: u64,
    /// Highest sequence number seen, header included.
    pub last_sequence: u64,
    /// Damaged records skipped between verified ones.
    pub damaged_records: u64,
    /// Unverifiable bytes after the last good snapshot.
    pub torn_bytes: u64,
}

/// Durable home of the ledger state.
///
/// The platform calls [`save`](Self::save) after every committed command.
/// A failing store never blocks the ledger; the platform logs the error and
/// carries on in memory.
pub trait StateStore: Send {
    /// Newest persisted state, or `None` for a fresh store.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Storage` or `LedgerError::CorruptJournal`.
    fn load(&self) -> LedgerResult<Option<LedgerState>>;

    /// Persists a full snapshot and returns its sequence number.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Storage` if the snapshot could not be written.
    fn save(&self, state: &LedgerState) -> LedgerResult<u64>;

    /// Drops superseded snapshots. No-op by default.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Storage` if rewriting fails.
    fn compact(&self) -> LedgerResult<()> {
        Ok(())
    }

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// File-backed journal of ledger snapshots.
pub struct JournalStore {
    /// Path to the journal file.
    path: PathBuf,
    /// Next sequence number to hand out.
    next_sequence: AtomicU64,
    /// Append handle.
    file: Mutex<BufWriter<File>>,
}

fn storage(context: &str, e: impl std::fmt::Display) -> LedgerError {
    LedgerError::Storage(format!("{context}: {e}"))
}

impl JournalStore {
    /// Opens or creates a journal.
    ///
    /// Anything after the last verified record is cut off so new snapshots
    /// append after it. Damaged records in the middle of the file stay where
    /// they are and are skipped on every read.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Storage` on I/O failure and
    /// `LedgerError::CorruptJournal` if the header is not ours.
    pub fn open(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| storage("failed to open journal", e))?;

        let len = file
            .metadata()
            .map_err(|e| storage("failed to read journal metadata", e))?
            .len();
        if len == 0 {
            write_header(&mut file, 0)?;
            file.sync_all().map_err(|e| storage("journal sync failed", e))?;
        }

        let scan = scan_journal(&path)?;
        if scan.damaged_records > 0 {
            tracing::warn!(
                "journal {} has {} damaged records, recovered past them",
                path.display(),
                scan.damaged_records
            );
        }
        if scan.torn_bytes > 0 {
            tracing::warn!(
                "journal {} has {} torn trailing bytes, truncating",
                path.display(),
                scan.torn_bytes
            );
            file.set_len(scan.valid_len)
                .map_err(|e| storage("failed to truncate torn tail", e))?;
        }
        file.seek(SeekFrom::End(0))
            .map_err(|e| storage("journal seek failed", e))?;

        tracing::debug!(
            "opened journal {} with {} snapshots",
            path.display(),
            scan.records
        );

        Ok(Self {
            path,
            next_sequence: AtomicU64::new(scan.max_sequence + 1),
            file: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Reads a journal without creating, locking or repairing it.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Storage` if the file is missing or unreadable and
    /// `LedgerError::CorruptJournal` if it is not a journal or its newest
    /// snapshot cannot be decoded.
    pub fn read_only(path: impl AsRef<Path>) -> LedgerResult<JournalReport> {
        let scan = scan_journal(path.as_ref())?;
        let state = scan.last.as_ref().map(decode_snapshot).transpose()?;
        Ok(JournalReport {
            state,
            snapshots: scan.records,
            last_sequence: scan.max_sequence,
            damaged_records: scan.damaged_records,
            torn_bytes: scan.torn_bytes,
        })
    }

    /// Path of the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of verified snapshots currently in the file.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Storage` if the file cannot be read.
    pub fn snapshot_count(&self) -> LedgerResult<u64> {
        self.flush()?;
        Ok(scan_journal(&self.path)?.records)
    }

    fn flush(&self) -> LedgerResult<()> {
        self.file
            .lock()
            .flush()
            .map_err(|e| storage("journal flush failed", e))
    }
}

impl StateStore for JournalStore {
    fn load(&self) -> LedgerResult<Option<LedgerState>> {
        self.flush()?;
        let Some(record) = scan_journal(&self.path)?.last else {
            return Ok(None);
        };
        decode_snapshot(&record).map(Some)
    }

    fn save(&self, state: &LedgerState) -> LedgerResult<u64> {
        let payload =
            serde_json::to_vec(state).map_err(|e| storage("failed to encode snapshot", e))?;
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);

        let mut file = self.file.lock();
        write_record(&mut *file, sequence, RecordType::Snapshot, &payload)?;
        file.flush().map_err(|e| storage("journal flush failed", e))?;
        file.get_ref()
            .sync_data()
            .map_err(|e| storage("journal sync failed", e))?;
        Ok(sequence)
    }

    fn compact(&self) -> LedgerResult<()> {
        let mut file = self.file.lock();
        file.flush().map_err(|e| storage("journal flush failed", e))?;

        let scan = scan_journal(&self.path)?;
        let tmp_path = self.path.with_extension("compact");
        let mut tmp =
            File::create(&tmp_path).map_err(|e| storage("failed to create compaction file", e))?;
        write_header(&mut tmp, scan.max_sequence)?;
        if let Some(record) = &scan.last {
            write_record(&mut tmp, record.sequence, record.record_type, &record.payload)?;
        }
        tmp.sync_all().map_err(|e| storage("compaction sync failed", e))?;
        drop(tmp);
        fs::rename(&tmp_path, &self.path).map_err(|e| storage("failed to replace journal", e))?;

        let mut reopened = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| storage("failed to reopen journal", e))?;
        reopened
            .seek(SeekFrom::End(0))
            .map_err(|e| storage("journal seek failed", e))?;
        *file = BufWriter::new(reopened);

        tracing::info!(
            "compacted journal {}: {} snapshots -> {}",
            self.path.display(),
            scan.records,
            u64::from(scan.last.is_some())
        );
        Ok(())
    }

    fn describe(&self) -> String {
        format!("journal {}", self.path.display())
    }
}

fn write_header(out: &mut impl Write, sequence: u64) -> LedgerResult<()> {
    let mut header = Vec::with_capacity(HEADER_LEN as usize);
    header.extend_from_slice(JOURNAL_MAGIC);
    header.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
    header.extend_from_slice(&sequence.to_le_bytes());
    out.write_all(&header)
        .and_then(|()| out.flush())
        .map_err(|e| storage("failed to write journal header", e))
}

fn write_record(
    out: &mut impl Write,
    sequence: u64,
    record_type: RecordType,
    payload: &[u8],
) -> LedgerResult<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| LedgerError::Storage("snapshot larger than 4 GiB".to_string()))?;

    let mut frame = Vec::with_capacity(payload.len() + RECORD_OVERHEAD);
    frame.extend_from_slice(&sequence.to_le_bytes());
    frame.push(record_type as u8);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(payload);
    let crc = crc32fast::hash(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());

    out.write_all(&frame)
        .map_err(|e| storage("journal write failed", e))
}

/// Walks the journal and keeps the newest record that verifies.
fn scan_journal(path: &Path) -> LedgerResult<Scan> {
    let bytes = fs::read(path).map_err(|e| storage("failed to read journal", e))?;
    scan_bytes(&bytes)
}

/// Damaged records are stepped over so a bad byte early in the file never
/// hides the snapshots behind it. Only bytes after the last verified record
/// count as torn.
fn scan_bytes(bytes: &[u8]) -> LedgerResult<Scan> {
    if bytes.is_empty() {
        return Ok(Scan::default());
    }
    let header = bytes
        .get(..HEADER_LEN as usize)
        .ok_or_else(|| LedgerError::CorruptJournal("truncated header".to_string()))?;
    if &header[..4] != JOURNAL_MAGIC {
        return Err(LedgerError::CorruptJournal("bad magic".to_string()));
    }
    let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if version != JOURNAL_VERSION {
        return Err(LedgerError::CorruptJournal(format!(
            "unsupported journal version: {version}"
        )));
    }
    let mut base = [0u8; 8];
    base.copy_from_slice(&header[8..16]);

    let mut scan = Scan {
        max_sequence: u64::from_le_bytes(base),
        valid_len: HEADER_LEN,
        ..Scan::default()
    };
    let mut last = None;
    let mut offset = HEADER_LEN as usize;
    while offset < bytes.len() {
        if let Some(frame) = read_frame(&bytes[offset..]) {
            offset += frame.len;
            scan.valid_len = offset as u64;
            scan.max_sequence = scan.max_sequence.max(frame.sequence);
            scan.records += 1;
            last = Some(frame);
            continue;
        }
        let Some(next) = (offset + 1..bytes.len()).find(|&at| read_frame(&bytes[at..]).is_some())
        else {
            break;
        };
        tracing::debug!("skipping {} damaged bytes at offset {offset}", next - offset);
        scan.damaged_records += 1;
        offset = next;
    }
    scan.torn_bytes = (bytes.len() as u64).saturating_sub(scan.valid_len);
    scan.last = last.map(|frame| JournalRecord {
        sequence: frame.sequence,
        record_type: frame.record_type,
        payload: frame.payload.to_vec(),
    });
    Ok(scan)
}

/// A verified record borrowed from the journal bytes.
struct Frame<'a> {
    sequence: u64,
    record_type: RecordType,
    payload: &'a [u8],
    /// Bytes the whole frame occupies.
    len: usize,
}

/// Decodes the frame at the start of `bytes`. `None` if it is incomplete,
/// of an unknown type or fails its checksum.
fn read_frame(bytes: &[u8]) -> Option<Frame<'_>> {
    let head = bytes.get(..FRAME_HEAD_LEN)?;
    let record_type = RecordType::from_u8(head[8])?;
    let payload_len = u32::from_le_bytes([head[9], head[10], head[11], head[12]]) as usize;
    let payload_end = FRAME_HEAD_LEN.checked_add(payload_len)?;
    let payload = bytes.get(FRAME_HEAD_LEN..payload_end)?;
    let crc = bytes.get(payload_end..payload_end + 4)?;
    let crc = u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]]);
    if crc32fast::hash(&bytes[..payload_end]) != crc {
        return None;
    }

    let mut sequence = [0u8; 8];
    sequence.copy_from_slice(&head[..8]);
    Some(Frame {
        sequence: u64::from_le_bytes(sequence),
        record_type,
        payload,
        len: payload_end + 4,
    })
}

fn decode_snapshot(record: &JournalRecord) -> LedgerResult<LedgerState> {
    let state: LedgerState = serde_json::from_slice(&record.payload).map_err(|e| {
        LedgerError::CorruptJournal(format!("snapshot {} unreadable: {e}", record.sequence))
    })?;
    if state.schema_version > SCHEMA_VERSION {
        return Err(LedgerError::CorruptJournal(format!(
            "snapshot {} has schema version {}, newest supported is {SCHEMA_VERSION}",
            record.sequence, state.schema_version
        )));
    }
    Ok(state)
}

/// In-memory store for tests and journal-less platforms.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<Option<LedgerState>>,
    saves: AtomicU64,
    compactions: AtomicU64,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `save` fail with a storage error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Snapshots saved so far.
    #[must_use]
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    /// Compactions requested so far.
    #[must_use]
    pub fn compaction_count(&self) -> u64 {
        self.compactions.load(Ordering::SeqCst)
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> LedgerResult<Option<LedgerState>> {
        Ok(self.state.lock().clone())
    }

    fn save(&self, state: &LedgerState) -> LedgerResult<u64> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(LedgerError::Storage("memory store is read-only".to_string()));
        }
        *self.state.lock() = Some(state.clone());
        Ok(self.saves.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn compact(&self) -> LedgerResult<()> {
        self.compactions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

impl<S: StateStore + Sync + ?Sized> StateStore for std::sync::Arc<S> {
    fn load(&self) -> LedgerResult<Option<LedgerState>> {
        (**self).load()
    }

    fn save(&self, state: &LedgerState) -> LedgerResult<u64> {
        (**self).save(state)
    }

    fn compact(&self) -> LedgerResult<()> {
        (**self).compact()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
