use crate::errors::{ErrorKind, LedgerError, LedgerResult};
use crate::journal::codec::{decode_body, encode_frame, FrameOutcome, FrameReader, JournalHeader};
use crate::journal::{
    JournalConfig, JournalEntry, JournalFault, JournalReader, Operation, OperationKind,
    TransactionId,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Outcome of a journal compaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompactionStats {
    pub retained: usize,
    pub discarded: usize,
}

/// Point-in-time figures about a journal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JournalStats {
    pub file_size: u64,
    pub next_sequence: u64,
    pub next_transaction_id: u64,
    pub resolved_pending_compaction: usize,
}

/// Durable, append-only log of transactional queue operations.
///
/// # Purpose
/// The journal is the only record of whether a transaction happened. Every record is
/// flushed to stable storage before the call that wrote it returns, and all writers are
/// serialized into one global sequence.
///
/// # File layout
/// A header frame (format version and id counters) followed by one frame per entry, each
/// frame being `u32 length | u32 crc32(length) | u32 crc32(body) | bincode body`. A torn
/// final frame left by a crash is cut off when the journal is opened; damage anywhere else,
/// a damaged length field included, refuses the open.
///
/// # Failure model
/// A record that cannot be persisted fails with [`ErrorKind::DurabilityError`] and leaves
/// no trace in the file. If the file cannot even be restored to its previous length the
/// journal is poisoned and every later write fails with [`ErrorKind::StorageFatal`].
///
/// Cloning is cheap; clones share the same file and counters.
#[derive(Clone)]
pub struct TransactionJournal {
    inner: Arc<TransactionJournalInner>,
}

impl TransactionJournal {
    /// Opens the journal described by `config`, creating it if needed.
    ///
    /// Removes a compaction file left over by an interrupted compaction and truncates a
    /// torn final record. Fails with [`ErrorKind::JournalCorrupted`] if the header or any
    /// record before the last one is damaged.
    pub fn open(config: JournalConfig) -> LedgerResult<TransactionJournal> {
        let inner = TransactionJournalInner::open(config)?;
        Ok(TransactionJournal {
            inner: Arc::new(inner),
        })
    }

    pub fn config(&self) -> &JournalConfig {
        &self.inner.config
    }

    /// Hands out a fresh transaction id.
    pub fn next_transaction_id(&self) -> TransactionId {
        TransactionId::new(self.inner.next_transaction_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Durably records an ADD or REMOVE for `transaction_id`.
    ///
    /// # Returns
    /// * `Ok(sequence)` of the persisted entry
    /// * `Err(LedgerError)` of kind `DurabilityError` if it was not persisted, or
    ///   `InvalidOperation` if `operation` is not an ADD or REMOVE
    pub fn append(&self, transaction_id: TransactionId, operation: Operation) -> LedgerResult<u64> {
        match operation.kind() {
            OperationKind::Add | OperationKind::Remove => {
                self.inner.write(transaction_id, operation)
            }
            kind => {
                log::error!("Cannot append a {} record as a queue operation", kind);
                Err(LedgerError::new(
                    &format!("Cannot append a {} record as a queue operation", kind),
                    ErrorKind::InvalidOperation,
                ))
            }
        }
    }

    /// Durably records the COMMIT marker of `transaction_id`.
    pub fn commit(&self, transaction_id: TransactionId) -> LedgerResult<u64> {
        self.inner.write(transaction_id, Operation::Commit)
    }

    pub fn mark_applied(&self, transaction_id: TransactionId) -> LedgerResult<u64> {
        self.inner.write(transaction_id, Operation::Applied)
    }

    pub fn mark_rolled_back(&self, transaction_id: TransactionId) -> LedgerResult<u64> {
        self.inner.write(transaction_id, Operation::RolledBack)
    }

    /// Records that a rollback or a recovery run redid or undid the entry with sequence
    /// `entry`.
    pub fn mark_recovered(&self, transaction_id: TransactionId, entry: u64) -> LedgerResult<u64> {
        self.inner
            .write(transaction_id, Operation::Recovered { entry })
    }

    /// Returns a lazy, restartable reader over all entries in sequence order.
    pub fn read_all(&self) -> JournalReader {
        JournalReader::new(self.inner.config.file_path())
    }

    /// Rewrites the journal without the entries of `resolved` transactions.
    ///
    /// The new file is written beside the journal, synced and renamed over it, so a crash
    /// at any point leaves either the old or the new journal intact.
    pub fn compact(&self, resolved: &HashSet<TransactionId>) -> LedgerResult<CompactionStats> {
        self.inner.compact(resolved)
    }

    /// Remembers that `transaction_id` has no remaining effect to apply and compacts once
    /// enough such transactions have accumulated.
    pub fn mark_resolved(&self, transaction_id: TransactionId) {
        self.inner.mark_resolved(transaction_id)
    }

    /// Arms a simulated write failure.
    pub fn inject_fault(&self, fault: JournalFault) {
        log::debug!("Injecting journal fault {:?}", fault);
        *self.inner.fault.lock() = Some(fault);
    }

    pub fn clear_fault(&self) {
        *self.inner.fault.lock() = None;
    }

    pub fn stats(&self) -> JournalStats {
        let writer = self.inner.writer.lock();
        JournalStats {
            file_size: writer.len,
            next_sequence: writer.next_sequence,
            next_transaction_id: self.inner.next_transaction_id.load(Ordering::SeqCst),
            resolved_pending_compaction: self.inner.resolved.lock().len(),
        }
    }

    /// Syncs and closes the journal. Later writes fail with `DurabilityError`.
    pub fn close(&self) -> LedgerResult<()> {
        let mut writer = self.inner.writer.lock();
        if writer.closed {
            return Ok(());
        }
        writer.closed = true;
        writer.file.sync_all()?;
        log::debug!("Journal {:?} closed", self.inner.config.file_path());
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.writer.lock().closed
    }
}

struct TransactionJournalInner {
    config: JournalConfig,
    writer: Mutex<JournalWriter>,
    next_transaction_id: AtomicU64,
    fault: Mutex<Option<JournalFault>>,
    resolved: Mutex<HashSet<TransactionId>>,
    compacting: AtomicBool,
}

impl TransactionJournalInner {
    fn open(config: JournalConfig) -> LedgerResult<Self> {
        fs::create_dir_all(config.dir())?;

        let leftover = config.compaction_path();
        if leftover.exists() {
            log::warn!("Removing unfinished journal compaction file {:?}", leftover);
            fs::remove_file(&leftover)?;
        }

        let path = config.file_path();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let scan = scan_journal(&file)?;
        let (next_transaction_id, next_sequence, len) = match scan {
            Some(scan) => {
                if scan.valid_len < scan.file_len {
                    log::warn!(
                        "Truncating torn record at the end of journal {:?} ({} bytes)",
                        path,
                        scan.file_len - scan.valid_len
                    );
                    file.set_len(scan.valid_len)?;
                    file.sync_all()?;
                }
                (scan.next_transaction_id, scan.next_sequence, scan.valid_len)
            }
            None => {
                // empty file, or a crash before the header was complete
                file.set_len(0)?;
                let header = encode_frame(&JournalHeader::new(1, 1))?;
                file.seek(SeekFrom::Start(0))?;
                file.write_all(&header)?;
                file.sync_all()?;
                sync_dir(config.dir());
                (1, 1, header.len() as u64)
            }
        };

        log::debug!(
            "Opened journal {:?}: next transaction {}, next sequence {}",
            path,
            next_transaction_id,
            next_sequence
        );

        Ok(TransactionJournalInner {
            config,
            writer: Mutex::new(JournalWriter {
                file,
                len,
                next_sequence,
                poisoned: false,
                closed: false,
            }),
            next_transaction_id: AtomicU64::new(next_transaction_id),
            fault: Mutex::new(None),
            resolved: Mutex::new(HashSet::new()),
            compacting: AtomicBool::new(false),
        })
    }

    fn write(&self, transaction_id: TransactionId, operation: Operation) -> LedgerResult<u64> {
        let kind = operation.kind();
        let mut writer = self.writer.lock();
        writer.check_writable()?;

        let sequence = writer.next_sequence;
        let frame = encode_frame(&JournalEntry::new(sequence, transaction_id, operation))
            .map_err(|e| {
                LedgerError::new_with_cause(
                    &format!("Failed to encode {} record of {}", kind, transaction_id),
                    ErrorKind::DurabilityError,
                    e,
                )
            })?;

        let result = match self.take_fault(kind) {
            Some(JournalFault::TearNextAppend) => writer.write_torn(&frame),
            Some(fault) => Err(LedgerError::new(
                &format!("Injected journal fault {:?}", fault),
                ErrorKind::IOError,
            )),
            None => writer.write_frame(&frame, self.config.sync_on_append()),
        };

        match result {
            Ok(()) => {
                writer.next_sequence += 1;
                Ok(sequence)
            }
            Err(err) => {
                writer.discard_partial()?;
                log::error!(
                    "Failed to persist {} record of {}: {}",
                    kind,
                    transaction_id,
                    err
                );
                Err(LedgerError::new_with_cause(
                    &format!("Failed to persist {} record of {}", kind, transaction_id),
                    ErrorKind::DurabilityError,
                    err,
                ))
            }
        }
    }

    fn take_fault(&self, kind: OperationKind) -> Option<JournalFault> {
        let mut fault = self.fault.lock();
        match *fault {
            Some(f) if f.matches(kind) => {
                if !f.is_sticky() {
                    *fault = None;
                }
                Some(f)
            }
            _ => None,
        }
    }

    fn compact(&self, resolved: &HashSet<TransactionId>) -> LedgerResult<CompactionStats> {
        let mut writer = self.writer.lock();
        writer.check_writable()?;

        let temp = self.config.compaction_path();
        let (stats, new_len) = match self.write_compacted(&writer, resolved) {
            Ok(result) => result,
            Err(e) => {
                log::error!("Journal compaction failed: {}", e);
                if let Err(re) = fs::remove_file(&temp) {
                    log::warn!("Failed to remove compaction file {:?}: {}", temp, re);
                }
                return Err(e);
            }
        };

        // From here on the old file handle may point at an unlinked file.
        let swapped = fs::rename(&temp, self.config.file_path())
            .map_err(LedgerError::from)
            .and_then(|_| {
                sync_dir(self.config.dir());
                OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(self.config.file_path())
                    .map_err(LedgerError::from)
            });

        match swapped {
            Ok(file) => {
                writer.file = file;
                writer.len = new_len;
                log::info!(
                    "Compacted journal: {} entries retained, {} discarded",
                    stats.retained,
                    stats.discarded
                );
                Ok(stats)
            }
            Err(e) => {
                writer.poisoned = true;
                log::error!("Failed to install compacted journal: {}", e);
                Err(LedgerError::new_with_cause(
                    "Failed to install compacted journal",
                    ErrorKind::StorageFatal,
                    e,
                ))
            }
        }
    }

    fn write_compacted(
        &self,
        writer: &JournalWriter,
        resolved: &HashSet<TransactionId>,
    ) -> LedgerResult<(CompactionStats, u64)> {
        let temp = self.config.compaction_path();
        let mut out = BufWriter::new(File::create(&temp)?);

        let header = encode_frame(&JournalHeader::new(
            self.next_transaction_id.load(Ordering::SeqCst),
            writer.next_sequence,
        ))?;
        out.write_all(&header)?;
        let mut len = header.len() as u64;

        let mut stats = CompactionStats::default();
        for entry in JournalReader::new(self.config.file_path()).iter() {
            let entry = entry?;
            if resolved.contains(&entry.transaction_id()) {
                stats.discarded += 1;
                continue;
            }
            let frame = encode_frame(&entry)?;
            out.write_all(&frame)?;
            len += frame.len() as u64;
            stats.retained += 1;
        }

        let file = out
            .into_inner()
            .map_err(|e| LedgerError::from(e.into_error()))?;
        file.sync_all()?;
        Ok((stats, len))
    }

    fn mark_resolved(&self, transaction_id: TransactionId) {
        let threshold = self.config.compaction_threshold();
        let snapshot = {
            let mut resolved = self.resolved.lock();
            resolved.insert(transaction_id);
            if threshold == 0 || resolved.len() < threshold {
                return;
            }
            resolved.clone()
        };

        if self.compacting.swap(true, Ordering::AcqRel) {
            return;
        }
        match self.compact(&snapshot) {
            Ok(_) => {
                self.resolved
                    .lock()
                    .retain(|id| !snapshot.contains(id));
            }
            Err(e) => log::warn!("Runtime journal compaction skipped: {}", e),
        }
        self.compacting.store(false, Ordering::Release);
    }
}

struct JournalWriter {
    file: File,
    len: u64,
    next_sequence: u64,
    poisoned: bool,
    closed: bool,
}

impl JournalWriter {
    fn check_writable(&self) -> LedgerResult<()> {
        if self.poisoned {
            log::error!("Journal is unusable after an unrecoverable write failure");
            return Err(LedgerError::new(
                "Journal is unusable after an unrecoverable write failure",
                ErrorKind::StorageFatal,
            ));
        }
        if self.closed {
            log::error!("Journal is closed");
            return Err(LedgerError::new(
                "Journal is closed",
                ErrorKind::DurabilityError,
            ));
        }
        Ok(())
    }

    fn write_frame(&mut self, frame: &[u8], sync: bool) -> LedgerResult<()> {
        self.file.seek(SeekFrom::Start(self.len))?;
        self.file.write_all(frame)?;
        if sync {
            self.file.sync_data()?;
        }
        self.len += frame.len() as u64;
        Ok(())
    }

    fn write_torn(&mut self, frame: &[u8]) -> LedgerResult<()> {
        self.file.seek(SeekFrom::Start(self.len))?;
        self.file.write_all(&frame[..frame.len() / 2])?;
        Err(LedgerError::new(
            "Injected torn journal write",
            ErrorKind::IOError,
        ))
    }

    fn discard_partial(&mut self) -> LedgerResult<()> {
        let restored = self
            .file
            .set_len(self.len)
            .and_then(|_| self.file.sync_data());
        if let Err(e) = restored {
            self.poisoned = true;
            log::error!("Failed to roll back a partial journal write: {}", e);
            return Err(LedgerError::new_with_cause(
                "Failed to roll back a partial journal write",
                ErrorKind::StorageFatal,
                e.into(),
            ));
        }
        Ok(())
    }
}

struct ScanResult {
    next_transaction_id: u64,
    next_sequence: u64,
    valid_len: u64,
    file_len: u64,
}

/// Validates the whole file and derives the id counters from it.
///
/// Returns `None` when the file holds no complete header.
fn scan_journal(file: &File) -> LedgerResult<Option<ScanResult>> {
    let file_len = file.metadata()?.len();
    let mut reader = FrameReader::new(BufReader::new(file.try_clone()?), file_len);

    let header: JournalHeader = match reader.next_frame()? {
        FrameOutcome::Frame(body) => decode_body(&body)?,
        FrameOutcome::End | FrameOutcome::Torn { .. } => return Ok(None),
        FrameOutcome::Corrupted { reason, .. } => {
            log::error!("Journal header is damaged: {}", reason);
            return Err(LedgerError::new(
                &format!("Journal header is damaged: {}", reason),
                ErrorKind::JournalCorrupted,
            ));
        }
    };
    header.validate()?;

    let mut next_transaction_id = header.next_transaction_id();
    let mut next_sequence = header.next_sequence();
    let valid_len = loop {
        match reader.next_frame()? {
            FrameOutcome::Frame(body) => {
                let entry: JournalEntry = decode_body(&body)?;
                next_transaction_id = next_transaction_id.max(entry.transaction_id().value() + 1);
                next_sequence = next_sequence.max(entry.sequence() + 1);
            }
            FrameOutcome::End => break reader.offset(),
            FrameOutcome::Torn { offset } => break offset,
            FrameOutcome::Corrupted { offset, reason } => {
                log::error!("Journal corrupted at byte {}: {}", offset, reason);
                return Err(LedgerError::new(
                    &format!("Journal corrupted at byte {}: {}", offset, reason),
                    ErrorKind::JournalCorrupted,
                ));
            }
        }
    };

    Ok(Some(ScanResult {
        next_transaction_id,
        next_sequence,
        valid_len,
        file_len,
    }))
}

fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        log::warn!("Failed to sync journal directory {:?}: {}", dir, e);
    }
}
