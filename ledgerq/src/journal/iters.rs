use crate::errors::{ErrorKind, LedgerError, LedgerResult};
use crate::journal::codec::{decode_body, FrameOutcome, FrameReader, JournalHeader};
use crate::journal::JournalEntry;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

/// A lazy, restartable view over every entry of a journal file, in sequence order.
///
/// Each call to [`iter`](JournalReader::iter) opens the file afresh and streams it frame
/// by frame, so nothing is loaded into memory up front. Entries appended after an
/// iterator started are not visible to it.
#[derive(Clone, Debug)]
pub struct JournalReader {
    path: PathBuf,
}

impl JournalReader {
    pub(crate) fn new(path: PathBuf) -> Self {
        JournalReader { path }
    }

    pub fn iter(&self) -> JournalIterator {
        JournalIterator {
            path: self.path.clone(),
            state: IteratorState::Pending,
        }
    }
}

impl IntoIterator for &JournalReader {
    type Item = LedgerResult<JournalEntry>;
    type IntoIter = JournalIterator;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

enum IteratorState {
    Pending,
    Reading(FrameReader<BufReader<File>>),
    Finished,
}

/// Iterator over journal entries.
///
/// A torn final frame ends the iteration quietly. Corruption before the end yields a
/// single [`ErrorKind::JournalCorrupted`] error and then ends.
pub struct JournalIterator {
    path: PathBuf,
    state: IteratorState,
}

impl JournalIterator {
    fn open(&self) -> LedgerResult<Option<FrameReader<BufReader<File>>>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let limit = file.metadata()?.len();
        let mut reader = FrameReader::new(BufReader::new(file), limit);

        match reader.next_frame()? {
            FrameOutcome::Frame(body) => {
                let header: JournalHeader = decode_body(&body)?;
                header.validate()?;
                Ok(Some(reader))
            }
            FrameOutcome::End | FrameOutcome::Torn { .. } => Ok(None),
            FrameOutcome::Corrupted { reason, .. } => Err(corrupted(0, &reason)),
        }
    }

    fn read_next(&mut self) -> Option<LedgerResult<JournalEntry>> {
        let reader = match &mut self.state {
            IteratorState::Reading(reader) => reader,
            _ => return None,
        };

        let outcome = match reader.next_frame() {
            Ok(outcome) => outcome,
            Err(e) => {
                self.state = IteratorState::Finished;
                return Some(Err(e));
            }
        };

        match outcome {
            FrameOutcome::Frame(body) => {
                let decoded = decode_body::<JournalEntry>(&body);
                if decoded.is_err() {
                    self.state = IteratorState::Finished;
                }
                Some(decoded)
            }
            FrameOutcome::End => {
                self.state = IteratorState::Finished;
                None
            }
            FrameOutcome::Torn { offset } => {
                log::debug!("Journal {:?} ends with a torn record at byte {}", self.path, offset);
                self.state = IteratorState::Finished;
                None
            }
            FrameOutcome::Corrupted { offset, reason } => {
                self.state = IteratorState::Finished;
                Some(Err(corrupted(offset, &reason)))
            }
        }
    }
}

impl Iterator for JournalIterator {
    type Item = LedgerResult<JournalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if let IteratorState::Pending = self.state {
            match self.open() {
                Ok(Some(reader)) => self.state = IteratorState::Reading(reader),
                Ok(None) => {
                    self.state = IteratorState::Finished;
                    return None;
                }
                Err(e) => {
                    self.state = IteratorState::Finished;
                    return Some(Err(e));
                }
            }
        }
        self.read_next()
    }
}

fn corrupted(offset: u64, reason: &str) -> LedgerError {
    log::error!("Journal corrupted at byte {}: {}", offset, reason);
    LedgerError::new(
        &format!("Journal corrupted at byte {}: {}", offset, reason),
        ErrorKind::JournalCorrupted,
    )
}
