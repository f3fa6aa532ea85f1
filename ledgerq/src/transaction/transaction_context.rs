use crate::common::Payload;
use crate::errors::{ErrorKind, LedgerError, LedgerResult};
use crate::journal::{Operation, TransactionId, TransactionJournal};
use crate::provider::QueueProvider;
use crate::transaction::{ActiveGuard, PendingOperations, Removal, TransactionState};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

/// A unit of work over one or more queues.
///
/// # Semantics
/// - [`offer`](Self::offer) journals an ADD and keeps the payload aside; no poller can see
///   it until [`commit`](Self::commit) succeeds.
/// - [`poll`](Self::poll) removes the head of the live queue at once and journals a
///   REMOVE; no other poller can see the element from then on, whatever the outcome.
/// - [`commit`](Self::commit) durably writes the COMMIT marker, then hands the pending
///   additions to their queues.
/// - [`rollback`](Self::rollback) drops the pending additions and returns removed
///   elements to the tail of their queues.
///
/// A context is owned by one thread and ends exactly once. Dropping a context that is
/// still open rolls it back.
///
/// # Examples
///
/// ```text
/// let tx = manager.begin_transaction()?;
/// if let Some(order) = tx.poll("incoming", Duration::from_secs(1))? {
///     tx.offer("accepted", order, Duration::from_secs(1))?;
/// }
/// tx.commit()?;
/// ```
pub struct TransactionContext {
    id: TransactionId,
    journal: TransactionJournal,
    provider: Arc<dyn QueueProvider>,
    commit_apply_timeout: Duration,
    state: Mutex<TransactionState>,
    pending: Mutex<PendingOperations>,
    guard: Mutex<Option<ActiveGuard>>,
}

impl TransactionContext {
    /// Starts a transaction with a fresh id from `journal`.
    ///
    /// `commit_apply_timeout` bounds how long commit waits for room in a full bounded
    /// queue before adding a committed element beyond its capacity.
    pub fn new(
        journal: TransactionJournal,
        provider: Arc<dyn QueueProvider>,
        commit_apply_timeout: Duration,
    ) -> Self {
        let id = journal.next_transaction_id();
        log::debug!("Transaction {} started", id);
        TransactionContext {
            id,
            journal,
            provider,
            commit_apply_timeout,
            state: Mutex::new(TransactionState::Open),
            pending: Mutex::new(PendingOperations::default()),
            guard: Mutex::new(None),
        }
    }

    pub(crate) fn with_guard(self, guard: ActiveGuard) -> Self {
        *self.guard.lock() = Some(guard);
        self
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    /// Offers `payload` to `queue` as part of this transaction.
    ///
    /// Waits up to `timeout` for the queue to have room for this and every earlier pending
    /// addition of the transaction to it. The payload becomes visible only on commit.
    ///
    /// # Returns
    /// * `Ok(true)` once the ADD is durable in the journal
    /// * `Ok(false)` if the queue stayed full for the whole timeout
    /// * `Err(LedgerError)` if the ADD could not be journaled, in which case the offer
    ///   did not happen
    pub fn offer(&self, queue: &str, payload: Payload, timeout: Duration) -> LedgerResult<bool> {
        self.check_open()?;
        let store = self.provider.get_queue(queue)?;
        let pending_adds = self.pending.lock().adds_for(queue);
        if !store.wait_for_capacity(pending_adds + 1, timeout)? {
            log::debug!("{}: offer to '{}' timed out", self.id, queue);
            return Ok(false);
        }

        self.journal.append(
            self.id,
            Operation::Add {
                queue: queue.to_string(),
                payload: payload.clone(),
            },
        )?;
        self.pending.lock().add(queue, payload);
        Ok(true)
    }

    /// Removes the head of `queue` as part of this transaction.
    ///
    /// # Returns
    /// * `Ok(Some(payload))` once the REMOVE is durable in the journal
    /// * `Ok(None)` if the queue stayed empty for the whole timeout
    /// * `Err(LedgerError)` if the REMOVE could not be journaled; the element goes back to
    ///   the head of the queue and the transaction can only be rolled back
    pub fn poll(&self, queue: &str, timeout: Duration) -> LedgerResult<Option<Payload>> {
        self.check_open()?;
        let store = self.provider.get_queue(queue)?;
        let payload = match store.poll(timeout)? {
            Some(payload) => payload,
            None => return Ok(None),
        };

        let journaled = self.journal.append(
            self.id,
            Operation::Remove {
                queue: queue.to_string(),
                payload: payload.clone(),
            },
        );

        match journaled {
            Ok(sequence) => {
                self.pending.lock().record_removal(queue, payload.clone(), sequence);
                Ok(Some(payload))
            }
            Err(e) => {
                *self.state.lock() = TransactionState::Failed;
                log::error!(
                    "{}: removal from '{}' was not journaled, the transaction can no longer commit: {}",
                    self.id,
                    queue,
                    e
                );
                if let Err(untake_error) = store.untake(payload.clone()) {
                    log::error!(
                        "{}: could not return the element to '{}', keeping it for rollback: {}",
                        self.id,
                        queue,
                        untake_error
                    );
                    self.pending.lock().restore_later(queue, payload);
                }
                Err(e)
            }
        }
    }

    /// Live size of `queue` plus this transaction's pending additions to it.
    pub fn size(&self, queue: &str) -> LedgerResult<usize> {
        if self.state() == TransactionState::Closed {
            return Err(self.closed_error());
        }
        let store = self.provider.get_queue(queue)?;
        let live = store.size()?;
        Ok(live + self.pending.lock().adds_for(queue))
    }

    /// Commits the transaction.
    ///
    /// A transaction that journaled nothing closes without touching the journal.
    /// If the COMMIT marker cannot be persisted the error is returned, the pending
    /// additions are dropped and the context moves to [`TransactionState::Failed`]; its
    /// removals stay removed until [`rollback`](Self::rollback) or the next recovery.
    pub fn commit(&self) -> LedgerResult<()> {
        {
            let mut state = self.state.lock();
            match *state {
                TransactionState::Open => *state = TransactionState::Committing,
                TransactionState::Failed => {
                    log::error!("{} has failed and can only be rolled back", self.id);
                    return Err(LedgerError::new(
                        &format!("Transaction {} has failed and can only be rolled back", self.id),
                        ErrorKind::InvalidOperation,
                    ));
                }
                _ => return Err(self.closed_error()),
            }
        }

        let (adds, journaled) = {
            let mut pending = self.pending.lock();
            (pending.take_adds(), pending.is_journaled())
        };

        if !journaled {
            self.close();
            log::debug!("{} committed with no operations", self.id);
            return Ok(());
        }

        if let Err(e) = self.journal.commit(self.id) {
            *self.state.lock() = TransactionState::Failed;
            log::error!(
                "{}: commit was not persisted, {} pending additions discarded: {}",
                self.id,
                adds.len(),
                e
            );
            return Err(e);
        }

        let applied = self.apply_adds(adds);
        self.pending.lock().take_undo();
        self.close();

        match applied {
            Ok(()) => {
                self.settle(self.journal.mark_applied(self.id), "APPLIED")?;
                log::debug!("{} committed", self.id);
                Ok(())
            }
            Err(e) => {
                log::error!(
                    "{} is committed but its additions could not all be applied, \
                     recovery will apply them: {}",
                    self.id,
                    e
                );
                Err(e)
            }
        }
    }

    /// Rolls the transaction back. Calling it on a closed context does nothing.
    ///
    /// Removed elements are appended to the tail of their queues, not returned to their
    /// original position.
    pub fn rollback(&self) -> LedgerResult<()> {
        {
            let mut state = self.state.lock();
            match *state {
                TransactionState::Closed => return Ok(()),
                TransactionState::Open | TransactionState::Failed => {
                    *state = TransactionState::RollingBack
                }
                other => {
                    log::error!("{} cannot roll back while {}", self.id, other);
                    return Err(LedgerError::new(
                        &format!("Transaction {} cannot roll back while {}", self.id, other),
                        ErrorKind::InvalidOperation,
                    ));
                }
            }
        }

        let (undo, discarded, journaled, removals_journaled) = {
            let mut pending = self.pending.lock();
            (
                pending.take_undo(),
                pending.take_adds().len(),
                pending.is_journaled(),
                pending.has_journaled_removals(),
            )
        };

        let mut result = Ok(());
        let mut unmarked = 0;
        for Removal {
            queue,
            payload,
            sequence,
        } in undo
        {
            let restored = self
                .provider
                .get_recovery_queue(&queue)
                .and_then(|store| store.restore_to_tail(payload));
            match (restored, sequence) {
                (Ok(()), Some(sequence)) => {
                    // keeps a later recovery from returning this element a second time
                    if let Err(e) = self.journal.mark_recovered(self.id, sequence) {
                        log::warn!(
                            "{}: RECOVERED marker for entry #{} was not persisted: {}",
                            self.id,
                            sequence,
                            e
                        );
                        unmarked += 1;
                    }
                }
                (Ok(()), None) => {}
                (Err(e), _) => {
                    log::error!("{}: could not return an element to '{}': {}", self.id, queue, e);
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
            }
        }

        if result.is_ok() {
            if removals_journaled {
                result = self.settle(self.journal.mark_rolled_back(self.id), "ROLLED_BACK");
            } else if journaled {
                self.journal.mark_resolved(self.id);
            }
        } else if unmarked > 0 {
            log::error!(
                "{}: {} returned elements are not marked in the journal, a recovery before \
                 the next compaction returns them again",
                self.id,
                unmarked
            );
        }

        self.close();
        log::debug!("{} rolled back, {} pending additions discarded", self.id, discarded);
        result
    }

    /// Makes the outcome of a finished transaction permanent.
    ///
    /// When its closing marker could not be written the transaction's entries are
    /// compacted away instead, so recovery cannot repeat effects that already happened.
    fn settle(&self, marker: LedgerResult<u64>, kind: &str) -> LedgerResult<()> {
        let marker_error = match marker {
            Ok(_) => {
                self.journal.mark_resolved(self.id);
                return Ok(());
            }
            Err(e) => e,
        };

        log::warn!(
            "{}: {} marker was not persisted, compacting the transaction away: {}",
            self.id,
            kind,
            marker_error
        );
        match self.journal.compact(&HashSet::from([self.id])) {
            Ok(_) => Ok(()),
            Err(e) => {
                log::error!(
                    "{}: outcome could not be persisted, a recovery before the next \
                     compaction repeats it: {}",
                    self.id,
                    e
                );
                Err(LedgerError::new_with_cause(
                    &format!("Outcome of transaction {} could not be persisted", self.id),
                    ErrorKind::DurabilityError,
                    e,
                ))
            }
        }
    }

    fn apply_adds(&self, adds: Vec<(String, Payload)>) -> LedgerResult<()> {
        let mut first_error = None;
        for (queue, payload) in adds {
            let applied = self.provider.get_queue(&queue).and_then(|store| {
                if store.offer(payload.clone(), 0, self.commit_apply_timeout)? {
                    return Ok(());
                }
                log::warn!(
                    "{}: queue '{}' stayed full for {:?}, adding a committed element beyond its capacity",
                    self.id,
                    queue,
                    self.commit_apply_timeout
                );
                store.force_push_back(payload)
            });
            if let Err(e) = applied {
                log::error!("{}: could not apply an addition to '{}': {}", self.id, queue, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn check_open(&self) -> LedgerResult<()> {
        match *self.state.lock() {
            TransactionState::Open => Ok(()),
            TransactionState::Failed => {
                log::error!("{} has failed and can only be rolled back", self.id);
                Err(LedgerError::new(
                    &format!("Transaction {} has failed and can only be rolled back", self.id),
                    ErrorKind::InvalidOperation,
                ))
            }
            _ => Err(self.closed_error()),
        }
    }

    fn closed_error(&self) -> LedgerError {
        log::error!("{} is already closed", self.id);
        LedgerError::new(
            &format!("Transaction {} is already closed", self.id),
            ErrorKind::TransactionClosed,
        )
    }

    fn close(&self) {
        *self.state.lock() = TransactionState::Closed;
        self.guard.lock().take();
    }
}

impl Debug for TransactionContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let pending = self.pending.lock();
        f.debug_struct("TransactionContext")
            .field("id", &self.id)
            .field("state", &*self.state.lock())
            .field("pending_adds", &pending.add_count())
            .field("pending_removals", &pending.removal_count())
            .finish()
    }
}

impl Drop for TransactionContext {
    fn drop(&mut self) {
        let state = *self.state.lock();
        if matches!(state, TransactionState::Open | TransactionState::Failed) {
            log::warn!("{} dropped while {}, rolling back", self.id, state);
            if let Err(e) = self.rollback() {
                log::error!("Rollback of dropped transaction {} failed: {}", self.id, e);
            }
        }
    }
}
