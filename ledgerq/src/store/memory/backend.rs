use crate::common::Payload;
use crate::errors::LedgerResult;
use crate::store::QueueBackendProvider;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// In-memory queue backend.
///
/// Elements live in a `VecDeque` behind a mutex and are lost when the process exits.
/// A warm restart of the queue manager keeps them, since the backend outlives the
/// journal.
pub struct InMemoryQueueBackend {
    name: String,
    items: Mutex<VecDeque<Payload>>,
}

impl InMemoryQueueBackend {
    pub fn new(name: &str) -> Self {
        InMemoryQueueBackend {
            name: name.to_string(),
            items: Mutex::new(VecDeque::new()),
        }
    }
}

impl QueueBackendProvider for InMemoryQueueBackend {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn push_back(&self, payload: Payload) -> LedgerResult<()> {
        self.items.lock().push_back(payload);
        Ok(())
    }

    fn push_front(&self, payload: Payload) -> LedgerResult<()> {
        self.items.lock().push_front(payload);
        Ok(())
    }

    fn pop_front(&self) -> LedgerResult<Option<Payload>> {
        Ok(self.items.lock().pop_front())
    }

    fn peek_front(&self) -> LedgerResult<Option<Payload>> {
        Ok(self.items.lock().front().cloned())
    }

    fn len(&self) -> LedgerResult<usize> {
        Ok(self.items.lock().len())
    }

    fn clear(&self) -> LedgerResult<()> {
        self.items.lock().clear();
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        false
    }
}
