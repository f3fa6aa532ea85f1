use crate::wrapper::{decode_position, encode_position, to_ledger_error, FjallPayload};
use fjall::{Keyspace, PartitionHandle, PersistMode};
use ledgerq::common::Payload;
use ledgerq::errors::LedgerResult;
use ledgerq::store::QueueBackendProvider;
use parking_lot::Mutex;

/// First position handed out in an empty partition. Leaves room to grow in both
/// directions, since rollbacks and recovery may insert ahead of the head.
const MIDPOINT: u64 = 1 << 63;

/// Queue backend storing the elements of one queue in a Fjall partition.
///
/// Each element lives under its position, encoded big-endian so the partition's key
/// order is the queue order. The positions of the head and tail are kept in memory and
/// rebuilt from the first and last key when the partition is opened.
pub(crate) struct FjallQueueBackend {
    name: String,
    keyspace: Keyspace,
    partition: PartitionHandle,
    sync_on_write: bool,
    positions: Mutex<Positions>,
}

/// `head` is the position of the first element, `tail` the position after the last one.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Positions {
    head: u64,
    tail: u64,
}

impl FjallQueueBackend {
    pub(crate) fn new(
        name: &str,
        keyspace: Keyspace,
        partition: PartitionHandle,
        sync_on_write: bool,
    ) -> LedgerResult<FjallQueueBackend> {
        let positions = Self::load_positions(&partition)?;
        log::debug!(
            "Opened fjall queue {} holding {} elements",
            name,
            positions.tail - positions.head
        );

        Ok(FjallQueueBackend {
            name: name.to_string(),
            keyspace,
            partition,
            sync_on_write,
            positions: Mutex::new(positions),
        })
    }

    fn load_positions(partition: &PartitionHandle) -> LedgerResult<Positions> {
        let first = partition.first_key_value().map_err(|err| {
            log::error!("Failed to read the head of a fjall queue: {}", err);
            to_ledger_error(err)
        })?;
        let last = partition.last_key_value().map_err(|err| {
            log::error!("Failed to read the tail of a fjall queue: {}", err);
            to_ledger_error(err)
        })?;

        match (first, last) {
            (Some((first, _)), Some((last, _))) => Ok(Positions {
                head: decode_position(&first)?,
                tail: decode_position(&last)? + 1,
            }),
            _ => Ok(Positions {
                head: MIDPOINT,
                tail: MIDPOINT,
            }),
        }
    }

    fn write(&self, position: u64, payload: &Payload) -> LedgerResult<()> {
        let value = FjallPayload::try_from_payload(payload)?;
        let key = encode_position(position);
        self.partition
            .insert(key.to_vec(), value.as_ref())
            .map_err(|err| {
                log::error!("Failed to write to fjall queue {}: {}", self.name, err);
                to_ledger_error(err)
            })?;
        self.persist()
    }

    fn read(&self, position: u64) -> LedgerResult<Option<Payload>> {
        let key = encode_position(position);
        let value = self.partition.get(key).map_err(|err| {
            log::error!("Failed to read from fjall queue {}: {}", self.name, err);
            to_ledger_error(err)
        })?;

        match value {
            Some(bytes) => {
                let payload = FjallPayload::from(bytes.as_ref()).try_into_payload()?;
                Ok(Some(payload))
            }
            None => Ok(None),
        }
    }

    fn delete(&self, position: u64) -> LedgerResult<()> {
        let key = encode_position(position);
        self.partition.remove(key.to_vec()).map_err(|err| {
            log::error!("Failed to remove from fjall queue {}: {}", self.name, err);
            to_ledger_error(err)
        })
    }

    fn persist(&self) -> LedgerResult<()> {
        if !self.sync_on_write {
            return Ok(());
        }
        self.keyspace.persist(PersistMode::SyncAll).map_err(|err| {
            log::error!("Failed to persist fjall queue {}: {}", self.name, err);
            to_ledger_error(err)
        })
    }
}

impl QueueBackendProvider for FjallQueueBackend {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn push_back(&self, payload: Payload) -> LedgerResult<()> {
        let mut positions = self.positions.lock();
        self.write(positions.tail, &payload)?;
        positions.tail += 1;
        Ok(())
    }

    fn push_front(&self, payload: Payload) -> LedgerResult<()> {
        let mut positions = self.positions.lock();
        let position = positions.head - 1;
        self.write(position, &payload)?;
        positions.head = position;
        Ok(())
    }

    fn pop_front(&self) -> LedgerResult<Option<Payload>> {
        let mut positions = self.positions.lock();
        if positions.head == positions.tail {
            return Ok(None);
        }

        let payload = self.read(positions.head)?;
        self.delete(positions.head)?;
        self.persist()?;
        positions.head += 1;
        if positions.head == positions.tail {
            positions.head = MIDPOINT;
            positions.tail = MIDPOINT;
        }
        Ok(payload)
    }

    fn peek_front(&self) -> LedgerResult<Option<Payload>> {
        let positions = self.positions.lock();
        if positions.head == positions.tail {
            return Ok(None);
        }
        self.read(positions.head)
    }

    fn len(&self) -> LedgerResult<usize> {
        let positions = self.positions.lock();
        Ok((positions.tail - positions.head) as usize)
    }

    fn clear(&self) -> LedgerResult<()> {
        let mut positions = self.positions.lock();
        for position in positions.head..positions.tail {
            self.delete(position)?;
        }
        self.persist()?;
        positions.head = MIDPOINT;
        positions.tail = MIDPOINT;
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        true
    }
}
