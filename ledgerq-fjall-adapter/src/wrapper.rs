use ledgerq::common::Payload;
use ledgerq::errors::{ErrorKind, LedgerError};
use std::error::Error;
use thiserror::Error;

/// Errors raised while translating between queue elements and Fjall keys and values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FjallPayloadError {
    #[error("Deserialization failed: {0}")]
    DeserializationError(String),
    #[error("Serialization failed: {0}")]
    SerializationError(String),
    #[error("Invalid queue position key of {0} bytes")]
    InvalidPosition(usize),
}

impl From<FjallPayloadError> for LedgerError {
    fn from(err: FjallPayloadError) -> Self {
        LedgerError::new(&err.to_string(), ErrorKind::EncodingError)
    }
}

pub type FjallPayloadResult<T> = Result<T, FjallPayloadError>;

/// Serialized form of a [`Payload`] as stored in a partition.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FjallPayload(Vec<u8>);

impl FjallPayload {
    #[inline]
    pub fn try_from_payload(payload: &Payload) -> FjallPayloadResult<FjallPayload> {
        bincode::serde::encode_to_vec(payload, bincode::config::legacy())
            .map(FjallPayload)
            .map_err(|e| FjallPayloadError::SerializationError(e.to_string()))
    }

    #[inline]
    pub fn try_into_payload(self) -> FjallPayloadResult<Payload> {
        bincode::serde::decode_from_slice(&self.0, bincode::config::legacy())
            .map(|(payload, _)| payload)
            .map_err(|e| FjallPayloadError::DeserializationError(e.to_string()))
    }
}

impl From<&[u8]> for FjallPayload {
    #[inline]
    fn from(bytes: &[u8]) -> Self {
        FjallPayload(bytes.to_vec())
    }
}

impl AsRef<[u8]> for FjallPayload {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Position of an element in a queue partition, stored big-endian so that key order is
/// queue order.
#[inline]
pub(crate) fn encode_position(position: u64) -> [u8; 8] {
    position.to_be_bytes()
}

#[inline]
pub(crate) fn decode_position(key: &[u8]) -> FjallPayloadResult<u64> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| FjallPayloadError::InvalidPosition(key.len()))?;
    Ok(u64::from_be_bytes(bytes))
}

pub(crate) fn to_ledger_error(error: impl Error) -> LedgerError {
    let error_msg = error.to_string();
    let error_kind = if error_msg.contains("closed") {
        ErrorKind::StoreAlreadyClosed
    } else if error_msg.contains("not found")
        || error_msg.contains("deleted")
        || error_msg.contains("PartitionDeleted")
    {
        ErrorKind::StoreNotInitialized
    } else {
        ErrorKind::BackendError
    };
    LedgerError::new(&format!("Fjall Error: {}", error_msg), error_kind)
}
