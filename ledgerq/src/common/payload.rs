use crate::common::{OCTET_STREAM, TEXT_PLAIN};
use crate::errors::{ErrorKind, LedgerError, LedgerResult};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};

/// An opaque queue record.
///
/// A payload is a byte blob tagged with an application-defined content type. Queues never
/// look inside it; the journal stores it verbatim so a removal can be replayed as a re-add.
///
/// # Examples
///
/// ```rust
/// use ledgerq::common::Payload;
///
/// let order = Payload::new("application/json", br#"{"id":7}"#.to_vec());
/// assert_eq!(order.content_type(), "application/json");
///
/// let text = Payload::text("hello");
/// assert_eq!(text.as_text().unwrap(), "hello");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Payload {
    content_type: String,
    data: Vec<u8>,
}

impl Payload {
    /// Creates a payload with an explicit content type.
    pub fn new(content_type: &str, data: impl Into<Vec<u8>>) -> Self {
        Payload {
            content_type: content_type.to_string(),
            data: data.into(),
        }
    }

    /// Creates a payload of raw bytes (`application/octet-stream`).
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Payload::new(OCTET_STREAM, data)
    }

    /// Creates a UTF-8 text payload.
    pub fn text(text: &str) -> Self {
        Payload::new(TEXT_PLAIN, text.as_bytes().to_vec())
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Interprets the data as UTF-8 text.
    pub fn as_text(&self) -> LedgerResult<&str> {
        std::str::from_utf8(&self.data).map_err(|e| {
            LedgerError::new(
                &format!("Payload is not valid UTF-8: {}", e),
                ErrorKind::EncodingError,
            )
        })
    }
}

impl Debug for Payload {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Payload");
        s.field("content_type", &self.content_type);
        match std::str::from_utf8(&self.data) {
            Ok(text) if self.content_type == TEXT_PLAIN => s.field("text", &text),
            _ => s.field("len", &self.data.len()),
        };
        s.finish()
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::text(text)
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::new(TEXT_PLAIN, text.into_bytes())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Payload::bytes(data)
    }
}
