use crate::errors::{Error, Result};
use crate::status::Status;

/// A single response APDU, as received in one physical exchange.
///
/// The receive buffer can be longer than what the card actually sent; `len` is authoritative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseApdu {
    buf: Vec<u8>,
    len: usize,
}

impl ResponseApdu {
    pub fn new(buf: Vec<u8>, len: usize) -> Self {
        let len = len.min(buf.len());
        Self { buf, len }
    }

    /// A response APDU needs at least SW1 and SW2.
    pub fn is_valid(&self) -> bool {
        self.len >= 2
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The received bytes, status word included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn sw1(&self) -> Result<u8> {
        self.sw().map(|(sw1, _)| sw1)
    }

    pub fn sw2(&self) -> Result<u8> {
        self.sw().map(|(_, sw2)| sw2)
    }

    pub fn status_word(&self) -> Result<u16> {
        self.sw().map(|(sw1, sw2)| u16::from_be_bytes([sw1, sw2]))
    }

    pub fn status(&self) -> Result<Status> {
        self.sw().map(|(sw1, sw2)| Status::from(sw1, sw2))
    }

    /// The payload preceding the status word, if there is any.
    pub fn data(&self) -> Option<&[u8]> {
        match self.data_size() {
            0 => None,
            n => Some(&self.buf[..n]),
        }
    }

    pub fn has_data(&self) -> bool {
        self.data_size() > 0
    }

    pub fn data_size(&self) -> usize {
        self.len.saturating_sub(2)
    }

    fn sw(&self) -> Result<(u8, u8)> {
        match self.as_bytes() {
            [.., sw1, sw2] => Ok((*sw1, *sw2)),
            _ => Err(Error::InvalidResponse { len: self.len }),
        }
    }
}

impl From<Vec<u8>> for ResponseApdu {
    fn from(buf: Vec<u8>) -> Self {
        let len = buf.len();
        Self::new(buf, len)
    }
}
