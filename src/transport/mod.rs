pub mod mock;
pub mod pcsc;

pub use self::pcsc::PcscTransport;

use crate::protocol::Protocol;

/// Protocol control information accompanying one physical exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pci {
    pub protocol: Protocol,
}

impl Pci {
    pub fn new(protocol: Protocol) -> Self {
        Self { protocol }
    }
}

/// A failed physical exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmitError {
    pub error: ::pcsc::Error,

    /// For `InsufficientBuffer`: the receive buffer size the transport actually needs,
    /// if it says.
    pub needed: Option<usize>,
}

impl TransmitError {
    pub fn insufficient_buffer(needed: usize) -> Self {
        Self {
            error: ::pcsc::Error::InsufficientBuffer,
            needed: Some(needed),
        }
    }

    /// The size to grow the receive buffer to, if retrying with a bigger one can help.
    pub fn grow_to(&self, allocated: usize) -> Option<usize> {
        match (self.error, self.needed) {
            (::pcsc::Error::InsufficientBuffer, Some(needed)) if needed > allocated => Some(needed),
            _ => None,
        }
    }
}

impl From<::pcsc::Error> for TransmitError {
    fn from(error: ::pcsc::Error) -> Self {
        Self {
            error,
            needed: None,
        }
    }
}

/// The byte-exchange primitive of a connected card.
///
/// One call is one blocking exchange; the caller owns the card for its duration.
pub trait Transport {
    /// The protocol negotiated with the card.
    fn protocol(&self) -> Protocol;

    /// The largest response (status word included) the reader can receive, if known.
    fn max_recv_size(&self) -> Option<usize> {
        None
    }

    /// Sends `send` and receives into `recv`, returning the number of bytes received.
    fn transmit(
        &mut self,
        send_pci: &Pci,
        send: &[u8],
        recv_pci: &mut Pci,
        recv: &mut [u8],
    ) -> Result<usize, TransmitError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn protocol(&self) -> Protocol {
        (**self).protocol()
    }

    fn max_recv_size(&self) -> Option<usize> {
        (**self).max_recv_size()
    }

    fn transmit(
        &mut self,
        send_pci: &Pci,
        send: &[u8],
        recv_pci: &mut Pci,
        recv: &mut [u8],
    ) -> Result<usize, TransmitError> {
        (**self).transmit(send_pci, send, recv_pci, recv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grow_only_when_bigger() {
        let err = TransmitError::insufficient_buffer(300);
        assert_eq!(err.grow_to(258), Some(300));
        assert_eq!(err.grow_to(300), None);
        assert_eq!(err.grow_to(512), None);
    }

    #[test]
    fn grow_needs_a_size() {
        let err = TransmitError::from(::pcsc::Error::InsufficientBuffer);
        assert_eq!(err.grow_to(2), None);
        let err = TransmitError {
            error: ::pcsc::Error::RemovedCard,
            needed: Some(300),
        };
        assert_eq!(err.grow_to(2), None);
    }
}
