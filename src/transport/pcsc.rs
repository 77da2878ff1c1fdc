use crate::errors::Result;
use crate::protocol::Protocol;
use crate::transport::{Pci, TransmitError, Transport};
use byteorder::{ByteOrder, LittleEndian};
use std::ffi::CStr;
use tracing::{debug, trace_span, warn};

/// A card connected through PC/SC.
pub struct PcscTransport {
    pub card: pcsc::Card,
    pub proto: Protocol,
    pub max_recv_size: Option<usize>,
}

impl PcscTransport {
    /// Connects to the card in `reader`. Without a preferred protocol, PC/SC picks one.
    pub fn connect(
        ctx: &pcsc::Context,
        reader: &CStr,
        preferred: Option<Protocol>,
    ) -> Result<Self> {
        let span = trace_span!("connect", ?reader, ?preferred);
        let _enter = span.enter();

        let protocols = match preferred {
            None => pcsc::Protocols::ANY,
            Some(Protocol::T0) => pcsc::Protocols::T0,
            Some(Protocol::T1) => pcsc::Protocols::T1,
            Some(Protocol::Raw) => pcsc::Protocols::RAW,
        };
        let card = ctx.connect(reader, pcsc::ShareMode::Shared, protocols)?;
        Self::wrap(card)
    }

    /// Wraps an already connected card, asking it which protocol is active.
    pub fn wrap(card: pcsc::Card) -> Result<Self> {
        let status = card.status2_owned()?;
        let proto = match status.protocol2() {
            Some(proto) => proto.into(),
            None => {
                return Err(crate::Error::UnsupportedProtocol(
                    "card reports no active protocol".into(),
                ))
            }
        };
        Ok(Self::new(card, proto))
    }

    pub fn new(card: pcsc::Card, proto: Protocol) -> Self {
        let max_recv_size = query_max_input(&card);
        debug!(%proto, ?max_recv_size, "Wrapped card");
        Self {
            card,
            proto,
            max_recv_size,
        }
    }
}

fn query_max_input(card: &pcsc::Card) -> Option<usize> {
    card.get_attribute_owned(pcsc::Attribute::Maxinput)
        .map_err(|err| {
            warn!("couldn't query reader max input size: {}", err);
            err
        })
        .ok()
        .and_then(|v| decode_max_input(&v))
}

/// The attribute is a little-endian DWORD; zero means the reader doesn't say.
fn decode_max_input(v: &[u8]) -> Option<usize> {
    Some(v)
        .filter(|v| v.len() >= 4)
        .map(|v| LittleEndian::read_u32(v) as usize)
        .filter(|&v| v > 0)
}

impl Transport for PcscTransport {
    fn protocol(&self) -> Protocol {
        self.proto
    }

    fn max_recv_size(&self) -> Option<usize> {
        self.max_recv_size
    }

    fn transmit(
        &mut self,
        _send_pci: &Pci,
        send: &[u8],
        recv_pci: &mut Pci,
        recv: &mut [u8],
    ) -> Result<usize, TransmitError> {
        // PC/SC picks the send PCI from the card's protocol by itself.
        let len = self
            .card
            .transmit2(send, recv)
            .map_err(|(error, needed)| TransmitError {
                error,
                needed: Some(needed).filter(|&n| n > 0),
            })?
            .len();
        *recv_pci = Pci::new(self.proto);
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_input_dword() {
        assert_eq!(decode_max_input(&[0x08, 0x01, 0x00, 0x00]), Some(264));
        assert_eq!(decode_max_input(&[0x0A, 0x00, 0x01, 0x00]), Some(65546));
    }

    #[test]
    fn max_input_unusable() {
        assert_eq!(decode_max_input(&[]), None);
        assert_eq!(decode_max_input(&[0x08, 0x01]), None);
        assert_eq!(decode_max_input(&[0x00, 0x00, 0x00, 0x00]), None);
    }
}
