use crate::protocol::Protocol;
use crate::transport::{Pci, TransmitError, Transport};
use std::collections::VecDeque;

/// A scripted card reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Response bytes, status word included.
    Data(Vec<u8>),
    /// A transport failure.
    Fail(pcsc::Error),
}

/// Mock transport for unit tests. It records sent frames and returns queued replies.
///
/// A queued reply that doesn't fit the offered receive buffer stays queued, and the exchange
/// fails with `InsufficientBuffer` along with the size it needs, like PC/SC does.
#[derive(Debug, Default)]
pub struct MockTransport {
    pub protocol: Protocol,
    pub max_recv_size: Option<usize>,
    pub replies: VecDeque<Reply>,
    /// Every frame handed to `transmit`, including ones that failed.
    pub sent: Vec<Vec<u8>>,
    /// Size of the receive buffer offered with each frame.
    pub recv_sizes: Vec<usize>,
}

impl MockTransport {
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            ..Default::default()
        }
    }

    pub fn with_max_recv_size(mut self, size: usize) -> Self {
        self.max_recv_size = Some(size);
        self
    }

    pub fn push_response<D: Into<Vec<u8>>>(&mut self, resp: D) {
        self.replies.push_back(Reply::Data(resp.into()));
    }

    /// Queues `data` followed by the status word.
    pub fn push_sw(&mut self, data: &[u8], sw1: u8, sw2: u8) {
        let mut resp = data.to_vec();
        resp.extend_from_slice(&[sw1, sw2]);
        self.push_response(resp);
    }

    pub fn push_failure(&mut self, error: pcsc::Error) {
        self.replies.push_back(Reply::Fail(error));
    }
}

impl Transport for MockTransport {
    fn protocol(&self) -> Protocol {
        self.protocol
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
        self.sent.push(send.to_vec());
        self.recv_sizes.push(recv.len());

        match self.replies.pop_front() {
            None => Err(pcsc::Error::RemovedCard.into()),
            Some(Reply::Fail(error)) => Err(error.into()),
            Some(Reply::Data(data)) if data.len() > recv.len() => {
                let needed = data.len();
                self.replies.push_front(Reply::Data(data));
                Err(TransmitError::insufficient_buffer(needed))
            }
            Some(Reply::Data(data)) => {
                recv[..data.len()].copy_from_slice(&data);
                *recv_pci = Pci::new(self.protocol);
                Ok(data.len())
            }
        }
    }
}
