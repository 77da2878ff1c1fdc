use std::time::Duration;

/// Default cap on GET RESPONSE exchanges per transmit. Enough for a 64K response in
/// 16-byte pieces.
pub const DEFAULT_MAX_CHAIN_LEN: usize = 4096;

/// Tunables for the transmission engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmitConfig {
    /// Sleep before every retry or continuation exchange. Always the same duration; this is
    /// not a backoff.
    pub retransmit_wait: Option<Duration>,

    /// Largest response (status word included) to ask for in a GET RESPONSE. Falls back to
    /// what the transport says the reader can take.
    pub max_recv_size: Option<usize>,

    /// Most GET RESPONSE exchanges a single transmit may chain before giving up with
    /// `Error::ChainTooLong`. `None` lets a card chain forever.
    pub max_chain_len: Option<usize>,
}

impl Default for TransmitConfig {
    fn default() -> Self {
        Self {
            retransmit_wait: None,
            max_recv_size: None,
            max_chain_len: Some(DEFAULT_MAX_CHAIN_LEN),
        }
    }
}

impl TransmitConfig {
    pub fn with_retransmit_wait(mut self, wait: Duration) -> Self {
        self.retransmit_wait = Some(wait).filter(|w| !w.is_zero());
        self
    }

    pub fn with_max_recv_size(mut self, size: usize) -> Self {
        self.max_recv_size = Some(size);
        self
    }

    pub fn with_max_chain_len(mut self, len: Option<usize>) -> Self {
        self.max_chain_len = len;
        self
    }
}
