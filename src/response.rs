use crate::errors::{Error, Result};
use crate::response_apdu::ResponseApdu;
use crate::status::Status;
use crate::transport::Pci;
use std::ops::Index;

/// The outcome of one logical transmit: every response APDU the card sent, in order.
///
/// GET RESPONSE chaining produces more than one fragment. The status word is the one of the
/// last fragment, while the data is the concatenation of all of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    apdus: Vec<ResponseApdu>,
    pcis: Vec<Pci>,
}

impl Response {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, apdu: ResponseApdu, pci: Pci) {
        self.apdus.push(apdu);
        self.pcis.push(pci);
    }

    pub fn len(&self) -> usize {
        self.apdus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apdus.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&ResponseApdu> {
        self.apdus.get(i)
    }

    pub fn pci(&self, i: usize) -> Option<&Pci> {
        self.pcis.get(i)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResponseApdu> {
        self.apdus.iter()
    }

    pub fn last(&self) -> Result<&ResponseApdu> {
        self.apdus.last().ok_or(Error::EmptyResponse)
    }

    pub fn sw1(&self) -> Result<u8> {
        self.last()?.sw1()
    }

    pub fn sw2(&self) -> Result<u8> {
        self.last()?.sw2()
    }

    pub fn status_word(&self) -> Result<u16> {
        self.last()?.status_word()
    }

    pub fn status(&self) -> Result<Status> {
        self.last()?.status()
    }

    pub fn has_data(&self) -> bool {
        self.apdus.iter().any(ResponseApdu::has_data)
    }

    /// The data of every fragment, concatenated; `None` if none of them carried any.
    pub fn data(&self) -> Option<Vec<u8>> {
        if !self.has_data() {
            return None;
        }
        let len = self.apdus.iter().map(ResponseApdu::data_size).sum();
        let mut data = Vec::with_capacity(len);
        for apdu in &self.apdus {
            data.extend_from_slice(apdu.data().unwrap_or_default());
        }
        Some(data)
    }
}

impl Index<usize> for Response {
    type Output = ResponseApdu;

    fn index(&self, i: usize) -> &Self::Output {
        &self.apdus[i]
    }
}

impl<'a> IntoIterator for &'a Response {
    type Item = &'a ResponseApdu;
    type IntoIter = std::slice::Iter<'a, ResponseApdu>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
