use crate::errors::{ApduFault, Error, Result};
use crate::iso_case::IsoCase;
use crate::protocol::Protocol;
use byteorder::{BigEndian, ByteOrder};
use std::fmt;

/// Largest Lc a short length field can carry.
pub const MAX_SHORT_LC: usize = 255;
/// Largest Lc an extended length field can carry.
pub const MAX_EXTENDED_LC: usize = 65535;

/// A command APDU, encoded according to its ISO case and the protocol it's sent over.
///
/// The length fields are never set directly: Lc follows the command data, and Le is checked
/// against the case (and protocol) whenever it changes. A stored Le of 0 means "as much as the
/// length field allows", ie. 256 for short and 65536 for extended cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandApdu {
    case: IsoCase,
    protocol: Protocol,

    /// Class- and instruction bytes. The instruction depends on the application,
    /// the class on the application and context (eg. secure messaging).
    cla: u8,
    ins: u8,

    /// Arguments to the command. Some commands use these, others just use data.
    p1: u8,
    p2: u8,

    data: Option<Vec<u8>>,
    le: usize,
}

impl CommandApdu {
    pub fn new(case: IsoCase, protocol: Protocol, cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            case,
            protocol,
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: 0,
        }
    }

    /// Decodes a raw, ISO-encoded command APDU, inferring its case from the length fields
    /// (ISO 7816-3, 12.1.3). The result is re-encoded for `protocol` when it's sent.
    ///
    /// Over T=0, extended commands degrade to short fields: an Le above 255 becomes 0 (256),
    /// and a Case4Extended Le is dropped.
    pub fn from_bytes(raw: &[u8], protocol: Protocol) -> Result<Self> {
        let (header, body) = match raw {
            [cla, ins, p1, p2, body @ ..] => ([*cla, *ins, *p1, *p2], body),
            _ => return Err(ApduFault::Malformed("shorter than the 4-byte header").into()),
        };
        let [cla, ins, p1, p2] = header;
        let cmd = |case| Self::new(case, protocol, cla, ins, p1, p2);

        let l = body.len();
        let b1 = match body.first() {
            None => return Ok(cmd(IsoCase::Case1)),
            Some(&b1) => b1 as usize,
        };
        if l == 1 {
            return cmd(IsoCase::Case2Short).with_le(b1);
        }
        if b1 != 0 && l == 1 + b1 {
            return cmd(IsoCase::Case3Short).with_data(&body[1..]);
        }
        if b1 != 0 && l == 2 + b1 {
            return cmd(IsoCase::Case4Short)
                .with_data(&body[1..l - 1])?
                .with_le(body[l - 1] as usize);
        }

        // Only extended cases left, which start with a zero byte.
        if b1 != 0 || l < 3 {
            return Err(ApduFault::Malformed("length fields don't match the body").into());
        }
        let ext = BigEndian::read_u16(&body[1..3]) as usize;
        if l == 3 {
            return cmd(IsoCase::Case2Extended).with_le(match ext {
                // T=0 only carries a short Le; the rest comes back through GET RESPONSE.
                le if protocol.is_t0() && le > MAX_SHORT_LC => 0,
                le => le,
            });
        }
        if ext == 0 {
            return Err(ApduFault::Malformed("extended Lc of zero").into());
        }
        if l == 3 + ext {
            return cmd(IsoCase::Case3Extended).with_data(&body[3..]);
        }
        if l == 5 + ext {
            let cmd = cmd(IsoCase::Case4Extended).with_data(&body[3..3 + ext])?;
            // T=0 has no Le field for this case; the card answers 61XX instead.
            if protocol.is_t0() {
                return Ok(cmd);
            }
            return cmd.with_le(BigEndian::read_u16(&body[l - 2..]) as usize);
        }
        Err(ApduFault::Malformed("length fields don't match the body").into())
    }

    pub fn case(&self) -> IsoCase {
        self.case
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn cla(&self) -> u8 {
        self.cla
    }

    pub fn ins(&self) -> u8 {
        self.ins
    }

    pub fn p1(&self) -> u8 {
        self.p1
    }

    pub fn p2(&self) -> u8 {
        self.p2
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Length of the command data; derived, never set.
    pub fn lc(&self) -> usize {
        self.data.as_ref().map_or(0, Vec::len)
    }

    pub fn le(&self) -> usize {
        self.le
    }

    pub fn with_cla(mut self, cla: u8) -> Self {
        self.cla = cla;
        self
    }

    pub fn with_ins(mut self, ins: u8) -> Self {
        self.ins = ins;
        self
    }

    pub fn with_p1(mut self, p1: u8) -> Self {
        self.p1 = p1;
        self
    }

    pub fn with_p2(mut self, p2: u8) -> Self {
        self.p2 = p2;
        self
    }

    /// Sets the command data. Only case 3 and 4 commands carry data, and it has to fit the
    /// case's Lc field.
    pub fn with_data<D: Into<Vec<u8>>>(mut self, data: D) -> Result<Self> {
        let data = data.into();
        if let Err(fault) = self.check_data(data.len()) {
            return Err(Error::invalid_apdu(fault, &self));
        }
        self.data = Some(data);
        Ok(self)
    }

    /// Sets the expected response length. Only case 2 and 4 commands carry an Le field.
    pub fn with_le(mut self, le: usize) -> Result<Self> {
        if let Err(fault) = self.check_le(le) {
            return Err(Error::invalid_apdu(fault, &self));
        }
        self.le = le;
        Ok(self)
    }

    /// Moves the command to another protocol, re-checking data and Le against it.
    pub fn with_protocol(mut self, protocol: Protocol) -> Result<Self> {
        let prev = std::mem::replace(&mut self.protocol, protocol);
        let check = match &self.data {
            Some(data) => self.check_data(data.len()),
            None => Ok(()),
        }
        .and_then(|_| match self.le {
            0 => Ok(()),
            le => self.check_le(le),
        });
        match check {
            Ok(()) => Ok(self),
            Err(fault) => {
                self.protocol = prev;
                Err(Error::invalid_apdu(fault, &self))
            }
        }
    }

    /// Number of bytes the card may answer with, including SW1 and SW2.
    pub fn expected_response_length(&self) -> usize {
        if !self.case.expects_response() {
            return 2;
        }
        match self.le {
            0 => self.le_limit() + 2,
            le => le + 2,
        }
    }

    /// Sets Le so that the card may answer with `total` bytes, including SW1 and SW2.
    pub fn with_expected_response_length(self, total: usize) -> Result<Self> {
        let le = total.saturating_sub(2);
        if le == self.le_limit() {
            self.with_le(0)
        } else {
            self.with_le(le)
        }
    }

    /// Whether this command's Le can be changed at all.
    pub fn accepts_le(&self) -> bool {
        self.case.expects_response() && !self.le_unsupported()
    }

    /// Computes the encoded length without encoding anything.
    pub fn encoded_len(&self) -> Result<usize> {
        Ok(self.layout()?.len)
    }

    pub fn is_valid(&self) -> bool {
        self.layout().is_ok()
    }

    /// Encodes the command into `buf`, returning the number of bytes written.
    pub fn write(&self, buf: &mut [u8]) -> Result<usize> {
        let layout = self.layout()?;
        let buf = buf
            .get_mut(..layout.len)
            .ok_or(ApduFault::Malformed("write buffer too small"))?;

        let t0 = self.protocol.is_t0();
        let mut w = Writer { buf, at: 0 };
        w.bytes(&[self.cla, self.ins, self.p1, self.p2]);
        match self.case {
            IsoCase::Case1 => {
                // T=0 always sends a P3 byte.
                if t0 {
                    w.u8(0x00);
                }
            }
            IsoCase::Case2Short => w.u8(self.le as u8),
            IsoCase::Case3Short => {
                w.u8(layout.lc as u8);
                w.bytes(self.data().unwrap_or_default());
            }
            IsoCase::Case4Short => {
                w.u8(layout.lc as u8);
                w.bytes(self.data().unwrap_or_default());
                if !t0 {
                    w.u8(self.le as u8);
                }
            }
            IsoCase::Case2Extended if t0 => w.u8(self.le as u8),
            IsoCase::Case2Extended => {
                w.u8(0x00);
                w.u16(self.le as u16);
            }
            IsoCase::Case3Extended | IsoCase::Case4Extended if t0 => {
                w.u8(layout.lc as u8);
                w.bytes(self.data().unwrap_or_default());
            }
            IsoCase::Case3Extended => {
                w.u8(0x00);
                w.u16(layout.lc as u16);
                w.bytes(self.data().unwrap_or_default());
            }
            IsoCase::Case4Extended => {
                w.u8(0x00);
                w.u16(layout.lc as u16);
                w.bytes(self.data().unwrap_or_default());
                w.u16(self.le as u16);
            }
        }
        Ok(w.at)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0; self.encoded_len()?];
        let len = self.write(&mut buf)?;
        buf.truncate(len);
        Ok(buf)
    }

    fn layout(&self) -> Result<Layout, ApduFault> {
        let lc = match (&self.data, self.case.has_data()) {
            (Some(data), true) => {
                self.check_data(data.len())?;
                data.len()
            }
            (None, true) => return Err(ApduFault::DataRequired(self.case)),
            (_, false) => 0,
        };
        let t0 = self.protocol.is_t0();
        let fields = match self.case {
            IsoCase::Case1 if t0 => 1,
            IsoCase::Case1 => 0,
            IsoCase::Case2Short => 1,
            IsoCase::Case3Short => 1 + lc,
            IsoCase::Case4Short if t0 => 1 + lc,
            IsoCase::Case4Short => 1 + lc + 1,
            IsoCase::Case2Extended if t0 => 1,
            IsoCase::Case2Extended => 3,
            IsoCase::Case3Extended | IsoCase::Case4Extended if t0 => 1 + lc,
            IsoCase::Case3Extended => 3 + lc,
            IsoCase::Case4Extended => 3 + lc + 2,
        };
        Ok(Layout {
            lc,
            len: 4 + fields,
        })
    }

    fn check_data(&self, len: usize) -> Result<(), ApduFault> {
        if !self.case.has_data() {
            return Err(ApduFault::DataNotAllowed(self.case));
        }
        if len == 0 {
            return Err(ApduFault::EmptyData);
        }
        let max = self.data_limit();
        if len > max {
            return Err(ApduFault::DataTooLong {
                len,
                max,
                case: self.case,
            });
        }
        Ok(())
    }

    fn check_le(&self, le: usize) -> Result<(), ApduFault> {
        if !self.case.expects_response() {
            return Err(ApduFault::LeNotAllowed(self.case));
        }
        if self.le_unsupported() {
            return Err(ApduFault::LeUnsupported(self.case, self.protocol));
        }
        let max = self.le_limit() - 1;
        if le > max {
            return Err(ApduFault::LeOutOfRange {
                le,
                max,
                case: self.case,
            });
        }
        Ok(())
    }

    // T=0 sends extended cases with short length fields.
    fn short_fields(&self) -> bool {
        !self.case.is_extended() || self.protocol.is_t0()
    }

    fn le_unsupported(&self) -> bool {
        self.case == IsoCase::Case4Extended && self.protocol.is_t0()
    }

    fn data_limit(&self) -> usize {
        if self.short_fields() {
            MAX_SHORT_LC
        } else {
            MAX_EXTENDED_LC
        }
    }

    /// The Le that a zero in the length field stands for.
    fn le_limit(&self) -> usize {
        if self.short_fields() {
            256
        } else {
            65536
        }
    }
}

impl fmt::Display for CommandApdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CLA={:02X} INS={:02X} P1={:02X} P2={:02X} Lc={} Le={} ({}, {})",
            self.cla,
            self.ins,
            self.p1,
            self.p2,
            self.lc(),
            self.le,
            self.case,
            self.protocol
        )
    }
}

struct Layout {
    lc: usize,
    len: usize,
}

struct Writer<'a> {
    buf: &'a mut [u8],
    at: usize,
}

impl Writer<'_> {
    fn u8(&mut self, v: u8) {
        self.buf[self.at] = v;
        self.at += 1;
    }

    fn u16(&mut self, v: u16) {
        BigEndian::write_u16(&mut self.buf[self.at..self.at + 2], v);
        self.at += 2;
    }

    fn bytes(&mut self, v: &[u8]) {
        self.buf[self.at..self.at + v.len()].copy_from_slice(v);
        self.at += v.len();
    }
}
