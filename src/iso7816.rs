//! Interindustry (ISO 7816-4) command building blocks: the class byte, instruction codes, and
//! the GET RESPONSE command used for response chaining.

use crate::command::CommandApdu;
use crate::errors::Result;
use crate::iso_case::IsoCase;
use crate::protocol::Protocol;
use num_enum::{FromPrimitive, IntoPrimitive};

/// Instruction byte (INS) of interindustry commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum Instruction {
    Deactivate = 0x04,
    EraseRecord = 0x0C,
    EraseBinary = 0x0E,
    PerformScqlOperation = 0x10,
    PerformTransactionOperation = 0x12,
    PerformUserOperation = 0x14,
    Verify = 0x20,
    ManageSecurityEnvironment = 0x22,
    ChangeReferenceData = 0x24,
    DisableVerificationRequirement = 0x26,
    EnableVerificationRequirement = 0x28,
    PerformSecurityOperation = 0x2A,
    ResetRetryCounter = 0x2C,
    Activate = 0x44,
    GenerateAsymmetricKeyPair = 0x46,
    ManageChannel = 0x70,
    ExternalAuthenticate = 0x82,
    GetChallenge = 0x84,
    GeneralAuthenticate = 0x86,
    InternalAuthenticate = 0x88,
    SearchBinary = 0xA0,
    SearchRecord = 0xA2,
    Select = 0xA4,
    ReadBinary = 0xB0,
    ReadRecord = 0xB2,
    GetResponse = 0xC0,
    Envelope = 0xC2,
    GetData = 0xCA,
    WriteBinary = 0xD0,
    WriteRecord = 0xD2,
    UpdateBinary = 0xD6,
    PutData = 0xDA,
    UpdateRecord = 0xDC,
    CreateFile = 0xE0,
    AppendRecord = 0xE2,
    DeleteFile = 0xE4,
    TerminateDf = 0xE6,
    TerminateEf = 0xE8,
    TerminateCardUsage = 0xFE,

    /// Proprietary or unknown.
    #[num_enum(catch_all)]
    Other(u8),
}

/// Class byte (CLA).
///
/// First interindustry classes (`000x xxxx`) carry the command chaining bit, two bits of
/// secure messaging indication and logical channels 0-3. Further interindustry classes
/// (`01xx xxxx`) carry the chaining bit, one secure messaging bit and logical channels 4-19.
/// Everything with the top bit set is proprietary, except the invalid 0xFF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClassByte(u8);

impl ClassByte {
    const CHAINING: u8 = 0b0001_0000;

    pub fn new(v: u8) -> Self {
        Self(v)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_first_interindustry(self) -> bool {
        self.0 & 0b1110_0000 == 0
    }

    pub fn is_further_interindustry(self) -> bool {
        self.0 & 0b1100_0000 == 0b0100_0000
    }

    pub fn is_interindustry(self) -> bool {
        self.is_first_interindustry() || self.is_further_interindustry()
    }

    pub fn is_valid(self) -> bool {
        self.0 != 0xFF
    }

    /// "The command is not the last command of a chain."
    pub fn is_chained(self) -> bool {
        self.is_interindustry() && self.0 & Self::CHAINING != 0
    }

    /// Secure messaging indication: bits 4-3 for first interindustry classes, bit 6 for
    /// further ones (reported as 0b10, "proprietary SM format, header not processed").
    pub fn secure_messaging(self) -> Option<u8> {
        if self.is_first_interindustry() {
            Some((self.0 >> 2) & 0b11)
        } else if self.is_further_interindustry() {
            Some(if self.0 & 0b0010_0000 != 0 { 0b10 } else { 0 })
        } else {
            None
        }
    }

    pub fn logical_channel(self) -> Option<u8> {
        if self.is_first_interindustry() {
            Some(self.0 & 0b11)
        } else if self.is_further_interindustry() {
            Some(4 + (self.0 & 0b1111))
        } else {
            None
        }
    }

    pub fn with_chaining(self, chained: bool) -> Self {
        match chained {
            true => Self(self.0 | Self::CHAINING),
            false => Self(self.0 & !Self::CHAINING),
        }
    }

    /// Re-targets an interindustry class at another logical channel (0-19), switching
    /// between the first and further class encodings as needed. Secure messaging is dropped
    /// when switching encodings.
    pub fn with_channel(self, channel: u8) -> Option<Self> {
        if !self.is_interindustry() || channel > 19 {
            return None;
        }
        let chaining = self.0 & Self::CHAINING;
        Some(match channel {
            0..=3 if self.is_first_interindustry() => Self(self.0 & !0b11 | channel),
            0..=3 => Self(chaining | channel),
            _ if self.is_further_interindustry() => Self(self.0 & !0b1111 | (channel - 4)),
            _ => Self(0b0100_0000 | chaining | (channel - 4)),
        })
    }
}

impl From<u8> for ClassByte {
    fn from(v: u8) -> Self {
        Self(v)
    }
}

impl From<ClassByte> for u8 {
    fn from(v: ClassByte) -> Self {
        v.0
    }
}

/// GET RESPONSE: fetches response data the card couldn't return in the previous exchange.
///
/// This is always a Case2Short command, whatever the case of the command it continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetResponse {
    /// 1-256; 256 is encoded as 0x00.
    pub le: usize,
}

impl GetResponse {
    pub fn new(le: usize) -> Self {
        Self { le }
    }

    pub fn command(&self, protocol: Protocol) -> Result<CommandApdu> {
        CommandApdu::new(
            IsoCase::Case2Short,
            protocol,
            0x00,
            Instruction::GetResponse.into(),
            0x00,
            0x00,
        )
        .with_expected_response_length(self.le + 2)
    }
}
