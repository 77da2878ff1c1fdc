use std::fmt;

/// A classified status word (SW1, SW2), per ISO 7816-4, 5.6.
///
/// This is informational only: the transmission engine acts on the raw bytes and never
/// turns a status into an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// 0x9000: OK. Any other 0x90XX is RFU and will be parsed as Unknown(0x90, xx).
    OK,

    /// 0x61XX: Issue a GET RESPONSE with Le=xx to fetch the rest of the response.
    BytesRemaining(u8),

    /// 0x6CXX: Wrong Le; retry the command with Le=xx.
    WrongLe(u8),

    /// 0x6200: State of non-volatile memory unchanged; no information given.
    NvUnchanged,
    /// 0x6281: Part of the returned data may be corrupted.
    DataCorrupted,
    /// 0x6282: End of file or record reached before reading Le bytes.
    EndOfFile,
    /// 0x6283: Selected file deactivated.
    FileDeactivated,

    /// 0x6300: State of non-volatile memory changed; authentication failed.
    AuthenticationFailed,
    /// 0x63CX: State of non-volatile memory changed; counter provided by 'x' (0-15).
    Counter(u8),

    /// 0x6581: Memory failure.
    MemoryFailure,
    /// 0x6700: Wrong length; no further indication.
    WrongLength,
    /// 0x6881: Logical channel not supported.
    ChannelNotSupported,
    /// 0x6882: Secure messaging not supported.
    SecureMessagingNotSupported,
    /// 0x6884: Command chaining not supported.
    ChainingNotSupported,

    /// 0x6982: Security status not satisfied.
    SecurityNotSatisfied,
    /// 0x6983: Authentication method blocked.
    AuthMethodBlocked,
    /// 0x6984: Reference data not usable.
    DataInvalidated,
    /// 0x6985: Conditions of use not satisfied.
    ConditionsOfUse,
    /// 0x6986: Command not allowed (no current EF).
    CommandNotAllowed,

    /// 0x6A80: Incorrect parameters in the command data field.
    WrongData,
    /// 0x6A81: Function not supported.
    FunctionNotSupported,
    /// 0x6A82: File or application not found.
    FileNotFound,
    /// 0x6A83: Record not found.
    RecordNotFound,
    /// 0x6A84: Not enough memory space in the file.
    NotEnoughMemory,
    /// 0x6A86: Incorrect parameters P1-P2.
    WrongP1P2,
    /// 0x6A88: Referenced data or reference data not found.
    DataNotFound,

    /// 0x6B00: Wrong parameters P1-P2.
    WrongParameters,
    /// 0x6D00: Instruction code not supported or invalid.
    InsNotSupported,
    /// 0x6E00: Class not supported.
    ClaNotSupported,
    /// 0x6F00: No precise diagnosis.
    NoDiagnosis,

    /// We've encountered something we don't understand.
    Unknown(u8, u8),
}

impl Status {
    pub fn from(sw1: u8, sw2: u8) -> Self {
        match (sw1, sw2) {
            (0x90, 0x00) => Self::OK,
            (0x61, xx) => Self::BytesRemaining(xx),
            (0x6C, xx) => Self::WrongLe(xx),
            (0x62, 0x00) => Self::NvUnchanged,
            (0x62, 0x81) => Self::DataCorrupted,
            (0x62, 0x82) => Self::EndOfFile,
            (0x62, 0x83) => Self::FileDeactivated,
            (0x63, 0x00) => Self::AuthenticationFailed,
            (0x63, xx) if xx & 0xF0 == 0xC0 => Self::Counter(xx & 0x0F),
            (0x65, 0x81) => Self::MemoryFailure,
            (0x67, 0x00) => Self::WrongLength,
            (0x68, 0x81) => Self::ChannelNotSupported,
            (0x68, 0x82) => Self::SecureMessagingNotSupported,
            (0x68, 0x84) => Self::ChainingNotSupported,
            (0x69, 0x82) => Self::SecurityNotSatisfied,
            (0x69, 0x83) => Self::AuthMethodBlocked,
            (0x69, 0x84) => Self::DataInvalidated,
            (0x69, 0x85) => Self::ConditionsOfUse,
            (0x69, 0x86) => Self::CommandNotAllowed,
            (0x6A, 0x80) => Self::WrongData,
            (0x6A, 0x81) => Self::FunctionNotSupported,
            (0x6A, 0x82) => Self::FileNotFound,
            (0x6A, 0x83) => Self::RecordNotFound,
            (0x6A, 0x84) => Self::NotEnoughMemory,
            (0x6A, 0x86) => Self::WrongP1P2,
            (0x6A, 0x88) => Self::DataNotFound,
            (0x6B, 0x00) => Self::WrongParameters,
            (0x6D, 0x00) => Self::InsNotSupported,
            (0x6E, 0x00) => Self::ClaNotSupported,
            (0x6F, 0x00) => Self::NoDiagnosis,
            (x, y) => Self::Unknown(x, y),
        }
    }

    pub fn from_word(sw: u16) -> Self {
        Self::from((sw >> 8) as u8, sw as u8)
    }

    /// Normal processing: 0x9000 and 0x61XX.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::OK | Self::BytesRemaining(_))
            || matches!(self, Self::Unknown(0x90, _))
    }

    /// Warning processing: SW1 is 0x62 or 0x63.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Self::NvUnchanged
                | Self::DataCorrupted
                | Self::EndOfFile
                | Self::FileDeactivated
                | Self::AuthenticationFailed
                | Self::Counter(_)
                | Self::Unknown(0x62 | 0x63, _)
        )
    }

    pub fn is_error(&self) -> bool {
        !self.is_success() && !self.is_warning()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BytesRemaining(n) => write!(f, "{} bytes remaining", n),
            Self::WrongLe(n) => write!(f, "wrong Le, expected {}", n),
            Self::Counter(n) => write!(f, "counter: {}", n),
            Self::Unknown(sw1, sw2) => write!(f, "unknown status {:02X}{:02X}", sw1, sw2),
            v => fmt::Debug::fmt(v, f),
        }
    }
}
