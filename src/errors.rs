use crate::command::CommandApdu;
use crate::iso_case::IsoCase;
use crate::protocol::Protocol;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The command can't be encoded in its current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(#[from] ApduFault),

    /// A command APDU broke the rules of its ISO case.
    #[error("invalid APDU [{apdu}]: {fault}")]
    InvalidApdu {
        #[source]
        fault: ApduFault,
        apdu: Box<CommandApdu>,
    },

    /// A response APDU too short to carry SW1 and SW2.
    #[error("invalid response APDU: {len} bytes, need at least 2")]
    InvalidResponse { len: usize },

    #[error("response contains no APDUs")]
    EmptyResponse,

    /// The card kept answering 61XX past the configured number of GET RESPONSEs.
    #[error("card is still sending data after {limit} GET RESPONSE commands")]
    ChainTooLong { limit: usize },

    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error(transparent)]
    Transport(#[from] pcsc::Error),
}

impl Error {
    pub(crate) fn invalid_apdu(fault: ApduFault, apdu: &CommandApdu) -> Self {
        Self::InvalidApdu {
            fault,
            apdu: Box::new(apdu.clone()),
        }
    }
}

/// The encoding rule a command APDU violates.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApduFault {
    #[error("{0} requires command data, but none was set")]
    DataRequired(IsoCase),
    #[error("{0} does not carry command data")]
    DataNotAllowed(IsoCase),
    #[error("command data must not be empty")]
    EmptyData,
    #[error("command data is too long: {len} bytes, {case} allows {max}")]
    DataTooLong { len: usize, max: usize, case: IsoCase },
    #[error("{0} does not carry an Le field")]
    LeNotAllowed(IsoCase),
    #[error("Le out of range: {le}, {case} allows 0..={max}")]
    LeOutOfRange { le: usize, max: usize, case: IsoCase },
    #[error("{0} can't expect response data over {1}, use GET RESPONSE")]
    LeUnsupported(IsoCase, Protocol),
    #[error("malformed command APDU: {0}")]
    Malformed(&'static str),
}
