//! ISO 7816-4 APDU transmission.
//!
//! Build a [`CommandApdu`] for one of the seven ISO cases, hand it to a [`Card`], and get back
//! a [`Response`] holding every response APDU the card sent for it. The card takes care of
//! receive buffers that turn out too small, wrong Le values (0x6CXX) and GET RESPONSE
//! chaining (0x61XX); any other status word is left for the caller to interpret.

pub mod card;
pub mod command;
pub mod config;
pub mod errors;
pub mod iso7816;
pub mod iso_case;
pub mod protocol;
pub mod response;
pub mod response_apdu;
pub mod status;
pub mod transport;

pub use card::Card;
pub use command::CommandApdu;
pub use config::TransmitConfig;
pub use errors::{ApduFault, Error, Result};
pub use iso_case::IsoCase;
pub use protocol::Protocol;
pub use response::Response;
pub use response_apdu::ResponseApdu;
pub use status::Status;
pub use transport::{Pci, PcscTransport, Transport};
