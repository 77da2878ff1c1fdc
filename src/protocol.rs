use std::fmt;

/// Abstraction around smartcard wire protocols.
///
/// Only T=0 changes how a command APDU is laid out on the wire; T=1 and raw exchanges use
/// the plain ISO 7816-4 encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Protocol {
    T0,
    #[default]
    T1,
    Raw,
}

impl Protocol {
    pub fn is_t0(self) -> bool {
        self == Self::T0
    }
}

impl From<pcsc::Protocol> for Protocol {
    fn from(v: pcsc::Protocol) -> Self {
        match v {
            pcsc::Protocol::T0 => Self::T0,
            pcsc::Protocol::T1 => Self::T1,
            pcsc::Protocol::RAW => Self::Raw,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::T0 => "T=0",
            Self::T1 => "T=1",
            Self::Raw => "RAW",
        })
    }
}

impl std::str::FromStr for Protocol {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "T0" | "T=0" => Ok(Self::T0),
            "T1" | "T=1" => Ok(Self::T1),
            "RAW" => Ok(Self::Raw),
            _ => Err(crate::Error::UnsupportedProtocol(s.into())),
        }
    }
}
