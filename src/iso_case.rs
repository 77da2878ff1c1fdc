use std::fmt;

/// The seven command shapes of ISO 7816-4, 5.1.
///
/// Cases 3 and 4 carry command data, cases 2 and 4 expect response data. Short cases encode
/// their length fields in one byte, extended cases in two (plus a leading zero byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsoCase {
    /// No command data, no response data.
    Case1,
    /// No command data, response data of up to 256 bytes.
    Case2Short,
    /// Up to 255 bytes of command data, no response data.
    Case3Short,
    /// Up to 255 bytes of command data, up to 256 bytes of response data.
    Case4Short,
    /// No command data, response data of up to 65536 bytes.
    Case2Extended,
    /// Up to 65535 bytes of command data, no response data.
    Case3Extended,
    /// Up to 65535 bytes of command data, up to 65536 bytes of response data.
    Case4Extended,
}

impl IsoCase {
    pub fn is_extended(self) -> bool {
        matches!(
            self,
            Self::Case2Extended | Self::Case3Extended | Self::Case4Extended
        )
    }

    /// Whether the case carries Lc and command data.
    pub fn has_data(self) -> bool {
        matches!(
            self,
            Self::Case3Short | Self::Case3Extended | Self::Case4Short | Self::Case4Extended
        )
    }

    /// Whether the case carries an Le field.
    pub fn expects_response(self) -> bool {
        matches!(
            self,
            Self::Case2Short | Self::Case2Extended | Self::Case4Short | Self::Case4Extended
        )
    }
}

impl fmt::Display for IsoCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
