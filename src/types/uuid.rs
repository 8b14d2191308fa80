//! UUID types.

/// A 16-bit or 128-bit UUID.
///
/// Bytes are held in little endian wire order, least significant byte first.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Uuid {
    /// 16-bit UUID
    Uuid16([u8; 2]),
    /// 128-bit UUID
    Uuid128([u8; 16]),
}

impl From<[u8; 16]> for Uuid {
    fn from(data: [u8; 16]) -> Self {
        Uuid::Uuid128(data)
    }
}

impl From<[u8; 2]> for Uuid {
    fn from(data: [u8; 2]) -> Self {
        Uuid::Uuid16(data)
    }
}

impl From<u16> for Uuid {
    fn from(data: u16) -> Self {
        Uuid::Uuid16(data.to_le_bytes())
    }
}

impl Uuid {
    /// Create a new 16-bit UUID.
    pub const fn new_short(val: u16) -> Self {
        Self::Uuid16(val.to_le_bytes())
    }

    /// Create a new 128-bit UUID.
    pub const fn new_long(val: [u8; 16]) -> Self {
        Self::Uuid128(val)
    }

    /// Parse a canonical `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` string.
    ///
    /// The textual form is big endian and gets reversed into wire order.
    /// Malformed input yields the all-zero UUID.
    pub fn parse_uuid128(uuid: &str) -> Self {
        // Offsets of the 16 hex pairs between the dashes.
        const PAIRS: [usize; 16] = [0, 2, 4, 6, 9, 11, 14, 16, 19, 21, 24, 26, 28, 30, 32, 34];
        let text = uuid.as_bytes();
        let mut bytes = [0; 16];
        if text.len() != 36 {
            warn!("[uuid] unexpected 128-bit uuid string length {}", text.len());
            return Self::Uuid128(bytes);
        }
        for (i, pos) in PAIRS.iter().enumerate() {
            match parse_hex_pair(text[*pos], text[*pos + 1]) {
                Some(value) => bytes[15 - i] = value,
                None => {
                    warn!("[uuid] malformed 128-bit uuid string");
                    return Self::Uuid128([0; 16]);
                }
            }
        }
        Self::Uuid128(bytes)
    }

    /// Parse a 4 hex digit string such as `180f`.
    ///
    /// Malformed input yields the all-zero UUID.
    pub fn parse_uuid16(uuid: &str) -> Self {
        let text = uuid.as_bytes();
        let mut bytes = [0; 2];
        if text.len() != 4 {
            warn!("[uuid] unexpected 16-bit uuid string length {}", text.len());
            return Self::Uuid16(bytes);
        }
        match (parse_hex_pair(text[0], text[1]), parse_hex_pair(text[2], text[3])) {
            (Some(high), Some(low)) => {
                bytes[0] = low;
                bytes[1] = high;
            }
            _ => {
                warn!("[uuid] malformed 16-bit uuid string");
            }
        }
        Self::Uuid16(bytes)
    }

    /// Copy the UUID bytes into a slice.
    pub fn bytes(&self, data: &mut [u8]) {
        match self {
            Uuid::Uuid16(uuid) => data.copy_from_slice(uuid),
            Uuid::Uuid128(uuid) => data.copy_from_slice(uuid),
        }
    }

    /// Get the UUID bytes in wire order.
    pub fn as_raw(&self) -> &[u8] {
        match self {
            Uuid::Uuid16(uuid) => uuid,
            Uuid::Uuid128(uuid) => uuid,
        }
    }
}

impl TryFrom<&[u8]> for Uuid {
    type Error = crate::Error;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        match value.len() {
            // Slice length has already been verified, so unwrap can be used
            2 => Ok(Uuid::Uuid16(value.try_into().unwrap())),
            16 => {
                let mut bytes = [0; 16];
                bytes.copy_from_slice(value);
                Ok(Uuid::Uuid128(bytes))
            }
            _ => Err(crate::Error::InvalidUuidLength(value.len())),
        }
    }
}

fn parse_hex_digit(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

fn parse_hex_pair(high: u8, low: u8) -> Option<u8> {
    Some((parse_hex_digit(high)? << 4) | parse_hex_digit(low)?)
}
