use core::{fmt, num::ParseIntError, str::FromStr};

/// A 64-bit account identifier using a Snowflake layout.
///
/// - 1 bit reserved (always zero, keeps the value positive as a signed `i64`)
/// - 41 bits timestamp (ms since [`KEYGATE_EPOCH`])
/// - 10 bits node ID
/// - 12 bits sequence
///
/// ```text
///  Bit Index:  63           63 62            22 21          12 11             0
///              +--------------+----------------+--------------+---------------+
///  Field:      | reserved (1) | timestamp (41) | node ID (10) | sequence (12) |
///              +--------------+----------------+--------------+---------------+
///              |<----------- MSB ---------- 64 bits --------- LSB ----------->|
/// ```
///
/// The derived ordering compares the raw value, which is the same as
/// comparing `(timestamp, node_id, sequence)` lexicographically.
///
/// [`KEYGATE_EPOCH`]: crate::KEYGATE_EPOCH
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnowflakeId {
    id: u64,
}

impl SnowflakeId {
    /// Bitmask for extracting the 41-bit timestamp field. Occupies bits 22
    /// through 62.
    pub const TIMESTAMP_MASK: u64 = (1 << 41) - 1;

    /// Bitmask for extracting the 10-bit node ID field. Occupies bits 12
    /// through 21.
    pub const NODE_ID_MASK: u64 = (1 << 10) - 1;

    /// Bitmask for extracting the 12-bit sequence field. Occupies bits 0
    /// through 11.
    pub const SEQUENCE_MASK: u64 = (1 << 12) - 1;

    /// Number of bits to shift the timestamp to its correct position (bit 22).
    pub const TIMESTAMP_SHIFT: u64 = 22;

    /// Number of bits to shift the node ID to its correct position (bit 12).
    pub const NODE_ID_SHIFT: u64 = 12;

    /// Number of bits to shift the sequence field (bit 0).
    pub const SEQUENCE_SHIFT: u64 = 0;

    /// Largest node ID that fits the layout.
    pub const MAX_NODE_ID: u64 = Self::NODE_ID_MASK;

    /// Largest sequence value within one millisecond.
    pub const MAX_SEQUENCE: u64 = Self::SEQUENCE_MASK;

    pub const fn from_components(timestamp: u64, node_id: u64, sequence: u64) -> Self {
        let timestamp = (timestamp & Self::TIMESTAMP_MASK) << Self::TIMESTAMP_SHIFT;
        let node_id = (node_id & Self::NODE_ID_MASK) << Self::NODE_ID_SHIFT;
        let sequence = (sequence & Self::SEQUENCE_MASK) << Self::SEQUENCE_SHIFT;
        Self {
            id: timestamp | node_id | sequence,
        }
    }

    /// Extracts the timestamp from the packed ID.
    pub const fn timestamp(&self) -> u64 {
        (self.id >> Self::TIMESTAMP_SHIFT) & Self::TIMESTAMP_MASK
    }

    /// Extracts the node ID from the packed ID.
    pub const fn node_id(&self) -> u64 {
        (self.id >> Self::NODE_ID_SHIFT) & Self::NODE_ID_MASK
    }

    /// Extracts the sequence number from the packed ID.
    pub const fn sequence(&self) -> u64 {
        (self.id >> Self::SEQUENCE_SHIFT) & Self::SEQUENCE_MASK
    }

    pub const fn to_raw(&self) -> u64 {
        self.id
    }

    /// Reinterprets a raw value. The reserved bit is cleared.
    pub const fn from_raw(raw: u64) -> Self {
        Self {
            id: raw & !(1 << 63),
        }
    }

    /// Returns true if the current sequence value can be incremented.
    pub const fn has_sequence_room(&self) -> bool {
        self.sequence() < Self::MAX_SEQUENCE
    }

    /// Returns a new ID with the sequence incremented.
    pub const fn increment_sequence(&self) -> Self {
        Self::from_components(self.timestamp(), self.node_id(), self.sequence() + 1)
    }

    /// Returns a new ID for a newer timestamp with sequence reset to zero.
    pub const fn rollover_to_timestamp(&self, ts: u64) -> Self {
        Self::from_components(ts, self.node_id(), 0)
    }
}

impl fmt::Display for SnowflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl fmt::Debug for SnowflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnowflakeId")
            .field("raw", &self.id)
            .field("timestamp", &self.timestamp())
            .field("node_id", &self.node_id())
            .field("sequence", &self.sequence())
            .finish()
    }
}

/// Parses the base-10 wire form produced by [`fmt::Display`].
impl FromStr for SnowflakeId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Self::from_raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn components_round_trip_through_layout() {
        let id = SnowflakeId::from_components(1_000, 1, 7);
        assert_eq!(id.timestamp(), 1_000);
        assert_eq!(id.node_id(), 1);
        assert_eq!(id.sequence(), 7);
        assert_eq!(id.to_raw(), (1_000 << 22) | (1 << 12) | 7);
    }

    #[test]
    fn reserved_bit_is_never_set() {
        let id = SnowflakeId::from_components(u64::MAX, u64::MAX, u64::MAX);
        assert_eq!(id.to_raw() >> 63, 0);
        assert!(i64::try_from(id.to_raw()).is_ok());
        assert_eq!(SnowflakeId::from_raw(u64::MAX).to_raw() >> 63, 0);
    }

    #[test]
    fn ordering_follows_timestamp_then_sequence() {
        let a = SnowflakeId::from_components(10, 3, SnowflakeId::MAX_SEQUENCE);
        let b = SnowflakeId::from_components(11, 3, 0);
        let c = b.increment_sequence();
        assert!(a < b && b < c);
    }

    #[test]
    fn display_parses_back() {
        let id = SnowflakeId::from_components(123_456, 9, 42);
        let text = id.to_string();
        assert!(text.bytes().all(|b| b.is_ascii_digit()));
        assert_eq!(text.parse::<SnowflakeId>().unwrap(), id);
        assert!("not-a-number".parse::<SnowflakeId>().is_err());
    }

    #[test]
    fn rollover_resets_sequence() {
        let id = SnowflakeId::from_components(5, 2, 17).rollover_to_timestamp(6);
        assert_eq!(id.timestamp(), 6);
        assert_eq!(id.node_id(), 2);
        assert_eq!(id.sequence(), 0);
    }
}
