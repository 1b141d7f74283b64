//! Packed data locations.
//!
//! A location is a u64 with the file ordinal in the high 32 bits and the
//! byte offset in the low 32 bits. Ordinals are 1-based; ordinal 0 is
//! reserved, so the whole value 0 can serve as the "no item" sentinel.

use crate::constants::NON_EXISTENT_LOCATION;

/// Pack a file ordinal and byte offset into a location
pub fn pack_location(ordinal: u32, offset: u32) -> u64 {
    ((ordinal as u64) << 32) | offset as u64
}

/// File ordinal part of a location
pub fn file_ordinal(location: u64) -> u32 {
    (location >> 32) as u32
}

/// Byte offset part of a location
pub fn byte_offset(location: u64) -> u32 {
    location as u32
}

/// Render a location for log messages
pub fn location_to_string(location: u64) -> String {
    if location == NON_EXISTENT_LOCATION {
        "NON_EXISTENT".to_string()
    } else {
        format!("{}@{}", file_ordinal(location), byte_offset(location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_and_split() {
        let loc = pack_location(7, 4096);
        assert_eq!(file_ordinal(loc), 7);
        assert_eq!(byte_offset(loc), 4096);

        let max = pack_location(u32::MAX, u32::MAX);
        assert_eq!(file_ordinal(max), u32::MAX);
        assert_eq!(byte_offset(max), u32::MAX);
    }

    #[test]
    fn test_sentinel_is_unreachable_by_real_files() {
        // Ordinals start at 1, so no real item packs to 0
        assert_ne!(pack_location(1, 0), NON_EXISTENT_LOCATION);
        assert_eq!(pack_location(0, 0), NON_EXISTENT_LOCATION);
    }

    #[test]
    fn test_to_string() {
        assert_eq!(location_to_string(0), "NON_EXISTENT");
        assert_eq!(location_to_string(pack_location(3, 128)), "3@128");
    }
}
