use core::fmt::{Display, Formatter};

const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;
const BLUETOOTH_BASE_MASK_16: u128 = 0xffff0000_ffff_ffff_ffff_ffffffffffff;

#[derive(Debug, Copy, Clone, Eq)]
pub enum UUID {
  /// For use only with SIG defined services (i.e. registered and publicly well known services).
  Short(u16),

  /// All other BLE UUIDs must be 128-bit
  Long(u128),
}

impl UUID {
  /// Full 128-bit value, expanding short UUIDs against the Bluetooth Base UUID.
  pub fn as_u128(&self) -> u128 {
    match *self {
      UUID::Short(u) => BLUETOOTH_BASE_UUID | (u128::from(u) << 96),
      UUID::Long(u) => u,
    }
  }

  /// Collapse to [UUID::Short] when the value lies on the Bluetooth Base UUID.
  pub fn shortened(&self) -> UUID {
    let value = self.as_u128();
    if value & BLUETOOTH_BASE_MASK_16 == BLUETOOTH_BASE_UUID {
      UUID::Short((value >> 96) as u16)
    } else {
      UUID::Long(value)
    }
  }

  /// Parses either the 4 hex digit SIG short form (`"2902"`) or any textual form the `uuid`
  /// crate accepts (hyphenated, simple, braced, urn).  SIG-based 128-bit strings are
  /// normalized to the short form.
  pub fn parse(input: &str) -> Result<UUID, UuidParseError> {
    let trimmed = input.trim();
    if trimmed.len() == 4 {
      return u16::from_str_radix(trimmed, 16)
        .map(UUID::Short)
        .map_err(|_| UuidParseError);
    }
    uuid::Uuid::parse_str(trimmed)
      .map(|u| UUID::Long(u.as_u128()).shortened())
      .map_err(|_| UuidParseError)
  }

  /// Number of bytes this UUID occupies on the air.
  pub fn byte_len(&self) -> usize {
    match self {
      UUID::Short(_) => 2,
      UUID::Long(_) => 16,
    }
  }

  /// Append the little-endian over-the-air encoding.
  pub fn push_into<const N: usize>(&self, raw: &mut heapless::Vec<u8, N>) -> Result<(), ()> {
    match *self {
      UUID::Short(u) => raw.extend_from_slice(&u.to_le_bytes()),
      UUID::Long(u) => raw.extend_from_slice(&u.to_le_bytes()),
    }
  }
}

impl PartialEq for UUID {
  fn eq(&self, other: &Self) -> bool {
    self.as_u128() == other.as_u128()
  }
}

impl Display for UUID {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    write!(f, "{}", uuid::Uuid::from_u128(self.as_u128()))
  }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UuidParseError;

#[cfg(test)]
mod tests {
  extern crate alloc;

  use alloc::string::ToString;

  use super::*;

  #[test]
  fn short_uuid_expands_against_base() {
    assert_eq!(
      UUID::Short(0x2902).to_string(),
      "00002902-0000-1000-8000-00805f9b34fb"
    );
  }

  #[test]
  fn parse_short_form() {
    assert_eq!(UUID::parse("180D"), Ok(UUID::Short(0x180d)));
    assert_eq!(UUID::parse("180d"), Ok(UUID::Short(0x180d)));
  }

  #[test]
  fn parse_sig_long_form_collapses() {
    let parsed = UUID::parse("0000180d-0000-1000-8000-00805f9b34fb").unwrap();
    assert!(matches!(parsed, UUID::Short(0x180d)));
  }

  #[test]
  fn parse_vendor_uuid() {
    let parsed = UUID::parse("6e400001-b5a3-f393-e0a9-e50e24dcca9e").unwrap();
    assert_eq!(parsed, UUID::Long(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e));
    assert_eq!(parsed.to_string(), "6e400001-b5a3-f393-e0a9-e50e24dcca9e");
  }

  #[test]
  fn parse_rejects_garbage() {
    assert_eq!(UUID::parse("not-a-uuid"), Err(UuidParseError));
    assert_eq!(UUID::parse("zzzz"), Err(UuidParseError));
    assert_eq!(UUID::parse(""), Err(UuidParseError));
  }

  #[test]
  fn short_and_long_forms_compare_equal() {
    assert_eq!(UUID::Short(0x2902), UUID::Long(UUID::Short(0x2902).as_u128()));
    assert_ne!(UUID::Short(0x2902), UUID::Short(0x2901));
  }
}
