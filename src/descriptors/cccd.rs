use crate::descriptors::uuid::UUID;

/// Client Characteristic Configuration Descriptor.
pub const CCCD_UUID: UUID = UUID::Short(0x2902);

/// Value a peer writes into a CCCD to configure server-initiated updates.  Only the low two
/// bits of the 16-bit little-endian field are defined.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CccdValue {
  Disabled,
  Notify,
  Indicate,
}

impl CccdValue {
  pub const DISABLE: [u8; 2] = [0x00, 0x00];
  pub const ENABLE_NOTIFICATION: [u8; 2] = [0x01, 0x00];
  pub const ENABLE_INDICATION: [u8; 2] = [0x02, 0x00];

  /// Decode a raw descriptor write.  Anything other than the three well-known values yields
  /// `None` and must leave the configuration untouched.
  pub fn from_bytes(value: &[u8]) -> Option<Self> {
    match value {
      [0x00, 0x00] => Some(CccdValue::Disabled),
      [0x01, 0x00] => Some(CccdValue::Notify),
      [0x02, 0x00] => Some(CccdValue::Indicate),
      _ => None,
    }
  }

  pub fn as_bytes(&self) -> [u8; 2] {
    match self {
      CccdValue::Disabled => Self::DISABLE,
      CccdValue::Notify => Self::ENABLE_NOTIFICATION,
      CccdValue::Indicate => Self::ENABLE_INDICATION,
    }
  }

  pub fn is_enabled(&self) -> bool {
    *self != CccdValue::Disabled
  }
}
