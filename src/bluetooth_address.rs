use core::fmt::{Debug, Display, Formatter};
use core::str::FromStr;

/// 48-bit device address, stored most significant byte first (the order it is usually printed
/// in).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BluetoothAddress(pub [u8; 6]);

impl BluetoothAddress {
  pub const ANY: BluetoothAddress = BluetoothAddress([0; 6]);

  pub fn is_any(&self) -> bool {
    *self == Self::ANY
  }
}

impl Display for BluetoothAddress {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    let a = &self.0;
    write!(
      f,
      "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
      a[0], a[1], a[2], a[3], a[4], a[5]
    )
  }
}

impl Debug for BluetoothAddress {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    Display::fmt(self, f)
  }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ParseAddressError;

impl FromStr for BluetoothAddress {
  type Err = ParseAddressError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut out = [0u8; 6];
    let mut parts = s.split(':');
    for byte in out.iter_mut() {
      let part = parts.next().ok_or(ParseAddressError)?;
      if part.len() != 2 {
        return Err(ParseAddressError);
      }
      *byte = u8::from_str_radix(part, 16).map_err(|_| ParseAddressError)?;
    }
    if parts.next().is_some() {
      return Err(ParseAddressError);
    }
    Ok(BluetoothAddress(out))
  }
}

#[cfg(test)]
mod tests {
  extern crate alloc;

  use alloc::string::ToString;

  use super::*;

  #[test]
  fn display_round_trips_through_from_str() {
    let addr: BluetoothAddress = "C0:FF:EE:00:12:AB".parse().unwrap();
    assert_eq!(addr.0, [0xc0, 0xff, 0xee, 0x00, 0x12, 0xab]);
    assert_eq!(addr.to_string(), "C0:FF:EE:00:12:AB");
  }

  #[test]
  fn rejects_malformed() {
    assert!("C0:FF:EE:00:12".parse::<BluetoothAddress>().is_err());
    assert!("C0:FF:EE:00:12:AB:01".parse::<BluetoothAddress>().is_err());
    assert!("C0-FF-EE-00-12-AB".parse::<BluetoothAddress>().is_err());
  }
}
