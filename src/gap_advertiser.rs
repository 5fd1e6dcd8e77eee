use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Debug;

use crate::advertisement::{
  AdvertisementParams, AdvertisementPayload, AdvertisementPayloadBuilder, ConnectMode, DiscoverMode,
  PushError,
};
use crate::descriptors::UUID;

pub trait GapAdvertiser {
  /// Request that BLE advertising begins, which is necessary to allow incoming connections (and using
  /// an advertisement that is connectable).  Note that
  /// advertising is typically automatically disabled when a GAP connection is received by
  /// [crate::prelude::GattServerCallback].  Some controllers allow re-enabling advertising which would allow
  /// another incoming connection.
  ///
  /// More information about start/stop reasons will be delivered asynchronously through
  /// the callback provided when the GATT server was opened.
  fn request_start(&self, advertisement: Advertisement);

  /// Request that BLE advertising is stopped.  It is expected that this action is confirmed
  /// through [crate::prelude::GattServerCallback].
  fn request_stop(&self);
}

/// Everything a backend needs to start one legacy advertising set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
  pub params: AdvertisementParams,
  pub is_discoverable: bool,

  /// Included as the complete local name when set.
  pub local_name: Option<String>,

  pub service_uuids: Vec<UUID>,
  pub manufacturer_data: BTreeMap<u16, Vec<u8>>,
}

impl Default for Advertisement {
  fn default() -> Self {
    Self {
      params: AdvertisementParams::default(),
      is_discoverable: true,
      local_name: None,
      service_uuids: Vec::new(),
      manufacturer_data: BTreeMap::new(),
    }
  }
}

impl Advertisement {
  pub fn is_connectable(&self) -> bool {
    self.params.connect_mode != ConnectMode::None
  }

  /// Encode the legacy (31 byte) advertising PDU.  Service UUIDs are grouped by width into
  /// complete-list records.
  pub fn build_payload(&self) -> Result<AdvertisementPayload, PushError> {
    let mut builder = AdvertisementPayloadBuilder::new();
    if !self.is_discoverable {
      builder = builder.set_discover_mode(DiscoverMode::None).set_classic_not_supported(true);
    }

    let (short, long): (Vec<UUID>, Vec<UUID>) = self
        .service_uuids
        .iter()
        .map(UUID::shortened)
        .partition(|u| matches!(u, UUID::Short(_)));
    if !short.is_empty() {
      builder = builder.push_service_uuids(&short)?;
    }
    if !long.is_empty() {
      builder = builder.push_service_uuids(&long)?;
    }

    if let Some(name) = &self.local_name {
      builder = builder.push_complete_local_name(name)?;
    }

    for (id, data) in &self.manufacturer_data {
      builder = builder.push_manufacturer_data(*id, data)?;
    }

    builder.build()
  }
}

#[cfg(test)]
mod tests {
  extern crate alloc;

  use alloc::string::ToString;
  use alloc::vec;

  use super::*;
  use crate::advertisement::AdType;

  #[test]
  fn payload_carries_service_and_name() {
    let adv = Advertisement {
      local_name: Some("pulse".to_string()),
      service_uuids: vec![UUID::Long(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e)],
      ..Default::default()
    };

    let payload = adv.build_payload().unwrap();
    assert_eq!(payload[0], 17);
    assert_eq!(payload[1], AdType::CompleteServiceUuids128 as u8);
    assert_eq!(&payload[2..18], &0x6e400001_b5a3_f393_e0a9_e50e24dcca9eu128.to_le_bytes());
    assert_eq!(payload[18], 6);
    assert_eq!(payload[19], AdType::LongLocalName as u8);
    assert_eq!(&payload[20..25], b"pulse");
  }

  #[test]
  fn long_name_with_128_bit_service_overflows() {
    let adv = Advertisement {
      local_name: Some("sensor-broadcaster".to_string()),
      service_uuids: vec![UUID::Long(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e)],
      ..Default::default()
    };

    assert_eq!(adv.build_payload(), Err(PushError::CapacityExceeded));
  }

  #[test]
  fn non_discoverable_clears_discover_bits() {
    let adv = Advertisement { is_discoverable: false, ..Default::default() };
    let payload = adv.build_payload().unwrap();
    assert_eq!(&payload[..], &[2, AdType::Flags as u8, 0b0000_0100]);
  }
}
