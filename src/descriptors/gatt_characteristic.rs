use alloc::vec::Vec;

use crate::descriptors::gatt_descriptor::GattDescriptor;
use crate::descriptors::uuid::UUID;
use enumset::EnumSet;

#[derive(Debug, Clone, PartialEq)]
pub struct GattCharacteristic {
  pub uuid: UUID,
  pub properties: EnumSet<GattCharacteristicProperty>,
  pub permissions: EnumSet<GattCharacteristicPermission>,
  pub descriptors: Vec<GattDescriptor>,
}

impl GattCharacteristic {
  /// Whether a peer can subscribe to server-initiated updates of this characteristic.
  pub fn is_subscribable(&self) -> bool {
    self.properties.contains(GattCharacteristicProperty::Notify)
        || self.properties.contains(GattCharacteristicProperty::Indicate)
  }
}

impl Default for GattCharacteristic {
  fn default() -> Self {
    Self {
      uuid: UUID::Long(0),
      properties: EnumSet::new(),
      permissions: EnumSet::new(),
      descriptors: Vec::new(),
    }
  }
}

#[derive(Debug, enumset::EnumSetType)]
pub enum GattCharacteristicProperty {
  Broadcast,
  ExtendedProps,

  /// Backends add a CCCD descriptor to the characteristic unless one is already declared.
  Indicate,

  /// Backends add a CCCD descriptor to the characteristic unless one is already declared.
  Notify,

  Read,
  Write,
  WriteSigned,
  WriteNoResponse,
}

#[derive(Debug, enumset::EnumSetType)]
pub enum GattCharacteristicPermission {
  Read,
  ReadEncrypted,
  Write,
  WriteEncrypted,
  WriteEncryptedMitm,
  WriteSigned,
  WriteSignedMitm,
}
