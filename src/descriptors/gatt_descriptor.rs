use enumset::{enum_set, EnumSet};

use crate::descriptors::cccd::CCCD_UUID;
use crate::descriptors::uuid::UUID;
use crate::prelude::GattCharacteristicPermission;

#[derive(Debug, Clone, PartialEq)]
pub struct GattDescriptor {
  pub uuid: UUID,
  pub permissions: EnumSet<GattDescriptorPermission>,
}

impl GattDescriptor {
  /// Client Characteristic Configuration Descriptor, readable and writable by the peer.
  pub fn cccd() -> Self {
    Self {
      uuid: CCCD_UUID,
      permissions: enum_set!(GattDescriptorPermission::Read | GattDescriptorPermission::Write),
    }
  }
}

impl Default for GattDescriptor {
  fn default() -> Self {
    Self {
      uuid: UUID::Long(0),
      permissions: EnumSet::new(),
    }
  }
}

pub type GattDescriptorPermission = GattCharacteristicPermission;
