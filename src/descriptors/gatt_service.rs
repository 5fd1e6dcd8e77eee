use crate::descriptors::gatt_characteristic::GattCharacteristic;
use crate::descriptors::uuid::UUID;
use alloc::vec::Vec;

#[derive(Debug, Clone, PartialEq)]
pub struct GattService {
  pub uuid: UUID,
  pub service_type: GattServiceType,
  pub characteristics: Vec<GattCharacteristic>,
}

impl Default for GattService {
  fn default() -> Self {
    Self {
      uuid: UUID::Long(0),
      service_type: GattServiceType::Primary,
      characteristics: Vec::new(),
    }
  }
}

impl GattService {
  /// Every UUID declared by this service, in declaration order: characteristics each followed
  /// by their descriptors.  Backends allocate attribute handles in this order.
  pub fn attribute_uuids(&self) -> impl Iterator<Item = UUID> + '_ {
    self.characteristics.iter().flat_map(|c| {
      core::iter::once(c.uuid).chain(c.descriptors.iter().map(|d| d.uuid))
    })
  }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GattServiceType {
  Primary,
  Secondary,
}
