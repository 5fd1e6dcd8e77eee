use alloc::vec::Vec;
use core::fmt::Debug;

use crate::descriptors::{AttributeHandle, GattService, UUID};
use crate::gap_advertiser::GapAdvertiser;
use crate::gatt_connection::GattConnection;
use crate::gatt_server_cb::GattServerCallback;

/// Trait defining the capabilities of a BLE peripheral device.  For more information, see:
/// https://embeddedcentric.com/lesson-2-ble-profiles-services-characteristics-device-roles-and-network-topology/
///
/// This is a low-level mapping onto the peripheral APIs mobile and desktop stacks expose:
/// open a GATT server, register services on it, obtain an advertiser.
pub trait Peripheral {
  type SystemError: Debug;

  type Server: GattServer<SystemError = Self::SystemError>;
  type Advertiser: GapAdvertiser + Debug + Clone;
  type Connection: GattConnection + Debug;

  /// Whether the adapter exists and is powered.  Nothing else on this trait is expected to
  /// work when this returns false.
  fn is_enabled(&self) -> bool;

  /// Sets the device name that can be read from built-in GATT characteristics after connection,
  /// and that backends include in advertisements asking for the local name.  There may be
  /// different limits imposed by each platform.
  fn set_name(&mut self, name: &str) -> Result<(), Self::SystemError>;

  /// Open the GATT server.  Only one server may be open per peripheral.  The server starts out
  /// empty; services are registered through [GattServer::add_service].
  ///
  /// The entire GATT server application is expected to be driven through the event callback.
  /// Dropping the resulting server shuts it down.
  fn open_gatt_server(
      &mut self,
      callback: impl GattServerCallback<Self> + 'static,
  ) -> Result<Self::Server, Self::SystemError>;

  /// LE advertiser of this adapter, if the controller supports peripheral advertising.
  fn advertiser(&self) -> Option<Self::Advertiser>;
}

/// An open GATT server.
pub trait GattServer {
  type SystemError: Debug;

  /// Register a service.  Returns the attribute handles assigned to each characteristic and
  /// descriptor, in declaration order (see [GattService::attribute_uuids]).
  fn add_service(
      &mut self,
      service: &GattService,
  ) -> Result<Vec<(UUID, AttributeHandle)>, Self::SystemError>;

  /// Unregister a previously added service.  Connected peers see a service-changed indication
  /// where the stack supports it.
  fn remove_service(&mut self, uuid: &UUID) -> Result<(), Self::SystemError>;
}
