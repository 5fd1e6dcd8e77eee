//! The sensor broadcaster: one GATT service with one notifiable characteristic, driven by host
//! method calls and reporting state changes back as [HostEvent]s.
//!
//! Platform callbacks and host calls share state through an `Rc<RefCell<_>>`.  Borrows of that
//! state are never held across calls into the peripheral, advertiser or a subscriber's writer,
//! so backends are free to report events synchronously from those calls.

use alloc::rc::Rc;
use alloc::string::ToString;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt::Debug;

use enumset::enum_set;
use log::{debug, error, info, warn};

use crate::bluetooth_address::BluetoothAddress;
use crate::config::BroadcasterConfig;
use crate::descriptors::{
  AttributeHandle, GattCharacteristic, GattCharacteristicPermission, GattCharacteristicProperty,
  GattDescriptor, GattService, GattServiceType, CCCD_UUID, UUID,
};
use crate::error::{BroadcasterError, Result};
use crate::gap_advertiser::{Advertisement, GapAdvertiser};
use crate::gatt_connection::GattConnection;
use crate::host::{EventRelay, EventSink, HostEvent, MethodCall, MethodResult};
use crate::peripheral::{GattServer, Peripheral};

use self::advertising::AdvertisingState;
use self::gatt_handler::GattEventHandler;
use self::notifier::{collect_targets, notify_subscribers};
use self::registry::ConnectionRegistry;

pub mod advertising;
mod gatt_handler;
pub mod notifier;
pub mod registry;

pub type WriterOf<P> = <<P as Peripheral>::Connection as GattConnection>::Writer;

/// The registered characteristic, its attribute handles and current value.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorCharacteristic {
  pub service_uuid: UUID,
  pub uuid: UUID,
  pub handle: AttributeHandle,
  pub cccd_handle: Option<AttributeHandle>,
  pub value: Vec<u8>,
}

impl SensorCharacteristic {
  /// Locate the characteristic in the handle mapping returned by
  /// [GattServer::add_service].  Its CCCD is the first one declared after it.
  fn from_handles(
      service_uuid: UUID,
      uuid: UUID,
      handles: &[(UUID, AttributeHandle)],
  ) -> Option<Self> {
    let position = handles.iter().position(|(u, _)| *u == uuid)?;
    let handle = handles[position].1;
    let cccd_handle = handles[position + 1..]
        .iter()
        .find(|(u, _)| *u == CCCD_UUID)
        .map(|(_, h)| *h);
    Some(Self { service_uuid, uuid, handle, cccd_handle, value: Vec::new() })
  }
}

/// Service layout registered by `addService`: readable, notifiable, not writable.
pub fn sensor_service(service_uuid: UUID, characteristic_uuid: UUID) -> GattService {
  GattService {
    uuid: service_uuid,
    service_type: GattServiceType::Primary,
    characteristics: vec![GattCharacteristic {
      uuid: characteristic_uuid,
      properties: enum_set!(GattCharacteristicProperty::Read | GattCharacteristicProperty::Notify),
      permissions: enum_set!(GattCharacteristicPermission::Read),
      descriptors: vec![GattDescriptor::cccd()],
    }],
  }
}

pub(crate) struct Shared<P: Peripheral> {
  pub(crate) relay: EventRelay,
  pub(crate) registry: ConnectionRegistry<WriterOf<P>>,
  pub(crate) advertising: AdvertisingState,
  pub(crate) characteristic: Option<SensorCharacteristic>,

  /// Set when the platform reports that the server went away underneath us.
  pub(crate) server_lost: bool,
}

impl<P: Peripheral> Default for Shared<P> {
  fn default() -> Self {
    Self {
      relay: EventRelay::new(),
      registry: ConnectionRegistry::new(),
      advertising: AdvertisingState::default(),
      characteristic: None,
      server_lost: false,
    }
  }
}

pub struct SensorBroadcaster<P: Peripheral> {
  peripheral: P,
  config: BroadcasterConfig,
  server: Option<P::Server>,
  advertiser: Option<P::Advertiser>,
  shared: Rc<RefCell<Shared<P>>>,
}

impl<P: Peripheral + Debug + 'static> SensorBroadcaster<P> {
  pub fn new(peripheral: P) -> Self {
    Self {
      peripheral,
      config: BroadcasterConfig::default(),
      server: None,
      advertiser: None,
      shared: Rc::new(RefCell::new(Shared::default())),
    }
  }

  pub fn with_config(peripheral: P, config: BroadcasterConfig) -> Result<Self> {
    config.validate()?;
    let mut broadcaster = Self::new(peripheral);
    broadcaster.config = config;
    Ok(broadcaster)
  }

  /// Install the host's event listener, replacing any previous one.  The sink is invoked from
  /// platform callbacks and must not call back into the broadcaster.
  pub fn listen(&mut self, sink: impl EventSink + 'static) {
    self.shared.borrow_mut().relay.listen(sink);
  }

  pub fn cancel(&mut self) {
    self.shared.borrow_mut().relay.cancel();
  }

  fn emit(&self, event: HostEvent) {
    self.shared.borrow_mut().relay.emit(event);
  }

  /// Open the GATT server and obtain the advertiser.  A disabled adapter is reported to the
  /// host as an `advertisingStatus` error.
  pub fn initialize(&mut self) -> Result<()> {
    if self.is_initialized() {
      debug!("Already initialized");
      return Ok(());
    }

    if !self.peripheral.is_enabled() {
      let e = BroadcasterError::BluetoothUnavailable;
      error!("{e}");
      self.emit(HostEvent::advertising_error(false, e.to_string()));
      return Err(e);
    }

    // Release a server the platform already shut down before opening a new one.
    self.server = None;
    self.advertiser = None;
    {
      let mut shared = self.shared.borrow_mut();
      shared.server_lost = false;
      shared.characteristic = None;
      shared.advertising = AdvertisingState::Idle;
      shared.registry.clear();
    }

    let handler = GattEventHandler::new(self.shared.clone());
    let server = self
        .peripheral
        .open_gatt_server(handler)
        .map_err(BroadcasterError::platform)?;
    self.server = Some(server);

    self.advertiser = self.peripheral.advertiser();
    if self.advertiser.is_none() {
      warn!("Adapter does not support LE advertising");
    }

    info!("Initialized");
    Ok(())
  }

  /// Register the sensor service, replacing whatever was registered before.
  pub fn add_service(&mut self, service_uuid: &str, characteristic_uuid: &str) -> Result<()> {
    let server_lost = self.shared.borrow().server_lost;
    let server = match self.server.as_mut() {
      Some(server) if !server_lost => server,
      _ => return Err(BroadcasterError::ServerNotInitialized),
    };
    let service_uuid = parse_uuid(service_uuid)?;
    let characteristic_uuid = parse_uuid(characteristic_uuid)?;

    let previous = self.shared.borrow_mut().characteristic.take();
    if let Some(previous) = previous {
      info!("Replacing service {}", previous.service_uuid);
      if let Err(e) = server.remove_service(&previous.service_uuid) {
        warn!("Failed to remove service {}: {e:?}", previous.service_uuid);
      }
      let mut shared = self.shared.borrow_mut();
      if shared.registry.clear_subscriptions() > 0 {
        shared.relay.emit(HostEvent::subscription(false));
      }
    }

    let service = sensor_service(service_uuid, characteristic_uuid);
    let handles = server.add_service(&service).map_err(BroadcasterError::platform)?;
    debug!("Attribute handles: {handles:?}");
    let characteristic =
        SensorCharacteristic::from_handles(service_uuid, characteristic_uuid, &handles)
            .ok_or_else(|| {
              BroadcasterError::Platform("no handle assigned to the characteristic".to_string())
            })?;
    if characteristic.cccd_handle.is_none() {
      debug!("Backend did not report a CCCD handle for {characteristic_uuid}");
    }

    self.shared.borrow_mut().characteristic = Some(characteristic);
    info!("Service added: {service_uuid}");
    Ok(())
  }

  /// Start connectable advertising of the registered service under `device_name`.  Failures
  /// are reported to the host as `advertisingStatus` events.
  pub fn start_advertising(&mut self, device_name: &str) -> Result<()> {
    let result = self.request_advertising(device_name);
    if let Err(e) = &result {
      error!("Cannot start advertising: {e}");
      if e.is_reported_as_event() {
        self.emit(HostEvent::advertising_error(false, e.to_string()));
      }
    }
    result
  }

  fn request_advertising(&mut self, device_name: &str) -> Result<()> {
    let (server_lost, service_uuid) = {
      let shared = self.shared.borrow();
      (shared.server_lost, shared.characteristic.as_ref().map(|c| c.service_uuid))
    };
    let advertiser = match self.advertiser.clone() {
      Some(advertiser) if !server_lost => advertiser,
      _ => return Err(BroadcasterError::AdvertiserNotInitialized),
    };
    let service_uuid = service_uuid.ok_or(BroadcasterError::NoServiceRegistered)?;

    if let Err(e) = self.peripheral.set_name(device_name) {
      warn!("Failed to set device name to {device_name:?}: {e:?}");
    }

    let advertisement = Advertisement {
      params: self.config.advertisement_params(),
      is_discoverable: true,
      local_name: self.config.include_device_name.then(|| device_name.to_string()),
      service_uuids: vec![service_uuid],
      ..Default::default()
    };
    debug!("Requesting advertisement: {advertisement:?}");

    self.shared.borrow_mut().advertising.request_start();
    advertiser.request_start(advertisement);
    Ok(())
  }

  /// Stop advertising.  The host is told immediately; a later platform confirmation is not
  /// reported again.
  pub fn stop_advertising(&mut self) {
    let Some(advertiser) = self.advertiser.clone() else {
      debug!("No advertiser, ignoring stop");
      return;
    };
    advertiser.request_stop();
    let event = self.shared.borrow_mut().advertising.request_stop();
    info!("Advertising stopped");
    self.emit(event);
  }

  /// Store `value` as the characteristic's current value and notify every subscriber.  Returns
  /// how many subscribers the platform accepted the notification for.
  pub fn update_characteristic(&mut self, value: &[u8]) -> usize {
    let targets = {
      let mut shared = self.shared.borrow_mut();
      let shared = &mut *shared;
      let Some(characteristic) = shared.characteristic.as_mut() else {
        debug!("No characteristic registered, dropping update");
        return 0;
      };
      characteristic.value = value.to_vec();
      collect_targets(&shared.registry)
    };

    let report = notify_subscribers(targets, value);
    debug!("Characteristic updated: {report:?}");
    report.delivered
  }

  /// Dispatch a decoded host call.  Errors the host already saw as an event are reported as
  /// success.
  pub fn handle(&mut self, call: MethodCall) -> MethodResult {
    let method = call.name();
    debug!("Method call: {method}");
    let result = match call {
      MethodCall::Initialize => self.initialize(),
      MethodCall::AddService { service_uuid, characteristic_uuid } => {
        self.add_service(&service_uuid, &characteristic_uuid)
      }
      MethodCall::StartAdvertising { device_name } => self.start_advertising(&device_name),
      MethodCall::StopAdvertising => {
        self.stop_advertising();
        Ok(())
      }
      MethodCall::UpdateCharacteristic { value } => {
        self.update_characteristic(&value);
        Ok(())
      }
    };

    match result {
      Ok(()) => MethodResult::Success,
      Err(e) if e.is_reported_as_event() => MethodResult::Success,
      Err(e) => {
        warn!("{method} failed: {e}");
        MethodResult::from(&e)
      }
    }
  }

  /// Decode and dispatch one JSON method call.
  pub fn handle_message(&mut self, message: &str) -> MethodResult {
    match MethodCall::decode(message) {
      Ok(call) => self.handle(call),
      Err(e) => {
        warn!("Rejected method call: {e}");
        e.into()
      }
    }
  }

  pub fn is_initialized(&self) -> bool {
    self.server.is_some() && !self.shared.borrow().server_lost
  }

  pub fn is_advertising(&self) -> bool {
    self.shared.borrow().advertising.is_advertising()
  }

  pub fn connected_peers(&self) -> Vec<BluetoothAddress> {
    self.shared.borrow().registry.peers().copied().collect()
  }

  pub fn subscriber_count(&self) -> usize {
    self.shared.borrow().registry.subscriber_count()
  }

  pub fn characteristic(&self) -> Option<SensorCharacteristic> {
    self.shared.borrow().characteristic.clone()
  }

  pub fn characteristic_value(&self) -> Option<Vec<u8>> {
    self.shared.borrow().characteristic.as_ref().map(|c| c.value.clone())
  }

  pub fn config(&self) -> &BroadcasterConfig {
    &self.config
  }

  pub fn peripheral(&self) -> &P {
    &self.peripheral
  }
}

fn parse_uuid(input: &str) -> Result<UUID> {
  UUID::parse(input).map_err(|_| BroadcasterError::InvalidUuid(input.to_string()))
}

#[cfg(test)]
mod tests;
