//! In-memory [Peripheral] that behaves like a small BLE stack: a power switch, one GATT server
//! with handle allocation and a backend-owned CCCD, a single legacy advertising set limited to
//! 31 bytes, and centrals that connect, negotiate MTU, read, write and collect notifications.
//!
//! Platform events are queued and only delivered by [SimController::pump], like a stack
//! delivering callbacks on its own thread.  Read and write requests are delivered
//! synchronously since the central waits for the answer.

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, BTreeSet, VecDeque};
use alloc::rc::{Rc, Weak};
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt::{Debug, Formatter};
use core::num::NonZeroU16;

use log::{debug, trace, warn};
use thiserror::Error;

use crate::att_error::AttError;
use crate::bluetooth_address::BluetoothAddress;
use crate::bluetooth_error::{BluetoothError, RemoteShutdownReason};
use crate::descriptors::{AttributeHandle, CccdValue, GattService, CCCD_UUID, UUID};
use crate::gap_advertiser::{Advertisement, GapAdvertiser};
use crate::gatt_connection::{GattConnection, GattResponder, GattWriter, Response};
use crate::gatt_server_cb::{
  AdvStartFailedReason, AdvStopReason, GattServerCallback, GattServerEvent,
};
use crate::mtu::Mtu;
use crate::peripheral::{GattServer, Peripheral};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimError {
  #[error("adapter is powered off")]
  PoweredOff,

  #[error("GATT server already open")]
  AlreadyOpen,

  #[error("GATT server closed")]
  ServerClosed,

  #[error("not advertising connectable")]
  NotAdvertising,

  #[error("{0} is not connected")]
  NotConnected(BluetoothAddress),

  #[error("service {0} already registered")]
  DuplicateService(UUID),

  #[error("unknown service {0}")]
  UnknownService(UUID),

  #[error("unknown attribute handle {0}")]
  UnknownHandle(AttributeHandle),

  #[error("attribute handles exhausted")]
  HandlesExhausted,

  #[error("request already answered")]
  AlreadyResponded,

  #[error("request was never answered")]
  NoResponse,

  #[error("ATT error {0}")]
  Att(AttError),
}

/// A notification as it went over the air, truncated to the peer's usable MTU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub address: BluetoothAddress,
  pub handle: AttributeHandle,
  pub value: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttributeKind {
  Characteristic,
  Cccd { characteristic: AttributeHandle },
  Descriptor,
}

#[derive(Debug, Clone)]
struct Attribute {
  service: UUID,
  uuid: UUID,
  handle: AttributeHandle,
  kind: AttributeKind,
}

#[derive(Debug)]
enum SimEvent {
  AdvertisingStarted,
  AdvertisingStopped(AdvStopReason),
  AdvertisingStartFail(AdvStartFailedReason<'static, SimError>),
  Connected(BluetoothAddress),
  Disconnected(BluetoothAddress, BluetoothError),
  MtuChanged(BluetoothAddress, Mtu),
  Subscribe(BluetoothAddress, AttributeHandle),
  Unsubscribe(BluetoothAddress, AttributeHandle),
  ServerShutdown(SimError),
}

type Callback = Box<dyn GattServerCallback<SimulatedPeripheral>>;

struct SimState {
  enabled: bool,
  advertising_supported: bool,
  stop_on_connect: bool,
  name: String,

  server_open: bool,
  callback: Option<Callback>,
  attributes: Vec<Attribute>,
  next_handle: u16,

  advertisement: Option<Advertisement>,
  advertised_payload: Option<Vec<u8>>,
  injected_failure: Option<AdvStartFailedReason<'static, SimError>>,

  connections: BTreeMap<BluetoothAddress, Mtu>,
  subscriptions: BTreeSet<(BluetoothAddress, AttributeHandle)>,
  notifications: Vec<Notification>,
  pending: VecDeque<SimEvent>,
}

impl Default for SimState {
  fn default() -> Self {
    Self {
      enabled: true,
      advertising_supported: true,
      stop_on_connect: false,
      name: String::new(),
      server_open: false,
      callback: None,
      attributes: Vec::new(),
      next_handle: 1,
      advertisement: None,
      advertised_payload: None,
      injected_failure: None,
      connections: BTreeMap::new(),
      subscriptions: BTreeSet::new(),
      notifications: Vec::new(),
      pending: VecDeque::new(),
    }
  }
}

impl SimState {
  fn allocate_handle(&mut self) -> Result<AttributeHandle, SimError> {
    let handle = NonZeroU16::new(self.next_handle).ok_or(SimError::HandlesExhausted)?;
    self.next_handle = self.next_handle.checked_add(1).ok_or(SimError::HandlesExhausted)?;
    Ok(AttributeHandle(handle))
  }

  fn attribute(&self, handle: AttributeHandle) -> Option<&Attribute> {
    self.attributes.iter().find(|a| a.handle == handle)
  }

  fn stop_advertising(&mut self, reason: AdvStopReason) {
    if self.advertisement.take().is_some() {
      self.advertised_payload = None;
      self.pending.push_back(SimEvent::AdvertisingStopped(reason));
    }
  }

  fn close_server(&mut self) {
    self.server_open = false;
    self.attributes.clear();
    self.subscriptions.clear();
    self.connections.clear();
    self.advertisement = None;
    self.advertised_payload = None;
  }
}

impl Debug for SimState {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("SimState")
        .field("enabled", &self.enabled)
        .field("server_open", &self.server_open)
        .field("advertising", &self.advertisement.is_some())
        .field("connections", &self.connections.len())
        .field("pending", &self.pending.len())
        .finish()
  }
}

/// The platform side handed to the code under test.
#[derive(Debug)]
pub struct SimulatedPeripheral {
  state: Rc<RefCell<SimState>>,
}

/// The outside world: drives the radio, plays centrals and inspects what the peripheral did.
#[derive(Debug, Clone)]
pub struct SimController {
  state: Rc<RefCell<SimState>>,
}

impl SimulatedPeripheral {
  pub fn new() -> (SimulatedPeripheral, SimController) {
    let state = Rc::new(RefCell::new(SimState::default()));
    (SimulatedPeripheral { state: state.clone() }, SimController { state })
  }
}

impl Peripheral for SimulatedPeripheral {
  type SystemError = SimError;
  type Server = SimGattServer;
  type Advertiser = SimAdvertiser;
  type Connection = SimConnection;

  fn is_enabled(&self) -> bool {
    self.state.borrow().enabled
  }

  fn set_name(&mut self, name: &str) -> Result<(), Self::SystemError> {
    let mut state = self.state.borrow_mut();
    if !state.enabled {
      return Err(SimError::PoweredOff);
    }
    state.name = name.to_string();
    Ok(())
  }

  fn open_gatt_server(
      &mut self,
      callback: impl GattServerCallback<Self> + 'static,
  ) -> Result<Self::Server, Self::SystemError> {
    let mut state = self.state.borrow_mut();
    if !state.enabled {
      return Err(SimError::PoweredOff);
    }
    if state.server_open {
      return Err(SimError::AlreadyOpen);
    }
    state.server_open = true;
    state.callback = Some(Box::new(callback));
    debug!("GATT server opened");
    Ok(SimGattServer { state: Rc::downgrade(&self.state) })
  }

  fn advertiser(&self) -> Option<Self::Advertiser> {
    self
      .state
      .borrow()
      .advertising_supported
      .then(|| SimAdvertiser { state: Rc::downgrade(&self.state) })
  }
}

#[derive(Debug)]
pub struct SimGattServer {
  state: Weak<RefCell<SimState>>,
}

impl GattServer for SimGattServer {
  type SystemError = SimError;

  fn add_service(
      &mut self,
      service: &GattService,
  ) -> Result<Vec<(UUID, AttributeHandle)>, Self::SystemError> {
    let state = self.state.upgrade().ok_or(SimError::ServerClosed)?;
    let mut state = state.borrow_mut();
    if !state.server_open {
      return Err(SimError::ServerClosed);
    }
    if state.attributes.iter().any(|a| a.service == service.uuid) {
      return Err(SimError::DuplicateService(service.uuid));
    }

    let mut attributes = Vec::new();
    for characteristic in &service.characteristics {
      let handle = state.allocate_handle()?;
      attributes.push(Attribute {
        service: service.uuid,
        uuid: characteristic.uuid,
        handle,
        kind: AttributeKind::Characteristic,
      });

      let mut has_cccd = false;
      for descriptor in &characteristic.descriptors {
        let is_cccd = descriptor.uuid == CCCD_UUID;
        has_cccd |= is_cccd;
        attributes.push(Attribute {
          service: service.uuid,
          uuid: descriptor.uuid,
          handle: state.allocate_handle()?,
          kind: if is_cccd {
            AttributeKind::Cccd { characteristic: handle }
          } else {
            AttributeKind::Descriptor
          },
        });
      }

      if characteristic.is_subscribable() && !has_cccd {
        attributes.push(Attribute {
          service: service.uuid,
          uuid: CCCD_UUID,
          handle: state.allocate_handle()?,
          kind: AttributeKind::Cccd { characteristic: handle },
        });
      }
    }

    debug!("Registered service {} with {} attributes", service.uuid, attributes.len());
    let handles = attributes.iter().map(|a| (a.uuid, a.handle)).collect();
    state.attributes.extend(attributes);
    Ok(handles)
  }

  fn remove_service(&mut self, uuid: &UUID) -> Result<(), Self::SystemError> {
    let state = self.state.upgrade().ok_or(SimError::ServerClosed)?;
    let mut state = state.borrow_mut();
    let (removed, kept): (Vec<Attribute>, Vec<Attribute>) =
        state.attributes.drain(..).partition(|a| a.service == *uuid);
    state.attributes = kept;
    if removed.is_empty() {
      return Err(SimError::UnknownService(*uuid));
    }
    state.subscriptions.retain(|(_, h)| !removed.iter().any(|a| a.handle == *h));
    debug!("Removed service {uuid}");
    Ok(())
  }
}

impl Drop for SimGattServer {
  fn drop(&mut self) {
    let Some(state) = self.state.upgrade() else {
      return;
    };
    let Ok(mut state) = state.try_borrow_mut() else {
      warn!("Simulator busy while closing the GATT server");
      return;
    };
    debug!("GATT server closed");
    state.close_server();
    state.callback = None;
    state.pending.clear();
  }
}

#[derive(Debug, Clone)]
pub struct SimAdvertiser {
  state: Weak<RefCell<SimState>>,
}

impl GapAdvertiser for SimAdvertiser {
  fn request_start(&self, advertisement: Advertisement) {
    let Some(state) = self.state.upgrade() else {
      return;
    };
    let mut state = state.borrow_mut();

    let event = if !state.enabled {
      SimEvent::AdvertisingStartFail(AdvStartFailedReason::SystemError(SimError::PoweredOff))
    } else if !state.server_open {
      SimEvent::AdvertisingStartFail(AdvStartFailedReason::SystemError(SimError::ServerClosed))
    } else if let Some(reason) = state.injected_failure.take() {
      SimEvent::AdvertisingStartFail(reason)
    } else if state.advertisement.is_some() {
      SimEvent::AdvertisingStartFail(AdvStartFailedReason::AlreadyStarted)
    } else {
      match advertisement.build_payload() {
        Ok(payload) => {
          state.advertised_payload = Some(payload.to_vec());
          state.advertisement = Some(advertisement);
          SimEvent::AdvertisingStarted
        }
        Err(e) => {
          debug!("Advertisement rejected: {e:?}");
          SimEvent::AdvertisingStartFail(AdvStartFailedReason::DataTooLarge)
        }
      }
    };
    state.pending.push_back(event);
  }

  fn request_stop(&self) {
    if let Some(state) = self.state.upgrade() {
      state.borrow_mut().stop_advertising(AdvStopReason::Requested);
    }
  }
}

#[derive(Debug, Clone)]
pub struct SimConnection {
  address: BluetoothAddress,
}

impl GattConnection for SimConnection {
  type SystemError = SimError;
  type Responder = SimResponder;
  type Writer = SimWriter;

  fn peer_address(&self) -> &BluetoothAddress {
    &self.address
  }
}

#[derive(Debug, Default)]
pub struct SimResponder {
  answer: Option<Result<Vec<u8>, AttError>>,
}

impl GattResponder for SimResponder {
  type SystemError = SimError;

  fn respond(&mut self, response: Result<Response<'_>, AttError>) -> Result<(), Self::SystemError> {
    if self.answer.is_some() {
      return Err(SimError::AlreadyResponded);
    }
    self.answer = Some(response.map(|r| r.value.to_vec()));
    Ok(())
  }
}

impl SimResponder {
  fn into_result(self) -> Result<Vec<u8>, SimError> {
    match self.answer {
      Some(Ok(value)) => Ok(value),
      Some(Err(e)) => Err(SimError::Att(e)),
      None => Err(SimError::NoResponse),
    }
  }
}

#[derive(Debug, Clone)]
pub struct SimWriter {
  address: BluetoothAddress,
  handle: AttributeHandle,
  state: Weak<RefCell<SimState>>,
}

impl GattWriter for SimWriter {
  type SystemError = SimError;

  fn write(&mut self, value: &[u8]) -> Result<(), Self::SystemError> {
    let state = self.state.upgrade().ok_or(SimError::ServerClosed)?;
    let mut state = state.borrow_mut();
    if state.attribute(self.handle).is_none() {
      return Err(SimError::UnknownHandle(self.handle));
    }
    let mtu = state
        .connections
        .get(&self.address)
        .ok_or(SimError::NotConnected(self.address))?;
    let usable = usize::from(mtu.usable_value()).min(value.len());
    let notification = Notification {
      address: self.address,
      handle: self.handle,
      value: value[..usable].to_vec(),
    };
    state.notifications.push(notification);
    Ok(())
  }
}

impl SimController {
  fn weak(&self) -> Weak<RefCell<SimState>> {
    Rc::downgrade(&self.state)
  }

  /// Run `f` with the server callback taken out of the shared state, so the callback is free
  /// to call back into the simulator.
  fn with_callback<R>(&self, f: impl FnOnce(&mut dyn GattServerCallback<SimulatedPeripheral>) -> R) -> Result<R, SimError> {
    let mut callback = self.state.borrow_mut().callback.take().ok_or(SimError::ServerClosed)?;
    let result = f(&mut *callback);
    let mut state = self.state.borrow_mut();
    if state.callback.is_none() {
      state.callback = Some(callback);
    }
    Ok(result)
  }

  /// Deliver queued platform events until the queue is empty.  Returns how many were delivered.
  pub fn pump(&self) -> usize {
    let mut delivered = 0;
    loop {
      let event = self.state.borrow_mut().pending.pop_front();
      let Some(event) = event else {
        break;
      };
      trace!("delivering {event:?}");

      let is_shutdown = matches!(event, SimEvent::ServerShutdown(_));
      let weak = self.weak();
      let outcome = self.with_callback(|callback| deliver(callback, event, weak));
      if outcome.is_err() {
        trace!("no server callback, event dropped");
        continue;
      }
      if is_shutdown {
        self.state.borrow_mut().callback = None;
      }
      delivered += 1;
    }
    delivered
  }

  /// A central connects.  Requires connectable advertising to be running.
  pub fn connect(&self, address: BluetoothAddress) -> Result<(), SimError> {
    let mut state = self.state.borrow_mut();
    let connectable = state.advertisement.as_ref().map_or(false, Advertisement::is_connectable);
    if !connectable {
      return Err(SimError::NotAdvertising);
    }
    state.connections.insert(address, Mtu::default());
    state.pending.push_back(SimEvent::Connected(address));
    if state.stop_on_connect {
      state.stop_advertising(AdvStopReason::AcceptedConnection);
    }
    Ok(())
  }

  pub fn disconnect(&self, address: BluetoothAddress) -> Result<(), SimError> {
    let mut state = self.state.borrow_mut();
    state.connections.remove(&address).ok_or(SimError::NotConnected(address))?;
    state.subscriptions.retain(|(a, _)| *a != address);
    let reason = BluetoothError::ClosedByPeer(RemoteShutdownReason::NoneGiven);
    state.pending.push_back(SimEvent::Disconnected(address, reason));
    Ok(())
  }

  pub fn negotiate_mtu(&self, address: BluetoothAddress, mtu: u16) -> Result<(), SimError> {
    let mut state = self.state.borrow_mut();
    let mtu = Mtu::new(mtu);
    let current = state.connections.get_mut(&address).ok_or(SimError::NotConnected(address))?;
    *current = mtu.clone();
    state.pending.push_back(SimEvent::MtuChanged(address, mtu));
    Ok(())
  }

  fn require_connected(&self, address: BluetoothAddress) -> Result<(), SimError> {
    if self.state.borrow().connections.contains_key(&address) {
      Ok(())
    } else {
      Err(SimError::NotConnected(address))
    }
  }

  /// Attribute write from a central.  CCCD writes are handled by the stack: `01 00` subscribes,
  /// `00 00` unsubscribes, anything else (indications included) is accepted and ignored.  Every
  /// other write is forwarded to the server callback.
  pub fn write(
      &self,
      address: BluetoothAddress,
      handle: AttributeHandle,
      value: &[u8],
      with_response: bool,
  ) -> Result<(), SimError> {
    self.require_connected(address)?;
    let kind = self
        .state
        .borrow()
        .attribute(handle)
        .map(|a| a.kind)
        .ok_or(SimError::UnknownHandle(handle))?;

    if let AttributeKind::Cccd { characteristic } = kind {
      let mut state = self.state.borrow_mut();
      match CccdValue::from_bytes(value) {
        Some(CccdValue::Notify) => {
          if state.subscriptions.insert((address, characteristic)) {
            state.pending.push_back(SimEvent::Subscribe(address, characteristic));
          }
        }
        Some(CccdValue::Disabled) => {
          if state.subscriptions.remove(&(address, characteristic)) {
            state.pending.push_back(SimEvent::Unsubscribe(address, characteristic));
          }
        }
        _ => debug!("Ignoring CCCD value {value:02x?}"),
      }
      return Ok(());
    }

    let connection = SimConnection { address };
    let mut responder = SimResponder::default();
    self.with_callback(|callback| {
      callback.on_event(GattServerEvent::WriteRequest {
        connection: &connection,
        handle,
        responder: with_response.then_some(&mut responder),
        offset: 0,
        value,
      })
    })?;
    if with_response {
      responder.into_result().map(|_| ())
    } else {
      Ok(())
    }
  }

  /// Write the enable-notification value to the CCCD of the characteristic with `uuid`.
  pub fn enable_notifications(&self, address: BluetoothAddress, uuid: UUID) -> Result<(), SimError> {
    let cccd = self.handle_of(uuid).and_then(|h| self.cccd_of(h)).ok_or(SimError::NoResponse)?;
    self.write(address, cccd, &CccdValue::ENABLE_NOTIFICATION, true)
  }

  /// A central the stack never announced subscribes to `uuid`, as under BlueZ, which serves the
  /// CCCD itself and does not say who wrote it.  The peer is tracked as [BluetoothAddress::ANY]
  /// and leaves through [SimController::disconnect].
  pub fn subscribe_anonymously(&self, uuid: UUID) -> Result<(), SimError> {
    let characteristic = self.handle_of(uuid).ok_or(SimError::NoResponse)?;
    let address = BluetoothAddress::ANY;
    let mut state = self.state.borrow_mut();
    state.connections.entry(address).or_default();
    if state.subscriptions.insert((address, characteristic)) {
      state.pending.push_back(SimEvent::Subscribe(address, characteristic));
    }
    Ok(())
  }

  pub fn disable_notifications(&self, address: BluetoothAddress, uuid: UUID) -> Result<(), SimError> {
    let cccd = self.handle_of(uuid).and_then(|h| self.cccd_of(h)).ok_or(SimError::NoResponse)?;
    self.write(address, cccd, &CccdValue::DISABLE, true)
  }

  /// Attribute read from a central, answered by the server callback.
  pub fn read(&self, address: BluetoothAddress, handle: AttributeHandle) -> Result<Vec<u8>, SimError> {
    self.require_connected(address)?;
    let connection = SimConnection { address };
    let mut responder = SimResponder::default();
    self.with_callback(|callback| {
      callback.on_event(GattServerEvent::ReadRequest {
        connection: &connection,
        handle,
        responder: &mut responder,
      })
    })?;
    responder.into_result()
  }

  pub fn take_notifications(&self) -> Vec<Notification> {
    core::mem::take(&mut self.state.borrow_mut().notifications)
  }

  pub fn advertisement(&self) -> Option<Advertisement> {
    self.state.borrow().advertisement.clone()
  }

  pub fn advertised_payload(&self) -> Option<Vec<u8>> {
    self.state.borrow().advertised_payload.clone()
  }

  pub fn is_advertising(&self) -> bool {
    self.state.borrow().advertisement.is_some()
  }

  pub fn name(&self) -> String {
    self.state.borrow().name.clone()
  }

  pub fn is_server_open(&self) -> bool {
    self.state.borrow().server_open
  }

  pub fn services(&self) -> Vec<UUID> {
    let state = self.state.borrow();
    let mut services: Vec<UUID> = Vec::new();
    for attribute in &state.attributes {
      if !services.contains(&attribute.service) {
        services.push(attribute.service);
      }
    }
    services
  }

  pub fn handle_of(&self, uuid: UUID) -> Option<AttributeHandle> {
    self
      .state
      .borrow()
      .attributes
      .iter()
      .find(|a| a.uuid == uuid && a.kind == AttributeKind::Characteristic)
      .map(|a| a.handle)
  }

  pub fn cccd_of(&self, characteristic: AttributeHandle) -> Option<AttributeHandle> {
    self
      .state
      .borrow()
      .attributes
      .iter()
      .find(|a| a.kind == AttributeKind::Cccd { characteristic })
      .map(|a| a.handle)
  }

  /// Power the adapter on or off.  Powering off tears down the server, which the callback
  /// learns about on the next [SimController::pump].
  pub fn set_enabled(&self, enabled: bool) {
    let mut state = self.state.borrow_mut();
    state.enabled = enabled;
    if !enabled && state.server_open {
      state.close_server();
      state.pending.push_back(SimEvent::ServerShutdown(SimError::PoweredOff));
    }
  }

  pub fn set_advertising_supported(&self, supported: bool) {
    self.state.borrow_mut().advertising_supported = supported;
  }

  /// Mimic stacks that stop advertising once a central connects.
  pub fn set_stop_on_connect(&self, stop: bool) {
    self.state.borrow_mut().stop_on_connect = stop;
  }

  /// Make the next start request fail with `reason`.
  pub fn fail_next_advertising(&self, reason: AdvStartFailedReason<'static, SimError>) {
    self.state.borrow_mut().injected_failure = Some(reason);
  }

  /// The advertising timeout elapsed.
  pub fn expire_advertising(&self) {
    self.state.borrow_mut().stop_advertising(AdvStopReason::Timeout);
  }
}

fn deliver(
    callback: &mut dyn GattServerCallback<SimulatedPeripheral>,
    event: SimEvent,
    state: Weak<RefCell<SimState>>,
) {
  match event {
    SimEvent::AdvertisingStarted => {
      callback.on_event(GattServerEvent::AdvertisingStarted { remaining_connections: None });
    }
    SimEvent::AdvertisingStopped(reason) => {
      callback.on_event(GattServerEvent::AdvertisingStopped { reason });
    }
    SimEvent::AdvertisingStartFail(reason) => {
      callback.on_event(GattServerEvent::AdvertisingStartFail { reason });
    }
    SimEvent::Connected(address) => {
      let connection = SimConnection { address };
      callback.on_event(GattServerEvent::Connected { connection: &connection });
    }
    SimEvent::Disconnected(address, reason) => {
      let connection = SimConnection { address };
      callback.on_event(GattServerEvent::Disconnected { connection: &connection, reason });
    }
    SimEvent::MtuChanged(address, mtu) => {
      let connection = SimConnection { address };
      callback.on_event(GattServerEvent::MtuChanged { connection: &connection, mtu });
    }
    SimEvent::Subscribe(address, handle) => {
      let connection = SimConnection { address };
      let mut writer = SimWriter { address, handle, state };
      callback.on_event(GattServerEvent::Subscribe {
        connection: &connection,
        handle,
        writer: &mut writer,
      });
    }
    SimEvent::Unsubscribe(address, handle) => {
      let connection = SimConnection { address };
      callback.on_event(GattServerEvent::Unsubscribe { connection: &connection, handle });
    }
    SimEvent::ServerShutdown(error) => {
      callback.on_event(GattServerEvent::ServerShutdown { error });
    }
  }
}
