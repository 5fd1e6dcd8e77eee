//! BlueZ backend built on `bluer`.  Requires a tokio `LocalSet`: the server callback is driven
//! from a local task so it does not need to be `Send`.
//!
//! BlueZ owns the CCCD of every notifiable characteristic and does not tell us which peer
//! subscribed, so subscriptions are reported against [BluetoothAddress::ANY].  Connections are
//! tracked from the adapter's device objects.

use std::borrow::ToOwned;
use std::boxed::Box;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::num::NonZeroU16;
use std::pin::Pin;
use std::string::String;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use std::vec;
use std::vec::Vec;

use bluer::adv::{AdvertisementHandle, Type};
use bluer::gatt::local::{
  Application, ApplicationHandle, Characteristic, CharacteristicNotify, CharacteristicNotifyFun,
  CharacteristicNotifyMethod, CharacteristicRead, CharacteristicReadRequest, CharacteristicWrite,
  CharacteristicWriteMethod, CharacteristicWriteRequest, Descriptor, DescriptorRead,
  DescriptorReadRequest, DescriptorWrite, DescriptorWriteRequest, ReqError, ReqResult, Service,
};
use bluer::{Adapter, AdapterEvent, AdapterProperty, Address, DeviceEvent, DeviceProperty, Uuid};
use futures::{FutureExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot};

use crate::att_error::AttError;
use crate::bluetooth_address::BluetoothAddress;
use crate::bluetooth_error::{BluetoothError, RemoteShutdownReason};
use crate::descriptors::{
  AttributeHandle, GattCharacteristic, GattCharacteristicPermission, GattCharacteristicProperty,
  GattDescriptor, GattDescriptorPermission, GattService, GattServiceType, CCCD_UUID, UUID,
};
use crate::gap_advertiser::{Advertisement, GapAdvertiser};
use crate::gatt_connection::{GattConnection, GattResponder, GattWriter, Response};
use crate::gatt_server_cb::{
  AdvStartFailedReason, AdvStopReason, GattServerCallback, GattServerEvent,
};
use crate::mtu::Mtu;
use crate::peripheral::{GattServer, Peripheral};

pub struct BluerPeripheral {
  adapter: Adapter,
  powered: Arc<AtomicBool>,
  name: Option<String>,
  tx: Option<mpsc::UnboundedSender<Event>>,
}

impl BluerPeripheral {
  pub async fn new(adapter: Adapter) -> bluer::Result<Self> {
    let powered = adapter.is_powered().await?;
    Ok(Self {
      adapter,
      powered: Arc::new(AtomicBool::new(powered)),
      name: None,
      tx: None,
    })
  }
}

impl Debug for BluerPeripheral {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BluerPeripheral")
        .field("adapter", &self.adapter.name())
        .field("powered", &self.powered.load(Ordering::Relaxed))
        .field("name", &self.name)
        .finish_non_exhaustive()
  }
}

impl Peripheral for BluerPeripheral {
  type SystemError = bluer::Error;
  type Server = BluerServer;
  type Advertiser = BluerAdvertiser;
  type Connection = BluerConnection;

  fn is_enabled(&self) -> bool {
    self.powered.load(Ordering::Relaxed)
  }

  fn set_name(&mut self, name: &str) -> Result<(), Self::SystemError> {
    self.name = Some(name.to_owned());
    let adapter = self.adapter.clone();
    let alias = name.to_owned();
    tokio::spawn(async move {
      if let Err(e) = adapter.set_alias(alias).await {
        warn!("Failed to set adapter alias: {e}");
      }
    });
    Ok(())
  }

  fn open_gatt_server(
      &mut self,
      callback: impl GattServerCallback<Self> + 'static,
  ) -> Result<Self::Server, Self::SystemError> {
    if self.tx.as_ref().map_or(false, |tx| !tx.is_closed()) {
      return Err(generic_err("GATT server already open"));
    }

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::task::spawn_local(run_event_loop(self.adapter.clone(), rx, tx.clone(), callback));
    tokio::task::spawn_local(monitor_adapter(self.adapter.clone(), self.powered.clone(), tx.clone()));
    self.tx = Some(tx.clone());

    Ok(BluerServer { tx, allocator: HandleAllocator::new() })
  }

  fn advertiser(&self) -> Option<Self::Advertiser> {
    self.tx.clone().map(|tx| BluerAdvertiser { tx })
  }
}

/// Each registered service is served as its own BlueZ application so it can be removed
/// independently.
pub struct BluerServer {
  tx: mpsc::UnboundedSender<Event>,
  allocator: HandleAllocator,
}

impl Debug for BluerServer {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BluerServer")
        .field("next_handle", &self.allocator.next)
        .finish_non_exhaustive()
  }
}

impl GattServer for BluerServer {
  type SystemError = bluer::Error;

  fn add_service(
      &mut self,
      service: &GattService,
  ) -> Result<Vec<(UUID, AttributeHandle)>, Self::SystemError> {
    let mut factory = ApplicationFactory {
      tx: self.tx.clone(),
      allocator: &mut self.allocator,
      mapping: Vec::new(),
    };
    let bluer_service = factory.new_service(service)?;
    let mapping = factory.mapping;

    let app = Application { services: vec![bluer_service], ..Default::default() };
    self
      .tx
      .send(Event::RegisterService { uuid: service.uuid, app })
      .map_err(|_| generic_err("GATT server shut down"))?;
    Ok(mapping)
  }

  fn remove_service(&mut self, uuid: &UUID) -> Result<(), Self::SystemError> {
    self
      .tx
      .send(Event::UnregisterService(*uuid))
      .map_err(|_| generic_err("GATT server shut down"))
  }
}

impl Drop for BluerServer {
  fn drop(&mut self) {
    let _ = self.tx.send(Event::Shutdown);
  }
}

struct ApplicationFactory<'a> {
  tx: mpsc::UnboundedSender<Event>,
  allocator: &'a mut HandleAllocator,
  mapping: Vec<(UUID, AttributeHandle)>,
}

impl ApplicationFactory<'_> {
  fn next_handle(&mut self, uuid: UUID) -> Result<AttributeHandle, bluer::Error> {
    let handle = self.allocator.next()?;
    self.mapping.push((uuid, handle));
    Ok(handle)
  }

  fn new_service(&mut self, spec: &GattService) -> Result<Service, bluer::Error> {
    let mut service = Service {
      uuid: convert_uuid(spec.uuid),
      handle: None,
      primary: spec.service_type == GattServiceType::Primary,
      ..Default::default()
    };
    for characteristic_spec in &spec.characteristics {
      let mut characteristic = self.new_characteristic_base(characteristic_spec)?;
      for descriptor_spec in &characteristic_spec.descriptors {
        if descriptor_spec.uuid == CCCD_UUID {
          // BlueZ serves the CCCD itself; keep the handle so the mapping stays complete.
          self.next_handle(CCCD_UUID)?;
          continue;
        }
        let descriptor = self.new_descriptor(descriptor_spec)?;
        characteristic.descriptors.push(descriptor);
      }
      service.characteristics.push(characteristic);
    }
    Ok(service)
  }

  fn new_characteristic_base(&mut self, spec: &GattCharacteristic) -> Result<Characteristic, bluer::Error> {
    let handle = self.next_handle(spec.uuid)?;

    let mut read_op = None;
    let mut write_op = None;
    let mut notify_op = None;

    for prop in spec.properties {
      match prop {
        GattCharacteristicProperty::Indicate | GattCharacteristicProperty::Notify => {
          notify_op.get_or_insert_with(|| CharacteristicNotify {
            method: CharacteristicNotifyMethod::Fun(self.new_notify_handler(handle)),
            ..Default::default()
          });
        }
        GattCharacteristicProperty::Read => {
          read_op.get_or_insert_with(|| CharacteristicRead {
            fun: self.new_read_handler::<CharacteristicReadRequest>(handle),
            ..Default::default()
          });
        }
        GattCharacteristicProperty::Write
        | GattCharacteristicProperty::WriteSigned
        | GattCharacteristicProperty::WriteNoResponse => {
          write_op.get_or_insert_with(|| CharacteristicWrite {
            method: CharacteristicWriteMethod::Fun(
              self.new_write_handler::<CharacteristicWriteRequest>(handle),
            ),
            ..Default::default()
          });
        }
        _ => {}
      }
    }

    for prop in spec.properties {
      match prop {
        GattCharacteristicProperty::Indicate => {
          if let Some(o) = notify_op.as_mut() {
            o.indicate = true;
          }
        }
        GattCharacteristicProperty::Notify => {
          if let Some(o) = notify_op.as_mut() {
            o.notify = true;
          }
        }
        GattCharacteristicProperty::WriteSigned => {
          if let Some(o) = write_op.as_mut() {
            o.authenticated_signed_writes = true;
          }
        }
        GattCharacteristicProperty::WriteNoResponse => {
          if let Some(o) = write_op.as_mut() {
            o.write_without_response = true;
          }
        }
        _ => {}
      }
    }

    for perm in spec.permissions {
      match perm {
        GattCharacteristicPermission::Read => {
          if let Some(o) = read_op.as_mut() {
            o.read = true;
          }
        }
        GattCharacteristicPermission::ReadEncrypted => {
          if let Some(o) = read_op.as_mut() {
            o.encrypt_read = true;
          }
        }
        GattCharacteristicPermission::Write => {
          if let Some(o) = write_op.as_mut() {
            o.write = true;
          }
        }
        GattCharacteristicPermission::WriteEncrypted => {
          if let Some(o) = write_op.as_mut() {
            o.encrypt_write = true;
          }
        }
        GattCharacteristicPermission::WriteEncryptedMitm => {
          return Err(generic_err("write encrypted mitm not supported"));
        }
        GattCharacteristicPermission::WriteSigned => {
          return Err(generic_err("write signed not supported"));
        }
        GattCharacteristicPermission::WriteSignedMitm => {
          return Err(generic_err("write signed mitm not supported"));
        }
      }
    }

    Ok(Characteristic {
      uuid: convert_uuid(spec.uuid),
      broadcast: spec.properties.contains(GattCharacteristicProperty::Broadcast),
      read: read_op,
      write: write_op,
      notify: notify_op,
      ..Default::default()
    })
  }

  fn new_descriptor(&mut self, spec: &GattDescriptor) -> Result<Descriptor, bluer::Error> {
    let handle = self.next_handle(spec.uuid)?;

    let mut read_op = None;
    let mut write_op = None;

    for perm in spec.permissions {
      match perm {
        GattDescriptorPermission::Read | GattDescriptorPermission::ReadEncrypted => {
          let op = read_op.get_or_insert_with(|| DescriptorRead {
            fun: self.new_read_handler::<DescriptorReadRequest>(handle),
            ..Default::default()
          });
          op.read |= perm == GattDescriptorPermission::Read;
          op.encrypt_read |= perm == GattDescriptorPermission::ReadEncrypted;
        }
        GattDescriptorPermission::Write | GattDescriptorPermission::WriteEncrypted => {
          let op = write_op.get_or_insert_with(|| DescriptorWrite {
            fun: self.new_write_handler::<DescriptorWriteRequest>(handle),
            ..Default::default()
          });
          op.write |= perm == GattDescriptorPermission::Write;
          op.encrypt_write |= perm == GattDescriptorPermission::WriteEncrypted;
        }
        other => return Err(generic_err(&std::format!("descriptor permission {other:?} not supported"))),
      }
    }

    Ok(Descriptor {
      uuid: convert_uuid(spec.uuid),
      read: read_op,
      write: write_op,
      ..Default::default()
    })
  }

  fn new_read_handler<R>(&self, handle: AttributeHandle) -> ReadFun<R>
  where
      R: RequestFields + Send + 'static,
  {
    let local_tx = self.tx.clone();
    Box::new(move |req| {
      let tx = local_tx.clone();
      async move {
        let (responder_tx, responder_rx) = oneshot::channel();
        tx.send(Event::Read {
          conn: BluerConnection::new(req.address()),
          mtu: req.mtu(),
          handle,
          responder: BluerResponder { tx: Some(responder_tx) },
        })
            .map_err(|_| ReqError::Failed)?;
        let (offset, value) = responder_rx
            .await
            .map_err(|_| ReqError::Failed)?
            .map_err(att_to_req_error)?;
        let start = usize::from(offset) + usize::from(req.offset());
        value.get(start..).map(<[u8]>::to_vec).ok_or(ReqError::InvalidOffset)
      }
      .boxed()
    })
  }

  fn new_write_handler<R>(&self, handle: AttributeHandle) -> WriteFun<R>
  where
      R: RequestFields + Send + 'static,
  {
    let local_tx = self.tx.clone();
    Box::new(move |value, req| {
      let tx = local_tx.clone();
      async move {
        let (responder_tx, responder_rx) = oneshot::channel();
        tx.send(Event::Write {
          conn: BluerConnection::new(req.address()),
          mtu: req.mtu(),
          handle,
          responder: BluerResponder { tx: Some(responder_tx) },
          offset: req.offset(),
          value,
        })
            .map_err(|_| ReqError::Failed)?;
        responder_rx
            .await
            .map_err(|_| ReqError::Failed)?
            .map_err(att_to_req_error)?;
        Ok(())
      }
      .boxed()
    })
  }

  fn new_notify_handler(&self, handle: AttributeHandle) -> CharacteristicNotifyFun {
    let local_tx = self.tx.clone();
    Box::new(move |mut notifier| {
      let tx = local_tx.clone();
      async move {
        let (notify_tx, mut notify_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let writer = BluerWriter { tx: notify_tx };
        if tx.send(Event::Subscribe { conn: BluerConnection::any(), handle, writer }).is_err() {
          warn!("Server shutdown race!");
          return;
        }
        tokio::spawn(async move {
          while let Some(value) = notify_rx.recv().await {
            if let Err(e) = notifier.notify(value).await {
              if notifier.is_stopped() {
                break;
              }
              warn!("Error sending notify: {e}");
            }
          }
          if tx.send(Event::Unsubscribe { conn: BluerConnection::any(), handle }).is_err() {
            debug!("Server already shut down");
          }
        });
      }
      .boxed()
    })
  }
}

type ReadFun<R> =
    Box<dyn (Fn(R) -> Pin<Box<dyn Future<Output = ReqResult<Vec<u8>>> + Send>>) + Send + Sync>;

type WriteFun<R> =
    Box<dyn Fn(Vec<u8>, R) -> Pin<Box<dyn Future<Output = ReqResult<()>> + Send>> + Send + Sync>;

/// Common fields of the bluer request types.
trait RequestFields {
  fn address(&self) -> &Address;

  fn offset(&self) -> u16;

  fn mtu(&self) -> Option<u16> {
    None
  }
}

impl RequestFields for CharacteristicReadRequest {
  fn address(&self) -> &Address {
    &self.device_address
  }

  fn offset(&self) -> u16 {
    self.offset
  }

  fn mtu(&self) -> Option<u16> {
    Some(self.mtu)
  }
}

impl RequestFields for CharacteristicWriteRequest {
  fn address(&self) -> &Address {
    &self.device_address
  }

  fn offset(&self) -> u16 {
    self.offset
  }

  fn mtu(&self) -> Option<u16> {
    Some(self.mtu)
  }
}

impl RequestFields for DescriptorReadRequest {
  fn address(&self) -> &Address {
    &self.device_address
  }

  fn offset(&self) -> u16 {
    self.offset
  }
}

impl RequestFields for DescriptorWriteRequest {
  fn address(&self) -> &Address {
    &self.device_address
  }

  fn offset(&self) -> u16 {
    self.offset
  }
}

fn att_to_req_error(e: AttError) -> ReqError {
  match e {
    AttError::ReadNotPermitted | AttError::WriteNotPermitted => ReqError::NotPermitted,
    AttError::InvalidPdu | AttError::RequestNotSupported => ReqError::NotSupported,
    AttError::InsufficientAuthentication | AttError::InsufficientAuthorization => {
      ReqError::NotAuthorized
    }
    AttError::InvalidOffset => ReqError::InvalidOffset,
    AttError::InvalidAttributeValueLength => ReqError::InvalidValueLength,
    _ => ReqError::Failed,
  }
}

struct HandleAllocator {
  next: u16,
}

impl HandleAllocator {
  fn new() -> Self {
    Self { next: 1 }
  }

  fn next(&mut self) -> Result<AttributeHandle, bluer::Error> {
    let handle = NonZeroU16::new(self.next).ok_or_else(|| generic_err("attribute handles exhausted"))?;
    // Wrapping to 0 makes the following call fail.
    self.next = self.next.checked_add(1).unwrap_or(0);
    Ok(AttributeHandle(handle))
  }
}

fn generic_err(debug_message: &str) -> bluer::Error {
  bluer::Error::from(std::io::Error::new(std::io::ErrorKind::Other, debug_message))
}

fn start_failed_reason(error: bluer::Error) -> AdvStartFailedReason<'static, bluer::Error> {
  match error.kind {
    bluer::ErrorKind::InvalidLength => AdvStartFailedReason::DataTooLarge,
    bluer::ErrorKind::AlreadyExists => AdvStartFailedReason::AlreadyStarted,
    bluer::ErrorKind::NotSupported => AdvStartFailedReason::UnsupportedFeature("LE advertising"),
    _ => AdvStartFailedReason::SystemError(error),
  }
}

fn convert_uuid(uuid: UUID) -> Uuid {
  Uuid::from_u128(uuid.as_u128())
}

/// The advertisement BlueZ is holding for us, or a registration still in flight.
#[derive(Debug, PartialEq)]
enum AdvertisingSlot<H> {
  Idle,
  Pending { stop_requested: bool },
  Active(H),
}

impl<H> Default for AdvertisingSlot<H> {
  fn default() -> Self {
    AdvertisingSlot::Idle
  }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum StartAction {
  Register,
  /// A stopped registration is still in flight; it serves this start instead.
  ReusePending,
  AlreadyStarted,
}

impl<H> AdvertisingSlot<H> {
  fn begin_start(&mut self) -> StartAction {
    match self {
      AdvertisingSlot::Idle => {
        *self = AdvertisingSlot::Pending { stop_requested: false };
        StartAction::Register
      }
      AdvertisingSlot::Pending { stop_requested } if *stop_requested => {
        *stop_requested = false;
        StartAction::ReusePending
      }
      AdvertisingSlot::Pending { .. } | AdvertisingSlot::Active(_) => StartAction::AlreadyStarted,
    }
  }

  /// Settle a registration.  Returns `None` when a stop arrived while it was in flight: the
  /// handle is dropped (unregistering it) and nothing is reported.
  fn finish_start<E>(&mut self, result: Result<H, E>) -> Option<Result<(), E>> {
    let stop_requested = matches!(self, AdvertisingSlot::Pending { stop_requested: true });
    *self = AdvertisingSlot::Idle;
    if stop_requested {
      debug!("Advertisement registered after a stop was requested, dropping it");
      return None;
    }
    Some(result.map(|handle| *self = AdvertisingSlot::Active(handle)))
  }

  /// Returns whether an active advertisement was removed.
  fn stop(&mut self) -> bool {
    match self {
      AdvertisingSlot::Active(_) => {
        *self = AdvertisingSlot::Idle;
        true
      }
      AdvertisingSlot::Pending { stop_requested } => {
        *stop_requested = true;
        false
      }
      AdvertisingSlot::Idle => false,
    }
  }
}

/// Collections of bluer handles that keep the services and advertisement alive.  Dropping a
/// handle unregisters it from BlueZ.
#[derive(Default)]
struct KeepAliveHandles {
  apps: BTreeMap<u128, ApplicationHandle>,
  advertisement: AdvertisingSlot<AdvertisementHandle>,

  /// Bumped on every successful start so a stale timeout cannot stop a newer advertisement.
  advertisement_generation: u64,
}

async fn run_event_loop(
    adapter: Adapter,
    mut rx: mpsc::UnboundedReceiver<Event>,
    self_tx: mpsc::UnboundedSender<Event>,
    mut callback: impl GattServerCallback<BluerPeripheral>,
) {
  let mut handles = KeepAliveHandles::default();
  let mut mtus: BTreeMap<BluetoothAddress, u16> = BTreeMap::new();

  while let Some(event) = rx.recv().await {
    match event {
      Event::RegisterService { uuid, app } => {
        let adapter = adapter.clone();
        let self_tx = self_tx.clone();
        tokio::spawn(async move {
          let result = adapter.serve_gatt_application(app).await;
          let _ = self_tx.send(Event::OnRegisterResult { uuid, result });
        });
      }
      Event::OnRegisterResult { uuid, result } => match result {
        Ok(handle) => {
          info!("Serving service {uuid}");
          handles.apps.insert(uuid.as_u128(), handle);
        }
        Err(error) => {
          error!("BlueZ rejected service {uuid}: {error}");
          callback.on_event(GattServerEvent::ServerShutdown { error });
          return;
        }
      },
      Event::UnregisterService(uuid) => {
        if handles.apps.remove(&uuid.as_u128()).is_none() {
          debug!("Service {uuid} was not being served");
        }
      }
      Event::Shutdown => {
        debug!("GATT server dropped, shutting down!");
        return;
      }
      Event::PoweredOff => {
        callback.on_event(GattServerEvent::ServerShutdown {
          error: generic_err("adapter powered off"),
        });
        return;
      }
      Event::RequestAdvStart { adv, timeout } => {
        match handles.advertisement.begin_start() {
          StartAction::Register => {}
          StartAction::ReusePending => continue,
          StartAction::AlreadyStarted => {
            callback.on_event(GattServerEvent::AdvertisingStartFail {
              reason: AdvStartFailedReason::AlreadyStarted,
            });
            continue;
          }
        }
        let self_tx = self_tx.clone();
        let adapter = adapter.clone();
        tokio::spawn(async move {
          let result = adapter.advertise(adv).await;
          let _ = self_tx.send(Event::OnAdvStartResult { result, timeout });
        });
      }
      Event::AdvRejected => {
        callback.on_event(GattServerEvent::AdvertisingStartFail {
          reason: AdvStartFailedReason::DataTooLarge,
        });
      }
      Event::OnAdvStartResult { result, timeout } => {
        let Some(result) = handles.advertisement.finish_start(result) else {
          continue;
        };
        let event = match result {
          Ok(()) => {
            handles.advertisement_generation += 1;
            if let Some(timeout) = timeout {
              let generation = handles.advertisement_generation;
              let self_tx = self_tx.clone();
              tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                let _ = self_tx.send(Event::AdvTimeout(generation));
              });
            }
            GattServerEvent::AdvertisingStarted { remaining_connections: None }
          }
          Err(error) => GattServerEvent::AdvertisingStartFail { reason: start_failed_reason(error) },
        };
        callback.on_event(event);
      }
      Event::AdvTimeout(generation) => {
        if generation == handles.advertisement_generation && handles.advertisement.stop() {
          callback.on_event(GattServerEvent::AdvertisingStopped { reason: AdvStopReason::Timeout });
        }
      }
      Event::RequestAdvStop => {
        if handles.advertisement.stop() {
          callback.on_event(GattServerEvent::AdvertisingStopped { reason: AdvStopReason::Requested });
        }
      }
      Event::Connected(address) => {
        let conn = BluerConnection { address };
        callback.on_event(GattServerEvent::Connected { connection: &conn });
      }
      Event::Disconnected(address) => {
        mtus.remove(&address);
        let conn = BluerConnection { address };
        callback.on_event(GattServerEvent::Disconnected {
          connection: &conn,
          reason: BluetoothError::ClosedByPeer(RemoteShutdownReason::NoneGiven),
        });
      }
      Event::Read { conn, mtu, handle, mut responder } => {
        report_mtu(&mut callback, &mut mtus, &conn, mtu);
        callback.on_event(GattServerEvent::ReadRequest {
          connection: &conn,
          handle,
          responder: &mut responder,
        });
      }
      Event::Write { conn, mtu, handle, mut responder, offset, value } => {
        report_mtu(&mut callback, &mut mtus, &conn, mtu);
        callback.on_event(GattServerEvent::WriteRequest {
          connection: &conn,
          handle,
          responder: Some(&mut responder),
          offset,
          value: &value,
        });
      }
      Event::Subscribe { conn, handle, mut writer } => {
        callback.on_event(GattServerEvent::Subscribe {
          connection: &conn,
          handle,
          writer: &mut writer,
        });
      }
      Event::Unsubscribe { conn, handle } => {
        callback.on_event(GattServerEvent::Unsubscribe { connection: &conn, handle });
      }
    };
  }
}

/// BlueZ negotiates the MTU on its own and only exposes it on requests.
fn report_mtu(
    callback: &mut impl GattServerCallback<BluerPeripheral>,
    mtus: &mut BTreeMap<BluetoothAddress, u16>,
    conn: &BluerConnection,
    mtu: Option<u16>,
) {
  let Some(mtu) = mtu else {
    return;
  };
  if mtus.insert(conn.address, mtu) != Some(mtu) {
    callback.on_event(GattServerEvent::MtuChanged { connection: conn, mtu: Mtu::new(mtu) });
  }
}

/// Follows adapter power and device connection state until the server goes away.
async fn monitor_adapter(adapter: Adapter, powered: Arc<AtomicBool>, tx: mpsc::UnboundedSender<Event>) {
  let events = match adapter.events().await {
    Ok(events) => events,
    Err(e) => {
      warn!("Cannot monitor adapter, connection state will not be reported: {e}");
      return;
    }
  };
  let mut events = Box::pin(events);

  match adapter.device_addresses().await {
    Ok(addresses) => {
      for address in addresses {
        tokio::task::spawn_local(watch_device(adapter.clone(), address, tx.clone()));
      }
    }
    Err(e) => warn!("Cannot list known devices: {e}"),
  }

  while let Some(event) = events.next().await {
    match event {
      AdapterEvent::DeviceAdded(address) => {
        tokio::task::spawn_local(watch_device(adapter.clone(), address, tx.clone()));
      }
      AdapterEvent::PropertyChanged(AdapterProperty::Powered(on)) => {
        info!("Adapter powered={on}");
        powered.store(on, Ordering::Relaxed);
        if !on && tx.send(Event::PoweredOff).is_err() {
          return;
        }
      }
      _ => {}
    }
    if tx.is_closed() {
      return;
    }
  }
}

async fn watch_device(adapter: Adapter, address: Address, tx: mpsc::UnboundedSender<Event>) {
  let Ok(device) = adapter.device(address) else {
    return;
  };
  let Ok(events) = device.events().await else {
    return;
  };
  let mut events = Box::pin(events);
  let peer = BluetoothAddress(address.0);

  let mut connected = device.is_connected().await.unwrap_or(false);
  if connected && tx.send(Event::Connected(peer)).is_err() {
    return;
  }

  while let Some(event) = events.next().await {
    if let DeviceEvent::PropertyChanged(DeviceProperty::Connected(now)) = event {
      if now == connected {
        continue;
      }
      connected = now;
      let event = if now { Event::Connected(peer) } else { Event::Disconnected(peer) };
      if tx.send(event).is_err() {
        return;
      }
    }
  }

  // The device object is gone, which BlueZ only does once it disconnected.
  if connected {
    let _ = tx.send(Event::Disconnected(peer));
  }
}

#[derive(Clone)]
pub struct BluerAdvertiser {
  tx: mpsc::UnboundedSender<Event>,
}

impl Debug for BluerAdvertiser {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BluerAdvertiser").finish_non_exhaustive()
  }
}

impl GapAdvertiser for BluerAdvertiser {
  fn request_start(&self, advertisement: Advertisement) {
    // BlueZ only reports a generic failure for oversized data, check up front.
    if let Err(e) = advertisement.build_payload() {
      warn!("Advertisement does not fit the advertising PDU: {e:?}");
      let _ = self.tx.send(Event::AdvRejected);
      return;
    }

    let is_connectable = advertisement.is_connectable();
    let params = advertisement.params;
    let adv = bluer::adv::Advertisement {
      advertisement_type: if is_connectable { Type::Peripheral } else { Type::Broadcast },
      service_uuids: advertisement.service_uuids.iter().map(|u| convert_uuid(*u)).collect(),
      manufacturer_data: advertisement.manufacturer_data,
      discoverable: Some(advertisement.is_discoverable),
      local_name: advertisement.local_name,
      min_interval: params.interval_min,
      max_interval: params.interval_max,
      tx_power: Some(params.tx_power.dbm().into()),
      timeout: params.timeout,
      ..Default::default()
    };

    let _ = self.tx.send(Event::RequestAdvStart { adv, timeout: params.timeout });
  }

  fn request_stop(&self) {
    let _ = self.tx.send(Event::RequestAdvStop);
  }
}

#[derive(Debug, Clone)]
pub struct BluerConnection {
  address: BluetoothAddress,
}

impl BluerConnection {
  fn new(address: &Address) -> Self {
    Self { address: BluetoothAddress(address.0) }
  }

  fn any() -> Self {
    Self { address: BluetoothAddress::ANY }
  }
}

impl GattConnection for BluerConnection {
  type SystemError = bluer::Error;
  type Responder = BluerResponder;
  type Writer = BluerWriter;

  fn peer_address(&self) -> &BluetoothAddress {
    &self.address
  }
}

#[derive(Debug)]
pub struct BluerResponder {
  tx: Option<oneshot::Sender<Result<(u16, Vec<u8>), AttError>>>,
}

impl GattResponder for BluerResponder {
  type SystemError = bluer::Error;

  fn respond(&mut self, response: Result<Response<'_>, AttError>) -> Result<(), Self::SystemError> {
    let mapped = response.map(|r| (r.offset, r.value.to_owned()));
    self
      .tx
      .take()
      .ok_or_else(|| generic_err("Already sent response!"))?
      .send(mapped)
      .map_err(|_| generic_err("Server shutdown"))
  }
}

impl Drop for BluerResponder {
  fn drop(&mut self) {
    if let Some(tx) = self.tx.take() {
      warn!("Failed to call respond on GattResponder!");
      let _ = tx.send(Err(AttError::AttributeNotFound));
    }
  }
}

#[derive(Clone)]
pub struct BluerWriter {
  tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl Debug for BluerWriter {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BluerWriter").finish_non_exhaustive()
  }
}

impl GattWriter for BluerWriter {
  type SystemError = bluer::Error;

  fn write(&mut self, value: &[u8]) -> Result<(), Self::SystemError> {
    self.tx.send(value.to_owned()).map_err(|_| generic_err("unsubscribed"))
  }
}

enum Event {
  RegisterService { uuid: UUID, app: Application },
  OnRegisterResult { uuid: UUID, result: Result<ApplicationHandle, bluer::Error> },
  UnregisterService(UUID),
  Shutdown,
  PoweredOff,
  RequestAdvStart { adv: bluer::adv::Advertisement, timeout: Option<Duration> },
  AdvRejected,
  OnAdvStartResult {
    result: Result<AdvertisementHandle, bluer::Error>,
    timeout: Option<Duration>,
  },
  AdvTimeout(u64),
  RequestAdvStop,
  Connected(BluetoothAddress),
  Disconnected(BluetoothAddress),
  Read {
    conn: BluerConnection,
    mtu: Option<u16>,
    handle: AttributeHandle,
    responder: BluerResponder,
  },
  Write {
    conn: BluerConnection,
    mtu: Option<u16>,
    handle: AttributeHandle,
    responder: BluerResponder,
    offset: u16,
    value: Vec<u8>,
  },
  Subscribe {
    conn: BluerConnection,
    handle: AttributeHandle,
    writer: BluerWriter,
  },
  Unsubscribe {
    conn: BluerConnection,
    handle: AttributeHandle,
  },
}
