use alloc::rc::Rc;
use core::cell::RefCell;
use core::fmt::Debug;

use log::{debug, error, info, trace, warn};

use crate::att_error::AttError;
use crate::broadcaster::Shared;
use crate::descriptors::CccdValue;
use crate::gatt_connection::{GattConnection, GattResponder, Response};
use crate::gatt_server_cb::{AdvStopReason, GattServerCallback, GattServerEvent};
use crate::host::HostEvent;
use crate::peripheral::Peripheral;

/// Callback handed to the platform when the GATT server is opened.  Shares state with the
/// [crate::broadcaster::SensorBroadcaster] that created it.
pub(crate) struct GattEventHandler<P: Peripheral> {
  shared: Rc<RefCell<Shared<P>>>,
}

impl<P: Peripheral> GattEventHandler<P> {
  pub(crate) fn new(shared: Rc<RefCell<Shared<P>>>) -> Self {
    Self { shared }
  }
}

fn respond<R: GattResponder>(responder: &mut R, response: Result<Response<'_>, AttError>) {
  if let Err(e) = responder.respond(response) {
    error!("Responder failed: {e:?}");
  }
}

impl<P: Peripheral + Debug> GattServerCallback<P> for GattEventHandler<P> {
  fn on_event(&mut self, event: GattServerEvent<'_, P>) {
    trace!("event: {event:?}");
    let mut shared = self.shared.borrow_mut();
    let shared = &mut *shared;

    match event {
      GattServerEvent::ServerShutdown { error } => {
        error!("Server shutdown: {error:?}");
        let was_advertising = shared.advertising.on_stopped().is_some();
        let had_peers = shared.registry.connected_count() > 0;
        let had_subscribers = shared.registry.subscriber_count() > 0;
        shared.registry.clear();
        shared.server_lost = true;
        if was_advertising {
          shared.relay.emit(HostEvent::advertising_error(false, "GATT server shut down"));
        }
        if had_peers {
          shared.relay.emit(HostEvent::connection(false));
        }
        if had_subscribers {
          shared.relay.emit(HostEvent::subscription(false));
        }
      }
      GattServerEvent::AdvertisingStarted { remaining_connections } => {
        info!("Advertising started");
        debug!("remaining_connections={remaining_connections:?}");
        if let Some(e) = shared.advertising.on_started() {
          shared.relay.emit(e);
        }
      }
      GattServerEvent::AdvertisingStopped { reason: AdvStopReason::Requested } => {
        // Already reported by stop_advertising; a restart may be in flight since.
        debug!("Advertising stop confirmed");
      }
      GattServerEvent::AdvertisingStopped { reason } => {
        info!("Advertising stopped: reason={reason:?}");
        if let Some(e) = shared.advertising.on_stopped() {
          shared.relay.emit(e);
        }
      }
      GattServerEvent::AdvertisingStartFail { reason } => {
        error!("Advertising failed: {reason:?}");
        let e = shared.advertising.on_start_failed(reason.code());
        shared.relay.emit(e);
      }
      GattServerEvent::Connected { connection } => {
        let address = *connection.peer_address();
        info!("Device connected: {address}");
        shared.registry.connect(address);
        shared.relay.emit(HostEvent::connection(true));
      }
      GattServerEvent::Disconnected { connection, reason } => {
        let address = *connection.peer_address();
        info!("Device disconnected: {address}: {reason:?}");
        shared.registry.disconnect(&address);
        shared.relay.emit(HostEvent::connection(false));
        shared.relay.emit(HostEvent::subscription(false));
      }
      GattServerEvent::MtuChanged { connection, mtu } => {
        info!("MTU changed on {connection:?}: mtu={mtu}");
        shared.registry.set_mtu(*connection.peer_address(), mtu);
      }
      GattServerEvent::ReadRequest { connection, handle, responder } => {
        debug!("Got read request on {connection:?}: handle={handle}");
        let Some(characteristic) = shared.characteristic.as_ref() else {
          warn!("Read before any service was registered");
          respond(responder, Err(AttError::InvalidHandle));
          return;
        };
        if handle == characteristic.handle {
          respond(responder, Ok(Response::complete(&characteristic.value)));
        } else if Some(handle) == characteristic.cccd_handle {
          let config = if shared.registry.is_subscribed(connection.peer_address()) {
            CccdValue::Notify
          } else {
            CccdValue::Disabled
          };
          respond(responder, Ok(Response::complete(&config.as_bytes())));
        } else {
          warn!("Unknown handle={handle}");
          respond(responder, Err(AttError::InvalidHandle));
        }
      }
      GattServerEvent::WriteRequest { connection, handle, responder, offset, value } => {
        debug!(
          "Got write request on {connection:?}: handle={handle}, offset={offset}, len={}",
          value.len()
        );
        let known = shared
            .characteristic
            .as_ref()
            .map_or(false, |c| c.handle == handle || c.cccd_handle == Some(handle));
        let response = if !known {
          warn!("Unknown handle={handle}");
          Err(AttError::InvalidHandle)
        } else {
          // The sensor characteristic is read/notify only, and CCCD writes belong to the backend.
          Err(AttError::WriteNotPermitted)
        };
        if let Some(responder) = responder {
          respond(responder, response.map(|()| Response::empty()));
        }
      }
      GattServerEvent::Subscribe { connection, handle, writer } => {
        let address = *connection.peer_address();
        debug!("Got subscribe on {connection:?}: handle={handle}");
        if shared.characteristic.as_ref().map(|c| c.handle) != Some(handle) {
          warn!("Subscribe to unknown handle={handle}");
          return;
        }
        if shared.registry.connected_count() == 0 {
          // The stack never reported this connection; the subscription is the first sign of it.
          info!("Device connected on subscribe: {address}");
          shared.relay.emit(HostEvent::connection(true));
        }
        let writer: <P::Connection as GattConnection>::Writer = writer.clone();
        if shared.registry.subscribe(address, writer) {
          info!("Subscribed to notifications: {address}");
          shared.relay.emit(HostEvent::subscription(true));
        }
      }
      GattServerEvent::Unsubscribe { connection, handle } => {
        let address = *connection.peer_address();
        debug!("Got unsubscribe on {connection:?}: handle={handle}");
        if shared.characteristic.as_ref().map(|c| c.handle) != Some(handle) {
          return;
        }
        if shared.registry.unsubscribe(&address) {
          info!("Unsubscribed from notifications: {address}");
          shared.relay.emit(HostEvent::subscription(false));
        }
      }
    }
  }
}
