use crate::bluetooth_error::BluetoothError;
use crate::descriptors::AttributeHandle;
use crate::gatt_connection::GattConnection;
use crate::mtu::Mtu;
use crate::peripheral::Peripheral;
use core::fmt::Debug;

pub trait GattServerCallback<P: Peripheral + ?Sized> {
  fn on_event(&mut self, event: GattServerEvent<'_, P>);
}

impl<P, F> GattServerCallback<P> for F
where
  F: FnMut(GattServerEvent<P>),
  P: Peripheral,
{
  fn on_event(&mut self, event: GattServerEvent<'_, P>) {
    (self)(event)
  }
}

#[derive(Debug)]
pub enum GattServerEvent<'a, P: Peripheral + ?Sized> {
  /// Server has either spuriously shutdown or failed to come up asynchronously (adapter
  /// powered off, service registration rejected by the stack).  All future callback events will
  /// stop and the advertiser will no longer function.
  ServerShutdown { error: P::SystemError },

  /// Advertising has started.  New connections will now be accepted.
  AdvertisingStarted {
    /// A hint if available of the total number of connections remaining before our capacity
    /// is reached.
    remaining_connections: Option<u16>,
  },

  /// Advertising has stopped by developer request or an some external event.  New connections
  /// will not be accepted until advertising is started again and the connectable flag is set.
  /// Advertising can be restarted again using heuristics based on the stop reason.
  AdvertisingStopped { reason: AdvStopReason },

  /// An attempt to start advertising has failed.  It may be retryable based on the supplied
  /// reason and implementation behaviour.
  AdvertisingStartFail {
    reason: AdvStartFailedReason<'a, P::SystemError>,
  },

  /// Peer connected.  Some stacks disable advertising automatically, in which case they also
  /// report [GattServerEvent::AdvertisingStopped] with [AdvStopReason::AcceptedConnection].
  Connected { connection: &'a P::Connection },

  /// Peer disconnected.  Any subscriptions the peer held are gone with it.
  Disconnected {
    connection: &'a P::Connection,
    reason: BluetoothError,
  },

  /// MTU negotiation has completed and a new MTU value should be used.
  MtuChanged {
    connection: &'a P::Connection,

    /// New MTU value, all future writes should respect this value.  Note that the BLE standard
    /// requires that ATT writes actually observe `mtu - 3` as the limit, including all writes
    /// made available through this crate's APIs.
    mtu: Mtu,
  },

  /// Issue a read request for either a characteristic or descriptor.  Callers should compare the
  /// provided `handle` field with the mapping returned by [crate::peripheral::GattServer::add_service].
  ReadRequest {
    connection: &'a P::Connection,
    handle: AttributeHandle,

    /// Reference to a responder that is used to issue a response to the peer.
    responder: &'a mut <P::Connection as GattConnection>::Responder,
  },

  /// Issue a write request for either a characteristic or descriptor.  Backends that implement
  /// the CCCD themselves report subscription changes as [GattServerEvent::Subscribe] and
  /// [GattServerEvent::Unsubscribe] instead of raw writes to it.
  WriteRequest {
    connection: &'a P::Connection,
    handle: AttributeHandle,

    /// Reference to a responder that is used to issue a response to the peer.  Optional
    /// in this case since writes can be issued in a way that does not request (or warrant) a
    /// response.
    responder: Option<&'a mut <P::Connection as GattConnection>::Responder>,

    /// Offset within the attribute value at which `value` applies.
    offset: u16,

    /// Actual value that the client is writing.
    value: &'a [u8],
  },

  /// A peer enabled notifications or indications on the characteristic at `handle`.  The writer
  /// should be cloned and kept until the matching [GattServerEvent::Unsubscribe] or
  /// [GattServerEvent::Disconnected].
  ///
  /// Backends own the CCCD: they decode the peer's descriptor writes (see
  /// [crate::descriptors::CccdValue]), acknowledge them, and emit Subscribe/Unsubscribe.
  /// Values other than enable/disable leave the subscription untouched.
  Subscribe {
    connection: &'a P::Connection,
    handle: AttributeHandle,

    writer: &'a mut <P::Connection as GattConnection>::Writer,
  },

  /// The peer is no longer interested in receiving updates to the specified characteristic.
  /// See notes on [GattServerEvent::Subscribe]!
  Unsubscribe {
    connection: &'a P::Connection,
    handle: AttributeHandle,
  },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AdvStopReason {
  /// Some BLE stacks automatically disable advertising when an incoming connection is made.
  AcceptedConnection,

  /// Developer requested that advertising be stopped.
  Requested,

  /// The advertising timeout elapsed.
  Timeout,
}

#[derive(Debug, Clone)]
pub enum AdvStartFailedReason<'a, E: Debug> {
  /// Advertisement contained a feature not supported by the current implementation.  Check
  /// the implementation documentation and/or consult the contained error message to learn more.  This
  /// should be considered programmer error.
  UnsupportedFeature(&'a str),

  /// The encoded advertisement does not fit into the advertising PDU.
  DataTooLarge,

  /// The controller has no free advertising sets.
  TooManyAdvertisers,

  /// This advertiser is already running.
  AlreadyStarted,

  /// Uncategorized system error from the implementation.
  SystemError(E),
}

impl<'a, E: Debug> AdvStartFailedReason<'a, E> {
  /// Numeric failure code as reported by mobile stacks, passed through to the host verbatim.
  pub fn code(&self) -> u8 {
    match self {
      AdvStartFailedReason::DataTooLarge => 1,
      AdvStartFailedReason::TooManyAdvertisers => 2,
      AdvStartFailedReason::AlreadyStarted => 3,
      AdvStartFailedReason::SystemError(_) => 4,
      AdvStartFailedReason::UnsupportedFeature(_) => 5,
    }
  }
}
