use crate::att_error::AttError;
use core::fmt::Debug;

use crate::bluetooth_address::BluetoothAddress;

/// A connected central as seen from the GATT server.
pub trait GattConnection {
  type SystemError: Debug;
  type Responder: GattResponder + Debug;
  type Writer: GattWriter + Debug + Clone;

  /// Access the connected peer's Bluetooth address.  Backends that cannot identify the peer
  /// report [BluetoothAddress::ANY].
  fn peer_address(&self) -> &BluetoothAddress;
}

/// Answers exactly one read or write request.
pub trait GattResponder {
  type SystemError: Debug;

  /// Send response to read or write request.  Responding twice is an error.
  fn respond(&mut self, response: Result<Response<'_>, AttError>) -> Result<(), Self::SystemError>;
}

#[derive(Debug)]
pub struct Response<'a> {
  pub offset: u16,
  pub value: &'a [u8],
}

impl<'a> Response<'a> {
  pub fn new(offset: u16, value: &'a [u8]) -> Self {
    Self { offset, value }
  }

  pub fn complete(value: &'a [u8]) -> Self {
    Self::new(0, value)
  }

  /// Acknowledge a write.
  pub fn empty() -> Self {
    Self::new(0, &[])
  }
}

/// Server-initiated updates of one characteristic towards one subscribed peer.
pub trait GattWriter {
  type SystemError: Debug;

  /// Queue a notification (or indication, whichever the peer enabled) carrying `value`.  Must
  /// not block: the backend delivers asynchronously and the caller only learns about
  /// failures to enqueue.
  fn write(&mut self, value: &[u8]) -> Result<(), Self::SystemError>;
}
