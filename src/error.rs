use alloc::format;
use alloc::string::String;
use core::fmt::Debug;

use thiserror::Error;

pub type Result<T> = core::result::Result<T, BroadcasterError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BroadcasterError {
  #[error("Bluetooth not enabled")]
  BluetoothUnavailable,

  #[error("Advertiser not initialized")]
  AdvertiserNotInitialized,

  #[error("GATT server not initialized")]
  ServerNotInitialized,

  #[error("No service registered")]
  NoServiceRegistered,

  #[error("invalid UUID: {0:?}")]
  InvalidUuid(String),

  #[error("invalid arguments for {method}: {reason}")]
  InvalidArguments { method: String, reason: String },

  #[error("invalid configuration: {0}")]
  InvalidConfig(String),

  #[error("platform error: {0}")]
  Platform(String),
}

impl BroadcasterError {
  pub(crate) fn platform(error: impl Debug) -> Self {
    BroadcasterError::Platform(format!("{error:?}"))
  }

  /// Failures the host learns about through an `advertisingStatus` event rather than through
  /// the method result.
  pub fn is_reported_as_event(&self) -> bool {
    matches!(
      self,
      BroadcasterError::BluetoothUnavailable
          | BroadcasterError::AdvertiserNotInitialized
          | BroadcasterError::NoServiceRegistered
    )
  }

  /// Stable machine readable code for method channel errors.
  pub fn code(&self) -> &'static str {
    match self {
      BroadcasterError::BluetoothUnavailable => "bluetooth_unavailable",
      BroadcasterError::AdvertiserNotInitialized | BroadcasterError::ServerNotInitialized => {
        "not_initialized"
      }
      BroadcasterError::NoServiceRegistered => "no_service",
      BroadcasterError::InvalidUuid(_)
      | BroadcasterError::InvalidArguments { .. }
      | BroadcasterError::InvalidConfig(_) => "invalid_argument",
      BroadcasterError::Platform(_) => "platform_error",
    }
  }
}
