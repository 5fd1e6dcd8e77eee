use alloc::format;
use core::time::Duration;

use serde::Deserialize;

use crate::advertisement::{AdvertiseMode, AdvertisementParams, ConnectMode, TxPowerLevel};
use crate::error::{BroadcasterError, Result};

/// Advertising settings applied on every `startAdvertising`.  Every field has a default, so an
/// empty document is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BroadcasterConfig {
  pub advertise_mode: AdvertiseMode,
  pub tx_power: TxPowerLevel,
  pub connectable: bool,

  /// Put the device name into the advertising PDU.  Long names combined with a 128-bit service
  /// UUID will not fit.
  pub include_device_name: bool,

  /// Stop advertising after this many milliseconds; 0 advertises until stopped.
  pub timeout_ms: u32,
}

impl Default for BroadcasterConfig {
  fn default() -> Self {
    Self {
      advertise_mode: AdvertiseMode::Balanced,
      tx_power: TxPowerLevel::Medium,
      connectable: true,
      include_device_name: true,
      timeout_ms: 0,
    }
  }
}

impl BroadcasterConfig {
  pub const MAX_TIMEOUT_MS: u32 = 180_000;

  pub fn from_json(document: &str) -> Result<Self> {
    let config: Self = serde_json::from_str(document)
        .map_err(|e| BroadcasterError::InvalidConfig(format!("{e}")))?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<()> {
    if self.timeout_ms > Self::MAX_TIMEOUT_MS {
      return Err(BroadcasterError::InvalidConfig(format!(
        "timeout_ms must be at most {}, got {}",
        Self::MAX_TIMEOUT_MS,
        self.timeout_ms
      )));
    }
    Ok(())
  }

  pub fn timeout(&self) -> Option<Duration> {
    (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms.into()))
  }

  pub fn advertisement_params(&self) -> AdvertisementParams {
    AdvertisementParams {
      connect_mode: if self.connectable { ConnectMode::Undirected } else { ConnectMode::None },
      tx_power: self.tx_power,
      timeout: self.timeout(),
      ..AdvertisementParams::with_mode(self.advertise_mode)
    }
  }
}
