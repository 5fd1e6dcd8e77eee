use core::fmt::Debug;
use core::ops::Deref;
use core::time::Duration;

use serde::Deserialize;

use crate::descriptors::UUID;

/// Size of a legacy advertising PDU's data field.
pub const LEGACY_PDU_LEN: usize = 31;

/// Radio-level parameters of an advertising set.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AdvertisementParams {
  pub connect_mode: ConnectMode,

  /// Minimum advertising interval to be used by the advertising set.  Acceptable values are
  /// in the range [20ms, 10,485s].
  pub interval_min: Option<Duration>,

  /// Maximum advertising interval to be used by the advertising set.  Acceptable values are
  /// in the range [20ms, 10,485s].
  pub interval_max: Option<Duration>,

  pub tx_power: TxPowerLevel,

  /// Stop advertising on our own after this long.  `None` advertises until stopped.
  pub timeout: Option<Duration>,
}

impl AdvertisementParams {
  pub fn with_mode(mode: AdvertiseMode) -> Self {
    let interval = mode.interval();
    Self {
      interval_min: Some(interval),
      interval_max: Some(interval),
      ..Default::default()
    }
  }
}

/// Whether this peripheral accepts connections.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum ConnectMode {
  /// Connections from any address are allowed.
  #[default]
  Undirected,

  /// Connections are not allowed, e.g. for passive sensors that publish readings only through
  /// the advertisement.
  None,
}

/// Trade-off between discovery latency and power draw.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvertiseMode {
  LowPower,
  #[default]
  Balanced,
  LowLatency,
}

impl AdvertiseMode {
  pub fn interval(&self) -> Duration {
    match self {
      AdvertiseMode::LowPower => Duration::from_millis(1000),
      AdvertiseMode::Balanced => Duration::from_millis(250),
      AdvertiseMode::LowLatency => Duration::from_millis(100),
    }
  }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxPowerLevel {
  UltraLow,
  Low,
  #[default]
  Medium,
  High,
}

impl TxPowerLevel {
  /// Nominal output power in dBm.
  pub fn dbm(&self) -> i8 {
    match self {
      TxPowerLevel::UltraLow => -21,
      TxPowerLevel::Low => -15,
      TxPowerLevel::Medium => -7,
      TxPowerLevel::High => 1,
    }
  }
}

/// Builds a legacy advertising PDU record by record.  Flags are written before the first record
/// when set explicitly, otherwise general discoverable / LE only flags are appended on
/// [Self::build].
#[derive(Debug, Default, Clone)]
pub struct AdvertisementPayloadBuilder {
  raw: heapless::Vec<u8, LEGACY_PDU_LEN>,
  flags: Option<u8>,
  has_set_flags: bool,
}

impl AdvertisementPayloadBuilder {
  pub fn new() -> Self {
    Default::default()
  }

  pub fn set_discover_mode(mut self, discover_mode: DiscoverMode) -> Self {
    let flags = self.flags.get_or_insert(0);
    *flags = (*flags & !DISCOVER_MODE_MASK) | (discover_mode as u8 & DISCOVER_MODE_MASK);
    self
  }

  /// Indicate that Bluetooth Classic (BR/EDR) is _NOT_ supported.
  pub fn set_classic_not_supported(mut self, classic_not_supported: bool) -> Self {
    let flags = self.flags.get_or_insert(0);
    if classic_not_supported {
      *flags |= CLASSIC_NOT_SUPPORTED_MASK;
    } else {
      *flags &= !CLASSIC_NOT_SUPPORTED_MASK;
    }
    self
  }

  pub fn push_manufacturer_data(mut self, manufacturer_id: u16, data: &[u8]) -> Result<Self, PushError> {
    self = self.push_start_record(AdType::ManufacturerData, 2 + data.len())?;
    self.extend(&manufacturer_id.to_le_bytes())?;
    self.extend(data)?;
    Ok(self)
  }

  /// Push the complete list of service UUIDs.  All UUIDs in a single record must share a width.
  pub fn push_service_uuids(mut self, uuids: &[UUID]) -> Result<Self, PushError> {
    let width = Self::common_width(uuids)?;
    let ad_type = match width {
      2 => AdType::CompleteServiceUuids16,
      _ => AdType::CompleteServiceUuids128,
    };

    self = self.push_start_record(ad_type, width * uuids.len())?;
    for uuid in uuids {
      uuid.push_into(&mut self.raw).map_err(|_| PushError::CapacityExceeded)?;
    }
    Ok(self)
  }

  fn common_width(uuids: &[UUID]) -> Result<usize, PushError> {
    let mut width = None;
    for uuid in uuids {
      let len = uuid.byte_len();
      if *width.get_or_insert(len) != len {
        return Err(PushError::UuidInputError);
      }
    }
    width.ok_or(PushError::UuidInputError)
  }

  /// Push the full device name, as platforms do when asked to include the device name.
  pub fn push_complete_local_name(mut self, name: &str) -> Result<Self, PushError> {
    self = self.push_start_record(AdType::LongLocalName, name.len())?;
    self.extend(name.as_bytes())?;
    Ok(self)
  }

  fn push_start_record(mut self, ad_type: AdType, remaining_size: usize) -> Result<Self, PushError> {
    self = self.flush_flags()?;

    if self.raw.len() + 2 + remaining_size > LEGACY_PDU_LEN {
      return Err(PushError::CapacityExceeded);
    }

    let length = u8::try_from(remaining_size + 1).map_err(|_| PushError::CapacityExceeded)?;
    self.extend(&[length, ad_type as u8])?;
    Ok(self)
  }

  fn extend(&mut self, data: &[u8]) -> Result<(), PushError> {
    self.raw.extend_from_slice(data).map_err(|_| PushError::CapacityExceeded)
  }

  fn flush_flags(mut self) -> Result<Self, PushError> {
    if let Some(flags) = self.flags.take() {
      self.has_set_flags = true;
      self = self.push_start_record(AdType::Flags, 1)?;
      self.extend(&[flags])?;
    }
    Ok(self)
  }

  pub fn build(mut self) -> Result<AdvertisementPayload, PushError> {
    if !self.has_set_flags && self.flags.is_none() {
      self = self.set_discover_mode(DiscoverMode::General).set_classic_not_supported(true);
    }
    self = self.flush_flags()?;
    Ok(AdvertisementPayload(self.raw))
  }
}

/// AD types this crate emits.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum AdType {
  Flags = 0x01,
  CompleteServiceUuids16 = 0x03,
  CompleteServiceUuids128 = 0x07,
  LongLocalName = 0x09,
  ManufacturerData = 0xff,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PushError {
  CapacityExceeded,
  UuidInputError,
}

const DISCOVER_MODE_MASK: u8 = 0b0000_0011;
const CLASSIC_NOT_SUPPORTED_MASK: u8 = 0b0000_0100;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum DiscoverMode {
  /// Only visible to centrals running the limited discovery procedure.
  Limited = 0b0000_0001,

  General = 0b0000_0010,

  /// Not discoverable.  Connectability is decided independently.
  None = 0b0000_0000,
}

/// Encoded legacy advertising data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementPayload(heapless::Vec<u8, LEGACY_PDU_LEN>);

impl Deref for AdvertisementPayload {
  type Target = [u8];

  fn deref(&self) -> &Self::Target {
    &self.0
  }
}
