use alloc::format;

use log::debug;

use crate::host::HostEvent;

/// Platform failure code for an advertiser that is already running.
pub const ADVERTISE_FAILED_ALREADY_STARTED: u8 = 3;

/// Advertising lifecycle as observed by the broadcaster.  Transitions return the event the host
/// should see, if any; duplicate confirmations produce none.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum AdvertisingState {
  #[default]
  Idle,
  Starting,
  Advertising,
}

impl AdvertisingState {
  pub fn is_advertising(&self) -> bool {
    *self == AdvertisingState::Advertising
  }

  pub fn request_start(&mut self) {
    if *self == AdvertisingState::Idle {
      *self = AdvertisingState::Starting;
    }
  }

  /// Stopping is reported to the host immediately; stacks do not reliably confirm it.
  pub fn request_stop(&mut self) -> HostEvent {
    *self = AdvertisingState::Idle;
    HostEvent::advertising(false)
  }

  pub fn on_started(&mut self) -> Option<HostEvent> {
    match *self {
      AdvertisingState::Starting => {
        *self = AdvertisingState::Advertising;
        Some(HostEvent::advertising(true))
      }
      AdvertisingState::Advertising => None,
      AdvertisingState::Idle => {
        debug!("start confirmed after a stop was requested, ignoring");
        None
      }
    }
  }

  pub fn on_start_failed(&mut self, code: u8) -> HostEvent {
    let message = format!("Failed to start advertising: {code}");
    if code == ADVERTISE_FAILED_ALREADY_STARTED && *self != AdvertisingState::Idle {
      *self = AdvertisingState::Advertising;
      return HostEvent::advertising_error(true, message);
    }
    *self = AdvertisingState::Idle;
    HostEvent::advertising_error(false, message)
  }

  pub fn on_stopped(&mut self) -> Option<HostEvent> {
    match *self {
      AdvertisingState::Idle => None,
      _ => {
        *self = AdvertisingState::Idle;
        Some(HostEvent::advertising(false))
      }
    }
  }
}
