#![no_std]

//! Bridge between a host application and a BLE peripheral acting as a sensor broadcaster: one
//! GATT service with one notifiable characteristic, advertised on request, with connection,
//! subscription and advertising state reported back to the host as events.

extern crate alloc;

#[cfg(feature = "bluer")]
extern crate std;

pub mod advertisement;
pub mod att_error;
pub mod bluetooth_address;
pub mod bluetooth_error;
pub mod broadcaster;
pub mod config;
pub mod descriptors;
pub mod error;
pub mod gap_advertiser;
pub mod gatt_connection;
pub mod gatt_server_cb;
pub mod host;
pub mod mtu;
pub mod peripheral;
pub mod sim;

#[cfg(feature = "bluer")]
pub mod bluer_adapter;

pub mod prelude {
  pub use crate::att_error::*;
  pub use crate::bluetooth_address::*;
  pub use crate::bluetooth_error::*;
  pub use crate::broadcaster::{SensorBroadcaster, SensorCharacteristic};
  pub use crate::config::BroadcasterConfig;
  pub use crate::descriptors::*;
  pub use crate::error::{BroadcasterError, Result};
  pub use crate::gap_advertiser::*;
  pub use crate::gatt_connection::*;
  pub use crate::gatt_server_cb::*;
  pub use crate::host::*;
  pub use crate::mtu::Mtu;
  pub use crate::peripheral::*;
}
