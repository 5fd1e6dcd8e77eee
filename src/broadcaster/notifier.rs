use alloc::vec::Vec;

use log::{debug, warn};

use crate::bluetooth_address::BluetoothAddress;
use crate::broadcaster::registry::ConnectionRegistry;
use crate::gatt_connection::GattWriter;
use crate::mtu::Mtu;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct DispatchReport {
  pub delivered: usize,
  pub failed: usize,
}

/// A subscriber's writer, cloned out of the registry so that writing does not borrow it.
#[derive(Debug, Clone)]
pub struct NotifyTarget<W> {
  pub address: BluetoothAddress,
  pub mtu: Mtu,
  pub writer: W,
}

/// Snapshot of every subscribed peer, in registry order.
pub fn collect_targets<W: Clone>(registry: &ConnectionRegistry<W>) -> Vec<NotifyTarget<W>> {
  registry
    .subscribers()
    .filter_map(|(address, peer)| {
      Some(NotifyTarget {
        address: *address,
        mtu: peer.mtu.clone(),
        writer: peer.writer.clone()?,
      })
    })
    .collect()
}

/// Queue `value` to every target.  A failing writer is logged and skipped; it stays registered
/// until the peer unsubscribes or disconnects.
pub fn notify_subscribers<W: GattWriter>(targets: Vec<NotifyTarget<W>>, value: &[u8]) -> DispatchReport {
  let mut report = DispatchReport::default();

  for NotifyTarget { address, mtu, mut writer } in targets {
    let usable = usize::from(mtu.usable_value());
    if value.len() > usable {
      warn!(
        "{} byte value exceeds usable MTU of {address} ({usable}), peer will see it truncated",
        value.len()
      );
    }

    match writer.write(value) {
      Ok(()) => {
        debug!("notified {address}");
        report.delivered += 1;
      }
      Err(e) => {
        warn!("Error updating listener {address}: {e:?}");
        report.failed += 1;
      }
    }
  }

  report
}
