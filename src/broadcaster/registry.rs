use alloc::collections::BTreeMap;

use crate::bluetooth_address::BluetoothAddress;
use crate::mtu::Mtu;

#[derive(Debug)]
pub struct PeerState<W> {
  pub mtu: Mtu,

  /// Present while the peer is subscribed to the sensor characteristic.
  pub writer: Option<W>,
}

impl<W> Default for PeerState<W> {
  fn default() -> Self {
    Self { mtu: Mtu::default(), writer: None }
  }
}

/// Connected peers keyed by address.  Iteration is in address order, which makes notification
/// fan-out deterministic.
#[derive(Debug)]
pub struct ConnectionRegistry<W> {
  peers: BTreeMap<BluetoothAddress, PeerState<W>>,
}

impl<W> Default for ConnectionRegistry<W> {
  fn default() -> Self {
    Self { peers: BTreeMap::new() }
  }
}

impl<W> ConnectionRegistry<W> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns false if the peer was already known.
  pub fn connect(&mut self, address: BluetoothAddress) -> bool {
    if self.peers.contains_key(&address) {
      return false;
    }
    self.peers.insert(address, PeerState::default());
    true
  }

  pub fn disconnect(&mut self, address: &BluetoothAddress) -> Option<PeerState<W>> {
    self.peers.remove(address)
  }

  /// Store the writer for `address`, registering the peer if it never reported a connection.
  /// Returns true if the peer was not subscribed before.
  pub fn subscribe(&mut self, address: BluetoothAddress, writer: W) -> bool {
    let peer = self.peers.entry(address).or_default();
    peer.writer.replace(writer).is_none()
  }

  /// Returns true if the peer was subscribed.
  pub fn unsubscribe(&mut self, address: &BluetoothAddress) -> bool {
    self
      .peers
      .get_mut(address)
      .and_then(|p| p.writer.take())
      .is_some()
  }

  pub fn set_mtu(&mut self, address: BluetoothAddress, mtu: Mtu) {
    self.peers.entry(address).or_default().mtu = mtu;
  }

  /// Drop every subscription, keeping the connections.  Returns how many were dropped.
  pub fn clear_subscriptions(&mut self) -> usize {
    self
      .peers
      .values_mut()
      .filter_map(|p| p.writer.take())
      .count()
  }

  pub fn clear(&mut self) {
    self.peers.clear();
  }

  pub fn is_connected(&self, address: &BluetoothAddress) -> bool {
    self.peers.contains_key(address)
  }

  pub fn is_subscribed(&self, address: &BluetoothAddress) -> bool {
    self
      .peers
      .get(address)
      .map_or(false, |p| p.writer.is_some())
  }

  pub fn peers(&self) -> impl Iterator<Item = &BluetoothAddress> {
    self.peers.keys()
  }

  pub fn connected_count(&self) -> usize {
    self.peers.len()
  }

  pub fn subscriber_count(&self) -> usize {
    self.peers.values().filter(|p| p.writer.is_some()).count()
  }

  pub fn subscribers(&self) -> impl Iterator<Item = (&BluetoothAddress, &PeerState<W>)> {
    self.peers.iter().filter(|(_, p)| p.writer.is_some())
  }
}

#[cfg(test)]
mod tests {
  extern crate alloc;

  use alloc::vec::Vec;

  use super::*;

  fn addr(last: u8) -> BluetoothAddress {
    BluetoothAddress([0, 0, 0, 0, 0, last])
  }

  #[test]
  fn subscribe_and_disconnect() {
    let mut registry = ConnectionRegistry::new();
    assert!(registry.connect(addr(1)));
    assert!(!registry.connect(addr(1)));
    assert!(registry.subscribe(addr(1), "w1"));
    assert!(!registry.subscribe(addr(1), "w1b"));
    assert!(registry.is_subscribed(&addr(1)));

    let peer = registry.disconnect(&addr(1)).unwrap();
    assert_eq!(peer.writer, Some("w1b"));
    assert!(!registry.is_connected(&addr(1)));
    assert_eq!(registry.subscriber_count(), 0);
  }

  #[test]
  fn subscribe_without_connect_registers_peer() {
    let mut registry = ConnectionRegistry::new();
    assert!(registry.subscribe(BluetoothAddress::ANY, ()));
    assert!(registry.is_connected(&BluetoothAddress::ANY));
  }

  #[test]
  fn unsubscribe_keeps_connection() {
    let mut registry = ConnectionRegistry::new();
    registry.connect(addr(2));
    registry.subscribe(addr(2), ());
    assert!(registry.unsubscribe(&addr(2)));
    assert!(!registry.unsubscribe(&addr(2)));
    assert!(registry.is_connected(&addr(2)));
  }

  #[test]
  fn subscribers_iterate_in_address_order() {
    let mut registry = ConnectionRegistry::new();
    for last in [9, 3, 5] {
      registry.connect(addr(last));
      registry.subscribe(addr(last), last);
    }
    registry.connect(addr(4));

    let order: Vec<u8> = registry.subscribers().map(|(a, _)| a.0[5]).collect();
    assert_eq!(order, [3, 5, 9]);
    assert_eq!(registry.clear_subscriptions(), 3);
    assert_eq!(registry.connected_count(), 4);
  }

  #[test]
  fn mtu_is_tracked() {
    let mut registry: ConnectionRegistry<()> = ConnectionRegistry::new();
    registry.connect(addr(1));
    registry.set_mtu(addr(1), Mtu::new(247));
    let peer = registry.disconnect(&addr(1)).unwrap();
    assert_eq!(peer.mtu.usable_value(), 244);
  }
}
