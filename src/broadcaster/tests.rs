extern crate std;

use alloc::rc::Rc;
use alloc::string::ToString;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;

use super::*;
use crate::att_error::AttError;
use crate::descriptors::CccdValue;
use crate::gatt_server_cb::AdvStartFailedReason;
use crate::sim::{Notification, SimController, SimError, SimulatedPeripheral};

const HEART_RATE: &str = "180D";
const MEASUREMENT: &str = "2A37";
const PEER_A: BluetoothAddress = BluetoothAddress([0xc0, 0, 0, 0, 0, 0x0a]);
const PEER_B: BluetoothAddress = BluetoothAddress([0xc0, 0, 0, 0, 0, 0x0b]);

struct Fixture {
  broadcaster: SensorBroadcaster<SimulatedPeripheral>,
  controller: SimController,
  events: Rc<RefCell<Vec<HostEvent>>>,
}

impl Fixture {
  fn new() -> Self {
    let (peripheral, controller) = SimulatedPeripheral::new();
    let mut broadcaster = SensorBroadcaster::new(peripheral);
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    broadcaster.listen(move |e: HostEvent| sink.borrow_mut().push(e));
    Self { broadcaster, controller, events }
  }

  fn take_events(&self) -> Vec<HostEvent> {
    core::mem::take(&mut *self.events.borrow_mut())
  }

  fn pump(&self) -> Vec<HostEvent> {
    self.controller.pump();
    self.take_events()
  }

  /// Initialized, service registered, advertising confirmed.
  fn advertising() -> Self {
    let mut fixture = Self::new();
    fixture.broadcaster.initialize().unwrap();
    fixture.broadcaster.add_service(HEART_RATE, MEASUREMENT).unwrap();
    fixture.broadcaster.start_advertising("pulse").unwrap();
    assert_eq!(fixture.pump(), [HostEvent::advertising(true)]);
    fixture
  }

  fn characteristic_handle(&self) -> AttributeHandle {
    self.controller.handle_of(UUID::Short(0x2a37)).unwrap()
  }

  fn subscribe(&self, peer: BluetoothAddress) {
    self.controller.connect(peer).unwrap();
    self.controller.enable_notifications(peer, UUID::Short(0x2a37)).unwrap();
  }
}

#[test]
fn initialize_with_bluetooth_disabled() {
  let mut fixture = Fixture::new();
  fixture.controller.set_enabled(false);

  let result = fixture.broadcaster.handle(MethodCall::Initialize);

  assert_eq!(result, MethodResult::Success);
  assert_eq!(
    fixture.take_events(),
    [HostEvent::advertising_error(false, "Bluetooth not enabled")]
  );
  assert!(!fixture.broadcaster.is_initialized());
  assert!(!fixture.controller.is_server_open());
}

#[test]
fn initialize_twice_is_a_no_op() {
  let mut fixture = Fixture::new();
  fixture.broadcaster.initialize().unwrap();
  fixture.broadcaster.add_service(HEART_RATE, MEASUREMENT).unwrap();
  fixture.broadcaster.initialize().unwrap();

  assert!(fixture.broadcaster.characteristic().is_some());
  assert!(fixture.take_events().is_empty());
}

#[test]
fn add_service_requires_initialize() {
  let mut fixture = Fixture::new();
  let result = fixture.broadcaster.handle(MethodCall::AddService {
    service_uuid: HEART_RATE.to_string(),
    characteristic_uuid: MEASUREMENT.to_string(),
  });

  assert!(matches!(result, MethodResult::Error { ref code, .. } if code == "not_initialized"));
  assert!(fixture.take_events().is_empty());
}

#[test]
fn add_service_rejects_bad_uuid() {
  let mut fixture = Fixture::new();
  fixture.broadcaster.initialize().unwrap();
  assert_eq!(
    fixture.broadcaster.add_service("heart", MEASUREMENT),
    Err(BroadcasterError::InvalidUuid("heart".to_string()))
  );
  assert!(fixture.controller.services().is_empty());
}

#[test]
fn add_service_registers_readable_notifiable_characteristic() {
  let mut fixture = Fixture::new();
  fixture.broadcaster.initialize().unwrap();
  fixture
    .broadcaster
    .add_service("6E400001-B5A3-F393-E0A9-E50E24DCCA9E", "6e400003-b5a3-f393-e0a9-e50e24dcca9e")
    .unwrap();

  let characteristic = fixture.broadcaster.characteristic().unwrap();
  assert_eq!(characteristic.service_uuid, UUID::Long(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e));
  assert_eq!(characteristic.uuid, UUID::Long(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e));
  assert_eq!(
    characteristic.cccd_handle,
    fixture.controller.cccd_of(characteristic.handle)
  );
  assert!(characteristic.value.is_empty());
  assert_eq!(fixture.controller.services(), [characteristic.service_uuid]);
}

#[test]
fn advertises_registered_service() {
  let fixture = Fixture::advertising();

  let advertisement = fixture.controller.advertisement().unwrap();
  assert_eq!(advertisement.service_uuids, [UUID::Short(0x180d)]);
  assert_eq!(advertisement.local_name.as_deref(), Some("pulse"));
  assert!(advertisement.is_connectable());
  assert_eq!(fixture.controller.name(), "pulse");

  let payload = fixture.controller.advertised_payload().unwrap();
  assert!(payload.windows(4).any(|w| w == [3, 0x03, 0x0d, 0x18]));
  assert!(fixture.broadcaster.is_advertising());
}

#[test]
fn name_too_long_for_pdu_reports_code_1() {
  let mut fixture = Fixture::new();
  fixture.broadcaster.initialize().unwrap();
  fixture.broadcaster.add_service(HEART_RATE, MEASUREMENT).unwrap();
  fixture.broadcaster.start_advertising("a-very-long-sensor-device-name").unwrap();

  assert_eq!(
    fixture.pump(),
    [HostEvent::advertising_error(false, "Failed to start advertising: 1")]
  );
  assert!(!fixture.broadcaster.is_advertising());
}

#[test]
fn long_name_fits_when_not_advertised() {
  let (peripheral, controller) = SimulatedPeripheral::new();
  let config = BroadcasterConfig { include_device_name: false, ..Default::default() };
  let mut broadcaster = SensorBroadcaster::with_config(peripheral, config).unwrap();
  broadcaster.initialize().unwrap();
  broadcaster.add_service(HEART_RATE, MEASUREMENT).unwrap();
  broadcaster.start_advertising("a-very-long-sensor-device-name").unwrap();
  controller.pump();

  assert!(broadcaster.is_advertising());
  assert_eq!(controller.name(), "a-very-long-sensor-device-name");
  assert_eq!(controller.advertisement().unwrap().local_name, None);
}

#[test]
fn start_without_service_or_advertiser() {
  let mut fixture = Fixture::new();
  fixture.broadcaster.start_advertising("pulse").unwrap_err();
  assert_eq!(
    fixture.take_events(),
    [HostEvent::advertising_error(false, "Advertiser not initialized")]
  );

  fixture.broadcaster.initialize().unwrap();
  let result = fixture.broadcaster.handle(MethodCall::StartAdvertising {
    device_name: "pulse".to_string(),
  });
  assert_eq!(result, MethodResult::Success);
  assert_eq!(
    fixture.take_events(),
    [HostEvent::advertising_error(false, "No service registered")]
  );
  assert!(!fixture.controller.is_advertising());
}

#[test]
fn adapter_without_advertising_support() {
  let mut fixture = Fixture::new();
  fixture.controller.set_advertising_supported(false);
  fixture.broadcaster.initialize().unwrap();
  fixture.broadcaster.add_service(HEART_RATE, MEASUREMENT).unwrap();

  assert_eq!(
    fixture.broadcaster.start_advertising("pulse"),
    Err(BroadcasterError::AdvertiserNotInitialized)
  );
  fixture.broadcaster.stop_advertising();
  assert_eq!(
    fixture.take_events(),
    [HostEvent::advertising_error(false, "Advertiser not initialized")]
  );
}

#[test]
fn platform_failure_codes_pass_through() {
  let mut fixture = Fixture::new();
  fixture.broadcaster.initialize().unwrap();
  fixture.broadcaster.add_service(HEART_RATE, MEASUREMENT).unwrap();

  fixture.controller.fail_next_advertising(AdvStartFailedReason::TooManyAdvertisers);
  fixture.broadcaster.start_advertising("pulse").unwrap();
  assert_eq!(
    fixture.pump(),
    [HostEvent::advertising_error(false, "Failed to start advertising: 2")]
  );

  fixture
    .controller
    .fail_next_advertising(AdvStartFailedReason::UnsupportedFeature("extended advertising"));
  fixture.broadcaster.start_advertising("pulse").unwrap();
  assert_eq!(
    fixture.pump(),
    [HostEvent::advertising_error(false, "Failed to start advertising: 5")]
  );

  fixture.broadcaster.start_advertising("pulse").unwrap();
  assert_eq!(fixture.pump(), [HostEvent::advertising(true)]);
}

#[test]
fn starting_twice_reports_already_started() {
  let mut fixture = Fixture::advertising();
  fixture.broadcaster.start_advertising("pulse").unwrap();

  assert_eq!(
    fixture.pump(),
    [HostEvent::advertising_error(true, "Failed to start advertising: 3")]
  );
  assert!(fixture.broadcaster.is_advertising());
}

#[test]
fn stop_is_reported_once() {
  let mut fixture = Fixture::advertising();
  fixture.broadcaster.stop_advertising();

  assert_eq!(fixture.take_events(), [HostEvent::advertising(false)]);
  assert!(fixture.pump().is_empty());
  assert!(!fixture.controller.is_advertising());
  assert!(!fixture.broadcaster.is_advertising());
}

#[test]
fn restart_before_stop_confirmation() {
  let mut fixture = Fixture::advertising();
  fixture.broadcaster.stop_advertising();
  fixture.broadcaster.start_advertising("pulse").unwrap();

  assert_eq!(fixture.take_events(), [HostEvent::advertising(false)]);
  assert_eq!(fixture.pump(), [HostEvent::advertising(true)]);
  assert!(fixture.broadcaster.is_advertising());
  assert!(fixture.controller.is_advertising());
}

#[test]
fn stop_while_starting() {
  let mut fixture = Fixture::new();
  fixture.broadcaster.initialize().unwrap();
  fixture.broadcaster.add_service(HEART_RATE, MEASUREMENT).unwrap();
  fixture.broadcaster.start_advertising("pulse").unwrap();
  fixture.broadcaster.stop_advertising();

  assert_eq!(fixture.take_events(), [HostEvent::advertising(false)]);
  assert!(fixture.pump().is_empty());
  assert!(!fixture.broadcaster.is_advertising());
  assert!(!fixture.controller.is_advertising());
}

#[test]
fn stop_start_stop_before_confirmations() {
  let mut fixture = Fixture::advertising();
  fixture.broadcaster.stop_advertising();
  fixture.broadcaster.start_advertising("pulse").unwrap();
  fixture.broadcaster.stop_advertising();

  assert_eq!(
    fixture.take_events(),
    [HostEvent::advertising(false), HostEvent::advertising(false)]
  );
  assert!(fixture.pump().is_empty());
  assert!(!fixture.broadcaster.is_advertising());
  assert!(!fixture.controller.is_advertising());
}

#[test]
fn advertising_timeout_is_reported() {
  let fixture = Fixture::advertising();
  fixture.controller.expire_advertising();
  assert_eq!(fixture.pump(), [HostEvent::advertising(false)]);
}

#[test]
fn subscriber_receives_updates() {
  let mut fixture = Fixture::advertising();
  fixture.subscribe(PEER_A);
  assert_eq!(
    fixture.pump(),
    [HostEvent::connection(true), HostEvent::subscription(true)]
  );

  assert_eq!(fixture.broadcaster.update_characteristic(&[0x06, 0x48]), 1);
  assert_eq!(
    fixture.controller.take_notifications(),
    [Notification {
      address: PEER_A,
      handle: fixture.characteristic_handle(),
      value: vec![0x06, 0x48],
    }]
  );
  assert_eq!(fixture.broadcaster.characteristic_value(), Some(vec![0x06, 0x48]));
}

#[test]
fn connected_but_unsubscribed_peer_gets_nothing() {
  let mut fixture = Fixture::advertising();
  fixture.subscribe(PEER_A);
  fixture.controller.connect(PEER_B).unwrap();
  fixture.pump();

  assert_eq!(fixture.broadcaster.connected_peers(), [PEER_A, PEER_B]);
  assert_eq!(fixture.broadcaster.subscriber_count(), 1);
  fixture.broadcaster.update_characteristic(&[1]);

  let notifications = fixture.controller.take_notifications();
  assert_eq!(notifications.len(), 1);
  assert_eq!(notifications[0].address, PEER_A);
}

#[test]
fn update_fans_out_in_address_order() {
  let mut fixture = Fixture::advertising();
  fixture.subscribe(PEER_B);
  fixture.subscribe(PEER_A);
  fixture.pump();

  assert_eq!(fixture.broadcaster.update_characteristic(&[42]), 2);
  let order: Vec<BluetoothAddress> =
      fixture.controller.take_notifications().iter().map(|n| n.address).collect();
  assert_eq!(order, [PEER_A, PEER_B]);
}

#[test]
fn disable_notifications_unsubscribes() {
  let mut fixture = Fixture::advertising();
  fixture.subscribe(PEER_A);
  fixture.pump();

  fixture.controller.disable_notifications(PEER_A, UUID::Short(0x2a37)).unwrap();
  assert_eq!(fixture.pump(), [HostEvent::subscription(false)]);
  assert_eq!(fixture.broadcaster.update_characteristic(&[1]), 0);
  assert!(fixture.controller.take_notifications().is_empty());
  assert_eq!(fixture.broadcaster.connected_peers(), [PEER_A]);
}

#[test]
fn unknown_cccd_value_changes_nothing() {
  let fixture = Fixture::advertising();
  fixture.controller.connect(PEER_A).unwrap();
  let cccd = fixture.controller.cccd_of(fixture.characteristic_handle()).unwrap();

  fixture.controller.write(PEER_A, cccd, &[0x07, 0x00], true).unwrap();
  assert_eq!(fixture.pump(), [HostEvent::connection(true)]);
  assert_eq!(fixture.broadcaster.subscriber_count(), 0);
}

#[test]
fn indications_are_not_notifications() {
  let mut fixture = Fixture::advertising();
  fixture.controller.connect(PEER_A).unwrap();
  let cccd = fixture.controller.cccd_of(fixture.characteristic_handle()).unwrap();

  fixture.controller.write(PEER_A, cccd, &CccdValue::ENABLE_INDICATION, true).unwrap();
  assert_eq!(fixture.pump(), [HostEvent::connection(true)]);
  assert_eq!(fixture.broadcaster.subscriber_count(), 0);
  assert_eq!(fixture.broadcaster.update_characteristic(&[0x01]), 0);
  assert!(fixture.controller.take_notifications().is_empty());
}

#[test]
fn anonymous_subscriber_after_connect_is_not_announced_twice() {
  let fixture = Fixture::advertising();
  fixture.controller.connect(PEER_A).unwrap();
  fixture.controller.subscribe_anonymously(UUID::Short(0x2a37)).unwrap();

  assert_eq!(
    fixture.pump(),
    [HostEvent::connection(true), HostEvent::subscription(true)]
  );
}

#[test]
fn anonymous_subscriber_is_announced() {
  let mut fixture = Fixture::advertising();
  fixture.controller.subscribe_anonymously(UUID::Short(0x2a37)).unwrap();

  assert_eq!(
    fixture.pump(),
    [HostEvent::connection(true), HostEvent::subscription(true)]
  );
  assert_eq!(fixture.broadcaster.connected_peers(), [BluetoothAddress::ANY]);
  assert_eq!(fixture.broadcaster.update_characteristic(&[0x00, 0x48]), 1);

  fixture.controller.disconnect(BluetoothAddress::ANY).unwrap();
  assert_eq!(
    fixture.pump(),
    [HostEvent::connection(false), HostEvent::subscription(false)]
  );
}

#[test]
fn disconnect_ends_subscription() {
  let mut fixture = Fixture::advertising();
  fixture.subscribe(PEER_A);
  fixture.pump();

  fixture.controller.disconnect(PEER_A).unwrap();
  assert_eq!(
    fixture.pump(),
    [HostEvent::connection(false), HostEvent::subscription(false)]
  );
  assert_eq!(fixture.broadcaster.update_characteristic(&[1]), 0);
  assert!(fixture.controller.take_notifications().is_empty());
  assert!(fixture.broadcaster.connected_peers().is_empty());
}

#[test]
fn reads_return_value_and_client_configuration() {
  let mut fixture = Fixture::advertising();
  fixture.broadcaster.update_characteristic(&[0xde, 0xad]);
  fixture.controller.connect(PEER_A).unwrap();
  fixture.pump();

  let handle = fixture.characteristic_handle();
  let cccd = fixture.controller.cccd_of(handle).unwrap();
  assert_eq!(fixture.controller.read(PEER_A, handle), Ok(vec![0xde, 0xad]));
  assert_eq!(fixture.controller.read(PEER_A, cccd), Ok(CccdValue::DISABLE.to_vec()));

  fixture.controller.enable_notifications(PEER_A, UUID::Short(0x2a37)).unwrap();
  fixture.pump();
  assert_eq!(
    fixture.controller.read(PEER_A, cccd),
    Ok(CccdValue::ENABLE_NOTIFICATION.to_vec())
  );

  let unknown = AttributeHandle(core::num::NonZeroU16::new(0x0fff).unwrap());
  assert_eq!(
    fixture.controller.read(PEER_A, unknown),
    Err(SimError::Att(AttError::InvalidHandle))
  );
}

#[test]
fn characteristic_is_not_writable() {
  let fixture = Fixture::advertising();
  fixture.controller.connect(PEER_A).unwrap();
  fixture.pump();

  let handle = fixture.characteristic_handle();
  assert_eq!(
    fixture.controller.write(PEER_A, handle, &[1], true),
    Err(SimError::Att(AttError::WriteNotPermitted))
  );
  assert_eq!(fixture.controller.write(PEER_A, handle, &[1], false), Ok(()));
  assert_eq!(fixture.broadcaster.characteristic_value(), Some(Vec::new()));
}

#[test]
fn update_without_service_is_a_no_op() {
  let mut fixture = Fixture::new();
  fixture.broadcaster.initialize().unwrap();
  assert_eq!(
    fixture.broadcaster.handle(MethodCall::UpdateCharacteristic { value: vec![1] }),
    MethodResult::Success
  );
  assert_eq!(fixture.broadcaster.characteristic_value(), None);
}

#[test]
fn values_beyond_mtu_are_truncated_by_the_stack() {
  let mut fixture = Fixture::advertising();
  fixture.subscribe(PEER_A);
  fixture.pump();

  fixture.broadcaster.update_characteristic(&[0x55; 30]);
  assert_eq!(fixture.controller.take_notifications()[0].value.len(), 20);

  fixture.controller.negotiate_mtu(PEER_A, 185).unwrap();
  fixture.pump();
  fixture.broadcaster.update_characteristic(&[0x55; 30]);
  assert_eq!(fixture.controller.take_notifications()[0].value.len(), 30);
  assert_eq!(fixture.broadcaster.characteristic_value().map(|v| v.len()), Some(30));
}

#[test]
fn replacing_the_service_drops_subscriptions() {
  let mut fixture = Fixture::advertising();
  fixture.subscribe(PEER_A);
  fixture.pump();
  fixture.broadcaster.update_characteristic(&[9]);
  fixture.controller.take_notifications();

  fixture.broadcaster.add_service("181A", "2A6E").unwrap();

  assert_eq!(fixture.take_events(), [HostEvent::subscription(false)]);
  assert_eq!(fixture.controller.services(), [UUID::Short(0x181a)]);
  assert_eq!(fixture.broadcaster.subscriber_count(), 0);
  assert_eq!(fixture.broadcaster.characteristic_value(), Some(Vec::new()));
  assert_eq!(fixture.broadcaster.update_characteristic(&[1]), 0);
  assert_eq!(fixture.broadcaster.connected_peers(), [PEER_A]);
}

#[test]
fn power_loss_resets_everything() {
  let mut fixture = Fixture::advertising();
  fixture.subscribe(PEER_A);
  fixture.pump();

  fixture.controller.set_enabled(false);
  assert_eq!(
    fixture.pump(),
    [
      HostEvent::advertising_error(false, "GATT server shut down"),
      HostEvent::connection(false),
      HostEvent::subscription(false),
    ]
  );
  assert!(!fixture.broadcaster.is_initialized());
  assert_eq!(
    fixture.broadcaster.start_advertising("pulse"),
    Err(BroadcasterError::AdvertiserNotInitialized)
  );
  fixture.take_events();

  fixture.controller.set_enabled(true);
  fixture.broadcaster.initialize().unwrap();
  assert!(fixture.broadcaster.characteristic().is_none());
  fixture.broadcaster.add_service(HEART_RATE, MEASUREMENT).unwrap();
  fixture.broadcaster.start_advertising("pulse").unwrap();
  assert_eq!(fixture.pump(), [HostEvent::advertising(true)]);
}

#[test]
fn connection_stops_advertising_on_some_stacks() {
  let fixture = Fixture::advertising();
  fixture.controller.set_stop_on_connect(true);
  fixture.controller.connect(PEER_A).unwrap();

  assert_eq!(
    fixture.pump(),
    [HostEvent::connection(true), HostEvent::advertising(false)]
  );
  assert!(!fixture.broadcaster.is_advertising());
}

#[test]
fn json_method_channel() {
  let mut fixture = Fixture::new();
  let b = &mut fixture.broadcaster;

  assert_eq!(b.handle_message(r#"{"method":"initialize"}"#), MethodResult::Success);
  assert_eq!(
    b.handle_message(
      r#"{"method":"addService","arguments":{"serviceUuid":"180D","characteristicUuid":"2A37"}}"#
    ),
    MethodResult::Success
  );
  assert_eq!(
    b.handle_message(r#"{"method":"startAdvertising","arguments":{"deviceName":"pulse"}}"#),
    MethodResult::Success
  );
  assert_eq!(b.handle_message(r#"{"method":"reset"}"#), MethodResult::NotImplemented);
  assert!(matches!(
    b.handle_message(r#"{"method":"addService","arguments":{"serviceUuid":"zz","characteristicUuid":"2A37"}}"#),
    MethodResult::Error { ref code, .. } if code == "invalid_argument"
  ));

  let events: Vec<std::string::String> =
      fixture.pump().iter().map(|e| e.to_json().unwrap()).collect();
  assert_eq!(events, [r#"{"event":"advertisingStatus","isAdvertising":true}"#]);
}

#[test]
fn cancelled_listener_sees_nothing() {
  let mut fixture = Fixture::new();
  fixture.broadcaster.cancel();
  fixture.controller.set_enabled(false);
  fixture.broadcaster.initialize().unwrap_err();
  assert!(fixture.take_events().is_empty());
}

#[test]
fn invalid_config_is_rejected() {
  let (peripheral, _controller) = SimulatedPeripheral::new();
  let config = BroadcasterConfig { timeout_ms: 600_000, ..Default::default() };
  assert!(matches!(
    SensorBroadcaster::with_config(peripheral, config),
    Err(BroadcasterError::InvalidConfig(_))
  ));
}

#[test]
fn sensor_service_layout() {
  let service = sensor_service(UUID::Short(0x180d), UUID::Short(0x2a37));
  let characteristic = &service.characteristics[0];
  assert!(characteristic.is_subscribable());
  assert!(characteristic.properties.contains(GattCharacteristicProperty::Read));
  assert!(!characteristic.permissions.contains(GattCharacteristicPermission::Write));
  assert_eq!(
    service.attribute_uuids().collect::<Vec<_>>(),
    [UUID::Short(0x2a37), CCCD_UUID]
  );
}
