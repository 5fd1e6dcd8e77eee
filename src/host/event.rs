use alloc::boxed::Box;
use alloc::string::String;

use log::trace;
use serde::{Deserialize, Serialize};

/// State transition reported to the host.  Serialized as a flat object tagged by `event`, e.g.
/// `{"event":"connectionState","isConnected":true}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum HostEvent {
  #[serde(rename_all = "camelCase")]
  AdvertisingStatus {
    is_advertising: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
  },

  #[serde(rename_all = "camelCase")]
  ConnectionState { is_connected: bool },

  #[serde(rename_all = "camelCase")]
  SubscriptionState { is_subscribed: bool },
}

impl HostEvent {
  pub fn advertising(is_advertising: bool) -> Self {
    HostEvent::AdvertisingStatus { is_advertising, error: None }
  }

  pub fn advertising_error(is_advertising: bool, error: impl Into<String>) -> Self {
    HostEvent::AdvertisingStatus { is_advertising, error: Some(error.into()) }
  }

  pub fn connection(is_connected: bool) -> Self {
    HostEvent::ConnectionState { is_connected }
  }

  pub fn subscription(is_subscribed: bool) -> Self {
    HostEvent::SubscriptionState { is_subscribed }
  }

  pub fn to_json(&self) -> Result<String, serde_json::Error> {
    serde_json::to_string(self)
  }
}

/// Receiver of host events.  Called synchronously from the platform callback context, so
/// implementations must not call back into the broadcaster.
pub trait EventSink {
  fn send(&mut self, event: HostEvent);
}

impl<F> EventSink for F
where
  F: FnMut(HostEvent),
{
  fn send(&mut self, event: HostEvent) {
    (self)(event)
  }
}

/// Holds at most one listener.  Events emitted while nobody listens are dropped.
#[derive(Default)]
pub struct EventRelay {
  sink: Option<Box<dyn EventSink>>,
}

impl EventRelay {
  pub fn new() -> Self {
    Self::default()
  }

  /// Install `sink`, replacing any previous listener.
  pub fn listen(&mut self, sink: impl EventSink + 'static) {
    self.sink = Some(Box::new(sink));
  }

  pub fn cancel(&mut self) {
    self.sink = None;
  }

  pub fn is_listening(&self) -> bool {
    self.sink.is_some()
  }

  pub fn emit(&mut self, event: HostEvent) {
    match self.sink.as_mut() {
      Some(sink) => {
        trace!("emit {event:?}");
        sink.send(event);
      }
      None => trace!("no listener, dropping {event:?}"),
    }
  }
}

impl core::fmt::Debug for EventRelay {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("EventRelay")
        .field("listening", &self.is_listening())
        .finish()
  }
}
