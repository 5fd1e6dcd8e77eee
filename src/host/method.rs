use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::BroadcasterError;

/// Inbound call from the host application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodCall {
  Initialize,
  AddService { service_uuid: String, characteristic_uuid: String },
  StartAdvertising { device_name: String },
  StopAdvertising,
  UpdateCharacteristic { value: Vec<u8> },
}

#[derive(Deserialize)]
struct Envelope {
  method: String,
  #[serde(default)]
  arguments: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddServiceArgs {
  service_uuid: String,
  characteristic_uuid: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartAdvertisingArgs {
  device_name: String,
}

#[derive(Deserialize)]
struct UpdateCharacteristicArgs {
  value: Vec<u8>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
  #[error("malformed method call: {0}")]
  Malformed(String),

  #[error("method not implemented: {0}")]
  NotImplemented(String),

  #[error("invalid arguments for {method}: {reason}")]
  InvalidArguments { method: String, reason: String },
}

impl MethodCall {
  /// Decode `{"method": "...", "arguments": {...}}`.  `arguments` may be absent or null for
  /// methods that take none.
  pub fn decode(message: &str) -> Result<MethodCall, DecodeError> {
    let envelope: Envelope =
        serde_json::from_str(message).map_err(|e| DecodeError::Malformed(format!("{e}")))?;
    Self::from_parts(&envelope.method, envelope.arguments)
  }

  pub fn from_parts(method: &str, arguments: Value) -> Result<MethodCall, DecodeError> {
    let call = match method {
      "initialize" => MethodCall::Initialize,
      "addService" => {
        let args: AddServiceArgs = arguments_of(method, arguments)?;
        MethodCall::AddService {
          service_uuid: args.service_uuid,
          characteristic_uuid: args.characteristic_uuid,
        }
      }
      "startAdvertising" => {
        let args: StartAdvertisingArgs = arguments_of(method, arguments)?;
        MethodCall::StartAdvertising { device_name: args.device_name }
      }
      "stopAdvertising" => MethodCall::StopAdvertising,
      "updateCharacteristic" => {
        let args: UpdateCharacteristicArgs = arguments_of(method, arguments)?;
        MethodCall::UpdateCharacteristic { value: args.value }
      }
      other => return Err(DecodeError::NotImplemented(other.to_string())),
    };
    Ok(call)
  }

  pub fn name(&self) -> &'static str {
    match self {
      MethodCall::Initialize => "initialize",
      MethodCall::AddService { .. } => "addService",
      MethodCall::StartAdvertising { .. } => "startAdvertising",
      MethodCall::StopAdvertising => "stopAdvertising",
      MethodCall::UpdateCharacteristic { .. } => "updateCharacteristic",
    }
  }
}

fn arguments_of<T: DeserializeOwned>(method: &str, arguments: Value) -> Result<T, DecodeError> {
  serde_json::from_value(arguments).map_err(|e| DecodeError::InvalidArguments {
    method: method.to_string(),
    reason: format!("{e}"),
  })
}

/// Reply to a method call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MethodResult {
  Success,
  NotImplemented,
  Error { code: String, message: String },
}

impl MethodResult {
  pub fn is_success(&self) -> bool {
    *self == MethodResult::Success
  }
}

impl From<&BroadcasterError> for MethodResult {
  fn from(error: &BroadcasterError) -> Self {
    MethodResult::Error {
      code: error.code().to_string(),
      message: error.to_string(),
    }
  }
}

impl From<DecodeError> for MethodResult {
  fn from(error: DecodeError) -> Self {
    match error {
      DecodeError::NotImplemented(_) => MethodResult::NotImplemented,
      other => MethodResult::Error {
        code: "invalid_argument".to_string(),
        message: other.to_string(),
      },
    }
  }
}

#[cfg(test)]
mod tests {
  extern crate std;

  use alloc::vec;

  use super::*;

  #[test]
  fn decodes_every_method() {
    assert_eq!(MethodCall::decode(r#"{"method":"initialize"}"#), Ok(MethodCall::Initialize));
    assert_eq!(
      MethodCall::decode(r#"{"method":"stopAdvertising","arguments":null}"#),
      Ok(MethodCall::StopAdvertising)
    );
    assert_eq!(
      MethodCall::decode(
        r#"{"method":"addService","arguments":{"serviceUuid":"180D","characteristicUuid":"2A37"}}"#
      ),
      Ok(MethodCall::AddService {
        service_uuid: "180D".to_string(),
        characteristic_uuid: "2A37".to_string(),
      })
    );
    assert_eq!(
      MethodCall::decode(r#"{"method":"startAdvertising","arguments":{"deviceName":"pulse"}}"#),
      Ok(MethodCall::StartAdvertising { device_name: "pulse".to_string() })
    );
    assert_eq!(
      MethodCall::decode(r#"{"method":"updateCharacteristic","arguments":{"value":[1,2,255]}}"#),
      Ok(MethodCall::UpdateCharacteristic { value: vec![1, 2, 255] })
    );
  }

  #[test]
  fn unknown_method_is_not_implemented() {
    let err = MethodCall::decode(r#"{"method":"scan"}"#).unwrap_err();
    assert_eq!(err, DecodeError::NotImplemented("scan".to_string()));
    assert_eq!(MethodResult::from(err), MethodResult::NotImplemented);
  }

  #[test]
  fn missing_arguments_are_rejected() {
    let err = MethodCall::decode(r#"{"method":"startAdvertising"}"#).unwrap_err();
    assert!(matches!(err, DecodeError::InvalidArguments { ref method, .. } if method == "startAdvertising"));

    let err = MethodCall::decode(r#"{"method":"updateCharacteristic","arguments":{"value":[256]}}"#)
        .unwrap_err();
    assert!(matches!(err, DecodeError::InvalidArguments { .. }));
  }

  #[test]
  fn malformed_json() {
    let result = MethodResult::from(MethodCall::decode("{").unwrap_err());
    assert!(matches!(result, MethodResult::Error { ref code, .. } if code == "invalid_argument"));
  }

  #[test]
  fn result_json() {
    assert_eq!(serde_json::to_string(&MethodResult::Success).unwrap(), r#"{"status":"success"}"#);
    assert_eq!(
      serde_json::to_string(&MethodResult::from(&BroadcasterError::ServerNotInitialized)).unwrap(),
      r#"{"status":"error","code":"not_initialized","message":"GATT server not initialized"}"#
    );
  }
}
