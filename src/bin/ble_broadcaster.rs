//! Bridges a host process to the BlueZ sensor broadcaster over stdio.  Each stdin line is a
//! method call such as `{"method":"startAdvertising","arguments":{"deviceName":"HR"}}`.  Each
//! reply is printed as a `{"result":...}` line, and events are printed as their JSON encoding.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use ble_sensor_broadcaster::bluer_adapter::BluerPeripheral;
use ble_sensor_broadcaster::prelude::*;
use clap::Parser;
use log::{error, info};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tokio::sync::mpsc;
use tokio::task::LocalSet;

#[derive(Debug, Parser)]
#[command(version, about = "Drive a BLE sensor broadcaster with JSON method calls on stdin")]
struct Args {
  /// TOML file with advertising settings.
  #[arg(long)]
  config: Option<PathBuf>,

  /// Adapter to use instead of the default one, e.g. hci1.
  #[arg(long)]
  adapter: Option<String>,
}

#[derive(Debug, Error)]
enum AppError {
  #[error("bluetooth: {0}")]
  Bluetooth(#[from] bluer::Error),

  #[error("io: {0}")]
  Io(#[from] std::io::Error),

  #[error("json: {0}")]
  Json(#[from] serde_json::Error),

  #[error("{path}: {message}")]
  Config { path: PathBuf, message: String },

  #[error(transparent)]
  Broadcaster(#[from] BroadcasterError),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
  env_logger::init();
  let args = Args::parse();

  let local_set = LocalSet::new();
  match local_set.run_until(run(args)).await {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      error!("{e}");
      ExitCode::FAILURE
    }
  }
}

fn load_config(path: Option<&Path>) -> Result<BroadcasterConfig, AppError> {
  let Some(path) = path else {
    return Ok(BroadcasterConfig::default());
  };
  let text = std::fs::read_to_string(path)?;
  let config: BroadcasterConfig = toml::from_str(&text).map_err(|e| AppError::Config {
    path: path.to_owned(),
    message: e.to_string(),
  })?;
  config.validate()?;
  Ok(config)
}

async fn run(args: Args) -> Result<(), AppError> {
  let config = load_config(args.config.as_deref())?;

  let session = bluer::Session::new().await?;
  let adapter = match &args.adapter {
    Some(name) => session.adapter(name)?,
    None => session.default_adapter().await?,
  };
  info!("Using adapter {}", adapter.name());

  let peripheral = BluerPeripheral::new(adapter).await?;
  let mut broadcaster = SensorBroadcaster::with_config(peripheral, config)?;

  let (event_tx, mut event_rx) = mpsc::unbounded_channel();
  broadcaster.listen(move |event: HostEvent| {
    let _ = event_tx.send(event);
  });

  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  let mut stdout = tokio::io::stdout();
  loop {
    tokio::select! {
      line = lines.next_line() => {
        let Some(line) = line? else {
          break;
        };
        if line.trim().is_empty() {
          continue;
        }
        let result = broadcaster.handle_message(&line);
        let reply = serde_json::json!({ "result": result });
        write_line(&mut stdout, &reply.to_string()).await?;
      }
      Some(event) = event_rx.recv() => {
        write_line(&mut stdout, &event.to_json()?).await?;
      }
    }
  }

  info!("stdin closed, shutting down");
  broadcaster.stop_advertising();
  Ok(())
}

async fn write_line(stdout: &mut Stdout, line: &str) -> std::io::Result<()> {
  stdout.write_all(line.as_bytes()).await?;
  stdout.write_all(b"\n").await?;
  stdout.flush().await
}
