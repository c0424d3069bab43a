//! Zenoh bridge for Vigor ventilation units.
//!
//! Polls the appliance over Modbus and publishes its state to Zenoh.

use anyhow::{Result, anyhow};
use std::sync::Arc;
use vigor_bridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};

use zenoh_bridge_vigor::bridge::{command_key, listen_for_commands, publish_snapshots};
use zenoh_bridge_vigor::config::VigorBridgeConfig;
use zenoh_bridge_vigor::{Coordinator, VigorClient};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = BridgeArgs::parse_with_default("vigor.json5");

    let config = VigorBridgeConfig::load(&args.config).map_err(|e| anyhow!("{}", e))?;

    if args.check {
        return check(&config, &args).await;
    }

    let runner = BridgeRunner::new_with_args("vigor", config, Some(&args))
        .await
        .map_err(|e| anyhow!("{}", e))?;
    let mut runner = runner.with_status_publishing();

    let device = runner.config().vigor.device.clone();
    let key_prefix = runner.config().key_prefix().to_string();

    tracing::info!(
        device = %device.name,
        connection = %device.connection,
        unit_id = device.unit_id,
        prefix = %key_prefix,
        "Vigor bridge configured"
    );

    let client = Arc::new(VigorClient::from_config(&device));
    let handle = Coordinator::new(&device.name, client, device.poll_settings()).start();

    runner.spawn(publish_snapshots(
        runner.publisher(),
        device.name.clone(),
        handle.subscribe(),
    ));
    runner.spawn_with_error(
        "commands".to_string(),
        listen_for_commands(
            runner.session().clone(),
            command_key(&key_prefix, &device.name),
            handle.commands(),
            handle.refresh_trigger(),
        ),
    );

    let metadata = serde_json::json!({
        "device": device.name,
        "connection": device.connection.to_string(),
        "unit_id": device.unit_id,
        "poll_interval_secs": device.poll_interval_secs,
        "backoff_interval_secs": device.backoff_interval_secs,
    });

    runner.wait_for_shutdown(Some(metadata)).await;
    handle.stop().await;
    runner.shutdown().await.map_err(|e| anyhow!("{}", e))
}

/// Connect once, read the active-function register and report.
async fn check(config: &VigorBridgeConfig, args: &BridgeArgs) -> Result<()> {
    let mut logging = config.logging().clone();
    if let Some(level) = &args.log_level {
        logging.level = level.clone();
    }
    vigor_common::init_tracing(&logging).map_err(|e| anyhow!("{}", e))?;

    let device = &config.vigor.device;
    let client = VigorClient::from_config(device);
    let result = match client.connect().await {
        Ok(()) => client.probe().await,
        Err(e) => Err(e),
    };
    client.close().await;

    match result {
        Ok(code) => {
            println!(
                "OK: {} answered on {} (active function {})",
                device.name, device.connection, code
            );
            Ok(())
        }
        Err(e) => Err(anyhow!(
            "{} did not answer on {}: {}",
            device.name,
            device.connection,
            e
        )),
    }
}
