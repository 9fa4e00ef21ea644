//! Subcommand bodies.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use keybus_core::{ControllerAddress, GatewayConfig, KeyCode};
use keybus_floor::{Alert, FloorsSupervisor, Gateway, GatewayContext};
use keybus_protocol::ReadingOutcome;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Receiver;
use tracing::{info, warn};

/// Accepts `on`/`off` and the usual boolean spellings.
pub fn parse_switch(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        other => Err(format!("expected on or off, got '{other}'")),
    }
}

fn outcome_text(outcome: ReadingOutcome) -> String {
    match outcome {
        ReadingOutcome::Valid(code) if code.is_empty() => "empty".to_string(),
        ReadingOutcome::Valid(code) => code.to_string(),
        ReadingOutcome::InvalidChecksum => "checksum error".to_string(),
        ReadingOutcome::Unknown => "no response".to_string(),
    }
}

async fn supervisor(config: GatewayConfig) -> Result<Arc<FloorsSupervisor>> {
    let ctx = GatewayContext::open(config)
        .await
        .context("failed to open the store")?;
    Ok(Arc::new(FloorsSupervisor::new(Arc::new(ctx))))
}

/// Open one floor without polling it.
async fn open_floor(config: GatewayConfig, port: &str) -> Result<Gateway> {
    let supervisor = supervisor(config).await?;
    supervisor
        .open_floor(port)
        .await
        .with_context(|| format!("floor {port} is not available"))?;
    Ok(Gateway::new(supervisor))
}

pub async fn serve(config: GatewayConfig, watch: Option<String>) -> Result<()> {
    let supervisor = supervisor(config).await?;
    supervisor.start().await.context("failed to read floors")?;
    let retry = supervisor.spawn_retry_loop();
    info!(
        running = ?supervisor.running_ports().await,
        pending = ?supervisor.pending_ports().await,
        "gateway started"
    );

    if let Some(port) = watch {
        let gateway = Gateway::new(Arc::clone(&supervisor));
        let interval = supervisor.context().config().polling.port_retry_interval();
        tokio::spawn(async move {
            let mut alerts = join_when_running(&gateway, &port, interval).await;
            while let Some(alert) = alerts.recv().await {
                match serde_json::to_string(&alert) {
                    Ok(line) => println!("{line}"),
                    Err(e) => warn!(error = %e, "alert not printable"),
                }
            }
        });
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutting down");
    supervisor.shutdown().await;
    retry.await.context("retry loop panicked")?;
    Ok(())
}

/// Join a floor's alerts, waiting for a queued floor to come up.
async fn join_when_running(gateway: &Gateway, port: &str, interval: Duration) -> Receiver<Alert> {
    let mut reported = false;
    loop {
        match gateway.join(port).await {
            Ok(alerts) => {
                info!(port, "watching alerts");
                return alerts;
            }
            Err(e) if !reported => {
                warn!(port, error = %e, "floor not running, watch deferred");
                reported = true;
            }
            Err(_) => {}
        }
        tokio::time::sleep(interval).await;
    }
}

pub async fn keys(config: GatewayConfig, port: &str, address: ControllerAddress) -> Result<()> {
    let gateway = open_floor(config, port).await?;
    let readout = gateway.get_all_keys(port, address).await?;
    for (cell, outcome) in readout.iter().enumerate() {
        println!("{cell:>3}  {}", outcome_text(*outcome));
    }
    if !readout.is_fully_valid() {
        bail!(
            "only {} of {} cells read consistently",
            readout.valid_count(),
            readout.cell_count()
        );
    }
    Ok(())
}

pub async fn set_key(
    config: GatewayConfig,
    port: &str,
    address: ControllerAddress,
    cell: u8,
    code: KeyCode,
    holder: &str,
    expires: Option<DateTime<Utc>>,
) -> Result<()> {
    let gateway = open_floor(config, port).await?;
    gateway
        .set_key(port, address, cell, code, holder, expires)
        .await?;
    println!("cell {cell} of controller {address} holds {code}");
    Ok(())
}

pub async fn unset_key(
    config: GatewayConfig,
    port: &str,
    address: ControllerAddress,
    cell: u8,
) -> Result<()> {
    let gateway = open_floor(config, port).await?;
    gateway.unset_key(port, address, cell).await?;
    println!("cell {cell} of controller {address} cleared");
    Ok(())
}

pub async fn read_key(config: GatewayConfig, port: &str, address: ControllerAddress) -> Result<()> {
    let gateway = open_floor(config, port).await?;
    let outcome = gateway.read_key(port, address).await?;
    println!("{}", outcome_text(outcome));
    Ok(())
}

pub async fn light(
    config: GatewayConfig,
    port: &str,
    address: ControllerAddress,
    on: bool,
) -> Result<()> {
    let gateway = open_floor(config, port).await?;
    gateway.set_light(port, address, on).await?;
    println!("light {}", if on { "on" } else { "off" });
    Ok(())
}

pub async fn add_floor(config: GatewayConfig, port: &str, name: &str) -> Result<()> {
    let supervisor = supervisor(config).await?;
    let record = supervisor.add_floor(port, name).await?;
    println!("floor {} added on {}", record.id, record.port_name);
    Ok(())
}

pub async fn add_room(
    config: GatewayConfig,
    port: &str,
    room_number: i64,
    address: ControllerAddress,
    protected: bool,
) -> Result<()> {
    let gateway = open_floor(config, port).await?;
    let room = gateway
        .add_room(port, room_number, address, protected)
        .await?;
    println!(
        "room {} added at address {} ({} cells)",
        room.room_number(),
        room.address(),
        room.cell_count()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("on", true)]
    #[case("ON", true)]
    #[case("1", true)]
    #[case("off", false)]
    #[case("false", false)]
    fn test_parse_switch(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(parse_switch(input), Ok(expected));
    }

    #[test]
    fn test_parse_switch_rejects_other() {
        assert!(parse_switch("dim").is_err());
    }

    #[tokio::test]
    async fn test_watch_waits_for_queued_floor() {
        use keybus_hardware::LineOpener;
        use keybus_hardware::mock::MockOpener;
        use keybus_storage::{FloorRepository, Store};

        let mut config = GatewayConfig::default().without_bus_delays();
        config.polling.port_retry_ms = 20;
        let store = Store::in_memory().await.unwrap();
        store.floors().create("COM3", "Third floor").await.unwrap();
        store.floors().create("COM4", "Fourth floor").await.unwrap();
        let opener = Arc::new(MockOpener::new());
        opener.add_line("COM3", 12);
        let ctx = GatewayContext::new(config, store, Arc::clone(&opener) as Arc<dyn LineOpener>);
        let supervisor = Arc::new(FloorsSupervisor::new(Arc::new(ctx)));
        supervisor.start().await.unwrap();
        assert_eq!(supervisor.pending_ports().await, vec!["COM4"]);
        let retry = supervisor.spawn_retry_loop();

        let gateway = Gateway::new(Arc::clone(&supervisor));
        let watch = tokio::spawn(async move {
            join_when_running(&gateway, "COM4", Duration::from_millis(10)).await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!watch.is_finished());

        opener.add_line("COM4", 12);
        let mut alerts = tokio::time::timeout(Duration::from_secs(2), watch)
            .await
            .unwrap()
            .unwrap();

        Gateway::new(Arc::clone(&supervisor))
            .add_room("COM4", 401, keybus_core::ControllerAddress::new(9).unwrap(), false)
            .await
            .unwrap();
        assert!(matches!(alerts.recv().await, Some(Alert::RoomsChanged { .. })));

        supervisor.shutdown().await;
        retry.await.unwrap();
    }

    #[rstest]
    #[case(ReadingOutcome::Valid(KeyCode::EMPTY), "empty")]
    #[case(ReadingOutcome::Valid(KeyCode::new([1, 2, 3, 4, 255])), "01-02-03-04-FF")]
    #[case(ReadingOutcome::InvalidChecksum, "checksum error")]
    #[case(ReadingOutcome::Unknown, "no response")]
    fn test_outcome_text(#[case] outcome: ReadingOutcome, #[case] expected: &str) {
        assert_eq!(outcome_text(outcome), expected);
    }
}
