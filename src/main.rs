use std::path::PathBuf;

use anyhow::{anyhow, Result};
use bluest::Adapter;
use log::info;

use btr2_bridge::{BridgeConfig, Btr2Session};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("bridge_config.json"));
    let config = BridgeConfig::load_config(&config_path).await?;

    let adapter = Adapter::default()
        .await
        .ok_or_else(|| anyhow!("no Bluetooth adapter found"))?;
    adapter.wait_available().await?;
    info!("Bluetooth adapter available");

    let session = Btr2Session::spawn(adapter, config);
    let mut snapshots = session.subscribe();
    session.start();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                info!("session state: {:?}", snapshot.state);
                if let Some(chip) = snapshot.last_reading() {
                    info!("last chip number: {chip}");
                }
            }
        }
    }

    info!("shutting down");
    session.shutdown().await;
    Ok(())
}
