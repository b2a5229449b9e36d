//! Advertisement scanning for BTR2 readers.

use std::collections::HashMap;
use std::sync::Arc;

use bluest::{Adapter, Device};
use futures_util::StreamExt;
use log::{debug, error, info};
use regex::Regex;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::session::SessionEvent;
use crate::core::bluetooth::types::DiscoveredDevice;
use crate::error::Btr2Error;

/// Scans for readers and reports every matching advertisement to the
/// session's event channel.
pub struct Btr2Scanner {
    adapter: Adapter,
    name_prefix: String,
    cancel_token: CancellationToken,
    scan_task_handle: Option<JoinHandle<()>>,
}

impl Btr2Scanner {
    pub fn new(adapter: Adapter, name_prefix: String) -> Self {
        Self {
            adapter,
            name_prefix,
            cancel_token: CancellationToken::new(),
            scan_task_handle: None,
        }
    }

    /// Starts the scan task. An already running scan is stopped first.
    ///
    /// Device handles for matching readers land in `seen` keyed by id; the
    /// event channel only carries the descriptive record.
    pub(crate) async fn start(
        &mut self,
        seen: Arc<Mutex<HashMap<String, Device>>>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<(), Btr2Error> {
        if self.scan_task_handle.is_some() {
            self.stop().await;
        }

        self.cancel_token = CancellationToken::new();
        let cancel_token = self.cancel_token.clone();
        let adapter = self.adapter.clone();
        let name_prefix = self.name_prefix.clone();

        let handle = tokio::spawn(async move {
            if let Err(e) = scan_task(adapter, name_prefix, seen, events, cancel_token).await {
                error!("scan task failed: {e}");
            }
        });
        self.scan_task_handle = Some(handle);
        info!("device scan task started");
        Ok(())
    }

    /// Cancels the scan task and waits for it to finish.
    pub async fn stop(&mut self) {
        self.cancel_token.cancel();
        if let Some(handle) = self.scan_task_handle.take() {
            match handle.await {
                Ok(()) => info!("scan task finished"),
                Err(e) if e.is_cancelled() => info!("scan task cancelled"),
                Err(e) => error!("scan task join error: {e:?}"),
            }
        }
    }
}

async fn scan_task(
    adapter: Adapter,
    name_prefix: String,
    seen: Arc<Mutex<HashMap<String, Device>>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    cancel_token: CancellationToken,
) -> Result<(), Btr2Error> {
    // A reader that is already connected short-circuits the scan.
    info!("checking for connected readers");
    for device in adapter.connected_devices().await? {
        if matches_prefix(&device, &name_prefix) {
            let rssi = device.rssi().await.ok();
            let info = describe(&device, rssi);
            info!("reader already connected: {} ({})", info.name, info.id);
            seen.lock().await.insert(info.id.clone(), device);
            let _ = events.send(SessionEvent::DeviceSeen(info));
            return Ok(());
        }
    }

    info!("starting bluetooth scan");
    let mut scan_stream = adapter.scan(&[]).await?;

    loop {
        tokio::select! {
            result = scan_stream.next() => {
                match result {
                    Some(discovered) => {
                        let device = discovered.device;
                        debug!("advertisement from {:?}, rssi {:?}", device, discovered.rssi);
                        if matches_prefix(&device, &name_prefix) {
                            let info = describe(&device, discovered.rssi);
                            info!("found reader: {} ({}, rssi {:?})", info.name, info.id, info.rssi);
                            seen.lock().await.insert(info.id.clone(), device);
                            if events.send(SessionEvent::DeviceSeen(info)).is_err() {
                                break;
                            }
                        }
                    }
                    None => {
                        info!("bluetooth scan stream ended");
                        break;
                    }
                }
            }
            _ = cancel_token.cancelled() => break,
        }
    }
    Ok(())
}

fn describe(device: &Device, rssi: Option<i16>) -> DiscoveredDevice {
    let id = device.id().to_string();
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    let address = extract_mac_address(&id).unwrap_or_else(|| "N/A".to_string());
    DiscoveredDevice {
        id,
        name,
        address,
        rssi,
    }
}

fn extract_mac_address(device_id_str: &str) -> Option<String> {
    let re = Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})").unwrap();
    re.find_iter(device_id_str)
        .last()
        .map(|m| m.as_str().to_uppercase())
}

fn matches_prefix(device: &Device, name_prefix: &str) -> bool {
    device
        .name()
        .ok()
        .as_ref()
        .map(|name| name.starts_with(name_prefix))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_extraction_from_platform_device_ids() {
        assert_eq!(
            extract_mac_address("hci0/dev_00_80_25_4c_8e_2a-00:80:25:4C:8E:2A"),
            Some("00:80:25:4C:8E:2A".to_string())
        );
        assert_eq!(
            extract_mac_address("a0-b1-c2-d3-e4-f5"),
            Some("A0-B1-C2-D3-E4-F5".to_string())
        );
        assert_eq!(extract_mac_address("3b2f9a40-uuid-style-id"), None);
    }
}
