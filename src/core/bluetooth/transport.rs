//! Transport seam between the session actor and the Bluetooth backend.
//!
//! The actor never touches device handles directly: it addresses readers by
//! their discovered id and receives the resolved link through an event. The
//! trait keeps the state machine independent of the Bluetooth backend the
//! same way `Btr2Link` does for the transfer protocol.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bluest::{Adapter, Device};
use log::{info, warn};
use tokio::sync::{mpsc, Mutex};

use crate::config::BridgeConfig;
use crate::core::bluetooth::connection::ConnectionManager;
use crate::core::bluetooth::link::{BluestLink, Btr2Link};
use crate::core::bluetooth::scanner::Btr2Scanner;
use crate::core::bluetooth::session::SessionEvent;
use crate::core::bluetooth::types::ConnectedDeviceState;
use crate::error::Btr2Error;

/// Scanning, connecting and releasing, as the session actor sees them.
///
/// `start_scan` reports matching readers as `DeviceSeen` events;
/// `begin_connect` resolves a previously seen id and reports the outcome as
/// one `ConnectFinished` event. At most one device is held at a time.
#[async_trait]
pub(crate) trait ReaderTransport: Send {
    async fn start_scan(
        &mut self,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<(), Btr2Error>;

    async fn stop_scan(&mut self);

    async fn begin_connect(
        &mut self,
        device_id: &str,
        events: mpsc::UnboundedSender<SessionEvent>,
    );

    /// Releases the held device, if any.
    async fn release(&mut self);
}

/// `ReaderTransport` over a real bluest adapter.
pub(crate) struct BluestTransport {
    scanner: Btr2Scanner,
    connection: ConnectionManager,
    seen: Arc<Mutex<HashMap<String, Device>>>,
    connected: Arc<Mutex<Option<ConnectedDeviceState>>>,
}

impl BluestTransport {
    pub fn new(adapter: Adapter, config: &BridgeConfig) -> Self {
        Self {
            scanner: Btr2Scanner::new(adapter.clone(), config.device_name_prefix.clone()),
            connection: ConnectionManager::new(adapter, config),
            seen: Arc::new(Mutex::new(HashMap::new())),
            connected: Arc::new(Mutex::new(None)),
        }
    }
}

#[async_trait]
impl ReaderTransport for BluestTransport {
    async fn start_scan(
        &mut self,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<(), Btr2Error> {
        self.seen.lock().await.clear();
        self.scanner.start(self.seen.clone(), events).await
    }

    async fn stop_scan(&mut self) {
        self.scanner.stop().await;
    }

    async fn begin_connect(
        &mut self,
        device_id: &str,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) {
        let device = self.seen.lock().await.get(device_id).cloned();
        let Some(device) = device else {
            warn!("device {device_id} is no longer in the discovered set");
            let _ = events.send(SessionEvent::ConnectFinished(Err(Btr2Error::Disconnect)));
            return;
        };

        let manager = self.connection.clone();
        let connected = self.connected.clone();
        tokio::spawn(async move {
            let result = match manager.connect(&device).await {
                Ok(state) => {
                    if let Some(level) = state.battery_level().await {
                        info!("reader battery at {level}%");
                    }
                    if let Some(name) = state.manufacturer_name().await {
                        info!("reader manufacturer: {name}");
                    }
                    let link: Arc<dyn Btr2Link> =
                        Arc::new(BluestLink::new(state.characteristics.clone()));
                    *connected.lock().await = Some(state);
                    Ok(link)
                }
                Err(e) => Err(e),
            };
            let _ = events.send(SessionEvent::ConnectFinished(result));
        });
    }

    async fn release(&mut self) {
        let state = self.connected.lock().await.take();
        if let Some(state) = state {
            if let Err(e) = self.connection.disconnect(&state.device).await {
                warn!("error disconnecting from device: {e}");
            }
        }
    }
}
