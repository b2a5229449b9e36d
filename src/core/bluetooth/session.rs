//! Connection session state machine for BTR2 readers.
//!
//! One actor task owns the whole device lifecycle: scan, connect and bond,
//! poll, disconnect. All state lives inside the actor and is mutated only by
//! its event handlers, so any in-flight callback sees the current state by
//! sending an event rather than reading a stale copy. Observers get
//! consistent snapshots through a watch channel.

use std::sync::Arc;
use std::time::Duration;

use bluest::Adapter;
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::BridgeConfig;
use crate::core::bluetooth::link::Btr2Link;
use crate::core::bluetooth::transport::{BluestTransport, ReaderTransport};
use crate::core::bluetooth::types::DiscoveredDevice;
use crate::core::transfer::{self, TransferOptions};
use crate::error::Btr2Error;

/// Lifecycle states of a reader session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Disabled,
    Enabled,
    Scanning,
    DeviceFound,
    Connecting,
    Connected,
    Transmitting,
    Disconnected,
}

/// Consistent view of the session for observers.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub devices: Vec<DiscoveredDevice>,
    pub readings: Vec<String>,
}

impl SessionSnapshot {
    fn initial() -> Self {
        Self {
            state: SessionState::Disabled,
            devices: Vec::new(),
            readings: Vec::new(),
        }
    }

    /// The most recent chip number, if any was scanned.
    pub fn last_reading(&self) -> Option<&str> {
        self.readings.last().map(String::as_str)
    }

    pub fn is_enabled(&self) -> bool {
        self.state != SessionState::Disabled
    }
}

/// Events processed by the session actor. Child tasks (scanner, connect
/// attempt, read loop) report through these rather than touching state.
pub(crate) enum SessionEvent {
    Start,
    Stop,
    Shutdown,
    DeviceSeen(DiscoveredDevice),
    Connect,
    ConnectFinished(Result<Arc<dyn Btr2Link>, Btr2Error>),
    ReadingScanned(String),
    LinkLost,
}

/// Handle to a running session actor.
pub struct Btr2Session {
    events: mpsc::UnboundedSender<SessionEvent>,
    snapshot: watch::Receiver<SessionSnapshot>,
    task: JoinHandle<()>,
}

impl Btr2Session {
    /// Spawns the session actor. The session starts `Disabled` and does
    /// nothing until [`start`](Self::start) is called.
    pub fn spawn(adapter: Adapter, config: BridgeConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::initial());

        let transport = BluestTransport::new(adapter, &config);
        let actor = SessionActor::new(config, Box::new(transport), events_tx.clone(), snapshot_tx);
        let task = tokio::spawn(actor.run(events_rx));

        Self {
            events: events_tx,
            snapshot: snapshot_rx,
            task,
        }
    }

    /// Enables the session: clears prior state and begins scanning.
    pub fn start(&self) {
        let _ = self.events.send(SessionEvent::Start);
    }

    /// Disables the session from any state, releasing the device if held.
    pub fn stop(&self) {
        let _ = self.events.send(SessionEvent::Stop);
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Subscribes to snapshot updates.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Disables the session and waits for the actor to finish.
    pub async fn shutdown(self) {
        let _ = self.events.send(SessionEvent::Stop);
        let _ = self.events.send(SessionEvent::Shutdown);
        if let Err(e) = self.task.await {
            error!("session task join error: {e:?}");
        }
    }
}

struct SessionActor {
    config: BridgeConfig,
    state: SessionState,
    devices: Vec<DiscoveredDevice>,
    readings: Vec<String>,
    transport: Box<dyn ReaderTransport>,
    read_cancel: Option<CancellationToken>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl SessionActor {
    fn new(
        config: BridgeConfig,
        transport: Box<dyn ReaderTransport>,
        events_tx: mpsc::UnboundedSender<SessionEvent>,
        snapshot_tx: watch::Sender<SessionSnapshot>,
    ) -> Self {
        Self {
            config,
            state: SessionState::Disabled,
            devices: Vec::new(),
            readings: Vec::new(),
            transport,
            read_cancel: None,
            events_tx,
            snapshot_tx,
        }
    }

    async fn run(mut self, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Shutdown => break,
                event => self.handle(event).await,
            }
        }
        self.teardown().await;
        info!("session actor finished");
    }

    async fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Start => {
                if self.state == SessionState::Disabled {
                    self.readings.clear();
                    self.begin_scan().await;
                }
            }
            SessionEvent::Stop => self.teardown().await,
            SessionEvent::DeviceSeen(info) => self.on_device_seen(info),
            SessionEvent::Connect => self.on_connect_requested().await,
            SessionEvent::ConnectFinished(result) => self.on_connect_finished(result).await,
            SessionEvent::ReadingScanned(chip) => {
                if self.state == SessionState::Transmitting {
                    self.readings.push(chip);
                    self.publish();
                }
            }
            SessionEvent::LinkLost => self.on_link_lost().await,
            SessionEvent::Shutdown => {}
        }
    }

    /// Records an advertisement while the discovered set is still open.
    ///
    /// Dedup is by device identity; the latest advertisement replaces the
    /// prior record. The first sighting queues a `Connect` so that sightings
    /// already in the channel are folded in before the attempt begins.
    fn on_device_seen(&mut self, info: DiscoveredDevice) {
        if !matches!(
            self.state,
            SessionState::Scanning | SessionState::DeviceFound
        ) {
            debug!("ignoring advertisement in state {:?}", self.state);
            return;
        }

        match self.devices.iter_mut().find(|known| known.id == info.id) {
            Some(entry) => *entry = info,
            None => self.devices.push(info),
        }
        let first_sighting = self.state == SessionState::Scanning;
        self.set_state(SessionState::DeviceFound);
        if first_sighting {
            let _ = self.events_tx.send(SessionEvent::Connect);
        }
    }

    /// Advances out of `DeviceFound`: connect to the first discovered
    /// device, or re-arm scanning if the set emptied in the meantime.
    async fn on_connect_requested(&mut self) {
        if self.state != SessionState::DeviceFound {
            return;
        }
        match self.devices.first() {
            Some(info) => {
                info!("connecting to {} ({})", info.name, info.id);
                let id = info.id.clone();
                self.transport.stop_scan().await;
                self.set_state(SessionState::Connecting);
                self.transport
                    .begin_connect(&id, self.events_tx.clone())
                    .await;
            }
            None => self.begin_scan().await,
        }
    }

    async fn on_connect_finished(&mut self, result: Result<Arc<dyn Btr2Link>, Btr2Error>) {
        if self.state != SessionState::Connecting {
            // A stop raced the connect attempt; release whatever was set up.
            if result.is_ok() {
                self.transport.release().await;
            }
            return;
        }

        match result {
            Ok(link) => {
                self.set_state(SessionState::Connected);

                // Connected advances immediately into the polling loop, whose
                // lifetime is bound to this cancellation token.
                let cancel = CancellationToken::new();
                self.read_cancel = Some(cancel.clone());
                let options = TransferOptions {
                    local_mac: self.config.local_mac.clone(),
                    stall_guard_rounds: self.config.stall_guard_rounds,
                };
                let delay = Duration::from_millis(self.config.read_cycle_delay_ms);
                let events = self.events_tx.clone();
                self.set_state(SessionState::Transmitting);
                tokio::spawn(run_read_loop(link, options, delay, cancel, events));
            }
            Err(e) => {
                warn!("connection attempt failed: {e}");
                self.begin_scan().await;
            }
        }
    }

    async fn on_link_lost(&mut self) {
        if !matches!(
            self.state,
            SessionState::Connected | SessionState::Transmitting
        ) {
            return;
        }
        self.set_state(SessionState::Disconnected);
        self.cancel_read_loop();
        self.transport.release().await;
        // Disconnected re-arms scanning with a cleared discovered set.
        self.begin_scan().await;
    }

    /// Enters `Enabled` and, if the scan task starts, `Scanning`.
    async fn begin_scan(&mut self) {
        self.devices.clear();
        self.set_state(SessionState::Enabled);
        match self.transport.start_scan(self.events_tx.clone()).await {
            Ok(()) => self.set_state(SessionState::Scanning),
            Err(e) => error!("failed to start scanning: {e}"),
        }
    }

    /// Returns to `Disabled` from any state.
    async fn teardown(&mut self) {
        self.cancel_read_loop();
        self.transport.stop_scan().await;
        self.transport.release().await;
        self.devices.clear();
        self.readings.clear();
        self.set_state(SessionState::Disabled);
    }

    fn cancel_read_loop(&mut self) {
        if let Some(token) = self.read_cancel.take() {
            token.cancel();
        }
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state != next {
            info!("session state: {:?} -> {:?}", self.state, next);
            self.state = next;
        }
        self.publish();
    }

    fn publish(&self) {
        let _ = self.snapshot_tx.send(SessionSnapshot {
            state: self.state,
            devices: self.devices.clone(),
            readings: self.readings.clone(),
        });
    }
}

/// Repeating read cycle bound to the `Transmitting` state's lifetime.
///
/// Cancellation never pre-empts an in-flight exchange; it only prevents the
/// next cycle from being scheduled. Checksum, stall and framing failures are
/// logged and the loop continues; only a lost link ends it.
async fn run_read_loop(
    link: Arc<dyn Btr2Link>,
    options: TransferOptions,
    delay: Duration,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        match transfer::read_frame(link.as_ref(), &options).await {
            Ok(frame) => match frame.chip_number() {
                Ok(chip) => {
                    info!("scanned chip number {chip}");
                    if events.send(SessionEvent::ReadingScanned(chip)).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("frame carried an unusable chip field: {e}"),
            },
            Err(Btr2Error::NoData) => debug!("no data pending on device"),
            Err(e) if e.is_disconnect() => {
                warn!("device link lost: {e}");
                let _ = events.send(SessionEvent::LinkLost);
                break;
            }
            Err(e) => warn!("read cycle failed: {e}"),
        }
    }
    debug!("read loop ended");
}
