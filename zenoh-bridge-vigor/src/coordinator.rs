//! Poll cycle and polling cadence.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::commands::CommandEncoder;
use crate::decode::{Batch, DecodeError, Fields};
use crate::snapshot::{DeviceSnapshot, SnapshotProvider};
use crate::transport::{TransportError, VigorClient};

/// Why a single batch could not be read.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BatchError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Why a whole cycle produced no snapshot.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PollError {
    #[error("Connect failed: {0}")]
    Connect(#[source] TransportError),
    #[error("Core status read failed: {0}")]
    CoreBatch(#[source] BatchError),
}

/// Polling cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub backoff_interval: Duration,
    /// Consecutive failed cycles before switching to `backoff_interval`
    pub failures_before_backoff: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            backoff_interval: Duration::from_secs(120),
            failures_before_backoff: 3,
        }
    }
}

/// Failure counter and effective interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollState {
    pub consecutive_failures: u32,
    pub interval: Duration,
    pub in_backoff: bool,
}

impl PollState {
    fn normal(settings: &PollSettings) -> Self {
        Self {
            consecutive_failures: 0,
            interval: settings.interval,
            in_backoff: false,
        }
    }
}

/// Reads full snapshots from the appliance.
///
/// The first batch (core status) must succeed for a cycle to count; every
/// later batch is optional and only drops its own fields when it fails.
pub struct Coordinator {
    device: String,
    client: Arc<VigorClient>,
    settings: PollSettings,
    state: PollState,
}

impl Coordinator {
    pub fn new(device: impl Into<String>, client: Arc<VigorClient>, settings: PollSettings) -> Self {
        Self {
            device: device.into(),
            client,
            state: PollState::normal(&settings),
            settings,
        }
    }

    pub fn poll_state(&self) -> PollState {
        self.state
    }

    pub fn client(&self) -> &Arc<VigorClient> {
        &self.client
    }

    /// Run one poll cycle and update the cadence.
    ///
    /// A failed cycle closes the client so the next one reconnects.
    pub async fn poll_cycle(&mut self) -> Result<Arc<DeviceSnapshot>, PollError> {
        match self.read_snapshot().await {
            Ok(snapshot) => {
                self.record_success();
                Ok(Arc::new(snapshot))
            }
            Err(e) => {
                self.record_failure();
                self.client.close().await;
                Err(e)
            }
        }
    }

    async fn read_snapshot(&self) -> Result<DeviceSnapshot, PollError> {
        if !self.client.is_connected() {
            self.client.connect().await.map_err(PollError::Connect)?;
        }

        let mut snapshot = DeviceSnapshot::new(Utc::now());
        let core = self
            .read_batch(Batch::Core)
            .await
            .map_err(PollError::CoreBatch)?;
        snapshot.extend(core);

        for batch in Batch::OPTIONAL {
            match self.read_batch(batch).await {
                Ok(fields) => snapshot.extend(fields),
                Err(e) => {
                    debug!(device = %self.device, batch = batch.name(), error = %e, "Batch skipped");
                }
            }
        }

        Ok(snapshot)
    }

    async fn read_batch(&self, batch: Batch) -> Result<Fields, BatchError> {
        let words = self.client.read(batch.spec()).await?;
        Ok(batch.decode(&words)?)
    }

    fn record_success(&mut self) {
        if self.state.in_backoff {
            info!(
                device = %self.device,
                interval_secs = self.settings.interval.as_secs(),
                "Vigor reachable again, restoring normal poll interval"
            );
        }
        self.state = PollState::normal(&self.settings);
    }

    fn record_failure(&mut self) {
        self.state.consecutive_failures = self.state.consecutive_failures.saturating_add(1);

        if !self.state.in_backoff
            && self.state.consecutive_failures >= self.settings.failures_before_backoff
        {
            self.state.in_backoff = true;
            self.state.interval = self.settings.backoff_interval;
            warn!(
                device = %self.device,
                failures = self.state.consecutive_failures,
                interval_secs = self.settings.backoff_interval.as_secs(),
                "Vigor unreachable, backing off"
            );
        }
    }

    /// Spawn the poll loop. The first cycle runs immediately.
    pub fn start(self) -> CoordinatorHandle {
        let (snapshot_tx, snapshot_rx) = watch::channel(None);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let refresh = RefreshTrigger::default();
        let client = self.client.clone();

        let task = tokio::spawn(self.run(snapshot_tx, refresh.clone(), shutdown_rx));

        CoordinatorHandle {
            snapshots: snapshot_rx,
            refresh,
            shutdown: shutdown_tx,
            task,
            client,
        }
    }

    async fn run(
        mut self,
        snapshots: watch::Sender<Option<Arc<DeviceSnapshot>>>,
        refresh: RefreshTrigger,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            device = %self.device,
            interval_secs = self.settings.interval.as_secs(),
            "Starting Vigor coordinator"
        );

        loop {
            match self.poll_cycle().await {
                Ok(snapshot) => {
                    debug!(device = %self.device, fields = snapshot.len(), "Poll cycle complete");
                    snapshots.send_replace(Some(snapshot));
                }
                Err(e) if self.state.in_backoff => {
                    debug!(device = %self.device, error = %e, "Poll cycle failed");
                }
                Err(e) => {
                    warn!(
                        device = %self.device,
                        error = %e,
                        failures = self.state.consecutive_failures,
                        "Poll cycle failed"
                    );
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.state.interval) => {}
                _ = refresh.0.notified() => {
                    debug!(device = %self.device, "Refresh requested");
                }
                _ = shutdown.changed() => break,
            }
        }

        info!(device = %self.device, "Vigor coordinator stopped");
    }
}

/// Asks the poll loop to run a cycle now.
#[derive(Debug, Clone, Default)]
pub struct RefreshTrigger(Arc<Notify>);

impl RefreshTrigger {
    /// Requests made while a cycle is running start the next one right after it.
    pub fn fire(&self) {
        self.0.notify_one();
    }
}

/// A running coordinator.
pub struct CoordinatorHandle {
    snapshots: watch::Receiver<Option<Arc<DeviceSnapshot>>>,
    refresh: RefreshTrigger,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    client: Arc<VigorClient>,
}

impl CoordinatorHandle {
    /// Receiver that sees every new snapshot. Failed cycles send nothing.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<DeviceSnapshot>>> {
        self.snapshots.clone()
    }

    pub fn request_refresh(&self) {
        self.refresh.fire();
    }

    pub fn refresh_trigger(&self) -> RefreshTrigger {
        self.refresh.clone()
    }

    /// Command encoder sharing the coordinator's transport client.
    pub fn commands(&self) -> CommandEncoder {
        CommandEncoder::new(self.client.clone())
    }

    /// Stop the loop after the current cycle and close the client.
    pub async fn stop(self) {
        self.shutdown.send_replace(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Coordinator task ended abnormally");
        }
        self.client.close().await;
    }
}

impl SnapshotProvider for CoordinatorHandle {
    fn snapshot(&self) -> Option<Arc<DeviceSnapshot>> {
        self.snapshots.borrow().clone()
    }
}
