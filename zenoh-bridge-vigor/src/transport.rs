//! Modbus transport client.
//!
//! The appliance drops frames that arrive while it is still busy, so every
//! request goes through one gate and waits out the pacing delay first.

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_modbus::client::{Context, Reader, Writer};
use tokio_modbus::prelude::*;
use tracing::{debug, error, info, warn};

use crate::config::{BridgeKind, ConnectionConfig, DeviceConfig, Parity};
use crate::registers::{self, RegisterKind, RegisterSpec};

/// Error type for transport operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("No response within {0:?}")]
    Timeout(Duration),
    #[error("Not connected")]
    NotConnected,
}

/// An open session with the appliance.
#[async_trait]
pub trait RegisterLink: Send {
    async fn read_input_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError>;

    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError>;

    async fn write_single_register(&mut self, address: u16, value: u16)
    -> Result<(), TransportError>;

    /// Whether the underlying stream is still usable.
    fn is_connected(&self) -> bool;

    async fn disconnect(&mut self) {}
}

/// Opens [`RegisterLink`]s.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn RegisterLink>, TransportError>;

    /// Human readable endpoint, for logs.
    fn describe(&self) -> String;
}

/// Connects to the appliance with `tokio-modbus`.
#[derive(Debug, Clone)]
pub struct ModbusConnector {
    connection: ConnectionConfig,
    slave: Slave,
}

impl ModbusConnector {
    pub fn new(connection: ConnectionConfig, unit_id: u8) -> Self {
        Self {
            connection,
            slave: Slave(unit_id),
        }
    }
}

fn serial_parity(parity: Parity) -> tokio_serial::Parity {
    match parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Even => tokio_serial::Parity::Even,
        Parity::Odd => tokio_serial::Parity::Odd,
    }
}

#[async_trait]
impl Connector for ModbusConnector {
    async fn connect(&self) -> Result<Box<dyn RegisterLink>, TransportError> {
        let ctx = match &self.connection {
            ConnectionConfig::Serial {
                port,
                baud_rate,
                parity,
            } => {
                let stop_bits = match parity.stop_bits() {
                    2 => tokio_serial::StopBits::Two,
                    _ => tokio_serial::StopBits::One,
                };

                let builder = tokio_serial::new(port, *baud_rate)
                    .data_bits(tokio_serial::DataBits::Eight)
                    .parity(serial_parity(*parity))
                    .stop_bits(stop_bits);

                let serial = tokio_serial::SerialStream::open(&builder).map_err(|e| {
                    TransportError::Connection(format!("Serial open failed: {}", e))
                })?;

                rtu::attach_slave(serial, self.slave)
            }
            ConnectionConfig::Tcp { host, port, bridge } => {
                let stream = TcpStream::connect((host.as_str(), *port))
                    .await
                    .map_err(|e| TransportError::Connection(e.to_string()))?;

                match bridge {
                    BridgeKind::Tunnel => rtu::attach_slave(stream, self.slave),
                    BridgeKind::Gateway => tcp::attach_slave(stream, self.slave),
                }
            }
        };

        Ok(Box::new(ModbusLink { ctx, alive: true }))
    }

    fn describe(&self) -> String {
        self.connection.to_string()
    }
}

/// A `tokio-modbus` client context.
struct ModbusLink {
    ctx: Context,
    alive: bool,
}

impl ModbusLink {
    fn check<T>(&mut self, result: tokio_modbus::Result<T>) -> Result<T, TransportError> {
        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(exception)) => Err(TransportError::Protocol(format!(
                "Exception: {:?}",
                exception
            ))),
            Err(tokio_modbus::Error::Transport(e)) => {
                self.alive = false;
                Err(TransportError::Connection(e.to_string()))
            }
            Err(e) => Err(TransportError::Protocol(e.to_string())),
        }
    }
}

#[async_trait]
impl RegisterLink for ModbusLink {
    async fn read_input_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        let result = self.ctx.read_input_registers(address, count).await;
        self.check(result)
    }

    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        let result = self.ctx.read_holding_registers(address, count).await;
        self.check(result)
    }

    async fn write_single_register(
        &mut self,
        address: u16,
        value: u16,
    ) -> Result<(), TransportError> {
        let result = self.ctx.write_single_register(address, value).await;
        self.check(result)
    }

    fn is_connected(&self) -> bool {
        self.alive
    }

    async fn disconnect(&mut self) {
        if let Err(e) = self.ctx.disconnect().await {
            debug!(error = %e, "Error while disconnecting");
        }
        self.alive = false;
    }
}

/// Pacing, timeout and retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSettings {
    /// Sleep before every request, inside the gate
    pub request_delay: Duration,
    /// Deadline for a single attempt (and for connecting)
    pub timeout: Duration,
    /// Extra attempts after a timeout
    pub retries: u32,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            request_delay: Duration::from_millis(150),
            timeout: Duration::from_secs(3),
            retries: 2,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Request {
    ReadInput { address: u16, count: u16 },
    ReadHolding { address: u16, count: u16 },
    Write { address: u16, value: u16 },
}

impl Request {
    fn is_write(&self) -> bool {
        matches!(self, Request::Write { .. })
    }

    async fn dispatch(&self, link: &mut dyn RegisterLink) -> Result<Vec<u16>, TransportError> {
        let (words, count) = match *self {
            Request::ReadInput { address, count } => {
                (link.read_input_registers(address, count).await?, count)
            }
            Request::ReadHolding { address, count } => {
                (link.read_holding_registers(address, count).await?, count)
            }
            Request::Write { address, value } => {
                link.write_single_register(address, value).await?;
                return Ok(Vec::new());
            }
        };

        if words.len() < usize::from(count) {
            return Err(TransportError::Protocol(format!(
                "expected {} registers, got {}",
                count,
                words.len()
            )));
        }
        Ok(words)
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::ReadInput { address, count } => {
                write!(f, "read input {} x{}", address, count)
            }
            Request::ReadHolding { address, count } => {
                write!(f, "read holding {} x{}", address, count)
            }
            Request::Write { address, value } => write!(f, "write {}={}", address, value),
        }
    }
}

/// The only component that talks to the wire.
///
/// Requests are served one at a time in submission order. Starts
/// disconnected; a failed connection drops the session until the next
/// [`VigorClient::connect`].
pub struct VigorClient {
    connector: Box<dyn Connector>,
    settings: TransportSettings,
    link: Mutex<Option<Box<dyn RegisterLink>>>,
    connected: AtomicBool,
}

impl VigorClient {
    pub fn new(connector: impl Connector + 'static, settings: TransportSettings) -> Self {
        Self {
            connector: Box::new(connector),
            settings,
            link: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    /// Client for the configured appliance.
    pub fn from_config(device: &DeviceConfig) -> Self {
        Self::new(
            ModbusConnector::new(device.connection.clone(), device.unit_id),
            device.transport_settings(),
        )
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    /// Open the link. Does nothing if a live link is already open.
    pub async fn connect(&self) -> Result<(), TransportError> {
        let mut link = self.link.lock().await;
        if link.as_ref().is_some_and(|l| l.is_connected()) {
            return Ok(());
        }

        let endpoint = self.connector.describe();
        let result = match tokio::time::timeout(self.settings.timeout, self.connector.connect())
            .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.settings.timeout)),
        };

        match result {
            Ok(opened) => {
                *link = Some(opened);
                self.connected.store(true, Ordering::SeqCst);
                info!(endpoint = %endpoint, "Connected to Vigor");
                Ok(())
            }
            Err(e) => {
                *link = None;
                self.connected.store(false, Ordering::SeqCst);
                warn!(endpoint = %endpoint, error = %e, "Failed to connect to Vigor");
                Err(e)
            }
        }
    }

    /// Release the link. Safe to call when already closed.
    pub async fn close(&self) {
        let mut link = self.link.lock().await;
        if let Some(mut open) = link.take() {
            open.disconnect().await;
            debug!("Modbus link closed");
        }
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub async fn read_input_registers(
        &self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        self.execute(Request::ReadInput { address, count }).await
    }

    pub async fn read_holding_registers(
        &self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        self.execute(Request::ReadHolding { address, count }).await
    }

    /// Read a register block.
    pub async fn read(&self, spec: RegisterSpec) -> Result<Vec<u16>, TransportError> {
        match spec.kind {
            RegisterKind::Input => self.read_input_registers(spec.address, spec.count).await,
            RegisterKind::Holding => self.read_holding_registers(spec.address, spec.count).await,
        }
    }

    pub async fn write_register(&self, address: u16, value: u16) -> Result<(), TransportError> {
        self.execute(Request::Write { address, value })
            .await
            .map(|_| ())
    }

    /// Read the active-function register once, to check the link end to end.
    pub async fn probe(&self) -> Result<u16, TransportError> {
        let words = self
            .read_input_registers(registers::ACTIVE_FUNCTION, 1)
            .await?;
        words
            .first()
            .copied()
            .ok_or_else(|| TransportError::Protocol("empty response".to_string()))
    }

    async fn execute(&self, request: Request) -> Result<Vec<u16>, TransportError> {
        let mut guard = self.link.lock().await;
        let Some(link) = guard.as_mut() else {
            return Err(TransportError::NotConnected);
        };

        let result = self.attempt(link.as_mut(), request).await;

        // A fresh link on the next cycle discards replies to abandoned frames.
        if !link.is_connected() || matches!(result, Err(TransportError::Timeout(_))) {
            *guard = None;
            self.connected.store(false, Ordering::SeqCst);
        }

        if let Err(e) = &result {
            if request.is_write() {
                error!(request = %request, error = %e, "Modbus write failed");
            } else {
                warn!(request = %request, error = %e, "Modbus read failed");
            }
        }
        result
    }

    async fn attempt(
        &self,
        link: &mut dyn RegisterLink,
        request: Request,
    ) -> Result<Vec<u16>, TransportError> {
        let mut retries_left = self.settings.retries;
        // Retries reuse the link, so a late reply to a timed-out frame can
        // still be read as the answer to the next one.
        loop {
            tokio::time::sleep(self.settings.request_delay).await;

            let result = tokio::time::timeout(self.settings.timeout, request.dispatch(link))
                .await
                .unwrap_or(Err(TransportError::Timeout(self.settings.timeout)));

            match result {
                Err(TransportError::Timeout(_)) if retries_left > 0 => {
                    retries_left -= 1;
                    debug!(request = %request, retries_left, "Request timed out, retrying");
                }
                other => return other,
            }
        }
    }
}

impl fmt::Debug for VigorClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VigorClient")
            .field("endpoint", &self.connector.describe())
            .field("settings", &self.settings)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use tokio::time::Instant;

    #[derive(Debug, Clone, Copy)]
    enum Reply {
        Ok,
        Hang,
        Exception,
        Reset,
    }

    #[derive(Default)]
    struct Wire {
        script: VecDeque<Reply>,
        busy: Duration,
        /// (start, end) of every request seen by the link
        frames: Vec<(Instant, Instant)>,
        connects: usize,
    }

    struct FakeLink {
        wire: Arc<std::sync::Mutex<Wire>>,
        alive: bool,
    }

    impl FakeLink {
        async fn exchange(&mut self, count: u16) -> Result<Vec<u16>, TransportError> {
            let start = Instant::now();
            let (reply, busy) = {
                let mut wire = self.wire.lock().unwrap();
                (wire.script.pop_front().unwrap_or(Reply::Ok), wire.busy)
            };
            let result = match reply {
                Reply::Ok => {
                    tokio::time::sleep(busy).await;
                    Ok(vec![7; usize::from(count)])
                }
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Vec::new())
                }
                Reply::Exception => Err(TransportError::Protocol("Exception: IllegalDataAddress".into())),
                Reply::Reset => {
                    self.alive = false;
                    Err(TransportError::Connection("connection reset".into()))
                }
            };
            self.wire.lock().unwrap().frames.push((start, Instant::now()));
            result
        }
    }

    #[async_trait]
    impl RegisterLink for FakeLink {
        async fn read_input_registers(
            &mut self,
            _address: u16,
            count: u16,
        ) -> Result<Vec<u16>, TransportError> {
            self.exchange(count).await
        }

        async fn read_holding_registers(
            &mut self,
            _address: u16,
            count: u16,
        ) -> Result<Vec<u16>, TransportError> {
            self.exchange(count).await
        }

        async fn write_single_register(
            &mut self,
            _address: u16,
            _value: u16,
        ) -> Result<(), TransportError> {
            self.exchange(0).await.map(|_| ())
        }

        fn is_connected(&self) -> bool {
            self.alive
        }
    }

    struct FakeConnector(Arc<std::sync::Mutex<Wire>>);

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self) -> Result<Box<dyn RegisterLink>, TransportError> {
            self.0.lock().unwrap().connects += 1;
            Ok(Box::new(FakeLink {
                wire: self.0.clone(),
                alive: true,
            }))
        }

        fn describe(&self) -> String {
            "fake".to_string()
        }
    }

    fn client(script: &[Reply]) -> (VigorClient, Arc<std::sync::Mutex<Wire>>) {
        let wire = Arc::new(std::sync::Mutex::new(Wire {
            script: script.iter().copied().collect(),
            busy: Duration::from_millis(40),
            ..Default::default()
        }));
        let client = VigorClient::new(FakeConnector(wire.clone()), TransportSettings::default());
        (client, wire)
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_disconnected() {
        let (client, wire) = client(&[]);
        assert!(!client.is_connected());
        assert_eq!(
            client.read_input_registers(4020, 5).await,
            Err(TransportError::NotConnected)
        );
        assert!(wire.lock().unwrap().frames.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_before_first_request() {
        let (client, wire) = client(&[]);
        client.connect().await.unwrap();
        assert!(client.is_connected());

        let before = Instant::now();
        let words = client.read_input_registers(4020, 5).await.unwrap();
        assert_eq!(words.len(), 5);

        let (start, _) = wire.lock().unwrap().frames[0];
        assert!(start - before >= Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_never_interleave() {
        let (client, wire) = client(&[]);
        client.connect().await.unwrap();

        let (a, b, c) = tokio::join!(
            client.read_input_registers(4030, 8),
            client.write_register(8003, 1),
            client.read_holding_registers(6100, 3),
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();

        let frames = wire.lock().unwrap().frames.clone();
        assert_eq!(frames.len(), 3);
        for pair in frames.windows(2) {
            let (_, first_end) = pair[0];
            let (second_start, _) = pair[1];
            assert!(second_start - first_end >= Duration::from_millis(150));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_retried() {
        let (client, wire) = client(&[Reply::Hang, Reply::Hang, Reply::Ok]);
        client.connect().await.unwrap();

        assert!(client.read_input_registers(4100, 1).await.is_ok());
        assert_eq!(wire.lock().unwrap().script.len(), 0);
        assert!(client.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_gives_up_after_retries() {
        let (client, wire) = client(&[Reply::Hang, Reply::Hang, Reply::Hang, Reply::Ok]);
        client.connect().await.unwrap();

        assert_eq!(
            client.read_input_registers(4100, 1).await,
            Err(TransportError::Timeout(Duration::from_secs(3)))
        );
        // the fourth reply was never requested
        assert_eq!(wire.lock().unwrap().script.len(), 1);
        assert!(!client.is_connected());
        assert_eq!(
            client.read_input_registers(4100, 1).await,
            Err(TransportError::NotConnected)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exception_is_not_retried() {
        let (client, wire) = client(&[Reply::Exception, Reply::Ok]);
        client.connect().await.unwrap();

        assert!(matches!(
            client.write_register(6100, 9).await,
            Err(TransportError::Protocol(_))
        ));
        assert_eq!(wire.lock().unwrap().frames.len(), 1);
        assert!(client.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_reset_drops_link() {
        let (client, wire) = client(&[Reply::Reset]);
        client.connect().await.unwrap();

        assert!(matches!(
            client.read_input_registers(4020, 5).await,
            Err(TransportError::Connection(_))
        ));
        assert!(!client.is_connected());
        assert_eq!(
            client.probe().await,
            Err(TransportError::NotConnected)
        );

        client.connect().await.unwrap();
        assert_eq!(wire.lock().unwrap().connects, 2);
        assert_eq!(client.probe().await, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent() {
        let (client, _) = client(&[]);
        client.connect().await.unwrap();
        client.close().await;
        client.close().await;
        assert!(!client.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_reuses_live_link() {
        let (client, wire) = client(&[]);
        client.connect().await.unwrap();
        client.connect().await.unwrap();
        assert_eq!(wire.lock().unwrap().connects, 1);
    }
}
