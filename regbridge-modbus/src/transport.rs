//! Device transports.
//!
//! A [`RegisterTransport`] is one session on a link to one or more devices.
//! The unit a session talks to is switched with
//! [`set_unit`](RegisterTransport::set_unit), so callers must hold the
//! session exclusively from addressing until their last read.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_modbus::client::{Context, Reader};
use tokio_modbus::prelude::*;
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::error::TransportError;

/// One read's result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterRead {
    /// One entry per register, or 0/1 per bit.
    pub data: Vec<u16>,
    /// Registers as big-endian bytes, or bits packed LSB-first.
    pub buffer: Vec<u8>,
}

impl RegisterRead {
    pub fn from_registers(registers: Vec<u16>) -> Self {
        let buffer = registers.iter().flat_map(|r| r.to_be_bytes()).collect();
        Self {
            data: registers,
            buffer,
        }
    }

    pub fn from_bits(bits: &[bool]) -> Self {
        let mut buffer = vec![0u8; bits.len().div_ceil(8)];
        for (i, _) in bits.iter().enumerate().filter(|(_, bit)| **bit) {
            buffer[i / 8] |= 1 << (i % 8);
        }
        Self {
            data: bits.iter().map(|bit| u16::from(*bit)).collect(),
            buffer,
        }
    }
}

/// Register-oriented device session.
#[async_trait]
pub trait RegisterTransport: Send + fmt::Debug {
    /// Address subsequent reads to `unit_id`.
    async fn set_unit(&mut self, unit_id: u8) -> Result<(), TransportError>;

    async fn read_coils(
        &mut self,
        address: u16,
        length: u16,
    ) -> Result<RegisterRead, TransportError>;

    async fn read_discrete_inputs(
        &mut self,
        address: u16,
        length: u16,
    ) -> Result<RegisterRead, TransportError>;

    async fn read_holding_registers(
        &mut self,
        address: u16,
        length: u16,
    ) -> Result<RegisterRead, TransportError>;

    async fn read_input_registers(
        &mut self,
        address: u16,
        length: u16,
    ) -> Result<RegisterRead, TransportError>;

    /// Drop any half-finished exchange; the next call starts clean.
    async fn reset(&mut self);
}

/// Modbus TCP or RTU session, connected when first addressed.
pub struct ModbusTransport {
    connection: ConnectionConfig,
    connect_timeout: Duration,
    ctx: Option<Context>,
    unit: Option<u8>,
}

impl fmt::Debug for ModbusTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModbusTransport")
            .field("connection", &self.connection.session_key())
            .field("connected", &self.ctx.is_some())
            .field("unit", &self.unit)
            .finish()
    }
}

impl ModbusTransport {
    pub fn new(connection: ConnectionConfig, connect_timeout: Duration) -> Self {
        Self {
            connection,
            connect_timeout,
            ctx: None,
            unit: None,
        }
    }

    /// The open context. Reads never reconnect; only
    /// [`set_unit`](RegisterTransport::set_unit) does, bounded by the connect
    /// timeout rather than a read timeout.
    fn context(&mut self) -> Result<&mut Context, TransportError> {
        self.ctx.as_mut().ok_or(TransportError::NotConnected)
    }

    async fn connect(
        connection: ConnectionConfig,
        unit: u8,
        connect_timeout: Duration,
    ) -> Result<Context, TransportError> {
        let slave = Slave(unit);

        match connection {
            ConnectionConfig::Tcp { host, port } => {
                let ctx = tokio::time::timeout(connect_timeout, async {
                    let addr = tokio::net::lookup_host((host.as_str(), port))
                        .await?
                        .next()
                        .ok_or_else(|| {
                            TransportError::Connection(format!("No address for {}:{}", host, port))
                        })?;
                    let ctx = tcp::connect_slave(addr, slave)
                        .await
                        .map_err(|e| TransportError::Connection(e.to_string()))?;
                    info!(%addr, "Connected to Modbus TCP device");
                    Ok::<_, TransportError>(ctx)
                })
                .await
                .map_err(|_| TransportError::Connection("Connection timeout".to_string()))??;

                Ok(ctx)
            }
            ConnectionConfig::Rtu {
                port,
                baud_rate,
                data_bits,
                parity,
                stop_bits,
            } => {
                let parity = match parity.to_lowercase().as_str() {
                    "even" => tokio_serial::Parity::Even,
                    "odd" => tokio_serial::Parity::Odd,
                    _ => tokio_serial::Parity::None,
                };

                let stop_bits = match stop_bits {
                    2 => tokio_serial::StopBits::Two,
                    _ => tokio_serial::StopBits::One,
                };

                let data_bits = match data_bits {
                    5 => tokio_serial::DataBits::Five,
                    6 => tokio_serial::DataBits::Six,
                    7 => tokio_serial::DataBits::Seven,
                    _ => tokio_serial::DataBits::Eight,
                };

                let builder = tokio_serial::new(&port, baud_rate)
                    .parity(parity)
                    .stop_bits(stop_bits)
                    .data_bits(data_bits);

                let serial = tokio_serial::SerialStream::open(&builder).map_err(|e| {
                    TransportError::Connection(format!("Serial open failed: {}", e))
                })?;

                info!(port = %port, baud_rate, "Opened Modbus RTU port");
                Ok(rtu::attach_slave(serial, slave))
            }
        }
    }

    /// Split a tokio-modbus result: exceptions keep the session, anything
    /// else drops it so the next call reconnects.
    fn settle<T>(&mut self, result: tokio_modbus::Result<T>) -> Result<T, TransportError> {
        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(exception)) => Err(TransportError::Exception(format!("{:?}", exception))),
            Err(e) => {
                warn!(connection = %self.connection.session_key(), error = %e, "Dropping Modbus session");
                self.ctx = None;
                Err(TransportError::Protocol(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl RegisterTransport for ModbusTransport {
    async fn set_unit(&mut self, unit_id: u8) -> Result<(), TransportError> {
        self.unit = Some(unit_id);
        if let Some(ctx) = self.ctx.as_mut() {
            ctx.set_slave(Slave(unit_id));
            return Ok(());
        }

        let connection = self.connection.clone();
        self.ctx = Some(Self::connect(connection, unit_id, self.connect_timeout).await?);
        Ok(())
    }

    async fn read_coils(
        &mut self,
        address: u16,
        length: u16,
    ) -> Result<RegisterRead, TransportError> {
        let result = self.context()?.read_coils(address, length).await;
        self.settle(result).map(|bits| RegisterRead::from_bits(&bits))
    }

    async fn read_discrete_inputs(
        &mut self,
        address: u16,
        length: u16,
    ) -> Result<RegisterRead, TransportError> {
        let result = self
            .context()?
            .read_discrete_inputs(address, length)
            .await;
        self.settle(result).map(|bits| RegisterRead::from_bits(&bits))
    }

    async fn read_holding_registers(
        &mut self,
        address: u16,
        length: u16,
    ) -> Result<RegisterRead, TransportError> {
        let result = self
            .context()?
            .read_holding_registers(address, length)
            .await;
        self.settle(result).map(RegisterRead::from_registers)
    }

    async fn read_input_registers(
        &mut self,
        address: u16,
        length: u16,
    ) -> Result<RegisterRead, TransportError> {
        let result = self
            .context()?
            .read_input_registers(address, length)
            .await;
        self.settle(result).map(RegisterRead::from_registers)
    }

    async fn reset(&mut self) {
        if self.ctx.take().is_some() {
            debug!(connection = %self.connection.session_key(), "Modbus session reset");
        }
    }
}

/// A session shared by every device on the same link.
pub type SharedTransport = Arc<Mutex<Box<dyn RegisterTransport>>>;

type TransportFactory = dyn Fn(&ConnectionConfig) -> Box<dyn RegisterTransport> + Send + Sync;

/// Hands out one shared session per distinct connection.
pub struct SessionPool {
    factory: Box<TransportFactory>,
    sessions: Mutex<HashMap<String, SharedTransport>>,
}

impl fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPool").finish_non_exhaustive()
    }
}

impl SessionPool {
    /// Pool creating sessions with `factory`.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&ConnectionConfig) -> Box<dyn RegisterTransport> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Pool of [`ModbusTransport`] sessions.
    pub fn modbus(connect_timeout: Duration) -> Self {
        Self::new(move |connection| {
            Box::new(ModbusTransport::new(connection.clone(), connect_timeout))
        })
    }

    /// The session for `connection`, created on first request.
    pub async fn session(&self, connection: &ConnectionConfig) -> SharedTransport {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(connection.session_key())
            .or_insert_with(|| Arc::new(Mutex::new((self.factory)(connection))))
            .clone()
    }

    /// Forget sessions no device holds any more.
    pub async fn prune(&self) {
        self.sessions
            .lock()
            .await
            .retain(|_, session| Arc::strong_count(session) > 1);
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
