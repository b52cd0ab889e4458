//! Test doubles for transports and the message bus.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use regbridge_framework::{BusClient, LinkState, PublishOptions};

use crate::error::TransportError;
use crate::transport::{RegisterRead, RegisterTransport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    SetUnit(u8),
    Read { fc: u8, address: u16, length: u16 },
    Reset,
}

#[derive(Debug, Default)]
struct MockState {
    responses: HashMap<(u8, u16), Result<RegisterRead, String>>,
    hanging: HashSet<(u8, u16)>,
    fail_addressing: bool,
    read_delay: Option<Duration>,
    calls: Vec<Call>,
}

/// Scripted transport. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registers(self, fc: u8, address: u16, registers: Vec<u16>) -> Self {
        self.state
            .lock()
            .unwrap()
            .responses
            .insert((fc, address), Ok(RegisterRead::from_registers(registers)));
        self
    }

    pub fn with_bits(self, fc: u8, address: u16, bits: &[bool]) -> Self {
        self.state
            .lock()
            .unwrap()
            .responses
            .insert((fc, address), Ok(RegisterRead::from_bits(bits)));
        self
    }

    pub fn with_failure(self, fc: u8, address: u16, message: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .responses
            .insert((fc, address), Err(message.to_string()));
        self
    }

    pub fn with_hang(self, fc: u8, address: u16) -> Self {
        self.state.lock().unwrap().hanging.insert((fc, address));
        self
    }

    pub fn with_read_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().read_delay = Some(delay);
        self
    }

    pub fn failing_addressing(self) -> Self {
        self.state.lock().unwrap().fail_addressing = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn reads(&self) -> Vec<(u8, u16, u16)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Read {
                    fc,
                    address,
                    length,
                } => Some((fc, address, length)),
                _ => None,
            })
            .collect()
    }

    async fn read(&mut self, fc: u8, address: u16, length: u16) -> Result<RegisterRead, TransportError> {
        let (hang, delay) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::Read {
                fc,
                address,
                length,
            });
            (state.hanging.contains(&(fc, address)), state.read_delay)
        };

        if hang {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match self.state.lock().unwrap().responses.get(&(fc, address)) {
            Some(Ok(read)) => Ok(read.clone()),
            Some(Err(message)) => Err(TransportError::Protocol(message.clone())),
            None => Err(TransportError::Exception("IllegalDataAddress".to_string())),
        }
    }
}

#[async_trait]
impl RegisterTransport for MockTransport {
    async fn set_unit(&mut self, unit_id: u8) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::SetUnit(unit_id));
        if state.fail_addressing {
            return Err(TransportError::Connection("connection refused".to_string()));
        }
        Ok(())
    }

    async fn read_coils(&mut self, address: u16, length: u16) -> Result<RegisterRead, TransportError> {
        self.read(1, address, length).await
    }

    async fn read_discrete_inputs(
        &mut self,
        address: u16,
        length: u16,
    ) -> Result<RegisterRead, TransportError> {
        self.read(2, address, length).await
    }

    async fn read_holding_registers(
        &mut self,
        address: u16,
        length: u16,
    ) -> Result<RegisterRead, TransportError> {
        self.read(3, address, length).await
    }

    async fn read_input_registers(
        &mut self,
        address: u16,
        length: u16,
    ) -> Result<RegisterRead, TransportError> {
        self.read(4, address, length).await
    }

    async fn reset(&mut self) {
        self.state.lock().unwrap().calls.push(Call::Reset);
    }
}

/// Bus client recording every publish.
#[derive(Debug)]
pub struct RecordingBus {
    link: Mutex<LinkState>,
    sent: Mutex<Vec<(String, String)>>,
    subscriptions: Mutex<Vec<String>>,
}

impl RecordingBus {
    pub fn new(link: LinkState) -> Arc<Self> {
        Arc::new(Self {
            link: Mutex::new(link),
            sent: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    pub fn set_link(&self, link: LinkState) {
        *self.link.lock().unwrap() = link;
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, topic: &str) -> Vec<serde_json::Value> {
        self.sent()
            .into_iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| serde_json::from_str(&payload).unwrap())
            .collect()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }
}

#[async_trait]
impl BusClient for RecordingBus {
    fn link_state(&self) -> LinkState {
        *self.link.lock().unwrap()
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        _options: PublishOptions,
    ) -> regbridge_framework::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((topic.to_string(), String::from_utf8(payload).unwrap()));
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> regbridge_framework::Result<()> {
        self.subscriptions.lock().unwrap().push(topic.to_string());
        Ok(())
    }

    async fn disconnect(&self) -> regbridge_framework::Result<()> {
        self.set_link(LinkState::Disconnected);
        Ok(())
    }
}
