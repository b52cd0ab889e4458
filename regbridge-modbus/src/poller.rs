//! Per-device polling loop.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use regbridge_framework::{ConnectionSupervisor, PublishOptions, PublishOutcome};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::assembler::ResultAssembler;
use crate::device::Device;
use crate::error::{CycleError, panic_message};
use crate::reader::RegisterReader;
use crate::transport::SharedTransport;

/// Timing of a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Delay between the end of one cycle and the start of the next.
    pub interval: Duration,
    /// Timeout of each register read.
    pub read_timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(10_000),
            read_timeout: Duration::from_millis(1000),
        }
    }
}

/// Drives one device: cycle, publish, sleep, repeat.
///
/// Cycles never overlap. [`remove`](Self::remove) is cooperative: the flag
/// is checked after each cycle, so at most one more cycle may start after
/// it is set.
pub struct DevicePoller {
    device: Arc<Device>,
    stop: Arc<AtomicBool>,
    pending: Option<PollLoop>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for DevicePoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevicePoller")
            .field("device", &self.device.id)
            .field("started", &self.task.is_some())
            .field("stopping", &self.stop.load(Ordering::Relaxed))
            .finish()
    }
}

impl DevicePoller {
    pub fn new(
        device: Device,
        session: SharedTransport,
        supervisor: Arc<ConnectionSupervisor>,
        settings: PollSettings,
    ) -> Self {
        let device = Arc::new(device);
        let stop = Arc::new(AtomicBool::new(false));

        let pending = PollLoop {
            device: device.clone(),
            session,
            supervisor,
            assembler: ResultAssembler::new(RegisterReader::new(settings.read_timeout)),
            interval: settings.interval,
            stop: stop.clone(),
        };

        Self {
            device,
            stop,
            pending: Some(pending),
            task: None,
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Spawn the loop. Calling it again has no effect.
    pub fn start(&mut self) {
        if let Some(poll_loop) = self.pending.take() {
            info!(
                device = %self.device.id,
                model = %self.device.model,
                interval = ?poll_loop.interval,
                "Starting poller"
            );
            self.task = Some(tokio::spawn(poll_loop.run()));
        }
    }

    /// Ask the loop to stop after its current cycle.
    pub fn remove(&self) {
        info!(device = %self.device.id, "Stopping poller");
        self.stop.store(true, Ordering::Release);
    }

    /// Cancel the loop immediately, mid-cycle if need be.
    pub fn abort(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.pending = None;
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_some_and(|t| t.is_finished())
    }
}

struct PollLoop {
    device: Arc<Device>,
    session: SharedTransport,
    supervisor: Arc<ConnectionSupervisor>,
    assembler: ResultAssembler,
    interval: Duration,
    stop: Arc<AtomicBool>,
}

impl PollLoop {
    async fn run(self) {
        loop {
            match AssertUnwindSafe(self.cycle()).catch_unwind().await {
                Ok(Ok(PublishOutcome::Sent)) => {
                    debug!(device = %self.device.id, "Published");
                }
                Ok(Ok(PublishOutcome::Dropped)) => {}
                Ok(Err(e)) => {
                    error!(device = %self.device.id, error = %e, "Poll cycle failed");
                }
                Err(panic) => {
                    error!(
                        device = %self.device.id,
                        panic = %panic_message(panic.as_ref()),
                        "Poll cycle panicked"
                    );
                }
            }

            if self.stop.load(Ordering::Acquire) {
                break;
            }
            tokio::time::sleep(self.interval).await;
        }

        info!(device = %self.device.id, "Poller stopped");
    }

    async fn cycle(&self) -> Result<PublishOutcome, CycleError> {
        // The session stays locked from addressing to the last read.
        let document = {
            let mut session = self.session.lock().await;
            self.assembler
                .assemble(&mut **session, &self.device)
                .await?
        };

        let payload = document.to_json()?;
        Ok(self
            .supervisor
            .publish(&self.device.id, payload, PublishOptions::default())
            .await?)
    }
}
