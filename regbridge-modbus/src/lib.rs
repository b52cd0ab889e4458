//! Modbus bridge for regbridge.
//!
//! This bridge polls Modbus devices (TCP or RTU/serial) and publishes one
//! JSON document per device and poll cycle to the message bus.
//!
//! # Topics
//!
//! ```text
//! <base>/<device>            device document, e.g. {"power":{"voltage":230.1}}
//! <base>/bridge/state        "online" / "offline" (retained)
//! <base>/bridge/info         bridge info (retained)
//! <base>/bridge/request      commands (add_device, remove_device, list_devices)
//! <base>/bridge/response     command results
//! ```
//!
//! The document's keys are the field keys of the device's model; dotted keys
//! nest. A field whose read or decode failed is left out.

pub mod assembler;
pub mod bridge;
pub mod commands;
pub mod config;
pub mod decode;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod poller;
pub mod reader;
pub mod registry;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use bridge::{Bridge, serve_commands};
pub use config::ModbusBridgeConfig;
pub use descriptor::{DecodeFn, FieldSpec, FunctionCode, RegisterDescriptor};
pub use device::Device;
pub use error::{CycleError, FieldError, ModbusError, TransportError};
pub use poller::{DevicePoller, PollSettings};
pub use registry::{DescriptorRegistry, StaticRegistry};
pub use transport::{ModbusTransport, RegisterRead, RegisterTransport, SessionPool};
