//! Reading and decoding a single field.

use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use serde_json::Value;
use tracing::{error, trace, warn};

use crate::descriptor::{FieldSpec, FunctionCode};
use crate::error::{FieldError, panic_message};
use crate::transport::{RegisterRead, RegisterTransport};

/// Reads one field from an already addressed session.
#[derive(Debug, Clone)]
pub struct RegisterReader {
    timeout: Duration,
}

impl RegisterReader {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Read and decode `spec`, logging any failure.
    ///
    /// `None` means the field is left out of the document.
    pub async fn read_field(
        &self,
        transport: &mut dyn RegisterTransport,
        key: &str,
        spec: &FieldSpec,
    ) -> Option<Value> {
        let result = match self.read(transport, spec).await {
            Ok(read) => interpret(spec, &read),
            Err(e) => Err(e),
        };

        match result {
            Ok(value) => {
                trace!(field = %key, value = %value, "Field read");
                Some(value)
            }
            Err(FieldError::UnknownFunctionCode(code)) => {
                error!(field = %key, fc = code, "Unknown function code");
                None
            }
            Err(e) => {
                warn!(
                    field = %key,
                    address = spec.address,
                    fc = spec.function_code,
                    error = %e,
                    "Failed to read field"
                );
                None
            }
        }
    }

    /// Issue the read for `spec`.
    pub async fn read(
        &self,
        transport: &mut dyn RegisterTransport,
        spec: &FieldSpec,
    ) -> Result<RegisterRead, FieldError> {
        let code = FunctionCode::try_from(spec.function_code)
            .map_err(FieldError::UnknownFunctionCode)?;

        let (address, length) = (spec.address, spec.length);
        let read = match code {
            FunctionCode::ReadCoils => transport.read_coils(address, length),
            FunctionCode::ReadDiscreteInputs => transport.read_discrete_inputs(address, length),
            FunctionCode::ReadHoldingRegisters => transport.read_holding_registers(address, length),
            FunctionCode::ReadInputRegisters => transport.read_input_registers(address, length),
        };

        let outcome = tokio::time::timeout(self.timeout, read).await;
        let read = match outcome {
            Ok(result) => result?,
            Err(_) => {
                transport.reset().await;
                return Err(FieldError::Timeout(self.timeout));
            }
        };

        if read.data.is_empty() {
            return Err(FieldError::Empty);
        }
        Ok(read)
    }
}

/// Turn a successful read into the published value.
///
/// The first register (or bit) is the interpreted value. Without a decode
/// function it is published as a number. A panicking decode function fails
/// only this field.
pub fn interpret(spec: &FieldSpec, read: &RegisterRead) -> Result<Value, FieldError> {
    let value = *read.data.first().ok_or(FieldError::Empty)?;

    let Some(decode) = &spec.decode else {
        return Ok(Value::from(value));
    };

    match panic::catch_unwind(AssertUnwindSafe(|| decode(value, &read.buffer))) {
        Ok(decoded) => Ok(decoded?),
        Err(panic) => Err(FieldError::DecodePanic(panic_message(panic.as_ref()))),
    }
}
