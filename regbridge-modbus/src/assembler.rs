//! Builds one device document per poll cycle.

use regbridge_common::Document;
use tracing::{debug, warn};

use crate::device::Device;
use crate::error::CycleError;
use crate::reader::RegisterReader;
use crate::transport::RegisterTransport;

/// Reads every field of a device into a [`Document`].
#[derive(Debug, Clone)]
pub struct ResultAssembler {
    reader: RegisterReader,
}

impl ResultAssembler {
    pub fn new(reader: RegisterReader) -> Self {
        Self { reader }
    }

    /// Address the device, then read its fields one by one in declared order.
    ///
    /// Failed fields are left out; only an addressing failure fails the
    /// cycle.
    pub async fn assemble(
        &self,
        transport: &mut dyn RegisterTransport,
        device: &Device,
    ) -> Result<Document, CycleError> {
        transport
            .set_unit(device.unit_id)
            .await
            .map_err(|source| CycleError::Addressing {
                unit_id: device.unit_id,
                source,
            })?;

        let mut document = Document::new();
        for (key, spec) in device.descriptor.fields() {
            let Some(value) = self.reader.read_field(transport, key, spec).await else {
                continue;
            };
            if let Err(e) = document.set(key, value) {
                warn!(device = %device.id, field = %key, error = %e, "Cannot place field");
            }
        }

        debug!(
            device = %device.id,
            fields = device.descriptor.len(),
            "Poll cycle assembled"
        );
        Ok(document)
    }
}
