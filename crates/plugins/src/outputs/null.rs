// Null output: accepts and discards every batch

use async_trait::async_trait;

use duct_core::domain::Event;
use duct_core::port::{DeliveryError, OutputPlugin};

pub struct NullOutput;

#[async_trait]
impl OutputPlugin for NullOutput {
    fn name(&self) -> &str {
        "null"
    }

    async fn send(&self, _events: &[Event]) -> Result<(), DeliveryError> {
        Ok(())
    }
}
