// Plugin catalogue: configuration name -> plugin factory

use std::sync::Arc;

use duct_core::domain::ComponentConfig;
use duct_core::port::{OutputPlugin, SourcePlugin};

use crate::error::PluginError;
use crate::outputs::{HttpOutput, LoggerOutput, NullOutput};
use crate::sources::{CommandSource, LoadSource};

/// Build the source plugin named by the `source` key
pub fn build_source(config: &ComponentConfig) -> Result<Arc<dyn SourcePlugin>, PluginError> {
    let name = config.require_str("source")?;
    match name.as_str() {
        "command" => Ok(Arc::new(CommandSource::from_config(config)?)),
        "load" => Ok(Arc::new(LoadSource::new())),
        _ => Err(PluginError::UnknownSource(name)),
    }
}

/// Build the output plugin named by the `output` key
pub fn build_output(config: &ComponentConfig) -> Result<Arc<dyn OutputPlugin>, PluginError> {
    let name = config.require_str("output")?;
    match name.as_str() {
        "logger" => Ok(Arc::new(LoggerOutput::from_config(config)?)),
        "null" => Ok(Arc::new(NullOutput)),
        "http" => Ok(Arc::new(HttpOutput::from_config(config)?)),
        _ => Err(PluginError::UnknownOutput(name)),
    }
}
