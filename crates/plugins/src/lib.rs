// Duct Plugins - leaf sources and outputs
// Each plugin is a thin adapter behind the SourcePlugin / OutputPlugin ports

pub mod catalogue;
pub mod error;
pub mod outputs;
pub mod sources;

pub use catalogue::{build_output, build_source};
pub use error::PluginError;
