// Outputs

pub mod http;
pub mod logger;
pub mod null;

pub use http::HttpOutput;
pub use logger::LoggerOutput;
pub use null::NullOutput;
