// Sources

pub mod command;
pub mod load;

pub use command::CommandSource;
pub use load::LoadSource;
