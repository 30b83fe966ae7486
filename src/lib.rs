pub mod autosend;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod server;

pub use autosend::{AutosendHandle, AutosendManager, Protocol, ProtocolRef};
pub use config::Config;
pub use error::{Error, Result};
pub use pool::{create_output_message, OutputMessage};
