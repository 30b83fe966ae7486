mod connection;
mod listener;

pub use connection::{ClientProtocol, Connection};
pub use listener::Listener;
