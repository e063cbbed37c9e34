//! Transport layer - socket listening, handshake, per-client I/O tasks

mod connection;
mod listener;

pub use connection::{client_writer_task, parse_client_event, read_message, write_message};
pub use listener::ServerListener;
