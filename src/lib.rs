mod buffer;
pub mod client;
pub mod constant;
pub mod error;
pub mod msgpack;
mod opts;
pub mod protocol;

pub use buffer::Buffer;
pub use client::{Connection, Connector, MioNet, NetProvider, PollNet, Rid};
pub use error::{Error, Result};
pub use opts::{Opts, Transport};
pub use protocol::response::Response;

#[cfg(test)]
mod buffer_test;
#[cfg(test)]
mod opts_test;
