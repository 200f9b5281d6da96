mod conn;
mod connector;
mod provider;
mod stream;

pub use conn::{Connection, Index, Rid, Space};
pub use connector::Connector;
pub use provider::{MioNet, NetProvider, PollNet};
pub use stream::Stream;
