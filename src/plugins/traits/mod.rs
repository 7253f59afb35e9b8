pub mod transport;

pub use transport::{Ack, ChannelTransport};
