pub mod traits;
pub mod transports;

pub use traits::{Ack, ChannelTransport};
