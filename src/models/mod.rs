pub mod channel_config;
pub mod counters;
pub mod destination;
pub mod dispatch;
pub mod message;

pub use channel_config::*;
pub use counters::*;
pub use destination::*;
pub use dispatch::*;
pub use message::*;
