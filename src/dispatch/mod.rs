//! Quota-gated fan-out of one message to many recipients.

mod coordinator;

pub use coordinator::DispatchCoordinator;
