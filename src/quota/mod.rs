pub mod accountant;
pub mod counter_store;
pub mod retry;

pub use accountant::QuotaAccountant;
pub use counter_store::CounterStore;
pub use retry::ConflictRetryPolicy;
