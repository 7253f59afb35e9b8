pub mod browser;
pub mod config;
pub mod dom;
pub mod extractor;
pub mod models;
pub mod notifier;
pub mod plugins;
pub mod poller;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use extractor::{Extractor, ValueCondition, ValueSource};
pub use models::{Candidate, Record};
pub use notifier::{DeliveryReport, DispatchBatch, Notifier};
pub use poller::{CycleReport, PollStats, Poller};
pub use store::DedupStore;
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
