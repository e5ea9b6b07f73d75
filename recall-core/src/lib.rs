pub mod config;
pub mod errors;
pub mod models;
pub mod quota;
pub mod repo;
pub mod scheduler;
pub mod session;
pub mod stats;

pub use config::*;
pub use errors::*;
pub use models::*;
pub use quota::{DailyUsage, QuotaExceeded};
pub use repo::memory::MemoryRepo;
pub use repo::*;
pub use scheduler::{apply_review, ReviewOutcome};
pub use session::*;
pub use stats::*;
