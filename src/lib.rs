pub mod browser;
pub mod config;
pub mod coordinator;
pub mod extractor;
pub mod models;
pub mod results_view;
pub mod runner;
pub mod storage;
pub mod stores;
pub mod utils;
pub mod web;

// Re-export commonly used types
pub use config::AppConfig;
pub use coordinator::CoordinatorHandle;
pub use models::{Product, SearchRequest, SearchSettings, SessionId, StoreId, StoreResult};
pub use storage::SharedState;
pub use stores::StoreRegistry;
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
