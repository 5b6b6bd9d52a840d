//! Report transport management

mod manager;
mod retry;

pub use manager::{run_basic_info_refresher, upload_basic_info, ConnectionManager};
pub use retry::RetryBudget;
