pub mod report;
pub mod status_engine;
pub mod task_service;

pub use report::{daily_digest, DailyDigest};
pub use task_service::TaskService;
