pub mod report;
pub mod task;
pub mod user;

pub use report::{ReportCommand, ReportResult};
pub use task::{TaskCommand, TaskResult};
pub use user::{UserCommand, UserResult};
