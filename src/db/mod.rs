pub mod attachment_repo;
pub mod audit_repo;
pub mod comment_repo;
pub mod dependency_repo;
pub mod schema;
pub mod task_repo;
pub mod user_repo;

pub use schema::open_db;
