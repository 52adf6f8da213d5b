pub mod connection;
pub mod job_repository;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod store;

pub use job_repository::PgJobStore;
pub use memory::MemoryJobStore;
pub use store::{JobFilter, JobStore, StoreError};
