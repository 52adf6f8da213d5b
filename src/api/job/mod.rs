pub mod dto;
pub mod handlers;
pub mod models;
pub mod service;

// Re-export commonly used types
pub use handlers::job_config;
pub use models::{GenerateForm, ListJobsQuery, UploadLimits};
pub use service::{JobService, ServiceError};
