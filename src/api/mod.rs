pub mod health;
pub mod job;
pub mod languages;
pub mod validation;

use actix_web::web;

/// Every route the server exposes.
pub fn routes(config: &mut web::ServiceConfig) {
    config
        .configure(health::health_config)
        .configure(languages::languages_config)
        .configure(job::job_config);
}
