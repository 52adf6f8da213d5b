use actix_web::{get, web, HttpResponse, Responder};

use crate::api::job::JobService;

/// Languages a job may be submitted in
#[get("/languages")]
async fn list_languages(service: web::Data<JobService>) -> impl Responder {
    HttpResponse::Ok().json(service.languages())
}

pub fn languages_config(config: &mut web::ServiceConfig) {
    config.service(list_languages);
}
