use actix_multipart::form::MultipartForm;
use actix_web::{
    delete, get, post,
    web::{scope, Data, Path, ServiceConfig},
    HttpResponse,
};
use actix_web_validator::Query;

use super::models::{GenerateForm, ListJobsQuery};
use super::service::{JobService, ServiceError};

#[post("/generate")]
async fn generate(
    service: Data<JobService>,
    MultipartForm(form): MultipartForm<GenerateForm>,
) -> Result<HttpResponse, ServiceError> {
    let accepted = service.submit(form).await?;
    Ok(HttpResponse::Created().json(accepted))
}

#[get("/status/{id}")]
async fn job_status(
    service: Data<JobService>,
    id: Path<i64>,
) -> Result<HttpResponse, ServiceError> {
    let status = service.status(id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(status))
}

#[get("")]
async fn list_jobs(
    service: Data<JobService>,
    query: Query<ListJobsQuery>,
) -> Result<HttpResponse, ServiceError> {
    let jobs = service.list(&query).await?;
    Ok(HttpResponse::Ok().json(jobs))
}

#[delete("/{id}")]
async fn delete_job(
    service: Data<JobService>,
    id: Path<i64>,
) -> Result<HttpResponse, ServiceError> {
    let deleted = service.delete(id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(deleted))
}

#[get("/stats")]
async fn job_stats(service: Data<JobService>) -> Result<HttpResponse, ServiceError> {
    let stats = service.stats().await?;
    Ok(HttpResponse::Ok().json(stats))
}

pub fn job_config(config: &mut ServiceConfig) {
    config
        .service(generate)
        .service(job_status)
        .service(job_stats)
        .service(scope("/jobs").service(list_jobs).service(delete_job));
}
