use super::completion::CompletionGateway;
use super::credentials::BasicCredentials;
use crate::error::StagerError;
use crate::registry::WorkerRegistry;
use actix_web::{http::header, web, HttpRequest, HttpResponse};
use serde_json::json;
use std::sync::Arc;

/// Shared state of the internal HTTP endpoints.
pub struct GatewayState {
    pub gateway: Arc<CompletionGateway>,
    pub registry: Arc<WorkerRegistry>,
}

/// `POST /internal/staging/completed`
pub async fn staging_completed(
    state: web::Data<GatewayState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, StagerError> {
    let credentials = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(BasicCredentials::from_header);

    state.gateway.receive(&body, credentials.as_ref()).await?;
    Ok(HttpResponse::Ok().json(json!({})))
}

/// `GET /internal/staging/health`
pub async fn health(state: web::Data<GatewayState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "running",
        "workers": state.registry.len(),
        "pending_staging": state.gateway.tasks().tracker().pending_count(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/internal/staging")
            .route("/completed", web::post().to(staging_completed))
            .route("/health", web::get().to(health)),
    );
}
