//! REST endpoints

use std::sync::Arc;

use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use autopilot_core::agent::Agent;
use autopilot_core::tools::{MailTools, UnreadListing};
use autopilot_core::Error;

/// Shared handler state
pub struct AppState {
    pub tools: Arc<MailTools>,
    pub agent: Arc<Agent>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(root))
        .service(
            web::scope("/emails")
                .route("/unread", web::get().to(list_unread))
                .route("/agent", web::post().to(call_agent))
                .route("/{email_id}/summary", web::get().to(email_summary)),
        );
}

#[derive(Debug, Deserialize)]
pub struct UnreadParams {
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct PromptRequest {
    message: String,
}

#[derive(Debug, Serialize)]
struct PromptResponse {
    response: String,
}

fn detail(response: &mut actix_web::HttpResponseBuilder, message: &str) -> HttpResponse {
    response.json(serde_json::json!({ "detail": message }))
}

fn not_found(message: &str) -> HttpResponse {
    detail(&mut HttpResponse::NotFound(), message)
}

/// Provider "not found" maps to the endpoint's 404; anything else is a 500
fn error_response(e: &Error, not_found_detail: &str) -> HttpResponse {
    if e.is_not_found() {
        return not_found(not_found_detail);
    }
    error!("Request failed [{}]: {}", e.error_code(), e);
    detail(&mut HttpResponse::InternalServerError(), &e.to_string())
}

async fn root() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "message": "Welcome to AutoPilot OS!" }))
}

async fn list_unread(
    state: web::Data<AppState>,
    query: web::Query<UnreadParams>,
) -> impl Responder {
    const NOT_FOUND: &str = "Could not fetch emails.";
    let limit = query.limit.unwrap_or_else(|| state.tools.default_limit());
    info!("GET unread emails (limit {})", limit);

    match state.tools.list_unread(limit).await {
        Ok(UnreadListing::Messages(ids)) if ids.is_empty() => not_found(NOT_FOUND),
        Ok(listing) => HttpResponse::Ok().json(listing),
        Err(e) => error_response(&e, NOT_FOUND),
    }
}

async fn email_summary(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    const NOT_FOUND: &str = "Could not create summary.";
    let email_id = path.into_inner();
    info!("GET summary for {}", email_id);

    match state.tools.summarize(&email_id).await {
        Ok(summary) if summary.is_empty() => not_found(NOT_FOUND),
        Ok(summary) => HttpResponse::Ok().json(summary),
        Err(e) => error_response(&e, NOT_FOUND),
    }
}

async fn call_agent(
    state: web::Data<AppState>,
    body: web::Json<PromptRequest>,
) -> impl Responder {
    const NOT_FOUND: &str = "Could not find answer.";
    info!("POST agent prompt");

    match state.agent.prompt(&body.message).await {
        Ok(answer) if answer.is_empty() => not_found(NOT_FOUND),
        Ok(answer) => HttpResponse::Ok().json(PromptResponse { response: answer }),
        Err(e) => error_response(&e, NOT_FOUND),
    }
}
