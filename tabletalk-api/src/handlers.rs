use crate::models::{
    outcome_body, ConfirmRequest, ErrorResponse, PageRequestBody, QueryRequest, SchemaResponse,
};
use crate::rate_limit::RateLimiter;
use crate::DbConnection;
use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder};
use tabletalk_core::{Assistant, CoreError};
use tracing::{error, info};
use uuid::Uuid;

pub struct AppState {
    pub assistant: Assistant,
    pub db: DbConnection,
    pub rate_limiter: RateLimiter,
}

const SESSION_HEADER: &str = "x-session-id";

/// Session identity from the caller's header, issuing a fresh one when absent
fn session_id(req: &HttpRequest) -> String {
    req.headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Rate-limit identity: the peer address
fn caller_identity(req: &HttpRequest) -> String {
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn rate_limited() -> HttpResponse {
    HttpResponse::TooManyRequests().json(ErrorResponse {
        error: "Too many requests. Please wait a moment and try again.".to_string(),
    })
}

fn error_response(e: &CoreError) -> HttpResponse {
    match e {
        CoreError::InvalidRead { .. } | CoreError::InvalidOperation { .. } | CoreError::PlanParse => {
            HttpResponse::UnprocessableEntity().json(ErrorResponse {
                error: e.to_string(),
            })
        }
        CoreError::Planner { .. } => HttpResponse::BadGateway().json(ErrorResponse {
            error: format!("Processing failed: {}", e),
        }),
        CoreError::Execution { .. } | CoreError::SchemaLoad { .. } => {
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: e.to_string(),
            })
        }
    }
}

#[post("/api/query")]
pub async fn query(
    req: HttpRequest,
    body: web::Json<QueryRequest>,
    state: web::Data<AppState>,
) -> impl Responder {
    if !state.rate_limiter.check(&caller_identity(&req)) {
        return rate_limited();
    }

    let text = body.text.trim();
    if text.is_empty() {
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "Missing request text".to_string(),
        });
    }

    let session = session_id(&req);
    let page_req = state
        .assistant
        .page_request(body.page.unwrap_or(1), body.page_size.unwrap_or(0));

    match state
        .assistant
        .handle_text(&state.db, &session, text, page_req)
        .await
    {
        Ok(outcome) => HttpResponse::Ok()
            .insert_header((SESSION_HEADER, session))
            .json(outcome_body(outcome)),
        Err(e) => {
            error!(error = %e, "Query request failed");
            error_response(&e)
        }
    }
}

#[post("/api/confirm")]
pub async fn confirm(
    req: HttpRequest,
    body: web::Json<ConfirmRequest>,
    state: web::Data<AppState>,
) -> impl Responder {
    if !state.rate_limiter.check(&caller_identity(&req)) {
        return rate_limited();
    }

    info!("Write confirmation received");
    match state
        .assistant
        .handle_confirm(&state.db, &body.operation.to_string())
    {
        Ok(outcome) => HttpResponse::Ok().json(outcome_body(outcome)),
        Err(e) => {
            error!(error = %e, "Confirmed write failed");
            error_response(&e)
        }
    }
}

#[post("/api/page")]
pub async fn page(
    req: HttpRequest,
    body: web::Json<PageRequestBody>,
    state: web::Data<AppState>,
) -> impl Responder {
    if !state.rate_limiter.check(&caller_identity(&req)) {
        return rate_limited();
    }

    let session = session_id(&req);
    let page = state
        .assistant
        .page_request(body.page, body.page_size.unwrap_or(0));

    match state.assistant.handle_page(&state.db, &session, page) {
        Ok(outcome) => HttpResponse::Ok()
            .insert_header((SESSION_HEADER, session))
            .json(outcome_body(outcome)),
        Err(e) => {
            error!(error = %e, "Pagination request failed");
            error_response(&e)
        }
    }
}

#[get("/api/schema")]
pub async fn schema(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(SchemaResponse {
        schema_text: state.assistant.schema_text(&state.db),
    })
}
