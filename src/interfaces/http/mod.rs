use crate::application::use_cases::export::export_test_cases_csv;
use crate::application::use_cases::locator_extraction::extract_locators;
use crate::application::use_cases::pipeline::RunControl;
use crate::domain::cache_key::recording_id_for;
use crate::domain::error::AppError;
use crate::domain::llm_config::LLMConfig;
use crate::domain::locator::LocatorTable;
use crate::domain::pipeline::{CodeRequest, PipelineRequest};
use crate::domain::stage::StageName;
use crate::domain::ticket::{TicketDescriptor, TicketId};
use crate::infrastructure::bootstrap::AppState;
use crate::infrastructure::config::HttpConfig;
use actix_cors::Cors;
use actix_web::http::StatusCode;
use actix_web::{dev::Server, get, post, web, App, HttpResponse, HttpServer, Responder};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use validator::Validate;

const MAX_LOG_ENTRIES: usize = 100;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogEntry {
    pub time: String,
    pub level: String,
    pub source: String,
    pub message: String,
}

pub struct HttpState {
    pub app: Arc<AppState>,
    pub logs: Arc<Mutex<Vec<LogEntry>>>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RunPipelineBody {
    #[validate(length(min = 1, max = 64))]
    pub ticket_id: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 20000))]
    pub additional_info: Option<String>,
    #[serde(default)]
    pub code: Option<CodeRequest>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegenerateBody {
    #[validate(length(min = 1, max = 64))]
    pub ticket_id: String,
    #[validate(length(min = 1, max = 20000))]
    pub feedback: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterTicketBody {
    /// Taken from the first key in `description` when omitted.
    #[serde(default)]
    #[validate(length(min = 1, max = 64))]
    pub ticket_id: Option<String>,
    #[validate(length(min = 1, max = 100000))]
    pub description: String,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ExtractLocatorsBody {
    #[validate(length(min = 1, max = 1000000))]
    pub transcript: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractLocatorsResponse {
    pub recording_id: String,
    pub locators: LocatorTable,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<StageName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<String>,
}

fn status_for(err: &AppError) -> StatusCode {
    match err.root() {
        AppError::InputError(_) => StatusCode::BAD_REQUEST,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::ExternalCapability(_) => StatusCode::BAD_GATEWAY,
        AppError::SchemaViolation(_) | AppError::GenerationFailed(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &AppError) -> HttpResponse {
    let (stage, key) = match err {
        AppError::InStage { stage, key, .. } => (Some(*stage), Some(key.clone())),
        _ => (None, None),
    };
    HttpResponse::build(status_for(err)).json(ErrorBody {
        error: err.root().to_string(),
        stage,
        key,
    })
}

fn invalid_body(errors: validator::ValidationErrors) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorBody {
        error: format!("Invalid request: {}", errors),
        stage: None,
        key: None,
    })
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

#[post("/tickets")]
async fn register_ticket(
    data: web::Data<HttpState>,
    req: web::Json<RegisterTicketBody>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return invalid_body(errors);
    }
    let Some(local) = &data.app.local_tickets else {
        return error_response(&AppError::InputError(
            "Tickets come from Jira; local registration is disabled.".to_string(),
        ));
    };
    let body = req.into_inner();
    let ticket_id = match body.ticket_id.as_deref() {
        Some(ticket_id) => TicketId::parse(ticket_id),
        None => TicketId::find_in(&body.description).ok_or_else(|| {
            AppError::InputError("No ticket id given or found in the description.".to_string())
        }),
    };
    let ticket_id = match ticket_id {
        Ok(ticket_id) => ticket_id,
        Err(e) => return error_response(&e),
    };

    let mut ticket = TicketDescriptor::new(ticket_id.clone(), body.description);
    if let Some(summary) = body.summary.filter(|s| !s.trim().is_empty()) {
        ticket = ticket.with_metadata("summary", summary);
    }
    local.insert(ticket).await;
    add_log(
        &data.logs,
        "INFO",
        "Tickets",
        &format!("Registered ticket {}", ticket_id),
    );
    HttpResponse::Created().json(serde_json::json!({ "ticketId": ticket_id }))
}

#[post("/pipeline/run")]
async fn run_pipeline(
    data: web::Data<HttpState>,
    req: web::Json<RunPipelineBody>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return invalid_body(errors);
    }
    let body = req.into_inner();
    add_log(
        &data.logs,
        "INFO",
        "Pipeline",
        &format!(
            "Running pipeline for {} (code={})",
            body.ticket_id,
            body.code.is_some()
        ),
    );

    let request = PipelineRequest {
        ticket_id: body.ticket_id,
        additional_info: body.additional_info,
        code: body.code,
    };
    match data.app.pipeline.run_with(request, &RunControl::new()).await {
        Ok(result) => HttpResponse::Ok().json(result),
        Err(e) => {
            add_log(
                &data.logs,
                "ERROR",
                "Pipeline",
                &format!("Pipeline failed: {}", e),
            );
            error_response(&e)
        }
    }
}

#[post("/pipeline/regenerate")]
async fn regenerate_test_cases(
    data: web::Data<HttpState>,
    req: web::Json<RegenerateBody>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return invalid_body(errors);
    }
    add_log(
        &data.logs,
        "INFO",
        "Pipeline",
        &format!("Regenerating test cases for {}", req.ticket_id),
    );

    match data
        .app
        .pipeline
        .regenerate_test_cases(&req.ticket_id, &req.feedback)
        .await
    {
        Ok(result) => HttpResponse::Ok().json(result),
        Err(e) => {
            add_log(
                &data.logs,
                "ERROR",
                "Pipeline",
                &format!("Regeneration failed: {}", e),
            );
            error_response(&e)
        }
    }
}

#[post("/locators/extract")]
async fn locators_extract(req: web::Json<ExtractLocatorsBody>) -> impl Responder {
    if let Err(errors) = req.validate() {
        return invalid_body(errors);
    }
    HttpResponse::Ok().json(ExtractLocatorsResponse {
        recording_id: recording_id_for(&req.transcript),
        locators: extract_locators(&req.transcript),
    })
}

#[get("/test-cases/{ticket_id:.+}/export")]
async fn export_test_cases(
    data: web::Data<HttpState>,
    path: web::Path<String>,
) -> impl Responder {
    let ticket_id = path.into_inner();
    let set = match data.app.pipeline.cached_test_cases(&ticket_id).await {
        Ok(Some(set)) => set,
        Ok(None) => {
            return error_response(&AppError::NotFound(format!(
                "No test cases generated for {}",
                ticket_id
            )))
        }
        Err(e) => return error_response(&e),
    };

    match export_test_cases_csv(&set) {
        Ok(csv) => HttpResponse::Ok()
            .content_type("text/csv; charset=utf-8")
            .insert_header((
                "Content-Disposition",
                format!(
                    "attachment; filename=\"{}-test-cases.csv\"",
                    ticket_id.replace('/', "_")
                ),
            ))
            .body(csv),
        Err(e) => error_response(&e),
    }
}

#[post("/models")]
async fn list_models(
    data: web::Data<HttpState>,
    config: Option<web::Json<LLMConfig>>,
) -> impl Responder {
    let config = config
        .map(web::Json::into_inner)
        .unwrap_or_else(|| data.app.llm_config.clone());
    add_log(
        &data.logs,
        "INFO",
        "HttpApi",
        &format!(
            "Fetching models (provider={:?} base_url={})",
            config.provider, config.base_url
        ),
    );

    match data.app.llm_client.list_models(&config).await {
        Ok(models) => HttpResponse::Ok().json(models),
        Err(e) => {
            add_log(
                &data.logs,
                "ERROR",
                "HttpApi",
                &format!("Failed to list models: {}", e),
            );
            error_response(&e)
        }
    }
}

#[get("/logs")]
async fn get_logs(data: web::Data<HttpState>) -> impl Responder {
    let logs = data.logs.lock().unwrap_or_else(|e| e.into_inner());
    HttpResponse::Ok().json(&*logs)
}

/// Records a request log line and mirrors it to tracing.
pub fn add_log(logs: &Mutex<Vec<LogEntry>>, level: &str, source: &str, message: &str) {
    match level {
        "ERROR" => tracing::error!(source, "{}", message),
        "WARN" => tracing::warn!(source, "{}", message),
        _ => tracing::info!(source, "{}", message),
    }
    let entry = LogEntry {
        time: Local::now().format("%H:%M:%S").to_string(),
        level: level.to_string(),
        source: source.to_string(),
        message: message.to_string(),
    };
    let mut logs = logs.lock().unwrap_or_else(|e| e.into_inner());
    logs.push(entry);
    if logs.len() > MAX_LOG_ENTRIES {
        logs.remove(0);
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(health)
            .service(register_ticket)
            .service(run_pipeline)
            .service(regenerate_test_cases)
            .service(locators_extract)
            .service(export_test_cases)
            .service(list_models)
            .service(get_logs),
    );
}

pub fn start_server(app: Arc<AppState>, http: &HttpConfig) -> std::io::Result<Server> {
    let state = web::Data::new(HttpState {
        app,
        logs: Arc::new(Mutex::new(Vec::new())),
    });

    let server = HttpServer::new(move || {
        let cors = Cors::permissive(); // Local tool, any origin

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((http.host.as_str(), http.port))?
    .run();

    Ok(server)
}

#[cfg(test)]
mod tests;
