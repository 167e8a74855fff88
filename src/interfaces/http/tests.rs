use super::{configure, HttpState};
use crate::application::use_cases::pipeline::{Pipeline, PipelineSettings};
use crate::domain::cache_key::CacheKey;
use crate::domain::llm_config::LLMConfig;
use crate::domain::test_case::fixtures::sample_cases;
use crate::domain::test_case::TestCaseSet;
use crate::domain::ticket::TicketId;
use crate::infrastructure::artifact_store::{ArtifactCache, MemoryArtifactCache};
use crate::infrastructure::bootstrap::AppState;
use crate::infrastructure::config::load_stage_profiles;
use crate::infrastructure::llm_clients::{LLMClient, RouterClient};
use crate::infrastructure::ticket_source::InMemoryTicketSource;
use actix_web::{http::StatusCode, test, web, App};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

struct Fixture {
    state: web::Data<HttpState>,
    cache: Arc<MemoryArtifactCache>,
}

// The router is never reached: every request here is answered before generation.
fn fixture() -> Fixture {
    let tickets = Arc::new(InMemoryTicketSource::new());
    let cache = Arc::new(MemoryArtifactCache::new());
    let llm_client: Arc<dyn LLMClient> = Arc::new(RouterClient::new());
    let pipeline = Pipeline::new(
        tickets.clone(),
        cache.clone(),
        llm_client.clone(),
        LLMConfig::default(),
        load_stage_profiles(None).unwrap(),
        PipelineSettings::default(),
    );
    let app = AppState {
        pipeline: Arc::new(pipeline),
        llm_client,
        llm_config: LLMConfig::default(),
        local_tickets: Some(tickets),
    };
    Fixture {
        state: web::Data::new(HttpState {
            app: Arc::new(app),
            logs: Arc::new(Mutex::new(Vec::new())),
        }),
        cache,
    }
}

#[actix_web::test]
async fn test_health() {
    let fixture = fixture();
    let app = test::init_service(App::new().app_data(fixture.state).configure(configure)).await;

    let req = test::TestRequest::get().uri("/api/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "ok");
}

#[actix_web::test]
async fn test_extract_locators_endpoint() {
    let fixture = fixture();
    let app = test::init_service(App::new().app_data(fixture.state).configure(configure)).await;

    let transcript = "page.get_by_role(\"button\", name=\"Login\").click()\n\
                      page.get_by_test_id(\"submit-btn\").click()";
    let req = test::TestRequest::post()
        .uri("/api/locators/extract")
        .set_json(json!({ "transcript": transcript }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert!(body["recordingId"].as_str().unwrap().starts_with("rec-"));
    let identifiers: Vec<&str> = body["locators"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["identifier"].as_str().unwrap())
        .collect();
    assert_eq!(identifiers, vec!["login", "submit_btn"]);
}

#[actix_web::test]
async fn test_short_ticket_runs_to_invalid() {
    let fixture = fixture();
    let app = test::init_service(App::new().app_data(fixture.state).configure(configure)).await;

    let req = test::TestRequest::post()
        .uri("/api/tickets")
        .set_json(json!({ "ticketId": "PROJ-1", "description": "Add login button" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);

    let req = test::TestRequest::post()
        .uri("/api/pipeline/run")
        .set_json(json!({ "ticketId": "PROJ-1" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["state"], "invalid");
    assert_eq!(body["verdict"]["status"], "invalid");
    assert!(body["verdict"]["reason"]
        .as_str()
        .unwrap()
        .contains("insufficient detail"));
}

#[actix_web::test]
async fn test_ticket_id_found_in_description() {
    let fixture = fixture();
    let app = test::init_service(App::new().app_data(fixture.state).configure(configure)).await;

    let req = test::TestRequest::post()
        .uri("/api/tickets")
        .set_json(json!({ "description": "PROJ-5: As a shopper I want to save my cart." }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["ticketId"], "PROJ-5");

    let req = test::TestRequest::post()
        .uri("/api/tickets")
        .set_json(json!({ "description": "No key anywhere in this text." }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_unknown_ticket_maps_to_not_found() {
    let fixture = fixture();
    let app = test::init_service(App::new().app_data(fixture.state).configure(configure)).await;

    let req = test::TestRequest::post()
        .uri("/api/pipeline/run")
        .set_json(json!({ "ticketId": "PROJ-77" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["stage"], "ticket-fetch");
    assert_eq!(body["key"], "PROJ-77");
}

#[actix_web::test]
async fn test_empty_ticket_id_is_bad_request() {
    let fixture = fixture();
    let app = test::init_service(App::new().app_data(fixture.state).configure(configure)).await;

    let req = test::TestRequest::post()
        .uri("/api/pipeline/regenerate")
        .set_json(json!({ "ticketId": "", "feedback": "More negatives" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_export_cached_cases_as_csv() {
    let fixture = fixture();
    let set = TestCaseSet::new(sample_cases(6)).unwrap();
    fixture
        .cache
        .put(
            &CacheKey::test_cases(&TicketId::parse("AI/ML-16084").unwrap()),
            serde_json::to_value(&set).unwrap(),
        )
        .await
        .unwrap();
    let app = test::init_service(App::new().app_data(fixture.state).configure(configure)).await;

    let req = test::TestRequest::get()
        .uri("/api/test-cases/AI/ML-16084/export")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = test::read_body(resp).await;
    let csv = String::from_utf8(body.to_vec()).unwrap();
    assert!(csv.starts_with("Test Case ID,Title,Category,Step,Action,Expected Result"));
    assert_eq!(csv.lines().count(), 7);

    let req = test::TestRequest::get()
        .uri("/api/test-cases/PROJ-9/export")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}
