mod common;

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use leadflow_api::db::MemoryStore;
use leadflow_api::models::mapping::{EventType, RecipientRole};
use leadflow_api::{routes, AppState};

use common::{dispatcher, seed_template, seed_tenant, RelayLog, HOST};

async fn app() -> (Router, Arc<MemoryStore>, Arc<RelayLog>) {
    let store = Arc::new(MemoryStore::new());
    let log = Arc::new(RelayLog::default());
    let state = AppState {
        store: store.clone(),
        dispatcher: Arc::new(dispatcher(store.clone(), log.clone())),
    };
    (routes::app(state), store, log)
}

fn request(method: Method, uri: &str, host: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::HOST, host)
        .header(header::CONTENT_TYPE, "application/json");
    match body {
        Some(b) => builder.body(Body::from(b.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_store_status() {
    let (app, store, _) = app().await;
    let resp = app
        .clone()
        .oneshot(request(Method::GET, "/health", HOST, None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    store.set_offline(true);
    let resp = app.oneshot(request(Method::GET, "/health", HOST, None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn tenant_info_by_host_and_query_override() {
    let (app, store, _) = app().await;
    seed_tenant(&store).await;

    let resp = app
        .clone()
        .oneshot(request(Method::GET, "/tenant/info", "acme.example.com:443", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["tenant"]["display_name"], "Acme Heating");

    let resp = app
        .clone()
        .oneshot(request(Method::GET, "/tenant/info?domain=acme.example.com", "widget.cdn.example", None))
        .await
        .unwrap();
    assert_eq!(json_body(resp).await["tenant"]["slug"], "acme");

    let resp = app
        .clone()
        .oneshot(request(Method::GET, "/tenant/info", "localhost:5173", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["tenant"], Value::Null);

    let resp = app
        .oneshot(request(Method::GET, "/tenant/info", "nobody.example.com", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(resp).await["kind"], "tenant_not_found");
}

#[tokio::test]
async fn dispatch_endpoint_returns_aggregated_result() {
    let (app, store, log) = app().await;
    let tenant = seed_tenant(&store).await;
    seed_template(
        &store,
        tenant,
        EventType::QuoteSubmitted,
        RecipientRole::Customer,
        "Quote",
        "<p>Call {{phone}}</p>",
        "Call {{phone}}",
    )
    .await;

    let body = json!({
        "category": "Boiler",
        "submission": {
            "quote_data": {
                "contact_details": {
                    "first_name": "John",
                    "email": "john@example.com",
                    "phone": "07123456789"
                }
            }
        }
    });
    let resp = app
        .oneshot(request(Method::POST, "/notifications/quote_submitted", HOST, Some(body)))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let result = json_body(resp).await;
    assert_eq!(result["customerEmailSent"], true);
    assert_eq!(result["ghlIntegrationEligible"], true);
    assert_eq!(result["channels"]["externalCrm"]["enabled"], true);
    assert_eq!(log.delivered()[0].text, "Call +447123456789");
}

#[tokio::test]
async fn dispatch_endpoint_maps_fatal_errors() {
    let (app, store, _) = app().await;
    seed_tenant(&store).await;

    let resp = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/notifications/quote_submitted",
            "localhost",
            Some(json!({"category": "boiler", "submission": {}})),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp).await["kind"], "no_tenant");

    let resp = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/notifications/quote_submitted",
            HOST,
            Some(json!({"category": "boiler", "submission_id": uuid::Uuid::new_v4()})),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(resp).await["kind"], "submission_not_found");

    let resp = app
        .oneshot(request(
            Method::POST,
            "/notifications/quote_requested",
            HOST,
            Some(json!({"category": "boiler", "submission": {}})),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn mapping_endpoints_seed_then_edit() {
    let (app, store, _) = app().await;
    seed_tenant(&store).await;

    let resp = app
        .clone()
        .oneshot(request(Method::GET, "/mappings/boiler/callback_requested/admin", HOST, None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let rules = json_body(resp).await["rules"].as_array().unwrap().clone();
    assert!(rules.iter().any(|r| r["target_variable"] == "preferred_time"));

    let resp = app
        .clone()
        .oneshot(request(
            Method::PUT,
            "/mappings/boiler/callback_requested/admin",
            HOST,
            Some(json!({
                "target_variable": "preferred_time",
                "source_path": "enquiry_data.callback.slot",
                "formatter": {"kind": "raw"}
            })),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["rule"]["source_path"], "enquiry_data.callback.slot");

    let resp = app
        .clone()
        .oneshot(request(Method::GET, "/mappings/boiler/callback_requested/admin", HOST, None))
        .await
        .unwrap();
    let after = json_body(resp).await["rules"].as_array().unwrap().clone();
    assert_eq!(after.len(), rules.len());

    let resp = app
        .oneshot(request(
            Method::PUT,
            "/mappings/boiler/callback_requested/admin",
            HOST,
            Some(json!({"target_variable": "x", "source_path": "a..b"})),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn preview_renders_without_sending() {
    let (app, store, log) = app().await;
    seed_tenant(&store).await;

    let resp = app
        .oneshot(request(
            Method::POST,
            "/templates/preview",
            HOST,
            Some(json!({
                "category": "boiler",
                "event_type": "quote_submitted",
                "recipient_role": "admin",
                "template": {
                    "subject": "{{first_name}} at {{postcode}}",
                    "html": "<h1 style=\"font-family:{{font_family}}\">{{address}}</h1>",
                    "text": "{{#if phone}}{{phone}}{{else}}no phone{{/if}} {{unknown helper}}"
                },
                "submission": {
                    "quote_data": {
                        "contact_details": {"first_name": "Ann", "phone": "447700900123"},
                        "address": {"address_line_1": "1 High St", "postcode": "LS1 1AA"}
                    }
                }
            })),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let preview = json_body(resp).await;
    assert_eq!(preview["subject"], "Ann at LS1 1AA");
    assert_eq!(
        preview["html"],
        "<h1 style=\"font-family:Arial, sans-serif\">1 High St, LS1 1AA</h1>"
    );
    assert_eq!(preview["text"], "+447700900123 {{unknown helper}}");
    assert_eq!(preview["variables"]["first_name"], "Ann");
    assert!(log.attempts().is_empty());
    assert_eq!(log.verifications(), 0);
}
