//! HTTP API tests against an in-memory transport
use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, Request, StatusCode},
    Router,
};
use axum_test::{
    multipart::{MultipartForm, Part},
    TestServer,
};
use tower::ServiceExt;
use warehouse_ingest::{
    ingester::Ingester,
    metrics::IngestMetrics,
    model::{DeadLetterEvent, IngestSummary},
    publisher::{memory::MemoryTransport, BatchPublisher, OutboundMessage},
    server::{self, AppState, ErrorResponse},
    settings::TopicRoute,
};

const INVENTORY: &[u8] = br#"{"inventory":[{"art_id":"1","name":"leg","stock":"12"},{"art_id":"2","name":"screw","stock":"17"}]}"#;
const PRODUCTS: &[u8] = br#"{"products":[{"name":"Dining Chair","contain_articles":[{"art_id":"1","amount_of":"4"},{"art_id":"2","amount_of":"8"}]},{"name":"Dinning Table","contain_articles":[{"art_id":"1","amount_of":"4"}]}]}"#;

fn app(transport: Arc<MemoryTransport>, max_body_bytes: usize) -> Router {
    let metrics = Arc::new(IngestMetrics::new().unwrap());
    let ingester = Ingester::new(
        BatchPublisher::new(transport, metrics.clone()),
        TopicRoute {
            topic: "inventory".into(),
            error_topic: "inventory-error".into(),
        },
        TopicRoute {
            topic: "product".into(),
            error_topic: "product-error".into(),
        },
        metrics,
    );
    server::router(
        AppState {
            ingester: Arc::new(ingester),
        },
        max_body_bytes,
    )
}

fn test_server(transport: Arc<MemoryTransport>) -> TestServer {
    TestServer::new(app(transport, 1024 * 1024)).unwrap()
}

fn file(name: &str, bytes: &[u8]) -> MultipartForm {
    MultipartForm::new().add_part(
        name,
        Part::bytes(bytes.to_vec())
            .file_name(format!("{name}.json"))
            .mime_type("application/json"),
    )
}

/// Responses are sent before the batch finishes, so wait for the sends to land.
async fn sent_to(transport: &MemoryTransport, topic: &str, expected: usize) -> Vec<OutboundMessage> {
    for _ in 0..200 {
        let sent = transport.sent_to(topic);
        if sent.len() >= expected {
            return sent;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    transport.sent_to(topic)
}

#[tokio::test]
async fn inventory_upload_publishes_every_article() {
    let transport = Arc::new(MemoryTransport::new());
    let server = test_server(transport.clone());

    let response = server
        .post("/inventory/upload")
        .add_header(
            HeaderName::from_static("x-trace-id"),
            HeaderValue::from_static("trace-42"),
        )
        .multipart(file("file", INVENTORY))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(
        response.text(),
        "Inventory uploaded successfully. 2 articles processed. TraceId: trace-42"
    );
    assert_eq!(
        response.headers().get("x-trace-id").unwrap().to_str().unwrap(),
        "trace-42"
    );

    let sent = sent_to(&transport, "inventory", 2).await;
    let mut keys: Vec<&str> = sent.iter().map(|m| m.key.as_str()).collect();
    keys.sort();
    assert_eq!(keys, vec!["1", "2"]);
    assert!(sent.iter().all(|m| m.header("X-Trace-Id") == Some("trace-42")));
}

#[tokio::test]
async fn products_upload_is_keyed_by_name() {
    let transport = Arc::new(MemoryTransport::new());
    let server = test_server(transport.clone());

    let response = server
        .post("/products/upload")
        .multipart(file("file", PRODUCTS))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response
        .text()
        .starts_with("Products uploaded successfully. 2 products processed. TraceId: "));

    let sent = sent_to(&transport, "product", 2).await;
    let mut keys: Vec<&str> = sent.iter().map(|m| m.key.as_str()).collect();
    keys.sort();
    assert_eq!(keys, vec!["Dining Chair", "Dinning Table"]);
}

#[tokio::test]
async fn json_endpoints_accept_documents() {
    let transport = Arc::new(MemoryTransport::new());
    let server = test_server(transport.clone());

    let inventory: serde_json::Value = serde_json::from_slice(INVENTORY).unwrap();
    let response = server.post("/inventory/data").json(&inventory).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response
        .text()
        .starts_with("Inventory data processed successfully. 2 articles received. TraceId: "));

    let products: serde_json::Value = serde_json::from_slice(PRODUCTS).unwrap();
    let response = server.post("/api/v1/products/data").json(&products).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response
        .text()
        .starts_with("Products data processed successfully. 2 products received. TraceId: "));

    assert_eq!(sent_to(&transport, "inventory", 2).await.len(), 2);
    assert_eq!(sent_to(&transport, "product", 2).await.len(), 2);
}

#[tokio::test]
async fn empty_file_is_rejected() {
    let transport = Arc::new(MemoryTransport::new());
    let server = test_server(transport.clone());

    let response = server
        .post("/inventory/upload")
        .multipart(file("file", b""))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = response.json();
    assert_eq!(body.error, "FILE_PROCESSING_ERROR");
    assert_eq!(body.message, "File is empty");
    assert_eq!(body.status, 400);
    assert_eq!(body.path, "/inventory/upload");
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test]
async fn missing_file_part_is_rejected() {
    let transport = Arc::new(MemoryTransport::new());
    let server = test_server(transport.clone());

    let response = server
        .post("/products/upload")
        .multipart(MultipartForm::new().add_text("comment", "no file here"))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test]
async fn malformed_json_publishes_nothing() {
    let transport = Arc::new(MemoryTransport::new());
    let server = test_server(transport.clone());

    let response = server
        .post("/inventory/upload")
        .multipart(file("file", b"{\"inventory\": [ {\"art_id\": "))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = response.json();
    assert_eq!(body.error, "JSON_PROCESSING_ERROR");

    let response = server
        .post("/products/data")
        .content_type("application/json")
        .bytes("[1, 2".into())
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test]
async fn missing_collection_is_invalid_data() {
    let transport = Arc::new(MemoryTransport::new());
    let server = test_server(transport.clone());

    let response = server
        .post("/inventory/data")
        .json(&serde_json::json!({}))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = response.json();
    assert_eq!(body.error, "INVALID_INPUT");
    assert_eq!(body.message, "Invalid inventory data provided");
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test]
async fn wrong_content_type_is_unsupported() {
    let transport = Arc::new(MemoryTransport::new());
    let server = test_server(transport.clone());

    let response = server.post("/inventory/upload").text("art_id,name").await;
    assert_eq!(response.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let body: ErrorResponse = response.json();
    assert_eq!(body.status, 415);

    let response = server.post("/inventory/data").text("{}").await;
    assert_eq!(response.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn form_data_without_boundary_is_bad_request() {
    let transport = Arc::new(MemoryTransport::new());
    let app = app(transport.clone(), 1024 * 1024);

    for uri in ["/inventory/upload", "/api/files/ingest"] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "multipart/form-data")
                    .body(Body::from("x"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
    }
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let transport = Arc::new(MemoryTransport::new());
    let server = TestServer::new(app(transport.clone(), 64)).unwrap();

    let response = server
        .post("/inventory/data")
        .content_type("application/json")
        .bytes(INVENTORY.to_vec().into())
        .await;

    assert_eq!(response.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: ErrorResponse = response.json();
    assert_eq!(body.error, "PAYLOAD_TOO_LARGE");
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test]
async fn failed_sends_are_dead_lettered_after_success_response() {
    let transport = Arc::new(MemoryTransport::new().fail_key("inventory", "2", "timeout"));
    let server = test_server(transport.clone());

    let response = server
        .post("/inventory/upload")
        .multipart(file("file", INVENTORY))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let dead = sent_to(&transport, "inventory-error", 1).await;
    assert_eq!(dead.len(), 1);
    let event: DeadLetterEvent = serde_json::from_slice(&dead[0].payload).unwrap();
    assert_eq!(event.key, "2");
    assert_eq!(event.original_topic, "inventory");
    assert_eq!(event.error_message, "timeout");
    assert_eq!(sent_to(&transport, "inventory", 1).await.len(), 1);
}

#[tokio::test]
async fn combined_ingest_reports_counts() {
    let transport = Arc::new(MemoryTransport::new());
    let server = test_server(transport.clone());

    let form = MultipartForm::new()
        .add_part(
            "inventory",
            Part::bytes(INVENTORY.to_vec()).file_name("inventory.json"),
        )
        .add_part(
            "products",
            Part::bytes(PRODUCTS.to_vec()).file_name("products.json"),
        );
    let response = server.post("/api/files/ingest").multipart(form).await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let summary: IngestSummary = response.json();
    assert_eq!(summary.inventory_count, 2);
    assert_eq!(summary.product_count, 2);
    assert_eq!(summary.status, "INGESTED");
    assert_eq!(sent_to(&transport, "inventory", 2).await.len(), 2);
    assert_eq!(sent_to(&transport, "product", 2).await.len(), 2);
}

#[tokio::test]
async fn combined_ingest_requires_a_file() {
    let transport = Arc::new(MemoryTransport::new());
    let server = test_server(transport);

    let response = server
        .post("/files/ingest")
        .multipart(MultipartForm::new().add_text("note", "nothing"))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = response.json();
    assert_eq!(
        body.message,
        "At least one file (inventory or products) must be provided"
    );
}

#[tokio::test]
async fn metrics_count_uploads() {
    let transport = Arc::new(MemoryTransport::new());
    let server = test_server(transport);

    server
        .post("/inventory/upload")
        .multipart(file("file", INVENTORY))
        .await;
    server
        .post("/inventory/upload")
        .multipart(file("file", b""))
        .await;

    let response = server.get("/metrics").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let text = response.text();
    assert!(text.contains("warehouse_uploads_total"));
    assert!(text.contains("warehouse_items_processed_total"));
    assert!(text.contains("empty_input"));
}

#[tokio::test]
async fn health_docs_and_root_redirect() {
    let app = app(Arc::new(MemoryTransport::new()), 1024);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.status().is_redirection());
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap().to_str().unwrap(),
        "/swagger-ui"
    );

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(doc["paths"].get("/inventory/upload").is_some());
    assert!(doc["paths"].get("/files/ingest").is_some());
}
