use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header::CONTENT_TYPE},
};
use insta::assert_snapshot;
use serde_json::{Value, json};
use tower::ServiceExt;
use url::Url;

use sigrelay::application::binder::AssetBinder;
use sigrelay::application::pipeline::{PipelineSettings, SignaturePipeline};
use sigrelay::domain::layout::StorageLayout;
use sigrelay::infra::http::{HttpState, build_router};
use sigrelay::infra::storage::InMemoryObjectStore;

const BOUNDARY: &str = "sigrelay-test-boundary";
const DOCUMENT_KEY: &str = "adv@x.com/email_signature.html";

enum Part {
    Text(&'static str, String),
    File {
        name: String,
        filename: String,
        content_type: Option<&'static str>,
        bytes: Vec<u8>,
    },
}

fn text(name: &'static str, value: &str) -> Part {
    Part::Text(name, value.to_string())
}

fn image(slot: &str, filename: &str) -> Part {
    Part::File {
        name: format!("image_{slot}"),
        filename: filename.to_string(),
        content_type: Some("image/jpeg"),
        bytes: format!("payload:{filename}").into_bytes(),
    }
}

fn multipart_body(parts: Vec<Part>) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File {
                name,
                filename,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n"
                    )
                    .as_bytes(),
                );
                if let Some(content_type) = content_type {
                    body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
                }
                body.extend_from_slice(b"\r\n");
                body.extend_from_slice(&bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn app_with_limit(store: Arc<InMemoryObjectStore>, body_limit: usize) -> Router {
    let layout = StorageLayout::new(
        "cdn",
        "onboarding",
        Url::parse("https://cdn.example.com").expect("valid url"),
    )
    .expect("valid layout");
    let pipeline = SignaturePipeline::new(
        store,
        AssetBinder::new(layout),
        PipelineSettings::default(),
    );
    build_router(HttpState::new(pipeline), body_limit)
}

fn app(store: Arc<InMemoryObjectStore>) -> Router {
    app_with_limit(store, 1024 * 1024)
}

fn required_fields(html: &str) -> Vec<Part> {
    vec![
        text("html", html),
        text("advisorEmail", "adv@x.com"),
        text("userId", "u1"),
    ]
}

async fn submit(app: Router, parts: Vec<Part>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/process-signature")
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .expect("request should build");

    let response = app.oneshot(request).await.expect("router should respond");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, value)
}

fn stored_document(store: &InMemoryObjectStore) -> String {
    let object = store
        .object("onboarding", DOCUMENT_KEY)
        .expect("document stored");
    String::from_utf8(object.body.to_vec()).expect("utf-8 document")
}

#[tokio::test]
async fn processes_signature_and_reports_paths() {
    let store = Arc::new(InMemoryObjectStore::new());
    let mut parts = required_fields("<p><img><img></p>");
    parts.push(image("0", "a.png"));
    parts.push(image("1", "b.jpg"));

    let (status, body) = submit(app(store.clone()), parts).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "success": true,
            "message": "Signature processed and uploaded successfully",
            "details": {
                "imagesUploaded": 2,
                "cdnPaths": ["cdn/u1/a.png", "cdn/u1/b.jpg"],
                "signaturePath": "onboarding/adv@x.com/email_signature.html",
            }
        })
    );

    assert_snapshot!(
        stored_document(&store),
        @r#"<p><img src="https://cdn.example.com/u1/a.png"><img src="https://cdn.example.com/u1/b.jpg"></p>"#
    );

    let document = store
        .object("onboarding", DOCUMENT_KEY)
        .expect("document stored");
    assert_eq!(document.content_type, "text/html");
    let asset = store.object("cdn", "u1/b.jpg").expect("asset stored");
    assert_eq!(asset.content_type, "image/jpeg");
    assert_eq!(asset.body.as_ref(), b"payload:b.jpg");
}

#[tokio::test]
async fn binds_by_slot_index_not_field_order() {
    let store = Arc::new(InMemoryObjectStore::new());
    let mut parts = vec![image("1", "second.png"), image("0", "first.png")];
    parts.extend(required_fields("<img id=x><img id=y>"));

    let (status, body) = submit(app(store.clone()), parts).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["details"]["cdnPaths"],
        json!(["cdn/u1/first.png", "cdn/u1/second.png"])
    );
    let document = stored_document(&store);
    let first = document.find("first.png").expect("first url present");
    let second = document.find("second.png").expect("second url present");
    assert!(first < second);
    assert!(document.find("id=x").expect("x kept") < first);
}

#[tokio::test]
async fn missing_fields_are_rejected_without_storage_calls() {
    let store = Arc::new(InMemoryObjectStore::new());
    let parts = vec![
        text("html", "<img>"),
        text("advisorEmail", "adv@x.com"),
        image("0", "a.png"),
    ];

    let (status, body) = submit(app(store.clone()), parts).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Missing required fields: userId" }));
    assert!(store.attempts().is_empty());
}

#[tokio::test]
async fn empty_html_is_a_validation_error() {
    let store = Arc::new(InMemoryObjectStore::new());
    let (status, body) = submit(app(store.clone()), required_fields("")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Missing required fields: html" }));
}

#[tokio::test]
async fn failed_image_upload_never_writes_the_document() {
    let store = Arc::new(InMemoryObjectStore::new());
    store.fail_on("cdn", "u1/b.jpg");
    let mut parts = required_fields("<img><img><img>");
    parts.push(image("0", "a.png"));
    parts.push(image("1", "b.jpg"));
    parts.push(image("2", "c.gif"));

    let (status, body) = submit(app(store.clone()), parts).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({ "error": "failed to upload images for slots 1" })
    );
    assert_eq!(store.attempts().len(), 3);
    assert!(store.object("onboarding", DOCUMENT_KEY).is_none());
}

#[tokio::test]
async fn failed_document_upload_is_a_server_error() {
    let store = Arc::new(InMemoryObjectStore::new());
    store.fail_on("onboarding", DOCUMENT_KEY);
    let mut parts = required_fields("<img>");
    parts.push(image("0", "a.png"));

    let (status, body) = submit(app(store.clone()), parts).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let message = body["error"].as_str().expect("error message");
    assert!(message.contains("onboarding/adv@x.com/email_signature.html"));
    assert!(store.object("cdn", "u1/a.png").is_some());
}

#[tokio::test]
async fn surplus_images_are_all_uploaded() {
    let store = Arc::new(InMemoryObjectStore::new());
    let mut parts = required_fields("<div><img></div>");
    parts.push(image("0", "a.png"));
    parts.push(image("1", "b.png"));
    parts.push(image("2", "c.png"));

    let (status, body) = submit(app(store.clone()), parts).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["details"]["imagesUploaded"], json!(3));
    assert!(store.object("cdn", "u1/c.png").is_some());
    let document = stored_document(&store);
    assert_eq!(document.matches("https://cdn.example.com/").count(), 1);
}

#[tokio::test]
async fn surplus_tags_keep_their_sources() {
    let store = Arc::new(InMemoryObjectStore::new());
    let mut parts = required_fields("<img src=\"one.png\"><img src=\"two.png\"><img>");
    parts.push(image("0", "new.png"));

    let (status, _) = submit(app(store.clone()), parts).await;

    assert_eq!(status, StatusCode::OK);
    let document = stored_document(&store);
    assert!(document.contains("https://cdn.example.com/u1/new.png"));
    assert!(!document.contains("one.png\""));
    assert!(document.ends_with("<img src=\"two.png\"><img>"));
}

#[tokio::test]
async fn filenames_are_raw_in_keys_and_encoded_in_urls() {
    let store = Arc::new(InMemoryObjectStore::new());
    let mut parts = required_fields("<img>");
    parts.push(image("0", "my logo.png"));

    let (status, body) = submit(app(store.clone()), parts).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["details"]["cdnPaths"], json!(["cdn/u1/my logo.png"]));
    assert!(store.object("cdn", "u1/my logo.png").is_some());
    assert!(stored_document(&store).contains("https://cdn.example.com/u1/my%20logo.png"));
}

#[tokio::test]
async fn reserved_filename_characters_are_escaped_in_urls() {
    let store = Arc::new(InMemoryObjectStore::new());
    let mut parts = required_fields("<img>");
    parts.push(image("0", "logo+dark=1.png"));

    let (status, body) = submit(app(store.clone()), parts).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["details"]["cdnPaths"], json!(["cdn/u1/logo+dark=1.png"]));
    assert!(store.object("cdn", "u1/logo+dark=1.png").is_some());
    assert_snapshot!(
        stored_document(&store),
        @r#"<img src="https://cdn.example.com/u1/logo%2Bdark%3D1.png">"#
    );
}

#[tokio::test]
async fn images_sharing_a_filename_are_rejected() {
    let store = Arc::new(InMemoryObjectStore::new());
    let mut parts = required_fields("<img><img>");
    parts.push(image("0", "logo.png"));
    parts.push(image("1", "logo.png"));

    let (status, body) = submit(app(store.clone()), parts).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({ "error": "image slots 0 and 1 share filename `logo.png`" })
    );
    assert!(store.attempts().is_empty());
}

#[tokio::test]
async fn undeclared_content_type_defaults_to_png() {
    let store = Arc::new(InMemoryObjectStore::new());
    let mut parts = required_fields("<img>");
    parts.push(Part::File {
        name: "image_0".to_string(),
        filename: "logo".to_string(),
        content_type: None,
        bytes: b"raw".to_vec(),
    });

    let (status, _) = submit(app(store.clone()), parts).await;

    assert_eq!(status, StatusCode::OK);
    let asset = store.object("cdn", "u1/logo").expect("asset stored");
    assert_eq!(asset.content_type, "image/png");
}

#[tokio::test]
async fn resubmission_overwrites_the_same_key() {
    let store = Arc::new(InMemoryObjectStore::new());
    let app = app(store.clone());

    for html in ["<p>first<img></p>", "<p>second<img></p>"] {
        let mut parts = required_fields(html);
        parts.push(image("0", "a.png"));
        let (status, _) = submit(app.clone(), parts).await;
        assert_eq!(status, StatusCode::OK);
    }

    assert!(stored_document(&store).starts_with("<p>second"));
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn gapped_slots_are_rejected() {
    let store = Arc::new(InMemoryObjectStore::new());
    let mut parts = required_fields("<img><img>");
    parts.push(image("0", "a.png"));
    parts.push(image("2", "c.png"));

    let (status, body) = submit(app(store.clone()), parts).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        body["error"]
            .as_str()
            .expect("error message")
            .contains("slot 1 is missing")
    );
    assert!(store.attempts().is_empty());
}

#[tokio::test]
async fn malformed_image_field_names_are_rejected() {
    let store = Arc::new(InMemoryObjectStore::new());
    let mut parts = required_fields("<img>");
    parts.push(image("first", "a.png"));

    let (status, body) = submit(app(store.clone()), parts).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid image field `image_first`" }));
}

#[tokio::test]
async fn unknown_fields_and_fileless_images_are_ignored() {
    let store = Arc::new(InMemoryObjectStore::new());
    let mut parts = required_fields("<img>");
    parts.push(text("note", "hello"));
    parts.push(text("image_0", "not a file"));

    let (status, body) = submit(app(store.clone()), parts).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["details"]["imagesUploaded"], json!(0));
    assert_eq!(stored_document(&store), "<img>");
}

#[tokio::test]
async fn oversized_submissions_are_refused() {
    let store = Arc::new(InMemoryObjectStore::new());
    let mut parts = required_fields("<img>");
    parts.push(Part::File {
        name: "image_0".to_string(),
        filename: "big.png".to_string(),
        content_type: Some("image/png"),
        bytes: vec![0u8; 4096],
    });

    let (status, _) = submit(app_with_limit(store.clone(), 512), parts).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(store.attempts().is_empty());
}

#[tokio::test]
async fn health_reports_no_content() {
    let store = Arc::new(InMemoryObjectStore::new());
    let request = Request::builder()
        .method(Method::GET)
        .uri("/health")
        .body(Body::empty())
        .expect("request should build");

    let response = app(store)
        .oneshot(request)
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
