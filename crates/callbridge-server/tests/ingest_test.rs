use axum::{
    extract::Extension,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use callbridge_agent::{point_id, KnowledgeConfig};
use callbridge_server::ingest::{ingest_file, IngestArgs, IngestError};
use serde_json::{json, Value};
use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// Requests seen by the fake embeddings and vector store endpoints.
#[derive(Default)]
struct Recorded {
    collection_exists: bool,
    created: Vec<Value>,
    upserts: Vec<Value>,
    embedding_inputs: Vec<Vec<String>>,
}

type Shared = Arc<Mutex<Recorded>>;

async fn embeddings(Extension(rec): Extension<Shared>, Json(body): Json<Value>) -> Json<Value> {
    let inputs: Vec<String> = body["input"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    let data: Vec<Value> = inputs
        .iter()
        .enumerate()
        .rev()
        .map(|(i, text)| json!({ "index": i, "embedding": [text.len() as f32, 1.0] }))
        .collect();
    rec.lock().unwrap().embedding_inputs.push(inputs);
    Json(json!({ "data": data }))
}

async fn get_collection(Extension(rec): Extension<Shared>) -> (StatusCode, Json<Value>) {
    if rec.lock().unwrap().collection_exists {
        (StatusCode::OK, Json(json!({ "result": {}, "status": "ok" })))
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "status": { "error": "Not found" } })),
        )
    }
}

async fn create_collection(
    Extension(rec): Extension<Shared>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let mut rec = rec.lock().unwrap();
    rec.created.push(body);
    rec.collection_exists = true;
    Json(json!({ "result": true, "status": "ok" }))
}

async fn upsert_points(Extension(rec): Extension<Shared>, Json(body): Json<Value>) -> Json<Value> {
    rec.lock().unwrap().upserts.push(body);
    Json(json!({ "result": { "status": "completed" }, "status": "ok" }))
}

async fn spawn_fake_services(rec: Shared) -> SocketAddr {
    let app = Router::new()
        .route("/v1/embeddings", post(embeddings))
        .route("/collections/docs", get(get_collection).put(create_collection))
        .route("/collections/docs/points", put(upsert_points))
        .layer(Extension(rec));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn knowledge_config(addr: SocketAddr) -> KnowledgeConfig {
    KnowledgeConfig {
        qdrant_url: format!("http://{}", addr),
        collection: "docs".to_string(),
        embedding_base_url: format!("http://{}/v1", addr),
        api_key: "test-key".to_string(),
        vector_size: 2,
        chunk_size: 12,
        chunk_overlap: 0,
        ..KnowledgeConfig::default()
    }
}

fn write_document(text: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn ingest_creates_collection_and_upserts_chunks() {
    let rec = Shared::default();
    let addr = spawn_fake_services(rec.clone()).await;
    let doc = write_document("We open at nine.\nClosed on Sundays.");

    let written = ingest_file(&knowledge_config(addr), doc.path(), Some("hours.txt"))
        .await
        .unwrap();
    assert_eq!(written, 3);

    let rec = rec.lock().unwrap();
    assert_eq!(rec.created.len(), 1);
    assert_eq!(rec.created[0]["vectors"]["size"], 2);
    assert_eq!(rec.created[0]["vectors"]["distance"], "Cosine");

    assert_eq!(
        rec.embedding_inputs,
        vec![vec![
            "We open at".to_string(),
            "nine. Closed".to_string(),
            "on Sundays.".to_string(),
        ]]
    );

    assert_eq!(rec.upserts.len(), 1);
    let points = rec.upserts[0]["points"].as_array().unwrap();
    assert_eq!(points.len(), written);
    for (i, point) in points.iter().enumerate() {
        assert_eq!(point["id"], point_id("hours.txt", i).to_string());
        assert_eq!(point["payload"]["source"], "hours.txt");
        assert_eq!(point["payload"]["text"], rec.embedding_inputs[0][i]);
        let text_len = rec.embedding_inputs[0][i].len() as f64;
        assert_eq!(point["vector"][0].as_f64().unwrap(), text_len);
    }
}

#[tokio::test]
async fn existing_collection_is_reused_and_ids_are_stable() {
    let rec = Shared::default();
    rec.lock().unwrap().collection_exists = true;
    let addr = spawn_fake_services(rec.clone()).await;
    let doc = write_document("Refunds take five business days.");
    let config = knowledge_config(addr);

    ingest_file(&config, doc.path(), Some("refunds.txt"))
        .await
        .unwrap();
    ingest_file(&config, doc.path(), Some("refunds.txt"))
        .await
        .unwrap();

    let rec = rec.lock().unwrap();
    assert!(rec.created.is_empty());
    assert_eq!(rec.upserts.len(), 2);
    assert_eq!(rec.upserts[0]["points"], rec.upserts[1]["points"]);
}

#[tokio::test]
async fn source_defaults_to_canonical_path() {
    let rec = Shared::default();
    let addr = spawn_fake_services(rec.clone()).await;
    let doc = write_document("Hello there.");
    let canonical = std::fs::canonicalize(doc.path()).unwrap();

    ingest_file(&knowledge_config(addr), doc.path(), None)
        .await
        .unwrap();

    let rec = rec.lock().unwrap();
    let point = &rec.upserts[0]["points"][0];
    assert_eq!(point["payload"]["source"], canonical.display().to_string());
}

#[tokio::test]
async fn blank_document_is_rejected_before_any_request() {
    let rec = Shared::default();
    let addr = spawn_fake_services(rec.clone()).await;
    let doc = write_document("  \n\n  ");

    let result = ingest_file(&knowledge_config(addr), doc.path(), None).await;
    assert!(matches!(result, Err(IngestError::Empty(_))));

    let rec = rec.lock().unwrap();
    assert!(rec.embedding_inputs.is_empty());
    assert!(rec.upserts.is_empty());
}

#[tokio::test]
async fn missing_file_is_a_read_error() {
    let config = KnowledgeConfig {
        api_key: "test-key".to_string(),
        ..KnowledgeConfig::default()
    };
    let result = ingest_file(&config, std::path::Path::new("/nonexistent/doc.txt"), None).await;
    assert!(matches!(result, Err(IngestError::Read { .. })));
}

#[tokio::test]
async fn vector_store_errors_are_reported() {
    let app = Router::new()
        .route("/collections/docs", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let doc = write_document("Some text.");

    let err = ingest_file(&knowledge_config(addr), doc.path(), None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("500"), "got: {}", err);
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn parses_file_and_options() {
    let parsed = IngestArgs::parse(args(&[
        "manual.txt",
        "--source-id",
        "manual",
        "--collection",
        "support",
        "--qdrant-url",
        "http://qdrant:6333",
    ]))
    .unwrap();
    assert_eq!(parsed.path, std::path::PathBuf::from("manual.txt"));
    assert_eq!(parsed.source_id.as_deref(), Some("manual"));

    let mut knowledge = KnowledgeConfig::default();
    parsed.apply(&mut knowledge);
    assert_eq!(knowledge.collection, "support");
    assert_eq!(knowledge.qdrant_url, "http://qdrant:6333");
}

#[test]
fn rejects_bad_arguments() {
    for bad in [
        args(&[]),
        args(&["a.txt", "b.txt"]),
        args(&["a.txt", "--collection"]),
        args(&["a.txt", "--verbose"]),
    ] {
        assert!(
            matches!(IngestArgs::parse(bad.clone()), Err(IngestError::Usage(_))),
            "accepted {:?}",
            bad
        );
    }
}
