//! Shared test helpers: scripted analysis provider and app construction
#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use taxkit_common::events::EventBus;
use taxkit_intake::analysis::{
    AnalysisProvider, ChatContext, ChatOutcome, Classification, ResponseFragment,
};
use taxkit_intake::models::{ChatMessage, DetectedMemory, DocumentRequest, Memory};
use tokio::sync::mpsc;
use tower::util::ServiceExt;

/// One scripted chat turn
#[derive(Debug, Clone, Default)]
pub struct ChatScript {
    pub memories: Vec<DetectedMemory>,
    pub chunks: Vec<String>,
    pub requests: Vec<DocumentRequest>,
}

/// Analysis provider fake driven by per-test scripts
///
/// Classifications are keyed by file name; chat turns pop from a queue.
/// `fail_all` makes every call return an analysis error, for fail-closed
/// behavior tests.
#[derive(Default)]
pub struct ScriptedProvider {
    pub classifications: Mutex<HashMap<String, Classification>>,
    pub chat_scripts: Mutex<VecDeque<ChatScript>>,
    pub fail_all: AtomicBool,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script_classification(&self, file_name: &str, classification: Classification) {
        self.classifications
            .lock()
            .unwrap()
            .insert(file_name.to_string(), classification);
    }

    pub fn script_chat(&self, script: ChatScript) {
        self.chat_scripts.lock().unwrap().push_back(script);
    }

    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    fn check_available(&self) -> taxkit_common::Result<()> {
        if self.fail_all.load(Ordering::SeqCst) {
            Err(taxkit_common::Error::Analysis(
                "scripted outage".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AnalysisProvider for ScriptedProvider {
    async fn classify(
        &self,
        file_name: &str,
        _content: &[u8],
    ) -> taxkit_common::Result<Classification> {
        self.check_available()?;

        Ok(self
            .classifications
            .lock()
            .unwrap()
            .get(file_name)
            .cloned()
            .unwrap_or_else(|| Classification {
                is_valid: false,
                doc_type: None,
                year: None,
                entity: None,
                extracted_facts: vec![],
                feedback: format!("Could not recognize {}", file_name),
            }))
    }

    async fn respond(
        &self,
        _history: &[ChatMessage],
        _message: &str,
        _context: &ChatContext,
        fragments: mpsc::Sender<ResponseFragment>,
    ) -> taxkit_common::Result<ChatOutcome> {
        self.check_available()?;

        let script = self
            .chat_scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();

        if !script.memories.is_empty() {
            let _ = fragments
                .send(ResponseFragment::Memories(script.memories.clone()))
                .await;
        }
        for chunk in &script.chunks {
            let _ = fragments
                .send(ResponseFragment::Text(chunk.clone()))
                .await;
        }

        Ok(ChatOutcome {
            reply: script.chunks.concat(),
            detected_memories: script.memories,
            requested_documents: script.requests,
        })
    }

    async fn synthesize(
        &self,
        memories: &[Memory],
        _scope_label: &str,
    ) -> taxkit_common::Result<String> {
        self.check_available()?;

        let merged = memories
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join(". ");
        Ok(format!("Notes: {}.", merged))
    }
}

/// Everything a test needs, held together so temp storage outlives the app
pub struct TestApp {
    pub router: axum::Router,
    pub pool: sqlx::SqlitePool,
    pub provider: Arc<ScriptedProvider>,
    _files_dir: tempfile::TempDir,
}

/// Build an app over an in-memory database and a scripted provider
pub async fn create_test_app() -> TestApp {
    let pool = taxkit_intake::db::init_memory_pool()
        .await
        .expect("Failed to create in-memory database");

    let provider = ScriptedProvider::new();
    let files_dir = tempfile::tempdir().expect("Failed to create temp dir");

    let state = taxkit_intake::AppState::new(
        pool.clone(),
        EventBus::new(100),
        provider.clone(),
        files_dir.path().to_path_buf(),
    );

    TestApp {
        router: taxkit_intake::build_router(state),
        pool,
        provider,
        _files_dir: files_dir,
    }
}

/// Scripted classification shorthand
pub fn classification(
    doc_type: &str,
    year: &str,
    entity: Option<&str>,
    feedback: &str,
) -> Classification {
    Classification {
        is_valid: true,
        doc_type: Some(doc_type.to_string()),
        year: Some(year.to_string()),
        entity: entity.map(str::to_string),
        extracted_facts: vec![],
        feedback: feedback.to_string(),
    }
}

/// POST a JSON body and return (status, parsed body)
pub async fn post_json(
    router: &axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

/// GET a JSON body and return (status, parsed body)
pub async fn get_json(router: &axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

const MULTIPART_BOUNDARY: &str = "taxkit-test-boundary";

/// Build a multipart/form-data body for an upload batch
pub fn multipart_body(files: &[(&str, &[u8])]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for (file_name, content) in files {
        body.extend_from_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"files\"; filename=\"{}\"\r\n",
                file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());

    (
        format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY),
        body,
    )
}

/// POST an upload batch and return (status, parsed body)
pub async fn post_upload(
    router: &axum::Router,
    intake_id: uuid::Uuid,
    files: &[(&str, &[u8])],
) -> (StatusCode, serde_json::Value) {
    let (content_type, body) = multipart_body(files);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/intakes/{}/uploads", intake_id))
                .header("content-type", content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

/// One parsed SSE event
#[derive(Debug, Clone)]
pub struct SseEvent {
    pub event: String,
    pub data: serde_json::Value,
}

/// POST a chat message and collect the full SSE event sequence
pub async fn post_chat(
    router: &axum::Router,
    intake_id: uuid::Uuid,
    message: &str,
    client_token: &str,
) -> (StatusCode, Vec<SseEvent>) {
    let body = serde_json::json!({ "message": message, "client_token": client_token });

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/intakes/{}/chat", intake_id))
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, parse_sse(&String::from_utf8_lossy(&bytes)))
}

/// Parse SSE framing into typed events, skipping comments/heartbeats
pub fn parse_sse(text: &str) -> Vec<SseEvent> {
    let mut events = Vec::new();
    let mut current_event: Option<String> = None;

    for line in text.lines() {
        if let Some(name) = line.strip_prefix("event: ") {
            current_event = Some(name.trim().to_string());
        } else if let Some(data) = line.strip_prefix("data: ") {
            if let (Some(event), Ok(json)) = (
                current_event.take(),
                serde_json::from_str::<serde_json::Value>(data),
            ) {
                events.push(SseEvent { event, data: json });
            }
        }
    }

    events
}
