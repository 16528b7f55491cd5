//! End-to-end upload workflow: gating, reconciliation, status progression

mod helpers;

use axum::http::StatusCode;
use helpers::{classification, create_test_app, get_json, post_chat, post_json, post_upload, ChatScript};
use serde_json::json;
use taxkit_intake::analysis::ExtractedFact;
use taxkit_intake::models::DocumentRequest;

async fn create_intake(app: &helpers::TestApp) -> (uuid::Uuid, uuid::Uuid) {
    let (status, customer) = post_json(
        &app.router,
        "/customers",
        json!({ "display_name": "Dana Reyes", "email": "dana@example.com" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let customer_id: uuid::Uuid = customer["id"].as_str().unwrap().parse().unwrap();

    let (status, intake) = post_json(
        &app.router,
        &format!("/customers/{}/intakes", customer_id),
        json!({ "tax_year": "2024" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(intake["status"], "AWAITING_PRIOR_RETURN");
    let intake_id: uuid::Uuid = intake["id"].as_str().unwrap().parse().unwrap();

    (customer_id, intake_id)
}

#[tokio::test]
async fn test_full_intake_scenario() {
    let app = create_test_app().await;
    let (_customer_id, intake_id) = create_intake(&app).await;

    // --- Wrong-year prior return: preserved, but the gate holds ---
    app.provider.script_classification(
        "2022_1040.pdf",
        classification("Form 1040", "2022", None, "This is a 2022 federal return."),
    );

    let (status, body) = post_upload(&app.router, intake_id, &[("2022_1040.pdf", b"pdf-2022")]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "AWAITING_PRIOR_RETURN");
    assert_eq!(body["documents"].as_array().unwrap().len(), 1);
    assert_eq!(body["documents"][0]["status"], "COMPLETED");

    // The accountant is told why the intake did not advance
    let feedback = body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m["content"].as_str())
        .find(|c| c.contains("2023"))
        .expect("feedback should name the required year");
    assert!(feedback.contains("Form 1040"));

    // --- Chat is upload-only while gated ---
    let (status, _) = post_chat(&app.router, intake_id, "What do we still need?", "tok-1").await;
    assert_eq!(status, StatusCode::CONFLICT);

    // --- Valid prior-year return advances the gate and seeds requests ---
    let mut prior_return = classification(
        "Form 1040",
        "2023",
        None,
        "Valid 2023 federal return for Dana Reyes.",
    );
    prior_return.extracted_facts = vec![ExtractedFact {
        category: "income".to_string(),
        label: "wages".to_string(),
        value: "85000".to_string(),
        provenance: None,
    }];
    app.provider.script_classification("2023_Form1040.pdf", prior_return);
    app.provider.script_chat(ChatScript {
        memories: vec![],
        chunks: vec![
            "Based on the 2023 return, please collect the W-2 from Microsoft and the 1099-INT from Chase."
                .to_string(),
        ],
        requests: vec![
            DocumentRequest {
                display_name: "W-2 from Microsoft for 2024".to_string(),
                doc_type: Some("W-2".to_string()),
                year: Some("2024".to_string()),
                entity: Some("Microsoft".to_string()),
            },
            DocumentRequest {
                display_name: "1099-INT from Chase for 2024".to_string(),
                doc_type: Some("1099-INT".to_string()),
                year: Some("2024".to_string()),
                entity: Some("Chase".to_string()),
            },
        ],
    });

    let (status, body) =
        post_upload(&app.router, intake_id, &[("2023_Form1040.pdf", b"pdf-2023")]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "INCOMPLETE");

    let (status, detail) = get_json(&app.router, &format!("/intakes/{}", intake_id)).await;
    assert_eq!(status, StatusCode::OK);
    let documents = detail["documents"].as_array().unwrap();
    let requested: Vec<_> = documents
        .iter()
        .filter(|d| d["status"] == "REQUESTED")
        .collect();
    assert_eq!(requested.len(), 2);

    // Extracted facts landed in customer details
    let details = detail["details"].as_array().unwrap();
    assert!(details
        .iter()
        .any(|d| d["category"] == "income" && d["label"] == "wages" && d["value"] == "85000"));

    // --- Matching upload completes the W-2 request ---
    app.provider.script_classification(
        "w2_microsoft.pdf",
        classification("W-2", "2024", Some("Microsoft"), "W-2 from Microsoft."),
    );

    let (status, body) =
        post_upload(&app.router, intake_id, &[("w2_microsoft.pdf", b"pdf-w2")]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "INCOMPLETE");
    assert_eq!(body["documents"][0]["status"], "COMPLETED");
    assert_eq!(body["documents"][0]["display_name"], "W-2 from Microsoft for 2024");

    // --- Completing the last request lifts the intake to READY ---
    app.provider.script_classification(
        "1099_chase.pdf",
        classification("1099-INT", "2024", Some("Chase"), "1099-INT from Chase."),
    );

    let (status, body) =
        post_upload(&app.router, intake_id, &[("1099_chase.pdf", b"pdf-1099")]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "READY");

    let (_, detail) = get_json(&app.router, &format!("/intakes/{}", intake_id)).await;
    let documents = detail["documents"].as_array().unwrap();
    assert!(documents.iter().all(|d| d["status"] == "COMPLETED"));
    assert_eq!(documents.len(), 4);
}

#[tokio::test]
async fn test_identical_reupload_is_idempotent() {
    let app = create_test_app().await;
    let (_customer_id, intake_id) = create_intake(&app).await;

    app.provider.script_classification(
        "w2.pdf",
        classification("W-2", "2024", Some("Microsoft"), "W-2."),
    );

    let (status, first) = post_upload(&app.router, intake_id, &[("w2.pdf", b"same-bytes")]).await;
    assert_eq!(status, StatusCode::OK);
    let first_id = first["documents"][0]["id"].as_str().unwrap().to_string();

    // Same bytes again: no second COMPLETED record for the same file
    let (status, second) = post_upload(&app.router, intake_id, &[("w2.pdf", b"same-bytes")]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["documents"].as_array().unwrap().len(), 1);
    assert_eq!(second["documents"][0]["id"].as_str().unwrap(), first_id);

    let (_, detail) = get_json(&app.router, &format!("/intakes/{}", intake_id)).await;
    assert_eq!(detail["documents"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_analysis_outage_fails_closed() {
    let app = create_test_app().await;
    let (_customer_id, intake_id) = create_intake(&app).await;

    app.provider.set_fail_all(true);

    let (status, body) = post_upload(&app.router, intake_id, &[("return.pdf", b"pdf")]).await;
    assert_eq!(status, StatusCode::OK);

    // Upload preserved, gate held, outage labeled
    assert_eq!(body["status"], "AWAITING_PRIOR_RETURN");
    assert_eq!(body["documents"][0]["status"], "COMPLETED");
    let labeled = body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m["content"].as_str())
        .any(|c| c.contains("analysis is unavailable"));
    assert!(labeled, "outage must be labeled, not silent");
}

#[tokio::test]
async fn test_upload_to_unknown_intake_is_rejected() {
    let app = create_test_app().await;

    let (status, body) =
        post_upload(&app.router, uuid::Uuid::new_v4(), &[("w2.pdf", b"bytes")]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_upload_without_files_is_rejected() {
    let app = create_test_app().await;
    let (_customer_id, intake_id) = create_intake(&app).await;

    let (status, body) = post_upload(&app.router, intake_id, &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}
