//! End-to-end API tests over an in-memory database and scripted gateway.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use scribe_common::api::types::SOURCE_TOPICS_HEADER;
use scribe_common::db::connect_memory;
use scribe_svc::api::build_router;
use scribe_svc::qna::QueryPipeline;
use scribe_svc::queue::{Scheduler, WorkerDeps};
use scribe_svc::state::AppContext;
use scribe_svc::store::{ChatHistoryStore, TranscriptStore};
use scribe_svc::summary::Summarizer;
use scribe_svc::testing::{ok_stream, ScriptedGateway, ScriptedVector};
use scribe_svc::tracker::MinuteTracker;
use scribe_svc::vector::{TopicMeta, VectorIndex, VectorMatch};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct TestApp {
    app: Router,
    gateway: Arc<ScriptedGateway>,
    vector: Arc<ScriptedVector>,
}

async fn test_app() -> TestApp {
    let pool = connect_memory().await.unwrap();
    let transcript = TranscriptStore::new(pool.clone());
    let history = ChatHistoryStore::new(pool);
    let gateway = Arc::new(ScriptedGateway::new());
    let vector = Arc::new(ScriptedVector::new());
    let vector_dyn: Arc<dyn VectorIndex> = vector.clone();

    let qna = Arc::new(QueryPipeline::new(
        gateway.clone(),
        Some(vector_dyn.clone()),
        history.clone(),
        0.2,
        3,
    ));
    let scheduler = Scheduler::spawn(WorkerDeps {
        transcript: transcript.clone(),
        history: history.clone(),
        tracker: MinuteTracker::new(
            gateway.clone(),
            transcript.clone(),
            Some(vector_dyn.clone()),
            0.2,
        ),
        qna: qna.clone(),
        summarizer: Summarizer::new(gateway.clone(), transcript.clone(), 0.2),
    });

    let ctx = AppContext {
        scheduler,
        transcript,
        history,
        qna,
        vector: Some(vector_dyn),
    };
    TestApp { app: build_router(ctx), gateway, vector }
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = match body {
        Some(body) => Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => Request::builder().method(method).uri(uri).body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).to_string(),
        ))
    };
    (status, value)
}

async fn create_pair(app: &Router) -> (String, String) {
    let (status, body) = send(app, "POST", "/create", None).await;
    assert_eq!(status, StatusCode::OK);
    (
        body["minutesID"].as_str().unwrap().to_string(),
        body["chatHistoryID"].as_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn health_reports_ok() {
    let t = test_app().await;
    let (status, body) = send(&t.app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "scribe-svc");
}

#[tokio::test]
async fn agenda_roundtrip_through_the_queue() {
    let t = test_app().await;
    let (minutes_id, _) = create_pair(&t.app).await;

    let (status, body) = send(
        &t.app,
        "POST",
        "/agenda",
        Some(json!({ "minutesID": minutes_id, "agenda": ["budget", "roadmap"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(&t.app, "GET", &format!("/agenda/{}", minutes_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["agenda"], json!(["budget", "roadmap"]));
}

#[tokio::test]
async fn unknown_document_maps_to_not_found() {
    let t = test_app().await;
    let (status, body) = send(&t.app, "GET", "/agenda/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["status"].as_str().unwrap().contains("Not found"));
}

#[tokio::test]
async fn track_minutes_returns_the_verdict() {
    let t = test_app().await;
    t.gateway.script("topictracker", Ok("True".to_string()));
    t.gateway.script("AgendaTracker", Ok("False".to_string()));
    t.gateway.script("Abbreviation", Ok("Annual General Meeting".to_string()));
    let (minutes_id, chat_id) = create_pair(&t.app).await;

    let (status, body) = send(
        &t.app,
        "POST",
        "/track_minutes",
        Some(json!({
            "minutesID": minutes_id,
            "chatHistoryID": chat_id,
            "topicID": "t1",
            "topicTitle": "Kickoff",
            "minutes": "The AGM is on Friday\nBudget review",
            "abbreviation": "AGM",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["topic"], json!(true));
    assert_eq!(body["agenda"], json!(false));
    assert_eq!(body["abbreviation"], "Annual General Meeting");

    // The edit landed in the vector index too
    let indexed = t.vector.fetch_topic(&minutes_id, "t1").await.unwrap();
    assert_eq!(indexed.len(), 2);
    assert_eq!(indexed[0].meta.topic_title, "Kickoff");
}

#[tokio::test]
async fn glossary_actions_through_the_api() {
    let t = test_app().await;
    let (minutes_id, _) = create_pair(&t.app).await;

    let (status, _) = send(
        &t.app,
        "POST",
        "/glossary",
        Some(json!({
            "minutesID": minutes_id,
            "abbreviation": "AGM",
            "meaning": "Annual General Meeting",
            "action": "new",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&t.app, "GET", &format!("/glossary/{}", minutes_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["glossary"][0]["abbreviation"], "AGM");

    // Updating an absent entry is a client-visible failure
    let (status, _) = send(
        &t.app,
        "POST",
        "/glossary",
        Some(json!({
            "minutesID": minutes_id,
            "abbreviation": "TLA",
            "meaning": "x",
            "action": "update",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn document_query_streams_with_source_header() {
    let t = test_app().await;
    let (minutes_id, chat_id) = create_pair(&t.app).await;

    let meta = TopicMeta::new("t1", Some("Budget"));
    t.vector
        .upsert(&minutes_id, &["t10".to_string()], &["Costs rose".to_string()], &meta)
        .await
        .unwrap();
    t.vector.script_matches(vec![VectorMatch {
        sentence_id: "t10".to_string(),
        meta,
    }]);
    t.gateway.script_stream(ok_stream(&["Costs ", "went up."]));

    let request = Request::builder()
        .method("POST")
        .uri("/query/document")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "question": "What about costs?",
                "minutesID": minutes_id,
                "chatHistoryID": chat_id,
            })
            .to_string(),
        ))
        .unwrap();
    let response = t.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(SOURCE_TOPICS_HEADER).unwrap().to_str().unwrap(),
        "t1"
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(String::from_utf8_lossy(&bytes), "Costs went up.");

    // The completed exchange is now visible in chat history
    let (_, body) = send(&t.app, "GET", &format!("/chat/{}", chat_id), None).await;
    assert_eq!(body["document"][0][0], "What about costs?");
    assert_eq!(body["document"][0][1], "Costs went up.");
    assert_eq!(body["web"], json!([]));
}

#[tokio::test]
async fn web_query_and_clear_through_the_queue() {
    let t = test_app().await;
    t.gateway.script_stream(ok_stream(&["42"]));
    let (_, chat_id) = create_pair(&t.app).await;

    let (status, body) = send(
        &t.app,
        "POST",
        "/query/web",
        Some(json!({ "question": "meaning of life?", "chatHistoryID": chat_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "42");

    let (_, body) = send(&t.app, "GET", &format!("/chat/{}", chat_id), None).await;
    assert_eq!(body["web"][0][1], "42");

    let (status, _) = send(
        &t.app,
        "POST",
        "/chat/clear",
        Some(json!({ "chatHistoryID": chat_id, "channel": "web" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&t.app, "GET", &format!("/chat/{}", chat_id), None).await;
    assert_eq!(body["web"], json!([]));
}

#[tokio::test]
async fn summarise_after_tracking() {
    let t = test_app().await;
    t.gateway.script("SUMMARISE", Ok("One line about money.".to_string()));
    let (minutes_id, chat_id) = create_pair(&t.app).await;

    let (status, _) = send(
        &t.app,
        "POST",
        "/track_minutes",
        Some(json!({
            "minutesID": minutes_id,
            "chatHistoryID": chat_id,
            "topicID": "t1",
            "minutes": "We talked about money",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &t.app,
        "POST",
        "/summarise",
        Some(json!({ "minutesID": minutes_id, "topicID": "t1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"], "One line about money.");
}

#[tokio::test]
async fn topic_and_document_deletion() {
    let t = test_app().await;
    t.gateway.script("topictracker", Ok("True".to_string()));
    t.gateway.script("AgendaTracker", Ok("True".to_string()));
    let (minutes_id, chat_id) = create_pair(&t.app).await;

    let (status, _) = send(
        &t.app,
        "POST",
        "/track_minutes",
        Some(json!({
            "minutesID": minutes_id,
            "chatHistoryID": chat_id,
            "topicID": "t1",
            "minutes": "A\nB",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &t.app,
        "DELETE",
        "/topic",
        Some(json!({ "minutesID": minutes_id, "topicID": "t1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(t.vector.fetch_topic(&minutes_id, "t1").await.unwrap().is_empty());

    // Deleting again is a 404
    let (status, _) = send(
        &t.app,
        "DELETE",
        "/topic",
        Some(json!({ "minutesID": minutes_id, "topicID": "t1" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &t.app,
        "DELETE",
        "/document",
        Some(json!({ "minutesID": minutes_id, "chatHistoryID": chat_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&t.app, "GET", &format!("/agenda/{}", minutes_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&t.app, "GET", &format!("/chat/{}", chat_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
