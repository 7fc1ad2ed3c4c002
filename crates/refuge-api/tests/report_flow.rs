use std::collections::HashSet;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use refuge_api::auth::AccessPolicy;
use refuge_api::session::SessionStore;
use refuge_api::AppStateInner;
use refuge_notify::{Notifier, NotifyConfig};
use refuge_store::Storage;

const REPORTER: &str = "user@corp.example";
const REVIEWER: &str = "review@corp.example";
const PIN: &str = "4821";

async fn test_app() -> (tempfile::TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    let storage = Storage::new(dir.path().to_path_buf(), Storage::default_extensions())
        .await
        .unwrap();

    let state = Arc::new(AppStateInner {
        db: refuge_db::Database::open_in_memory().unwrap(),
        storage,
        sessions: SessionStore::new(),
        policy: AccessPolicy {
            allowed: HashSet::from([REPORTER.to_string()]),
            reviewers: HashSet::from([REVIEWER.to_string()]),
            administrators: HashSet::new(),
            pin: PIN.into(),
        },
        notifier: Notifier::new(NotifyConfig {
            endpoint: String::new(),
            from: "refuge@localhost".into(),
            recipients: vec![],
        }),
    });

    (dir, refuge_api::router(state))
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn login(app: &Router, email: &str) -> String {
    let (status, body) = send(
        app,
        json_request("POST", "/auth/login", None, json!({ "email": email })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

async fn login_verified_reviewer(app: &Router) -> String {
    let token = login(app, REVIEWER).await;
    let (status, _) = send(
        app,
        json_request("POST", "/auth/pin", Some(&token), json!({ "pin": PIN })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    token
}

#[tokio::test]
async fn full_report_lifecycle() {
    let (_dir, app) = test_app().await;

    // submit a report and keep only the protocol
    let reporter = login(&app, REPORTER).await;
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/reports",
            Some(&reporter),
            json!({ "body": "safety issue", "accept_terms": true }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let protocol = body["protocol"].as_str().unwrap().to_string();
    assert_eq!(protocol.len(), 8);

    // resuming shows the report as the one reporter message
    let (status, body) = send(&app, get_request(&format!("/tickets/{protocol}"), Some(&reporter))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ticket"]["status"], "received");
    assert!(body["ticket"].get("note").is_none());
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["text"], "safety issue");
    assert_eq!(messages[0]["author_role"], "reporter");

    // lookup is case-insensitive
    let lower = protocol.to_ascii_lowercase();
    let (status, _) = send(&app, get_request(&format!("/tickets/{lower}"), Some(&reporter))).await;
    assert_eq!(status, StatusCode::OK);

    // the reviewer sees one unread message until the thread is opened
    let reviewer = login_verified_reviewer(&app).await;
    let (status, body) = send(&app, get_request("/review/tickets", Some(&reviewer))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["unread"][&protocol], 1);

    let (status, body) = send(
        &app,
        get_request(&format!("/review/tickets/{protocol}"), Some(&reviewer)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ticket"]["body"], "safety issue");

    let (_, body) = send(&app, get_request("/review/tickets", Some(&reviewer))).await;
    assert_eq!(body["unread"][&protocol], 0);

    // reviewer replies; the reporter sees both turns in order
    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &format!("/review/tickets/{protocol}/messages"),
            Some(&reviewer),
            json!({ "text": "noted" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = send(&app, get_request(&format!("/tickets/{protocol}"), Some(&reporter))).await;
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["text"], "safety issue");
    assert_eq!(messages[1]["text"], "noted");
    assert_eq!(messages[1]["author_role"], "reviewer");

    // closing locks the thread for the reporter only
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/review/tickets/{protocol}/status"),
            Some(&reviewer),
            json!({ "status": "closed" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "closed");

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &format!("/tickets/{protocol}/messages"),
            Some(&reporter),
            json!({ "text": "any update?" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &format!("/review/tickets/{protocol}/messages"),
            Some(&reviewer),
            json!({ "text": "case closed" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn privileged_routes_need_both_gates() {
    let (_dir, app) = test_app().await;

    // no session at all
    let (status, _) = send(&app, get_request("/review/tickets", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // reporter session: passes gate A but has no privileged role
    let reporter = login(&app, REPORTER).await;
    let (status, _) = send(&app, get_request("/review/tickets", Some(&reporter))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // reviewer without step-up: sent to the PIN challenge
    let reviewer = login(&app, REVIEWER).await;
    let (status, _) = send(&app, get_request("/review/tickets", Some(&reviewer))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // a wrong PIN leaves the gate shut
    let (status, _) = send(
        &app,
        json_request("POST", "/auth/pin", Some(&reviewer), json!({ "pin": "9999" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&app, get_request("/review/tickets", Some(&reviewer))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // the right PIN opens it, logout shuts everything again
    let (status, _) = send(
        &app,
        json_request("POST", "/auth/pin", Some(&reviewer), json!({ "pin": PIN })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, get_request("/review/tickets", Some(&reviewer))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        json_request("POST", "/auth/logout", Some(&reviewer), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, get_request("/review/tickets", Some(&reviewer))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // a reporter can never pass gate B
    let (status, _) = send(
        &app,
        json_request("POST", "/auth/pin", Some(&reporter), json!({ "pin": PIN })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_identities_and_protocols_are_distinct_failures() {
    let (_dir, app) = test_app().await;

    let (status, _) = send(
        &app,
        json_request("POST", "/auth/login", None, json!({ "email": "who@else.example" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let reporter = login(&app, REPORTER).await;
    let (status, _) = send(&app, get_request("/tickets/FFFFFFFF", Some(&reporter))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn submission_validation() {
    let (_dir, app) = test_app().await;
    let reporter = login(&app, REPORTER).await;

    // terms not accepted
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/reports",
            Some(&reporter),
            json!({ "body": "something", "accept_terms": false }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("terms"));

    // empty body
    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/reports",
            Some(&reporter),
            json!({ "body": "   ", "accept_terms": true }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn empty_chat_turns_are_rejected() {
    let (_dir, app) = test_app().await;
    let reporter = login(&app, REPORTER).await;

    let (_, body) = send(
        &app,
        json_request(
            "POST",
            "/reports",
            Some(&reporter),
            json!({ "body": "report", "accept_terms": true }),
        ),
    )
    .await;
    let protocol = body["protocol"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &format!("/tickets/{protocol}/messages"),
            Some(&reporter),
            json!({ "text": "  " }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn attachments_travel_with_chat_turns() {
    let (_dir, app) = test_app().await;
    let reporter = login(&app, REPORTER).await;

    // upload, then reference the handle from a submission
    let upload = Request::builder()
        .method("POST")
        .uri("/attachments?filename=evidence.png")
        .header(header::AUTHORIZATION, format!("Bearer {reporter}"))
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from(&b"fake png bytes"[..]))
        .unwrap();
    let (status, body) = send(&app, upload).await;
    assert_eq!(status, StatusCode::CREATED);
    let handle = body["attachment_id"].as_str().unwrap().to_string();
    assert!(handle.ends_with(".png"));

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/reports",
            Some(&reporter),
            json!({ "body": "see attached", "accept_terms": true, "attachment_id": handle }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let protocol = body["protocol"].as_str().unwrap().to_string();

    let (_, body) = send(&app, get_request(&format!("/tickets/{protocol}"), Some(&reporter))).await;
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages[0]["attachment"], handle);

    // the blob comes back by handle
    let (status, _) = send(&app, get_request(&format!("/attachments/{handle}"), Some(&reporter))).await;
    assert_eq!(status, StatusCode::OK);

    // an inline audio clip lands as a stored webm attachment
    let audio = format!("data:audio/webm;base64,{}", B64.encode(b"opus frames"));
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/tickets/{protocol}/messages"),
            Some(&reporter),
            json!({ "audio": audio }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let clip = body["attachment"].as_str().unwrap();
    assert!(clip.ends_with(".webm"));

    // referencing a handle that was never stored is rejected
    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &format!("/tickets/{protocol}/messages"),
            Some(&reporter),
            json!({ "attachment_id": "00000000000000000000000000000000.png" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn reviewer_note_stays_internal() {
    let (_dir, app) = test_app().await;
    let reporter = login(&app, REPORTER).await;
    let reviewer = login_verified_reviewer(&app).await;

    let (_, body) = send(
        &app,
        json_request(
            "POST",
            "/reports",
            Some(&reporter),
            json!({ "body": "needs triage", "accept_terms": true }),
        ),
    )
    .await;
    let protocol = body["protocol"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/review/tickets/{protocol}/note"),
            Some(&reviewer),
            json!({ "note": "possible duplicate of last month" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["note"], "possible duplicate of last month");

    // the reporter view carries no note field at all
    let (_, body) = send(&app, get_request(&format!("/tickets/{protocol}"), Some(&reporter))).await;
    assert!(body["ticket"].get("note").is_none());

    // unknown status values are rejected without changing the ticket
    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &format!("/review/tickets/{protocol}/status"),
            Some(&reviewer),
            json!({ "status": "archived" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, body) = send(
        &app,
        get_request(&format!("/review/tickets/{protocol}"), Some(&reviewer)),
    )
    .await;
    assert_eq!(body["ticket"]["status"], "received");
}
