use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response, StatusCode, header};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use dossier::blob::DocumentStorage;
use dossier::server::{AppState, create_router};
use dossier::store::{SqliteStore, Store};

struct TestServer {
    app: Router,
    _temp: TempDir,
}

fn test_server() -> TestServer {
    let temp = TempDir::new().unwrap();

    let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
    store.initialize().unwrap();

    let state = Arc::new(AppState {
        store: Arc::new(store),
        blob: DocumentStorage::new(temp.path()),
        public_base_url: None,
    });

    TestServer {
        app: create_router(state),
        _temp: temp,
    }
}

async fn send_raw(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    app.clone().oneshot(request).await.unwrap()
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let response = send_raw(app, method, uri, token, body).await;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();

    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    (status, value)
}

async fn register(app: &Router, username: &str, password: &str) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        "/api/v1/users",
        None,
        Some(json!({
            "username": username,
            "password": password,
            "check_password": password,
        })),
    )
    .await
}

async fn login(app: &Router, username: &str, password: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/v1/users/login",
        None,
        Some(json!({ "username": username, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["data"]["access_token"].as_str().unwrap().to_string()
}

async fn signup(app: &Router, username: &str) -> String {
    let (status, _) = register(app, username, "hunter2").await;
    assert_eq!(status, StatusCode::CREATED);
    login(app, username, "hunter2").await
}

async fn create_project(app: &Router, token: &str, name: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/v1/projects",
        Some(token),
        Some(json!({ "name": name })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["data"]["id"].as_str().unwrap().to_string()
}

async fn upload_document(
    app: &Router,
    token: &str,
    project_id: &str,
    file_name: &str,
    content_type: &str,
    data: &[u8],
) -> (StatusCode, Value) {
    let boundary = "----dossiertestboundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"files\"; filename=\"{file_name}\"\r\n\
             Content-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let request = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/projects/{project_id}/documents"))
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();

    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    (status, value)
}

#[tokio::test]
async fn test_register_and_login() {
    let server = test_server();
    let app = &server.app;

    let (status, body) = register(app, "alice", "hunter2").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["username"], "alice");
    // The stored hash never leaves the server
    assert!(body["data"].get("password_hash").is_none());

    let (status, body) = register(app, "alice", "other").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("alice"));

    let (status, body) = send(
        app,
        "POST",
        "/api/v1/users/login",
        None,
        Some(json!({ "username": "alice", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Incorrect username or password");

    // An unknown username gets the same message as a wrong password
    let (status, body) = send(
        app,
        "POST",
        "/api/v1/users/login",
        None,
        Some(json!({ "username": "nobody", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Incorrect username or password");

    let token = login(app, "alice", "hunter2").await;
    assert!(token.starts_with("dossier_"));
}

#[tokio::test]
async fn test_register_password_mismatch() {
    let server = test_server();

    let (status, _) = send(
        &server.app,
        "POST",
        "/api/v1/users",
        None,
        Some(json!({
            "username": "alice",
            "password": "hunter2",
            "check_password": "hunter3",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_requests_require_authentication() {
    let server = test_server();
    let app = &server.app;

    let (status, _) = send(app, "GET", "/api/v1/projects", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        app,
        "GET",
        "/api/v1/projects",
        Some("dossier_deadbeef_123456789012345678901234"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_project_creation_includes_owner_participation() {
    let server = test_server();
    let app = &server.app;

    let token = signup(app, "alice").await;
    let project_id = create_project(app, &token, "plans").await;

    let (status, body) = send(app, "GET", "/api/v1/projects", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["name"], "plans");

    let (status, body) = send(
        app,
        "GET",
        &format!("/api/v1/projects/{project_id}/participants"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let participants = body["data"].as_array().unwrap();
    assert_eq!(participants.len(), 1);
    assert_eq!(participants[0]["username"], "alice");
}

#[tokio::test]
async fn test_project_name_scoped_per_owner() {
    let server = test_server();
    let app = &server.app;

    let alice = signup(app, "alice").await;
    let bob = signup(app, "bob").await;

    create_project(app, &alice, "plans").await;

    let (status, _) = send(
        app,
        "POST",
        "/api/v1/projects",
        Some(&alice),
        Some(json!({ "name": "plans" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // A different owner may reuse the name
    create_project(app, &bob, "plans").await;
}

#[tokio::test]
async fn test_project_update_and_rename_conflict() {
    let server = test_server();
    let app = &server.app;

    let token = signup(app, "alice").await;
    let first = create_project(app, &token, "plans").await;
    create_project(app, &token, "archive").await;

    let (status, body) = send(
        app,
        "PATCH",
        &format!("/api/v1/projects/{first}"),
        Some(&token),
        Some(json!({ "description": "quarterly plans" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "plans");
    assert_eq!(body["data"]["description"], "quarterly plans");

    let (status, _) = send(
        app,
        "PATCH",
        &format!("/api/v1/projects/{first}"),
        Some(&token),
        Some(json!({ "name": "archive" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_clear_project_description() {
    let server = test_server();
    let app = &server.app;

    let token = signup(app, "alice").await;
    let (status, body) = send(
        app,
        "POST",
        "/api/v1/projects",
        Some(&token),
        Some(json!({ "name": "plans", "description": "quarterly plans" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let project_id = body["data"]["id"].as_str().unwrap().to_string();
    let project_uri = format!("/api/v1/projects/{project_id}");

    // An absent field keeps the current value
    let (status, body) = send(
        app,
        "PATCH",
        &project_uri,
        Some(&token),
        Some(json!({ "name": "roadmap" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["description"], "quarterly plans");

    // An explicit null clears it
    let (status, body) = send(
        app,
        "PATCH",
        &project_uri,
        Some(&token),
        Some(json!({ "description": null })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].get("description").is_none());
}

#[tokio::test]
async fn test_logout_invalidates_session() {
    let server = test_server();
    let app = &server.app;

    let token = signup(app, "alice").await;

    let (status, _) = send(app, "GET", "/api/v1/projects", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(app, "POST", "/api/v1/users/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(app, "GET", "/api/v1/projects", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_access_granted_after_invitation() {
    let server = test_server();
    let app = &server.app;

    let alice = signup(app, "alice").await;
    let bob = signup(app, "bob").await;
    let project_id = create_project(app, &alice, "plans").await;
    let project_uri = format!("/api/v1/projects/{project_id}");

    let (status, _) = send(app, "GET", &project_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        app,
        "POST",
        &format!("{project_uri}/participants"),
        Some(&alice),
        Some(json!({ "username": "bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["username"], "bob");

    let (status, body) = send(app, "GET", &project_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "plans");

    // Granting the same user twice is a conflict
    let (status, _) = send(
        app,
        "POST",
        &format!("{project_uri}/participants"),
        Some(&alice),
        Some(json!({ "username": "bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Granting an unknown user is a 404
    let (status, _) = send(
        app,
        "POST",
        &format!("{project_uri}/participants"),
        Some(&alice),
        Some(json!({ "username": "nobody" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_only_owner_may_grant_access() {
    let server = test_server();
    let app = &server.app;

    let alice = signup(app, "alice").await;
    let bob = signup(app, "bob").await;
    signup(app, "carol").await;

    let project_id = create_project(app, &alice, "plans").await;
    let grant_uri = format!("/api/v1/projects/{project_id}/participants");

    let (status, _) = send(
        app,
        "POST",
        &grant_uri,
        Some(&alice),
        Some(json!({ "username": "bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // A participant may not invite further users
    let (status, _) = send(
        app,
        "POST",
        &grant_uri,
        Some(&bob),
        Some(json!({ "username": "carol" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_delete_project_hidden_from_non_owners() {
    let server = test_server();
    let app = &server.app;

    let alice = signup(app, "alice").await;
    let bob = signup(app, "bob").await;

    let project_id = create_project(app, &alice, "plans").await;
    let project_uri = format!("/api/v1/projects/{project_id}");

    send(
        app,
        "POST",
        &format!("{project_uri}/participants"),
        Some(&alice),
        Some(json!({ "username": "bob" })),
    )
    .await;

    // Even a participant gets a 404 on delete, not a 403
    let (status, _) = send(app, "DELETE", &project_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(app, "DELETE", &project_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(app, "GET", &project_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_document_upload_and_download() {
    let server = test_server();
    let app = &server.app;

    let token = signup(app, "alice").await;
    let project_id = create_project(app, &token, "plans").await;

    let content = b"quarterly report body";
    let (status, body) = upload_document(
        app,
        &token,
        &project_id,
        "Quarterly Report.PDF",
        "application/pdf",
        content,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let documents = body["data"].as_array().unwrap();
    assert_eq!(documents.len(), 1);
    // Names are normalized to lowercase with underscores
    assert_eq!(documents[0]["name"], "quarterly_report.pdf");
    assert_eq!(documents[0]["format"], "application/pdf");
    let doc_id = documents[0]["id"].as_str().unwrap().to_string();
    assert_eq!(
        documents[0]["file_url"],
        format!("/api/v1/projects/{project_id}/documents/quarterly_report.pdf")
    );

    let (status, body) = send(
        app,
        "GET",
        &format!("/api/v1/projects/{project_id}/documents"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let response = send_raw(
        app,
        "GET",
        &format!("/api/v1/documents/{doc_id}/download"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/pdf"
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], content);
}

#[tokio::test]
async fn test_duplicate_upload_preserves_existing_bytes() {
    let server = test_server();
    let app = &server.app;

    let token = signup(app, "alice").await;
    let project_id = create_project(app, &token, "plans").await;

    let (status, body) = upload_document(
        app,
        &token,
        &project_id,
        "notes.txt",
        "text/plain",
        b"original",
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let doc_id = body["data"][0]["id"].as_str().unwrap().to_string();

    let (status, _) = upload_document(
        app,
        &token,
        &project_id,
        "notes.txt",
        "text/plain",
        b"imposter",
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // The first document and its bytes survive the rejected duplicate
    let (status, _) = send(
        app,
        "GET",
        &format!("/api/v1/documents/{doc_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let response = send_raw(
        app,
        "GET",
        &format!("/api/v1/documents/{doc_id}/download"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"original");
}

#[tokio::test]
async fn test_rename_onto_existing_document_conflicts() {
    let server = test_server();
    let app = &server.app;

    let token = signup(app, "alice").await;
    let project_id = create_project(app, &token, "plans").await;

    let (_, body) = upload_document(app, &token, &project_id, "a.txt", "text/plain", b"alpha").await;
    let first_id = body["data"][0]["id"].as_str().unwrap().to_string();
    let (_, body) = upload_document(app, &token, &project_id, "b.txt", "text/plain", b"beta").await;
    let second_id = body["data"][0]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        app,
        "PATCH",
        &format!("/api/v1/documents/{second_id}"),
        Some(&token),
        Some(json!({ "name": "a.txt" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Both documents keep their own bytes
    for (id, content) in [(first_id, &b"alpha"[..]), (second_id, &b"beta"[..])] {
        let response = send_raw(
            app,
            "GET",
            &format!("/api/v1/documents/{id}/download"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], content);
    }
}

#[tokio::test]
async fn test_document_rename_updates_locator() {
    let server = test_server();
    let app = &server.app;

    let token = signup(app, "alice").await;
    let project_id = create_project(app, &token, "plans").await;

    let (_, body) = upload_document(
        app,
        &token,
        &project_id,
        "draft.txt",
        "text/plain",
        b"draft",
    )
    .await;
    let doc_id = body["data"][0]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        app,
        "PATCH",
        &format!("/api/v1/documents/{doc_id}"),
        Some(&token),
        Some(json!({ "name": "Final Version.txt" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "final_version.txt");
    assert_eq!(
        body["data"]["file_url"],
        format!("/api/v1/projects/{project_id}/documents/final_version.txt")
    );

    // The stored bytes moved with the rename
    let response = send_raw(
        app,
        "GET",
        &format!("/api/v1/documents/{doc_id}/download"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"draft");
}

#[tokio::test]
async fn test_document_delete_is_owner_only() {
    let server = test_server();
    let app = &server.app;

    let alice = signup(app, "alice").await;
    let bob = signup(app, "bob").await;

    let project_id = create_project(app, &alice, "plans").await;
    send(
        app,
        "POST",
        &format!("/api/v1/projects/{project_id}/participants"),
        Some(&alice),
        Some(json!({ "username": "bob" })),
    )
    .await;

    let (_, body) = upload_document(
        app,
        &bob,
        &project_id,
        "notes.txt",
        "text/plain",
        b"notes",
    )
    .await;
    let doc_id = body["data"][0]["id"].as_str().unwrap().to_string();
    let doc_uri = format!("/api/v1/documents/{doc_id}");

    // Participants may upload and view but not delete
    let (status, _) = send(app, "GET", &doc_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(app, "DELETE", &doc_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(app, "DELETE", &doc_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(app, "GET", &doc_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_documents_hidden_from_outsiders() {
    let server = test_server();
    let app = &server.app;

    let alice = signup(app, "alice").await;
    let mallory = signup(app, "mallory").await;

    let project_id = create_project(app, &alice, "plans").await;
    let (_, body) = upload_document(
        app,
        &alice,
        &project_id,
        "secret.txt",
        "text/plain",
        b"secret",
    )
    .await;
    let doc_id = body["data"][0]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        app,
        "GET",
        &format!("/api/v1/documents/{doc_id}"),
        Some(&mallory),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        app,
        "GET",
        &format!("/api/v1/documents/{doc_id}/download"),
        Some(&mallory),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        app,
        "GET",
        &format!("/api/v1/projects/{project_id}/documents"),
        Some(&mallory),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_deleting_project_removes_documents() {
    let server = test_server();
    let app = &server.app;

    let token = signup(app, "alice").await;
    let project_id = create_project(app, &token, "plans").await;

    let (_, body) = upload_document(
        app,
        &token,
        &project_id,
        "report.txt",
        "text/plain",
        b"report",
    )
    .await;
    let doc_id = body["data"][0]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        app,
        "DELETE",
        &format!("/api/v1/projects/{project_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        app,
        "GET",
        &format!("/api/v1/documents/{doc_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_rejects_traversal_names() {
    let server = test_server();
    let app = &server.app;

    let token = signup(app, "alice").await;
    let project_id = create_project(app, &token, "plans").await;

    let (status, _) = upload_document(
        app,
        &token,
        &project_id,
        "../evil.txt",
        "text/plain",
        b"x",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
