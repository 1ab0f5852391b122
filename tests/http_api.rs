mod support;

use axum::http::StatusCode;
use partner_secrets::crypto::PgpEngine;
use partner_secrets::store::SecretStore;
use serde_json::json;
use std::sync::Arc;
use support::{FakePgpEngine, RejectSecretWrites, TestApp};

const ACME_KEY_NAME: &str = "dev-loyaltyhub-module-secretsharing-partner-acme-public-key";

async fn register_acme(app: &TestApp) {
    let acme = FakePgpEngine::partner_keypair("acme");
    let (status, body) = app
        .send_json(
            "POST",
            "/partner/import",
            &json!({ "partner_id": "acme", "public_key": acme.public_key }),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["message"], "partner public key processed successfully");
}

async fn import(app: &TestApp, secret_name: &str, plaintext: &str) -> StatusCode {
    let ciphertext = app.encrypt_for_platform(plaintext).await;
    let (status, _) = app
        .send_json(
            "POST",
            "/secrets/import",
            &json!({ "partner_id": "acme", "secret_name": secret_name, "secret": ciphertext }),
        )
        .await;
    status
}

#[tokio::test]
async fn well_known_key_is_generated_once() {
    let app = TestApp::new();

    let (status, first) = app.send("GET", "/.well-known/pgp-key", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(first.starts_with("FAKE-PUBLIC:platform-"));

    let (status, second) = app.send("GET", "/.well-known/pgp-key", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first, second);
    assert_eq!(app.engine.generated(), 1);
}

#[tokio::test]
async fn partner_key_registration_is_idempotent_and_last_write_wins() {
    let app = TestApp::new();
    register_acme(&app).await;
    register_acme(&app).await;
    assert_eq!(app.store.len(), 1);

    let (status, _) = app
        .send_json(
            "POST",
            "/partners/import",
            &json!({ "partner_id": "acme", "public_key": "FAKE-PUBLIC:acme-rotated" }),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(app.store.len(), 1);

    let stored = app.store.get(ACME_KEY_NAME).await.unwrap().unwrap();
    assert_eq!(stored.value, "FAKE-PUBLIC:acme-rotated");
    assert_eq!(stored.tags.get("product_name").map(String::as_str), Some("loyaltyhub"));
}

#[tokio::test]
async fn unknown_partner_is_forbidden_before_any_store_access() {
    let app = TestApp::new();

    let (status, body) = app
        .send_json(
            "POST",
            "/partner/import",
            &json!({ "partner_id": "initech", "public_key": "FAKE-PUBLIC:initech" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Unauthorized partner_id");

    let (status, body) = app
        .send_json(
            "POST",
            "/secrets/import",
            &json!({ "partner_id": "initech", "secret_name": "api-token", "secret": "x" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Unauthorized partner_id");

    let (status, _) = app
        .get_json("/secrets/export?partner_id=initech&secret_name=api-token")
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(app.store.is_empty());
}

#[tokio::test]
async fn request_shape_errors() {
    let app = TestApp::new();

    let (status, body) = app.send("POST", "/partner/import", Some("{oops")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"message":"Invalid JSON body"}"#);

    let (status, body) = app
        .send_json("POST", "/secrets/import", &json!({ "secret_name": "api-token" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], r#"Missing fields: ["partner_id", "secret"]"#);

    let (status, body) = app.get_json("/secrets/export?partner_id=acme").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Missing required parameters: secret_name");

    let (status, body) = app.get_json("/secrets/import").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["message"], "Only POST is allowed");

    let (status, body) = app
        .send_json("POST", "/secrets/export", &json!({ "partner_id": "acme" }))
        .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["message"], "Only GET is allowed");

    let (status, body) = app.get_json("/secrets/list").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Not Found");
}

#[tokio::test]
async fn secret_round_trips_to_the_partner() {
    let app = TestApp::new();
    register_acme(&app).await;
    assert_eq!(import(&app, "api-token", "hunter2").await, StatusCode::ACCEPTED);

    let (status, body) = app
        .get_json("/secrets/export?partner_id=acme&secret_name=api-token")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["partner_id"], "acme");
    assert_eq!(body["secret_name"], "api-token");

    let encrypted = body["encrypted_secret"].as_str().unwrap();
    assert!(!encrypted.contains("hunter2"));
    let acme = FakePgpEngine::partner_keypair("acme");
    assert_eq!(app.engine.decrypt(&acme.private_key, encrypted).unwrap(), "hunter2");
}

#[tokio::test]
async fn reimport_overwrites_the_secret() {
    let app = TestApp::new();
    register_acme(&app).await;
    assert_eq!(import(&app, "api-token", "first").await, StatusCode::ACCEPTED);
    assert_eq!(import(&app, "api-token", "second").await, StatusCode::ACCEPTED);

    let (_, body) = app
        .get_json("/secrets/export?partner_id=acme&secret_name=api-token")
        .await;
    let acme = FakePgpEngine::partner_keypair("acme");
    let plaintext = app
        .engine
        .decrypt(&acme.private_key, body["encrypted_secret"].as_str().unwrap())
        .unwrap();
    assert_eq!(plaintext, "second");
}

#[tokio::test]
async fn secret_names_are_sanitized() {
    let app = TestApp::new();
    register_acme(&app).await;
    assert_eq!(import(&app, "api_token", "hunter2").await, StatusCode::ACCEPTED);

    let (status, body) = app
        .get_json("/secrets/export?partner_id=acme&secret_name=apitoken")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["secret_name"], "apitoken");

    let ciphertext = app.encrypt_for_platform("x").await;
    let (status, body) = app
        .send_json(
            "POST",
            "/secrets/import",
            &json!({ "partner_id": "acme", "secret_name": "api token!", "secret": ciphertext }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid secret format");
}

#[tokio::test]
async fn export_reports_missing_key_and_missing_secret_separately() {
    let app = TestApp::new();
    assert_eq!(import(&app, "api-token", "hunter2").await, StatusCode::ACCEPTED);

    let (status, body) = app
        .get_json("/secrets/export?partner_id=acme&secret_name=api-token")
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Partner public key not found");

    register_acme(&app).await;
    let (status, body) = app
        .get_json("/secrets/export?partner_id=acme&secret_name=db-password")
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Secret not found");
}

#[tokio::test]
async fn undecryptable_secret_is_a_processing_failure() {
    let app = TestApp::new();
    app.encrypt_for_platform("warm up").await;

    let foreign = app
        .engine
        .encrypt(&FakePgpEngine::partner_keypair("someone-else").public_key, "hunter2")
        .unwrap();
    let (status, body) = app
        .send_json(
            "POST",
            "/secrets/import",
            &json!({ "partner_id": "acme", "secret_name": "api-token", "secret": foreign }),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "message": "Failed to process secret" }));
}

#[tokio::test]
async fn store_write_failure_is_a_processing_failure() {
    let app = TestApp::with_store(|store| Arc::new(RejectSecretWrites(store)) as Arc<dyn SecretStore>);

    let ciphertext = app.encrypt_for_platform("hunter2").await;
    let (status, body) = app
        .send_json(
            "POST",
            "/secrets/import",
            &json!({ "partner_id": "acme", "secret_name": "api-token", "secret": ciphertext }),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "message": "Failed to process secret" }));
    assert!(app
        .store
        .get("dev-loyaltyhub-module-secretsharing-partner-acme-secret-api-token")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn export_partner_id_is_matched_exactly() {
    let app = TestApp::new();
    register_acme(&app).await;
    assert_eq!(import(&app, "api-token", "hunter2").await, StatusCode::ACCEPTED);

    let (status, body) = app
        .get_json("/secrets/export?partner_id=%20acme%20&secret_name=api-token")
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Unauthorized partner_id");
}
