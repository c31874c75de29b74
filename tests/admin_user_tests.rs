// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Admin user-management tests: creation, deletion (including the
//! self-delete guard) and role assignment.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use tower::ServiceExt;
use youth_scc_api::error::AppError;
use youth_scc_api::middleware::auth::create_session_jwt;
use youth_scc_api::models::UserRole;
use youth_scc_api::services::IdentityService;

mod common;

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn created_user_has_default_role_and_contact_data() {
    let identity = IdentityService::new_mock();

    let account = identity
        .create_user("+15551234567", "Jane Doe")
        .await
        .unwrap();

    assert_eq!(account.role, UserRole::User);
    assert_eq!(account.phone_number.as_deref(), Some("+15551234567"));
    assert_eq!(account.display_name.as_deref(), Some("Jane Doe"));

    // Visible through lookup and the listing.
    let found = identity.lookup(&account.uid).await.unwrap().unwrap();
    assert_eq!(found.uid, account.uid);
    assert_eq!(identity.list_users().await.unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_phone_number_is_rejected() {
    let identity = IdentityService::new_mock();

    identity
        .create_user("+15551234567", "Jane Doe")
        .await
        .unwrap();
    let err = identity
        .create_user("+15551234567", "John Doe")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::AlreadyExists(msg)
        if msg == "Phone number already exists"));
}

#[tokio::test]
async fn deleted_user_disappears() {
    let identity = IdentityService::new_mock();

    let account = identity
        .create_user("+15551234567", "Jane Doe")
        .await
        .unwrap();
    identity.delete_user(&account.uid).await.unwrap();

    assert!(identity.lookup(&account.uid).await.unwrap().is_none());
    assert!(identity.list_users().await.unwrap().is_empty());

    // Deleting again reports not-found.
    let err = identity.delete_user(&account.uid).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn role_changes_stick() {
    let identity = IdentityService::new_mock();

    let account = identity
        .create_user("+15551234567", "Jane Doe")
        .await
        .unwrap();

    identity
        .set_role(&account.uid, UserRole::Leader)
        .await
        .unwrap();
    let found = identity.lookup(&account.uid).await.unwrap().unwrap();
    assert_eq!(found.role, UserRole::Leader);
}

#[tokio::test]
async fn admin_cannot_delete_own_account() {
    let (app, state, _) = common::create_test_app();
    let token =
        create_session_jwt("admin-1", UserRole::Admin, &state.config.jwt_signing_key).unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/admin/users/admin-1")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Rejected before any provider or database call.
    assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);

    let body = json_body(response).await;
    assert_eq!(body["error"], "failed_precondition");
    assert_eq!(body["details"], "You cannot delete your own account");
}

#[tokio::test]
async fn deleting_unknown_user_is_not_found() {
    let (app, state, _) = common::create_test_app();
    let token =
        create_session_jwt("admin-1", UserRole::Admin, &state.config.jwt_signing_key).unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/admin/users/no-such-uid")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn set_role_route_validates_the_role() {
    let (app, state, _) = common::create_test_app();

    let account = state
        .identity
        .create_user("+15551234567", "Jane Doe")
        .await
        .unwrap();

    let token =
        create_session_jwt("admin-1", UserRole::Admin, &state.config.jwt_signing_key).unwrap();

    let bad = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("/admin/users/{}/role", account.uid))
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::json!({ "role": "superadmin" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

    let good = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("/admin/users/{}/role", account.uid))
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::json!({ "role": "leader" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(good.status(), StatusCode::OK);

    let updated = state.identity.lookup(&account.uid).await.unwrap().unwrap();
    assert_eq!(updated.role, UserRole::Leader);
}

#[tokio::test]
async fn admin_create_and_delete_user_end_to_end() {
    require_emulator!();
    let (app, state, _) = common::create_emulator_app().await;
    let token =
        create_session_jwt("admin-1", UserRole::Admin, &state.config.jwt_signing_key).unwrap();

    // Create: account plus both profile documents.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/users")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "phoneNumber": "+15551234567",
                        "displayName": "Jane Doe",
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let uid = body["uid"].as_str().unwrap().to_string();

    let profile = state.db.get_user_profile(&uid).await.unwrap().unwrap();
    assert_eq!(profile.display_name.as_deref(), Some("Jane Doe"));
    let public = state.db.get_public_profile(&uid).await.unwrap().unwrap();
    assert_eq!(public.display_name, "Jane Doe");

    // Delete: both documents and the account go away.
    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/admin/users/{}", uid))
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert!(state.db.get_user_profile(&uid).await.unwrap().is_none());
    assert!(state.db.get_public_profile(&uid).await.unwrap().is_none());
    assert!(state.identity.lookup(&uid).await.unwrap().is_none());
}
