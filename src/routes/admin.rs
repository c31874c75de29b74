// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Privileged user-management routes (admin only).
//!
//! These are the operations the original deployment ran as callable
//! functions; the admin middleware in routes/mod.rs gates the lot.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{AccountRecord, PublicProfile, UserProfile, UserRole};
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/users", get(list_users))
        .route("/admin/users", post(create_user))
        .route("/admin/users/{uid}", delete(delete_user))
        .route("/admin/users/{uid}/role", put(set_role))
}

// ─── User Listing ────────────────────────────────────────────

#[derive(Serialize)]
pub struct UsersResponse {
    pub users: Vec<AccountRecord>,
}

/// List all accounts with their role claims, merged with profile
/// documents and sorted by email.
///
/// A failed profile read for one user must not sink the whole listing;
/// provider data wins where both exist.
async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(_admin): Extension<AuthUser>,
) -> Result<Json<UsersResponse>> {
    const MAX_CONCURRENT_PROFILE_READS: usize = 16;

    let accounts = state.identity.list_users().await?;

    let mut users: Vec<AccountRecord> = stream::iter(accounts)
        .map(|mut account| {
            let db = state.db.clone();
            async move {
                match db.get_user_profile(&account.uid).await {
                    Ok(Some(profile)) => {
                        if account.phone_number.is_none() {
                            account.phone_number = profile.phone_number;
                        }
                        if account.email.is_none() {
                            account.email = profile.email;
                        }
                        if account.display_name.is_none() {
                            account.display_name = profile.display_name;
                        }
                        if account.created_at.is_none() {
                            account.created_at = Some(profile.created_at);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(uid = %account.uid, error = %e, "Failed to read profile for listing");
                    }
                }
                account
            }
        })
        .buffer_unordered(MAX_CONCURRENT_PROFILE_READS)
        .collect()
        .await;

    users.sort_by(|a, b| {
        a.email
            .as_deref()
            .unwrap_or("")
            .cmp(b.email.as_deref().unwrap_or(""))
    });

    Ok(Json(UsersResponse { users }))
}

// ─── User Creation ───────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserRequest {
    phone_number: String,
    display_name: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CreateUserResponse {
    pub success: bool,
    pub message: String,
    pub uid: String,
}

/// Create an unverified account with the default `user` role and both
/// profile documents.
async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthUser>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<CreateUserResponse>> {
    let phone = payload.phone_number.trim();
    if phone.is_empty() {
        return Err(AppError::BadRequest("Phone number is required".to_string()));
    }
    let display_name = payload.display_name.trim();
    if display_name.is_empty() {
        return Err(AppError::BadRequest("Display name is required".to_string()));
    }

    // Duplicate phone surfaces from the provider as `already_exists`.
    let account = state.identity.create_user(phone, display_name).await?;

    let now = chrono::Utc::now().to_rfc3339();
    state
        .db
        .upsert_user_profile(&UserProfile {
            uid: account.uid.clone(),
            phone_number: Some(phone.to_string()),
            email: None,
            display_name: Some(display_name.to_string()),
            created_at: now.clone(),
            updated_at: now,
        })
        .await?;
    state
        .db
        .upsert_public_profile(&PublicProfile {
            uid: account.uid.clone(),
            display_name: display_name.to_string(),
        })
        .await?;

    tracing::info!(
        admin = %admin.uid,
        uid = %account.uid,
        "Admin created user"
    );

    Ok(Json(CreateUserResponse {
        success: true,
        message: format!("Successfully created user {}", display_name),
        uid: account.uid,
    }))
}

// ─── User Deletion ───────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AdminActionResponse {
    pub success: bool,
    pub message: String,
}

/// Delete an account along with both profile documents.
///
/// Admins cannot delete themselves; the check runs before any remote
/// call so the rejection is unconditional.
async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthUser>,
    Path(uid): Path<String>,
) -> Result<Json<AdminActionResponse>> {
    if uid == admin.uid {
        return Err(AppError::FailedPrecondition(
            "You cannot delete your own account".to_string(),
        ));
    }

    if state.identity.lookup(&uid).await?.is_none() {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    // Profile documents first, then the provider account, so a partial
    // failure leaves a deletable account rather than orphaned documents.
    state.db.delete_user_profile(&uid).await?;
    state.db.delete_public_profile(&uid).await?;
    state.identity.delete_user(&uid).await?;

    tracing::info!(admin = %admin.uid, uid = %uid, "Admin deleted user");

    Ok(Json(AdminActionResponse {
        success: true,
        message: format!("Successfully deleted user {}", uid),
    }))
}

// ─── Role Assignment ─────────────────────────────────────────

#[derive(Deserialize)]
struct SetRoleRequest {
    role: String,
}

/// Set the role claim on an account. Takes effect at the next session
/// issuance (the role travels in the signed session token).
async fn set_role(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthUser>,
    Path(uid): Path<String>,
    Json(payload): Json<SetRoleRequest>,
) -> Result<Json<AdminActionResponse>> {
    let role = UserRole::parse(&payload.role).ok_or_else(|| {
        AppError::BadRequest("Role must be one of: admin, leader, user".to_string())
    })?;

    state.identity.set_role(&uid, role).await?;

    tracing::info!(
        admin = %admin.uid,
        uid = %uid,
        role = role.as_str(),
        "Admin set user role"
    );

    Ok(Json(AdminActionResponse {
        success: true,
        message: format!("Successfully set role \"{}\" for user {}", role.as_str(), uid),
    }))
}
