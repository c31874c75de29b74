// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{BibleStudyGroup, Leader, MeetingTime, RolePermissions, UserRole};
use crate::services::GroupDraft;
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/groups", get(list_groups))
        .route("/api/groups", post(create_group))
        .route("/api/groups/{id}", put(update_group))
        .route("/api/groups/{id}", delete(delete_group))
        .route("/api/groups/{id}/join", post(join_group))
        .route("/api/groups/{id}/leave", post(leave_group))
}

// ─── User Profile ────────────────────────────────────────────

/// Current user response.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub uid: String,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    /// From the session token claim, not the profile document
    pub role: UserRole,
    pub permissions: RolePermissions,
}

/// Get current user profile. Role and permissions come from the
/// session claim; the profile document only fills in contact data.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserResponse>> {
    let profile = state.db.get_user_profile(&user.uid).await?;

    let (phone_number, email, display_name) = match profile {
        Some(p) => (p.phone_number, p.email, p.display_name),
        None => (None, None, None),
    };

    Ok(Json(UserResponse {
        uid: user.uid,
        phone_number,
        email,
        display_name,
        role: user.role,
        permissions: user.role.permissions(),
    }))
}

// ─── Groups ──────────────────────────────────────────────────

#[derive(Serialize)]
pub struct GroupsResponse {
    pub groups: Vec<BibleStudyGroup>,
}

/// List all bible study groups, name ascending.
async fn list_groups(
    State(state): State<Arc<AppState>>,
    Extension(_user): Extension<AuthUser>,
) -> Result<Json<GroupsResponse>> {
    let groups = state.groups.list().await?;
    Ok(Json(GroupsResponse { groups }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupRequest {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    leaders: Vec<Leader>,
    #[serde(default)]
    meeting_times: Vec<MeetingTime>,
}

impl GroupRequest {
    /// Validation happens before any store call.
    fn into_draft(self) -> Result<GroupDraft> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::BadRequest("Group name is required".to_string()));
        }

        if self.meeting_times.is_empty() {
            return Err(AppError::BadRequest(
                "At least one meeting time is required".to_string(),
            ));
        }
        if let Some(bad) = self.meeting_times.iter().find(|mt| !mt.is_valid()) {
            return Err(AppError::BadRequest(format!(
                "Invalid meeting time: hour {} minute {}",
                bad.hour, bad.minute
            )));
        }

        Ok(GroupDraft {
            name,
            description: self.description.trim().to_string(),
            location: self.location.trim().to_string(),
            leaders: self.leaders,
            meeting_times: self.meeting_times,
        })
    }
}

/// Create a bible study group (leaders and admins only).
async fn create_group(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<GroupRequest>,
) -> Result<Json<BibleStudyGroup>> {
    if !user.role.permissions().can_create_groups {
        return Err(AppError::PermissionDenied(
            "Only leaders and admins can create bible study groups".to_string(),
        ));
    }

    let group = state.groups.create(payload.into_draft()?).await?;
    Ok(Json(group))
}

/// Update a bible study group (leaders and admins only).
async fn update_group(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(payload): Json<GroupRequest>,
) -> Result<Json<BibleStudyGroup>> {
    if !user.role.permissions().can_update_groups {
        return Err(AppError::PermissionDenied(
            "Only leaders and admins can update bible study groups".to_string(),
        ));
    }

    let group = state.groups.update(&id, payload.into_draft()?).await?;
    Ok(Json(group))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DeleteGroupResponse {
    pub success: bool,
}

/// Delete a bible study group (leaders and admins only).
async fn delete_group(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<DeleteGroupResponse>> {
    if !user.role.permissions().can_delete_groups {
        return Err(AppError::PermissionDenied(
            "Only leaders and admins can delete bible study groups".to_string(),
        ));
    }

    state.groups.delete(&id).await?;
    Ok(Json(DeleteGroupResponse { success: true }))
}

// ─── Membership ──────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MembershipResponse {
    /// Whether this call changed the member list (repeat joins and
    /// leaves of a non-member are no-ops)
    pub changed: bool,
}

/// Join a group (any authenticated user, self-service).
async fn join_group(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<MembershipResponse>> {
    let changed = state.groups.join(&id, &user.uid).await?;
    Ok(Json(MembershipResponse { changed }))
}

/// Leave a group (any authenticated user, self-service).
async fn leave_group(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<MembershipResponse>> {
    let changed = state.groups.leave(&id, &user.uid).await?;
    Ok(Json(MembershipResponse { changed }))
}
