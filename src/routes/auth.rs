// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authentication routes: email/password sessions and the phone
//! sign-in wizard.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::error::{AppError, Result};
use crate::middleware::auth::create_session_jwt;
use crate::models::{PublicProfile, UserProfile, UserRole};
use crate::services::SignInStep;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/phone", post(phone_start))
        .route("/auth/phone/verify", post(phone_verify))
        .route("/auth/phone/name", post(phone_name))
        .route("/auth/phone/back", post(phone_back))
}

/// Session issued after a completed sign-in.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SessionResponse {
    pub token: String,
    pub uid: String,
    pub role: UserRole,
}

// ─── Email / Password ────────────────────────────────────────────

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct SignupRequest {
    #[validate(email(message = "Invalid email address"))]
    email: String,
    #[validate(length(min = 6, message = "Password should be at least 6 characters"))]
    password: String,
    #[serde(default)]
    display_name: Option<String>,
}

/// Create an email/password account and issue a session.
async fn signup(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SignupRequest>,
) -> Result<Json<SessionResponse>> {
    validate_payload(&payload)?;

    let account = state
        .identity
        .sign_up(
            &payload.email,
            &payload.password,
            payload.display_name.as_deref(),
        )
        .await?;

    // Profile documents are convenience data; a failed write must not
    // strand a freshly created account, so sign-in proceeds regardless.
    let now = chrono::Utc::now().to_rfc3339();
    let profile = UserProfile {
        uid: account.uid.clone(),
        phone_number: None,
        email: Some(payload.email.clone()),
        display_name: payload.display_name.clone(),
        created_at: now.clone(),
        updated_at: now,
    };
    if let Err(e) = state.db.upsert_user_profile(&profile).await {
        tracing::warn!(uid = %account.uid, error = %e, "Failed to create user profile");
    }
    if let Some(name) = &payload.display_name {
        let public = PublicProfile {
            uid: account.uid.clone(),
            display_name: name.clone(),
        };
        if let Err(e) = state.db.upsert_public_profile(&public).await {
            tracing::warn!(uid = %account.uid, error = %e, "Failed to create public profile");
        }
    }

    let token = create_session_jwt(&account.uid, account.role, &state.config.jwt_signing_key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;

    tracing::info!(uid = %account.uid, "Account created");

    Ok(Json(SessionResponse {
        token,
        uid: account.uid,
        role: account.role,
    }))
}

#[derive(Deserialize, Validate)]
struct LoginRequest {
    #[validate(email(message = "Invalid email address"))]
    email: String,
    password: String,
}

/// Verify email/password credentials and issue a session.
async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<SessionResponse>> {
    validate_payload(&payload)?;

    let account = state
        .identity
        .sign_in(&payload.email, &payload.password)
        .await?;

    let token = create_session_jwt(&account.uid, account.role, &state.config.jwt_signing_key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;

    tracing::info!(uid = %account.uid, "Signed in");

    Ok(Json(SessionResponse {
        token,
        uid: account.uid,
        role: account.role,
    }))
}

// ─── Phone Sign-In Wizard ────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PhoneStartRequest {
    phone_number: String,
}

/// Wizard progress reported back to the client.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct FlowResponse {
    pub flow_id: String,
    pub step: SignInStep,
}

/// Start the wizard: send a verification code to the phone.
async fn phone_start(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PhoneStartRequest>,
) -> Result<Json<FlowResponse>> {
    let phone = payload.phone_number.trim();
    if !is_e164(phone) {
        return Err(AppError::BadRequest(
            "Phone number must be in international format, e.g. +15551234567".to_string(),
        ));
    }

    let flow_id = state.verification.start(phone).await?;

    Ok(Json(FlowResponse {
        flow_id,
        step: SignInStep::PhoneVerification,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PhoneVerifyRequest {
    flow_id: String,
    code: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct VerifyResponse {
    pub step: SignInStep,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

/// Redeem the 6-digit code. Returning identities get a session
/// immediately; first-timers are sent to the name step.
async fn phone_verify(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PhoneVerifyRequest>,
) -> Result<Json<VerifyResponse>> {
    let code = payload.code.trim();
    if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::BadRequest(
            "Please enter a valid 6-digit code".to_string(),
        ));
    }

    let phone = state.verification.redeem(&payload.flow_id, code)?;

    // Reconcile the verified phone with the identity provider.
    let account = match state.identity.find_by_phone(&phone).await? {
        Some(account) => account,
        None => state.identity.create_phone_account(&phone).await?,
    };

    let has_name = account
        .display_name
        .as_deref()
        .is_some_and(|n| !n.trim().is_empty());

    let step = state
        .verification
        .advance_verified(&payload.flow_id, &account.uid, account.role, has_name)?;

    if step == SignInStep::Complete {
        let token = create_session_jwt(&account.uid, account.role, &state.config.jwt_signing_key)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;
        state.verification.finish(&payload.flow_id);

        tracing::info!(uid = %account.uid, "Phone sign-in complete");

        return Ok(Json(VerifyResponse {
            step,
            token: Some(token),
            uid: Some(account.uid),
        }));
    }

    Ok(Json(VerifyResponse {
        step,
        token: None,
        uid: None,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PhoneNameRequest {
    flow_id: String,
    display_name: String,
}

/// Accept the first-time display name, persist it everywhere, and
/// issue the session.
async fn phone_name(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PhoneNameRequest>,
) -> Result<Json<VerifyResponse>> {
    let (uid, role) = state
        .verification
        .submit_name(&payload.flow_id, &payload.display_name)?;
    let name = payload.display_name.trim().to_string();

    // Persist to the provider account, the private profile and the
    // public projection. Any failure leaves the flow on the name step
    // so the user can retry.
    state.identity.set_display_name(&uid, &name).await?;

    let account = state
        .identity
        .lookup(&uid)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let now = chrono::Utc::now().to_rfc3339();
    let profile = UserProfile {
        uid: uid.clone(),
        phone_number: account.phone_number.clone(),
        email: None,
        display_name: Some(name.clone()),
        created_at: now.clone(),
        updated_at: now,
    };
    state.db.upsert_user_profile(&profile).await?;
    state
        .db
        .upsert_public_profile(&PublicProfile {
            uid: uid.clone(),
            display_name: name,
        })
        .await?;

    let token = create_session_jwt(&uid, role, &state.config.jwt_signing_key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;
    state.verification.finish(&payload.flow_id);

    tracing::info!(uid = %uid, "First-time phone sign-up complete");

    Ok(Json(VerifyResponse {
        step: SignInStep::Complete,
        token: Some(token),
        uid: Some(uid),
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PhoneBackRequest {
    flow_id: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct StepResponse {
    pub step: SignInStep,
}

/// Step the wizard backwards.
async fn phone_back(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PhoneBackRequest>,
) -> Result<Json<StepResponse>> {
    let step = state.verification.back(&payload.flow_id)?;
    Ok(Json(StepResponse { step }))
}

// ─── Helpers ─────────────────────────────────────────────────────

/// Collapse validator errors into the first message.
fn validate_payload<T: Validate>(payload: &T) -> Result<()> {
    payload.validate().map_err(|errors| {
        let message = errors
            .field_errors()
            .values()
            .flat_map(|errs| errs.iter())
            .filter_map(|err| err.message.as_ref())
            .next()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "Invalid request".to_string());
        AppError::BadRequest(message)
    })
}

/// E.164 shape: leading `+`, 8-15 digits, no separators.
fn is_e164(phone: &str) -> bool {
    let Some(digits) = phone.strip_prefix('+') else {
        return false;
    };
    (8..=15).contains(&digits.len())
        && digits.chars().all(|c| c.is_ascii_digit())
        && !digits.starts_with('0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn e164_validation() {
        assert!(is_e164("+15551234567"));
        assert!(is_e164("+4479460000"));

        assert!(!is_e164("15551234567")); // missing +
        assert!(!is_e164("+1555")); // too short
        assert!(!is_e164("+1 555 123 4567")); // separators
        assert!(!is_e164("+05551234567")); // leading zero
        assert!(!is_e164(""));
    }

    #[test]
    fn signup_password_rule() {
        let short = SignupRequest {
            email: "a@b.com".to_string(),
            password: "12345".to_string(),
            display_name: None,
        };
        let err = validate_payload(&short).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg)
            if msg == "Password should be at least 6 characters"));

        let ok = SignupRequest {
            email: "a@b.com".to_string(),
            password: "123456".to_string(),
            display_name: Some("Jane Doe".to_string()),
        };
        assert!(validate_payload(&ok).is_ok());
    }

    #[test]
    fn signup_email_rule() {
        let bad = SignupRequest {
            email: "not-an-email".to_string(),
            password: "123456".to_string(),
            display_name: None,
        };
        let err = validate_payload(&bad).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg == "Invalid email address"));
    }
}
