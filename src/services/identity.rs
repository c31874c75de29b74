// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity provider client (Google Identity Platform).
//!
//! Handles:
//! - Email/password sign-up and sign-in (public API-key endpoints)
//! - Privileged account operations: lookup, create, delete, role claims
//!   (service-account bearer token from the metadata server)
//! - Mapping provider error codes to fixed user-facing messages
//!
//! An in-memory mock backend serves tests and offline development.

use crate::error::AppError;
use crate::models::{AccountRecord, UserRole};
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

const IDENTITY_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
/// Refresh the service-account token this long before it expires.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

/// Identity provider client.
pub struct IdentityService {
    backend: Backend,
}

enum Backend {
    Live(LiveIdentity),
    Mock(MockIdentity),
}

struct LiveIdentity {
    http: reqwest::Client,
    api_key: String,
    project_id: String,
    token_cache: RwLock<Option<CachedToken>>,
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Default)]
struct MockIdentity {
    accounts: DashMap<String, MockAccount>,
    next_uid: AtomicU64,
}

#[derive(Clone)]
struct MockAccount {
    record: AccountRecord,
    password: Option<String>,
}

impl IdentityService {
    /// Create a client for the real identity provider.
    pub fn new(api_key: &str, project_id: &str) -> Self {
        Self {
            backend: Backend::Live(LiveIdentity {
                http: reqwest::Client::new(),
                api_key: api_key.to_string(),
                project_id: project_id.to_string(),
                token_cache: RwLock::new(None),
            }),
        }
    }

    /// Create an in-memory mock backend (tests / offline development).
    pub fn new_mock() -> Self {
        Self {
            backend: Backend::Mock(MockIdentity::default()),
        }
    }

    // ─── Email/Password Authentication ───────────────────────────

    /// Create a new email/password account. Default role is `user`.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<AccountRecord, AppError> {
        match &self.backend {
            Backend::Live(live) => {
                let body = serde_json::json!({
                    "email": email,
                    "password": password,
                    "returnSecureToken": true,
                });
                let response: SignUpResponse = live
                    .post_with_key("accounts:signUp", &body)
                    .await?;

                if let Some(name) = display_name {
                    live.admin_update(
                        &response.local_id,
                        serde_json::json!({ "displayName": name }),
                    )
                    .await?;
                }

                Ok(AccountRecord {
                    uid: response.local_id,
                    phone_number: None,
                    email: Some(email.to_string()),
                    display_name: display_name.map(String::from),
                    role: UserRole::User,
                    created_at: Some(chrono::Utc::now().to_rfc3339()),
                })
            }
            Backend::Mock(mock) => {
                let exists = mock
                    .accounts
                    .iter()
                    .any(|entry| entry.value().record.email.as_deref() == Some(email));
                if exists {
                    return Err(AppError::Provider(
                        auth_error_message("EMAIL_EXISTS").to_string(),
                    ));
                }

                let record = AccountRecord {
                    uid: mock.fresh_uid(),
                    phone_number: None,
                    email: Some(email.to_string()),
                    display_name: display_name.map(String::from),
                    role: UserRole::User,
                    created_at: Some(chrono::Utc::now().to_rfc3339()),
                };
                mock.accounts.insert(
                    record.uid.clone(),
                    MockAccount {
                        record: record.clone(),
                        password: Some(password.to_string()),
                    },
                );
                Ok(record)
            }
        }
    }

    /// Verify email/password credentials and return the account.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AccountRecord, AppError> {
        match &self.backend {
            Backend::Live(live) => {
                let body = serde_json::json!({
                    "email": email,
                    "password": password,
                    "returnSecureToken": true,
                });
                let response: SignUpResponse = live
                    .post_with_key("accounts:signInWithPassword", &body)
                    .await?;

                // Look up the full record so the role claim is fresh.
                self.lookup(&response.local_id).await?.ok_or_else(|| {
                    AppError::Provider(auth_error_message("EMAIL_NOT_FOUND").to_string())
                })
            }
            Backend::Mock(mock) => {
                let account = mock
                    .accounts
                    .iter()
                    .find(|entry| entry.value().record.email.as_deref() == Some(email))
                    .map(|entry| entry.value().clone());

                match account {
                    None => Err(AppError::Provider(
                        auth_error_message("EMAIL_NOT_FOUND").to_string(),
                    )),
                    Some(acct) if acct.password.as_deref() != Some(password) => Err(
                        AppError::Provider(auth_error_message("INVALID_PASSWORD").to_string()),
                    ),
                    Some(acct) => Ok(acct.record),
                }
            }
        }
    }

    // ─── Account Lookup ──────────────────────────────────────────

    /// Look up an account by uid.
    pub async fn lookup(&self, uid: &str) -> Result<Option<AccountRecord>, AppError> {
        match &self.backend {
            Backend::Live(live) => {
                let body = serde_json::json!({ "localId": [uid] });
                let response: LookupResponse = live.admin_post("accounts:lookup", &body).await?;
                Ok(response
                    .users
                    .unwrap_or_default()
                    .into_iter()
                    .next()
                    .map(AccountRecord::from))
            }
            Backend::Mock(mock) => Ok(mock
                .accounts
                .get(uid)
                .map(|entry| entry.value().record.clone())),
        }
    }

    /// Look up an account by verified phone number.
    pub async fn find_by_phone(&self, phone: &str) -> Result<Option<AccountRecord>, AppError> {
        match &self.backend {
            Backend::Live(live) => {
                let body = serde_json::json!({ "phoneNumber": [phone] });
                let response: LookupResponse = live.admin_post("accounts:lookup", &body).await?;
                Ok(response
                    .users
                    .unwrap_or_default()
                    .into_iter()
                    .next()
                    .map(AccountRecord::from))
            }
            Backend::Mock(mock) => Ok(mock
                .accounts
                .iter()
                .find(|entry| entry.value().record.phone_number.as_deref() == Some(phone))
                .map(|entry| entry.value().record.clone())),
        }
    }

    // ─── Privileged Account Operations ───────────────────────────

    /// Create an account for a verified phone number with no display
    /// name yet (OTP first-time sign-in). Default role is `user`.
    pub async fn create_phone_account(&self, phone: &str) -> Result<AccountRecord, AppError> {
        match &self.backend {
            Backend::Live(live) => {
                let body = serde_json::json!({ "phoneNumber": phone });
                let response: SignUpResponse = live.admin_post("accounts", &body).await?;
                Ok(AccountRecord {
                    uid: response.local_id,
                    phone_number: Some(phone.to_string()),
                    email: None,
                    display_name: None,
                    role: UserRole::User,
                    created_at: Some(chrono::Utc::now().to_rfc3339()),
                })
            }
            Backend::Mock(mock) => {
                let record = AccountRecord {
                    uid: mock.fresh_uid(),
                    phone_number: Some(phone.to_string()),
                    email: None,
                    display_name: None,
                    role: UserRole::User,
                    created_at: Some(chrono::Utc::now().to_rfc3339()),
                };
                mock.accounts.insert(
                    record.uid.clone(),
                    MockAccount {
                        record: record.clone(),
                        password: None,
                    },
                );
                Ok(record)
            }
        }
    }

    /// Admin operation: create an unverified account with phone number
    /// and display name. Default role is `user`.
    pub async fn create_user(
        &self,
        phone: &str,
        display_name: &str,
    ) -> Result<AccountRecord, AppError> {
        match &self.backend {
            Backend::Live(live) => {
                let body = serde_json::json!({
                    "phoneNumber": phone,
                    "displayName": display_name,
                });
                let response: SignUpResponse = live.admin_post("accounts", &body).await?;
                Ok(AccountRecord {
                    uid: response.local_id,
                    phone_number: Some(phone.to_string()),
                    email: None,
                    display_name: Some(display_name.to_string()),
                    role: UserRole::User,
                    created_at: Some(chrono::Utc::now().to_rfc3339()),
                })
            }
            Backend::Mock(mock) => {
                let duplicate = mock
                    .accounts
                    .iter()
                    .any(|entry| entry.value().record.phone_number.as_deref() == Some(phone));
                if duplicate {
                    return Err(AppError::AlreadyExists(
                        "Phone number already exists".to_string(),
                    ));
                }

                let record = AccountRecord {
                    uid: mock.fresh_uid(),
                    phone_number: Some(phone.to_string()),
                    email: None,
                    display_name: Some(display_name.to_string()),
                    role: UserRole::User,
                    created_at: Some(chrono::Utc::now().to_rfc3339()),
                };
                mock.accounts.insert(
                    record.uid.clone(),
                    MockAccount {
                        record: record.clone(),
                        password: None,
                    },
                );
                Ok(record)
            }
        }
    }

    /// Admin operation: delete an account.
    pub async fn delete_user(&self, uid: &str) -> Result<(), AppError> {
        match &self.backend {
            Backend::Live(live) => {
                let body = serde_json::json!({ "localId": uid });
                let _: serde_json::Value = live.admin_post("accounts:delete", &body).await?;
                Ok(())
            }
            Backend::Mock(mock) => {
                if mock.accounts.remove(uid).is_none() {
                    return Err(AppError::NotFound("User not found".to_string()));
                }
                Ok(())
            }
        }
    }

    /// Admin operation: set the role claim on an account.
    pub async fn set_role(&self, uid: &str, role: UserRole) -> Result<(), AppError> {
        match &self.backend {
            Backend::Live(live) => {
                let claims = serde_json::json!({ "role": role.as_str() }).to_string();
                live.admin_update(uid, serde_json::json!({ "customAttributes": claims }))
                    .await
            }
            Backend::Mock(mock) => {
                let mut account = mock
                    .accounts
                    .get_mut(uid)
                    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
                account.record.role = role;
                Ok(())
            }
        }
    }

    /// Set the display name on an account (OTP name step).
    pub async fn set_display_name(&self, uid: &str, name: &str) -> Result<(), AppError> {
        match &self.backend {
            Backend::Live(live) => {
                live.admin_update(uid, serde_json::json!({ "displayName": name }))
                    .await
            }
            Backend::Mock(mock) => {
                let mut account = mock
                    .accounts
                    .get_mut(uid)
                    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
                account.record.display_name = Some(name.to_string());
                Ok(())
            }
        }
    }

    /// Admin operation: list all accounts with their role claims.
    pub async fn list_users(&self) -> Result<Vec<AccountRecord>, AppError> {
        match &self.backend {
            Backend::Live(live) => {
                let response: BatchGetResponse = live
                    .admin_get("accounts:batchGet", &[("maxResults", "1000")])
                    .await?;
                Ok(response
                    .users
                    .unwrap_or_default()
                    .into_iter()
                    .map(AccountRecord::from)
                    .collect())
            }
            Backend::Mock(mock) => Ok(mock
                .accounts
                .iter()
                .map(|entry| entry.value().record.clone())
                .collect()),
        }
    }
}

impl MockIdentity {
    fn fresh_uid(&self) -> String {
        let n = self.next_uid.fetch_add(1, Ordering::Relaxed) + 1;
        format!("mock-uid-{}", n)
    }
}

impl LiveIdentity {
    /// POST to a public endpoint authenticated by API key.
    async fn post_with_key<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<T, AppError> {
        let url = format!("{}/{}?key={}", IDENTITY_BASE_URL, endpoint, self.api_key);

        let response = self.http.post(&url).json(body).send().await.map_err(|_| {
            AppError::Provider(auth_error_message("NETWORK_REQUEST_FAILED").to_string())
        })?;

        check_provider_response(response).await
    }

    /// POST to a privileged project-scoped endpoint with a bearer token.
    async fn admin_post<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<T, AppError> {
        let token = self.access_token().await?;
        let url = format!(
            "{}/projects/{}/{}",
            IDENTITY_BASE_URL, self.project_id, endpoint
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Identity provider request failed: {}", e))
            })?;

        check_provider_response(response).await
    }

    /// GET a privileged project-scoped endpoint with a bearer token.
    async fn admin_get<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<T, AppError> {
        let token = self.access_token().await?;
        let url = format!(
            "{}/projects/{}/{}",
            IDENTITY_BASE_URL, self.project_id, endpoint
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Identity provider request failed: {}", e))
            })?;

        check_provider_response(response).await
    }

    async fn admin_update(&self, uid: &str, mut fields: serde_json::Value) -> Result<(), AppError> {
        fields["localId"] = serde_json::Value::String(uid.to_string());
        let _: serde_json::Value = self.admin_post("accounts:update", &fields).await?;
        Ok(())
    }

    /// Fetch (and cache) a service-account access token.
    ///
    /// `GOOGLE_ACCESS_TOKEN` overrides the metadata server for local
    /// development outside GCP.
    async fn access_token(&self) -> Result<String, AppError> {
        if let Ok(token) = std::env::var("GOOGLE_ACCESS_TOKEN") {
            return Ok(token);
        }

        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.expires_at > chrono::Utc::now() {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let response = self
            .http
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Metadata token request failed: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(AppError::Internal(anyhow::anyhow!(
                "Metadata token request returned status {}",
                response.status()
            )));
        }

        let token: MetadataToken = response
            .json()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid metadata token JSON: {}", e)))?;

        let cached = CachedToken {
            access_token: token.access_token.clone(),
            expires_at: chrono::Utc::now()
                + chrono::Duration::seconds(token.expires_in - TOKEN_EXPIRY_MARGIN_SECS),
        };
        *self.token_cache.write().await = Some(cached);

        Ok(token.access_token)
    }
}

/// Parse a provider error body and map the code to an `AppError`.
async fn check_provider_response<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    if response.status().is_success() {
        return response.json().await.map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Invalid identity provider JSON: {}", e))
        });
    }

    let status = response.status();
    let body: serde_json::Value = response.json().await.unwrap_or_default();
    let code = body
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        // Codes like "WEAK_PASSWORD : Password should be..." carry a suffix.
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_string();

    tracing::warn!(status = %status, code = %code, "Identity provider error");

    if code == "PHONE_NUMBER_EXISTS" {
        return Err(AppError::AlreadyExists(
            "Phone number already exists".to_string(),
        ));
    }

    Err(AppError::Provider(auth_error_message(&code).to_string()))
}

/// Fixed user-facing message for a provider error code.
///
/// Codes are never surfaced raw; unknown codes collapse to a generic
/// message.
pub fn auth_error_message(code: &str) -> &'static str {
    match code {
        "INVALID_EMAIL" => "Invalid email address",
        "USER_DISABLED" => "This account has been disabled",
        "EMAIL_NOT_FOUND" => "No account found with this email",
        "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => "Incorrect password",
        "EMAIL_EXISTS" => "An account with this email already exists",
        "WEAK_PASSWORD" => "Password should be at least 6 characters",
        "INVALID_OOB_CODE" => "This link is invalid or has expired",
        "EXPIRED_OOB_CODE" => "This link has expired. Please request a new one",
        "TOO_MANY_ATTEMPTS_TRY_LATER" => "Too many attempts. Please try again later",
        "NETWORK_REQUEST_FAILED" => "Network error. Please check your connection",
        _ => "An error occurred. Please try again",
    }
}

// ─── Provider Wire Types ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    local_id: String,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    users: Option<Vec<ProviderUser>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchGetResponse {
    users: Option<Vec<ProviderUser>>,
}

/// Account record as returned by the provider's admin endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderUser {
    local_id: String,
    email: Option<String>,
    phone_number: Option<String>,
    display_name: Option<String>,
    /// JSON-encoded custom claims string, e.g. `{"role":"admin"}`
    custom_attributes: Option<String>,
    /// Creation time in epoch milliseconds (stringified)
    created_at: Option<String>,
}

impl From<ProviderUser> for AccountRecord {
    fn from(user: ProviderUser) -> Self {
        let role = user
            .custom_attributes
            .as_deref()
            .and_then(|raw| serde_json::from_str::<serde_json::Value>(raw).ok())
            .and_then(|claims| {
                claims
                    .get("role")
                    .and_then(|v| v.as_str())
                    .and_then(UserRole::parse)
            })
            .unwrap_or_default();

        let created_at = user.created_at.as_deref().and_then(|millis| {
            millis
                .parse::<i64>()
                .ok()
                .and_then(chrono::DateTime::from_timestamp_millis)
                .map(|dt| dt.to_rfc3339())
        });

        AccountRecord {
            uid: user.local_id,
            phone_number: user.phone_number,
            email: user.email,
            display_name: user.display_name,
            role,
            created_at,
        }
    }
}
