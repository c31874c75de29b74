// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Phone sign-in wizard: challenge issuance, code redemption and the
//! step machine driving the client through it.
//!
//! Flow: `phone` → `phone-verification` → (`name-input` for first-time
//! identities) → `complete`. Challenges store only an HMAC of the code;
//! a correct code redeems exactly once, a wrong code leaves the
//! challenge usable until it expires.

use crate::error::AppError;
use crate::models::UserRole;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// How long a delivered code stays redeemable.
const CODE_TTL_MINUTES: i64 = 10;
/// How long an abandoned flow lingers before lazy purging.
const FLOW_TTL_MINUTES: i64 = 30;
const FLOW_ID_BYTES: usize = 24;

/// Wizard step, serialized with the client-facing step names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(ts_rs::TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum SignInStep {
    #[serde(rename = "phone")]
    Phone,
    #[serde(rename = "phone-verification")]
    PhoneVerification,
    #[serde(rename = "name-input")]
    NameInput,
    #[serde(rename = "complete")]
    Complete,
}

/// Pending code challenge bound to one flow.
struct PhoneChallenge {
    code_mac: Vec<u8>,
    expires_at: chrono::DateTime<chrono::Utc>,
}

/// One sign-in attempt.
struct SignInFlow {
    step: SignInStep,
    phone_number: String,
    challenge: Option<PhoneChallenge>,
    verified_uid: Option<String>,
    verified_role: Option<UserRole>,
    expires_at: chrono::DateTime<chrono::Utc>,
}

/// Phone verification service. Flows are held in process memory; a
/// restart simply forces clients to restart the wizard.
pub struct VerificationService {
    flows: DashMap<String, SignInFlow>,
    sms: Arc<SmsSender>,
    mac_key: Vec<u8>,
    rng: SystemRandom,
}

impl VerificationService {
    pub fn new(sms: Arc<SmsSender>, mac_key: Vec<u8>) -> Self {
        Self {
            flows: DashMap::new(),
            sms,
            mac_key,
            rng: SystemRandom::new(),
        }
    }

    /// Start a flow: generate a code, deliver it, create the flow in
    /// `phone-verification`.
    ///
    /// Code delivery is the one non-idempotent step; a delivery failure
    /// creates no flow and is never retried without explicit user
    /// action.
    pub async fn start(&self, phone_number: &str) -> Result<String, AppError> {
        self.purge_expired();

        let code = self.generate_code()?;
        let body = format!("Your Youth SCC verification code is {}", code);
        self.sms.send(phone_number, &body).await?;

        let flow_id = self.generate_flow_id()?;
        let now = chrono::Utc::now();

        self.flows.insert(
            flow_id.clone(),
            SignInFlow {
                step: SignInStep::PhoneVerification,
                phone_number: phone_number.to_string(),
                challenge: Some(PhoneChallenge {
                    code_mac: self.code_mac(phone_number, &code),
                    expires_at: now + chrono::Duration::minutes(CODE_TTL_MINUTES),
                }),
                verified_uid: None,
                verified_role: None,
                expires_at: now + chrono::Duration::minutes(FLOW_TTL_MINUTES),
            },
        );

        tracing::info!(phone = %phone_number, "Verification code sent");
        Ok(flow_id)
    }

    /// Redeem a submitted code against the flow's challenge.
    ///
    /// Wrong code: `invalid_code`, challenge stays usable. Correct
    /// code: challenge consumed (a second submission fails), returns
    /// the verified phone number.
    pub fn redeem(&self, flow_id: &str, code: &str) -> Result<String, AppError> {
        let mut flow = self
            .flows
            .get_mut(flow_id)
            .ok_or_else(|| AppError::NotFound("Sign-in flow not found".to_string()))?;

        if flow.step != SignInStep::PhoneVerification {
            return Err(AppError::BadRequest(
                "No verification in progress for this flow".to_string(),
            ));
        }

        let challenge = flow.challenge.as_ref().ok_or_else(|| {
            AppError::BadRequest("Please request a new verification code".to_string())
        })?;

        if challenge.expires_at <= chrono::Utc::now() {
            return Err(AppError::ExpiredCode);
        }

        let submitted = self.code_mac(&flow.phone_number, code);
        if submitted.ct_eq(&challenge.code_mac).unwrap_u8() != 1 {
            return Err(AppError::InvalidCode);
        }

        // Exactly-once: the challenge is consumed on success.
        flow.challenge = None;
        Ok(flow.phone_number.clone())
    }

    /// Record the resolved identity after a successful redemption and
    /// advance the step: identities with a display name are done,
    /// first-timers go to `name-input`.
    pub fn advance_verified(
        &self,
        flow_id: &str,
        uid: &str,
        role: UserRole,
        has_display_name: bool,
    ) -> Result<SignInStep, AppError> {
        let mut flow = self
            .flows
            .get_mut(flow_id)
            .ok_or_else(|| AppError::NotFound("Sign-in flow not found".to_string()))?;

        flow.verified_uid = Some(uid.to_string());
        flow.verified_role = Some(role);
        flow.step = if has_display_name {
            SignInStep::Complete
        } else {
            SignInStep::NameInput
        };
        Ok(flow.step)
    }

    /// Validate and accept the display name for a first-time identity.
    /// Returns `(uid, role)` for session issuance.
    ///
    /// The flow stays on `name-input` until [`finish`](Self::finish) so
    /// a failed persistence step can be retried.
    pub fn submit_name(&self, flow_id: &str, name: &str) -> Result<(String, UserRole), AppError> {
        let flow = self
            .flows
            .get(flow_id)
            .ok_or_else(|| AppError::NotFound("Sign-in flow not found".to_string()))?;

        if flow.step != SignInStep::NameInput {
            return Err(AppError::BadRequest(
                "This flow is not waiting for a name".to_string(),
            ));
        }

        validate_display_name(name).map_err(|msg| AppError::BadRequest(msg.to_string()))?;

        let uid = flow
            .verified_uid
            .clone()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Flow missing verified identity")))?;
        let role = flow.verified_role.unwrap_or_default();

        Ok((uid, role))
    }

    /// Step backwards: `phone-verification` → `phone` discards the
    /// challenge; `name-input` → `phone-verification` clears the
    /// pending identity.
    pub fn back(&self, flow_id: &str) -> Result<SignInStep, AppError> {
        let mut flow = self
            .flows
            .get_mut(flow_id)
            .ok_or_else(|| AppError::NotFound("Sign-in flow not found".to_string()))?;

        flow.step = match flow.step {
            SignInStep::PhoneVerification => {
                flow.challenge = None;
                SignInStep::Phone
            }
            SignInStep::NameInput => {
                flow.verified_uid = None;
                flow.verified_role = None;
                SignInStep::PhoneVerification
            }
            step => {
                return Err(AppError::BadRequest(format!(
                    "Cannot go back from step {:?}",
                    step
                )))
            }
        };
        Ok(flow.step)
    }

    /// Current step for a flow, if it exists.
    pub fn step(&self, flow_id: &str) -> Option<SignInStep> {
        self.flows.get(flow_id).map(|flow| flow.step)
    }

    /// Drop a completed flow once the session token is issued.
    pub fn finish(&self, flow_id: &str) {
        self.flows.remove(flow_id);
    }

    fn purge_expired(&self) {
        let now = chrono::Utc::now();
        self.flows.retain(|_, flow| flow.expires_at > now);
    }

    fn code_mac(&self, phone_number: &str, code: &str) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.mac_key).expect("HMAC accepts any key length");
        mac.update(phone_number.as_bytes());
        mac.update(b":");
        mac.update(code.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    fn generate_code(&self) -> Result<String, AppError> {
        let mut bytes = [0u8; 4];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("CSPRNG failure")))?;
        let n = u32::from_be_bytes(bytes) % 1_000_000;
        Ok(format!("{:06}", n))
    }

    fn generate_flow_id(&self) -> Result<String, AppError> {
        let mut bytes = [0u8; FLOW_ID_BYTES];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("CSPRNG failure")))?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }
}

/// Display names need a first and a last name.
pub fn validate_display_name(name: &str) -> Result<(), &'static str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Full name is required");
    }
    if trimmed.split_whitespace().count() < 2 {
        return Err("Please enter both first and last name");
    }
    Ok(())
}

// ─── SMS Delivery ────────────────────────────────────────────────

/// A delivered (or captured) SMS message.
#[derive(Debug, Clone)]
pub struct SmsMessage {
    pub to: String,
    pub body: String,
}

/// SMS delivery backend.
pub enum SmsSender {
    /// POST `{to, body}` to a JSON gateway.
    Http {
        http: reqwest::Client,
        url: String,
        api_key: String,
    },
    /// Local development without a gateway: log instead of sending.
    Log,
    /// Tests: capture messages for assertions.
    Capture(std::sync::Mutex<Vec<SmsMessage>>),
}

impl SmsSender {
    /// Pick a backend from configuration: a gateway when configured,
    /// log-only otherwise.
    pub fn from_config(gateway_url: Option<&str>, api_key: Option<&str>) -> Self {
        match (gateway_url, api_key) {
            (Some(url), Some(key)) => SmsSender::Http {
                http: reqwest::Client::new(),
                url: url.to_string(),
                api_key: key.to_string(),
            },
            _ => {
                tracing::warn!("SMS_GATEWAY_URL not set; verification codes will only be logged");
                SmsSender::Log
            }
        }
    }

    pub fn capture() -> Self {
        SmsSender::Capture(std::sync::Mutex::new(Vec::new()))
    }

    pub async fn send(&self, to: &str, body: &str) -> Result<(), AppError> {
        match self {
            SmsSender::Http { http, url, api_key } => {
                let payload = serde_json::json!({ "to": to, "body": body });
                let response = http
                    .post(url)
                    .bearer_auth(api_key)
                    .json(&payload)
                    .send()
                    .await
                    .map_err(|e| {
                        AppError::Internal(anyhow::anyhow!("SMS gateway request failed: {}", e))
                    })?;

                if !response.status().is_success() {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    return Err(AppError::Internal(anyhow::anyhow!(
                        "SMS gateway returned {}: {}",
                        status,
                        text
                    )));
                }
                Ok(())
            }
            SmsSender::Log => {
                // Local development only; a real deployment configures a gateway.
                tracing::debug!(to = %to, body = %body, "SMS (log-only delivery)");
                Ok(())
            }
            SmsSender::Capture(messages) => {
                messages.lock().unwrap().push(SmsMessage {
                    to: to.to_string(),
                    body: body.to_string(),
                });
                Ok(())
            }
        }
    }

    /// Messages captured so far (capture backend only).
    pub fn sent(&self) -> Vec<SmsMessage> {
        match self {
            SmsSender::Capture(messages) => messages.lock().unwrap().clone(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service() -> (VerificationService, Arc<SmsSender>) {
        let sms = Arc::new(SmsSender::capture());
        let service = VerificationService::new(sms.clone(), b"test_mac_key".to_vec());
        (service, sms)
    }

    fn last_code(sms: &SmsSender) -> String {
        let body = sms.sent().last().unwrap().body.clone();
        body.rsplit(' ').next().unwrap().to_string()
    }

    #[tokio::test]
    async fn code_redeems_exactly_once() {
        let (service, sms) = test_service();
        let flow_id = service.start("+15551234567").await.unwrap();
        let code = last_code(&sms);

        let phone = service.redeem(&flow_id, &code).unwrap();
        assert_eq!(phone, "+15551234567");

        // Challenge consumed: the same code no longer redeems.
        let again = service.redeem(&flow_id, &code);
        assert!(matches!(again, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn wrong_code_leaves_challenge_usable() {
        let (service, sms) = test_service();
        let flow_id = service.start("+15551234567").await.unwrap();
        let code = last_code(&sms);

        let wrong = if code == "000000" { "000001" } else { "000000" };
        assert!(matches!(
            service.redeem(&flow_id, wrong),
            Err(AppError::InvalidCode)
        ));
        assert!(matches!(
            service.redeem(&flow_id, wrong),
            Err(AppError::InvalidCode)
        ));

        // A correct retry still succeeds.
        assert!(service.redeem(&flow_id, &code).is_ok());
    }

    #[tokio::test]
    async fn first_time_identity_goes_to_name_input() {
        let (service, sms) = test_service();
        let flow_id = service.start("+15551234567").await.unwrap();
        let code = last_code(&sms);
        service.redeem(&flow_id, &code).unwrap();

        let step = service
            .advance_verified(&flow_id, "u1", UserRole::User, false)
            .unwrap();
        assert_eq!(step, SignInStep::NameInput);

        let (uid, role) = service.submit_name(&flow_id, "Jane Doe").unwrap();
        assert_eq!(uid, "u1");
        assert_eq!(role, UserRole::User);

        // The flow lingers on name-input until the session is issued,
        // so a failed persistence step can be retried.
        assert_eq!(service.step(&flow_id), Some(SignInStep::NameInput));
        service.finish(&flow_id);
        assert_eq!(service.step(&flow_id), None);
    }

    #[tokio::test]
    async fn returning_identity_skips_name_input() {
        let (service, sms) = test_service();
        let flow_id = service.start("+15551234567").await.unwrap();
        let code = last_code(&sms);
        service.redeem(&flow_id, &code).unwrap();

        let step = service
            .advance_verified(&flow_id, "u1", UserRole::Leader, true)
            .unwrap();
        assert_eq!(step, SignInStep::Complete);
    }

    #[tokio::test]
    async fn back_from_verification_discards_challenge() {
        let (service, sms) = test_service();
        let flow_id = service.start("+15551234567").await.unwrap();
        let code = last_code(&sms);

        assert_eq!(service.back(&flow_id).unwrap(), SignInStep::Phone);

        // Old code is gone with the challenge.
        let redeemed = service.redeem(&flow_id, &code);
        assert!(redeemed.is_err());
    }

    #[tokio::test]
    async fn back_from_name_input_clears_identity() {
        let (service, sms) = test_service();
        let flow_id = service.start("+15551234567").await.unwrap();
        let code = last_code(&sms);
        service.redeem(&flow_id, &code).unwrap();
        service
            .advance_verified(&flow_id, "u1", UserRole::User, false)
            .unwrap();

        let step = service.back(&flow_id).unwrap();
        assert_eq!(step, SignInStep::PhoneVerification);

        // Name submission is no longer valid from this step.
        assert!(service.submit_name(&flow_id, "Jane Doe").is_err());
    }

    #[test]
    fn display_name_needs_two_tokens() {
        assert!(validate_display_name("John Doe").is_ok());
        assert!(validate_display_name("  Mary   Jane  Watson ").is_ok());

        assert_eq!(validate_display_name("John"), Err("Please enter both first and last name"));
        assert_eq!(validate_display_name(""), Err("Full name is required"));
        assert_eq!(validate_display_name("   "), Err("Full name is required"));
    }

    #[tokio::test]
    async fn codes_are_six_digits() {
        let (service, sms) = test_service();
        service.start("+15551234567").await.unwrap();
        let code = last_code(&sms);
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }
}
