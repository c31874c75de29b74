// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use std::sync::Arc;
use youth_scc_api::config::Config;
use youth_scc_api::db::FirestoreDb;
use youth_scc_api::routes::create_router;
use youth_scc_api::services::{GroupService, IdentityService, SmsSender, VerificationService};
use youth_scc_api::AppState;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Create a mock database connection (offline).
#[allow(dead_code)]
pub fn test_db_offline() -> FirestoreDb {
    FirestoreDb::new_mock()
}

/// Build an app around a given database.
///
/// Identity is the in-memory mock and SMS messages are captured, so
/// tests can seed accounts and read verification codes.
#[allow(dead_code)]
pub fn build_test_app(db: FirestoreDb) -> (axum::Router, Arc<AppState>, Arc<SmsSender>) {
    let config = Config::test_default();
    let identity = IdentityService::new_mock();

    let sms = Arc::new(SmsSender::capture());
    let verification = VerificationService::new(sms.clone(), config.jwt_signing_key.clone());

    let groups = GroupService::new(db.clone());

    let state = Arc::new(AppState {
        config,
        db,
        identity,
        verification,
        groups,
    });

    (create_router(state.clone()), state, sms)
}

/// Create a test app with offline mock dependencies.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>, Arc<SmsSender>) {
    build_test_app(test_db_offline())
}

/// Create a test app backed by the Firestore emulator.
#[allow(dead_code)]
pub async fn create_emulator_app() -> (axum::Router, Arc<AppState>, Arc<SmsSender>) {
    build_test_app(test_db().await)
}
