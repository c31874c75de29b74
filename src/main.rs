// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Youth SCC API Server
//!
//! Serves the youth group web app: phone/email sign-in, bible study
//! groups with self-service membership, and admin user management.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use youth_scc_api::{
    config::Config,
    db::FirestoreDb,
    services::{GroupService, IdentityService, SmsSender, VerificationService},
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Youth SCC API");

    // Initialize Firestore database
    let db = FirestoreDb::new(&config.gcp_project_id)
        .await
        .expect("Failed to connect to Firestore");

    // Identity provider client
    let identity = IdentityService::new(&config.identity_api_key, &config.gcp_project_id);
    tracing::info!(project = %config.gcp_project_id, "Identity provider client initialized");

    // Phone verification: codes are HMAC'd with the session signing key
    let sms = Arc::new(SmsSender::from_config(
        config.sms_gateway_url.as_deref(),
        config.sms_api_key.as_deref(),
    ));
    let verification = VerificationService::new(sms, config.jwt_signing_key.clone());

    // Group service with the shared list cache
    let groups = GroupService::new(db.clone());

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        identity,
        verification,
        groups,
    });

    // Build router
    let app = youth_scc_api::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("youth_scc_api=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
