// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Youth SCC: backend API for the youth group web app.
//!
//! This crate provides session auth (email/password and phone OTP),
//! bible study group management with self-service membership, and the
//! privileged admin operations over the identity provider.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use db::FirestoreDb;
use services::{GroupService, IdentityService, VerificationService};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
    pub identity: IdentityService,
    pub verification: VerificationService,
    pub groups: GroupService,
}
