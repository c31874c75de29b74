// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - User profiles (private, keyed by uid)
//! - Public profiles (display-name projections)
//! - Bible study groups (including transactional membership mutations)

use crate::db::collections;
use crate::error::AppError;
use crate::models::{BibleStudyGroup, PublicProfile, UserProfile};

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        // Use ExternalJwtFunctionSource to provide a dummy token without needing async-trait
        // or a custom TokenSource implementation struct.
        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── User Profile Operations ─────────────────────────────────

    /// Get a private profile by uid.
    pub async fn get_user_profile(&self, uid: &str) -> Result<Option<UserProfile>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(uid)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or update a private profile.
    pub async fn upsert_user_profile(&self, profile: &UserProfile) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(&profile.uid)
            .object(profile)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Delete a private profile.
    pub async fn delete_user_profile(&self, uid: &str) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::USERS)
            .document_id(uid)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Public Profile Operations ───────────────────────────────

    /// Get a public display-name projection by uid.
    pub async fn get_public_profile(&self, uid: &str) -> Result<Option<PublicProfile>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::PUBLIC_PROFILES)
            .obj()
            .one(uid)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or update a public profile.
    pub async fn upsert_public_profile(&self, profile: &PublicProfile) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::PUBLIC_PROFILES)
            .document_id(&profile.uid)
            .object(profile)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Delete a public profile.
    pub async fn delete_public_profile(&self, uid: &str) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::PUBLIC_PROFILES)
            .document_id(uid)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Group Operations ────────────────────────────────────────

    /// List all bible study groups, ordered by name ascending.
    pub async fn list_groups(&self) -> Result<Vec<BibleStudyGroup>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::GROUPS)
            .order_by([("name", firestore::FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a group by document ID.
    pub async fn get_group(&self, id: &str) -> Result<Option<BibleStudyGroup>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::GROUPS)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or fully replace a group document.
    pub async fn set_group(&self, group: &BibleStudyGroup) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::GROUPS)
            .document_id(&group.id)
            .object(group)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Delete a group document.
    pub async fn delete_group(&self, id: &str) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::GROUPS)
            .document_id(id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Transactional Membership Mutations ──────────────────────

    /// Atomically add a member to a group.
    ///
    /// Runs the read-check-append sequence inside a Firestore
    /// transaction so two concurrent joins for the same user cannot
    /// produce duplicate entries: if another writer touches the group
    /// document in the same window, Firestore retries with fresh data.
    ///
    /// Returns `true` if the member was added, `false` if already a
    /// member (idempotent duplicate).
    pub async fn join_group(
        &self,
        group_id: &str,
        user_id: &str,
        joined_at: &str,
    ) -> Result<bool, AppError> {
        let mut transaction = self
            .get_client()?
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        // Read the group within the transaction window so the write is
        // conditioned on this version of the member list.
        let group: Option<BibleStudyGroup> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::GROUPS)
            .obj()
            .one(group_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to read group in transaction: {}", e)))?;

        let mut group = match group {
            Some(g) => g,
            None => {
                let _ = transaction.rollback().await;
                return Err(AppError::NotFound(format!("Group {} not found", group_id)));
            }
        };

        // Membership is a set: skip the write entirely for a repeat join.
        if !group.add_member(user_id, joined_at) {
            tracing::debug!(group_id, user_id, "Already a member (idempotent skip)");
            let _ = transaction.rollback().await;
            return Ok(false);
        }

        group.updated_at = joined_at.to_string();

        self.get_client()?
            .fluent()
            .update()
            .in_col(collections::GROUPS)
            .document_id(group_id)
            .object(&group)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add group write to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        tracing::info!(group_id, user_id, "Member joined group");
        Ok(true)
    }

    /// Atomically remove a member from a group.
    ///
    /// Same transaction discipline as [`join_group`], eliminating the
    /// lost-update window of a plain read-modify-write. Returns `true`
    /// if a member was removed, `false` if the user was not a member.
    pub async fn leave_group(
        &self,
        group_id: &str,
        user_id: &str,
        now: &str,
    ) -> Result<bool, AppError> {
        let mut transaction = self
            .get_client()?
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let group: Option<BibleStudyGroup> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::GROUPS)
            .obj()
            .one(group_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to read group in transaction: {}", e)))?;

        let mut group = match group {
            Some(g) => g,
            None => {
                let _ = transaction.rollback().await;
                return Err(AppError::NotFound(format!("Group {} not found", group_id)));
            }
        };

        if !group.remove_member(user_id) {
            tracing::debug!(group_id, user_id, "Not a member (idempotent skip)");
            let _ = transaction.rollback().await;
            return Ok(false);
        }

        group.updated_at = now.to_string();

        self.get_client()?
            .fluent()
            .update()
            .in_col(collections::GROUPS)
            .document_id(group_id)
            .object(&group)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add group write to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        tracing::info!(group_id, user_id, "Member left group");
        Ok(true)
    }
}
