// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Group list cache and membership mutation protocol.
//!
//! All group-list reads share one cache entry. Every mutation follows
//! the optimistic protocol: snapshot the cached list, apply the
//! speculative patch, issue the remote write, then invalidate on
//! success (forcing a reconciling re-read) or restore the snapshot on
//! failure. Consistency is deferred to the store on refetch.

use crate::db::FirestoreDb;
use crate::error::AppError;
use crate::models::{BibleStudyGroup, Leader, MeetingTime};
use ring::rand::{SecureRandom, SystemRandom};
use std::future::Future;
use tokio::sync::RwLock;

const AUTO_ID_LEN: usize = 20;
const AUTO_ID_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Read-through cache for a single remote list with optimistic
/// mutations and rollback.
///
/// "Last mutation's rollback/commit wins": concurrent mutations are
/// not serialized against each other, which is acceptable because a
/// successful write always invalidates and the next read reconciles
/// against the store.
pub struct ListCache<T> {
    inner: RwLock<Option<Vec<T>>>,
}

impl<T: Clone> ListCache<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    /// Cached list, if populated.
    pub async fn get(&self) -> Option<Vec<T>> {
        self.inner.read().await.clone()
    }

    /// Replace the cached list after a fresh read.
    pub async fn fill(&self, items: Vec<T>) {
        *self.inner.write().await = Some(items);
    }

    /// Drop the cached list, forcing the next read to hit the store.
    pub async fn invalidate(&self) {
        *self.inner.write().await = None;
    }

    /// Run one optimistic mutation: apply `patch` to the cached list
    /// (if populated), await the remote `write`, then invalidate on
    /// success or restore the pre-patch snapshot on failure.
    pub async fn apply<R, F, Fut>(&self, patch: F, write: Fut) -> Result<R, AppError>
    where
        F: FnOnce(&mut Vec<T>),
        Fut: Future<Output = Result<R, AppError>>,
    {
        let snapshot = {
            let mut guard = self.inner.write().await;
            let snapshot = guard.clone();
            if let Some(items) = guard.as_mut() {
                patch(items);
            }
            snapshot
        };

        match write.await {
            Ok(result) => {
                self.invalidate().await;
                Ok(result)
            }
            Err(err) => {
                *self.inner.write().await = snapshot;
                Err(err)
            }
        }
    }
}

impl<T: Clone> Default for ListCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Validated input for creating or updating a group.
#[derive(Debug, Clone)]
pub struct GroupDraft {
    pub name: String,
    pub description: String,
    pub location: String,
    pub leaders: Vec<Leader>,
    pub meeting_times: Vec<MeetingTime>,
}

/// Group operations over Firestore with the shared list cache.
pub struct GroupService {
    db: FirestoreDb,
    cache: ListCache<BibleStudyGroup>,
    rng: SystemRandom,
}

impl GroupService {
    pub fn new(db: FirestoreDb) -> Self {
        Self {
            db,
            cache: ListCache::new(),
            rng: SystemRandom::new(),
        }
    }

    /// Full group list, name ascending. Read-through: serves the cache
    /// when populated, otherwise fetches and fills it.
    pub async fn list(&self) -> Result<Vec<BibleStudyGroup>, AppError> {
        if let Some(groups) = self.cache.get().await {
            return Ok(groups);
        }

        let groups = self.db.list_groups().await?;
        self.cache.fill(groups.clone()).await;
        Ok(groups)
    }

    /// Single group by ID (bypasses the list cache).
    pub async fn get(&self, id: &str) -> Result<BibleStudyGroup, AppError> {
        self.db
            .get_group(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Group {} not found", id)))
    }

    /// Create a group. New groups start with no members.
    pub async fn create(&self, draft: GroupDraft) -> Result<BibleStudyGroup, AppError> {
        let now = chrono::Utc::now().to_rfc3339();
        let group = BibleStudyGroup {
            id: self.generate_group_id()?,
            name: draft.name,
            description: draft.description,
            location: draft.location,
            leaders: draft.leaders,
            meeting_times: draft.meeting_times,
            members: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        };

        let speculative = group.clone();
        self.cache
            .apply(
                move |groups| {
                    groups.push(speculative);
                    groups.sort_by(|a, b| a.name.cmp(&b.name));
                },
                self.db.set_group(&group),
            )
            .await?;

        tracing::info!(group_id = %group.id, name = %group.name, "Group created");
        Ok(group)
    }

    /// Update a group's details. Members and creation time carry over.
    pub async fn update(&self, id: &str, draft: GroupDraft) -> Result<BibleStudyGroup, AppError> {
        let existing = self.get(id).await?;

        let group = BibleStudyGroup {
            id: existing.id,
            name: draft.name,
            description: draft.description,
            location: draft.location,
            leaders: draft.leaders,
            meeting_times: draft.meeting_times,
            members: existing.members,
            created_at: existing.created_at,
            updated_at: chrono::Utc::now().to_rfc3339(),
        };

        let speculative = group.clone();
        self.cache
            .apply(
                move |groups| {
                    if let Some(slot) = groups.iter_mut().find(|g| g.id == speculative.id) {
                        *slot = speculative;
                        groups.sort_by(|a, b| a.name.cmp(&b.name));
                    }
                },
                self.db.set_group(&group),
            )
            .await?;

        tracing::info!(group_id = %group.id, "Group updated");
        Ok(group)
    }

    /// Delete a group.
    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        let group_id = id.to_string();
        self.cache
            .apply(
                move |groups| groups.retain(|g| g.id != group_id),
                self.db.delete_group(id),
            )
            .await?;

        tracing::info!(group_id = %id, "Group deleted");
        Ok(())
    }

    /// Self-service join. Returns `false` for an idempotent repeat.
    pub async fn join(&self, id: &str, user_id: &str) -> Result<bool, AppError> {
        let now = chrono::Utc::now().to_rfc3339();

        let group_id = id.to_string();
        let uid = user_id.to_string();
        let joined_at = now.clone();
        let joined = self
            .cache
            .apply(
                move |groups| {
                    if let Some(group) = groups.iter_mut().find(|g| g.id == group_id) {
                        group.add_member(&uid, &joined_at);
                    }
                },
                self.db.join_group(id, user_id, &now),
            )
            .await?;

        Ok(joined)
    }

    /// Self-service leave. Returns `false` if the user was not a member.
    pub async fn leave(&self, id: &str, user_id: &str) -> Result<bool, AppError> {
        let now = chrono::Utc::now().to_rfc3339();

        let group_id = id.to_string();
        let uid = user_id.to_string();
        let left = self
            .cache
            .apply(
                move |groups| {
                    if let Some(group) = groups.iter_mut().find(|g| g.id == group_id) {
                        group.remove_member(&uid);
                    }
                },
                self.db.leave_group(id, user_id, &now),
            )
            .await?;

        Ok(left)
    }

    /// Firestore-style 20-character document ID.
    fn generate_group_id(&self) -> Result<String, AppError> {
        let mut bytes = [0u8; AUTO_ID_LEN];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("CSPRNG failure")))?;

        Ok(bytes
            .iter()
            .map(|b| AUTO_ID_ALPHABET[(*b as usize) % AUTO_ID_ALPHABET.len()] as char)
            .collect())
    }
}
