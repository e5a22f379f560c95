// SPDX-License-Identifier: MIT

//! Pending-review tracking for daemon-applied file edits.
//!
//! AI-generated changes are written to disk immediately; "review" means the
//! daemon keeps the pre-edit contents in a backup file so the client can show
//! a diff (backup vs. live file) and the user can still roll back. Accepting
//! a review discards the backup, rejecting restores the original contents
//! (or deletes the file if it did not exist before the edit).

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::ipc::event::EventBroadcaster;

/// One applied-but-unreviewed edit.
struct PendingReview {
    /// Contents before the edit. `None` when the file did not exist, in which
    /// case rejecting the review removes the created file.
    original_content: Option<String>,
    backup_path: PathBuf,
    created_at: String,
}

/// Pending review entry as reported by `review.list`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewEntryView {
    pub path: String,
    pub existed: bool,
    pub backup_path: String,
    pub created_at: String,
}

/// Owns every pending review and the backup files that make rollback possible.
///
/// Backups live in `<data_dir>/backups/` and are named
/// `vicod_backup_<hash>_<file name>` so a crash never leaves them colliding
/// with workspace files. The pending map itself is in-memory only: after a
/// daemon restart stray backup files are harmless leftovers, not state.
pub struct ReviewManager {
    backups_dir: PathBuf,
    broadcaster: Arc<EventBroadcaster>,
    pending: RwLock<HashMap<PathBuf, PendingReview>>,
}

impl ReviewManager {
    pub fn new(data_dir: &Path, broadcaster: Arc<EventBroadcaster>) -> Self {
        Self {
            backups_dir: data_dir.join("backups"),
            broadcaster,
            pending: RwLock::new(HashMap::new()),
        }
    }

    /// Apply `new_contents` to `path` and register a pending review.
    ///
    /// The previous contents go to a backup file first (empty backup for new
    /// files, so the client's diff base is an empty document). Re-opening a
    /// path that is already pending keeps the earliest original, so reject
    /// always restores the state before the first AI edit.
    ///
    /// Returns whether the file existed before the pending edits.
    pub async fn open(&self, path: &Path, new_contents: &str) -> Result<bool> {
        let original = match tokio::fs::read_to_string(path).await {
            Ok(text) => Some(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to read {}", path.display())))
            }
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.with_context(|| {
                    format!("Failed to create parent directory for {}", path.display())
                })?;
            }
        }
        tokio::fs::write(path, new_contents)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        let mut pending = self.pending.write().await;
        let existed = match pending.get(path) {
            // Already pending: the live file was just updated again, but the
            // entry (and its backup) keep the earliest original.
            Some(entry) => entry.original_content.is_some(),
            None => {
                tokio::fs::create_dir_all(&self.backups_dir)
                    .await
                    .context("Failed to create backups directory")?;
                let backup_path = self.backups_dir.join(backup_name(path));
                tokio::fs::write(&backup_path, original.as_deref().unwrap_or(""))
                    .await
                    .with_context(|| {
                        format!("Failed to write backup {}", backup_path.display())
                    })?;

                let existed = original.is_some();
                pending.insert(
                    path.to_path_buf(),
                    PendingReview {
                        original_content: original,
                        backup_path,
                        created_at: chrono::Utc::now().to_rfc3339(),
                    },
                );
                existed
            }
        };
        drop(pending);

        tracing::info!(path = %path.display(), existed, "review opened");
        self.broadcaster.broadcast(
            "review.opened",
            json!({ "path": path.display().to_string(), "existed": existed }),
        );
        Ok(existed)
    }

    /// Keep the applied edit: drop the entry and its backup.
    ///
    /// `path` may be the live file or its backup file. Returns the live path.
    pub async fn accept(&self, path: &Path) -> Result<PathBuf> {
        let live = self.resolve(path).await?;
        let entry = {
            let mut pending = self.pending.write().await;
            pending
                .remove(&live)
                .ok_or_else(|| not_found(&live))?
        };

        self.remove_backup(&entry.backup_path).await;
        tracing::info!(path = %live.display(), "review accepted");
        self.broadcaster.broadcast(
            "review.closed",
            json!({ "path": live.display().to_string(), "kept": true }),
        );
        Ok(live)
    }

    /// Roll the edit back: restore the original contents (or delete the file
    /// if it was created by the edit), then drop the entry and backup.
    ///
    /// `path` may be the live file or its backup file. Returns the live path.
    pub async fn reject(&self, path: &Path) -> Result<PathBuf> {
        let live = self.resolve(path).await?;
        let mut pending = self.pending.write().await;
        let entry = pending.remove(&live).ok_or_else(|| not_found(&live))?;

        let restored = match &entry.original_content {
            Some(text) => tokio::fs::write(&live, text)
                .await
                .with_context(|| format!("Failed to restore {}", live.display())),
            None => match tokio::fs::remove_file(&live).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(anyhow::Error::new(e)
                    .context(format!("Failed to remove {}", live.display()))),
            },
        };
        if let Err(e) = restored {
            // Restore failed: keep the entry so the user can retry.
            pending.insert(live.clone(), entry);
            return Err(e);
        }
        drop(pending);

        self.remove_backup(&entry.backup_path).await;
        tracing::info!(path = %live.display(), "review rejected");
        self.broadcaster.broadcast(
            "review.closed",
            json!({ "path": live.display().to_string(), "kept": false }),
        );
        Ok(live)
    }

    /// Accept every pending review. Returns `(accepted, failed)` where a
    /// failure means the backup file could not be deleted; the edit itself is
    /// already live, so failures are logged and counted but never abort the
    /// batch.
    pub async fn accept_all(&self) -> (usize, usize) {
        let drained: Vec<(PathBuf, PendingReview)> = {
            let mut pending = self.pending.write().await;
            pending.drain().collect()
        };

        let mut accepted = 0usize;
        let mut failed = 0usize;
        for (path, entry) in drained {
            match tokio::fs::remove_file(&entry.backup_path).await {
                Ok(()) => accepted += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => accepted += 1,
                Err(e) => {
                    tracing::warn!(
                        file = %entry.backup_path.display(),
                        err = %e,
                        "could not remove review backup"
                    );
                    failed += 1;
                }
            }
            self.broadcaster.broadcast(
                "review.closed",
                json!({ "path": path.display().to_string(), "kept": true }),
            );
        }

        tracing::info!(accepted, failed, "accepted all pending reviews");
        (accepted, failed)
    }

    /// All pending entries, sorted by path for stable client rendering.
    pub async fn list(&self) -> Vec<ReviewEntryView> {
        let pending = self.pending.read().await;
        let mut entries: Vec<ReviewEntryView> = pending
            .iter()
            .map(|(path, entry)| ReviewEntryView {
                path: path.display().to_string(),
                existed: entry.original_content.is_some(),
                backup_path: entry.backup_path.display().to_string(),
                created_at: entry.created_at.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }

    /// Number of pending reviews (reported by `daemon.status`).
    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }

    /// Map a live *or* backup path to the live path of its pending entry.
    async fn resolve(&self, path: &Path) -> Result<PathBuf> {
        let pending = self.pending.read().await;
        if pending.contains_key(path) {
            return Ok(path.to_path_buf());
        }
        pending
            .iter()
            .find(|(_, entry)| entry.backup_path == path)
            .map(|(live, _)| live.clone())
            .ok_or_else(|| not_found(path))
    }

    async fn remove_backup(&self, backup: &Path) {
        if let Err(e) = tokio::fs::remove_file(backup).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    file = %backup.display(),
                    err = %e,
                    "could not remove review backup"
                );
            }
        }
    }
}

fn not_found(path: &Path) -> anyhow::Error {
    anyhow!("REVIEW_NOT_FOUND: no pending review for {}", path.display())
}

fn backup_name(path: &Path) -> String {
    let digest = hex::encode(Sha256::digest(path.to_string_lossy().as_bytes()));
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");
    format!("vicod_backup_{}_{}", &digest[..12], name)
}
