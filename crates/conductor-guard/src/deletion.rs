//! Deletion confirmation tokens
//!
//! Destructive project deletion is a two-step exchange: the caller first asks
//! for a confirmation, which lists exactly what will be removed and carries a
//! random single-use token, then presents that token to authorize the delete.
//!
//! ```text
//! pending ──verify──▶ consumed
//!    │
//!    └──age > ttl──▶ expired (dropped on the next create, or refused on verify)
//! ```

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{GuardError, Result};

/// Seconds a confirmation token stays valid
pub const CONFIRMATION_TTL_SECS: i64 = 300;

/// Bytes of randomness behind each token
pub const TOKEN_BYTES: usize = 32;

/// Workflow state directory inside a project
pub const WORKFLOW_DIR: &str = ".workflow";

/// Project configuration file inside a project
pub const PROJECT_CONFIG_FILE: &str = ".project-config.json";

/// A pending deletion, enumerated at issuance time
#[derive(Debug, Clone, Serialize)]
pub struct DeletionConfirmation {
    pub token: String,
    pub project_name: String,
    pub files_to_delete: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub remove_source: bool,
}

impl DeletionConfirmation {
    fn ttl() -> Duration {
        Duration::seconds(CONFIRMATION_TTL_SECS)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + Self::ttl()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > Self::ttl()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Short, non-secret prefix of the token for log lines
    pub fn token_hint(&self) -> &str {
        &self.token[..8.min(self.token.len())]
    }

    /// Remove every listed path. Paths that no longer exist are skipped.
    pub fn execute(&self) -> Result<Vec<String>> {
        let mut removed = Vec::with_capacity(self.files_to_delete.len());

        for entry in &self.files_to_delete {
            let path = Path::new(entry);
            let metadata = match std::fs::symlink_metadata(path) {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(path = %entry, "already gone, skipping");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if metadata.is_dir() {
                std::fs::remove_dir_all(path)?;
            } else {
                std::fs::remove_file(path)?;
            }
            removed.push(entry.clone());
        }

        tracing::info!(
            project = %self.project_name,
            removed = removed.len(),
            remove_source = self.remove_source,
            "project deletion executed"
        );
        Ok(removed)
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Paths that deleting `project_dir` would remove
fn files_to_delete(project_dir: &Path, remove_source: bool) -> Result<Vec<String>> {
    let mut files = Vec::new();

    for name in [WORKFLOW_DIR, PROJECT_CONFIG_FILE] {
        let path = project_dir.join(name);
        if path.exists() {
            files.push(path.to_string_lossy().into_owned());
        }
    }

    if remove_source {
        let mut rest = Vec::new();
        for entry in std::fs::read_dir(project_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if name == WORKFLOW_DIR || name == PROJECT_CONFIG_FILE {
                continue;
            }
            rest.push(entry.path().to_string_lossy().into_owned());
        }
        rest.sort();
        files.extend(rest);
    }

    Ok(files)
}

/// Issues and redeems deletion confirmation tokens
#[derive(Default)]
pub struct DeletionManager {
    confirmations: Mutex<HashMap<String, DeletionConfirmation>>,
}

impl DeletionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a confirmation for deleting `project_dir`
    pub fn create_confirmation(
        &self,
        project_name: &str,
        project_dir: &Path,
        remove_source: bool,
    ) -> Result<DeletionConfirmation> {
        if !project_dir.is_dir() {
            return Err(GuardError::ProjectNotFound(project_name.to_string()));
        }

        let confirmation = DeletionConfirmation {
            token: generate_token(),
            project_name: project_name.to_string(),
            files_to_delete: files_to_delete(project_dir, remove_source)?,
            created_at: Utc::now(),
            remove_source,
        };

        let mut confirmations = self.confirmations.lock();
        let purged = Self::purge_expired(&mut confirmations, Utc::now());
        confirmations.insert(confirmation.token.clone(), confirmation.clone());
        drop(confirmations);

        tracing::info!(
            project = %project_name,
            token = %confirmation.token_hint(),
            files = confirmation.files_to_delete.len(),
            purged,
            "deletion confirmation issued"
        );
        Ok(confirmation)
    }

    /// Redeem a token. Returns `None` when the token is unknown, already used,
    /// or expired. The token is removed in every case.
    pub fn verify_and_consume(&self, token: &str) -> Option<DeletionConfirmation> {
        let confirmation = self.confirmations.lock().remove(token)?;

        if confirmation.is_expired() {
            tracing::info!(
                project = %confirmation.project_name,
                token = %confirmation.token_hint(),
                "expired deletion confirmation discarded"
            );
            return None;
        }

        Some(confirmation)
    }

    /// Redeem a token that must belong to `project_name`
    pub fn consume_for(&self, project_name: &str, token: &str) -> Result<DeletionConfirmation> {
        match self.verify_and_consume(token) {
            Some(confirmation) if confirmation.project_name == project_name => Ok(confirmation),
            Some(confirmation) => {
                tracing::warn!(
                    requested = %project_name,
                    issued_for = %confirmation.project_name,
                    "deletion token presented for a different project"
                );
                Err(GuardError::InvalidToken)
            }
            None => Err(GuardError::InvalidToken),
        }
    }

    /// Number of tokens that are still redeemable
    pub fn pending_count(&self) -> usize {
        let now = Utc::now();
        self.confirmations
            .lock()
            .values()
            .filter(|c| !c.is_expired_at(now))
            .count()
    }

    fn purge_expired(
        confirmations: &mut HashMap<String, DeletionConfirmation>,
        now: DateTime<Utc>,
    ) -> usize {
        let before = confirmations.len();
        confirmations.retain(|_, c| !c.is_expired_at(now));
        before - confirmations.len()
    }
}
