use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::notifications::Identity;

pub const GARAGE_ROLE: &str = "GARAGE";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredUser {
    pub id: i64,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub garage_id: Option<i64>,
}

impl StoredUser {
    /// Garage owners receive notifications addressed to their garage, not to
    /// their user account.
    pub fn identity(&self) -> Identity {
        match self.garage_id {
            Some(garage_id) if self.role.eq_ignore_ascii_case(GARAGE_ROLE) => {
                Identity::garage(garage_id)
            }
            _ => Identity::user(self.id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredSession {
    pub token: String,
    pub user: StoredUser,
}

/// File-backed credential storage.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<StoredSession>> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no stored session");
                return Ok(None);
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("reading session `{}`", self.path.display()))
            }
        };
        let session = serde_json::from_slice(&data)
            .with_context(|| format!("parsing session `{}`", self.path.display()))?;
        Ok(Some(session))
    }

    pub fn save(&self, session: &StoredSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let data = serde_json::to_vec_pretty(session)?;
        fs::write(&self.path, data)
            .with_context(|| format!("writing session `{}`", self.path.display()))?;
        info!(user_id = session.user.id, "session stored");
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "session cleared");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("removing session `{}`", self.path.display()))
            }
        }
    }
}
