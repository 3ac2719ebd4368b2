use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::config::ThemeName;

pub mod auth;

const SESSION_TMP_EXTENSION: &str = "json.tmp";

pub type SessionHandle = Arc<RwLock<SessionStore>>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct SessionRecord {
    token: Option<String>,
    signed_in_at: Option<i64>,
    theme: Option<ThemeName>,
}

/// Credential and display preference shared by every part of the client.
///
/// The token is set on login and cleared on logout or when the server rejects
/// it; every change is written through to `session.json` in the state dir so a
/// later run starts signed in.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    record: SessionRecord,
}

impl SessionStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        let record = match fs::read(&path) {
            Ok(raw) => match serde_json::from_slice(&raw) {
                Ok(record) => record,
                Err(err) => {
                    tracing::warn!(?err, "ignoring unreadable session file {}", path.display());
                    SessionRecord::default()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => SessionRecord::default(),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("reading session file {}", path.display()))
            }
        };
        Ok(Self { path, record })
    }

    pub fn into_handle(self) -> SessionHandle {
        Arc::new(RwLock::new(self))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn token(&self) -> Option<&str> {
        self.record.token.as_deref()
    }

    pub fn is_signed_in(&self) -> bool {
        self.record.token.is_some()
    }

    pub fn signed_in_at(&self) -> Option<OffsetDateTime> {
        self.record
            .signed_in_at
            .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok())
    }

    pub fn set_token(&mut self, token: String) -> Result<()> {
        self.record.token = Some(token);
        self.record.signed_in_at = Some(OffsetDateTime::now_utc().unix_timestamp());
        self.persist()
    }

    pub fn clear_token(&mut self) -> Result<()> {
        if self.record.token.is_none() && self.record.signed_in_at.is_none() {
            return Ok(());
        }
        self.record.token = None;
        self.record.signed_in_at = None;
        self.persist()
    }

    pub fn theme(&self) -> Option<ThemeName> {
        self.record.theme
    }

    pub fn set_theme(&mut self, theme: ThemeName) -> Result<()> {
        self.record.theme = Some(theme);
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.record).context("serialising session")?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("ensuring session dir {}", parent.display()))?;
        }
        let tmp_path = self.path.with_extension(SESSION_TMP_EXTENSION);
        fs::write(&tmp_path, &json)
            .with_context(|| format!("writing temporary session file {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("persisting session file {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn token_survives_reopen() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("state/session.json");
        {
            let mut store = SessionStore::open(path.clone())?;
            assert!(!store.is_signed_in());
            store.set_token("abc".into())?;
        }
        let store = SessionStore::open(path)?;
        assert_eq!(store.token(), Some("abc"));
        assert!(store.signed_in_at().is_some());
        Ok(())
    }

    #[test]
    fn clearing_the_token_keeps_the_theme() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("session.json");
        let mut store = SessionStore::open(path.clone())?;
        store.set_token("abc".into())?;
        store.set_theme(ThemeName::Light)?;
        store.clear_token()?;

        let reopened = SessionStore::open(path)?;
        assert_eq!(reopened.token(), None);
        assert_eq!(reopened.theme(), Some(ThemeName::Light));
        Ok(())
    }

    #[test]
    fn corrupt_session_file_starts_signed_out() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("session.json");
        fs::write(&path, b"{not json")?;
        let store = SessionStore::open(path)?;
        assert!(!store.is_signed_in());
        Ok(())
    }
}
