//! Authentication context shared by the transports of one admin session.
//!
//! The session is created at login, handed explicitly to every
//! [`HttpTransport`](crate::transport::HttpTransport) and torn down at logout
//! (or when the API answers 401).

use crate::error::AdminError;
use directories::ProjectDirs;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub token: String,
    pub user: Option<String>,
    pub logged_in_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    credentials: Arc<RwLock<Option<Credentials>>>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let session = Self::default();
        session.login(token, None);
        session
    }

    pub fn login(&self, token: impl Into<String>, user: Option<String>) {
        let credentials = Credentials {
            token: token.into(),
            user,
            logged_in_at: OffsetDateTime::now_utc(),
        };
        *self.write() = Some(credentials);
    }

    pub fn logout(&self) {
        if self.write().take().is_some() {
            info!("Session cleared");
        }
    }

    pub fn token(&self) -> Option<String> {
        self.read().as_ref().map(|c| c.token.clone())
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.read().clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<Credentials>> {
        self.credentials.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<Credentials>> {
        self.credentials.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }
}

/// JSON file holding the credentials between CLI invocations.
pub struct SessionStore {
    session_file: PathBuf,
}

impl SessionStore {
    pub fn new(session_file: PathBuf) -> Self {
        Self { session_file }
    }

    /// Store under the platform config directory.
    pub fn default_location() -> Result<Self, AdminError> {
        ProjectDirs::from("", "", "furnish-admin")
            .map(|dirs| Self::new(dirs.config_dir().join("session.json")))
            .ok_or_else(|| AdminError::Config("Could not determine config directory".to_string()))
    }

    pub fn path(&self) -> &Path {
        &self.session_file
    }

    /// A missing file yields an anonymous session.
    pub fn load(&self) -> Result<Session, AdminError> {
        let session = Session::anonymous();
        if !self.session_file.exists() {
            debug!("No saved session at {}", self.session_file.display());
            return Ok(session);
        }

        let content = fs::read_to_string(&self.session_file)?;
        let credentials: Credentials = serde_json::from_str(&content)?;
        *session.write() = Some(credentials);
        Ok(session)
    }

    pub fn save(&self, session: &Session) -> Result<(), AdminError> {
        let Some(credentials) = session.credentials() else {
            return self.clear();
        };

        if let Some(parent) = self.session_file.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&credentials)?;
        fs::write(&self.session_file, json)?;
        debug!("Saved session to {}", self.session_file.display());
        Ok(())
    }

    pub fn clear(&self) -> Result<(), AdminError> {
        if self.session_file.exists() {
            fs::remove_file(&self.session_file)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn temp_store(name: &str) -> SessionStore {
        let dir = env::temp_dir().join(format!(
            "furnish-admin-session-{}-{}",
            name,
            std::process::id()
        ));
        SessionStore::new(dir.join("session.json"))
    }

    #[test]
    fn test_login_and_logout() {
        let session = Session::anonymous();
        assert!(!session.is_authenticated());

        session.login("abc123", Some("admin@example.com".to_string()));
        assert_eq!(session.token().as_deref(), Some("abc123"));

        // Clones share the same credentials
        let clone = session.clone();
        clone.logout();
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_logout_recovers_poisoned_lock() {
        let session = Session::with_token("stale");
        let holder = session.clone();
        let _ = std::thread::spawn(move || {
            let _guard = holder.credentials.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();
        assert!(session.credentials.is_poisoned());

        session.logout();
        assert!(!session.is_authenticated());

        session.login("fresh", None);
        assert_eq!(session.token().as_deref(), Some("fresh"));
    }

    #[test]
    fn test_store_round_trip_and_clear() {
        let store = temp_store("roundtrip");
        let session = Session::with_token("secret-token");
        store.save(&session).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.token().as_deref(), Some("secret-token"));

        store.clear().unwrap();
        assert!(!store.path().exists());
        assert!(!store.load().unwrap().is_authenticated());
    }

    #[test]
    fn test_saving_anonymous_session_removes_file() {
        let store = temp_store("anonymous");
        store.save(&Session::with_token("t")).unwrap();
        assert!(store.path().exists());

        store.save(&Session::anonymous()).unwrap();
        assert!(!store.path().exists());
    }
}
