use crate::error::SessionError;
use crate::store::models::UserId;
use jsonwebtoken::dangerous::insecure_decode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub type SharedSession = Arc<RwLock<Session>>;

/// The signed-in user of this client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewer {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
    #[serde(default)]
    email: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredCredential {
    access_token: String,
    #[serde(rename = "userData", default)]
    user: Option<Viewer>,
}

/// Persisted bearer credential plus the viewer identity it carries.
#[derive(Debug)]
pub struct Session {
    path: PathBuf,
    token: Option<String>,
    viewer: Option<Viewer>,
}

impl Session {
    pub fn anonymous(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            token: None,
            viewer: None,
        }
    }

    /// Loads the credential stored at `path`. Expired or unreadable tokens
    /// are discarded and yield an anonymous session.
    pub fn restore(path: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let mut session = Self::anonymous(path);

        let raw = match std::fs::read_to_string(&session.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(session),
            Err(e) => return Err(e.into()),
        };

        let stored: StoredCredential = match serde_json::from_str(&raw) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Discarding corrupt credential file: {e}");
                session.invalidate();
                return Ok(session);
            }
        };

        match decode_viewer(&stored.access_token) {
            Ok(viewer) => {
                info!(user_id = %viewer.id, "Restored session");
                session.token = Some(stored.access_token);
                session.viewer = Some(viewer);
            }
            Err(e) => {
                warn!("Stored credential rejected: {e}");
                session.invalidate();
            }
        }

        Ok(session)
    }

    /// Records a freshly issued credential and persists it.
    pub fn establish(&mut self, token: String, viewer: Viewer) -> Result<(), SessionError> {
        let stored = StoredCredential {
            access_token: token,
            user: Some(viewer),
        };
        write_credential(&self.path, &stored)?;

        self.token = Some(stored.access_token);
        self.viewer = stored.user;
        Ok(())
    }

    /// Drops the credential in memory and on disk. Used for logout and when
    /// the poll service answers 401.
    pub fn invalidate(&mut self) {
        self.token = None;
        self.viewer = None;
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove credential file: {e}");
            }
        }
    }

    pub fn logout(&mut self) {
        self.invalidate();
        info!("Logged out successfully");
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn viewer(&self) -> Option<&Viewer> {
        self.viewer.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.viewer.is_some()
    }

    pub fn into_shared(self) -> SharedSession {
        Arc::new(RwLock::new(self))
    }
}

/// Reads the viewer out of a token and checks its expiry. The signature is
/// not verified here; the poll service does that on every request.
pub fn decode_viewer(token: &str) -> Result<Viewer, SessionError> {
    let data = insecure_decode::<Claims>(token)?;
    if data.claims.exp <= chrono::Utc::now().timestamp() {
        return Err(SessionError::Expired);
    }

    Ok(Viewer {
        id: UserId(data.claims.sub),
        email: data.claims.email,
        name: data.claims.name.unwrap_or_default(),
    })
}

fn write_credential(path: &Path, stored: &StoredCredential) -> Result<(), SessionError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_vec_pretty(stored)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    fn token_for(sub: &str, exp_offset_secs: i64) -> String {
        let exp = chrono::Utc::now().timestamp() + exp_offset_secs;
        encode(
            &Header::default(),
            &json!({"sub": sub, "email": format!("{sub}@example.com"), "name": "Test", "exp": exp}),
            &EncodingKey::from_secret(b"server-side-secret"),
        )
        .unwrap()
    }

    #[test]
    fn decodes_claims_of_live_token() {
        let viewer = decode_viewer(&token_for("u1", 3600)).unwrap();
        assert_eq!(viewer.id, UserId::from("u1"));
        assert_eq!(viewer.email, "u1@example.com");
        assert_eq!(viewer.name, "Test");
    }

    #[test]
    fn expired_token_is_rejected() {
        assert!(matches!(
            decode_viewer(&token_for("u1", -3600)),
            Err(SessionError::Expired)
        ));
    }

    #[test]
    fn token_without_expiry_is_invalid() {
        let token = encode(
            &Header::default(),
            &json!({"sub": "u1", "email": "u1@example.com"}),
            &EncodingKey::from_secret(b"server-side-secret"),
        )
        .unwrap();
        assert!(matches!(decode_viewer(&token), Err(SessionError::InvalidToken)));
    }

    #[test]
    fn garbage_token_is_invalid() {
        assert!(matches!(
            decode_viewer("not.a.token"),
            Err(SessionError::InvalidToken)
        ));
    }

    #[test]
    fn missing_file_restores_anonymous() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::restore(dir.path().join("session.json")).unwrap();
        assert!(!session.is_authenticated());
        assert!(session.token().is_none());
    }

    #[test]
    fn establish_then_restore_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let token = token_for("u7", 3600);

        let mut session = Session::anonymous(&path);
        let viewer = decode_viewer(&token).unwrap();
        session.establish(token.clone(), viewer.clone()).unwrap();

        let restored = Session::restore(&path).unwrap();
        assert_eq!(restored.viewer(), Some(&viewer));
        assert_eq!(restored.token(), Some(token.as_str()));
    }

    #[test]
    fn expired_credential_is_cleared_on_restore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(
            &path,
            json!({"access_token": token_for("u1", -10)}).to_string(),
        )
        .unwrap();

        let session = Session::restore(&path).unwrap();
        assert!(!session.is_authenticated());
        assert!(!path.exists());
    }

    #[test]
    fn logout_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let token = token_for("u2", 3600);
        let mut session = Session::anonymous(&path);
        session
            .establish(token.clone(), decode_viewer(&token).unwrap())
            .unwrap();

        session.logout();

        assert!(!session.is_authenticated());
        assert!(!path.exists());
    }
}
