use base64::{engine::general_purpose, Engine};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use skyboard_core::preferences::SESSION_KEY;
use skyboard_core::{AppError, AuthError, Preferences, StorageError};

/// Signed-in user profile taken from an identity token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub picture: Option<String>,
    /// Provider-assigned subject identifier
    pub sub: String,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Malformed identity token: {0}")]
    MalformedToken(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::MalformedToken(msg) => AppError::Auth(AuthError::InvalidToken(msg)),
            SessionError::Storage(e) => AppError::Storage(e),
        }
    }
}

/// Decode the payload of a `header.payload.signature` identity token.
///
/// The signature is not verified; the issuing provider already did that
/// before handing the token over.
pub fn decode_identity_token(token: &str) -> Result<Session, SessionError> {
    let mut parts = token.trim().split('.');
    let payload = match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_)) if !payload.is_empty() => payload,
        _ => {
            return Err(SessionError::MalformedToken(
                "expected three dot-separated segments".to_string(),
            ))
        }
    };

    let bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| SessionError::MalformedToken(format!("payload is not base64url: {}", e)))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| SessionError::MalformedToken(format!("payload is not a profile: {}", e)))
}

/// Keeps the current session and its persisted copy in step.
#[derive(Debug)]
pub struct SessionManager {
    preferences: Preferences,
    current: RwLock<Option<Session>>,
}

impl SessionManager {
    pub fn new(preferences: Preferences) -> Self {
        Self {
            preferences,
            current: RwLock::new(None),
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.current.read().clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.current.read().is_some()
    }

    /// The signed-in session, or `AuthError::NotSignedIn`.
    pub fn require(&self) -> Result<Session, AuthError> {
        self.current().ok_or(AuthError::NotSignedIn)
    }

    /// Decode `token`, persist the profile and make it current.
    pub fn sign_in(&self, token: &str) -> Result<Session, SessionError> {
        let session = decode_identity_token(token)?;
        self.preferences.save_json(SESSION_KEY, &session)?;
        *self.current.write() = Some(session.clone());
        tracing::info!("Signed in as {}", session.email);
        Ok(session)
    }

    /// Load the persisted session, if any.
    ///
    /// A malformed persisted session is discarded and removed so the next
    /// start does not trip over it again.
    pub fn restore(&self) -> Option<Session> {
        let restored = match self.preferences.load_json::<Session>(SESSION_KEY) {
            Ok(session) => session,
            Err(StorageError::Parse { message, .. }) => {
                tracing::warn!("Discarding malformed saved session: {}", message);
                if let Err(e) = self.preferences.remove(SESSION_KEY) {
                    tracing::warn!("Failed to remove malformed session: {}", e);
                }
                None
            }
            Err(e) => {
                tracing::warn!("Could not read saved session: {}", e);
                None
            }
        };

        if let Some(session) = &restored {
            tracing::info!("Restored session for {}", session.email);
        }
        self.current.write().clone_from(&restored);
        restored
    }

    pub fn sign_out(&self) -> Result<(), SessionError> {
        self.current.write().take();
        self.preferences.remove(SESSION_KEY)?;
        tracing::info!("Signed out");
        Ok(())
    }
}
