//! Signed-in session as seen by the outbound clients.
//!
//! Sign-in itself belongs to the external auth provider; this service only
//! needs the bearer token and, for store scoping, the user id.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub user_id: Option<String>,
}

pub trait SessionProvider: Send + Sync {
    /// The current session, or `None` when signed out or expired.
    fn current(&self) -> Option<Session>;
}

/// Session taken from configuration at startup.
#[derive(Debug, Default)]
pub struct SessionSlot {
    inner: Option<Session>,
}

impl SessionSlot {
    pub fn new(session: Option<Session>) -> Self {
        Self { inner: session }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn from_token(token: Option<String>, user_id: Option<String>) -> Self {
        Self::new(token.filter(|t| !t.trim().is_empty()).map(|access_token| Session {
            access_token,
            user_id,
        }))
    }
}

impl SessionProvider for SessionSlot {
    fn current(&self) -> Option<Session> {
        self.inner.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_token_means_signed_out() {
        assert!(SessionSlot::from_token(Some("  ".into()), None).current().is_none());
        assert!(SessionSlot::from_token(None, None).current().is_none());
    }

    #[test]
    fn token_carries_user_id() {
        let slot = SessionSlot::from_token(Some("t1".into()), Some("u1".into()));
        let session = slot.current().unwrap();
        assert_eq!(session.access_token, "t1");
        assert_eq!(session.user_id.as_deref(), Some("u1"));
    }
}
