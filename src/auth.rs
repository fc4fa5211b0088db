//! Credential resolution shared by the generation and synthesis backends
//!
//! Both call sites follow the same policy: prefer the active session's
//! access token, fall back to the statically configured public anonymous
//! key. The anonymous key always rides along in the `apikey` header.

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;

/// Resolved credentials for one backend request
#[derive(Debug, Clone)]
pub struct Credential {
    /// Value for the `Authorization: Bearer` header
    pub bearer: String,
    /// Value for the `apikey` header
    pub api_key: String,
}

/// Resolves request credentials from session state with anonymous fallback
pub struct CredentialResolver {
    session_token: RwLock<Option<SecretString>>,
    anon_key: SecretString,
}

impl CredentialResolver {
    /// Create a resolver with only the public anonymous key
    #[must_use]
    pub const fn new(anon_key: SecretString) -> Self {
        Self {
            session_token: RwLock::const_new(None),
            anon_key,
        }
    }

    /// Create a resolver with an already-established session token
    #[must_use]
    pub fn with_session(anon_key: SecretString, token: SecretString) -> Self {
        Self {
            session_token: RwLock::new(Some(token)),
            anon_key,
        }
    }

    /// Install a session token (user logged in)
    pub async fn set_session_token(&self, token: SecretString) {
        *self.session_token.write().await = Some(token);
    }

    /// Drop the session token (user logged out)
    pub async fn clear_session(&self) {
        *self.session_token.write().await = None;
    }

    /// Resolve credentials for an outgoing request.
    ///
    /// Must complete before the request is issued; the returned value is a
    /// snapshot, so a token change mid-request does not affect it.
    pub async fn resolve(&self) -> Credential {
        let session = self.session_token.read().await;
        let bearer = session.as_ref().map_or_else(
            || self.anon_key.expose_secret().to_string(),
            |token| token.expose_secret().to_string(),
        );

        Credential {
            bearer,
            api_key: self.anon_key.expose_secret().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn anonymous_key_used_without_session() {
        let resolver = CredentialResolver::new(SecretString::from("anon-key"));
        let cred = resolver.resolve().await;
        assert_eq!(cred.bearer, "anon-key");
        assert_eq!(cred.api_key, "anon-key");
    }

    #[tokio::test]
    async fn session_token_preferred_when_present() {
        let resolver = CredentialResolver::new(SecretString::from("anon-key"));
        resolver
            .set_session_token(SecretString::from("session-jwt"))
            .await;

        let cred = resolver.resolve().await;
        assert_eq!(cred.bearer, "session-jwt");
        // Anonymous key still rides along in the apikey header
        assert_eq!(cred.api_key, "anon-key");
    }

    #[tokio::test]
    async fn logout_falls_back_to_anonymous() {
        let resolver = CredentialResolver::with_session(
            SecretString::from("anon-key"),
            SecretString::from("session-jwt"),
        );
        resolver.clear_session().await;

        let cred = resolver.resolve().await;
        assert_eq!(cred.bearer, "anon-key");
    }
}
