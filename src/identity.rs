//! Signed-in identity for the remote services
//!
//! Every turn, save, list and fetch call asks the `CredentialProvider` for
//! the current identity first. A missing or expired credential becomes
//! `Error::Unauthenticated` before any request is built.

use async_trait::async_trait;
use jsonwebtoken::{DecodingKey, Validation, decode, decode_header};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::config::Credentials;
use crate::{Error, Result};

/// The signed-in user and the bearer token for their requests
#[derive(Debug)]
pub struct Identity {
    /// Stable user id understood by the turn and persistence services
    pub user_id: String,

    /// Bearer token
    pub token: SecretString,
}

impl Identity {
    /// Create an identity
    #[must_use]
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: SecretString::from(token.into()),
        }
    }

    /// Authorization header value
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token.expose_secret())
    }
}

/// Supplies the current identity per call
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Current identity, or `None` when nobody is signed in
    async fn identity(&self) -> Option<Identity>;

    /// Current identity or `Error::Unauthenticated`
    ///
    /// # Errors
    ///
    /// Returns `Unauthenticated` when no usable credential is available
    async fn require(&self) -> Result<Identity> {
        self.identity().await.ok_or(Error::Unauthenticated)
    }
}

/// Fixed identity taken from configuration
#[derive(Debug, Default)]
pub struct StaticCredentials {
    identity: Option<Identity>,
}

impl StaticCredentials {
    /// Signed in as `identity`
    #[must_use]
    pub const fn new(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
        }
    }

    /// Nobody signed in
    #[must_use]
    pub const fn signed_out() -> Self {
        Self { identity: None }
    }

    /// Build from configured credentials; both user id and token are required
    #[must_use]
    pub fn from_config(credentials: &Credentials) -> Self {
        match (&credentials.user_id, &credentials.token) {
            (Some(user_id), Some(token)) => Self::new(Identity {
                user_id: user_id.clone(),
                token: SecretString::from(token.expose_secret().to_string()),
            }),
            _ => {
                tracing::debug!("no complete credentials configured, running signed out");
                Self::signed_out()
            }
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn identity(&self) -> Option<Identity> {
        let identity = self.identity.as_ref()?;

        if token_expired(identity.token.expose_secret()) {
            tracing::warn!(user_id = %identity.user_id, "identity token has expired");
            return None;
        }

        Some(Identity {
            user_id: identity.user_id.clone(),
            token: SecretString::from(identity.token.expose_secret().to_string()),
        })
    }
}

#[derive(Deserialize)]
struct ExpiryClaims {
    #[allow(dead_code)]
    exp: u64,
}

/// Check the `exp` claim of a JWT without verifying its signature
///
/// The remote services verify the token; this only avoids sending one that
/// is certain to be rejected. Opaque (non-JWT) tokens are never considered
/// expired.
#[must_use]
pub fn token_expired(token: &str) -> bool {
    let Ok(header) = decode_header(token) else {
        return false;
    };

    let mut validation = Validation::new(header.alg);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = true;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    validation.required_spec_claims.insert("exp".to_string());

    match decode::<ExpiryClaims>(token, &DecodingKey::from_secret(&[]), &validation) {
        Ok(_) => false,
        Err(e) => matches!(e.kind(), jsonwebtoken::errors::ErrorKind::ExpiredSignature),
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde::Serialize;

    use super::*;

    #[derive(Serialize)]
    struct Claims {
        sub: String,
        exp: u64,
    }

    fn jwt_expiring_at(exp: i64) -> String {
        let claims = Claims {
            sub: "user-1".to_string(),
            exp: u64::try_from(exp).unwrap(),
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(b"test")).unwrap()
    }

    #[test]
    fn opaque_tokens_never_expire() {
        assert!(!token_expired("opaque-token"));
        assert!(!token_expired(""));
    }

    #[test]
    fn future_jwt_is_valid() {
        let token = jwt_expiring_at(chrono::Utc::now().timestamp() + 3600);
        assert!(!token_expired(&token));
    }

    #[test]
    fn past_jwt_is_expired() {
        let token = jwt_expiring_at(chrono::Utc::now().timestamp() - 3600);
        assert!(token_expired(&token));
    }

    #[test]
    fn bearer_header_value() {
        let identity = Identity::new("user-1", "abc");
        assert_eq!(identity.bearer(), "Bearer abc");
    }

    #[tokio::test]
    async fn signed_out_requires_fails() {
        let provider = StaticCredentials::signed_out();
        assert!(provider.identity().await.is_none());
        assert!(matches!(provider.require().await, Err(Error::Unauthenticated)));
    }

    #[tokio::test]
    async fn expired_token_is_unauthenticated() {
        let token = jwt_expiring_at(chrono::Utc::now().timestamp() - 3600);
        let provider = StaticCredentials::new(Identity::new("user-1", token));
        assert!(matches!(provider.require().await, Err(Error::Unauthenticated)));
    }

    #[tokio::test]
    async fn from_config_requires_both_parts() {
        let partial = Credentials {
            user_id: Some("user-1".to_string()),
            token: None,
        };
        assert!(StaticCredentials::from_config(&partial).identity().await.is_none());

        let full = Credentials {
            user_id: Some("user-1".to_string()),
            token: Some(SecretString::from("tok".to_string())),
        };
        let identity = StaticCredentials::from_config(&full).require().await.unwrap();
        assert_eq!(identity.user_id, "user-1");
        assert_eq!(identity.token.expose_secret(), "tok");
    }
}
