//! Caller identity.
//!
//! Sessions are HS256 bearer tokens whose `sub` claim is the user identifier.
//! A missing, malformed or expired token simply means "no caller": mutations
//! then fail with `Unauthenticated` and listings come back empty.

use std::time::Duration;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User identifier
    pub sub: String,
    pub iat: u64,
    pub exp: u64,
}

#[derive(Clone)]
pub struct Identity {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl Identity {
    #[must_use]
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::default();
        validation.validate_exp = true;
        validation.leeway = 0;
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Issues a session token for `user_id` valid for `ttl`.
    pub fn issue(&self, user_id: &str, ttl: Duration) -> Result<String, jsonwebtoken::errors::Error> {
        let iat = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
        let claims = Claims {
            sub: user_id.to_owned(),
            iat,
            exp: iat.saturating_add(ttl.as_secs()),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
    }

    /// Resolves a token to its user, `None` when it does not verify.
    #[must_use]
    pub fn resolve(&self, token: &str) -> Option<String> {
        match decode::<Claims>(token, &self.decoding_key, &self.validation) {
            Ok(data) if !data.claims.sub.is_empty() => Some(data.claims.sub),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("session token rejected: {e}");
                None
            }
        }
    }
}

/// The resolved caller of a request, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub Option<String>);

impl Caller {
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .and_then(|token| state.identity.resolve(token.trim()));
        Ok(Caller(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn issued_token_resolves() {
        // Arrange
        let identity = Identity::new("secret");
        let token = identity.issue("alice", HOUR).unwrap();

        // Act
        let user = identity.resolve(&token);

        // Assert
        assert_eq!(user.as_deref(), Some("alice"));
    }

    #[test]
    fn foreign_token_rejected() {
        // Arrange
        let token = Identity::new("other").issue("alice", HOUR).unwrap();

        // Act
        let user = Identity::new("secret").resolve(&token);

        // Assert
        assert!(user.is_none());
    }

    #[test]
    fn expired_token_rejected() {
        // Arrange
        let identity = Identity::new("secret");
        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap();
        let claims = Claims {
            sub: "alice".to_owned(),
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = encode(&Header::default(), &claims, &identity.encoding_key).unwrap();

        // Act
        let user = identity.resolve(&token);

        // Assert
        assert!(user.is_none());
    }

    #[test]
    fn garbage_rejected() {
        // Act
        let user = Identity::new("secret").resolve("not.a.token");

        // Assert
        assert!(user.is_none());
    }

    #[test]
    fn empty_subject_rejected() {
        // Arrange
        let identity = Identity::new("secret");
        let token = identity.issue("", HOUR).unwrap();

        // Act
        let user = identity.resolve(&token);

        // Assert
        assert!(user.is_none());
    }
}
