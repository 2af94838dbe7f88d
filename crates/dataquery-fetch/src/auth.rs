//! Authorization header sources.

use async_trait::async_trait;
use dataquery_types::{ErrorKind, FetchError};

/// Supplies the bearer token attached to every request.
///
/// Implementations that refresh tokens must be cheap to call repeatedly;
/// the client asks once per request.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns the current access token.
    async fn token(&self) -> Result<String, FetchError>;
}

/// A fixed, pre-issued bearer token.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    /// Wraps a token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(***)")
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String, FetchError> {
        if self.0.is_empty() {
            return Err(FetchError::new(ErrorKind::Client, "bearer token is empty"));
        }
        Ok(self.0.clone())
    }
}

/// `Authorization` header value for a token.
#[must_use]
pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}
