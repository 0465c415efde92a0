//! Bearer token gate.
//!
//! When enabled, every plan route requires `Authorization: Bearer <token>`.
//! Verification sits behind [`TokenVerifier`] so an identity provider can be
//! plugged in; the bundled [`StaticTokenVerifier`] accepts a fixed set of
//! tokens from configuration. Probe and metrics routes bypass the gate.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use http::header::AUTHORIZATION;
use http::HeaderMap;
use thiserror::Error;

/// Why a request was refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No `Authorization` header.
    #[error("missing bearer token")]
    Missing,
    /// The header is not `Bearer <token>`.
    #[error("malformed authorization header")]
    Malformed,
    /// The verifier rejected the token.
    #[error("invalid bearer token")]
    Rejected,
}

impl AuthError {
    /// Metric label for the failure.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Malformed => "malformed",
            Self::Rejected => "invalid",
        }
    }
}

/// Checks a bearer token and names its subject.
#[async_trait]
pub trait TokenVerifier: Send + Sync + 'static {
    /// Returns the subject the token identifies.
    async fn verify(&self, token: &str) -> Result<String, AuthError>;
}

/// Accepts tokens from a fixed set.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashSet<String>,
}

impl StaticTokenVerifier {
    /// Builds a verifier from configured tokens; blank entries are ignored.
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(Into::into)
                .filter(|t: &String| !t.trim().is_empty())
                .collect(),
        }
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<String, AuthError> {
        if self.tokens.contains(token) {
            Ok("static-token".to_string())
        } else {
            Err(AuthError::Rejected)
        }
    }
}

/// Extracts bearer tokens and hands them to a verifier.
#[derive(Clone)]
pub struct BearerAuth {
    verifier: Arc<dyn TokenVerifier>,
}

impl std::fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuth").finish_non_exhaustive()
    }
}

impl BearerAuth {
    /// Creates a gate over `verifier`.
    #[must_use]
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { verifier }
    }

    /// Authenticates a request by its headers, returning the subject.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<String, AuthError> {
        let token = bearer_token(headers)?;
        self.verifier.verify(token).await
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers.get(AUTHORIZATION).ok_or(AuthError::Missing)?;
    let value = value.to_str().map_err(|_| AuthError::Malformed)?;
    let (scheme, token) = value.trim().split_once(' ').ok_or(AuthError::Malformed)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::Malformed);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    fn gate() -> BearerAuth {
        BearerAuth::new(Arc::new(StaticTokenVerifier::new(["s3cret", " "])))
    }

    #[tokio::test]
    async fn test_accepts_known_token() {
        let subject = gate().authenticate(&headers("Bearer s3cret")).await.unwrap();
        assert_eq!(subject, "static-token");

        // Scheme is case-insensitive.
        assert!(gate().authenticate(&headers("bearer s3cret")).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejections() {
        let gate = gate();
        assert_eq!(
            gate.authenticate(&HeaderMap::new()).await,
            Err(AuthError::Missing)
        );
        assert_eq!(
            gate.authenticate(&headers("Basic dXNlcjpwdw==")).await,
            Err(AuthError::Malformed)
        );
        assert_eq!(
            gate.authenticate(&headers("Bearer")).await,
            Err(AuthError::Malformed)
        );
        assert_eq!(
            gate.authenticate(&headers("Bearer nope")).await,
            Err(AuthError::Rejected)
        );
        assert_eq!(
            gate.authenticate(&headers("Bearer  ")).await,
            Err(AuthError::Malformed)
        );
    }

    #[test]
    fn test_reason_labels() {
        assert_eq!(AuthError::Missing.reason(), "missing");
        assert_eq!(AuthError::Rejected.reason(), "invalid");
    }
}
