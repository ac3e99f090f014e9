//! Credential resolution contract.
//!
//! OAuth acquisition and refresh live outside the engine; all it needs
//! is a currently valid bearer credential for a user at call time.

use async_trait::async_trait;
use calmir_core::error::CalmirResult;
use calmir_core::remote::AccessToken;

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// A currently valid bearer credential for the user, or
    /// `MissingAccessToken` when none can be produced.
    async fn access_token(&self, user_id: &str) -> CalmirResult<AccessToken>;
}

/// Fixed-token provider for tests and single-tenant setups.
pub struct StaticCredentials {
    token: AccessToken,
}

impl StaticCredentials {
    pub fn new(secret: impl Into<String>) -> StaticCredentials {
        StaticCredentials {
            token: AccessToken::new(secret),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn access_token(&self, _user_id: &str) -> CalmirResult<AccessToken> {
        Ok(self.token.clone())
    }
}
