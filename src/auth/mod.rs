/*!
 * # Commerce API Authorization
 *
 * Bearer credentials for outbound commerce calls. The production provider is
 * [`ServiceAccountAuthorizer`], which signs a service-account assertion and
 * exchanges it at the key's token endpoint.
 */

use async_trait::async_trait;
use std::fmt;

use crate::errors::ServiceError;

pub mod service_account;

pub use service_account::{ServiceAccountAuthorizer, ServiceAccountKey};

/// OAuth2 scope granting access to digital purchases.
pub const PURCHASES_SCOPE: &str = "https://www.googleapis.com/auth/actions.purchases.digital";

/// Opaque bearer token; never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<AccessToken, ServiceError>;
}
