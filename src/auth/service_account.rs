use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, error, instrument};

use super::{AccessToken, TokenProvider, PURCHASES_SCOPE};
use crate::errors::ServiceError;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Service-account key file as downloaded from the cloud console.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountKey {
    pub fn from_json(raw: &str) -> Result<Self, ServiceError> {
        serde_json::from_str(raw)
            .map_err(|e| ServiceError::ConfigError(format!("invalid service account key: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ServiceError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ServiceError::ConfigError(format!(
                "cannot read service account key {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&raw)
    }
}

/// Claims of the self-signed assertion exchanged for an access token.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Obtains bearer tokens with the OAuth2 JWT-bearer grant.
///
/// Every call signs a fresh assertion and performs one token exchange.
#[derive(Clone)]
pub struct ServiceAccountAuthorizer {
    http: reqwest::Client,
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    scope: String,
}

impl fmt::Debug for ServiceAccountAuthorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountAuthorizer")
            .field("key", &self.key)
            .field("scope", &self.scope)
            .finish()
    }
}

impl ServiceAccountAuthorizer {
    pub fn new(key: ServiceAccountKey, http: reqwest::Client) -> Result<Self, ServiceError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|e| {
            ServiceError::ConfigError(format!("service account private key is not valid PEM: {}", e))
        })?;

        Ok(Self {
            http,
            key,
            encoding_key,
            scope: PURCHASES_SCOPE.to_string(),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    /// Signs the RS256 assertion for a token request issued at `issued_at` (unix seconds).
    pub fn assertion(&self, issued_at: i64) -> Result<String, ServiceError> {
        let claims = AssertionClaims {
            iss: self.key.client_email.clone(),
            scope: self.scope.clone(),
            aud: self.key.token_uri.clone(),
            iat: issued_at,
            exp: issued_at + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        Ok(encode(&header, &claims, &self.encoding_key)?)
    }
}

#[async_trait]
impl TokenProvider for ServiceAccountAuthorizer {
    #[instrument(skip(self), fields(client_email = %self.key.client_email))]
    async fn access_token(&self) -> Result<AccessToken, ServiceError> {
        let assertion = self.assertion(Utc::now().timestamp())?;

        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", JWT_BEARER_GRANT_TYPE),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ServiceError::AuthError(format!("token request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::AuthError(format!("token response unreadable: {}", e)))?;

        if !status.is_success() {
            error!(status = status.as_u16(), "token endpoint rejected assertion");
            return Err(ServiceError::AuthError(format!(
                "token endpoint returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| ServiceError::AuthError(format!("malformed token response: {}", e)))?;
        debug!(expires_in = ?token.expires_in, "obtained access token");

        Ok(AccessToken::new(token.access_token))
    }
}
