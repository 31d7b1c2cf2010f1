//! Client for the digital-goods commerce API.
//!
//! Each call authorizes, sends exactly one request and returns the outcome.
//! Nothing is retried: a transport error or non-2xx status fails the turn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::auth::TokenProvider;
use crate::errors::ServiceError;
use crate::models::{Sku, SkuType};

/// Remote operations the fulfillment flow depends on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommerceApi: Send + Sync {
    /// Fetches metadata for `ids` of the given type, in the order the API returns them.
    async fn batch_get_skus(
        &self,
        conversation_id: &str,
        sku_type: SkuType,
        ids: &[String],
    ) -> Result<Vec<Sku>, ServiceError>;

    /// Marks the purchase identified by `purchase_token` as consumed.
    async fn consume_entitlement(
        &self,
        conversation_id: &str,
        purchase_token: &str,
    ) -> Result<(), ServiceError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchGetSkusRequest<'a> {
    conversation_id: &'a str,
    sku_type: SkuType,
    ids: &'a [String],
}

#[derive(Debug, Default, Deserialize)]
struct BatchGetSkusResponse {
    #[serde(default)]
    skus: Vec<Sku>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConsumeEntitlementRequest<'a> {
    purchase_token: &'a str,
}

/// Builds the shared outbound client; `timeout` bounds every request.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, ServiceError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ServiceError::ConfigError(format!("failed to construct HTTP client: {}", e)))
}

/// [`CommerceApi`] over HTTPS with bearer credentials from a [`TokenProvider`].
#[derive(Clone)]
pub struct ActionsCommerceClient {
    http: reqwest::Client,
    base_url: String,
    package_name: String,
    tokens: Arc<dyn TokenProvider>,
}

impl ActionsCommerceClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        package_name: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            package_name: package_name.into(),
            tokens,
        }
    }

    fn skus_batch_get_url(&self) -> String {
        format!(
            "{}/packages/{}/skus:batchGet",
            self.base_url, self.package_name
        )
    }

    fn consume_url(&self, conversation_id: &str) -> String {
        format!(
            "{}/conversations/{}/entitlement:consume",
            self.base_url, conversation_id
        )
    }

    /// Authorizes and POSTs `body`, returning the raw response text of a 2xx reply.
    async fn post_json<B: Serialize + Sync>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<String, ServiceError> {
        let token = self.tokens.access_token().await?;

        let response = self
            .http
            .post(url)
            .bearer_auth(token.as_str())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        debug!(status = status.as_u16(), body = %text, "commerce API responded");

        if !status.is_success() {
            warn!(status = status.as_u16(), url, "commerce API request failed");
            return Err(ServiceError::ExternalApiError {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(text)
    }
}

#[async_trait]
impl CommerceApi for ActionsCommerceClient {
    #[instrument(skip(self, ids), fields(package = %self.package_name, count = ids.len()))]
    async fn batch_get_skus(
        &self,
        conversation_id: &str,
        sku_type: SkuType,
        ids: &[String],
    ) -> Result<Vec<Sku>, ServiceError> {
        let request = BatchGetSkusRequest {
            conversation_id,
            sku_type,
            ids,
        };
        let text = self.post_json(&self.skus_batch_get_url(), &request).await?;

        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let parsed: BatchGetSkusResponse = serde_json::from_str(&text)?;
        Ok(parsed.skus)
    }

    #[instrument(skip(self, purchase_token))]
    async fn consume_entitlement(
        &self,
        conversation_id: &str,
        purchase_token: &str,
    ) -> Result<(), ServiceError> {
        let request = ConsumeEntitlementRequest { purchase_token };
        self.post_json(&self.consume_url(conversation_id), &request)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AccessToken, MockTokenProvider};
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ActionsCommerceClient {
        let mut tokens = MockTokenProvider::new();
        tokens
            .expect_access_token()
            .returning(|| Ok(AccessToken::new("test-token")));
        ActionsCommerceClient::new(
            reqwest::Client::new(),
            format!("{}/v3/", server.uri()),
            "com.example.digitalgoods",
            Arc::new(tokens),
        )
    }

    fn ids() -> Vec<String> {
        vec!["premium".to_string(), "coins".to_string()]
    }

    #[tokio::test]
    async fn batch_get_posts_conversation_and_ids() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/packages/com.example.digitalgoods/skus:batchGet"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_json(json!({
                "conversationId": "conv-1",
                "skuType": "SKU_TYPE_IN_APP",
                "ids": ["premium", "coins"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "skus": [{
                    "skuId": {"skuType": "SKU_TYPE_IN_APP", "id": "premium", "packageName": "com.example.digitalgoods"},
                    "title": "Premium",
                    "description": "All features",
                    "formattedPrice": "$4.99"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let skus = client(&server)
            .batch_get_skus("conv-1", SkuType::InApp, &ids())
            .await
            .unwrap();

        assert_eq!(skus.len(), 1);
        assert_eq!(skus[0].title, "Premium");
    }

    #[tokio::test]
    async fn batch_get_without_skus_field_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let skus = client(&server)
            .batch_get_skus("conv-1", SkuType::InApp, &ids())
            .await
            .unwrap();
        assert!(skus.is_empty());
    }

    #[tokio::test]
    async fn non_success_status_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("backend unavailable"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server)
            .batch_get_skus("conv-1", SkuType::InApp, &ids())
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::ExternalApiError { status: 503, .. });
    }

    #[tokio::test]
    async fn unparseable_body_is_a_serialization_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client(&server)
            .batch_get_skus("conv-1", SkuType::InApp, &ids())
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::SerializationError(_));
    }

    #[tokio::test]
    async fn consume_posts_purchase_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/conversations/conv-9/entitlement:consume"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_json(json!({"purchaseToken": "token-coins"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .consume_entitlement("conv-9", "token-coins")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn authorization_failure_skips_the_api_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut tokens = MockTokenProvider::new();
        tokens
            .expect_access_token()
            .returning(|| Err(ServiceError::AuthError("invalid_grant".into())));
        let client = ActionsCommerceClient::new(
            reqwest::Client::new(),
            server.uri(),
            "com.example.digitalgoods",
            Arc::new(tokens),
        );

        let err = client
            .consume_entitlement("conv-1", "token")
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::AuthError(_));
    }

    #[test]
    fn http_client_builds_with_timeout() {
        assert!(build_http_client(Duration::from_secs(5)).is_ok());
    }
}
