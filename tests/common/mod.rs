#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::MockServer;

use digital_goods_fulfillment::{
    app_router,
    auth::{AccessToken, TokenProvider},
    config::AppConfig,
    errors::ServiceError,
    handlers::{FulfillmentService, FulfillmentSettings},
    services::ActionsCommerceClient,
    AppState,
};

pub const PACKAGE: &str = "com.example.digitalgoods";
pub const CONVERSATION_ID: &str = "conv-1";
pub const ACCESS_TOKEN: &str = "ya29.integration";

/// Hands out a fixed bearer token.
pub struct StaticTokenProvider;

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<AccessToken, ServiceError> {
        Ok(AccessToken::new(ACCESS_TOKEN))
    }
}

/// Always fails, as an unreachable or misconfigured token endpoint would.
pub struct FailingTokenProvider;

#[async_trait]
impl TokenProvider for FailingTokenProvider {
    async fn access_token(&self) -> Result<AccessToken, ServiceError> {
        Err(ServiceError::AuthError("invalid_grant".into()))
    }
}

pub fn test_config(server: &MockServer) -> AppConfig {
    let mut config = AppConfig::new(PACKAGE.to_string(), "/unused/key.json".to_string());
    config.actions_api_base_url = format!("{}/v3", server.uri());
    config
}

pub fn build_app(config: AppConfig, tokens: Arc<dyn TokenProvider>) -> Router {
    let commerce = ActionsCommerceClient::new(
        reqwest::Client::new(),
        config.api_base_url(),
        config.package_name.clone(),
        tokens,
    );
    let fulfillment =
        FulfillmentService::new(FulfillmentSettings::from(&config), Arc::new(commerce));
    app_router(AppState::new(fulfillment))
}

pub fn setup_test_app(server: &MockServer) -> Router {
    build_app(test_config(server), Arc::new(StaticTokenProvider))
}

/// Platform request for `intent` on a screen surface.
pub fn turn(intent: &str) -> Value {
    json!({
        "responseId": "resp-1",
        "session": "projects/demo/agent/sessions/abc",
        "queryResult": {
            "queryText": "test",
            "intent": {"name": "projects/demo/agent/intents/1", "displayName": intent}
        },
        "originalDetectIntentRequest": {
            "source": "google",
            "version": "2",
            "payload": {
                "user": {"locale": "en-US", "packageEntitlements": []},
                "conversation": {"conversationId": CONVERSATION_ID, "type": "ACTIVE"},
                "inputs": [{"intent": "actions.intent.TEXT", "arguments": []}],
                "surface": {
                    "capabilities": [
                        {"name": "actions.capability.AUDIO_OUTPUT"},
                        {"name": "actions.capability.SCREEN_OUTPUT"}
                    ]
                }
            }
        }
    })
}

pub fn with_argument(mut request: Value, argument: Value) -> Value {
    request["originalDetectIntentRequest"]["payload"]["inputs"][0]["arguments"]
        .as_array_mut()
        .expect("arguments array")
        .push(argument);
    request
}

pub fn with_entitlement(mut request: Value, sku: &str, token: &str) -> Value {
    request["originalDetectIntentRequest"]["payload"]["user"]["packageEntitlements"] = json!([{
        "packageName": PACKAGE,
        "entitlements": [{
            "sku": sku,
            "skuType": "IN_APP",
            "inAppDetails": {
                "inAppPurchaseData": {"purchaseToken": token},
                "inAppDataSignature": "sig"
            }
        }]
    }]);
    request
}

pub fn without_screen(mut request: Value) -> Value {
    request["originalDetectIntentRequest"]["payload"]["surface"]["capabilities"] =
        json!([{"name": "actions.capability.AUDIO_OUTPUT"}]);
    request
}

pub async fn post_webhook(app: Router, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/fulfillment")
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

/// Spoken prompts of a successful webhook response.
pub fn prompts(body: &Value) -> Vec<String> {
    body["payload"]["google"]["richResponse"]["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["simpleResponse"]["textToSpeech"].as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
