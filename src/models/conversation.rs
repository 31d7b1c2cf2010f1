//! Inbound webhook payload and the narrow read-only view handlers work against.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use super::sku::SkuType;

/// Surface capability required to render a selectable list.
pub const SCREEN_OUTPUT_CAPABILITY: &str = "actions.capability.SCREEN_OUTPUT";
/// Argument carrying the key of the list entry the user picked.
pub const OPTION_ARGUMENT: &str = "OPTION";
/// Argument carrying the result of the native purchase UI.
pub const COMPLETE_PURCHASE_ARGUMENT: &str = "COMPLETE_PURCHASE_VALUE";

/// The parts of a conversational turn the fulfillment logic reads.
pub trait Conversation {
    /// Display name of the matched intent
    fn intent(&self) -> &str;

    fn has_capability(&self, capability: &str) -> bool;

    fn conversation_id(&self) -> Option<&str>;

    /// Text value of a named argument
    fn text_argument(&self, name: &str) -> Option<&str>;

    /// Structured extension value of a named argument
    fn extension_argument(&self, name: &str) -> Option<&Value>;

    /// The user's entitlements, grouped by package
    fn package_entitlements(&self) -> &[PackageEntitlements];
}

/// Parses each element on its own and drops the ones that do not fit `T`.
///
/// Entitlement records belong to the platform and may be partial; one bad
/// record must not make the whole turn unreadable.
fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                debug!(error = %err, "skipping unreadable entitlement record");
                None
            }
        })
        .collect())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageEntitlements {
    #[serde(default)]
    pub package_name: String,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub entitlements: Vec<Entitlement>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entitlement {
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub sku_type: SkuType,
    #[serde(default)]
    pub in_app_details: Option<InAppDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InAppDetails {
    #[serde(default)]
    pub in_app_purchase_data: Option<InAppPurchaseData>,
    #[serde(default)]
    pub in_app_data_signature: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InAppPurchaseData {
    #[serde(default)]
    pub purchase_token: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
}

impl Entitlement {
    pub fn purchase_token(&self) -> Option<&str> {
        self.in_app_details
            .as_ref()
            .and_then(|details| details.in_app_purchase_data.as_ref())
            .and_then(|data| data.purchase_token.as_deref())
            .filter(|token| !token.is_empty())
    }
}

/// Finds the entitlement for `sku_id` inside the group belonging to `package_name`.
pub fn find_entitlement<'a>(
    groups: &'a [PackageEntitlements],
    package_name: &str,
    sku_type: &SkuType,
    sku_id: &str,
) -> Option<&'a Entitlement> {
    groups
        .iter()
        .find(|group| group.package_name == package_name)?
        .entitlements
        .iter()
        .find(|entitlement| &entitlement.sku_type == sku_type && entitlement.sku == sku_id)
}

/// Fulfillment request posted by the conversational platform.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRequest {
    #[serde(default)]
    pub response_id: Option<String>,
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub query_result: QueryResult,
    #[serde(default)]
    pub original_detect_intent_request: Option<OriginalDetectIntentRequest>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    #[serde(default)]
    pub query_text: Option<String>,
    #[serde(default)]
    pub intent: Option<IntentRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentRef {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginalDetectIntentRequest {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub payload: AppRequest,
}

/// Assistant-side part of the request: surface, user and raw inputs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRequest {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub conversation: Option<ConversationInfo>,
    #[serde(default)]
    pub inputs: Vec<Input>,
    #[serde(default)]
    pub surface: Option<Surface>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub package_entitlements: Vec<PackageEntitlements>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationInfo {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default, rename = "type")]
    pub conversation_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Input {
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub arguments: Vec<Argument>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Argument {
    pub name: String,
    #[serde(default)]
    pub text_value: Option<String>,
    #[serde(default)]
    pub extension: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Surface {
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Capability {
    pub name: String,
}

impl WebhookRequest {
    fn app_request(&self) -> Option<&AppRequest> {
        self.original_detect_intent_request
            .as_ref()
            .map(|original| &original.payload)
    }

    fn find_argument(&self, name: &str) -> Option<&Argument> {
        self.app_request()?
            .inputs
            .iter()
            .flat_map(|input| input.arguments.iter())
            .find(|argument| argument.name == name)
    }
}

impl Conversation for WebhookRequest {
    fn intent(&self) -> &str {
        self.query_result
            .intent
            .as_ref()
            .map(|intent| intent.display_name.as_str())
            .unwrap_or_default()
    }

    fn has_capability(&self, capability: &str) -> bool {
        self.app_request()
            .and_then(|request| request.surface.as_ref())
            .map(|surface| surface.capabilities.iter().any(|c| c.name == capability))
            .unwrap_or(false)
    }

    fn conversation_id(&self) -> Option<&str> {
        self.app_request()?
            .conversation
            .as_ref()?
            .conversation_id
            .as_deref()
    }

    fn text_argument(&self, name: &str) -> Option<&str> {
        self.find_argument(name)?.text_value.as_deref()
    }

    fn extension_argument(&self, name: &str) -> Option<&Value> {
        self.find_argument(name)?.extension.as_ref()
    }

    fn package_entitlements(&self) -> &[PackageEntitlements] {
        self.app_request()
            .and_then(|request| request.user.as_ref())
            .map(|user| user.package_entitlements.as_slice())
            .unwrap_or(&[])
    }
}
