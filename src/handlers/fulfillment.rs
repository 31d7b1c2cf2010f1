use axum::{extract::rejection::JsonRejection, extract::State, Json};
use std::str::FromStr;
use std::sync::Arc;
use strum::{AsRefStr, EnumString};
use tracing::{debug, info, instrument};

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::models::conversation::{
    find_entitlement, Conversation, COMPLETE_PURCHASE_ARGUMENT, OPTION_ARGUMENT,
    SCREEN_OUTPUT_CAPABILITY,
};
use crate::models::purchase::purchase_outcome_message;
use crate::models::sku::CANCEL_OPTION_KEY;
use crate::models::{
    Directive, ListItem, ListSelect, Reply, SelectedOption, Sku, SkuId, SkuType, WebhookRequest,
    WebhookResponse,
};
use crate::services::commerce::CommerceApi;
use crate::AppState;

pub const NO_SCREEN_PROMPT: &str =
    "Sorry, try this on a screen device or select the phone surface in the simulator.";
pub const CHOOSE_PRODUCT_PROMPT: &str = "Which product do you want to order?";
pub const NO_PRODUCTS_PROMPT: &str = "No products.";
pub const CANCELED_PROMPT: &str = "Canceled";
const PRODUCT_LIST_TITLE: &str = "Products";

/// Intents this webhook is registered for, keyed by display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
pub enum Intent {
    #[strum(serialize = "Gather information")]
    GatherInformation,
    #[strum(serialize = "actions.intent.OPTION")]
    SelectOption,
    #[strum(serialize = "actions.intent.COMPLETE_PURCHASE")]
    CompletePurchase,
}

/// Catalog and purchase-flow settings.
#[derive(Debug, Clone)]
pub struct FulfillmentSettings {
    pub package_name: String,
    pub product_ids: Vec<String>,
    pub consumable_product_ids: Vec<String>,
    pub consume_owned_consumables: bool,
}

impl From<&AppConfig> for FulfillmentSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            package_name: config.package_name.clone(),
            product_ids: config.product_ids.clone(),
            consumable_product_ids: config.consumable_product_ids.clone(),
            consume_owned_consumables: config.consume_owned_consumables,
        }
    }
}

impl FulfillmentSettings {
    pub fn is_consumable(&self, id: &str) -> bool {
        self.consumable_product_ids.iter().any(|c| c == id)
    }
}

/// Turns conversational turns into replies, calling the commerce API where needed.
#[derive(Clone)]
pub struct FulfillmentService {
    settings: FulfillmentSettings,
    commerce: Arc<dyn CommerceApi>,
}

impl FulfillmentService {
    pub fn new(settings: FulfillmentSettings, commerce: Arc<dyn CommerceApi>) -> Self {
        Self { settings, commerce }
    }

    /// Routes the turn to the handler for its intent.
    pub async fn fulfill<C>(&self, conv: &C) -> Result<Reply, ServiceError>
    where
        C: Conversation + Sync + ?Sized,
    {
        let intent = Intent::from_str(conv.intent())
            .map_err(|_| ServiceError::UnsupportedIntent(conv.intent().to_string()))?;
        info!(intent = intent.as_ref(), "handling intent");

        match intent {
            Intent::GatherInformation => self.list_products(conv).await,
            Intent::SelectOption => self.select_option(conv).await,
            Intent::CompletePurchase => Ok(self.complete_purchase(conv)),
        }
    }

    /// Offers the configured products as a selectable list.
    #[instrument(skip_all)]
    pub async fn list_products<C>(&self, conv: &C) -> Result<Reply, ServiceError>
    where
        C: Conversation + Sync + ?Sized,
    {
        if !conv.has_capability(SCREEN_OUTPUT_CAPABILITY) {
            return Ok(Reply::ask(NO_SCREEN_PROMPT));
        }

        let conversation_id = required_conversation_id(conv)?;
        let skus = self
            .commerce
            .batch_get_skus(conversation_id, SkuType::InApp, &self.settings.product_ids)
            .await?;
        debug!(count = skus.len(), "fetched skus");

        Ok(render_skus(&skus))
    }

    /// Handles the user's pick: cancel, consume an owned consumable, or start a purchase.
    #[instrument(skip_all)]
    pub async fn select_option<C>(&self, conv: &C) -> Result<Reply, ServiceError>
    where
        C: Conversation + Sync + ?Sized,
    {
        let raw = conv.text_argument(OPTION_ARGUMENT).ok_or_else(|| {
            ServiceError::InvalidInput(format!("missing {} argument", OPTION_ARGUMENT))
        })?;

        let key = match raw.parse::<SelectedOption>()? {
            SelectedOption::Cancel => return Ok(Reply::ask(CANCELED_PROMPT)),
            SelectedOption::Product(key) => key,
        };
        info!(sku_type = %key.sku_type, id = %key.id, "product selected");

        if self.settings.consume_owned_consumables && self.settings.is_consumable(&key.id) {
            let owned_token = find_entitlement(
                conv.package_entitlements(),
                &self.settings.package_name,
                &key.sku_type,
                &key.id,
            )
            .and_then(|entitlement| entitlement.purchase_token());

            if let Some(purchase_token) = owned_token {
                let conversation_id = required_conversation_id(conv)?;
                self.commerce
                    .consume_entitlement(conversation_id, purchase_token)
                    .await?;
                info!(id = %key.id, "consumed owned entitlement");
                return Ok(Reply::close(format!(
                    "You purchased {} successfully.",
                    key.id
                )));
            }
        }

        Ok(Reply::directive(Directive::CompletePurchase(SkuId {
            sku_type: key.sku_type,
            id: key.id,
            package_name: Some(self.settings.package_name.clone()),
        })))
    }

    /// Closes the conversation with the outcome of the native purchase UI.
    pub fn complete_purchase<C>(&self, conv: &C) -> Reply
    where
        C: Conversation + ?Sized,
    {
        let argument = conv.extension_argument(COMPLETE_PURCHASE_ARGUMENT);
        debug!(argument = ?argument, "purchase result");
        Reply::close(purchase_outcome_message(argument))
    }
}

fn required_conversation_id<C>(conv: &C) -> Result<&str, ServiceError>
where
    C: Conversation + ?Sized,
{
    conv.conversation_id()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ServiceError::InvalidInput("missing conversation id".to_string()))
}

/// Product list with one entry per SKU plus a trailing cancel entry; a bare prompt when empty.
pub fn render_skus(skus: &[Sku]) -> Reply {
    if skus.is_empty() {
        return Reply::ask(NO_PRODUCTS_PROMPT);
    }

    let items = skus
        .iter()
        .map(|sku| ListItem {
            key: sku.option_key().to_string(),
            title: sku.title.clone(),
            description: format!("{} | {}", sku.description, sku.formatted_price),
        })
        .chain(std::iter::once(ListItem {
            key: CANCEL_OPTION_KEY.to_string(),
            title: "Cancel".to_string(),
            description: "Cancel purchase".to_string(),
        }))
        .collect();

    Reply::ask(CHOOSE_PRODUCT_PROMPT).with_directive(Directive::List(ListSelect {
        title: PRODUCT_LIST_TITLE.to_string(),
        items,
    }))
}

// POST /fulfillment
pub async fn fulfillment_webhook(
    State(state): State<AppState>,
    payload: Result<Json<WebhookRequest>, JsonRejection>,
) -> Result<Json<WebhookResponse>, ServiceError> {
    let Json(request) = payload.map_err(|rejection| {
        ServiceError::InvalidInput(format!("unreadable webhook request: {}", rejection.body_text()))
    })?;
    debug!(request = ?request, "webhook request");

    let reply = state.fulfillment.fulfill(&request).await?;
    let response = WebhookResponse::from(&reply);

    debug!(response = ?response, "webhook response");
    Ok(Json(response))
}
