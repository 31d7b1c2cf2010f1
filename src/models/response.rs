//! Outbound reply: what to say, whether the mic stays open, and any platform directive.

use serde::Serialize;
use serde_json::{json, Value};

use super::sku::SkuId;

const OPTION_INTENT: &str = "actions.intent.OPTION";
const OPTION_VALUE_SPEC_TYPE: &str = "type.googleapis.com/google.actions.v2.OptionValueSpec";
const COMPLETE_PURCHASE_INTENT: &str = "actions.intent.COMPLETE_PURCHASE";
const COMPLETE_PURCHASE_VALUE_SPEC_TYPE: &str =
    "type.googleapis.com/google.actions.transactions.v3.CompletePurchaseValueSpec";
/// The platform rejects a system intent without at least one simple response.
const PLACEHOLDER_PROMPT: &str = "PLACEHOLDER";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    pub key: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListSelect {
    pub title: String,
    pub items: Vec<ListItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Render a selectable list; the pick comes back as `actions.intent.OPTION`
    List(ListSelect),
    /// Hand over to the native purchase UI for this SKU
    CompletePurchase(SkuId),
}

/// Next step of the conversation produced by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    expect_user_response: bool,
    prompts: Vec<String>,
    directive: Option<Directive>,
}

impl Reply {
    /// Speak `prompt` and keep the conversation open.
    pub fn ask(prompt: impl Into<String>) -> Self {
        Self {
            expect_user_response: true,
            prompts: vec![prompt.into()],
            directive: None,
        }
    }

    /// Speak `prompt` and end the conversation.
    pub fn close(prompt: impl Into<String>) -> Self {
        Self {
            expect_user_response: false,
            prompts: vec![prompt.into()],
            directive: None,
        }
    }

    /// Issue `directive` with no spoken prompt of its own.
    pub fn directive(directive: Directive) -> Self {
        Self {
            expect_user_response: true,
            prompts: Vec::new(),
            directive: Some(directive),
        }
    }

    pub fn with_directive(mut self, directive: Directive) -> Self {
        self.directive = Some(directive);
        self
    }

    pub fn expects_user_response(&self) -> bool {
        self.expect_user_response
    }

    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    pub fn directive_ref(&self) -> Option<&Directive> {
        self.directive.as_ref()
    }

    pub fn list(&self) -> Option<&ListSelect> {
        match &self.directive {
            Some(Directive::List(list)) => Some(list),
            _ => None,
        }
    }
}

/// Fulfillment response body in the platform's wire format.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookResponse {
    pub payload: ResponsePayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponsePayload {
    pub google: GooglePayload,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GooglePayload {
    pub expect_user_response: bool,
    pub rich_response: RichResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_intent: Option<SystemIntent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RichResponse {
    pub items: Vec<RichResponseItem>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RichResponseItem {
    pub simple_response: SimpleResponse,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleResponse {
    pub text_to_speech: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemIntent {
    pub intent: String,
    pub data: Value,
}

impl From<&Directive> for SystemIntent {
    fn from(directive: &Directive) -> Self {
        match directive {
            Directive::List(list) => {
                let items: Vec<Value> = list
                    .items
                    .iter()
                    .map(|item| {
                        json!({
                            "optionInfo": {"key": item.key, "synonyms": []},
                            "title": item.title,
                            "description": item.description,
                        })
                    })
                    .collect();
                SystemIntent {
                    intent: OPTION_INTENT.to_string(),
                    data: json!({
                        "@type": OPTION_VALUE_SPEC_TYPE,
                        "listSelect": {"title": list.title, "items": items},
                    }),
                }
            }
            Directive::CompletePurchase(sku_id) => SystemIntent {
                intent: COMPLETE_PURCHASE_INTENT.to_string(),
                data: json!({
                    "@type": COMPLETE_PURCHASE_VALUE_SPEC_TYPE,
                    "skuId": sku_id,
                }),
            },
        }
    }
}

impl From<&Reply> for WebhookResponse {
    fn from(reply: &Reply) -> Self {
        let mut prompts = reply.prompts.clone();
        if prompts.is_empty() && reply.directive.is_some() {
            prompts.push(PLACEHOLDER_PROMPT.to_string());
        }

        let items = prompts
            .into_iter()
            .map(|text_to_speech| RichResponseItem {
                simple_response: SimpleResponse { text_to_speech },
            })
            .collect();

        WebhookResponse {
            payload: ResponsePayload {
                google: GooglePayload {
                    expect_user_response: reply.expect_user_response,
                    rich_response: RichResponse { items },
                    system_intent: reply.directive.as_ref().map(SystemIntent::from),
                },
            },
        }
    }
}

impl From<Reply> for WebhookResponse {
    fn from(reply: Reply) -> Self {
        WebhookResponse::from(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sku::SkuType;

    #[test]
    fn close_ends_conversation_with_single_prompt() {
        let body = serde_json::to_value(WebhookResponse::from(Reply::close("Bye"))).unwrap();
        assert_eq!(
            body,
            json!({
                "payload": {"google": {
                    "expectUserResponse": false,
                    "richResponse": {"items": [{"simpleResponse": {"textToSpeech": "Bye"}}]}
                }}
            })
        );
    }

    #[test]
    fn list_directive_becomes_option_system_intent() {
        let reply = Reply::ask("Pick one").with_directive(Directive::List(ListSelect {
            title: "Products".into(),
            items: vec![ListItem {
                key: "cancel".into(),
                title: "Cancel".into(),
                description: "Cancel purchase".into(),
            }],
        }));
        let body = serde_json::to_value(WebhookResponse::from(&reply)).unwrap();
        let google = &body["payload"]["google"];

        assert_eq!(google["expectUserResponse"], true);
        assert_eq!(google["systemIntent"]["intent"], "actions.intent.OPTION");
        assert_eq!(google["systemIntent"]["data"]["@type"], OPTION_VALUE_SPEC_TYPE);
        assert_eq!(
            google["systemIntent"]["data"]["listSelect"]["items"][0]["optionInfo"]["key"],
            "cancel"
        );
    }

    #[test]
    fn purchase_directive_gets_placeholder_prompt() {
        let reply = Reply::directive(Directive::CompletePurchase(SkuId {
            sku_type: SkuType::InApp,
            id: "premium".into(),
            package_name: Some("com.example".into()),
        }));
        let body = serde_json::to_value(WebhookResponse::from(reply)).unwrap();
        let google = &body["payload"]["google"];

        assert_eq!(
            google["richResponse"]["items"][0]["simpleResponse"]["textToSpeech"],
            "PLACEHOLDER"
        );
        assert_eq!(
            google["systemIntent"]["data"]["skuId"],
            json!({"skuType": "SKU_TYPE_IN_APP", "id": "premium", "packageName": "com.example"})
        );
    }
}
