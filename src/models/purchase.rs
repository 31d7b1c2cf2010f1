use serde::Deserialize;
use serde_json::Value;

/// Closing prompt when the platform did not report a usable purchase result.
pub const PURCHASE_RESULT_MISSING_MESSAGE: &str = "Purchase failed. Please check logs.";

/// Outcome of the platform's native purchase UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseStatus {
    Ok,
    AlreadyOwned,
    ItemUnavailable,
    ItemChangeRequested,
    /// Any status string this service has no dedicated message for
    Other(String),
}

impl From<&str> for PurchaseStatus {
    fn from(raw: &str) -> Self {
        match raw {
            "PURCHASE_STATUS_OK" => PurchaseStatus::Ok,
            "PURCHASE_STATUS_ALREADY_OWNED" => PurchaseStatus::AlreadyOwned,
            "PURCHASE_STATUS_ITEM_UNAVAILABLE" => PurchaseStatus::ItemUnavailable,
            "PURCHASE_STATUS_ITEM_CHANGE_REQUESTED" => PurchaseStatus::ItemChangeRequested,
            other => PurchaseStatus::Other(other.to_string()),
        }
    }
}

impl PurchaseStatus {
    pub fn closing_message(&self) -> String {
        match self {
            PurchaseStatus::Ok => "Purchase completed! You are all set!".to_string(),
            PurchaseStatus::AlreadyOwned => {
                "Purchase failed. You have already owned the item.".to_string()
            }
            PurchaseStatus::ItemUnavailable => "Purchase failed. Item is not available.".to_string(),
            PurchaseStatus::ItemChangeRequested => {
                "Purchase failed. Item change requested.".to_string()
            }
            PurchaseStatus::Other(raw) => format!("Purchase Failed:{}", raw),
        }
    }
}

/// Extension payload of the `COMPLETE_PURCHASE_VALUE` argument.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletePurchaseValue {
    #[serde(default)]
    pub purchase_status: Option<String>,
}

impl CompletePurchaseValue {
    /// Reads the status out of the raw argument; `None` when absent, malformed or empty.
    pub fn status_from_argument(argument: Option<&Value>) -> Option<PurchaseStatus> {
        let value = CompletePurchaseValue::deserialize(argument?).ok()?;
        value
            .purchase_status
            .filter(|status| !status.is_empty())
            .map(|status| PurchaseStatus::from(status.as_str()))
    }
}

/// Message that closes the conversation after the purchase UI returns.
pub fn purchase_outcome_message(argument: Option<&Value>) -> String {
    match CompletePurchaseValue::status_from_argument(argument) {
        Some(status) => status.closing_message(),
        None => PURCHASE_RESULT_MISSING_MESSAGE.to_string(),
    }
}
