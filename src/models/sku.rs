use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::ServiceError;

/// Key of the synthesized list entry that aborts the purchase flow.
pub const CANCEL_OPTION_KEY: &str = "cancel";

/// Kind of digital product.
///
/// The commerce API spells these `SKU_TYPE_*`, while entitlement records use the
/// short form (`IN_APP`); both parse to the same variant. Values this service
/// does not know are kept verbatim so they can be echoed back to the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SkuType {
    InApp,
    Subscription,
    App,
    #[default]
    Unspecified,
    Other(String),
}

impl SkuType {
    pub fn as_str(&self) -> &str {
        match self {
            SkuType::InApp => "SKU_TYPE_IN_APP",
            SkuType::Subscription => "SKU_TYPE_SUBSCRIPTION",
            SkuType::App => "SKU_TYPE_APP",
            SkuType::Unspecified => "SKU_TYPE_UNSPECIFIED",
            SkuType::Other(raw) => raw,
        }
    }
}

impl From<&str> for SkuType {
    fn from(raw: &str) -> Self {
        match raw {
            "SKU_TYPE_IN_APP" | "IN_APP" => SkuType::InApp,
            "SKU_TYPE_SUBSCRIPTION" | "SUBSCRIPTION" => SkuType::Subscription,
            "SKU_TYPE_APP" | "APP" => SkuType::App,
            "SKU_TYPE_UNSPECIFIED" | "" => SkuType::Unspecified,
            other => SkuType::Other(other.to_string()),
        }
    }
}

impl From<String> for SkuType {
    fn from(raw: String) -> Self {
        SkuType::from(raw.as_str())
    }
}

impl From<SkuType> for String {
    fn from(sku_type: SkuType) -> Self {
        match sku_type {
            SkuType::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for SkuType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkuId {
    pub sku_type: SkuType,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
}

/// SKU metadata as returned by `skus:batchGet`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sku {
    pub sku_id: SkuId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub formatted_price: String,
}

impl Sku {
    pub fn option_key(&self) -> OptionKey {
        OptionKey {
            sku_type: self.sku_id.sku_type.clone(),
            id: self.sku_id.id.clone(),
        }
    }
}

/// List entry key `"{skuType},{id}"` identifying a product the user picked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionKey {
    pub sku_type: SkuType,
    pub id: String,
}

impl fmt::Display for OptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.sku_type, self.id)
    }
}

impl FromStr for OptionKey {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (sku_type, id) = s
            .split_once(',')
            .filter(|(sku_type, id)| !sku_type.is_empty() && !id.is_empty())
            .ok_or_else(|| ServiceError::InvalidInput(format!("malformed option key '{}'", s)))?;

        Ok(Self {
            sku_type: SkuType::from(sku_type),
            id: id.to_string(),
        })
    }
}

/// What the user picked from the product list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectedOption {
    Cancel,
    Product(OptionKey),
}

impl FromStr for SelectedOption {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == CANCEL_OPTION_KEY {
            Ok(SelectedOption::Cancel)
        } else {
            s.parse().map(SelectedOption::Product)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn sku_type_accepts_entitlement_spelling() {
        let long: SkuType = serde_json::from_value(json!("SKU_TYPE_IN_APP")).unwrap();
        let short: SkuType = serde_json::from_value(json!("IN_APP")).unwrap();
        assert_eq!(long, SkuType::InApp);
        assert_eq!(short, SkuType::InApp);
        assert_eq!(serde_json::to_value(short).unwrap(), json!("SKU_TYPE_IN_APP"));
    }

    #[test]
    fn unknown_sku_type_is_kept_verbatim() {
        let parsed: SkuType = serde_json::from_value(json!("SKU_TYPE_BUNDLE")).unwrap();
        assert_eq!(parsed, SkuType::Other("SKU_TYPE_BUNDLE".into()));
        assert_eq!(serde_json::to_value(&parsed).unwrap(), json!("SKU_TYPE_BUNDLE"));
    }

    #[test]
    fn unknown_sku_type_survives_option_key_round_trip() {
        let sku: Sku = serde_json::from_value(json!({
            "skuId": {"skuType": "SKU_TYPE_BUNDLE", "id": "pack"},
            "title": "Pack",
            "description": "Bundle",
            "formattedPrice": "$9.99"
        }))
        .unwrap();

        let rendered = sku.option_key().to_string();
        assert_eq!(rendered, "SKU_TYPE_BUNDLE,pack");

        let parsed: OptionKey = rendered.parse().unwrap();
        assert_eq!(parsed, sku.option_key());
        assert_eq!(parsed.sku_type.to_string(), "SKU_TYPE_BUNDLE");
    }

    #[test]
    fn sku_parses_batch_get_entry() {
        let sku: Sku = serde_json::from_value(json!({
            "skuId": {"skuType": "SKU_TYPE_IN_APP", "id": "premium", "packageName": "com.example"},
            "title": "Premium",
            "description": "Unlock everything",
            "formattedPrice": "$4.99",
            "price": {"currencyCode": "USD", "amountInMicros": "4990000"}
        }))
        .unwrap();

        assert_eq!(sku.option_key().to_string(), "SKU_TYPE_IN_APP,premium");
        assert_eq!(sku.formatted_price, "$4.99");
    }

    #[test]
    fn option_key_parses_type_and_id() {
        let key: OptionKey = "SKU_TYPE_SUBSCRIPTION,monthly".parse().unwrap();
        assert_eq!(key.sku_type, SkuType::Subscription);
        assert_eq!(key.id, "monthly");
    }

    #[test]
    fn option_key_keeps_everything_after_first_comma_as_id() {
        let key: OptionKey = "SKU_TYPE_IN_APP,pack,large".parse().unwrap();
        assert_eq!(key.id, "pack,large");
    }

    #[test]
    fn malformed_option_keys_are_rejected() {
        for raw in ["premium", ",premium", "SKU_TYPE_IN_APP,", ""] {
            assert_matches!(
                raw.parse::<OptionKey>(),
                Err(ServiceError::InvalidInput(_)),
                "{} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn cancel_is_recognized_before_key_parsing() {
        assert_eq!("cancel".parse::<SelectedOption>().unwrap(), SelectedOption::Cancel);
        assert_matches!(
            "SKU_TYPE_IN_APP,coins".parse::<SelectedOption>(),
            Ok(SelectedOption::Product(OptionKey { id, .. })) if id == "coins"
        );
    }
}
