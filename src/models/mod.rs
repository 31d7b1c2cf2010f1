pub mod conversation;
pub mod purchase;
pub mod response;
pub mod sku;

pub use conversation::{Conversation, PackageEntitlements, WebhookRequest};
pub use purchase::PurchaseStatus;
pub use response::{Directive, ListItem, ListSelect, Reply, WebhookResponse};
pub use sku::{OptionKey, SelectedOption, Sku, SkuId, SkuType};
