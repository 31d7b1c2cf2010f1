pub mod fulfillment;
pub mod health;

pub use fulfillment::{FulfillmentService, FulfillmentSettings, Intent};
