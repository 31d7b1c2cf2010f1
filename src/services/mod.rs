pub mod commerce;

pub use commerce::{build_http_client, ActionsCommerceClient, CommerceApi};
