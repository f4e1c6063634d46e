use serde::{Deserialize, Serialize};

pub mod auto_reply;
pub mod conversation;
pub mod rule;

/// Isolation boundary; every store query is scoped by it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    /// Knowledge collection holding this tenant's product chunks.
    pub fn product_collection(&self) -> String {
        format!("tenant_{}_products", self.0)
    }
}
