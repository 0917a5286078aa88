use async_trait::async_trait;

use crate::error::StoreResult;
use crate::models::Organization;

/// Relational source of truth for organizations and their subscriptions.
#[async_trait]
pub trait MetadataRepository: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    async fn organization(&self, id: &str) -> StoreResult<Option<Organization>>;
}
