#[cfg(test)]
pub(crate) mod failing;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::PollRecordEntity;
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

pub use memory::InMemoryPollStore;

/// Abstraction over the durable, append-only collection of completed polls.
pub trait PollStore: Send + Sync {
    /// Append a completed poll record.
    fn insert_poll(&self, poll: PollRecordEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// List records, most recently created first, optionally truncated to `limit` entries.
    fn list_polls(
        &self,
        limit: Option<u32>,
    ) -> BoxFuture<'static, StorageResult<Vec<PollRecordEntity>>>;
    /// Fetch a single record by identifier.
    fn find_poll(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<PollRecordEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
