//! Store double whose reads and writes always fail.

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::PollRecordEntity,
    poll_store::PollStore,
    storage::{StorageError, StorageOperation, StorageResult},
};

/// Reports healthy but refuses every insert and list.
pub struct FailingStore;

fn offline(operation: StorageOperation) -> StorageError {
    StorageError::unavailable(
        operation,
        "offline".into(),
        std::io::Error::other("connection refused"),
    )
}

impl PollStore for FailingStore {
    fn insert_poll(&self, _poll: PollRecordEntity) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Err(offline(StorageOperation::Insert)) })
    }

    fn list_polls(
        &self,
        _limit: Option<u32>,
    ) -> BoxFuture<'static, StorageResult<Vec<PollRecordEntity>>> {
        Box::pin(async { Err(offline(StorageOperation::List)) })
    }

    fn find_poll(&self, _id: Uuid) -> BoxFuture<'static, StorageResult<Option<PollRecordEntity>>> {
        Box::pin(async { Ok(None) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
