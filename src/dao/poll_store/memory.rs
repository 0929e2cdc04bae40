//! Process-local poll store used when no database is configured and in tests.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dao::{models::PollRecordEntity, poll_store::PollStore, storage::StorageResult};

/// Poll store keeping every record in memory for the lifetime of the process.
#[derive(Clone, Default)]
pub struct InMemoryPollStore {
    records: Arc<RwLock<Vec<PollRecordEntity>>>,
}

impl InMemoryPollStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records written so far.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl PollStore for InMemoryPollStore {
    fn insert_poll(&self, poll: PollRecordEntity) -> BoxFuture<'static, StorageResult<()>> {
        let records = self.records.clone();
        Box::pin(async move {
            records.write().await.push(poll);
            Ok(())
        })
    }

    fn list_polls(
        &self,
        limit: Option<u32>,
    ) -> BoxFuture<'static, StorageResult<Vec<PollRecordEntity>>> {
        let records = self.records.clone();
        Box::pin(async move {
            let guard = records.read().await;
            let mut polls: Vec<PollRecordEntity> = guard.iter().cloned().collect();
            // Stable sort keeps insertion order for records created within the same instant.
            polls.reverse();
            polls.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            if let Some(limit) = limit {
                polls.truncate(limit as usize);
            }
            Ok(polls)
        })
    }

    fn find_poll(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<PollRecordEntity>>> {
        let records = self.records.clone();
        Box::pin(async move {
            let guard = records.read().await;
            Ok(guard.iter().find(|record| record.id == id).cloned())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
