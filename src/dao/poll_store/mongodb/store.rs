use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{Collection, Database, bson::doc, options::IndexOptions};
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoPollDocument, doc_id},
};
use crate::dao::{models::PollRecordEntity, poll_store::PollStore, storage::StorageResult};

const POLL_COLLECTION_NAME: &str = "polls";

#[derive(Clone)]
pub struct MongoPollStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    database: RwLock<Database>,
    config: MongoConfig,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.database.read().await.clone();

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let database =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        *self.database.write().await = database;
        Ok(())
    }
}

impl MongoPollStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let database = establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            database: RwLock::new(database),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let collection = self.collection().await;
        let index = mongodb::IndexModel::builder()
            .keys(doc! {"created_at": -1})
            .options(
                IndexOptions::builder()
                    .name(Some("poll_created_at_idx".to_owned()))
                    .build(),
            )
            .build();

        collection
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: POLL_COLLECTION_NAME,
                index: "created_at",
                source,
            })?;

        Ok(())
    }

    async fn collection(&self) -> Collection<MongoPollDocument> {
        self.inner
            .database
            .read()
            .await
            .collection::<MongoPollDocument>(POLL_COLLECTION_NAME)
    }

    async fn insert_poll(&self, poll: PollRecordEntity) -> MongoResult<()> {
        let id = poll.id;
        let document: MongoPollDocument = poll.into();
        self.collection()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::SavePoll { id, source })?;
        Ok(())
    }

    async fn list_polls(&self, limit: Option<u32>) -> MongoResult<Vec<PollRecordEntity>> {
        let collection = self.collection().await;

        let mut query = collection.find(doc! {}).sort(doc! {"created_at": -1});
        if let Some(limit) = limit {
            query = query.limit(i64::from(limit));
        }

        let documents: Vec<MongoPollDocument> = query
            .await
            .map_err(|source| MongoDaoError::ListPolls { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListPolls { source })?;

        Ok(documents.into_iter().filter_map(into_entity).collect())
    }

    async fn find_poll(&self, id: Uuid) -> MongoResult<Option<PollRecordEntity>> {
        let document = self
            .collection()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadPoll { id, source })?;

        Ok(document.and_then(into_entity))
    }
}

fn into_entity(document: MongoPollDocument) -> Option<PollRecordEntity> {
    match PollRecordEntity::try_from(document) {
        Ok(entity) => Some(entity),
        Err(err) => {
            warn!(error = %err, "skipping poll document with malformed identifier");
            None
        }
    }
}

impl PollStore for MongoPollStore {
    fn insert_poll(&self, poll: PollRecordEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_poll(poll).await.map_err(Into::into) })
    }

    fn list_polls(
        &self,
        limit: Option<u32>,
    ) -> BoxFuture<'static, StorageResult<Vec<PollRecordEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_polls(limit).await.map_err(Into::into) })
    }

    fn find_poll(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<PollRecordEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_poll(id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
