mod connection;
mod error;
mod models;
pub mod config;
pub mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoPollStore;

use crate::dao::storage::{StorageError, StorageOperation};

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        let operation = match &err {
            MongoDaoError::InvalidUri { .. }
            | MongoDaoError::ClientConstruction { .. }
            | MongoDaoError::InitialPing { .. }
            | MongoDaoError::EnsureIndex { .. } => StorageOperation::Connect,
            MongoDaoError::HealthPing { .. } => StorageOperation::HealthCheck,
            MongoDaoError::SavePoll { .. } => StorageOperation::Insert,
            MongoDaoError::LoadPoll { .. } => StorageOperation::Find,
            MongoDaoError::ListPolls { .. } => StorageOperation::List,
        };
        StorageError::unavailable(operation, err.to_string(), err)
    }
}
