use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

const DEFAULT_DB: &str = "polling_system";

/// Parsed client options plus the target database.
#[derive(Clone)]
pub struct MongoConfig {
    pub options: ClientOptions,
    pub database_name: String,
}

impl MongoConfig {
    /// Parse `uri`, defaulting the database to `polling_system`.
    pub async fn from_uri(uri: &str, db_name: Option<&str>) -> MongoResult<Self> {
        let database_name = db_name.unwrap_or(DEFAULT_DB).to_owned();
        let options = ClientOptions::parse(uri)
            .await
            .map_err(|source| MongoDaoError::InvalidUri {
                uri: uri.to_owned(),
                source,
            })?;

        Ok(Self {
            options,
            database_name,
        })
    }
}
