//! MongoDB record store.
//!
//! Each record is an `update_one` with `upsert(true)`: `$set` carries the
//! ingestion-owned fields, `$setOnInsert` initializes the enrichment fields
//! so that updates never reset them. The driver's `upserted_id` tells a new
//! document from an existing one.

use async_trait::async_trait;
use bson::{Document, doc};
use futures::stream::{self, StreamExt};
use mongodb::error::ErrorKind;
use mongodb::{Client, Collection};

use crate::error::{AppError, Result};
use crate::models::CanonicalRecord;
use crate::storage::{RecordStore, UpsertOutcome, UpsertStatus};

/// MongoDB storage backend.
#[derive(Clone)]
pub struct MongoStore {
    collection: Collection<CanonicalRecord>,
    max_concurrent: usize,
}

impl MongoStore {
    /// Connect and verify the server answers a ping.
    pub async fn connect(
        uri: &str,
        database: &str,
        collection: &str,
        max_concurrent: usize,
    ) -> Result<Self> {
        log::info!("Connecting to MongoDB database '{}'", database);

        let client = Client::with_uri_str(uri)
            .await
            .map_err(|e| AppError::storage(format!("failed to connect to MongoDB: {}", e)))?;

        client
            .database(database)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| AppError::storage(format!("MongoDB ping failed: {}", e)))?;

        Ok(Self {
            collection: client.database(database).collection(collection),
            max_concurrent: max_concurrent.max(1),
        })
    }

    fn update_for(record: &CanonicalRecord) -> Result<Document> {
        let categories = bson::to_bson(&record.categories)
            .map_err(|e| AppError::storage(format!("cannot encode categories: {}", e)))?;

        Ok(doc! {
            "$set": {
                "source": record.source.as_str(),
                "title": record.title.as_str(),
                "description": record.description.as_str(),
                "link": record.link.as_str(),
                "pubDate": record.pub_date.as_str(),
                "categories": categories,
            },
            "$setOnInsert": {
                "geoLocated": false,
                "locations": [],
            },
        })
    }

    async fn tagged(
        &self,
        record: &CanonicalRecord,
    ) -> (String, std::result::Result<UpsertStatus, WriteFailure>) {
        (record.id.clone(), self.upsert_one(record).await)
    }

    async fn upsert_one(
        &self,
        record: &CanonicalRecord,
    ) -> std::result::Result<UpsertStatus, WriteFailure> {
        let update = Self::update_for(record).map_err(|e| WriteFailure::Record(e.to_string()))?;

        let result = self
            .collection
            .update_one(doc! { "_id": record.id.as_str() }, update)
            .upsert(true)
            .await
            .map_err(WriteFailure::from)?;

        Ok(match result.upserted_id {
            Some(_) => UpsertStatus::Inserted,
            None => UpsertStatus::Updated,
        })
    }
}

/// Failure of one upsert, split by whether it concerns the document or the connection.
enum WriteFailure {
    Record(String),
    Transport(String),
}

impl From<mongodb::error::Error> for WriteFailure {
    fn from(err: mongodb::error::Error) -> Self {
        match err.kind.as_ref() {
            ErrorKind::Write(_) => Self::Record(err.to_string()),
            _ => Self::Transport(err.to_string()),
        }
    }
}

#[async_trait]
impl RecordStore for MongoStore {
    async fn upsert_batch(&self, records: &[CanonicalRecord]) -> Result<UpsertOutcome> {
        if records.is_empty() {
            return Ok(UpsertOutcome::default());
        }

        let mut outcome = UpsertOutcome::default();
        let mut transport_error: Option<String> = None;

        let jobs: Vec<_> = records.iter().map(|record| self.tagged(record)).collect();
        let mut results = stream::iter(jobs).buffer_unordered(self.max_concurrent);

        while let Some((id, result)) = results.next().await {
            match result {
                Ok(status) => outcome.record(id, Ok(status)),
                Err(WriteFailure::Record(message)) => {
                    outcome.record(id, Err(AppError::storage(message)))
                }
                Err(WriteFailure::Transport(message)) => {
                    log::error!("MongoDB transport failure on {}: {}", id, message);
                    transport_error.get_or_insert(message);
                }
            }
        }

        // Writes that already landed stay written; their ids go back to the caller.
        match transport_error {
            Some(message) => {
                let message = format!(
                    "bulk upsert aborted after {} of {} records: {}",
                    outcome.total(),
                    records.len(),
                    message
                );
                let mut pending: Vec<String> = outcome.inserted.into_iter().collect();
                pending.sort();
                Err(AppError::StoreInterrupted { message, pending })
            }
            None => Ok(outcome),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<CanonicalRecord>> {
        self.collection
            .find_one(doc! { "_id": id })
            .await
            .map_err(AppError::storage)
    }

    async fn count(&self) -> Result<usize> {
        let count = self
            .collection
            .count_documents(doc! {})
            .await
            .map_err(AppError::storage)?;
        Ok(count as usize)
    }
}
