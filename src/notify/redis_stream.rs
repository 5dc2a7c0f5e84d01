//! Redis stream event log.
//!
//! Each event is an `XADD <channel> * id <record id>`; consumers read the
//! stream with their own consumer groups.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;

use crate::error::{AppError, Result};
use crate::models::NewRecordEvent;
use crate::notify::EventLog;

/// Redis streams backend sharing one multiplexed connection.
#[derive(Clone)]
pub struct RedisEventLog {
    conn: MultiplexedConnection,
}

impl RedisEventLog {
    /// Open a connection and check it with a `PING`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| AppError::config(format!("invalid Redis URL: {}", e)))?;

        let mut conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| AppError::storage(format!("failed to connect to Redis: {}", e)))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::storage(format!("Redis ping failed: {}", e)))?;

        log::info!("Connected to Redis event log");
        Ok(Self { conn })
    }
}

#[async_trait]
impl EventLog for RedisEventLog {
    async fn append(&self, channel: &str, event: &NewRecordEvent) -> Result<String> {
        let mut conn = self.conn.clone();
        let entry_id: String = redis::cmd("XADD")
            .arg(channel)
            .arg("*")
            .arg("id")
            .arg(&event.id)
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::storage(format!("XADD to {} failed: {}", channel, e)))?;
        Ok(entry_id)
    }

    async fn entry_count(&self, channel: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let len: usize = redis::cmd("XLEN")
            .arg(channel)
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::storage(format!("XLEN of {} failed: {}", channel, e)))?;
        Ok(len)
    }
}
