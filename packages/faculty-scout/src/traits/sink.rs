//! Persistence hand-off.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::SinkError;
use crate::types::profile::ProfileCandidate;

/// A run's finalized records with provenance.
///
/// Every record already carries its `source_url` and `extraction_tier`.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileBatch {
    pub run_id: Uuid,
    pub root_url: String,
    pub produced_at: DateTime<Utc>,
    pub records: Vec<ProfileCandidate>,
}

/// Receives finalized, deduplicated records. The pipeline never reads back.
#[async_trait]
pub trait ProfileSink: Send + Sync {
    async fn store(&self, batch: &ProfileBatch) -> Result<(), SinkError>;
}
