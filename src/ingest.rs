//! Ingestion core - two trigger adapters over one shared pipeline
//!
//! The synchronous adapter takes an already-deserialized replay document
//! (explicit upload); the asynchronous adapter reacts to a storage-change
//! event, applies the freshness cutoff, and reads the document itself. Both
//! converge on the same validate → extract → write path, so idempotence and
//! atomicity live here and in the writer, not in the HTTP layer.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::blob::{BlobError, BlobStore};
use crate::extract::{extract_facts_with, ExtractError, ExtractorConfig};
use crate::replay::{RawLogDocument, ValidationError};
use crate::storage::postgres::PostgresStore;
use crate::storage::writer::{write_game_facts, WriteSummary};

/// Everything that can go wrong during one ingestion. Validation and
/// extraction failures happen before any transaction opens; database errors
/// arrive after the writer has already rolled back.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("Extraction failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("Malformed replay document: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Blob store error: {0}")]
    Blob(#[from] BlobError),
}

impl IngestError {
    /// Whether the document itself was rejected, as opposed to an
    /// infrastructure failure worth retrying.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Extract(_) | Self::Malformed(_)
        )
    }
}

/// Ingestion tuning knobs, read from the environment in `main`.
#[derive(Debug, Clone, Copy)]
pub struct IngestConfig {
    /// Storage events for blobs modified before `now - freshness_window`
    /// are skipped. Keeps bulk migrations of historical logs from
    /// re-triggering ingestion.
    pub freshness_window: Duration,
    pub extractor: ExtractorConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            freshness_window: Duration::hours(48),
            extractor: ExtractorConfig::default(),
        }
    }
}

/// Storage-change notification for a replay blob.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BlobEvent {
    pub scope: String,
    pub id: String,
    /// Last-modified timestamp as delivered by the platform. Looked up from
    /// the store when the notification does not carry one.
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

/// What one successful ingestion wrote.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct IngestReport {
    pub table_id: i64,
    pub rows: WriteSummary,
}

/// Result of the asynchronous path: ingested, or intentionally skipped.
#[derive(Debug)]
pub enum IngestOutcome {
    Ingested(IngestReport),
    SkippedStale {
        scope: String,
        id: String,
        last_modified: DateTime<Utc>,
    },
}

/// The shared ingestion pipeline both trigger adapters call into.
pub struct Ingestor {
    store: Arc<PostgresStore>,
    blobs: Arc<dyn BlobStore>,
    config: IngestConfig,
}

impl Ingestor {
    pub fn new(store: Arc<PostgresStore>, blobs: Arc<dyn BlobStore>, config: IngestConfig) -> Self {
        Self {
            store,
            blobs,
            config,
        }
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    /// Synchronous adapter: ingest an already-deserialized document.
    ///
    /// Fail-fast ordering: structural validation, then extraction, and only
    /// then a transaction. Re-ingesting an unchanged document leaves the
    /// stored rows identical (keyed merges and scoped replaces only).
    pub async fn ingest_document(
        &self,
        doc: &RawLogDocument,
    ) -> Result<IngestReport, IngestError> {
        doc.validate()?;
        let facts = extract_facts_with(doc, &self.config.extractor)?;
        let rows = write_game_facts(self.store.pool(), &facts).await?;

        info!(
            "Replay {} ingested ({} players, {} rows)",
            facts.table_id, facts.game_stats.player_count, rows.total()
        );
        Ok(IngestReport {
            table_id: facts.table_id,
            rows,
        })
    }

    /// Asynchronous adapter: react to a storage-change event.
    ///
    /// Applies the freshness cutoff before reading anything, then runs the
    /// synchronous path. Errors propagate so the platform's redelivery
    /// policy can retry.
    pub async fn handle_blob_event(
        &self,
        event: &BlobEvent,
    ) -> Result<IngestOutcome, IngestError> {
        let last_modified = match event.last_modified {
            Some(ts) => Some(ts),
            None => self.blobs.last_modified(&event.scope, &event.id).await?,
        };

        if let Some(ts) = last_modified {
            let cutoff = Utc::now() - self.config.freshness_window;
            if ts < cutoff {
                info!(
                    "Skipping stale replay blob {}/{} (modified {}, cutoff {})",
                    event.scope, event.id, ts, cutoff
                );
                return Ok(IngestOutcome::SkippedStale {
                    scope: event.scope.clone(),
                    id: event.id.clone(),
                    last_modified: ts,
                });
            }
        }

        let bytes = self.blobs.get(&event.scope, &event.id).await?;
        let doc: RawLogDocument = serde_json::from_slice(&bytes)?;
        let report = self.ingest_document(&doc).await?;
        Ok(IngestOutcome::Ingested(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::FsBlobStore;
    use sqlx::postgres::PgPool;

    /// An ingestor whose pool never connects; only useful for paths that
    /// fail before touching the database.
    fn detached_ingestor(blob_root: &std::path::Path) -> Ingestor {
        let pool = PgPool::connect_lazy("postgres://localhost/unused").unwrap();
        Ingestor::new(
            Arc::new(PostgresStore::from_pool(pool)),
            Arc::new(FsBlobStore::new(blob_root)),
            IngestConfig::default(),
        )
    }

    #[tokio::test]
    async fn stale_event_is_skipped_without_any_reads_or_writes() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = detached_ingestor(dir.path());

        // The blob does not even exist; the guard fires on the event's
        // timestamp before anything is read.
        let event = BlobEvent {
            scope: "replays".to_string(),
            id: "999.json".to_string(),
            last_modified: Some(Utc::now() - Duration::hours(100)),
        };

        let outcome = ingestor.handle_blob_event(&event).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::SkippedStale { .. }));
    }

    #[tokio::test]
    async fn fresh_event_with_malformed_body_fails_before_database() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = detached_ingestor(dir.path());

        ingestor
            .blobs()
            .put("replays", "bad.json", b"not json at all")
            .await
            .unwrap();

        let event = BlobEvent {
            scope: "replays".to_string(),
            id: "bad.json".to_string(),
            last_modified: Some(Utc::now()),
        };

        let err = ingestor.handle_blob_event(&event).await.unwrap_err();
        assert!(matches!(err, IngestError::Malformed(_)));
        assert!(err.is_rejection());
    }

    #[tokio::test]
    async fn invalid_document_is_rejected_before_database() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = detached_ingestor(dir.path());

        let doc: RawLogDocument = serde_json::from_str(
            r#"{"replay_id": "not-a-number", "player_perspective": "1",
                "players": {"1": {}}}"#,
        )
        .unwrap();

        let err = ingestor.ingest_document(&doc).await.unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
        assert!(err.is_rejection());
    }

    #[tokio::test]
    async fn missing_blob_surfaces_as_blob_error() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = detached_ingestor(dir.path());

        let event = BlobEvent {
            scope: "replays".to_string(),
            id: "absent.json".to_string(),
            last_modified: Some(Utc::now()),
        };

        let err = ingestor.handle_blob_event(&event).await.unwrap_err();
        assert!(matches!(err, IngestError::Blob(_)));
        assert!(!err.is_rejection());
    }
}
