//! Replay Statistics Server Library
//!
//! This library provides the core modules for the replay ingestion service:
//! - Typed replay document model with structural validation
//! - Pure fact extraction into twelve normalized collections
//! - Transactional writer with per-table reconciliation strategies
//! - Dual trigger adapters (explicit upload, storage-change event)
//! - Thin HTTP boundary for both triggers

pub mod replay; // Replay document model + validation
pub mod facts; // Twelve fact collections
pub mod extract; // Pure document → facts projection
pub mod storage; // PostgreSQL store, migrations, transactional writer
pub mod blob; // Blob-store seam (filesystem implementation)
pub mod ingest; // Trigger adapters, freshness guard, error taxonomy
pub mod api; // HTTP/JSON boundary layer

// Re-export commonly used types
pub use extract::{extract_facts, extract_facts_with, ExtractError, ExtractorConfig, KeptRule};
pub use facts::GameFacts;
pub use ingest::{BlobEvent, IngestConfig, IngestError, IngestOutcome, IngestReport, Ingestor};
pub use replay::{RawLogDocument, ValidationError};
pub use storage::postgres::PostgresStore;
pub use storage::writer::{write_game_facts, WriteSummary};
