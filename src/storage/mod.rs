//! Storage Layer - normalized replay statistics in PostgreSQL
//!
//! Twelve tables, all owned by the ingestion pipeline for their `table_id`
//! scope. Read-side services only ever query them; every write goes through
//! the transactional writer.
//!
//! ## Architecture
//! ```text
//! [Ingestor]
//!      ↓ GameFacts
//! [writer::write_game_facts]   one transaction, fixed entity order
//!      ↓
//! [PostgresStore]              pool + forward-only migrations
//! ```

pub mod migrations;
pub mod postgres;
pub mod writer;
