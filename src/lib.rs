//! FlexSearch - a multi-index, sharded full-text search engine
//!
//! Layered on tantivy, this library provides:
//! - Multiple named indices, each split into deterministic shards
//! - Near-real-time reads: buffered writes become visible on refresh ticks
//! - Optimistic concurrency through a CAS-backed versioning cache
//! - A bounded, backpressured command pipeline with worker-confined
//!   document templates
//! - Declarative filter trees compiled through named query strategies
//! - Parallel shard fan-out with sorted top-k merge, column projection
//!   and highlighting
//! - A lifecycle state machine (open / close / update / delete) with
//!   per-index commit and refresh schedulers

pub mod analysis;
pub mod error;
pub mod index;
pub mod query;
pub mod schema;
pub mod search;
pub mod services;
pub mod settings;
pub mod storage;

#[cfg(test)]
mod tests;

// Re-exports from error
pub use error::{Error, Result};

// Re-exports from schema
pub use schema::{
    DocumentTemplate, FieldCell, FieldDescriptor, FieldKind, FieldPostings, FieldTermVector,
    IndexSchema, SortType,
};

// Re-exports from settings
pub use settings::{
    DirectoryKind, FieldDefinition, IndexConfiguration, IndexDefinition, IndexSetting,
    ProfileDefinition, ScriptRegistry, SettingBuilder,
};

// Re-exports from index
pub use index::manager::IndexManager;
pub use index::router::shard_of;
pub use index::shard::Shard;
pub use index::versioning::{VersionCache, VersionCell};
pub use index::writer::{Command, CommandOutcome, CommandQueue};
pub use index::{IndexRuntime, IndexState, Registries, Registry};

// Re-exports from query
pub use query::strategies::{QueryStrategy, StrategyRegistry};
pub use query::{Condition, FilterType, MissingValuePolicy, SearchFilter};

// Re-exports from search
pub use search::{
    HighlightRequest, ResultDocument, SearchExecutor, SearchProfileQuery, SearchQuery,
    SearchResults,
};

// Re-exports from services
pub use services::{IndexService, SearchService, SettingsBuilder, VersioningCacheStore};

// Re-exports from analysis and storage
pub use analysis::{AnalyzerDefinition, AnalyzerRegistry, TokenFilterKind, TokenizerKind};
pub use storage::{JsonFileStore, MemoryStore, PersistenceStore};
