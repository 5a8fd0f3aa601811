//! Abstract service contracts over the engine.
//!
//! These traits are the seam for outer façades (network layers, embeddings
//! into larger systems): everything they need is expressed against the
//! contracts, never against the concrete types.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::index::manager::IndexManager;
use crate::index::versioning::{VersionCache, VersionCell};
use crate::index::writer::{Command, CommandOutcome};
use crate::index::{IndexRuntime, IndexState};
use crate::search::{SearchExecutor, SearchProfileQuery, SearchQuery, SearchResults};
use crate::settings::{IndexDefinition, IndexSetting, SettingBuilder};

/// Index lifecycle and command submission.
#[async_trait]
pub trait IndexService: Send + Sync {
    async fn add_index(&self, definition: &IndexDefinition) -> Result<()>;
    async fn update_index(&self, definition: &IndexDefinition) -> Result<()>;
    async fn delete_index(&self, name: &str) -> Result<()>;
    async fn open_index(&self, name: &str) -> Result<()>;
    async fn close_index(&self, name: &str) -> Result<()>;
    async fn get_index(&self, name: &str) -> Result<IndexDefinition>;
    async fn index_exists(&self, name: &str) -> bool;
    async fn index_status(&self, name: &str) -> Result<IndexState>;
    async fn perform_command(&self, name: &str, command: Command) -> Result<CommandOutcome>;
    async fn perform_command_async(
        &self,
        name: &str,
        command: Command,
        reply: Option<tokio::sync::oneshot::Sender<CommandOutcome>>,
    ) -> Result<()>;
    /// Number of commands waiting in the write pipeline.
    fn queued_commands(&self) -> usize;
    async fn shut_down(&self);
}

#[async_trait]
impl IndexService for IndexManager {
    async fn add_index(&self, definition: &IndexDefinition) -> Result<()> {
        IndexManager::add_index(self, definition)
    }

    async fn update_index(&self, definition: &IndexDefinition) -> Result<()> {
        IndexManager::update_index(self, definition)
    }

    async fn delete_index(&self, name: &str) -> Result<()> {
        IndexManager::delete_index(self, name)
    }

    async fn open_index(&self, name: &str) -> Result<()> {
        IndexManager::open_index(self, name)
    }

    async fn close_index(&self, name: &str) -> Result<()> {
        IndexManager::close_index(self, name)
    }

    async fn get_index(&self, name: &str) -> Result<IndexDefinition> {
        IndexManager::get_index(self, name)
    }

    async fn index_exists(&self, name: &str) -> bool {
        IndexManager::index_exists(self, name)
    }

    async fn index_status(&self, name: &str) -> Result<IndexState> {
        IndexManager::index_status(self, name)
    }

    async fn perform_command(&self, name: &str, command: Command) -> Result<CommandOutcome> {
        IndexManager::perform_command(self, name, command).await
    }

    async fn perform_command_async(
        &self,
        name: &str,
        command: Command,
        reply: Option<tokio::sync::oneshot::Sender<CommandOutcome>>,
    ) -> Result<()> {
        IndexManager::perform_command_async(self, name, command, reply).await
    }

    fn queued_commands(&self) -> usize {
        self.command_queue().pending()
    }

    async fn shut_down(&self) {
        IndexManager::shut_down(self).await
    }
}

/// Ranked retrieval over a live index runtime.
#[async_trait]
pub trait SearchService: Send + Sync {
    async fn search(
        &self,
        runtime: &Arc<IndexRuntime>,
        query: &SearchQuery,
    ) -> Result<SearchResults>;
    async fn search_profile(
        &self,
        runtime: &Arc<IndexRuntime>,
        query: &SearchProfileQuery,
    ) -> Result<SearchResults>;
}

#[async_trait]
impl SearchService for SearchExecutor {
    async fn search(
        &self,
        runtime: &Arc<IndexRuntime>,
        query: &SearchQuery,
    ) -> Result<SearchResults> {
        SearchExecutor::search(self, runtime, query).await
    }

    async fn search_profile(
        &self,
        runtime: &Arc<IndexRuntime>,
        query: &SearchProfileQuery,
    ) -> Result<SearchResults> {
        SearchExecutor::search_profile(self, runtime, query).await
    }
}

/// The versioning cache contract: total operations, per-key atomic CAS.
pub trait VersioningCacheStore: Send + Sync {
    fn get(&self, index: &str, id: &str) -> Option<VersionCell>;
    fn add(&self, index: &str, id: &str, version: i64) -> bool;
    fn update(&self, index: &str, id: &str, expected: VersionCell, new_version: i64) -> bool;
    fn delete(&self, index: &str, id: &str);
}

impl VersioningCacheStore for VersionCache {
    fn get(&self, index: &str, id: &str) -> Option<VersionCell> {
        VersionCache::get(self, index, id)
    }

    fn add(&self, index: &str, id: &str, version: i64) -> bool {
        VersionCache::add(self, index, id, version)
    }

    fn update(&self, index: &str, id: &str, expected: VersionCell, new_version: i64) -> bool {
        VersionCache::update(self, index, id, expected, new_version)
    }

    fn delete(&self, index: &str, id: &str) {
        VersionCache::delete(self, index, id)
    }
}

/// Validation of user definitions into immutable settings.
pub trait SettingsBuilder: Send + Sync {
    fn build_setting(&self, definition: &IndexDefinition) -> Result<Arc<IndexSetting>>;
}

impl SettingsBuilder for SettingBuilder {
    fn build_setting(&self, definition: &IndexDefinition) -> Result<Arc<IndexSetting>> {
        self.build(definition)
    }
}
