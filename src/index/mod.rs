//! Index runtimes, registries and lifecycle management.

pub mod manager;
pub mod router;
pub mod shard;
pub mod versioning;
pub mod writer;

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::analysis::AnalyzerRegistry;
use crate::error::Result;
use crate::settings::IndexSetting;
use shard::Shard;

/// Lifecycle state of a known index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexState {
    Opening,
    Online,
    Closing,
    Offline,
}

/// Process-scope concurrent map with case-insensitive keys. Both global
/// registries are instances of this, so tests can isolate state.
pub struct Registry<T> {
    entries: DashMap<String, T>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<T: Clone> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<T> {
        self.entries
            .get(&name.to_lowercase())
            .map(|e| e.value().clone())
    }

    pub fn insert(&self, name: &str, value: T) {
        self.entries.insert(name.to_lowercase(), value);
    }

    pub fn remove(&self, name: &str) -> Option<T> {
        self.entries.remove(&name.to_lowercase()).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_lowercase())
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }
}

/// The two process-wide registries: runtimes of *Online* indices and the
/// lifecycle state of every known index.
#[derive(Default)]
pub struct Registries {
    pub registration: Registry<Arc<IndexRuntime>>,
    pub status: Registry<IndexState>,
}

impl Registries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the live runtime of an index, mapping each non-online state
    /// to its error.
    pub fn resolve(&self, name: &str) -> Result<Arc<IndexRuntime>> {
        match self.registration.get(name) {
            Some(runtime) => Ok(runtime),
            None => Err(match self.status.get(name) {
                Some(IndexState::Opening) => {
                    crate::error::Error::IndexIsOpening(name.to_string())
                }
                Some(IndexState::Online) => {
                    crate::error::Error::IndexRegistrationMissing(name.to_string())
                }
                Some(_) => crate::error::Error::IndexIsOffline(name.to_string()),
                None => crate::error::Error::IndexNotFound(name.to_string()),
            }),
        }
    }
}

/// A live index: its immutable setting, its shards and the cancellation
/// token terminating its scheduler loops.
pub struct IndexRuntime {
    setting: Arc<IndexSetting>,
    shards: Vec<Arc<Shard>>,
    token: CancellationToken,
}

impl IndexRuntime {
    /// Open every shard of the index. Shards are created atomically with
    /// the runtime: any shard failing to open fails the whole runtime.
    pub fn open(setting: Arc<IndexSetting>, analyzers: &AnalyzerRegistry) -> Result<Arc<Self>> {
        let mut shards = Vec::with_capacity(setting.shard_count as usize);
        for shard_number in 0..setting.shard_count {
            shards.push(Arc::new(Shard::open(&setting, analyzers, shard_number)?));
        }
        Ok(Arc::new(Self {
            setting,
            shards,
            token: CancellationToken::new(),
        }))
    }

    pub fn setting(&self) -> &Arc<IndexSetting> {
        &self.setting
    }

    pub fn shards(&self) -> &[Arc<Shard>] {
        &self.shards
    }

    /// The shard owning `id` under this runtime's shard count.
    pub fn shard_for(&self, id: &str) -> &Arc<Shard> {
        let shard = router::shard_of(id, self.setting.shard_count);
        &self.shards[shard as usize]
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel the schedulers, then commit and release every shard writer.
    /// Close errors are surfaced but every shard is still visited.
    pub fn close(&self) -> Result<()> {
        self.token.cancel();
        let mut first_error = None;
        for shard in &self.shards {
            if let Err(e) = shard.close() {
                log::warn!(
                    "[index {}] shard {} failed to close: {}",
                    self.setting.name,
                    shard.shard_number(),
                    e
                );
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
