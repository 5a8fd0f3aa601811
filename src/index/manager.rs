//! Index lifecycle: registration, state machine and per-index schedulers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::analysis::AnalyzerRegistry;
use crate::error::{Error, Result};
use crate::settings::{IndexDefinition, ScriptRegistry, SettingBuilder};
use crate::storage::{self, PersistenceStore};

use super::versioning::VersionCache;
use super::writer::{Command, CommandOutcome, CommandQueue, DEFAULT_QUEUE_CAPACITY};
use super::{IndexRuntime, IndexState, Registries};

/// Owns every known index: persisted definitions, live runtimes, the write
/// pipeline and the per-index commit/refresh schedulers.
///
/// State machine per index name:
///
/// ```text
///         add/open
///  (∅) ──────────▶ Opening ──success──▶ Online
///                     │ failure            │ close
///                     ▼                    ▼
///                  Offline ◀──success── Closing
/// ```
pub struct IndexManager {
    builder: SettingBuilder,
    analyzers: Arc<AnalyzerRegistry>,
    store: Arc<dyn PersistenceStore>,
    versioning: Arc<VersionCache>,
    registries: Arc<Registries>,
    queue: CommandQueue,
    base_path: PathBuf,
}

impl IndexManager {
    /// Boot the manager: start the write pipeline, then load every
    /// persisted definition and bring the online ones up.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        base_path: impl Into<PathBuf>,
        store: Arc<dyn PersistenceStore>,
        scripts: Arc<ScriptRegistry>,
    ) -> Result<Arc<Self>> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;

        let analyzers = Arc::new(AnalyzerRegistry::new());
        let registries = Arc::new(Registries::new());
        let versioning = Arc::new(VersionCache::new());
        let queue = CommandQueue::start(
            Arc::clone(&registries),
            Arc::clone(&versioning),
            DEFAULT_QUEUE_CAPACITY,
            num_cpus::get(),
        );
        let builder = SettingBuilder::new(
            Arc::clone(&analyzers),
            scripts,
            base_path.clone(),
        );

        let manager = Arc::new(Self {
            builder,
            analyzers,
            store,
            versioning,
            registries,
            queue,
            base_path,
        });
        manager.load_persisted();
        Ok(manager)
    }

    /// The registries, exposed for the search side and for tests.
    pub fn registries(&self) -> &Arc<Registries> {
        &self.registries
    }

    pub fn versioning(&self) -> &Arc<VersionCache> {
        &self.versioning
    }

    pub fn analyzers(&self) -> &Arc<AnalyzerRegistry> {
        &self.analyzers
    }

    pub fn command_queue(&self) -> &CommandQueue {
        &self.queue
    }

    fn load_persisted(&self) {
        let definitions: Vec<IndexDefinition> =
            match storage::get_all_typed(self.store.as_ref()) {
                Ok(definitions) => definitions,
                Err(e) => {
                    log::error!("[manager] failed to load persisted definitions: {}", e);
                    return;
                }
            };
        for definition in definitions {
            self.registries
                .status
                .insert(&definition.name, IndexState::Offline);
            if definition.online {
                if let Err(e) = self.open_runtime(&definition) {
                    log::error!(
                        "[manager] failed to open persisted index '{}': {}",
                        definition.name,
                        e
                    );
                }
            }
        }
    }

    /// Register a new index. Persists the definition; when `online`, the
    /// runtime is built immediately.
    pub fn add_index(&self, definition: &IndexDefinition) -> Result<()> {
        if self.registries.status.contains(&definition.name) {
            return Err(Error::IndexAlreadyExists(definition.name.clone()));
        }
        // Validate before persisting so a broken definition never lands.
        self.builder.build(definition)?;
        storage::put_typed(self.store.as_ref(), &definition.name, definition)?;

        if definition.online {
            self.open_runtime(definition)
        } else {
            self.registries
                .status
                .insert(&definition.name, IndexState::Offline);
            Ok(())
        }
    }

    /// Bring an offline index online from its persisted definition.
    pub fn open_index(&self, name: &str) -> Result<()> {
        match self.registries.status.get(name) {
            None => return Err(Error::IndexNotFound(name.to_string())),
            Some(IndexState::Opening) => return Err(Error::IndexIsOpening(name.to_string())),
            Some(IndexState::Online) | Some(IndexState::Closing) => {
                return Err(Error::IndexAlreadyExists(name.to_string()))
            }
            Some(IndexState::Offline) => {}
        }
        let mut definition: IndexDefinition =
            storage::get_typed(self.store.as_ref(), name)?
                .ok_or_else(|| Error::IndexNotFound(name.to_string()))?;
        definition.online = true;
        storage::put_typed(self.store.as_ref(), name, &definition)?;
        self.open_runtime(&definition)
    }

    /// Commit and release an online index; its state becomes Offline.
    pub fn close_index(&self, name: &str) -> Result<()> {
        match self.registries.status.get(name) {
            None => return Err(Error::IndexNotFound(name.to_string())),
            Some(IndexState::Offline) => return Err(Error::IndexIsOffline(name.to_string())),
            Some(IndexState::Opening) => return Err(Error::IndexIsOpening(name.to_string())),
            Some(IndexState::Online) | Some(IndexState::Closing) => {}
        }
        self.registries.status.insert(name, IndexState::Closing);
        if let Some(runtime) = self.registries.registration.remove(name) {
            // close errors are non-fatal; the state still transitions
            if let Err(e) = runtime.close() {
                log::warn!("[manager] close of '{}' reported: {}", name, e);
            }
        } else {
            log::warn!("[manager] '{}' was online without a registration", name);
        }
        self.registries.status.insert(name, IndexState::Offline);

        if let Ok(Some(mut definition)) =
            storage::get_typed::<IndexDefinition>(self.store.as_ref(), name)
        {
            definition.online = false;
            let _ = storage::put_typed(self.store.as_ref(), name, &definition);
        }
        log::info!("[manager] index '{}' is offline", name);
        Ok(())
    }

    /// Replace an index definition. An online index is closed and re-opened
    /// with the new definition; an opening index rejects the update.
    pub fn update_index(&self, definition: &IndexDefinition) -> Result<()> {
        let name = definition.name.as_str();
        match self.registries.status.get(name) {
            None => Err(Error::IndexNotFound(name.to_string())),
            Some(IndexState::Opening) => Err(Error::IndexIsOpening(name.to_string())),
            Some(IndexState::Online) | Some(IndexState::Closing) => {
                self.builder.build(definition)?;
                self.close_index(name)?;
                storage::put_typed(self.store.as_ref(), name, definition)?;
                if definition.online {
                    self.open_runtime(definition)?;
                }
                Ok(())
            }
            Some(IndexState::Offline) => {
                self.builder.build(definition)?;
                storage::put_typed(self.store.as_ref(), name, definition)?;
                Ok(())
            }
        }
    }

    /// Remove an index entirely: runtime, versioning cells, persisted
    /// definition and the on-disk directory.
    pub fn delete_index(&self, name: &str) -> Result<()> {
        match self.registries.status.get(name) {
            None => return Err(Error::IndexNotFound(name.to_string())),
            Some(IndexState::Online) | Some(IndexState::Closing) => {
                if let Some(runtime) = self.registries.registration.remove(name) {
                    if let Err(e) = runtime.close() {
                        log::warn!("[manager] close during delete of '{}': {}", name, e);
                    }
                }
            }
            Some(IndexState::Opening) => return Err(Error::IndexIsOpening(name.to_string())),
            Some(IndexState::Offline) => {}
        }

        self.versioning.clear_index(name);
        self.store.delete(name)?;
        let path = self.base_path.join(name.to_lowercase());
        if path.exists() {
            std::fs::remove_dir_all(&path)?;
        }
        self.registries.status.remove(name);
        log::info!("[manager] index '{}' deleted", name);
        Ok(())
    }

    /// The persisted definition of an index.
    pub fn get_index(&self, name: &str) -> Result<IndexDefinition> {
        storage::get_typed(self.store.as_ref(), name)?
            .ok_or_else(|| Error::IndexNotFound(name.to_string()))
    }

    pub fn index_exists(&self, name: &str) -> bool {
        self.registries.status.contains(name)
    }

    pub fn index_status(&self, name: &str) -> Result<IndexState> {
        self.registries
            .status
            .get(name)
            .ok_or_else(|| Error::IndexNotFound(name.to_string()))
    }

    /// The live runtime of an online index.
    pub fn runtime(&self, name: &str) -> Result<Arc<IndexRuntime>> {
        self.registries.resolve(name)
    }

    /// Submit a command through the write pipeline and wait for its outcome.
    pub async fn perform_command(&self, name: &str, command: Command) -> Result<CommandOutcome> {
        self.queue.execute(name, command).await
    }

    /// Submit a command without waiting; `reply` receives the outcome.
    pub async fn perform_command_async(
        &self,
        name: &str,
        command: Command,
        reply: Option<tokio::sync::oneshot::Sender<CommandOutcome>>,
    ) -> Result<()> {
        self.queue.execute_async(name, command, reply).await
    }

    /// Drain the write pipeline, then close every online index.
    pub async fn shut_down(&self) {
        self.queue.shut_down().await;
        for name in self.registries.registration.names() {
            if let Err(e) = self.close_index(&name) {
                log::warn!("[manager] shutdown close of '{}': {}", name, e);
            }
        }
        log::info!("[manager] shut down");
    }

    fn open_runtime(&self, definition: &IndexDefinition) -> Result<()> {
        let name = definition.name.as_str();
        self.registries.status.insert(name, IndexState::Opening);
        let setting = self.builder.build(definition)?;
        match IndexRuntime::open(setting, &self.analyzers) {
            Ok(runtime) => {
                Self::spawn_schedulers(&runtime);
                self.registries.registration.insert(name, Arc::clone(&runtime));
                self.registries.status.insert(name, IndexState::Online);
                log::info!(
                    "[manager] index '{}' online with {} shard(s)",
                    name,
                    runtime.shards().len()
                );
                Ok(())
            }
            Err(e) => {
                self.registries.status.insert(name, IndexState::Offline);
                Err(e)
            }
        }
    }

    /// Two cooperative loops per online index, both terminated by the
    /// runtime's cancellation token at the next tick. Loop errors are
    /// swallowed so one bad tick never kills the scheduler.
    fn spawn_schedulers(runtime: &Arc<IndexRuntime>) {
        let setting = runtime.setting();
        let name = setting.name.clone();
        let commit_period = Duration::from_secs(setting.commit_period_secs);
        let refresh_period = Duration::from_millis(setting.refresh_period_ms);

        {
            let runtime = Arc::clone(runtime);
            let token = runtime.token().clone();
            let name = name.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(commit_period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = ticker.tick() => {
                            for shard in runtime.shards() {
                                if let Err(e) = shard.commit_if_dirty() {
                                    log::warn!(
                                        "[commit_loop {}] shard {}: {}",
                                        name,
                                        shard.shard_number(),
                                        e
                                    );
                                }
                            }
                        }
                    }
                }
                log::debug!("[commit_loop {}] stopped", name);
            });
        }

        {
            let runtime = Arc::clone(runtime);
            let token = runtime.token().clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(refresh_period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = ticker.tick() => {
                            for shard in runtime.shards() {
                                if let Err(e) = shard.maybe_refresh() {
                                    log::warn!(
                                        "[refresh_loop {}] shard {}: {}",
                                        name,
                                        shard.shard_number(),
                                        e
                                    );
                                }
                            }
                        }
                    }
                }
                log::debug!("[refresh_loop {}] stopped", name);
            });
        }
    }
}
