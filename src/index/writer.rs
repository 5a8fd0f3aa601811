//! Write pipeline: a bounded command stream served by a worker pool.
//!
//! # Architecture
//!
//! ```text
//! execute() ──send──► [shared bounded MPMC] ◄──recv── worker 0
//!                                           ◄──recv── worker 1
//!                                           ◄──recv── worker N
//! ```
//!
//! - All workers compete for commands on one bounded `async_channel`;
//!   a full queue applies backpressure on the producer.
//! - Each worker keeps its own per-index [`DocumentTemplate`] cache.
//!   Templates are worker-confined and never observed by another worker.
//! - Command errors are captured into the reply; workers never terminate
//!   on a failed command, only when the queue closes.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tantivy::collector::TopDocs;
use tantivy::query::TermQuery;
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{TantivyDocument, Term};
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::schema::{DocumentTemplate, ID_FIELD, VERSION_FIELD};

use super::versioning::VersionCache;
use super::{IndexRuntime, Registries};

/// Default bounded capacity of the command stream.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// A document mutation or maintenance command addressed to one index.
#[derive(Debug, Clone)]
pub enum Command {
    Create {
        id: String,
        fields: FxHashMap<String, String>,
    },
    Update {
        id: String,
        fields: FxHashMap<String, String>,
    },
    Delete {
        id: String,
    },
    DeleteByIndex,
    Commit,
}

/// Result of one processed command, success or captured failure.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub ok: bool,
    pub message: String,
}

impl CommandOutcome {
    fn success() -> Self {
        Self {
            ok: true,
            message: String::new(),
        }
    }

    fn failure(message: String) -> Self {
        Self { ok: false, message }
    }
}

struct Envelope {
    index: String,
    command: Command,
    reply: Option<oneshot::Sender<CommandOutcome>>,
}

/// Producer handle over the bounded command stream plus its worker pool.
pub struct CommandQueue {
    sender: async_channel::Sender<Envelope>,
    workers: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl CommandQueue {
    /// Spawn the worker pool. `worker_count` defaults to one per logical CPU.
    pub fn start(
        registries: Arc<Registries>,
        versioning: Arc<VersionCache>,
        capacity: usize,
        worker_count: usize,
    ) -> Self {
        let (sender, receiver) = async_channel::bounded(capacity.max(1));
        let worker_count = worker_count.max(1);
        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let receiver = receiver.clone();
            let registries = Arc::clone(&registries);
            let versioning = Arc::clone(&versioning);
            workers.push(tokio::spawn(async move {
                Self::worker_loop(worker_id, receiver, registries, versioning).await;
            }));
        }
        Self {
            sender,
            workers: Mutex::new(workers),
        }
    }

    /// Submit a command and wait for its outcome.
    pub async fn execute(&self, index: &str, command: Command) -> Result<CommandOutcome> {
        let (reply, outcome) = oneshot::channel();
        self.sender
            .send(Envelope {
                index: index.to_string(),
                command,
                reply: Some(reply),
            })
            .await
            .map_err(|_| Error::QueueClosed)?;
        outcome.await.map_err(|_| Error::QueueClosed)
    }

    /// Submit a command without waiting; the optional `reply` channel
    /// receives the outcome when the command is processed.
    pub async fn execute_async(
        &self,
        index: &str,
        command: Command,
        reply: Option<oneshot::Sender<CommandOutcome>>,
    ) -> Result<()> {
        self.sender
            .send(Envelope {
                index: index.to_string(),
                command,
                reply,
            })
            .await
            .map_err(|_| Error::QueueClosed)
    }

    /// Number of commands waiting in the stream.
    pub fn pending(&self) -> usize {
        self.sender.len()
    }

    /// Close the stream and drain the workers. Commands already queued are
    /// still processed.
    pub async fn shut_down(&self) {
        self.sender.close();
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            let _ = worker.await;
        }
    }

    async fn worker_loop(
        worker_id: usize,
        receiver: async_channel::Receiver<Envelope>,
        registries: Arc<Registries>,
        versioning: Arc<VersionCache>,
    ) {
        log::debug!("[write_worker {}] started", worker_id);
        let mut templates: FxHashMap<String, DocumentTemplate> = FxHashMap::default();

        while let Ok(envelope) = receiver.recv().await {
            let outcome = match process_command(
                &registries,
                &versioning,
                &mut templates,
                &envelope.index,
                &envelope.command,
            ) {
                Ok(()) => CommandOutcome::success(),
                Err(e) => {
                    log::debug!(
                        "[write_worker {}] command on '{}' failed: {}",
                        worker_id,
                        envelope.index,
                        e
                    );
                    CommandOutcome::failure(e.to_string())
                }
            };
            if let Some(reply) = envelope.reply {
                let _ = reply.send(outcome);
            }
        }
        log::debug!("[write_worker {}] stopped", worker_id);
    }
}

fn process_command(
    registries: &Registries,
    versioning: &VersionCache,
    templates: &mut FxHashMap<String, DocumentTemplate>,
    index: &str,
    command: &Command,
) -> Result<()> {
    let runtime = registries.resolve(index)?;
    let index_key = index.to_lowercase();

    match command {
        Command::Create { id, fields } => {
            require_id(id)?;
            let fields = lowercase_keys(fields);
            let template = template_for(templates, &index_key, &runtime);
            template.stage(id, 1, &fields);
            versioning.add(&index_key, id, 1);
            runtime.shard_for(id).add(template.to_document())?;
            Ok(())
        }
        Command::Update { id, fields } => {
            require_id(id)?;
            let fields = lowercase_keys(fields);
            let shard = runtime.shard_for(id);
            let id_term = id_term(&runtime, id);

            let next_version = match versioning.get(&index_key, id) {
                Some(observed) => {
                    let next = observed.version + 1;
                    if !versioning.update(&index_key, id, observed, next) {
                        return Err(Error::VersionMismatch(id.clone()));
                    }
                    next
                }
                None => match lookup_stored_version(&runtime, id)? {
                    // present but uncached: replace through the id term
                    Some(current) => {
                        let next = current + 1;
                        versioning.add(&index_key, id, next);
                        next
                    }
                    // never written: treated as a create
                    None => {
                        versioning.add(&index_key, id, 1);
                        1
                    }
                },
            };

            let template = template_for(templates, &index_key, &runtime);
            template.stage(id, next_version, &fields);
            shard.update(id_term, template.to_document())?;
            Ok(())
        }
        Command::Delete { id } => {
            require_id(id)?;
            versioning.delete(&index_key, id);
            runtime.shard_for(id).delete(id_term(&runtime, id))?;
            Ok(())
        }
        Command::DeleteByIndex => {
            for shard in runtime.shards() {
                shard.delete_all()?;
            }
            versioning.clear_index(&index_key);
            Ok(())
        }
        Command::Commit => {
            for shard in runtime.shards() {
                shard.commit()?;
            }
            Ok(())
        }
    }
}

fn require_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(Error::MissingId);
    }
    Ok(())
}

fn lowercase_keys(fields: &FxHashMap<String, String>) -> FxHashMap<String, String> {
    fields
        .iter()
        .map(|(name, value)| (name.to_lowercase(), value.clone()))
        .collect()
}

/// Fetch the worker's cached template for this index, rebuilding it when the
/// index was re-opened with a different schema.
fn template_for<'a>(
    templates: &'a mut FxHashMap<String, DocumentTemplate>,
    index_key: &str,
    runtime: &IndexRuntime,
) -> &'a mut DocumentTemplate {
    let stale = templates
        .get(index_key)
        .map(|t| !Arc::ptr_eq(t.schema(), &runtime.setting().schema))
        .unwrap_or(true);
    if stale {
        templates.insert(
            index_key.to_string(),
            DocumentTemplate::new(Arc::clone(&runtime.setting().schema), &runtime.setting().name),
        );
    }
    templates.get_mut(index_key).expect("template just inserted")
}

fn id_term(runtime: &IndexRuntime, id: &str) -> Term {
    let (_, field) = runtime
        .setting()
        .schema
        .resolve(ID_FIELD)
        .expect("reserved id field always present");
    Term::from_field_text(field, id)
}

/// Cold-path fallback for an update that missed the versioning cache:
/// point-query the owning shard for the stored `version` of the newest hit.
fn lookup_stored_version(runtime: &IndexRuntime, id: &str) -> Result<Option<i64>> {
    let shard = runtime.shard_for(id);
    let searcher = shard.searcher();
    let query = TermQuery::new(id_term(runtime, id), IndexRecordOption::Basic);
    let hits = searcher.search(&query, &TopDocs::with_limit(1))?;
    let Some((_, address)) = hits.first() else {
        return Ok(None);
    };
    let document: TantivyDocument = searcher.doc(*address)?;
    let (_, version_field) = runtime
        .setting()
        .schema
        .resolve(VERSION_FIELD)
        .expect("reserved version field always present");
    let version = document
        .get_first(version_field)
        .and_then(|value| value.as_i64())
        .unwrap_or(1);
    Ok(Some(version))
}
