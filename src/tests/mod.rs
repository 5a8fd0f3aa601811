//! Engine-level tests: lifecycle, the write pipeline and search execution.

mod lifecycle;
mod search;

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::index::manager::IndexManager;
use crate::schema::FieldKind;
use crate::settings::{DirectoryKind, FieldDefinition, IndexDefinition, ScriptRegistry};
use crate::storage::MemoryStore;

/// A definition over RAM directories with a representative field mix.
pub(crate) fn definition(name: &str, shard_count: u32) -> IndexDefinition {
    let mut definition = IndexDefinition::new(name);
    definition.fields = vec![
        FieldDefinition::new("title", FieldKind::Text),
        FieldDefinition::new("body", FieldKind::Text),
        FieldDefinition::new("year", FieldKind::Int),
        FieldDefinition::new("country", FieldKind::ExactText),
    ];
    definition.configuration.shard_count = shard_count;
    definition.configuration.directory_kind = DirectoryKind::Ram;
    definition
}

pub(crate) fn manager() -> (Arc<IndexManager>, tempfile::TempDir) {
    manager_with_scripts(ScriptRegistry::new())
}

pub(crate) fn manager_with_scripts(
    scripts: ScriptRegistry,
) -> (Arc<IndexManager>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let manager = IndexManager::new(
        dir.path(),
        Arc::new(MemoryStore::new()),
        Arc::new(scripts),
    )
    .unwrap();
    (manager, dir)
}

pub(crate) fn doc_fields(pairs: &[(&str, &str)]) -> FxHashMap<String, String> {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

/// Force the next refresh tick on every shard of an index, making all
/// buffered writes visible without waiting on the scheduler.
pub(crate) fn refresh(manager: &IndexManager, name: &str) {
    let runtime = manager.runtime(name).unwrap();
    for shard in runtime.shards() {
        shard.maybe_refresh().unwrap();
    }
}
