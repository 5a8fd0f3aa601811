//! Index definitions (user-facing, persisted) and the immutable internal
//! setting produced from them.

mod builder;

pub use builder::SettingBuilder;

use std::path::PathBuf;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::analysis::AnalyzerDefinition;
use crate::query::SearchFilter;
use crate::schema::{FieldKind, FieldPostings, FieldTermVector, IndexSchema};

/// Where an index keeps its shard data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryKind {
    #[default]
    FileSystem,
    MemoryMapped,
    Ram,
}

/// Tuning knobs of an index, all with serviceable defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfiguration {
    #[serde(default = "default_shard_count")]
    pub shard_count: u32,
    #[serde(default)]
    pub directory_kind: DirectoryKind,
    #[serde(default = "default_ram_buffer_mb")]
    pub ram_buffer_mb: usize,
    #[serde(default = "default_commit_period_secs")]
    pub commit_period_secs: u64,
    #[serde(default = "default_refresh_period_ms")]
    pub refresh_period_ms: u64,
}

fn default_shard_count() -> u32 {
    1
}

fn default_ram_buffer_mb() -> usize {
    100
}

fn default_commit_period_secs() -> u64 {
    60
}

fn default_refresh_period_ms() -> u64 {
    25
}

impl Default for IndexConfiguration {
    fn default() -> Self {
        Self {
            shard_count: default_shard_count(),
            directory_kind: DirectoryKind::default(),
            ram_buffer_mb: default_ram_buffer_mb(),
            commit_period_secs: default_commit_period_secs(),
            refresh_period_ms: default_refresh_period_ms(),
        }
    }
}

/// One field of an index definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_analyzer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_analyzer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postings: Option<FieldPostings>,
    #[serde(default)]
    pub term_vector: FieldTermVector,
    /// Name of a registered script computing this field from the input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

impl FieldDefinition {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            index_analyzer: None,
            search_analyzer: None,
            postings: None,
            term_vector: FieldTermVector::default(),
            script: None,
        }
    }
}

/// A named, pre-built filter tree templated by request-time values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileDefinition {
    pub name: String,
    pub query: SearchFilter,
}

/// The user-supplied definition of an index. This is what persists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
    #[serde(default)]
    pub analyzers: Vec<AnalyzerDefinition>,
    #[serde(default)]
    pub profiles: Vec<ProfileDefinition>,
    #[serde(default = "default_online")]
    pub online: bool,
    #[serde(default)]
    pub configuration: IndexConfiguration,
}

fn default_online() -> bool {
    true
}

impl IndexDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
            analyzers: Vec::new(),
            profiles: Vec::new(),
            online: true,
            configuration: IndexConfiguration::default(),
        }
    }
}

/// Selects a search profile name from the request's field values.
pub type SelectorScript = Arc<dyn Fn(&FxHashMap<String, String>) -> String + Send + Sync>;

/// Process-wide registry of named scripts referenced by definitions:
/// computed-field sources and profile selectors. Script hosting itself is
/// out of scope; both kinds are plain registered closures.
#[derive(Default)]
pub struct ScriptRegistry {
    computed: FxHashMap<String, crate::schema::ValueSource>,
    selectors: FxHashMap<String, SelectorScript>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_computed(&mut self, name: &str, script: crate::schema::ValueSource) {
        self.computed.insert(name.to_lowercase(), script);
    }

    pub fn register_selector(&mut self, name: &str, script: SelectorScript) {
        self.selectors.insert(name.to_lowercase(), script);
    }

    pub fn computed(&self, name: &str) -> Option<crate::schema::ValueSource> {
        self.computed.get(&name.to_lowercase()).cloned()
    }

    pub fn selector(&self, name: &str) -> Option<SelectorScript> {
        self.selectors.get(&name.to_lowercase()).cloned()
    }

    /// Clone out the selector table for embedding into an index setting.
    pub fn selectors_snapshot(&self) -> impl Iterator<Item = (String, SelectorScript)> + '_ {
        self.selectors
            .iter()
            .map(|(name, script)| (name.clone(), Arc::clone(script)))
    }
}

/// The validated, immutable setting backing one open cycle of an index.
pub struct IndexSetting {
    pub name: String,
    pub schema: Arc<IndexSchema>,
    pub profiles: FxHashMap<String, SearchFilter>,
    pub selectors: FxHashMap<String, SelectorScript>,
    pub shard_count: u32,
    pub directory_kind: DirectoryKind,
    pub ram_buffer_mb: usize,
    pub commit_period_secs: u64,
    pub refresh_period_ms: u64,
    pub base_path: PathBuf,
}

impl IndexSetting {
    /// Root directory of this index: `<base>/<name>`.
    pub fn index_path(&self) -> PathBuf {
        self.base_path.join(self.name.to_lowercase())
    }

    /// Directory of one shard: `<base>/<name>/shards/<n>`.
    pub fn shard_path(&self, shard_number: u32) -> PathBuf {
        self.index_path()
            .join("shards")
            .join(shard_number.to_string())
    }
}
