//! Search execution: parallel shard fan-out, top-k merge and hydration.

pub mod highlight;

use std::cmp::Ordering;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tantivy::collector::{Count, TopDocs};
use tantivy::query::Query;
use tantivy::schema::Value;
use tantivy::{DocAddress, Order, Searcher, TantivyDocument};

use crate::analysis::AnalyzerRegistry;
use crate::error::{Error, Result};
use crate::index::IndexRuntime;
use crate::query::strategies::StrategyRegistry;
use crate::query::{compile, SearchFilter};
use crate::schema::{
    FieldKind, IndexSchema, SortType, ID_FIELD, LAST_MODIFIED_FIELD, TYPE_FIELD,
};

/// A ranked search request against one index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub filter: SearchFilter,
    /// Column projection: empty = reserved fields only, `["*"]` = every
    /// stored non-reserved field, otherwise the named columns.
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default)]
    pub skip: usize,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub highlight: Option<HighlightRequest>,
}

impl SearchQuery {
    pub fn new(filter: SearchFilter) -> Self {
        Self {
            filter,
            columns: Vec::new(),
            count: default_count(),
            skip: 0,
            order_by: None,
            highlight: None,
        }
    }
}

fn default_count() -> usize {
    10
}

/// Fragment extraction for one highlighted field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighlightRequest {
    pub fields: Vec<String>,
    #[serde(default = "default_fragments")]
    pub fragments_to_return: usize,
    #[serde(default = "default_pre_tag")]
    pub pre_tag: String,
    #[serde(default = "default_post_tag")]
    pub post_tag: String,
}

fn default_fragments() -> usize {
    2
}

fn default_pre_tag() -> String {
    "<b>".to_string()
}

fn default_post_tag() -> String {
    "</b>".to_string()
}

/// A search-profile request: the profile supplies the filter tree, the
/// request's fields supply its bindings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchProfileQuery {
    #[serde(default)]
    pub profile_name: Option<String>,
    #[serde(default)]
    pub profile_selector: Option<String>,
    #[serde(default)]
    pub fields: FxHashMap<String, String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default)]
    pub skip: usize,
    #[serde(default)]
    pub order_by: Option<String>,
}

/// One hydrated hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultDocument {
    pub fields: FxHashMap<String, String>,
    pub score: f32,
    #[serde(default)]
    pub highlights: Vec<String>,
}

/// The merged result of a search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    pub documents: Vec<ResultDocument>,
    pub records_returned: usize,
    pub total_available: usize,
}

/// Compiles filters and fans searches out across shards.
pub struct SearchExecutor {
    analyzers: Arc<AnalyzerRegistry>,
    strategies: Arc<StrategyRegistry>,
}

#[derive(Clone)]
enum SortMode {
    Relevance,
    FieldLong(String),
    FieldDouble(String),
}

/// Merge key shared by every shard of one search.
#[derive(Debug, Clone, Copy)]
enum SortKey {
    Score(f32),
    Long(i64),
    Double(f64),
}

impl SortKey {
    /// Score sorts descending; field sorts ascending.
    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortKey::Score(a), SortKey::Score(b)) => {
                b.partial_cmp(a).unwrap_or(Ordering::Equal)
            }
            (SortKey::Long(a), SortKey::Long(b)) => a.cmp(b),
            (SortKey::Double(a), SortKey::Double(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            _ => Ordering::Equal,
        }
    }

    fn score(&self) -> f32 {
        match self {
            SortKey::Score(score) => *score,
            _ => 0.0,
        }
    }
}

struct PageSpec<'a> {
    columns: &'a [String],
    count: usize,
    skip: usize,
    order_by: Option<&'a str>,
    highlight: Option<&'a HighlightRequest>,
}

impl SearchExecutor {
    pub fn new(analyzers: Arc<AnalyzerRegistry>) -> Self {
        Self {
            analyzers,
            strategies: Arc::new(StrategyRegistry::new()),
        }
    }

    /// Execute a filtered search.
    pub async fn search(
        &self,
        runtime: &Arc<IndexRuntime>,
        query: &SearchQuery,
    ) -> Result<SearchResults> {
        let schema = &runtime.setting().schema;
        let compiled = compile(
            schema,
            &self.analyzers,
            &self.strategies,
            &query.filter,
            true,
            None,
        )?;
        self.execute(
            runtime,
            compiled,
            &PageSpec {
                columns: &query.columns,
                count: query.count,
                skip: query.skip,
                order_by: query.order_by.as_deref(),
                highlight: query.highlight.as_ref(),
            },
        )
        .await
    }

    /// Resolve and execute a search profile with the request's bindings.
    pub async fn search_profile(
        &self,
        runtime: &Arc<IndexRuntime>,
        query: &SearchProfileQuery,
    ) -> Result<SearchResults> {
        let setting = runtime.setting();
        let bindings: FxHashMap<String, String> = query
            .fields
            .iter()
            .map(|(name, value)| (name.to_lowercase(), value.clone()))
            .collect();

        let profile_name = match &query.profile_selector {
            Some(selector) => {
                let script = setting
                    .selectors
                    .get(&selector.to_lowercase())
                    .ok_or_else(|| Error::UnknownSearchProfile(selector.clone()))?;
                script(&bindings)
            }
            None => query.profile_name.clone().unwrap_or_default(),
        };
        if profile_name.is_empty() {
            return Err(Error::UnknownSearchProfile(
                "no profile name or selector given".to_string(),
            ));
        }
        let profile = setting
            .profiles
            .get(&profile_name.to_lowercase())
            .ok_or_else(|| Error::UnknownSearchProfile(profile_name.clone()))?;

        let compiled = compile(
            &setting.schema,
            &self.analyzers,
            &self.strategies,
            profile,
            true,
            Some(&bindings),
        )?;
        self.execute(
            runtime,
            compiled,
            &PageSpec {
                columns: &query.columns,
                count: query.count,
                skip: query.skip,
                order_by: query.order_by.as_deref(),
                highlight: None,
            },
        )
        .await
    }

    async fn execute(
        &self,
        runtime: &Arc<IndexRuntime>,
        query: Box<dyn Query>,
        page: &PageSpec<'_>,
    ) -> Result<SearchResults> {
        let schema = Arc::clone(&runtime.setting().schema);
        let sort_mode = resolve_sort(&schema, page.order_by);
        let per_shard_k = if page.count == 0 { 10 } else { page.count } + page.skip;

        // Acquire one snapshot searcher per shard, then search them in
        // parallel. The snapshots stay alive through hydration and are
        // released when this function returns, on error paths included.
        let searchers: Vec<Searcher> =
            runtime.shards().iter().map(|shard| shard.searcher()).collect();

        let mut tasks = Vec::with_capacity(searchers.len());
        for (shard_ordinal, searcher) in searchers.iter().enumerate() {
            let searcher = searcher.clone();
            let query = query.box_clone();
            let sort_mode = sort_mode.clone();
            tasks.push(tokio::task::spawn_blocking(move || {
                search_shard(&searcher, query.as_ref(), &sort_mode, per_shard_k)
                    .map(|(hits, total)| (shard_ordinal, hits, total))
            }));
        }
        let joined = futures::future::try_join_all(tasks)
            .await
            .map_err(|e| Error::Internal(format!("shard search task failed: {}", e)))?;

        let mut merged: Vec<(SortKey, usize, DocAddress)> = Vec::new();
        let mut total_available = 0usize;
        for shard_result in joined {
            let (shard_ordinal, hits, total) = shard_result?;
            total_available += total;
            for (key, address) in hits {
                merged.push((key, shard_ordinal, address));
            }
        }
        merged.sort_by(|a, b| a.0.compare(&b.0));
        merged.truncate(per_shard_k);

        let records_returned = merged.len().saturating_sub(page.skip);
        let mut highlighter =
            highlight::Highlighter::prepare(&schema, query.as_ref(), page.highlight)?;

        let mut documents = Vec::with_capacity(records_returned);
        for (key, shard_ordinal, address) in merged.into_iter().skip(page.skip) {
            let searcher = &searchers[shard_ordinal];
            let stored: TantivyDocument = searcher.doc(address)?;
            let fields = project_columns(&schema, &stored, page.columns);
            let highlights = match highlighter.as_mut() {
                Some(highlighter) => highlighter.fragments(searcher, shard_ordinal, &stored)?,
                None => Vec::new(),
            };
            documents.push(ResultDocument {
                fields,
                score: key.score(),
                highlights,
            });
        }

        Ok(SearchResults {
            documents,
            records_returned,
            total_available,
        })
    }
}

fn resolve_sort(schema: &IndexSchema, order_by: Option<&str>) -> SortMode {
    let Some(order_by) = order_by else {
        return SortMode::Relevance;
    };
    match schema.resolve(order_by) {
        Some((descriptor, _)) if descriptor.kind.is_numeric() => {
            match crate::schema::sort_type(descriptor) {
                SortType::Double => SortMode::FieldDouble(descriptor.name.clone()),
                _ => SortMode::FieldLong(descriptor.name.clone()),
            }
        }
        Some((descriptor, _)) => {
            log::debug!(
                "[search] order_by '{}' ({:?}) is not sortable, using relevance",
                descriptor.name,
                descriptor.kind
            );
            SortMode::Relevance
        }
        None => SortMode::Relevance,
    }
}

fn search_shard(
    searcher: &Searcher,
    query: &dyn Query,
    sort_mode: &SortMode,
    k: usize,
) -> Result<(Vec<(SortKey, DocAddress)>, usize)> {
    match sort_mode {
        SortMode::Relevance => {
            let (hits, total) =
                searcher.search(query, &(TopDocs::with_limit(k), Count))?;
            Ok((
                hits.into_iter()
                    .map(|(score, address)| (SortKey::Score(score), address))
                    .collect(),
                total,
            ))
        }
        SortMode::FieldLong(field) => {
            let collector =
                TopDocs::with_limit(k).order_by_fast_field::<i64>(field, Order::Asc);
            let (hits, total) = searcher.search(query, &(collector, Count))?;
            Ok((
                hits.into_iter()
                    .map(|(value, address)| (SortKey::Long(value), address))
                    .collect(),
                total,
            ))
        }
        SortMode::FieldDouble(field) => {
            let collector =
                TopDocs::with_limit(k).order_by_fast_field::<f64>(field, Order::Asc);
            let (hits, total) = searcher.search(query, &(collector, Count))?;
            Ok((
                hits.into_iter()
                    .map(|(value, address)| (SortKey::Double(value), address))
                    .collect(),
                total,
            ))
        }
    }
}

fn stored_to_string<'a, V: Value<'a>>(descriptor_kind: FieldKind, value: &V) -> Option<String> {
    match descriptor_kind {
        FieldKind::Int | FieldKind::Long | FieldKind::Date | FieldKind::DateTime => {
            value.as_i64().map(|v| v.to_string())
        }
        FieldKind::Double => value.as_f64().map(|v| v.to_string()),
        _ => value.as_str().map(|v| v.to_string()),
    }
}

/// Hydrate the reserved fields, then apply the column projection.
fn project_columns(
    schema: &IndexSchema,
    stored: &TantivyDocument,
    columns: &[String],
) -> FxHashMap<String, String> {
    let mut fields = FxHashMap::default();
    for name in [ID_FIELD, TYPE_FIELD, LAST_MODIFIED_FIELD] {
        if let Some((descriptor, field)) = schema.resolve(name) {
            if let Some(value) = stored.get_first(field) {
                if let Some(text) = stored_to_string(descriptor.kind, &value) {
                    fields.insert(name.to_string(), text);
                }
            }
        }
    }

    if columns.is_empty() {
        return fields;
    }

    if columns.len() == 1 && columns[0] == "*" {
        for (slot, descriptor) in schema.user_fields() {
            if let Some(value) = stored.get_first(schema.field_at(slot)) {
                if let Some(text) = stored_to_string(descriptor.kind, &value) {
                    fields.insert(descriptor.name.clone(), text);
                }
            }
        }
        return fields;
    }

    for column in columns {
        if let Some((descriptor, field)) = schema.resolve(column) {
            if IndexSchema::is_reserved(&descriptor.name) {
                continue;
            }
            if let Some(value) = stored.get_first(field) {
                if let Some(text) = stored_to_string(descriptor.kind, &value) {
                    fields.insert(descriptor.name.clone(), text);
                }
            }
        }
    }
    fields
}
