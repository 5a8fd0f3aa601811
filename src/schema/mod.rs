//! Field model: typed field descriptors and their tantivy schema mapping.
//!
//! Every index compiles its ordered field descriptors into an [`IndexSchema`]:
//! the tantivy schema plus a case-insensitive name table resolving to the
//! descriptor and the tantivy field handle. Reserved fields (`id`, `type`,
//! `lastmodified`, `version`) are always present and always come first.

mod cell;
mod template;

pub use cell::{create_cell, sort_type, write_cell, write_default, CellValue, FieldCell, SortType};
pub use template::DocumentTemplate;

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tantivy::schema::{
    Field, IndexRecordOption, NumericOptions, SchemaBuilder, TextFieldIndexing, TextOptions,
};

use crate::analysis::{KEYWORD_ANALYZER, STANDARD_ANALYZER};
use crate::error::{Error, Result};

/// Reserved document field names, present in every index.
pub const RESERVED_FIELDS: [&str; 4] = ["id", "type", "lastmodified", "version"];

pub const ID_FIELD: &str = "id";
pub const TYPE_FIELD: &str = "type";
pub const LAST_MODIFIED_FIELD: &str = "lastmodified";
pub const VERSION_FIELD: &str = "version";

/// Kinds of fields supported by an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Int,
    Long,
    Double,
    Bool,
    Date,
    DateTime,
    ExactText,
    Text,
    Highlight,
    Custom,
    Stored,
}

impl FieldKind {
    /// Numeric kinds admit numeric range queries; all others do not.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            FieldKind::Int
                | FieldKind::Long
                | FieldKind::Double
                | FieldKind::Date
                | FieldKind::DateTime
        )
    }
}

/// Postings detail recorded for an indexed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldPostings {
    Docs = 0,
    DocsAndFreqs = 1,
    DocsAndFreqsAndPositions = 2,
    DocsAndFreqsAndPositionsAndOffsets = 3,
}

impl FieldPostings {
    fn record_option(self) -> IndexRecordOption {
        match self {
            FieldPostings::Docs => IndexRecordOption::Basic,
            FieldPostings::DocsAndFreqs => IndexRecordOption::WithFreqs,
            // tantivy folds offsets into the positions encoding
            FieldPostings::DocsAndFreqsAndPositions
            | FieldPostings::DocsAndFreqsAndPositionsAndOffsets => {
                IndexRecordOption::WithFreqsAndPositions
            }
        }
    }
}

/// Term-vector detail. Kept as definition-level metadata: highlighting
/// re-analyzes the stored text, so no separate vector storage exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldTermVector {
    #[default]
    No,
    Yes,
    WithPositions,
    WithOffsets,
    WithPositionsAndOffsets,
}

/// Computes a field value from the other input fields of a document.
/// Must be pure; a `None` result falls back to the field default.
pub type ValueSource = Arc<dyn Fn(&FxHashMap<String, String>) -> Option<String> + Send + Sync>;

/// A fully-resolved field descriptor. Names are stored lowercased.
#[derive(Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    pub store_only: bool,
    pub index_analyzer: String,
    pub search_analyzer: String,
    pub postings: FieldPostings,
    pub term_vector: FieldTermVector,
    pub value_source: Option<ValueSource>,
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("store_only", &self.store_only)
            .field("index_analyzer", &self.index_analyzer)
            .field("search_analyzer", &self.search_analyzer)
            .field("has_value_source", &self.value_source.is_some())
            .finish()
    }
}

impl FieldDescriptor {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        let store_only = matches!(kind, FieldKind::Stored);
        let analyzer = match kind {
            FieldKind::Bool | FieldKind::ExactText => KEYWORD_ANALYZER,
            _ => STANDARD_ANALYZER,
        };
        Self {
            name: name.to_lowercase(),
            kind,
            store_only,
            index_analyzer: analyzer.to_string(),
            search_analyzer: analyzer.to_string(),
            postings: FieldPostings::DocsAndFreqsAndPositions,
            term_vector: FieldTermVector::No,
            value_source: None,
        }
    }
}

fn reserved_descriptors() -> Vec<FieldDescriptor> {
    let raw = |name: &str| {
        let mut d = FieldDescriptor::new(name, FieldKind::ExactText);
        d.index_analyzer = "raw".to_string();
        d.search_analyzer = "raw".to_string();
        d
    };
    let mut last_modified = FieldDescriptor::new(LAST_MODIFIED_FIELD, FieldKind::DateTime);
    last_modified.index_analyzer = "raw".to_string();
    last_modified.search_analyzer = "raw".to_string();
    let mut version = FieldDescriptor::new(VERSION_FIELD, FieldKind::Long);
    version.store_only = true;
    vec![raw(ID_FIELD), raw(TYPE_FIELD), last_modified, version]
}

/// Compiled view of an index's fields: the tantivy schema plus the
/// case-insensitive name table. Reserved fields occupy slots 0..4.
pub struct IndexSchema {
    pub schema: tantivy::schema::Schema,
    descriptors: Vec<FieldDescriptor>,
    fields: Vec<Field>,
    by_name: FxHashMap<String, usize>,
}

impl IndexSchema {
    /// Build the tantivy schema for the given user fields.
    pub fn compile(user_fields: &[FieldDescriptor]) -> Self {
        let mut descriptors = reserved_descriptors();
        descriptors.extend(user_fields.iter().cloned());

        let mut builder = SchemaBuilder::default();
        let mut fields = Vec::with_capacity(descriptors.len());
        for descriptor in &descriptors {
            fields.push(add_field(&mut builder, descriptor));
        }

        let mut by_name = FxHashMap::default();
        for (slot, descriptor) in descriptors.iter().enumerate() {
            by_name.insert(descriptor.name.clone(), slot);
        }

        Self {
            schema: builder.build(),
            descriptors,
            fields,
            by_name,
        }
    }

    /// Resolve a field by case-insensitive name.
    pub fn resolve(&self, name: &str) -> Option<(&FieldDescriptor, Field)> {
        let slot = *self.by_name.get(&name.to_lowercase())?;
        Some((&self.descriptors[slot], self.fields[slot]))
    }

    /// Resolve a field for querying: unknown and store-only fields fail.
    pub fn resolve_searchable(&self, name: &str) -> Result<(&FieldDescriptor, Field)> {
        let (descriptor, field) = self
            .resolve(name)
            .ok_or_else(|| Error::UnknownField(name.to_string()))?;
        if descriptor.store_only {
            return Err(Error::StoreOnlyField(name.to_string()));
        }
        Ok((descriptor, field))
    }

    pub fn descriptors(&self) -> &[FieldDescriptor] {
        &self.descriptors
    }

    pub fn field_at(&self, slot: usize) -> Field {
        self.fields[slot]
    }

    pub fn is_reserved(name: &str) -> bool {
        RESERVED_FIELDS.contains(&name.to_lowercase().as_str())
    }

    /// Iterate the non-reserved descriptors with their slots.
    pub fn user_fields(&self) -> impl Iterator<Item = (usize, &FieldDescriptor)> {
        self.descriptors
            .iter()
            .enumerate()
            .skip(RESERVED_FIELDS.len())
    }
}

fn add_field(builder: &mut SchemaBuilder, descriptor: &FieldDescriptor) -> Field {
    let name = descriptor.name.as_str();
    match descriptor.kind {
        FieldKind::Int | FieldKind::Long | FieldKind::Date | FieldKind::DateTime => {
            let mut options = NumericOptions::default().set_stored();
            if !descriptor.store_only {
                options = options.set_indexed().set_fast();
            }
            builder.add_i64_field(name, options)
        }
        FieldKind::Double => {
            let mut options = NumericOptions::default().set_stored();
            if !descriptor.store_only {
                options = options.set_indexed().set_fast();
            }
            builder.add_f64_field(name, options)
        }
        FieldKind::Bool | FieldKind::ExactText => {
            let analyzer = if descriptor.kind == FieldKind::Bool {
                KEYWORD_ANALYZER
            } else {
                descriptor.index_analyzer.as_str()
            };
            let options = TextOptions::default()
                .set_indexing_options(
                    TextFieldIndexing::default()
                        .set_tokenizer(analyzer)
                        .set_index_option(IndexRecordOption::Basic),
                )
                .set_stored();
            builder.add_text_field(name, options)
        }
        FieldKind::Text | FieldKind::Highlight | FieldKind::Custom => {
            let options = TextOptions::default()
                .set_indexing_options(
                    TextFieldIndexing::default()
                        .set_tokenizer(&descriptor.index_analyzer)
                        .set_index_option(descriptor.postings.record_option()),
                )
                .set_stored();
            builder.add_text_field(name, options)
        }
        FieldKind::Stored => builder.add_text_field(name, TextOptions::default().set_stored()),
    }
}
