//! Per-worker cached document templates.
//!
//! A template is one set of mutable cells covering every field of an index.
//! Each write worker keeps its own template per index and re-stages it for
//! every command, so no document allocation happens per write and no mutable
//! state is ever shared across workers.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rustc_hash::FxHashMap;
use tantivy::TantivyDocument;

use super::cell::{create_cell, write_cell, write_default, CellValue, FieldCell};
use super::{IndexSchema, RESERVED_FIELDS};

/// One reusable document image, confined to its owning write worker.
pub struct DocumentTemplate {
    schema: Arc<IndexSchema>,
    index_name: String,
    cells: Vec<FieldCell>,
}

impl DocumentTemplate {
    pub fn new(schema: Arc<IndexSchema>, index_name: &str) -> Self {
        let cells = schema.descriptors().iter().map(create_cell).collect();
        Self {
            schema,
            index_name: index_name.to_string(),
            cells,
        }
    }

    /// The compiled schema this template was built against. Used by the
    /// write workers to detect a re-opened index with changed fields.
    pub fn schema(&self) -> &Arc<IndexSchema> {
        &self.schema
    }

    /// Stage a document image: reserved cells first, then every user field.
    /// `fields` must be keyed by lowercase field name. A value source takes
    /// precedence over the input value; any parse failure resets the cell to
    /// the field default instead of failing the document.
    pub fn stage(&mut self, id: &str, version: i64, fields: &FxHashMap<String, String>) {
        let descriptors = self.schema.descriptors();

        self.cells[0].value = CellValue::Text(id.to_string());
        self.cells[1].value = CellValue::Text(self.index_name.clone());
        self.cells[2].value = CellValue::Long(now_millis());
        self.cells[3].value = CellValue::Long(version);

        for slot in RESERVED_FIELDS.len()..descriptors.len() {
            let descriptor = &descriptors[slot];
            let computed = descriptor
                .value_source
                .as_ref()
                .and_then(|source| source(fields));
            let raw = computed
                .as_deref()
                .or_else(|| fields.get(&descriptor.name).map(String::as_str));
            match raw {
                Some(raw) => {
                    if let Err(e) = write_cell(descriptor, &mut self.cells[slot], raw) {
                        log::debug!(
                            "[template {}] field '{}' fell back to default: {}",
                            self.index_name,
                            descriptor.name,
                            e
                        );
                        write_default(descriptor, &mut self.cells[slot]);
                    }
                }
                None => write_default(descriptor, &mut self.cells[slot]),
            }
        }
    }

    /// Materialize the staged cells into a tantivy document.
    pub fn to_document(&self) -> TantivyDocument {
        let mut doc = TantivyDocument::new();
        for (slot, cell) in self.cells.iter().enumerate() {
            let field = self.schema.field_at(slot);
            match &cell.value {
                CellValue::Text(text) => doc.add_text(field, text),
                CellValue::Long(value) => doc.add_i64(field, *value),
                CellValue::Double(value) => doc.add_f64(field, *value),
                CellValue::Bool(value) => {
                    doc.add_text(field, if *value { "true" } else { "false" })
                }
            }
        }
        doc
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::schema::{FieldDescriptor, FieldKind};

    fn sample_schema() -> Arc<IndexSchema> {
        Arc::new(IndexSchema::compile(&[
            FieldDescriptor::new("title", FieldKind::Text),
            FieldDescriptor::new("year", FieldKind::Int),
        ]))
    }

    #[test]
    fn staging_fills_reserved_and_user_cells() {
        let schema = sample_schema();
        let mut template = DocumentTemplate::new(Arc::clone(&schema), "books");

        let mut fields = FxHashMap::default();
        fields.insert("title".to_string(), "Dune".to_string());
        fields.insert("year".to_string(), "1965".to_string());
        template.stage("b1", 1, &fields);

        assert_eq!(template.cells[0].value, CellValue::Text("b1".into()));
        assert_eq!(template.cells[1].value, CellValue::Text("books".into()));
        assert_eq!(template.cells[3].value, CellValue::Long(1));
        assert_eq!(template.cells[4].value, CellValue::Text("Dune".into()));
        assert_eq!(template.cells[5].value, CellValue::Long(1965));
    }

    #[test]
    fn bad_field_falls_back_to_default_without_failing() {
        let schema = sample_schema();
        let mut template = DocumentTemplate::new(schema, "books");

        let mut fields = FxHashMap::default();
        fields.insert("year".to_string(), "not-a-year".to_string());
        template.stage("b2", 1, &fields);

        assert_eq!(template.cells[5].value, CellValue::Long(0));
    }

    #[test]
    fn value_source_overrides_input() {
        let mut title = FieldDescriptor::new("title", FieldKind::Text);
        title.value_source = Some(Arc::new(|fields: &FxHashMap<String, String>| {
            fields.get("raw_title").map(|t| t.to_uppercase())
        }));
        let schema = Arc::new(IndexSchema::compile(&[title]));
        let mut template = DocumentTemplate::new(schema, "books");

        let mut fields = FxHashMap::default();
        fields.insert("raw_title".to_string(), "dune".to_string());
        fields.insert("title".to_string(), "ignored".to_string());
        template.stage("b3", 1, &fields);

        assert_eq!(template.cells[4].value, CellValue::Text("DUNE".into()));
    }
}
