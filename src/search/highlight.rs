//! Fragment highlighting over stored text.
//!
//! Highlighting re-analyzes the stored value of the requested field against
//! the executed query, so it works on any stored text field. The stored
//! text is cut into word-aligned windows; each window is scored by the
//! snippet generator, windows without a match are skipped, and the best
//! windows are returned up to the requested fragment count. Requests
//! naming anything but exactly one resolvable field are silently skipped.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tantivy::query::Query;
use tantivy::schema::{Field, Value};
use tantivy::snippet::SnippetGenerator;
use tantivy::{Searcher, TantivyDocument};

use crate::error::Result;
use crate::schema::{FieldKind, IndexSchema};

use super::HighlightRequest;

/// Upper bound on the character length of one fragment window.
const FRAGMENT_WINDOW_CHARS: usize = 150;

/// Per-search highlighting state: one snippet generator per shard snapshot.
pub struct Highlighter<'a> {
    request: &'a HighlightRequest,
    query: &'a dyn Query,
    field: Field,
    generators: FxHashMap<usize, SnippetGenerator>,
}

impl<'a> Highlighter<'a> {
    /// Validate the request against the schema. Returns `None` when the
    /// request is absent, names more than one field, or the field does not
    /// carry highlightable stored text.
    pub fn prepare(
        schema: &Arc<IndexSchema>,
        query: &'a dyn Query,
        request: Option<&'a HighlightRequest>,
    ) -> Result<Option<Highlighter<'a>>> {
        let Some(request) = request else {
            return Ok(None);
        };
        if request.fields.len() != 1 {
            return Ok(None);
        }
        let Some((descriptor, field)) = schema.resolve(&request.fields[0]) else {
            return Ok(None);
        };
        match descriptor.kind {
            FieldKind::Text | FieldKind::Highlight | FieldKind::Custom => {}
            _ => return Ok(None),
        }
        Ok(Some(Highlighter {
            request,
            query,
            field,
            generators: FxHashMap::default(),
        }))
    }

    /// Emit up to `fragments_to_return` tagged fragments for one document,
    /// best-scoring first. Windows the query does not match score zero and
    /// are skipped.
    pub fn fragments(
        &mut self,
        searcher: &Searcher,
        shard_ordinal: usize,
        document: &TantivyDocument,
    ) -> Result<Vec<String>> {
        let Some(text) = document.get_first(self.field).and_then(|value| value.as_str())
        else {
            return Ok(Vec::new());
        };

        if !self.generators.contains_key(&shard_ordinal) {
            let mut generator = SnippetGenerator::create(searcher, self.query, self.field)?;
            generator.set_max_num_chars(FRAGMENT_WINDOW_CHARS);
            self.generators.insert(shard_ordinal, generator);
        }
        let generator = self
            .generators
            .get(&shard_ordinal)
            .expect("generator just inserted");

        let mut scored: Vec<(usize, String)> = Vec::new();
        for window in split_windows(text, FRAGMENT_WINDOW_CHARS) {
            let mut snippet = generator.snippet(window);
            let score = snippet.highlighted().len();
            if score == 0 {
                continue;
            }
            snippet.set_snippet_prefix_postfix(&self.request.pre_tag, &self.request.post_tag);
            let html = snippet.to_html();
            if html.is_empty() {
                continue;
            }
            scored.push((score, html));
        }

        // stable sort: equal scores stay in document order
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.truncate(self.request.fragments_to_return.max(1));
        Ok(scored.into_iter().map(|(_, html)| html).collect())
    }
}

/// Cut `text` into word-aligned windows of at most `max_chars` characters.
/// A single oversized word becomes its own window rather than being split.
fn split_windows(text: &str, max_chars: usize) -> Vec<&str> {
    let mut windows = Vec::new();
    let base = text.as_ptr() as usize;
    let mut window_start: Option<usize> = None;
    let mut window_end = 0usize;

    for word in text.split_whitespace() {
        let offset = word.as_ptr() as usize - base;
        let end = offset + word.len();
        match window_start {
            Some(start) if end - start <= max_chars => {
                window_end = end;
            }
            Some(start) => {
                windows.push(&text[start..window_end]);
                window_start = Some(offset);
                window_end = end;
            }
            None => {
                window_start = Some(offset);
                window_end = end;
            }
        }
    }
    if let Some(start) = window_start {
        windows.push(&text[start..window_end]);
    }
    windows
}
