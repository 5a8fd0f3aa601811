//! Analyzer registry and tokenization helpers.
//!
//! Analyzers are tantivy [`TextAnalyzer`] pipelines, registered by
//! case-insensitive name. A handful of built-ins are always present;
//! additional analyzers are declared in the index definition as a tokenizer
//! plus a non-empty token filter chain and registered when the setting is
//! built.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tantivy::tokenizer::{
    Language, LowerCaser, RawTokenizer, RemoveLongFilter, SimpleTokenizer, Stemmer,
    TextAnalyzer, WhitespaceTokenizer,
};

use crate::error::{Error, Result};

/// Name of the default full-text analyzer.
pub const STANDARD_ANALYZER: &str = "standard";
/// Name of the exact-match analyzer (raw token, lowercased).
pub const KEYWORD_ANALYZER: &str = "keyword";

/// Token length ceiling applied by the word-oriented built-ins.
const MAX_TOKEN_LEN: usize = 40;

/// Tokenizer half of a custom analyzer definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenizerKind {
    Standard,
    Whitespace,
    Keyword,
}

/// Token filters available to custom analyzer definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenFilterKind {
    Lowercase,
    RemoveLong,
    Stemmer,
}

/// A user-declared analyzer: tokenizer plus at least one filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerDefinition {
    pub name: String,
    pub tokenizer: TokenizerKind,
    pub filters: Vec<TokenFilterKind>,
}

/// Process-wide registry of named analyzers.
pub struct AnalyzerRegistry {
    analyzers: RwLock<FxHashMap<String, TextAnalyzer>>,
}

impl Default for AnalyzerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        let mut analyzers = FxHashMap::default();
        analyzers.insert(
            STANDARD_ANALYZER.to_string(),
            TextAnalyzer::builder(SimpleTokenizer::default())
                .filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
                .filter(LowerCaser)
                .build(),
        );
        analyzers.insert(
            KEYWORD_ANALYZER.to_string(),
            TextAnalyzer::builder(RawTokenizer::default())
                .filter(LowerCaser)
                .build(),
        );
        // Verbatim single-token analyzer backing the reserved fields.
        analyzers.insert(
            "raw".to_string(),
            TextAnalyzer::builder(RawTokenizer::default()).build(),
        );
        analyzers.insert(
            "whitespace".to_string(),
            TextAnalyzer::builder(WhitespaceTokenizer::default())
                .filter(LowerCaser)
                .build(),
        );
        // Word splitting and case folding only, no length cap.
        analyzers.insert(
            "lowercase".to_string(),
            TextAnalyzer::builder(SimpleTokenizer::default())
                .filter(LowerCaser)
                .build(),
        );
        analyzers.insert(
            "stem".to_string(),
            TextAnalyzer::builder(SimpleTokenizer::default())
                .filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
                .filter(LowerCaser)
                .filter(Stemmer::new(Language::English))
                .build(),
        );
        Self {
            analyzers: RwLock::new(analyzers),
        }
    }

    /// Build and register a custom analyzer. A filter chain is mandatory so
    /// that a bare tokenizer cannot masquerade as a full analyzer.
    pub fn register(&self, definition: &AnalyzerDefinition) -> Result<()> {
        if definition.filters.is_empty() {
            return Err(Error::ValidationFailed(format!(
                "analyzer '{}' declares no token filters",
                definition.name
            )));
        }
        let mut builder = match definition.tokenizer {
            TokenizerKind::Standard => {
                TextAnalyzer::builder(SimpleTokenizer::default()).dynamic()
            }
            TokenizerKind::Whitespace => {
                TextAnalyzer::builder(WhitespaceTokenizer::default()).dynamic()
            }
            TokenizerKind::Keyword => TextAnalyzer::builder(RawTokenizer::default()).dynamic(),
        };
        for filter in &definition.filters {
            builder = match filter {
                TokenFilterKind::Lowercase => builder.filter_dynamic(LowerCaser),
                TokenFilterKind::RemoveLong => {
                    builder.filter_dynamic(RemoveLongFilter::limit(MAX_TOKEN_LEN))
                }
                TokenFilterKind::Stemmer => {
                    builder.filter_dynamic(Stemmer::new(Language::English))
                }
            };
        }
        self.analyzers
            .write()
            .insert(definition.name.to_lowercase(), builder.build());
        Ok(())
    }

    /// Look up an analyzer by case-insensitive name.
    pub fn get(&self, name: &str) -> Option<TextAnalyzer> {
        self.analyzers.read().get(&name.to_lowercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.analyzers.read().contains_key(&name.to_lowercase())
    }
}

/// Run `text` through `analyzer` and collect the token texts in order.
///
/// The token stream is drained to exhaustion; tantivy closes it on drop, so
/// the stream is released on every exit path.
pub fn tokenize(analyzer: &TextAnalyzer, text: &str) -> Vec<String> {
    let mut analyzer = analyzer.clone();
    let mut stream = analyzer.token_stream(text);
    let mut tokens = Vec::new();
    while stream.advance() {
        tokens.push(stream.token().text.clone());
    }
    tokens
}
