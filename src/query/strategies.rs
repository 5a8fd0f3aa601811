//! Named query strategies: each compiles one condition into a tantivy query.

use std::ops::Bound;

use rustc_hash::FxHashMap;
use tantivy::query::{
    BooleanQuery, FuzzyTermQuery, Occur, PhraseQuery, Query, RangeQuery, RegexQuery, TermQuery,
};
use tantivy::schema::{Field, IndexRecordOption, Type};
use tantivy::tokenizer::TextAnalyzer;
use tantivy::Term;

use crate::analysis::tokenize;
use crate::error::{Error, Result};
use crate::schema::{FieldDescriptor, FieldKind};

use super::Condition;

/// Everything a strategy needs to know about the condition's target field.
pub struct StrategyContext<'a> {
    pub descriptor: &'a FieldDescriptor,
    pub field: Field,
    pub analyzer: &'a TextAnalyzer,
}

/// A named builder compiling a single condition into an executable query.
/// `None` means the condition produced no clause (e.g. zero tokens).
pub trait QueryStrategy: Send + Sync {
    fn build(
        &self,
        ctx: &StrategyContext<'_>,
        condition: &Condition,
    ) -> Result<Option<Box<dyn Query>>>;
}

/// Registry of the named strategies.
pub struct StrategyRegistry {
    strategies: FxHashMap<&'static str, Box<dyn QueryStrategy>>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyRegistry {
    pub fn new() -> Self {
        let mut strategies: FxHashMap<&'static str, Box<dyn QueryStrategy>> =
            FxHashMap::default();
        strategies.insert("term_match", Box::new(TermMatch));
        strategies.insert("fuzzy_match", Box::new(FuzzyMatch));
        strategies.insert("phrase_match", Box::new(PhraseMatch));
        strategies.insert("like", Box::new(Like));
        strategies.insert("string_range", Box::new(StringRange));
        strategies.insert("numeric_range", Box::new(NumericRange));
        Self { strategies }
    }

    pub fn get(&self, operator: &str) -> Option<&dyn QueryStrategy> {
        self.strategies
            .get(operator.to_lowercase().as_str())
            .map(|strategy| strategy.as_ref())
    }

    pub fn contains(&self, operator: &str) -> bool {
        self.strategies.contains_key(operator.to_lowercase().as_str())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn numeric_term(descriptor: &FieldDescriptor, field: Field, raw: &str) -> Result<Term> {
    match descriptor.kind {
        FieldKind::Double => {
            let value: f64 = raw.trim().parse().map_err(|_| {
                Error::InvalidCondition(format!(
                    "'{}' is not a valid double for field '{}'",
                    raw, descriptor.name
                ))
            })?;
            Ok(Term::from_field_f64(field, value))
        }
        _ => {
            let value: i64 = raw.trim().parse().map_err(|_| {
                Error::InvalidCondition(format!(
                    "'{}' is not a valid number for field '{}'",
                    raw, descriptor.name
                ))
            })?;
            Ok(Term::from_field_i64(field, value))
        }
    }
}

fn join(mut queries: Vec<Box<dyn Query>>, occur: Occur) -> Option<Box<dyn Query>> {
    match queries.len() {
        0 => None,
        1 => Some(queries.remove(0)),
        _ => Some(Box::new(BooleanQuery::new(
            queries.into_iter().map(|q| (occur, q)).collect(),
        ))),
    }
}

fn clause_occur(condition: &Condition) -> Occur {
    match condition.parameters.get("clausetype") {
        Some(clause) if clause.eq_ignore_ascii_case("or") => Occur::Should,
        _ => Occur::Must,
    }
}

fn param<T: std::str::FromStr>(condition: &Condition, key: &str, default: T) -> T {
    condition
        .parameters
        .get(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn param_bound(condition: &Condition, key: &str, term: Term) -> Bound<Term> {
    if param(condition, key, false) {
        Bound::Included(term)
    } else {
        Bound::Excluded(term)
    }
}

/// Translate a `*`/`?` wildcard pattern into an anchored regex.
fn wildcard_to_regex(token: &str) -> String {
    let mut pattern = String::with_capacity(token.len() + 8);
    for c in token.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            c if "\\.+()[]{}|^$".contains(c) => {
                pattern.push('\\');
                pattern.push(c);
            }
            c => pattern.push(c),
        }
    }
    pattern
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Exact match. Numeric fields get a single-point range; text fields are
/// tokenized with the search analyzer and joined per the `clausetype`
/// parameter.
struct TermMatch;

impl QueryStrategy for TermMatch {
    fn build(
        &self,
        ctx: &StrategyContext<'_>,
        condition: &Condition,
    ) -> Result<Option<Box<dyn Query>>> {
        if ctx.descriptor.kind.is_numeric() {
            let term = numeric_term(ctx.descriptor, ctx.field, &condition.values[0])?;
            let value_type = if ctx.descriptor.kind == FieldKind::Double {
                Type::F64
            } else {
                Type::I64
            };
            return Ok(Some(Box::new(RangeQuery::new_term_bounds(
                ctx.descriptor.name.clone(),
                value_type,
                &Bound::Included(term.clone()),
                &Bound::Included(term),
            ))));
        }

        let tokens = tokenize(ctx.analyzer, &condition.values[0]);
        let queries: Vec<Box<dyn Query>> = tokens
            .iter()
            .map(|token| {
                Box::new(TermQuery::new(
                    Term::from_field_text(ctx.field, token),
                    IndexRecordOption::Basic,
                )) as Box<dyn Query>
            })
            .collect();
        Ok(join(queries, clause_occur(condition)))
    }
}

/// Per-token fuzzy match with `slop` (edit distance, default 1) and
/// `prefixlength` (> 0 selects the prefix variant) parameters.
struct FuzzyMatch;

impl QueryStrategy for FuzzyMatch {
    fn build(
        &self,
        ctx: &StrategyContext<'_>,
        condition: &Condition,
    ) -> Result<Option<Box<dyn Query>>> {
        let distance: u8 = param(condition, "slop", 1u8);
        let prefix_length: u32 = param(condition, "prefixlength", 0u32);
        let tokens = tokenize(ctx.analyzer, &condition.values[0]);
        let queries: Vec<Box<dyn Query>> = tokens
            .iter()
            .map(|token| {
                let term = Term::from_field_text(ctx.field, token);
                let query = if prefix_length > 0 {
                    FuzzyTermQuery::new_prefix(term, distance, true)
                } else {
                    FuzzyTermQuery::new(term, distance, true)
                };
                Box::new(query) as Box<dyn Query>
            })
            .collect();
        Ok(join(queries, Occur::Must))
    }
}

/// Phrase match with a `slop` parameter (default 0). A single token degrades
/// to a term query, zero tokens to no clause.
struct PhraseMatch;

impl QueryStrategy for PhraseMatch {
    fn build(
        &self,
        ctx: &StrategyContext<'_>,
        condition: &Condition,
    ) -> Result<Option<Box<dyn Query>>> {
        let tokens = tokenize(ctx.analyzer, &condition.values[0]);
        match tokens.len() {
            0 => Ok(None),
            1 => Ok(Some(Box::new(TermQuery::new(
                Term::from_field_text(ctx.field, &tokens[0]),
                IndexRecordOption::Basic,
            )))),
            _ => {
                let terms: Vec<Term> = tokens
                    .iter()
                    .map(|token| Term::from_field_text(ctx.field, token))
                    .collect();
                let mut query = PhraseQuery::new(terms);
                query.set_slop(param(condition, "slop", 0u32));
                Ok(Some(Box::new(query)))
            }
        }
    }
}

/// Wildcard match: `*` and `?` patterns compiled to anchored regexes.
/// Patterns are split on whitespace and lowercased rather than run through
/// the field analyzer, which would strip the metacharacters.
struct Like;

impl QueryStrategy for Like {
    fn build(
        &self,
        ctx: &StrategyContext<'_>,
        condition: &Condition,
    ) -> Result<Option<Box<dyn Query>>> {
        let tokens: Vec<String> = condition.values[0]
            .split_whitespace()
            .map(|token| token.to_lowercase())
            .collect();
        let mut queries: Vec<Box<dyn Query>> = Vec::with_capacity(tokens.len());
        for token in &tokens {
            let query = RegexQuery::from_pattern(&wildcard_to_regex(token), ctx.field)
                .map_err(|e| {
                    Error::InvalidCondition(format!("invalid wildcard '{}': {}", token, e))
                })?;
            queries.push(Box::new(query));
        }
        Ok(join(queries, Occur::Must))
    }
}

/// Term range over analyzed string bounds, with `includelower` /
/// `includeupper` parameters (default false).
struct StringRange;

impl QueryStrategy for StringRange {
    fn build(
        &self,
        ctx: &StrategyContext<'_>,
        condition: &Condition,
    ) -> Result<Option<Box<dyn Query>>> {
        if condition.values.len() < 2 {
            return Err(Error::InvalidCondition(format!(
                "range on field '{}' requires a lower and an upper bound",
                ctx.descriptor.name
            )));
        }
        let lower = first_token(ctx, &condition.values[0])?;
        let upper = first_token(ctx, &condition.values[1])?;
        if lower == upper {
            return Err(Error::InvalidCondition(format!(
                "range bounds on field '{}' are equal",
                ctx.descriptor.name
            )));
        }
        let lower = param_bound(condition, "includelower", Term::from_field_text(ctx.field, &lower));
        let upper = param_bound(condition, "includeupper", Term::from_field_text(ctx.field, &upper));
        Ok(Some(Box::new(RangeQuery::new_term_bounds(
            ctx.descriptor.name.clone(),
            Type::Str,
            &lower,
            &upper,
        ))))
    }
}

/// Numeric range parsed per the field kind, same inclusivity parameters.
struct NumericRange;

impl QueryStrategy for NumericRange {
    fn build(
        &self,
        ctx: &StrategyContext<'_>,
        condition: &Condition,
    ) -> Result<Option<Box<dyn Query>>> {
        if !ctx.descriptor.kind.is_numeric() {
            return Err(Error::InvalidCondition(format!(
                "field '{}' does not support numeric ranges",
                ctx.descriptor.name
            )));
        }
        if condition.values.len() < 2 {
            return Err(Error::InvalidCondition(format!(
                "range on field '{}' requires a lower and an upper bound",
                ctx.descriptor.name
            )));
        }
        let lower = numeric_term(ctx.descriptor, ctx.field, &condition.values[0])?;
        let upper = numeric_term(ctx.descriptor, ctx.field, &condition.values[1])?;
        if lower == upper {
            return Err(Error::InvalidCondition(format!(
                "range bounds on field '{}' are equal",
                ctx.descriptor.name
            )));
        }
        let value_type = if ctx.descriptor.kind == FieldKind::Double {
            Type::F64
        } else {
            Type::I64
        };
        let lower = param_bound(condition, "includelower", lower);
        let upper = param_bound(condition, "includeupper", upper);
        Ok(Some(Box::new(RangeQuery::new_term_bounds(
            ctx.descriptor.name.clone(),
            value_type,
            &lower,
            &upper,
        ))))
    }
}

fn first_token(ctx: &StrategyContext<'_>, value: &str) -> Result<String> {
    tokenize(ctx.analyzer, value)
        .into_iter()
        .next()
        .ok_or_else(|| {
            Error::InvalidCondition(format!(
                "'{}' analyzes to no tokens on field '{}'",
                value, ctx.descriptor.name
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalyzerRegistry;
    use crate::schema::{FieldDescriptor, FieldKind, IndexSchema};

    fn ctx_for<'a>(
        schema: &'a IndexSchema,
        analyzer: &'a TextAnalyzer,
        name: &str,
    ) -> StrategyContext<'a> {
        let (descriptor, field) = schema.resolve(name).unwrap();
        StrategyContext {
            descriptor,
            field,
            analyzer,
        }
    }

    fn fixtures() -> (IndexSchema, TextAnalyzer) {
        let schema = IndexSchema::compile(&[
            FieldDescriptor::new("title", FieldKind::Text),
            FieldDescriptor::new("year", FieldKind::Int),
        ]);
        let analyzer = AnalyzerRegistry::new().get("standard").unwrap();
        (schema, analyzer)
    }

    #[test]
    fn term_match_zero_tokens_builds_no_clause() {
        let (schema, analyzer) = fixtures();
        let ctx = ctx_for(&schema, &analyzer, "title");
        let condition = Condition::new("title", "term_match", vec!["  ... ".into()]);
        assert!(TermMatch.build(&ctx, &condition).unwrap().is_none());
    }

    #[test]
    fn term_match_on_numeric_field_rejects_garbage() {
        let (schema, analyzer) = fixtures();
        let ctx = ctx_for(&schema, &analyzer, "year");
        let condition = Condition::new("year", "term_match", vec!["abc".into()]);
        assert!(matches!(
            TermMatch.build(&ctx, &condition),
            Err(Error::InvalidCondition(_))
        ));

        let condition = Condition::new("year", "term_match", vec!["1965".into()]);
        assert!(TermMatch.build(&ctx, &condition).unwrap().is_some());
    }

    #[test]
    fn numeric_range_rejects_equal_bounds() {
        let (schema, analyzer) = fixtures();
        let ctx = ctx_for(&schema, &analyzer, "year");
        let condition =
            Condition::new("year", "numeric_range", vec!["10".into(), "10".into()]);
        assert!(matches!(
            NumericRange.build(&ctx, &condition),
            Err(Error::InvalidCondition(_))
        ));
    }

    #[test]
    fn string_range_rejects_equal_bounds() {
        let (schema, analyzer) = fixtures();
        let ctx = ctx_for(&schema, &analyzer, "title");
        let condition =
            Condition::new("title", "string_range", vec!["Apple".into(), "APPLE".into()]);
        // analyzer folds both bounds to the same token
        assert!(matches!(
            StringRange.build(&ctx, &condition),
            Err(Error::InvalidCondition(_))
        ));
    }

    #[test]
    fn wildcard_translation_escapes_regex_metacharacters() {
        assert_eq!(wildcard_to_regex("qu?ck*"), "qu.ck.*");
        assert_eq!(wildcard_to_regex("a.b"), "a\\.b");
    }

    #[test]
    fn registry_is_case_insensitive_and_complete() {
        let registry = StrategyRegistry::new();
        for operator in [
            "term_match",
            "fuzzy_match",
            "phrase_match",
            "like",
            "string_range",
            "numeric_range",
        ] {
            assert!(registry.contains(operator), "missing {}", operator);
        }
        assert!(registry.get("TERM_MATCH").is_some());
        assert!(registry.get("unknown").is_none());
    }
}
