//! Declarative filter trees and their compilation into executable queries.
//!
//! A [`SearchFilter`] is a nested conjunction/disjunction of [`Condition`]s.
//! [`compile`] walks the tree, resolves every condition against the index
//! schema and the named [`strategies`], and produces a tantivy boolean query
//! ready for execution.

pub mod strategies;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tantivy::query::{BooleanQuery, BoostQuery, ConstScoreQuery, Occur, Query};

use crate::analysis::AnalyzerRegistry;
use crate::error::{Error, Result};
use crate::schema::IndexSchema;
use strategies::{StrategyContext, StrategyRegistry};

/// Join semantics of one filter level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    #[default]
    And,
    Or,
}

/// What to do when a search profile leaves a condition's value unbound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MissingValuePolicy {
    ThrowError,
    #[default]
    Default,
    Ignore,
}

/// A single predicate on one field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: String,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub parameters: FxHashMap<String, String>,
    #[serde(default = "default_boost")]
    pub boost: i32,
    #[serde(default)]
    pub missing_value: MissingValuePolicy,
}

fn default_boost() -> i32 {
    1
}

impl Condition {
    pub fn new(field: &str, operator: &str, values: Vec<String>) -> Self {
        Self {
            field: field.to_string(),
            operator: operator.to_string(),
            values,
            parameters: FxHashMap::default(),
            boost: 1,
            missing_value: MissingValuePolicy::Default,
        }
    }
}

/// A nested boolean filter tree.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchFilter {
    #[serde(default)]
    pub filter_type: FilterType,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub sub_filters: Vec<SearchFilter>,
    #[serde(default)]
    pub constant_score: i32,
}

impl SearchFilter {
    pub fn and(conditions: Vec<Condition>) -> Self {
        Self {
            filter_type: FilterType::And,
            conditions,
            ..Default::default()
        }
    }

    pub fn or(conditions: Vec<Condition>) -> Self {
        Self {
            filter_type: FilterType::Or,
            conditions,
            ..Default::default()
        }
    }
}

/// Compile a filter tree into an executable query.
///
/// `bindings` switches the compiler into search-profile mode: each
/// condition's first value is replaced by the profile-supplied value for its
/// field, with absent bindings handled per the condition's
/// [`MissingValuePolicy`].
pub fn compile(
    schema: &IndexSchema,
    analyzers: &AnalyzerRegistry,
    strategies: &StrategyRegistry,
    filter: &SearchFilter,
    top_level: bool,
    bindings: Option<&FxHashMap<String, String>>,
) -> Result<Box<dyn Query>> {
    let occur = match filter.filter_type {
        FilterType::And => Occur::Must,
        FilterType::Or => Occur::Should,
    };

    let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();

    for condition in &filter.conditions {
        let strategy = strategies
            .get(&condition.operator)
            .ok_or_else(|| Error::UnknownQueryOperator(condition.operator.clone()))?;
        let (descriptor, field) = schema.resolve_searchable(&condition.field)?;

        let effective = match bindings {
            None => std::borrow::Cow::Borrowed(condition),
            Some(bindings) => {
                match bindings.get(&descriptor.name) {
                    Some(value) => {
                        let mut bound = condition.clone();
                        if bound.values.is_empty() {
                            bound.values.push(value.clone());
                        } else {
                            bound.values[0] = value.clone();
                        }
                        std::borrow::Cow::Owned(bound)
                    }
                    None => match condition.missing_value {
                        MissingValuePolicy::Ignore => continue,
                        MissingValuePolicy::ThrowError => {
                            return Err(Error::InvalidCondition(format!(
                                "no value bound for field '{}'",
                                condition.field
                            )))
                        }
                        // keep the literal value from the condition
                        MissingValuePolicy::Default => std::borrow::Cow::Borrowed(condition),
                    },
                }
            }
        };

        if effective.values.is_empty() || effective.values.iter().any(|v| v.is_empty()) {
            return Err(Error::InvalidCondition(format!(
                "empty value for field '{}'",
                condition.field
            )));
        }

        let analyzer = analyzers
            .get(&descriptor.search_analyzer)
            .ok_or_else(|| Error::ValidationFailed(format!(
                "analyzer '{}' is not registered",
                descriptor.search_analyzer
            )))?;
        let ctx = StrategyContext {
            descriptor,
            field,
            analyzer: &analyzer,
        };

        if let Some(query) = strategy.build(&ctx, &effective)? {
            let query: Box<dyn Query> = if effective.boost > 1 {
                Box::new(BoostQuery::new(query, effective.boost as f32))
            } else {
                query
            };
            clauses.push((occur, query));
        }
    }

    for sub_filter in &filter.sub_filters {
        let sub = compile(schema, analyzers, strategies, sub_filter, false, bindings)?;
        clauses.push((occur, sub));
    }

    let joined: Box<dyn Query> = Box::new(BooleanQuery::new(clauses));
    if filter.constant_score > 1 && !top_level {
        return Ok(Box::new(ConstScoreQuery::new(
            joined,
            filter.constant_score as f32,
        )));
    }
    Ok(joined)
}
