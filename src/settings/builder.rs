//! Validation of user index definitions into immutable settings.

use std::path::PathBuf;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::analysis::{AnalyzerRegistry, KEYWORD_ANALYZER, STANDARD_ANALYZER};
use crate::error::{Error, Result};
use crate::query::strategies::StrategyRegistry;
use crate::query::SearchFilter;
use crate::schema::{FieldDescriptor, FieldKind, IndexSchema};

use super::{IndexDefinition, IndexSetting, ScriptRegistry};

/// Validates an [`IndexDefinition`] into an immutable [`IndexSetting`].
pub struct SettingBuilder {
    analyzers: Arc<AnalyzerRegistry>,
    scripts: Arc<ScriptRegistry>,
    strategies: StrategyRegistry,
    base_path: PathBuf,
}

impl SettingBuilder {
    pub fn new(
        analyzers: Arc<AnalyzerRegistry>,
        scripts: Arc<ScriptRegistry>,
        base_path: PathBuf,
    ) -> Self {
        Self {
            analyzers,
            scripts,
            strategies: StrategyRegistry::new(),
            base_path,
        }
    }

    pub fn build(&self, definition: &IndexDefinition) -> Result<Arc<IndexSetting>> {
        let name = definition.name.trim();
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(Error::ValidationFailed(format!(
                "'{}' is not a valid index name",
                definition.name
            )));
        }
        if definition.configuration.shard_count < 1 {
            return Err(Error::ValidationFailed(
                "shard count must be at least 1".to_string(),
            ));
        }

        for analyzer in &definition.analyzers {
            self.analyzers.register(analyzer)?;
        }

        let mut descriptors = Vec::with_capacity(definition.fields.len());
        let mut seen: FxHashMap<String, ()> = FxHashMap::default();
        for field in &definition.fields {
            let field_name = field.name.to_lowercase();
            if IndexSchema::is_reserved(&field_name) {
                return Err(Error::ValidationFailed(format!(
                    "'{}' is a reserved field name",
                    field.name
                )));
            }
            if seen.insert(field_name.clone(), ()).is_some() {
                return Err(Error::ValidationFailed(format!(
                    "field '{}' is defined more than once",
                    field.name
                )));
            }

            let mut descriptor = FieldDescriptor::new(&field_name, field.kind);
            let default_analyzer = match field.kind {
                FieldKind::ExactText | FieldKind::Bool => KEYWORD_ANALYZER,
                _ => STANDARD_ANALYZER,
            };
            descriptor.index_analyzer = field
                .index_analyzer
                .as_deref()
                .unwrap_or(default_analyzer)
                .to_lowercase();
            descriptor.search_analyzer = field
                .search_analyzer
                .as_deref()
                .unwrap_or(default_analyzer)
                .to_lowercase();
            if let Some(postings) = field.postings {
                descriptor.postings = postings;
            }
            descriptor.term_vector = field.term_vector;

            for analyzer in [&descriptor.index_analyzer, &descriptor.search_analyzer] {
                if !self.analyzers.contains(analyzer) {
                    return Err(Error::ValidationFailed(format!(
                        "field '{}' references unknown analyzer '{}'",
                        field.name, analyzer
                    )));
                }
            }

            if let Some(script) = &field.script {
                descriptor.value_source =
                    Some(self.scripts.computed(script).ok_or_else(|| {
                        Error::ValidationFailed(format!(
                            "field '{}' references unknown script '{}'",
                            field.name, script
                        ))
                    })?);
            }

            descriptors.push(descriptor);
        }

        let schema = Arc::new(IndexSchema::compile(&descriptors));

        let mut profiles = FxHashMap::default();
        for profile in &definition.profiles {
            self.validate_profile(&schema, &profile.query)
                .map_err(|e| {
                    Error::ValidationFailed(format!("profile '{}': {}", profile.name, e))
                })?;
            profiles.insert(profile.name.to_lowercase(), profile.query.clone());
        }

        let mut selectors = FxHashMap::default();
        for (name, selector) in self.scripts.selectors_snapshot() {
            selectors.insert(name, selector);
        }

        Ok(Arc::new(IndexSetting {
            name: name.to_string(),
            schema,
            profiles,
            selectors,
            shard_count: definition.configuration.shard_count,
            directory_kind: definition.configuration.directory_kind,
            ram_buffer_mb: definition.configuration.ram_buffer_mb.max(16),
            commit_period_secs: definition.configuration.commit_period_secs.max(1),
            refresh_period_ms: definition.configuration.refresh_period_ms.max(5),
            base_path: self.base_path.clone(),
        }))
    }

    fn validate_profile(&self, schema: &IndexSchema, filter: &SearchFilter) -> Result<()> {
        for condition in &filter.conditions {
            if !self.strategies.contains(&condition.operator) {
                return Err(Error::UnknownQueryOperator(condition.operator.clone()));
            }
            schema.resolve_searchable(&condition.field)?;
        }
        for sub_filter in &filter.sub_filters {
            self.validate_profile(schema, sub_filter)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Condition;
    use crate::settings::{FieldDefinition, ProfileDefinition};

    fn builder() -> SettingBuilder {
        SettingBuilder::new(
            Arc::new(AnalyzerRegistry::new()),
            Arc::new(ScriptRegistry::new()),
            PathBuf::from("/tmp/flexsearch-tests"),
        )
    }

    fn definition() -> IndexDefinition {
        let mut definition = IndexDefinition::new("books");
        definition.fields = vec![
            FieldDefinition::new("title", FieldKind::Text),
            FieldDefinition::new("year", FieldKind::Int),
        ];
        definition
    }

    #[test]
    fn valid_definition_builds() {
        let setting = builder().build(&definition()).unwrap();
        assert_eq!(setting.name, "books");
        assert_eq!(setting.shard_count, 1);
        assert!(setting.schema.resolve("title").is_some());
    }

    #[test]
    fn reserved_field_names_are_rejected() {
        let mut bad = definition();
        bad.fields.push(FieldDefinition::new("Version", FieldKind::Int));
        assert!(matches!(
            builder().build(&bad),
            Err(Error::ValidationFailed(_))
        ));
    }

    #[test]
    fn zero_shards_is_rejected() {
        let mut bad = definition();
        bad.configuration.shard_count = 0;
        assert!(matches!(
            builder().build(&bad),
            Err(Error::ValidationFailed(_))
        ));
    }

    #[test]
    fn unknown_analyzer_is_rejected() {
        let mut bad = definition();
        bad.fields[0].index_analyzer = Some("nope".into());
        assert!(matches!(
            builder().build(&bad),
            Err(Error::ValidationFailed(_))
        ));
    }

    #[test]
    fn unknown_script_is_rejected() {
        let mut bad = definition();
        bad.fields[0].script = Some("nope".into());
        assert!(matches!(
            builder().build(&bad),
            Err(Error::ValidationFailed(_))
        ));
    }

    #[test]
    fn profile_with_bad_field_is_rejected() {
        let mut bad = definition();
        bad.profiles.push(ProfileDefinition {
            name: "by_country".into(),
            query: SearchFilter::and(vec![Condition::new(
                "country",
                "term_match",
                vec!["".into()],
            )]),
        });
        assert!(matches!(
            builder().build(&bad),
            Err(Error::ValidationFailed(_))
        ));
    }
}
