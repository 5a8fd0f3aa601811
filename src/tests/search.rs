use std::sync::Arc;

use crate::error::Error;
use crate::index::writer::Command;
use crate::query::{Condition, MissingValuePolicy, SearchFilter};
use crate::schema::FieldKind;
use crate::search::{HighlightRequest, SearchExecutor, SearchProfileQuery, SearchQuery};
use crate::settings::{FieldDefinition, ProfileDefinition, ScriptRegistry};

use super::{definition, doc_fields, manager, manager_with_scripts, refresh};

async fn ingest_years(manager: &crate::IndexManager, name: &str, count: usize) {
    for i in 1..=count {
        let outcome = manager
            .perform_command(
                name,
                Command::Create {
                    id: format!("doc-{}", i),
                    fields: doc_fields(&[
                        ("title", "shared topic"),
                        ("year", &(1900 + i).to_string()),
                    ]),
                },
            )
            .await
            .unwrap();
        assert!(outcome.ok, "{}", outcome.message);
    }
    refresh(manager, name);
}

fn topic_query() -> SearchQuery {
    SearchQuery::new(SearchFilter::and(vec![Condition::new(
        "title",
        "term_match",
        vec!["topic".into()],
    )]))
}

#[tokio::test]
async fn multi_shard_merge_returns_the_global_top_k() {
    let (manager, _dir) = manager();
    manager.add_index(&definition("books", 3)).unwrap();
    ingest_years(&manager, "books", 12).await;

    let executor = SearchExecutor::new(Arc::clone(manager.analyzers()));
    let runtime = manager.runtime("books").unwrap();

    let mut query = topic_query();
    query.count = 5;
    query.order_by = Some("year".into());
    query.columns = vec!["year".into()];
    let results = executor.search(&runtime, &query).await.unwrap();

    assert_eq!(results.total_available, 12);
    assert_eq!(results.records_returned, 5);
    let years: Vec<&str> = results
        .documents
        .iter()
        .map(|d| d.fields.get("year").unwrap().as_str())
        .collect();
    // the merged page is the global minimum 5 years, in order
    assert_eq!(years, vec!["1901", "1902", "1903", "1904", "1905"]);
}

#[tokio::test]
async fn skip_pages_through_the_merged_ranking() {
    let (manager, _dir) = manager();
    manager.add_index(&definition("books", 3)).unwrap();
    ingest_years(&manager, "books", 12).await;

    let executor = SearchExecutor::new(Arc::clone(manager.analyzers()));
    let runtime = manager.runtime("books").unwrap();

    let mut query = topic_query();
    query.count = 4;
    query.skip = 4;
    query.order_by = Some("year".into());
    query.columns = vec!["year".into()];
    let results = executor.search(&runtime, &query).await.unwrap();

    assert_eq!(results.records_returned, 4);
    let years: Vec<&str> = results
        .documents
        .iter()
        .map(|d| d.fields.get("year").unwrap().as_str())
        .collect();
    assert_eq!(years, vec!["1905", "1906", "1907", "1908"]);
}

#[tokio::test]
async fn relevance_scores_are_non_increasing() {
    let (manager, _dir) = manager();
    manager.add_index(&definition("books", 2)).unwrap();

    for (id, body) in [
        ("a", "fox"),
        ("b", "fox fox jumping over the fox"),
        ("c", "fox fox"),
        ("d", "nothing relevant here"),
    ] {
        manager
            .perform_command(
                "books",
                Command::Create {
                    id: id.into(),
                    fields: doc_fields(&[("body", body)]),
                },
            )
            .await
            .unwrap();
    }
    refresh(&manager, "books");

    let executor = SearchExecutor::new(Arc::clone(manager.analyzers()));
    let runtime = manager.runtime("books").unwrap();
    let query = SearchQuery::new(SearchFilter::and(vec![Condition::new(
        "body",
        "term_match",
        vec!["fox".into()],
    )]));
    let results = executor.search(&runtime, &query).await.unwrap();

    assert_eq!(results.total_available, 3);
    let scores: Vec<f32> = results.documents.iter().map(|d| d.score).collect();
    for pair in scores.windows(2) {
        assert!(pair[0] >= pair[1], "scores not monotonic: {:?}", scores);
    }
}

#[tokio::test]
async fn count_caps_the_page_size() {
    let (manager, _dir) = manager();
    manager.add_index(&definition("books", 2)).unwrap();
    ingest_years(&manager, "books", 8).await;

    let executor = SearchExecutor::new(Arc::clone(manager.analyzers()));
    let runtime = manager.runtime("books").unwrap();

    let mut query = topic_query();
    query.count = 3;
    let results = executor.search(&runtime, &query).await.unwrap();
    assert_eq!(results.documents.len(), 3);
    assert_eq!(results.total_available, 8);

    // count = 0 falls back to an effective page of 10
    let mut query = topic_query();
    query.count = 0;
    let results = executor.search(&runtime, &query).await.unwrap();
    assert_eq!(results.documents.len(), 8);
}

#[tokio::test]
async fn phrase_match_with_highlighting_tags_the_matched_terms() {
    let (manager, _dir) = manager();
    manager.add_index(&definition("books", 1)).unwrap();

    manager
        .perform_command(
            "books",
            Command::Create {
                id: "h1".into(),
                fields: doc_fields(&[("title", "quick brown fox")]),
            },
        )
        .await
        .unwrap();
    refresh(&manager, "books");

    let executor = SearchExecutor::new(Arc::clone(manager.analyzers()));
    let runtime = manager.runtime("books").unwrap();

    let mut query = SearchQuery::new(SearchFilter::and(vec![Condition::new(
        "title",
        "phrase_match",
        vec!["brown fox".into()],
    )]));
    query.highlight = Some(HighlightRequest {
        fields: vec!["title".into()],
        fragments_to_return: 1,
        pre_tag: "<B>".into(),
        post_tag: "</B>".into(),
    });
    let results = executor.search(&runtime, &query).await.unwrap();

    assert_eq!(results.records_returned, 1);
    let highlights = &results.documents[0].highlights;
    assert_eq!(highlights.len(), 1);
    assert!(highlights[0].contains("<B>brown</B>"), "{}", highlights[0]);
    assert!(highlights[0].contains("<B>fox</B>"), "{}", highlights[0]);
}

#[tokio::test]
async fn highlighting_returns_multiple_scored_fragments() {
    let (manager, _dir) = manager();
    manager.add_index(&definition("books", 1)).unwrap();

    // two matches far enough apart to land in different fragment windows,
    // with a long match-free stretch between them
    let filler = "meadow grass ".repeat(30);
    let body = format!("the fox leaps at dawn {} and the fox sleeps at dusk", filler);
    manager
        .perform_command(
            "books",
            Command::Create {
                id: "h2".into(),
                fields: doc_fields(&[("body", &body)]),
            },
        )
        .await
        .unwrap();
    refresh(&manager, "books");

    let executor = SearchExecutor::new(Arc::clone(manager.analyzers()));
    let runtime = manager.runtime("books").unwrap();

    let mut query = SearchQuery::new(SearchFilter::and(vec![Condition::new(
        "body",
        "term_match",
        vec!["fox".into()],
    )]));
    query.highlight = Some(HighlightRequest {
        fields: vec!["body".into()],
        fragments_to_return: 3,
        pre_tag: "<B>".into(),
        post_tag: "</B>".into(),
    });
    let results = executor.search(&runtime, &query).await.unwrap();

    assert_eq!(results.records_returned, 1);
    let highlights = &results.documents[0].highlights;
    // both matching windows come back; the match-free middle is skipped
    assert_eq!(highlights.len(), 2, "{:?}", highlights);
    for fragment in highlights {
        assert!(fragment.contains("<B>fox</B>"), "{}", fragment);
        assert!(!fragment.contains("<B>meadow</B>"), "{}", fragment);
    }

    // the cap still applies when fewer fragments are requested
    let mut capped = query.clone();
    if let Some(highlight) = capped.highlight.as_mut() {
        highlight.fragments_to_return = 1;
    }
    let results = executor.search(&runtime, &capped).await.unwrap();
    assert_eq!(results.documents[0].highlights.len(), 1);
}

#[tokio::test]
async fn fuzzy_like_and_range_operators_match() {
    let (manager, _dir) = manager();
    manager.add_index(&definition("books", 2)).unwrap();

    for (id, title, year) in [
        ("a", "silverberg", "1970"),
        ("b", "silverbirch", "1980"),
        ("c", "unrelated", "1990"),
    ] {
        manager
            .perform_command(
                "books",
                Command::Create {
                    id: id.into(),
                    fields: doc_fields(&[("title", title), ("year", year)]),
                },
            )
            .await
            .unwrap();
    }
    refresh(&manager, "books");

    let executor = SearchExecutor::new(Arc::clone(manager.analyzers()));
    let runtime = manager.runtime("books").unwrap();

    // one character off: silverbergh ~1 silverberg
    let fuzzy = SearchQuery::new(SearchFilter::and(vec![Condition::new(
        "title",
        "fuzzy_match",
        vec!["silverbergh".into()],
    )]));
    let results = executor.search(&runtime, &fuzzy).await.unwrap();
    assert_eq!(results.total_available, 1);

    let like = SearchQuery::new(SearchFilter::and(vec![Condition::new(
        "title",
        "like",
        vec!["silver*".into()],
    )]));
    let results = executor.search(&runtime, &like).await.unwrap();
    assert_eq!(results.total_available, 2);

    let mut range = Condition::new(
        "year",
        "numeric_range",
        vec!["1970".into(), "1990".into()],
    );
    range
        .parameters
        .insert("includeupper".into(), "true".into());
    let results = executor
        .search(&runtime, &SearchQuery::new(SearchFilter::and(vec![range])))
        .await
        .unwrap();
    assert_eq!(results.total_available, 2);
}

fn profiled_definition() -> crate::IndexDefinition {
    let mut definition = definition("catalog", 2);
    definition.fields.push(FieldDefinition::new(
        "category",
        FieldKind::ExactText,
    ));

    let mut title = Condition::new("title", "term_match", vec!["topic".into()]);
    title.missing_value = MissingValuePolicy::Default;
    let mut country = Condition::new("country", "term_match", vec![String::new()]);
    country.missing_value = MissingValuePolicy::Ignore;
    definition.profiles.push(ProfileDefinition {
        name: "regional".into(),
        query: SearchFilter::and(vec![title, country]),
    });
    definition
}

#[tokio::test]
async fn profile_with_unbound_ignored_condition_still_matches() {
    let (manager, _dir) = manager();
    manager.add_index(&profiled_definition()).unwrap();

    for (id, country) in [("a", "fi"), ("b", "se")] {
        manager
            .perform_command(
                "catalog",
                Command::Create {
                    id: id.into(),
                    fields: doc_fields(&[("title", "shared topic"), ("country", country)]),
                },
            )
            .await
            .unwrap();
    }
    refresh(&manager, "catalog");

    let executor = SearchExecutor::new(Arc::clone(manager.analyzers()));
    let runtime = manager.runtime("catalog").unwrap();

    // no country bound: the Ignore policy drops that clause
    let mut query = SearchProfileQuery::default();
    query.profile_name = Some("regional".into());
    let results = executor.search_profile(&runtime, &query).await.unwrap();
    assert_eq!(results.total_available, 2);

    // bound country narrows the same profile
    let mut query = SearchProfileQuery::default();
    query.profile_name = Some("regional".into());
    query.fields = doc_fields(&[("country", "fi")]);
    let results = executor.search_profile(&runtime, &query).await.unwrap();
    assert_eq!(results.total_available, 1);
}

#[tokio::test]
async fn profile_selector_script_picks_the_profile() {
    let mut scripts = ScriptRegistry::new();
    scripts.register_selector(
        "by_request_kind",
        Arc::new(|fields| {
            if fields.contains_key("country") {
                "regional".to_string()
            } else {
                "unknown".to_string()
            }
        }),
    );
    let (manager, _dir) = manager_with_scripts(scripts);
    manager.add_index(&profiled_definition()).unwrap();

    manager
        .perform_command(
            "catalog",
            Command::Create {
                id: "a".into(),
                fields: doc_fields(&[("title", "shared topic"), ("country", "fi")]),
            },
        )
        .await
        .unwrap();
    refresh(&manager, "catalog");

    let executor = SearchExecutor::new(Arc::clone(manager.analyzers()));
    let runtime = manager.runtime("catalog").unwrap();

    let mut query = SearchProfileQuery::default();
    query.profile_selector = Some("by_request_kind".into());
    query.fields = doc_fields(&[("country", "fi")]);
    let results = executor.search_profile(&runtime, &query).await.unwrap();
    assert_eq!(results.total_available, 1);

    // the selector resolves to a profile that does not exist
    let mut query = SearchProfileQuery::default();
    query.profile_selector = Some("by_request_kind".into());
    let err = executor.search_profile(&runtime, &query).await.unwrap_err();
    assert!(matches!(err, Error::UnknownSearchProfile(_)));

    // neither name nor selector
    let query = SearchProfileQuery::default();
    let err = executor.search_profile(&runtime, &query).await.unwrap_err();
    assert!(matches!(err, Error::UnknownSearchProfile(_)));
}

#[tokio::test]
async fn column_projection_modes() {
    let (manager, _dir) = manager();
    manager.add_index(&definition("books", 1)).unwrap();

    manager
        .perform_command(
            "books",
            Command::Create {
                id: "p1".into(),
                fields: doc_fields(&[("title", "projections"), ("year", "2001")]),
            },
        )
        .await
        .unwrap();
    refresh(&manager, "books");

    let executor = SearchExecutor::new(Arc::clone(manager.analyzers()));
    let runtime = manager.runtime("books").unwrap();
    let base = SearchFilter::and(vec![Condition::new(
        "title",
        "term_match",
        vec!["projections".into()],
    )]);

    // empty: reserved fields only
    let results = executor
        .search(&runtime, &SearchQuery::new(base.clone()))
        .await
        .unwrap();
    let doc = &results.documents[0];
    assert!(doc.fields.contains_key("id"));
    assert!(!doc.fields.contains_key("title"));

    // named columns only
    let mut query = SearchQuery::new(base.clone());
    query.columns = vec!["year".into()];
    let results = executor.search(&runtime, &query).await.unwrap();
    let doc = &results.documents[0];
    assert!(doc.fields.contains_key("year"));
    assert!(!doc.fields.contains_key("title"));

    // wildcard: every stored non-reserved field
    let mut query = SearchQuery::new(base);
    query.columns = vec!["*".into()];
    let results = executor.search(&runtime, &query).await.unwrap();
    let doc = &results.documents[0];
    assert!(doc.fields.contains_key("title"));
    assert!(doc.fields.contains_key("year"));
}
