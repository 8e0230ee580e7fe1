//! Query catalog integrity and dispatch behavior.

use casegraph::catalog::{IntentDispatcher, QueryDescriptor, QueryKind, QUERY_CATALOG};
use casegraph::ExtractedEntities;

fn descriptors(kind: QueryKind) -> Vec<&'static QueryDescriptor> {
    QUERY_CATALOG.iter().filter(|d| d.kind == kind).collect()
}

#[test]
fn test_keyword_descriptors_declare_triggers() {
    for descriptor in QUERY_CATALOG {
        match descriptor.kind {
            QueryKind::Fixed | QueryKind::Network | QueryKind::Path => assert!(
                !descriptor.triggers.is_empty(),
                "{} has no triggers",
                descriptor.name
            ),
            QueryKind::Person | QueryKind::Organization | QueryKind::Location => assert!(
                descriptor.triggers.is_empty(),
                "{} is entity-scoped but declares triggers",
                descriptor.name
            ),
        }
    }
}

#[test]
fn test_entity_scoped_descriptors_bind_a_name() {
    for descriptor in QUERY_CATALOG {
        match descriptor.kind {
            QueryKind::Fixed => assert!(
                !descriptor.cypher.contains('$'),
                "{} is fixed but parameterized",
                descriptor.name
            ),
            QueryKind::Path => assert!(
                descriptor.cypher.contains("$name1") && descriptor.cypher.contains("$name2"),
                "{} must bind both endpoints",
                descriptor.name
            ),
            _ => assert!(
                descriptor.cypher.contains("$name"),
                "{} must bind $name",
                descriptor.name
            ),
        }
    }
}

#[test]
fn test_every_descriptor_has_positive_row_cap() {
    for descriptor in QUERY_CATALOG {
        assert!(descriptor.row_cap > 0, "{} has a zero cap", descriptor.name);
    }
}

#[test]
fn test_catalog_covers_all_kinds() {
    assert!(!descriptors(QueryKind::Fixed).is_empty());
    assert_eq!(descriptors(QueryKind::Network).len(), 3);
    assert_eq!(descriptors(QueryKind::Path).len(), 1);
    assert_eq!(descriptors(QueryKind::Person).len(), 4);
    assert_eq!(descriptors(QueryKind::Organization).len(), 1);
    assert_eq!(descriptors(QueryKind::Location).len(), 2);
}

#[test]
fn test_triggers_and_entities_dispatch_together() {
    let entities = ExtractedEntities {
        locations: vec!["Navy Pier".to_string()],
        organizations: vec!["West Side Crew".to_string()],
        ..Default::default()
    };
    let resolved = vec![("David Rodriguez".to_string(), "David Rodriguez".to_string())];

    let planned = IntentDispatcher::default().select(
        "Who are the most influential repeat offenders around here?",
        &entities,
        &resolved,
    );
    let keys: Vec<&str> = planned.iter().map(|p| p.context_key.as_str()).collect();

    // Keyword intents...
    assert!(keys.contains(&"influential_criminals"));
    assert!(keys.contains(&"repeat_offenders"));
    // ...and entity-scoped expansions, all in one request.
    assert!(keys.contains(&"loc_Navy Pier_crimes"));
    assert!(keys.contains(&"org_West Side Crew_crimes"));
    assert!(keys.contains(&"David Rodriguez_info"));
}

#[test]
fn test_fixed_intents_do_not_duplicate_per_entity() {
    let entities = ExtractedEntities {
        organizations: vec![
            "West Side Crew".to_string(),
            "South Side Syndicate".to_string(),
        ],
        ..Default::default()
    };
    let planned = IntentDispatcher::default().select(
        "which organizations run the narcotics trade?",
        &entities,
        &[],
    );

    let overview_count = planned
        .iter()
        .filter(|p| p.context_key == "all_organizations")
        .count();
    assert_eq!(overview_count, 1);

    let scoped: Vec<&str> = planned
        .iter()
        .map(|p| p.context_key.as_str())
        .filter(|k| k.starts_with("org_"))
        .collect();
    assert_eq!(
        scoped,
        vec!["org_West Side Crew_crimes", "org_South Side Syndicate_crimes"]
    );
}
