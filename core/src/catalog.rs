//! Query catalog and intent dispatch.
//!
//! The catalog is a declarative table of Cypher templates evaluated in
//! registration order with OR-semantics: every descriptor whose triggers (or
//! required entity kind) match the question is selected, never just the best
//! one. New intents are added by appending a descriptor, not by touching
//! dispatch logic.
//!
//! Several templates keep the historical heuristics of this system under
//! their historical names: the influence ranking is a weighted score
//! (0.5 x crime count + 0.5 x distinct acquaintances), not eigenvector
//! PageRank; the bridge and ring queries approximate betweenness and
//! community detection with one-hop membership rules.

use serde_json::{json, Value};
use tracing::warn;

use casegraph_databases::GraphStore;

use crate::entities::ExtractedEntities;

/// How a descriptor binds to the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Keyword-triggered, no entity bindings.
    Fixed,
    /// Keyword-triggered, bound to the first extracted person.
    Network,
    /// Keyword-triggered, bound to the first two extracted persons.
    Path,
    /// Selected whenever a person entity is present.
    Person,
    /// Selected whenever an organization entity is present.
    Organization,
    /// Selected whenever a location entity is present.
    Location,
}

/// One entry in the query catalog.
#[derive(Debug, Clone, Copy)]
pub struct QueryDescriptor {
    /// Human-readable label, recorded in the per-request audit trail.
    pub name: &'static str,
    /// Bundle key; entity-scoped descriptors treat this as a suffix.
    pub context_key: &'static str,
    /// Substring triggers matched against the lower-cased question.
    pub triggers: &'static [&'static str],
    pub cypher: &'static str,
    pub kind: QueryKind,
    pub row_cap: usize,
}

/// A selected query, fully bound and ready to execute.
#[derive(Debug, Clone)]
pub struct PlannedQuery {
    pub name: String,
    pub context_key: String,
    pub cypher: String,
    pub params: Vec<(&'static str, Value)>,
    pub row_cap: usize,
}

const ORGANIZATION_TRIGGERS: &[&str] = &["organization", "gang", "crew", "syndicate", "cartel"];
const EVIDENCE_TRIGGERS: &[&str] = &["evidence", "proof", "forensic", "clue"];
const INVESTIGATOR_TRIGGERS: &[&str] = &["investigator", "detective", "officer", "assigned"];
const WEAPON_TRIGGERS: &[&str] = &["weapon", "gun", "firearm", "armed"];
const VEHICLE_TRIGGERS: &[&str] = &["vehicle", "car", "truck", "van", "getaway"];
const NETWORK_TRIGGERS: &[&str] = &[
    "within",
    "degrees of",
    "degrees from",
    "connections of",
    "network of",
];

/// The full catalog, in registration order. Baseline statistics are not
/// listed here; the orchestrator runs them unconditionally before dispatch.
pub const QUERY_CATALOG: &[QueryDescriptor] = &[
    QueryDescriptor {
        name: "All Organizations",
        context_key: "all_organizations",
        triggers: ORGANIZATION_TRIGGERS,
        cypher: "MATCH (o:Organization)
RETURN o.name AS name, o.type AS type, o.territory AS territory, o.founded AS founded
ORDER BY o.name",
        kind: QueryKind::Fixed,
        row_cap: 25,
    },
    QueryDescriptor {
        name: "Organization Members",
        context_key: "organization_members",
        triggers: ORGANIZATION_TRIGGERS,
        cypher: "MATCH (p:Person)-[:MEMBER_OF]->(o:Organization)
RETURN o.name AS organization, p.name AS member, p.age AS age
ORDER BY o.name, p.name
LIMIT 50",
        kind: QueryKind::Fixed,
        row_cap: 50,
    },
    QueryDescriptor {
        name: "All Evidence",
        context_key: "all_evidence",
        triggers: EVIDENCE_TRIGGERS,
        cypher: "MATCH (e:Evidence)
RETURN e.id AS id, e.type AS type, e.description AS description,
       e.significance AS significance, e.verified AS verified
ORDER BY
    CASE e.significance
        WHEN 'critical' THEN 1
        WHEN 'high' THEN 2
        WHEN 'medium' THEN 3
        ELSE 4
    END,
    e.id
LIMIT 30",
        kind: QueryKind::Fixed,
        row_cap: 30,
    },
    QueryDescriptor {
        name: "Evidence-Suspect Links",
        context_key: "evidence_links",
        triggers: EVIDENCE_TRIGGERS,
        cypher: "MATCH (e:Evidence)-[:LINKS_TO]->(p:Person)
RETURN e.id AS evidence_id, e.description AS evidence,
       e.significance AS significance, p.name AS suspect
ORDER BY e.significance, p.name
LIMIT 30",
        kind: QueryKind::Fixed,
        row_cap: 30,
    },
    QueryDescriptor {
        name: "Evidence Chain Analysis",
        context_key: "evidence_chains",
        triggers: &["evidence chain", "evidence link", "chain of evidence"],
        cypher: "MATCH (c:Crime)-[:HAS_EVIDENCE]->(e:Evidence)-[:LINKS_TO]->(p:Person)
RETURN c.type AS crime_type, c.id AS crime_id, e.description AS evidence,
       e.significance AS significance, p.name AS suspect
ORDER BY e.significance
LIMIT 20",
        kind: QueryKind::Fixed,
        row_cap: 20,
    },
    QueryDescriptor {
        name: "All Investigators",
        context_key: "all_investigators",
        triggers: INVESTIGATOR_TRIGGERS,
        cypher: "MATCH (i:Investigator)
RETURN i.id AS id, i.name AS name, i.badge_number AS badge,
       i.department AS department, i.specialization AS specialization,
       i.cases_solved AS solved, i.active_cases AS active
ORDER BY i.cases_solved DESC
LIMIT 20",
        kind: QueryKind::Fixed,
        row_cap: 20,
    },
    QueryDescriptor {
        name: "Case Assignments",
        context_key: "case_assignments",
        triggers: INVESTIGATOR_TRIGGERS,
        cypher: "MATCH (c:Crime)-[:INVESTIGATED_BY]->(i:Investigator)
RETURN i.name AS investigator, c.id AS crime_id, c.type AS crime_type, c.status AS status
ORDER BY i.name, c.date DESC
LIMIT 40",
        kind: QueryKind::Fixed,
        row_cap: 40,
    },
    QueryDescriptor {
        name: "Modus Operandi Patterns",
        context_key: "mo_patterns",
        triggers: &["modus operandi", "m.o.", "signature", "method", "pattern"],
        cypher: "MATCH (m:ModusOperandi)
OPTIONAL MATCH (c:Crime)-[:MATCHES_MO]->(m)
RETURN m.id AS id, m.description AS description, m.signature AS signature,
       m.crime_type AS crime_type, count(c) AS matched_crimes
ORDER BY matched_crimes DESC
LIMIT 15",
        kind: QueryKind::Fixed,
        row_cap: 15,
    },
    QueryDescriptor {
        name: "All Weapons",
        context_key: "all_weapons",
        triggers: WEAPON_TRIGGERS,
        cypher: "MATCH (w:Weapon)
RETURN w.id AS id, w.type AS type, w.make AS make, w.model AS model,
       w.recovered AS recovered
ORDER BY w.type
LIMIT 30",
        kind: QueryKind::Fixed,
        row_cap: 30,
    },
    QueryDescriptor {
        name: "Weapon Ownership",
        context_key: "weapon_ownership",
        triggers: WEAPON_TRIGGERS,
        cypher: "MATCH (p:Person)-[:OWNS]->(w:Weapon)
OPTIONAL MATCH (p)-[:MEMBER_OF]->(o:Organization)
RETURN p.name AS owner, p.age AS age, o.name AS organization,
       w.type AS weapon_type, w.make AS make, w.model AS model
ORDER BY o.name, p.name
LIMIT 30",
        kind: QueryKind::Fixed,
        row_cap: 30,
    },
    QueryDescriptor {
        name: "Weapons Used in Crimes",
        context_key: "weapon_usage",
        triggers: WEAPON_TRIGGERS,
        cypher: "MATCH (c:Crime)-[:USED_WEAPON]->(w:Weapon)
RETURN c.type AS crime_type, c.id AS crime_id, c.severity AS severity,
       w.type AS weapon_type, w.make AS make, w.model AS model
ORDER BY c.severity, c.date DESC
LIMIT 30",
        kind: QueryKind::Fixed,
        row_cap: 30,
    },
    QueryDescriptor {
        name: "All Vehicles",
        context_key: "all_vehicles",
        triggers: VEHICLE_TRIGGERS,
        cypher: "MATCH (v:Vehicle)
RETURN v.id AS id, v.make AS make, v.model AS model, v.year AS year,
       v.color AS color, v.license_plate AS plate, v.reported_stolen AS stolen
ORDER BY v.reported_stolen DESC, v.make
LIMIT 30",
        kind: QueryKind::Fixed,
        row_cap: 30,
    },
    QueryDescriptor {
        name: "Vehicle Ownership",
        context_key: "vehicle_ownership",
        triggers: VEHICLE_TRIGGERS,
        cypher: "MATCH (p:Person)-[:OWNS]->(v:Vehicle)
RETURN p.name AS owner, v.make AS make, v.model AS model, v.license_plate AS plate
ORDER BY p.name
LIMIT 30",
        kind: QueryKind::Fixed,
        row_cap: 30,
    },
    QueryDescriptor {
        name: "Vehicles in Crimes",
        context_key: "vehicle_usage",
        triggers: VEHICLE_TRIGGERS,
        cypher: "MATCH (c:Crime)-[:INVOLVED_VEHICLE]->(v:Vehicle)
RETURN c.type AS crime_type, c.id AS crime_id,
       v.make AS make, v.model AS model, v.license_plate AS plate
ORDER BY c.date DESC
LIMIT 30",
        kind: QueryKind::Fixed,
        row_cap: 30,
    },
    QueryDescriptor {
        name: "Crime Hotspots",
        context_key: "hotspots",
        triggers: &["hotspot", "most crime", "dangerous area", "crime-ridden"],
        cypher: "MATCH (c:Crime)-[:OCCURRED_AT]->(l:Location)
WITH l, count(c) AS crimes
RETURN l.name AS location, l.district AS district, crimes
ORDER BY crimes DESC
LIMIT 10",
        kind: QueryKind::Fixed,
        row_cap: 10,
    },
    QueryDescriptor {
        name: "Repeat Offenders",
        context_key: "repeat_offenders",
        triggers: &["repeat", "offender", "recidiv"],
        cypher: "MATCH (p:Person)-[:PARTY_TO]->(c:Crime)
WITH p, count(c) AS crimes
WHERE crimes >= 2
OPTIONAL MATCH (p)-[:MEMBER_OF]->(o:Organization)
RETURN p.name AS name, p.age AS age, crimes, o.name AS organization
ORDER BY crimes DESC
LIMIT 15",
        kind: QueryKind::Fixed,
        row_cap: 15,
    },
    QueryDescriptor {
        name: "Crime Collaboration Patterns",
        context_key: "collaborations",
        triggers: &["together", "same crime", "collaborated", "co-offender", "shared crime"],
        cypher: "MATCH (p1:Person)-[:PARTY_TO]->(c:Crime)<-[:PARTY_TO]-(p2:Person)
WHERE p1.name < p2.name
WITH p1, p2, count(DISTINCT c) AS shared_crimes, collect(DISTINCT c.type) AS crime_types
WHERE shared_crimes >= 1
OPTIONAL MATCH (p1)-[:MEMBER_OF]->(o1:Organization)
OPTIONAL MATCH (p2)-[:MEMBER_OF]->(o2:Organization)
RETURN p1.name AS person1, p2.name AS person2, shared_crimes, crime_types,
       o1.name AS organization1, o2.name AS organization2,
       CASE
           WHEN o1.name = o2.name OR (o1 IS NULL AND o2 IS NULL) THEN 'same'
           ELSE 'different'
       END AS membership_status
ORDER BY shared_crimes DESC
LIMIT 20",
        kind: QueryKind::Fixed,
        row_cap: 20,
    },
    QueryDescriptor {
        name: "Cross-Organization Collaboration",
        context_key: "cross_org_collaboration",
        triggers: &[
            "different gang",
            "different organization",
            "not in same gang",
            "aren't in the same gang",
            "cross-gang",
        ],
        cypher: "MATCH (p1:Person)-[:PARTY_TO]->(c:Crime)<-[:PARTY_TO]-(p2:Person)
WHERE p1.name < p2.name
MATCH (p1)-[:MEMBER_OF]->(o1:Organization)
MATCH (p2)-[:MEMBER_OF]->(o2:Organization)
WHERE o1.name <> o2.name
WITH p1, p2, o1, o2, count(DISTINCT c) AS shared_crimes, collect(DISTINCT c.type) AS crime_types
RETURN p1.name AS person1, p2.name AS person2,
       o1.name AS organization1, o2.name AS organization2,
       shared_crimes, crime_types
ORDER BY shared_crimes DESC
LIMIT 15",
        kind: QueryKind::Fixed,
        row_cap: 15,
    },
    // Weighted heuristic kept under its historical name; not eigenvector
    // PageRank.
    QueryDescriptor {
        name: "Influence Ranking",
        context_key: "influential_criminals",
        triggers: &["influential", "most important", "key criminal", "pagerank", "influence"],
        cypher: "MATCH (p:Person)-[:PARTY_TO]->(c:Crime)
WITH p, count(c) AS crimes
OPTIONAL MATCH (p)-[:KNOWS]-(connected:Person)
WITH p, crimes, count(DISTINCT connected) AS connections
OPTIONAL MATCH (p)-[:MEMBER_OF]->(o:Organization)
RETURN p.name AS name, p.age AS age, crimes, connections, o.name AS organization,
       (crimes * 0.5 + connections * 0.5) AS influence_score
ORDER BY influence_score DESC
LIMIT 15",
        kind: QueryKind::Fixed,
        row_cap: 15,
    },
    // Betweenness approximation: acquaintances spanning several
    // organizations, not true path counting.
    QueryDescriptor {
        name: "Organization Bridges",
        context_key: "org_bridges",
        triggers: &["bridge", "multiple gang", "multiple organization", "connects", "broker"],
        cypher: "MATCH (p:Person)-[:KNOWS]-(other:Person)-[:MEMBER_OF]->(o:Organization)
WITH p, collect(DISTINCT o.name) AS connected_organizations
WHERE size(connected_organizations) >= 2
OPTIONAL MATCH (p)-[:MEMBER_OF]->(own:Organization)
OPTIONAL MATCH (p)-[:PARTY_TO]->(c:Crime)
RETURN p.name AS name, p.age AS age, own.name AS own_organization,
       connected_organizations, size(connected_organizations) AS organization_links,
       count(c) AS crimes
ORDER BY organization_links DESC, crimes DESC
LIMIT 15",
        kind: QueryKind::Fixed,
        row_cap: 15,
    },
    QueryDescriptor {
        name: "Degree Centrality Hubs",
        context_key: "network_hubs",
        triggers: &["most connected", "hub", "degree central"],
        cypher: "MATCH (p:Person)-[r]-(connected)
WITH p, count(DISTINCT connected) AS total_connections
OPTIONAL MATCH (p)-[:MEMBER_OF]->(o:Organization)
OPTIONAL MATCH (p)-[:PARTY_TO]->(c:Crime)
RETURN p.name AS name, p.age AS age, total_connections,
       count(DISTINCT c) AS crimes, o.name AS organization
ORDER BY total_connections DESC
LIMIT 15",
        kind: QueryKind::Fixed,
        row_cap: 15,
    },
    // Community heuristic: unaffiliated pairs sharing two or more crimes.
    QueryDescriptor {
        name: "Hidden Crime Rings",
        context_key: "hidden_rings",
        triggers: &["hidden", "crime ring", "working together", "community", "cluster"],
        cypher: "MATCH (p1:Person)-[:PARTY_TO]->(c:Crime)<-[:PARTY_TO]-(p2:Person)
WHERE p1.name < p2.name
  AND NOT EXISTS((p1)-[:MEMBER_OF]->(:Organization))
  AND NOT EXISTS((p2)-[:MEMBER_OF]->(:Organization))
WITH p1, p2, count(c) AS shared_crimes, collect(c.type) AS crime_types
WHERE shared_crimes >= 2
RETURN p1.name AS person1, p2.name AS person2, p1.age AS age1, p2.age AS age2,
       shared_crimes, crime_types
ORDER BY shared_crimes DESC
LIMIT 15",
        kind: QueryKind::Fixed,
        row_cap: 15,
    },
    QueryDescriptor {
        name: "Triangle Patterns",
        context_key: "triangles",
        triggers: &["triangle", "all know each other", "mutual", "clique"],
        cypher: "MATCH (p1:Person)-[:KNOWS]-(p2:Person)-[:KNOWS]-(p3:Person)-[:KNOWS]-(p1)
WHERE p1.name < p2.name AND p2.name < p3.name
RETURN p1.name AS person1, p2.name AS person2, p3.name AS person3
LIMIT 20",
        kind: QueryKind::Fixed,
        row_cap: 20,
    },
    QueryDescriptor {
        name: "1-Degree Connections",
        context_key: "degree_1_connections",
        triggers: NETWORK_TRIGGERS,
        cypher: "MATCH (p:Person {name: $name})-[:KNOWS]-(connected:Person)
RETURN DISTINCT connected.name AS name, connected.age AS age
LIMIT 30",
        kind: QueryKind::Network,
        row_cap: 30,
    },
    QueryDescriptor {
        name: "2-Degree Connections",
        context_key: "degree_2_connections",
        triggers: NETWORK_TRIGGERS,
        cypher: "MATCH (p:Person {name: $name})-[:KNOWS*2]-(connected:Person)
WHERE connected.name <> $name
RETURN DISTINCT connected.name AS name, connected.age AS age
LIMIT 50",
        kind: QueryKind::Network,
        row_cap: 50,
    },
    QueryDescriptor {
        name: "Network Organization Affiliations",
        context_key: "network_organizations",
        triggers: NETWORK_TRIGGERS,
        cypher: "MATCH (p:Person {name: $name})-[:KNOWS*1..2]-(connected:Person)
OPTIONAL MATCH (connected)-[:MEMBER_OF]->(o:Organization)
RETURN DISTINCT connected.name AS name, o.name AS organization
LIMIT 50",
        kind: QueryKind::Network,
        row_cap: 50,
    },
    QueryDescriptor {
        name: "Shortest Path",
        context_key: "connection_path",
        triggers: &["path between", "connected to", "link between", "connection between"],
        cypher: "MATCH path = shortestPath(
    (p1:Person {name: $name1})-[:KNOWS*..6]-(p2:Person {name: $name2})
)
RETURN [node IN nodes(path) | node.name] AS path_nodes,
       length(path) AS path_length,
       [rel IN relationships(path) | type(rel)] AS relationship_types
LIMIT 1",
        kind: QueryKind::Path,
        row_cap: 1,
    },
    QueryDescriptor {
        name: "Person Profile",
        context_key: "info",
        triggers: &[],
        cypher: "MATCH (p:Person {name: $name})
RETURN p.name AS name, p.age AS age, p.occupation AS occupation",
        kind: QueryKind::Person,
        row_cap: 5,
    },
    QueryDescriptor {
        name: "Person Crimes",
        context_key: "crimes",
        triggers: &[],
        cypher: "MATCH (p:Person {name: $name})-[:PARTY_TO]->(c:Crime)
RETURN c.type AS crime_type, c.date AS date, c.severity AS severity
ORDER BY c.date DESC
LIMIT 20",
        kind: QueryKind::Person,
        row_cap: 20,
    },
    QueryDescriptor {
        name: "Person Connections",
        context_key: "connections",
        triggers: &[],
        cypher: "MATCH (p:Person {name: $name})-[:KNOWS]-(other:Person)
OPTIONAL MATCH (other)-[:MEMBER_OF]->(o:Organization)
RETURN DISTINCT other.name AS name, other.age AS age, o.name AS organization
LIMIT 30",
        kind: QueryKind::Person,
        row_cap: 30,
    },
    QueryDescriptor {
        name: "Person Organizations",
        context_key: "organizations",
        triggers: &[],
        cypher: "MATCH (p:Person {name: $name})-[:MEMBER_OF]->(o:Organization)
RETURN o.name AS organization
LIMIT 5",
        kind: QueryKind::Person,
        row_cap: 5,
    },
    QueryDescriptor {
        name: "Organization Crimes",
        context_key: "crimes",
        triggers: &[],
        cypher: "MATCH (p:Person)-[:MEMBER_OF]->(o:Organization {name: $name})
MATCH (p)-[:PARTY_TO]->(c:Crime)
RETURN p.name AS member, c.type AS crime_type, c.date AS date, c.severity AS severity
ORDER BY c.date DESC
LIMIT 30",
        kind: QueryKind::Organization,
        row_cap: 30,
    },
    QueryDescriptor {
        name: "Location Crimes",
        context_key: "crimes",
        triggers: &[],
        cypher: "MATCH (c:Crime)-[:OCCURRED_AT]->(l:Location {name: $name})
RETURN c.type AS crime_type, c.subtype AS subtype, c.date AS date, c.severity AS severity
ORDER BY c.date DESC
LIMIT 30",
        kind: QueryKind::Location,
        row_cap: 30,
    },
    QueryDescriptor {
        name: "Location Suspects",
        context_key: "suspects",
        triggers: &[],
        cypher: "MATCH (p:Person)-[:PARTY_TO]->(c:Crime)-[:OCCURRED_AT]->(l:Location {name: $name})
WITH p, count(c) AS crimes
RETURN p.name AS name, crimes
ORDER BY crimes DESC
LIMIT 20",
        kind: QueryKind::Location,
        row_cap: 20,
    },
];

/// Cypher executed by the always-on baseline statistics step.
pub const DATABASE_STATS_QUERY: &str = "MATCH (c:Crime) WITH count(c) AS total_crimes
MATCH (p:Person) WITH total_crimes, count(p) AS total_persons
MATCH (o:Organization) WITH total_crimes, total_persons, count(o) AS total_organizations
MATCH (l:Location)
RETURN total_crimes, total_persons, total_organizations, count(l) AS total_locations";

/// Probe for resolving an extracted person surface form to the exact stored
/// name. The surface text is regex-escaped and bound as a parameter; only
/// the regex semantics themselves require the `=~` match.
const PERSON_RESOLVE_QUERY: &str =
    "MATCH (p:Person) WHERE p.name =~ $pattern RETURN p.name AS name LIMIT 1";

/// Resolve a heuristic person-name candidate against the graph,
/// case-insensitively. Returns the stored name, or `None` when the person is
/// unknown or the probe fails (fail-open: the candidate is simply skipped).
pub async fn resolve_person_name(store: &dyn GraphStore, surface: &str) -> Option<String> {
    let pattern = format!("(?i).*{}.*", regex::escape(surface));
    match store.run(PERSON_RESOLVE_QUERY, &[("pattern", json!(pattern))]).await {
        Ok(rows) => rows
            .first()
            .and_then(|row| row.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string),
        Err(e) => {
            warn!("person resolution failed for '{surface}': {e}");
            None
        }
    }
}

/// Rule-driven dispatcher over [`QUERY_CATALOG`].
pub struct IntentDispatcher {
    /// Maximum entities expanded per entity-scoped category.
    entity_cap: usize,
}

impl Default for IntentDispatcher {
    fn default() -> Self {
        Self { entity_cap: 3 }
    }
}

impl IntentDispatcher {
    pub fn new(entity_cap: usize) -> Self {
        Self { entity_cap }
    }

    /// Select and bind every catalog query that applies to this question.
    ///
    /// `resolved_persons` holds `(surface, stored_name)` pairs for person
    /// candidates that matched the graph; surface forms key the bundle, the
    /// stored names bind the queries. When nothing matches at all, the
    /// organizations overview is planned as a generic entry point.
    pub fn select(
        &self,
        question: &str,
        entities: &ExtractedEntities,
        resolved_persons: &[(String, String)],
    ) -> Vec<PlannedQuery> {
        let question = question.to_lowercase();
        let mut planned = Vec::new();

        for descriptor in QUERY_CATALOG {
            let triggered = descriptor
                .triggers
                .iter()
                .any(|trigger| question.contains(trigger));

            match descriptor.kind {
                QueryKind::Fixed => {
                    if triggered {
                        planned.push(plan_fixed(descriptor));
                    }
                }
                QueryKind::Network => {
                    if triggered {
                        if let Some((_, stored)) = resolved_persons.first() {
                            planned.push(PlannedQuery {
                                name: descriptor.name.to_string(),
                                context_key: descriptor.context_key.to_string(),
                                cypher: descriptor.cypher.to_string(),
                                params: vec![("name", json!(stored))],
                                row_cap: descriptor.row_cap,
                            });
                        }
                    }
                }
                QueryKind::Path => {
                    if triggered && resolved_persons.len() >= 2 {
                        let (_, first) = &resolved_persons[0];
                        let (_, second) = &resolved_persons[1];
                        planned.push(PlannedQuery {
                            name: format!("{} - {first} to {second}", descriptor.name),
                            context_key: descriptor.context_key.to_string(),
                            cypher: descriptor.cypher.to_string(),
                            params: vec![("name1", json!(first)), ("name2", json!(second))],
                            row_cap: descriptor.row_cap,
                        });
                    }
                }
                QueryKind::Person => {
                    for (surface, stored) in resolved_persons.iter().take(self.entity_cap) {
                        planned.push(PlannedQuery {
                            name: format!("{stored} - {}", descriptor.name),
                            context_key: format!("{surface}_{}", descriptor.context_key),
                            cypher: descriptor.cypher.to_string(),
                            params: vec![("name", json!(stored))],
                            row_cap: descriptor.row_cap,
                        });
                    }
                }
                QueryKind::Organization => {
                    for name in entities.organizations.iter().take(self.entity_cap) {
                        planned.push(PlannedQuery {
                            name: format!("{name} - {}", descriptor.name),
                            context_key: format!("org_{name}_{}", descriptor.context_key),
                            cypher: descriptor.cypher.to_string(),
                            params: vec![("name", json!(name))],
                            row_cap: descriptor.row_cap,
                        });
                    }
                }
                QueryKind::Location => {
                    for name in entities.locations.iter().take(self.entity_cap) {
                        planned.push(PlannedQuery {
                            name: format!("{name} - {}", descriptor.name),
                            context_key: format!("loc_{name}_{}", descriptor.context_key),
                            cypher: descriptor.cypher.to_string(),
                            params: vec![("name", json!(name))],
                            row_cap: descriptor.row_cap,
                        });
                    }
                }
            }
        }

        // Nothing matched: fall back to the organizations overview so the
        // bundle always has a useful entry point beyond bare statistics.
        if planned.is_empty() {
            for descriptor in QUERY_CATALOG
                .iter()
                .filter(|d| d.context_key == "all_organizations" || d.context_key == "organization_members")
            {
                planned.push(plan_fixed(descriptor));
            }
        }

        planned
    }
}

fn plan_fixed(descriptor: &QueryDescriptor) -> PlannedQuery {
    PlannedQuery {
        name: descriptor.name.to_string(),
        context_key: descriptor.context_key.to_string(),
        cypher: descriptor.cypher.to_string(),
        params: Vec::new(),
        row_cap: descriptor.row_cap,
    }
}
