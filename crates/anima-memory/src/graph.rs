//! Knowledge-graph export.
//!
//! A read-only view of the semantic store for visualisation layers:
//!
//! ```text
//! { nodes[], edges[], clusters[], stats, generated_at }
//! ```
//!
//! Building a graph never touches comprehension, use counts or timestamps.
//! The JSON Schema of [`KnowledgeGraph`] is the contract towards renderers
//! (see [`knowledge_graph_schema`]).

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use anima_types::{ConceptSource, RelationKind};
use chrono::{DateTime, NaiveDate, Utc};
use schemars::JsonSchema;
use schemars::schema::RootSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::index::normalize_key;
use crate::semantic::{SemanticConcept, SemanticStore};

/// Edges at or above this strength take part in strong-cluster detection.
pub const STRONG_EDGE_THRESHOLD: f32 = 0.6;
/// Smallest connected component reported as a strong cluster.
pub const MIN_STRONG_CLUSTER_SIZE: usize = 3;

const MIN_NODE_SIZE: f32 = 8.0;
const MAX_NODE_SIZE: f32 = 40.0;

/// One concept in a [`KnowledgeGraph`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GraphNode {
    pub id: Uuid,
    pub label: String,
    pub source: ConceptSource,
    pub comprehension: f32,
    pub interest_level: f32,
    pub use_count: u32,
    /// Degree in the deduplicated edge set.
    pub connections: usize,
    /// Suggested render radius.
    pub size: f32,
    /// `#rrggbb`, one colour per source.
    pub color: String,
}

/// One relation in a [`KnowledgeGraph`], endpoints addressed by label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub kind: RelationKind,
    pub strength: f32,
}

/// How a [`GraphCluster`] was formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClusterKind {
    /// All concepts sharing a source.
    Source,
    /// A connected component over strong edges.
    Strong,
}

/// A group of related concepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GraphCluster {
    pub id: String,
    pub kind: ClusterKind,
    pub label: String,
    /// Member labels.
    pub members: Vec<String>,
    pub average_comprehension: f32,
}

/// Summary numbers for a [`KnowledgeGraph`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub average_degree: f32,
    /// Edges over the maximum possible for this node count.
    pub density: f32,
    /// Label of the highest-degree node.
    pub hub: Option<String>,
    pub hub_degree: usize,
    /// Nodes with no edges.
    pub isolated_count: usize,
    pub cluster_count: usize,
}

/// Render-ready view of the semantic store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KnowledgeGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub clusters: Vec<GraphCluster>,
    pub stats: GraphStats,
    pub generated_at: DateTime<Utc>,
}

/// Concepts learned on one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimelineEntry {
    pub date: NaiveDate,
    /// Labels in learning order.
    pub concepts: Vec<String>,
}

/// JSON Schema for [`KnowledgeGraph`].
pub fn knowledge_graph_schema() -> RootSchema {
    schemars::schema_for!(KnowledgeGraph)
}

/// Node colour for concepts learned from `source`.
pub fn source_color(source: ConceptSource) -> &'static str {
    match source {
        ConceptSource::ExternalReference => "#4f8ef7",
        ConceptSource::DirectExperience => "#f7a34f",
        ConceptSource::Dialogue => "#5cc98b",
        ConceptSource::ReadingMaterial => "#b07cf2",
        ConceptSource::Initial => "#9aa3ad",
    }
}

/// Render radius from comprehension, use and connectivity, within
/// `[MIN_NODE_SIZE, MAX_NODE_SIZE]`.
pub fn node_size(comprehension: f32, use_count: u32, connections: usize) -> f32 {
    let size = MIN_NODE_SIZE
        + 12.0 * comprehension
        + 4.0 * (1.0 + use_count as f32).ln()
        + 1.5 * connections as f32;
    size.clamp(MIN_NODE_SIZE, MAX_NODE_SIZE)
}

// ─────────────────────────────────────────────────────────────────────────────
// Building
// ─────────────────────────────────────────────────────────────────────────────

/// Edges between `concepts`, one per unordered pair; the stronger direction
/// wins, the first-seen on ties.
fn collect_edges(concepts: &[&SemanticConcept]) -> Vec<GraphEdge> {
    let labels: HashMap<String, &str> = concepts
        .iter()
        .map(|c| (normalize_key(&c.concept), c.concept.as_str()))
        .collect();
    let mut slots: HashMap<(String, String), usize> = HashMap::new();
    let mut edges: Vec<GraphEdge> = Vec::new();

    for concept in concepts {
        let from = normalize_key(&concept.concept);
        for relation in &concept.relations {
            let to = normalize_key(&relation.concept);
            let Some(target) = labels.get(&to) else {
                continue;
            };
            if to == from {
                continue;
            }
            let pair = if from < to { (from.clone(), to) } else { (to, from.clone()) };
            let edge = GraphEdge {
                source: concept.concept.clone(),
                target: (*target).to_string(),
                kind: relation.kind,
                strength: relation.strength,
            };
            match slots.get(&pair).copied() {
                Some(slot) if edges[slot].strength >= edge.strength => {}
                Some(slot) => edges[slot] = edge,
                None => {
                    slots.insert(pair, edges.len());
                    edges.push(edge);
                }
            }
        }
    }
    edges
}

fn degrees(edges: &[GraphEdge]) -> HashMap<String, usize> {
    let mut degree = HashMap::new();
    for edge in edges {
        *degree.entry(normalize_key(&edge.source)).or_insert(0) += 1;
        *degree.entry(normalize_key(&edge.target)).or_insert(0) += 1;
    }
    degree
}

fn average(values: impl Iterator<Item = f32>) -> f32 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { 0.0 } else { sum / n as f32 }
}

fn source_clusters(concepts: &[&SemanticConcept]) -> Vec<GraphCluster> {
    let mut groups: BTreeMap<ConceptSource, Vec<&SemanticConcept>> = BTreeMap::new();
    for &concept in concepts {
        groups.entry(concept.source).or_default().push(concept);
    }
    groups
        .into_iter()
        .filter(|(_, members)| members.len() >= 2)
        .map(|(source, members)| GraphCluster {
            id: format!("source:{}", source.as_str()),
            kind: ClusterKind::Source,
            label: source.as_str().to_string(),
            average_comprehension: average(members.iter().map(|c| c.comprehension)),
            members: members.into_iter().map(|c| c.concept.clone()).collect(),
        })
        .collect()
}

/// Connected components over edges with strength ≥ [`STRONG_EDGE_THRESHOLD`],
/// keeping those with at least [`MIN_STRONG_CLUSTER_SIZE`] members.
fn strong_clusters(concepts: &[&SemanticConcept], edges: &[GraphEdge]) -> Vec<GraphCluster> {
    let index: HashMap<String, usize> = concepts
        .iter()
        .enumerate()
        .map(|(i, c)| (normalize_key(&c.concept), i))
        .collect();
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); concepts.len()];
    for edge in edges.iter().filter(|e| e.strength >= STRONG_EDGE_THRESHOLD) {
        if let (Some(&a), Some(&b)) = (index.get(&normalize_key(&edge.source)), index.get(&normalize_key(&edge.target))) {
            adjacency[a].push(b);
            adjacency[b].push(a);
        }
    }

    let mut seen = vec![false; concepts.len()];
    let mut clusters = Vec::new();
    for start in 0..concepts.len() {
        if seen[start] {
            continue;
        }
        seen[start] = true;
        let mut component = Vec::new();
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            component.push(node);
            for &next in &adjacency[node] {
                if !seen[next] {
                    seen[next] = true;
                    queue.push_back(next);
                }
            }
        }
        if component.len() < MIN_STRONG_CLUSTER_SIZE {
            continue;
        }
        component.sort_unstable();
        let anchor = concepts[component[0]].concept.clone();
        clusters.push(GraphCluster {
            id: format!("strong:{}", clusters.len()),
            kind: ClusterKind::Strong,
            label: anchor,
            average_comprehension: average(component.iter().map(|&i| concepts[i].comprehension)),
            members: component.iter().map(|&i| concepts[i].concept.clone()).collect(),
        });
    }
    clusters
}

fn build_graph(concepts: &[&SemanticConcept], generated_at: DateTime<Utc>) -> KnowledgeGraph {
    let edges = collect_edges(concepts);
    let degree = degrees(&edges);

    let nodes: Vec<GraphNode> = concepts
        .iter()
        .map(|c| {
            let connections = degree.get(&normalize_key(&c.concept)).copied().unwrap_or(0);
            GraphNode {
                id: c.id,
                label: c.concept.clone(),
                source: c.source,
                comprehension: c.comprehension,
                interest_level: c.interest_level,
                use_count: c.use_count,
                connections,
                size: node_size(c.comprehension, c.use_count, connections),
                color: source_color(c.source).to_string(),
            }
        })
        .collect();

    let mut clusters = source_clusters(concepts);
    clusters.extend(strong_clusters(concepts, &edges));

    let n = nodes.len();
    let e = edges.len();
    // First node wins ties for hub.
    let hub = nodes
        .iter()
        .filter(|node| node.connections > 0)
        .fold(None::<&GraphNode>, |best, node| match best {
            Some(b) if b.connections >= node.connections => Some(b),
            _ => Some(node),
        });
    let stats = GraphStats {
        node_count: n,
        edge_count: e,
        average_degree: if n == 0 { 0.0 } else { 2.0 * e as f32 / n as f32 },
        density: if n < 2 { 0.0 } else { 2.0 * e as f32 / (n * (n - 1)) as f32 },
        hub: hub.map(|h| h.label.clone()),
        hub_degree: hub.map_or(0, |h| h.connections),
        isolated_count: nodes.iter().filter(|node| node.connections == 0).count(),
        cluster_count: clusters.len(),
    };

    KnowledgeGraph {
        nodes,
        edges,
        clusters,
        stats,
        generated_at,
    }
}

impl SemanticStore {
    /// Graph of every live concept.
    pub fn generate_knowledge_graph(&self) -> KnowledgeGraph {
        build_graph(&self.concepts(), self.now())
    }

    /// Graph of the concepts within `depth` hops of `center`.
    ///
    /// Returns `None` when `center` is not a live concept.  Depth 0 yields the
    /// center alone.
    pub fn get_subgraph(&self, center: &str, depth: usize) -> Option<KnowledgeGraph> {
        let center = self.get_by_name(center)?;
        let concepts = self.concepts();
        let edges = collect_edges(&concepts);

        let mut neighbours: HashMap<String, Vec<String>> = HashMap::new();
        for edge in &edges {
            let (a, b) = (normalize_key(&edge.source), normalize_key(&edge.target));
            neighbours.entry(a.clone()).or_default().push(b.clone());
            neighbours.entry(b).or_default().push(a);
        }

        let start = normalize_key(&center.concept);
        let mut reached: HashSet<String> = HashSet::from([start.clone()]);
        let mut queue = VecDeque::from([(start, 0usize)]);
        while let Some((label, distance)) = queue.pop_front() {
            if distance == depth {
                continue;
            }
            for next in neighbours.get(&label).into_iter().flatten() {
                if reached.insert(next.clone()) {
                    queue.push_back((next.clone(), distance + 1));
                }
            }
        }

        let subset: Vec<&SemanticConcept> = concepts
            .into_iter()
            .filter(|c| reached.contains(&normalize_key(&c.concept)))
            .collect();
        Some(build_graph(&subset, self.now()))
    }

    /// Live concepts grouped by the UTC day they were learned, oldest day
    /// first.
    pub fn get_knowledge_timeline(&self) -> Vec<TimelineEntry> {
        let mut days: BTreeMap<NaiveDate, Vec<&SemanticConcept>> = BTreeMap::new();
        for concept in self.concepts() {
            days.entry(concept.learned_at.date_naive()).or_default().push(concept);
        }
        days.into_iter()
            .map(|(date, mut concepts)| {
                concepts.sort_by_key(|c| (c.learned_at, c.seq()));
                TimelineEntry {
                    date,
                    concepts: concepts.into_iter().map(|c| c.concept.clone()).collect(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::{ConceptRelation, LearnRequest, SemanticConfig};
    use anima_types::ManualClock;
    use std::sync::Arc;

    fn store() -> (SemanticStore, ManualClock) {
        let clock = ManualClock::default();
        let store = SemanticStore::with_clock(SemanticConfig::default(), Arc::new(clock.clone())).unwrap();
        (store, clock)
    }

    fn learn(store: &mut SemanticStore, label: &str, source: ConceptSource, links: &[(&str, f32)]) {
        store.learn_with(
            LearnRequest::new(label, label, source).with_relations(
                links
                    .iter()
                    .map(|(to, strength)| ConceptRelation::new(*to, RelationKind::RelatedTo, *strength)),
            ),
        );
    }

    /// a ─ b ─ c strongly, d weakly to c, e alone.
    fn sample() -> SemanticStore {
        let (mut store, _) = store();
        learn(&mut store, "a", ConceptSource::Dialogue, &[]);
        learn(&mut store, "b", ConceptSource::Dialogue, &[("a", 0.9)]);
        learn(&mut store, "c", ConceptSource::Dialogue, &[("b", 0.8)]);
        learn(&mut store, "d", ConceptSource::Initial, &[("c", 0.2)]);
        learn(&mut store, "e", ConceptSource::ReadingMaterial, &[]);
        store
    }

    // ── graph ────────────────────────────────────────────────────────────────

    #[test]
    fn edges_are_deduplicated_by_pair() {
        let graph = sample().generate_knowledge_graph();
        // Every relation got a reverse, yet each pair appears once.
        assert_eq!(graph.edges.len(), 3);
        let ab = graph
            .edges
            .iter()
            .find(|e| (e.source == "a" && e.target == "b") || (e.source == "b" && e.target == "a"))
            .unwrap();
        assert!((ab.strength - 0.9).abs() < 1e-6);
    }

    #[test]
    fn stats_describe_the_graph() {
        let graph = sample().generate_knowledge_graph();
        assert_eq!(graph.stats.node_count, 5);
        assert_eq!(graph.stats.edge_count, 3);
        assert!((graph.stats.average_degree - 1.2).abs() < 1e-6);
        assert!((graph.stats.density - 0.3).abs() < 1e-6);
        // b and c both have degree 2; the earlier-learned one wins.
        assert_eq!(graph.stats.hub.as_deref(), Some("b"));
        assert_eq!(graph.stats.hub_degree, 2);
        assert_eq!(graph.stats.isolated_count, 1);
    }

    #[test]
    fn clusters_by_source_and_strength() {
        let graph = sample().generate_knowledge_graph();
        let by_source: Vec<&GraphCluster> = graph.clusters.iter().filter(|c| c.kind == ClusterKind::Source).collect();
        assert_eq!(by_source.len(), 1);
        assert_eq!(by_source[0].label, "dialogue");

        let strong: Vec<&GraphCluster> = graph.clusters.iter().filter(|c| c.kind == ClusterKind::Strong).collect();
        assert_eq!(strong.len(), 1);
        assert_eq!(strong[0].members, vec!["a", "b", "c"]);
        assert_eq!(graph.stats.cluster_count, 2);
    }

    #[test]
    fn nodes_carry_size_and_colour() {
        let graph = sample().generate_knowledge_graph();
        let e = graph.nodes.iter().find(|n| n.label == "e").unwrap();
        let c = graph.nodes.iter().find(|n| n.label == "c").unwrap();
        assert_eq!(e.color, source_color(ConceptSource::ReadingMaterial));
        assert!(c.size > e.size);
        assert!(graph.nodes.iter().all(|n| (MIN_NODE_SIZE..=MAX_NODE_SIZE).contains(&n.size)));
    }

    #[test]
    fn graph_generation_is_read_only() {
        let store = sample();
        let before = store.to_json().unwrap();
        store.generate_knowledge_graph();
        store.get_subgraph("b", 2);
        store.get_knowledge_timeline();
        assert_eq!(store.to_json().unwrap(), before);
    }

    #[test]
    fn empty_store_yields_empty_graph() {
        let (store, _) = store();
        let graph = store.generate_knowledge_graph();
        assert!(graph.nodes.is_empty());
        assert_eq!(graph.stats, GraphStats::default());
    }

    // ── subgraph ─────────────────────────────────────────────────────────────

    #[test]
    fn subgraph_is_bounded_by_depth() {
        let store = sample();
        let one = store.get_subgraph("a", 1).unwrap();
        let labels: HashSet<&str> = one.nodes.iter().map(|n| n.label.as_str()).collect();
        assert_eq!(labels, HashSet::from(["a", "b"]));

        let three = store.get_subgraph("a", 3).unwrap();
        assert_eq!(three.nodes.len(), 4);
        assert_eq!(store.get_subgraph("A", 0).unwrap().nodes.len(), 1);
    }

    #[test]
    fn subgraph_of_unknown_center_is_none() {
        assert!(sample().get_subgraph("zzz", 2).is_none());
    }

    // ── timeline ─────────────────────────────────────────────────────────────

    #[test]
    fn timeline_groups_by_day() {
        let (mut store, clock) = store();
        learn(&mut store, "first", ConceptSource::Dialogue, &[]);
        learn(&mut store, "second", ConceptSource::Dialogue, &[]);
        clock.advance_days(2);
        learn(&mut store, "third", ConceptSource::Dialogue, &[]);

        let timeline = store.get_knowledge_timeline();
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[0].concepts, vec!["first", "second"]);
        assert_eq!(timeline[1].concepts, vec!["third"]);
        assert!(timeline[0].date < timeline[1].date);
    }

    // ── schema ───────────────────────────────────────────────────────────────

    #[test]
    fn schema_names_the_graph_contract() {
        let schema = serde_json::to_value(knowledge_graph_schema()).unwrap();
        let properties = &schema["properties"];
        for field in ["nodes", "edges", "clusters", "stats", "generated_at"] {
            assert!(properties.get(field).is_some(), "missing {field}");
        }
    }
}
