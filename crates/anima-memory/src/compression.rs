//! Knowledge compression.
//!
//! A batch pass over the semantic store, separate from decay-eviction, in two
//! phases:
//!
//! 1. **Merge** – weak concepts (comprehension and use count both under the
//!    policy limits, never seeds) that relate to each other *and* share a
//!    source are grouped into connected components.  Each component of two or
//!    more collapses into its strongest member.
//! 2. **Prune** – non-seed concepts that are nearly forgotten, never used and
//!    older than the minimum age are deleted outright.
//!
//! The functions here only *plan*; [`SemanticStore::compress_knowledge`]
//! applies the plan and appends a [`CompressionRecord`] to its log.
//!
//! [`SemanticStore::compress_knowledge`]: crate::semantic::SemanticStore::compress_knowledge

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::index::normalize_key;
use crate::retention::days_between;
use crate::semantic::SemanticConcept;

/// Number of compression records a store keeps.
pub const COMPRESSION_LOG_CAPACITY: usize = 50;

/// Thresholds for both compression phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionPolicy {
    /// Merge candidates have comprehension strictly below this.
    pub merge_comprehension_below: f32,
    /// Merge candidates have a use count strictly below this.
    pub merge_use_count_below: u32,
    /// Share of each folded member's comprehension added to the primary.
    pub merge_comprehension_share: f32,
    /// Prune candidates have comprehension strictly below this.
    pub prune_comprehension_below: f32,
    /// Prune only concepts learned more than this many days ago.
    pub prune_min_age_days: f32,
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        Self {
            merge_comprehension_below: 0.4,
            merge_use_count_below: 3,
            merge_comprehension_share: 0.5,
            prune_comprehension_below: 0.1,
            prune_min_age_days: 7.0,
        }
    }
}

/// One merge: `merged` were folded into `into`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeGroup {
    /// Label of the surviving concept.
    pub into: String,
    pub into_id: Uuid,
    /// Labels of the concepts that were folded and deleted.
    pub merged: Vec<String>,
}

/// Audit entry for one compression pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionRecord {
    pub at: DateTime<Utc>,
    /// Concept count before the pass.
    pub before: usize,
    pub after: usize,
    pub merged: Vec<MergeGroup>,
    /// Labels of pruned concepts.
    pub pruned: Vec<String>,
}

impl CompressionRecord {
    /// Number of concepts this pass removed.
    pub fn removed(&self) -> usize {
        self.before.saturating_sub(self.after)
    }
}

/// A planned merge, before it is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan {
    pub primary: Uuid,
    /// Members to fold into `primary`, in insertion order.
    pub members: Vec<Uuid>,
}

fn is_merge_candidate(concept: &SemanticConcept, policy: &CompressionPolicy) -> bool {
    !concept.source.is_seed()
        && concept.comprehension < policy.merge_comprehension_below
        && concept.use_count < policy.merge_use_count_below
}

/// Group merge candidates into components and choose a primary for each.
///
/// `concepts` must be in insertion order; the result is deterministic for a
/// given order.  Two candidates are adjacent when either relates to the other
/// and both have the same source.  The primary is the member with the highest
/// comprehension, ties going to the earliest learned.
pub fn plan_merges(concepts: &[&SemanticConcept], policy: &CompressionPolicy) -> Vec<MergePlan> {
    let candidates: Vec<&SemanticConcept> = concepts
        .iter()
        .copied()
        .filter(|c| is_merge_candidate(c, policy))
        .collect();
    let by_label: HashMap<String, usize> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (normalize_key(&c.concept), i))
        .collect();

    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); candidates.len()];
    for (i, concept) in candidates.iter().enumerate() {
        for relation in &concept.relations {
            let Some(&j) = by_label.get(&normalize_key(&relation.concept)) else {
                continue;
            };
            if i != j && candidates[j].source == concept.source {
                adjacency[i].push(j);
                adjacency[j].push(i);
            }
        }
    }

    let mut seen = vec![false; candidates.len()];
    let mut plans = Vec::new();
    for start in 0..candidates.len() {
        if seen[start] {
            continue;
        }
        let mut component = Vec::new();
        let mut queue = VecDeque::from([start]);
        seen[start] = true;
        while let Some(node) = queue.pop_front() {
            component.push(node);
            for &next in &adjacency[node] {
                if !seen[next] {
                    seen[next] = true;
                    queue.push_back(next);
                }
            }
        }
        if component.len() < 2 {
            continue;
        }
        component.sort_unstable();

        let primary = component.iter().copied().fold(component[0], |best, i| {
            let (b, c) = (candidates[best], candidates[i]);
            let stronger = c.comprehension > b.comprehension
                || (c.comprehension == b.comprehension && c.learned_at < b.learned_at);
            if stronger { i } else { best }
        });
        plans.push(MergePlan {
            primary: candidates[primary].id,
            members: component
                .into_iter()
                .filter(|&i| i != primary)
                .map(|i| candidates[i].id)
                .collect(),
        });
    }
    plans
}

/// Ids of concepts that are dead weight at `now`.
pub fn prune_candidates(concepts: &[&SemanticConcept], now: DateTime<Utc>, policy: &CompressionPolicy) -> Vec<Uuid> {
    concepts
        .iter()
        .filter(|c| {
            !c.source.is_seed()
                && c.comprehension < policy.prune_comprehension_below
                && c.use_count == 0
                && days_between(c.learned_at, now) > policy.prune_min_age_days
        })
        .map(|c| c.id)
        .collect()
}

/// Labels that belong to a merge group, normalised.
pub(crate) fn group_labels<'a>(members: impl IntoIterator<Item = &'a SemanticConcept>) -> HashSet<String> {
    members.into_iter().map(|c| normalize_key(&c.concept)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::{ConceptRelation, LearnRequest, SemanticConfig, SemanticStore};
    use anima_types::{Clock, ConceptSource, ManualClock, RelationKind};
    use std::sync::Arc;

    fn store(initial: f32) -> (SemanticStore, ManualClock) {
        let clock = ManualClock::default();
        let config = SemanticConfig {
            initial_comprehension: initial,
            ..SemanticConfig::default()
        };
        (SemanticStore::with_clock(config, Arc::new(clock.clone())).unwrap(), clock)
    }

    /// Learn `labels` in order, each related to the one before it.
    fn chain(store: &mut SemanticStore, labels: &[&str], source: ConceptSource) {
        let mut previous: Option<&str> = None;
        for &label in labels {
            let mut request = LearnRequest::new(label, format!("about {label}"), source);
            if let Some(prev) = previous {
                request = request.with_relation(ConceptRelation::new(prev, RelationKind::RelatedTo, 0.5));
            }
            store.learn_with(request);
            previous = Some(label);
        }
    }

    // ── planning ─────────────────────────────────────────────────────────────

    #[test]
    fn related_same_source_candidates_form_one_group() {
        let (mut store, _) = store(0.2);
        chain(&mut store, &["a", "b", "c"], ConceptSource::ReadingMaterial);
        let plans = plan_merges(&store.concepts(), &CompressionPolicy::default());
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].members.len(), 2);
    }

    #[test]
    fn different_sources_are_not_merged() {
        let (mut store, _) = store(0.2);
        store.learn("a", "a", ConceptSource::Dialogue);
        store.learn_with(
            LearnRequest::new("b", "b", ConceptSource::ReadingMaterial)
                .with_relation(ConceptRelation::new("a", RelationKind::RelatedTo, 0.9)),
        );
        assert!(plan_merges(&store.concepts(), &CompressionPolicy::default()).is_empty());
    }

    #[test]
    fn strong_concepts_are_not_candidates() {
        let (mut store, _) = store(0.5);
        chain(&mut store, &["a", "b"], ConceptSource::Dialogue);
        assert!(plan_merges(&store.concepts(), &CompressionPolicy::default()).is_empty());
    }

    #[test]
    fn seed_concepts_are_not_candidates() {
        let (mut store, _) = store(0.2);
        chain(&mut store, &["x", "y"], ConceptSource::Initial);
        assert!(plan_merges(&store.concepts(), &CompressionPolicy::default()).is_empty());
    }

    #[test]
    fn primary_is_highest_comprehension() {
        let (mut store, _) = store(0.2);
        chain(&mut store, &["a", "b", "c"], ConceptSource::Dialogue);
        let b = store.get_by_name("b").map(|c| c.id).unwrap();
        store.deepen(&b, "more about b", &[]).unwrap();
        let plans = plan_merges(&store.concepts(), &CompressionPolicy::default());
        assert_eq!(plans[0].primary, b);
    }

    // ── pruning ──────────────────────────────────────────────────────────────

    #[test]
    fn prune_requires_age_and_zero_use() {
        let (mut store, clock) = store(0.05);
        store.learn("old", "old", ConceptSource::Dialogue);
        store.learn("seed", "seed", ConceptSource::Initial);
        let policy = CompressionPolicy::default();

        assert!(prune_candidates(&store.concepts(), clock.now(), &policy).is_empty());
        clock.advance_days(8);
        let ids = prune_candidates(&store.concepts(), clock.now(), &policy);
        assert_eq!(ids, vec![store.get_by_name("old").unwrap().id]);
    }

    #[test]
    fn record_counts_removed_concepts() {
        let record = CompressionRecord {
            at: Utc::now(),
            before: 10,
            after: 7,
            merged: Vec::new(),
            pruned: Vec::new(),
        };
        assert_eq!(record.removed(), 3);
    }
}
