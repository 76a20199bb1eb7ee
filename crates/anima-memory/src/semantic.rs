//! Semantic Memory Store.
//!
//! Holds learned concepts and the typed relations between them.  A concept is
//! identified by its label, compared case-insensitively after trimming: there
//! is never more than one concept per normalised label.
//!
//! ## Comprehension
//!
//! Each concept's `comprehension ∈ [0, 1]` plays the role retention plays in
//! the episodic store:
//!
//! * it starts at [`SemanticConfig::initial_comprehension`],
//! * rises on [`deepen`](SemanticStore::deepen) and
//!   [`use_concept`](SemanticStore::use_concept),
//! * rises a little on every *related* concept's use (spreading activation),
//! * decays during maintenance while the concept goes unused:
//!
//! ```text
//! Δ = unused_decay_rate × (1 − interest × 0.5) × days_since_use × 0.01
//! ```
//!
//! Concepts whose source is [`ConceptSource::Initial`] are seeds: they never
//! decay and are never evicted.
//!
//! ## Relations
//!
//! Relations point at other concepts *by label*.  Adding `A → B` also adds a
//! reverse `B → A` (kind from [`RelationKind::reverse`], strength scaled by
//! `reverse_strength_factor`) but only when `B` already exists.  Symmetry is
//! therefore best-effort.  Deleting a concept always strips its label from
//! every other concept's relations.
//!
//! # Example
//!
//! ```rust
//! use anima_memory::semantic::{ConceptRelation, LearnRequest, SemanticConfig, SemanticStore};
//! use anima_types::{ConceptSource, RelationKind};
//!
//! let mut store = SemanticStore::new(SemanticConfig::default()).unwrap();
//!
//! store.learn("music", "organised sound", ConceptSource::Initial);
//! let song = store.learn_with(
//!     LearnRequest::new("song", "a short piece of music", ConceptSource::Dialogue)
//!         .with_relation(ConceptRelation::new("music", RelationKind::PartOf, 0.9)),
//! );
//!
//! // Learning the same label again deepens instead of duplicating.
//! store.learn("Song", "often sung", ConceptSource::Dialogue);
//! assert_eq!(store.len(), 2);
//!
//! let before = store.get_by_name("music").unwrap().comprehension;
//! store.use_concept(&song.id);
//! assert!(store.get_by_name("music").unwrap().comprehension > before);
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use anima_types::{
    Clock, ConceptSource, MatchCriterion, MemoryError, MemoryEvent, MemoryEventKind, RelationKind, SearchResult,
    SystemClock,
};
use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::Rng;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::compression::{
    COMPRESSION_LOG_CAPACITY, CompressionPolicy, CompressionRecord, MergeGroup, group_labels, plan_merges,
    prune_candidates,
};
use crate::index::{AssociationIndex, normalize_key};
use crate::retention::{
    EvictionCandidate, MaintenanceGate, MaintenanceReport, clamp_unit, days_between, reinforce, select_victims,
    semantic_decay,
};
use crate::snapshot::{EVENT_LOG_CAPACITY, EventLog, StoreSnapshot};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Tuning for concept learning, reinforcement, decay and compression.
///
/// Every field has a default, so a partial TOML/JSON document deserialises.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticConfig {
    /// Capacity ceiling.  Seeds count towards it but are never evicted.
    pub max_concepts: usize,
    /// Comprehension of a newly learned concept.
    pub initial_comprehension: f32,
    /// Interest given to concepts learned without an explicit one.
    pub default_interest: f32,
    /// Comprehension gained per deepen (and per re-learn).
    pub deepen_step: f32,
    /// Comprehension gained per use.
    pub use_reinforcement: f32,
    /// Scales the boost a use spreads to related concepts.
    pub spreading_activation_factor: f32,
    /// Comprehension lost per unused day is `unused_decay_rate × 0.01 × (1 − interest / 2)`.
    pub unused_decay_rate: f32,
    /// Concepts below this comprehension are invisible and get deleted.
    pub deletion_threshold: f32,
    /// Strength multiplier for automatically added reverse relations.
    pub reverse_strength_factor: f32,
    /// Strength added when a relation that already exists is given again.
    pub relation_strengthen_step: f32,
    /// Maintenance runs at most once per this many ticks.
    pub maintenance_interval_ticks: u64,
    /// Compression runs from maintenance at most once per this many ticks.
    pub compression_interval_ticks: u64,
    /// Thresholds for merging and pruning during compression.
    pub compression: CompressionPolicy,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            max_concepts: 5000,
            initial_comprehension: 0.3,
            default_interest: 0.5,
            deepen_step: 0.1,
            use_reinforcement: 0.05,
            spreading_activation_factor: 0.3,
            unused_decay_rate: 1.0,
            deletion_threshold: 0.05,
            reverse_strength_factor: 0.8,
            relation_strengthen_step: 0.1,
            maintenance_interval_ticks: 100,
            compression_interval_ticks: 1000,
            compression: CompressionPolicy::default(),
        }
    }
}

impl SemanticConfig {
    /// Reject values outside their documented ranges.
    pub fn validate(&self) -> Result<(), MemoryError> {
        if self.max_concepts == 0 {
            return Err(MemoryError::InvalidConfig("semantic.max_concepts must be > 0".into()));
        }
        let unit_fields = [
            ("initial_comprehension", self.initial_comprehension),
            ("default_interest", self.default_interest),
            ("deepen_step", self.deepen_step),
            ("use_reinforcement", self.use_reinforcement),
            ("deletion_threshold", self.deletion_threshold),
            ("reverse_strength_factor", self.reverse_strength_factor),
            ("relation_strengthen_step", self.relation_strengthen_step),
            ("compression.merge_comprehension_share", self.compression.merge_comprehension_share),
        ];
        for (name, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(MemoryError::InvalidConfig(format!("semantic.{name} must be in [0, 1], got {value}")));
            }
        }
        for (name, value) in [
            ("spreading_activation_factor", self.spreading_activation_factor),
            ("unused_decay_rate", self.unused_decay_rate),
            ("compression.prune_min_age_days", self.compression.prune_min_age_days),
        ] {
            if value.is_nan() || value < 0.0 {
                return Err(MemoryError::InvalidConfig(format!("semantic.{name} must be >= 0, got {value}")));
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Concept types
// ─────────────────────────────────────────────────────────────────────────────

/// A typed, weighted edge to another concept, addressed by label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConceptRelation {
    /// Label of the target concept.
    pub concept: String,
    pub kind: RelationKind,
    /// In `[0, 1]`.
    pub strength: f32,
}

impl ConceptRelation {
    /// A relation to `concept`; `strength` is clamped into `[0, 1]`.
    pub fn new(concept: impl Into<String>, kind: RelationKind, strength: f32) -> Self {
        Self {
            concept: concept.into().trim().to_string(),
            kind,
            strength: clamp_unit(strength),
        }
    }

    fn key(&self) -> String {
        normalize_key(&self.concept)
    }
}

/// Where a concept's knowledge came from, beyond its [`ConceptSource`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    /// A document or page; `locator` is a URL, ISBN or similar.
    Reference { title: String, locator: Option<String> },
    /// Learned while living through an episodic record.
    Episode { episode_id: Uuid },
    /// Told by someone during a conversation.
    Speaker { name: String },
    /// Part of the seed knowledge a store starts with.
    Bootstrap,
}

/// A learned concept: a label, its accumulated definition and typed
/// relations to other concepts.
///
/// Comprehension grows with deepening and use and decays while unused;
/// interest slows that decay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticConcept {
    pub id: Uuid,
    /// Display label; uniqueness is by its normalised form.
    pub concept: String,
    /// Append-only.
    pub definition: String,
    /// Where the concept was first learned from.
    pub source: ConceptSource,
    /// Outgoing relations; at most one per target label.
    pub relations: Vec<ConceptRelation>,
    /// How well the concept is understood, in `[0, 1]`.
    pub comprehension: f32,
    /// How interesting the concept is, in `[0, 1]`.
    pub interest_level: f32,
    pub use_count: u32,
    /// Decay is measured from here, or from `learned_at` before the first use.
    pub last_used: Option<DateTime<Utc>>,
    pub learned_at: DateTime<Utc>,
    #[serde(default)]
    pub provenance: Option<Provenance>,
    #[serde(skip)]
    seq: u64,
}

impl SemanticConcept {
    /// Seed concepts never decay and are never evicted.
    pub fn is_seed(&self) -> bool {
        self.source.is_seed()
    }

    /// The relation to `label`, if any.
    pub fn relation_to(&self, label: &str) -> Option<&ConceptRelation> {
        let key = normalize_key(label);
        self.relations.iter().find(|r| r.key() == key)
    }

    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    fn decay_anchor(&self) -> DateTime<Utc> {
        self.last_used.unwrap_or(self.learned_at)
    }

    fn key(&self) -> String {
        normalize_key(&self.concept)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Requests, stats, snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// Everything [`SemanticStore::learn_with`] needs to learn or re-learn a
/// concept.  Build one with [`LearnRequest::new`] and the `with_*` methods.
#[derive(Debug, Clone)]
pub struct LearnRequest {
    /// Label; an existing concept with the same normalised label is deepened.
    pub concept: String,
    /// Text appended to the concept's definition.
    pub definition: String,
    pub source: ConceptSource,
    /// Relations to add.  Self-relations and blank targets are ignored.
    pub relations: Vec<ConceptRelation>,
    /// Falls back to [`SemanticConfig::default_interest`].
    pub interest_level: Option<f32>,
    pub provenance: Option<Provenance>,
}

impl LearnRequest {
    /// A request with no relations, default interest and no provenance.
    pub fn new(concept: impl Into<String>, definition: impl Into<String>, source: ConceptSource) -> Self {
        Self {
            concept: concept.into(),
            definition: definition.into(),
            source,
            relations: Vec::new(),
            interest_level: None,
            provenance: None,
        }
    }

    pub fn with_relation(mut self, relation: ConceptRelation) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn with_relations(mut self, relations: impl IntoIterator<Item = ConceptRelation>) -> Self {
        self.relations.extend(relations);
        self
    }

    /// Override the default interest; clamped into `[0, 1]` at learn time.
    pub fn with_interest(mut self, interest: f32) -> Self {
        self.interest_level = Some(interest);
        self
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = Some(provenance);
        self
    }
}

/// Aggregates over the live concepts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SemanticStats {
    pub total: usize,
    /// Concept count per source.
    pub by_source: BTreeMap<ConceptSource, usize>,
    pub average_comprehension: f32,
    pub average_interest: f32,
    pub total_relations: usize,
    /// Concepts learned from [`ConceptSource::Initial`].
    pub seed_count: usize,
}

/// Serialised form of a [`SemanticStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticSnapshot {
    /// Concepts, config, recent events and maintenance state.
    #[serde(flatten)]
    pub store: StoreSnapshot<SemanticConcept, SemanticConfig>,
    /// Compression history, oldest first.
    #[serde(default)]
    pub compression_log: Vec<CompressionRecord>,
    #[serde(default)]
    pub last_compression_tick: Option<u64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// SemanticStore
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory store of concepts keyed by normalised label, with typed
/// relations, comprehension decay, bounded capacity and compression.
pub struct SemanticStore {
    config: SemanticConfig,
    concepts: HashMap<Uuid, SemanticConcept>,
    by_label: HashMap<String, Uuid>,
    by_source: AssociationIndex<Uuid>,
    gate: MaintenanceGate,
    compression_gate: MaintenanceGate,
    compression_log: VecDeque<CompressionRecord>,
    events: EventLog,
    next_seq: u64,
    clock: Arc<dyn Clock>,
    rng: StdRng,
}

impl SemanticStore {
    /// Create an empty store on wall-clock time.
    pub fn new(config: SemanticConfig) -> Result<Self, MemoryError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create an empty store reading time from `clock`.
    ///
    /// Fails with [`MemoryError::InvalidConfig`] when `config` does not validate.
    pub fn with_clock(config: SemanticConfig, clock: Arc<dyn Clock>) -> Result<Self, MemoryError> {
        config.validate()?;
        Ok(Self {
            gate: MaintenanceGate::new(config.maintenance_interval_ticks),
            // Compression first becomes due one full interval after tick 0.
            compression_gate: MaintenanceGate::resume(config.compression_interval_ticks, Some(0)),
            config,
            concepts: HashMap::new(),
            by_label: HashMap::new(),
            by_source: AssociationIndex::new(),
            compression_log: VecDeque::with_capacity(COMPRESSION_LOG_CAPACITY),
            events: EventLog::new(EVENT_LOG_CAPACITY),
            next_seq: 0,
            clock,
            rng: StdRng::from_entropy(),
        })
    }

    /// Make random draws reproducible.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn config(&self) -> &SemanticConfig {
        &self.config
    }

    /// Number of concepts currently stored.
    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn is_visible(&self, concept: &SemanticConcept) -> bool {
        concept.comprehension >= self.config.deletion_threshold
    }

    /// Live concepts in insertion order.
    pub fn concepts(&self) -> Vec<&SemanticConcept> {
        let mut concepts: Vec<&SemanticConcept> = self.concepts.values().filter(|c| self.is_visible(c)).collect();
        concepts.sort_by_key(|c| c.seq);
        concepts
    }

    fn id_of(&self, label: &str) -> Option<Uuid> {
        self.by_label.get(&normalize_key(label)).copied()
    }

    // ── writes ───────────────────────────────────────────────────────────────

    /// Learn `concept`, or deepen it when the label is already known.
    ///
    /// Shorthand for [`learn_with`](Self::learn_with) without relations.
    pub fn learn(&mut self, concept: &str, definition: &str, source: ConceptSource) -> SemanticConcept {
        self.learn_with(LearnRequest::new(concept, definition, source))
    }

    /// Learn a concept, or deepen it when its label is already known.
    pub fn learn_with(&mut self, request: LearnRequest) -> SemanticConcept {
        if let Some(id) = self.id_of(&request.concept) {
            if let (Some(provenance), Some(existing)) = (&request.provenance, self.concepts.get_mut(&id)) {
                existing.provenance.get_or_insert_with(|| provenance.clone());
            }
            if let Some(concept) = self.apply_deepen(id, &request.definition, &request.relations) {
                return concept;
            }
        }

        let now = self.clock.now();
        let concept = SemanticConcept {
            id: Uuid::new_v4(),
            concept: request.concept.trim().to_string(),
            definition: request.definition.trim().to_string(),
            source: request.source,
            relations: Vec::new(),
            comprehension: self.config.initial_comprehension,
            interest_level: clamp_unit(request.interest_level.unwrap_or(self.config.default_interest)),
            use_count: 0,
            last_used: None,
            learned_at: now,
            provenance: request.provenance,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        let id = concept.id;

        debug!(id = %id, concept = %concept.concept, source = %concept.source, "learning concept");
        self.events.record(now, MemoryEventKind::Learned, id, &concept.concept);
        self.insert(concept.clone());
        for relation in request.relations {
            self.merge_relation(id, relation);
        }
        self.enforce_capacity(Some(id));

        self.concepts.get(&id).cloned().unwrap_or(concept)
    }

    fn insert(&mut self, concept: SemanticConcept) {
        self.by_label.insert(concept.key(), concept.id);
        self.by_source.insert(concept.source.as_str(), concept.id);
        self.concepts.insert(concept.id, concept);
    }

    /// Append to a concept's definition, raise its comprehension and merge
    /// new relations.
    ///
    /// # Errors
    ///
    /// [`MemoryError::ConceptNotFound`] when `id` is not a concept of this
    /// store.
    pub fn deepen(
        &mut self,
        id: &Uuid,
        additional_text: &str,
        new_relations: &[ConceptRelation],
    ) -> Result<SemanticConcept, MemoryError> {
        self.apply_deepen(*id, additional_text, new_relations)
            .ok_or(MemoryError::ConceptNotFound(*id))
    }

    fn apply_deepen(&mut self, id: Uuid, text: &str, relations: &[ConceptRelation]) -> Option<SemanticConcept> {
        let now = self.clock.now();
        let step = self.config.deepen_step;
        let concept = self.concepts.get_mut(&id)?;

        let text = text.trim();
        if !text.is_empty() && !concept.definition.contains(text) {
            if !concept.definition.is_empty() {
                concept.definition.push(' ');
            }
            concept.definition.push_str(text);
        }
        concept.comprehension = reinforce(concept.comprehension, step);
        concept.last_used = Some(now);
        let label = concept.concept.clone();

        debug!(id = %id, concept = %label, comprehension = concept.comprehension, "deepening concept");
        self.events.record(now, MemoryEventKind::Deepened, id, &label);
        for relation in relations {
            self.merge_relation(id, relation.clone());
        }
        self.concepts.get(&id).cloned()
    }

    /// Strengthen an existing relation or append a new one and try to add its
    /// reverse.  Self-relations and blank labels are ignored.
    fn merge_relation(&mut self, id: Uuid, relation: ConceptRelation) {
        let step = self.config.relation_strengthen_step;
        let Some(concept) = self.concepts.get_mut(&id) else {
            return;
        };
        let key = relation.key();
        if key.is_empty() || key == concept.key() {
            return;
        }
        if let Some(existing) = concept.relations.iter_mut().find(|r| r.key() == key) {
            existing.strength = reinforce(existing.strength, step);
            return;
        }
        let label = concept.concept.clone();
        concept.relations.push(relation.clone());
        self.link_reverse(&label, &relation);
    }

    /// Best-effort reverse of `from → relation.concept`.
    fn link_reverse(&mut self, from_label: &str, relation: &ConceptRelation) {
        let factor = self.config.reverse_strength_factor;
        let Some(target_id) = self.id_of(&relation.concept) else {
            return;
        };
        let Some(target) = self.concepts.get_mut(&target_id) else {
            return;
        };
        if target.relation_to(from_label).is_some() {
            return;
        }
        target.relations.push(ConceptRelation::new(
            from_label,
            relation.kind.reverse(),
            relation.strength * factor,
        ));
    }

    /// Use a concept: count it, reinforce it and spread activation to every
    /// concept it relates to.
    ///
    /// Each related concept gains
    /// `spreading_activation_factor × strength × 0.05`.
    pub fn use_concept(&mut self, id: &Uuid) -> Option<SemanticConcept> {
        let now = self.clock.now();
        let threshold = self.config.deletion_threshold;
        let reinforcement = self.config.use_reinforcement;
        let factor = self.config.spreading_activation_factor;

        let concept = self.concepts.get_mut(id).filter(|c| c.comprehension >= threshold)?;
        concept.use_count += 1;
        concept.last_used = Some(now);
        concept.comprehension = reinforce(concept.comprehension, reinforcement);
        let used = concept.clone();

        for relation in &used.relations {
            let Some(target_id) = self.by_label.get(&relation.key()).copied() else {
                continue;
            };
            if let Some(target) = self.concepts.get_mut(&target_id) {
                target.comprehension = reinforce(target.comprehension, factor * relation.strength * 0.05);
            }
        }
        self.events.record(now, MemoryEventKind::Used, used.id, &used.concept);
        Some(used)
    }

    /// Delete a concept on request, with the full cascade.
    pub fn forget(&mut self, id: &Uuid) -> Option<SemanticConcept> {
        self.remove_concept(*id, MemoryEventKind::Forgotten)
    }

    /// Remove a concept, its index entries and every relation naming it.
    fn remove_concept(&mut self, id: Uuid, reason: MemoryEventKind) -> Option<SemanticConcept> {
        let concept = self.concepts.remove(&id)?;
        let key = concept.key();
        if self.by_label.get(&key) == Some(&id) {
            self.by_label.remove(&key);
        }
        self.by_source.remove(concept.source.as_str(), &id);
        for other in self.concepts.values_mut() {
            other.relations.retain(|r| r.key() != key);
        }
        self.events.record(self.clock.now(), reason, id, &concept.concept);
        Some(concept)
    }

    fn enforce_capacity(&mut self, protect: Option<Uuid>) {
        if self.concepts.len() <= self.config.max_concepts {
            return;
        }
        let excess = self.concepts.len() - self.config.max_concepts;
        let candidates: Vec<EvictionCandidate<Uuid>> = self
            .concepts
            .values()
            .filter(|c| !c.is_seed() && Some(c.id) != protect)
            .map(|c| EvictionCandidate {
                id: c.id,
                score: c.comprehension * c.use_count as f32,
                created_at: c.learned_at,
                seq: c.seq,
            })
            .collect();
        if candidates.len() < excess {
            warn!(
                excess,
                evictable = candidates.len(),
                "semantic store over capacity with only seed concepts left to evict"
            );
        }
        for victim in select_victims(candidates, excess) {
            if let Some(concept) = self.remove_concept(victim, MemoryEventKind::Evicted) {
                info!(id = %victim, concept = %concept.concept, "evicted concept over capacity");
            }
        }
    }

    // ── queries ──────────────────────────────────────────────────────────────

    /// Look up a live concept by id.  Does not count as a use.
    pub fn get(&self, id: &Uuid) -> Option<&SemanticConcept> {
        self.concepts.get(id).filter(|c| self.is_visible(c))
    }

    /// Exact, case-insensitive label lookup.
    pub fn get_by_name(&self, name: &str) -> Option<&SemanticConcept> {
        self.id_of(name).and_then(|id| self.get(&id))
    }

    /// Rank concepts against `query`.
    ///
    /// | match              | weight |
    /// |--------------------|--------|
    /// | exact label        | 1.0    |
    /// | label contains     | 0.7    |
    /// | definition contains| 0.4    |
    /// | relation label     | 0.3    |
    ///
    /// The weights of every match type that applies are summed and scaled by
    /// comprehension.
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchResult<SemanticConcept>> {
        let query = normalize_key(query);
        if query.is_empty() {
            return Vec::new();
        }

        let hits = self
            .concepts()
            .into_iter()
            .filter_map(|c| {
                let label = c.key();
                let mut weight = 0.0;
                let mut criteria = Vec::new();
                if label == query {
                    weight += 1.0;
                    criteria.push(MatchCriterion::ExactName);
                } else if label.contains(&query) {
                    weight += 0.7;
                    criteria.push(MatchCriterion::PartialName);
                }
                if c.definition.to_lowercase().contains(&query) {
                    weight += 0.4;
                    criteria.push(MatchCriterion::Definition);
                }
                if let Some(relation) = c.relations.iter().find(|r| r.key().contains(&query)) {
                    weight += 0.3;
                    criteria.push(MatchCriterion::Relation(relation.concept.clone()));
                }
                (!criteria.is_empty()).then(|| (c, weight * c.comprehension, criteria))
            })
            .collect();
        rank(hits, limit)
    }

    /// Live concepts that `name` relates to, strongest relation first.
    ///
    /// The relevance score is the relation strength.
    pub fn get_related_concepts(&self, name: &str) -> Vec<SearchResult<SemanticConcept>> {
        let Some(concept) = self.get_by_name(name) else {
            return Vec::new();
        };
        let hits = concept
            .relations
            .iter()
            .filter_map(|r| {
                self.get_by_name(&r.concept)
                    .map(|target| (target, r.strength, vec![MatchCriterion::Relation(r.kind.as_str().to_string())]))
            })
            .collect();
        rank(hits, usize::MAX)
    }

    /// Concepts from `source`, ranked by comprehension.
    pub fn get_by_source(&self, source: ConceptSource, limit: usize) -> Vec<SearchResult<SemanticConcept>> {
        let hits = self
            .by_source
            .get(source.as_str())
            .iter()
            .filter_map(|id| self.get(id))
            .map(|c| (c, c.comprehension, Vec::new()))
            .collect();
        rank(hits, limit)
    }

    /// Up to `limit` concepts by descending interest, ties in insertion order.
    pub fn get_most_interesting(&self, limit: usize) -> Vec<&SemanticConcept> {
        let mut concepts = self.concepts();
        concepts.sort_by(|a, b| b.interest_level.total_cmp(&a.interest_level).then_with(|| a.seq.cmp(&b.seq)));
        concepts.truncate(limit);
        concepts
    }

    /// Up to `limit` concepts by descending use count, ties in insertion order.
    pub fn get_most_used(&self, limit: usize) -> Vec<&SemanticConcept> {
        let mut concepts = self.concepts();
        concepts.sort_by(|a, b| b.use_count.cmp(&a.use_count).then_with(|| a.seq.cmp(&b.seq)));
        concepts.truncate(limit);
        concepts
    }

    /// Interest-weighted random draw.  Does not count as a use.
    pub fn get_random_concept(&mut self) -> Option<SemanticConcept> {
        let concepts = self.concepts();
        if concepts.is_empty() {
            return None;
        }
        let weights: Vec<f32> = concepts.iter().map(|c| c.interest_level).collect();
        let ids: Vec<Uuid> = concepts.iter().map(|c| c.id).collect();
        let pick = match WeightedIndex::new(&weights) {
            Ok(dist) => dist.sample(&mut self.rng),
            Err(_) => self.rng.gen_range(0..ids.len()),
        };
        self.concepts.get(&ids[pick]).cloned()
    }

    pub fn stats(&self) -> SemanticStats {
        let live = self.concepts();
        if live.is_empty() {
            return SemanticStats::default();
        }
        let n = live.len() as f32;
        let mut by_source = BTreeMap::new();
        for concept in &live {
            *by_source.entry(concept.source).or_insert(0) += 1;
        }
        SemanticStats {
            total: live.len(),
            by_source,
            average_comprehension: live.iter().map(|c| c.comprehension).sum::<f32>() / n,
            average_interest: live.iter().map(|c| c.interest_level).sum::<f32>() / n,
            total_relations: live.iter().map(|c| c.relations.len()).sum(),
            seed_count: live.iter().filter(|c| c.is_seed()).count(),
        }
    }

    /// Up to `limit` recent events, newest first.
    pub fn recent_events(&self, limit: usize) -> Vec<MemoryEvent> {
        self.events.recent(limit)
    }

    /// Compression records, oldest first.
    pub fn compression_log(&self) -> Vec<CompressionRecord> {
        self.compression_log.iter().cloned().collect()
    }

    // ── maintenance ──────────────────────────────────────────────────────────

    /// Decay unused non-seed concepts and delete those below the deletion
    /// threshold.  Also runs [`compress_knowledge`](Self::compress_knowledge)
    /// when `compression_interval_ticks` have passed since the last
    /// compression.
    ///
    /// Returns `None` when rate-limited.
    pub fn perform_maintenance(&mut self, current_tick: u64) -> Option<MaintenanceReport> {
        if !self.gate.try_run(current_tick) {
            return None;
        }
        let now = self.clock.now();
        let mut report = MaintenanceReport {
            tick: current_tick,
            examined: self.concepts.len(),
            ..MaintenanceReport::default()
        };

        let mut doomed = Vec::new();
        for concept in self.concepts.values_mut() {
            if concept.is_seed() {
                continue;
            }
            let days = days_between(concept.decay_anchor(), now);
            let delta = semantic_decay(self.config.unused_decay_rate, concept.interest_level, days);
            if delta > 0.0 {
                concept.comprehension = clamp_unit(concept.comprehension - delta);
                report.decayed += 1;
            }
            if concept.comprehension < self.config.deletion_threshold {
                doomed.push((concept.seq, concept.id));
            }
        }
        doomed.sort();
        for (_, id) in doomed {
            if self.remove_concept(id, MemoryEventKind::Forgotten).is_some() {
                report.removed.push(id);
            }
        }

        if self.compression_gate.try_run(current_tick) {
            report.compression = Some(self.compress_knowledge());
        }

        info!(
            tick = current_tick,
            decayed = report.decayed,
            removed = report.removed.len(),
            remaining = self.concepts.len(),
            "semantic maintenance complete"
        );
        Some(report)
    }

    /// Merge weak related same-source concepts and prune dead ones.
    pub fn compress_knowledge(&mut self) -> CompressionRecord {
        let now = self.clock.now();
        let before = self.concepts.len();
        let policy = self.config.compression.clone();

        let plans = plan_merges(&self.concepts(), &policy);
        let mut merged = Vec::with_capacity(plans.len());
        for plan in plans {
            let members: Vec<SemanticConcept> =
                plan.members.iter().filter_map(|id| self.concepts.get(id)).cloned().collect();
            let Some(primary) = self.concepts.get(&plan.primary) else {
                continue;
            };
            let mut in_group = group_labels(&members);
            in_group.insert(primary.key());

            let gained: f32 = members.iter().map(|m| m.comprehension).sum::<f32>() * policy.merge_comprehension_share;
            let folded: Vec<ConceptRelation> = members
                .iter()
                .flat_map(|m| m.relations.iter())
                .filter(|r| !in_group.contains(&r.key()))
                .cloned()
                .collect();

            if let Some(primary) = self.concepts.get_mut(&plan.primary) {
                primary.comprehension = reinforce(primary.comprehension, gained);
                for relation in folded {
                    match primary.relations.iter_mut().find(|r| r.key() == relation.key()) {
                        Some(existing) => existing.strength = existing.strength.max(relation.strength),
                        None => primary.relations.push(relation),
                    }
                }
            }
            for member in &members {
                self.remove_concept(member.id, MemoryEventKind::Merged);
            }
            let into = self.concepts.get(&plan.primary).map(|c| c.concept.clone()).unwrap_or_default();
            merged.push(MergeGroup {
                into,
                into_id: plan.primary,
                merged: members.into_iter().map(|m| m.concept).collect(),
            });
        }

        let mut pruned = Vec::new();
        let dead = prune_candidates(&self.concepts(), now, &policy);
        for id in dead {
            if let Some(concept) = self.remove_concept(id, MemoryEventKind::Pruned) {
                pruned.push(concept.concept);
            }
        }

        let record = CompressionRecord {
            at: now,
            before,
            after: self.concepts.len(),
            merged,
            pruned,
        };
        info!(
            before = record.before,
            after = record.after,
            groups = record.merged.len(),
            pruned = record.pruned.len(),
            "knowledge compression complete"
        );
        if self.compression_log.len() == COMPRESSION_LOG_CAPACITY {
            self.compression_log.pop_front();
        }
        self.compression_log.push_back(record.clone());
        record
    }

    // ── export / import ──────────────────────────────────────────────────────

    /// Full state, concepts in insertion order.
    pub fn export(&self) -> SemanticSnapshot {
        let mut concepts: Vec<&SemanticConcept> = self.concepts.values().collect();
        concepts.sort_by_key(|c| c.seq);
        SemanticSnapshot {
            store: StoreSnapshot {
                entries: concepts.into_iter().map(|c| (c.id, c.clone())).collect(),
                config: self.config.clone(),
                recent_events: self.events.to_vec(),
                last_maintenance_tick: self.gate.last_run(),
            },
            compression_log: self.compression_log(),
            last_compression_tick: self.compression_gate.last_run(),
        }
    }

    pub fn to_json(&self) -> Result<String, MemoryError> {
        Ok(serde_json::to_string(&self.export())?)
    }

    /// Rebuild a store from a snapshot, re-deriving the label and source
    /// indices.  A later entry whose label collides with an earlier one is
    /// dropped.
    pub fn from_snapshot(snapshot: SemanticSnapshot, clock: Arc<dyn Clock>) -> Result<Self, MemoryError> {
        let SemanticSnapshot {
            store: inner,
            compression_log,
            last_compression_tick,
        } = snapshot;
        let mut store = Self::with_clock(inner.config, clock)?;
        store.gate = MaintenanceGate::resume(store.config.maintenance_interval_ticks, inner.last_maintenance_tick);
        store.compression_gate = MaintenanceGate::resume(
            store.config.compression_interval_ticks,
            last_compression_tick.or(Some(0)),
        );
        store.events = EventLog::from_events(inner.recent_events, EVENT_LOG_CAPACITY);
        let skip = compression_log.len().saturating_sub(COMPRESSION_LOG_CAPACITY);
        store.compression_log = compression_log.into_iter().skip(skip).collect();

        for (id, mut concept) in inner.entries {
            if store.id_of(&concept.concept).is_some() {
                continue;
            }
            concept.id = id;
            concept.seq = store.next_seq;
            concept.comprehension = clamp_unit(concept.comprehension);
            concept.interest_level = clamp_unit(concept.interest_level);
            for relation in &mut concept.relations {
                relation.strength = clamp_unit(relation.strength);
            }
            store.next_seq += 1;
            store.insert(concept);
        }
        Ok(store)
    }

    /// Parse a JSON snapshot and rebuild the store from it.
    pub fn from_json(json: &str, clock: Arc<dyn Clock>) -> Result<Self, MemoryError> {
        let snapshot: SemanticSnapshot = serde_json::from_str(json)?;
        Self::from_snapshot(snapshot, clock)
    }
}

fn rank(
    mut hits: Vec<(&SemanticConcept, f32, Vec<MatchCriterion>)>,
    limit: usize,
) -> Vec<SearchResult<SemanticConcept>> {
    hits.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.seq.cmp(&b.0.seq)));
    hits.into_iter()
        .take(limit)
        .map(|(concept, score, criteria)| SearchResult {
            item: concept.clone(),
            relevance_score: score,
            matched_criteria: criteria,
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
