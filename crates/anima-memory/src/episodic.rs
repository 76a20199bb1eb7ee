//! Episodic Memory Store.
//!
//! Holds records of discrete experienced events.  Every record carries its
//! emotion tags and intensity, an importance computed once at formation, and
//! a retention strength that decays with time and rises on recall.
//!
//! # Indices
//!
//! Besides the primary `id → record` map the store keeps three
//! [`AssociationIndex`]es:
//!
//! | index       | key                          |
//! |-------------|------------------------------|
//! | by emotion  | normalised emotion tag       |
//! | by concept  | normalised related-concept   |
//! | by day      | `YYYY-MM-DD` of the timestamp (UTC) |
//!
//! # Associations
//!
//! On formation each existing record that shares tags or concepts with the
//! new one is scored (`+0.3` per shared tag, `+0.5` per shared concept by
//! default).  Candidates at or above the association threshold are linked
//! symmetrically: `A.related_memories ∋ B ⇔ B.related_memories ∋ A` holds at
//! all times, including across deletion.
//!
//! # Example
//!
//! ```rust
//! use anima_memory::episodic::{EpisodeRequest, EpisodicConfig, EpisodicStore};
//!
//! let mut store = EpisodicStore::new(EpisodicConfig::default()).unwrap();
//!
//! let first = store.form_with(
//!     EpisodeRequest::new("Saw a shooting star over the lake", "shooting star")
//!         .with_emotions(["wonder"])
//!         .with_intensity(0.9)
//!         .with_concepts(["star"]),
//! );
//! let second = store.form_with(
//!     EpisodeRequest::new("Read about stars in a book", "star book")
//!         .with_emotions(["joy"])
//!         .with_intensity(0.4)
//!         .with_concepts(["star"]),
//! );
//!
//! // A shared concept is enough to associate the two.
//! assert!(second.related_memories.contains(&first.id));
//!
//! let hits = store.search_by_concept("star", 10);
//! assert_eq!(hits[0].item.id, first.id);
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use anima_types::{Clock, MatchCriterion, MemoryError, MemoryEventKind, SearchResult, SystemClock};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rand::SeedableRng;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::index::{AssociationIndex, normalize_key, tokenize};
use crate::retention::{
    EvictionCandidate, MaintenanceGate, MaintenanceReport, clamp_unit, days_between, episodic_decay, reinforce,
    select_victims,
};
use crate::snapshot::{EVENT_LOG_CAPACITY, EventLog, StoreSnapshot};

/// Serialised form of an [`EpisodicStore`].
pub type EpisodicSnapshot = StoreSnapshot<EpisodicRecord, EpisodicConfig>;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Tuning for the episodic retention policy.
///
/// Every field has a default, so a partial TOML/JSON document deserialises.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodicConfig {
    /// Capacity ceiling; exceeding it after a write triggers eviction.
    pub max_memories: usize,
    /// Retention lost per day without recall, before emotional resistance.
    pub base_forget_rate: f32,
    /// How much emotional intensity resists forgetting (0 = none, 1 = full).
    pub retention_bonus_factor: f32,
    /// Retention regained on every recall.
    pub recall_reinforcement: f32,
    /// Records below this retention are invisible and get deleted.
    pub deletion_threshold: f32,
    /// Minimum score for two records to become associated.
    pub association_threshold: f32,
    /// Association score added per shared emotion tag.
    pub shared_emotion_weight: f32,
    /// Association score added per shared concept.
    pub shared_concept_weight: f32,
    /// Maintenance runs at most once per this many ticks.
    pub maintenance_interval_ticks: u64,
    /// Weight multiplier for records carrying the preferred emotion in
    /// [`EpisodicStore::recall_random`].
    pub preferred_emotion_multiplier: f32,
    /// Importance multiplier per emotion tag; unlisted tags weigh 1.0.
    pub emotion_weights: BTreeMap<String, f32>,
}

impl Default for EpisodicConfig {
    fn default() -> Self {
        let emotion_weights = [
            ("fear", 1.5),
            ("nostalgia", 1.4),
            ("wonder", 1.3),
            ("warmth", 1.3),
            ("joy", 1.2),
        ]
        .into_iter()
        .map(|(tag, weight)| (tag.to_string(), weight))
        .collect();

        Self {
            max_memories: 1000,
            base_forget_rate: 0.05,
            retention_bonus_factor: 0.5,
            recall_reinforcement: 0.1,
            deletion_threshold: 0.1,
            association_threshold: 0.4,
            shared_emotion_weight: 0.3,
            shared_concept_weight: 0.5,
            maintenance_interval_ticks: 100,
            preferred_emotion_multiplier: 3.0,
            emotion_weights,
        }
    }
}

impl EpisodicConfig {
    /// Reject values outside their documented ranges.
    pub fn validate(&self) -> Result<(), MemoryError> {
        if self.max_memories == 0 {
            return Err(MemoryError::InvalidConfig("episodic.max_memories must be > 0".into()));
        }
        let unit_fields = [
            ("retention_bonus_factor", self.retention_bonus_factor),
            ("recall_reinforcement", self.recall_reinforcement),
            ("deletion_threshold", self.deletion_threshold),
        ];
        for (name, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(MemoryError::InvalidConfig(format!("episodic.{name} must be in [0, 1], got {value}")));
            }
        }
        let non_negative = [
            ("base_forget_rate", self.base_forget_rate),
            ("association_threshold", self.association_threshold),
            ("shared_emotion_weight", self.shared_emotion_weight),
            ("shared_concept_weight", self.shared_concept_weight),
            ("preferred_emotion_multiplier", self.preferred_emotion_multiplier),
        ];
        for (name, value) in non_negative {
            if value.is_nan() || value < 0.0 {
                return Err(MemoryError::InvalidConfig(format!("episodic.{name} must be >= 0, got {value}")));
            }
        }
        if let Some((tag, weight)) = self.emotion_weights.iter().find(|(_, w)| w.is_nan() || **w < 0.0) {
            return Err(MemoryError::InvalidConfig(format!("emotion weight for '{tag}' must be >= 0, got {weight}")));
        }
        Ok(())
    }

    /// Multiplier for a single emotion tag.
    ///
    /// Tags and weight keys compare after trimming and lower-casing, so a
    /// configured `Fear` applies to a `fear` tag.
    pub fn emotion_weight(&self, tag: &str) -> f32 {
        let key = normalize_key(tag);
        self.emotion_weights
            .get(&key)
            .or_else(|| {
                self.emotion_weights
                    .iter()
                    .find(|(k, _)| normalize_key(k) == key)
                    .map(|(_, w)| w)
            })
            .copied()
            .unwrap_or(1.0)
    }

    /// Rewrite `emotion_weights` keys into their trimmed, lower-cased form.
    ///
    /// Keys that collide after normalising keep the weight of the one that
    /// is already lower-case, otherwise the last in key order.
    pub fn normalize_emotion_weights(&mut self) {
        let mut normalized = BTreeMap::new();
        for (tag, weight) in std::mem::take(&mut self.emotion_weights) {
            let key = normalize_key(&tag);
            if key.is_empty() {
                continue;
            }
            if tag == key || !normalized.contains_key(&key) {
                normalized.insert(key, weight);
            }
        }
        self.emotion_weights = normalized;
    }

    /// Importance of an episode: mean tag weight × intensity, capped at 1.
    ///
    /// An untagged episode uses the neutral weight 1.0.
    pub fn importance_of(&self, tags: &[String], intensity: f32) -> f32 {
        let mean_weight = if tags.is_empty() {
            1.0
        } else {
            tags.iter().map(|t| self.emotion_weight(t)).sum::<f32>() / tags.len() as f32
        };
        clamp_unit(mean_weight * clamp_unit(intensity))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EpisodicRecord
// ─────────────────────────────────────────────────────────────────────────────

/// A single remembered event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicRecord {
    pub id: Uuid,
    /// Full free-text body.
    pub content: String,
    pub summary: String,
    /// Labels of semantic concepts this episode touches (opaque strings).
    pub related_concepts: Vec<String>,
    /// When the episode was formed.
    pub timestamp: DateTime<Utc>,
    /// How long the episode lasted, in seconds.
    pub duration_secs: u64,
    pub emotion_tags: Vec<String>,
    /// Emotional intensity in `[0, 1]`.
    pub emotional_intensity: f32,
    /// Fixed at formation.
    pub importance: f32,
    /// Current retention in `[0, 1]`; starts at 1.0.
    pub retention_strength: f32,
    pub recall_count: u32,
    /// Decay is measured from here, or from `timestamp` before the first recall.
    pub last_recalled: Option<DateTime<Utc>>,
    /// Other episodic records this one is associated with (symmetric).
    pub related_memories: Vec<Uuid>,
    #[serde(skip)]
    seq: u64,
}

impl EpisodicRecord {
    /// Time elapsed since formation.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.timestamp
    }

    /// Point from which forgetting is measured: last recall, else formation.
    fn decay_anchor(&self) -> DateTime<Utc> {
        self.last_recalled.unwrap_or(self.timestamp)
    }

    fn relevance(&self) -> f32 {
        self.retention_strength * self.importance
    }

    fn day_bucket(&self) -> String {
        day_key(self.timestamp.date_naive())
    }

    fn has_tag(&self, tag: &str) -> bool {
        let tag = normalize_key(tag);
        self.emotion_tags.iter().any(|t| normalize_key(t) == tag)
    }
}

fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Requests and options
// ─────────────────────────────────────────────────────────────────────────────

/// Everything needed to form an episode.  Optional parts default to empty.
#[derive(Debug, Clone, Default)]
pub struct EpisodeRequest {
    pub content: String,
    pub summary: String,
    pub emotion_tags: Vec<String>,
    pub emotional_intensity: f32,
    pub related_concepts: Vec<String>,
    pub duration_secs: u64,
}

impl EpisodeRequest {
    /// An untagged request with zero intensity.
    pub fn new(content: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            summary: summary.into(),
            ..Self::default()
        }
    }

    pub fn with_emotions<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.emotion_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Clamped into `[0, 1]` at formation.
    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.emotional_intensity = intensity;
        self
    }

    pub fn with_concepts<I, S>(mut self, concepts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.related_concepts = concepts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_duration_secs(mut self, secs: u64) -> Self {
        self.duration_secs = secs;
        self
    }
}

/// Filters for [`EpisodicStore::recall_random`].
#[derive(Debug, Clone, Default)]
pub struct RandomRecallOptions {
    /// Records carrying this tag get their weight multiplied.
    pub preferred_emotion: Option<String>,
    /// Skip records below this importance.
    pub min_importance: f32,
}

/// Point-in-time summary of the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpisodicStats {
    /// Visible records.
    pub total: usize,
    pub average_retention: f32,
    pub average_importance: f32,
    /// Number of live records per emotion tag.
    pub emotion_distribution: BTreeMap<String, usize>,
    pub total_recalls: u64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// EpisodicStore
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory store of episodic records with decay, reinforcement, bounded
/// capacity and symmetric associations.
pub struct EpisodicStore {
    config: EpisodicConfig,
    records: HashMap<Uuid, EpisodicRecord>,
    by_emotion: AssociationIndex<Uuid>,
    by_concept: AssociationIndex<Uuid>,
    by_day: AssociationIndex<Uuid>,
    gate: MaintenanceGate,
    events: EventLog,
    next_seq: u64,
    clock: Arc<dyn Clock>,
    rng: StdRng,
}

impl EpisodicStore {
    /// Create an empty store on wall-clock time.
    pub fn new(config: EpisodicConfig) -> Result<Self, MemoryError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create an empty store reading time from `clock`.
    pub fn with_clock(mut config: EpisodicConfig, clock: Arc<dyn Clock>) -> Result<Self, MemoryError> {
        config.validate()?;
        config.normalize_emotion_weights();
        Ok(Self {
            gate: MaintenanceGate::new(config.maintenance_interval_ticks),
            config,
            records: HashMap::new(),
            by_emotion: AssociationIndex::new(),
            by_concept: AssociationIndex::new(),
            by_day: AssociationIndex::new(),
            events: EventLog::new(EVENT_LOG_CAPACITY),
            next_seq: 0,
            clock,
            rng: StdRng::from_entropy(),
        })
    }

    /// Make random recall reproducible.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn config(&self) -> &EpisodicConfig {
        &self.config
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn is_visible(&self, record: &EpisodicRecord) -> bool {
        record.retention_strength >= self.config.deletion_threshold
    }

    // ── writes ───────────────────────────────────────────────────────────────

    /// Form an episode from the four required parts.
    pub fn form(&mut self, content: &str, summary: &str, emotion_tags: &[&str], emotional_intensity: f32) -> EpisodicRecord {
        self.form_with(
            EpisodeRequest::new(content, summary)
                .with_emotions(emotion_tags.iter().copied())
                .with_intensity(emotional_intensity),
        )
    }

    /// Form an episode, index it, discover associations and enforce the
    /// capacity ceiling.
    ///
    /// The newly formed record is never chosen as an eviction victim by the
    /// capacity pass it triggers.
    pub fn form_with(&mut self, request: EpisodeRequest) -> EpisodicRecord {
        let now = self.clock.now();
        let emotion_tags = clean_labels(request.emotion_tags);
        let related_concepts = clean_labels(request.related_concepts);
        let emotional_intensity = clamp_unit(request.emotional_intensity);
        let importance = self.config.importance_of(&emotion_tags, emotional_intensity);

        let record = EpisodicRecord {
            id: Uuid::new_v4(),
            content: request.content,
            summary: request.summary,
            related_concepts,
            timestamp: now,
            duration_secs: request.duration_secs,
            emotion_tags,
            emotional_intensity,
            importance,
            retention_strength: 1.0,
            recall_count: 0,
            last_recalled: None,
            related_memories: Vec::new(),
            seq: self.next_seq,
        };
        self.next_seq += 1;
        let id = record.id;

        debug!(id = %id, importance, tags = ?record.emotion_tags, "forming episodic memory");
        self.events.record(now, MemoryEventKind::Formed, id, &record.summary);
        self.insert(record.clone());
        self.discover_associations(id);
        self.enforce_capacity(Some(id));

        self.records.get(&id).cloned().unwrap_or(record)
    }

    fn insert(&mut self, record: EpisodicRecord) {
        let id = record.id;
        for tag in &record.emotion_tags {
            self.by_emotion.insert(tag, id);
        }
        for concept in &record.related_concepts {
            self.by_concept.insert(concept, id);
        }
        self.by_day.insert(&record.day_bucket(), id);
        self.records.insert(id, record);
    }

    fn discover_associations(&mut self, id: Uuid) {
        let Some(record) = self.records.get(&id) else {
            return;
        };
        let tags: HashSet<String> = record.emotion_tags.iter().map(|t| normalize_key(t)).collect();
        let concepts: HashSet<String> = record.related_concepts.iter().map(|c| normalize_key(c)).collect();

        let mut candidates: HashSet<Uuid> = HashSet::new();
        for tag in &tags {
            candidates.extend(self.by_emotion.get(tag));
        }
        for concept in &concepts {
            candidates.extend(self.by_concept.get(concept));
        }
        candidates.remove(&id);

        let mut ordered: Vec<&EpisodicRecord> = candidates.iter().filter_map(|c| self.records.get(c)).collect();
        ordered.sort_by_key(|r| r.seq);

        let threshold = self.config.association_threshold;
        let links: Vec<Uuid> = ordered
            .into_iter()
            .filter(|other| {
                let shared_tags = other.emotion_tags.iter().filter(|t| tags.contains(&normalize_key(t))).count();
                let shared_concepts = other
                    .related_concepts
                    .iter()
                    .filter(|c| concepts.contains(&normalize_key(c)))
                    .count();
                let score = self.config.shared_emotion_weight * shared_tags as f32
                    + self.config.shared_concept_weight * shared_concepts as f32;
                score >= threshold
            })
            .map(|other| other.id)
            .collect();

        let now = self.clock.now();
        for other in links {
            self.link(id, other);
            self.events.record(now, MemoryEventKind::Associated, other, &id.to_string());
        }
    }

    /// Add `a ↔ b` to both relation lists.
    fn link(&mut self, a: Uuid, b: Uuid) {
        if a == b || !self.records.contains_key(&a) || !self.records.contains_key(&b) {
            return;
        }
        for (from, to) in [(a, b), (b, a)] {
            if let Some(record) = self.records.get_mut(&from) {
                if !record.related_memories.contains(&to) {
                    record.related_memories.push(to);
                }
            }
        }
    }

    fn enforce_capacity(&mut self, protect: Option<Uuid>) {
        if self.records.len() <= self.config.max_memories {
            return;
        }
        let excess = self.records.len() - self.config.max_memories;
        let candidates = self
            .records
            .values()
            .filter(|r| Some(r.id) != protect)
            .map(|r| EvictionCandidate {
                id: r.id,
                score: r.relevance(),
                created_at: r.timestamp,
                seq: r.seq,
            })
            .collect();
        let victims = select_victims(candidates, excess);
        debug!(excess, victims = victims.len(), "episodic store over capacity");
        for victim in victims {
            self.remove_record(victim, MemoryEventKind::Evicted);
        }
    }

    /// Delete a record, its index entries and every back-reference to it.
    fn remove_record(&mut self, id: Uuid, reason: MemoryEventKind) -> Option<EpisodicRecord> {
        let record = self.records.remove(&id)?;
        for tag in &record.emotion_tags {
            self.by_emotion.remove(tag, &id);
        }
        for concept in &record.related_concepts {
            self.by_concept.remove(concept, &id);
        }
        self.by_day.remove(&record.day_bucket(), &id);
        for other in &record.related_memories {
            if let Some(other) = self.records.get_mut(other) {
                other.related_memories.retain(|r| *r != id);
            }
        }
        self.events.record(self.clock.now(), reason, id, &record.summary);
        Some(record)
    }

    // ── recall ───────────────────────────────────────────────────────────────

    /// Recall a record: reinforce retention, bump the recall count and stamp
    /// the recall time.
    ///
    /// Returns `None` when the id is unknown or the record has faded below
    /// the deletion threshold.
    pub fn recall(&mut self, id: &Uuid) -> Option<EpisodicRecord> {
        let now = self.clock.now();
        let threshold = self.config.deletion_threshold;
        let amount = self.config.recall_reinforcement;
        let record = self.records.get_mut(id).filter(|r| r.retention_strength >= threshold)?;
        record.retention_strength = reinforce(record.retention_strength, amount);
        record.recall_count += 1;
        record.last_recalled = Some(now);
        let snapshot = record.clone();
        self.events.record(now, MemoryEventKind::Recalled, snapshot.id, &snapshot.summary);
        Some(snapshot)
    }

    /// Weighted random recall over all live records.
    ///
    /// Weight is the record's importance, multiplied by
    /// `preferred_emotion_multiplier` when it carries the preferred tag.  When
    /// every weight is zero the draw is uniform.  The drawn record is recalled.
    pub fn recall_random(&mut self, options: &RandomRecallOptions) -> Option<EpisodicRecord> {
        let mut candidates: Vec<&EpisodicRecord> = self
            .records
            .values()
            .filter(|r| self.is_visible(r) && r.importance >= options.min_importance)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        candidates.sort_by_key(|r| r.seq);

        let weights: Vec<f32> = candidates
            .iter()
            .map(|r| match &options.preferred_emotion {
                Some(tag) if r.has_tag(tag) => r.importance * self.config.preferred_emotion_multiplier,
                _ => r.importance,
            })
            .collect();
        let ids: Vec<Uuid> = candidates.iter().map(|r| r.id).collect();

        let pick = match WeightedIndex::new(&weights) {
            Ok(dist) => dist.sample(&mut self.rng),
            Err(_) => self.rng.gen_range(0..ids.len()),
        };
        self.recall(&ids[pick])
    }

    // ── queries ──────────────────────────────────────────────────────────────

    /// Look at a record without recalling it.
    pub fn get(&self, id: &Uuid) -> Option<&EpisodicRecord> {
        self.records.get(id).filter(|r| self.is_visible(r))
    }

    /// Records tagged with `emotion`, ranked by retention × importance.
    pub fn search_by_emotion(&self, emotion: &str, limit: usize) -> Vec<SearchResult<EpisodicRecord>> {
        let criterion = MatchCriterion::EmotionTag(normalize_key(emotion));
        self.rank_indexed(self.by_emotion.get(emotion), criterion, limit)
    }

    /// Records related to `concept`, ranked by retention × importance.
    pub fn search_by_concept(&self, concept: &str, limit: usize) -> Vec<SearchResult<EpisodicRecord>> {
        let criterion = MatchCriterion::Concept(normalize_key(concept));
        self.rank_indexed(self.by_concept.get(concept), criterion, limit)
    }

    fn rank_indexed(&self, ids: Vec<Uuid>, criterion: MatchCriterion, limit: usize) -> Vec<SearchResult<EpisodicRecord>> {
        let hits = ids
            .iter()
            .filter_map(|id| self.records.get(id))
            .filter(|r| self.is_visible(r))
            .map(|r| (r, r.relevance(), vec![criterion.clone()]))
            .collect();
        rank(hits, limit)
    }

    /// Free-text search over content, summary and concept labels.
    ///
    /// Each query token found in the content scores `0.3`, in the summary
    /// `0.4`; each concept label matched by any token scores `0.5`.  The sum
    /// is scaled by retention × importance.
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchResult<EpisodicRecord>> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Vec::new();
        }

        let hits = self
            .records
            .values()
            .filter(|r| self.is_visible(r))
            .filter_map(|r| {
                let content = r.content.to_lowercase();
                let summary = r.summary.to_lowercase();
                let mut score = 0.0;
                let mut criteria = Vec::new();
                for token in &tokens {
                    if content.contains(token.as_str()) {
                        score += 0.3;
                        criteria.push(MatchCriterion::Content(token.clone()));
                    }
                    if summary.contains(token.as_str()) {
                        score += 0.4;
                        criteria.push(MatchCriterion::Summary(token.clone()));
                    }
                }
                for concept in &r.related_concepts {
                    let label = normalize_key(concept);
                    if tokens.iter().any(|t| label.contains(t.as_str())) {
                        score += 0.5;
                        criteria.push(MatchCriterion::Concept(label));
                    }
                }
                (!criteria.is_empty()).then(|| (r, score * r.relevance(), criteria))
            })
            .collect();
        rank(hits, limit)
    }

    /// Live records formed on `date` (UTC), oldest first.
    pub fn get_by_day(&self, date: NaiveDate, limit: usize) -> Vec<&EpisodicRecord> {
        let mut records: Vec<&EpisodicRecord> = self
            .by_day
            .get(&day_key(date))
            .iter()
            .filter_map(|id| self.get(id))
            .collect();
        records.sort_by_key(|r| (r.timestamp, r.seq));
        records.truncate(limit);
        records
    }

    /// Live records associated with `id`.
    pub fn get_related(&self, id: &Uuid) -> Vec<&EpisodicRecord> {
        self.get(id)
            .map(|r| r.related_memories.iter().filter_map(|other| self.get(other)).collect())
            .unwrap_or_default()
    }

    /// The `limit` most recently formed live records, newest first.
    pub fn get_recent(&self, limit: usize) -> Vec<&EpisodicRecord> {
        let mut records: Vec<&EpisodicRecord> = self.records.values().filter(|r| self.is_visible(r)).collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.seq.cmp(&a.seq)));
        records.truncate(limit);
        records
    }

    /// Aggregates over the visible records.
    pub fn stats(&self) -> EpisodicStats {
        let live: Vec<&EpisodicRecord> = self.records.values().filter(|r| self.is_visible(r)).collect();
        if live.is_empty() {
            return EpisodicStats::default();
        }
        let n = live.len() as f32;
        let mut emotion_distribution = BTreeMap::new();
        for record in &live {
            for tag in &record.emotion_tags {
                *emotion_distribution.entry(normalize_key(tag)).or_insert(0) += 1;
            }
        }
        EpisodicStats {
            total: live.len(),
            average_retention: live.iter().map(|r| r.retention_strength).sum::<f32>() / n,
            average_importance: live.iter().map(|r| r.importance).sum::<f32>() / n,
            emotion_distribution,
            total_recalls: live.iter().map(|r| u64::from(r.recall_count)).sum(),
            oldest: live.iter().map(|r| r.timestamp).min(),
            newest: live.iter().map(|r| r.timestamp).max(),
        }
    }

    /// Up to `limit` recent store events, newest first.
    pub fn recent_events(&self, limit: usize) -> Vec<anima_types::MemoryEvent> {
        self.events.recent(limit)
    }

    // ── maintenance ──────────────────────────────────────────────────────────

    /// Decay every record and delete those that fall below the deletion
    /// threshold.
    ///
    /// Rate-limited: returns `None` without touching anything when fewer than
    /// `maintenance_interval_ticks` ticks have passed since the last run.
    pub fn perform_maintenance(&mut self, current_tick: u64) -> Option<MaintenanceReport> {
        if !self.gate.try_run(current_tick) {
            return None;
        }
        let now = self.clock.now();
        let mut report = MaintenanceReport {
            tick: current_tick,
            examined: self.records.len(),
            ..MaintenanceReport::default()
        };

        let mut doomed = Vec::new();
        for record in self.records.values_mut() {
            let days = days_between(record.decay_anchor(), now);
            let delta = episodic_decay(
                self.config.base_forget_rate,
                record.emotional_intensity,
                self.config.retention_bonus_factor,
                days,
            );
            if delta > 0.0 {
                record.retention_strength = clamp_unit(record.retention_strength - delta);
                report.decayed += 1;
            }
            if record.retention_strength < self.config.deletion_threshold {
                doomed.push((record.seq, record.id));
            }
        }
        doomed.sort();
        for (_, id) in doomed {
            if self.remove_record(id, MemoryEventKind::Forgotten).is_some() {
                report.removed.push(id);
            }
        }

        info!(
            tick = current_tick,
            decayed = report.decayed,
            removed = report.removed.len(),
            remaining = self.records.len(),
            "episodic maintenance complete"
        );
        Some(report)
    }

    // ── export / import ──────────────────────────────────────────────────────

    /// Full-state export.  Indices are not included.
    pub fn export(&self) -> EpisodicSnapshot {
        let mut records: Vec<&EpisodicRecord> = self.records.values().collect();
        records.sort_by_key(|r| r.seq);
        StoreSnapshot {
            entries: records.into_iter().map(|r| (r.id, r.clone())).collect(),
            config: self.config.clone(),
            recent_events: self.events.to_vec(),
            last_maintenance_tick: self.gate.last_run(),
        }
    }

    pub fn to_json(&self) -> Result<String, MemoryError> {
        Ok(serde_json::to_string(&self.export())?)
    }

    /// Rebuild a store from a snapshot, re-deriving every index.
    ///
    /// Relations pointing at records missing from the snapshot are dropped
    /// and one-sided relations are completed, so the symmetry invariant holds
    /// after import.
    pub fn from_snapshot(snapshot: EpisodicSnapshot, clock: Arc<dyn Clock>) -> Result<Self, MemoryError> {
        let mut store = Self::with_clock(snapshot.config, clock)?;
        store.gate = MaintenanceGate::resume(store.config.maintenance_interval_ticks, snapshot.last_maintenance_tick);
        store.events = EventLog::from_events(snapshot.recent_events, EVENT_LOG_CAPACITY);

        for (id, mut record) in snapshot.entries {
            if store.records.contains_key(&id) {
                warn!(%id, "duplicate episodic record in snapshot; keeping the first");
                continue;
            }
            record.id = id;
            record.seq = store.next_seq;
            record.retention_strength = clamp_unit(record.retention_strength);
            record.emotional_intensity = clamp_unit(record.emotional_intensity);
            record.importance = clamp_unit(record.importance);
            store.next_seq += 1;
            store.insert(record);
        }

        let pairs: Vec<(Uuid, Uuid)> = store
            .records
            .values()
            .flat_map(|r| r.related_memories.iter().map(move |other| (r.id, *other)))
            .collect();
        for record in store.records.values_mut() {
            record.related_memories.clear();
        }
        for (a, b) in pairs {
            store.link(a, b);
        }
        Ok(store)
    }

    /// Parse a JSON snapshot and rebuild the store from it.
    pub fn from_json(json: &str, clock: Arc<dyn Clock>) -> Result<Self, MemoryError> {
        let snapshot: EpisodicSnapshot = serde_json::from_str(json)?;
        Self::from_snapshot(snapshot, clock)
    }
}

/// Trim labels and drop blanks and case-insensitive duplicates, keeping order.
fn clean_labels(labels: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    labels
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty() && seen.insert(normalize_key(l)))
        .collect()
}

/// Sort by score (desc) with insertion order as the stable tie-break.
fn rank(
    mut hits: Vec<(&EpisodicRecord, f32, Vec<MatchCriterion>)>,
    limit: usize,
) -> Vec<SearchResult<EpisodicRecord>> {
    hits.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.seq.cmp(&b.0.seq)));
    hits.into_iter()
        .take(limit)
        .map(|(record, score, criteria)| SearchResult {
            item: record.clone(),
            relevance_score: score,
            matched_criteria: criteria,
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use anima_types::ManualClock;

    fn store_with(config: EpisodicConfig) -> (EpisodicStore, ManualClock) {
        let clock = ManualClock::default();
        let store = EpisodicStore::with_clock(config, Arc::new(clock.clone()))
            .unwrap()
            .with_rng_seed(7);
        (store, clock)
    }

    fn store() -> (EpisodicStore, ManualClock) {
        store_with(EpisodicConfig::default())
    }

    fn episode(summary: &str, tags: &[&str], intensity: f32, concepts: &[&str]) -> EpisodeRequest {
        EpisodeRequest::new(format!("{summary} (full)"), summary)
            .with_emotions(tags.iter().copied())
            .with_intensity(intensity)
            .with_concepts(concepts.iter().copied())
    }

    fn assert_symmetric(store: &EpisodicStore) {
        for record in store.records.values() {
            for other in &record.related_memories {
                let other = store.records.get(other).expect("relation points at a live record");
                assert!(other.related_memories.contains(&record.id), "relation is one-sided");
            }
        }
    }

    fn assert_indices_consistent(store: &EpisodicStore) {
        for key in store.by_emotion.keys() {
            for id in store.by_emotion.get(key) {
                assert!(store.records.contains_key(&id));
            }
        }
        for key in store.by_concept.keys() {
            for id in store.by_concept.get(key) {
                assert!(store.records.contains_key(&id));
            }
        }
        for record in store.records.values() {
            assert!(store.by_day.contains(&record.day_bucket(), &record.id));
            for tag in &record.emotion_tags {
                assert!(store.by_emotion.contains(tag, &record.id));
            }
        }
    }

    // ── importance ───────────────────────────────────────────────────────────

    #[test]
    fn joy_importance_matches_weight_times_intensity() {
        let (mut store, _) = store();
        let record = store.form("picnic", "picnic", &["joy"], 0.8);
        assert!((record.importance - 0.96).abs() < 1e-5);
    }

    #[test]
    fn importance_is_capped_at_one() {
        let (mut store, _) = store();
        let record = store.form("bear", "bear", &["fear"], 0.9);
        assert_eq!(record.importance, 1.0);
    }

    #[test]
    fn importance_averages_tag_weights() {
        let config = EpisodicConfig::default();
        let tags = vec!["fear".to_string(), "boredom".to_string()];
        // (1.5 + 1.0) / 2 × 0.4 = 0.5
        assert!((config.importance_of(&tags, 0.4) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn untagged_importance_is_intensity() {
        let config = EpisodicConfig::default();
        assert!((config.importance_of(&[], 0.3) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn intensity_is_clamped() {
        let (mut store, _) = store();
        let record = store.form("x", "x", &[], 4.0);
        assert_eq!(record.emotional_intensity, 1.0);
    }

    // ── recall ───────────────────────────────────────────────────────────────

    #[test]
    fn recall_of_fresh_record_only_bumps_bookkeeping() {
        let (mut store, _) = store();
        let record = store.form("picnic", "picnic", &["joy"], 0.8);
        let recalled = store.recall(&record.id).unwrap();
        assert_eq!(recalled.retention_strength, 1.0);
        assert_eq!(recalled.recall_count, 1);
        assert!(recalled.last_recalled.is_some());
    }

    #[test]
    fn recall_unknown_id_is_none() {
        let (mut store, _) = store();
        assert!(store.recall(&Uuid::new_v4()).is_none());
    }

    #[test]
    fn recall_reinforces_decayed_record() {
        let (mut store, clock) = store();
        let record = store.form("walk", "walk", &[], 0.0);
        clock.advance_days(4);
        store.perform_maintenance(0).unwrap();
        let before = store.get(&record.id).unwrap().retention_strength;
        let after = store.recall(&record.id).unwrap().retention_strength;
        assert!(after > before);
        assert!(after <= 1.0);
    }

    // ── associations ─────────────────────────────────────────────────────────

    #[test]
    fn shared_concept_creates_symmetric_link() {
        let (mut store, _) = store();
        let a = store.form_with(episode("a", &["joy"], 0.5, &["star"]));
        let b = store.form_with(episode("b", &["fear"], 0.5, &["Star"]));
        assert!(b.related_memories.contains(&a.id));
        assert!(store.get(&a.id).unwrap().related_memories.contains(&b.id));
        assert_symmetric(&store);
    }

    #[test]
    fn single_shared_tag_is_below_threshold() {
        let (mut store, _) = store();
        store.form_with(episode("a", &["joy"], 0.5, &[]));
        let b = store.form_with(episode("b", &["joy"], 0.5, &[]));
        assert!(b.related_memories.is_empty());
    }

    #[test]
    fn two_shared_tags_reach_threshold() {
        let (mut store, _) = store();
        let a = store.form_with(episode("a", &["joy", "wonder"], 0.5, &[]));
        let b = store.form_with(episode("b", &["wonder", "joy"], 0.5, &[]));
        assert_eq!(b.related_memories, vec![a.id]);
    }

    #[test]
    fn get_related_returns_live_partners() {
        let (mut store, _) = store();
        let a = store.form_with(episode("a", &[], 0.5, &["sea"]));
        let b = store.form_with(episode("b", &[], 0.5, &["sea"]));
        let related: Vec<Uuid> = store.get_related(&a.id).iter().map(|r| r.id).collect();
        assert_eq!(related, vec![b.id]);
    }

    // ── search ───────────────────────────────────────────────────────────────

    #[test]
    fn search_by_emotion_ranks_by_retention_times_importance() {
        let (mut store, _) = store();
        let weak = store.form("w", "w", &["joy"], 0.2);
        let strong = store.form("s", "s", &["joy"], 0.7);
        let hits = store.search_by_emotion("JOY", 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].item.id, strong.id);
        assert_eq!(hits[1].item.id, weak.id);
        assert_eq!(hits[0].matched_criteria, vec![MatchCriterion::EmotionTag("joy".into())]);
    }

    #[test]
    fn equal_scores_keep_insertion_order() {
        let (mut store, _) = store();
        let first = store.form("1", "1", &["calm"], 0.5);
        let second = store.form("2", "2", &["calm"], 0.5);
        let third = store.form("3", "3", &["calm"], 0.5);
        let ids: Vec<Uuid> = store.search_by_emotion("calm", 10).into_iter().map(|h| h.item.id).collect();
        assert_eq!(ids, vec![first.id, second.id, third.id]);
    }

    #[test]
    fn search_by_concept_respects_limit() {
        let (mut store, _) = store();
        for i in 0..5 {
            store.form_with(episode(&format!("m{i}"), &[], 0.5, &["moon"]));
        }
        assert_eq!(store.search_by_concept("moon", 3).len(), 3);
        assert!(store.search_by_concept("sun", 3).is_empty());
    }

    #[test]
    fn free_text_search_scores_summary_above_content() {
        let (mut store, _) = store();
        let in_content = store.form_with(EpisodeRequest::new("the river was cold", "a walk").with_intensity(0.5));
        let in_summary = store.form_with(EpisodeRequest::new("we walked", "river walk").with_intensity(0.5));
        let hits = store.search("river", 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].item.id, in_summary.id);
        assert_eq!(hits[1].item.id, in_content.id);
        assert!((hits[0].relevance_score - 0.4 * 0.5).abs() < 1e-5);
    }

    #[test]
    fn free_text_search_matches_concept_labels() {
        let (mut store, _) = store();
        let record = store.form_with(episode("night", &[], 1.0, &["星空"]));
        let hits = store.search("星空", 5);
        assert_eq!(hits[0].item.id, record.id);
        assert!(hits[0].matched_criteria.contains(&MatchCriterion::Concept("星空".into())));
    }

    #[test]
    fn blank_query_returns_nothing() {
        let (mut store, _) = store();
        store.form("x", "x", &[], 0.5);
        assert!(store.search("  ,. ", 5).is_empty());
    }

    // ── random recall ────────────────────────────────────────────────────────

    #[test]
    fn random_recall_on_empty_store_is_none() {
        let (mut store, _) = store();
        assert!(store.recall_random(&RandomRecallOptions::default()).is_none());
    }

    #[test]
    fn random_recall_counts_as_recall() {
        let (mut store, _) = store();
        let record = store.form("only", "only", &["joy"], 0.5);
        let drawn = store.recall_random(&RandomRecallOptions::default()).unwrap();
        assert_eq!(drawn.id, record.id);
        assert_eq!(drawn.recall_count, 1);
    }

    #[test]
    fn random_recall_with_zero_weights_is_uniform() {
        let (mut store, _) = store();
        store.form("a", "a", &[], 0.0);
        store.form("b", "b", &[], 0.0);
        assert!(store.recall_random(&RandomRecallOptions::default()).is_some());
    }

    #[test]
    fn random_recall_honours_min_importance() {
        let (mut store, _) = store();
        store.form("low", "low", &[], 0.1);
        let high = store.form("high", "high", &[], 0.9);
        let options = RandomRecallOptions {
            min_importance: 0.5,
            ..RandomRecallOptions::default()
        };
        for _ in 0..10 {
            assert_eq!(store.recall_random(&options).unwrap().id, high.id);
        }
    }

    #[test]
    fn preferred_emotion_dominates_draws() {
        let config = EpisodicConfig {
            preferred_emotion_multiplier: 1000.0,
            ..EpisodicConfig::default()
        };
        let (mut biased, _) = store_with(config);
        biased.form("plain", "plain", &["calm"], 0.5);
        let warm = biased.form("warm", "warm", &["warmth"], 0.5);
        let options = RandomRecallOptions {
            preferred_emotion: Some("warmth".into()),
            ..RandomRecallOptions::default()
        };
        let hits = (0..20)
            .filter(|_| biased.recall_random(&options).map(|r| r.id) == Some(warm.id))
            .count();
        assert!(hits >= 18, "preferred record drawn only {hits}/20 times");
    }

    // ── maintenance ──────────────────────────────────────────────────────────

    #[test]
    fn maintenance_is_rate_limited() {
        let (mut store, _) = store();
        assert!(store.perform_maintenance(0).is_some());
        assert!(store.perform_maintenance(50).is_none());
        assert!(store.perform_maintenance(100).is_some());
    }

    #[test]
    fn maintenance_never_increases_retention() {
        let (mut store, clock) = store();
        let ids: Vec<Uuid> = (0..4)
            .map(|i| store.form(&format!("{i}"), "x", &["joy"], i as f32 / 4.0).id)
            .collect();
        let mut tick = 0;
        for _ in 0..5 {
            let before: Vec<f32> = ids
                .iter()
                .map(|id| store.records.get(id).map_or(0.0, |r| r.retention_strength))
                .collect();
            clock.advance_days(1);
            store.perform_maintenance(tick);
            tick += 100;
            for (id, before) in ids.iter().zip(before) {
                let after = store.records.get(id).map_or(0.0, |r| r.retention_strength);
                assert!(after <= before);
                assert!((0.0..=1.0).contains(&after));
            }
        }
    }

    #[test]
    fn intense_records_outlast_neutral_ones() {
        let (mut store, clock) = store();
        let calm = store.form("calm", "calm", &[], 0.0);
        let vivid = store.form("vivid", "vivid", &["fear"], 1.0);
        clock.advance_days(10);
        store.perform_maintenance(0);
        let calm = store.records.get(&calm.id).unwrap().retention_strength;
        let vivid = store.records.get(&vivid.id).unwrap().retention_strength;
        // 1 − 0.05 × 10 = 0.5 versus 1 − 0.05 × 0.5 × 10 = 0.75
        assert!((calm - 0.5).abs() < 1e-4);
        assert!((vivid - 0.75).abs() < 1e-4);
    }

    #[test]
    fn faded_records_are_deleted_with_cascade() {
        let (mut store, clock) = store();
        let doomed = store.form_with(episode("doomed", &[], 0.0, &["lake"]));
        let survivor = store.form_with(episode("survivor", &["fear"], 1.0, &["lake"]));
        assert!(survivor.related_memories.contains(&doomed.id));

        clock.advance_days(19);
        let report = store.perform_maintenance(0).unwrap();
        assert_eq!(report.removed, vec![doomed.id]);
        assert!(store.get(&doomed.id).is_none());
        assert!(store.records.get(&survivor.id).unwrap().related_memories.is_empty());
        assert_eq!(store.search_by_concept("lake", 10).len(), 1);
        assert_symmetric(&store);
        assert_indices_consistent(&store);
    }

    // ── capacity ─────────────────────────────────────────────────────────────

    #[test]
    fn capacity_is_enforced_after_every_form() {
        let config = EpisodicConfig {
            max_memories: 3,
            ..EpisodicConfig::default()
        };
        let (mut store, _) = store_with(config);
        for i in 0..8 {
            store.form_with(episode(&format!("m{i}"), &["joy"], (i % 4) as f32 / 4.0, &["x"]));
            assert!(store.len() <= 3);
            assert_symmetric(&store);
            assert_indices_consistent(&store);
        }
    }

    #[test]
    fn eviction_prefers_low_value_records() {
        let config = EpisodicConfig {
            max_memories: 2,
            ..EpisodicConfig::default()
        };
        let (mut store, _) = store_with(config);
        let keep = store.form("keep", "keep", &["fear"], 1.0);
        let drop = store.form("drop", "drop", &[], 0.1);
        let newest = store.form("newest", "newest", &[], 0.05);
        assert!(store.get(&keep.id).is_some());
        assert!(store.get(&drop.id).is_none());
        assert!(store.get(&newest.id).is_some(), "the record being formed is never evicted");
    }

    // ── queries ──────────────────────────────────────────────────────────────

    #[test]
    fn get_by_day_uses_day_bucket() {
        let (mut store, clock) = store();
        let today = store.form("today", "today", &[], 0.5);
        clock.advance_days(1);
        let tomorrow = store.form("tomorrow", "tomorrow", &[], 0.5);
        let day = today.timestamp.date_naive();
        let ids: Vec<Uuid> = store.get_by_day(day, 10).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![today.id]);
        let next: Vec<Uuid> = store
            .get_by_day(tomorrow.timestamp.date_naive(), 10)
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(next, vec![tomorrow.id]);
    }

    #[test]
    fn get_recent_is_newest_first() {
        let (mut store, clock) = store();
        let a = store.form("a", "a", &[], 0.5);
        clock.advance_days(1);
        let b = store.form("b", "b", &[], 0.5);
        let ids: Vec<Uuid> = store.get_recent(5).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }

    #[test]
    fn stats_summarise_live_records() {
        let (mut store, _) = store();
        let a = store.form("a", "a", &["joy", "wonder"], 0.5);
        store.form("b", "b", &["joy"], 0.5);
        store.recall(&a.id);
        let stats = store.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.emotion_distribution.get("joy"), Some(&2));
        assert_eq!(stats.emotion_distribution.get("wonder"), Some(&1));
        assert_eq!(stats.total_recalls, 1);
        assert_eq!(stats.average_retention, 1.0);
    }

    #[test]
    fn events_are_logged() {
        let (mut store, _) = store();
        let a = store.form("a", "alpha", &[], 0.5);
        store.recall(&a.id);
        let events = store.recent_events(10);
        assert_eq!(events[0].kind, MemoryEventKind::Recalled);
        assert_eq!(events[1].kind, MemoryEventKind::Formed);
        assert_eq!(events[1].label, "alpha");
    }

    // ── export / import ──────────────────────────────────────────────────────

    #[test]
    fn import_rebuilds_indices_and_relations() {
        let (mut store, clock) = store();
        let a = store.form_with(episode("a", &["joy"], 0.6, &["star"]));
        let b = store.form_with(episode("b", &["fear"], 0.6, &["star"]));
        store.perform_maintenance(42);

        let json = store.to_json().unwrap();
        let restored = EpisodicStore::from_json(&json, Arc::new(clock)).unwrap();

        assert_eq!(restored.len(), 2);
        assert_eq!(restored.search_by_emotion("joy", 5)[0].item.id, a.id);
        assert_eq!(restored.search_by_concept("star", 5).len(), 2);
        assert!(restored.get(&a.id).unwrap().related_memories.contains(&b.id));
        assert_eq!(restored.export().last_maintenance_tick, Some(42));
        assert_symmetric(&restored);
        assert_indices_consistent(&restored);
    }

    #[test]
    fn import_repairs_dangling_and_one_sided_relations() {
        let (mut store, clock) = store();
        let a = store.form("a", "a", &[], 0.5);
        let b = store.form("b", "b", &[], 0.5);
        let mut snapshot = store.export();
        snapshot.entries[0].1.related_memories = vec![b.id, Uuid::new_v4()];
        let restored = EpisodicStore::from_snapshot(snapshot, Arc::new(clock)).unwrap();
        assert_eq!(restored.get(&a.id).unwrap().related_memories, vec![b.id]);
        assert_eq!(restored.get(&b.id).unwrap().related_memories, vec![a.id]);
    }

    #[test]
    fn import_keeps_first_of_duplicate_ids() {
        let (mut store, clock) = store();
        let joy = store.form("picnic", "picnic", &["joy"], 0.6);
        let mut snapshot = store.export();
        let mut clash = snapshot.entries[0].1.clone();
        clash.emotion_tags = vec!["fear".into()];
        clash.content = "storm".into();
        snapshot.entries.push((joy.id, clash));

        let restored = EpisodicStore::from_snapshot(snapshot, Arc::new(clock)).unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored.get(&joy.id).unwrap().content, "picnic");
        assert_eq!(restored.search_by_emotion("joy", 5)[0].item.id, joy.id);
        assert!(restored.search_by_emotion("fear", 5).is_empty());
        assert_indices_consistent(&restored);
    }

    #[test]
    fn import_rejects_invalid_config() {
        let (store, clock) = store();
        let mut snapshot = store.export();
        snapshot.config.max_memories = 0;
        let err = EpisodicStore::from_snapshot(snapshot, Arc::new(clock)).err().unwrap();
        assert!(matches!(err, MemoryError::InvalidConfig(_)));
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        let err = EpisodicStore::from_json("{not json", Arc::new(SystemClock)).err().unwrap();
        assert!(matches!(err, MemoryError::Serialization(_)));
    }

    // ── config ───────────────────────────────────────────────────────────────

    #[test]
    fn partial_config_uses_defaults() {
        let config: EpisodicConfig = serde_json::from_str(r#"{"max_memories": 5}"#).unwrap();
        assert_eq!(config.max_memories, 5);
        assert_eq!(config.association_threshold, 0.4);
        assert_eq!(config.emotion_weight("fear"), 1.5);
    }

    #[test]
    fn emotion_weight_keys_ignore_case() {
        let mut config = EpisodicConfig::default();
        config.emotion_weights.insert(" Dread ".into(), 2.0);
        assert_eq!(config.emotion_weight("dread"), 2.0);
        assert_eq!(config.importance_of(&["DREAD".to_string()], 0.4), 0.8);

        let (mut store, _) = store_with(config);
        assert_eq!(store.config().emotion_weights.get("dread"), Some(&2.0));
        assert!(!store.config().emotion_weights.contains_key(" Dread "));
        let record = store.form("cellar", "cellar", &["dread"], 0.4);
        assert!((record.importance - 0.8).abs() < 1e-6);
    }

    #[test]
    fn lower_case_weight_wins_a_key_collision() {
        let mut config = EpisodicConfig::default();
        config.emotion_weights.insert("Joy".into(), 9.0);
        config.normalize_emotion_weights();
        assert_eq!(config.emotion_weights.get("joy"), Some(&1.2));
        assert!(!config.emotion_weights.contains_key("Joy"));
    }

    #[test]
    fn negative_emotion_weight_is_rejected() {
        let mut config = EpisodicConfig::default();
        config.emotion_weights.insert("dread".into(), -1.0);
        assert!(config.validate().is_err());
    }
}
