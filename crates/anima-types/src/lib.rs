//! `anima-types` – shared vocabulary for the Anima memory engine.
//!
//! Everything that crosses a crate boundary lives here: the closed enums that
//! describe concept provenance and relation kinds, the ranked search result
//! envelope handed to collaborators, the bounded event log entry, the
//! [`Clock`] seam every store reads time through, and the global
//! [`MemoryError`].

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Concept provenance
// ─────────────────────────────────────────────────────────────────────────────

/// Where a semantic concept was learned from.
///
/// The set is closed.  [`ConceptSource::Initial`] marks seed/bootstrap
/// concepts, which are exempt from decay, eviction and compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConceptSource {
    /// An external reference work (encyclopedia, dictionary, web page).
    ExternalReference,
    /// Something the agent experienced first-hand.
    DirectExperience,
    /// Picked up in conversation.
    Dialogue,
    /// Picked up from a book, letter or other reading material.
    ReadingMaterial,
    /// Present when the store was bootstrapped.
    Initial,
}

impl ConceptSource {
    /// Every variant, in declaration order.
    pub const ALL: [ConceptSource; 5] = [
        ConceptSource::ExternalReference,
        ConceptSource::DirectExperience,
        ConceptSource::Dialogue,
        ConceptSource::ReadingMaterial,
        ConceptSource::Initial,
    ];

    /// Seed concepts never decay and are never evicted.
    pub fn is_seed(self) -> bool {
        matches!(self, ConceptSource::Initial)
    }

    /// The snake_case name used in JSON and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            ConceptSource::ExternalReference => "external_reference",
            ConceptSource::DirectExperience => "direct_experience",
            ConceptSource::Dialogue => "dialogue",
            ConceptSource::ReadingMaterial => "reading_material",
            ConceptSource::Initial => "initial",
        }
    }

    /// Inverse of [`as_str`](Self::as_str), ignoring case and surrounding
    /// whitespace.
    pub fn parse(s: &str) -> Option<Self> {
        ConceptSource::ALL
            .into_iter()
            .find(|source| source.as_str() == s.trim().to_lowercase())
    }
}

impl fmt::Display for ConceptSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Relation kinds
// ─────────────────────────────────────────────────────────────────────────────

/// The kind of a typed relation between two concepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    IsA,
    PartOf,
    RelatedTo,
    OppositeOf,
    Causes,
    SimilarTo,
}

impl RelationKind {
    /// Every variant, in declaration order.
    pub const ALL: [RelationKind; 6] = [
        RelationKind::IsA,
        RelationKind::PartOf,
        RelationKind::RelatedTo,
        RelationKind::OppositeOf,
        RelationKind::Causes,
        RelationKind::SimilarTo,
    ];

    /// The kind recorded on the reverse edge when `A —self→ B` is linked back
    /// as `B —reverse→ A`.
    ///
    /// Symmetric kinds map to themselves; directional kinds (is-a, part-of,
    /// causes) have no inverse in the closed set and fall back to
    /// [`RelationKind::RelatedTo`].
    pub fn reverse(self) -> Self {
        match self {
            RelationKind::OppositeOf => RelationKind::OppositeOf,
            RelationKind::SimilarTo => RelationKind::SimilarTo,
            RelationKind::IsA | RelationKind::PartOf | RelationKind::Causes | RelationKind::RelatedTo => {
                RelationKind::RelatedTo
            }
        }
    }

    /// The snake_case name used in JSON and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            RelationKind::IsA => "is_a",
            RelationKind::PartOf => "part_of",
            RelationKind::RelatedTo => "related_to",
            RelationKind::OppositeOf => "opposite_of",
            RelationKind::Causes => "causes",
            RelationKind::SimilarTo => "similar_to",
        }
    }

    /// Inverse of [`as_str`](Self::as_str).  Case, surrounding whitespace
    /// and `-` versus `_` are ignored, so `Is-A` parses.
    ///
    /// ```rust
    /// use anima_types::RelationKind;
    ///
    /// assert_eq!(RelationKind::parse(" Is-A "), Some(RelationKind::IsA));
    /// assert_eq!(RelationKind::parse(RelationKind::SimilarTo.as_str()), Some(RelationKind::SimilarTo));
    /// assert_eq!(RelationKind::parse("likes"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase().replace('-', "_");
        RelationKind::ALL.into_iter().find(|kind| kind.as_str() == s)
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Search results
// ─────────────────────────────────────────────────────────────────────────────

/// Why a record or concept matched a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MatchCriterion {
    /// Matched through the emotion-tag index.
    EmotionTag(String),
    /// Matched a related-concept label.
    Concept(String),
    /// A query token occurred in the record body.
    Content(String),
    /// A query token occurred in the record summary.
    Summary(String),
    /// The concept label equals the query.
    ExactName,
    /// The concept label contains the query.
    PartialName,
    /// The concept definition contains the query.
    Definition,
    /// One of the concept's relations points at a label containing the query.
    Relation(String),
}

/// A ranked hit returned by every `search*` operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult<T> {
    /// Snapshot of the matched record or concept.
    pub item: T,
    /// Ranking key; higher sorts first.
    pub relevance_score: f32,
    /// Which criteria matched, in evaluation order.
    pub matched_criteria: Vec<MatchCriterion>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Event log
// ─────────────────────────────────────────────────────────────────────────────

/// What happened to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryEventKind {
    Formed,
    Recalled,
    Associated,
    Learned,
    Deepened,
    Used,
    Decayed,
    Evicted,
    Forgotten,
    Merged,
    Pruned,
}

/// One entry of a store's bounded recent-event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEvent {
    pub at: DateTime<Utc>,
    pub kind: MemoryEventKind,
    /// Id of the record or concept the event is about.
    pub subject: Uuid,
    /// Short human-readable label (summary or concept name).
    pub label: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Clock
// ─────────────────────────────────────────────────────────────────────────────

/// Source of "now" for every store.
///
/// The stores never read the wall clock directly so that a host can run them
/// on simulated time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same instant, so a test can hand one clone to a store and
/// keep another to advance simulated time.
///
/// ```rust
/// use anima_types::{Clock, ManualClock};
///
/// let clock = ManualClock::default();
/// let start = clock.now();
/// clock.advance_days(30);
/// assert_eq!((clock.now() - start).num_days(), 30);
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// A clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }

    pub fn advance_days(&self, days: i64) {
        self.advance(Duration::days(days));
    }

    /// Jump to `at`, forwards or backwards.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = at;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Global error type for the memory engine.
///
/// Absence is deliberately not represented here: lookups that find nothing
/// return `None` or an empty list.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MemoryError {
    /// `deepen` was handed an id this store never issued (or has since
    /// forgotten).
    #[error("Concept not found: {0}")]
    ConceptNotFound(Uuid),

    #[error("Snapshot Serialization Error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<serde_json::Error> for MemoryError {
    fn from(err: serde_json::Error) -> Self {
        MemoryError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── ConceptSource ────────────────────────────────────────────────────────

    #[test]
    fn only_initial_is_seed() {
        for source in ConceptSource::ALL {
            assert_eq!(source.is_seed(), source == ConceptSource::Initial);
        }
    }

    #[test]
    fn concept_source_serializes_snake_case() {
        let json = serde_json::to_string(&ConceptSource::ReadingMaterial).unwrap();
        assert_eq!(json, "\"reading_material\"");
        let back: ConceptSource = serde_json::from_str("\"initial\"").unwrap();
        assert_eq!(back, ConceptSource::Initial);
    }

    #[test]
    fn concept_source_parse_accepts_display_form() {
        for source in ConceptSource::ALL {
            assert_eq!(ConceptSource::parse(&source.to_string()), Some(source));
        }
        assert_eq!(ConceptSource::parse("rumour"), None);
    }

    // ── RelationKind ─────────────────────────────────────────────────────────

    #[test]
    fn symmetric_kinds_reverse_to_themselves() {
        assert_eq!(RelationKind::OppositeOf.reverse(), RelationKind::OppositeOf);
        assert_eq!(RelationKind::SimilarTo.reverse(), RelationKind::SimilarTo);
    }

    #[test]
    fn directional_kinds_reverse_to_related() {
        assert_eq!(RelationKind::IsA.reverse(), RelationKind::RelatedTo);
        assert_eq!(RelationKind::PartOf.reverse(), RelationKind::RelatedTo);
        assert_eq!(RelationKind::Causes.reverse(), RelationKind::RelatedTo);
    }

    #[test]
    fn relation_kind_parse_accepts_hyphens() {
        assert_eq!(RelationKind::parse("part-of"), Some(RelationKind::PartOf));
        assert_eq!(RelationKind::parse("IS_A"), Some(RelationKind::IsA));
        assert_eq!(RelationKind::parse("loves"), None);
    }

    // ── MatchCriterion ───────────────────────────────────────────────────────

    #[test]
    fn match_criterion_is_adjacently_tagged() {
        let json = serde_json::to_string(&MatchCriterion::EmotionTag("joy".into())).unwrap();
        assert_eq!(json, r#"{"kind":"emotion_tag","value":"joy"}"#);
    }

    // ── ManualClock ──────────────────────────────────────────────────────────

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::default();
        let handle = clock.clone();
        let start = clock.now();
        handle.advance_days(3);
        assert_eq!((clock.now() - start).num_days(), 3);
    }

    // ── MemoryError ──────────────────────────────────────────────────────────

    #[test]
    fn memory_error_display() {
        let id = Uuid::new_v4();
        let err = MemoryError::ConceptNotFound(id);
        assert!(err.to_string().contains("Concept not found"));
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn serde_error_converts_to_serialization() {
        let err: MemoryError = serde_json::from_str::<ConceptSource>("42").unwrap_err().into();
        assert!(matches!(err, MemoryError::Serialization(_)));
    }
}
