//! `anima-memory` – The Associative Memory Engine.
//!
//! Two cooperating in-memory stores: what the agent has *experienced*
//! (episodic records) and what it has *learned* (semantic concepts).  Both
//! decay with time, are reinforced by use, stay within a capacity ceiling and
//! keep their secondary indices consistent with their primary maps.
//!
//! # Modules
//!
//! - [`episodic`] – [`EpisodicStore`][episodic::EpisodicStore]: emotion-tagged
//!   event records with a forgetting curve, recall reinforcement and symmetric
//!   association discovery.
//! - [`semantic`] – [`SemanticStore`][semantic::SemanticStore]: labelled
//!   concepts with typed relations, spreading activation and seed protection.
//! - [`graph`] – read-only knowledge-graph, subgraph and timeline export of the
//!   semantic store.
//! - [`compression`] – planning for the merge/prune pass over weak concepts.
//! - [`index`] – [`AssociationIndex`][index::AssociationIndex], the
//!   many-to-many secondary index both stores build on.
//! - [`retention`] – decay arithmetic, the maintenance rate limiter and
//!   eviction ordering.
//! - [`snapshot`] – export/import envelopes and the bounded event log.
//! - [`archive`] – [`SnapshotArchive`][archive::SnapshotArchive]: SQLite
//!   persistence for exported snapshots.
//! - [`engine`] – [`MemoryEngine`][engine::MemoryEngine]: both stores behind
//!   one tick, optionally shared behind a mutex.

pub mod archive;
pub mod compression;
pub mod engine;
pub mod episodic;
pub mod graph;
pub mod index;
pub mod retention;
pub mod semantic;
pub mod snapshot;

pub use archive::{ArchiveError, SnapshotArchive, SnapshotKind};
pub use engine::{EngineConfig, MemoryEngine, SharedEngine, with_engine};
pub use episodic::{EpisodeRequest, EpisodicConfig, EpisodicRecord, EpisodicStore, RandomRecallOptions};
pub use graph::KnowledgeGraph;
pub use semantic::{ConceptRelation, LearnRequest, Provenance, SemanticConcept, SemanticConfig, SemanticStore};
