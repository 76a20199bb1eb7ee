//! Memory Engine.
//!
//! Owns one episodic and one semantic store and drives them from a single
//! simulation tick.  The two stores never reference each other; the engine
//! only sequences calls.
//!
//! For a multi-threaded host, [`MemoryEngine::into_shared`] wraps the engine
//! in one mutex.  [`with_engine`] holds that lock for the whole closure, so a
//! logical operation (a use with its spreading activation, a form with its
//! eviction) is never interleaved with another.

use std::sync::{Arc, Mutex};

use anima_types::{Clock, MemoryError, SystemClock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::archive::{ArchiveError, SnapshotArchive, SnapshotKind};
use crate::episodic::{EpisodicConfig, EpisodicSnapshot, EpisodicStore};
use crate::retention::MaintenanceReport;
use crate::semantic::{SemanticConfig, SemanticSnapshot, SemanticStore};

/// Engine handle shared between threads.
pub type SharedEngine = Arc<Mutex<MemoryEngine>>;

/// Configuration for both stores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub episodic: EpisodicConfig,
    pub semantic: SemanticConfig,
}

/// What one engine tick did.  A `None` side was rate-limited.
#[derive(Debug, Clone, Default)]
pub struct EngineMaintenance {
    pub episodic: Option<MaintenanceReport>,
    pub semantic: Option<MaintenanceReport>,
}

impl EngineMaintenance {
    /// `true` when at least one store ran maintenance.
    pub fn ran(&self) -> bool {
        self.episodic.is_some() || self.semantic.is_some()
    }
}

/// The episodic and semantic stores, sharing one clock.
pub struct MemoryEngine {
    pub episodic: EpisodicStore,
    pub semantic: SemanticStore,
    clock: Arc<dyn Clock>,
}

impl MemoryEngine {
    /// Build both stores on wall-clock time.
    pub fn new(config: EngineConfig) -> Result<Self, MemoryError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Both stores read time from the same `clock`.
    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self, MemoryError> {
        Ok(Self {
            episodic: EpisodicStore::with_clock(config.episodic, clock.clone())?,
            semantic: SemanticStore::with_clock(config.semantic, clock.clone())?,
            clock,
        })
    }

    /// Seed both random sources; the semantic store gets `seed + 1`.
    pub fn with_rng_seed(self, seed: u64) -> Self {
        Self {
            episodic: self.episodic.with_rng_seed(seed),
            semantic: self.semantic.with_rng_seed(seed.wrapping_add(1)),
            clock: self.clock,
        }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Offer the tick to both stores.  Each applies its own rate limit.
    pub fn perform_maintenance(&mut self, tick: u64) -> EngineMaintenance {
        let result = EngineMaintenance {
            episodic: self.episodic.perform_maintenance(tick),
            semantic: self.semantic.perform_maintenance(tick),
        };
        if !result.ran() {
            debug!(tick, "maintenance not due");
        }
        result
    }

    /// Archive both stores at `tick`.
    pub fn save(&self, archive: &SnapshotArchive, tick: u64) -> Result<(), ArchiveError> {
        let now = self.clock.now();
        archive.save(SnapshotKind::Episodic, tick, now, &self.episodic.export())?;
        archive.save(SnapshotKind::Semantic, tick, now, &self.semantic.export())?;
        info!(
            tick,
            episodic = self.episodic.len(),
            semantic = self.semantic.len(),
            "memory snapshot saved"
        );
        Ok(())
    }

    /// Rebuild an engine from the newest snapshots in `archive`.
    pub fn load(archive: &SnapshotArchive, clock: Arc<dyn Clock>) -> Result<Self, ArchiveError> {
        let episodic: EpisodicSnapshot = archive.load_latest(SnapshotKind::Episodic)?;
        let semantic: SemanticSnapshot = archive.load_latest(SnapshotKind::Semantic)?;
        let engine = Self {
            episodic: EpisodicStore::from_snapshot(episodic, clock.clone())?,
            semantic: SemanticStore::from_snapshot(semantic, clock.clone())?,
            clock,
        };
        info!(
            episodic = engine.episodic.len(),
            semantic = engine.semantic.len(),
            "memory snapshot loaded"
        );
        Ok(engine)
    }

    /// Wrap the engine for use from several threads.
    pub fn into_shared(self) -> SharedEngine {
        Arc::new(Mutex::new(self))
    }
}

/// Run `f` with exclusive access to the engine.  A poisoned lock is
/// recovered rather than propagated.
pub fn with_engine<R>(engine: &SharedEngine, f: impl FnOnce(&mut MemoryEngine) -> R) -> R {
    let mut guard = engine.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anima_types::{ConceptSource, ManualClock};
    use std::thread;

    fn engine() -> (MemoryEngine, ManualClock) {
        let clock = ManualClock::default();
        let engine = MemoryEngine::with_clock(EngineConfig::default(), Arc::new(clock.clone()))
            .unwrap()
            .with_rng_seed(3);
        (engine, clock)
    }

    #[test]
    fn maintenance_reaches_both_stores() {
        let (mut engine, clock) = engine();
        engine.episodic.form("walk", "walk", &[], 0.0);
        engine.semantic.learn("path", "a way", ConceptSource::Dialogue);
        clock.advance_days(30);

        let first = engine.perform_maintenance(0);
        assert!(first.episodic.is_some() && first.semantic.is_some());
        assert!(engine.episodic.is_empty());
        assert_eq!(engine.semantic.len(), 1);

        assert!(!engine.perform_maintenance(1).ran());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = EngineConfig::default();
        config.semantic.max_concepts = 0;
        assert!(matches!(MemoryEngine::new(config), Err(MemoryError::InvalidConfig(_))));
    }

    #[test]
    fn save_and_load_round_trip_through_archive() {
        let (mut engine, clock) = engine();
        engine.episodic.form("rain", "rain", &["calm"], 0.4);
        engine.semantic.learn("rain", "water", ConceptSource::DirectExperience);
        let archive = SnapshotArchive::open_in_memory().unwrap();
        engine.save(&archive, 7).unwrap();

        let restored = MemoryEngine::load(&archive, Arc::new(clock)).unwrap();
        assert_eq!(restored.episodic.len(), 1);
        assert!(restored.semantic.get_by_name("rain").is_some());
    }

    #[test]
    fn load_from_empty_archive_is_not_found() {
        let archive = SnapshotArchive::open_in_memory().unwrap();
        let err = MemoryEngine::load(&archive, Arc::new(SystemClock)).err().unwrap();
        assert!(matches!(err, ArchiveError::NotFound(_)));
    }

    #[test]
    fn shared_engine_serialises_writers() {
        let (engine, _) = engine();
        let shared = engine.into_shared();
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || {
                    for i in 0..25 {
                        with_engine(&shared, |e| {
                            e.semantic.learn(&format!("c{t}-{i}"), "x", ConceptSource::Dialogue);
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(with_engine(&shared, |e| e.semantic.len()), 100);
    }
}
