//! Retention Controller.
//!
//! The decay, reinforcement and eviction policy shared by both stores.  The
//! stores own their own parameters (see [`EpisodicConfig`] and
//! [`SemanticConfig`]); this module holds only the arithmetic so that the two
//! policies stay parallel.
//!
//! ## Decay
//!
//! ```text
//! episodic:  Δ = base_forget_rate × (1 − intensity × retention_bonus) × days_since_recall
//! semantic:  Δ = unused_decay_rate × (1 − interest × 0.5) × days_since_use × 0.01
//! ```
//!
//! Both deltas are subtracted from the current strength and the result is
//! clamped into `[0, 1]`.
//!
//! ## Eviction order
//!
//! Capacity eviction removes the lowest-scoring entries first.  Ties are broken
//! explicitly: the oldest creation timestamp goes first, then the lowest
//! insertion sequence number.
//!
//! [`EpisodicConfig`]: crate::episodic::EpisodicConfig
//! [`SemanticConfig`]: crate::semantic::SemanticConfig

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::compression::CompressionRecord;

const SECONDS_PER_DAY: f32 = 86_400.0;

/// Clamp `value` into `[0, 1]`, mapping NaN to `0`.
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// Fractional days from `from` to `to`; never negative.
pub fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f32 {
    let seconds = (to - from).num_seconds().max(0) as f32;
    seconds / SECONDS_PER_DAY
}

/// Raise `value` by `amount`, capped at 1.
pub fn reinforce(value: f32, amount: f32) -> f32 {
    clamp_unit(value + amount.max(0.0))
}

/// Retention lost by an episodic record over `days` without recall.
///
/// Emotionally intense records lose less: `retention_bonus` scales how much
/// of the intensity is converted into resistance.
pub fn episodic_decay(base_forget_rate: f32, intensity: f32, retention_bonus: f32, days: f32) -> f32 {
    let resistance = clamp_unit(intensity * retention_bonus);
    (base_forget_rate * (1.0 - resistance) * days).max(0.0)
}

/// Comprehension lost by a semantic concept over `days` without use.
pub fn semantic_decay(unused_decay_rate: f32, interest: f32, days: f32) -> f32 {
    let resistance = clamp_unit(interest) * 0.5;
    (unused_decay_rate * (1.0 - resistance) * days * 0.01).max(0.0)
}

// ─────────────────────────────────────────────────────────────────────────────
// MaintenanceGate
// ─────────────────────────────────────────────────────────────────────────────

/// Rate-limits a periodic job to at most once per `interval` ticks.
///
/// The very first call always passes.
///
/// ```rust
/// use anima_memory::retention::MaintenanceGate;
///
/// let mut gate = MaintenanceGate::new(10);
/// assert!(gate.try_run(3));
/// assert!(!gate.try_run(12));
/// assert!(gate.try_run(13));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceGate {
    interval: u64,
    last_run: Option<u64>,
}

impl MaintenanceGate {
    /// A gate that has never run, so the first tick offered runs.
    pub fn new(interval: u64) -> Self {
        Self {
            interval,
            last_run: None,
        }
    }

    /// Restore a gate from a persisted last-run tick.
    pub fn resume(interval: u64, last_run: Option<u64>) -> Self {
        Self { interval, last_run }
    }

    /// `true` when at least `interval` ticks separate `tick` from the last run.
    pub fn should_run(&self, tick: u64) -> bool {
        match self.last_run {
            None => true,
            Some(last) => tick.saturating_sub(last) >= self.interval,
        }
    }

    /// Record a run at `tick`.
    pub fn mark(&mut self, tick: u64) {
        self.last_run = Some(tick);
    }

    /// Check and mark in one step.
    pub fn try_run(&mut self, tick: u64) -> bool {
        if self.should_run(tick) {
            self.mark(tick);
            true
        } else {
            false
        }
    }

    pub fn last_run(&self) -> Option<u64> {
        self.last_run
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }
}

/// Outcome of one maintenance pass that actually ran.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub tick: u64,
    /// Entries looked at (seed concepts included).
    pub examined: usize,
    /// Entries whose strength went down.
    pub decayed: usize,
    /// Entries deleted for falling below the deletion threshold.
    pub removed: Vec<Uuid>,
    /// Set when this pass also triggered knowledge compression.
    pub compression: Option<CompressionRecord>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Eviction
// ─────────────────────────────────────────────────────────────────────────────

/// One entry competing to stay in a store that is over capacity.
#[derive(Debug, Clone, Copy)]
pub struct EvictionCandidate<K> {
    pub id: K,
    /// Lower scores are evicted first.
    pub score: f32,
    /// Tie-breaker when scores are equal; older goes first.
    pub created_at: DateTime<Utc>,
    /// Insertion order; final tie-breaker.
    pub seq: u64,
}

/// Pick `excess` victims: lowest score first, then oldest, then earliest
/// inserted.
pub fn select_victims<K: Copy>(mut candidates: Vec<EvictionCandidate<K>>, excess: usize) -> Vec<K> {
    candidates.sort_by(|a, b| {
        a.score
            .total_cmp(&b.score)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.seq.cmp(&b.seq))
    });
    candidates.into_iter().take(excess).map(|c| c.id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    // ── arithmetic ───────────────────────────────────────────────────────────

    #[test]
    fn clamp_unit_handles_out_of_range_and_nan() {
        assert_eq!(clamp_unit(1.7), 1.0);
        assert_eq!(clamp_unit(-0.2), 0.0);
        assert_eq!(clamp_unit(f32::NAN), 0.0);
        assert_eq!(clamp_unit(0.25), 0.25);
    }

    #[test]
    fn days_between_is_fractional_and_non_negative() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::hours(36);
        assert!((days_between(t0, t1) - 1.5).abs() < 1e-4);
        assert_eq!(days_between(t1, t0), 0.0);
    }

    #[test]
    fn reinforce_caps_at_one_and_ignores_negative_amounts() {
        assert_eq!(reinforce(0.95, 0.2), 1.0);
        assert_eq!(reinforce(0.5, -0.3), 0.5);
    }

    #[test]
    fn intense_episodes_decay_slower() {
        let calm = episodic_decay(0.1, 0.0, 0.5, 2.0);
        let intense = episodic_decay(0.1, 1.0, 0.5, 2.0);
        assert!((calm - 0.2).abs() < 1e-6);
        assert!((intense - 0.1).abs() < 1e-6);
    }

    #[test]
    fn semantic_decay_matches_formula() {
        // 1.0 × (1 − 0.5 × 0.5) × 30 × 0.01 = 0.225
        let d = semantic_decay(1.0, 0.5, 30.0);
        assert!((d - 0.225).abs() < 1e-6);
    }

    #[test]
    fn decay_is_never_negative() {
        assert_eq!(episodic_decay(0.1, 0.5, 0.5, 0.0), 0.0);
        assert!(semantic_decay(1.0, 1.0, 10.0) >= 0.0);
    }

    // ── MaintenanceGate ──────────────────────────────────────────────────────

    #[test]
    fn gate_first_call_runs() {
        let mut gate = MaintenanceGate::new(100);
        assert!(gate.try_run(0));
        assert_eq!(gate.last_run(), Some(0));
    }

    #[test]
    fn gate_blocks_until_interval_elapsed() {
        let mut gate = MaintenanceGate::new(100);
        gate.mark(50);
        assert!(!gate.should_run(149));
        assert!(gate.should_run(150));
    }

    #[test]
    fn gate_resume_keeps_last_run() {
        let gate = MaintenanceGate::resume(10, Some(40));
        assert!(!gate.should_run(45));
        assert!(gate.should_run(50));
    }

    // ── select_victims ───────────────────────────────────────────────────────

    #[test]
    fn victims_are_lowest_score_first() {
        let now = Utc::now();
        let candidates = vec![
            EvictionCandidate { id: 'a', score: 0.9, created_at: now, seq: 0 },
            EvictionCandidate { id: 'b', score: 0.1, created_at: now, seq: 1 },
            EvictionCandidate { id: 'c', score: 0.5, created_at: now, seq: 2 },
        ];
        assert_eq!(select_victims(candidates, 2), vec!['b', 'c']);
    }

    #[test]
    fn ties_break_oldest_first_then_by_sequence() {
        let now = Utc::now();
        let candidates = vec![
            EvictionCandidate { id: "new", score: 0.0, created_at: now, seq: 0 },
            EvictionCandidate { id: "old", score: 0.0, created_at: now - Duration::days(1), seq: 5 },
            EvictionCandidate { id: "mid", score: 0.0, created_at: now, seq: 3 },
        ];
        assert_eq!(select_victims(candidates, 3), vec!["old", "new", "mid"]);
    }

    #[test]
    fn zero_excess_selects_nothing() {
        let candidates = vec![EvictionCandidate { id: 1, score: 0.0, created_at: Utc::now(), seq: 0 }];
        assert!(select_victims(candidates, 0).is_empty());
    }
}
