pub mod grasp;
pub mod local;

use std::{
    fmt::Display,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use glam::Vec3;

use crate::{metric::MetricWeights, params::SampleCount, SearchError};

/// Knobs of the two-phase seed search.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Extra worker threads. 0 runs only the coordinator on the calling thread.
    pub threads: usize,
    /// Construction-phase seed budget; seeds 0..max_seeds are candidates.
    pub max_seeds: u64,
    /// Construction-phase wall-clock budget, seconds.
    pub max_seconds: f32,
    /// Fraction of `max_seconds` without improvement that counts as converged, in (0, 1].
    pub convergence_pct: f32,
    /// Capacity of the promising-seed shortlist carried into local search.
    pub promising_seeds: usize,
    pub weights: MetricWeights,
    /// When set, the shortlist is refined by perturbation-based local search.
    pub local_search: Option<LocalSearchConfig>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            max_seeds: 10_000,
            max_seconds: 60.0,
            convergence_pct: 0.1,
            promising_seeds: 100,
            weights: MetricWeights::default(),
            local_search: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocalSearchConfig {
    /// Iteration cap per refined seed.
    pub max_iters: u64,
    /// Wall-clock budget per refined seed, seconds.
    pub max_seconds: f32,
    /// Fraction of `max_seconds` without improvement that counts as converged, in (0, 1].
    pub convergence_pct: f32,
    /// Range the per-seed perturbation distance is drawn from, `(min, max)`.
    pub perturbation_dist: (f32, f32),
}

impl Default for LocalSearchConfig {
    fn default() -> Self {
        Self {
            max_iters: 10_000,
            max_seconds: 60.0,
            convergence_pct: 0.3,
            perturbation_dist: (0.01, 0.1),
        }
    }
}

// Anything beyond this is indistinguishable from "run forever" and would
// overflow Duration::from_secs_f32.
const MAX_TIME_BUDGET: f32 = 1e9;

fn check_time_budget(label: &str, seconds: f32) -> Result<(), SearchError> {
    if !(seconds > 0.0 && seconds <= MAX_TIME_BUDGET) {
        return Err(SearchError::InvalidConfig(format!(
            "{label} must be in (0, {MAX_TIME_BUDGET}] seconds, got {seconds}"
        )));
    }
    Ok(())
}

fn check_convergence_pct(label: &str, pct: f32) -> Result<(), SearchError> {
    if !(pct > 0.0 && pct <= 1.0) {
        return Err(SearchError::InvalidConfig(format!(
            "{label} must be in (0, 1], got {pct}"
        )));
    }
    Ok(())
}

impl SearchConfig {
    /// Fail-fast validation, called before any worker is spawned.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.max_seeds == 0 {
            return Err(SearchError::InvalidConfig("max_seeds must be positive".into()));
        }
        if self.promising_seeds == 0 {
            return Err(SearchError::InvalidConfig(
                "the promising-seed shortlist needs at least one slot".into(),
            ));
        }
        check_time_budget("max_seconds", self.max_seconds)?;
        check_convergence_pct("convergence_pct", self.convergence_pct)?;
        if self.weights.min_distance < 0.0 || self.weights.significant_samples < 0.0 {
            return Err(SearchError::InvalidConfig("metric weights must not be negative".into()));
        }

        if let Some(ls) = &self.local_search {
            if ls.max_iters == 0 {
                return Err(SearchError::InvalidConfig(
                    "local_search.max_iters must be positive".into(),
                ));
            }
            check_time_budget("local_search.max_seconds", ls.max_seconds)?;
            check_convergence_pct("local_search.convergence_pct", ls.convergence_pct)?;
            let (lo, hi) = ls.perturbation_dist;
            if !(lo > 0.0 && hi > lo) {
                return Err(SearchError::InvalidConfig(format!(
                    "perturbation distance range must satisfy 0 < min < max, got ({lo}, {hi})"
                )));
            }
        }

        Ok(())
    }
}

/// Why a search run stopped. None of these are errors; a cancelled or
/// timed-out run still reports its best result so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// No improvement for the configured fraction of the time budget.
    Converged,
    /// Wall-clock budget exceeded.
    TimedOut,
    /// Every seed (or shortlist slot) in the budget was examined.
    ExhaustedSeeds,
    /// Stopped by the cancel token or the progress callback.
    Cancelled,
}

impl Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StopReason::Converged => "converged",
            StopReason::TimedOut => "timed out",
            StopReason::ExhaustedSeeds => "seed budget exhausted",
            StopReason::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Cooperative cancellation shared by every worker of a run. Cancelling once
/// stops all workers within one loop iteration.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// Lets a panicking worker take its siblings down instead of leaving them
// running against a corrupt shared state.
pub(crate) struct PanicGuard<'a>(pub &'a CancelToken);

impl Drop for PanicGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.cancel();
        }
    }
}

/// Which phase the coordinator is reporting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Construction,
    LocalSearch,
}

/// Snapshot handed to the progress callback. Presentation is entirely the
/// caller's business; returning `false` requests cancellation.
#[derive(Debug, Clone, Copy)]
pub struct ProgressReport {
    pub sample_count: SampleCount,
    pub phase: Phase,
    /// Current seed (construction) or shortlist slot (local search).
    pub current: u64,
    pub total: u64,
    pub elapsed: Duration,
    pub best_score: f32,
    /// Fraction of the convergence window elapsed without improvement, 0..1.
    pub convergence: f32,
}

pub type ProgressFn<'a> = dyn FnMut(&ProgressReport) -> bool + 'a;

/// A seed worth refining, paired with its construction-phase score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PromisingSeed {
    pub seed: u64,
    pub score: f32,
}

/// Best vector set found for one sample count.
#[derive(Debug, Clone, PartialEq)]
pub struct BestSet {
    /// Seed that generated the set. Only reproduces it verbatim while local
    /// search has not modified the vectors.
    pub seed: u64,
    pub score: f32,
    pub vectors: Vec<Vec3>,
}

/// Bounded shortlist of the top-scoring construction seeds.
///
/// Insertion overwrites the first slot scoring strictly below the candidate.
/// This is deliberately not a sorted top-k: once early slots improve, later
/// slots can keep stale weaker seeds (see DESIGN.md).
#[derive(Debug, Clone)]
pub struct Shortlist(Vec<Option<PromisingSeed>>);

impl Shortlist {
    pub fn new(capacity: usize) -> Self {
        Self(vec![None; capacity])
    }

    pub fn entries(&self) -> &[Option<PromisingSeed>] {
        &self.0
    }

    pub(crate) fn offer(&mut self, seed: u64, score: f32) {
        for slot in &mut self.0 {
            if slot.map_or(true, |s| s.score < score) {
                *slot = Some(PromisingSeed { seed, score });
                return;
            }
        }
    }

    pub(crate) fn set_score(&mut self, index: usize, score: f32) {
        if let Some(entry) = &mut self.0[index] {
            entry.score = score;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CancelToken, LocalSearchConfig, PromisingSeed, SearchConfig, Shortlist,
    };

    #[test]
    fn shortlist_first_fit_keeps_stale_tail() {
        let mut list = Shortlist::new(2);
        list.offer(0, 5.0);
        list.offer(1, 1.0);
        // Seed 2 beats slot 0 and evicts the 5.0 entry; the weaker 1.0 entry
        // in slot 1 survives untouched. A true top-k would have evicted it.
        list.offer(2, 6.0);

        assert_eq!(
            list.entries(),
            &[
                Some(PromisingSeed { seed: 2, score: 6.0 }),
                Some(PromisingSeed { seed: 1, score: 1.0 }),
            ]
        );
    }

    #[test]
    fn shortlist_ignores_candidates_below_every_slot() {
        // Fill both slots first; the first-fit scan would otherwise route a
        // weak candidate into a still-empty slot.
        let mut list = Shortlist::new(2);
        list.offer(0, 2.0);
        list.offer(1, 1.0);

        list.offer(2, 0.5);

        assert_eq!(
            list.entries(),
            &[
                Some(PromisingSeed { seed: 0, score: 2.0 }),
                Some(PromisingSeed { seed: 1, score: 1.0 }),
            ]
        );
    }

    #[test]
    fn shortlist_routes_weak_candidates_into_empty_slots() {
        let mut list = Shortlist::new(2);
        list.offer(0, 3.0);
        // Scores below every filled slot still land while capacity remains.
        list.offer(1, 0.5);

        assert_eq!(
            list.entries(),
            &[
                Some(PromisingSeed { seed: 0, score: 3.0 }),
                Some(PromisingSeed { seed: 1, score: 0.5 }),
            ]
        );
    }

    #[test]
    fn cancel_token_propagates_to_clones() {
        let token = CancelToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn validation_rejects_bad_configs() {
        let ok = SearchConfig::default();
        assert!(ok.validate().is_ok());

        let mut cfg = SearchConfig::default();
        cfg.max_seeds = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = SearchConfig::default();
        cfg.promising_seeds = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = SearchConfig::default();
        cfg.max_seconds = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = SearchConfig::default();
        cfg.convergence_pct = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = SearchConfig::default();
        cfg.local_search = Some(LocalSearchConfig {
            perturbation_dist: (0.1, 0.01),
            ..Default::default()
        });
        assert!(cfg.validate().is_err());
    }
}
