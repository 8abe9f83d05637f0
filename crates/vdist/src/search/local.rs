//! Local-search phase: each promising seed from the construction phase is
//! refined independently by iterated perturbation, a parallel multi-start
//! hill-climb. Moves are accepted only on strict improvement, so the tracked
//! score of any single refinement never decreases.

use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use glam::Vec3;
use rand::{distributions::Uniform, prelude::Distribution, SeedableRng};

use crate::{
    generator, metric,
    params::{DistributionParams, SampleCount},
    perturb, SearchError,
};

use super::{
    BestSet, CancelToken, LocalSearchConfig, PanicGuard, Phase, ProgressFn, ProgressReport,
    PromisingSeed, SearchConfig, Shortlist, StopReason,
};

pub struct LocalOutcome {
    /// Best refined set across all shortlist slots. None when every slot was
    /// empty or the phase was cancelled before finishing a single refinement.
    pub best: Option<BestSet>,
    pub stop: StopReason,
}

struct State {
    next_slot: usize,
    shortlist: Shortlist,
    best: Option<BestSet>,
    stop: Option<StopReason>,
}

struct Shared<'a> {
    params: &'a DistributionParams,
    sample_count: SampleCount,
    config: &'a SearchConfig,
    ls: &'a LocalSearchConfig,
    state: Mutex<State>,
    /// Stops this run only, leaving the caller's token untouched.
    cancel: CancelToken,
    external: &'a CancelToken,
    /// Shortlist capacity, fixed for the whole run.
    slots: usize,
    convergence_window: Duration,
}

impl Shared<'_> {
    fn stopping(&self) -> bool {
        self.cancel.is_cancelled() || self.external.is_cancelled()
    }
}

/// Refines the construction-phase shortlist for one sample count.
///
/// Workers claim shortlist slots through a shared cursor; empty slots are
/// skipped. The same coordinator-inline threading shape as the construction
/// phase applies, including panic propagation.
pub fn run(
    params: &DistributionParams,
    sample_count: SampleCount,
    config: &SearchConfig,
    ls: &LocalSearchConfig,
    shortlist: Shortlist,
    cancel: &CancelToken,
    progress: &mut ProgressFn<'_>,
) -> Result<LocalOutcome, SearchError> {
    let slots = shortlist.entries().len();
    let shared = Shared {
        params,
        sample_count,
        config,
        ls,
        state: Mutex::new(State {
            next_slot: 0,
            shortlist,
            best: None,
            stop: None,
        }),
        cancel: CancelToken::new(),
        external: cancel,
        slots,
        convergence_window: Duration::from_secs_f32(ls.convergence_pct * ls.max_seconds),
    };

    let fault = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..config.threads)
            .map(|t| {
                let shared = &shared;
                scope.spawn(move || worker(shared, t + 1, None))
            })
            .collect();

        worker(&shared, 0, Some(progress));

        handles.into_iter().any(|h| h.join().is_err())
    });

    let state = match shared.state.into_inner() {
        Ok(state) if !fault => state,
        _ => return Err(SearchError::WorkerPanic),
    };

    let stop = state.stop.unwrap_or(StopReason::Cancelled);
    log::info!(
        "local search for {sample_count} finished ({stop}), best score {:?}",
        state.best.as_ref().map(|b| b.score),
    );

    Ok(LocalOutcome {
        best: state.best,
        stop,
    })
}

fn worker(shared: &Shared, id: usize, mut progress: Option<&mut ProgressFn<'_>>) {
    let _guard = PanicGuard(&shared.cancel);

    loop {
        if shared.stopping() {
            if shared.external.is_cancelled() {
                if let Ok(mut state) = shared.state.lock() {
                    state.stop.get_or_insert(StopReason::Cancelled);
                }
            }
            break;
        }

        let claimed = {
            let Ok(mut state) = shared.state.lock() else { return };
            if state.next_slot >= shared.slots {
                state.stop.get_or_insert(StopReason::ExhaustedSeeds);
                None
            } else {
                let slot = state.next_slot;
                state.next_slot += 1;
                Some((slot, state.shortlist.entries()[slot]))
            }
        };
        let Some((slot, entry)) = claimed else {
            log::trace!("[{id}] no shortlist slots left");
            break;
        };
        let Some(entry) = entry else { continue };

        let (score, vectors) = refine(shared, id, slot, entry, progress.as_deref_mut());

        let Ok(mut state) = shared.state.lock() else { return };
        state.shortlist.set_score(slot, score);
        if state.best.as_ref().map_or(true, |b| score > b.score) {
            state.best = Some(BestSet {
                seed: entry.seed,
                score,
                vectors,
            });
            drop(state);
            log::debug!(
                "[{id}] refined seed {} from {} to {score}",
                entry.seed,
                entry.score
            );
        }
    }

    log::trace!("[{id}] local-search worker finished");
}

/// Hill-climbs one seed's vector set. Accept-if-better only; on a rejected
/// move the single touched vector is rolled back.
fn refine(
    shared: &Shared,
    id: usize,
    slot: usize,
    entry: PromisingSeed,
    mut progress: Option<&mut ProgressFn<'_>>,
) -> (f32, Vec<Vec3>) {
    let mut rng = crate::Rng::seed_from_u64(entry.seed);

    // Fixed for the whole refinement; the draw range controls how coarse
    // this particular restart explores.
    let (lo, hi) = shared.ls.perturbation_dist;
    let perturbation_dist = Uniform::new(lo, hi).sample(&mut rng);

    let mut vectors = generator::generate(shared.params, shared.sample_count, entry.seed);
    let mut best_score = metric::score(&vectors, shared.config.weights);

    let started = Instant::now();
    let mut last_improvement = started;

    for _ in 0..shared.ls.max_iters {
        if shared.stopping() {
            break;
        }
        let elapsed = started.elapsed();
        if elapsed.as_secs_f32() >= shared.ls.max_seconds {
            log::trace!("[{id}] refinement of seed {} timed out", entry.seed);
            break;
        }

        if let Some((idx, previous)) =
            perturb::try_perturb(shared.params, &mut rng, &mut vectors, perturbation_dist)
        {
            let score = metric::score(&vectors, shared.config.weights);
            if score > best_score {
                best_score = score;
                last_improvement = Instant::now();
            } else {
                vectors[idx] = previous;
                if last_improvement.elapsed() >= shared.convergence_window {
                    log::trace!("[{id}] refinement of seed {} converged", entry.seed);
                    break;
                }
            }
        }

        if let Some(cb) = progress.as_deref_mut() {
            let keep_going = cb(&ProgressReport {
                sample_count: shared.sample_count,
                phase: Phase::LocalSearch,
                current: slot as u64,
                total: shared.slots as u64,
                elapsed,
                best_score,
                convergence: last_improvement.elapsed().as_secs_f32()
                    / shared.convergence_window.as_secs_f32(),
            });
            if !keep_going {
                log::info!("[{id}] cancelled from the progress callback");
                if let Ok(mut state) = shared.state.lock() {
                    state.stop.get_or_insert(StopReason::Cancelled);
                }
                shared.cancel.cancel();
                break;
            }
        }
    }

    (best_score, vectors)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::run;
    use crate::{
        generator::generate,
        metric::{score, MetricWeights},
        params::{DistributionParams, SampleCount},
        perturb::{is_feasible, try_perturb},
        search::{
            CancelToken, LocalSearchConfig, ProgressReport, SearchConfig, Shortlist, StopReason,
        },
    };

    fn shortlist_of(seeds: &[(u64, f32)], capacity: usize) -> Shortlist {
        let mut list = Shortlist::new(capacity);
        for (seed, seed_score) in seeds {
            list.offer(*seed, *seed_score);
        }
        list
    }

    #[test]
    fn refinement_never_ends_below_the_generated_score() {
        let params = DistributionParams::ssao();
        let weights = MetricWeights::default();
        let config = SearchConfig {
            threads: 0,
            ..Default::default()
        };
        let ls = LocalSearchConfig {
            max_iters: 2_000,
            max_seconds: 30.0,
            convergence_pct: 1.0,
            perturbation_dist: (0.01, 0.05),
        };

        for seed in [3, 17, 99] {
            let start = score(&generate(&params, SampleCount::X4, seed), weights);
            let shortlist = shortlist_of(&[(seed, start)], 1);

            let mut progress = |_: &ProgressReport| true;
            let outcome = run(
                &params,
                SampleCount::X4,
                &config,
                &ls,
                shortlist,
                &CancelToken::new(),
                &mut progress,
            )
            .unwrap();

            assert_eq!(outcome.stop, StopReason::ExhaustedSeeds);
            let best = outcome.best.expect("one non-empty slot must be refined");
            assert!(best.score >= start, "seed {seed} got worse: {} < {start}", best.score);
            assert_eq!(best.vectors.len(), 4);
            assert!(best.vectors.iter().all(|v| is_feasible(&params, *v)));
        }
    }

    #[test]
    fn hill_climb_acceptance_is_monotone() {
        let params = DistributionParams::ssao();
        let weights = MetricWeights::default();
        let mut rng = crate::Rng::seed_from_u64(7);

        let mut vectors = generate(&params, SampleCount::X8, 11);
        let mut best = score(&vectors, weights);

        for _ in 0..3_000 {
            if let Some((idx, previous)) = try_perturb(&params, &mut rng, &mut vectors, 0.03) {
                let new_score = score(&vectors, weights);
                if new_score > best {
                    best = new_score;
                } else {
                    vectors[idx] = previous;
                }
                let tracked = score(&vectors, weights);
                assert!(
                    tracked >= best - 1e-6,
                    "tracked best decreased: {tracked} < {best}"
                );
            }
        }
    }

    #[test]
    fn empty_shortlist_yields_no_result() {
        let params = DistributionParams::ssao();
        let config = SearchConfig {
            threads: 2,
            ..Default::default()
        };
        let ls = LocalSearchConfig::default();

        let mut progress = |_: &ProgressReport| true;
        let outcome = run(
            &params,
            SampleCount::X4,
            &config,
            &ls,
            Shortlist::new(8),
            &CancelToken::new(),
            &mut progress,
        )
        .unwrap();

        assert_eq!(outcome.stop, StopReason::ExhaustedSeeds);
        assert!(outcome.best.is_none());
    }

    #[test]
    fn every_slot_is_refined() {
        let params = DistributionParams::ssao();
        let weights = MetricWeights::default();
        let config = SearchConfig {
            threads: 3,
            ..Default::default()
        };
        let ls = LocalSearchConfig {
            max_iters: 200,
            max_seconds: 30.0,
            convergence_pct: 1.0,
            perturbation_dist: (0.01, 0.05),
        };

        let seeds: Vec<(u64, f32)> = (0..4)
            .map(|seed| {
                (
                    seed,
                    score(&generate(&params, SampleCount::X4, seed), weights),
                )
            })
            .collect();
        let best_start = seeds.iter().map(|(_, s)| *s).fold(f32::MIN, f32::max);
        let shortlist = shortlist_of(&seeds, 4);

        let mut progress = |_: &ProgressReport| true;
        let outcome = run(
            &params,
            SampleCount::X4,
            &config,
            &ls,
            shortlist,
            &CancelToken::new(),
            &mut progress,
        )
        .unwrap();

        let best = outcome.best.unwrap();
        assert!(best.score >= best_start);
    }
}
