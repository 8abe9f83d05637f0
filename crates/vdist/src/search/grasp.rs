//! Construction phase: a GRASP-style randomized seed search. Workers drain a
//! shared seed cursor, score each seed's generated set and keep the best seed
//! plus a shortlist of promising ones for local search to refine.

use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use crate::{
    generator, metric,
    params::{DistributionParams, SampleCount},
    SearchError,
};

use super::{
    CancelToken, PanicGuard, Phase, ProgressFn, ProgressReport, PromisingSeed, SearchConfig,
    Shortlist, StopReason,
};

pub struct GraspOutcome {
    pub best: Option<PromisingSeed>,
    pub shortlist: Shortlist,
    pub stop: StopReason,
    /// Seeds actually generated and scored (claimed-but-unscored seeds from a
    /// cancelled run are not counted).
    pub seeds_examined: u64,
}

struct State {
    next_seed: u64,
    seeds_examined: u64,
    best: Option<PromisingSeed>,
    last_improvement: Instant,
    shortlist: Shortlist,
    stop: Option<StopReason>,
}

struct Shared<'a> {
    params: &'a DistributionParams,
    sample_count: SampleCount,
    config: &'a SearchConfig,
    state: Mutex<State>,
    /// Stops this run only. Timeout and convergence fire it so siblings wind
    /// down without cancelling the caller's token.
    cancel: CancelToken,
    external: &'a CancelToken,
    started: Instant,
    convergence_window: Duration,
}

impl Shared<'_> {
    fn stopping(&self) -> bool {
        self.cancel.is_cancelled() || self.external.is_cancelled()
    }
}

/// Runs the construction phase for one sample count.
///
/// `config.threads` workers are spawned in a scope while the coordinator runs
/// inline on the calling thread; it alone watches the wall clock and drives
/// the progress callback. All workers are joined before returning, and a
/// panicking worker cancels its siblings and surfaces as
/// [`SearchError::WorkerPanic`].
pub fn run(
    params: &DistributionParams,
    sample_count: SampleCount,
    config: &SearchConfig,
    cancel: &CancelToken,
    progress: &mut ProgressFn<'_>,
) -> Result<GraspOutcome, SearchError> {
    let shared = Shared {
        params,
        sample_count,
        config,
        state: Mutex::new(State {
            next_seed: 0,
            seeds_examined: 0,
            best: None,
            last_improvement: Instant::now(),
            shortlist: Shortlist::new(config.promising_seeds),
            stop: None,
        }),
        cancel: CancelToken::new(),
        external: cancel,
        started: Instant::now(),
        convergence_window: Duration::from_secs_f32(config.convergence_pct * config.max_seconds),
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
        "construction for {sample_count} finished ({stop}), {} seeds examined, best {:?}",
        state.seeds_examined,
        state.best,
    );

    Ok(GraspOutcome {
        best: state.best,
        shortlist: state.shortlist,
        stop,
        seeds_examined: state.seeds_examined,
    })
}

fn worker(shared: &Shared, id: usize, mut progress: Option<&mut ProgressFn<'_>>) {
    let _guard = PanicGuard(&shared.cancel);

    loop {
        if shared.stopping() {
            if shared.external.is_cancelled() {
                record_stop(shared, StopReason::Cancelled);
            }
            break;
        }

        // Claiming a seed and advancing the cursor is one critical section.
        let claimed = {
            let Ok(mut state) = shared.state.lock() else { return };
            if state.next_seed >= shared.config.max_seeds {
                state.stop.get_or_insert(StopReason::ExhaustedSeeds);
                None
            } else {
                let seed = state.next_seed;
                state.next_seed += 1;
                Some(seed)
            }
        };
        let Some(seed) = claimed else {
            log::trace!("[{id}] no seeds left");
            break;
        };

        // Only the coordinator watches the clock and the caller.
        if let Some(cb) = progress.as_deref_mut() {
            let elapsed = shared.started.elapsed();
            let report = {
                let Ok(state) = shared.state.lock() else { return };
                ProgressReport {
                    sample_count: shared.sample_count,
                    phase: Phase::Construction,
                    current: seed,
                    total: shared.config.max_seeds,
                    elapsed,
                    best_score: state.best.map_or(f32::MIN, |b| b.score),
                    convergence: state.last_improvement.elapsed().as_secs_f32()
                        / shared.convergence_window.as_secs_f32(),
                }
            };

            if !cb(&report) {
                log::info!("[{id}] cancelled from the progress callback");
                record_stop(shared, StopReason::Cancelled);
                shared.cancel.cancel();
                break;
            }
            if elapsed.as_secs_f32() >= shared.config.max_seconds {
                log::info!("[{id}] timed out after {elapsed:?}");
                record_stop(shared, StopReason::TimedOut);
                shared.cancel.cancel();
                break;
            }
        }

        // Generation and scoring stay outside the lock.
        let vectors = generator::generate(shared.params, shared.sample_count, seed);
        let score = metric::score(&vectors, shared.config.weights);

        let Ok(mut state) = shared.state.lock() else { return };
        state.seeds_examined += 1;
        state.shortlist.offer(seed, score);

        if state.best.map_or(true, |b| score > b.score) {
            state.best = Some(PromisingSeed { seed, score });
            state.last_improvement = Instant::now();
            drop(state);
            log::debug!("[{id}] seed {seed} improves the best score to {score}");
        } else if state.last_improvement.elapsed() >= shared.convergence_window {
            state.stop.get_or_insert(StopReason::Converged);
            drop(state);
            shared.cancel.cancel();
            log::info!("[{id}] converged, no improvement within the window");
            break;
        }
    }

    log::trace!("[{id}] construction worker finished");
}

fn record_stop(shared: &Shared, reason: StopReason) {
    if let Ok(mut state) = shared.state.lock() {
        state.stop.get_or_insert(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::run;
    use crate::{
        generator::generate,
        metric::{score, MetricWeights},
        params::{DistributionParams, SampleCount},
        perturb::is_feasible,
        search::{CancelToken, ProgressReport, SearchConfig, StopReason},
    };

    fn quiet_config(max_seeds: u64, threads: usize) -> SearchConfig {
        SearchConfig {
            threads,
            max_seeds,
            // Large budgets so neither timer can fire during a test run.
            max_seconds: 1e4,
            convergence_pct: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn exhausts_the_seed_budget_exactly() {
        let params = DistributionParams::ssao();
        let config = quiet_config(100, 1);
        let mut progress = |_: &ProgressReport| true;

        let outcome = run(
            &params,
            SampleCount::X4,
            &config,
            &CancelToken::new(),
            &mut progress,
        )
        .unwrap();

        assert_eq!(outcome.stop, StopReason::ExhaustedSeeds);
        assert_eq!(outcome.seeds_examined, 100);

        let best = outcome.best.expect("100 scored seeds must produce a best");
        let floor = score(&generate(&params, SampleCount::X4, 0), config.weights);
        assert!(best.score >= floor);
        assert!(best.seed < 100);
    }

    #[test]
    fn any_thread_count_yields_a_valid_result() {
        let params = DistributionParams::ssao();
        let floor = score(
            &generate(&params, SampleCount::X8, 0),
            MetricWeights::default(),
        );

        for threads in [0, 1, 4, 8] {
            let config = quiet_config(200, threads);
            let mut progress = |_: &ProgressReport| true;
            let outcome = run(
                &params,
                SampleCount::X8,
                &config,
                &CancelToken::new(),
                &mut progress,
            )
            .unwrap();

            assert_eq!(outcome.seeds_examined, 200, "threads = {threads}");
            let best = outcome.best.unwrap();
            assert!(best.score >= floor, "threads = {threads}");

            let vectors = generate(&params, SampleCount::X8, best.seed);
            assert_eq!(vectors.len(), 8);
            assert!(vectors.iter().all(|v| is_feasible(&params, *v)));
        }
    }

    #[test]
    fn cancellation_before_the_first_seed_returns_no_result() {
        let params = DistributionParams::ssao();
        let config = quiet_config(1_000_000, 4);
        let cancel = CancelToken::new();
        cancel.cancel();

        let mut progress = |_: &ProgressReport| true;
        let outcome = run(&params, SampleCount::X4, &config, &cancel, &mut progress).unwrap();

        assert_eq!(outcome.stop, StopReason::Cancelled);
        assert_eq!(outcome.seeds_examined, 0);
        assert!(outcome.best.is_none());
    }

    #[test]
    fn progress_callback_can_cancel() {
        let params = DistributionParams::ssao();
        let config = quiet_config(1_000_000, 0);

        let mut calls = 0u32;
        let mut progress = |_: &ProgressReport| {
            calls += 1;
            calls < 10
        };
        let outcome = run(
            &params,
            SampleCount::X4,
            &config,
            &CancelToken::new(),
            &mut progress,
        )
        .unwrap();

        assert_eq!(outcome.stop, StopReason::Cancelled);
        assert!(outcome.seeds_examined < 20);
    }

    #[test]
    fn flat_scores_trigger_convergence() {
        let params = DistributionParams::ssao();
        // Zero weights make every seed score exactly 1.0; only the very first
        // seed counts as an improvement, so the run must converge.
        let config = SearchConfig {
            threads: 0,
            max_seeds: u64::MAX,
            max_seconds: 30.0,
            convergence_pct: 0.001,
            weights: MetricWeights {
                min_distance: 0.0,
                significant_samples: 0.0,
            },
            ..Default::default()
        };

        let mut progress = |_: &ProgressReport| true;
        let outcome = run(
            &params,
            SampleCount::X2,
            &config,
            &CancelToken::new(),
            &mut progress,
        )
        .unwrap();

        assert_eq!(outcome.stop, StopReason::Converged);
        assert!(outcome.best.is_some());
    }

    #[test]
    fn time_bounded_run_terminates_with_a_result() {
        let params = DistributionParams::ssao();
        let config = SearchConfig {
            threads: 2,
            max_seeds: u64::MAX,
            max_seconds: 0.05,
            convergence_pct: 1.0,
            ..Default::default()
        };

        let mut progress = |_: &ProgressReport| true;
        let outcome = run(
            &params,
            SampleCount::X4,
            &config,
            &CancelToken::new(),
            &mut progress,
        )
        .unwrap();

        // The clock and the convergence window race at this scale; either
        // terminal state is a correct time-bounded stop.
        assert!(matches!(
            outcome.stop,
            StopReason::TimedOut | StopReason::Converged
        ));
        assert!(outcome.best.is_some());
    }
}
