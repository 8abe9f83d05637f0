//! Runs the two-phase search end to end, per sample count or as a sweep over
//! every supported kernel size.

use std::time::Duration;

use glam::Vec3;

use crate::{
    generator, metric,
    params::{DistributionParams, SampleCount},
    search::{grasp, local, BestSet, CancelToken, ProgressFn, SearchConfig, StopReason},
    utils::timer::{format_elapsed, timed_scope},
    SearchError,
};

/// The single-sample kernel is not worth searching; one fixed short vector
/// straight up is what the consuming shaders expect.
const SINGLE_SAMPLE_VECTOR: Vec3 = Vec3::new(0.0, 0.4, 0.0);

/// Outcome of optimizing one sample count.
#[derive(Debug, Clone)]
pub struct ConfigResult {
    pub sample_count: SampleCount,
    /// Best set found. None only when nothing was scored before stopping.
    pub best: Option<BestSet>,
    pub stop: StopReason,
    pub seeds_examined: u64,
    pub elapsed: Duration,
}

pub struct Optimizer {
    params: DistributionParams,
    config: SearchConfig,
}

impl Optimizer {
    pub fn new(params: DistributionParams, config: SearchConfig) -> Result<Self, SearchError> {
        config.validate()?;
        Ok(Self { params, config })
    }

    pub fn params(&self) -> &DistributionParams {
        &self.params
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Optimizes one sample count: construction, then local search when
    /// configured. A cancelled or timed-out run still reports the best set
    /// found up to that point.
    pub fn optimize(
        &self,
        sample_count: SampleCount,
        cancel: &CancelToken,
        progress: &mut ProgressFn<'_>,
    ) -> Result<ConfigResult, SearchError> {
        if sample_count == SampleCount::X1 {
            let vectors = vec![SINGLE_SAMPLE_VECTOR];
            let score = metric::score(&vectors, self.config.weights);
            return Ok(ConfigResult {
                sample_count,
                best: Some(BestSet {
                    seed: 0,
                    score,
                    vectors,
                }),
                stop: StopReason::ExhaustedSeeds,
                seeds_examined: 0,
                elapsed: Duration::ZERO,
            });
        }

        let timed = timed_scope(
            || -> Result<(Option<BestSet>, StopReason, u64), SearchError> {
                let outcome =
                    grasp::run(&self.params, sample_count, &self.config, cancel, progress)?;
                let mut best = outcome.best.map(|p| BestSet {
                    seed: p.seed,
                    score: p.score,
                    vectors: generator::generate(&self.params, sample_count, p.seed),
                });
                let mut stop = outcome.stop;

                if stop != StopReason::Cancelled {
                    if let Some(ls) = &self.config.local_search {
                        let refined = local::run(
                            &self.params,
                            sample_count,
                            &self.config,
                            ls,
                            outcome.shortlist,
                            cancel,
                            progress,
                        )?;
                        if let Some(r) = refined.best {
                            if best.as_ref().map_or(true, |b| r.score > b.score) {
                                best = Some(r);
                            }
                        }
                        if refined.stop == StopReason::Cancelled {
                            stop = StopReason::Cancelled;
                        }
                    }
                }

                Ok((best, stop, outcome.seeds_examined))
            },
        );
        let (best, stop, seeds_examined) = timed.res?;

        log::info!(
            "{sample_count}: {stop} after {} ({seeds_examined} seeds, best {:?})",
            format_elapsed(timed.elapsed),
            best.as_ref().map(|b| b.score),
        );

        Ok(ConfigResult {
            sample_count,
            best,
            stop,
            seeds_examined,
            elapsed: timed.elapsed,
        })
    }

    /// Sweeps every supported sample count in ascending order. The sweep ends
    /// early when the token is cancelled or a run reports cancellation;
    /// results for the counts already finished are still returned.
    pub fn optimize_all(
        &self,
        cancel: &CancelToken,
        progress: &mut ProgressFn<'_>,
    ) -> Result<Vec<ConfigResult>, SearchError> {
        let mut results = Vec::with_capacity(SampleCount::ALL.len());
        for sample_count in SampleCount::ALL {
            if cancel.is_cancelled() {
                log::info!("sweep cancelled before {sample_count}");
                break;
            }
            let result = self.optimize(sample_count, cancel, progress)?;
            let stop = result.stop;
            results.push(result);
            if stop == StopReason::Cancelled {
                break;
            }
        }
        Ok(results)
    }
}
