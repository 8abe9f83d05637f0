mod progress;

use std::str::FromStr;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use progress::Reporter;
use vdist::{
    kernel::KernelUniforms,
    metric::MetricWeights,
    optimizer::{ConfigResult, Optimizer},
    params::{DistributionParams, SampleCount},
    search::{CancelToken, LocalSearchConfig, ProgressReport, SearchConfig},
    utils::timer::format_elapsed,
};

#[derive(Debug, Clone, Copy)]
struct DistRange {
    min: f32,
    max: f32,
}

impl FromStr for DistRange {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((a, b)) = s.split_once("..") else {
            anyhow::bail!("expected `min..max`, got `{s}`");
        };
        Ok(DistRange {
            min: a.parse()?,
            max: b.parse()?,
        })
    }
}

#[derive(Debug, Default, Clone, Copy, ValueEnum)]
enum Preset {
    /// Serialized defaults of the distribution asset.
    #[default]
    Default,
    /// Hand-tuned screen-space ambient-occlusion kernel.
    Ssao,
}

impl From<Preset> for DistributionParams {
    fn from(preset: Preset) -> Self {
        match preset {
            Preset::Default => DistributionParams::default(),
            Preset::Ssao => DistributionParams::ssao(),
        }
    }
}

#[derive(Parser, Debug)]
struct Args {
    /// Sample count to optimize, e.g. "4" or "x4". Omitted, every supported
    /// count is swept in ascending order.
    #[arg(short, long)]
    samples: Option<SampleCount>,

    #[arg(short, long, value_enum, default_value_t)]
    preset: Preset,

    /// Extra worker threads. Defaults to the available parallelism minus one
    /// (the coordinator occupies the calling thread).
    #[arg(short, long)]
    threads: Option<usize>,

    #[arg(long, default_value_t = 10_000)]
    max_seeds: u64,

    #[arg(long, default_value_t = 60.0)]
    max_seconds: f32,

    /// Fraction of the time budget without improvement that counts as converged.
    #[arg(long, default_value_t = 0.1)]
    convergence_pct: f32,

    /// Shortlist capacity carried into local search.
    #[arg(long, default_value_t = 100)]
    promising_seeds: usize,

    #[arg(long, default_value_t = 1.0)]
    min_distance_weight: f32,

    #[arg(long, default_value_t = 0.0)]
    significant_samples_weight: f32,

    /// Refine the shortlist by perturbation-based local search.
    #[arg(short, long)]
    local_search: bool,

    #[arg(long, default_value_t = 10_000)]
    ls_max_iters: u64,

    #[arg(long, default_value_t = 60.0)]
    ls_max_seconds: f32,

    #[arg(long, default_value_t = 0.3)]
    ls_convergence_pct: f32,

    /// Range the per-seed perturbation distance is drawn from, `min..max`.
    #[arg(long, default_value = "0.01..0.1")]
    perturbation_dist: DistRange,

    /// Also print the shader uniform block of each best set.
    #[arg(short, long)]
    uniforms: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let threads = args.threads.unwrap_or_else(|| {
        std::thread::available_parallelism().map_or(0, |n| n.get().saturating_sub(1))
    });
    log::info!("running with {threads} worker threads");

    let config = SearchConfig {
        threads,
        max_seeds: args.max_seeds,
        max_seconds: args.max_seconds,
        convergence_pct: args.convergence_pct,
        promising_seeds: args.promising_seeds,
        weights: MetricWeights {
            min_distance: args.min_distance_weight,
            significant_samples: args.significant_samples_weight,
        },
        local_search: args.local_search.then(|| LocalSearchConfig {
            max_iters: args.ls_max_iters,
            max_seconds: args.ls_max_seconds,
            convergence_pct: args.ls_convergence_pct,
            perturbation_dist: (args.perturbation_dist.min, args.perturbation_dist.max),
        }),
    };

    let params: DistributionParams = args.preset.into();
    let optimizer = Optimizer::new(params, config)?;

    let cancel = CancelToken::new();
    let mut reporter = Reporter::new();
    let mut progress = |report: &ProgressReport| reporter.update(report);

    let results = match args.samples {
        Some(samples) => vec![optimizer.optimize(samples, &cancel, &mut progress)?],
        None => optimizer.optimize_all(&cancel, &mut progress)?,
    };

    reporter.finish_line();
    for result in &results {
        print_result(&params, result, args.uniforms);
    }

    Ok(())
}

fn print_result(params: &DistributionParams, result: &ConfigResult, uniforms: bool) {
    println!(
        "== {} | {} | {} seeds | {}",
        result.sample_count,
        result.stop,
        result.seeds_examined,
        format_elapsed(result.elapsed),
    );

    let Some(best) = &result.best else {
        println!("   no set was scored before the search stopped");
        return;
    };

    println!("   seed {} scored {:.6}", best.seed, best.score);
    for v in &best.vectors {
        println!("   ({:+.6}, {:+.6}, {:+.6})", v.x, v.y, v.z);
    }

    if uniforms {
        let block = KernelUniforms::new(params, &best.vectors);
        println!(
            "   uniforms: count {}, rcp {:.6}, depth {}..{}, angle step {:.6} rad, exponent {}",
            block.sample_count,
            block.rcp_sample_count,
            block.min_depth,
            block.max_depth,
            block.vertical_angle_step,
            block.depth_exponent,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::DistRange;

    #[test]
    fn dist_range_parses_min_max() {
        let range: DistRange = "0.01..0.1".parse().unwrap();
        assert_eq!(range.min, 0.01);
        assert_eq!(range.max, 0.1);

        assert!("0.5".parse::<DistRange>().is_err());
        assert!("a..b".parse::<DistRange>().is_err());
    }
}
