use std::{
    fmt::Display,
    io::Write,
    time::{Duration, Instant},
};

use vdist::search::{Phase, ProgressReport};

pub struct PercentBar {
    pub percent: f32,
    pub width: usize,
}

impl Display for PercentBar {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let filled = ((self.width - 1) as f32 * self.percent).round() as usize;
        write!(
            f,
            "[{empty:=>width_left$}>{empty:.<width_right$}] {percent:.1}%",
            empty = "",
            width_left = filled,
            width_right = self.width - 1 - filled,
            percent = 100. * self.percent
        )
    }
}

/// Single-line in-place progress display, throttled so the search threads are
/// not slowed down by terminal writes.
pub struct Reporter {
    last_print: Option<Instant>,
    interval: Duration,
    dirty: bool,
}

impl Reporter {
    pub fn new() -> Self {
        Self {
            last_print: None,
            interval: Duration::from_millis(300),
            dirty: false,
        }
    }

    pub fn update(&mut self, report: &ProgressReport) -> bool {
        if self
            .last_print
            .is_some_and(|at| at.elapsed() < self.interval)
        {
            return true;
        }
        self.last_print = Some(Instant::now());
        self.dirty = true;

        let phase = match report.phase {
            Phase::Construction => "construction",
            Phase::LocalSearch => "local search",
        };
        let percent = if report.total == 0 {
            0.0
        } else {
            report.current as f32 / report.total as f32
        };
        print!(
            "\r{:>4} {phase:>12} {} best {:.4}",
            report.sample_count.to_string(),
            PercentBar {
                percent,
                width: 40
            },
            report.best_score.max(0.0),
        );
        let _ = std::io::stdout().flush();
        true
    }

    /// Terminates the in-place line so regular prints start fresh.
    pub fn finish_line(&mut self) {
        if self.dirty {
            println!();
            self.dirty = false;
        }
    }
}
