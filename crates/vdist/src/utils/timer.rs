pub struct TimedResult<T> {
    pub res: T,
    pub elapsed: std::time::Duration,
}

pub fn timed_scope<R, F: FnOnce() -> R>(f: F) -> TimedResult<R> {
    let begin = std::time::Instant::now();
    let res = f();

    let elapsed = begin.elapsed();

    TimedResult { res, elapsed }
}

pub fn format_elapsed(elapsed: std::time::Duration) -> String {
    if elapsed < std::time::Duration::from_millis(1) {
        let micro = elapsed.as_secs_f32() * 1000. * 1000.;
        format!("{micro:.7}µs")
    } else if elapsed < std::time::Duration::from_secs(1) {
        let milli = elapsed.as_secs_f32() * 1000.;
        format!("{milli:.7}ms")
    } else if elapsed < std::time::Duration::from_secs(60) {
        let s = elapsed.as_secs_f32();
        format!("{s:.3}s")
    } else {
        let elapsed_secs = elapsed.as_secs_f32();
        let elapsed_minutes = elapsed_secs / 60.;
        let elapsed_hours = elapsed_minutes / 60.;
        let h = elapsed_hours as u32;
        let m = (elapsed_minutes % 60.0) as u32;
        let s = (elapsed_secs % 60.0) as u32;
        format!("{h}h{m}m{s}s")
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::format_elapsed;

    #[test]
    fn elapsed_formatting_picks_the_right_unit() {
        assert!(format_elapsed(Duration::from_micros(12)).ends_with("µs"));
        assert!(format_elapsed(Duration::from_millis(12)).ends_with("ms"));
        assert_eq!(format_elapsed(Duration::from_secs(5)), "5.000s");
        assert_eq!(format_elapsed(Duration::from_secs(3661)), "1h1m1s");
    }
}
