use std::sync::Mutex;
use std::time::Instant;

use tracing::info;

use crate::algorithm::CollisionResult;
use crate::stats::ProgressSnapshot;
use crate::telemetry::ProgressObserver;

struct PrinterState {
    header_printed: bool,
    last_print: Option<Instant>,
    prev_t: Instant,
    prev_tried: u64,
}

/// Prints a table row per progress update, at most once per `interval_secs`.
pub struct StatPrinter {
    interval_secs: f64,
    bits: u32,
    state: Mutex<PrinterState>,
}

impl StatPrinter {
    /// `bits` is the width of the match the search needs, used for the ETA.
    pub fn new(interval_secs: f64, bits: u32) -> Self {
        Self {
            interval_secs,
            bits,
            state: Mutex::new(PrinterState {
                header_printed: false,
                last_print: None,
                prev_t: Instant::now(),
                prev_tried: 0,
            }),
        }
    }

    fn header() -> String {
        format!(
            "{t:>14} {kps:>9} {et:>8} {p:>9} {el:>8}",
            t = "tried",
            kps = "kcand/s",
            et = "ETA",
            p = "progress",
            el = "elapsed",
        )
    }
}

impl ProgressObserver for StatPrinter {
    fn progress_changed(&self, stats: &ProgressSnapshot) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        if let Some(last) = state.last_print {
            if (now - last).as_secs_f64() < self.interval_secs {
                return;
            }
        }
        if !state.header_printed {
            println!("{}", Self::header());
            state.header_printed = true;
        }

        let dt = (now - state.prev_t).as_secs_f64();
        let cps = if dt > 0.0 {
            stats.combinations_tried.saturating_sub(state.prev_tried) as f64 / dt
        } else {
            0.0
        };
        state.prev_t = now;
        state.prev_tried = stats.combinations_tried;
        state.last_print = Some(now);

        let expected_time =
            stats.estimate_time_to_collision(self.bits, stats.elapsed.as_secs_f64());

        println!(
            "{t:>14} {kps:>9.2} {et:>8.1} {p:>4}/{pm:<4} {el:>7.1}s",
            t = stats.combinations_tried,
            kps = cps / 1e3,
            et = expected_time,
            p = stats.match_progress,
            pm = stats.match_progress_max,
            el = stats.elapsed.as_secs_f64(),
        );
    }

    fn result_found(&self, result: &CollisionResult) {
        println!("found collision! {:?}", result);
    }
}

/// Emits progress as `tracing` events.
pub struct LogObserver;

impl ProgressObserver for LogObserver {
    fn progress_changed(&self, stats: &ProgressSnapshot) {
        info!(
            tried = stats.combinations_tried,
            progress = stats.match_progress,
            progress_max = stats.match_progress_max,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "search progress"
        );
    }

    fn result_found(&self, result: &CollisionResult) {
        info!(
            first = %hex::encode(result.first),
            second = %hex::encode(result.second),
            "collision found"
        );
    }
}
