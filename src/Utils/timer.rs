//! Wall-clock timing of the phases of a linear solve.
//!
//! The timer is an explicit handle passed as `Option<&mut SolverTimer>`; nothing is kept
//! in global state. Every `tic`/`tac` pair adds to the total of its phase, so a phase may
//! be timed several times.
use log::info;
use std::time::{Duration, Instant};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};
use tabled::{builder::Builder, settings::Style};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum Phase {
    #[strum(to_string = "Setup")]
    Setup,
    #[strum(to_string = "Preconditioner setup")]
    PrecondSetup,
    #[strum(to_string = "Solve")]
    Solve,
}

/// Unit and value for a human-readable duration.
pub fn elapsed_time(elapsed: Duration) -> (String, f64) {
    let time = elapsed.as_millis();
    if time < 1000 {
        ("ms".to_string(), elapsed.as_secs_f64() * 1e3)
    } else if time < 60_000 {
        ("s".to_string(), elapsed.as_secs_f64())
    } else if time < 3_600_000 {
        ("min".to_string(), elapsed.as_secs_f64() / 60.0)
    } else {
        ("h".to_string(), elapsed.as_secs_f64() / 3600.0)
    }
}

#[derive(Debug, Clone)]
pub struct SolverTimer {
    start: Instant,
    running: [Option<Instant>; 3],
    totals: [Duration; 3],
}

impl Default for SolverTimer {
    fn default() -> Self {
        SolverTimer::new()
    }
}

impl SolverTimer {
    pub fn new() -> SolverTimer {
        SolverTimer {
            start: Instant::now(),
            running: [None; 3],
            totals: [Duration::ZERO; 3],
        }
    }

    /// Resets every phase and the overall clock.
    pub fn start(&mut self) {
        *self = SolverTimer::new();
    }

    pub fn tic(&mut self, phase: Phase) {
        self.running[phase as usize] = Some(Instant::now());
    }

    /// Adds the time since the matching `tic`; a `tac` without `tic` is ignored.
    pub fn tac(&mut self, phase: Phase) -> Duration {
        match self.running[phase as usize].take() {
            Some(t0) => {
                let dt = t0.elapsed();
                self.totals[phase as usize] += dt;
                dt
            }
            None => Duration::ZERO,
        }
    }

    pub fn elapsed(&self, phase: Phase) -> Duration {
        self.totals[phase as usize]
    }

    pub fn total(&self) -> Duration {
        self.start.elapsed()
    }

    /// Rows of (phase, share of total time in %, time).
    pub fn get_all(&self) -> Vec<(String, String, String)> {
        let total = self.total();
        let total_ns = total.as_nanos().max(1) as f64;
        let mut rows = Vec::new();
        for phase in Phase::iter() {
            let dt = self.elapsed(phase);
            let (unit, value) = elapsed_time(dt);
            let percent = 100.0 * dt.as_nanos() as f64 / total_ns;
            rows.push((
                phase.to_string(),
                format!("{:.3}", percent),
                format!("{:.3} {}", value, unit),
            ));
        }
        let (unit, value) = elapsed_time(total);
        rows.push(("Total".to_string(), "100".to_string(), format!("{:.3} {}", value, unit)));
        rows
    }

    pub fn table(&self) -> String {
        let mut builder = Builder::default();
        builder.push_record(["phase", "%", "time"]);
        for (phase, percent, time) in self.get_all() {
            builder.push_record([phase, percent, time]);
        }
        let mut table = builder.build();
        table.with(Style::modern_rounded());
        table.to_string()
    }

    pub fn log_summary(&self) {
        info!("\n \n TIMER DATA \n \n {}", self.table());
    }
}
