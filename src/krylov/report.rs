//! Outcome of an iterative solve: status, counts, residuals and their history.
use crate::linalg::errors::{CLOSE_ZERO, LinAlgError, SolverStatus};
use csv::Writer;
use log::{info, warn};
use std::path::Path;
use tabled::{builder::Builder, settings::Style};

#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    pub solver: &'static str,
    pub status: SolverStatus,
    pub iterations: usize,
    /// |b - A x| of the returned iterate
    pub residual_norm: f64,
    pub rhs_norm: f64,
    pub relative_residual: f64,
    /// one entry per iteration, starting with the initial residual
    pub residual_history: Vec<f64>,
    /// true residual at every restart of GMRES/FGMRES
    pub cycle_residuals: Vec<f64>,
    pub soft_restarts: usize,
    pub hard_restarts: usize,
}

impl SolveReport {
    pub fn new(
        solver: &'static str,
        status: SolverStatus,
        iterations: usize,
        residual_norm: f64,
        rhs_norm: f64,
    ) -> SolveReport {
        let relative_residual = if rhs_norm > CLOSE_ZERO {
            residual_norm / rhs_norm
        } else {
            residual_norm
        };
        SolveReport {
            solver,
            status,
            iterations,
            residual_norm,
            rhs_norm,
            relative_residual,
            residual_history: Vec::new(),
            cycle_residuals: Vec::new(),
            soft_restarts: 0,
            hard_restarts: 0,
        }
    }

    pub fn with_history(mut self, history: Vec<f64>) -> Self {
        self.residual_history = history;
        self
    }

    pub fn is_converged(&self) -> bool {
        self.status.is_converged()
    }

    /// FASP style integer return code
    pub fn code(&self) -> i32 {
        self.status.code()
    }

    pub fn statistics_table(&self) -> String {
        let mut builder = Builder::default();
        builder.push_record(["solver", self.solver]);
        builder.push_record(["status".to_string(), self.status.to_string()]);
        builder.push_record(["iterations".to_string(), self.iterations.to_string()]);
        builder.push_record([
            "residual norm".to_string(),
            format!("{:.6e}", self.residual_norm),
        ]);
        builder.push_record([
            "relative residual".to_string(),
            format!("{:.6e}", self.relative_residual),
        ]);
        if !self.cycle_residuals.is_empty() {
            builder.push_record(["restart cycles".to_string(), self.cycle_residuals.len().to_string()]);
        }
        if self.soft_restarts + self.hard_restarts > 0 {
            builder.push_record(["soft restarts".to_string(), self.soft_restarts.to_string()]);
            builder.push_record(["hard restarts".to_string(), self.hard_restarts.to_string()]);
        }
        let mut table = builder.build();
        table.with(Style::modern_rounded());
        table.to_string()
    }

    pub fn log_summary(&self) {
        if self.is_converged() {
            info!(
                "{} converged in {} iterations, |r| = {:.6e}, |r|/|b| = {:.6e}",
                self.solver, self.iterations, self.residual_norm, self.relative_residual
            );
        } else {
            warn!(
                "{} stopped with status {} after {} iterations, |r| = {:.6e}: {}",
                self.solver,
                self.status,
                self.iterations,
                self.residual_norm,
                self.status.hint()
            );
        }
        info!("\n \n SOLVER STATISTICS \n \n {}", self.statistics_table());
    }

    /// Writes `iteration,residual` rows.
    pub fn save_history_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), LinAlgError> {
        let mut writer = Writer::from_path(path)?;
        writer.write_record(["iteration", "residual"])?;
        for (i, r) in self.residual_history.iter().enumerate() {
            writer.write_record(&[i.to_string(), format!("{:e}", r)])?;
        }
        writer.flush()?;
        Ok(())
    }
}
