//! Recursive V/W cycle over a `Hierarchy`, used as a preconditioner (a fixed number of
//! cycles from a zero guess) or as a stand-alone iteration.
use crate::krylov::params::SolverParams;
use crate::krylov::report::SolveReport;
use crate::krylov::stopping::{ConvergenceMonitor, StagnationCheck, Verdict, Verification};
use crate::linalg::errors::{LinAlgError, SolverStatus};
use crate::linalg::vector::Vector;
use crate::multigrid::hierarchy::{CoarseSolverKind, Hierarchy};
use crate::operators::relaxation::SmootherKind;
use log::debug;
use strum_macros::{Display, EnumIter, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum CycleType {
    V,
    W,
}

impl CycleType {
    /// number of recursive visits of the next coarser level
    pub fn gamma(&self) -> usize {
        match self {
            CycleType::V => 1,
            CycleType::W => 2,
        }
    }
}

/// Cycle and smoother settings shared by algebraic and geometric multigrid.
#[derive(Debug, Clone, PartialEq)]
pub struct MgParams {
    pub cycle: CycleType,
    /// cycles per preconditioner application
    pub cycles: usize,
    pub smoother: SmootherKind,
    pub smoother_weight: f64,
    pub pre_sweeps: usize,
    pub post_sweeps: usize,
    pub coarse_solver: CoarseSolverKind,
    /// sweeps on the coarsest level when it is not factorized
    pub coarse_sweeps: usize,
}

impl Default for MgParams {
    fn default() -> Self {
        MgParams {
            cycle: CycleType::V,
            cycles: 1,
            smoother: SmootherKind::Sor,
            smoother_weight: 1.0,
            pre_sweeps: 1,
            post_sweeps: 1,
            coarse_solver: CoarseSolverKind::Direct,
            coarse_sweeps: 20,
        }
    }
}

impl MgParams {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_cycle(mut self, cycle: CycleType) -> Self {
        self.cycle = cycle;
        self
    }
    pub fn with_cycles(mut self, cycles: usize) -> Self {
        self.cycles = cycles;
        self
    }
    pub fn with_smoother(mut self, smoother: SmootherKind, weight: f64) -> Self {
        self.smoother = smoother;
        self.smoother_weight = weight;
        self
    }
    pub fn with_sweeps(mut self, pre: usize, post: usize) -> Self {
        self.pre_sweeps = pre;
        self.post_sweeps = post;
        self
    }
    pub fn with_coarse_solver(mut self, kind: CoarseSolverKind) -> Self {
        self.coarse_solver = kind;
        self
    }
    pub fn with_coarse_sweeps(mut self, sweeps: usize) -> Self {
        self.coarse_sweeps = sweeps;
        self
    }

    pub fn validate(&self) -> Result<(), LinAlgError> {
        if self.cycles == 0 {
            return Err(LinAlgError::InputParam("multigrid needs at least one cycle".to_string()));
        }
        if !(self.smoother_weight > 0.0) {
            return Err(LinAlgError::InputParam(format!(
                "smoother weight must be positive, got {}",
                self.smoother_weight
            )));
        }
        if self.pre_sweeps + self.post_sweeps == 0 {
            return Err(LinAlgError::InputParam(
                "multigrid needs at least one pre or post smoothing sweep".to_string(),
            ));
        }
        if self.coarse_solver == CoarseSolverKind::Smoother && self.coarse_sweeps == 0 {
            return Err(LinAlgError::InputParam(
                "coarse smoother needs at least one sweep".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct MultigridSolver {
    name: &'static str,
    hierarchy: Hierarchy,
}

impl MultigridSolver {
    /// Finalizes the hierarchy: smoothers on every level and the coarse solver.
    pub fn new(name: &'static str, mut hierarchy: Hierarchy) -> Result<Self, LinAlgError> {
        hierarchy.finalize()?;
        hierarchy.log_summary();
        Ok(MultigridSolver { name, hierarchy })
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    pub fn size(&self) -> usize {
        self.hierarchy.levels[0].size()
    }

    fn check_sizes(&self, b: &Vector, x: &Vector) -> Result<(), LinAlgError> {
        let n = self.size();
        if b.len() != n {
            return Err(LinAlgError::size_mismatch("multigrid rhs", n, b.len()));
        }
        if x.len() != n {
            return Err(LinAlgError::size_mismatch("multigrid iterate", n, x.len()));
        }
        Ok(())
    }

    /// One cycle on A x = b starting from the given x.
    pub fn cycle_once(&mut self, b: &Vector, x: &mut Vector) -> Result<(), LinAlgError> {
        self.check_sizes(b, x)?;
        {
            let fine = &mut self.hierarchy.levels[0];
            fine.b.copy_from(b)?;
            fine.x.copy_from(x)?;
        }
        self.cycle(0)?;
        x.copy_from(&self.hierarchy.levels[0].x)
    }

    /// z = M^{-1} r: `cycles` cycles from z = 0.
    pub fn precondition(&mut self, r: &Vector, z: &mut Vector) -> Result<(), LinAlgError> {
        self.check_sizes(r, z)?;
        z.fill(0.0);
        for _ in 0..self.hierarchy.params().cycles {
            self.cycle_once(r, z)?;
        }
        Ok(())
    }

    fn cycle(&mut self, l: usize) -> Result<(), LinAlgError> {
        let last = self.hierarchy.levels.len() - 1;
        if l == last {
            return self.hierarchy.solve_coarsest();
        }
        let params = self.hierarchy.params();
        let (pre, post, gamma) = (params.pre_sweeps, params.post_sweeps, params.cycle.gamma());

        {
            let fine = &mut self.hierarchy.levels[l];
            fine.smoother.smooth(&fine.a, &fine.b, &mut fine.x, pre, false)?;
            fine.a.residual(&fine.b, &fine.x, &mut fine.w)?;
        }
        {
            let (upper, lower) = self.hierarchy.levels.split_at_mut(l + 1);
            let fine = &upper[l];
            let coarse = &mut lower[0];
            let r = fine.r.as_ref().ok_or(LinAlgError::NotSetup("multigrid restriction"))?;
            r.apply(&fine.w, &mut coarse.b)?;
            coarse.x.fill(0.0);
        }
        for _ in 0..gamma {
            self.cycle(l + 1)?;
        }
        {
            let (upper, lower) = self.hierarchy.levels.split_at_mut(l + 1);
            let fine = &mut upper[l];
            let coarse = &lower[0];
            let p = fine.p.as_ref().ok_or(LinAlgError::NotSetup("multigrid prolongation"))?;
            p.apply(&coarse.x, &mut fine.w)?;
            fine.x.axpy(1.0, &fine.w)?;
            fine.smoother.smooth(&fine.a, &fine.b, &mut fine.x, post, true)?;
        }
        Ok(())
    }

    /// Cycles on A x = b until the shared stopping criteria end the iteration.
    pub fn iterate(
        &mut self,
        b: &Vector,
        x: &mut Vector,
        params: &SolverParams,
    ) -> Result<SolveReport, LinAlgError> {
        params.validate()?;
        self.check_sizes(b, x)?;
        let name = self.name;
        let mut r = Vector::new(self.size());
        self.hierarchy.levels[0].a.residual(b, x, &mut r)?;
        let mut res = r.norm2();
        let mut monitor = ConvergenceMonitor::new(name, params, b.norm2());
        if monitor.start(res) {
            return Ok(SolveReport::new(name, SolverStatus::Converged, 0, res, b.norm2())
                .with_history(monitor.into_history()));
        }

        let mut status = SolverStatus::MaxIterReached;
        let mut iter = 0;
        let mut x_old = x.clone();
        while iter < params.max_iter {
            iter += 1;
            x_old.copy_from(x)?;
            self.cycle_once(b, x)?;
            self.hierarchy.levels[0].a.residual(b, x, &mut r)?;
            let res_old = res;
            res = r.norm2();
            debug!("{} cycle {:>4}, |r| = {:.6e}", name, iter, res);
            monitor.record_iterate(iter, res, x)?;
            match monitor.check(iter, res) {
                Verdict::Continue => {
                    x_old.axpy(-1.0, x)?;
                    let step = x_old.norm2();
                    // a stationary iteration has no recurrence to restart
                    if monitor.check_stagnation(iter, res / res_old, step, x.norm2())
                        == StagnationCheck::Stagnated
                    {
                        status = SolverStatus::Stagnation;
                        break;
                    }
                }
                Verdict::Verify => match monitor.verify(res) {
                    Verification::Converged => {
                        status = SolverStatus::Converged;
                        break;
                    }
                    Verification::ToleranceTooSmall => {
                        status = SolverStatus::ToleranceTooSmall;
                        break;
                    }
                    Verification::Confirming | Verification::FalseConvergence => {}
                },
            }
        }

        if !status.is_converged() && monitor.restore_best(res, x)? {
            self.hierarchy.levels[0].a.residual(b, x, &mut r)?;
            res = r.norm2();
        }
        let report = SolveReport::new(name, status, iter, res, monitor.rhs_norm())
            .with_history(monitor.into_history());
        report.log_summary();
        Ok(report)
    }
}
