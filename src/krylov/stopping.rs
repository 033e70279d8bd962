//! Stopping criteria shared by the Krylov, relaxation and multigrid iterations.
//!
//! The monitor sees one residual norm per iteration and answers whether to go on or to
//! verify an apparent convergence against the true residual. Slowly converging steps are
//! also tested for stagnation: a step that hardly moves the iterate restarts the
//! recurrence, and too many such restarts end the solve. It also keeps the best iterate
//! so a non-converged solve can return it.
use crate::krylov::params::SolverParams;
use crate::linalg::errors::{CLOSE_ZERO, LinAlgError, MAX_STAG_NUM};
use crate::linalg::vector::Vector;
use log::warn;

/// Residual reduction per step above which the step is tested for stagnation.
pub const KSM_CHK_RATIO: f64 = 0.95;
/// A step is stagnant when |dx| / |x| falls below this factor times `rel_tol`.
pub const SOL_STAG_FACTOR: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    /// the recurrence claims convergence: compute b - A x and call `verify`
    Verify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Converged,
    /// true residual is small; run `safe_iter` more iterations before accepting it
    Confirming,
    /// true residual is not small; the solver restarts its recurrence from the iterate
    FalseConvergence,
    ToleranceTooSmall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagnationCheck {
    Progress,
    /// the step barely changed x: restart the recurrence from the true residual
    Restart,
    Stagnated,
}

#[derive(Debug, Clone)]
pub struct ConvergenceMonitor {
    solver: &'static str,
    tol: f64,
    step_tol: f64,
    rhs_norm: f64,
    min_iter: usize,
    safe_iter: usize,
    sav_iter: usize,
    max_stag: usize,
    stag_restarts: usize,
    confirm_left: Option<usize>,
    false_count: usize,
    history: Vec<f64>,
    best_iterate: Option<(f64, Vector)>,
}

impl ConvergenceMonitor {
    pub fn new(solver: &'static str, params: &SolverParams, rhs_norm: f64) -> Self {
        ConvergenceMonitor {
            solver,
            tol: (params.rel_tol * rhs_norm).max(params.abs_tol),
            step_tol: SOL_STAG_FACTOR * params.rel_tol,
            rhs_norm,
            min_iter: params.min_iter,
            safe_iter: params.safe_iter,
            sav_iter: params.sav_iter,
            max_stag: params.max_stag,
            stag_restarts: 0,
            confirm_left: None,
            false_count: 0,
            history: Vec::new(),
            best_iterate: None,
        }
    }

    /// max(rel_tol * |b|, abs_tol)
    pub fn tolerance(&self) -> f64 {
        self.tol
    }

    pub fn rhs_norm(&self) -> f64 {
        self.rhs_norm
    }

    /// Records the initial residual; returns true if it already meets the tolerance.
    pub fn start(&mut self, r0: f64) -> bool {
        self.history.push(r0);
        r0 <= self.tol && self.min_iter == 0 && self.safe_iter == 0
    }

    pub fn check(&mut self, iter: usize, res: f64) -> Verdict {
        self.history.push(res);

        if let Some(left) = self.confirm_left {
            if res > self.tol {
                warn!(
                    "{}: residual {:.4e} rebounded above tolerance {:.4e} while confirming convergence",
                    self.solver, res, self.tol
                );
                self.confirm_left = None;
            } else if left <= 1 {
                self.confirm_left = Some(0);
                return Verdict::Verify;
            } else {
                self.confirm_left = Some(left - 1);
                return Verdict::Continue;
            }
        }

        if iter >= self.min_iter && res <= self.tol {
            return Verdict::Verify;
        }
        Verdict::Continue
    }

    /// Stagnation test for a step that reduced the residual by `ratio` (new over old),
    /// moved the iterate by `step_norm` and left it with norm `x_norm`. Fast steps are
    /// never tested. A vanishing iterate or more than `max_stag` stagnant steps stop
    /// the solve.
    pub fn check_stagnation(
        &mut self,
        iter: usize,
        ratio: f64,
        step_norm: f64,
        x_norm: f64,
    ) -> StagnationCheck {
        if self.max_stag == 0 || iter < self.min_iter || ratio <= KSM_CHK_RATIO {
            return StagnationCheck::Progress;
        }
        if x_norm < CLOSE_ZERO {
            warn!("{}: iterate vanished at iteration {}", self.solver, iter);
            return StagnationCheck::Stagnated;
        }
        let rel_step = step_norm / x_norm;
        if rel_step >= self.step_tol {
            return StagnationCheck::Progress;
        }
        if self.stag_restarts >= self.max_stag {
            warn!(
                "{}: stopped after {} stagnation restarts, |dx|/|x| = {:.4e}",
                self.solver, self.stag_restarts, rel_step
            );
            return StagnationCheck::Stagnated;
        }
        self.stag_restarts += 1;
        warn!(
            "{}: possible stagnation at iteration {}, |dx|/|x| = {:.4e}, restart {} of {}",
            self.solver, iter, rel_step, self.stag_restarts, self.max_stag
        );
        StagnationCheck::Restart
    }

    pub fn stagnation_restarts(&self) -> usize {
        self.stag_restarts
    }

    pub fn verify(&mut self, true_res: f64) -> Verification {
        if let Some(last) = self.history.last_mut() {
            *last = true_res;
        }
        if true_res <= self.tol {
            match self.confirm_left {
                Some(0) => Verification::Converged,
                Some(_) => Verification::Confirming,
                None if self.safe_iter == 0 || true_res <= CLOSE_ZERO => Verification::Converged,
                None => {
                    self.confirm_left = Some(self.safe_iter);
                    Verification::Confirming
                }
            }
        } else {
            self.confirm_left = None;
            self.false_count += 1;
            warn!(
                "{}: false convergence, true residual {:.4e} > tolerance {:.4e} ({} of {})",
                self.solver, true_res, self.tol, self.false_count, MAX_STAG_NUM
            );
            if self.false_count > MAX_STAG_NUM {
                Verification::ToleranceTooSmall
            } else {
                Verification::FalseConvergence
            }
        }
    }

    pub fn is_confirming(&self) -> bool {
        self.confirm_left.is_some()
    }

    pub fn false_convergences(&self) -> usize {
        self.false_count
    }

    /// A breakdown with an already small residual is a convergence, not a failure.
    pub fn breakdown_is_converged(&self, true_res: f64) -> bool {
        true_res <= self.tol
    }

    /// Keeps `x` if it is the best iterate seen since `sav_iter`.
    pub fn record_iterate(&mut self, iter: usize, res: f64, x: &Vector) -> Result<(), LinAlgError> {
        if iter < self.sav_iter {
            return Ok(());
        }
        if let Some((best, saved)) = &mut self.best_iterate {
            if res < *best {
                *best = res;
                saved.copy_from(x)?;
            }
        } else {
            self.best_iterate = Some((res, x.clone()));
        }
        Ok(())
    }

    /// Replaces `x` by the saved best iterate if that one has a smaller residual than
    /// `current_res`. Returns whether `x` changed.
    pub fn restore_best(&mut self, current_res: f64, x: &mut Vector) -> Result<bool, LinAlgError> {
        if let Some((best, saved)) = &self.best_iterate {
            if *best < current_res {
                x.copy_from(saved)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn history(&self) -> &[f64] {
        &self.history
    }

    pub fn into_history(self) -> Vec<f64> {
        self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SolverParams {
        SolverParams::new().with_rel_tol(1e-6).with_abs_tol(0.0)
    }

    #[test]
    fn test_tolerance_uses_rhs_norm() {
        let m = ConvergenceMonitor::new("test", &params(), 10.0);
        assert!((m.tolerance() - 1e-5).abs() < 1e-20);
        let m = ConvergenceMonitor::new("test", &params().with_abs_tol(1e-3), 10.0);
        assert_eq!(m.tolerance(), 1e-3);
    }

    #[test]
    fn test_min_iter_delays_verification() {
        let mut m = ConvergenceMonitor::new("test", &params().with_min_iter(3), 1.0);
        m.start(1.0);
        assert_eq!(m.check(1, 1e-9), Verdict::Continue);
        assert_eq!(m.check(2, 1e-9), Verdict::Continue);
        assert_eq!(m.check(3, 1e-9), Verdict::Verify);
        assert_eq!(m.verify(1e-9), Verification::Converged);
    }

    #[test]
    fn test_safe_iterations_confirm_convergence() {
        let mut m = ConvergenceMonitor::new("test", &params().with_safe_iter(2), 1.0);
        m.start(1.0);
        assert_eq!(m.check(1, 1e-7), Verdict::Verify);
        assert_eq!(m.verify(1e-7), Verification::Confirming);
        assert!(m.is_confirming());
        assert_eq!(m.check(2, 1e-8), Verdict::Continue);
        assert_eq!(m.check(3, 1e-8), Verdict::Verify);
        assert_eq!(m.verify(1e-8), Verification::Converged);
    }

    #[test]
    fn test_rebound_cancels_confirmation() {
        let mut m = ConvergenceMonitor::new("test", &params().with_safe_iter(3), 1.0);
        m.start(1.0);
        m.check(1, 1e-7);
        assert_eq!(m.verify(1e-7), Verification::Confirming);
        assert_eq!(m.check(2, 1e-3), Verdict::Continue);
        assert!(!m.is_confirming());
    }

    #[test]
    fn test_false_convergence_is_bounded() {
        let mut m = ConvergenceMonitor::new("test", &params(), 1.0);
        m.start(1.0);
        for k in 0..MAX_STAG_NUM {
            assert_eq!(m.check(k + 1, 1e-9), Verdict::Verify);
            assert_eq!(m.verify(1e-2), Verification::FalseConvergence);
        }
        m.check(MAX_STAG_NUM + 1, 1e-9);
        assert_eq!(m.verify(1e-2), Verification::ToleranceTooSmall);
        assert_eq!(m.false_convergences(), MAX_STAG_NUM + 1);
    }

    #[test]
    fn test_stagnation_needs_slow_residual_and_tiny_step() {
        let mut m = ConvergenceMonitor::new("test", &params().with_max_stag(2), 1.0);
        m.start(1.0);
        // fast residual decrease is never tested
        assert_eq!(m.check_stagnation(1, 0.5, 0.0, 1.0), StagnationCheck::Progress);
        // slow residual but the iterate still moves
        assert_eq!(m.check_stagnation(2, 1.2, 1e-3, 1.0), StagnationCheck::Progress);
        assert_eq!(m.check_stagnation(3, 1.0, 1e-12, 1.0), StagnationCheck::Restart);
        assert_eq!(m.check_stagnation(4, 1.0, 1e-12, 1.0), StagnationCheck::Restart);
        assert_eq!(m.check_stagnation(5, 1.0, 1e-12, 1.0), StagnationCheck::Stagnated);
        assert_eq!(m.stagnation_restarts(), 2);
        assert_eq!(m.check_stagnation(6, 1.0, 0.0, 0.0), StagnationCheck::Stagnated);

        let mut off = ConvergenceMonitor::new("test", &params().with_max_stag(0), 1.0);
        off.start(1.0);
        for k in 1..50 {
            assert_eq!(off.check(k, 1.0), Verdict::Continue);
            assert_eq!(off.check_stagnation(k, 1.0, 0.0, 1.0), StagnationCheck::Progress);
        }
    }

    #[test]
    fn test_non_monotone_residuals_do_not_stop() {
        let mut m = ConvergenceMonitor::new("test", &params(), 1.0);
        m.start(1.0);
        for k in 1..200 {
            let res = if k % 2 == 0 { 0.9 } else { 1.1 };
            assert_eq!(m.check(k, res), Verdict::Continue);
            assert_eq!(m.check_stagnation(k, 1.2, 1e-2, 1.0), StagnationCheck::Progress);
        }
    }

    #[test]
    fn test_best_iterate_round_trip() {
        let mut m = ConvergenceMonitor::new("test", &params().with_sav_iter(2), 1.0);
        let mut x = Vector::filled(2, 1.0);
        m.record_iterate(1, 0.01, &x).unwrap();
        m.record_iterate(2, 0.5, &x).unwrap();
        x.fill(2.0);
        m.record_iterate(3, 0.1, &x).unwrap();
        x.fill(3.0);
        m.record_iterate(4, 0.2, &x).unwrap();
        assert!(m.restore_best(0.3, &mut x).unwrap());
        assert_eq!(x.as_slice(), &[2.0, 2.0]);
        assert!(!m.restore_best(0.05, &mut x).unwrap());
    }
}
