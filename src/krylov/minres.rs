//! Preconditioned MINRES (Paige-Saunders) for symmetric, possibly indefinite systems.
//!
//! The Lanczos tridiagonal matrix is reduced by Givens rotations as it grows, and x is
//! updated through three rotating direction vectors. The preconditioner must be SPD;
//! a negative r^T M^{-1} r is reported as a breakdown.
use crate::krylov::params::SolverParams;
use crate::krylov::report::SolveReport;
use crate::krylov::solver::{KrylovSolver, SolverBase, SolverState};
use crate::krylov::stopping::{ConvergenceMonitor, StagnationCheck, Verdict, Verification};
use crate::linalg::errors::{CLOSE_ZERO, LinAlgError, SolverStatus};
use crate::linalg::vector::Vector;
use crate::operators::linear_operator::LinearOperator;
use crate::operators::preconditioner::Preconditioner;
use log::{debug, warn};
use std::mem::swap;

pub struct Minres<'a> {
    base: SolverBase<'a>,
    r1: Vector,
    r2: Vector,
    y: Vector,
    v: Vector,
    w: Vector,
    w1: Vector,
    w2: Vector,
    /// true residual b - A x, kept apart from the Lanczos vectors
    rt: Vector,
}

impl<'a> Default for Minres<'a> {
    fn default() -> Self {
        Minres::new()
    }
}

impl<'a> Minres<'a> {
    pub fn new() -> Self {
        Minres {
            base: SolverBase::new("MINRES"),
            r1: Vector::default(),
            r2: Vector::default(),
            y: Vector::default(),
            v: Vector::default(),
            w: Vector::default(),
            w1: Vector::default(),
            w2: Vector::default(),
            rt: Vector::default(),
        }
    }
}

impl<'a> KrylovSolver<'a> for Minres<'a> {
    fn setup(
        &mut self,
        a: &'a dyn LinearOperator,
        pc: Option<&'a mut dyn Preconditioner>,
        params: &SolverParams,
    ) -> Result<(), LinAlgError> {
        self.base.setup(a, pc, params)?;
        let n = self.base.size();
        for v in [
            &mut self.r1,
            &mut self.r2,
            &mut self.y,
            &mut self.v,
            &mut self.w,
            &mut self.w1,
            &mut self.w2,
            &mut self.rt,
        ] {
            *v = Vector::new(n);
        }
        Ok(())
    }

    fn solve(&mut self, b: &Vector, x: &mut Vector) -> Result<SolveReport, LinAlgError> {
        let a = self.base.begin(b, x)?;
        let b_norm = b.norm2();
        if b_norm == 0.0 {
            return Ok(self.base.zero_rhs(x));
        }
        let params = self.base.params.clone();
        let mut monitor = ConvergenceMonitor::new("MINRES", &params, b_norm);
        a.residual(b, x, &mut self.r1)?;
        let mut iter = 0;
        let mut hard_restarts = 0;
        let mut status = SolverStatus::MaxIterReached;

        if monitor.start(self.r1.norm2()) {
            status = SolverStatus::Converged;
        } else {
            'outer: loop {
                // r1 holds the true residual of x
                let r0_norm = self.r1.norm2();
                self.base.precondition(&self.r1, &mut self.y)?;
                let beta1_sq = self.r1.dot(&self.y)?;
                if beta1_sq < 0.0 {
                    warn!("MINRES: r^T M^-1 r = {:.4e} < 0, preconditioner is not SPD", beta1_sq);
                    status = SolverStatus::Breakdown;
                    break 'outer;
                }
                let beta1 = beta1_sq.sqrt();
                if beta1 < CLOSE_ZERO {
                    status = SolverStatus::Breakdown;
                    break 'outer;
                }
                // phibar measures the residual in the M^{-1} norm
                let scale = r0_norm / beta1;
                self.r2.copy_from(&self.r1)?;
                self.w.fill(0.0);
                self.w2.fill(0.0);
                let (mut oldb, mut beta, mut dbar, mut epsln) = (0.0, beta1, 0.0, 0.0);
                let (mut phibar, mut cs, mut sn) = (beta1, -1.0, 0.0);
                let mut first = true;

                loop {
                    if iter >= params.max_iter {
                        break 'outer;
                    }
                    iter += 1;
                    // Lanczos step
                    self.v.copy_from(&self.y)?;
                    self.v.scale(1.0 / beta);
                    a.apply(&self.v, &mut self.y)?;
                    if !first {
                        self.y.axpy(-beta / oldb, &self.r1)?;
                    }
                    first = false;
                    let alfa = self.v.dot(&self.y)?;
                    self.y.axpy(-alfa / beta, &self.r2)?;
                    swap(&mut self.r1, &mut self.r2);
                    self.r2.copy_from(&self.y)?;
                    self.base.precondition(&self.r2, &mut self.y)?;
                    oldb = beta;
                    let beta_sq = self.r2.dot(&self.y)?;
                    if beta_sq < 0.0 {
                        warn!("MINRES: r^T M^-1 r = {:.4e} < 0, preconditioner is not SPD", beta_sq);
                        status = SolverStatus::Breakdown;
                        break 'outer;
                    }
                    beta = beta_sq.sqrt();

                    // previous rotation on the new column, then a new rotation
                    let oldeps = epsln;
                    let delta = cs * dbar + sn * alfa;
                    let gbar = sn * dbar - cs * alfa;
                    epsln = sn * beta;
                    dbar = -cs * beta;
                    let gamma = gbar.hypot(beta).max(f64::EPSILON);
                    cs = gbar / gamma;
                    sn = beta / gamma;
                    let phi = cs * phibar;
                    phibar *= sn;

                    // w = (v - oldeps w1 - delta w2) / gamma with (w1, w2) <- (w2, w)
                    swap(&mut self.w1, &mut self.w2);
                    swap(&mut self.w2, &mut self.w);
                    self.w.copy_from(&self.v)?;
                    self.w.axpy(-oldeps, &self.w1)?;
                    self.w.axpy(-delta, &self.w2)?;
                    self.w.scale(1.0 / gamma);
                    x.axpy(phi, &self.w)?;

                    let ratio = sn.abs();
                    let estimate = phibar * scale;
                    debug!("MINRES iter {:>5}, |r| ~ {:.6e}", iter, estimate);
                    monitor.record_iterate(iter, estimate, x)?;
                    match monitor.check(iter, estimate) {
                        Verdict::Continue => {
                            let step = phi.abs() * self.w.norm2();
                            match monitor.check_stagnation(iter, ratio, step, x.norm2()) {
                                StagnationCheck::Progress => {}
                                StagnationCheck::Restart => {
                                    a.residual(b, x, &mut self.r1)?;
                                    continue 'outer;
                                }
                                StagnationCheck::Stagnated => {
                                    status = SolverStatus::Stagnation;
                                    break 'outer;
                                }
                            }
                        }
                        Verdict::Verify => {
                            a.residual(b, x, &mut self.rt)?;
                            match monitor.verify(self.rt.norm2()) {
                                Verification::Converged => {
                                    status = SolverStatus::Converged;
                                    break 'outer;
                                }
                                Verification::ToleranceTooSmall => {
                                    status = SolverStatus::ToleranceTooSmall;
                                    break 'outer;
                                }
                                Verification::FalseConvergence => {
                                    hard_restarts += 1;
                                    self.r1.copy_from(&self.rt)?;
                                    continue 'outer;
                                }
                                Verification::Confirming => {}
                            }
                        }
                    }
                    if beta < CLOSE_ZERO {
                        // invariant Krylov space: nothing more to gain
                        status = SolverStatus::Breakdown;
                        break 'outer;
                    }
                }
            }
        }
        let mut report = self.base.finish(b, x, status, iter, monitor)?;
        report.hard_restarts = hard_restarts;
        report.log_summary();
        Ok(report)
    }

    fn clean(&mut self) {
        self.base.clean();
        for v in [
            &mut self.r1,
            &mut self.r2,
            &mut self.y,
            &mut self.v,
            &mut self.w,
            &mut self.w1,
            &mut self.w2,
            &mut self.rt,
        ] {
            *v = Vector::default();
        }
    }

    fn state(&self) -> SolverState {
        self.base.state
    }

    fn name(&self) -> &'static str {
        self.base.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::gallery::{laplacian_1d, shifted_laplacian_1d};
    use crate::operators::relaxation::Jacobi;

    #[test]
    fn test_minres_on_indefinite_system() {
        let a = shifted_laplacian_1d(50, 0.5).unwrap();
        let n = a.nrow();
        let x_true = Vector::from_vec((0..n).map(|i| ((i + 1) as f64 * 0.2).sin()).collect());
        let mut b = Vector::new(n);
        a.apply(&x_true, &mut b).unwrap();
        let mut solver = Minres::new();
        let params = SolverParams::new().with_rel_tol(1e-10).with_abs_tol(0.0).with_max_iter(300);
        solver.setup(&a, None, &params).unwrap();
        let mut x = Vector::new(n);
        let rep = solver.solve(&b, &mut x).unwrap();
        assert!(rep.is_converged(), "status {}", rep.status);
        for i in 0..n {
            assert!((x[i] - x_true[i]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_preconditioned_minres_on_spd_system() {
        let a = laplacian_1d(30).unwrap();
        let b = Vector::filled(30, 1.0);
        let mut jac = Jacobi::new(1.0, 1);
        jac.setup(&a).unwrap();
        let mut solver = Minres::new();
        let params = SolverParams::new().with_rel_tol(1e-8).with_abs_tol(0.0);
        solver.setup(&a, Some(&mut jac), &params).unwrap();
        let mut x = Vector::new(30);
        let rep = solver.solve(&b, &mut x).unwrap();
        assert!(rep.is_converged());
        assert!(rep.relative_residual <= 1e-8);
    }
}
