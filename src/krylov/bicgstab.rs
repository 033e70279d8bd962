//! Right-preconditioned BiCGStab (van der Vorst) for general nonsymmetric systems.
//!
//! Near-zero denominators (rho = r_hat^T r, sigma = r_hat^T v, or a vanishing omega) are
//! never divided by: the recurrence is soft-restarted from the true residual with a new
//! shadow vector r_hat = r. A failed true-residual check after an apparent convergence
//! is a hard restart. Both counts end up in the report. An iteration that stops at the
//! half step (|s| below tolerance) has no valid omega, so the recurrence is rebuilt from
//! the accepted iterate before iterating further.
use crate::krylov::params::SolverParams;
use crate::krylov::report::SolveReport;
use crate::krylov::solver::{KrylovSolver, SolverBase, SolverState};
use crate::krylov::stopping::{ConvergenceMonitor, StagnationCheck, Verdict, Verification};
use crate::linalg::errors::{CLOSE_ZERO, LinAlgError, MAX_STAG_NUM, SMALL_TOL, SolverStatus};
use crate::linalg::vector::Vector;
use crate::operators::linear_operator::LinearOperator;
use crate::operators::preconditioner::Preconditioner;
use log::{debug, warn};

pub struct BiCgStab<'a> {
    base: SolverBase<'a>,
    r: Vector,
    r_hat: Vector,
    p: Vector,
    p_hat: Vector,
    v: Vector,
    s_hat: Vector,
    t: Vector,
}

impl<'a> Default for BiCgStab<'a> {
    fn default() -> Self {
        BiCgStab::new()
    }
}

impl<'a> BiCgStab<'a> {
    pub fn new() -> Self {
        BiCgStab {
            base: SolverBase::new("BiCGStab"),
            r: Vector::default(),
            r_hat: Vector::default(),
            p: Vector::default(),
            p_hat: Vector::default(),
            v: Vector::default(),
            s_hat: Vector::default(),
            t: Vector::default(),
        }
    }
}

/// |num| small relative to the norms it was formed from
fn negligible(num: f64, scale: f64) -> bool {
    !num.is_finite() || num.abs() <= SMALL_TOL * scale || num.abs() < CLOSE_ZERO
}

impl<'a> KrylovSolver<'a> for BiCgStab<'a> {
    fn setup(
        &mut self,
        a: &'a dyn LinearOperator,
        pc: Option<&'a mut dyn Preconditioner>,
        params: &SolverParams,
    ) -> Result<(), LinAlgError> {
        self.base.setup(a, pc, params)?;
        let n = self.base.size();
        for v in [
            &mut self.r,
            &mut self.r_hat,
            &mut self.p,
            &mut self.p_hat,
            &mut self.v,
            &mut self.s_hat,
            &mut self.t,
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
        let mut monitor = ConvergenceMonitor::new("BiCGStab", &params, b_norm);
        a.residual(b, x, &mut self.r)?;
        let mut iter = 0;
        let mut status = SolverStatus::MaxIterReached;
        let mut soft_restarts = 0;
        let mut hard_restarts = 0;
        // soft restarts since the residual last improved
        let mut idle_restarts = 0;
        let mut best = self.r.norm2();
        let mut res_old = best;

        if monitor.start(best) {
            status = SolverStatus::Converged;
        } else {
            'outer: loop {
                a.residual(b, x, &mut self.r)?;
                self.r_hat.copy_from(&self.r)?;
                let mut fresh = true;
                let (mut rho_old, mut alpha, mut omega) = (1.0, 1.0, 1.0);

                loop {
                    if iter >= params.max_iter {
                        break 'outer;
                    }
                    let r_norm = self.r.norm2();
                    if r_norm < CLOSE_ZERO {
                        // x is exact; finish() reports this as convergence
                        status = SolverStatus::Breakdown;
                        break 'outer;
                    }
                    let rho = self.r_hat.dot(&self.r)?;
                    if negligible(rho, self.r_hat.norm2() * r_norm) {
                        warn!("BiCGStab: rho = {:.4e} vanished, soft restart", rho);
                        soft_restarts += 1;
                        idle_restarts += 1;
                        if idle_restarts > MAX_STAG_NUM {
                            status = SolverStatus::Breakdown;
                            break 'outer;
                        }
                        continue 'outer;
                    }
                    if fresh {
                        self.p.copy_from(&self.r)?;
                        fresh = false;
                    } else {
                        let beta = (rho / rho_old) * (alpha / omega);
                        // p = r + beta (p - omega v)
                        self.p.axpy(-omega, &self.v)?;
                        self.p.xpay(beta, &self.r)?;
                    }

                    self.base.precondition(&self.p, &mut self.p_hat)?;
                    a.apply(&self.p_hat, &mut self.v)?;
                    let sigma = self.r_hat.dot(&self.v)?;
                    if negligible(sigma, self.r_hat.norm2() * self.v.norm2()) {
                        warn!("BiCGStab: r_hat^T v = {:.4e} vanished, soft restart", sigma);
                        soft_restarts += 1;
                        idle_restarts += 1;
                        if idle_restarts > MAX_STAG_NUM {
                            status = SolverStatus::Breakdown;
                            break 'outer;
                        }
                        continue 'outer;
                    }
                    iter += 1;
                    alpha = rho / sigma;
                    // s = r - alpha v, kept in r
                    self.r.axpy(-alpha, &self.v)?;
                    x.axpy(alpha, &self.p_hat)?;
                    let mut step = alpha.abs() * self.p_hat.norm2();

                    let mut restart_after = false;
                    let half_step = self.r.norm2() <= monitor.tolerance();
                    if !half_step {
                        self.base.precondition(&self.r, &mut self.s_hat)?;
                        a.apply(&self.s_hat, &mut self.t)?;
                        let tt = self.t.dot(&self.t)?;
                        if tt < CLOSE_ZERO {
                            restart_after = true;
                        } else {
                            omega = self.t.dot(&self.r)? / tt;
                            x.axpy(omega, &self.s_hat)?;
                            step += omega.abs() * self.s_hat.norm2();
                            self.r.axpy(-omega, &self.t)?;
                            restart_after = negligible(omega, 1.0);
                        }
                    }

                    let res = self.r.norm2();
                    debug!("BiCGStab iter {:>5}, |r| = {:.6e}", iter, res);
                    if res < best {
                        best = res;
                        idle_restarts = 0;
                    }
                    monitor.record_iterate(iter, res, x)?;
                    let ratio = res / res_old;
                    res_old = res;
                    match monitor.check(iter, res) {
                        Verdict::Continue => {
                            match monitor.check_stagnation(iter, ratio, step, x.norm2()) {
                                StagnationCheck::Progress => {}
                                StagnationCheck::Restart => continue 'outer,
                                StagnationCheck::Stagnated => {
                                    status = SolverStatus::Stagnation;
                                    break 'outer;
                                }
                            }
                        }
                        Verdict::Verify => {
                            a.residual(b, x, &mut self.r)?;
                            match monitor.verify(self.r.norm2()) {
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
                                    continue 'outer;
                                }
                                Verification::Confirming => {}
                            }
                        }
                    }
                    if restart_after {
                        warn!("BiCGStab: omega vanished at iteration {}, soft restart", iter);
                        soft_restarts += 1;
                        idle_restarts += 1;
                        if idle_restarts > MAX_STAG_NUM {
                            status = SolverStatus::Breakdown;
                            break 'outer;
                        }
                        continue 'outer;
                    }
                    if half_step {
                        continue 'outer;
                    }
                    rho_old = rho;
                }
            }
        }
        let mut report = self.base.finish(b, x, status, iter, monitor)?;
        report.soft_restarts = soft_restarts;
        report.hard_restarts = hard_restarts;
        report.log_summary();
        Ok(report)
    }

    fn clean(&mut self) {
        self.base.clean();
        for v in [
            &mut self.r,
            &mut self.r_hat,
            &mut self.p,
            &mut self.p_hat,
            &mut self.v,
            &mut self.s_hat,
            &mut self.t,
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
