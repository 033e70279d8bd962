//! Flexible GMRES: right preconditioning where M may change from one iteration to the
//! next (e.g. an inner Krylov solve or a multigrid cycle with varying work). The
//! preconditioned vectors z_j = M_j^{-1} v_j are stored and the update is x += Z y.
use crate::krylov::arnoldi::{HessenbergQr, combine, modified_gram_schmidt};
use crate::krylov::gmres::RestartWindow;
use crate::krylov::params::SolverParams;
use crate::krylov::report::SolveReport;
use crate::krylov::solver::{KrylovSolver, SolverBase, SolverState};
use crate::krylov::stopping::{ConvergenceMonitor, StagnationCheck, Verdict, Verification};
use crate::linalg::errors::{CLOSE_ZERO, LinAlgError, SMALL_TOL, SolverStatus};
use crate::linalg::vector::Vector;
use crate::operators::linear_operator::LinearOperator;
use crate::operators::preconditioner::Preconditioner;
use log::{debug, info, warn};

pub struct Fgmres<'a> {
    base: SolverBase<'a>,
    bounds: Option<(usize, usize)>,
    window: RestartWindow,
    v: Vec<Vector>,
    z: Vec<Vector>,
    qr: HessenbergQr,
    r: Vector,
    w: Vector,
    u: Vector,
}

impl<'a> Default for Fgmres<'a> {
    fn default() -> Self {
        Fgmres::new()
    }
}

impl<'a> Fgmres<'a> {
    pub fn new() -> Self {
        Fgmres {
            base: SolverBase::new("FGMRES"),
            bounds: None,
            window: RestartWindow::new(1, None, 1),
            v: Vec::new(),
            z: Vec::new(),
            qr: HessenbergQr::default(),
            r: Vector::default(),
            w: Vector::default(),
            u: Vector::default(),
        }
    }

    pub fn with_restart_bounds(mut self, min_restart: usize, max_restart: usize) -> Self {
        self.bounds = Some((min_restart, max_restart));
        self
    }
}

impl<'a> KrylovSolver<'a> for Fgmres<'a> {
    fn setup(
        &mut self,
        a: &'a dyn LinearOperator,
        pc: Option<&'a mut dyn Preconditioner>,
        params: &SolverParams,
    ) -> Result<(), LinAlgError> {
        self.base.setup(a, pc, params)?;
        let n = self.base.size();
        self.window = RestartWindow::new(params.restart, self.bounds, params.max_iter);
        let m = self.window.max();
        self.v = vec![Vector::new(n); m + 1];
        self.z = vec![Vector::new(n); m];
        self.qr = HessenbergQr::with_capacity(m);
        self.r = Vector::new(n);
        self.w = Vector::new(n);
        self.u = Vector::new(n);
        Ok(())
    }

    fn solve(&mut self, b: &Vector, x: &mut Vector) -> Result<SolveReport, LinAlgError> {
        let a = self.base.begin(b, x)?;
        let b_norm = b.norm2();
        if b_norm == 0.0 {
            return Ok(self.base.zero_rhs(x));
        }
        let params = self.base.params.clone();
        let mut window = self.window.clone();
        let mut monitor = ConvergenceMonitor::new("FGMRES", &params, b_norm);
        a.residual(b, x, &mut self.r)?;
        let mut res = self.r.norm2();
        let mut cycle_residuals = vec![res];
        let mut iter = 0;
        let mut hard_restarts = 0;
        let mut status = SolverStatus::MaxIterReached;

        if monitor.start(res) {
            status = SolverStatus::Converged;
        } else {
            'outer: while iter < params.max_iter {
                let m = window.current();
                if res < CLOSE_ZERO {
                    // x is exact; finish() reports this as convergence
                    status = SolverStatus::Breakdown;
                    break 'outer;
                }
                self.v[0].copy_from(&self.r)?;
                self.v[0].scale(1.0 / res);
                self.qr.reset(res);

                let mut verdict = Verdict::Continue;
                let mut lucky = false;
                let mut k = 0;
                while k < m && iter < params.max_iter {
                    iter += 1;
                    self.base.precondition(&self.v[k], &mut self.z[k])?;
                    a.apply(&self.z[k], &mut self.w)?;
                    let w_norm = self.w.norm2();
                    let h = modified_gram_schmidt(&self.v[..=k], &mut self.w)?;
                    let h_next = h[k + 1];
                    let estimate = self.qr.push_column(h);
                    k += 1;
                    debug!("FGMRES iter {:>5}, |r| ~ {:.6e}", iter, estimate);

                    verdict = monitor.check(iter, estimate);
                    if h_next <= SMALL_TOL * w_norm {
                        lucky = true;
                    } else {
                        self.v[k].copy_from(&self.w)?;
                        self.v[k].scale(1.0 / h_next);
                    }
                    if verdict != Verdict::Continue || lucky {
                        break;
                    }
                }

                let y = match self.qr.solve() {
                    Ok(y) => y,
                    Err(e) => {
                        warn!("FGMRES: singular least-squares problem ({})", e);
                        status = SolverStatus::Breakdown;
                        break 'outer;
                    }
                };
                combine(&self.z[..k], &y, &mut self.u)?;
                x.axpy(1.0, &self.u)?;
                a.residual(b, x, &mut self.r)?;
                let previous = res;
                res = self.r.norm2();
                cycle_residuals.push(res);
                monitor.record_iterate(iter, res, x)?;

                let verify = verdict == Verdict::Verify
                    || lucky
                    || (res <= monitor.tolerance() && iter >= params.min_iter);
                if verify {
                    match monitor.verify(res) {
                        Verification::Converged => {
                            status = SolverStatus::Converged;
                            break 'outer;
                        }
                        Verification::ToleranceTooSmall => {
                            status = SolverStatus::ToleranceTooSmall;
                            break 'outer;
                        }
                        Verification::FalseConvergence => hard_restarts += 1,
                        Verification::Confirming => {}
                    }
                }
                let step = self.u.norm2();
                // every cycle restarts anyway, so only a stop matters here
                if monitor.check_stagnation(iter, res / previous, step, x.norm2())
                    == StagnationCheck::Stagnated
                {
                    status = SolverStatus::Stagnation;
                    break 'outer;
                }
                window.update(res / previous);
                info!(
                    "FGMRES restart after {} iterations, |r| = {:.6e}, next window {}",
                    iter,
                    res,
                    window.current()
                );
            }
        }
        let mut report = self.base.finish(b, x, status, iter, monitor)?;
        report.cycle_residuals = cycle_residuals;
        report.hard_restarts = hard_restarts;
        report.log_summary();
        Ok(report)
    }

    fn clean(&mut self) {
        self.base.clean();
        self.v.clear();
        self.z.clear();
        self.qr = HessenbergQr::default();
        self.r = Vector::default();
        self.w = Vector::default();
        self.u = Vector::default();
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
    use crate::linalg::csr::CsrMatrix;
    use crate::linalg::gallery::convection_diffusion_1d;

    /// Jacobi whose weight changes on every call: a preconditioner that is not a fixed
    /// linear operator
    struct DriftingJacobi {
        inv_diag: Vector,
        calls: usize,
    }

    impl Preconditioner for DriftingJacobi {
        fn setup(&mut self, a: &CsrMatrix) -> Result<(), LinAlgError> {
            self.inv_diag = a.get_diag();
            self.inv_diag.reciprocal()
        }
        fn solve(&mut self, r: &Vector, z: &mut Vector) -> Result<(), LinAlgError> {
            self.calls += 1;
            z.copy_from(r)?;
            z.pointwise_mult(&self.inv_diag)?;
            z.scale(if self.calls % 2 == 0 { 0.7 } else { 1.3 });
            Ok(())
        }
        fn clean(&mut self) {}
        fn name(&self) -> &'static str {
            "DriftingJacobi"
        }
    }

    #[test]
    fn test_fgmres_with_varying_preconditioner() {
        let a = convection_diffusion_1d(60, 30.0).unwrap();
        let n = a.nrow();
        let b = Vector::filled(n, 1.0);
        let mut pc = DriftingJacobi {
            inv_diag: Vector::default(),
            calls: 0,
        };
        pc.setup(&a).unwrap();
        let mut solver = Fgmres::new().with_restart_bounds(10, 30);
        let params = SolverParams::new().with_rel_tol(1e-9).with_abs_tol(0.0).with_max_iter(600);
        solver.setup(&a, Some(&mut pc), &params).unwrap();
        let mut x = Vector::new(n);
        let rep = solver.solve(&b, &mut x).unwrap();
        assert!(rep.is_converged(), "status {}", rep.status);
        assert!(rep.relative_residual <= 1e-9);
        assert!(
            rep.cycle_residuals
                .windows(2)
                .all(|w| w[1] <= w[0] * (1.0 + 1e-12))
        );
    }
}
