//! Restarted GMRES with left or right preconditioning.
//!
//! # Aim and General Description
//! Builds an orthonormal Krylov basis with Arnoldi (modified Gram-Schmidt) up to the
//! restart length m, keeps the Hessenberg least-squares problem in QR form with Givens
//! rotations, and restarts from the updated iterate.
//!
//! # Main Components
//! - `GmresMode`: `Right` minimizes |b - A x| and is the default; `Left` minimizes
//!   |M^{-1}(b - A x)|.
//! - `RestartWindow`: fixed m, or adaptive m between `min_restart` and `max_restart`
//!   driven by the convergence rate of the last cycle.
//!
//! # Non-obvious Features and Tips
//! - Per-iteration estimates come from the least-squares residual. In left mode they are
//!   rescaled by |r| / |M^{-1} r| of the cycle start, so the tolerance keeps meaning a
//!   true residual.
//! - The true residual is recomputed at every restart and stored in `cycle_residuals`.
//!   In right mode that sequence is non-increasing.
use crate::krylov::arnoldi::{HessenbergQr, combine, modified_gram_schmidt};
use crate::krylov::params::SolverParams;
use crate::krylov::report::SolveReport;
use crate::krylov::solver::{KrylovSolver, SolverBase, SolverState};
use crate::krylov::stopping::{ConvergenceMonitor, StagnationCheck, Verdict, Verification};
use crate::linalg::errors::{CLOSE_ZERO, LinAlgError, SMALL_TOL, SolverStatus};
use crate::linalg::vector::Vector;
use crate::operators::linear_operator::LinearOperator;
use crate::operators::preconditioner::Preconditioner;
use log::{debug, info, warn};
use strum_macros::{Display, EnumIter, EnumString};

/// cos(8 degrees): a cycle with a slower rate counts as near stagnation
pub const MAX_CR: f64 = 0.990_268_068_741_570_4;
/// cos(80 degrees): a cycle with a faster rate keeps the current window
pub const MIN_CR: f64 = 0.173_648_177_666_930_4;
pub const RESTART_DECREASE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter, Default)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum GmresMode {
    Left,
    #[default]
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestartWindow {
    min: usize,
    max: usize,
    current: usize,
    adaptive: bool,
}

impl RestartWindow {
    /// Bounds are clamped to `max_iter`; the first window is `restart` clamped to them.
    pub fn new(restart: usize, bounds: Option<(usize, usize)>, max_iter: usize) -> Self {
        let cap = max_iter.max(1);
        match bounds {
            Some((min, max)) => {
                let max = max.clamp(1, cap);
                let min = min.clamp(1, max);
                RestartWindow {
                    min,
                    max,
                    current: restart.clamp(min, max),
                    adaptive: true,
                }
            }
            None => {
                let m = restart.clamp(1, cap);
                RestartWindow {
                    min: m,
                    max: m,
                    current: m,
                    adaptive: false,
                }
            }
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// `cr` is |r| after the cycle over |r| before it.
    pub fn update(&mut self, cr: f64) {
        if !self.adaptive {
            return;
        }
        if cr > MAX_CR {
            self.current = self.max;
        } else if cr >= MIN_CR {
            if self.current > self.min + RESTART_DECREASE {
                self.current -= RESTART_DECREASE;
            } else {
                self.current = self.max;
            }
        }
    }
}

pub struct Gmres<'a> {
    base: SolverBase<'a>,
    mode: GmresMode,
    bounds: Option<(usize, usize)>,
    window: RestartWindow,
    basis: Vec<Vector>,
    qr: HessenbergQr,
    r: Vector,
    w: Vector,
    t: Vector,
    u: Vector,
}

impl<'a> Default for Gmres<'a> {
    fn default() -> Self {
        Gmres::new(GmresMode::Right)
    }
}

impl<'a> Gmres<'a> {
    pub fn new(mode: GmresMode) -> Self {
        Gmres {
            base: SolverBase::new("GMRES"),
            mode,
            bounds: None,
            window: RestartWindow::new(1, None, 1),
            basis: Vec::new(),
            qr: HessenbergQr::default(),
            r: Vector::default(),
            w: Vector::default(),
            t: Vector::default(),
            u: Vector::default(),
        }
    }

    /// Adaptive restart length between `min_restart` and `max_restart`.
    pub fn with_restart_bounds(mut self, min_restart: usize, max_restart: usize) -> Self {
        self.bounds = Some((min_restart, max_restart));
        self
    }

    pub fn mode(&self) -> GmresMode {
        self.mode
    }
}

impl<'a> KrylovSolver<'a> for Gmres<'a> {
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
        self.basis = vec![Vector::new(n); m + 1];
        self.qr = HessenbergQr::with_capacity(m);
        self.r = Vector::new(n);
        self.w = Vector::new(n);
        self.t = Vector::new(n);
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
        let mut monitor = ConvergenceMonitor::new("GMRES", &params, b_norm);
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
                // r holds the true residual of x
                let m = window.current();
                let beta = match self.mode {
                    GmresMode::Right => {
                        self.basis[0].copy_from(&self.r)?;
                        res
                    }
                    GmresMode::Left => {
                        self.base.precondition(&self.r, &mut self.basis[0])?;
                        self.basis[0].norm2()
                    }
                };
                if beta < CLOSE_ZERO {
                    warn!("GMRES: preconditioned residual vanished while |r| = {:.4e}", res);
                    status = SolverStatus::Breakdown;
                    break 'outer;
                }
                self.basis[0].scale(1.0 / beta);
                let ratio = res / beta;
                self.qr.reset(beta);

                let mut verdict = Verdict::Continue;
                let mut lucky = false;
                let mut k = 0;
                while k < m && iter < params.max_iter {
                    iter += 1;
                    match self.mode {
                        GmresMode::Right => {
                            self.base.precondition(&self.basis[k], &mut self.t)?;
                            a.apply(&self.t, &mut self.w)?;
                        }
                        GmresMode::Left => {
                            a.apply(&self.basis[k], &mut self.t)?;
                            self.base.precondition(&self.t, &mut self.w)?;
                        }
                    }
                    let w_norm = self.w.norm2();
                    let h = modified_gram_schmidt(&self.basis[..=k], &mut self.w)?;
                    let h_next = h[k + 1];
                    let estimate = self.qr.push_column(h) * ratio;
                    k += 1;
                    debug!("GMRES iter {:>5}, |r| ~ {:.6e}", iter, estimate);

                    verdict = monitor.check(iter, estimate);
                    if h_next <= SMALL_TOL * w_norm {
                        lucky = true;
                    } else {
                        self.basis[k].copy_from(&self.w)?;
                        self.basis[k].scale(1.0 / h_next);
                    }
                    if verdict != Verdict::Continue || lucky {
                        break;
                    }
                }

                let y = match self.qr.solve() {
                    Ok(y) => y,
                    Err(e) => {
                        warn!("GMRES: singular least-squares problem ({})", e);
                        status = SolverStatus::Breakdown;
                        break 'outer;
                    }
                };
                combine(&self.basis[..k], &y, &mut self.u)?;
                match self.mode {
                    GmresMode::Right => {
                        self.base.precondition(&self.u, &mut self.t)?;
                        x.axpy(1.0, &self.t)?;
                    }
                    GmresMode::Left => x.axpy(1.0, &self.u)?,
                }
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
                let step = match self.mode {
                    GmresMode::Right => self.t.norm2(),
                    GmresMode::Left => self.u.norm2(),
                };
                // every cycle restarts anyway, so only a stop matters here
                if monitor.check_stagnation(iter, res / previous, step, x.norm2())
                    == StagnationCheck::Stagnated
                {
                    status = SolverStatus::Stagnation;
                    break 'outer;
                }
                window.update(res / previous);
                info!(
                    "GMRES restart after {} iterations, |r| = {:.6e}, next window {}",
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
        self.basis.clear();
        self.qr = HessenbergQr::default();
        self.r = Vector::default();
        self.w = Vector::default();
        self.t = Vector::default();
        self.u = Vector::default();
    }

    fn state(&self) -> SolverState {
        self.base.state
    }

    fn name(&self) -> &'static str {
        self.base.name
    }
}
