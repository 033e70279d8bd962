//! Jacobi, SOR and SSOR relaxation.
//!
//! `Relaxation` holds only the inverted diagonal and the sweep settings; the matrix is
//! passed to every sweep, so one smoother object per multigrid level is enough. The
//! `Jacobi`, `Sor` and `Ssor` preconditioners wrap a `Relaxation` together with a copy of
//! the matrix and start every application from a zero guess.
use crate::krylov::params::SolverParams;
use crate::krylov::report::SolveReport;
use crate::krylov::stopping::{ConvergenceMonitor, StagnationCheck, Verdict, Verification};
use crate::linalg::csr::CsrMatrix;
use crate::linalg::errors::{LinAlgError, SMALL_TOL, SolverStatus};
use crate::linalg::vector::Vector;
use crate::operators::preconditioner::Preconditioner;
use log::debug;
use strum_macros::{Display, EnumIter, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SmootherKind {
    Jacobi,
    /// forward Gauss-Seidel with weight; weight 1 is plain Gauss-Seidel
    Sor,
    /// forward then backward SOR sweep
    Ssor,
}

#[derive(Debug, Clone)]
pub struct Relaxation {
    pub kind: SmootherKind,
    pub weight: f64,
    pub sweeps: usize,
    inv_diag: Vector,
    work: Vector,
    ready: bool,
}

impl Relaxation {
    pub fn new(kind: SmootherKind, weight: f64, sweeps: usize) -> Self {
        Relaxation {
            kind,
            weight,
            sweeps,
            inv_diag: Vector::default(),
            work: Vector::default(),
            ready: false,
        }
    }

    /// Inverts the diagonal. Zero or tiny diagonal entries are reported here, never as a
    /// division by zero during a sweep.
    pub fn setup(&mut self, a: &CsrMatrix) -> Result<(), LinAlgError> {
        if !a.is_square() {
            return Err(LinAlgError::MatrixSize(format!(
                "relaxation needs a square matrix, got {} x {}",
                a.nrow(),
                a.mcol()
            )));
        }
        if !(self.weight > 0.0) {
            return Err(LinAlgError::InputParam(format!(
                "relaxation weight must be positive, got {}",
                self.weight
            )));
        }
        let mut diag = a.get_diag();
        if let Some(row) = diag.iter().position(|d| d.abs() < SMALL_TOL) {
            return Err(LinAlgError::ZeroDiagonal { row });
        }
        diag.reciprocal()?;
        self.inv_diag = diag;
        self.work = Vector::new(a.nrow());
        self.ready = true;
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn clean(&mut self) {
        self.inv_diag = Vector::default();
        self.work = Vector::default();
        self.ready = false;
    }

    fn check(&self, a: &CsrMatrix, b: &Vector, x: &Vector) -> Result<(), LinAlgError> {
        if !self.ready {
            return Err(LinAlgError::NotSetup("Relaxation"));
        }
        let n = self.inv_diag.len();
        if a.nrow() != n {
            return Err(LinAlgError::size_mismatch("Relaxation matrix", n, a.nrow()));
        }
        if b.len() != n {
            return Err(LinAlgError::size_mismatch("Relaxation rhs", n, b.len()));
        }
        if x.len() != n {
            return Err(LinAlgError::size_mismatch("Relaxation iterate", n, x.len()));
        }
        Ok(())
    }

    /// `sweeps` relaxation sweeps on A x = b starting from the current x.
    pub fn relax(&mut self, a: &CsrMatrix, b: &Vector, x: &mut Vector) -> Result<(), LinAlgError> {
        self.smooth(a, b, x, self.sweeps, false)
    }

    /// Explicit sweep count. With `post = true` SOR sweeps run backward, so a V-cycle
    /// with SOR pre-smoothing stays symmetric; Jacobi and SSOR ignore the flag.
    pub fn smooth(
        &mut self,
        a: &CsrMatrix,
        b: &Vector,
        x: &mut Vector,
        sweeps: usize,
        post: bool,
    ) -> Result<(), LinAlgError> {
        self.check(a, b, x)?;
        for _ in 0..sweeps {
            match self.kind {
                SmootherKind::Jacobi => self.jacobi_sweep(a, b, x)?,
                SmootherKind::Sor => self.sor_sweep(a, b, x, post),
                SmootherKind::Ssor => {
                    self.sor_sweep(a, b, x, false);
                    self.sor_sweep(a, b, x, true);
                }
            }
        }
        Ok(())
    }

    /// x = x + w D^{-1} (b - A x)
    fn jacobi_sweep(&mut self, a: &CsrMatrix, b: &Vector, x: &mut Vector) -> Result<(), LinAlgError> {
        a.residual(b, x, &mut self.work)?;
        self.work.pointwise_mult(&self.inv_diag)?;
        x.axpy(self.weight, &self.work)
    }

    fn sor_sweep(&self, a: &CsrMatrix, b: &Vector, x: &mut Vector, backward: bool) {
        let n = a.nrow();
        let w = self.weight;
        let mut update = |i: usize| {
            let (cols, vals) = a.row(i);
            let mut s = b[i];
            for (&j, &v) in cols.iter().zip(vals.iter()) {
                if j != i {
                    s -= v * x[j];
                }
            }
            x[i] = (1.0 - w) * x[i] + w * s * self.inv_diag[i];
        };
        if backward {
            (0..n).rev().for_each(&mut update);
        } else {
            (0..n).for_each(&mut update);
        }
    }
}

macro_rules! relaxation_preconditioner {
    ($name:ident, $kind:expr, $label:expr) => {
        #[derive(Debug, Clone)]
        pub struct $name {
            relax: Relaxation,
            a: Option<CsrMatrix>,
        }

        impl $name {
            pub fn new(weight: f64, sweeps: usize) -> Self {
                $name {
                    relax: Relaxation::new($kind, weight, sweeps),
                    a: None,
                }
            }

            pub fn relaxation(&self) -> &Relaxation {
                &self.relax
            }
        }

        impl Preconditioner for $name {
            fn setup(&mut self, a: &CsrMatrix) -> Result<(), LinAlgError> {
                self.relax.setup(a)?;
                self.a = Some(a.clone());
                Ok(())
            }

            fn solve(&mut self, r: &Vector, z: &mut Vector) -> Result<(), LinAlgError> {
                let a = self.a.as_ref().ok_or(LinAlgError::NotSetup($label))?;
                z.fill(0.0);
                self.relax.relax(a, r, z)
            }

            fn clean(&mut self) {
                self.relax.clean();
                self.a = None;
            }

            fn name(&self) -> &'static str {
                $label
            }
        }
    };
}

relaxation_preconditioner!(Jacobi, SmootherKind::Jacobi, "Jacobi");
relaxation_preconditioner!(Sor, SmootherKind::Sor, "SOR");
relaxation_preconditioner!(Ssor, SmootherKind::Ssor, "SSOR");

/// Relaxation used as a stand-alone solver. Convergence is tested on the true residual
/// after every application of `smoother.sweeps` sweeps.
pub fn relaxation_solve(
    smoother: &mut Relaxation,
    a: &CsrMatrix,
    b: &Vector,
    x: &mut Vector,
    params: &SolverParams,
) -> Result<SolveReport, LinAlgError> {
    params.validate()?;
    let name = match smoother.kind {
        SmootherKind::Jacobi => "Jacobi",
        SmootherKind::Sor => "SOR",
        SmootherKind::Ssor => "SSOR",
    };
    let mut r = Vector::new(a.nrow());
    a.residual(b, x, &mut r)?;
    let mut monitor = ConvergenceMonitor::new(name, params, b.norm2());
    let mut res = r.norm2();
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
        smoother.relax(a, b, x)?;
        a.residual(b, x, &mut r)?;
        let res_old = res;
        res = r.norm2();
        debug!("{} iter {:>5}, |r| = {:.6e}", name, iter, res);
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
        a.residual(b, x, &mut r)?;
        res = r.norm2();
    }
    let report = SolveReport::new(name, status, iter, res, monitor.rhs_norm())
        .with_history(monitor.into_history());
    report.log_summary();
    Ok(report)
}
