//! Contract shared by the Krylov solvers and the bookkeeping they have in common.
//!
//! A solver borrows its operator and (optionally) its preconditioner for the lifetime
//! `'a` at `setup`, so a set-up solver can run several solves on the same system. A
//! missing preconditioner means z = r, which gives the same iterates as `Identity`.
use crate::krylov::params::SolverParams;
use crate::krylov::report::SolveReport;
use crate::krylov::stopping::ConvergenceMonitor;
use crate::linalg::errors::{LinAlgError, SolverStatus};
use crate::linalg::vector::Vector;
use crate::operators::linear_operator::LinearOperator;
use crate::operators::preconditioner::Preconditioner;
use log::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverState {
    Uninitialized,
    Ready,
    Iterating,
    Finished(SolverStatus),
}

pub trait KrylovSolver<'a> {
    fn setup(
        &mut self,
        a: &'a dyn LinearOperator,
        pc: Option<&'a mut dyn Preconditioner>,
        params: &SolverParams,
    ) -> Result<(), LinAlgError>;

    /// Iterates on A x = b from the given x; x holds the returned iterate.
    fn solve(&mut self, b: &Vector, x: &mut Vector) -> Result<SolveReport, LinAlgError>;

    /// Drops the operator, preconditioner and workspace.
    fn clean(&mut self);

    fn state(&self) -> SolverState;

    fn name(&self) -> &'static str;
}

pub struct SolverBase<'a> {
    pub name: &'static str,
    pub params: SolverParams,
    pub state: SolverState,
    a: Option<&'a dyn LinearOperator>,
    pc: Option<&'a mut dyn Preconditioner>,
    n: usize,
}

impl<'a> SolverBase<'a> {
    pub fn new(name: &'static str) -> Self {
        SolverBase {
            name,
            params: SolverParams::default(),
            state: SolverState::Uninitialized,
            a: None,
            pc: None,
            n: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.n
    }

    pub fn setup(
        &mut self,
        a: &'a dyn LinearOperator,
        pc: Option<&'a mut dyn Preconditioner>,
        params: &SolverParams,
    ) -> Result<(), LinAlgError> {
        params.validate()?;
        if a.nrows() != a.ncols() {
            return Err(LinAlgError::MatrixSize(format!(
                "{} needs a square operator, got {} x {}",
                self.name,
                a.nrows(),
                a.ncols()
            )));
        }
        self.n = a.nrows();
        self.a = Some(a);
        self.pc = pc;
        self.params = params.clone();
        self.state = SolverState::Ready;
        Ok(())
    }

    /// Checks state and sizes and moves to `Iterating`; returns the operator.
    pub fn begin(&mut self, b: &Vector, x: &Vector) -> Result<&'a dyn LinearOperator, LinAlgError> {
        let a = match (self.state, self.a) {
            (SolverState::Uninitialized, _) | (_, None) => {
                return Err(LinAlgError::NotSetup(self.name));
            }
            (_, Some(a)) => a,
        };
        if b.len() != self.n {
            return Err(LinAlgError::size_mismatch("right-hand side", self.n, b.len()));
        }
        if x.len() != self.n {
            return Err(LinAlgError::size_mismatch("initial guess", self.n, x.len()));
        }
        self.state = SolverState::Iterating;
        Ok(a)
    }

    /// z = M^{-1} r, or z = r without preconditioner.
    pub fn precondition(&mut self, r: &Vector, z: &mut Vector) -> Result<(), LinAlgError> {
        match self.pc.as_mut() {
            Some(pc) => pc.solve(r, z),
            None => z.copy_from(r),
        }
    }

    pub fn preconditioner_name(&self) -> &'static str {
        self.pc.as_ref().map_or("none", |pc| pc.name())
    }

    /// b = 0 has the solution x = 0.
    pub fn zero_rhs(&mut self, x: &mut Vector) -> SolveReport {
        x.fill(0.0);
        info!("{}: zero right-hand side, returning x = 0", self.name);
        self.state = SolverState::Finished(SolverStatus::Converged);
        SolveReport::new(self.name, SolverStatus::Converged, 0, 0.0, 0.0).with_history(vec![0.0])
    }

    /// Final bookkeeping: true residual, breakdown reinterpretation and best-iterate
    /// restore. The report is returned unlogged so callers can attach counters.
    pub fn finish(
        &mut self,
        b: &Vector,
        x: &mut Vector,
        status: SolverStatus,
        iterations: usize,
        mut monitor: ConvergenceMonitor,
    ) -> Result<SolveReport, LinAlgError> {
        let a = self.a.ok_or(LinAlgError::NotSetup(self.name))?;
        let mut r = Vector::new(self.n);
        a.residual(b, x, &mut r)?;
        let mut res = r.norm2();
        let mut status = status;
        if status == SolverStatus::Breakdown && monitor.breakdown_is_converged(res) {
            status = SolverStatus::Converged;
        }
        if !status.is_converged() && monitor.restore_best(res, x)? {
            a.residual(b, x, &mut r)?;
            res = r.norm2();
            info!("{}: restored best iterate, |r| = {:.6e}", self.name, res);
        }
        self.state = SolverState::Finished(status);
        Ok(SolveReport::new(self.name, status, iterations, res, monitor.rhs_norm())
            .with_history(monitor.into_history()))
    }

    pub fn clean(&mut self) {
        self.a = None;
        self.pc = None;
        self.n = 0;
        self.state = SolverState::Uninitialized;
    }
}
