//! Preconditioned conjugate gradients for symmetric positive definite systems.
use crate::krylov::params::SolverParams;
use crate::krylov::report::SolveReport;
use crate::krylov::solver::{KrylovSolver, SolverBase, SolverState};
use crate::krylov::stopping::{ConvergenceMonitor, StagnationCheck, Verdict, Verification};
use crate::linalg::errors::{LinAlgError, SolverStatus};
use crate::linalg::vector::Vector;
use crate::operators::linear_operator::LinearOperator;
use crate::operators::preconditioner::Preconditioner;
use log::{debug, warn};

pub struct Cg<'a> {
    base: SolverBase<'a>,
    r: Vector,
    z: Vector,
    p: Vector,
    ap: Vector,
}

impl<'a> Default for Cg<'a> {
    fn default() -> Self {
        Cg::new()
    }
}

impl<'a> Cg<'a> {
    pub fn new() -> Self {
        Cg {
            base: SolverBase::new("CG"),
            r: Vector::default(),
            z: Vector::default(),
            p: Vector::default(),
            ap: Vector::default(),
        }
    }
}

impl<'a> KrylovSolver<'a> for Cg<'a> {
    fn setup(
        &mut self,
        a: &'a dyn LinearOperator,
        pc: Option<&'a mut dyn Preconditioner>,
        params: &SolverParams,
    ) -> Result<(), LinAlgError> {
        self.base.setup(a, pc, params)?;
        let n = self.base.size();
        self.r = Vector::new(n);
        self.z = Vector::new(n);
        self.p = Vector::new(n);
        self.ap = Vector::new(n);
        Ok(())
    }

    fn solve(&mut self, b: &Vector, x: &mut Vector) -> Result<SolveReport, LinAlgError> {
        let a = self.base.begin(b, x)?;
        let b_norm = b.norm2();
        if b_norm == 0.0 {
            return Ok(self.base.zero_rhs(x));
        }
        let params = self.base.params.clone();
        let mut monitor = ConvergenceMonitor::new("CG", &params, b_norm);
        a.residual(b, x, &mut self.r)?;
        let mut iter = 0;
        let mut status = SolverStatus::MaxIterReached;
        let mut res_old = self.r.norm2();
        if monitor.start(res_old) {
            status = SolverStatus::Converged;
        } else {
            'outer: loop {
                self.base.precondition(&self.r, &mut self.z)?;
                let mut rz = self.r.dot(&self.z)?;
                if rz < 0.0 {
                    warn!("CG: r^T M^-1 r = {:.4e} < 0, preconditioner is not SPD", rz);
                    status = SolverStatus::Breakdown;
                    break 'outer;
                }
                self.p.copy_from(&self.z)?;

                loop {
                    if iter >= params.max_iter {
                        break 'outer;
                    }
                    iter += 1;
                    a.apply(&self.p, &mut self.ap)?;
                    let pap = self.p.dot(&self.ap)?;
                    if pap <= 0.0 {
                        warn!("CG: p^T A p = {:.4e} <= 0 at iteration {}", pap, iter);
                        status = SolverStatus::Breakdown;
                        break 'outer;
                    }
                    let alpha = rz / pap;
                    x.axpy(alpha, &self.p)?;
                    self.r.axpy(-alpha, &self.ap)?;
                    let res = self.r.norm2();
                    debug!("CG iter {:>5}, |r| = {:.6e}", iter, res);
                    monitor.record_iterate(iter, res, x)?;

                    let ratio = res / res_old;
                    res_old = res;
                    match monitor.check(iter, res) {
                        Verdict::Continue => {
                            let step = alpha.abs() * self.p.norm2();
                            match monitor.check_stagnation(iter, ratio, step, x.norm2()) {
                                StagnationCheck::Progress => {}
                                StagnationCheck::Restart => {
                                    a.residual(b, x, &mut self.r)?;
                                    res_old = self.r.norm2();
                                    continue 'outer;
                                }
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
                                Verification::FalseConvergence => continue 'outer,
                                Verification::Confirming => {}
                            }
                        }
                    }

                    self.base.precondition(&self.r, &mut self.z)?;
                    let rz_new = self.r.dot(&self.z)?;
                    if rz_new < 0.0 {
                        warn!("CG: r^T M^-1 r = {:.4e} < 0, preconditioner is not SPD", rz_new);
                        status = SolverStatus::Breakdown;
                        break 'outer;
                    }
                    let beta = rz_new / rz;
                    self.p.xpay(beta, &self.z)?;
                    rz = rz_new;
                }
            }
        }
        let report = self.base.finish(b, x, status, iter, monitor)?;
        report.log_summary();
        Ok(report)
    }

    fn clean(&mut self) {
        self.base.clean();
        self.r = Vector::default();
        self.z = Vector::default();
        self.p = Vector::default();
        self.ap = Vector::default();
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
    use crate::linalg::gallery::laplacian_1d;
    use approx::assert_relative_eq;

    #[test]
    fn test_cg_solves_5x5_tridiagonal() {
        let a = laplacian_1d(5).unwrap();
        let b = Vector::filled(5, 1.0);
        let mut x = Vector::new(5);
        let mut cg = Cg::new();
        let params = SolverParams::new().with_rel_tol(1e-12).with_abs_tol(0.0);
        cg.setup(&a, None, &params).unwrap();
        let rep = cg.solve(&b, &mut x).unwrap();
        assert!(rep.is_converged());
        assert!(rep.iterations <= 5);
        for (xi, ei) in x.iter().zip([2.5, 4.0, 4.5, 4.0, 2.5]) {
            assert_relative_eq!(*xi, ei, epsilon = 1e-8);
        }
        assert_eq!(cg.state(), SolverState::Finished(SolverStatus::Converged));
    }

    #[test]
    fn test_indefinite_matrix_breaks_down() {
        let a = CsrMatrix::from_diagonal(&[1.0, -1.0]);
        let b = Vector::from_slice(&[1.0, 1.0]);
        let mut x = Vector::new(2);
        let mut cg = Cg::new();
        cg.setup(&a, None, &SolverParams::new()).unwrap();
        let rep = cg.solve(&b, &mut x).unwrap();
        assert_eq!(rep.status, SolverStatus::Breakdown);
    }

    #[test]
    fn test_solve_before_setup_fails() {
        let a = laplacian_1d(3).unwrap();
        let mut cg = Cg::new();
        let mut x = Vector::new(3);
        assert!(matches!(
            cg.solve(&Vector::new(3), &mut x),
            Err(LinAlgError::NotSetup("CG"))
        ));
        cg.setup(&a, None, &SolverParams::new()).unwrap();
        cg.clean();
        assert_eq!(cg.state(), SolverState::Uninitialized);
        assert!(cg.solve(&Vector::new(3), &mut x).is_err());
    }

    #[test]
    fn test_zero_rhs_returns_zero() {
        let a = laplacian_1d(4).unwrap();
        let mut x = Vector::filled(4, 3.0);
        let mut cg = Cg::new();
        cg.setup(&a, None, &SolverParams::new()).unwrap();
        let rep = cg.solve(&Vector::new(4), &mut x).unwrap();
        assert!(rep.is_converged());
        assert_eq!(rep.iterations, 0);
        assert_eq!(x.as_slice(), &[0.0; 4]);
    }

    #[test]
    fn test_size_mismatch_is_error() {
        let a = laplacian_1d(4).unwrap();
        let mut cg = Cg::new();
        cg.setup(&a, None, &SolverParams::new()).unwrap();
        let mut x = Vector::new(3);
        assert!(matches!(
            cg.solve(&Vector::new(4), &mut x),
            Err(LinAlgError::SizeMismatch { .. })
        ));
    }
}
