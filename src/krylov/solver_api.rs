//! One-call entry point: build the preconditioner and the Krylov solver named in a
//! `SolverConfig`, run them on `A x = b` and return the report.
use crate::Utils::timer::{Phase, SolverTimer};
use crate::krylov::bicgstab::BiCgStab;
use crate::krylov::cg::Cg;
use crate::krylov::config::SolverConfig;
use crate::krylov::fgmres::Fgmres;
use crate::krylov::gmres::Gmres;
use crate::krylov::minres::Minres;
use crate::krylov::report::SolveReport;
use crate::krylov::solver::KrylovSolver;
use crate::linalg::csr::CsrMatrix;
use crate::linalg::errors::LinAlgError;
use crate::linalg::vector::Vector;
use crate::multigrid::amg::Amg;
use crate::operators::direct::{DenseLu, SparseLu};
use crate::operators::preconditioner::{Identity, PrecondEnum, PrecondType, Preconditioner};
use crate::operators::relaxation::{Jacobi, Sor, Ssor};
use log::{info, warn};
use strum_macros::{Display, EnumIter, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SolverType {
    Cg,
    BiCgStab,
    Gmres,
    Fgmres,
    Minres,
}

impl SolverType {
    /// Methods that assume a symmetric operator and a symmetric preconditioner.
    pub fn needs_symmetry(&self) -> bool {
        matches!(self, SolverType::Cg | SolverType::Minres)
    }
}

pub fn make_solver<'a>(kind: SolverType, config: &SolverConfig) -> Box<dyn KrylovSolver<'a> + 'a> {
    match kind {
        SolverType::Cg => Box::new(Cg::new()),
        SolverType::BiCgStab => Box::new(BiCgStab::new()),
        SolverType::Gmres => {
            let mut solver = Gmres::new(config.gmres_mode);
            if let Some((lo, hi)) = config.restart_bounds {
                solver = solver.with_restart_bounds(lo, hi);
            }
            Box::new(solver)
        }
        SolverType::Fgmres => {
            let mut solver = Fgmres::new();
            if let Some((lo, hi)) = config.restart_bounds {
                solver = solver.with_restart_bounds(lo, hi);
            }
            Box::new(solver)
        }
        SolverType::Minres => Box::new(Minres::new()),
    }
}

/// Creates the preconditioner and runs its setup on `a`.
pub fn build_preconditioner(
    kind: PrecondType,
    a: &CsrMatrix,
    config: &SolverConfig,
) -> Result<PrecondEnum, LinAlgError> {
    let (w, sweeps) = (config.precond_weight, config.precond_sweeps);
    let mut pc: PrecondEnum = match kind {
        PrecondType::Identity => Identity::new().into(),
        PrecondType::Jacobi => Jacobi::new(w, sweeps).into(),
        PrecondType::Sor => Sor::new(w, sweeps).into(),
        PrecondType::Ssor => Ssor::new(w, sweeps).into(),
        PrecondType::Amg => Amg::new(config.amg.clone()).into(),
        PrecondType::SparseLu => SparseLu::new().into(),
        PrecondType::DenseLu => DenseLu::new().into(),
    };
    pc.setup(a)?;
    Ok(pc)
}

/// Preconditioner setup and solve as configured; `x` is the initial guess on entry and
/// the returned iterate on exit.
pub fn solve_linear_system(
    a: &CsrMatrix,
    b: &Vector,
    x: &mut Vector,
    config: &SolverConfig,
    timer: Option<&mut SolverTimer>,
) -> Result<SolveReport, LinAlgError> {
    let mut timer = timer;
    if let Some(t) = timer.as_deref_mut() {
        t.tic(Phase::Setup);
    }
    config.validate()?;
    if config.solver.needs_symmetry() && config.params.precond == PrecondType::Sor {
        warn!(
            "{} expects a symmetric preconditioner, SOR is not symmetric; consider SSOR",
            config.solver
        );
    }
    info!(
        "solving a {} x {} system (nnz = {}) with {} + {}",
        a.nrow(),
        a.mcol(),
        a.nnz(),
        config.solver,
        config.params.precond
    );

    if let Some(t) = timer.as_deref_mut() {
        t.tic(Phase::PrecondSetup);
    }
    let mut pc = build_preconditioner(config.params.precond, a, config)?;
    if let Some(t) = timer.as_deref_mut() {
        t.tac(Phase::PrecondSetup);
    }

    let mut solver = make_solver(config.solver, config);
    solver.setup(a, Some(&mut pc), &config.params)?;
    if let Some(t) = timer.as_deref_mut() {
        t.tac(Phase::Setup);
        t.tic(Phase::Solve);
    }
    let report = solver.solve(b, x)?;
    if let Some(t) = timer.as_deref_mut() {
        t.tac(Phase::Solve);
        t.log_summary();
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::krylov::params::SolverParams;
    use crate::linalg::gallery::laplacian_2d;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_solver_type_parsing() {
        assert_eq!(SolverType::from_str("BiCGStab").unwrap(), SolverType::BiCgStab);
        assert_eq!(SolverType::from_str("minres").unwrap(), SolverType::Minres);
        assert!(SolverType::from_str("qmr").is_err());
        for kind in SolverType::iter() {
            assert_eq!(SolverType::from_str(&kind.to_string()).unwrap(), kind);
        }
    }

    #[test]
    fn test_every_preconditioner_builds() {
        let a = laplacian_2d(6, 6).unwrap();
        let config = SolverConfig::default();
        for kind in PrecondType::iter() {
            let mut pc = build_preconditioner(kind, &a, &config).unwrap();
            let r = Vector::filled(a.nrow(), 1.0);
            let mut z = Vector::new(a.nrow());
            pc.solve(&r, &mut z).unwrap();
            assert!(z.iter().all(|v| v.is_finite() && *v > 0.0), "{}", kind);
        }
    }

    #[test]
    fn test_solve_linear_system_with_timer() {
        let a = laplacian_2d(10, 10).unwrap();
        let b = Vector::filled(a.nrow(), 1.0);
        let mut x = Vector::new(a.nrow());
        let config = SolverConfig::new(SolverType::Cg)
            .with_params(SolverParams::new().with_rel_tol(1e-10).with_abs_tol(0.0))
            .with_precond(PrecondType::Ssor);
        let mut timer = SolverTimer::new();
        let rep = solve_linear_system(&a, &b, &mut x, &config, Some(&mut timer)).unwrap();
        assert!(rep.is_converged());
        assert!(timer.elapsed(Phase::Solve) > std::time::Duration::ZERO);
        assert!(timer.elapsed(Phase::Setup) >= timer.elapsed(Phase::PrecondSetup));
    }

    #[test]
    fn test_invalid_config_is_rejected_before_solving() {
        let a = laplacian_2d(3, 3).unwrap();
        let b = Vector::filled(9, 1.0);
        let mut x = Vector::new(9);
        let config = SolverConfig::new(SolverType::Gmres).with_restart_bounds(10, 5);
        let err = solve_linear_system(&a, &b, &mut x, &config, None).unwrap_err();
        assert!(matches!(err, LinAlgError::InputParam(_)));
    }
}
