//! Worked examples: model problems solved with each method, selected by number.
use crate::Utils::logger::init_logger;
use crate::Utils::timer::SolverTimer;
use crate::krylov::config::SolverConfig;
use crate::krylov::gmres::{Gmres, GmresMode};
use crate::krylov::params::SolverParams;
use crate::krylov::report::SolveReport;
use crate::krylov::solver::KrylovSolver;
use crate::krylov::solver_api::{SolverType, build_preconditioner, solve_linear_system};
use crate::linalg::errors::LinAlgError;
use crate::linalg::gallery::{
    convection_diffusion_1d, cyclic_shift, laplacian_1d, laplacian_2d, linear_interpolation_1d,
    shifted_laplacian_1d,
};
use crate::linalg::vector::Vector;
use crate::multigrid::amg::{Amg, AmgParams};
use crate::multigrid::cycle::{CycleType, MgParams};
use crate::multigrid::mg::Mg;
use crate::operators::preconditioner::{PrecondType, Preconditioner};
use crate::operators::relaxation::{Relaxation, SmootherKind, relaxation_solve};

const CONFIG_EXAMPLE: &str = r#"
loglevel = "info"

[solver]
type = "fgmres"
max_iter = 300
rel_tol = 1e-8
abs_tol = 0.0
min_restart = 10
max_restart = 30

[preconditioner]
type = "amg"

[amg]
coarse_dof = 40
cycle = "v"
smoother = "ssor"
"#;

fn print_report(title: &str, report: &SolveReport) {
    println!("\n{}\n{}", title, report.statistics_table());
}

/// Runs example `example` and returns the last report it produced.
pub fn krylov_examples(example: usize) -> Result<SolveReport, LinAlgError> {
    match example {
        // CG on the 2-D Poisson problem, without and with Jacobi
        0 => {
            let a = laplacian_2d(40, 40)?;
            let b = Vector::filled(a.nrow(), 1.0);
            let mut last = None;
            for precond in [PrecondType::Identity, PrecondType::Jacobi, PrecondType::Ssor] {
                let config = SolverConfig::new(SolverType::Cg)
                    .with_params(SolverParams::new().with_rel_tol(1e-8).with_max_iter(1000))
                    .with_precond(precond);
                let mut x = Vector::new(a.nrow());
                let report = solve_linear_system(&a, &b, &mut x, &config, None)?;
                print_report(&format!("CG + {}", precond), &report);
                last = Some(report);
            }
            last.ok_or_else(|| LinAlgError::InputParam("no run".to_string()))
        }
        // AMG as a stand-alone solver and as a CG preconditioner
        1 => {
            let a = laplacian_2d(64, 64)?;
            let b = Vector::filled(a.nrow(), 1.0);
            let params = SolverParams::new().with_rel_tol(1e-8).with_max_iter(100);
            let mut amg = Amg::new(AmgParams::new().with_coarse_dof(30));
            amg.setup(&a)?;
            if let Some(h) = amg.hierarchy() {
                println!("{}", h.summary_table());
            }
            let mut x = Vector::new(a.nrow());
            let standalone = amg.solve_system(&b, &mut x, &params)?;
            print_report("AMG V-cycle iteration", &standalone);

            let config = SolverConfig::new(SolverType::Cg)
                .with_params(params)
                .with_precond(PrecondType::Amg);
            let mut x = Vector::new(a.nrow());
            let pcg = solve_linear_system(&a, &b, &mut x, &config, None)?;
            print_report("AMG-preconditioned CG", &pcg);
            Ok(pcg)
        }
        // restart length matters: GMRES(10) vs GMRES(2) on the cyclic shift
        2 => {
            let a = cyclic_shift(10)?;
            let mut b = Vector::new(10);
            b[0] = 1.0;
            let mut last = None;
            for m in [10, 2] {
                let params = SolverParams::new().with_restart(m).with_max_iter(100);
                let mut gmres = Gmres::new(GmresMode::Right);
                gmres.setup(&a, None, &params)?;
                let mut x = Vector::new(10);
                let report = gmres.solve(&b, &mut x)?;
                print_report(&format!("GMRES({})", m), &report);
                last = Some(report);
            }
            last.ok_or_else(|| LinAlgError::InputParam("no run".to_string()))
        }
        // nonsymmetric convection-diffusion with three nonsymmetric solvers
        3 => {
            let a = convection_diffusion_1d(200, 100.0)?;
            let b = Vector::filled(200, 1.0);
            let mut last = None;
            for kind in [SolverType::BiCgStab, SolverType::Gmres, SolverType::Fgmres] {
                let config = SolverConfig::new(kind)
                    .with_params(SolverParams::new().with_rel_tol(1e-10).with_max_iter(2000))
                    .with_precond(PrecondType::Sor);
                let mut x = Vector::new(200);
                let report = solve_linear_system(&a, &b, &mut x, &config, None)?;
                print_report(&format!("{} + SOR", kind), &report);
                last = Some(report);
            }
            last.ok_or_else(|| LinAlgError::InputParam("no run".to_string()))
        }
        // symmetric indefinite system: MINRES converges where CG may break down
        4 => {
            let a = shifted_laplacian_1d(100, 0.5)?;
            let b = Vector::filled(100, 1.0);
            let params = SolverParams::new().with_rel_tol(1e-10).with_max_iter(500);
            let mut last = None;
            for kind in [SolverType::Cg, SolverType::Minres] {
                let config = SolverConfig::new(kind).with_params(params.clone());
                let mut x = Vector::new(100);
                let report = solve_linear_system(&a, &b, &mut x, &config, None)?;
                print_report(&format!("{} on an indefinite matrix", kind), &report);
                last = Some(report);
            }
            last.ok_or_else(|| LinAlgError::InputParam("no run".to_string()))
        }
        // everything from a TOML document, timed
        5 => {
            let config = SolverConfig::from_toml_str(CONFIG_EXAMPLE)?;
            init_logger(config.loglevel.as_deref(), false)?;
            let a = laplacian_2d(50, 50)?;
            let b = Vector::filled(a.nrow(), 1.0);
            let mut x = Vector::new(a.nrow());
            let mut timer = SolverTimer::new();
            let report = solve_linear_system(&a, &b, &mut x, &config, Some(&mut timer))?;
            print_report("FGMRES + AMG from configuration", &report);
            println!("{}", timer.table());
            Ok(report)
        }
        // geometric multigrid V and W cycles against plain Gauss-Seidel
        6 => {
            let n = 255;
            let a = laplacian_1d(n)?;
            let b = Vector::filled(n, 1.0 / ((n + 1) * (n + 1)) as f64);
            let mut prolongations = Vec::new();
            let mut size = n;
            while size > 7 {
                prolongations.push(linear_interpolation_1d(size)?);
                size = (size - 1) / 2;
            }
            let params = SolverParams::new().with_rel_tol(1e-10).with_max_iter(100);
            let mut last = None;
            for cycle in [CycleType::V, CycleType::W] {
                let mut mg = Mg::new(prolongations.clone(), MgParams::new().with_cycle(cycle));
                mg.setup(&a)?;
                let mut x = Vector::new(n);
                let report = mg.solve_system(&b, &mut x, &params)?;
                print_report(&format!("geometric MG, {}-cycle", cycle), &report);
                last = Some(report);
            }
            let mut gs = Relaxation::new(SmootherKind::Sor, 1.0, 1);
            gs.setup(&a)?;
            let mut x = Vector::new(n);
            let report = relaxation_solve(&mut gs, &a, &b, &mut x, &params)?;
            print_report("Gauss-Seidel, same budget", &report);
            last.ok_or_else(|| LinAlgError::InputParam("no run".to_string()))
        }
        // residual history to CSV
        7 => {
            let a = laplacian_2d(30, 30)?;
            let b = Vector::filled(a.nrow(), 1.0);
            let config = SolverConfig::default();
            let mut pc = build_preconditioner(PrecondType::Jacobi, &a, &config)?;
            let mut x = Vector::new(a.nrow());
            let report = {
                let mut cg = crate::krylov::cg::Cg::new();
                cg.setup(&a, Some(&mut pc), &SolverParams::new().with_rel_tol(1e-10))?;
                cg.solve(&b, &mut x)?
            };
            let path = std::env::temp_dir().join("cg_residual_history.csv");
            report.save_history_csv(&path)?;
            println!("residual history written to {}", path.display());
            Ok(report)
        }
        _ => Err(LinAlgError::InputParam(format!(
            "no example with number {}",
            example
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_examples_run() {
        for example in [0, 2, 3, 4, 6] {
            assert!(krylov_examples(example).is_ok(), "example {}", example);
        }
        assert!(krylov_examples(99).is_err());
    }

    #[test]
    fn test_config_example_converges() {
        let report = krylov_examples(5).unwrap();
        assert!(report.is_converged());
    }
}
