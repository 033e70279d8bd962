//! Cross-solver checks: every method against the same systems, preconditioned and not.
use crate::krylov::config::SolverConfig;
use crate::krylov::params::SolverParams;
use crate::krylov::report::SolveReport;
use crate::krylov::solver_api::{SolverType, build_preconditioner, make_solver};
use crate::linalg::csr::CsrMatrix;
use crate::linalg::errors::SolverStatus;
use crate::linalg::gallery::{
    convection_diffusion_1d, laplacian_1d, laplacian_2d, random_spd, shifted_laplacian_1d,
};
use crate::linalg::vector::Vector;
use crate::operators::preconditioner::{Identity, PrecondType, Preconditioner};
use approx::assert_relative_eq;
use strum::IntoEnumIterator;

fn run<'a>(
    kind: SolverType,
    a: &'a CsrMatrix,
    pc: Option<&'a mut dyn Preconditioner>,
    params: &SolverParams,
    b: &Vector,
) -> (Vector, SolveReport) {
    run_from(kind, a, pc, params, b, Vector::new(b.len()))
}

fn run_from<'a>(
    kind: SolverType,
    a: &'a CsrMatrix,
    pc: Option<&'a mut dyn Preconditioner>,
    params: &SolverParams,
    b: &Vector,
    mut x: Vector,
) -> (Vector, SolveReport) {
    let config = SolverConfig::new(kind).with_params(params.clone());
    let mut solver = make_solver(kind, &config);
    solver.setup(a, pc, params).unwrap();
    let report = solver.solve(b, &mut x).unwrap();
    (x, report)
}

fn true_residual(a: &CsrMatrix, b: &Vector, x: &Vector) -> f64 {
    let mut r = Vector::new(b.len());
    a.residual(b, x, &mut r).unwrap();
    r.norm2()
}

#[test]
fn test_identity_preconditioner_matches_no_preconditioner() {
    let a = laplacian_2d(8, 8).unwrap();
    let b = Vector::from_vec((0..64).map(|i| 1.0 + (i % 7) as f64).collect());
    let params = SolverParams::new().with_rel_tol(1e-10).with_abs_tol(0.0).with_max_iter(300);
    for kind in SolverType::iter() {
        let (x_none, rep_none) = run(kind, &a, None, &params, &b);
        let mut identity = Identity::new();
        identity.setup(&a).unwrap();
        let (x_id, rep_id) = run(kind, &a, Some(&mut identity), &params, &b);
        assert!(rep_none.is_converged(), "{}", kind);
        assert_eq!(rep_none.iterations, rep_id.iterations, "{}", kind);
        assert_eq!(rep_none.residual_history, rep_id.residual_history, "{}", kind);
        assert_eq!(x_none.as_slice(), x_id.as_slice(), "{}", kind);
    }
}

#[test]
fn test_every_solver_converges_with_jacobi() {
    let a = laplacian_2d(12, 12).unwrap();
    let n = a.nrow();
    let x_true = Vector::from_vec((0..n).map(|i| ((i as f64) * 0.37).cos()).collect());
    let mut b = Vector::new(n);
    a.apply(&x_true, &mut b).unwrap();
    let params = SolverParams::new().with_rel_tol(1e-10).with_abs_tol(0.0).with_max_iter(1000);
    let config = SolverConfig::default().with_precond(PrecondType::Jacobi);
    for kind in SolverType::iter() {
        let mut pc = build_preconditioner(PrecondType::Jacobi, &a, &config).unwrap();
        let (x, rep) = run(kind, &a, Some(&mut pc), &params, &b);
        assert!(rep.is_converged(), "{} ended with {}", kind, rep.status);
        assert!(rep.relative_residual <= 1e-10, "{}", kind);
        assert_relative_eq!(rep.residual_norm, true_residual(&a, &b, &x), epsilon = 1e-14);
        for i in 0..n {
            assert!((x[i] - x_true[i]).abs() < 1e-7, "{} at {}", kind, i);
        }
    }
}

#[test]
fn test_cg_converges_within_n_iterations_on_1d_laplacian() {
    for n in [5, 16, 40] {
        let a = laplacian_1d(n).unwrap();
        let b = Vector::filled(n, 1.0);
        let params = SolverParams::new().with_rel_tol(1e-8).with_abs_tol(0.0).with_max_iter(200);
        let (_, rep) = run(SolverType::Cg, &a, None, &params, &b);
        assert!(rep.is_converged());
        assert!(rep.iterations <= n, "n = {}: {} iterations", n, rep.iterations);
        assert!(rep.relative_residual <= 1e-8);
    }
}

#[test]
fn test_restarted_gmres_is_monotone_and_restart_independent() {
    let a = convection_diffusion_1d(50, 20.0).unwrap();
    let b = Vector::filled(50, 1.0);
    let config = SolverConfig::default();
    let mut solutions = Vec::new();
    for m in [5, 15, 50] {
        let params = SolverParams::new()
            .with_rel_tol(1e-10)
            .with_abs_tol(0.0)
            .with_max_iter(2000)
            .with_restart(m)
            .with_max_stag(0);
        let mut pc = build_preconditioner(PrecondType::Ssor, &a, &config).unwrap();
        let (x, rep) = run(SolverType::Gmres, &a, Some(&mut pc), &params, &b);
        assert!(rep.is_converged(), "GMRES({}) ended with {}", m, rep.status);
        assert!(
            rep.cycle_residuals
                .windows(2)
                .all(|w| w[1] <= w[0] * (1.0 + 1e-12)),
            "GMRES({}) cycle residuals {:?}",
            m,
            rep.cycle_residuals
        );
        solutions.push(x);
    }
    let scale = solutions[2].norm_inf();
    for x in &solutions[..2] {
        for i in 0..50 {
            assert!((x[i] - solutions[2][i]).abs() <= 1e-7 * scale);
        }
    }
}

#[test]
fn test_amg_preconditioning_reduces_cg_iterations() {
    let a = laplacian_2d(32, 32).unwrap();
    let b = Vector::filled(a.nrow(), 1.0);
    let params = SolverParams::new().with_rel_tol(1e-8).with_abs_tol(0.0).with_max_iter(1000);
    let (_, plain) = run(SolverType::Cg, &a, None, &params, &b);
    let config = SolverConfig::default();
    let mut amg = build_preconditioner(PrecondType::Amg, &a, &config).unwrap();
    let (_, pcg) = run(SolverType::Cg, &a, Some(&mut amg), &params, &b);
    assert!(plain.is_converged());
    assert!(pcg.is_converged());
    assert!(
        pcg.iterations * 3 < plain.iterations,
        "AMG-PCG {} vs CG {}",
        pcg.iterations,
        plain.iterations
    );
}

#[test]
fn test_nonsymmetric_solvers_agree() {
    let a = convection_diffusion_1d(60, 40.0).unwrap();
    let b = Vector::from_vec((0..60).map(|i| (i as f64 * 0.1).sin() + 1.0).collect());
    let params = SolverParams::new().with_rel_tol(1e-10).with_abs_tol(0.0).with_max_iter(2000);
    let config = SolverConfig::default();
    let mut reference: Option<Vector> = None;
    for kind in [SolverType::BiCgStab, SolverType::Gmres, SolverType::Fgmres] {
        let mut pc = build_preconditioner(PrecondType::Sor, &a, &config).unwrap();
        let (x, rep) = run(kind, &a, Some(&mut pc), &params, &b);
        assert!(rep.is_converged(), "{} ended with {}", kind, rep.status);
        match &reference {
            None => reference = Some(x),
            Some(r) => {
                for i in 0..60 {
                    assert!((x[i] - r[i]).abs() <= 1e-6 * r.norm_inf(), "{}", kind);
                }
            }
        }
    }
}

#[test]
fn test_minres_and_gmres_agree_on_indefinite_system() {
    let a = shifted_laplacian_1d(40, 0.3).unwrap();
    let b = Vector::filled(40, 1.0);
    let params = SolverParams::new()
        .with_rel_tol(1e-10)
        .with_abs_tol(0.0)
        .with_max_iter(400)
        .with_restart(40);
    let (x_minres, rep_minres) = run(SolverType::Minres, &a, None, &params, &b);
    let (x_gmres, rep_gmres) = run(SolverType::Gmres, &a, None, &params, &b);
    assert!(rep_minres.is_converged());
    assert!(rep_gmres.is_converged());
    for i in 0..40 {
        assert!((x_minres[i] - x_gmres[i]).abs() <= 1e-6 * x_gmres.norm_inf());
    }
}

#[test]
fn test_safe_iterations_confirm_convergence() {
    let a = laplacian_2d(10, 10).unwrap();
    let b = Vector::filled(100, 1.0);
    let params = SolverParams::new().with_rel_tol(1e-6).with_abs_tol(0.0);
    let (_, plain) = run(SolverType::Cg, &a, None, &params, &b);
    let (x, safe) = run(SolverType::Cg, &a, None, &params.clone().with_safe_iter(3), &b);
    assert!(plain.is_converged());
    assert!(safe.is_converged());
    assert!(safe.iterations >= plain.iterations + 3);
    assert!(true_residual(&a, &b, &x) <= 1e-6 * b.norm2());
}

#[test]
fn test_max_iter_reports_true_residual_of_returned_iterate() {
    let a = random_spd(80, 4, 7).unwrap();
    // a constant rhs sits close to an eigenvector of this matrix
    let b = Vector::from_vec((0..80).map(|i| (i + 1) as f64 / 80.0).collect());
    let params = SolverParams::new().with_rel_tol(1e-14).with_abs_tol(0.0).with_max_iter(3);
    for kind in SolverType::iter() {
        let (x, rep) = run(kind, &a, None, &params, &b);
        assert_eq!(rep.status, SolverStatus::MaxIterReached, "{}", kind);
        assert!(rep.iterations <= 3);
        assert_relative_eq!(rep.residual_norm, true_residual(&a, &b, &x), epsilon = 1e-12);
        assert!(rep.residual_norm < b.norm2(), "{}", kind);
    }
}

#[test]
fn test_exact_initial_guess_is_kept_by_every_solver() {
    let a = laplacian_1d(5).unwrap();
    let b = Vector::filled(5, 1.0);
    let exact = [2.5, 4.0, 4.5, 4.0, 2.5];
    let params = SolverParams::new()
        .with_rel_tol(1e-10)
        .with_abs_tol(0.0)
        .with_safe_iter(2)
        .with_min_iter(3);
    for kind in SolverType::iter() {
        let x0 = Vector::from_vec(exact.to_vec());
        let (x, rep) = run_from(kind, &a, None, &params, &b, x0);
        assert!(rep.is_converged(), "{} ended with {}", kind, rep.status);
        assert!(rep.residual_norm.is_finite(), "{}", kind);
        assert!(rep.residual_norm <= 1e-12, "{}", kind);
        for i in 0..5 {
            assert!(x[i].is_finite(), "{}", kind);
            assert_relative_eq!(x[i], exact[i], epsilon = 1e-12);
        }
    }
}

#[test]
fn test_bicgstab_converges_on_convection_diffusion_without_preconditioner() {
    let a = convection_diffusion_1d(50, 20.0).unwrap();
    let b = Vector::filled(50, 1.0);
    let params = SolverParams::new().with_rel_tol(1e-10).with_abs_tol(0.0).with_max_iter(500);
    let (x, rep) = run(SolverType::BiCgStab, &a, None, &params, &b);
    assert!(rep.is_converged(), "BiCGStab ended with {}", rep.status);
    assert!(true_residual(&a, &b, &x) <= 1e-10 * b.norm2() * (1.0 + 1e-6));
}

#[test]
fn test_bicgstab_with_safe_iterations_stays_finite() {
    let a = convection_diffusion_1d(40, 10.0).unwrap();
    let b = Vector::from_vec((0..40).map(|i| 1.0 + (i % 3) as f64).collect());
    let params = SolverParams::new()
        .with_rel_tol(1e-8)
        .with_abs_tol(0.0)
        .with_max_iter(500)
        .with_safe_iter(3);
    let (x, rep) = run(SolverType::BiCgStab, &a, None, &params, &b);
    assert!(rep.is_converged(), "BiCGStab ended with {}", rep.status);
    assert!(x.as_slice().iter().all(|v| v.is_finite()));
    assert!(true_residual(&a, &b, &x) <= 1e-8 * b.norm2() * (1.0 + 1e-6));
}
