//! Krylov subspace solvers and the machinery they share.
/// iteration controls (tolerances, iteration bounds, restart)
pub mod params;
/// convergence monitor: false-convergence guard, safeguard iterations, stagnation
pub mod stopping;
/// `SolveReport`: status, residuals, statistics table, CSV history
pub mod report;
/// Givens rotations, modified Gram-Schmidt and the incremental Hessenberg QR
pub mod arnoldi;
/// `KrylovSolver` trait and the state shared by all solvers
pub mod solver;
/// preconditioned conjugate gradients
pub mod cg;
/// BiCGStab with soft restarts on vanishing denominators
pub mod bicgstab;
/// restarted GMRES, left or right preconditioned, fixed or adaptive restart
pub mod gmres;
/// flexible GMRES for preconditioners that change between iterations
pub mod fgmres;
/// MINRES for symmetric indefinite systems
pub mod minres;
/// solver configuration from TOML
pub mod config;
/// build preconditioner and solver from a configuration and solve
pub mod solver_api;

#[cfg(test)]
mod krylov_tests;
