//! examples of usage of RustedKrylov
/// Krylov, relaxation and multigrid solvers on model problems
pub mod krylov_examples;
