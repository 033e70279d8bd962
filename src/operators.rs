//! Operator and preconditioner contracts with their concrete implementations.
/// `LinearOperator`: apply and residual
pub mod linear_operator;
/// `Preconditioner` trait, enum-dispatched variants and the Identity preconditioner
pub mod preconditioner;
/// Jacobi / SOR / SSOR sweeps, usable as smoothers, preconditioners or solvers
pub mod relaxation;
/// sparse (faer) and dense (nalgebra) LU behind the preconditioner contract
pub mod direct;
