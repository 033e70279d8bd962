// Copyright (c)  by Gleb E. Zaslavkiy
//MIT License
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
pub mod Examples;
pub mod Utils;
/// Krylov solvers (CG, BiCGStab, GMRES, FGMRES, MINRES), stopping criteria, configuration
pub mod krylov;
/// CSR matrices, vectors and kernels
pub mod linalg;
/// algebraic and geometric multigrid
pub mod multigrid;
/// operator and preconditioner contracts, relaxation, direct solvers
pub mod operators;
