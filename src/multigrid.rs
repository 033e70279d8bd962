//! Multigrid hierarchies and cycles.
//!
//! `amg_coarsen` builds one coarse level from a matrix (strength, C/F splitting,
//! interpolation); `hierarchy` stores the levels with R = P^T and the Galerkin coarse
//! operators; `cycle` drives V and W cycles over them. `amg` and `mg` expose the whole
//! thing as preconditioners or stand-alone solvers.
pub mod amg;
pub mod amg_coarsen;
pub mod cycle;
pub mod hierarchy;
pub mod mg;
