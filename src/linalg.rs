//! Dense vectors, CSR sparse matrices and the kernels every solver is built from.
/// error type, solver statuses and shared numerical constants
pub mod errors;
/// dense vector and BLAS-1 kernels
pub mod vector;
/// compressed sparse row matrix: products, transpose, Galerkin building blocks
pub mod csr;
/// CSR validators, row sorting, conversion to and from sprs
pub mod csr_utils;
/// model problems: Laplacians, convection-diffusion, random SPD
pub mod gallery;
