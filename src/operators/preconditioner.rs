//! Preconditioner contract and the closed set of preconditioners shipped with the crate.
//!
//! # Aim and General Description
//! A preconditioner approximates `A^{-1}`: after `setup(A)` every call `solve(r, z)` returns
//! `z ≈ A^{-1} r`. Krylov solvers only see `&mut dyn Preconditioner`, so any variant (or a
//! user type wrapped in `External`) can be swapped in without touching the solver.
//!
//! # Main Components
//! - `Preconditioner`: setup / solve / clean / name.
//! - `PrecondEnum`: enum-dispatched union of the built-in variants. Static dispatch for the
//!   common case, while `External` boxes anything else that implements the trait.
//! - `PrecondType`: parsable selector used by configuration files and factories.
//! - `Identity`: `z = r`; preconditioning with it reproduces the unpreconditioned iteration.
//!
//! # Non-obvious Features and Tips
//! - `solve` takes `&mut self`: multigrid and direct solvers keep workspace between calls.
//!   A preconditioner is therefore not meant to be shared by two running solves.
//! - `setup` copies what it needs from the matrix; the caller's matrix is never modified.
use crate::linalg::csr::CsrMatrix;
use crate::linalg::errors::LinAlgError;
use crate::linalg::vector::Vector;
use crate::multigrid::amg::Amg;
use crate::multigrid::mg::Mg;
use crate::operators::direct::{DenseLu, SparseLu};
use crate::operators::relaxation::{Jacobi, Sor, Ssor};
use enum_dispatch::enum_dispatch;
use strum_macros::{Display, EnumIter, EnumString};

#[enum_dispatch]
pub enum PrecondEnum {
    Identity(Identity),
    Jacobi(Jacobi),
    Sor(Sor),
    Ssor(Ssor),
    Amg(Amg),
    Mg(Mg),
    SparseLu(SparseLu),
    DenseLu(DenseLu),
    External(External),
}

#[enum_dispatch(PrecondEnum)]
pub trait Preconditioner {
    fn setup(&mut self, a: &CsrMatrix) -> Result<(), LinAlgError>;
    /// z ≈ A^{-1} r
    fn solve(&mut self, r: &Vector, z: &mut Vector) -> Result<(), LinAlgError>;
    /// releases everything built by `setup`
    fn clean(&mut self);
    fn name(&self) -> &'static str;
}

/// Selector for the built-in preconditioners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PrecondType {
    Identity,
    Jacobi,
    Sor,
    Ssor,
    Amg,
    SparseLu,
    DenseLu,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Identity {
    n: Option<usize>,
}

impl Identity {
    pub fn new() -> Self {
        Identity { n: None }
    }
}

impl Preconditioner for Identity {
    fn setup(&mut self, a: &CsrMatrix) -> Result<(), LinAlgError> {
        self.n = Some(a.nrow());
        Ok(())
    }
    fn solve(&mut self, r: &Vector, z: &mut Vector) -> Result<(), LinAlgError> {
        z.copy_from(r)
    }
    fn clean(&mut self) {
        self.n = None;
    }
    fn name(&self) -> &'static str {
        "Identity"
    }
}

/// Any user supplied preconditioner, e.g. a binding to an external direct solver.
pub struct External(pub Box<dyn Preconditioner>);

impl External {
    pub fn new<P: Preconditioner + 'static>(pc: P) -> Self {
        External(Box::new(pc))
    }
}

impl Preconditioner for External {
    fn setup(&mut self, a: &CsrMatrix) -> Result<(), LinAlgError> {
        self.0.setup(a)
    }
    fn solve(&mut self, r: &Vector, z: &mut Vector) -> Result<(), LinAlgError> {
        self.0.solve(r, z)
    }
    fn clean(&mut self) {
        self.0.clean()
    }
    fn name(&self) -> &'static str {
        self.0.name()
    }
}
