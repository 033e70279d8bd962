//! The operator contract used by the Krylov solvers: anything that can apply itself to a
//! vector and form a residual.
use crate::linalg::csr::CsrMatrix;
use crate::linalg::errors::LinAlgError;
use crate::linalg::vector::Vector;
use crate::operators::preconditioner::Preconditioner;
use std::cell::RefCell;

pub trait LinearOperator {
    fn nrows(&self) -> usize;
    fn ncols(&self) -> usize;
    /// y = A x
    fn apply(&self, x: &Vector, y: &mut Vector) -> Result<(), LinAlgError>;
    /// r = b - A x
    fn residual(&self, b: &Vector, x: &Vector, r: &mut Vector) -> Result<(), LinAlgError> {
        if b.len() != self.nrows() {
            return Err(LinAlgError::size_mismatch(
                "LinearOperator::residual",
                self.nrows(),
                b.len(),
            ));
        }
        self.apply(x, r)?;
        r.xpay(-1.0, b)
    }
}

impl LinearOperator for CsrMatrix {
    fn nrows(&self) -> usize {
        self.nrow()
    }
    fn ncols(&self) -> usize {
        self.mcol()
    }
    fn apply(&self, x: &Vector, y: &mut Vector) -> Result<(), LinAlgError> {
        CsrMatrix::apply(self, x, y)
    }
    fn residual(&self, b: &Vector, x: &Vector, r: &mut Vector) -> Result<(), LinAlgError> {
        CsrMatrix::residual(self, b, x, r)
    }
}

/// A set-up preconditioner seen as the operator `x -> M^{-1} x`. Preconditioners keep
/// mutable workspace, hence the `RefCell`; the adaptor is therefore not `Sync`.
pub struct PreconditionerOperator<P: Preconditioner> {
    pc: RefCell<P>,
    n: usize,
}

impl<P: Preconditioner> PreconditionerOperator<P> {
    pub fn new(pc: P, n: usize) -> Self {
        PreconditionerOperator {
            pc: RefCell::new(pc),
            n,
        }
    }

    pub fn into_inner(self) -> P {
        self.pc.into_inner()
    }
}

impl<P: Preconditioner> LinearOperator for PreconditionerOperator<P> {
    fn nrows(&self) -> usize {
        self.n
    }
    fn ncols(&self) -> usize {
        self.n
    }
    fn apply(&self, x: &Vector, y: &mut Vector) -> Result<(), LinAlgError> {
        self.pc.borrow_mut().solve(x, y)
    }
}
