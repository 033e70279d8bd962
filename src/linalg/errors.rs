//! Errors and statuses shared by kernels, preconditioners and solvers.
//!
//! Structural problems (bad sizes, malformed CSR, zero diagonals found at setup) are
//! returned as `LinAlgError`. Expected numerical outcomes of an iteration (stagnation,
//! breakdown, iteration limit) are NOT errors: they come back as a `SolverStatus` inside
//! the solve report so the caller can branch on them and retry with another method.
use std::fmt;
use strum_macros::{Display, EnumIter};

/// Values below this are treated as zero when testing denominators.
pub const CLOSE_ZERO: f64 = 1e-20;
/// Smallest diagonal magnitude accepted by smoothers and interpolation.
pub const SMALL_TOL: f64 = 1e-14;
/// Maximal number of restarts forced by stagnation or breakdown.
pub const MAX_STAG_NUM: usize = 20;
/// Maximal number of multigrid levels.
pub const MAX_MG_LEVEL: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub enum LinAlgError {
    /// two objects that must agree in size do not
    SizeMismatch {
        context: String,
        expected: usize,
        found: usize,
    },
    /// matrix is not square or has an impossible shape
    MatrixSize(String),
    /// CSR arrays violate the structural invariants
    MatrixData(String),
    DivideByZero { index: usize },
    ZeroDiagonal { row: usize },
    /// solve requested before setup or after clean
    NotSetup(&'static str),
    InputParam(String),
    AmgSetup(String),
    DirectSolverSetup(String),
    DirectSolverSolve(String),
    ConfigFile(String),
    UnknownSolverType(String),
    UnknownPrecondType(String),
    Io(String),
    AllocMem(String),
}

impl LinAlgError {
    pub fn size_mismatch(context: &str, expected: usize, found: usize) -> Self {
        LinAlgError::SizeMismatch {
            context: context.to_string(),
            expected,
            found,
        }
    }

    /// Integer return code of the error, compatible with the FASP code table.
    pub fn code(&self) -> i32 {
        match self {
            LinAlgError::Io(_) => -10,
            LinAlgError::ConfigFile(_) => -11,
            LinAlgError::InputParam(_) | LinAlgError::NotSetup(_) => -12,
            LinAlgError::MatrixSize(_) => -15,
            LinAlgError::SizeMismatch { .. } => -16,
            LinAlgError::MatrixData(_) => -17,
            LinAlgError::DivideByZero { .. } => -18,
            LinAlgError::ZeroDiagonal { .. } => -19,
            LinAlgError::AllocMem(_) => -20,
            LinAlgError::UnknownSolverType(_) => -30,
            LinAlgError::UnknownPrecondType(_) => -31,
            LinAlgError::AmgSetup(_) => -49,
            LinAlgError::DirectSolverSetup(_) => -91,
            LinAlgError::DirectSolverSolve(_) => -92,
        }
    }
}

impl fmt::Display for LinAlgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinAlgError::SizeMismatch {
                context,
                expected,
                found,
            } => write!(
                f,
                "{}: sizes do not match (expected {}, found {})",
                context, expected, found
            ),
            LinAlgError::MatrixSize(msg) => write!(f, "Wrong matrix size: {}", msg),
            LinAlgError::MatrixData(msg) => write!(f, "Wrong matrix format: {}", msg),
            LinAlgError::DivideByZero { index } => {
                write!(f, "Divided by zero at entry {}", index)
            }
            LinAlgError::ZeroDiagonal { row } => {
                write!(f, "Matrix has a zero diagonal entry in row {}", row)
            }
            LinAlgError::NotSetup(who) => write!(f, "{} is used before setup", who),
            LinAlgError::InputParam(msg) => write!(f, "Wrong input parameter: {}", msg),
            LinAlgError::AmgSetup(msg) => write!(f, "AMG setup failed: {}", msg),
            LinAlgError::DirectSolverSetup(msg) => {
                write!(f, "Direct solver setup failed: {}", msg)
            }
            LinAlgError::DirectSolverSolve(msg) => {
                write!(f, "Direct solver failed to solve: {}", msg)
            }
            LinAlgError::ConfigFile(msg) => write!(f, "Wrong configuration file: {}", msg),
            LinAlgError::UnknownSolverType(name) => write!(f, "Unknown solver type: {}", name),
            LinAlgError::UnknownPrecondType(name) => {
                write!(f, "Unknown preconditioner type: {}", name)
            }
            LinAlgError::Io(msg) => write!(f, "I/O error: {}", msg),
            LinAlgError::AllocMem(msg) => write!(f, "Failed to allocate memory: {}", msg),
        }
    }
}

impl std::error::Error for LinAlgError {}

impl From<std::io::Error> for LinAlgError {
    fn from(e: std::io::Error) -> Self {
        LinAlgError::Io(e.to_string())
    }
}

impl From<toml::de::Error> for LinAlgError {
    fn from(e: toml::de::Error) -> Self {
        LinAlgError::ConfigFile(e.to_string())
    }
}

impl From<csv::Error> for LinAlgError {
    fn from(e: csv::Error) -> Self {
        LinAlgError::Io(e.to_string())
    }
}

/// How an iterative method finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum SolverStatus {
    Converged,
    /// the iterate stopped moving on slowly converging steps
    Stagnation,
    MaxIterReached,
    /// a recurrence denominator vanished and could not be recovered by a restart
    Breakdown,
    /// recurrence keeps claiming convergence the true residual does not confirm
    ToleranceTooSmall,
}

impl SolverStatus {
    pub fn is_converged(&self) -> bool {
        matches!(self, SolverStatus::Converged)
    }

    pub fn code(&self) -> i32 {
        match self {
            SolverStatus::Converged => 0,
            SolverStatus::Breakdown => -18,
            SolverStatus::Stagnation => -32,
            SolverStatus::ToleranceTooSmall => -34,
            SolverStatus::MaxIterReached => -39,
        }
    }

    /// Short advice printed next to a failed solve.
    pub fn hint(&self) -> &'static str {
        match self {
            SolverStatus::Converged => "",
            SolverStatus::Stagnation => "try a stronger preconditioner or a larger restart",
            SolverStatus::MaxIterReached => "increase max_iter or improve the preconditioner",
            SolverStatus::Breakdown => {
                "method broke down; the matrix may not suit this method, try GMRES or BiCGStab"
            }
            SolverStatus::ToleranceTooSmall => {
                "tolerance is below attainable accuracy; relax rel_tol or abs_tol"
            }
        }
    }
}
