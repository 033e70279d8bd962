use crate::linalg::errors::{LinAlgError, MAX_STAG_NUM};
use crate::operators::preconditioner::PrecondType;

/// Iteration controls shared by every iterative method in the crate.
///
/// The solver copies the parameters at setup, so changing them afterwards never affects a
/// solve in progress.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverParams {
    pub max_iter: usize,
    /// convergence is not accepted before this iteration
    pub min_iter: usize,
    /// extra iterations run after an apparent convergence to confirm it
    pub safe_iter: usize,
    /// first iteration from which the best iterate is kept
    pub sav_iter: usize,
    pub rel_tol: f64,
    pub abs_tol: f64,
    /// Krylov subspace dimension before a restart (GMRES, FGMRES)
    pub restart: usize,
    /// stagnation restarts allowed before the solve stops with `Stagnation`, 0 disables
    /// the stagnation check
    pub max_stag: usize,
    pub precond: PrecondType,
}

impl Default for SolverParams {
    fn default() -> Self {
        SolverParams {
            max_iter: 100,
            min_iter: 0,
            safe_iter: 0,
            sav_iter: 0,
            rel_tol: 1e-6,
            abs_tol: 1e-8,
            restart: 25,
            max_stag: MAX_STAG_NUM,
            precond: PrecondType::Identity,
        }
    }
}

impl SolverParams {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }
    pub fn with_min_iter(mut self, min_iter: usize) -> Self {
        self.min_iter = min_iter;
        self
    }
    pub fn with_safe_iter(mut self, safe_iter: usize) -> Self {
        self.safe_iter = safe_iter;
        self
    }
    pub fn with_sav_iter(mut self, sav_iter: usize) -> Self {
        self.sav_iter = sav_iter;
        self
    }
    pub fn with_rel_tol(mut self, rel_tol: f64) -> Self {
        self.rel_tol = rel_tol;
        self
    }
    pub fn with_abs_tol(mut self, abs_tol: f64) -> Self {
        self.abs_tol = abs_tol;
        self
    }
    pub fn with_restart(mut self, restart: usize) -> Self {
        self.restart = restart;
        self
    }
    pub fn with_max_stag(mut self, max_stag: usize) -> Self {
        self.max_stag = max_stag;
        self
    }
    pub fn with_precond(mut self, precond: PrecondType) -> Self {
        self.precond = precond;
        self
    }

    pub fn validate(&self) -> Result<(), LinAlgError> {
        if !(self.rel_tol >= 0.0) || !(self.abs_tol >= 0.0) {
            return Err(LinAlgError::InputParam(format!(
                "tolerances must be non-negative, got rel_tol = {}, abs_tol = {}",
                self.rel_tol, self.abs_tol
            )));
        }
        if self.min_iter > self.max_iter {
            return Err(LinAlgError::InputParam(format!(
                "min_iter = {} exceeds max_iter = {}",
                self.min_iter, self.max_iter
            )));
        }
        if self.restart == 0 {
            return Err(LinAlgError::InputParam("restart must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_builders() {
        let p = SolverParams::default();
        assert_eq!(p.max_iter, 100);
        assert_eq!(p.restart, 25);
        assert_eq!(p.max_stag, MAX_STAG_NUM);
        assert!(p.validate().is_ok());
        let p = SolverParams::new()
            .with_max_iter(10)
            .with_min_iter(2)
            .with_rel_tol(1e-10)
            .with_precond(PrecondType::Jacobi);
        assert_eq!(p.min_iter, 2);
        assert_eq!(p.precond, PrecondType::Jacobi);
    }

    #[test]
    fn test_invalid_params() {
        assert!(SolverParams::new().with_rel_tol(-1.0).validate().is_err());
        assert!(SolverParams::new().with_rel_tol(f64::NAN).validate().is_err());
        assert!(SolverParams::new().with_max_iter(1).with_min_iter(2).validate().is_err());
        assert!(SolverParams::new().with_restart(0).validate().is_err());
    }
}
