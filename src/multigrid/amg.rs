//! Algebraic multigrid: the hierarchy is built from the matrix alone by repeated
//! Ruge-Stüben coarsening, then driven by the V/W cycle of `MultigridSolver`.
use crate::krylov::params::SolverParams;
use crate::krylov::report::SolveReport;
use crate::linalg::csr::CsrMatrix;
use crate::linalg::errors::{LinAlgError, MAX_MG_LEVEL};
use crate::linalg::vector::Vector;
use crate::multigrid::amg_coarsen::{
    direct_interpolation, ruge_stuben_splitting, strength_of_connection,
};
use crate::multigrid::cycle::{MgParams, MultigridSolver};
use crate::multigrid::hierarchy::Hierarchy;
use crate::operators::preconditioner::Preconditioner;
use log::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct AmgParams {
    /// upper bound on the number of levels, the finest included
    pub max_levels: usize,
    /// coarsening stops once a level has at most this many unknowns
    pub coarse_dof: usize,
    pub strength_threshold: f64,
    pub mg: MgParams,
}

impl Default for AmgParams {
    fn default() -> Self {
        AmgParams {
            max_levels: MAX_MG_LEVEL,
            coarse_dof: 50,
            strength_threshold: 0.25,
            mg: MgParams::default(),
        }
    }
}

impl AmgParams {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_max_levels(mut self, max_levels: usize) -> Self {
        self.max_levels = max_levels;
        self
    }
    pub fn with_coarse_dof(mut self, coarse_dof: usize) -> Self {
        self.coarse_dof = coarse_dof;
        self
    }
    pub fn with_strength_threshold(mut self, theta: f64) -> Self {
        self.strength_threshold = theta;
        self
    }
    pub fn with_mg(mut self, mg: MgParams) -> Self {
        self.mg = mg;
        self
    }

    pub fn validate(&self) -> Result<(), LinAlgError> {
        if self.max_levels == 0 || self.max_levels > MAX_MG_LEVEL {
            return Err(LinAlgError::InputParam(format!(
                "max_levels must be in [1, {}], got {}",
                MAX_MG_LEVEL, self.max_levels
            )));
        }
        if !(0.0..=1.0).contains(&self.strength_threshold) {
            return Err(LinAlgError::InputParam(format!(
                "strength threshold must be in [0, 1], got {}",
                self.strength_threshold
            )));
        }
        self.mg.validate()
    }
}

/// Coarsens until the coarsest level is small enough, `max_levels` is reached or the
/// splitting stalls. A stall keeps the levels built so far.
pub fn amg_setup(a: &CsrMatrix, params: &AmgParams) -> Result<Hierarchy, LinAlgError> {
    params.validate()?;
    let mut hierarchy = Hierarchy::new(a, &params.mg)?;
    while hierarchy.num_levels() < params.max_levels {
        let level = hierarchy.num_levels() - 1;
        let a_l = hierarchy.coarsest();
        let n = a_l.nrow();
        if n <= params.coarse_dof {
            break;
        }
        let strong = strength_of_connection(a_l, params.strength_threshold);
        let splitting = ruge_stuben_splitting(&strong);
        if splitting.n_coarse == 0 || splitting.n_coarse >= n {
            warn!(
                "AMG coarsening stalled on level {} ({} -> {} unknowns), keeping {} levels",
                level,
                n,
                splitting.n_coarse,
                level + 1
            );
            break;
        }
        let p = direct_interpolation(a_l, &strong, &splitting)?;
        hierarchy.push_level(p)?;
        info!(
            "AMG level {}: {} -> {} unknowns, coarse nnz = {}",
            level,
            n,
            splitting.n_coarse,
            hierarchy.coarsest().nnz()
        );
    }
    Ok(hierarchy)
}

pub struct Amg {
    params: AmgParams,
    solver: Option<MultigridSolver>,
}

impl Default for Amg {
    fn default() -> Self {
        Amg::new(AmgParams::default())
    }
}

impl Amg {
    pub fn new(params: AmgParams) -> Self {
        Amg { params, solver: None }
    }

    pub fn params(&self) -> &AmgParams {
        &self.params
    }

    pub fn hierarchy(&self) -> Option<&Hierarchy> {
        self.solver.as_ref().map(|s| s.hierarchy())
    }

    /// AMG as a stand-alone solver, after `setup`.
    pub fn solve_system(
        &mut self,
        b: &Vector,
        x: &mut Vector,
        params: &SolverParams,
    ) -> Result<SolveReport, LinAlgError> {
        self.solver
            .as_mut()
            .ok_or(LinAlgError::NotSetup("AMG"))?
            .iterate(b, x, params)
    }
}

impl Preconditioner for Amg {
    fn setup(&mut self, a: &CsrMatrix) -> Result<(), LinAlgError> {
        let hierarchy = amg_setup(a, &self.params)?;
        self.solver = Some(MultigridSolver::new("AMG", hierarchy)?);
        Ok(())
    }

    fn solve(&mut self, r: &Vector, z: &mut Vector) -> Result<(), LinAlgError> {
        self.solver
            .as_mut()
            .ok_or(LinAlgError::NotSetup("AMG"))?
            .precondition(r, z)
    }

    fn clean(&mut self) {
        self.solver = None;
    }

    fn name(&self) -> &'static str {
        "AMG"
    }
}
