//! Geometric multigrid: the caller supplies the chain of prolongations, finest first,
//! and the coarse operators are formed as Galerkin products at setup.
use crate::krylov::params::SolverParams;
use crate::krylov::report::SolveReport;
use crate::linalg::csr::CsrMatrix;
use crate::linalg::errors::LinAlgError;
use crate::linalg::vector::Vector;
use crate::multigrid::cycle::{MgParams, MultigridSolver};
use crate::multigrid::hierarchy::Hierarchy;
use crate::operators::preconditioner::Preconditioner;

pub struct Mg {
    prolongations: Vec<CsrMatrix>,
    params: MgParams,
    solver: Option<MultigridSolver>,
}

impl Mg {
    /// `prolongations[l]` maps level l + 1 to level l.
    pub fn new(prolongations: Vec<CsrMatrix>, params: MgParams) -> Self {
        Mg {
            prolongations,
            params,
            solver: None,
        }
    }

    pub fn hierarchy(&self) -> Option<&Hierarchy> {
        self.solver.as_ref().map(|s| s.hierarchy())
    }

    pub fn solve_system(
        &mut self,
        b: &Vector,
        x: &mut Vector,
        params: &SolverParams,
    ) -> Result<SolveReport, LinAlgError> {
        self.solver
            .as_mut()
            .ok_or(LinAlgError::NotSetup("MG"))?
            .iterate(b, x, params)
    }
}

impl Preconditioner for Mg {
    fn setup(&mut self, a: &CsrMatrix) -> Result<(), LinAlgError> {
        let mut hierarchy = Hierarchy::new(a, &self.params)?;
        for p in &self.prolongations {
            hierarchy.push_level(p.clone())?;
        }
        self.solver = Some(MultigridSolver::new("MG", hierarchy)?);
        Ok(())
    }

    fn solve(&mut self, r: &Vector, z: &mut Vector) -> Result<(), LinAlgError> {
        self.solver
            .as_mut()
            .ok_or(LinAlgError::NotSetup("MG"))?
            .precondition(r, z)
    }

    fn clean(&mut self) {
        self.solver = None;
    }

    fn name(&self) -> &'static str {
        "MG"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::gallery::{laplacian_1d, linear_interpolation_1d};
    use crate::multigrid::cycle::CycleType;

    /// 2^k - 1 points, coarsened down to a single point
    fn chain(k: u32) -> (CsrMatrix, Vec<CsrMatrix>) {
        let n = 2usize.pow(k) - 1;
        let mut ps = Vec::new();
        let mut m = n;
        while m > 1 {
            ps.push(linear_interpolation_1d(m).unwrap());
            m = (m - 1) / 2;
        }
        (laplacian_1d(n).unwrap(), ps)
    }

    #[test]
    fn test_geometric_v_and_w_cycles_converge() {
        let (a, ps) = chain(7);
        let n = a.nrow();
        let b = Vector::filled(n, 1.0);
        for cycle in [CycleType::V, CycleType::W] {
            let mut mg = Mg::new(ps.clone(), MgParams::default().with_cycle(cycle));
            mg.setup(&a).unwrap();
            assert_eq!(mg.hierarchy().unwrap().num_levels(), 7);
            let mut x = Vector::new(n);
            let rep = mg
                .solve_system(&b, &mut x, &SolverParams::new().with_rel_tol(1e-9).with_max_iter(60))
                .unwrap();
            assert!(rep.is_converged(), "{} cycle: {}", cycle, rep.status);
        }
    }

    #[test]
    fn test_mismatched_chain_is_rejected() {
        let a = laplacian_1d(15).unwrap();
        let mut mg = Mg::new(vec![linear_interpolation_1d(7).unwrap()], MgParams::default());
        assert!(mg.setup(&a).is_err());
        assert!(mg.hierarchy().is_none());
    }
}
