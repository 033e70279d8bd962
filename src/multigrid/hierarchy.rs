//! Multilevel hierarchy: per-level operators, transfers, smoothers and workspace, plus the
//! solver of the coarsest level.
use crate::linalg::csr::CsrMatrix;
use crate::linalg::errors::{LinAlgError, MAX_MG_LEVEL};
use crate::linalg::vector::Vector;
use crate::multigrid::cycle::MgParams;
use crate::operators::direct::SparseLu;
use crate::operators::preconditioner::Preconditioner;
use crate::operators::relaxation::Relaxation;
use log::{info, warn};
use strum_macros::{Display, EnumIter, EnumString};
use tabled::{builder::Builder, settings::Style};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CoarseSolverKind {
    /// sparse LU of the coarsest operator
    Direct,
    /// a fixed number of smoother sweeps
    Smoother,
}

pub enum CoarseSolver {
    Direct(SparseLu),
    Smoother(Relaxation),
}

pub struct Level {
    pub a: CsrMatrix,
    /// prolongation to this level from the next coarser one
    pub p: Option<CsrMatrix>,
    /// restriction from this level to the next coarser one
    pub r: Option<CsrMatrix>,
    pub(crate) smoother: Relaxation,
    pub(crate) b: Vector,
    pub(crate) x: Vector,
    pub(crate) w: Vector,
}

impl Level {
    fn new(a: CsrMatrix, params: &MgParams) -> Level {
        let n = a.nrow();
        Level {
            a,
            p: None,
            r: None,
            smoother: Relaxation::new(params.smoother, params.smoother_weight, params.pre_sweeps),
            b: Vector::new(n),
            x: Vector::new(n),
            w: Vector::new(n),
        }
    }

    pub fn size(&self) -> usize {
        self.a.nrow()
    }
}

pub struct Hierarchy {
    pub(crate) levels: Vec<Level>,
    pub(crate) coarse: Option<CoarseSolver>,
    params: MgParams,
}

impl Hierarchy {
    /// One-level hierarchy on a copy of `a`.
    pub fn new(a: &CsrMatrix, params: &MgParams) -> Result<Hierarchy, LinAlgError> {
        if !a.is_square() {
            return Err(LinAlgError::MatrixSize(format!(
                "multigrid needs a square matrix, got {} x {}",
                a.nrow(),
                a.mcol()
            )));
        }
        params.validate()?;
        Ok(Hierarchy {
            levels: vec![Level::new(a.clone(), params)],
            coarse: None,
            params: params.clone(),
        })
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, l: usize) -> Option<&Level> {
        self.levels.get(l)
    }

    pub fn params(&self) -> &MgParams {
        &self.params
    }

    pub fn coarsest(&self) -> &CsrMatrix {
        // levels is never empty
        &self.levels[self.levels.len() - 1].a
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.levels.iter().map(|l| l.size()).collect()
    }

    /// sum of nnz over all levels divided by nnz of the finest operator
    pub fn operator_complexity(&self) -> f64 {
        let fine = self.levels[0].a.nnz().max(1) as f64;
        self.levels.iter().map(|l| l.a.nnz() as f64).sum::<f64>() / fine
    }

    pub fn grid_complexity(&self) -> f64 {
        let fine = self.levels[0].size().max(1) as f64;
        self.levels.iter().map(|l| l.size() as f64).sum::<f64>() / fine
    }

    /// Appends a coarser level: R = P^T and A_c = R (A P).
    pub fn push_level(&mut self, p: CsrMatrix) -> Result<(), LinAlgError> {
        if self.levels.len() >= MAX_MG_LEVEL {
            return Err(LinAlgError::AmgSetup(format!(
                "hierarchy already has the maximal number of levels {}",
                MAX_MG_LEVEL
            )));
        }
        let n = self.coarsest().nrow();
        if p.nrow() != n {
            return Err(LinAlgError::size_mismatch("prolongation rows", n, p.nrow()));
        }
        if p.mcol() == 0 || p.mcol() >= n {
            return Err(LinAlgError::AmgSetup(format!(
                "prolongation must map a smaller nonempty space, got {} -> {}",
                p.mcol(),
                n
            )));
        }
        let r = p.transpose()?;
        let ap = self.coarsest().mult(&p)?;
        let a_c = r.mult(&ap)?;
        let fine = self.levels.len() - 1;
        self.levels[fine].p = Some(p);
        self.levels[fine].r = Some(r);
        let level = Level::new(a_c, &self.params);
        self.levels.push(level);
        Ok(())
    }

    /// Sets up the smoothers of all but the coarsest level and the coarse solver.
    pub fn finalize(&mut self) -> Result<(), LinAlgError> {
        let last = self.levels.len() - 1;
        for (l, level) in self.levels.iter_mut().enumerate().take(last) {
            level
                .smoother
                .setup(&level.a)
                .map_err(|e| LinAlgError::AmgSetup(format!("smoother on level {}: {}", l, e)))?;
        }
        let a_c = &self.levels[last].a;
        let coarse = match self.params.coarse_solver {
            CoarseSolverKind::Direct => {
                let mut lu = SparseLu::new();
                match lu.setup(a_c) {
                    Ok(()) => CoarseSolver::Direct(lu),
                    Err(e) => {
                        warn!(
                            "coarse LU failed ({}), using {} sweeps of {} instead",
                            e, self.params.coarse_sweeps, self.params.smoother
                        );
                        self.coarse_smoother(a_c)?
                    }
                }
            }
            CoarseSolverKind::Smoother => self.coarse_smoother(a_c)?,
        };
        self.coarse = Some(coarse);
        Ok(())
    }

    fn coarse_smoother(&self, a_c: &CsrMatrix) -> Result<CoarseSolver, LinAlgError> {
        let mut relax = Relaxation::new(
            self.params.smoother,
            self.params.smoother_weight,
            self.params.coarse_sweeps,
        );
        relax
            .setup(a_c)
            .map_err(|e| LinAlgError::AmgSetup(format!("coarse smoother: {}", e)))?;
        Ok(CoarseSolver::Smoother(relax))
    }

    /// Solves on the coarsest level with its own `b`, overwriting its `x`.
    pub(crate) fn solve_coarsest(&mut self) -> Result<(), LinAlgError> {
        let level = self
            .levels
            .last_mut()
            .ok_or(LinAlgError::NotSetup("Hierarchy"))?;
        match self.coarse.as_mut() {
            Some(CoarseSolver::Direct(lu)) => lu.solve(&level.b, &mut level.x),
            Some(CoarseSolver::Smoother(relax)) => relax.relax(&level.a, &level.b, &mut level.x),
            None => Err(LinAlgError::NotSetup("Hierarchy coarse solver")),
        }
    }

    pub fn summary_table(&self) -> String {
        let mut builder = Builder::default();
        builder.push_record(["level", "rows", "nnz", "avg nnz/row"]);
        for (l, level) in self.levels.iter().enumerate() {
            let n = level.size();
            builder.push_record([
                l.to_string(),
                n.to_string(),
                level.a.nnz().to_string(),
                format!("{:.2}", level.a.nnz() as f64 / n.max(1) as f64),
            ]);
        }
        let mut table = builder.build();
        table.with(Style::modern_rounded());
        table.to_string()
    }

    pub fn log_summary(&self) {
        info!(
            "multigrid hierarchy: {} levels, grid complexity {:.3}, operator complexity {:.3}\n{}",
            self.num_levels(),
            self.grid_complexity(),
            self.operator_complexity(),
            self.summary_table()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::csr_utils::csr_from_triplets;
    use crate::linalg::gallery::{laplacian_1d, linear_interpolation_1d};
    use approx::assert_relative_eq;

    #[test]
    fn test_galerkin_product() {
        let a = laplacian_1d(7).unwrap();
        let mut h = Hierarchy::new(&a, &MgParams::default()).unwrap();
        let p = linear_interpolation_1d(7).unwrap();
        let expected = p.to_dense().transpose() * a.to_dense() * p.to_dense();
        h.push_level(p).unwrap();
        assert_eq!(h.num_levels(), 2);
        assert_eq!(h.sizes(), vec![7, 3]);
        let ac = h.coarsest().to_dense();
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(ac[(i, j)], expected[(i, j)], epsilon = 1e-14);
            }
        }
        assert!(h.coarsest().is_symmetric(1e-14));
        assert!(h.operator_complexity() > 1.0);
    }

    #[test]
    fn test_bad_prolongation_rejected() {
        let a = laplacian_1d(5).unwrap();
        let mut h = Hierarchy::new(&a, &MgParams::default()).unwrap();
        assert!(h.push_level(CsrMatrix::identity(5)).is_err());
        assert!(h.push_level(linear_interpolation_1d(7).unwrap()).is_err());
        assert_eq!(h.num_levels(), 1);
    }

    #[test]
    fn test_coarse_solver_fallback_and_exact_solve() {
        let a = laplacian_1d(5).unwrap();
        let mut h = Hierarchy::new(&a, &MgParams::default()).unwrap();
        h.finalize().unwrap();
        assert!(matches!(h.coarse, Some(CoarseSolver::Direct(_))));
        h.levels[0].b = Vector::filled(5, 1.0);
        h.solve_coarsest().unwrap();
        let expected = [2.5, 4.0, 4.5, 4.0, 2.5];
        for i in 0..5 {
            assert_relative_eq!(h.levels[0].x[i], expected[i], epsilon = 1e-12);
        }

        let params = MgParams::default().with_coarse_solver(CoarseSolverKind::Smoother);
        let mut h = Hierarchy::new(&a, &params).unwrap();
        h.finalize().unwrap();
        assert!(matches!(h.coarse, Some(CoarseSolver::Smoother(_))));
    }

    #[test]
    fn test_singular_coarsest_operator_falls_back_to_sweeps() {
        // pure Neumann 1-D Laplacian: constants span the null space
        let a = csr_from_triplets(
            3,
            3,
            &[0, 0, 1, 1, 1, 2, 2],
            &[0, 1, 0, 1, 2, 1, 2],
            &[1.0, -1.0, -1.0, 2.0, -1.0, -1.0, 1.0],
        )
        .unwrap();
        let mut h = Hierarchy::new(&a, &MgParams::default()).unwrap();
        h.finalize().unwrap();
        assert!(matches!(h.coarse, Some(CoarseSolver::Smoother(_))));
        h.levels[0].b = Vector::from_vec(vec![1.0, 0.0, -1.0]);
        h.solve_coarsest().unwrap();
        assert!(h.levels[0].x.as_slice().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_zero_row_on_coarsest_level_is_an_error() {
        let a = CsrMatrix::from_diagonal(&[1.0, 0.0, 2.0]);
        let mut h = Hierarchy::new(&a, &MgParams::default()).unwrap();
        assert!(matches!(h.finalize(), Err(LinAlgError::AmgSetup(_))));
    }
}
